//! Client for the remote step endpoint.

use async_trait::async_trait;
use nova_act_core::{Act, BackendInfo, NOVA_ACT_SERVICE};
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Error, Debug)]
pub enum RoutesError {
    #[error("An API key is required to call the step endpoint")]
    MissingApiKey,

    #[error("Failed to step: {body} - response missing {field}")]
    MissingField { body: String, field: &'static str },

    #[error("Invalid plan request: {0}")]
    InvalidRequest(String),

    #[error("Invalid step response: {0}")]
    InvalidResponse(String),

    /// No HTTP response was received.
    #[error("Step request failed: {0}")]
    Transport(String),
}

/// What one call to the step endpoint produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResponse {
    Program {
        raw_program_body: String,
        /// Observation/response record in the shape `Step::from_message` reads.
        step: Value,
    },
    /// HTTP-level failure, as a service failure payload for `Act::fail`.
    Failed(Value),
}

/// Source of AWL programs, one per step.
#[async_trait]
pub trait StepClient: Send + Sync {
    async fn step(&self, act: &Act, plan_request: &str) -> Result<StepResponse, RoutesError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepRequest<'a> {
    act_id: &'a str,
    session_id: &'a str,
    actuation_plan_request: &'a str,
}

/// `POST {api_uri}/step` over HTTP.
#[derive(Clone)]
pub struct Routes {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl Routes {
    pub fn new(backend: &BackendInfo, api_key: &str) -> Result<Self, RoutesError> {
        Self::with_timeouts(backend, api_key, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeouts(
        backend: &BackendInfo,
        api_key: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, RoutesError> {
        if api_key.is_empty() {
            return Err(RoutesError::MissingApiKey);
        }
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| RoutesError::Transport(e.to_string()))?;

        Ok(Self {
            url: format!("{}/step", backend.api_uri.trim_end_matches('/')),
            api_key: api_key.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Failure payload for an HTTP error status, in the shape the classifier expects.
fn service_failure(status: u16, body: &Value) -> Value {
    let message = json!({
        "reason": body.get("reason"),
        "message": body.get("fields"),
    });
    json!({
        "type": NOVA_ACT_SERVICE,
        "code": status,
        "message": message.to_string(),
    })
}

#[async_trait]
impl StepClient for Routes {
    async fn step(&self, act: &Act, plan_request: &str) -> Result<StepResponse, RoutesError> {
        let request: Value = serde_json::from_str(plan_request)
            .map_err(|e| RoutesError::InvalidRequest(e.to_string()))?;
        let payload = StepRequest {
            act_id: act.id(),
            session_id: act.session_id(),
            actuation_plan_request: plan_request,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("ApiKey {}", self.api_key))
            .header("X-Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RoutesError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RoutesError::Transport(e.to_string()))?;
        let server_time_s = started.elapsed().as_secs_f64();
        debug!("Step endpoint answered {} in {:.3}s", status, server_time_s);

        let json_response: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        if status.as_u16() >= 400 {
            return Ok(StepResponse::Failed(service_failure(status.as_u16(), &json_response)));
        }

        let plan_response = json_response
            .get("actuationPlanResponse")
            .and_then(Value::as_str)
            .ok_or_else(|| RoutesError::MissingField {
                body: body.clone(),
                field: "actuationPlanResponse",
            })?;
        let full_response: Value = serde_json::from_str(plan_response)
            .map_err(|e| RoutesError::InvalidResponse(e.to_string()))?;
        let raw_program_body = full_response
            .get("rawProgramBody")
            .and_then(Value::as_str)
            .ok_or_else(|| RoutesError::MissingField {
                body: body.clone(),
                field: "rawProgramBody",
            })?
            .to_string();

        let mut input = json!({
            "screenshot": request["screenshotBase64"],
            "prompt": act.prompt(),
            "metadata": { "activeUrl": request["observation"]["activeURL"] },
        });
        if let Some(agent_run_create) = request.get("agentRunCreate") {
            input["agentRunCreate"] = agent_run_create.clone();
        }

        Ok(StepResponse::Program {
            raw_program_body,
            step: json!({
                "input": input,
                "output": full_response,
                "server_time_s": server_time_s,
            }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use nova_act_core::Backend;

    #[test]
    fn test_requires_api_key() {
        assert!(matches!(
            Routes::new(&Backend::Prod.info(), ""),
            Err(RoutesError::MissingApiKey)
        ));
    }

    #[test]
    fn test_step_url() {
        let routes = Routes::new(&Backend::Helios.info(), "key").unwrap();
        assert_eq!(routes.url(), "https://helios.nova.amazon.com/step");
    }

    #[test]
    fn test_service_failure_payload() {
        let payload = service_failure(429, &json!({"reason": "TOO_MANY", "fields": [{"message": "slow"}]}));
        assert_eq!(payload["type"], "NovaActService");
        assert_eq!(payload["code"], 429);
        let message: Value = serde_json::from_str(payload["message"].as_str().unwrap()).unwrap();
        assert_eq!(message["reason"], "TOO_MANY");
        assert_eq!(message["message"][0]["message"], "slow");
    }
}
