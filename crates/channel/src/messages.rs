//! Message types exchanged inside the encrypted envelope.

use crate::ChannelError;
use nova_act_core::Act;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const DISPATCH_PROMPT_TYPE: &str = "autonomy-pending-prompt";
pub const CANCEL_PROMPT_TYPE: &str = "autonomy-cancel-prompt";
pub const WAIT_FOR_PAGE_TO_SETTLE_PROMPT_TYPE: &str = "autonomy-pending-wait-for-page-to-settle";
pub const REQUEST_ACCEPTED_PROMPT_TYPE: &str = "autonomy-request-accepted";
pub const COMPLETION_PROMPT_TYPE: &str = "autonomy-prompt-completion";
pub const TAB_UPDATE_PROMPT_TYPE: &str = "autonomy-update-active-tab";
pub const STEP_OBSERVATION_PROMPT_TYPE: &str = "autonomy-step-observation";

/// Heartbeat sent by the extension outside the encrypted channel.
pub const PING_MESSAGE: &str = "ping";

/// The service only runs in this region.
const AWS_REGION: &str = "us-east-1";

/// IAM credentials forwarded to the extension instead of an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub region: String,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            region: AWS_REGION.to_string(),
        }
    }
}

/// `autonomy-pending-prompt`: hand a new act to the extension.
///
/// Numeric knobs travel as strings.
pub fn pending_prompt_message(
    act: &Act,
    api_key: &str,
    hostname: &str,
    aws_credentials: Option<&AwsCredentials>,
) -> Result<Value, ChannelError> {
    let mut message = Map::new();
    message.insert("type".into(), json!(DISPATCH_PROMPT_TYPE));
    message.insert("pendingPrompt".into(), json!(act.prompt()));
    message.insert("apiKey".into(), json!(api_key));
    message.insert("uuid".into(), json!(act.id()));
    message.insert("endpointName".into(), json!(act.endpoint_name()));
    message.insert("hostname".into(), json!(hostname));
    message.insert("sessionId".into(), json!(act.session_id()));
    message.insert("useBedrock".into(), json!(true));

    if let Some(credentials) = aws_credentials {
        message.insert("awsCredentials".into(), serde_json::to_value(credentials)?);
    }
    if act.max_steps() > 0 {
        message.insert("maxSteps".into(), json!(act.max_steps().to_string()));
    }

    let knobs = act.model_knobs();
    for (key, value) in [
        ("modelTemperature", knobs.temperature),
        ("modelTopK", knobs.top_k),
        ("modelSeed", knobs.seed),
    ] {
        if let Some(value) = value {
            message.insert(key.into(), json!(value.to_string()));
        }
    }

    Ok(Value::Object(message))
}

pub fn cancel_prompt_message() -> Value {
    json!({ "type": CANCEL_PROMPT_TYPE })
}

/// `autonomy-pending-wait-for-page-to-settle` for one settle request.
pub fn wait_for_page_to_settle_message(
    api_key: &str,
    hostname: &str,
    session_id: &str,
    max_timeout_s: u64,
) -> Value {
    json!({
        "type": WAIT_FOR_PAGE_TO_SETTLE_PROMPT_TYPE,
        "apiKey": api_key,
        "uuid": uuid::Uuid::new_v4().to_string(),
        "hostname": hostname,
        "sessionId": session_id,
        "useBedrock": true,
        "maxTimeout": max_timeout_s,
    })
}

pub fn request_accepted_message() -> Value {
    json!({ "type": REQUEST_ACCEPTED_PROMPT_TYPE })
}

pub fn completion_success_message(result: &str) -> Value {
    json!({
        "type": COMPLETION_PROMPT_TYPE,
        "response": { "type": "success", "result": result },
    })
}

pub fn completion_canceled_message() -> Value {
    json!({
        "type": COMPLETION_PROMPT_TYPE,
        "response": { "type": "canceled" },
    })
}

/// Completion carrying a failure. `failure` fields are merged into the response.
pub fn completion_error_message(failure: &Value) -> Value {
    let mut response = Map::new();
    response.insert("type".into(), json!("error"));
    if let Some(fields) = failure.as_object() {
        for (key, value) in fields {
            if key != "type" {
                response.insert(key.clone(), value.clone());
            }
        }
    }
    json!({ "type": COMPLETION_PROMPT_TYPE, "response": Value::Object(response) })
}

pub fn step_observation_message(screenshot: &str, prompt: &str, active_url: &str, program: &str) -> Value {
    json!({
        "type": STEP_OBSERVATION_PROMPT_TYPE,
        "input": {
            "screenshot": screenshot,
            "prompt": prompt,
            "metadata": { "activeURL": active_url },
        },
        "output": { "rawProgramBody": program },
    })
}

/// Terminal report for a dispatched prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Success { result: String },
    Canceled,
    /// The whole response object, kept for classification.
    Error { response: Value },
}

/// Decrypted message from the extension.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    RequestAccepted,
    Completion(Completion),
    StepObservation(Value),
    UpdateActiveTab(Value),
    Unknown(String),
}

impl InboundMessage {
    pub fn parse(message: &Value) -> Result<Self, ChannelError> {
        let kind = message.get("type").and_then(Value::as_str).unwrap_or_default();
        let parsed = match kind {
            REQUEST_ACCEPTED_PROMPT_TYPE => InboundMessage::RequestAccepted,
            COMPLETION_PROMPT_TYPE => {
                let response = message.get("response").ok_or_else(|| {
                    ChannelError::InvalidMessage("Completion message missing response".to_string())
                })?;
                let completion = match response.get("type").and_then(Value::as_str) {
                    Some("success") => Completion::Success {
                        result: match response.get("result") {
                            Some(Value::String(result)) => result.clone(),
                            Some(Value::Null) | None => String::new(),
                            Some(other) => other.to_string(),
                        },
                    },
                    Some("canceled") => Completion::Canceled,
                    Some("error") => Completion::Error {
                        response: response.clone(),
                    },
                    other => {
                        return Err(ChannelError::InvalidMessage(format!(
                            "unknown completion type {other:?}"
                        )))
                    }
                };
                InboundMessage::Completion(completion)
            }
            STEP_OBSERVATION_PROMPT_TYPE => InboundMessage::StepObservation(message.clone()),
            TAB_UPDATE_PROMPT_TYPE => InboundMessage::UpdateActiveTab(message.clone()),
            other => InboundMessage::Unknown(other.to_string()),
        };
        Ok(parsed)
    }
}
