#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use nova_act::{
    load_client_config, ActClient, ActOptions, ActuationSurface, ClientConfig, ClientError,
    ValidationError,
};
use nova_act_channel::messages::{
    completion_success_message, request_accepted_message, step_observation_message,
    DISPATCH_PROMPT_TYPE,
};
use nova_act_channel::LoopbackTransport;
use nova_act_core::Act;
use nova_act_dispatch::{RoutesError, StepClient, StepResponse};
use nova_act_interpreter::{ActuatorError, BrowserActuator, BrowserObservation, SettleOptions};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

const API_KEY: &str = "00000000-0000-0000-0000-000000000000";

fn fast_config() -> ClientConfig {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
api_key: "{API_KEY}"
tty: false
logging:
  quiet: true
extension:
  poll_interval_s: 0.002
  ack_timeout_s: 0.2
  retry_delay_s: 0.005
  retry_tries: 2
  settle_timeout_s: 0.05
custom:
  settle_timeout_s: 1
"#
    )
    .unwrap();
    load_client_config(file.path()).unwrap()
}

#[tokio::test]
async fn test_extension_session_runs_an_act_end_to_end() {
    let transport = Arc::new(LoopbackTransport::new(|message: &Value| {
        if message["type"] != DISPATCH_PROMPT_TYPE {
            return vec![];
        }
        vec![
            request_accepted_message(),
            step_observation_message(
                "AAAA",
                "search for socks",
                "https://shop.example",
                "agentType(\"socks\", \"<box>0,0,10,100</box>\", \"pressEnter\");",
            ),
            completion_success_message("{\"count\": 3}"),
        ]
    }));
    let mut client =
        ActClient::from_config(&fast_config(), ActuationSurface::extension(transport.clone())).unwrap();
    client.start();

    let result = client
        .act(
            "search for socks",
            ActOptions::default().with_schema(json!({"type": "object"})),
        )
        .await
        .unwrap();

    assert_eq!(result.metadata.session_id, client.session_id());
    assert_eq!(result.metadata.num_steps_executed, 1);
    assert_eq!(result.matches_schema, Some(true));
    assert_eq!(result.parsed_response, Some(json!({"count": 3})));

    let prompt = transport
        .received()
        .into_iter()
        .find(|m| m["type"] == DISPATCH_PROMPT_TYPE)
        .unwrap();
    assert_eq!(prompt["apiKey"], API_KEY);
    assert_eq!(prompt["endpointName"], "alpha-sunshine");
}

#[test]
fn test_from_config_rejects_bad_keys() {
    let transport = Arc::new(LoopbackTransport::silent());

    let config = ClientConfig::default();
    assert!(matches!(
        ActClient::from_config(&config, ActuationSurface::extension(transport.clone())),
        Err(ClientError::Config(_))
    ));

    let config = ClientConfig {
        api_key: Some("too-short".to_string()),
        ..ClientConfig::default()
    };
    assert!(matches!(
        ActClient::from_config(&config, ActuationSurface::extension(transport)),
        Err(ClientError::Validation(ValidationError::ApiKeyLength))
    ));
}

#[test]
fn test_sessions_get_distinct_ids() {
    let config = fast_config();
    let first = ActClient::from_config(
        &config,
        ActuationSurface::extension(Arc::new(LoopbackTransport::silent())),
    )
    .unwrap();
    let second = ActClient::from_config(
        &config,
        ActuationSurface::extension(Arc::new(LoopbackTransport::silent())),
    )
    .unwrap();

    assert_eq!(first.session_id().len(), 36);
    assert_ne!(first.session_id(), second.session_id());
}

/// A page whose only effect is recording clicks.
#[derive(Default)]
struct ClickRecorder {
    clicks: Mutex<Vec<String>>,
}

#[async_trait]
impl BrowserActuator for ClickRecorder {
    async fn agent_click(&self, bbox: &str) -> Result<Value, ActuatorError> {
        self.clicks.lock().unwrap().push(bbox.to_string());
        Ok(Value::Null)
    }

    async fn agent_type(&self, _value: &str, _bbox: &str, _press_enter: bool) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    async fn agent_scroll(&self, _direction: &str, _bbox: &str) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    async fn go_to_url(&self, _url: &str) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    async fn wait(&self, _seconds: f64) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    async fn wait_for_page_to_settle(&self, _options: &SettleOptions) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    async fn take_observation(&self) -> Result<BrowserObservation, ActuatorError> {
        Ok(BrowserObservation {
            active_url: "https://shop.example".to_string(),
            screenshot_base64: "AAAA".to_string(),
            ..Default::default()
        })
    }
}

/// Clicks once, then returns.
#[derive(Default)]
struct TwoStepPlanner {
    calls: Mutex<usize>,
}

#[async_trait]
impl StepClient for TwoStepPlanner {
    async fn step(&self, act: &Act, _plan_request: &str) -> Result<StepResponse, RoutesError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let program = if *calls == 1 {
            "agentClick(\"<box>0,0,10,10</box>\");"
        } else {
            "return \"clicked\";"
        };
        Ok(StepResponse::Program {
            raw_program_body: program.to_string(),
            step: json!({
                "input": {"screenshot": "AAAA", "prompt": act.prompt(), "metadata": {"activeUrl": "https://shop.example"}},
                "output": {"rawProgramBody": program, "requestId": format!("req-{calls}")},
                "server_time_s": 0.01,
            }),
        })
    }
}

#[tokio::test]
async fn test_custom_session_interprets_planned_programs() {
    let actuator = Arc::new(ClickRecorder::default());
    let mut client = ActClient::from_config(
        &fast_config(),
        ActuationSurface::CustomWithStepClient {
            actuator: actuator.clone(),
            step_client: Arc::new(TwoStepPlanner::default()),
        },
    )
    .unwrap();
    client.start();

    let result = client.act("click the thing", ActOptions::default()).await.unwrap();

    assert_eq!(result.response.as_deref(), Some("clicked"));
    assert_eq!(result.metadata.num_steps_executed, 2);
    assert_eq!(result.metadata.step_server_times_s, vec![0.01, 0.01]);
    assert_eq!(actuator.clicks.lock().unwrap().len(), 1);
}
