//! One observation/plan-response pair recorded during an act.

use crate::error::ActStateError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    /// Screenshot as a data URI or raw base64.
    pub image: String,
    pub prompt: String,
    pub active_url: String,
    pub legacy_workflow_run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub awl_raw_program: String,
    pub request_id: String,
}

/// Immutable record of a single planner round trip.
#[derive(Debug, Clone)]
pub struct Step {
    model_input: ModelInput,
    model_output: ModelOutput,
    observed_time: DateTime<Utc>,
    raw_message: Value,
    server_time_s: Option<f64>,
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> &'a str {
    path.iter()
        .try_fold(value, |node, key| node.get(*key))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

impl Step {
    /// Build a step from a `step-observation` style message.
    ///
    /// Both the screenshot and the program body are required.
    pub fn from_message(message: &Value) -> Result<Self, ActStateError> {
        let active_url = match str_at(message, &["input", "metadata", "activeURL"]) {
            "" => str_at(message, &["input", "metadata", "activeUrl"]),
            url => url,
        };

        let model_input = ModelInput {
            image: str_at(message, &["input", "screenshot"]).to_string(),
            prompt: str_at(message, &["input", "prompt"]).to_string(),
            active_url: active_url.to_string(),
            legacy_workflow_run_id: str_at(message, &["input", "agentRunCreate", "workflowRunId"])
                .to_string(),
        };
        let model_output = ModelOutput {
            awl_raw_program: str_at(message, &["output", "rawProgramBody"]).to_string(),
            request_id: str_at(message, &["output", "requestId"]).to_string(),
        };

        if model_input.image.is_empty() {
            return Err(ActStateError::InvalidStep("Screenshot is required"));
        }
        if model_output.awl_raw_program.is_empty() {
            return Err(ActStateError::InvalidStep("Program body is required"));
        }

        Ok(Self {
            model_input,
            model_output,
            observed_time: Utc::now(),
            raw_message: message.clone(),
            server_time_s: message.get("server_time_s").and_then(Value::as_f64),
        })
    }

    pub fn model_input(&self) -> &ModelInput {
        &self.model_input
    }

    pub fn model_output(&self) -> &ModelOutput {
        &self.model_output
    }

    pub fn observed_time(&self) -> DateTime<Utc> {
        self.observed_time
    }

    pub fn raw_message(&self) -> &Value {
        &self.raw_message
    }

    pub fn server_time_s(&self) -> Option<f64> {
        self.server_time_s
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_extension_observation() {
        let step = Step::from_message(&json!({
            "type": "autonomy-step-observation",
            "input": {
                "screenshot": "data:image/jpeg;base64,AAAA",
                "prompt": "find a coffee maker",
                "metadata": {"activeURL": "https://www.amazon.com/"},
                "agentRunCreate": {"workflowRunId": "wf-9"}
            },
            "output": {"rawProgramBody": "agentClick(\"<box>1,2,3,4</box>\");", "requestId": "req-1"}
        }))
        .unwrap();

        assert_eq!(step.model_input().active_url, "https://www.amazon.com/");
        assert_eq!(step.model_input().legacy_workflow_run_id, "wf-9");
        assert_eq!(step.model_output().request_id, "req-1");
        assert!(step.server_time_s().is_none());
    }

    #[test]
    fn test_lowercase_active_url_key() {
        let step = Step::from_message(&json!({
            "input": {"screenshot": "abc", "metadata": {"activeUrl": "https://example.com"}},
            "output": {"rawProgramBody": "return;"},
            "server_time_s": 1.5
        }))
        .unwrap();

        assert_eq!(step.model_input().active_url, "https://example.com");
        assert_eq!(step.server_time_s(), Some(1.5));
    }

    #[test]
    fn test_missing_screenshot_rejected() {
        let err = Step::from_message(&json!({"output": {"rawProgramBody": "return;"}})).unwrap_err();
        assert!(matches!(err, ActStateError::InvalidStep("Screenshot is required")));
    }

    #[test]
    fn test_missing_program_rejected() {
        let err = Step::from_message(&json!({"input": {"screenshot": "abc"}})).unwrap_err();
        assert!(matches!(err, ActStateError::InvalidStep("Program body is required")));
    }
}
