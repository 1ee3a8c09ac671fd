//! The capability set every actuation backend implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    /// Recoverable: explained back to the planner on the next step.
    #[error("{0}")]
    Redirect(String),

    #[error("{0}")]
    Failed(String),
}

impl ActuatorError {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ActuatorError::Redirect(_) => "AgentRedirectError",
            ActuatorError::Failed(_) => "ActuationError",
        }
    }

    /// `"<Kind>: <message>"`, the form fed into the next plan request.
    pub fn describe(&self) -> String {
        format!("{}: {}", self.kind_name(), self)
    }
}

/// Snapshot of the browser page handed to the planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserObservation {
    #[serde(rename = "activeURL")]
    pub active_url: String,
    #[serde(rename = "browserDimensions")]
    pub browser_dimensions: BTreeMap<String, i64>,
    #[serde(rename = "idToBboxMap")]
    pub id_to_bbox_map: BTreeMap<String, Value>,
    #[serde(rename = "screenshotBase64")]
    pub screenshot_base64: String,
    #[serde(rename = "simplifiedDOM")]
    pub simplified_dom: String,
    pub timestamp_ms: i64,
    #[serde(rename = "userAgent")]
    pub user_agent: String,
}

/// How long and how carefully to wait for the page to stop changing.
#[derive(Debug, Clone, PartialEq)]
pub struct SettleOptions {
    pub max_timeout_ms: u64,
    pub number_of_checks: u32,
    pub percent_difference_threshold: u32,
    pub polling_interval_ms: u64,
    pub start_time: DateTime<Utc>,
}

impl Default for SettleOptions {
    fn default() -> Self {
        Self {
            max_timeout_ms: 180_000,
            number_of_checks: 3,
            percent_difference_threshold: 25,
            polling_interval_ms: 500,
            start_time: Utc::now(),
        }
    }
}

/// Browser actions available to the interpreter.
///
/// Bounding boxes arrive as the raw `<box>top,left,bottom,right</box>`
/// strings from the program; see [`BoundingBox`](crate::BoundingBox) for
/// parsing them.
#[async_trait]
pub trait BrowserActuator: Send + Sync {
    /// Grounds the planner in the actuation environment.
    fn domain(&self) -> &str {
        "browser-use"
    }

    fn started(&self) -> bool {
        true
    }

    async fn start(&self) -> Result<(), ActuatorError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActuatorError> {
        Ok(())
    }

    /// Click the center of the box.
    async fn agent_click(&self, bbox: &str) -> Result<Value, ActuatorError>;

    /// Type into the element at the center of the box.
    async fn agent_type(&self, value: &str, bbox: &str, press_enter: bool) -> Result<Value, ActuatorError>;

    /// Scroll the element in the box. Directions are up, down, left and right.
    async fn agent_scroll(&self, direction: &str, bbox: &str) -> Result<Value, ActuatorError>;

    async fn go_to_url(&self, url: &str) -> Result<Value, ActuatorError>;

    /// No effect on the environment.
    async fn think(&self, _value: &str) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    async fn throw_agent_error(&self, _value: &str) -> Result<Value, ActuatorError> {
        Ok(Value::Null)
    }

    /// Finish the task. The returned value becomes the act's response.
    async fn return_value(&self, value: Option<&Value>) -> Result<Value, ActuatorError> {
        Ok(value.cloned().unwrap_or(Value::Null))
    }

    async fn wait(&self, seconds: f64) -> Result<Value, ActuatorError>;

    async fn wait_for_page_to_settle(&self, options: &SettleOptions) -> Result<Value, ActuatorError>;

    async fn take_observation(&self) -> Result<BrowserObservation, ActuatorError>;
}
