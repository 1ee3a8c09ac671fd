//! Session-level facade: one browser session, one dispatcher, many acts.

use crate::config::{ConfigError, DEFAULT_ENDPOINT_NAME};
use crate::schema::{add_schema_to_prompt, compile_schema, populate_json_schema_response};
use crate::validation::{
    validate_param_length, validate_prompt, validate_step_limit, validate_timeout, validate_url,
    ValidationError,
};
use nova_act_core::{Act, ActError, ActErrorKind, ActRequest, ActResult, ModelKnobs, ThrottleKind};
use nova_act_dispatch::{watch_ctrl_c, ActDispatcher, CancellationFlag, TraceContext};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Client is not started. Run start() before calling act().")]
    NotStarted,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Act(#[from] ActError),
}

impl ClientError {
    /// The act failure, if this error came from a dispatched act.
    pub fn as_act_error(&self) -> Option<&ActError> {
        match self {
            ClientError::Act(e) => Some(e),
            _ => None,
        }
    }
}

/// Per-call knobs of [`ActClient::act`].
#[derive(Debug, Clone, Default)]
pub struct ActOptions {
    /// Overall deadline. `None` waits as long as the act runs.
    pub timeout: Option<Duration>,
    pub max_steps: Option<usize>,
    /// JSON schema the response should follow.
    pub schema: Option<Value>,
    /// Overrides the session's endpoint for this act.
    pub endpoint_name: Option<String>,
    pub model: ModelKnobs,
}

impl ActOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_endpoint_name(mut self, endpoint_name: impl Into<String>) -> Self {
        self.endpoint_name = Some(endpoint_name.into());
        self
    }

    pub fn with_model_knobs(mut self, model: ModelKnobs) -> Self {
        self.model = model;
        self
    }
}

/// Whole-act retry on short-window rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRetry {
    /// Total attempts, including the first.
    pub tries: u32,
    pub delay: Duration,
}

impl Default for RateLimitRetry {
    fn default() -> Self {
        Self {
            tries: 2,
            delay: Duration::from_secs(5),
        }
    }
}

fn is_short_window_throttle(error: &ActError) -> bool {
    error.kind() == ActErrorKind::RateLimit(ThrottleKind::ShortWindow)
}

pub struct ActClient {
    session_id: String,
    endpoint_name: String,
    dispatcher: Box<dyn ActDispatcher>,
    trace: TraceContext,
    rate_limit_retry: RateLimitRetry,
    tty: bool,
    started: bool,
    ctrl_c_watcher: Option<JoinHandle<()>>,
}

impl ActClient {
    /// Client for the session named by `trace`.
    pub fn new(dispatcher: Box<dyn ActDispatcher>, trace: TraceContext) -> Self {
        Self {
            session_id: trace.session_id().to_string(),
            endpoint_name: DEFAULT_ENDPOINT_NAME.to_string(),
            dispatcher,
            trace,
            rate_limit_retry: RateLimitRetry::default(),
            tty: false,
            started: false,
            ctrl_c_watcher: None,
        }
    }

    pub fn with_endpoint_name(mut self, endpoint_name: impl Into<String>) -> Self {
        self.endpoint_name = endpoint_name.into();
        self
    }

    pub fn with_rate_limit_retry(mut self, rate_limit_retry: RateLimitRetry) -> Self {
        self.rate_limit_retry = rate_limit_retry;
        self
    }

    /// Terminal sessions cancel the running act on ctrl-c.
    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Flag shared with the dispatcher; trigger it to cancel the act in flight.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.dispatcher.cancellation_flag().clone()
    }

    /// Spawn a task that cancels the act in flight on ctrl-c.
    pub fn watch_ctrl_c(&self) -> JoinHandle<()> {
        watch_ctrl_c(self.cancellation_flag())
    }

    pub fn start(&mut self) {
        if self.started {
            warn!("Client is already started");
            return;
        }
        if self.tty && tokio::runtime::Handle::try_current().is_ok() {
            self.ctrl_c_watcher = Some(self.watch_ctrl_c());
        }
        self.started = true;
        self.trace.line("start session");
    }

    pub fn stop(&mut self) {
        if !self.started {
            warn!("Client is already stopped");
            return;
        }
        self.dispatcher.cancel_prompt();
        if let Some(watcher) = self.ctrl_c_watcher.take() {
            watcher.abort();
        }
        self.started = false;
        self.trace.line("end session");
    }

    /// Carry out `prompt` in the browser.
    ///
    /// # Errors
    /// Invalid input is rejected before any act is created. Failures of the
    /// act itself come back as [`ClientError::Act`].
    pub async fn act(&mut self, prompt: &str, options: ActOptions) -> Result<ActResult, ClientError> {
        if !self.started {
            return Err(ClientError::NotStarted);
        }

        validate_timeout(options.timeout)?;
        validate_prompt(prompt)?;
        validate_step_limit(options.max_steps)?;

        let endpoint_name = options
            .endpoint_name
            .clone()
            .unwrap_or_else(|| self.endpoint_name.clone());
        validate_param_length("endpoint_name", &endpoint_name)?;

        let compiled = options.schema.as_ref().map(compile_schema).transpose()?;
        let prompt = match &options.schema {
            Some(schema) => add_schema_to_prompt(prompt, schema),
            None => prompt.to_string(),
        };

        let tries = self.rate_limit_retry.tries.max(1);
        let mut attempt = 1;
        loop {
            let mut act = Act::new(
                ActRequest::new(prompt.as_str(), self.session_id.as_str(), endpoint_name.as_str())
                    .with_timeout(options.timeout)
                    .with_max_steps(options.max_steps)
                    .with_model_knobs(options.model.clone()),
            );
            self.trace.line(&format!("act(\"{prompt}\")"));

            match self.dispatcher.dispatch(&mut act).await {
                Ok(result) => {
                    info!(
                        "Act {} finished after {} steps",
                        result.metadata.act_id, result.metadata.num_steps_executed
                    );
                    return Ok(match &compiled {
                        Some(schema) => populate_json_schema_response(result, schema),
                        None => result,
                    });
                }
                Err(e) if is_short_window_throttle(&e) && attempt < tries => {
                    warn!(
                        "Act {} was rate limited, retrying in {:?} (attempt {}/{})",
                        act.id(),
                        self.rate_limit_retry.delay,
                        attempt + 1,
                        tries
                    );
                    tokio::time::sleep(self.rate_limit_retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Navigate the session's page, then wait for it to settle.
    pub async fn go_to_url(&mut self, url: &str, timeout: Option<Duration>) -> Result<(), ClientError> {
        if !self.started {
            return Err(ClientError::NotStarted);
        }
        validate_url(url)?;
        self.dispatcher
            .go_to_url(url, &self.session_id, timeout)
            .await?;
        Ok(())
    }

    pub async fn wait_for_page_to_settle(&mut self, timeout: Option<Duration>) -> Result<(), ClientError> {
        if !self.started {
            return Err(ClientError::NotStarted);
        }
        self.dispatcher
            .wait_for_page_to_settle(&self.session_id, timeout)
            .await?;
        Ok(())
    }
}

impl Drop for ActClient {
    fn drop(&mut self) {
        if let Some(watcher) = self.ctrl_c_watcher.take() {
            watcher.abort();
        }
    }
}
