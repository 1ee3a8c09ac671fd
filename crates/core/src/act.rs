//! The `Act` state machine: one instance per natural-language instruction.

use crate::error::ActStateError;
use crate::metadata::ActMetadata;
use crate::step::Step;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default cap on the number of steps an act may take.
pub const DEFAULT_ACT_MAX_STEPS: usize = 30;

/// Terminal result recorded on an `Act`.
#[derive(Debug, Clone, PartialEq)]
pub enum ActOutcome {
    Succeeded { response: String },
    Canceled,
    Failed { payload: Value },
}

/// Optional sampling knobs forwarded to the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelKnobs {
    pub temperature: Option<i64>,
    pub top_k: Option<i64>,
    pub seed: Option<i64>,
}

/// Immutable request fields of an act.
#[derive(Debug, Clone)]
pub struct ActRequest {
    pub prompt: String,
    pub session_id: String,
    pub endpoint_name: String,
    /// `None` means no overall deadline.
    pub timeout: Option<Duration>,
    pub max_steps: usize,
    pub model: ModelKnobs,
}

impl ActRequest {
    pub fn new(
        prompt: impl Into<String>,
        session_id: impl Into<String>,
        endpoint_name: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: session_id.into(),
            endpoint_name: endpoint_name.into(),
            timeout: None,
            max_steps: DEFAULT_ACT_MAX_STEPS,
            model: ModelKnobs::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<usize>) -> Self {
        self.max_steps = max_steps.unwrap_or(DEFAULT_ACT_MAX_STEPS);
        self
    }

    pub fn with_model_knobs(mut self, model: ModelKnobs) -> Self {
        self.model = model;
        self
    }
}

/// Execution state of one instruction.
///
/// Owned by the dispatch loop that created it. Request fields are fixed at
/// construction; the remaining state only changes through `acknowledge`,
/// `add_step`, `mark_timed_out`, `complete`, `cancel` and `fail`. Once the
/// act is complete, every further mutation is rejected.
#[derive(Debug)]
pub struct Act {
    id: String,
    request: ActRequest,
    start_time: DateTime<Utc>,
    started: Instant,
    end_time: Option<DateTime<Utc>>,
    steps: Vec<Step>,
    result: Option<ActOutcome>,
    acknowledged: bool,
    did_timeout: bool,
}

impl Act {
    pub fn new(request: ActRequest) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            start_time: Utc::now(),
            started: Instant::now(),
            end_time: None,
            steps: Vec::new(),
            result: None,
            acknowledged: false,
            did_timeout: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session_id(&self) -> &str {
        &self.request.session_id
    }

    pub fn prompt(&self) -> &str {
        &self.request.prompt
    }

    pub fn endpoint_name(&self) -> &str {
        &self.request.endpoint_name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.request.timeout
    }

    pub fn max_steps(&self) -> usize {
        self.request.max_steps
    }

    pub fn model_knobs(&self) -> &ModelKnobs {
        &self.request.model
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn result(&self) -> Option<&ActOutcome> {
        self.result.as_ref()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    pub fn did_timeout(&self) -> bool {
        self.did_timeout
    }

    /// Time elapsed since the act was created.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the overall deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.request
            .timeout
            .map(|timeout| timeout.saturating_sub(self.elapsed()))
    }

    pub fn is_past_deadline(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    pub fn step_server_times_s(&self) -> Vec<f64> {
        self.steps
            .iter()
            .filter_map(Step::server_time_s)
            .map(|t| (t * 1000.0).round() / 1000.0)
            .collect()
    }

    pub fn metadata(&self) -> ActMetadata {
        ActMetadata {
            session_id: self.request.session_id.clone(),
            act_id: self.id.clone(),
            num_steps_executed: self.steps.len(),
            start_time: Some(self.start_time),
            end_time: self.end_time,
            prompt: self.request.prompt.clone(),
            step_server_times_s: self.step_server_times_s(),
        }
    }

    pub fn acknowledge(&mut self) -> Result<(), ActStateError> {
        self.ensure_open("acknowledge")?;
        self.acknowledged = true;
        Ok(())
    }

    pub fn add_step(&mut self, step: Step) -> Result<(), ActStateError> {
        self.ensure_open("add_step")?;
        self.steps.push(step);
        Ok(())
    }

    /// Flag that the local deadline elapsed. The act still needs a terminal
    /// transition afterwards.
    pub fn mark_timed_out(&mut self) -> Result<(), ActStateError> {
        self.ensure_open("mark_timed_out")?;
        self.did_timeout = true;
        Ok(())
    }

    pub fn complete(&mut self, response: impl Into<String>) -> Result<(), ActStateError> {
        self.finish(
            "complete",
            ActOutcome::Succeeded {
                response: response.into(),
            },
        )
    }

    pub fn cancel(&mut self) -> Result<(), ActStateError> {
        self.finish("cancel", ActOutcome::Canceled)
    }

    pub fn fail(&mut self, payload: Value) -> Result<(), ActStateError> {
        self.finish("fail", ActOutcome::Failed { payload })
    }

    fn finish(&mut self, operation: &'static str, outcome: ActOutcome) -> Result<(), ActStateError> {
        self.ensure_open(operation)?;
        debug!("Act {} finished: {}", self.id, operation);
        self.end_time = Some(Utc::now());
        self.result = Some(outcome);
        Ok(())
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), ActStateError> {
        if self.is_complete() {
            return Err(ActStateError::AlreadyComplete {
                act_id: self.id.clone(),
                operation,
            });
        }
        Ok(())
    }
}
