//! Plan-and-interpret loop against a caller-supplied actuator.

use crate::cancel::CancellationFlag;
use crate::dispatcher::{client_error, session_error, ActDispatcher};
use crate::plan_request::construct_plan_request;
use crate::routes::{RoutesError, StepClient, StepResponse};
use crate::trace::TraceContext;
use async_trait::async_trait;
use nova_act_core::{
    client_failure, resolve_outcome, Act, ActError, ActErrorKind, ActResult, BackendInfo,
    ClientErrorCode, Step, NOVA_ACT_CLIENT, NOVA_ACT_SERVICE,
};
use nova_act_interpreter::{
    ActuatorError, AwlInterpreter, BrowserActuator, BrowserObservation, Interpretation,
    SettleOptions,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What the loop should do after one step.
#[derive(Debug)]
enum StepOutcome {
    /// Keep going, passing along a redirect from this step if there was one.
    Continue(Option<ActuatorError>),
    /// The act reached a terminal state.
    Finished,
}

/// The planner's answer for one step.
#[derive(Debug)]
enum Planned {
    Program { program: String, step: Value },
    /// The act fails with this payload.
    Failed(Value),
}

/// The planner returns a value of any JSON type; the act response is text.
fn render_return_value(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn actuation_failure(error: &ActuatorError) -> Value {
    client_failure(ClientErrorCode::ActuationError, Some(&error.to_string()))
}

pub struct CustomActDispatcher {
    backend: BackendInfo,
    actuator: Arc<dyn BrowserActuator>,
    interpreter: AwlInterpreter,
    step_client: Arc<dyn StepClient>,
    settle_timeout: Duration,
    cancellation: CancellationFlag,
    trace: TraceContext,
}

impl CustomActDispatcher {
    pub fn new(
        backend: BackendInfo,
        actuator: Arc<dyn BrowserActuator>,
        step_client: Arc<dyn StepClient>,
        trace: TraceContext,
    ) -> Self {
        Self {
            backend,
            interpreter: AwlInterpreter::new(actuator.clone()),
            actuator,
            step_client,
            settle_timeout: Duration::from_millis(SettleOptions::default().max_timeout_ms),
            cancellation: CancellationFlag::new(),
            trace,
        }
    }

    /// Upper bound for the settle wait before each step.
    pub fn with_settle_timeout(mut self, settle_timeout: Duration) -> Self {
        self.settle_timeout = settle_timeout;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    fn settle_options(&self, timeout: Duration) -> SettleOptions {
        SettleOptions {
            max_timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ..SettleOptions::default()
        }
    }

    async fn observe(&self) -> Result<BrowserObservation, ActuatorError> {
        self.actuator
            .wait_for_page_to_settle(&self.settle_options(self.settle_timeout))
            .await?;
        self.actuator.take_observation().await
    }

    fn time_out(act: &mut Act) -> Result<(), ActError> {
        act.mark_timed_out().map_err(|e| client_error(act, e))?;
        act.fail(json!({ "type": NOVA_ACT_CLIENT, "error": "Act timed out" }))
            .map_err(|e| client_error(act, e))
    }

    fn fail(act: &mut Act, payload: Value) -> Result<StepOutcome, ActError> {
        act.fail(payload).map_err(|e| client_error(act, e))?;
        Ok(StepOutcome::Finished)
    }

    /// Settle, observe and ask the planner for the next program. Nothing here
    /// touches the page, so the act deadline may cut it short.
    async fn plan(
        &self,
        act: &Act,
        is_initial_step: bool,
        previous_error: Option<&ActuatorError>,
    ) -> Result<Planned, ActError> {
        let observation = match self.observe().await {
            Ok(observation) => observation,
            Err(e) => return Ok(Planned::Failed(actuation_failure(&e))),
        };

        let plan_request = construct_plan_request(
            act.id(),
            &observation,
            act.prompt(),
            previous_error,
            is_initial_step,
            act.endpoint_name(),
        )
        .map_err(|e| client_error(act, e))?;

        self.trace.line("...");
        match self.step_client.step(act, &plan_request).await {
            Ok(StepResponse::Program {
                raw_program_body,
                step,
            }) => Ok(Planned::Program {
                program: raw_program_body,
                step,
            }),
            Ok(StepResponse::Failed(payload)) => Ok(Planned::Failed(payload)),
            Err(RoutesError::Transport(message)) => {
                warn!("Step request failed: {}", message);
                Ok(Planned::Failed(
                    json!({ "type": NOVA_ACT_SERVICE, "code": 503, "message": message }),
                ))
            }
            Err(e) => {
                warn!("Unusable step response: {}", e);
                Ok(Planned::Failed(client_failure(
                    ClientErrorCode::BadResponse,
                    Some(&e.to_string()),
                )))
            }
        }
    }

    /// Record the step and run its program. Actuator calls always finish.
    async fn execute(&self, act: &mut Act, planned: Planned) -> Result<StepOutcome, ActError> {
        let (program, step) = match planned {
            Planned::Failed(payload) => return Self::fail(act, payload),
            Planned::Program { program, step } => (program, step),
        };

        self.trace.program(&program);
        let step = Step::from_message(&step).map_err(|e| client_error(act, e))?;
        act.add_step(step).map_err(|e| client_error(act, e))?;

        match self.interpreter.interpret(&program).await {
            Err(e) => {
                debug!("Unparseable program: {}", e);
                Self::fail(
                    act,
                    client_failure(ClientErrorCode::BadResponse, Some(&e.to_string())),
                )
            }
            Ok(Interpretation::Continue) => Ok(StepOutcome::Continue(None)),
            Ok(Interpretation::Redirect(redirect)) => {
                debug!("Redirecting planner: {}", redirect.describe());
                Ok(StepOutcome::Continue(Some(redirect)))
            }
            Ok(Interpretation::Done(value)) => {
                act.complete(render_return_value(value))
                    .map_err(|e| client_error(act, e))?;
                Ok(StepOutcome::Finished)
            }
            Ok(Interpretation::Failed(program_error)) => Self::fail(act, program_error.to_payload()),
        }
    }

    async fn run(&mut self, act: &mut Act) -> Result<(), ActError> {
        self.cancellation.reset();
        let mut previous_error = None;

        for index in 1..=act.max_steps() {
            if act.is_past_deadline() {
                Self::time_out(act)?;
                return Ok(());
            }

            if self.cancellation.is_triggered() {
                self.cancellation.reset();
                self.trace.line("Terminating agent workflow");
                act.cancel().map_err(|e| client_error(act, e))?;
                return Ok(());
            }

            let plan = self.plan(act, index == 1, previous_error.as_ref());
            let planned = match act.remaining() {
                Some(remaining) => tokio::time::timeout(remaining, plan).await.ok(),
                None => Some(plan.await),
            };
            let Some(planned) = planned else {
                Self::time_out(act)?;
                return Ok(());
            };

            match self.execute(act, planned?).await? {
                StepOutcome::Continue(redirect) => previous_error = redirect,
                StepOutcome::Finished => return Ok(()),
            }
        }

        if !act.is_complete() {
            act.fail(client_failure(ClientErrorCode::MaxStepsExceeded, None))
                .map_err(|e| client_error(act, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ActDispatcher for CustomActDispatcher {
    async fn dispatch(&mut self, act: &mut Act) -> Result<ActResult, ActError> {
        self.run(act).await?;
        resolve_outcome(act, &self.backend)
    }

    async fn wait_for_page_to_settle(
        &mut self,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActError> {
        let options = self.settle_options(timeout.unwrap_or(self.settle_timeout));
        self.actuator
            .wait_for_page_to_settle(&options)
            .await
            .map_err(|e| session_error(ActErrorKind::Actuation, session_id, e))?;
        Ok(())
    }

    async fn go_to_url(
        &mut self,
        url: &str,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActError> {
        self.actuator
            .go_to_url(url)
            .await
            .map_err(|e| session_error(ActErrorKind::Actuation, session_id, e))?;
        self.wait_for_page_to_settle(session_id, timeout).await
    }

    fn cancellation_flag(&self) -> &CancellationFlag {
        &self.cancellation
    }
}
