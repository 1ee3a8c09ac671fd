use crate::actuator::{ActuatorError, BrowserActuator};
use crate::parser::{parse_program, Action, ParseError};
use nova_act_core::{client_failure, ClientErrorCode, NOVA_ACT_SERVICE};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

/// A failed step that should fail the act.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// The planner declared the task impossible via `throw`.
    Agent { message: String },
    /// The actuator failed while performing the action.
    Actuation { message: String },
}

impl ProgramError {
    /// Failure payload understood by the classifier.
    pub fn to_payload(&self) -> Value {
        match self {
            ProgramError::Agent { message } => json!({
                "type": NOVA_ACT_SERVICE,
                "subErrorCode": "AGENT_ERROR",
                "error": message,
            }),
            ProgramError::Actuation { message } => {
                client_failure(ClientErrorCode::ActuationError, Some(message))
            }
        }
    }
}

/// What happened when one program ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Action performed; the task goes on.
    Continue,
    /// The program returned. Holds the value handed back by the actuator.
    Done(Value),
    Failed(ProgramError),
    /// The actuator asked the planner to try a different approach.
    Redirect(ActuatorError),
}

impl Interpretation {
    pub fn is_task_done(&self) -> bool {
        matches!(self, Interpretation::Done(_) | Interpretation::Failed(ProgramError::Agent { .. }))
    }
}

/// Runs AWL programs against an actuator.
pub struct AwlInterpreter {
    actuator: Arc<dyn BrowserActuator>,
}

impl AwlInterpreter {
    pub fn new(actuator: Arc<dyn BrowserActuator>) -> Self {
        Self { actuator }
    }

    /// Parse and execute one program.
    ///
    /// Parse errors come back as `Err` before anything touches the actuator.
    /// Actuator failures are folded into the returned [`Interpretation`].
    pub async fn interpret(&self, raw_program_body: &str) -> Result<Interpretation, ParseError> {
        let program = parse_program(raw_program_body)?;

        if let Some(thought) = &program.thought {
            if let Err(e) = self.actuator.think(thought).await {
                return Ok(Self::actuation_failure(e));
            }
        }

        debug!("Executing {:?}", program.action);
        let outcome = match &program.action {
            Action::Return { value } => {
                return Ok(match self.actuator.return_value(value.as_ref()).await {
                    Ok(returned) => Interpretation::Done(returned),
                    Err(e) => Self::actuation_failure(e),
                });
            }
            Action::Throw { message } => {
                return Ok(match self.actuator.throw_agent_error(message).await {
                    Ok(_) => Interpretation::Failed(ProgramError::Agent {
                        message: message.clone(),
                    }),
                    Err(e) => Self::actuation_failure(e),
                });
            }
            Action::Click { bbox } => self.actuator.agent_click(bbox).await,
            Action::Type {
                value,
                bbox,
                press_enter,
            } => self.actuator.agent_type(value, bbox, *press_enter).await,
            Action::Scroll { direction, bbox } => self.actuator.agent_scroll(direction, bbox).await,
            Action::GoToUrl { url } => self.actuator.go_to_url(url).await,
            Action::Think { thought } => self.actuator.think(thought).await,
        };

        Ok(match outcome {
            Ok(_) => Interpretation::Continue,
            Err(e) => Self::actuation_failure(e),
        })
    }

    fn actuation_failure(error: ActuatorError) -> Interpretation {
        match error {
            ActuatorError::Redirect(_) => Interpretation::Redirect(error),
            ActuatorError::Failed(message) => {
                Interpretation::Failed(ProgramError::Actuation { message })
            }
        }
    }
}
