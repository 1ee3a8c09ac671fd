use crate::cancel::CancellationFlag;
use async_trait::async_trait;
use nova_act_core::{Act, ActError, ActErrorKind, ActMetadata, ActResult};
use std::fmt::Display;
use std::time::Duration;

/// Drives acts against one actuation surface.
///
/// A dispatcher belongs to a single session and is used from one task at a
/// time. The only state shared with other tasks is the cancellation flag.
#[async_trait]
pub trait ActDispatcher: Send {
    /// Run `act` until it reaches a terminal state, then resolve the outcome.
    async fn dispatch(&mut self, act: &mut Act) -> Result<ActResult, ActError>;

    /// Wait until the surface reports an idle page. `None` uses the
    /// dispatcher's default settle timeout.
    async fn wait_for_page_to_settle(
        &mut self,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActError>;

    /// Navigate, then wait for the page to settle.
    async fn go_to_url(
        &mut self,
        url: &str,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActError>;

    fn cancellation_flag(&self) -> &CancellationFlag;

    /// Ask the act in flight to stop at the next poll point.
    fn cancel_prompt(&self) {
        self.cancellation_flag().trigger();
    }
}

/// A broken `Act` contract inside a dispatch loop.
pub(crate) fn client_error(act: &Act, error: impl Display) -> ActError {
    ActError::new(ActErrorKind::Client, act.metadata()).with_message(error.to_string())
}

/// A failure outside any act.
pub(crate) fn session_error(kind: ActErrorKind, session_id: &str, error: impl Display) -> ActError {
    ActError::new(kind, ActMetadata::for_session(session_id)).with_message(error.to_string())
}
