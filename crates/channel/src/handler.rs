use crate::crypto::MessageEncrypter;
use crate::messages::{Completion, InboundMessage, PING_MESSAGE};
use crate::ChannelError;
use nova_act_core::{Act, PageState, Step};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the handler is currently accumulating observations for.
#[derive(Debug)]
enum Binding {
    Idle,
    Act { act_id: String, open: bool },
    Page(PageState),
}

/// Decrypts extension messages and applies them to the bound `Act` or page.
///
/// At most one act is bound at a time. Binding a new act while another is
/// still open is rejected.
#[derive(Debug)]
pub struct WindowMessageHandler {
    encrypter: Arc<MessageEncrypter>,
    binding: Binding,
}

impl WindowMessageHandler {
    pub fn new(encrypter: Arc<MessageEncrypter>) -> Self {
        Self {
            encrypter,
            binding: Binding::Idle,
        }
    }

    pub fn bind(&mut self, act: &Act) -> Result<(), ChannelError> {
        if act.is_complete() {
            return Err(ChannelError::Binding(
                "Cannot bind a completed act for more observations".to_string(),
            ));
        }
        if let Binding::Act { act_id, open: true } = &self.binding {
            if act_id != act.id() {
                return Err(ChannelError::Binding(format!(
                    "Act {act_id} is still in progress"
                )));
            }
        }
        self.binding = Binding::Act {
            act_id: act.id().to_string(),
            open: true,
        };
        Ok(())
    }

    pub fn bind_page(&mut self, page_state: PageState) -> Result<(), ChannelError> {
        if page_state.is_settled {
            return Err(ChannelError::Binding(
                "Cannot bind a settled page for more observations".to_string(),
            ));
        }
        if let Binding::Act { act_id, open: true } = &self.binding {
            return Err(ChannelError::Binding(format!(
                "Act {act_id} is still in progress"
            )));
        }
        self.binding = Binding::Page(page_state);
        Ok(())
    }

    /// Whether the bound page has reported settled. `None` when no page is bound.
    pub fn page_settled(&self) -> Option<bool> {
        match &self.binding {
            Binding::Page(page) => Some(page.is_settled),
            _ => None,
        }
    }

    pub fn bound_act_id(&self) -> Option<&str> {
        match &self.binding {
            Binding::Act { act_id, .. } => Some(act_id),
            _ => None,
        }
    }

    /// Drop the current binding once its dispatch loop has finished.
    pub fn release(&mut self) {
        self.binding = Binding::Idle;
    }

    /// Apply one raw inbound message.
    ///
    /// `act` must be the act passed to [`bind`](Self::bind); messages for an
    /// act are ignored when a different one (or none) is supplied.
    pub fn handle_message(&mut self, raw: &Value, act: Option<&mut Act>) -> Result<(), ChannelError> {
        debug!("Got message {raw}");
        if raw.as_str() == Some(PING_MESSAGE) {
            return Ok(());
        }
        if !raw.is_object() {
            return Err(ChannelError::InvalidMessage("Message must be an object".to_string()));
        }

        let message = self.encrypter.decrypt(raw)?;
        let inbound = InboundMessage::parse(&message)?;
        self.apply(inbound, act)
    }

    fn apply(&mut self, inbound: InboundMessage, act: Option<&mut Act>) -> Result<(), ChannelError> {
        match &mut self.binding {
            Binding::Idle => {
                debug!("No binding; dropping {inbound:?}");
                Ok(())
            }
            Binding::Page(page) => {
                if let InboundMessage::Completion(_) = inbound {
                    page.settle();
                }
                Ok(())
            }
            Binding::Act { act_id, open } => {
                let Some(act) = act.filter(|act| act.id() == act_id.as_str()) else {
                    warn!("Message for bound act {act_id} arrived without that act");
                    return Ok(());
                };
                match inbound {
                    InboundMessage::Completion(completion) => {
                        match completion {
                            Completion::Success { result } => act.complete(result)?,
                            Completion::Canceled => act.cancel()?,
                            Completion::Error { response } => act.fail(response)?,
                        }
                        *open = false;
                    }
                    InboundMessage::RequestAccepted => act.acknowledge()?,
                    InboundMessage::StepObservation(message) => {
                        act.add_step(Step::from_message(&message)?)?;
                    }
                    InboundMessage::UpdateActiveTab(message) => {
                        debug!("Active tab updated: {message}");
                    }
                    InboundMessage::Unknown(kind) => {
                        debug!("Ignoring message of type {kind}");
                    }
                }
                Ok(())
            }
        }
    }
}
