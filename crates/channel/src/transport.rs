//! Delivery of raw messages to and from the actuation surface.

use crate::crypto::{MessageEncrypter, SET_KEY_TYPE};
use crate::ChannelError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;

/// Window-message bridge into the browser page hosting the extension.
#[async_trait]
pub trait ExtensionTransport: Send + Sync {
    /// Post one message (plaintext set-key or encrypted envelope) to the page.
    async fn post_message(&self, message: &Value) -> Result<(), ChannelError>;

    /// Take every message the extension has posted back since the last call.
    async fn drain_messages(&self) -> Result<Vec<Value>, ChannelError>;

    /// Navigate the main page and wait until the extension listeners are attached.
    async fn navigate(&self, url: &str) -> Result<(), ChannelError>;
}

/// Scripted stand-in for the extension's side of the channel.
pub trait ExtensionBehavior: Send + Sync {
    /// React to one decrypted message with zero or more plaintext replies.
    fn on_message(&self, message: &Value) -> Vec<Value>;
}

impl<F> ExtensionBehavior for F
where
    F: Fn(&Value) -> Vec<Value> + Send + Sync,
{
    fn on_message(&self, message: &Value) -> Vec<Value> {
        self(message)
    }
}

/// In-process transport that plays the extension.
///
/// It picks up the key from the set-key message, decrypts everything posted
/// afterwards, feeds the plaintext to an [`ExtensionBehavior`] and queues the
/// encrypted replies for the next drain.
pub struct LoopbackTransport {
    behavior: Box<dyn ExtensionBehavior>,
    key: Mutex<Option<MessageEncrypter>>,
    inbound: Mutex<VecDeque<Value>>,
    received: Mutex<Vec<Value>>,
    navigations: Mutex<Vec<String>>,
}

impl LoopbackTransport {
    pub fn new(behavior: impl ExtensionBehavior + 'static) -> Self {
        Self {
            behavior: Box::new(behavior),
            key: Mutex::new(None),
            inbound: Mutex::new(VecDeque::new()),
            received: Mutex::new(Vec::new()),
            navigations: Mutex::new(Vec::new()),
        }
    }

    /// A surface that never answers.
    pub fn silent() -> Self {
        Self::new(|_: &Value| -> Vec<Value> { Vec::new() })
    }

    /// Queue a plaintext message, encrypting it with the installed key.
    pub fn push_message(&self, message: &Value) -> Result<(), ChannelError> {
        let key = self.key.lock();
        let encrypter = key
            .as_ref()
            .ok_or_else(|| ChannelError::Transport("no key installed".to_string()))?;
        let envelope = encrypter.encrypt(message)?;
        self.inbound.lock().push_back(envelope);
        Ok(())
    }

    /// Queue a message as-is, bypassing encryption.
    pub fn push_raw(&self, message: Value) {
        self.inbound.lock().push_back(message);
    }

    /// Decrypted messages received so far, in order.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    pub fn received_types(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|m| m.get("type").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    pub fn has_key(&self) -> bool {
        self.key.lock().is_some()
    }
}

#[async_trait]
impl ExtensionTransport for LoopbackTransport {
    async fn post_message(&self, message: &Value) -> Result<(), ChannelError> {
        if message.get("type").and_then(Value::as_str) == Some(SET_KEY_TYPE) {
            let hex_key = message
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| ChannelError::InvalidMessage("set-key without key".to_string()))?;
            *self.key.lock() = Some(MessageEncrypter::from_hex_key(hex_key)?);
            debug!("Loopback surface installed channel key");
            return Ok(());
        }

        let plaintext = {
            let key = self.key.lock();
            let encrypter = key
                .as_ref()
                .ok_or_else(|| ChannelError::Transport("no key installed".to_string()))?;
            encrypter.decrypt(message)?
        };
        self.received.lock().push(plaintext.clone());

        for reply in self.behavior.on_message(&plaintext) {
            self.push_message(&reply)?;
        }
        Ok(())
    }

    async fn drain_messages(&self) -> Result<Vec<Value>, ChannelError> {
        Ok(self.inbound.lock().drain(..).collect())
    }

    async fn navigate(&self, url: &str) -> Result<(), ChannelError> {
        self.navigations.lock().push(url.to_string());
        Ok(())
    }
}
