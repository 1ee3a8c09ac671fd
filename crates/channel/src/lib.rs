//! Encrypted message channel between the client and the browser extension.

pub mod crypto;
pub mod handler;
pub mod messages;
pub mod transport;

pub use crypto::{EncryptedEnvelope, MessageEncrypter, ENCRYPTED_MESSAGE_TYPE, SET_KEY_TYPE};
pub use handler::WindowMessageHandler;
pub use messages::{AwsCredentials, Completion, InboundMessage};
pub use transport::{ExtensionBehavior, ExtensionTransport, LoopbackTransport};

use nova_act_core::ActStateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Encryption error")]
    Encryption,

    #[error("Decryption error")]
    Decryption,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Message is not of type encrypted: {0}")]
    NotEncrypted(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Act state error: {0}")]
    ActState(#[from] ActStateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
