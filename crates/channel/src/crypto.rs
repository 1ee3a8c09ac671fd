use crate::ChannelError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;
use zeroize::Zeroize;

pub const SET_KEY_TYPE: &str = "autonomy-set-key";
pub const ENCRYPTED_MESSAGE_TYPE: &str = "autonomy-encrypted-message";

const NONCE_LEN: usize = 12;

/// Wire form of an encrypted message. Byte fields travel as JSON number arrays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub encrypted: Vec<u8>,
    pub iv: Vec<u8>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Per-session AES-256-GCM channel key.
///
/// One key is generated per session and never rotated. Every call to
/// [`encrypt`](Self::encrypt) draws a fresh 96-bit nonce.
pub struct MessageEncrypter {
    key: [u8; 32],
    cipher: Aes256Gcm,
}

impl MessageEncrypter {
    pub fn new() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Rebuild an encrypter from the hex key carried by a set-key message.
    pub fn from_hex_key(hex_key: &str) -> Result<Self, ChannelError> {
        let mut bytes =
            hex::decode(hex_key).map_err(|e| ChannelError::InvalidKey(e.to_string()))?;
        let key: Result<[u8; 32], _> = bytes.as_slice().try_into();
        bytes.zeroize();
        let key = key.map_err(|_| ChannelError::InvalidKey("expected 32 bytes".to_string()))?;
        Ok(Self::from_key(key))
    }

    fn from_key(key: [u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(&key.into());
        Self { key, cipher }
    }

    pub fn hex_key(&self) -> String {
        hex::encode(self.key)
    }

    /// Plaintext message that hands the key to the extension.
    pub fn set_key_message(&self) -> Value {
        json!({ "type": SET_KEY_TYPE, "key": self.hex_key() })
    }

    pub fn encrypt(&self, message: &Value) -> Result<Value, ChannelError> {
        let mut iv = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::from_slice(&iv);

        let plaintext = serde_json::to_vec(message)?;
        let encrypted = self
            .cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| ChannelError::Encryption)?;

        let envelope = EncryptedEnvelope {
            encrypted,
            iv: iv.to_vec(),
            kind: ENCRYPTED_MESSAGE_TYPE.to_string(),
        };
        Ok(serde_json::to_value(envelope)?)
    }

    pub fn decrypt(&self, envelope: &Value) -> Result<Value, ChannelError> {
        let kind = envelope.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind != ENCRYPTED_MESSAGE_TYPE {
            return Err(ChannelError::NotEncrypted(kind.to_string()));
        }

        let envelope: EncryptedEnvelope = serde_json::from_value(envelope.clone())
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
        if envelope.iv.len() != NONCE_LEN {
            return Err(ChannelError::InvalidMessage(format!(
                "iv must be {NONCE_LEN} bytes, got {}",
                envelope.iv.len()
            )));
        }

        let nonce = Nonce::from_slice(&envelope.iv);
        let mut plaintext = self
            .cipher
            .decrypt(nonce, envelope.encrypted.as_ref())
            .map_err(|_| ChannelError::Decryption)?;

        let message = serde_json::from_slice(&plaintext);
        plaintext.zeroize();
        let message: Value = message?;

        debug!("Decrypted message of type {:?}", message.get("type"));
        Ok(message)
    }
}

impl Default for MessageEncrypter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageEncrypter {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl fmt::Debug for MessageEncrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEncrypter")
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let encrypter = MessageEncrypter::new();
        let message = json!({"type": "autonomy-cancel-prompt"});

        let envelope = encrypter.encrypt(&message).unwrap();
        assert_eq!(envelope["type"], ENCRYPTED_MESSAGE_TYPE);
        assert_eq!(envelope["iv"].as_array().unwrap().len(), NONCE_LEN);
        assert_eq!(encrypter.decrypt(&envelope).unwrap(), message);
    }

    #[test]
    fn test_fresh_nonce_per_message() {
        let encrypter = MessageEncrypter::new();
        let message = json!({"a": 1});
        let first = encrypter.encrypt(&message).unwrap();
        let second = encrypter.encrypt(&message).unwrap();
        assert_ne!(first["iv"], second["iv"]);
    }

    #[test]
    fn test_set_key_message_shares_key() {
        let sdk = MessageEncrypter::new();
        let set_key = sdk.set_key_message();
        assert_eq!(set_key["type"], SET_KEY_TYPE);

        let extension = MessageEncrypter::from_hex_key(set_key["key"].as_str().unwrap()).unwrap();
        let envelope = extension.encrypt(&json!({"hello": "sdk"})).unwrap();
        assert_eq!(sdk.decrypt(&envelope).unwrap(), json!({"hello": "sdk"}));
    }

    #[test]
    fn test_wrong_key_fails() {
        let envelope = MessageEncrypter::new().encrypt(&json!({"x": 1})).unwrap();
        let err = MessageEncrypter::new().decrypt(&envelope).unwrap_err();
        assert!(matches!(err, ChannelError::Decryption));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let encrypter = MessageEncrypter::new();
        let mut envelope = encrypter.encrypt(&json!({"x": 1})).unwrap();
        let first = envelope["encrypted"][0].as_u64().unwrap();
        envelope["encrypted"][0] = json!((first + 1) % 256);

        assert!(matches!(encrypter.decrypt(&envelope), Err(ChannelError::Decryption)));
    }

    #[test]
    fn test_plaintext_rejected() {
        let encrypter = MessageEncrypter::new();
        let err = encrypter.decrypt(&json!({"type": "autonomy-request-accepted"})).unwrap_err();
        assert!(matches!(err, ChannelError::NotEncrypted(_)));
    }

    #[test]
    fn test_short_iv_rejected() {
        let encrypter = MessageEncrypter::new();
        let err = encrypter
            .decrypt(&json!({"type": ENCRYPTED_MESSAGE_TYPE, "iv": [1, 2], "encrypted": [3]}))
            .unwrap_err();
        assert!(matches!(err, ChannelError::InvalidMessage(_)));
    }

    #[test]
    fn test_bad_hex_key() {
        assert!(MessageEncrypter::from_hex_key("zz").is_err());
        assert!(MessageEncrypter::from_hex_key("abcd").is_err());
    }
}
