//! Remote service endpoints.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Prod,
    Helios,
}

/// Where acts are planned and where users obtain API keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendInfo {
    pub api_uri: String,
    pub keygen_uri: String,
}

impl Backend {
    pub fn info(self) -> BackendInfo {
        let api_uri = match self {
            Backend::Prod => "https://nova.amazon.com/agent",
            Backend::Helios => "https://helios.nova.amazon.com",
        };
        BackendInfo {
            api_uri: api_uri.to_string(),
            keygen_uri: "https://nova.amazon.com/act".to_string(),
        }
    }
}

impl BackendInfo {
    /// Helios authenticates with IAM credentials rather than API keys.
    pub fn is_helios(&self) -> bool {
        *self == Backend::Helios.info()
    }
}
