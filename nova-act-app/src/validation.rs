//! Checks run on user input before an act is created.

use std::time::Duration;
use thiserror::Error;

pub const MIN_PROMPT_LENGTH: usize = 1;
pub const MAX_PROMPT_LENGTH: usize = 10_000;
pub const MIN_TIMEOUT_S: u64 = 2;
pub const MAX_TIMEOUT_S: u64 = 1800;
/// Exclusive.
pub const MAX_STEP_LIMIT: usize = 100;
pub const API_KEY_LENGTH: usize = 36;
pub const MAX_PARAM_LENGTH: usize = 2048;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Prompt length must be between 1 and 10000 characters inclusive. Current length: {0}")]
    PromptLength(usize),

    #[error("Timeout must be between {MIN_TIMEOUT_S} and {MAX_TIMEOUT_S}")]
    Timeout(Duration),

    #[error("max_steps must be less than {MAX_STEP_LIMIT}")]
    MaxSteps(usize),

    #[error("Invalid API key length")]
    ApiKeyLength,

    #[error("{0} exceeds max length of {MAX_PARAM_LENGTH}")]
    ParamLength(&'static str),

    #[error("Schema provided isn't a valid jsonschema: {0}")]
    Schema(String),

    #[error("{0}")]
    Url(String),
}

pub fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    let length = prompt.chars().count();
    if !(MIN_PROMPT_LENGTH..=MAX_PROMPT_LENGTH).contains(&length) {
        return Err(ValidationError::PromptLength(length));
    }
    Ok(())
}

/// `None` means no deadline and is always accepted.
pub fn validate_timeout(timeout: Option<Duration>) -> Result<(), ValidationError> {
    let Some(timeout) = timeout else {
        return Ok(());
    };
    let bounds = Duration::from_secs(MIN_TIMEOUT_S)..=Duration::from_secs(MAX_TIMEOUT_S);
    if !bounds.contains(&timeout) {
        return Err(ValidationError::Timeout(timeout));
    }
    Ok(())
}

pub fn validate_step_limit(max_steps: Option<usize>) -> Result<(), ValidationError> {
    match max_steps {
        Some(max_steps) if max_steps >= MAX_STEP_LIMIT => Err(ValidationError::MaxSteps(max_steps)),
        _ => Ok(()),
    }
}

pub fn validate_api_key(api_key: &str) -> Result<(), ValidationError> {
    if api_key.len() != API_KEY_LENGTH {
        return Err(ValidationError::ApiKeyLength);
    }
    Ok(())
}

pub fn validate_param_length(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.len() >= MAX_PARAM_LENGTH {
        return Err(ValidationError::ParamLength(field));
    }
    Ok(())
}

/// Absolute `http(s)` URL with a host, or a `file:` URL.
pub fn validate_url(url: &str) -> Result<(), ValidationError> {
    let parsed = reqwest::Url::parse(url).map_err(|_| {
        ValidationError::Url("URL provided is invalid. Did you include http:// or https:// ?".to_string())
    })?;
    if parsed.scheme() != "file" && !parsed.has_host() {
        return Err(ValidationError::Url(
            "URL provided is invalid. Did you include http:// or https:// ?".to_string(),
        ));
    }
    Ok(())
}
