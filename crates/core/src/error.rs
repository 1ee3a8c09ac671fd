//! Error taxonomy for act execution.

use crate::backend::BackendInfo;
use crate::metadata::ActMetadata;
use std::fmt;
use thiserror::Error;

const FEEDBACK_LINE: &str =
    "Please consider providing feedback: https://amazonexteu.qualtrics.com/jfe/form/SV_bd8dHa7Em6kNkMe";

const QUOTA_MESSAGE: &str = "We have quota limits to ensure sufficient capacity for all users. \
If you need dedicated quota for a more ambitious project, please get in touch at nova-act@amazon.com. \
We're excited to see what you build!";

/// Violations of the `Act` state machine contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActStateError {
    #[error("Act {act_id} is already complete; cannot {operation}")]
    AlreadyComplete {
        act_id: String,
        operation: &'static str,
    },

    #[error("Invalid step: {0}")]
    InvalidStep(&'static str),
}

/// Variant of a 429 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleKind {
    /// Terminal for the rest of the day.
    DailyQuota,
    /// Retryable after a short backoff.
    ShortWindow,
    Unspecified,
}

impl ThrottleKind {
    pub fn from_throttle_type(throttle_type: Option<&str>) -> Self {
        match throttle_type {
            Some("DAILY_QUOTA_LIMIT_EXCEEDED") => ThrottleKind::DailyQuota,
            Some("RATE_LIMIT_EXCEEDED") => ThrottleKind::ShortWindow,
            _ => ThrottleKind::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActErrorKind {
    Timeout,
    Canceled,
    Agent,
    Guardrails,
    Model,
    InvalidInput,
    RateLimit(ThrottleKind),
    Auth,
    NotAuthorized,
    ServiceUnavailable,
    InternalServer,
    BadRequest,
    Protocol,
    BadResponse,
    ExceededMaxSteps,
    Dispatch,
    Actuation,
    Client,
}

impl ActErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ActErrorKind::Timeout => "ActTimeoutError",
            ActErrorKind::Canceled => "ActCanceledError",
            ActErrorKind::Agent => "ActAgentError",
            ActErrorKind::Guardrails => "ActGuardrailsError",
            ActErrorKind::Model => "ActModelError",
            ActErrorKind::InvalidInput => "ActInvalidInputError",
            ActErrorKind::RateLimit(_) => "ActRateLimitExceededError",
            ActErrorKind::Auth => "AuthError",
            ActErrorKind::NotAuthorized => "ActNotAuthorizedError",
            ActErrorKind::ServiceUnavailable => "ActServiceUnavailableError",
            ActErrorKind::InternalServer => "ActInternalServerError",
            ActErrorKind::BadRequest => "ActBadRequestError",
            ActErrorKind::Protocol => "ActProtocolError",
            ActErrorKind::BadResponse => "ActBadResponseError",
            ActErrorKind::ExceededMaxSteps => "ActExceededMaxStepsError",
            ActErrorKind::Dispatch => "ActDispatchError",
            ActErrorKind::Actuation => "ActActuationError",
            ActErrorKind::Client => "ActClientError",
        }
    }

    fn default_message(self) -> String {
        let message = match self {
            ActErrorKind::Timeout => "Timed out, you can modify the 'timeout' kwarg on the 'act' call",
            ActErrorKind::Canceled => "Act Canceled",
            ActErrorKind::Agent => "The requested action was not possible",
            ActErrorKind::Guardrails => {
                "I'm sorry, but I can't engage in unsafe or inappropriate actions. Please try a different request."
            }
            ActErrorKind::Model => {
                "The model output could not be processed. Please try a different request."
            }
            ActErrorKind::InvalidInput => "Invalid Input",
            ActErrorKind::RateLimit(ThrottleKind::DailyQuota) => {
                return format!("Daily API limit exceeded. {QUOTA_MESSAGE}");
            }
            ActErrorKind::RateLimit(ThrottleKind::ShortWindow) => {
                return format!("Too many requests in a short time period. {QUOTA_MESSAGE}");
            }
            ActErrorKind::RateLimit(ThrottleKind::Unspecified) => QUOTA_MESSAGE,
            ActErrorKind::Auth => "Authentication failed.",
            ActErrorKind::NotAuthorized => {
                "Not Authorized. Check your current IAM role by running 'aws sts get-caller-identity'."
            }
            ActErrorKind::ServiceUnavailable => "Server Unavailable",
            ActErrorKind::InternalServer => "Internal Server Error",
            ActErrorKind::BadRequest => "Bad Request",
            ActErrorKind::Protocol => "Failed to parse response",
            ActErrorKind::BadResponse => "Bad Response",
            ActErrorKind::ExceededMaxSteps => "Allowed Steps Exceeded",
            ActErrorKind::Dispatch => "Failed to dispatch act",
            ActErrorKind::Actuation => "Actuation Error",
            ActErrorKind::Client => "An error occurred during act()",
        };
        message.to_string()
    }

    /// Protocol-family kinds describe a malformed or unexpected exchange.
    pub fn is_protocol(self) -> bool {
        matches!(
            self,
            ActErrorKind::Protocol | ActErrorKind::BadRequest | ActErrorKind::BadResponse
        )
    }
}

/// Diagnostic payload shared by every `ActError`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActFailure {
    pub message: String,
    pub metadata: ActMetadata,
    pub failed_request_id: Option<String>,
    pub raw_message: Option<String>,
}

/// A terminal act failure, tagged with its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ActError {
    kind: ActErrorKind,
    failure: ActFailure,
}

impl ActError {
    pub fn new(kind: ActErrorKind, metadata: ActMetadata) -> Self {
        Self {
            kind,
            failure: ActFailure {
                message: kind.default_message(),
                metadata,
                failed_request_id: None,
                raw_message: None,
            },
        }
    }

    /// Override the default message. Empty messages keep the default.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.is_empty() {
            self.failure.message = message;
        }
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        self.failure.failed_request_id = (!request_id.is_empty()).then_some(request_id);
        self
    }

    pub fn with_raw_message(mut self, raw_message: impl Into<String>) -> Self {
        self.failure.raw_message = Some(raw_message.into());
        self
    }

    /// Authentication failure with remediation text for the given backend.
    pub fn auth(backend: &BackendInfo, metadata: ActMetadata, request_id: &str) -> Self {
        let message = ActErrorKind::Auth.default_message();
        let warning = if backend.is_helios() {
            create_warning_box(&[
                message.as_str(),
                "",
                "Please ensure you have received confirmation that your IAM role is allowlisted \
                 and that its policy has the required permissions. ",
                "To join the waitlist, please go here: https://amazonexteu.qualtrics.com/jfe/form/SV_9siTXCFdKHpdwCa",
            ])
        } else {
            let keygen = format!("Please ensure you are using a key from: {}", backend.keygen_uri);
            let mut warning = create_warning_box(&[
                message.as_str(),
                "",
                keygen.as_str(),
                "and accessing NovaAct from within the United States.",
            ]);
            if !request_id.is_empty() {
                warning.push_str(&format!(
                    "\nIf you are sure the above requirements are satisfied and you are still facing AuthError, \
                     please submit an issue with this request ID: {request_id}"
                ));
            }
            warning
        };

        Self::new(ActErrorKind::Auth, metadata)
            .with_message(warning)
            .with_request_id(request_id)
    }

    pub fn kind(&self) -> ActErrorKind {
        self.kind
    }

    pub fn metadata(&self) -> &ActMetadata {
        &self.failure.metadata
    }

    pub fn message(&self) -> &str {
        &self.failure.message
    }

    pub fn failed_request_id(&self) -> Option<&str> {
        self.failure.failed_request_id.as_deref()
    }

    pub fn raw_message(&self) -> Option<&str> {
        self.failure.raw_message.as_deref()
    }

    pub fn failure(&self) -> &ActFailure {
        &self.failure
    }

    /// Whether retrying the same act may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ActErrorKind::RateLimit(ThrottleKind::ShortWindow)
                | ActErrorKind::ServiceUnavailable
                | ActErrorKind::InternalServer
        )
    }
}

impl fmt::Display for ActError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\n\n{}(\n", self.kind.name())?;
        writeln!(f, "    message = {}", self.failure.message)?;
        if let Some(request_id) = &self.failure.failed_request_id {
            writeln!(f, "    failed_request_id = {request_id}")?;
        }
        if let Some(raw) = &self.failure.raw_message {
            writeln!(f, "    raw_message = {raw}")?;
        }
        let metadata = self.failure.metadata.to_string().replace('\n', "\n    ");
        writeln!(f, "    metadata = {metadata}")?;
        write!(f, ")\n\n{FEEDBACK_LINE}")
    }
}

impl std::error::Error for ActError {}

/// Frame lines in a box of stars.
pub fn create_warning_box(lines: &[&str]) -> String {
    let max_length = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    let width = max_length + 4;
    let border = "*".repeat(width);

    let middle: Vec<String> = lines
        .iter()
        .map(|line| {
            let padding = " ".repeat(max_length - line.chars().count());
            format!("* {line}{padding} *")
        })
        .collect();

    format!("\n{border}\n{}\n{border}", middle.join("\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    fn metadata() -> ActMetadata {
        ActMetadata {
            session_id: "sess".to_string(),
            act_id: "act".to_string(),
            num_steps_executed: 0,
            start_time: None,
            end_time: None,
            prompt: "p".to_string(),
            step_server_times_s: vec![],
        }
    }

    #[test]
    fn test_default_message_per_kind() {
        let err = ActError::new(ActErrorKind::ExceededMaxSteps, metadata());
        assert_eq!(err.message(), "Allowed Steps Exceeded");

        let err = ActError::new(ActErrorKind::Agent, metadata()).with_message("");
        assert_eq!(err.message(), "The requested action was not possible");
    }

    #[test]
    fn test_retryable_kinds() {
        let retryable = [
            ActErrorKind::RateLimit(ThrottleKind::ShortWindow),
            ActErrorKind::ServiceUnavailable,
            ActErrorKind::InternalServer,
        ];
        for kind in retryable {
            assert!(ActError::new(kind, metadata()).is_retryable(), "{kind:?}");
        }

        let terminal = [
            ActErrorKind::RateLimit(ThrottleKind::DailyQuota),
            ActErrorKind::Auth,
            ActErrorKind::Guardrails,
            ActErrorKind::BadRequest,
            ActErrorKind::Timeout,
        ];
        for kind in terminal {
            assert!(!ActError::new(kind, metadata()).is_retryable(), "{kind:?}");
        }
    }

    #[test]
    fn test_display_block_includes_metadata() {
        let err = ActError::new(ActErrorKind::Protocol, metadata())
            .with_request_id("req-42")
            .with_raw_message("{}");
        let rendered = err.to_string();

        assert!(rendered.starts_with("\n\nActProtocolError(\n"));
        assert!(rendered.contains("    failed_request_id = req-42\n"));
        assert!(rendered.contains("    raw_message = {}\n"));
        assert!(rendered.contains("    metadata = ActMetadata(\n        session_id = sess"));
    }

    #[test]
    fn test_empty_request_id_is_dropped() {
        let err = ActError::new(ActErrorKind::BadRequest, metadata()).with_request_id("");
        assert!(err.failed_request_id().is_none());
    }

    #[test]
    fn test_auth_error_mentions_keygen() {
        let err = ActError::auth(&Backend::Prod.info(), metadata(), "req-7");
        assert!(err.message().contains("https://nova.amazon.com/act"));
        assert!(err.message().contains("req-7"));
        assert_eq!(err.failed_request_id(), Some("req-7"));

        let err = ActError::auth(&Backend::Helios.info(), metadata(), "");
        assert!(err.message().contains("IAM role"));
    }

    #[test]
    fn test_daily_quota_has_remediation() {
        let err = ActError::new(ActErrorKind::RateLimit(ThrottleKind::DailyQuota), metadata());
        assert!(err.message().starts_with("Daily API limit exceeded."));
        assert!(err.message().contains("nova-act@amazon.com"));
    }

    #[test]
    fn test_warning_box_alignment() {
        let boxed = create_warning_box(&["abc", "", "a"]);
        let lines: Vec<&str> = boxed.lines().skip(1).collect();
        assert_eq!(lines[0], "*******");
        assert_eq!(lines[1], "* abc *");
        assert_eq!(lines[2], "*     *");
        assert_eq!(lines[3], "* a   *");
        assert_eq!(lines[4], "*******");
    }
}
