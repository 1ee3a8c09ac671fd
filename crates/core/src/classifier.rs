//! Failure classification.
//!
//! Maps the raw failure payload recorded on an `Act` into an [`ActError`].
//! Pure: no I/O, no clock, so every branch is testable against literal
//! payload fixtures.

use crate::act::{Act, ActOutcome};
use crate::backend::BackendInfo;
use crate::error::{ActError, ActErrorKind, ThrottleKind};
use crate::metadata::ActMetadata;
use crate::result::ActResult;
use serde_json::{json, Map, Value};
use std::fmt;

/// `type` tag of failures raised by the remote service.
pub const NOVA_ACT_SERVICE: &str = "NovaActService";
/// `type` tag of failures raised on the client side.
pub const NOVA_ACT_CLIENT: &str = "NovaActClient";

const AGENT_ERROR: &str = "AGENT_ERROR";
const CANCELED_ERROR: &str = "Canceled.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorCode {
    BadResponse,
    MaxStepsExceeded,
    ActuationError,
}

impl ClientErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientErrorCode::BadResponse => "BAD_RESPONSE",
            ClientErrorCode::MaxStepsExceeded => "MAX_STEPS_EXCEEDED",
            ClientErrorCode::ActuationError => "ACTUATION_ERROR",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "BAD_RESPONSE" => Some(ClientErrorCode::BadResponse),
            "MAX_STEPS_EXCEEDED" => Some(ClientErrorCode::MaxStepsExceeded),
            "ACTUATION_ERROR" => Some(ClientErrorCode::ActuationError),
            _ => None,
        }
    }
}

impl fmt::Display for ClientErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a client-side failure payload for `Act::fail`.
pub fn client_failure(code: ClientErrorCode, message: Option<&str>) -> Value {
    let mut payload = json!({ "type": NOVA_ACT_CLIENT, "code": code.as_str() });
    if let (Some(message), Some(object)) = (message, payload.as_object_mut()) {
        object.insert("message".to_string(), Value::String(message.to_string()));
    }
    payload
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn request_id(value: &Value) -> String {
    str_field(value, "requestId").unwrap_or_default().to_string()
}

/// Decode a field that may hold JSON either inline or as an encoded string.
fn decode_json(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value? {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// First `fields[].message` (or `message[].message`) of a prompt-level error.
fn prompt_message(error: &Map<String, Value>) -> String {
    ["fields", "message"]
        .iter()
        .filter_map(|key| error.get(*key).and_then(Value::as_array))
        .filter_map(|fields| fields.first())
        .find_map(|field| field.get("message").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

/// Classify a failure payload.
///
/// Precedence: local timeout, then cancellation, then agent errors, then the
/// service/client failure carried by the payload. Anything unrecognised is a
/// protocol error that keeps the raw payload.
pub fn classify_failure(
    payload: &Value,
    did_timeout: bool,
    metadata: ActMetadata,
    backend: &BackendInfo,
) -> ActError {
    if did_timeout {
        return ActError::new(ActErrorKind::Timeout, metadata);
    }

    let error_field = payload.get("error");
    let error_text = error_field.and_then(Value::as_str).unwrap_or_default();

    if error_text == CANCELED_ERROR || str_field(payload, "type") == Some("canceled") {
        return ActError::new(ActErrorKind::Canceled, metadata);
    }
    if str_field(payload, "subErrorCode") == Some(AGENT_ERROR) {
        return ActError::new(ActErrorKind::Agent, metadata).with_message(error_text);
    }

    let inner = match str_field(payload, "type") {
        Some(NOVA_ACT_SERVICE) | Some(NOVA_ACT_CLIENT) => payload.clone(),
        _ => match error_field {
            Some(Value::Object(_)) => error_field.cloned().unwrap_or_default(),
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(decoded) => decoded,
                Err(_) => {
                    return ActError::new(ActErrorKind::Protocol, metadata)
                        .with_message("failed to load error message as json")
                        .with_raw_message(Value::String(text.clone()).to_string());
                }
            },
            _ => {
                return ActError::new(ActErrorKind::Protocol, metadata)
                    .with_message("missing type in error message")
                    .with_request_id(request_id(payload))
                    .with_raw_message(payload.to_string());
            }
        },
    };

    match str_field(&inner, "type") {
        Some(NOVA_ACT_SERVICE) => classify_service_error(&inner, metadata, backend),
        Some(NOVA_ACT_CLIENT) => classify_client_error(&inner, metadata),
        Some(_) => ActError::new(ActErrorKind::Protocol, metadata)
            .with_message("unhandled failure type")
            .with_request_id(request_id(&inner))
            .with_raw_message(inner.to_string()),
        None => ActError::new(ActErrorKind::Protocol, metadata)
            .with_message("missing type in error message")
            .with_request_id(request_id(&inner))
            .with_raw_message(inner.to_string()),
    }
}

fn classify_service_error(error: &Value, metadata: ActMetadata, backend: &BackendInfo) -> ActError {
    let request_id = request_id(error);
    let raw = error.to_string();

    let code = match error.get("code") {
        Some(Value::String(code)) => return classify_string_code(code, error, metadata),
        Some(code) => code.as_i64().filter(|code| *code != -1),
        None => None,
    };
    let Some(code) = code else {
        return ActError::new(ActErrorKind::Protocol, metadata)
            .with_message("invalid error code in Server Response")
            .with_request_id(request_id)
            .with_raw_message(raw);
    };

    let message = decode_json(error.get("message"));

    if code == 400 {
        let Some(details) = &message else {
            return ActError::new(ActErrorKind::BadRequest, metadata)
                .with_request_id(request_id)
                .with_raw_message(raw);
        };
        match details.get("reason").and_then(Value::as_str) {
            Some("AGENT_GUARDRAILS_TRIGGERED") => {
                return ActError::new(ActErrorKind::Guardrails, metadata)
                    .with_message(prompt_message(details));
            }
            Some("INVALID_INPUT") => return ActError::new(ActErrorKind::InvalidInput, metadata),
            Some("MODEL_ERROR") => {
                return ActError::new(ActErrorKind::Model, metadata)
                    .with_message(prompt_message(details));
            }
            _ => {}
        }
    }

    match code {
        403 => ActError::auth(backend, metadata, &request_id),
        429 => {
            let throttle = message.as_ref().and_then(|details| {
                details
                    .get("throttleType")
                    .or_else(|| details.get("reason"))
                    .and_then(Value::as_str)
            });
            ActError::new(
                ActErrorKind::RateLimit(ThrottleKind::from_throttle_type(throttle)),
                metadata,
            )
            .with_request_id(request_id)
            .with_raw_message(raw)
        }
        400..=499 => ActError::new(ActErrorKind::BadRequest, metadata)
            .with_request_id(request_id)
            .with_raw_message(raw),
        503 => ActError::new(ActErrorKind::ServiceUnavailable, metadata)
            .with_request_id(request_id)
            .with_raw_message(raw),
        500..=599 => ActError::new(ActErrorKind::InternalServer, metadata)
            .with_request_id(request_id)
            .with_raw_message(raw),
        _ => ActError::new(ActErrorKind::Protocol, metadata)
            .with_message("Unhandled NovaActService error")
            .with_request_id(request_id)
            .with_raw_message(raw),
    }
}

/// Backends that report symbolic codes instead of HTTP statuses.
fn classify_string_code(code: &str, error: &Value, metadata: ActMetadata) -> ActError {
    let message = str_field(error, "message").unwrap_or_default();
    match code {
        "INVALID_INPUT" => ActError::new(ActErrorKind::InvalidInput, metadata).with_message(message),
        "INTERNAL_ERROR" => {
            ActError::new(ActErrorKind::InternalServer, metadata).with_message(message)
        }
        "UNAUTHORIZED_ERROR" => ActError::new(ActErrorKind::NotAuthorized, metadata).with_message(
            "Access denied. To request access, email nova-act@amazon.com with your use case.",
        ),
        "MODEL_ERROR" => ActError::new(ActErrorKind::Model, metadata).with_message(message),
        "GUARDRAILS_ERROR" => {
            ActError::new(ActErrorKind::Guardrails, metadata).with_message(message)
        }
        "TOO_MANY_REQUESTS" => {
            ActError::new(ActErrorKind::RateLimit(ThrottleKind::ShortWindow), metadata)
                .with_raw_message(message)
        }
        "DAILY_QUOTA_LIMIT_ERROR" => {
            ActError::new(ActErrorKind::RateLimit(ThrottleKind::DailyQuota), metadata)
                .with_raw_message(message)
        }
        other => ActError::new(ActErrorKind::Protocol, metadata)
            .with_message(format!("invalid NovaActService error code: {other}")),
    }
}

fn classify_client_error(error: &Value, metadata: ActMetadata) -> ActError {
    let request_id = request_id(error);
    let code = str_field(error, "code").and_then(ClientErrorCode::parse);

    match code {
        Some(ClientErrorCode::BadResponse) => ActError::new(ActErrorKind::BadResponse, metadata)
            .with_message(str_field(error, "message").unwrap_or_default())
            .with_request_id(request_id)
            .with_raw_message(error.to_string()),
        Some(ClientErrorCode::MaxStepsExceeded) => {
            ActError::new(ActErrorKind::ExceededMaxSteps, metadata)
        }
        Some(ClientErrorCode::ActuationError) => ActError::new(ActErrorKind::Actuation, metadata)
            .with_message(str_field(error, "message").unwrap_or_default()),
        None => ActError::new(ActErrorKind::Protocol, metadata)
            .with_message("invalid NovaActClient error code")
            .with_request_id(request_id)
            .with_raw_message(error.to_string()),
    }
}

/// Turn a finished act into the caller-facing result.
pub fn resolve_outcome(act: &Act, backend: &BackendInfo) -> Result<ActResult, ActError> {
    let metadata = act.metadata();
    match act.result() {
        None => Err(ActError::new(ActErrorKind::Client, metadata)
            .with_message("No act result received")),
        Some(ActOutcome::Canceled) if act.did_timeout() => {
            Err(ActError::new(ActErrorKind::Timeout, metadata))
        }
        Some(ActOutcome::Canceled) => Err(ActError::new(ActErrorKind::Canceled, metadata)),
        Some(ActOutcome::Failed { payload }) => {
            Err(classify_failure(payload, act.did_timeout(), metadata, backend))
        }
        Some(ActOutcome::Succeeded { response }) => {
            Ok(ActResult::new(Some(response.clone()), metadata))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::backend::Backend;

    fn metadata() -> ActMetadata {
        ActMetadata {
            session_id: "s".to_string(),
            act_id: "a".to_string(),
            num_steps_executed: 1,
            start_time: None,
            end_time: None,
            prompt: "p".to_string(),
            step_server_times_s: vec![],
        }
    }

    fn classify(payload: Value) -> ActError {
        classify_failure(&payload, false, metadata(), &Backend::Prod.info())
    }

    /// Extension completion payloads wrap the failure as a JSON string.
    fn extension_error(inner: Value) -> Value {
        json!({"type": "error", "error": inner.to_string()})
    }

    #[test]
    fn test_timeout_wins_over_payload() {
        let err = classify_failure(
            &json!({"error": "Canceled.", "subErrorCode": AGENT_ERROR}),
            true,
            metadata(),
            &Backend::Prod.info(),
        );
        assert_eq!(err.kind(), ActErrorKind::Timeout);
    }

    #[test]
    fn test_canceled_before_agent_error() {
        let err = classify(json!({"error": "Canceled.", "subErrorCode": AGENT_ERROR}));
        assert_eq!(err.kind(), ActErrorKind::Canceled);
    }

    #[test]
    fn test_agent_error_carries_message() {
        let err = classify(json!({
            "type": NOVA_ACT_SERVICE,
            "subErrorCode": AGENT_ERROR,
            "error": "The item is out of stock"
        }));
        assert_eq!(err.kind(), ActErrorKind::Agent);
        assert_eq!(err.message(), "The item is out of stock");
    }

    #[test]
    fn test_guardrails_from_extension_payload() {
        let inner = json!({
            "type": NOVA_ACT_SERVICE,
            "code": 400,
            "requestId": "r-1",
            "message": json!({"reason": "AGENT_GUARDRAILS_TRIGGERED", "fields": [{"message": "nope"}]}).to_string()
        });
        let err = classify(extension_error(inner));
        assert_eq!(err.kind(), ActErrorKind::Guardrails);
        assert_eq!(err.message(), "nope");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_model_error_from_step_endpoint_shape() {
        let err = classify(json!({
            "type": NOVA_ACT_SERVICE,
            "code": 400,
            "message": json!({"reason": "MODEL_ERROR", "message": [{"message": "bad plan"}]}).to_string()
        }));
        assert_eq!(err.kind(), ActErrorKind::Model);
        assert_eq!(err.message(), "bad plan");
    }

    #[test]
    fn test_400_without_json_message_is_bad_request() {
        let err = classify(json!({"type": NOVA_ACT_SERVICE, "code": 400, "message": "oops"}));
        assert_eq!(err.kind(), ActErrorKind::BadRequest);
        assert!(err.kind().is_protocol());
    }

    #[test]
    fn test_403_is_auth() {
        let err = classify(json!({"type": NOVA_ACT_SERVICE, "code": 403, "requestId": "r-9"}));
        assert_eq!(err.kind(), ActErrorKind::Auth);
        assert!(!err.is_retryable());
        assert!(err.message().contains("r-9"));
    }

    #[test]
    fn test_429_variants() {
        let daily = classify(json!({
            "type": NOVA_ACT_SERVICE,
            "code": 429,
            "message": json!({"throttleType": "DAILY_QUOTA_LIMIT_EXCEEDED"}).to_string()
        }));
        assert_eq!(daily.kind(), ActErrorKind::RateLimit(ThrottleKind::DailyQuota));
        assert!(!daily.is_retryable());

        let short = classify(json!({
            "type": NOVA_ACT_SERVICE,
            "code": 429,
            "message": json!({"throttleType": "RATE_LIMIT_EXCEEDED"}).to_string()
        }));
        assert_eq!(short.kind(), ActErrorKind::RateLimit(ThrottleKind::ShortWindow));
        assert!(short.is_retryable());

        let unknown = classify(json!({"type": NOVA_ACT_SERVICE, "code": 429}));
        assert_eq!(unknown.kind(), ActErrorKind::RateLimit(ThrottleKind::Unspecified));
    }

    #[test]
    fn test_status_code_ranges() {
        let cases = [
            (404, ActErrorKind::BadRequest),
            (503, ActErrorKind::ServiceUnavailable),
            (500, ActErrorKind::InternalServer),
            (599, ActErrorKind::InternalServer),
            (302, ActErrorKind::Protocol),
        ];
        for (code, kind) in cases {
            let err = classify(json!({"type": NOVA_ACT_SERVICE, "code": code}));
            assert_eq!(err.kind(), kind, "code {code}");
        }
    }

    #[test]
    fn test_invalid_service_code() {
        for code in [json!(-1), json!(null), json!(1.5)] {
            let err = classify(json!({"type": NOVA_ACT_SERVICE, "code": code}));
            assert_eq!(err.kind(), ActErrorKind::Protocol);
            assert_eq!(err.message(), "invalid error code in Server Response");
        }
    }

    #[test]
    fn test_string_codes() {
        let cases = [
            ("INVALID_INPUT", ActErrorKind::InvalidInput),
            ("MODEL_ERROR", ActErrorKind::Model),
            ("INTERNAL_ERROR", ActErrorKind::InternalServer),
            ("GUARDRAILS_ERROR", ActErrorKind::Guardrails),
            ("UNAUTHORIZED_ERROR", ActErrorKind::NotAuthorized),
            ("TOO_MANY_REQUESTS", ActErrorKind::RateLimit(ThrottleKind::ShortWindow)),
            ("DAILY_QUOTA_LIMIT_ERROR", ActErrorKind::RateLimit(ThrottleKind::DailyQuota)),
            ("SOMETHING_ELSE", ActErrorKind::Protocol),
        ];
        for (code, kind) in cases {
            let err = classify(json!({"type": NOVA_ACT_SERVICE, "code": code, "message": "m"}));
            assert_eq!(err.kind(), kind, "code {code}");
        }
    }

    #[test]
    fn test_client_codes() {
        let err = classify(client_failure(ClientErrorCode::MaxStepsExceeded, None));
        assert_eq!(err.kind(), ActErrorKind::ExceededMaxSteps);

        let err = classify(client_failure(ClientErrorCode::BadResponse, Some("garbled")));
        assert_eq!(err.kind(), ActErrorKind::BadResponse);
        assert!(err.kind().is_protocol());

        let err = classify(client_failure(ClientErrorCode::ActuationError, Some("detached")));
        assert_eq!(err.kind(), ActErrorKind::Actuation);
        assert_eq!(err.message(), "detached");

        let err = classify(json!({"type": NOVA_ACT_CLIENT, "code": "NOPE"}));
        assert_eq!(err.kind(), ActErrorKind::Protocol);
    }

    #[test]
    fn test_unrecognised_payloads_are_protocol_errors() {
        let err = classify(json!({"type": "error", "error": "not json"}));
        assert_eq!(err.kind(), ActErrorKind::Protocol);
        assert_eq!(err.raw_message(), Some("\"not json\""));

        let err = classify(json!({"something": "else"}));
        assert_eq!(err.kind(), ActErrorKind::Protocol);
        assert_eq!(err.message(), "missing type in error message");

        let err = classify(extension_error(json!({"type": "Mystery", "requestId": "r-3"})));
        assert_eq!(err.kind(), ActErrorKind::Protocol);
        assert_eq!(err.failed_request_id(), Some("r-3"));

        let err = classify(extension_error(json!({"code": 500})));
        assert_eq!(err.message(), "missing type in error message");
    }
}
