//! JSON-schema constrained responses.

use crate::validation::ValidationError;
use jsonschema::{Draft, JSONSchema};
use nova_act_core::ActResult;
use serde_json::Value;

/// Compile as a draft 7 JSON schema; a schema that does not compile is a
/// validation error.
pub fn compile_schema(schema: &Value) -> Result<JSONSchema, ValidationError> {
    JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
        .map_err(|e| ValidationError::Schema(e.to_string()))
}

/// Ask the planner to answer in the shape of `schema`.
pub fn add_schema_to_prompt(prompt: &str, schema: &Value) -> String {
    format!("{prompt}, format output with jsonschema: {schema}")
}

/// Fill `parsed_response`, `valid_json` and `matches_schema` from the text
/// response.
pub fn populate_json_schema_response(mut result: ActResult, schema: &JSONSchema) -> ActResult {
    result.parsed_response = None;
    result.valid_json = Some(false);
    result.matches_schema = Some(false);

    let Some(response) = result.response.as_deref().filter(|r| !r.is_empty()) else {
        return result;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(response) else {
        return result;
    };

    result.valid_json = Some(true);
    result.matches_schema = Some(schema.is_valid(&parsed));
    result.parsed_response = Some(parsed);
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use nova_act_core::ActMetadata;
    use serde_json::json;

    fn result(response: Option<&str>) -> ActResult {
        ActResult::new(response.map(str::to_string), ActMetadata::for_session("session-1"))
    }

    fn price_schema() -> JSONSchema {
        compile_schema(&json!({
            "type": "object",
            "properties": {"price": {"type": "number"}},
            "required": ["price"],
        }))
        .unwrap()
    }

    #[test]
    fn test_schema_must_compile() {
        assert!(compile_schema(&json!({"type": "object"})).is_ok());
        assert!(matches!(
            compile_schema(&json!({"type": "not-a-type"})),
            Err(ValidationError::Schema(_))
        ));
    }

    #[test]
    fn test_prompt_suffix() {
        assert_eq!(
            add_schema_to_prompt("is it sunny", &json!({"type": "boolean"})),
            "is it sunny, format output with jsonschema: {\"type\":\"boolean\"}"
        );
    }

    #[test]
    fn test_matching_response() {
        let result = populate_json_schema_response(result(Some("{\"price\": 12.5}")), &price_schema());
        assert_eq!(result.valid_json, Some(true));
        assert_eq!(result.matches_schema, Some(true));
        assert_eq!(result.parsed_response, Some(json!({"price": 12.5})));
    }

    #[test]
    fn test_json_that_misses_the_schema() {
        let result = populate_json_schema_response(result(Some("{\"cost\": 3}")), &price_schema());
        assert_eq!(result.valid_json, Some(true));
        assert_eq!(result.matches_schema, Some(false));
        assert_eq!(result.parsed_response, Some(json!({"cost": 3})));
    }

    #[test]
    fn test_non_json_and_empty_responses() {
        for response in [None, Some(""), Some("twelve dollars")] {
            let result = populate_json_schema_response(result(response), &price_schema());
            assert_eq!(result.valid_json, Some(false));
            assert_eq!(result.matches_schema, Some(false));
            assert_eq!(result.parsed_response, None);
        }
    }

    #[test]
    fn test_bool_answers() {
        let schema = compile_schema(&json!({"type": "boolean"})).unwrap();
        let result = populate_json_schema_response(result(Some("true")), &schema);
        assert_eq!(result.parsed_response, Some(json!(true)));
        assert_eq!(result.matches_schema, Some(true));
    }
}
