//! Successful outcome of an act.

use crate::metadata::ActMetadata;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct ActResult {
    pub metadata: ActMetadata,
    pub response: Option<String>,
    pub parsed_response: Option<Value>,
    pub valid_json: Option<bool>,
    pub matches_schema: Option<bool>,
}

impl ActResult {
    pub fn new(response: Option<String>, metadata: ActMetadata) -> Self {
        Self {
            metadata,
            response,
            parsed_response: None,
            valid_json: None,
            matches_schema: None,
        }
    }
}

fn show<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map_or_else(|| "None".to_string(), ToString::to_string)
}

impl fmt::Display for ActResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ActResult(")?;
        writeln!(f, "    response = {}", show(&self.response))?;
        writeln!(f, "    parsed_response = {}", show(&self.parsed_response))?;
        writeln!(f, "    valid_json = {}", show(&self.valid_json))?;
        writeln!(f, "    matches_schema = {}", show(&self.matches_schema))?;
        let metadata = self.metadata.to_string().replace('\n', "\n    ");
        writeln!(f, "    metadata = {metadata}")?;
        write!(f, ")")
    }
}
