//! Read-only view of an act, attached to every result and error.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActMetadata {
    pub session_id: String,
    pub act_id: String,
    pub num_steps_executed: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub prompt: String,
    pub step_server_times_s: Vec<f64>,
}

impl ActMetadata {
    /// Metadata for failures that happen outside any act, e.g. while settling a page.
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            act_id: String::new(),
            num_steps_executed: 0,
            start_time: None,
            end_time: None,
            prompt: String::new(),
            step_server_times_s: Vec::new(),
        }
    }
}

fn local_time(time: Option<DateTime<Utc>>) -> String {
    match time {
        Some(time) => time
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S%.6f %Z")
            .to_string(),
        None => "None".to_string(),
    }
}

impl fmt::Display for ActMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ActMetadata(")?;
        writeln!(f, "    session_id = {}", self.session_id)?;
        writeln!(f, "    act_id = {}", self.act_id)?;
        writeln!(f, "    num_steps_executed = {}", self.num_steps_executed)?;
        writeln!(f, "    start_time = {}", local_time(self.start_time))?;
        writeln!(f, "    end_time = {}", local_time(self.end_time))?;
        if self.step_server_times_s.iter().any(|t| *t != 0.0) {
            let times: Vec<String> = self
                .step_server_times_s
                .iter()
                .map(|t| format!("'{t:.3}'"))
                .collect();
            writeln!(f, "    step_server_times_s = [{}]", times.join(", "))?;
        }
        writeln!(f, "    prompt = '{}'", self.prompt)?;
        write!(f, ")")
    }
}
