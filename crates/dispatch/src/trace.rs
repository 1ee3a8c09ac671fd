//! Human-readable agent trace, kept apart from diagnostic logs.

use std::io::Write;
use tracing::info;

/// `tracing` target of the agent trace. Filter on it to show or hide the
/// per-step program echo independently of the rest.
pub const TRACE_TARGET: &str = "nova_act::trace";

/// Session-scoped trace writer, passed down to every dispatcher of a session.
#[derive(Debug, Clone, Default)]
pub struct TraceContext {
    session_id: String,
    quiet: bool,
}

impl TraceContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            quiet: false,
        }
    }

    /// Quiet sessions skip the progress dots.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// First four characters of the session id, e.g. `"3f2a> "`.
    pub fn prefix(&self) -> String {
        let short: String = self.session_id.chars().take(4).collect();
        format!("{short}> ")
    }

    pub fn line(&self, text: &str) {
        info!(target: TRACE_TARGET, "{}{}", self.prefix(), text);
    }

    /// Continuation lines are marked with `>> `.
    pub fn format_program(&self, program: &str) -> String {
        format!("{}{}", self.prefix(), program.replace('\n', "\n>> "))
    }

    pub fn program(&self, program: &str) {
        if program.is_empty() {
            return;
        }
        info!(target: TRACE_TARGET, "{}", self.format_program(program));
    }

    pub fn scroller(&self, frequency: u32) -> LoadScroller {
        LoadScroller::new(frequency, !self.quiet)
    }
}

/// Prints a dot to stderr every `frequency` ticks while an act is running.
#[derive(Debug)]
pub struct LoadScroller {
    frequency: u32,
    count: u32,
    enabled: bool,
}

impl LoadScroller {
    pub fn new(frequency: u32, enabled: bool) -> Self {
        Self {
            frequency: frequency.max(1),
            count: 0,
            enabled,
        }
    }

    /// Returns whether a dot was printed.
    pub fn tick(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.count += 1;
        if self.count < self.frequency {
            return false;
        }
        self.count = 0;
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, ".");
        let _ = stderr.flush();
        true
    }
}
