//! Transient state for one wait-for-page-to-settle request.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    pub session_id: String,
    pub is_settled: bool,
}

impl PageState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            is_settled: false,
        }
    }

    pub fn settle(&mut self) {
        self.is_settled = true;
    }
}
