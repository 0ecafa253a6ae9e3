//! User-facing notices.
//!
//! Validation failures are alerts (with an audible cue); concurrency and
//! transport outcomes are non-blocking notices. Presentation is out of scope:
//! sinks only receive the notice.

use std::sync::{Arc, Mutex};

use collo_allocation::AllocationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Blocking alert with audible cue.
    Alert(String),
    /// The draft was updated elsewhere; local edits were discarded.
    UpdatedElsewhere,
    /// Transport/server failure; local state is unchanged and the action can be retried.
    Retryable(String),
    /// Informational, e.g. two rows were merged.
    Info(String),
}

impl Notice {
    pub fn alert(err: &AllocationError) -> Self {
        Notice::Alert(err.to_string())
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, Notice::Alert(_))
    }
}

pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

impl<S> NoticeSink for Arc<S>
where
    S: NoticeSink + ?Sized,
{
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}

/// Keeps every notice in memory (tests, headless clients).
#[derive(Debug, Default)]
pub struct RecordingNoticeSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}
