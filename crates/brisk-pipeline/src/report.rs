//! Shared error reporting for transform steps.

use std::io::Write;

use crate::step::{StepError, StepKind};

/// Receives the error of every failed step.
///
/// One reporter is shared by all steps of a build graph.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &StepError, step: StepKind);
}

/// Logs step errors and optionally rings the terminal bell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    beep: bool,
}

impl ConsoleReporter {
    pub fn new(beep: bool) -> Self {
        Self { beep }
    }
}

impl ErrorReporter for ConsoleReporter {
    fn report(&self, error: &StepError, step: StepKind) {
        tracing::error!("[{}] {}", step, error);

        if self.beep {
            let mut stderr = std::io::stderr();
            let _ = stderr.write_all(b"\x07");
            let _ = stderr.flush();
        }
    }
}
