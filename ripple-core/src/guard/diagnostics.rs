//! Diagnostic sinks for the guard rail.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{GuardedOperation, Mode};
use crate::reactive::Runtime;

/// What the guard rail did with an intercepted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The operation ran normally.
    Proceeded,

    /// The operation was dropped.
    Discarded,

    /// The operation was replaced with a no-op.
    Replaced,
}

/// A report of an operation intercepted by the guard rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    /// The intercepted operation.
    pub operation: GuardedOperation,

    /// The mode that was active.
    pub mode: Mode,

    /// What happened to the operation.
    pub outcome: Outcome,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operation = match self.operation {
            GuardedOperation::Create => "creating a cell",
            GuardedOperation::Clone => "forking a cell",
            GuardedOperation::Write => "writing a cell",
            GuardedOperation::Subscribe => "subscribing to a cell",
        };
        let mode = match self.mode {
            Mode::Untracked => "untracked code",
            Mode::TrackedRead => "a tracked read",
            Mode::MemoizedRead => "a derived cell's getter",
            Mode::Effect => "an effect",
        };
        let outcome = match self.outcome {
            Outcome::Proceeded => "this leaks on every re-evaluation",
            Outcome::Discarded => "the write was discarded",
            Outcome::Replaced => "the subscription was replaced with a no-op",
        };
        write!(f, "{operation} inside {mode}: {outcome}")
    }
}

/// Receives guard-rail diagnostics instead of having them thrown.
pub trait DiagnosticSink: Send + Sync {
    /// Handle one diagnostic.
    fn report(&self, diagnostic: &Diagnostic);
}

/// Discards every diagnostic. The default in release builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn report(&self, _diagnostic: &Diagnostic) {}
}

/// Emits each diagnostic as a `tracing` warning. The default in debug builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        tracing::warn!(
            operation = ?diagnostic.operation,
            mode = ?diagnostic.mode,
            outcome = ?diagnostic.outcome,
            "{diagnostic}"
        );
    }
}

/// Collects diagnostics in memory, for host test suites.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of everything recorded so far.
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records.lock().clone()
    }

    /// Remove and return everything recorded so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.records.lock())
    }

    /// Get the number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.records.lock().push(*diagnostic);
    }
}

/// Install the sink that receives the current thread's diagnostics.
///
/// Returns the previously installed sink.
pub fn set_diagnostic_sink(sink: Arc<dyn DiagnosticSink>) -> Arc<dyn DiagnosticSink> {
    Runtime::with(|rt| rt.replace_sink(sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_collects_in_order() {
        let sink = RecordingSink::new();
        let first = Diagnostic {
            operation: GuardedOperation::Create,
            mode: Mode::Effect,
            outcome: Outcome::Proceeded,
        };
        let second = Diagnostic {
            operation: GuardedOperation::Write,
            mode: Mode::MemoizedRead,
            outcome: Outcome::Discarded,
        };

        sink.report(&first);
        sink.report(&second);

        assert_eq!(sink.records(), vec![first, second]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn diagnostic_display_names_operation_and_mode() {
        let diagnostic = Diagnostic {
            operation: GuardedOperation::Subscribe,
            mode: Mode::TrackedRead,
            outcome: Outcome::Replaced,
        };

        assert_eq!(
            diagnostic.to_string(),
            "subscribing to a cell inside a tracked read: \
             the subscription was replaced with a no-op"
        );
    }
}
