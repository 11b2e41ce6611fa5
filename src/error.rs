use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the bridge core and its adapters
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BridgeError {
    /// An adapter or collaborator is unreachable
    #[error("{target} unreachable: {reason}")]
    Connectivity { target: String, reason: String },

    /// An inbound event failed minimal shape validation
    #[error("malformed update: {0}")]
    MalformedUpdate(String),

    /// Ingestion queue is at capacity (or closed for shutdown)
    #[error("ingestion queue full (capacity {capacity})")]
    Overflow { capacity: usize },

    /// Simulation collaborator did not answer within its deadline
    #[error("simulation collaborator timed out after {timeout_ms}ms during {operation}")]
    CollaboratorTimeout { operation: String, timeout_ms: u64 },

    /// Simulation collaborator answered with a failure
    #[error("simulation collaborator failed: {0}")]
    Collaborator(String),

    #[error("unknown command kind '{0}'")]
    UnknownCommand(String),

    /// Operation not valid in the current scheduler state
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
}

impl BridgeError {
    pub fn connectivity(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        BridgeError::Connectivity {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(reason: impl fmt::Display) -> Self {
        BridgeError::MalformedUpdate(reason.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Connectivity { .. } => ErrorKind::Connectivity,
            BridgeError::MalformedUpdate(_) => ErrorKind::MalformedUpdate,
            BridgeError::Overflow { .. } => ErrorKind::Overflow,
            BridgeError::CollaboratorTimeout { .. } => ErrorKind::CollaboratorTimeout,
            BridgeError::Collaborator(_) => ErrorKind::Collaborator,
            BridgeError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            BridgeError::Lifecycle(_) => ErrorKind::Lifecycle,
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

/// Error categories counted by the [`ErrorReporter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    MalformedUpdate,
    Overflow,
    CollaboratorTimeout,
    Collaborator,
    UnknownCommand,
    Lifecycle,
    /// Panic or unexpected failure caught inside a tick
    TickFault,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Connectivity,
        ErrorKind::MalformedUpdate,
        ErrorKind::Overflow,
        ErrorKind::CollaboratorTimeout,
        ErrorKind::Collaborator,
        ErrorKind::UnknownCommand,
        ErrorKind::Lifecycle,
        ErrorKind::TickFault,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Per-kind error counts at a point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorCounts(pub BTreeMap<ErrorKind, u64>);

impl ErrorCounts {
    pub fn get(&self, kind: ErrorKind) -> u64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Single reporting channel for every error in the ingestion/fan-out path.
///
/// Reports are logged through `tracing` and counted per kind, so status
/// queries and tests can assert on counts instead of log text.
pub struct ErrorReporter {
    counters: [AtomicU64; 8],
    last_message: Mutex<BTreeMap<ErrorKind, String>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            last_message: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record a typed error
    pub fn report(&self, err: &BridgeError) {
        let kind = err.kind();
        match kind {
            ErrorKind::Overflow | ErrorKind::MalformedUpdate | ErrorKind::CollaboratorTimeout => {
                warn!(kind = ?kind, error = %err, "Bridge error reported");
            }
            _ => error!(kind = ?kind, error = %err, "Bridge error reported"),
        }
        self.record(kind, err.to_string());
    }

    /// Record a fault that has no typed representation (caught panic)
    pub fn report_fault(&self, message: impl Into<String>) {
        let message = message.into();
        error!(error = %message, "Tick fault");
        self.record(ErrorKind::TickFault, message);
    }

    fn record(&self, kind: ErrorKind, message: String) {
        self.counters[kind.index()].fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last.insert(kind, message);
    }

    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counters[kind.index()].load(Ordering::Relaxed)
    }

    pub fn counts(&self) -> ErrorCounts {
        ErrorCounts(
            ErrorKind::ALL
                .iter()
                .map(|&kind| (kind, self.count(kind)))
                .filter(|(_, n)| *n > 0)
                .collect(),
        )
    }

    pub fn last_message(&self, kind: ErrorKind) -> Option<String> {
        self.last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .cloned()
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_per_kind() {
        let reporter = ErrorReporter::new();

        reporter.report(&BridgeError::Overflow { capacity: 3 });
        reporter.report(&BridgeError::Overflow { capacity: 3 });
        reporter.report(&BridgeError::malformed("missing agent id"));

        assert_eq!(reporter.count(ErrorKind::Overflow), 2);
        assert_eq!(reporter.count(ErrorKind::MalformedUpdate), 1);
        assert_eq!(reporter.count(ErrorKind::Connectivity), 0);

        let counts = reporter.counts();
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.0.len(), 2);
    }

    #[test]
    fn test_last_message_kept() {
        let reporter = ErrorReporter::new();
        reporter.report(&BridgeError::UnknownCommand("warp".to_string()));

        assert_eq!(
            reporter.last_message(ErrorKind::UnknownCommand).unwrap(),
            "unknown command kind 'warp'"
        );
        assert!(reporter.last_message(ErrorKind::Overflow).is_none());
    }

    #[test]
    fn test_fault_counted() {
        let reporter = ErrorReporter::new();
        reporter.report_fault("tick panicked");
        assert_eq!(reporter.count(ErrorKind::TickFault), 1);
    }

    #[test]
    fn test_kind_mapping() {
        let err = BridgeError::connectivity("nats", "connection refused");
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert_eq!(err.to_string(), "nats unreachable: connection refused");

        let err = BridgeError::CollaboratorTimeout {
            operation: "advance".to_string(),
            timeout_ms: 50,
        };
        assert_eq!(err.kind(), ErrorKind::CollaboratorTimeout);
    }
}
