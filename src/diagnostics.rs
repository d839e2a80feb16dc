//! Status, warning, and error notifications raised while rewriting or sorting.
//!
//! The rewrite and sort engines never log directly. They report through a
//! [`DiagnosticSink`] handed in by the caller, so the command handlers can
//! forward everything to `log` while tests collect it in memory.

use std::fmt;

use log::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Status,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Status => "status",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

pub trait DiagnosticSink {
    fn report(&mut self, severity: Severity, message: String);

    fn status(&mut self, message: String) {
        self.report(Severity::Status, message);
    }

    fn warning(&mut self, message: String) {
        self.report(Severity::Warning, message);
    }

    fn error(&mut self, message: String) {
        self.report(Severity::Error, message);
    }
}

/// Forwards diagnostics to the `log` facade; status messages log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, severity: Severity, message: String) {
        match severity {
            Severity::Status => debug!("{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
    }
}

/// Keeps every diagnostic in memory, in the order it was reported.
#[derive(Debug, Default, Clone)]
pub struct CollectedDiagnostics {
    pub entries: Vec<Diagnostic>,
}

impl CollectedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.message.contains(needle))
    }
}

impl DiagnosticSink for CollectedDiagnostics {
    fn report(&mut self, severity: Severity, message: String) {
        self.entries.push(Diagnostic { severity, message });
    }
}
