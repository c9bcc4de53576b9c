//! Degraded-mode diagnostics

pub mod diagnostics;

pub use diagnostics::{Diagnostic, DiagnosticRecord, DiagnosticReporter, DiagnosticSeverity, InputSource};
