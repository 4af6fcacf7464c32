//! Core infrastructure shared across the pythia workspace.
//!
//! This crate holds the pieces every other crate needs and none owns:
//!
//! - [`span`]: byte spans, line/column positions, and the line index that
//!   converts between them
//! - [`diagnostics`]: the diagnostic record (severity, code, span, message)
//!   emitted by the parser and the analyzer
//! - [`cancel`]: the cooperative cancellation token checked at unit
//!   boundaries
//! - [`version`]: the language-version selector (2.6 through 3.7) with
//!   capability predicates
//! - [`config`]: analysis limits (widening budgets, re-analysis counters,
//!   timeouts) and session configuration

pub mod cancel;
pub mod config;
pub mod diagnostics;
pub mod span;
pub mod version;

pub use cancel::{CancellationToken, Cancelled};
pub use config::{AnalysisConfig, AnalysisLimits};
pub use diagnostics::{Diagnostic, DiagnosticCode, Severity};
pub use span::{LineIndex, Position, SourceRange, Span};
pub use version::PythonVersion;
