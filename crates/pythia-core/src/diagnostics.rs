//! Diagnostic records emitted by the parser and the analyzer.
//!
//! A diagnostic is a `(severity, code, span, message)` tuple attached to a
//! module. Almost every error condition in the engine degrades to a
//! diagnostic plus an empty or widened value set; only cancellation and
//! I/O failures surface as Rust errors.

use serde::{Deserialize, Serialize};

use crate::span::Span;

// ============================================================================
// Severity
// ============================================================================

/// Diagnostic severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A condition that prevents the engine from producing a result for the
    /// affected span (syntax error, unresolvable import).
    Error,
    /// A suspicious condition analysis can proceed past.
    Warning,
    /// Informational notes (style, redundancy).
    Information,
}

impl Severity {
    /// The string form used in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "information",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Diagnostic codes
// ============================================================================

/// Stable codes identifying each diagnostic the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    /// The source failed to tokenize or parse at this span.
    ParseError,
    /// A name was read before any write to it was seen.
    UsedBeforeAssignment,
    /// A name could not be resolved in any enclosing scope.
    UndefinedVariable,
    /// A call target's value set contains nothing callable.
    NotCallable,
    /// An import could not be resolved to a module.
    UnresolvedImport,
    /// A relative import was used from a top-level, non-package module.
    RelativeImportOutsidePackage,
    /// C3 linearization failed over an inconsistent class hierarchy.
    InvalidMro,
    /// A line mixed tabs and spaces in its indentation.
    InconsistentIndentation,
    /// A dedent did not match any open indentation level.
    UnmatchedDedent,
}

impl DiagnosticCode {
    /// The kebab-case code string used in output.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::ParseError => "parse-error",
            DiagnosticCode::UsedBeforeAssignment => "used-before-assignment",
            DiagnosticCode::UndefinedVariable => "undefined-variable",
            DiagnosticCode::NotCallable => "not-callable",
            DiagnosticCode::UnresolvedImport => "unresolved-import",
            DiagnosticCode::RelativeImportOutsidePackage => "relative-import-outside-package",
            DiagnosticCode::InvalidMro => "invalid-mro",
            DiagnosticCode::InconsistentIndentation => "inconsistent-indentation",
            DiagnosticCode::UnmatchedDedent => "unmatched-dedent",
        }
    }

    /// The default severity for this code.
    pub fn default_severity(&self) -> Severity {
        match self {
            DiagnosticCode::ParseError
            | DiagnosticCode::UnresolvedImport
            | DiagnosticCode::RelativeImportOutsidePackage
            | DiagnosticCode::InvalidMro => Severity::Error,
            DiagnosticCode::UsedBeforeAssignment
            | DiagnosticCode::UndefinedVariable
            | DiagnosticCode::NotCallable
            | DiagnosticCode::InconsistentIndentation
            | DiagnosticCode::UnmatchedDedent => Severity::Warning,
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Diagnostic
// ============================================================================

/// A single diagnostic attached to a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity of the condition.
    pub severity: Severity,
    /// Stable code identifying the condition.
    pub code: DiagnosticCode,
    /// Byte span the diagnostic covers.
    pub span: Span,
    /// Human-readable message.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    pub fn new(code: DiagnosticCode, span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            span,
            message: message.into(),
        }
    }

    /// Override the severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] at {}: {}",
            self.severity, self.code, self.span, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_serde() {
        let diag = Diagnostic::new(DiagnosticCode::UnresolvedImport, Span::new(0, 6), "no 'fob'");
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"unresolved-import\""));
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diag);
    }

    #[test]
    fn default_severities() {
        assert_eq!(
            DiagnosticCode::ParseError.default_severity(),
            Severity::Error
        );
        assert_eq!(
            DiagnosticCode::UsedBeforeAssignment.default_severity(),
            Severity::Warning
        );
    }
}
