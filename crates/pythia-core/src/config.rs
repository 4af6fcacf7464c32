//! Analysis configuration: widening budgets, re-analysis counters,
//! timeouts, and search paths.
//!
//! The defaults here are the "standard library" limits: they keep value
//! sets small enough to answer editor queries quickly while bounding the
//! fixpoint loop. Every limit is overridable per session.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::version::PythonVersion;

// ============================================================================
// Limits
// ============================================================================

/// Cardinality and iteration budgets enforced by the value lattice and
/// the dependency queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisLimits {
    /// Maximum size of a value set produced by an ordinary assignment
    /// before widening kicks in.
    pub assignment_set_limit: usize,
    /// Maximum size of a `self.X` attribute's value set.
    pub instance_member_set_limit: usize,
    /// Maximum size of a value set crossing a module boundary.
    pub cross_module_set_limit: usize,
    /// Initial call-context depth for the Cartesian product algorithm.
    /// Decreases with call-chain depth; at zero, all calls share state.
    pub call_context_depth: usize,
    /// Re-analyses of a unit before its outputs are force-widened.
    pub unit_reanalysis_limit: u32,
    /// Re-analyses of a module top-level unit before force-widening.
    pub module_reanalysis_limit: u32,
    /// Statement count above which a unit checks cancellation between
    /// top-level statements.
    pub large_unit_statement_threshold: usize,
    /// Wall-clock budget for a single unit evaluation.
    pub unit_timeout: Duration,
    /// Overall budget for one analysis run; `None` means unbounded.
    /// When it expires, pending work is dropped and the lattice keeps
    /// its last consistent state.
    pub session_timeout: Option<Duration>,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            assignment_set_limit: 10,
            instance_member_set_limit: 50,
            cross_module_set_limit: 100,
            call_context_depth: 3,
            unit_reanalysis_limit: 4,
            module_reanalysis_limit: 16,
            large_unit_statement_threshold: 1000,
            unit_timeout: Duration::from_secs(5),
            session_timeout: None,
        }
    }
}

// ============================================================================
// Session configuration
// ============================================================================

/// Per-session configuration for an analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Language version to analyze as.
    pub version: PythonVersion,
    /// Ordered module search paths; resolution takes the first hit.
    pub search_paths: Vec<PathBuf>,
    /// Standard-library roots, searched after `search_paths`.
    pub stdlib_paths: Vec<PathBuf>,
    /// Directories containing module-summary (stub) files.
    pub stub_paths: Vec<PathBuf>,
    /// Widening and iteration budgets.
    pub limits: AnalysisLimits,
}

impl AnalysisConfig {
    /// A configuration for the given version with no search paths.
    pub fn for_version(version: PythonVersion) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    /// Append a search path.
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_documented_budgets() {
        let limits = AnalysisLimits::default();
        assert_eq!(limits.assignment_set_limit, 10);
        assert_eq!(limits.instance_member_set_limit, 50);
        assert_eq!(limits.cross_module_set_limit, 100);
        assert_eq!(limits.call_context_depth, 3);
        assert_eq!(limits.unit_reanalysis_limit, 4);
        assert_eq!(limits.unit_timeout, Duration::from_secs(5));
    }

    #[test]
    fn config_builder() {
        let config =
            AnalysisConfig::for_version(PythonVersion::V2_7).with_search_path("/work/project");
        assert_eq!(config.version, PythonVersion::V2_7);
        assert_eq!(config.search_paths, vec![PathBuf::from("/work/project")]);
    }
}
