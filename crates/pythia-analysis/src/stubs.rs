//! Module-summary (stub) loading.
//!
//! Summaries are precomputed descriptions of compiled or external
//! modules, produced by an external scraping tool. Each summary lists the
//! module's top-level names with kinds, documentation, and signatures.
//! The loader parses summary files and caches them keyed by interpreter
//! version plus content hash, so unchanged summaries are reused across
//! analysis sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use pythia_core::version::PythonVersion;

// ============================================================================
// Summary format
// ============================================================================

/// The kind of a summarized top-level name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Class,
    Function,
    Constant,
    Module,
}

/// One parameter record of a summarized function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryParam {
    pub name: String,
    /// `positional`, `star`, or `double-star`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Source text of the default value, when present.
    #[serde(default)]
    pub default: Option<String>,
    /// Annotation description, when present.
    #[serde(default)]
    pub annotation: Option<String>,
}

/// A summarized callable signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummarySignature {
    #[serde(default)]
    pub parameters: Vec<SummaryParam>,
    /// Return-type description (`"int"`, `"list[str]"`).
    #[serde(default)]
    pub returns: Option<String>,
}

/// One top-level name of a summarized module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMember {
    pub name: String,
    pub kind: SummaryKind,
    #[serde(default)]
    pub doc: Option<String>,
    /// For functions and methods.
    #[serde(default)]
    pub signature: Option<SummarySignature>,
    /// For classes: base-class names.
    #[serde(default)]
    pub bases: Vec<String>,
    /// For classes: method records.
    #[serde(default)]
    pub methods: Vec<SummaryMember>,
    /// For constants: the value's type name.
    #[serde(default)]
    pub type_name: Option<String>,
}

/// A whole module summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub members: Vec<SummaryMember>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading summaries. These are surfaced to the
/// caller; a missing summary during import resolution is handled there
/// as an unresolved import instead.
#[derive(Debug, Error)]
pub enum StubError {
    #[error("failed to read summary {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse summary {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result alias for stub operations.
pub type StubResult<T> = Result<T, StubError>;

// ============================================================================
// Loader
// ============================================================================

/// Parses and caches module summaries.
#[derive(Debug, Default)]
pub struct StubLoader {
    /// (version, content-hash) → parsed summary.
    cache: HashMap<(PythonVersion, String), Arc<ModuleSummary>>,
    hits: u64,
    misses: u64,
}

impl StubLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a summary file, reusing the cached parse when the content
    /// hash matches a previous load at the same interpreter version.
    pub fn load_file(
        &mut self,
        path: &Path,
        version: PythonVersion,
    ) -> StubResult<Arc<ModuleSummary>> {
        let bytes = std::fs::read(path).map_err(|source| StubError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let digest = hex::encode(Sha256::digest(&bytes));
        if let Some(summary) = self.cache.get(&(version, digest.clone())) {
            self.hits += 1;
            return Ok(summary.clone());
        }
        self.misses += 1;
        let summary: ModuleSummary =
            serde_json::from_slice(&bytes).map_err(|source| StubError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let summary = Arc::new(summary);
        self.cache.insert((version, digest), summary.clone());
        Ok(summary)
    }

    /// Cache statistics `(hits, misses)`.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

/// The summary file name for a module (`math` → `math.json`).
pub fn summary_file_name(module_name: &str) -> String {
    format!("{module_name}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
            "name": "math",
            "doc": "Mathematical functions.",
            "members": [
                {"name": "pi", "kind": "constant", "type_name": "float"},
                {
                    "name": "sqrt",
                    "kind": "function",
                    "doc": "Return the square root of x.",
                    "signature": {
                        "parameters": [{"name": "x"}],
                        "returns": "float"
                    }
                },
                {
                    "name": "SomeClass",
                    "kind": "class",
                    "bases": ["object"],
                    "methods": [
                        {"name": "method", "kind": "function",
                         "signature": {"parameters": [{"name": "self"}], "returns": "int"}}
                    ]
                }
            ]
        }"#
    }

    #[test]
    fn parses_summary_format() {
        let summary: ModuleSummary = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(summary.name, "math");
        assert_eq!(summary.members.len(), 3);
        assert_eq!(summary.members[0].kind, SummaryKind::Constant);
        assert_eq!(summary.members[1].signature.as_ref().unwrap().returns.as_deref(), Some("float"));
        assert_eq!(summary.members[2].methods.len(), 1);
    }

    #[test]
    fn cache_reuses_identical_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("math.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(sample_json().as_bytes())
            .unwrap();

        let mut loader = StubLoader::new();
        let first = loader.load_file(&path, PythonVersion::V3_7).unwrap();
        let second = loader.load_file(&path, PythonVersion::V3_7).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.stats(), (1, 1));

        // A different interpreter version is a separate cache entry.
        loader.load_file(&path, PythonVersion::V2_7).unwrap();
        assert_eq!(loader.stats(), (1, 2));
    }

    #[test]
    fn io_error_carries_path() {
        let mut loader = StubLoader::new();
        let err = loader
            .load_file(Path::new("/nonexistent/math.json"), PythonVersion::V3_7)
            .unwrap_err();
        assert!(matches!(err, StubError::Io { .. }));
    }

    #[test]
    fn parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{not json").unwrap();
        let mut loader = StubLoader::new();
        let err = loader.load_file(&path, PythonVersion::V3_7).unwrap_err();
        assert!(matches!(err, StubError::Parse { .. }));
    }
}
