//! Language-version selector.
//!
//! A per-session [`PythonVersion`] controls the keyword set, grammar
//! branches, and semantic rules (comprehension scoping, `/` division,
//! f-string recognition, async/await keyword status, nonlocal
//! availability, annotation syntax). The predicates here are the single
//! source of truth; the tokenizer, parser, and interpreter all consult
//! them rather than comparing version numbers inline.

use serde::{Deserialize, Serialize};

/// The Python language versions the engine can analyze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PythonVersion {
    /// Python 2.6
    V2_6,
    /// Python 2.7
    V2_7,
    /// Python 3.0
    V3_0,
    /// Python 3.1
    V3_1,
    /// Python 3.2
    V3_2,
    /// Python 3.3
    V3_3,
    /// Python 3.4
    V3_4,
    /// Python 3.5
    V3_5,
    /// Python 3.6
    V3_6,
    /// Python 3.7
    V3_7,
}

impl PythonVersion {
    /// `(major, minor)` pair.
    pub fn as_tuple(&self) -> (u8, u8) {
        match self {
            PythonVersion::V2_6 => (2, 6),
            PythonVersion::V2_7 => (2, 7),
            PythonVersion::V3_0 => (3, 0),
            PythonVersion::V3_1 => (3, 1),
            PythonVersion::V3_2 => (3, 2),
            PythonVersion::V3_3 => (3, 3),
            PythonVersion::V3_4 => (3, 4),
            PythonVersion::V3_5 => (3, 5),
            PythonVersion::V3_6 => (3, 6),
            PythonVersion::V3_7 => (3, 7),
        }
    }

    /// Parse a `"major.minor"` string, e.g. `"3.6"`.
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "2.6" => PythonVersion::V2_6,
            "2.7" => PythonVersion::V2_7,
            "3.0" => PythonVersion::V3_0,
            "3.1" => PythonVersion::V3_1,
            "3.2" => PythonVersion::V3_2,
            "3.3" => PythonVersion::V3_3,
            "3.4" => PythonVersion::V3_4,
            "3.5" => PythonVersion::V3_5,
            "3.6" => PythonVersion::V3_6,
            "3.7" => PythonVersion::V3_7,
            _ => return None,
        })
    }

    /// Whether this is a 3.x version.
    pub fn is_py3(&self) -> bool {
        self.as_tuple().0 == 3
    }

    /// `print` and `exec` are keywords (statements) on 2.x only.
    pub fn print_is_keyword(&self) -> bool {
        !self.is_py3()
    }

    /// `nonlocal` is a keyword from 3.0.
    pub fn has_nonlocal(&self) -> bool {
        self.is_py3()
    }

    /// `async` / `await` are recognized from 3.5.
    pub fn has_async_await(&self) -> bool {
        self.as_tuple() >= (3, 5)
    }

    /// F-string literals are recognized from 3.6.
    pub fn has_fstrings(&self) -> bool {
        self.as_tuple() >= (3, 6)
    }

    /// `yield from` delegation is available from 3.3.
    pub fn has_yield_from(&self) -> bool {
        self.as_tuple() >= (3, 3)
    }

    /// The `@` matrix-multiplication operator is available from 3.5.
    pub fn has_matrix_multiply(&self) -> bool {
        self.as_tuple() >= (3, 5)
    }

    /// Function and variable annotations parse on 3.x. (Variable
    /// annotations are 3.6 syntax; older 3.x sources simply won't
    /// contain them.)
    pub fn has_annotations(&self) -> bool {
        self.is_py3()
    }

    /// `/` on two ints produces a float on 3.x (and on 2.x only under
    /// `from __future__ import division`, which the interpreter tracks
    /// separately).
    pub fn true_division(&self) -> bool {
        self.is_py3()
    }

    /// List comprehensions get their own scope on 3.x. On 2.x the
    /// comprehension target binds in (and leaks into) the enclosing
    /// scope; generator expressions always scope themselves.
    pub fn list_comp_own_scope(&self) -> bool {
        self.is_py3()
    }

    /// `except E, e` (comma form) parses on 2.x only.
    pub fn has_except_comma(&self) -> bool {
        !self.is_py3()
    }

    /// Backtick repr expressions and `<>` parse on 2.x only.
    pub fn has_legacy_repr(&self) -> bool {
        !self.is_py3()
    }

    /// The name used for text strings at this version.
    pub fn str_is_unicode(&self) -> bool {
        self.is_py3()
    }
}

impl Default for PythonVersion {
    fn default() -> Self {
        PythonVersion::V3_7
    }
}

impl std::fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor) = self.as_tuple();
        write!(f, "{major}.{minor}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        for text in ["2.6", "2.7", "3.0", "3.3", "3.5", "3.6", "3.7"] {
            let version = PythonVersion::parse(text).unwrap();
            assert_eq!(version.to_string(), text);
        }
        assert!(PythonVersion::parse("3.8").is_none());
    }

    #[test]
    fn capability_boundaries() {
        assert!(PythonVersion::V2_7.print_is_keyword());
        assert!(!PythonVersion::V3_0.print_is_keyword());
        assert!(!PythonVersion::V3_4.has_async_await());
        assert!(PythonVersion::V3_5.has_async_await());
        assert!(!PythonVersion::V3_5.has_fstrings());
        assert!(PythonVersion::V3_6.has_fstrings());
        assert!(!PythonVersion::V3_2.has_yield_from());
        assert!(PythonVersion::V3_3.has_yield_from());
        assert!(PythonVersion::V2_7.has_except_comma());
        assert!(!PythonVersion::V3_7.has_except_comma());
    }
}
