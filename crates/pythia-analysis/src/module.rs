//! Module entries: the analysis-level handles for Python source files.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use pythia_core::diagnostics::Diagnostic;
use pythia_core::span::LineIndex;
use pythia_cst::Module as CstModule;

use crate::queue::UnitId;
use crate::scope::ScopeId;

/// Handle to a module in the [`ModuleTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// The analysis-level record of one Python module.
#[derive(Debug)]
pub struct ModuleEntry {
    pub id: ModuleId,
    /// Canonical dotted name (`fob.oar.baz`).
    pub name: String,
    /// File path, absent for synthetic (builtin/summary) modules.
    pub path: Option<PathBuf>,
    /// Monotonic source version; bumped on every source change.
    pub source_version: u32,
    pub source: Option<Arc<str>>,
    /// Current AST; null until parsed, replaced wholesale on change.
    pub ast: Option<Arc<CstModule>>,
    pub line_index: Option<Arc<LineIndex>>,
    /// The module's top-level scope.
    pub scope: Option<ScopeId>,
    /// Analysis units belonging to this module.
    pub units: Vec<UnitId>,
    /// Modules this module depends on.
    pub dependencies: HashSet<ModuleId>,
    /// Modules depending on this module.
    pub dependents: HashSet<ModuleId>,
    /// Parse-time diagnostics (analysis diagnostics are tracked per unit).
    pub parse_diagnostics: Vec<Diagnostic>,
    /// Whether this module is a package (`__init__.py` or namespace dir).
    pub is_package: bool,
    /// For packages: the directory that submodule resolution searches.
    pub package_dir: Option<PathBuf>,
    /// Module docstring, when the body starts with a string literal.
    pub doc: Option<String>,
    /// `from __future__ import division` was seen; `/` divides true.
    pub future_division: bool,
}

/// The module arena plus the dotted-name index.
#[derive(Debug, Default)]
pub struct ModuleTable {
    entries: Vec<ModuleEntry>,
    by_name: std::collections::HashMap<String, ModuleId>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, path: Option<PathBuf>) -> ModuleId {
        let id = ModuleId(self.entries.len() as u32);
        self.entries.push(ModuleEntry {
            id,
            name: name.to_string(),
            path,
            source_version: 0,
            source: None,
            ast: None,
            line_index: None,
            scope: None,
            units: Vec::new(),
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            parse_diagnostics: Vec::new(),
            is_package: false,
            package_dir: None,
            doc: None,
            future_division: false,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, id: ModuleId) -> &ModuleEntry {
        &self.entries[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ModuleId) -> &mut ModuleEntry {
        &mut self.entries[id.0 as usize]
    }

    pub fn by_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove a module from the name index (the entry slot survives so
    /// ids stay stable; dependents are invalidated by the session).
    pub fn remove_name(&mut self, name: &str) -> Option<ModuleId> {
        self.by_name.remove(name)
    }

    /// Record that `from_module` depends on `to_module`.
    pub fn add_dependency(&mut self, from_module: ModuleId, to_module: ModuleId) {
        if from_module == to_module {
            return;
        }
        self.entries[from_module.0 as usize]
            .dependencies
            .insert(to_module);
        self.entries[to_module.0 as usize]
            .dependents
            .insert(from_module);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut table = ModuleTable::new();
        let a = table.insert("fob", None);
        let b = table.insert("fob.oar", None);
        assert_eq!(table.by_name("fob"), Some(a));
        assert_eq!(table.by_name("fob.oar"), Some(b));
        assert_eq!(table.by_name("missing"), None);
    }

    #[test]
    fn dependencies_are_bidirectional() {
        let mut table = ModuleTable::new();
        let a = table.insert("a", None);
        let b = table.insert("b", None);
        table.add_dependency(a, b);
        assert!(table.get(a).dependencies.contains(&b));
        assert!(table.get(b).dependents.contains(&a));
        // Self-dependencies are ignored.
        table.add_dependency(a, a);
        assert!(!table.get(a).dependencies.contains(&a));
    }
}
