//! Import resolution.
//!
//! Module names resolve against the ordered search paths, then the
//! standard-library roots, then stub summaries. For each candidate root
//! the resolver prefers `name/__init__.py` over `name.py` over a
//! compiled-module summary; a bare directory without `__init__.py` is a
//! namespace package. `sys.modules` overrides registered by analyzed
//! code short-circuit everything.
//!
//! Relative imports (PEP 328) anchor at the importing module's package:
//! one leading dot names the current package, each extra dot ascends one
//! level, and ascending past the top is an error.

use std::path::{Path, PathBuf};

use tracing::debug;

use pythia_core::diagnostics::{Diagnostic, DiagnosticCode};
use pythia_core::span::Span;

use crate::module::ModuleId;
use crate::scope::ScopeKind;
use crate::session::AnalysisSession;
use crate::stubs::{summary_file_name, SummaryKind, SummaryMember};
use crate::value::{
    ClassValue, PrimitiveKind, ProtocolValue, SequenceKind, SequenceValue, Value, ValueSet,
};

/// What a search root yielded for one path component.
enum Located {
    /// A real source file; true when it is a package `__init__.py`.
    File {
        file: PathBuf,
        package_dir: Option<PathBuf>,
    },
    /// A directory with no `__init__.py`: a namespace package.
    Namespace(PathBuf),
}

impl AnalysisSession {
    // ------------------------------------------------------------------
    // Name → module
    // ------------------------------------------------------------------

    /// Resolve a dotted module name to a loaded module, loading and
    /// parsing source files on demand. Returns `None` on failure; the
    /// caller emits the diagnostic.
    pub(crate) fn ensure_module(&mut self, dotted: &str) -> Option<ModuleId> {
        if dotted.is_empty() {
            return None;
        }
        if let Some(id) = self.modules.by_name(dotted) {
            return Some(id);
        }
        let mut current: Option<ModuleId> = None;
        let mut prefix = String::new();
        for (idx, part) in dotted.split('.').enumerate() {
            if idx == 0 {
                prefix = part.to_string();
            } else {
                prefix = format!("{prefix}.{part}");
            }
            if let Some(id) = self.modules.by_name(&prefix) {
                current = Some(id);
                continue;
            }
            let roots: Vec<PathBuf> = if idx == 0 {
                self.config
                    .search_paths
                    .iter()
                    .chain(self.config.stdlib_paths.iter())
                    .cloned()
                    .collect()
            } else {
                match current.and_then(|id| self.modules.get(id).package_dir.clone()) {
                    Some(dir) => vec![dir],
                    None => Vec::new(),
                }
            };
            let id = match self.locate(&roots, part) {
                Some(Located::File { file, package_dir }) => {
                    let loaded = self.load_source_module(&prefix, &file)?;
                    let entry = self.modules.get_mut(loaded);
                    entry.is_package = package_dir.is_some();
                    entry.package_dir = package_dir;
                    loaded
                }
                Some(Located::Namespace(dir)) => self.create_namespace_package(&prefix, dir),
                None => self.load_summary_module(&prefix)?,
            };
            current = Some(id);
        }
        current
    }

    /// Resolve an import as seen from `importer`. Python 2 searches the
    /// importing module's own package before the absolute path (implicit
    /// relative imports); Python 3 is absolute only.
    pub(crate) fn resolve_for_import(
        &mut self,
        importer: ModuleId,
        dotted: &str,
    ) -> Option<ModuleId> {
        if !self.config.version.is_py3() {
            let entry = self.modules.get(importer);
            let package = if entry.is_package {
                entry.name.clone()
            } else {
                entry
                    .name
                    .rsplit_once('.')
                    .map(|(package, _)| package.to_string())
                    .unwrap_or_default()
            };
            if !package.is_empty() {
                let candidate = format!("{package}.{dotted}");
                if let Some(id) = self.ensure_module(&candidate) {
                    return Some(id);
                }
            }
        }
        self.ensure_module(dotted)
    }

    fn locate(&self, roots: &[PathBuf], part: &str) -> Option<Located> {
        if self.cancel.is_cancelled() {
            return None;
        }
        for root in roots {
            let dir = root.join(part);
            let init = dir.join("__init__.py");
            if init.is_file() {
                return Some(Located::File {
                    file: init,
                    package_dir: Some(dir),
                });
            }
            let file = root.join(format!("{part}.py"));
            if file.is_file() {
                return Some(Located::File {
                    file,
                    package_dir: None,
                });
            }
            if dir.is_dir() {
                return Some(Located::Namespace(dir));
            }
        }
        None
    }

    fn load_source_module(&mut self, dotted: &str, path: &Path) -> Option<ModuleId> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let source = match std::fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                debug!(%dotted, path = %path.display(), %error, "module read failed");
                return None;
            }
        };
        debug!(%dotted, path = %path.display(), "loading module");
        Some(self.add_module_with_path(dotted, Some(path.to_path_buf()), &source))
    }

    fn create_namespace_package(&mut self, dotted: &str, dir: PathBuf) -> ModuleId {
        let id = self.modules.insert(dotted, None);
        let scope = self.scopes.alloc(
            Some(self.builtins.scope),
            ScopeKind::Module(id),
            Some(id),
            None,
        );
        let entry = self.modules.get_mut(id);
        entry.scope = Some(scope);
        entry.is_package = true;
        entry.package_dir = Some(dir);
        id
    }

    // ------------------------------------------------------------------
    // Stub summaries
    // ------------------------------------------------------------------

    fn load_summary_module(&mut self, dotted: &str) -> Option<ModuleId> {
        let file = summary_file_name(dotted);
        let stub_paths = self.config.stub_paths.clone();
        for root in stub_paths {
            let path = root.join(&file);
            if !path.is_file() {
                continue;
            }
            let summary = match self.stub_loader.load_file(&path, self.config.version) {
                Ok(summary) => summary,
                Err(error) => {
                    debug!(%dotted, %error, "summary load failed");
                    continue;
                }
            };
            let members = summary.members.clone();
            let doc = summary.doc.clone();
            return Some(self.instantiate_summary(dotted, doc, &members));
        }
        None
    }

    fn instantiate_summary(
        &mut self,
        dotted: &str,
        doc: Option<String>,
        members: &[SummaryMember],
    ) -> ModuleId {
        let id = self.modules.insert(dotted, None);
        let scope = self.scopes.alloc(
            Some(self.builtins.scope),
            ScopeKind::Module(id),
            Some(id),
            None,
        );
        self.modules.get_mut(id).scope = Some(scope);
        self.modules.get_mut(id).doc = doc;
        for member in members {
            let values = self.summary_member_value(dotted, id, member);
            self.scopes.variable_mut(scope, &member.name).values = values;
        }
        id
    }

    fn summary_member_value(
        &mut self,
        dotted: &str,
        module: ModuleId,
        member: &SummaryMember,
    ) -> ValueSet {
        match member.kind {
            SummaryKind::Constant => {
                let type_name = member.type_name.as_deref().unwrap_or("Any");
                self.type_name_values(type_name)
            }
            SummaryKind::Function => {
                let returns = member
                    .signature
                    .as_ref()
                    .and_then(|sig| sig.returns.as_deref())
                    .map(|name| self.type_name_values(name))
                    .unwrap_or_default();
                let id = self
                    .store
                    .alloc(Value::Protocol(ProtocolValue::Callable { returns }));
                ValueSet::one(id)
            }
            SummaryKind::Class => {
                let mut class_members = indexmap::IndexMap::new();
                for method in &member.methods {
                    let values = self.summary_member_value(dotted, module, method);
                    class_members.insert(method.name.clone(), values);
                }
                let object = self.builtins.object;
                let id = self.store.alloc(Value::Class(ClassValue {
                    name: member.name.clone(),
                    qualname: format!("{dotted}.{}", member.name),
                    module: Some(module),
                    scope: None,
                    bases: vec![object],
                    mro: Vec::new(),
                    members: class_members,
                    builtin: None,
                    doc: member.doc.clone(),
                }));
                if let Value::Class(class) = self.store.get_mut(id) {
                    class.mro = vec![id, object];
                }
                ValueSet::one(id)
            }
            SummaryKind::Module => ValueSet::empty(),
        }
    }

    /// A value set for a summary type-description string.
    pub(crate) fn type_name_values(&mut self, name: &str) -> ValueSet {
        let base = name.split('[').next().unwrap_or(name).trim();
        let id = match base {
            "int" => self.store.primitive(PrimitiveKind::Int),
            "float" => self.store.primitive(PrimitiveKind::Float),
            "bool" => self.store.primitive(PrimitiveKind::Bool),
            "str" | "unicode" => self.store.primitive(PrimitiveKind::Str),
            "bytes" => self.store.primitive(PrimitiveKind::Bytes),
            "complex" => self.store.primitive(PrimitiveKind::Complex),
            "None" | "NoneType" => self.store.primitive(PrimitiveKind::None),
            "list" | "tuple" | "set" | "frozenset" => {
                let kind = match base {
                    "tuple" => SequenceKind::Tuple,
                    "set" => SequenceKind::Set,
                    "frozenset" => SequenceKind::FrozenSet,
                    _ => SequenceKind::List,
                };
                let element = name
                    .strip_prefix(base)
                    .and_then(|rest| rest.strip_prefix('['))
                    .and_then(|rest| rest.strip_suffix(']'))
                    .map(|inner| self.type_name_values(inner))
                    .unwrap_or_default();
                self.store.alloc(Value::Sequence(SequenceValue {
                    kind,
                    elements: Vec::new(),
                    fallback: element,
                    known_len: None,
                }))
            }
            "dict" => self.store.alloc(Value::Dict(Default::default())),
            _ => self.store.any(),
        };
        ValueSet::one(id)
    }

    // ------------------------------------------------------------------
    // Relative anchoring
    // ------------------------------------------------------------------

    /// Compute the absolute dotted name targeted by a `from` import with
    /// `level` leading dots. Emits the top-level-relative-import
    /// diagnostic when the anchor would ascend past the root.
    pub(crate) fn relative_base(
        &mut self,
        importer: ModuleId,
        level: usize,
        module: Option<&str>,
        span: Span,
    ) -> Option<String> {
        if level == 0 {
            return module.map(|m| m.to_string());
        }
        let entry = self.modules.get(importer);
        let mut anchor: Vec<&str> = entry.name.split('.').collect();
        // The first dot names the current package: for a plain module
        // that is its containing package, for a package it is itself.
        if !entry.is_package {
            anchor.pop();
        }
        for _ in 1..level {
            if anchor.pop().is_none() {
                break;
            }
        }
        if anchor.is_empty() {
            self.diagnostic(Diagnostic::new(
                DiagnosticCode::RelativeImportOutsidePackage,
                span,
                "attempted relative import beyond top-level package",
            ));
            return None;
        }
        let mut base = anchor.join(".");
        if let Some(module) = module {
            base.push('.');
            base.push_str(module);
        }
        Some(base)
    }

    // ------------------------------------------------------------------
    // Star-import support
    // ------------------------------------------------------------------

    /// The names `from module import *` binds: the string constants of
    /// `__all__` when present, else every name without a leading
    /// underscore.
    pub(crate) fn star_export_names(&self, module: ModuleId) -> Vec<String> {
        let Some(scope) = self.modules.get(module).scope else {
            return Vec::new();
        };
        let variables = &self.scopes.get(scope).variables;
        if let Some(all_var) = variables.get("__all__") {
            let mut names = Vec::new();
            for id in all_var.values.iter() {
                if let Value::Sequence(seq) = self.store.get(id) {
                    for element in seq.elements.iter().chain(std::iter::once(&seq.fallback)) {
                        for entry in element.iter() {
                            if let Value::Constant {
                                kind: PrimitiveKind::Str,
                                repr,
                            } = self.store.get(entry)
                            {
                                if !names.contains(repr) {
                                    names.push(repr.clone());
                                }
                            }
                        }
                    }
                }
            }
            if !names.is_empty() {
                return names;
            }
        }
        variables
            .keys()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pythia_core::config::AnalysisConfig;
    use std::fs;

    fn session_with_root(root: &Path) -> AnalysisSession {
        let config = AnalysisConfig::default().with_search_path(root);
        AnalysisSession::new(config)
    }

    #[test]
    fn resolves_plain_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("single.py"), "x = 1\n").unwrap();
        let mut session = session_with_root(dir.path());
        let id = session.ensure_module("single").unwrap();
        assert_eq!(session.modules.get(id).name, "single");
        assert!(!session.modules.get(id).is_package);
    }

    #[test]
    fn package_init_wins_over_module_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/__init__.py"), "a = 1\n").unwrap();
        fs::write(dir.path().join("pkg.py"), "b = 2\n").unwrap();
        let mut session = session_with_root(dir.path());
        let id = session.ensure_module("pkg").unwrap();
        assert!(session.modules.get(id).is_package);
    }

    #[test]
    fn resolves_nested_submodules() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/__init__.py"), "").unwrap();
        fs::write(dir.path().join("a/b/__init__.py"), "").unwrap();
        fs::write(dir.path().join("a/b/c.py"), "value = 1\n").unwrap();
        let mut session = session_with_root(dir.path());
        let id = session.ensure_module("a.b.c").unwrap();
        assert_eq!(session.modules.get(id).name, "a.b.c");
        assert!(session.modules.by_name("a").is_some());
        assert!(session.modules.by_name("a.b").is_some());
    }

    #[test]
    fn namespace_package_without_init() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("ns")).unwrap();
        fs::write(dir.path().join("ns/mod.py"), "x = 1\n").unwrap();
        let mut session = session_with_root(dir.path());
        let id = session.ensure_module("ns.mod").unwrap();
        assert_eq!(session.modules.get(id).name, "ns.mod");
        let ns = session.modules.by_name("ns").unwrap();
        assert!(session.modules.get(ns).is_package);
    }

    #[test]
    fn unresolvable_module_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session_with_root(dir.path());
        assert!(session.ensure_module("missing").is_none());
    }

    #[test]
    fn search_order_takes_first_hit() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("mod.py"), "which = 'first'\n").unwrap();
        fs::write(second.path().join("mod.py"), "which = 'second'\n").unwrap();
        let config = AnalysisConfig::default()
            .with_search_path(first.path())
            .with_search_path(second.path());
        let mut session = AnalysisSession::new(config);
        let id = session.ensure_module("mod").unwrap();
        let path = session.modules.get(id).path.clone().unwrap();
        assert!(path.starts_with(first.path()));
    }

    #[test]
    fn summary_module_loads_from_stub_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("math.json"),
            r#"{"name": "math", "members": [
                {"name": "pi", "kind": "constant", "type_name": "float"},
                {"name": "sqrt", "kind": "function",
                 "signature": {"parameters": [{"name": "x"}], "returns": "float"}}
            ]}"#,
        )
        .unwrap();
        let mut config = AnalysisConfig::default();
        config.stub_paths.push(dir.path().to_path_buf());
        let mut session = AnalysisSession::new(config);
        let id = session.ensure_module("math").unwrap();
        let scope = session.modules.get(id).scope.unwrap();
        assert!(session.scopes.get(scope).variables.contains_key("pi"));
        assert!(session.scopes.get(scope).variables.contains_key("sqrt"));
    }

    #[test]
    fn relative_base_anchors_at_package() {
        let mut session = session_with_root(Path::new("/nonexistent"));
        let importer = session.add_module("fob.oar.baz", "");
        // Mark fob.oar.baz as a plain module inside package fob.oar.
        let base = session.relative_base(importer, 1, Some("quox"), Span::at(0));
        assert_eq!(base.as_deref(), Some("fob.oar.quox"));
        let base = session.relative_base(importer, 2, Some("other"), Span::at(0));
        assert_eq!(base.as_deref(), Some("fob.other"));
    }

    #[test]
    fn relative_import_beyond_top_is_error() {
        let mut session = session_with_root(Path::new("/nonexistent"));
        let importer = session.add_module("toplevel", "");
        let unit = session.queue.ensure_unit(crate::queue::UnitKind::ModuleTop(importer));
        session.current_unit = Some(unit);
        let base = session.relative_base(importer, 1, Some("x"), Span::at(0));
        assert_eq!(base, None);
        let diagnostics = &session.unit_diagnostics[&unit];
        assert!(diagnostics
            .iter()
            .any(|d| d.code == DiagnosticCode::RelativeImportOutsidePackage));
    }
}
