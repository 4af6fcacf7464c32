//! The lexical scope tree and per-name variable state.
//!
//! Scopes follow Python's lexical rules: module, class, function, lambda,
//! and comprehension scopes, plus the narrowed sub-scopes produced by
//! `isinstance` checks. Name lookup runs local → enclosing function
//! scopes → module → builtins; class scopes are skipped by closures, and
//! `global`/`nonlocal` declarations reroute writes.
//!
//! Comprehension scoping is version dependent and decided at scope
//! creation: Python 3 list comprehensions own their target bindings,
//! Python 2 list comprehensions leak them into the enclosing scope
//! (generator, set, and dict comprehensions never leak).

use std::collections::HashSet;

use indexmap::IndexMap;

use pythia_core::span::Span;

use crate::module::ModuleId;
use crate::value::{FunctionId, ValueId, ValueSet};

/// Handle to a scope in the [`ScopeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// What kind of lexical construct owns a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The synthetic builtins scope at the root of every chain.
    Builtins,
    Module(ModuleId),
    Class {
        /// Filled in once the class value exists.
        class: Option<ValueId>,
    },
    Function(FunctionId),
    Lambda(FunctionId),
    Comprehension,
    /// An `isinstance`-narrowed view over part of a suite.
    Narrowed,
}

/// How references to a name are classified in find-references results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    /// A write site (the name being bound).
    Definition,
    /// A read site.
    Reference,
    /// The span of the expression whose value the name binds to.
    Value,
}

/// One definition/reference/value site of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteRef {
    pub module: ModuleId,
    pub span: Span,
    pub kind: SiteKind,
}

/// Per-name, per-scope state.
#[derive(Debug, Clone, Default)]
pub struct VariableInfo {
    /// The accumulated value set, joined over all writes (and all call
    /// contexts, for parameters).
    pub values: ValueSet,
    /// Definition, reference, and value sites, in discovery order.
    pub sites: Vec<SiteRef>,
}

impl VariableInfo {
    /// Record a site, deduplicating exact repeats from re-analysis.
    pub fn record_site(&mut self, site: SiteRef) {
        if !self.sites.contains(&site) {
            self.sites.push(site);
        }
    }

    /// The definition sites.
    pub fn definitions(&self) -> impl Iterator<Item = &SiteRef> {
        self.sites
            .iter()
            .filter(|site| site.kind == SiteKind::Definition)
    }
}

/// One node of the lexical scope tree.
#[derive(Debug, Clone)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub module: Option<ModuleId>,
    /// The source region the scope covers, for position queries.
    pub span: Option<Span>,
    pub variables: IndexMap<String, VariableInfo>,
    pub children: Vec<ScopeId>,
    /// Names declared `global` in this scope.
    pub globals: HashSet<String>,
    /// Names declared `nonlocal` in this scope.
    pub nonlocals: HashSet<String>,
}

impl Scope {
    /// Whether this scope participates in closure lookup. Class scopes do
    /// not: a method does not see its class body's names.
    pub fn visible_to_closures(&self) -> bool {
        !matches!(self.kind, ScopeKind::Class { .. })
    }

    /// Whether this is a function-like scope (`def` or lambda).
    pub fn is_function(&self) -> bool {
        matches!(self.kind, ScopeKind::Function(_) | ScopeKind::Lambda(_))
    }
}

/// The scope arena.
#[derive(Debug, Default)]
pub struct ScopeTable {
    scopes: Vec<Scope>,
}

impl ScopeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(
        &mut self,
        parent: Option<ScopeId>,
        kind: ScopeKind,
        module: Option<ModuleId>,
        span: Option<Span>,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            parent,
            kind,
            module,
            span,
            variables: IndexMap::new(),
            children: Vec::new(),
            globals: HashSet::new(),
            nonlocals: HashSet::new(),
        });
        if let Some(parent) = parent {
            self.scopes[parent.0 as usize].children.push(id);
        }
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// The variable slot for `name` in `scope`, creating it if absent.
    pub fn variable_mut(&mut self, scope: ScopeId, name: &str) -> &mut VariableInfo {
        self.scopes[scope.0 as usize]
            .variables
            .entry(name.to_string())
            .or_default()
    }

    /// Look up the scope that a *read* of `name` starting from `scope`
    /// resolves in, following Python's chain: local, enclosing function
    /// scopes (skipping class scopes), module, builtins. Honors
    /// `global` declarations.
    pub fn resolve_read(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let start = self.get(scope);
        if start.globals.contains(name) {
            return self.module_scope_of(scope);
        }
        let mut current = Some(scope);
        let mut first = true;
        while let Some(id) = current {
            let s = self.get(id);
            let visible = first || s.visible_to_closures();
            if visible && s.variables.contains_key(name) {
                return Some(id);
            }
            first = false;
            current = s.parent;
        }
        None
    }

    /// The scope a *write* of `name` from `scope` lands in, honoring
    /// `global` and `nonlocal` declarations.
    pub fn resolve_write(&self, scope: ScopeId, name: &str) -> ScopeId {
        let s = self.get(scope);
        if s.globals.contains(name) {
            return self.module_scope_of(scope).unwrap_or(scope);
        }
        if s.nonlocals.contains(name) {
            // The nearest enclosing function scope that binds the name.
            let mut current = s.parent;
            while let Some(id) = current {
                let candidate = self.get(id);
                if candidate.is_function() && candidate.variables.contains_key(name) {
                    return id;
                }
                if matches!(candidate.kind, ScopeKind::Module(_)) {
                    break;
                }
                current = candidate.parent;
            }
        }
        scope
    }

    /// The module scope enclosing `scope`, if any.
    pub fn module_scope_of(&self, scope: ScopeId) -> Option<ScopeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if matches!(s.kind, ScopeKind::Module(_)) {
                return Some(id);
            }
            current = s.parent;
        }
        None
    }

    /// The innermost scope whose span contains `offset` within `module`,
    /// preferring deeper (later-allocated, smaller) scopes. Narrowed
    /// scopes participate, which is what makes position-sensitive
    /// narrowing queries work.
    pub fn innermost_at(&self, module: ModuleId, offset: u32) -> Option<ScopeId> {
        let mut best: Option<(u32, ScopeId)> = None;
        for scope in &self.scopes {
            if scope.module != Some(module) {
                continue;
            }
            let Some(span) = scope.span else { continue };
            if span.start <= offset && offset <= span.end {
                let size = span.end - span.start;
                if best.map(|(s, _)| size <= s).unwrap_or(true) {
                    best = Some((size, scope.id));
                }
            }
        }
        best.map(|(_, id)| id)
    }

    /// All names visible from `scope`, nearest-scope-first, for
    /// completions. Class scopes are included only as the starting scope.
    pub fn visible_names(&self, scope: ScopeId) -> Vec<(String, ScopeId)> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(scope);
        let mut first = true;
        while let Some(id) = current {
            let s = self.get(id);
            if first || s.visible_to_closures() {
                for name in s.variables.keys() {
                    if seen.insert(name.clone()) {
                        out.push((name.clone(), id));
                    }
                }
            }
            first = false;
            current = s.parent;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (ScopeTable, ScopeId, ScopeId) {
        let mut t = ScopeTable::new();
        let builtins = t.alloc(None, ScopeKind::Builtins, None, None);
        let module = t.alloc(Some(builtins), ScopeKind::Module(ModuleId(0)), Some(ModuleId(0)), None);
        (t, builtins, module)
    }

    #[test]
    fn read_resolves_through_chain() {
        let (mut t, builtins, module) = table();
        let func = t.alloc(
            Some(module),
            ScopeKind::Function(FunctionId(0)),
            Some(ModuleId(0)),
            None,
        );
        t.variable_mut(builtins, "len");
        t.variable_mut(module, "x");
        t.variable_mut(func, "local");

        assert_eq!(t.resolve_read(func, "local"), Some(func));
        assert_eq!(t.resolve_read(func, "x"), Some(module));
        assert_eq!(t.resolve_read(func, "len"), Some(builtins));
        assert_eq!(t.resolve_read(func, "missing"), None);
    }

    #[test]
    fn class_scope_skipped_by_closures() {
        let (mut t, _builtins, module) = table();
        let class = t.alloc(
            Some(module),
            ScopeKind::Class { class: None },
            Some(ModuleId(0)),
            None,
        );
        let method = t.alloc(
            Some(class),
            ScopeKind::Function(FunctionId(0)),
            Some(ModuleId(0)),
            None,
        );
        t.variable_mut(class, "class_attr");
        t.variable_mut(module, "class_attr");

        // The method sees the module binding, not the class body's.
        assert_eq!(t.resolve_read(method, "class_attr"), Some(module));
        // Code directly in the class body sees the class binding.
        assert_eq!(t.resolve_read(class, "class_attr"), Some(class));
    }

    #[test]
    fn global_declaration_reroutes_writes() {
        let (mut t, _builtins, module) = table();
        let func = t.alloc(
            Some(module),
            ScopeKind::Function(FunctionId(0)),
            Some(ModuleId(0)),
            None,
        );
        t.get_mut(func).globals.insert("counter".to_string());
        assert_eq!(t.resolve_write(func, "counter"), module);
        assert_eq!(t.resolve_write(func, "other"), func);
    }

    #[test]
    fn nonlocal_declaration_targets_enclosing_function() {
        let (mut t, _builtins, module) = table();
        let outer = t.alloc(
            Some(module),
            ScopeKind::Function(FunctionId(0)),
            Some(ModuleId(0)),
            None,
        );
        let inner = t.alloc(
            Some(outer),
            ScopeKind::Function(FunctionId(1)),
            Some(ModuleId(0)),
            None,
        );
        t.variable_mut(outer, "state");
        t.get_mut(inner).nonlocals.insert("state".to_string());
        assert_eq!(t.resolve_write(inner, "state"), outer);
    }

    #[test]
    fn innermost_at_prefers_smallest_span() {
        let (mut t, _builtins, module) = table();
        t.get_mut(module).span = Some(Span::new(0, 100));
        let func = t.alloc(
            Some(module),
            ScopeKind::Function(FunctionId(0)),
            Some(ModuleId(0)),
            Some(Span::new(10, 50)),
        );
        let narrowed = t.alloc(
            Some(func),
            ScopeKind::Narrowed,
            Some(ModuleId(0)),
            Some(Span::new(20, 30)),
        );
        assert_eq!(t.innermost_at(ModuleId(0), 25), Some(narrowed));
        assert_eq!(t.innermost_at(ModuleId(0), 40), Some(func));
        assert_eq!(t.innermost_at(ModuleId(0), 90), Some(module));
    }
}
