//! The analysis session: owner of all mutable analysis state.
//!
//! A session holds the value store, scope tree, module table, and work
//! queue, and drives units to fixpoint. There is no global state;
//! multiple sessions coexist freely. External observers read results
//! through [`crate::query::Query`], which borrows the session immutably
//! and sees the state as of the most recent unit boundary.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, debug_span, warn};

use pythia_core::cancel::{CancellationToken, Cancelled};
use pythia_core::config::AnalysisConfig;
use pythia_core::diagnostics::{Diagnostic, DiagnosticCode};
use pythia_core::span::{LineIndex, Span};
use pythia_cst::NodeId;

use crate::builtins::{self, Builtins};
use crate::module::{ModuleId, ModuleTable};
use crate::query::Query;
use crate::queue::{UnitId, UnitKind, WorkQueue};
use crate::scope::{ScopeId, ScopeKind, ScopeTable, SiteKind, SiteRef};
use crate::stubs::StubLoader;
use crate::value::{ValueSet, ValueStore};

/// A variable temporarily narrowed by an `isinstance` check.
#[derive(Debug, Clone)]
pub(crate) struct NarrowFrame {
    pub name: String,
    pub values: ValueSet,
}

/// One analysis session over a set of Python modules.
pub struct AnalysisSession {
    pub config: AnalysisConfig,
    pub(crate) store: ValueStore,
    pub(crate) scopes: ScopeTable,
    pub(crate) modules: ModuleTable,
    pub(crate) queue: WorkQueue,
    pub(crate) builtins: Builtins,
    pub(crate) stub_loader: StubLoader,
    /// `sys.modules` overrides registered by analyzed code.
    pub(crate) sys_overrides: HashMap<String, ValueSet>,
    /// Value sets per evaluated expression node.
    pub(crate) expr_values: HashMap<(ModuleId, NodeId), ValueSet>,
    /// Analysis diagnostics, per unit (cleared when the unit re-runs).
    pub(crate) unit_diagnostics: HashMap<UnitId, Vec<Diagnostic>>,
    /// Narrowed sub-scopes, keyed to stay stable across re-analysis.
    pub(crate) narrow_cache: HashMap<(ScopeId, u32, String), ScopeId>,
    /// Comprehension scopes, keyed to stay stable across re-analysis.
    pub(crate) comp_scope_cache: HashMap<(ScopeId, u32), ScopeId>,

    // Transient interpreter state.
    pub(crate) current_unit: Option<UnitId>,
    pub(crate) unit_deadline: Option<Instant>,
    pub(crate) narrow_stack: Vec<NarrowFrame>,
    pub(crate) call_depth: usize,
    /// Guards protocol recursion (an `__iter__` that answers itself).
    pub(crate) iterate_depth: usize,
    /// Clone of the active cancel token; checked before file reads.
    pub(crate) cancel: CancellationToken,
}

impl AnalysisSession {
    /// Create a session and seed the builtin world for the configured
    /// language version.
    pub fn new(config: AnalysisConfig) -> Self {
        let mut store = ValueStore::new();
        let mut scopes = ScopeTable::new();
        let mut modules = ModuleTable::new();
        let builtins = builtins::seed(&mut store, &mut scopes, &mut modules, config.version);
        Self {
            config,
            store,
            scopes,
            modules,
            queue: WorkQueue::new(),
            builtins,
            stub_loader: StubLoader::new(),
            sys_overrides: HashMap::new(),
            expr_values: HashMap::new(),
            unit_diagnostics: HashMap::new(),
            narrow_cache: HashMap::new(),
            comp_scope_cache: HashMap::new(),
            current_unit: None,
            unit_deadline: None,
            narrow_stack: Vec::new(),
            call_depth: 0,
            iterate_depth: 0,
            cancel: CancellationToken::new(),
        }
    }

    // ------------------------------------------------------------------
    // Module lifecycle
    // ------------------------------------------------------------------

    /// Register a module from in-memory source (tests, unsaved buffers).
    pub fn add_module(&mut self, name: &str, source: &str) -> ModuleId {
        self.add_module_with_path(name, None, source)
    }

    /// Register a module backed by a file path.
    pub fn add_module_with_path(
        &mut self,
        name: &str,
        path: Option<PathBuf>,
        source: &str,
    ) -> ModuleId {
        let id = match self.modules.by_name(name) {
            Some(existing) => existing,
            None => self.modules.insert(name, path),
        };
        self.set_module_source(id, source);
        id
    }

    /// Replace a module's source: bump the version, reparse, reset its
    /// scope, and invalidate dependents.
    pub fn set_module_source(&mut self, id: ModuleId, source: &str) {
        let version = self.config.version;
        let parsed = pythia_cst::parse_module(source, version);
        let scope = match self.modules.get(id).scope {
            Some(scope) => {
                // Reuse the scope id; its contents are rebuilt.
                self.scopes.get_mut(scope).variables.clear();
                self.scopes.get_mut(scope).globals.clear();
                self.scopes.get_mut(scope).nonlocals.clear();
                scope
            }
            None => self.scopes.alloc(
                Some(self.builtins.scope),
                ScopeKind::Module(id),
                Some(id),
                Some(Span::new(0, source.len() as u32)),
            ),
        };
        self.scopes.get_mut(scope).span = Some(Span::new(0, source.len() as u32));

        let entry = self.modules.get_mut(id);
        entry.source_version += 1;
        entry.source = Some(Arc::from(source));
        entry.line_index = Some(Arc::new(LineIndex::from_source(source)));
        entry.parse_diagnostics = parsed.diagnostics;
        entry.ast = Some(Arc::new(parsed.module));
        entry.scope = Some(scope);

        let unit = self.queue.ensure_unit(UnitKind::ModuleTop(id));
        let entry = self.modules.get_mut(id);
        if !entry.units.contains(&unit) {
            entry.units.push(unit);
        }
        self.queue.enqueue(unit);

        // Everything that depended on this module re-runs.
        let dependents: Vec<ModuleId> =
            self.modules.get(id).dependents.iter().copied().collect();
        for dependent in dependents {
            let unit = self.queue.ensure_unit(UnitKind::ModuleTop(dependent));
            self.queue.enqueue(unit);
        }
        debug!(module = %self.modules.get(id).name, version = self.modules.get(id).source_version, "module source set");
    }

    /// Remove a module by name. Dependents are re-enqueued and will see
    /// unresolved imports.
    pub fn remove_module(&mut self, name: &str) {
        let Some(id) = self.modules.remove_name(name) else {
            return;
        };
        let dependents: Vec<ModuleId> =
            self.modules.get(id).dependents.iter().copied().collect();
        let entry = self.modules.get_mut(id);
        entry.ast = None;
        entry.source = None;
        if let Some(scope) = entry.scope {
            self.scopes.get_mut(scope).variables.clear();
        }
        for dependent in dependents {
            let unit = self.queue.ensure_unit(UnitKind::ModuleTop(dependent));
            self.queue.enqueue(unit);
        }
    }

    // ------------------------------------------------------------------
    // The fixpoint loop
    // ------------------------------------------------------------------

    /// Run all pending units to fixpoint.
    pub fn analyze(&mut self) -> Result<(), Cancelled> {
        self.analyze_with(&CancellationToken::new())
    }

    /// Run all pending units to fixpoint, checking the cancel token at
    /// every unit boundary.
    pub fn analyze_with(&mut self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let span = debug_span!("analyze");
        let _guard = span.enter();
        self.cancel = cancel.clone();
        let session_deadline = self
            .config
            .limits
            .session_timeout
            .map(|timeout| Instant::now() + timeout);
        while let Some(unit) = self.queue.pop() {
            if cancel.is_cancelled() {
                self.queue.clear_pending();
                return Err(Cancelled);
            }
            if let Some(deadline) = session_deadline {
                if Instant::now() >= deadline {
                    // Timeouts are silent: keep the last consistent
                    // state and stop scheduling.
                    self.queue.clear_pending();
                    return Ok(());
                }
            }
            let budget = match self.queue.kind(unit) {
                UnitKind::ModuleTop(_) => self.config.limits.module_reanalysis_limit,
                UnitKind::FunctionBody { .. } => self.config.limits.unit_reanalysis_limit,
            };
            if self.queue.runs(unit) > budget && !self.queue.is_exhausted(unit) {
                debug!(?unit, budget, "re-analysis budget exhausted; widening outputs");
                self.queue.mark_exhausted(unit);
            }
            if let Err(Cancelled) = self.run_unit(unit, cancel) {
                self.queue.clear_pending();
                return Err(Cancelled);
            }
        }
        Ok(())
    }

    /// Whether writes from the current unit must be force-widened
    /// (budget exhausted or the unit timed out).
    pub(crate) fn writes_forced(&self) -> bool {
        if let Some(unit) = self.current_unit {
            if self.queue.is_exhausted(unit) {
                return true;
            }
        }
        if let Some(deadline) = self.unit_deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Bindings
    // ------------------------------------------------------------------

    /// The cardinality budget for a binding in `scope`.
    pub(crate) fn limit_for(&self, _scope: ScopeId) -> usize {
        self.config.limits.assignment_set_limit
    }

    /// Write `values` into `(scope, name)`, joining with what is already
    /// there. Records sites and notifies readers when the set changed.
    pub(crate) fn write_binding(
        &mut self,
        scope: ScopeId,
        name: &str,
        mut values: ValueSet,
        sites: &[SiteRef],
    ) {
        let target = self.scopes.resolve_write(scope, name);
        if self.writes_forced() {
            values.force_any(&mut self.store);
        }
        let limit = self.limit_for(target);
        let variable = self.scopes.variable_mut(target, name);
        let mut current = std::mem::take(&mut variable.values);
        let changed = current.join(&mut self.store, &values, limit);
        let variable = self.scopes.variable_mut(target, name);
        variable.values = current;
        for site in sites {
            variable.record_site(*site);
        }
        // A rebinding of a shadowed name (a narrowed variable or a
        // context-bound parameter) updates the innermost shadow so later
        // reads in the same unit see the write.
        let store = &mut self.store;
        if let Some(frame) = self
            .narrow_stack
            .iter_mut()
            .rev()
            .find(|frame| frame.name == name)
        {
            let mut shadow = std::mem::take(&mut frame.values);
            shadow.join(store, &values, limit);
            frame.values = shadow;
        }
        if changed {
            self.notify_binding(target, name);
        }
    }

    /// Notify readers of `(scope, name)` and of the scope's star-import
    /// wildcard.
    pub(crate) fn notify_binding(&mut self, scope: ScopeId, name: &str) {
        let writer = self.current_unit.unwrap_or(UnitId(u32::MAX));
        self.queue.notify_write(&(scope, name.to_string()), writer);
        self.queue.notify_write(&(scope, "*".to_string()), writer);
    }

    /// Read `(scope chain, name)`. Registers the read dependency,
    /// records the reference site, and reports unresolved names.
    pub(crate) fn read_binding(
        &mut self,
        scope: ScopeId,
        name: &str,
        module: ModuleId,
        span: Span,
    ) -> ValueSet {
        // An active isinstance narrowing shadows the real binding.
        for frame in self.narrow_stack.iter().rev() {
            if frame.name == name {
                return frame.values.clone();
            }
        }
        match self.scopes.resolve_read(scope, name) {
            Some(resolved) => {
                if let Some(unit) = self.current_unit {
                    self.queue.record_read(unit, (resolved, name.to_string()));
                }
                let variable = self.scopes.variable_mut(resolved, name);
                variable.record_site(SiteRef {
                    module,
                    span,
                    kind: SiteKind::Reference,
                });
                variable.values.clone()
            }
            None => {
                // Depend on the module scope so a later definition
                // re-runs this unit.
                if let Some(unit) = self.current_unit {
                    if let Some(module_scope) = self.scopes.module_scope_of(scope) {
                        self.queue.record_read(unit, (module_scope, name.to_string()));
                    }
                }
                self.diagnostic(Diagnostic::new(
                    DiagnosticCode::UsedBeforeAssignment,
                    span,
                    format!("name '{name}' is not defined"),
                ));
                ValueSet::empty()
            }
        }
    }

    /// Record a diagnostic against the current unit.
    pub(crate) fn diagnostic(&mut self, diagnostic: Diagnostic) {
        match self.current_unit {
            Some(unit) => self
                .unit_diagnostics
                .entry(unit)
                .or_default()
                .push(diagnostic),
            None => warn!(%diagnostic, "diagnostic outside any unit"),
        }
    }

    /// Record an expression's value set for position queries.
    pub(crate) fn record_expr(&mut self, module: ModuleId, node: NodeId, values: &ValueSet) {
        self.expr_values.insert((module, node), values.clone());
    }

    /// Resolve and load a module by dotted name through the configured
    /// search paths, without analyzing it yet. Returns `None` when the
    /// name does not resolve.
    pub fn load_module_by_name(&mut self, name: &str) -> Option<ModuleId> {
        self.ensure_module(name)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// A read-only query handle over the stabilized analysis.
    pub fn query(&self) -> Query<'_> {
        Query::new(self)
    }
}
