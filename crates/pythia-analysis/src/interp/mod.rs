//! The abstract interpreter.
//!
//! Walks one unit's AST at a time, producing value sets for expressions
//! and joining value sets into bindings. The interpreter is flow
//! insensitive: every branch of every statement executes, loop bodies
//! execute once, and conditions contribute only their side effects. The
//! single exception is `isinstance` narrowing, which shadows a variable
//! with a filtered set for the extent of a branch or the remainder of a
//! suite after an assert.
//!
//! The walk is split across this module (units and statements),
//! [`expr`] (expression evaluation), [`call`] (call binding, function
//! and class definition, the Cartesian product algorithm), and [`ops`]
//! (the uniform member/call/index/iterate/operator protocol over
//! values).

mod call;
mod expr;
mod ops;

use std::time::Instant;

use pythia_core::cancel::{CancellationToken, Cancelled};
use pythia_core::diagnostics::{Diagnostic, DiagnosticCode};
use pythia_core::span::Span;
use pythia_cst::{
    CompoundStatement, Expression, SmallStatement, Statement, Suite,
};

use crate::module::ModuleId;
use crate::scope::ScopeId;
use crate::queue::{UnitId, UnitKind};
use crate::scope::{ScopeKind, SiteKind, SiteRef};
use crate::session::{AnalysisSession, NarrowFrame};
use crate::value::{ContextKey, FunctionId, PrimitiveKind, Value, ValueId, ValueSet};

/// The evaluation context of a unit run: which module, scope, and (for
/// function bodies) which function and call context.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub module: ModuleId,
    pub scope: ScopeId,
    pub function: Option<FunctionId>,
    pub context: ContextKey,
}

/// A recognized `isinstance(x, T)` test.
pub(crate) struct NarrowInfo {
    pub name: String,
    pub classes: Vec<ValueId>,
}

impl AnalysisSession {
    // ------------------------------------------------------------------
    // Units
    // ------------------------------------------------------------------

    pub(crate) fn run_unit(
        &mut self,
        unit: UnitId,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        self.current_unit = Some(unit);
        self.unit_deadline = Some(Instant::now() + self.config.limits.unit_timeout);
        self.unit_diagnostics.insert(unit, Vec::new());
        self.narrow_stack.clear();
        self.call_depth = 0;
        let kind = self.queue.kind(unit).clone();
        let result = match kind {
            UnitKind::ModuleTop(module) => self.run_module_top(module, cancel),
            UnitKind::FunctionBody { function, context } => {
                self.run_function_body(function, context, cancel)
            }
        };
        self.current_unit = None;
        self.unit_deadline = None;
        result
    }

    fn run_module_top(
        &mut self,
        module: ModuleId,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let Some(ast) = self.modules.get(module).ast.clone() else {
            return Ok(());
        };
        let Some(scope) = self.modules.get(module).scope else {
            return Ok(());
        };
        let frame = Frame {
            module,
            scope,
            function: None,
            context: ContextKey::Shared,
        };
        if let Some(doc) = body_docstring(&ast.body) {
            self.modules.get_mut(module).doc = Some(doc);
        }
        let check = ast.body.len() > self.config.limits.large_unit_statement_threshold;
        self.exec_statements(&frame, &ast.body, cancel, check)
    }

    fn run_function_body(
        &mut self,
        function: FunctionId,
        context: ContextKey,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        let data = self.store.function(function);
        let module = data.module;
        let scope = data.scope;
        let source = data.source.clone();
        let defaults = data.default_values.clone();
        let frame = Frame {
            module,
            scope,
            function: Some(function),
            context: context.clone(),
        };

        // Seed parameter bindings. The scope variable accumulates the
        // join over all contexts (what queries report); the body itself
        // reads the context's own bindings through shadow frames, which
        // is what makes the Cartesian product algorithm context
        // sensitive.
        let mut params = self
            .store
            .function(function)
            .contexts
            .get(&context)
            .map(|state| state.params.clone())
            .unwrap_or_default();
        for (name, values) in defaults {
            if !params.contains_key(&name) {
                params.insert(name, values);
            }
        }
        for (name, values) in &params {
            self.write_binding(scope, name, values.clone(), &[]);
        }
        for (name, values) in params {
            self.narrow_stack.push(NarrowFrame { name, values });
        }

        match source {
            crate::value::FunctionSource::Def(def) => {
                if let Some(doc) = suite_docstring(&def.body) {
                    self.store.function_mut(function).doc = Some(doc);
                }
                self.exec_suite(&frame, &def.body, cancel)?;
            }
            crate::value::FunctionSource::Lambda(lambda) => {
                let values = self.eval_expr(&frame, &lambda.body);
                self.record_return(&frame, values);
            }
        }
        self.sync_generator_value(function, &context);
        Ok(())
    }

    /// After a generator/coroutine body runs, push the context's yield
    /// and return sets into the generator value callers hold.
    fn sync_generator_value(&mut self, function: FunctionId, context: &ContextKey) {
        let data = self.store.function(function);
        let scope = data.scope;
        let Some(state) = data.contexts.get(context) else {
            return;
        };
        let Some(generator) = state.generator else {
            return;
        };
        let element = state.yields.clone();
        let returns = state.returns.clone();
        let sends = state.sends.clone();
        let limit = self.config.limits.assignment_set_limit;

        let (mut gen_element, mut gen_returns, mut gen_sends) =
            match self.store.get_mut(generator) {
                Value::Generator(gen) => (
                    std::mem::take(&mut gen.element),
                    std::mem::take(&mut gen.returns),
                    std::mem::take(&mut gen.sends),
                ),
                _ => return,
            };
        let mut changed = gen_element.join(&mut self.store, &element, limit);
        changed |= gen_returns.join(&mut self.store, &returns, limit);
        changed |= gen_sends.join(&mut self.store, &sends, limit);
        if let Value::Generator(gen) = self.store.get_mut(generator) {
            gen.element = gen_element;
            gen.returns = gen_returns;
            gen.sends = gen_sends;
        }
        if changed {
            self.notify_binding(scope, "<yields>");
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub(crate) fn exec_suite(
        &mut self,
        frame: &Frame,
        suite: &Suite,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        match suite {
            Suite::Block { body, .. } => self.exec_statements(frame, body, cancel, false),
            Suite::Inline { parts, .. } => {
                for part in parts {
                    self.exec_small(frame, &part.statement, cancel)?;
                }
                Ok(())
            }
        }
    }

    fn exec_statements(
        &mut self,
        frame: &Frame,
        body: &[Statement],
        cancel: &CancellationToken,
        check_cancel: bool,
    ) -> Result<(), Cancelled> {
        let mut narrows_pushed = 0usize;
        let suite_end = body.last().map(|s| s.span().end).unwrap_or(0);
        for statement in body {
            if check_cancel {
                cancel.check()?;
            }
            self.exec_statement(frame, statement, cancel)?;
            // `assert isinstance(x, T)` narrows x for the rest of the
            // suite.
            if let Statement::Simple(line) = statement {
                for part in &line.parts {
                    if let SmallStatement::Assert(assert_stmt) = &part.statement {
                        if let Some(info) = self.isinstance_info(frame, &assert_stmt.test) {
                            let narrowed = self.narrowed_values(frame, &info, true);
                            let span = Span::new(statement.span().start, suite_end);
                            self.push_narrow(frame, &info.name, narrowed, span);
                            narrows_pushed += 1;
                        }
                    }
                }
            }
        }
        for _ in 0..narrows_pushed {
            self.narrow_stack.pop();
        }
        Ok(())
    }

    fn exec_statement(
        &mut self,
        frame: &Frame,
        statement: &Statement,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        match statement {
            Statement::Simple(line) => {
                for part in &line.parts {
                    self.exec_small(frame, &part.statement, cancel)?;
                }
                Ok(())
            }
            Statement::Compound(compound) => self.exec_compound(frame, compound, cancel),
        }
    }

    fn exec_small(
        &mut self,
        frame: &Frame,
        statement: &SmallStatement,
        _cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        match statement {
            SmallStatement::Expr(s) => {
                self.eval_expr(frame, &s.value);
            }
            SmallStatement::Assign(s) => {
                let values = self.eval_assign_value(frame, &s.value);
                let value_span = s.value.span();
                for target in &s.targets {
                    self.assign_target(frame, &target.target, &values, Some(value_span));
                }
            }
            SmallStatement::AugAssign(s) => {
                let current = self.eval_expr(frame, &s.target);
                let rhs = self.eval_expr(frame, &s.value);
                let op = s.op.text.trim_end_matches('=');
                let result = self.binary_result(frame, op, &current, &rhs, s.value.span());
                self.assign_target(frame, &s.target, &result, Some(s.value.span()));
            }
            SmallStatement::AnnAssign(s) => {
                self.eval_expr(frame, &s.annotation);
                if let Some((_, value)) = &s.value {
                    let values = self.eval_expr(frame, value);
                    self.assign_target(frame, &s.target, &values, Some(value.span()));
                } else if let Some(name) = s.target.as_name() {
                    // Bare annotation: record the definition site only.
                    let target_scope = self.scopes.resolve_write(frame.scope, name.value());
                    let site = SiteRef {
                        module: frame.module,
                        span: name.span,
                        kind: SiteKind::Definition,
                    };
                    self.scopes
                        .variable_mut(target_scope, name.value())
                        .record_site(site);
                }
            }
            SmallStatement::Return(s) => {
                let values = match &s.value {
                    Some(value) => self.eval_expr(frame, value),
                    None => ValueSet::one(self.store.primitive(PrimitiveKind::None)),
                };
                self.record_return(frame, values);
            }
            SmallStatement::Del(s) => {
                for (target, _) in &s.targets {
                    self.eval_expr(frame, target);
                }
            }
            SmallStatement::Import(s) => self.exec_import(frame, s),
            SmallStatement::ImportFrom(s) => self.exec_import_from(frame, s),
            SmallStatement::Global(s) => {
                for (name, _) in &s.names {
                    self.scopes
                        .get_mut(frame.scope)
                        .globals
                        .insert(name.value().to_string());
                }
            }
            SmallStatement::Nonlocal(s) => {
                for (name, _) in &s.names {
                    self.scopes
                        .get_mut(frame.scope)
                        .nonlocals
                        .insert(name.value().to_string());
                }
            }
            SmallStatement::Assert(s) => {
                self.eval_expr(frame, &s.test);
                if let Some((_, msg)) = &s.msg {
                    self.eval_expr(frame, msg);
                }
            }
            SmallStatement::Raise(s) => {
                if let Some(exc) = &s.exc {
                    self.eval_expr(frame, exc);
                }
                if let Some((_, cause)) = &s.from_part {
                    self.eval_expr(frame, cause);
                }
                for (_, value) in &s.comma_parts {
                    self.eval_expr(frame, value);
                }
            }
            SmallStatement::Print(s) => {
                if let Some((_, file, _)) = &s.chevron {
                    self.eval_expr(frame, file);
                }
                for (value, _) in &s.args {
                    self.eval_expr(frame, value);
                }
            }
            SmallStatement::Exec(s) => {
                self.eval_expr(frame, &s.body);
                if let Some(in_part) = &s.in_part {
                    self.eval_expr(frame, &in_part.globals);
                    if let Some((_, locals)) = &in_part.locals {
                        self.eval_expr(frame, locals);
                    }
                }
            }
            SmallStatement::Pass(_) | SmallStatement::Break(_) | SmallStatement::Continue(_) => {}
            // Downstream analysis silently skips error nodes.
            SmallStatement::Error(_) => {}
        }
        Ok(())
    }

    fn exec_compound(
        &mut self,
        frame: &Frame,
        compound: &CompoundStatement,
        cancel: &CancellationToken,
    ) -> Result<(), Cancelled> {
        match compound {
            CompoundStatement::FunctionDef(def) => {
                let values = self.define_function(frame, def);
                let sites = [
                    SiteRef {
                        module: frame.module,
                        span: def.name.span,
                        kind: SiteKind::Definition,
                    },
                    SiteRef {
                        module: frame.module,
                        span: def.span,
                        kind: SiteKind::Value,
                    },
                ];
                self.write_binding(frame.scope, def.name.value(), values, &sites);
                Ok(())
            }
            CompoundStatement::ClassDef(def) => self.define_class(frame, def, cancel),
            CompoundStatement::If(s) => {
                self.eval_expr(frame, &s.test);
                let narrow = self.isinstance_info(frame, &s.test);
                match &narrow {
                    Some(info) => {
                        let narrowed = self.narrowed_values(frame, info, true);
                        let span = suite_span(&s.body).unwrap_or(s.span);
                        self.push_narrow(frame, &info.name, narrowed, span);
                        self.exec_suite(frame, &s.body, cancel)?;
                        self.narrow_stack.pop();
                    }
                    None => self.exec_suite(frame, &s.body, cancel)?,
                }
                for elif in &s.elifs {
                    self.eval_expr(frame, &elif.test);
                    self.exec_suite(frame, &elif.body, cancel)?;
                }
                if let Some(orelse) = &s.orelse {
                    match &narrow {
                        Some(info) => {
                            let complement = self.narrowed_values(frame, info, false);
                            let span = suite_span(&orelse.body).unwrap_or(s.span);
                            self.push_narrow(frame, &info.name, complement, span);
                            self.exec_suite(frame, &orelse.body, cancel)?;
                            self.narrow_stack.pop();
                        }
                        None => self.exec_suite(frame, &orelse.body, cancel)?,
                    }
                }
                Ok(())
            }
            CompoundStatement::While(s) => {
                self.eval_expr(frame, &s.test);
                self.exec_suite(frame, &s.body, cancel)?;
                if let Some(orelse) = &s.orelse {
                    self.exec_suite(frame, &orelse.body, cancel)?;
                }
                Ok(())
            }
            CompoundStatement::For(s) => {
                let iter_values = self.eval_expr(frame, &s.iter);
                let element = self.iterate_values(frame, &iter_values, s.iter.span());
                self.assign_target(frame, &s.target, &element, Some(s.iter.span()));
                self.exec_suite(frame, &s.body, cancel)?;
                if let Some(orelse) = &s.orelse {
                    self.exec_suite(frame, &orelse.body, cancel)?;
                }
                Ok(())
            }
            CompoundStatement::With(s) => {
                let is_async = s.async_tok.is_some();
                for item in &s.items {
                    let cm = self.eval_expr(frame, &item.context);
                    let entered = self.enter_context_manager(frame, &cm, is_async, item.context.span());
                    if let Some((_, target)) = &item.as_part {
                        self.assign_target(frame, target, &entered, Some(item.context.span()));
                    }
                }
                self.exec_suite(frame, &s.body, cancel)
            }
            CompoundStatement::Try(s) => {
                self.exec_suite(frame, &s.body, cancel)?;
                for handler in &s.handlers {
                    let mut bound = ValueSet::empty();
                    if let Some(exc_type) = &handler.exc_type {
                        let classes = self.eval_expr(frame, exc_type);
                        bound = self.instances_of_classes(&classes);
                    }
                    if let Some(binding) = &handler.binding {
                        let sites = [SiteRef {
                            module: frame.module,
                            span: binding.name.span,
                            kind: SiteKind::Definition,
                        }];
                        self.write_binding(frame.scope, binding.name.value(), bound, &sites);
                    }
                    self.exec_suite(frame, &handler.body, cancel)?;
                }
                if let Some(orelse) = &s.orelse {
                    self.exec_suite(frame, &orelse.body, cancel)?;
                }
                if let Some(finally) = &s.finally {
                    self.exec_suite(frame, &finally.body, cancel)?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Narrowing
    // ------------------------------------------------------------------

    /// Recognize `isinstance(x, T)` / `isinstance(x, (T1, T2))` with a
    /// plain-name subject.
    pub(crate) fn isinstance_info(
        &mut self,
        frame: &Frame,
        test: &Expression,
    ) -> Option<NarrowInfo> {
        let Expression::Call(call) = test.unparenthesized() else {
            return None;
        };
        if call.func.as_name()?.value() != "isinstance" {
            return None;
        }
        let positional: Vec<&Expression> = call
            .args
            .iter()
            .filter(|arg| arg.is_positional())
            .map(|arg| &arg.value)
            .collect();
        let [subject, class_expr] = positional.as_slice() else {
            return None;
        };
        let name = subject.as_name()?.value().to_string();
        let class_values = self.eval_expr(frame, class_expr);
        let mut classes = Vec::new();
        for id in class_values.iter() {
            match self.store.get(id) {
                Value::Class(_) => classes.push(id),
                Value::Sequence(seq) => {
                    for set in seq.elements.iter().chain(std::iter::once(&seq.fallback)) {
                        for inner in set.iter() {
                            if matches!(self.store.get(inner), Value::Class(_)) {
                                classes.push(inner);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        if classes.is_empty() {
            return None;
        }
        Some(NarrowInfo { name, classes })
    }

    /// Filter a variable's set by the isinstance test. The true branch
    /// keeps matching values, synthesizing an instance of the tested
    /// class when nothing matches yet; the false branch keeps the
    /// complement.
    pub(crate) fn narrowed_values(
        &mut self,
        frame: &Frame,
        info: &NarrowInfo,
        positive: bool,
    ) -> ValueSet {
        let current = match self.scopes.resolve_read(frame.scope, &info.name) {
            Some(scope) => self.scopes.get(scope).variables[&info.name].values.clone(),
            None => ValueSet::empty(),
        };
        let mut result = ValueSet::empty();
        let limit = self.config.limits.assignment_set_limit;
        for id in current.iter() {
            let matches = info
                .classes
                .iter()
                .any(|class| self.builtins.is_instance_of(&self.store, id, *class));
            if matches == positive {
                result.join_id(&mut self.store, id, limit);
            }
        }
        if positive && result.is_empty() {
            for class in &info.classes {
                let instance = self.class_exemplar(*class);
                result.join_id(&mut self.store, instance, limit);
            }
        }
        result
    }

    /// An exemplar instance of a class: the interned primitive for
    /// builtin scalar classes, the canonical instance otherwise.
    pub(crate) fn class_exemplar(&mut self, class: ValueId) -> ValueId {
        if let Value::Class(c) = self.store.get(class) {
            if let Some(crate::value::BuiltinClassKind::Primitive(kind)) = c.builtin {
                return self.store.primitive(kind);
            }
        }
        self.store.instance_of(class)
    }

    fn push_narrow(&mut self, frame: &Frame, name: &str, values: ValueSet, span: Span) {
        // Materialize the narrowed sub-scope for position queries.
        let key = (frame.scope, span.start, name.to_string());
        let narrow_scope = match self.narrow_cache.get(&key) {
            Some(id) => *id,
            None => {
                let id = self.scopes.alloc(
                    Some(frame.scope),
                    ScopeKind::Narrowed,
                    Some(frame.module),
                    Some(span),
                );
                self.narrow_cache.insert(key, id);
                id
            }
        };
        self.scopes.variable_mut(narrow_scope, name).values = values.clone();
        self.narrow_stack.push(NarrowFrame {
            name: name.to_string(),
            values,
        });
    }

    /// Canonical instances for a set of class values.
    pub(crate) fn instances_of_classes(&mut self, classes: &ValueSet) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        let class_ids: Vec<ValueId> = classes
            .iter()
            .filter(|id| matches!(self.store.get(*id), Value::Class(_)))
            .collect();
        for class in class_ids {
            let instance = self.store.instance_of(class);
            result.join_id(&mut self.store, instance, limit);
        }
        result
    }

    // ------------------------------------------------------------------
    // Returns and yields
    // ------------------------------------------------------------------

    pub(crate) fn record_return(&mut self, frame: &Frame, values: ValueSet) {
        let Some(function) = frame.function else {
            return;
        };
        let limit = self.config.limits.assignment_set_limit;
        let mut returns = {
            let state = self
                .store
                .function_mut(function)
                .contexts
                .entry(frame.context.clone())
                .or_default();
            std::mem::take(&mut state.returns)
        };
        let changed = returns.join(&mut self.store, &values, limit);
        let scope = self.store.function(function).scope;
        let state = self
            .store
            .function_mut(function)
            .contexts
            .entry(frame.context.clone())
            .or_default();
        state.returns = returns;
        if changed {
            self.notify_binding(scope, "<returns>");
        }
    }

    pub(crate) fn record_yield(&mut self, frame: &Frame, values: ValueSet) {
        let Some(function) = frame.function else {
            return;
        };
        let limit = self.config.limits.assignment_set_limit;
        let mut yields = {
            let state = self
                .store
                .function_mut(function)
                .contexts
                .entry(frame.context.clone())
                .or_default();
            std::mem::take(&mut state.yields)
        };
        let changed = yields.join(&mut self.store, &values, limit);
        let scope = self.store.function(function).scope;
        let state = self
            .store
            .function_mut(function)
            .contexts
            .entry(frame.context.clone())
            .or_default();
        state.yields = yields;
        if changed {
            self.notify_binding(scope, "<yields>");
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn exec_import(&mut self, frame: &Frame, statement: &pythia_cst::ImportStatement) {
        for alias in &statement.names {
            let dotted = alias.name.dotted();
            // `sys.modules` overrides win over the search path.
            if let Some(values) = self.sys_overrides.get(&dotted).cloned() {
                let sites = [SiteRef {
                    module: frame.module,
                    span: alias.span,
                    kind: SiteKind::Definition,
                }];
                self.write_binding(frame.scope, alias.bound_name(), values, &sites);
                continue;
            }
            match self.resolve_for_import(frame.module, &dotted) {
                Some(target) => {
                    self.modules.add_dependency(frame.module, target);
                    let bound = match &alias.as_name {
                        Some(_) => target,
                        // Plain `import a.b` binds `a`.
                        None => {
                            let head = alias.name.head().to_string();
                            self.resolve_for_import(frame.module, &head).unwrap_or(target)
                        }
                    };
                    let value = self.store.module_value(bound);
                    let sites = [SiteRef {
                        module: frame.module,
                        span: alias.span,
                        kind: SiteKind::Definition,
                    }];
                    self.write_binding(
                        frame.scope,
                        alias.bound_name(),
                        ValueSet::one(value),
                        &sites,
                    );
                }
                None => {
                    self.diagnostic(Diagnostic::new(
                        DiagnosticCode::UnresolvedImport,
                        alias.span,
                        format!("unresolved import '{dotted}'"),
                    ));
                    let sites = [SiteRef {
                        module: frame.module,
                        span: alias.span,
                        kind: SiteKind::Definition,
                    }];
                    self.write_binding(frame.scope, alias.bound_name(), ValueSet::empty(), &sites);
                }
            }
        }
    }

    fn exec_import_from(&mut self, frame: &Frame, statement: &pythia_cst::ImportFromStatement) {
        let module_name = statement.module.as_ref().map(|m| m.dotted());
        // `from __future__ import division` flips true division.
        if module_name.as_deref() == Some("__future__") {
            if let pythia_cst::ImportNames::Aliases(aliases) = &statement.names {
                for alias in aliases {
                    if alias.name.text == "division" {
                        self.modules.get_mut(frame.module).future_division = true;
                    }
                }
            }
            return;
        }
        let base = self.relative_base(
            frame.module,
            statement.level(),
            module_name.as_deref(),
            statement.span,
        );
        let Some(base) = base else {
            if statement.level() == 0 {
                self.diagnostic(Diagnostic::new(
                    DiagnosticCode::UnresolvedImport,
                    statement.span,
                    "unresolved import",
                ));
            }
            return;
        };
        let target = if statement.level() == 0 {
            self.resolve_for_import(frame.module, &base)
        } else {
            self.ensure_module(&base)
        };
        let Some(target) = target else {
            self.diagnostic(Diagnostic::new(
                DiagnosticCode::UnresolvedImport,
                statement.span,
                format!("unresolved import '{base}'"),
            ));
            if let pythia_cst::ImportNames::Aliases(aliases) = &statement.names {
                for alias in aliases {
                    let sites = [SiteRef {
                        module: frame.module,
                        span: alias.span,
                        kind: SiteKind::Definition,
                    }];
                    self.write_binding(frame.scope, alias.bound_name(), ValueSet::empty(), &sites);
                }
            }
            return;
        };
        self.modules.add_dependency(frame.module, target);
        let Some(target_scope) = self.modules.get(target).scope else {
            return;
        };
        match &statement.names {
            pythia_cst::ImportNames::Star(star) => {
                if let Some(unit) = self.current_unit {
                    self.queue.record_read(unit, (target_scope, "*".to_string()));
                }
                let names = self.star_export_names(target);
                for name in names {
                    let values = self.read_binding(target_scope, &name, frame.module, star.span);
                    let sites = [SiteRef {
                        module: frame.module,
                        span: statement.span,
                        kind: SiteKind::Definition,
                    }];
                    self.write_binding(frame.scope, &name, values, &sites);
                }
            }
            pythia_cst::ImportNames::Aliases(aliases) => {
                for alias in aliases {
                    let name = alias.name.text.clone();
                    let mut values =
                        self.read_binding(target_scope, &name, frame.module, alias.name.span);
                    if values.is_empty() && self.modules.get(target).is_package {
                        // The name may be a submodule of the package.
                        let submodule = format!("{}.{name}", self.modules.get(target).name);
                        if let Some(sub) = self.ensure_module(&submodule) {
                            self.modules.add_dependency(frame.module, sub);
                            let value = self.store.module_value(sub);
                            values = ValueSet::one(value);
                        }
                    }
                    let sites = [SiteRef {
                        module: frame.module,
                        span: alias.span,
                        kind: SiteKind::Definition,
                    }];
                    self.write_binding(frame.scope, alias.bound_name(), values, &sites);
                }
            }
        }
    }
}

// ============================================================================
// Suite helpers
// ============================================================================

/// The span covered by a suite's statements.
pub(crate) fn suite_span(suite: &Suite) -> Option<Span> {
    match suite {
        Suite::Block { body, .. } => {
            let first = body.first()?.span();
            let last = body.last()?.span();
            Some(first.cover(last))
        }
        Suite::Inline { parts, .. } => {
            let first = parts.first()?.statement.span();
            let last = parts.last()?.statement.span();
            Some(first.cover(last))
        }
    }
}

/// The docstring of a suite whose first statement is a string literal.
pub(crate) fn suite_docstring(suite: &Suite) -> Option<String> {
    match suite {
        Suite::Block { body, .. } => body_docstring(body),
        Suite::Inline { parts, .. } => parts_docstring(parts),
    }
}

fn body_docstring(body: &[Statement]) -> Option<String> {
    match body.first()? {
        Statement::Simple(line) => parts_docstring(&line.parts),
        Statement::Compound(_) => None,
    }
}

fn parts_docstring(parts: &[pythia_cst::SmallStatementPart]) -> Option<String> {
    match &parts.first()?.statement {
        SmallStatement::Expr(expr) => match expr.value.unparenthesized() {
            Expression::Str(s) => Some(s.value()),
            Expression::Concatenated(c) => {
                Some(c.parts.iter().map(|p| p.value()).collect::<String>())
            }
            _ => None,
        },
        _ => None,
    }
}
