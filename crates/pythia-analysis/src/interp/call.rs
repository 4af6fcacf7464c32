//! Calls, function and class definition, and call-context sensitivity.
//!
//! User-defined calls run under the Cartesian product algorithm: each
//! distinct argument-summary tuple gets its own parameter bindings and
//! return set, keyed by [`ContextKey`]. The context depth is bounded;
//! once the call chain is deeper than the configured budget (or the call
//! uses `*`/`**` unpacking), calls share one context.

use std::sync::Arc;

use indexmap::IndexMap;

use pythia_core::diagnostics::{Diagnostic, DiagnosticCode};
use pythia_core::span::Span;
use pythia_cst::{
    CallArg, CallExpr, Expression, FunctionDef, Param, Parameters, SmallStatement, Statement,
    Suite,
};

use crate::interp::{suite_docstring, Frame};
use crate::queue::UnitKind;
use crate::scope::{ScopeId, ScopeKind, SiteKind, SiteRef};
use crate::session::AnalysisSession;
use crate::value::{
    BuiltinClassKind, BuiltinFn, BuiltinMethodKind, ClassValue, ContextKey, DictValue,
    FunctionData, FunctionId, FunctionSource, GeneratorValue, PrimitiveKind, ProtocolValue,
    SequenceKind, SequenceValue, Value, ValueId, ValueSet,
};

/// Evaluated call-site arguments.
#[derive(Debug, Default, Clone)]
pub(crate) struct EvalArgs {
    pub positional: Vec<ValueSet>,
    pub keywords: Vec<(String, ValueSet)>,
    /// Elements of `*args` unpacking at the call site.
    pub star_rest: ValueSet,
    /// Values of `**kwargs` unpacking at the call site.
    pub keyword_rest: ValueSet,
    /// Unpacking makes the binding imprecise; such calls share context.
    pub has_unpacking: bool,
}

impl AnalysisSession {
    // ------------------------------------------------------------------
    // Call sites
    // ------------------------------------------------------------------

    pub(crate) fn eval_call_expr(&mut self, frame: &Frame, call: &CallExpr) -> ValueSet {
        let callee = self.eval_expr(frame, &call.func);
        let args = self.eval_call_args(frame, &call.args);
        self.call_values(frame, &callee, &args, call.node_id.as_u32(), call.span)
    }

    pub(crate) fn eval_call_args(&mut self, frame: &Frame, args: &[CallArg]) -> EvalArgs {
        let limit = self.config.limits.assignment_set_limit;
        let mut out = EvalArgs::default();
        for arg in args {
            match (&arg.star, arg.keyword_name()) {
                (Some(star), _) if star.text == "*" => {
                    let values = self.eval_expr(frame, &arg.value);
                    let elements = self.iterate_values(frame, &values, arg.value.span());
                    out.star_rest.join(&mut self.store, &elements, limit);
                    out.has_unpacking = true;
                }
                (Some(_), _) => {
                    let values = self.eval_expr(frame, &arg.value);
                    for id in values.iter() {
                        if let Value::Dict(dict) = self.store.get(id) {
                            let dict_values = dict.values.clone();
                            out.keyword_rest.join(&mut self.store, &dict_values, limit);
                        }
                    }
                    out.has_unpacking = true;
                }
                (None, Some(name)) => {
                    let name = name.to_string();
                    let values = self.eval_expr(frame, &arg.value);
                    out.keywords.push((name, values));
                }
                (None, None) => {
                    let values = self.eval_expr(frame, &arg.value);
                    out.positional.push(values);
                }
            }
        }
        out
    }

    /// Call every callable element of `callee`; the result is the join.
    pub(crate) fn call_values(
        &mut self,
        frame: &Frame,
        callee: &ValueSet,
        args: &EvalArgs,
        site_node: u32,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        let mut any_callable = false;
        self.call_depth += 1;
        for id in callee.iter() {
            if !self.store.is_callable(id) {
                continue;
            }
            any_callable = true;
            let one = self.call_single(frame, id, args, site_node, span);
            result.join(&mut self.store, &one, limit);
        }
        self.call_depth -= 1;
        if !any_callable && !callee.is_empty() {
            self.diagnostic(Diagnostic::new(
                DiagnosticCode::NotCallable,
                span,
                "value is not callable",
            ));
        }
        result
    }

    fn call_single(
        &mut self,
        frame: &Frame,
        callee: ValueId,
        args: &EvalArgs,
        site_node: u32,
        span: Span,
    ) -> ValueSet {
        match self.store.get(callee).clone() {
            Value::Any => ValueSet::one(self.store.any()),
            Value::Function(function) => self.call_function(frame, function, args, None),
            Value::BoundMethod { function, receiver } => {
                let Value::Function(fid) = *self.store.get(function) else {
                    return ValueSet::empty();
                };
                if self.store.function(fid).is_staticmethod {
                    self.call_function(frame, fid, args, None)
                } else {
                    self.call_function(frame, fid, args, Some(receiver))
                }
            }
            Value::Class(class) => self.construct(frame, callee, &class, args, site_node, span),
            Value::Builtin(builtin) => self.call_builtin(frame, builtin, args, site_node, span),
            Value::BuiltinMethod { kind, receiver } => {
                self.call_builtin_method(frame, kind, receiver, args, span)
            }
            Value::Partial {
                callee: inner,
                args: bound_args,
                keywords: bound_keywords,
            } => {
                // `functools.wraps(g)` used as a decorator returns its
                // argument unchanged.
                if matches!(self.store.get(inner), Value::Builtin(BuiltinFn::Wraps)) {
                    let limit = self.config.limits.assignment_set_limit;
                    let mut out = ValueSet::empty();
                    for set in &args.positional {
                        out.join(&mut self.store, set, limit);
                    }
                    return out;
                }
                let mut combined = EvalArgs {
                    positional: bound_args.clone(),
                    keywords: bound_keywords.clone(),
                    ..Default::default()
                };
                combined.positional.extend(args.positional.iter().cloned());
                combined.keywords.extend(args.keywords.iter().cloned());
                combined.star_rest = args.star_rest.clone();
                combined.keyword_rest = args.keyword_rest.clone();
                combined.has_unpacking = args.has_unpacking;
                let inner_set = ValueSet::one(inner);
                self.call_values(frame, &inner_set, &combined, site_node, span)
            }
            Value::Protocol(ProtocolValue::Callable { returns }) => returns,
            Value::Instance(_) => {
                // `x()` goes through the class-level `__call__`.
                let call_member = self.special_member(frame, callee, "__call__");
                if call_member.is_empty() {
                    return ValueSet::empty();
                }
                self.call_values(frame, &call_member, args, site_node, span)
            }
            _ => ValueSet::empty(),
        }
    }

    // ------------------------------------------------------------------
    // User functions: the Cartesian product algorithm
    // ------------------------------------------------------------------

    pub(crate) fn call_function(
        &mut self,
        frame: &Frame,
        function: FunctionId,
        args: &EvalArgs,
        receiver: Option<ValueId>,
    ) -> ValueSet {
        let bindings = self.bind_arguments(frame, function, args, receiver);
        let context = self.context_key_for(function, args, &bindings);

        // Join the bindings into the context state, tracking growth.
        let limit = self.config.limits.assignment_set_limit;
        let mut changed = false;
        for (name, values) in &bindings {
            let mut current = {
                let state = self
                    .store
                    .function_mut(function)
                    .contexts
                    .entry(context.clone())
                    .or_default();
                std::mem::take(state.params.entry(name.clone()).or_default())
            };
            changed |= current.join(&mut self.store, values, limit);
            let state = self
                .store
                .function_mut(function)
                .contexts
                .entry(context.clone())
                .or_default();
            state.params.insert(name.clone(), current);
        }

        let unit = self.queue.ensure_unit(UnitKind::FunctionBody {
            function,
            context: context.clone(),
        });
        if changed || self.queue.runs(unit) == 0 {
            self.queue.enqueue(unit);
        }

        // Re-run this caller when the function's outputs change.
        let data = self.store.function(function);
        let scope = data.scope;
        let is_generator = data.is_generator;
        let is_async = data.is_async;
        if let Some(current) = self.current_unit {
            self.queue.record_read(current, (scope, "<returns>".to_string()));
            if is_generator || is_async {
                self.queue.record_read(current, (scope, "<yields>".to_string()));
            }
        }

        if is_generator || is_async {
            return ValueSet::one(self.generator_for_context(function, &context, is_async));
        }
        self.store
            .function(function)
            .contexts
            .get(&context)
            .map(|state| state.returns.clone())
            .unwrap_or_default()
    }

    /// The generator/coroutine value handed to callers for one context.
    fn generator_for_context(
        &mut self,
        function: FunctionId,
        context: &ContextKey,
        is_coroutine: bool,
    ) -> ValueId {
        if let Some(state) = self.store.function(function).contexts.get(context) {
            if let Some(generator) = state.generator {
                return generator;
            }
        }
        let id = self.store.alloc(Value::Generator(GeneratorValue {
            element: ValueSet::empty(),
            returns: ValueSet::empty(),
            sends: ValueSet::empty(),
            is_coroutine,
        }));
        let state = self
            .store
            .function_mut(function)
            .contexts
            .entry(context.clone())
            .or_default();
        state.generator = Some(id);
        id
    }

    fn context_key_for(
        &mut self,
        function: FunctionId,
        args: &EvalArgs,
        bindings: &IndexMap<String, ValueSet>,
    ) -> ContextKey {
        let depth_budget = self.config.limits.call_context_depth;
        let context_cap = 16;
        if args.has_unpacking
            || self.call_depth > depth_budget
            || self.store.function(function).contexts.len() >= context_cap
        {
            return ContextKey::Shared;
        }
        let summaries: Vec<Vec<u32>> = bindings.values().map(|set| set.summary()).collect();
        let key = ContextKey::Args(summaries);
        // Contexts with equivalent bindings share state by construction:
        // equal summaries produce equal keys.
        key
    }

    /// Match evaluated arguments against the function's parameter list,
    /// following Python's binding rules.
    fn bind_arguments(
        &mut self,
        frame: &Frame,
        function: FunctionId,
        args: &EvalArgs,
        receiver: Option<ValueId>,
    ) -> IndexMap<String, ValueSet> {
        let limit = self.config.limits.assignment_set_limit;
        let data = self.store.function(function);
        let module = data.module;
        let params = function_params(&data.source);
        let is_classmethod = data.is_classmethod;
        let enclosing_class = data.enclosing_class;

        let mut positional: Vec<ValueSet> = Vec::new();
        match receiver {
            Some(receiver) if is_classmethod => {
                // The implicit first argument of a classmethod is the
                // class itself.
                let class = match self.store.get(receiver) {
                    Value::Instance(instance) => instance.class,
                    _ => receiver,
                };
                positional.push(ValueSet::one(class));
            }
            Some(receiver) => positional.push(ValueSet::one(receiver)),
            None if is_classmethod => {
                if let Some(class) = enclosing_class {
                    positional.push(ValueSet::one(class));
                }
            }
            None => {}
        }
        positional.extend(args.positional.iter().cloned());

        let mut bindings: IndexMap<String, ValueSet> = IndexMap::new();
        let mut next_positional = 0usize;
        let mut used_keywords: Vec<&str> = Vec::new();
        for param in &params {
            match param {
                ParamSpec::Plain { name, node } => {
                    let mut values = ValueSet::empty();
                    if next_positional < positional.len() {
                        values = positional[next_positional].clone();
                        next_positional += 1;
                    } else if let Some((_, keyword_values)) =
                        args.keywords.iter().find(|(n, _)| n == name)
                    {
                        values = keyword_values.clone();
                        used_keywords.push(name);
                    } else if !args.star_rest.is_empty() {
                        values = args.star_rest.clone();
                    } else if !args.keyword_rest.is_empty() {
                        values = args.keyword_rest.clone();
                    }
                    let _ = node;
                    bindings.insert(name.clone(), values);
                }
                ParamSpec::StarArgs { name, node } => {
                    // Collect extras into a tuple.
                    let mut extras = ValueSet::empty();
                    while next_positional < positional.len() {
                        let values = positional[next_positional].clone();
                        extras.join(&mut self.store, &values, limit);
                        next_positional += 1;
                    }
                    extras.join(&mut self.store, &args.star_rest.clone(), limit);
                    let tuple = self.store.site_value(module, *node, || {
                        Value::Sequence(SequenceValue {
                            kind: SequenceKind::Tuple,
                            elements: Vec::new(),
                            fallback: ValueSet::empty(),
                            known_len: None,
                        })
                    });
                    let mut fallback = match self.store.get_mut(tuple) {
                        Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                        _ => ValueSet::empty(),
                    };
                    fallback.join(&mut self.store, &extras, limit);
                    if let Value::Sequence(seq) = self.store.get_mut(tuple) {
                        seq.fallback = fallback;
                    }
                    bindings.insert(name.clone(), ValueSet::one(tuple));
                }
                ParamSpec::KwArgs { name, node } => {
                    // Remaining keywords collect into a dict. This dict
                    // is call-binding scaffolding; it is not tracked
                    // across calls.
                    let mut values = ValueSet::empty();
                    for (keyword, keyword_values) in &args.keywords {
                        if !used_keywords.contains(&keyword.as_str())
                            && !bindings.contains_key(keyword)
                        {
                            values.join(&mut self.store, keyword_values, limit);
                        }
                    }
                    values.join(&mut self.store, &args.keyword_rest.clone(), limit);
                    let str_prim = self.store.primitive(PrimitiveKind::Str);
                    let dict = self.store.site_value(module, *node, || {
                        Value::Dict(DictValue::default())
                    });
                    let (mut keys, mut dict_values) = match self.store.get_mut(dict) {
                        Value::Dict(d) => {
                            (std::mem::take(&mut d.keys), std::mem::take(&mut d.values))
                        }
                        _ => (ValueSet::empty(), ValueSet::empty()),
                    };
                    keys.join_id(&mut self.store, str_prim, limit);
                    dict_values.join(&mut self.store, &values, limit);
                    if let Value::Dict(d) = self.store.get_mut(dict) {
                        d.keys = keys;
                        d.values = dict_values;
                    }
                    bindings.insert(name.clone(), ValueSet::one(dict));
                }
            }
        }
        let _ = frame;
        bindings
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    fn construct(
        &mut self,
        frame: &Frame,
        class_id: ValueId,
        class: &ClassValue,
        args: &EvalArgs,
        site_node: u32,
        span: Span,
    ) -> ValueSet {
        match class.builtin {
            Some(BuiltinClassKind::Primitive(kind)) => {
                ValueSet::one(self.store.primitive(kind))
            }
            Some(BuiltinClassKind::Sequence(kind)) => {
                let element = match args.positional.first() {
                    Some(arg) => self.iterate_values(frame, &arg.clone(), span),
                    None => ValueSet::empty(),
                };
                let limit = self.config.limits.assignment_set_limit;
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Sequence(SequenceValue {
                        kind,
                        elements: Vec::new(),
                        fallback: ValueSet::empty(),
                        known_len: None,
                    })
                });
                let mut fallback = match self.store.get_mut(id) {
                    Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                    _ => ValueSet::empty(),
                };
                fallback.join(&mut self.store, &element, limit);
                if let Value::Sequence(seq) = self.store.get_mut(id) {
                    seq.fallback = fallback;
                }
                ValueSet::one(id)
            }
            Some(BuiltinClassKind::Dict) => {
                let limit = self.config.limits.assignment_set_limit;
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Dict(DictValue::default())
                });
                // dict(d) copies; dict(a=1) has string keys.
                if let Some(arg) = args.positional.first() {
                    let arg = arg.clone();
                    for source in arg.iter() {
                        if let Value::Dict(dict) = self.store.get(source) {
                            let (source_keys, source_values) =
                                (dict.keys.clone(), dict.values.clone());
                            let (mut keys, mut values) = match self.store.get_mut(id) {
                                Value::Dict(d) => (
                                    std::mem::take(&mut d.keys),
                                    std::mem::take(&mut d.values),
                                ),
                                _ => (ValueSet::empty(), ValueSet::empty()),
                            };
                            keys.join(&mut self.store, &source_keys, limit);
                            values.join(&mut self.store, &source_values, limit);
                            if let Value::Dict(d) = self.store.get_mut(id) {
                                d.keys = keys;
                                d.values = values;
                            }
                        }
                    }
                }
                if !args.keywords.is_empty() {
                    let str_prim = self.store.primitive(PrimitiveKind::Str);
                    for (name, values) in args.keywords.clone() {
                        let (mut keys, mut dict_values, mut slot) = match self.store.get_mut(id) {
                            Value::Dict(d) => (
                                std::mem::take(&mut d.keys),
                                std::mem::take(&mut d.values),
                                std::mem::take(d.specialized.entry(name.clone()).or_default()),
                            ),
                            _ => (ValueSet::empty(), ValueSet::empty(), ValueSet::empty()),
                        };
                        keys.join_id(&mut self.store, str_prim, limit);
                        dict_values.join(&mut self.store, &values, limit);
                        slot.join(&mut self.store, &values, limit);
                        if let Value::Dict(d) = self.store.get_mut(id) {
                            d.keys = keys;
                            d.values = dict_values;
                            d.specialized.insert(name, slot);
                        }
                    }
                }
                ValueSet::one(id)
            }
            Some(BuiltinClassKind::Type) => {
                // One-argument `type(x)` answers the class of x.
                if args.positional.len() == 1 {
                    let limit = self.config.limits.assignment_set_limit;
                    let mut result = ValueSet::empty();
                    let arg = args.positional[0].clone();
                    for id in arg.iter() {
                        if let Some(class) = self.builtins.class_of(&self.store, id) {
                            result.join_id(&mut self.store, class, limit);
                        }
                    }
                    return result;
                }
                ValueSet::one(self.store.instance_of(class_id))
            }
            _ => {
                // User classes (and exceptions, files, object): run
                // __new__ and __init__ when user-defined, then hand out
                // the canonical instance.
                let instance = self.store.instance_of(class_id);
                for special in ["__new__", "__init__"] {
                    let member = self.class_member_raw(class_id, special);
                    for id in member.iter().collect::<Vec<_>>() {
                        if let Value::Function(fid) = *self.store.get(id) {
                            self.call_function(frame, fid, args, Some(instance));
                        }
                    }
                }
                ValueSet::one(instance)
            }
        }
    }

    // ------------------------------------------------------------------
    // Function definition
    // ------------------------------------------------------------------

    pub(crate) fn define_function(&mut self, frame: &Frame, def: &FunctionDef) -> ValueSet {
        let node = def.node_id.as_u32();
        let value_id = match self.store.function_site(frame.module, node) {
            Some(existing) => existing,
            None => {
                let enclosing_class = match self.scopes.get(frame.scope).kind {
                    ScopeKind::Class { class } => class,
                    _ => None,
                };
                let qualname = self.qualname_in(frame, def.name.value());
                let function = self.store.alloc_function(FunctionData {
                    source: FunctionSource::Def(Arc::new(def.clone())),
                    module: frame.module,
                    parent_scope: frame.scope,
                    scope: ScopeId(u32::MAX),
                    name: def.name.value().to_string(),
                    qualname,
                    doc: suite_docstring(&def.body),
                    is_async: def.is_async(),
                    is_generator: suite_has_yield(&def.body),
                    is_staticmethod: false,
                    is_classmethod: false,
                    is_property: false,
                    enclosing_class,
                    default_values: IndexMap::new(),
                    contexts: IndexMap::new(),
                });
                let scope = self.scopes.alloc(
                    Some(frame.scope),
                    ScopeKind::Function(function),
                    Some(frame.module),
                    Some(def.span),
                );
                self.store.function_mut(function).scope = scope;
                self.collect_declarations(scope, &def.body);
                let id = self.store.alloc(Value::Function(function));
                self.store.cache_site(frame.module, node, id);
                // Analyze the body once even if nothing calls it, so
                // queries and diagnostics cover uncalled functions.
                let unit = self.queue.ensure_unit(UnitKind::FunctionBody {
                    function,
                    context: crate::value::ContextKey::Shared,
                });
                self.queue.enqueue(unit);
                id
            }
        };
        let Value::Function(function) = *self.store.get(value_id) else {
            return ValueSet::one(value_id);
        };
        let scope = self.store.function(function).scope;

        // Parameter names become definition sites in the function scope.
        for param in &def.params.params {
            if let Some(name) = param.name() {
                let site = SiteRef {
                    module: frame.module,
                    span: param.span,
                    kind: SiteKind::Definition,
                };
                self.scopes.variable_mut(scope, name).record_site(site);
            }
        }

        // Defaults are evaluated at definition time, in the enclosing
        // scope.
        let mut defaults = IndexMap::new();
        for param in &def.params.params {
            if let (Some(name), Some((_, default))) = (param.name(), &param.default) {
                let values = self.eval_expr(frame, default);
                defaults.insert(name.to_string(), values);
            }
            if let Some((_, annotation)) = &param.annotation {
                self.eval_expr(frame, annotation);
            }
        }
        if let Some((_, returns)) = &def.returns {
            self.eval_expr(frame, returns);
        }
        self.store.function_mut(function).default_values = defaults;

        self.apply_decorators(frame, def, value_id, function)
    }

    pub(crate) fn define_lambda(&mut self, frame: &Frame, expr: &Expression) -> ValueSet {
        let Expression::Lambda(lambda) = expr else {
            return ValueSet::empty();
        };
        let node = expr.node_id().as_u32();
        if let Some(existing) = self.store.function_site(frame.module, node) {
            return ValueSet::one(existing);
        }
        let qualname = self.qualname_in(frame, "<lambda>");
        let function = self.store.alloc_function(FunctionData {
            source: FunctionSource::Lambda(Arc::new((**lambda).clone())),
            module: frame.module,
            parent_scope: frame.scope,
            scope: ScopeId(u32::MAX),
            name: "<lambda>".to_string(),
            qualname,
            doc: None,
            is_async: false,
            is_generator: false,
            is_staticmethod: false,
            is_classmethod: false,
            is_property: false,
            enclosing_class: None,
            default_values: IndexMap::new(),
            contexts: IndexMap::new(),
        });
        let scope = self.scopes.alloc(
            Some(frame.scope),
            ScopeKind::Lambda(function),
            Some(frame.module),
            Some(expr.span()),
        );
        self.store.function_mut(function).scope = scope;
        let mut defaults = IndexMap::new();
        for param in &lambda.params.params {
            if let (Some(name), Some((_, default))) = (param.name(), &param.default) {
                let values = self.eval_expr(frame, default);
                defaults.insert(name.to_string(), values);
            }
        }
        self.store.function_mut(function).default_values = defaults;
        let id = self.store.alloc(Value::Function(function));
        self.store.cache_site(frame.module, node, id);
        ValueSet::one(id)
    }

    fn apply_decorators(
        &mut self,
        frame: &Frame,
        def: &FunctionDef,
        value_id: ValueId,
        function: FunctionId,
    ) -> ValueSet {
        let mut result = ValueSet::one(value_id);
        for decorator in def.decorators.iter().rev() {
            let decorator_values = self.eval_expr(frame, &decorator.expression);
            let mut recognized = false;
            for id in decorator_values.iter() {
                match self.store.get(id) {
                    Value::Builtin(BuiltinFn::Staticmethod) => {
                        self.store.function_mut(function).is_staticmethod = true;
                        recognized = true;
                    }
                    Value::Builtin(BuiltinFn::Classmethod) => {
                        self.store.function_mut(function).is_classmethod = true;
                        recognized = true;
                    }
                    Value::Builtin(BuiltinFn::Property) => {
                        self.store.function_mut(function).is_property = true;
                        recognized = true;
                    }
                    _ => {}
                }
            }
            if recognized {
                continue;
            }
            let args = EvalArgs {
                positional: vec![result.clone()],
                ..Default::default()
            };
            let wrapped = self.call_values(
                frame,
                &decorator_values,
                &args,
                decorator.node_id.as_u32(),
                decorator.span,
            );
            if !wrapped.is_empty() {
                result = wrapped;
            }
        }
        result
    }

    /// Qualified name of a definition in the current frame.
    fn qualname_in(&self, frame: &Frame, name: &str) -> String {
        let prefix = match self.scopes.get(frame.scope).kind {
            ScopeKind::Module(module) => self.modules.get(module).name.clone(),
            ScopeKind::Class { class: Some(class) } => match self.store.get(class) {
                Value::Class(c) => c.qualname.clone(),
                _ => String::new(),
            },
            ScopeKind::Function(function) | ScopeKind::Lambda(function) => {
                self.store.function(function).qualname.clone()
            }
            _ => self.modules.get(frame.module).name.clone(),
        };
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        }
    }

    /// Shallow scan for `global`/`nonlocal` declarations; nested
    /// function and class bodies keep their own.
    fn collect_declarations(&mut self, scope: ScopeId, suite: &Suite) {
        let mut globals = Vec::new();
        let mut nonlocals = Vec::new();
        collect_declarations_in_suite(suite, &mut globals, &mut nonlocals);
        let scope = self.scopes.get_mut(scope);
        scope.globals.extend(globals);
        scope.nonlocals.extend(nonlocals);
    }

    // ------------------------------------------------------------------
    // Class definition
    // ------------------------------------------------------------------

    pub(crate) fn define_class(
        &mut self,
        frame: &Frame,
        def: &pythia_cst::ClassDef,
        cancel: &pythia_core::cancel::CancellationToken,
    ) -> Result<(), pythia_core::cancel::Cancelled> {
        let node = def.node_id.as_u32();

        // Bases are evaluated before the body, in the enclosing scope.
        let mut bases = Vec::new();
        if let Some(arguments) = &def.arguments {
            for arg in &arguments.args {
                if !arg.is_positional() {
                    self.eval_expr(frame, &arg.value);
                    continue;
                }
                let values = self.eval_expr(frame, &arg.value);
                for id in values.iter() {
                    if matches!(self.store.get(id), Value::Class(_)) {
                        bases.push(id);
                    }
                }
            }
        }
        if bases.is_empty() {
            bases.push(self.builtins.object);
        }

        let class_id = match self.store.function_site(frame.module, node) {
            Some(existing) => {
                if let Value::Class(class) = self.store.get_mut(existing) {
                    class.bases = bases.clone();
                }
                existing
            }
            None => {
                let qualname = self.qualname_in(frame, def.name.value());
                let scope = self.scopes.alloc(
                    Some(frame.scope),
                    ScopeKind::Class { class: None },
                    Some(frame.module),
                    Some(def.span),
                );
                let class_id = self.store.alloc(Value::Class(ClassValue {
                    name: def.name.value().to_string(),
                    qualname,
                    module: Some(frame.module),
                    scope: Some(scope),
                    bases: bases.clone(),
                    mro: Vec::new(),
                    members: IndexMap::new(),
                    builtin: None,
                    doc: suite_docstring(&def.body),
                }));
                self.scopes.get_mut(scope).kind = ScopeKind::Class {
                    class: Some(class_id),
                };
                self.store.cache_site(frame.module, node, class_id);
                class_id
            }
        };

        // C3 linearization; an inconsistent hierarchy degrades to
        // [class, object] and is diagnosed.
        match self.compute_c3(class_id) {
            Ok(mro) => {
                if let Value::Class(class) = self.store.get_mut(class_id) {
                    class.mro = mro;
                }
            }
            Err(()) => {
                self.diagnostic(Diagnostic::new(
                    DiagnosticCode::InvalidMro,
                    def.name.span,
                    format!(
                        "cannot determine a consistent method resolution order for '{}'",
                        def.name.value()
                    ),
                ));
                let object = self.builtins.object;
                if let Value::Class(class) = self.store.get_mut(class_id) {
                    class.mro = vec![class_id, object];
                }
            }
        }

        // Execute the class body in the class scope.
        let class_scope = match self.store.get(class_id) {
            Value::Class(class) => class.scope.unwrap_or(frame.scope),
            _ => frame.scope,
        };
        let body_frame = Frame {
            scope: class_scope,
            ..frame.clone()
        };
        self.exec_suite(&body_frame, &def.body, cancel)?;

        // Decorators, outermost last.
        let mut result = ValueSet::one(class_id);
        for decorator in def.decorators.iter().rev() {
            let decorator_values = self.eval_expr(frame, &decorator.expression);
            let args = EvalArgs {
                positional: vec![result.clone()],
                ..Default::default()
            };
            let wrapped = self.call_values(
                frame,
                &decorator_values,
                &args,
                decorator.node_id.as_u32(),
                decorator.span,
            );
            if !wrapped.is_empty() {
                result = wrapped;
            }
        }

        let sites = [
            SiteRef {
                module: frame.module,
                span: def.name.span,
                kind: SiteKind::Definition,
            },
            // Find-references surfaces the class body as the value span.
            SiteRef {
                module: frame.module,
                span: def.span,
                kind: SiteKind::Value,
            },
        ];
        self.write_binding(frame.scope, def.name.value(), result, &sites);
        Ok(())
    }

    /// C3 linearization over class values.
    pub(crate) fn compute_c3(&self, class_id: ValueId) -> Result<Vec<ValueId>, ()> {
        let Value::Class(class) = self.store.get(class_id) else {
            return Err(());
        };
        let mut sequences: Vec<Vec<ValueId>> = Vec::new();
        for base in &class.bases {
            match self.store.get(*base) {
                Value::Class(base_class) => {
                    if base_class.mro.is_empty() {
                        sequences.push(vec![*base]);
                    } else {
                        if base_class.mro.contains(&class_id) {
                            // Inheritance cycle.
                            return Err(());
                        }
                        sequences.push(base_class.mro.clone());
                    }
                }
                _ => sequences.push(vec![*base]),
            }
        }
        sequences.push(class.bases.clone());

        let mut result = vec![class_id];
        loop {
            sequences.retain(|sequence| !sequence.is_empty());
            if sequences.is_empty() {
                return Ok(result);
            }
            // A head that appears in no tail is the next entry.
            let mut candidate = None;
            for sequence in &sequences {
                let head = sequence[0];
                let in_tail = sequences
                    .iter()
                    .any(|other| other.len() > 1 && other[1..].contains(&head));
                if !in_tail {
                    candidate = Some(head);
                    break;
                }
            }
            let Some(candidate) = candidate else {
                return Err(());
            };
            result.push(candidate);
            for sequence in sequences.iter_mut() {
                if sequence.first() == Some(&candidate) {
                    sequence.remove(0);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Builtin calls
    // ------------------------------------------------------------------

    fn call_builtin(
        &mut self,
        frame: &Frame,
        builtin: BuiltinFn,
        args: &EvalArgs,
        site_node: u32,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        match builtin {
            BuiltinFn::Len | BuiltinFn::Abs => {
                ValueSet::one(self.store.primitive(PrimitiveKind::Int))
            }
            BuiltinFn::Range | BuiltinFn::Xrange => {
                let int_prim = self.store.primitive(PrimitiveKind::Int);
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Sequence(SequenceValue {
                        kind: SequenceKind::List,
                        elements: Vec::new(),
                        fallback: ValueSet::empty(),
                        known_len: None,
                    })
                });
                let mut fallback = match self.store.get_mut(id) {
                    Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                    _ => ValueSet::empty(),
                };
                fallback.join_id(&mut self.store, int_prim, limit);
                if let Value::Sequence(seq) = self.store.get_mut(id) {
                    seq.fallback = fallback;
                }
                ValueSet::one(id)
            }
            BuiltinFn::Open => {
                // The mode argument decides text versus binary.
                let mode = args
                    .positional
                    .get(1)
                    .cloned()
                    .or_else(|| {
                        args.keywords
                            .iter()
                            .find(|(name, _)| name == "mode")
                            .map(|(_, values)| values.clone())
                    })
                    .unwrap_or_default();
                let mut binary = false;
                for id in mode.iter() {
                    if let Value::Constant {
                        kind: PrimitiveKind::Str,
                        repr,
                    } = self.store.get(id)
                    {
                        if repr.contains('b') {
                            binary = true;
                        }
                    }
                }
                let class = if binary {
                    self.builtins.binary_file_class
                } else {
                    self.builtins.text_file_class
                };
                ValueSet::one(self.store.instance_of(class))
            }
            BuiltinFn::Iter => {
                let element = match args.positional.first() {
                    Some(arg) => self.iterate_values(frame, &arg.clone(), span),
                    None => ValueSet::empty(),
                };
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Generator(GeneratorValue::default())
                });
                let mut current = match self.store.get_mut(id) {
                    Value::Generator(gen) => std::mem::take(&mut gen.element),
                    _ => ValueSet::empty(),
                };
                current.join(&mut self.store, &element, limit);
                if let Value::Generator(gen) = self.store.get_mut(id) {
                    gen.element = current;
                }
                ValueSet::one(id)
            }
            BuiltinFn::Next => match args.positional.first() {
                Some(arg) => {
                    let arg = arg.clone();
                    let mut result = self.iterate_values(frame, &arg, span);
                    if let Some(default) = args.positional.get(1) {
                        let default = default.clone();
                        result.join(&mut self.store, &default, limit);
                    }
                    result
                }
                None => ValueSet::empty(),
            },
            BuiltinFn::Getattr => {
                let mut result = ValueSet::empty();
                if let (Some(receiver), Some(name_arg)) =
                    (args.positional.first(), args.positional.get(1))
                {
                    let receiver = receiver.clone();
                    let names: Vec<String> = name_arg
                        .iter()
                        .filter_map(|id| match self.store.get(id) {
                            Value::Constant {
                                kind: PrimitiveKind::Str,
                                repr,
                            } => Some(repr.clone()),
                            _ => None,
                        })
                        .collect();
                    for name in names {
                        let members = self.member_of_values(frame, &receiver, &name, span);
                        result.join(&mut self.store, &members, limit);
                    }
                }
                if let Some(default) = args.positional.get(2) {
                    let default = default.clone();
                    result.join(&mut self.store, &default, limit);
                }
                result
            }
            BuiltinFn::Setattr => {
                if let (Some(receiver), Some(name_arg), Some(values)) = (
                    args.positional.first(),
                    args.positional.get(1),
                    args.positional.get(2),
                ) {
                    let receiver = receiver.clone();
                    let values = values.clone();
                    let names: Vec<String> = name_arg
                        .iter()
                        .filter_map(|id| match self.store.get(id) {
                            Value::Constant {
                                kind: PrimitiveKind::Str,
                                repr,
                            } => Some(repr.clone()),
                            _ => None,
                        })
                        .collect();
                    for name in names {
                        self.set_member(frame, &receiver, &name, &values, span);
                    }
                }
                ValueSet::one(self.store.primitive(PrimitiveKind::None))
            }
            BuiltinFn::Hasattr | BuiltinFn::Isinstance | BuiltinFn::Issubclass => {
                ValueSet::one(self.store.primitive(PrimitiveKind::Bool))
            }
            BuiltinFn::Vars => {
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Dict(DictValue::default())
                });
                ValueSet::one(id)
            }
            BuiltinFn::Dir => {
                let str_prim = self.store.primitive(PrimitiveKind::Str);
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Sequence(SequenceValue {
                        kind: SequenceKind::List,
                        elements: Vec::new(),
                        fallback: ValueSet::one(str_prim),
                        known_len: None,
                    })
                });
                ValueSet::one(id)
            }
            BuiltinFn::Sorted => {
                let element = match args.positional.first() {
                    Some(arg) => self.iterate_values(frame, &arg.clone(), span),
                    None => ValueSet::empty(),
                };
                let id = self.store.site_value(frame.module, site_node, || {
                    Value::Sequence(SequenceValue {
                        kind: SequenceKind::List,
                        elements: Vec::new(),
                        fallback: ValueSet::empty(),
                        known_len: None,
                    })
                });
                let mut fallback = match self.store.get_mut(id) {
                    Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                    _ => ValueSet::empty(),
                };
                fallback.join(&mut self.store, &element, limit);
                if let Value::Sequence(seq) = self.store.get_mut(id) {
                    seq.fallback = fallback;
                }
                ValueSet::one(id)
            }
            BuiltinFn::Repr => ValueSet::one(self.store.primitive(PrimitiveKind::Str)),
            BuiltinFn::Print => ValueSet::one(self.store.primitive(PrimitiveKind::None)),
            BuiltinFn::Super => {
                let (class, receiver) = match (args.positional.first(), args.positional.get(1)) {
                    (Some(class_arg), receiver_arg) => {
                        let class = class_arg
                            .iter()
                            .find(|id| matches!(self.store.get(*id), Value::Class(_)));
                        let receiver = receiver_arg.and_then(|r| r.iter().next());
                        (class, receiver)
                    }
                    _ => {
                        // Zero-argument form: the enclosing method's
                        // class and its instance.
                        let class = frame
                            .function
                            .and_then(|f| self.store.function(f).enclosing_class);
                        let receiver = class.map(|c| self.store.instance_of(c));
                        (class, receiver)
                    }
                };
                match (class, receiver) {
                    (Some(class), Some(receiver)) => {
                        let id = self.store.alloc(Value::Super { class, receiver });
                        ValueSet::one(id)
                    }
                    (Some(class), None) => {
                        let receiver = self.store.instance_of(class);
                        let id = self.store.alloc(Value::Super { class, receiver });
                        ValueSet::one(id)
                    }
                    _ => ValueSet::empty(),
                }
            }
            BuiltinFn::Type => {
                let mut result = ValueSet::empty();
                if let Some(arg) = args.positional.first() {
                    let arg = arg.clone();
                    for id in arg.iter() {
                        if let Some(class) = self.builtins.class_of(&self.store, id) {
                            result.join_id(&mut self.store, class, limit);
                        }
                    }
                }
                result
            }
            BuiltinFn::Partial => {
                let mut result = ValueSet::empty();
                if let Some(callee_set) = args.positional.first() {
                    let callee_set = callee_set.clone();
                    let bound_args: Vec<ValueSet> = args.positional[1..].to_vec();
                    let bound_keywords = args.keywords.clone();
                    for callee in callee_set.iter() {
                        let id = self.store.alloc(Value::Partial {
                            callee,
                            args: bound_args.clone(),
                            keywords: bound_keywords.clone(),
                        });
                        result.join_id(&mut self.store, id, limit);
                    }
                }
                result
            }
            BuiltinFn::Wraps => {
                // `wraps(g)` produces a transparent decorator.
                let wraps = self.store.builtin_fn(BuiltinFn::Wraps);
                let id = self.store.alloc(Value::Partial {
                    callee: wraps,
                    args: args.positional.clone(),
                    keywords: Vec::new(),
                });
                ValueSet::one(id)
            }
            BuiltinFn::Staticmethod | BuiltinFn::Classmethod | BuiltinFn::Property => {
                // Used as plain calls: mark the function and pass it
                // through.
                let mut result = ValueSet::empty();
                if let Some(arg) = args.positional.first() {
                    let arg = arg.clone();
                    for id in arg.iter() {
                        if let Value::Function(function) = *self.store.get(id) {
                            match builtin {
                                BuiltinFn::Staticmethod => {
                                    self.store.function_mut(function).is_staticmethod = true
                                }
                                BuiltinFn::Classmethod => {
                                    self.store.function_mut(function).is_classmethod = true
                                }
                                _ => self.store.function_mut(function).is_property = true,
                            }
                        }
                        result.join_id(&mut self.store, id, limit);
                    }
                }
                result
            }
        }
    }

    fn call_builtin_method(
        &mut self,
        frame: &Frame,
        kind: BuiltinMethodKind,
        receiver: ValueId,
        args: &EvalArgs,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        match kind {
            BuiltinMethodKind::SeqAppend | BuiltinMethodKind::SeqAdd => {
                let mut incoming = ValueSet::empty();
                for arg in &args.positional {
                    incoming.join(&mut self.store, arg, limit);
                }
                let mut fallback = match self.store.get_mut(receiver) {
                    Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                    _ => return ValueSet::empty(),
                };
                let changed = fallback.join(&mut self.store, &incoming, limit);
                if let Value::Sequence(seq) = self.store.get_mut(receiver) {
                    seq.fallback = fallback;
                }
                if changed {
                    self.notify_container_write(frame);
                }
                ValueSet::one(self.store.primitive(PrimitiveKind::None))
            }
            BuiltinMethodKind::SeqExtend => {
                let mut incoming = ValueSet::empty();
                for arg in &args.positional {
                    let arg = arg.clone();
                    let elements = self.iterate_values(frame, &arg, span);
                    incoming.join(&mut self.store, &elements, limit);
                }
                let mut fallback = match self.store.get_mut(receiver) {
                    Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                    _ => return ValueSet::empty(),
                };
                let changed = fallback.join(&mut self.store, &incoming, limit);
                if let Value::Sequence(seq) = self.store.get_mut(receiver) {
                    seq.fallback = fallback;
                }
                if changed {
                    self.notify_container_write(frame);
                }
                ValueSet::one(self.store.primitive(PrimitiveKind::None))
            }
            BuiltinMethodKind::SeqInsert => {
                let mut incoming = ValueSet::empty();
                if let Some(arg) = args.positional.get(1) {
                    incoming.join(&mut self.store, arg, limit);
                }
                let mut fallback = match self.store.get_mut(receiver) {
                    Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                    _ => return ValueSet::empty(),
                };
                let changed = fallback.join(&mut self.store, &incoming, limit);
                if let Value::Sequence(seq) = self.store.get_mut(receiver) {
                    seq.fallback = fallback;
                }
                if changed {
                    self.notify_container_write(frame);
                }
                ValueSet::one(self.store.primitive(PrimitiveKind::None))
            }
            BuiltinMethodKind::SeqPop => match self.store.get(receiver) {
                Value::Sequence(seq) => {
                    let mut result = seq.fallback.clone();
                    let elements = seq.elements.clone();
                    for element in elements {
                        result.join(&mut self.store, &element, limit);
                    }
                    result
                }
                _ => ValueSet::empty(),
            },
            BuiltinMethodKind::DictGet => {
                let index = args.positional.first().cloned().unwrap_or_default();
                let mut result =
                    self.index_values(frame, &ValueSet::one(receiver), &index, span);
                let none = self.store.primitive(PrimitiveKind::None);
                match args.positional.get(1) {
                    Some(default) => {
                        let default = default.clone();
                        result.join(&mut self.store, &default, limit);
                    }
                    None => {
                        result.join_id(&mut self.store, none, limit);
                    }
                }
                result
            }
            BuiltinMethodKind::DictSetdefault => {
                let index = args.positional.first().cloned().unwrap_or_default();
                let default = args.positional.get(1).cloned().unwrap_or_default();
                self.set_index_values(frame, &ValueSet::one(receiver), &index, &default);
                let mut result =
                    self.index_values(frame, &ValueSet::one(receiver), &index, span);
                result.join(&mut self.store, &default, limit);
                result
            }
            BuiltinMethodKind::DictKeys => match self.store.get(receiver) {
                Value::Dict(dict) => {
                    let keys = dict.keys.clone();
                    self.iterable_protocol(keys)
                }
                _ => ValueSet::empty(),
            },
            BuiltinMethodKind::DictValues => match self.store.get(receiver) {
                Value::Dict(dict) => {
                    let values = dict.values.clone();
                    self.iterable_protocol(values)
                }
                _ => ValueSet::empty(),
            },
            BuiltinMethodKind::DictItems => match self.store.get(receiver) {
                Value::Dict(dict) => {
                    let mut element = dict.keys.clone();
                    let values = dict.values.clone();
                    element.join(&mut self.store, &values, limit);
                    let tuple = self.store.alloc(Value::Sequence(SequenceValue {
                        kind: SequenceKind::Tuple,
                        elements: Vec::new(),
                        fallback: element,
                        known_len: Some(2),
                    }));
                    self.iterable_protocol(ValueSet::one(tuple))
                }
                _ => ValueSet::empty(),
            },
            BuiltinMethodKind::DictPop => {
                let mut result = match self.store.get(receiver) {
                    Value::Dict(dict) => dict.values.clone(),
                    _ => ValueSet::empty(),
                };
                if let Some(default) = args.positional.get(1) {
                    let default = default.clone();
                    result.join(&mut self.store, &default, limit);
                }
                result
            }
            BuiltinMethodKind::GenSend => {
                // `.send(v)` feeds the generator's send set; the call
                // evaluates to the next yielded element.
                let mut incoming = ValueSet::empty();
                for arg in &args.positional {
                    incoming.join(&mut self.store, arg, limit);
                }
                let mut sends = match self.store.get_mut(receiver) {
                    Value::Generator(gen) => std::mem::take(&mut gen.sends),
                    _ => return ValueSet::empty(),
                };
                sends.join(&mut self.store, &incoming, limit);
                let element = match self.store.get_mut(receiver) {
                    Value::Generator(gen) => {
                        gen.sends = sends;
                        gen.element.clone()
                    }
                    _ => ValueSet::empty(),
                };
                element
            }
        }
    }

    /// An iterable-protocol wrapper around an element set (dict views).
    fn iterable_protocol(&mut self, element: ValueSet) -> ValueSet {
        let id = self
            .store
            .alloc(Value::Protocol(ProtocolValue::Iterable { element }));
        ValueSet::one(id)
    }

    /// A container mutated in place: conservatively re-run readers of
    /// the binding the container came from is not tracked per-value, so
    /// the queue is nudged through the current unit's own writes.
    fn notify_container_write(&mut self, frame: &Frame) {
        // Containers are shared by handle; mutations are visible to any
        // unit that re-reads them. Re-enqueue readers of the enclosing
        // module's star binding as a coarse invalidation.
        if let Some(module_scope) = self.scopes.module_scope_of(frame.scope) {
            let writer = self.current_unit.unwrap_or(crate::queue::UnitId(u32::MAX));
            self.queue
                .notify_write(&(module_scope, "*".to_string()), writer);
        }
    }
}

// ============================================================================
// Parameter extraction
// ============================================================================

enum ParamSpec {
    Plain { name: String, node: u32 },
    StarArgs { name: String, node: u32 },
    KwArgs { name: String, node: u32 },
}

fn function_params(source: &FunctionSource) -> Vec<ParamSpec> {
    let params: &Parameters = match source {
        FunctionSource::Def(def) => &def.params,
        FunctionSource::Lambda(lambda) => &lambda.params,
    };
    let mut out = Vec::new();
    for param in &params.params {
        let Some(name) = param_name(param) else {
            continue;
        };
        let node = param.node_id.as_u32();
        if param.is_kwargs() {
            out.push(ParamSpec::KwArgs { name, node });
        } else if param.is_star_args() {
            out.push(ParamSpec::StarArgs { name, node });
        } else if !param.is_star_separator() {
            out.push(ParamSpec::Plain { name, node });
        }
    }
    out
}

fn param_name(param: &Param) -> Option<String> {
    param.name().map(|name| name.to_string())
}

// ============================================================================
// Body scans
// ============================================================================

/// Whether a suite contains a yield at its own function level.
pub(crate) fn suite_has_yield(suite: &Suite) -> bool {
    match suite {
        Suite::Block { body, .. } => body.iter().any(statement_has_yield),
        Suite::Inline { parts, .. } => parts
            .iter()
            .any(|part| small_statement_has_yield(&part.statement)),
    }
}

fn statement_has_yield(statement: &Statement) -> bool {
    match statement {
        Statement::Simple(line) => line
            .parts
            .iter()
            .any(|part| small_statement_has_yield(&part.statement)),
        Statement::Compound(compound) => match compound {
            pythia_cst::CompoundStatement::FunctionDef(_)
            | pythia_cst::CompoundStatement::ClassDef(_) => false,
            pythia_cst::CompoundStatement::If(s) => {
                expression_has_yield(&s.test)
                    || suite_has_yield(&s.body)
                    || s.elifs
                        .iter()
                        .any(|e| expression_has_yield(&e.test) || suite_has_yield(&e.body))
                    || s.orelse.as_ref().is_some_and(|e| suite_has_yield(&e.body))
            }
            pythia_cst::CompoundStatement::While(s) => {
                expression_has_yield(&s.test)
                    || suite_has_yield(&s.body)
                    || s.orelse.as_ref().is_some_and(|e| suite_has_yield(&e.body))
            }
            pythia_cst::CompoundStatement::For(s) => {
                expression_has_yield(&s.iter)
                    || suite_has_yield(&s.body)
                    || s.orelse.as_ref().is_some_and(|e| suite_has_yield(&e.body))
            }
            pythia_cst::CompoundStatement::With(s) => {
                s.items.iter().any(|item| expression_has_yield(&item.context))
                    || suite_has_yield(&s.body)
            }
            pythia_cst::CompoundStatement::Try(s) => {
                suite_has_yield(&s.body)
                    || s.handlers.iter().any(|h| suite_has_yield(&h.body))
                    || s.orelse.as_ref().is_some_and(|e| suite_has_yield(&e.body))
                    || s.finally.as_ref().is_some_and(|f| suite_has_yield(&f.body))
            }
        },
    }
}

fn small_statement_has_yield(statement: &SmallStatement) -> bool {
    match statement {
        SmallStatement::Expr(s) => expression_has_yield(&s.value),
        SmallStatement::Assign(s) => expression_has_yield(&s.value),
        SmallStatement::AugAssign(s) => expression_has_yield(&s.value),
        SmallStatement::AnnAssign(s) => s
            .value
            .as_ref()
            .is_some_and(|(_, value)| expression_has_yield(value)),
        SmallStatement::Return(s) => s.value.as_ref().is_some_and(expression_has_yield),
        _ => false,
    }
}

fn expression_has_yield(expr: &Expression) -> bool {
    match expr {
        Expression::Yield(_) => true,
        Expression::Parenthesized(paren) => expression_has_yield(&paren.value),
        Expression::Boolean(b) => {
            expression_has_yield(&b.left) || expression_has_yield(&b.right)
        }
        Expression::Binary(b) => expression_has_yield(&b.left) || expression_has_yield(&b.right),
        Expression::Conditional(c) => {
            expression_has_yield(&c.body)
                || expression_has_yield(&c.test)
                || expression_has_yield(&c.orelse)
        }
        Expression::Tuple(t) => t.elements.iter().any(|e| expression_has_yield(&e.value)),
        _ => false,
    }
}

fn collect_declarations_in_suite(
    suite: &Suite,
    globals: &mut Vec<String>,
    nonlocals: &mut Vec<String>,
) {
    let handle_small = |statement: &SmallStatement,
                        globals: &mut Vec<String>,
                        nonlocals: &mut Vec<String>| match statement {
        SmallStatement::Global(s) => {
            globals.extend(s.names.iter().map(|(name, _)| name.value().to_string()));
        }
        SmallStatement::Nonlocal(s) => {
            nonlocals.extend(s.names.iter().map(|(name, _)| name.value().to_string()));
        }
        _ => {}
    };
    match suite {
        Suite::Block { body, .. } => {
            for statement in body {
                collect_declarations_in_statement(statement, globals, nonlocals);
            }
        }
        Suite::Inline { parts, .. } => {
            for part in parts {
                handle_small(&part.statement, globals, nonlocals);
            }
        }
    }
}

fn collect_declarations_in_statement(
    statement: &Statement,
    globals: &mut Vec<String>,
    nonlocals: &mut Vec<String>,
) {
    match statement {
        Statement::Simple(line) => {
            for part in &line.parts {
                match &part.statement {
                    SmallStatement::Global(s) => {
                        globals.extend(s.names.iter().map(|(name, _)| name.value().to_string()));
                    }
                    SmallStatement::Nonlocal(s) => {
                        nonlocals
                            .extend(s.names.iter().map(|(name, _)| name.value().to_string()));
                    }
                    _ => {}
                }
            }
        }
        Statement::Compound(compound) => match compound {
            // Nested defs and classes own their declarations.
            pythia_cst::CompoundStatement::FunctionDef(_)
            | pythia_cst::CompoundStatement::ClassDef(_) => {}
            pythia_cst::CompoundStatement::If(s) => {
                collect_declarations_in_suite(&s.body, globals, nonlocals);
                for elif in &s.elifs {
                    collect_declarations_in_suite(&elif.body, globals, nonlocals);
                }
                if let Some(orelse) = &s.orelse {
                    collect_declarations_in_suite(&orelse.body, globals, nonlocals);
                }
            }
            pythia_cst::CompoundStatement::While(s) => {
                collect_declarations_in_suite(&s.body, globals, nonlocals);
                if let Some(orelse) = &s.orelse {
                    collect_declarations_in_suite(&orelse.body, globals, nonlocals);
                }
            }
            pythia_cst::CompoundStatement::For(s) => {
                collect_declarations_in_suite(&s.body, globals, nonlocals);
                if let Some(orelse) = &s.orelse {
                    collect_declarations_in_suite(&orelse.body, globals, nonlocals);
                }
            }
            pythia_cst::CompoundStatement::With(s) => {
                collect_declarations_in_suite(&s.body, globals, nonlocals);
            }
            pythia_cst::CompoundStatement::Try(s) => {
                collect_declarations_in_suite(&s.body, globals, nonlocals);
                for handler in &s.handlers {
                    collect_declarations_in_suite(&handler.body, globals, nonlocals);
                }
                if let Some(orelse) = &s.orelse {
                    collect_declarations_in_suite(&orelse.body, globals, nonlocals);
                }
                if let Some(finally) = &s.finally {
                    collect_declarations_in_suite(&finally.body, globals, nonlocals);
                }
            }
        },
    }
}
