//! Expression evaluation.

use pythia_core::span::Span;
use pythia_cst::{
    CompFor, DictElement, Expression, NodeId, SubscriptIndex,
};

use crate::interp::Frame;
use crate::scope::{ScopeKind, SiteKind, SiteRef};
use crate::session::AnalysisSession;
use crate::value::{
    DictValue, GeneratorValue, PrimitiveKind, SequenceKind, SequenceValue, Value, ValueSet,
};

/// Constants longer than this are type-erased immediately.
const MAX_TRACKED_CONSTANT: usize = 64;

impl AnalysisSession {
    /// Evaluate an expression, recording its value set for queries.
    pub(crate) fn eval_expr(&mut self, frame: &Frame, expr: &Expression) -> ValueSet {
        let values = self.eval_expr_inner(frame, expr);
        self.record_expr(frame.module, expr.node_id(), &values);
        values
    }

    /// Alias used by assignment handling; yield expressions are ordinary
    /// expressions here.
    pub(crate) fn eval_assign_value(&mut self, frame: &Frame, expr: &Expression) -> ValueSet {
        self.eval_expr(frame, expr)
    }

    fn eval_expr_inner(&mut self, frame: &Frame, expr: &Expression) -> ValueSet {
        match expr {
            Expression::Name(name) => {
                self.read_binding(frame.scope, name.value(), frame.module, name.span)
            }
            Expression::Integer(literal) => {
                let text = &literal.tok.text;
                let id = if text.len() <= MAX_TRACKED_CONSTANT {
                    self.store.constant(PrimitiveKind::Int, text.clone())
                } else {
                    self.store.primitive(PrimitiveKind::Int)
                };
                ValueSet::one(id)
            }
            Expression::Float(_) => ValueSet::one(self.store.primitive(PrimitiveKind::Float)),
            Expression::Imaginary(_) => {
                ValueSet::one(self.store.primitive(PrimitiveKind::Complex))
            }
            Expression::Str(literal) => {
                if literal.is_fstring() {
                    // F-string interiors are opaque; the result is str.
                    return ValueSet::one(self.store.primitive(PrimitiveKind::Str));
                }
                let kind = if literal.is_bytes() {
                    PrimitiveKind::Bytes
                } else {
                    PrimitiveKind::Str
                };
                let value = literal.value();
                let id = if value.len() <= MAX_TRACKED_CONSTANT {
                    self.store.constant(kind, value)
                } else {
                    self.store.primitive(kind)
                };
                ValueSet::one(id)
            }
            Expression::Concatenated(concat) => {
                let bytes = concat.parts.iter().any(|p| p.is_bytes());
                let fstring = concat.parts.iter().any(|p| p.is_fstring());
                let kind = if bytes {
                    PrimitiveKind::Bytes
                } else {
                    PrimitiveKind::Str
                };
                if fstring {
                    return ValueSet::one(self.store.primitive(kind));
                }
                let text: String = concat.parts.iter().map(|p| p.value()).collect();
                let id = if text.len() <= MAX_TRACKED_CONSTANT {
                    self.store.constant(kind, text)
                } else {
                    self.store.primitive(kind)
                };
                ValueSet::one(id)
            }
            Expression::Ellipsis(_) => {
                ValueSet::one(self.store.primitive(PrimitiveKind::Ellipsis))
            }
            Expression::Tuple(tuple) => {
                self.eval_sequence_display(frame, expr.node_id(), SequenceKind::Tuple, &tuple.elements)
            }
            Expression::List(list) => {
                self.eval_sequence_display(frame, expr.node_id(), SequenceKind::List, &list.elements)
            }
            Expression::Set(set) => {
                self.eval_sequence_display(frame, expr.node_id(), SequenceKind::Set, &set.elements)
            }
            Expression::Dict(dict) => self.eval_dict_display(frame, expr.node_id(), &dict.elements),
            Expression::ListComp(comp) => {
                // 2.x list comprehensions leak their target into the
                // enclosing scope; everything else scopes itself.
                let own_scope = self.config.version.list_comp_own_scope();
                let element =
                    self.eval_comprehension(frame, &comp.comp, &comp.element, own_scope);
                self.sequence_of(frame, expr.node_id(), SequenceKind::List, element)
            }
            Expression::SetComp(comp) => {
                let element = self.eval_comprehension(frame, &comp.comp, &comp.element, true);
                self.sequence_of(frame, expr.node_id(), SequenceKind::Set, element)
            }
            Expression::DictComp(comp) => {
                let (keys, values) =
                    self.eval_dict_comprehension(frame, &comp.comp, &comp.key, &comp.value);
                let limit = self.config.limits.assignment_set_limit;
                let id = self.store.site_value(frame.module, expr.node_id().as_u32(), || {
                    Value::Dict(DictValue::default())
                });
                let (mut k, mut v) = match self.store.get_mut(id) {
                    Value::Dict(dict) => (
                        std::mem::take(&mut dict.keys),
                        std::mem::take(&mut dict.values),
                    ),
                    _ => (ValueSet::empty(), ValueSet::empty()),
                };
                k.join(&mut self.store, &keys, limit);
                v.join(&mut self.store, &values, limit);
                if let Value::Dict(dict) = self.store.get_mut(id) {
                    dict.keys = k;
                    dict.values = v;
                }
                ValueSet::one(id)
            }
            Expression::Generator(generator) => {
                let element =
                    self.eval_comprehension(frame, &generator.comp, &generator.element, true);
                let limit = self.config.limits.assignment_set_limit;
                let id = self.store.site_value(frame.module, expr.node_id().as_u32(), || {
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
            Expression::Call(call) => self.eval_call_expr(frame, call),
            Expression::Attribute(attribute) => {
                let receiver = self.eval_expr(frame, &attribute.value);
                self.member_of_values(
                    frame,
                    &receiver,
                    attribute.attr.value(),
                    attribute.attr.span,
                )
            }
            Expression::Subscript(subscript) => {
                let receiver = self.eval_expr(frame, &subscript.value);
                self.eval_subscript(frame, &receiver, subscript)
            }
            Expression::Binary(binary) => {
                let left = self.eval_expr(frame, &binary.left);
                let right = self.eval_expr(frame, &binary.right);
                self.binary_result(frame, &binary.op.text, &left, &right, binary.span)
            }
            Expression::Unary(unary) => {
                let operand = self.eval_expr(frame, &unary.operand);
                self.unary_result(frame, &unary.op.text, &operand)
            }
            Expression::Boolean(boolean) => {
                // `a or b` can evaluate to either side.
                let mut left = self.eval_expr(frame, &boolean.left);
                let right = self.eval_expr(frame, &boolean.right);
                let limit = self.config.limits.assignment_set_limit;
                left.join(&mut self.store, &right, limit);
                left
            }
            Expression::Compare(compare) => {
                self.eval_expr(frame, &compare.left);
                for part in &compare.comparisons {
                    self.eval_expr(frame, &part.right);
                }
                ValueSet::one(self.store.primitive(PrimitiveKind::Bool))
            }
            Expression::Conditional(conditional) => {
                self.eval_expr(frame, &conditional.test);
                let mut body = self.eval_expr(frame, &conditional.body);
                let orelse = self.eval_expr(frame, &conditional.orelse);
                let limit = self.config.limits.assignment_set_limit;
                body.join(&mut self.store, &orelse, limit);
                body
            }
            Expression::Lambda(_) => self.define_lambda(frame, expr),
            Expression::Yield(yield_expr) => {
                if yield_expr.from_tok.is_some() {
                    // `yield from it`: the iterable's elements are
                    // yielded; the expression's value is the delegated
                    // generator's return value.
                    let iterable = match &yield_expr.value {
                        Some(value) => self.eval_expr(frame, value),
                        None => ValueSet::empty(),
                    };
                    let element = self.iterate_values(frame, &iterable, expr.span());
                    self.record_yield(frame, element);
                    let limit = self.config.limits.assignment_set_limit;
                    let mut returns = ValueSet::empty();
                    for id in iterable.iter() {
                        if let Value::Generator(gen) = self.store.get(id) {
                            let gen_returns = gen.returns.clone();
                            returns.join(&mut self.store, &gen_returns, limit);
                        }
                    }
                    returns
                } else {
                    let values = match &yield_expr.value {
                        Some(value) => self.eval_expr(frame, value),
                        None => ValueSet::one(self.store.primitive(PrimitiveKind::None)),
                    };
                    self.record_yield(frame, values);
                    // The yield expression evaluates to what `.send()`
                    // provides, or None by default.
                    let mut result = self.current_sends(frame);
                    let none = self.store.primitive(PrimitiveKind::None);
                    let limit = self.config.limits.assignment_set_limit;
                    result.join_id(&mut self.store, none, limit);
                    result
                }
            }
            Expression::Await(await_expr) => {
                let awaited = self.eval_expr(frame, &await_expr.value);
                self.await_values(&awaited)
            }
            Expression::Starred(starred) => self.eval_expr(frame, &starred.value),
            Expression::Repr(repr) => {
                self.eval_expr(frame, &repr.value);
                ValueSet::one(self.store.primitive(PrimitiveKind::Str))
            }
            Expression::Parenthesized(paren) => self.eval_expr(frame, &paren.value),
            // Error nodes contribute nothing.
            Expression::Error(_) => ValueSet::empty(),
        }
    }

    fn current_sends(&mut self, frame: &Frame) -> ValueSet {
        let Some(function) = frame.function else {
            return ValueSet::empty();
        };
        self.store
            .function(function)
            .contexts
            .get(&frame.context)
            .map(|state| state.sends.clone())
            .unwrap_or_default()
    }

    /// `await x`: a coroutine's return set; `Any` stays `Any`.
    pub(crate) fn await_values(&mut self, awaited: &ValueSet) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        for id in awaited.iter() {
            match self.store.get(id) {
                Value::Generator(gen) => {
                    let returns = gen.returns.clone();
                    result.join(&mut self.store, &returns, limit);
                }
                Value::Any => {
                    result.join_id(&mut self.store, id, limit);
                }
                _ => {}
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Displays
    // ------------------------------------------------------------------

    fn eval_sequence_display(
        &mut self,
        frame: &Frame,
        node: NodeId,
        kind: SequenceKind,
        elements: &[pythia_cst::Element],
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut per_index: Vec<ValueSet> = Vec::with_capacity(elements.len());
        let mut spread = ValueSet::empty();
        let mut has_spread = false;
        for element in elements {
            if let Expression::Starred(starred) = element.value.unparenthesized() {
                let inner = self.eval_expr(frame, &starred.value);
                let iterated = self.iterate_values(frame, &inner, starred.span);
                spread.join(&mut self.store, &iterated, limit);
                has_spread = true;
                // Keep the node's recorded value in sync.
                self.record_expr(frame.module, element.value.node_id(), &inner);
            } else {
                per_index.push(self.eval_expr(frame, &element.value));
            }
        }
        let id = self.store.site_value(frame.module, node.as_u32(), || {
            Value::Sequence(SequenceValue {
                kind,
                elements: Vec::new(),
                fallback: ValueSet::empty(),
                known_len: None,
            })
        });
        let (mut slots, mut fallback) = match self.store.get_mut(id) {
            Value::Sequence(seq) => (
                std::mem::take(&mut seq.elements),
                std::mem::take(&mut seq.fallback),
            ),
            _ => (Vec::new(), ValueSet::empty()),
        };
        while slots.len() < per_index.len() {
            slots.push(ValueSet::empty());
        }
        for (slot, values) in slots.iter_mut().zip(per_index.iter()) {
            slot.join(&mut self.store, values, limit);
        }
        fallback.join(&mut self.store, &spread, limit);
        let known_len = if has_spread || kind != SequenceKind::Tuple {
            None
        } else {
            Some(per_index.len())
        };
        if let Value::Sequence(seq) = self.store.get_mut(id) {
            seq.elements = slots;
            seq.fallback = fallback;
            seq.known_len = known_len;
        }
        ValueSet::one(id)
    }

    fn eval_dict_display(
        &mut self,
        frame: &Frame,
        node: NodeId,
        elements: &[DictElement],
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut keys = ValueSet::empty();
        let mut values = ValueSet::empty();
        let mut specialized: Vec<(String, ValueSet)> = Vec::new();
        for element in elements {
            match element {
                DictElement::Pair { key, value, .. } => {
                    let key_set = self.eval_expr(frame, key);
                    let value_set = self.eval_expr(frame, value);
                    // String-constant keys get a dedicated slot.
                    for id in key_set.iter() {
                        if let Value::Constant {
                            kind: PrimitiveKind::Str,
                            repr,
                        } = self.store.get(id)
                        {
                            specialized.push((repr.clone(), value_set.clone()));
                        }
                    }
                    keys.join(&mut self.store, &key_set, limit);
                    values.join(&mut self.store, &value_set, limit);
                }
                DictElement::Unpack { value, .. } => {
                    let mapping = self.eval_expr(frame, value);
                    for id in mapping.iter() {
                        if let Value::Dict(dict) = self.store.get(id) {
                            let (other_keys, other_values) =
                                (dict.keys.clone(), dict.values.clone());
                            keys.join(&mut self.store, &other_keys, limit);
                            values.join(&mut self.store, &other_values, limit);
                        }
                    }
                }
            }
        }
        let id = self.store.site_value(frame.module, node.as_u32(), || {
            Value::Dict(DictValue::default())
        });
        let (mut dict_keys, mut dict_values) = match self.store.get_mut(id) {
            Value::Dict(dict) => (
                std::mem::take(&mut dict.keys),
                std::mem::take(&mut dict.values),
            ),
            _ => (ValueSet::empty(), ValueSet::empty()),
        };
        dict_keys.join(&mut self.store, &keys, limit);
        dict_values.join(&mut self.store, &values, limit);
        if let Value::Dict(dict) = self.store.get_mut(id) {
            dict.keys = dict_keys;
            dict.values = dict_values;
        }
        for (key, value_set) in specialized {
            let mut current = match self.store.get_mut(id) {
                Value::Dict(dict) => {
                    std::mem::take(dict.specialized.entry(key.clone()).or_default())
                }
                _ => ValueSet::empty(),
            };
            current.join(&mut self.store, &value_set, limit);
            if let Value::Dict(dict) = self.store.get_mut(id) {
                dict.specialized.insert(key, current);
            }
        }
        ValueSet::one(id)
    }

    /// A site-cached sequence whose fallback is `element`.
    pub(crate) fn sequence_of(
        &mut self,
        frame: &Frame,
        node: NodeId,
        kind: SequenceKind,
        element: ValueSet,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let id = self.store.site_value(frame.module, node.as_u32(), || {
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

    // ------------------------------------------------------------------
    // Comprehensions
    // ------------------------------------------------------------------

    /// Evaluate a comprehension clause chain and the element expression.
    /// Python 3 comprehensions bind in their own scope; Python 2 list
    /// comprehensions leak the target into the enclosing scope.
    fn eval_comprehension(
        &mut self,
        frame: &Frame,
        comp: &CompFor,
        element: &Expression,
        own_scope: bool,
    ) -> ValueSet {
        let comp_frame = if own_scope {
            let span = Span::new(
                comp.for_tok.span.start,
                element.span().end.max(comp.for_tok.span.end),
            );
            let scope = self.comprehension_scope(frame, span);
            Frame {
                scope,
                ..frame.clone()
            }
        } else {
            frame.clone()
        };
        self.exec_comp_clause(&comp_frame, comp);
        self.eval_expr(&comp_frame, element)
    }

    /// The comprehension scope for a construction site, stable across
    /// re-analysis.
    fn comprehension_scope(&mut self, frame: &Frame, span: Span) -> crate::scope::ScopeId {
        let key = (frame.scope, span.start);
        if let Some(scope) = self.comp_scope_cache.get(&key) {
            return *scope;
        }
        let scope = self.scopes.alloc(
            Some(frame.scope),
            ScopeKind::Comprehension,
            Some(frame.module),
            Some(span),
        );
        self.comp_scope_cache.insert(key, scope);
        scope
    }

    fn eval_dict_comprehension(
        &mut self,
        frame: &Frame,
        comp: &CompFor,
        key: &Expression,
        value: &Expression,
    ) -> (ValueSet, ValueSet) {
        let comp_frame = {
            let span = Span::new(
                comp.for_tok.span.start,
                value.span().end.max(comp.for_tok.span.end),
            );
            let scope = self.comprehension_scope(frame, span);
            Frame {
                scope,
                ..frame.clone()
            }
        };
        self.exec_comp_clause(&comp_frame, comp);
        let keys = self.eval_expr(&comp_frame, key);
        let values = self.eval_expr(&comp_frame, value);
        (keys, values)
    }

    fn exec_comp_clause(&mut self, frame: &Frame, comp: &CompFor) {
        let iterable = self.eval_expr(frame, &comp.iter);
        let element = self.iterate_values(frame, &iterable, comp.iter.span());
        self.assign_target(frame, &comp.target, &element, Some(comp.iter.span()));
        for comp_if in &comp.ifs {
            self.eval_expr(frame, &comp_if.test);
        }
        if let Some(inner) = &comp.inner {
            self.exec_comp_clause(frame, inner);
        }
    }

    // ------------------------------------------------------------------
    // Subscripts
    // ------------------------------------------------------------------

    fn eval_subscript(
        &mut self,
        frame: &Frame,
        receiver: &ValueSet,
        subscript: &pythia_cst::SubscriptExpr,
    ) -> ValueSet {
        if subscript.elements.len() == 1 {
            match &subscript.elements[0].index {
                SubscriptIndex::Index(index_expr) => {
                    let index = self.eval_expr(frame, index_expr);
                    self.index_values(frame, receiver, &index, subscript.span)
                }
                SubscriptIndex::Slice(slice) => {
                    if let Some(lower) = &slice.lower {
                        self.eval_expr(frame, lower);
                    }
                    if let Some(upper) = &slice.upper {
                        self.eval_expr(frame, upper);
                    }
                    if let Some((_, Some(step))) = &slice.step {
                        self.eval_expr(frame, step);
                    }
                    self.slice_values(frame, receiver, subscript.span)
                }
            }
        } else {
            // Tuple subscripts fall back to the generic index path.
            let mut index = ValueSet::empty();
            let limit = self.config.limits.assignment_set_limit;
            for element in &subscript.elements {
                if let SubscriptIndex::Index(index_expr) = &element.index {
                    let values = self.eval_expr(frame, index_expr);
                    index.join(&mut self.store, &values, limit);
                }
            }
            self.index_values(frame, receiver, &index, subscript.span)
        }
    }

    // ------------------------------------------------------------------
    // Assignment targets
    // ------------------------------------------------------------------

    /// Bind `values` to an assignment target: a name, attribute,
    /// subscript, or (possibly starred) tuple/list unpacking.
    pub(crate) fn assign_target(
        &mut self,
        frame: &Frame,
        target: &Expression,
        values: &ValueSet,
        value_span: Option<Span>,
    ) {
        match target.unparenthesized() {
            Expression::Name(name) => {
                let mut sites = vec![SiteRef {
                    module: frame.module,
                    span: name.span,
                    kind: SiteKind::Definition,
                }];
                if let Some(span) = value_span {
                    sites.push(SiteRef {
                        module: frame.module,
                        span,
                        kind: SiteKind::Value,
                    });
                }
                self.record_expr(frame.module, name.node_id, values);
                self.write_binding(frame.scope, name.value(), values.clone(), &sites);
            }
            Expression::Attribute(attribute) => {
                let receiver = self.eval_expr(frame, &attribute.value);
                self.set_member(
                    frame,
                    &receiver,
                    attribute.attr.value(),
                    values,
                    attribute.attr.span,
                );
            }
            Expression::Subscript(subscript) => {
                let receiver = self.eval_expr(frame, &subscript.value);
                let mut index = ValueSet::empty();
                let limit = self.config.limits.assignment_set_limit;
                for element in &subscript.elements {
                    if let SubscriptIndex::Index(index_expr) = &element.index {
                        let index_values = self.eval_expr(frame, index_expr);
                        index.join(&mut self.store, &index_values, limit);
                    }
                }
                self.set_index_values(frame, &receiver, &index, values);
            }
            Expression::Tuple(tuple) => {
                let targets: Vec<&Expression> =
                    tuple.elements.iter().map(|e| &e.value).collect();
                self.unpack_targets(frame, &targets, values, value_span);
            }
            Expression::List(list) => {
                let targets: Vec<&Expression> =
                    list.elements.iter().map(|e| &e.value).collect();
                self.unpack_targets(frame, &targets, values, value_span);
            }
            Expression::Starred(starred) => {
                // A bare starred target binds a list of the elements.
                let element = self.iterate_values(frame, values, starred.span);
                let list = self.sequence_of(frame, starred.node_id, SequenceKind::List, element);
                self.assign_target(frame, &starred.value, &list, value_span);
            }
            // Error nodes and other non-targets are skipped silently.
            _ => {}
        }
    }

    /// Tuple unpacking, including one starred catch-all (PEP 3132).
    fn unpack_targets(
        &mut self,
        frame: &Frame,
        targets: &[&Expression],
        values: &ValueSet,
        value_span: Option<Span>,
    ) {
        let limit = self.config.limits.assignment_set_limit;
        let star_position = targets
            .iter()
            .position(|t| matches!(t.unparenthesized(), Expression::Starred(_)));

        // Precise positional distribution when every value is a sequence
        // with a known prefix.
        let mut positional: Option<Vec<ValueSet>> = None;
        if star_position.is_none() {
            let mut per_target = vec![ValueSet::empty(); targets.len()];
            let mut precise = !values.is_empty();
            for id in values.iter() {
                match self.store.get(id) {
                    Value::Sequence(seq) if seq.elements.len() >= targets.len() => {
                        let slots: Vec<ValueSet> =
                            seq.elements.iter().take(targets.len()).cloned().collect();
                        for (slot, out) in slots.into_iter().zip(per_target.iter_mut()) {
                            out.join(&mut self.store, &slot, limit);
                        }
                    }
                    _ => {
                        precise = false;
                        break;
                    }
                }
            }
            if precise {
                positional = Some(per_target);
            }
        }

        match positional {
            Some(per_target) => {
                for (target, slot) in targets.iter().zip(per_target) {
                    self.assign_target(frame, target, &slot, value_span);
                }
            }
            None => {
                let element = self.iterate_values(
                    frame,
                    values,
                    value_span.unwrap_or_else(|| Span::at(0)),
                );
                for target in targets {
                    self.assign_target(frame, target, &element, value_span);
                }
            }
        }
    }
}
