//! The uniform value protocol: member lookup, indexing, iteration,
//! binary and unary operators, and context-manager entry.
//!
//! Attribute lookup follows Python's rules: instances consult their
//! attribute dictionary, then the class MRO with descriptor handling
//! (bound methods, properties, static and class methods); special
//! methods (`__iter__`, `__call__`, `__enter__`, ...) are looked up on
//! the class only, never on the instance. Modules expose their top-level
//! scope and record cross-module reference sites as they are read.

use pythia_core::span::Span;

use crate::interp::Frame;
use crate::scope::{ScopeId, SiteKind, SiteRef};
use crate::session::AnalysisSession;
use crate::value::{
    BuiltinMethodKind, PrimitiveKind, ProtocolValue, SequenceValue, Value, ValueId, ValueSet,
};

impl AnalysisSession {
    // ------------------------------------------------------------------
    // Member lookup
    // ------------------------------------------------------------------

    /// `x.name` over a whole value set.
    pub(crate) fn member_of_values(
        &mut self,
        frame: &Frame,
        receiver: &ValueSet,
        name: &str,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        for id in receiver.iter().collect::<Vec<_>>() {
            let one = self.member_of_value(frame, id, name, span);
            result.join(&mut self.store, &one, limit);
        }
        result
    }

    fn member_of_value(
        &mut self,
        frame: &Frame,
        receiver: ValueId,
        name: &str,
        span: Span,
    ) -> ValueSet {
        match self.store.get(receiver).clone() {
            Value::Any => ValueSet::one(self.store.any()),
            Value::Module(module) => self.module_member(frame, module, name, span),
            Value::Instance(instance) => {
                // Instance dict first, then the class MRO.
                if let Some(values) = instance.attributes.get(name) {
                    let values = values.clone();
                    self.record_attr_read(instance.class, name);
                    if !values.is_empty() {
                        return values;
                    }
                }
                self.record_attr_read(instance.class, name);
                let raw = self.class_member_raw(instance.class, name);
                self.bind_members_for_instance(frame, &raw, receiver)
            }
            Value::Class(_) => {
                let raw = self.class_member_raw(receiver, name);
                self.bind_members_for_class(&raw, receiver)
            }
            Value::Super { class, receiver } => {
                let instance_class = match self.store.get(receiver) {
                    Value::Instance(instance) => instance.class,
                    _ => class,
                };
                let raw = self.mro_member_after(instance_class, class, name);
                self.bind_members_for_instance(frame, &raw, receiver)
            }
            Value::Primitive(kind) | Value::Constant { kind, .. } => {
                let class = self.builtins.primitive_classes.get(&kind).copied();
                match class {
                    Some(class) => self.class_member_raw(class, name),
                    None => ValueSet::empty(),
                }
            }
            Value::Sequence(_) => {
                let kind = match name {
                    "append" => Some(BuiltinMethodKind::SeqAppend),
                    "extend" => Some(BuiltinMethodKind::SeqExtend),
                    "insert" => Some(BuiltinMethodKind::SeqInsert),
                    "add" => Some(BuiltinMethodKind::SeqAdd),
                    "pop" => Some(BuiltinMethodKind::SeqPop),
                    _ => None,
                };
                match kind {
                    Some(kind) => ValueSet::one(self.store.builtin_method(kind, receiver)),
                    None => match name {
                        "index" | "count" => {
                            let int_prim = self.store.primitive(PrimitiveKind::Int);
                            let id = self.store.alloc(Value::Protocol(ProtocolValue::Callable {
                                returns: ValueSet::one(int_prim),
                            }));
                            ValueSet::one(id)
                        }
                        _ => ValueSet::empty(),
                    },
                }
            }
            Value::Dict(_) => {
                let kind = match name {
                    "get" => Some(BuiltinMethodKind::DictGet),
                    "setdefault" => Some(BuiltinMethodKind::DictSetdefault),
                    "keys" => Some(BuiltinMethodKind::DictKeys),
                    "values" => Some(BuiltinMethodKind::DictValues),
                    "items" => Some(BuiltinMethodKind::DictItems),
                    "pop" => Some(BuiltinMethodKind::DictPop),
                    _ => None,
                };
                match kind {
                    Some(kind) => ValueSet::one(self.store.builtin_method(kind, receiver)),
                    None => ValueSet::empty(),
                }
            }
            Value::Generator(_) => match name {
                "send" => {
                    ValueSet::one(self.store.builtin_method(BuiltinMethodKind::GenSend, receiver))
                }
                "close" | "throw" => {
                    let none = self.store.primitive(PrimitiveKind::None);
                    let id = self.store.alloc(Value::Protocol(ProtocolValue::Callable {
                        returns: ValueSet::one(none),
                    }));
                    ValueSet::one(id)
                }
                _ => ValueSet::empty(),
            },
            Value::Function(function) => match name {
                "__name__" => {
                    let name = self.store.function(function).name.clone();
                    ValueSet::one(self.store.constant(PrimitiveKind::Str, name))
                }
                "__doc__" => ValueSet::one(self.store.primitive(PrimitiveKind::Str)),
                _ => ValueSet::empty(),
            },
            _ => ValueSet::empty(),
        }
    }

    fn module_member(
        &mut self,
        frame: &Frame,
        module: crate::module::ModuleId,
        name: &str,
        span: Span,
    ) -> ValueSet {
        let Some(scope) = self.modules.get(module).scope else {
            return ValueSet::empty();
        };
        if self.scopes.get(scope).variables.contains_key(name) {
            if let Some(unit) = self.current_unit {
                self.queue.record_read(unit, (scope, name.to_string()));
            }
            let variable = self.scopes.variable_mut(scope, name);
            variable.record_site(SiteRef {
                module: frame.module,
                span,
                kind: SiteKind::Reference,
            });
            return variable.values.clone();
        }
        // The attribute may be an unimported submodule of a package.
        if self.modules.get(module).is_package {
            let submodule = format!("{}.{name}", self.modules.get(module).name);
            if let Some(sub) = self.ensure_module(&submodule) {
                self.modules.add_dependency(frame.module, sub);
                let value = self.store.module_value(sub);
                return ValueSet::one(value);
            }
        }
        // Unknown module members stay empty, but register the read so a
        // later definition re-runs this unit.
        if let Some(unit) = self.current_unit {
            self.queue.record_read(unit, (scope, name.to_string()));
        }
        ValueSet::empty()
    }

    /// Raw MRO lookup: the first class in the MRO providing `name`.
    pub(crate) fn class_member_raw(&mut self, class: ValueId, name: &str) -> ValueSet {
        let mro = match self.store.get(class) {
            Value::Class(c) => c.mro.clone(),
            _ => return ValueSet::empty(),
        };
        for entry in mro {
            let Value::Class(c) = self.store.get(entry) else {
                continue;
            };
            if let Some(values) = c.members.get(name) {
                if !values.is_empty() {
                    return values.clone();
                }
            }
            if let Some(scope) = c.scope {
                if self.scopes.get(scope).variables.contains_key(name) {
                    if let Some(unit) = self.current_unit {
                        self.queue.record_read(unit, (scope, name.to_string()));
                    }
                    let values = self.scopes.get(scope).variables[name].values.clone();
                    if !values.is_empty() {
                        return values;
                    }
                }
            }
        }
        ValueSet::empty()
    }

    /// MRO lookup starting *after* `after` (the `super()` rule).
    fn mro_member_after(&mut self, class: ValueId, after: ValueId, name: &str) -> ValueSet {
        let mro = match self.store.get(class) {
            Value::Class(c) => c.mro.clone(),
            _ => return ValueSet::empty(),
        };
        let start = mro
            .iter()
            .position(|entry| *entry == after)
            .map(|idx| idx + 1)
            .unwrap_or(0);
        for entry in &mro[start.min(mro.len())..] {
            let Value::Class(c) = self.store.get(*entry) else {
                continue;
            };
            if let Some(values) = c.members.get(name) {
                if !values.is_empty() {
                    return values.clone();
                }
            }
            if let Some(scope) = c.scope {
                if let Some(variable) = self.scopes.get(scope).variables.get(name) {
                    if !variable.values.is_empty() {
                        return variable.values.clone();
                    }
                }
            }
        }
        ValueSet::empty()
    }

    /// Descriptor handling for instance access: functions bind to the
    /// instance, properties evaluate, static methods unwrap.
    fn bind_members_for_instance(
        &mut self,
        frame: &Frame,
        raw: &ValueSet,
        instance: ValueId,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        for id in raw.iter().collect::<Vec<_>>() {
            match self.store.get(id) {
                Value::Function(function) => {
                    let function = *function;
                    let data = self.store.function(function);
                    if data.is_property {
                        // Reading a property runs its getter.
                        let args = super::call::EvalArgs::default();
                        let value = self.call_function(frame, function, &args, Some(instance));
                        result.join(&mut self.store, &value, limit);
                    } else if data.is_staticmethod {
                        result.join_id(&mut self.store, id, limit);
                    } else {
                        let bound = self.store.bound_method(id, instance);
                        result.join_id(&mut self.store, bound, limit);
                    }
                }
                _ => {
                    result.join_id(&mut self.store, id, limit);
                }
            }
        }
        result
    }

    /// Class-level access: class methods bind to the class, everything
    /// else comes back raw.
    fn bind_members_for_class(&mut self, raw: &ValueSet, class: ValueId) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        for id in raw.iter().collect::<Vec<_>>() {
            match self.store.get(id) {
                Value::Function(function) => {
                    if self.store.function(*function).is_classmethod {
                        let bound = self.store.bound_method(id, class);
                        result.join_id(&mut self.store, bound, limit);
                    } else {
                        result.join_id(&mut self.store, id, limit);
                    }
                }
                _ => {
                    result.join_id(&mut self.store, id, limit);
                }
            }
        }
        result
    }

    /// Special-method lookup: class MRO only, never the instance dict.
    pub(crate) fn special_member(
        &mut self,
        frame: &Frame,
        receiver: ValueId,
        name: &str,
    ) -> ValueSet {
        let class = match self.store.get(receiver) {
            Value::Instance(instance) => instance.class,
            _ => match self.builtins.class_of(&self.store, receiver) {
                Some(class) => class,
                None => return ValueSet::empty(),
            },
        };
        let raw = self.class_member_raw(class, name);
        self.bind_members_for_instance(frame, &raw, receiver)
    }

    // ------------------------------------------------------------------
    // Member writes
    // ------------------------------------------------------------------

    /// `x.name = values` over a whole receiver set.
    pub(crate) fn set_member(
        &mut self,
        frame: &Frame,
        receiver: &ValueSet,
        name: &str,
        values: &ValueSet,
        span: Span,
    ) {
        for id in receiver.iter().collect::<Vec<_>>() {
            match self.store.get(id).clone() {
                Value::Instance(instance) => {
                    self.write_instance_attr(instance.class, id, name, values);
                }
                Value::Module(module) => {
                    if let Some(scope) = self.modules.get(module).scope {
                        let sites = [SiteRef {
                            module: frame.module,
                            span,
                            kind: SiteKind::Definition,
                        }];
                        self.write_binding(scope, name, values.clone(), &sites);
                    }
                }
                Value::Class(class) => {
                    if let Some(scope) = class.scope {
                        let sites = [SiteRef {
                            module: frame.module,
                            span,
                            kind: SiteKind::Definition,
                        }];
                        self.write_binding(scope, name, values.clone(), &sites);
                    }
                }
                _ => {}
            }
        }
    }

    fn write_instance_attr(
        &mut self,
        class: ValueId,
        instance: ValueId,
        name: &str,
        values: &ValueSet,
    ) {
        let limit = self.config.limits.instance_member_set_limit;
        let mut current = match self.store.get_mut(instance) {
            Value::Instance(i) => std::mem::take(i.attributes.entry(name.to_string()).or_default()),
            _ => return,
        };
        let mut incoming = values.clone();
        if self.writes_forced() {
            incoming.force_any(&mut self.store);
        }
        let changed = current.join(&mut self.store, &incoming, limit);
        if let Value::Instance(i) = self.store.get_mut(instance) {
            i.attributes.insert(name.to_string(), current);
        }
        if changed {
            if let Some(scope) = self.class_scope(class) {
                self.notify_binding(scope, &attr_binding_name(name));
            }
        }
    }

    fn record_attr_read(&mut self, class: ValueId, name: &str) {
        if let (Some(unit), Some(scope)) = (self.current_unit, self.class_scope(class)) {
            self.queue.record_read(unit, (scope, attr_binding_name(name)));
        }
    }

    fn class_scope(&self, class: ValueId) -> Option<ScopeId> {
        match self.store.get(class) {
            Value::Class(c) => c.scope,
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// `x[i]` over a receiver set.
    pub(crate) fn index_values(
        &mut self,
        frame: &Frame,
        receiver: &ValueSet,
        index: &ValueSet,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let constant_index = self.small_int_constant(index);
        let constant_key = self.str_constant(index);
        let mut result = ValueSet::empty();
        for id in receiver.iter().collect::<Vec<_>>() {
            let one = match self.store.get(id).clone() {
                Value::Any => ValueSet::one(self.store.any()),
                Value::Sequence(seq) => {
                    // A small literal index picks the element slot; any
                    // other index answers with the fallback union.
                    match constant_index {
                        Some(i) if (i as usize) < seq.elements.len() && i >= 0 => {
                            let mut values = seq.elements[i as usize].clone();
                            if values.is_empty() {
                                values = seq.fallback.clone();
                            }
                            values
                        }
                        _ => {
                            let mut values = seq.fallback.clone();
                            for element in &seq.elements {
                                values.join(&mut self.store, element, limit);
                            }
                            values
                        }
                    }
                }
                Value::Dict(dict) => match &constant_key {
                    Some(key) => match dict.specialized.get(key) {
                        Some(values) => values.clone(),
                        None => dict.values.clone(),
                    },
                    None => dict.values.clone(),
                },
                Value::SysModules => match &constant_key {
                    Some(name) => match self.modules.by_name(name) {
                        Some(module) => {
                            let value = self.store.module_value(module);
                            ValueSet::one(value)
                        }
                        None => self.sys_overrides.get(name).cloned().unwrap_or_default(),
                    },
                    None => ValueSet::empty(),
                },
                Value::Primitive(PrimitiveKind::Str) | Value::Constant { kind: PrimitiveKind::Str, .. } => {
                    ValueSet::one(self.store.primitive(PrimitiveKind::Str))
                }
                Value::Primitive(PrimitiveKind::Bytes)
                | Value::Constant { kind: PrimitiveKind::Bytes, .. } => {
                    let kind = if self.config.version.is_py3() {
                        PrimitiveKind::Int
                    } else {
                        PrimitiveKind::Bytes
                    };
                    ValueSet::one(self.store.primitive(kind))
                }
                Value::Instance(_) => {
                    let getitem = self.special_member(frame, id, "__getitem__");
                    let args = super::call::EvalArgs {
                        positional: vec![index.clone()],
                        ..Default::default()
                    };
                    self.call_values(frame, &getitem, &args, u32::MAX, span)
                }
                _ => ValueSet::empty(),
            };
            result.join(&mut self.store, &one, limit);
        }
        result
    }

    /// `x[i] = values` over a receiver set.
    pub(crate) fn set_index_values(
        &mut self,
        frame: &Frame,
        receiver: &ValueSet,
        index: &ValueSet,
        values: &ValueSet,
    ) {
        let limit = self.config.limits.assignment_set_limit;
        let constant_key = self.str_constant(index);
        for id in receiver.iter().collect::<Vec<_>>() {
            match self.store.get(id).clone() {
                Value::Sequence(_) => {
                    let mut fallback = match self.store.get_mut(id) {
                        Value::Sequence(seq) => std::mem::take(&mut seq.fallback),
                        _ => continue,
                    };
                    fallback.join(&mut self.store, values, limit);
                    if let Value::Sequence(seq) = self.store.get_mut(id) {
                        seq.fallback = fallback;
                    }
                }
                Value::Dict(_) => {
                    let (mut keys, mut dict_values) = match self.store.get_mut(id) {
                        Value::Dict(d) => {
                            (std::mem::take(&mut d.keys), std::mem::take(&mut d.values))
                        }
                        _ => continue,
                    };
                    keys.join(&mut self.store, index, limit);
                    dict_values.join(&mut self.store, values, limit);
                    if let Value::Dict(d) = self.store.get_mut(id) {
                        d.keys = keys;
                        d.values = dict_values;
                    }
                    if let Some(key) = &constant_key {
                        let mut slot = match self.store.get_mut(id) {
                            Value::Dict(d) => {
                                std::mem::take(d.specialized.entry(key.clone()).or_default())
                            }
                            _ => continue,
                        };
                        slot.join(&mut self.store, values, limit);
                        if let Value::Dict(d) = self.store.get_mut(id) {
                            d.specialized.insert(key.clone(), slot);
                        }
                    }
                }
                Value::SysModules => {
                    // Writing `sys.modules['name']` registers an import
                    // override.
                    if let Some(key) = &constant_key {
                        let entry = self.sys_overrides.entry(key.clone()).or_default();
                        let mut current = std::mem::take(entry);
                        current.join(&mut self.store, values, limit);
                        self.sys_overrides.insert(key.clone(), current);
                    }
                }
                Value::Instance(_) => {
                    let setitem = self.special_member(frame, id, "__setitem__");
                    let args = super::call::EvalArgs {
                        positional: vec![index.clone(), values.clone()],
                        ..Default::default()
                    };
                    self.call_values(frame, &setitem, &args, u32::MAX, Span::at(0));
                }
                _ => {}
            }
        }
    }

    /// `x[a:b]`: the same sequence kind carrying the element set.
    pub(crate) fn slice_values(
        &mut self,
        frame: &Frame,
        receiver: &ValueSet,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        for id in receiver.iter().collect::<Vec<_>>() {
            match self.store.get(id) {
                Value::Sequence(_) => {
                    // Slicing preserves identity well enough for the
                    // abstract domain: the same handle carries the same
                    // element sets.
                    result.join_id(&mut self.store, id, limit);
                }
                Value::Primitive(PrimitiveKind::Str) | Value::Constant { kind: PrimitiveKind::Str, .. } => {
                    let str_prim = self.store.primitive(PrimitiveKind::Str);
                    result.join_id(&mut self.store, str_prim, limit);
                }
                Value::Any => {
                    let any = self.store.any();
                    result.join_id(&mut self.store, any, limit);
                }
                Value::Instance(_) => {
                    let one = {
                        let getitem = self.special_member(frame, id, "__getitem__");
                        let args = super::call::EvalArgs::default();
                        self.call_values(frame, &getitem, &args, u32::MAX, span)
                    };
                    result.join(&mut self.store, &one, limit);
                }
                _ => {}
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Iteration
    // ------------------------------------------------------------------

    /// The element set produced by iterating a value set.
    pub(crate) fn iterate_values(
        &mut self,
        frame: &Frame,
        values: &ValueSet,
        span: Span,
    ) -> ValueSet {
        // An `__iter__` that answers its own receiver would otherwise
        // recurse forever.
        if self.iterate_depth > 16 {
            return ValueSet::empty();
        }
        self.iterate_depth += 1;
        let result = self.iterate_values_inner(frame, values, span);
        self.iterate_depth -= 1;
        result
    }

    fn iterate_values_inner(
        &mut self,
        frame: &Frame,
        values: &ValueSet,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        for id in values.iter().collect::<Vec<_>>() {
            let one = match self.store.get(id).clone() {
                Value::Any => ValueSet::one(self.store.any()),
                Value::Sequence(seq) => {
                    let mut element = seq.fallback.clone();
                    for slot in &seq.elements {
                        element.join(&mut self.store, slot, limit);
                    }
                    element
                }
                Value::Dict(dict) => dict.keys.clone(),
                Value::Generator(gen) => gen.element.clone(),
                Value::Protocol(ProtocolValue::Iterable { element }) => element,
                Value::Primitive(PrimitiveKind::Str)
                | Value::Constant { kind: PrimitiveKind::Str, .. } => {
                    ValueSet::one(self.store.primitive(PrimitiveKind::Str))
                }
                Value::Primitive(PrimitiveKind::Bytes)
                | Value::Constant { kind: PrimitiveKind::Bytes, .. } => {
                    let kind = if self.config.version.is_py3() {
                        PrimitiveKind::Int
                    } else {
                        PrimitiveKind::Bytes
                    };
                    ValueSet::one(self.store.primitive(kind))
                }
                Value::Instance(_) => {
                    // `__iter__` from the class, then `__getitem__` as
                    // the legacy protocol.
                    let iter_member = self.special_member(frame, id, "__iter__");
                    if !iter_member.is_empty() {
                        let args = super::call::EvalArgs::default();
                        let iterator =
                            self.call_values(frame, &iter_member, &args, u32::MAX, span);
                        self.iterate_values(frame, &iterator, span)
                    } else {
                        let getitem = self.special_member(frame, id, "__getitem__");
                        if getitem.is_empty() {
                            ValueSet::empty()
                        } else {
                            let args = super::call::EvalArgs::default();
                            self.call_values(frame, &getitem, &args, u32::MAX, span)
                        }
                    }
                }
                _ => ValueSet::empty(),
            };
            result.join(&mut self.store, &one, limit);
        }
        result
    }

    // ------------------------------------------------------------------
    // Context managers
    // ------------------------------------------------------------------

    /// `with cm as x`: the value `__enter__` (or `__aenter__`) answers.
    /// Unknown context managers bind themselves, which is what file-like
    /// stubs want anyway.
    pub(crate) fn enter_context_manager(
        &mut self,
        frame: &Frame,
        values: &ValueSet,
        is_async: bool,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let name = if is_async { "__aenter__" } else { "__enter__" };
        let mut result = ValueSet::empty();
        for id in values.iter().collect::<Vec<_>>() {
            let member = self.special_member(frame, id, name);
            if member.is_empty() {
                result.join_id(&mut self.store, id, limit);
                continue;
            }
            let args = super::call::EvalArgs::default();
            let mut entered = self.call_values(frame, &member, &args, u32::MAX, span);
            if is_async {
                entered = self.await_values(&entered);
            }
            if entered.is_empty() {
                result.join_id(&mut self.store, id, limit);
            } else {
                result.join(&mut self.store, &entered, limit);
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    /// Binary operator dispatch: primitive numeric tower, string and
    /// sequence rules, then user `__op__` / reflected `__rop__`.
    pub(crate) fn binary_result(
        &mut self,
        frame: &Frame,
        op: &str,
        left: &ValueSet,
        right: &ValueSet,
        span: Span,
    ) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        let mut result = ValueSet::empty();
        let left_ids: Vec<ValueId> = left.iter().collect();
        let right_ids: Vec<ValueId> = right.iter().collect();
        for &l in &left_ids {
            for &r in &right_ids {
                let one = self.binary_pair(frame, op, l, r, span);
                result.join(&mut self.store, &one, limit);
            }
        }
        // One-sided expressions still produce their operand's shape for
        // `Any` on the other side.
        if result.is_empty() && (left.is_empty() || right.is_empty()) {
            return ValueSet::empty();
        }
        result
    }

    fn binary_pair(
        &mut self,
        frame: &Frame,
        op: &str,
        left: ValueId,
        right: ValueId,
        span: Span,
    ) -> ValueSet {
        if matches!(self.store.get(left), Value::Any) || matches!(self.store.get(right), Value::Any)
        {
            return ValueSet::one(self.store.any());
        }
        let left_kind = primitive_kind(self.store.get(left));
        let right_kind = primitive_kind(self.store.get(right));

        // Numeric tower.
        if let (Some(lk), Some(rk)) = (left_kind, right_kind) {
            if is_numeric(lk) && is_numeric(rk) {
                let kind = self.numeric_result(op, lk, rk, frame);
                return ValueSet::one(self.store.primitive(kind));
            }
            // String/bytes formatting and concatenation.
            if lk == PrimitiveKind::Str || lk == PrimitiveKind::Bytes {
                match op {
                    "+" if rk == lk => return ValueSet::one(self.store.primitive(lk)),
                    "%" => return ValueSet::one(self.store.primitive(lk)),
                    "*" if is_numeric(rk) => return ValueSet::one(self.store.primitive(lk)),
                    _ => {}
                }
            }
            if rk == PrimitiveKind::Str && op == "*" && is_numeric(lk) {
                return ValueSet::one(self.store.primitive(rk));
            }
        }

        // Sequence concatenation and repetition.
        if let Value::Sequence(left_seq) = self.store.get(left) {
            let kind = left_seq.kind;
            match (op, self.store.get(right)) {
                ("+", Value::Sequence(right_seq)) if right_seq.kind == kind => {
                    let mut element = ValueSet::empty();
                    let limit = self.config.limits.assignment_set_limit;
                    let left_sets: Vec<ValueSet> = {
                        let Value::Sequence(s) = self.store.get(left) else {
                            unreachable!()
                        };
                        s.elements
                            .iter()
                            .chain(std::iter::once(&s.fallback))
                            .cloned()
                            .collect()
                    };
                    let right_sets: Vec<ValueSet> = {
                        let Value::Sequence(s) = self.store.get(right) else {
                            unreachable!()
                        };
                        s.elements
                            .iter()
                            .chain(std::iter::once(&s.fallback))
                            .cloned()
                            .collect()
                    };
                    for set in left_sets.iter().chain(right_sets.iter()) {
                        element.join(&mut self.store, set, limit);
                    }
                    let id = self.store.alloc(Value::Sequence(SequenceValue {
                        kind,
                        elements: Vec::new(),
                        fallback: element,
                        known_len: None,
                    }));
                    return ValueSet::one(id);
                }
                ("*", value) if primitive_kind(value).is_some_and(is_numeric) => {
                    // Repetition keeps the same sequence.
                    return ValueSet::one(left);
                }
                _ => {}
            }
        }

        // User-defined operator protocols: left `__op__`, then the
        // reflected form on the right.
        if let Some(dunder) = dunder_for(op, self.config.version.is_py3()) {
            if matches!(self.store.get(left), Value::Instance(_)) {
                let member = self.special_member(frame, left, dunder);
                if !member.is_empty() {
                    let args = super::call::EvalArgs {
                        positional: vec![ValueSet::one(right)],
                        ..Default::default()
                    };
                    let value = self.call_values(frame, &member, &args, u32::MAX, span);
                    if !value.is_empty() {
                        return value;
                    }
                }
            }
            if matches!(self.store.get(right), Value::Instance(_)) {
                let reflected = reflected_dunder(dunder);
                let member = self.special_member(frame, right, &reflected);
                if !member.is_empty() {
                    let args = super::call::EvalArgs {
                        positional: vec![ValueSet::one(left)],
                        ..Default::default()
                    };
                    return self.call_values(frame, &member, &args, u32::MAX, span);
                }
            }
        }
        ValueSet::empty()
    }

    fn numeric_result(
        &self,
        op: &str,
        left: PrimitiveKind,
        right: PrimitiveKind,
        frame: &Frame,
    ) -> PrimitiveKind {
        let rank = |kind: PrimitiveKind| match kind {
            PrimitiveKind::Bool => 0,
            PrimitiveKind::Int => 1,
            PrimitiveKind::Long => 2,
            PrimitiveKind::Float => 3,
            PrimitiveKind::Complex => 4,
            _ => 1,
        };
        let promoted = if rank(left) >= rank(right) { left } else { right };
        let promoted = if promoted == PrimitiveKind::Bool {
            PrimitiveKind::Int
        } else {
            promoted
        };
        match op {
            "/" => {
                let true_division = self.config.version.true_division()
                    || self.modules.get(frame.module).future_division;
                if true_division && rank(promoted) < rank(PrimitiveKind::Float) {
                    PrimitiveKind::Float
                } else {
                    promoted
                }
            }
            "//" => {
                if promoted == PrimitiveKind::Complex {
                    PrimitiveKind::Complex
                } else {
                    promoted
                }
            }
            "<<" | ">>" | "&" | "|" | "^" => PrimitiveKind::Int,
            _ => promoted,
        }
    }

    /// Unary operators: `not` answers bool; `-`/`+`/`~` preserve the
    /// numeric kind and fall through to `__neg__`-style protocols on
    /// instances.
    pub(crate) fn unary_result(&mut self, frame: &Frame, op: &str, operand: &ValueSet) -> ValueSet {
        let limit = self.config.limits.assignment_set_limit;
        if op == "not" {
            return ValueSet::one(self.store.primitive(PrimitiveKind::Bool));
        }
        let mut result = ValueSet::empty();
        for id in operand.iter().collect::<Vec<_>>() {
            match self.store.get(id).clone() {
                Value::Any => {
                    let any = self.store.any();
                    result.join_id(&mut self.store, any, limit);
                }
                Value::Primitive(kind) | Value::Constant { kind, .. } if is_numeric(kind) => {
                    let kind = if kind == PrimitiveKind::Bool {
                        PrimitiveKind::Int
                    } else {
                        kind
                    };
                    let prim = self.store.primitive(kind);
                    result.join_id(&mut self.store, prim, limit);
                }
                Value::Instance(_) => {
                    let dunder = match op {
                        "-" => "__neg__",
                        "+" => "__pos__",
                        "~" => "__invert__",
                        _ => continue,
                    };
                    let member = self.special_member(frame, id, dunder);
                    let args = super::call::EvalArgs::default();
                    let value = self.call_values(frame, &member, &args, u32::MAX, Span::at(0));
                    result.join(&mut self.store, &value, limit);
                }
                _ => {}
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Constant extraction
    // ------------------------------------------------------------------

    fn small_int_constant(&self, values: &ValueSet) -> Option<i64> {
        if values.len() != 1 {
            return None;
        }
        let id = values.iter().next()?;
        match self.store.get(id) {
            Value::Constant {
                kind: PrimitiveKind::Int,
                repr,
            } => repr.parse().ok(),
            _ => None,
        }
    }

    fn str_constant(&self, values: &ValueSet) -> Option<String> {
        if values.len() != 1 {
            return None;
        }
        let id = values.iter().next()?;
        match self.store.get(id) {
            Value::Constant {
                kind: PrimitiveKind::Str,
                repr,
            } => Some(repr.clone()),
            _ => None,
        }
    }
}

/// The binding name used for instance-attribute dependency tracking.
fn attr_binding_name(name: &str) -> String {
    format!("<attr:{name}>")
}

fn primitive_kind(value: &Value) -> Option<PrimitiveKind> {
    match value {
        Value::Primitive(kind) | Value::Constant { kind, .. } => Some(*kind),
        _ => None,
    }
}

fn is_numeric(kind: PrimitiveKind) -> bool {
    matches!(
        kind,
        PrimitiveKind::Int
            | PrimitiveKind::Long
            | PrimitiveKind::Float
            | PrimitiveKind::Complex
            | PrimitiveKind::Bool
    )
}

fn dunder_for(op: &str, py3: bool) -> Option<&'static str> {
    Some(match op {
        "+" => "__add__",
        "-" => "__sub__",
        "*" => "__mul__",
        "/" => {
            if py3 {
                "__truediv__"
            } else {
                "__div__"
            }
        }
        "//" => "__floordiv__",
        "%" => "__mod__",
        "**" => "__pow__",
        "<<" => "__lshift__",
        ">>" => "__rshift__",
        "&" => "__and__",
        "|" => "__or__",
        "^" => "__xor__",
        "@" => "__matmul__",
        _ => return None,
    })
}

fn reflected_dunder(dunder: &str) -> String {
    format!("__r{}", &dunder[2..])
}
