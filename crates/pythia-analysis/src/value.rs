//! The abstract value lattice.
//!
//! Every abstract runtime value lives in a per-session [`ValueStore`] and
//! is referred to by a [`ValueId`] handle. Handles make cyclic structures
//! safe by construction: a list whose elements include the list itself
//! stores its own id, not an inline copy, so joins and equality terminate.
//!
//! Primitive instances and constants are interned, so their equality is id
//! equality. Container values (sequences, dictionaries, generators) are
//! created once per construction site and mutate monotonically as analysis
//! discovers more element types. Structural equality for containers uses a
//! visited-pair set to cut cycles.
//!
//! A [`ValueSet`] is a small, deduplicated union of handles with two
//! lattice operations: `join` (set union) and widening, which kicks in
//! when a join would push a set past its cardinality budget. Widening
//! collapses constants into their type-erased primitives, then collapses
//! same-class duplicates, then gives up and replaces the set with `Any`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use pythia_cst::{FunctionDef, LambdaExpr};

use crate::module::ModuleId;
use crate::scope::ScopeId;

// ============================================================================
// Ids
// ============================================================================

/// Handle to a value in the [`ValueStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Handle to a function's analysis record in the [`ValueStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

// ============================================================================
// Variants
// ============================================================================

/// The builtin scalar kinds the analyzer distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Int,
    Long,
    Float,
    Complex,
    Bool,
    Str,
    Bytes,
    None,
    Ellipsis,
}

impl PrimitiveKind {
    /// The type name shown in descriptions.
    pub fn type_name(&self) -> &'static str {
        match self {
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Complex => "complex",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Str => "str",
            PrimitiveKind::Bytes => "bytes",
            PrimitiveKind::None => "None",
            PrimitiveKind::Ellipsis => "ellipsis",
        }
    }
}

/// Ordered-container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SequenceKind {
    #[default]
    List,
    Tuple,
    Set,
    FrozenSet,
}

impl SequenceKind {
    /// The type name shown in descriptions.
    pub fn type_name(&self) -> &'static str {
        match self {
            SequenceKind::List => "list",
            SequenceKind::Tuple => "tuple",
            SequenceKind::Set => "set",
            SequenceKind::FrozenSet => "frozenset",
        }
    }
}

/// An ordered, indexed container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceValue {
    /// Which container this is.
    pub kind: SequenceKind,
    /// Per-index element sets for literally constructed prefixes.
    pub elements: Vec<ValueSet>,
    /// The "any index" fallback set.
    pub fallback: ValueSet,
    /// Known length when constructed from a literal (tuples).
    pub known_len: Option<usize>,
}

/// Key/value tracking for dictionaries, with string-constant
/// specialization to support `d['key']` resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictValue {
    pub keys: ValueSet,
    pub values: ValueSet,
    /// Per-key sets for string-constant keys.
    pub specialized: IndexMap<String, ValueSet>,
}

/// A generator (or coroutine) in flight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratorValue {
    /// What the generator yields.
    pub element: ValueSet,
    /// The return value (PEP 380 delegation target).
    pub returns: ValueSet,
    /// Values received from `.send()`.
    pub sends: ValueSet,
    /// True for coroutines produced by calling an async function.
    pub is_coroutine: bool,
}

/// Builtin class flavors that change call behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinClassKind {
    /// Calling produces a primitive instance (`int(x)`).
    Primitive(PrimitiveKind),
    /// Calling produces a sequence over the argument's elements.
    Sequence(SequenceKind),
    /// Calling produces a dictionary.
    Dict,
    /// `object` itself.
    Object,
    /// `type`.
    Type,
    /// An exception class.
    Exception,
    /// Text-mode file object.
    TextFile,
    /// Binary-mode file object.
    BinaryFile,
    /// An ordinary stub/builtin class.
    Plain,
}

/// A class: definition site, bases, MRO, and members.
#[derive(Debug, Clone)]
pub struct ClassValue {
    pub name: String,
    pub qualname: String,
    pub module: Option<ModuleId>,
    /// The class-body scope for user classes; members are read through it.
    pub scope: Option<ScopeId>,
    pub bases: Vec<ValueId>,
    /// C3 linearization, starting with the class itself.
    pub mro: Vec<ValueId>,
    /// Members for builtin and stub classes that have no body scope.
    pub members: IndexMap<String, ValueSet>,
    pub builtin: Option<BuiltinClassKind>,
    pub doc: Option<String>,
}

/// The canonical abstract instance of a class. One instance value exists
/// per class; `self.X` writes land in its attribute dictionary.
#[derive(Debug, Clone)]
pub struct InstanceValue {
    pub class: ValueId,
    pub attributes: IndexMap<String, ValueSet>,
}

/// Curated builtin functions with special semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFn {
    Len,
    Abs,
    Range,
    Xrange,
    Open,
    Iter,
    Next,
    Getattr,
    Setattr,
    Hasattr,
    Vars,
    Dir,
    Sorted,
    Repr,
    Print,
    Super,
    Isinstance,
    Issubclass,
    Type,
    /// `functools.partial`
    Partial,
    /// `functools.wraps`
    Wraps,
    /// `staticmethod`
    Staticmethod,
    /// `classmethod`
    Classmethod,
    /// `property`
    Property,
}

/// Curated methods on builtin containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinMethodKind {
    SeqAppend,
    SeqExtend,
    SeqInsert,
    SeqAdd,
    SeqPop,
    DictGet,
    DictSetdefault,
    DictKeys,
    DictValues,
    DictItems,
    DictPop,
    GenSend,
}

/// Structural capability markers used when no concrete carrier exists.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolValue {
    /// Callable returning the given set.
    Callable { returns: ValueSet },
    /// Iterable over the given element set.
    Iterable { element: ValueSet },
}

/// The tagged union of abstract runtime values.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone)]
pub enum Value {
    /// The lattice top: could be anything.
    Any,
    /// An unspecified instance of a builtin scalar type.
    Primitive(PrimitiveKind),
    /// A scalar instance tagged with its literal text.
    Constant { kind: PrimitiveKind, repr: String },
    Sequence(SequenceValue),
    Dict(DictValue),
    Generator(GeneratorValue),
    Function(FunctionId),
    BoundMethod { function: ValueId, receiver: ValueId },
    Class(ClassValue),
    Instance(InstanceValue),
    Module(ModuleId),
    /// The marker returned by `super()`: member lookup starts after
    /// `class` in the receiver's MRO.
    Super { class: ValueId, receiver: ValueId },
    /// `functools.partial(callee, ...)`.
    Partial {
        callee: ValueId,
        args: Vec<ValueSet>,
        keywords: Vec<(String, ValueSet)>,
    },
    Builtin(BuiltinFn),
    BuiltinMethod {
        kind: BuiltinMethodKind,
        receiver: ValueId,
    },
    Protocol(ProtocolValue),
    /// The `sys.modules` mapping; writes register module overrides.
    SysModules,
}

// ============================================================================
// Function records
// ============================================================================

/// Where a function's code comes from.
#[derive(Debug, Clone)]
pub enum FunctionSource {
    Def(Arc<FunctionDef>),
    Lambda(Arc<LambdaExpr>),
}

/// A call-context key under the Cartesian product algorithm: the
/// per-argument value-id summaries, or the shared context once the depth
/// budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    Shared,
    Args(Vec<Vec<u32>>),
}

/// Per-context analysis state of a function.
#[derive(Debug, Clone, Default)]
pub struct ContextState {
    /// Parameter bindings for this context.
    pub params: IndexMap<String, ValueSet>,
    /// Joined return values.
    pub returns: ValueSet,
    /// Joined yield values.
    pub yields: ValueSet,
    /// Values received from `.send()`.
    pub sends: ValueSet,
    /// The generator value handed out for calls in this context, if the
    /// function is a generator or coroutine.
    pub generator: Option<ValueId>,
}

/// The analysis record of one function definition.
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub source: FunctionSource,
    pub module: ModuleId,
    /// The scope the function closes over.
    pub parent_scope: ScopeId,
    /// The function's own body scope.
    pub scope: ScopeId,
    pub name: String,
    pub qualname: String,
    pub doc: Option<String>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_staticmethod: bool,
    pub is_classmethod: bool,
    pub is_property: bool,
    /// The class whose body defined this function, when it is a method.
    pub enclosing_class: Option<ValueId>,
    /// Default values, evaluated at definition time.
    pub default_values: IndexMap<String, ValueSet>,
    pub contexts: IndexMap<ContextKey, ContextState>,
}

// ============================================================================
// Value sets
// ============================================================================

/// A small, deduplicated union of value handles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSet(SmallVec<[ValueId; 4]>);

impl ValueSet {
    /// The empty set (bottom).
    pub fn empty() -> Self {
        Self::default()
    }

    /// A singleton set.
    pub fn one(id: ValueId) -> Self {
        Self(SmallVec::from_slice(&[id]))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, id: ValueId) -> bool {
        self.0.contains(&id)
    }

    /// The ids, sorted, for context-key summaries.
    pub fn summary(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.0.iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids
    }
}

// ============================================================================
// The store
// ============================================================================

/// The interning table for all values of a session.
#[derive(Debug, Default)]
pub struct ValueStore {
    values: Vec<Value>,
    functions: Vec<FunctionData>,
    prim_cache: HashMap<PrimitiveKind, ValueId>,
    const_cache: HashMap<(PrimitiveKind, String), ValueId>,
    builtin_fn_cache: HashMap<BuiltinFn, ValueId>,
    builtin_method_cache: HashMap<(BuiltinMethodKind, ValueId), ValueId>,
    bound_cache: HashMap<(ValueId, ValueId), ValueId>,
    module_cache: HashMap<ModuleId, ValueId>,
    /// Canonical instance per class.
    instance_cache: HashMap<ValueId, ValueId>,
    /// Container values per construction site.
    site_cache: HashMap<(ModuleId, u32), ValueId>,
    any_cached: Option<ValueId>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live values, for budget accounting.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn alloc(&mut self, value: Value) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(value);
        id
    }

    pub fn get(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.0 as usize]
    }

    // ------------------------------------------------------------------
    // Interned constructors
    // ------------------------------------------------------------------

    pub fn any(&mut self) -> ValueId {
        if let Some(id) = self.any_cached {
            return id;
        }
        let id = self.alloc(Value::Any);
        self.any_cached = Some(id);
        id
    }

    pub fn primitive(&mut self, kind: PrimitiveKind) -> ValueId {
        if let Some(id) = self.prim_cache.get(&kind) {
            return *id;
        }
        let id = self.alloc(Value::Primitive(kind));
        self.prim_cache.insert(kind, id);
        id
    }

    pub fn constant(&mut self, kind: PrimitiveKind, repr: impl Into<String>) -> ValueId {
        let repr = repr.into();
        if let Some(id) = self.const_cache.get(&(kind, repr.clone())) {
            return *id;
        }
        let id = self.alloc(Value::Constant {
            kind,
            repr: repr.clone(),
        });
        self.const_cache.insert((kind, repr), id);
        id
    }

    pub fn builtin_fn(&mut self, f: BuiltinFn) -> ValueId {
        if let Some(id) = self.builtin_fn_cache.get(&f) {
            return *id;
        }
        let id = self.alloc(Value::Builtin(f));
        self.builtin_fn_cache.insert(f, id);
        id
    }

    pub fn builtin_method(&mut self, kind: BuiltinMethodKind, receiver: ValueId) -> ValueId {
        if let Some(id) = self.builtin_method_cache.get(&(kind, receiver)) {
            return *id;
        }
        let id = self.alloc(Value::BuiltinMethod { kind, receiver });
        self.builtin_method_cache.insert((kind, receiver), id);
        id
    }

    pub fn bound_method(&mut self, function: ValueId, receiver: ValueId) -> ValueId {
        if let Some(id) = self.bound_cache.get(&(function, receiver)) {
            return *id;
        }
        let id = self.alloc(Value::BoundMethod { function, receiver });
        self.bound_cache.insert((function, receiver), id);
        id
    }

    pub fn module_value(&mut self, module: ModuleId) -> ValueId {
        if let Some(id) = self.module_cache.get(&module) {
            return *id;
        }
        let id = self.alloc(Value::Module(module));
        self.module_cache.insert(module, id);
        id
    }

    /// The canonical abstract instance of `class`.
    pub fn instance_of(&mut self, class: ValueId) -> ValueId {
        if let Some(id) = self.instance_cache.get(&class) {
            return *id;
        }
        let id = self.alloc(Value::Instance(InstanceValue {
            class,
            attributes: IndexMap::new(),
        }));
        self.instance_cache.insert(class, id);
        id
    }

    /// The container value for a construction site, creating it on first
    /// visit so re-analysis mutates the same value.
    pub fn site_value(
        &mut self,
        module: ModuleId,
        node: u32,
        build: impl FnOnce() -> Value,
    ) -> ValueId {
        if let Some(id) = self.site_cache.get(&(module, node)) {
            return *id;
        }
        let value = build();
        let id = self.alloc(value);
        self.site_cache.insert((module, node), id);
        id
    }

    pub fn alloc_function(&mut self, data: FunctionData) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(data);
        id
    }

    pub fn function(&self, id: FunctionId) -> &FunctionData {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut FunctionData {
        &mut self.functions[id.0 as usize]
    }

    /// Cached function value id by definition site, so repeated analysis
    /// of a `def` yields the same value.
    pub fn function_site(&mut self, module: ModuleId, node: u32) -> Option<ValueId> {
        self.site_cache.get(&(module, node)).copied()
    }

    pub fn cache_site(&mut self, module: ModuleId, node: u32, id: ValueId) {
        self.site_cache.insert((module, node), id);
    }

    // ------------------------------------------------------------------
    // Equality
    // ------------------------------------------------------------------

    /// Variant-aware equality. Interned variants compare by id; container
    /// variants compare structurally with a visited-pair set to survive
    /// cycles.
    pub fn values_equal(&self, a: ValueId, b: ValueId) -> bool {
        let mut visited = HashSet::new();
        self.values_equal_rec(a, b, &mut visited)
    }

    fn values_equal_rec(
        &self,
        a: ValueId,
        b: ValueId,
        visited: &mut HashSet<(ValueId, ValueId)>,
    ) -> bool {
        if a == b {
            return true;
        }
        if !visited.insert((a, b)) {
            // Already comparing this pair further up the stack; assume
            // equal to close the cycle.
            return true;
        }
        match (self.get(a), self.get(b)) {
            (Value::Sequence(left), Value::Sequence(right)) => {
                left.kind == right.kind
                    && left.known_len == right.known_len
                    && left.elements.len() == right.elements.len()
                    && self.sets_equal_rec(&left.fallback, &right.fallback, visited)
                    && left
                        .elements
                        .iter()
                        .zip(&right.elements)
                        .all(|(x, y)| self.sets_equal_rec(x, y, visited))
            }
            (Value::Dict(left), Value::Dict(right)) => {
                self.sets_equal_rec(&left.keys, &right.keys, visited)
                    && self.sets_equal_rec(&left.values, &right.values, visited)
            }
            (Value::Generator(left), Value::Generator(right)) => {
                left.is_coroutine == right.is_coroutine
                    && self.sets_equal_rec(&left.element, &right.element, visited)
                    && self.sets_equal_rec(&left.returns, &right.returns, visited)
            }
            (Value::Instance(left), Value::Instance(right)) => left.class == right.class,
            (
                Value::Protocol(ProtocolValue::Callable { returns: left }),
                Value::Protocol(ProtocolValue::Callable { returns: right }),
            ) => self.sets_equal_rec(left, right, visited),
            (
                Value::Protocol(ProtocolValue::Iterable { element: left }),
                Value::Protocol(ProtocolValue::Iterable { element: right }),
            ) => self.sets_equal_rec(left, right, visited),
            (
                Value::Super {
                    class: left_class,
                    receiver: left_receiver,
                },
                Value::Super {
                    class: right_class,
                    receiver: right_receiver,
                },
            ) => left_class == right_class && left_receiver == right_receiver,
            (
                Value::Partial {
                    callee: left_callee,
                    args: left_args,
                    keywords: left_keywords,
                },
                Value::Partial {
                    callee: right_callee,
                    args: right_args,
                    keywords: right_keywords,
                },
            ) => {
                left_callee == right_callee
                    && left_args.len() == right_args.len()
                    && left_keywords.len() == right_keywords.len()
                    && left_args
                        .iter()
                        .zip(right_args)
                        .all(|(a, b)| self.sets_equal_rec(a, b, visited))
                    && left_keywords
                        .iter()
                        .zip(right_keywords)
                        .all(|((an, a), (bn, b))| an == bn && self.sets_equal_rec(a, b, visited))
            }
            _ => false,
        }
    }

    fn sets_equal_rec(
        &self,
        a: &ValueSet,
        b: &ValueSet,
        visited: &mut HashSet<(ValueId, ValueId)>,
    ) -> bool {
        if a.len() != b.len() {
            return false;
        }
        a.iter()
            .zip(b.iter())
            .all(|(x, y)| self.values_equal_rec(x, y, visited))
    }

    // ------------------------------------------------------------------
    // Classification helpers
    // ------------------------------------------------------------------

    /// Whether a value is callable at all.
    pub fn is_callable(&self, id: ValueId) -> bool {
        matches!(
            self.get(id),
            Value::Any
                | Value::Function(_)
                | Value::BoundMethod { .. }
                | Value::Class(_)
                | Value::Builtin(_)
                | Value::BuiltinMethod { .. }
                | Value::Partial { .. }
                | Value::Protocol(ProtocolValue::Callable { .. })
        ) || matches!(self.get(id), Value::Instance(_))
    }
}

// ============================================================================
// Join and widening
// ============================================================================

impl ValueSet {
    /// Join a single value into the set. Returns true when the set
    /// changed. `limit` is the cardinality budget; exceeding it triggers
    /// widening.
    pub fn join_id(&mut self, store: &mut ValueStore, id: ValueId, limit: usize) -> bool {
        if self.0.iter().any(|existing| *existing == id) {
            return false;
        }
        // Any absorbs everything.
        if self.0.len() == 1 && matches!(store.get(self.0[0]), Value::Any) {
            return false;
        }
        if matches!(store.get(id), Value::Any) {
            self.0.clear();
            self.0.push(id);
            return true;
        }
        if self.0.iter().any(|existing| store.values_equal(*existing, id)) {
            return false;
        }
        self.0.push(id);
        if self.0.len() > limit {
            self.widen(store, limit);
        }
        true
    }

    /// Join another set into this one. Returns true when this set grew.
    pub fn join(&mut self, store: &mut ValueStore, other: &ValueSet, limit: usize) -> bool {
        let mut changed = false;
        for id in other.iter() {
            changed |= self.join_id(store, id, limit);
        }
        changed
    }

    /// Widen toward the budget: constants collapse to primitives, then
    /// same-class instances collapse, then the set becomes `Any`.
    pub fn widen(&mut self, store: &mut ValueStore, limit: usize) {
        // Step 1: type-erase constants.
        let mut erased: SmallVec<[ValueId; 4]> = SmallVec::new();
        for id in self.0.iter().copied() {
            let id = match store.get(id) {
                Value::Constant { kind, .. } => {
                    let kind = *kind;
                    store.primitive(kind)
                }
                _ => id,
            };
            if !erased.contains(&id) {
                erased.push(id);
            }
        }
        self.0 = erased;
        if self.0.len() <= limit {
            return;
        }
        // Step 2: collapse duplicate instances per class.
        let mut kept: SmallVec<[ValueId; 4]> = SmallVec::new();
        let mut seen_classes: HashSet<ValueId> = HashSet::new();
        for id in self.0.iter().copied() {
            if let Value::Instance(instance) = store.get(id) {
                if !seen_classes.insert(instance.class) {
                    continue;
                }
            }
            kept.push(id);
        }
        self.0 = kept;
        if self.0.len() <= limit {
            return;
        }
        // Step 3: give up.
        let any = store.any();
        self.0.clear();
        self.0.push(any);
    }

    /// Replace the whole set with `Any` (forced widening on timeout or
    /// re-analysis exhaustion). Returns true when the set changed.
    pub fn force_any(&mut self, store: &mut ValueStore) -> bool {
        let any = store.any();
        if self.0.len() == 1 && self.0[0] == any {
            return false;
        }
        self.0.clear();
        self.0.push(any);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ValueStore {
        ValueStore::new()
    }

    #[test]
    fn primitives_are_interned() {
        let mut s = store();
        assert_eq!(s.primitive(PrimitiveKind::Int), s.primitive(PrimitiveKind::Int));
        assert_ne!(s.primitive(PrimitiveKind::Int), s.primitive(PrimitiveKind::Str));
    }

    #[test]
    fn constants_are_interned_by_text() {
        let mut s = store();
        let a = s.constant(PrimitiveKind::Str, "abc");
        let b = s.constant(PrimitiveKind::Str, "abc");
        let c = s.constant(PrimitiveKind::Str, "xyz");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn join_deduplicates() {
        let mut s = store();
        let int = s.primitive(PrimitiveKind::Int);
        let mut set = ValueSet::empty();
        assert!(set.join_id(&mut s, int, 10));
        assert!(!set.join_id(&mut s, int, 10));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn join_is_commutative() {
        let mut s = store();
        let ids: Vec<ValueId> = [
            PrimitiveKind::Int,
            PrimitiveKind::Str,
            PrimitiveKind::Float,
            PrimitiveKind::Bool,
        ]
        .into_iter()
        .map(|k| s.primitive(k))
        .collect();
        let mut forward = ValueSet::empty();
        for id in &ids {
            forward.join_id(&mut s, *id, 10);
        }
        let mut backward = ValueSet::empty();
        for id in ids.iter().rev() {
            backward.join_id(&mut s, *id, 10);
        }
        let mut f = forward.summary();
        let mut b = backward.summary();
        f.sort_unstable();
        b.sort_unstable();
        assert_eq!(f, b);
    }

    #[test]
    fn widening_collapses_constants_first() {
        let mut s = store();
        let mut set = ValueSet::empty();
        for i in 0..4 {
            let id = s.constant(PrimitiveKind::Int, i.to_string());
            set.join_id(&mut s, id, 3);
        }
        // Four distinct int constants exceed the budget of three and
        // collapse into the single int primitive.
        assert_eq!(set.len(), 1);
        assert!(matches!(
            s.get(set.iter().next().unwrap()),
            Value::Primitive(PrimitiveKind::Int)
        ));
    }

    #[test]
    fn widening_falls_back_to_any() {
        let mut s = store();
        let mut set = ValueSet::empty();
        let kinds = [
            PrimitiveKind::Int,
            PrimitiveKind::Str,
            PrimitiveKind::Float,
            PrimitiveKind::Bool,
            PrimitiveKind::Bytes,
            PrimitiveKind::Complex,
        ];
        for kind in kinds {
            let id = s.primitive(kind);
            set.join_id(&mut s, id, 4);
        }
        assert_eq!(set.len(), 1);
        assert!(matches!(s.get(set.iter().next().unwrap()), Value::Any));
    }

    #[test]
    fn any_absorbs_joins() {
        let mut s = store();
        let any = s.any();
        let int = s.primitive(PrimitiveKind::Int);
        let mut set = ValueSet::one(any);
        assert!(!set.join_id(&mut s, int, 10));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn cyclic_sequence_equality_terminates() {
        let mut s = store();
        let list_a = s.alloc(Value::Sequence(SequenceValue::default()));
        let list_b = s.alloc(Value::Sequence(SequenceValue::default()));
        // Each list contains itself.
        if let Value::Sequence(seq) = s.get_mut(list_a) {
            seq.fallback = ValueSet::one(list_a);
        }
        if let Value::Sequence(seq) = s.get_mut(list_b) {
            seq.fallback = ValueSet::one(list_b);
        }
        assert!(s.values_equal(list_a, list_b));
    }

    #[test]
    fn canonical_instances() {
        let mut s = store();
        let class = s.alloc(Value::Class(ClassValue {
            name: "C".into(),
            qualname: "m.C".into(),
            module: None,
            scope: None,
            bases: vec![],
            mro: vec![],
            members: IndexMap::new(),
            builtin: None,
            doc: None,
        }));
        assert_eq!(s.instance_of(class), s.instance_of(class));
    }

    #[test]
    fn force_any_is_idempotent() {
        let mut s = store();
        let int = s.primitive(PrimitiveKind::Int);
        let mut set = ValueSet::one(int);
        assert!(set.force_any(&mut s));
        assert!(!set.force_any(&mut s));
    }
}
