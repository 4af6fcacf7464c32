//! The curated builtin world: classes, functions, and the synthetic
//! `builtins`, `sys`, and `functools` modules.
//!
//! Everything here is seeded once per session, before any user module is
//! analyzed. The builtins scope is the root of every lookup chain; the
//! synthetic modules make `import sys` and `from functools import
//! partial` resolve without any stub files on disk. Stub summaries can
//! still shadow or extend the standard library through the loader.

use std::collections::HashMap;

use indexmap::IndexMap;

use pythia_core::version::PythonVersion;

use crate::module::{ModuleId, ModuleTable};
use crate::scope::{ScopeId, ScopeKind, ScopeTable};
use crate::value::{
    BuiltinClassKind, BuiltinFn, ClassValue, PrimitiveKind, ProtocolValue, SequenceKind, Value,
    ValueId, ValueSet, ValueStore,
};

/// Ids of the seeded builtin world.
#[derive(Debug)]
pub struct Builtins {
    /// The root scope of every lookup chain.
    pub scope: ScopeId,
    pub object: ValueId,
    pub type_class: ValueId,
    pub primitive_classes: HashMap<PrimitiveKind, ValueId>,
    pub sequence_classes: HashMap<SequenceKind, ValueId>,
    pub dict_class: ValueId,
    pub generator_class: ValueId,
    pub function_class: ValueId,
    pub text_file_class: ValueId,
    pub binary_file_class: ValueId,
    pub builtins_module: ModuleId,
    pub sys_module: ModuleId,
    pub functools_module: ModuleId,
}

impl Builtins {
    /// The class a value is an instance of, when that is meaningful.
    pub fn class_of(&self, store: &ValueStore, id: ValueId) -> Option<ValueId> {
        match store.get(id) {
            Value::Primitive(kind) | Value::Constant { kind, .. } => {
                self.primitive_classes.get(kind).copied()
            }
            Value::Sequence(seq) => self.sequence_classes.get(&seq.kind).copied(),
            Value::Dict(_) | Value::SysModules => Some(self.dict_class),
            Value::Generator(_) => Some(self.generator_class),
            Value::Function(_) | Value::BoundMethod { .. } | Value::Builtin(_) => {
                Some(self.function_class)
            }
            Value::Instance(instance) => Some(instance.class),
            Value::Class(_) => Some(self.type_class),
            _ => None,
        }
    }

    /// Whether `id`'s type is `class` or a subclass of it. `Any` matches
    /// everything.
    pub fn is_instance_of(&self, store: &ValueStore, id: ValueId, class: ValueId) -> bool {
        if matches!(store.get(id), Value::Any) {
            return true;
        }
        let Some(value_class) = self.class_of(store, id) else {
            return false;
        };
        if value_class == class || class == self.object {
            return true;
        }
        if let Value::Class(c) = store.get(value_class) {
            return c.mro.contains(&class);
        }
        false
    }
}

/// Seed the builtin world into fresh tables.
pub fn seed(
    store: &mut ValueStore,
    scopes: &mut ScopeTable,
    modules: &mut ModuleTable,
    version: PythonVersion,
) -> Builtins {
    let scope = scopes.alloc(None, ScopeKind::Builtins, None, None);

    let object = alloc_class(store, "object", BuiltinClassKind::Object, None);
    let type_class = alloc_class(store, "type", BuiltinClassKind::Type, Some(object));

    let mut primitive_classes = HashMap::new();
    for kind in [
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Complex,
        PrimitiveKind::Bool,
        PrimitiveKind::Str,
        PrimitiveKind::Bytes,
        PrimitiveKind::None,
        PrimitiveKind::Ellipsis,
    ] {
        let class = alloc_class(
            store,
            kind.type_name(),
            BuiltinClassKind::Primitive(kind),
            Some(object),
        );
        primitive_classes.insert(kind, class);
    }
    seed_str_members(store, &mut primitive_classes);

    let mut sequence_classes = HashMap::new();
    for kind in [
        SequenceKind::List,
        SequenceKind::Tuple,
        SequenceKind::Set,
        SequenceKind::FrozenSet,
    ] {
        let class = alloc_class(
            store,
            kind.type_name(),
            BuiltinClassKind::Sequence(kind),
            Some(object),
        );
        sequence_classes.insert(kind, class);
    }

    let dict_class = alloc_class(store, "dict", BuiltinClassKind::Dict, Some(object));
    let generator_class = alloc_class(store, "generator", BuiltinClassKind::Plain, Some(object));
    let function_class = alloc_class(store, "function", BuiltinClassKind::Plain, Some(object));
    let text_file_class = seed_file_class(store, "TextIOWrapper", BuiltinClassKind::TextFile, object, PrimitiveKind::Str);
    let binary_file_class = seed_file_class(store, "BufferedIOBase", BuiltinClassKind::BinaryFile, object, PrimitiveKind::Bytes);

    // ------------------------------------------------------------------
    // The builtins scope
    // ------------------------------------------------------------------

    let bind = |scopes: &mut ScopeTable, name: &str, id: ValueId| {
        scopes.variable_mut(scope, name).values = ValueSet::one(id);
    };

    bind(scopes, "object", object);
    bind(scopes, "type", type_class);
    for (kind, class) in &primitive_classes {
        match kind {
            PrimitiveKind::None | PrimitiveKind::Ellipsis => {}
            PrimitiveKind::Long | PrimitiveKind::Bytes if version.is_py3() => {
                if *kind == PrimitiveKind::Bytes {
                    bind(scopes, "bytes", *class);
                }
            }
            PrimitiveKind::Long => bind(scopes, "long", *class),
            PrimitiveKind::Bytes => bind(scopes, "bytes", *class),
            _ => bind(scopes, kind.type_name(), *class),
        }
    }
    if !version.is_py3() {
        // `unicode` and `basestring` alias the text type on 2.x.
        bind(scopes, "unicode", primitive_classes[&PrimitiveKind::Str]);
        bind(scopes, "basestring", primitive_classes[&PrimitiveKind::Str]);
    }
    for (kind, class) in &sequence_classes {
        bind(scopes, kind.type_name(), *class);
    }
    bind(scopes, "dict", dict_class);

    for name in [
        "BaseException",
        "Exception",
        "ValueError",
        "TypeError",
        "KeyError",
        "IndexError",
        "AttributeError",
        "RuntimeError",
        "StopIteration",
        "NotImplementedError",
        "ZeroDivisionError",
        "ImportError",
        "NameError",
        "IOError",
        "OSError",
    ] {
        let class = alloc_class(store, name, BuiltinClassKind::Exception, Some(object));
        bind(scopes, name, class);
    }

    let functions: &[(&str, BuiltinFn)] = &[
        ("len", BuiltinFn::Len),
        ("abs", BuiltinFn::Abs),
        ("range", BuiltinFn::Range),
        ("open", BuiltinFn::Open),
        ("iter", BuiltinFn::Iter),
        ("next", BuiltinFn::Next),
        ("getattr", BuiltinFn::Getattr),
        ("setattr", BuiltinFn::Setattr),
        ("hasattr", BuiltinFn::Hasattr),
        ("vars", BuiltinFn::Vars),
        ("dir", BuiltinFn::Dir),
        ("sorted", BuiltinFn::Sorted),
        ("repr", BuiltinFn::Repr),
        ("super", BuiltinFn::Super),
        ("isinstance", BuiltinFn::Isinstance),
        ("issubclass", BuiltinFn::Issubclass),
        ("staticmethod", BuiltinFn::Staticmethod),
        ("classmethod", BuiltinFn::Classmethod),
        ("property", BuiltinFn::Property),
    ];
    for (name, f) in functions {
        let id = store.builtin_fn(*f);
        bind(scopes, name, id);
    }
    if version.is_py3() {
        let id = store.builtin_fn(BuiltinFn::Print);
        bind(scopes, "print", id);
    } else {
        let id = store.builtin_fn(BuiltinFn::Xrange);
        bind(scopes, "xrange", id);
    }

    let true_id = store.constant(PrimitiveKind::Bool, "True");
    let false_id = store.constant(PrimitiveKind::Bool, "False");
    let none_id = store.primitive(PrimitiveKind::None);
    let ellipsis_id = store.primitive(PrimitiveKind::Ellipsis);
    let str_prim = store.primitive(PrimitiveKind::Str);
    bind(scopes, "True", true_id);
    bind(scopes, "False", false_id);
    bind(scopes, "None", none_id);
    bind(scopes, "Ellipsis", ellipsis_id);
    bind(scopes, "__name__", str_prim);
    bind(scopes, "__file__", str_prim);
    bind(scopes, "__doc__", str_prim);
    let any = store.any();
    bind(scopes, "NotImplemented", any);

    // ------------------------------------------------------------------
    // Synthetic modules
    // ------------------------------------------------------------------

    let builtins_module = modules.insert(
        if version.is_py3() { "builtins" } else { "__builtin__" },
        None,
    );
    modules.get_mut(builtins_module).scope = Some(scope);

    let sys_module = modules.insert("sys", None);
    let sys_scope = scopes.alloc(Some(scope), ScopeKind::Module(sys_module), Some(sys_module), None);
    modules.get_mut(sys_module).scope = Some(sys_scope);
    let sys_modules_value = store.alloc(Value::SysModules);
    scopes.variable_mut(sys_scope, "modules").values = ValueSet::one(sys_modules_value);
    let str_list = store.alloc(Value::Sequence(crate::value::SequenceValue {
        kind: SequenceKind::List,
        elements: Vec::new(),
        fallback: ValueSet::one(str_prim),
        known_len: None,
    }));
    scopes.variable_mut(sys_scope, "path").values = ValueSet::one(str_list);
    scopes.variable_mut(sys_scope, "argv").values = ValueSet::one(str_list);
    let text_file = store.instance_of(text_file_class);
    scopes.variable_mut(sys_scope, "stdout").values = ValueSet::one(text_file);
    scopes.variable_mut(sys_scope, "stderr").values = ValueSet::one(text_file);
    scopes.variable_mut(sys_scope, "stdin").values = ValueSet::one(text_file);
    let int_prim = store.primitive(PrimitiveKind::Int);
    let version_info = store.alloc(Value::Sequence(crate::value::SequenceValue {
        kind: SequenceKind::Tuple,
        elements: Vec::new(),
        fallback: ValueSet::one(int_prim),
        known_len: Some(5),
    }));
    scopes.variable_mut(sys_scope, "version_info").values = ValueSet::one(version_info);
    scopes.variable_mut(sys_scope, "maxsize").values = ValueSet::one(int_prim);

    let functools_module = modules.insert("functools", None);
    let functools_scope = scopes.alloc(
        Some(scope),
        ScopeKind::Module(functools_module),
        Some(functools_module),
        None,
    );
    modules.get_mut(functools_module).scope = Some(functools_scope);
    let partial_id = store.builtin_fn(BuiltinFn::Partial);
    let wraps_id = store.builtin_fn(BuiltinFn::Wraps);
    scopes.variable_mut(functools_scope, "partial").values = ValueSet::one(partial_id);
    scopes.variable_mut(functools_scope, "wraps").values = ValueSet::one(wraps_id);
    let reduce_ret = ValueSet::one(any);
    let reduce_id = store.alloc(Value::Protocol(ProtocolValue::Callable {
        returns: reduce_ret,
    }));
    scopes.variable_mut(functools_scope, "reduce").values = ValueSet::one(reduce_id);
    // The C accelerator module exposes the same names.
    let underscore_functools = modules.insert("_functools", None);
    modules.get_mut(underscore_functools).scope = Some(functools_scope);

    Builtins {
        scope,
        object,
        type_class,
        primitive_classes,
        sequence_classes,
        dict_class,
        generator_class,
        function_class,
        text_file_class,
        binary_file_class,
        builtins_module,
        sys_module,
        functools_module,
    }
}

fn alloc_class(
    store: &mut ValueStore,
    name: &str,
    builtin: BuiltinClassKind,
    base: Option<ValueId>,
) -> ValueId {
    let bases: Vec<ValueId> = base.into_iter().collect();
    let id = store.alloc(Value::Class(ClassValue {
        name: name.to_string(),
        qualname: name.to_string(),
        module: None,
        scope: None,
        bases: bases.clone(),
        mro: Vec::new(),
        members: IndexMap::new(),
        builtin: Some(builtin),
        doc: None,
    }));
    let mut mro = vec![id];
    mro.extend(bases);
    if let Value::Class(class) = store.get_mut(id) {
        class.mro = mro;
    }
    id
}

/// A member that is "callable returning the given primitive".
fn callable_returning(store: &mut ValueStore, kind: PrimitiveKind) -> ValueSet {
    let prim = store.primitive(kind);
    let id = store.alloc(Value::Protocol(ProtocolValue::Callable {
        returns: ValueSet::one(prim),
    }));
    ValueSet::one(id)
}

fn callable_returning_list_of(store: &mut ValueStore, kind: PrimitiveKind) -> ValueSet {
    let prim = store.primitive(kind);
    let list = store.alloc(Value::Sequence(crate::value::SequenceValue {
        kind: SequenceKind::List,
        elements: Vec::new(),
        fallback: ValueSet::one(prim),
        known_len: None,
    }));
    let id = store.alloc(Value::Protocol(ProtocolValue::Callable {
        returns: ValueSet::one(list),
    }));
    ValueSet::one(id)
}

fn seed_str_members(store: &mut ValueStore, classes: &mut HashMap<PrimitiveKind, ValueId>) {
    let str_class = classes[&PrimitiveKind::Str];
    let mut members = IndexMap::new();
    for name in [
        "upper", "lower", "strip", "lstrip", "rstrip", "format", "join", "replace", "title",
        "capitalize", "encode",
    ] {
        members.insert(name.to_string(), callable_returning(store, PrimitiveKind::Str));
    }
    for name in ["split", "rsplit", "splitlines"] {
        members.insert(
            name.to_string(),
            callable_returning_list_of(store, PrimitiveKind::Str),
        );
    }
    for name in ["startswith", "endswith", "isdigit", "isalpha"] {
        members.insert(name.to_string(), callable_returning(store, PrimitiveKind::Bool));
    }
    for name in ["find", "rfind", "index", "count"] {
        members.insert(name.to_string(), callable_returning(store, PrimitiveKind::Int));
    }
    if let Value::Class(class) = store.get_mut(str_class) {
        class.members = members;
    }
}

fn seed_file_class(
    store: &mut ValueStore,
    name: &str,
    kind: BuiltinClassKind,
    object: ValueId,
    payload: PrimitiveKind,
) -> ValueId {
    let class = alloc_class(store, name, kind, Some(object));
    let mut members = IndexMap::new();
    members.insert("read".to_string(), callable_returning(store, payload));
    members.insert("readline".to_string(), callable_returning(store, payload));
    members.insert(
        "readlines".to_string(),
        callable_returning_list_of(store, payload),
    );
    members.insert("write".to_string(), callable_returning(store, PrimitiveKind::Int));
    members.insert("close".to_string(), callable_returning(store, PrimitiveKind::None));
    members.insert("flush".to_string(), callable_returning(store, PrimitiveKind::None));
    if let Value::Class(c) = store.get_mut(class) {
        c.members = members;
    }
    class
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> (ValueStore, ScopeTable, ModuleTable, Builtins) {
        let mut store = ValueStore::new();
        let mut scopes = ScopeTable::new();
        let mut modules = ModuleTable::new();
        let builtins = seed(&mut store, &mut scopes, &mut modules, PythonVersion::V3_7);
        (store, scopes, modules, builtins)
    }

    #[test]
    fn builtin_scope_has_core_names() {
        let (_store, scopes, _modules, builtins) = world();
        for name in ["int", "str", "list", "dict", "len", "isinstance", "object", "None"] {
            assert!(
                scopes.get(builtins.scope).variables.contains_key(name),
                "missing builtin {name}"
            );
        }
    }

    #[test]
    fn py2_extras() {
        let mut store = ValueStore::new();
        let mut scopes = ScopeTable::new();
        let mut modules = ModuleTable::new();
        let builtins = seed(&mut store, &mut scopes, &mut modules, PythonVersion::V2_7);
        let vars = &scopes.get(builtins.scope).variables;
        assert!(vars.contains_key("xrange"));
        assert!(vars.contains_key("unicode"));
        assert!(vars.contains_key("long"));
        assert!(!vars.contains_key("print"));
        assert_eq!(modules.by_name("__builtin__"), Some(builtins.builtins_module));
    }

    #[test]
    fn class_of_primitives() {
        let (mut store, _scopes, _modules, builtins) = world();
        let int_value = store.primitive(PrimitiveKind::Int);
        assert_eq!(
            builtins.class_of(&store, int_value),
            Some(builtins.primitive_classes[&PrimitiveKind::Int])
        );
        let const_value = store.constant(PrimitiveKind::Str, "x");
        assert_eq!(
            builtins.class_of(&store, const_value),
            Some(builtins.primitive_classes[&PrimitiveKind::Str])
        );
    }

    #[test]
    fn isinstance_respects_object_top() {
        let (mut store, _scopes, _modules, builtins) = world();
        let int_value = store.primitive(PrimitiveKind::Int);
        let int_class = builtins.primitive_classes[&PrimitiveKind::Int];
        let str_class = builtins.primitive_classes[&PrimitiveKind::Str];
        assert!(builtins.is_instance_of(&store, int_value, int_class));
        assert!(builtins.is_instance_of(&store, int_value, builtins.object));
        assert!(!builtins.is_instance_of(&store, int_value, str_class));
    }

    #[test]
    fn sys_module_exposes_modules_mapping() {
        let (store, scopes, modules, builtins) = world();
        let sys_scope = modules.get(builtins.sys_module).scope.unwrap();
        let modules_var = &scopes.get(sys_scope).variables["modules"];
        let id = modules_var.values.iter().next().unwrap();
        assert!(matches!(store.get(id), Value::SysModules));
    }
}
