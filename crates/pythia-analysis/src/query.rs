//! Read-only queries over a stabilized analysis.
//!
//! Queries are pure: they read the lattice as of the most recent unit
//! boundary and never drive further analysis. Positions use 1-based
//! lines and 0-based columns.

use indexmap::IndexMap;

use pythia_core::diagnostics::Diagnostic;
use pythia_core::span::{Position, Span};
use pythia_cst::{
    CompoundStatement, Expression, Module as CstModule, NodeId, SmallStatement, Statement, Suite,
};

use crate::module::ModuleId;
use crate::scope::{SiteKind, SiteRef};
use crate::session::AnalysisSession;
use crate::value::{
    BuiltinFn, FunctionSource, ProtocolValue, SequenceKind, Value, ValueId, ValueSet,
};

// ============================================================================
// Result records
// ============================================================================

/// One reference site, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceResult {
    /// Dotted name of the module the site is in.
    pub module: String,
    pub span: Span,
    pub kind: SiteKind,
}

/// One definition site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionResult {
    pub module: String,
    pub span: Span,
}

/// A completion item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub name: String,
    pub kind: CompletionKind,
}

/// What a completion names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    Module,
    Class,
    Function,
    Value,
}

/// One parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDescription {
    pub name: String,
    /// Description of the default value, when there is one.
    pub default: Option<String>,
}

/// One overload of a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDescription {
    pub name: String,
    pub parameters: Vec<ParameterDescription>,
    pub returns: String,
    pub doc: Option<String>,
}

// ============================================================================
// Query
// ============================================================================

/// A read-only handle over a session's results.
pub struct Query<'a> {
    session: &'a AnalysisSession,
}

impl<'a> Query<'a> {
    pub(crate) fn new(session: &'a AnalysisSession) -> Self {
        Self { session }
    }

    fn offset_of(&self, module: ModuleId, position: Position) -> Option<u32> {
        self.session
            .modules
            .get(module)
            .line_index
            .as_ref()?
            .offset_of(position)
    }

    /// Look up a module by dotted name.
    pub fn module_named(&self, name: &str) -> Option<ModuleId> {
        self.session.modules.by_name(name)
    }

    /// The value set bound to a top-level name of a module.
    pub fn module_binding(&self, module: ModuleId, name: &str) -> Option<ValueSet> {
        let scope = self.session.modules.get(module).scope?;
        self.session
            .scopes
            .get(scope)
            .variables
            .get(name)
            .map(|variable| variable.values.clone())
    }

    /// The MRO (as class names) of the first class value in a set.
    pub fn mro_of(&self, values: &ValueSet) -> Vec<String> {
        for id in values.iter() {
            if let Value::Class(class) = self.session.store.get(id) {
                return class
                    .mro
                    .iter()
                    .filter_map(|entry| match self.session.store.get(*entry) {
                        Value::Class(c) => Some(c.name.clone()),
                        _ => None,
                    })
                    .collect();
            }
        }
        Vec::new()
    }

    // ------------------------------------------------------------------
    // type_of
    // ------------------------------------------------------------------

    /// The value set of the innermost expression at a position.
    pub fn values_at(&self, module: ModuleId, position: Position) -> Option<ValueSet> {
        let offset = self.offset_of(module, position)?;
        let ast = self.session.modules.get(module).ast.clone()?;
        let node = find_expression_at(&ast, offset)?;
        self.session.expr_values.get(&(module, node)).cloned()
    }

    /// The type names of the innermost expression at a position, sorted.
    pub fn type_names_at(&self, module: ModuleId, position: Position) -> Vec<String> {
        let values = self.values_at(module, position).unwrap_or_default();
        self.type_names(&values)
    }

    /// The value set a name has at a position, honoring narrowed
    /// sub-scopes.
    pub fn values_of_name_at(
        &self,
        module: ModuleId,
        position: Position,
        name: &str,
    ) -> Option<ValueSet> {
        let offset = self.offset_of(module, position)?;
        let scope = self.session.scopes.innermost_at(module, offset)?;
        // Walk outward; narrowed scopes shadow their parents.
        let mut current = Some(scope);
        let mut first = true;
        while let Some(id) = current {
            let s = self.session.scopes.get(id);
            let visible = first || s.visible_to_closures();
            if visible {
                if let Some(variable) = s.variables.get(name) {
                    return Some(variable.values.clone());
                }
            }
            first = false;
            current = s.parent;
        }
        None
    }

    /// Sorted, deduplicated type names of a value set.
    pub fn type_names(&self, values: &ValueSet) -> Vec<String> {
        let mut names: Vec<String> = values
            .iter()
            .map(|id| self.type_name_of(id))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn type_name_of(&self, id: ValueId) -> String {
        let store = &self.session.store;
        match store.get(id) {
            Value::Any => "Any".to_string(),
            Value::Primitive(kind) | Value::Constant { kind, .. } => kind.type_name().to_string(),
            Value::Sequence(seq) => seq.kind.type_name().to_string(),
            Value::Dict(_) | Value::SysModules => "dict".to_string(),
            Value::Generator(gen) if gen.is_coroutine => "coroutine".to_string(),
            Value::Generator(_) => "generator".to_string(),
            Value::Function(_) | Value::BoundMethod { .. } | Value::Builtin(_) => {
                "function".to_string()
            }
            Value::BuiltinMethod { .. } => "function".to_string(),
            Value::Class(class) => class.name.clone(),
            Value::Instance(instance) => match store.get(instance.class) {
                Value::Class(class) => class.name.clone(),
                _ => "object".to_string(),
            },
            Value::Module(module) => self.session.modules.get(*module).name.clone(),
            Value::Super { .. } => "super".to_string(),
            Value::Partial { .. } => "functools.partial".to_string(),
            Value::Protocol(ProtocolValue::Callable { .. }) => "function".to_string(),
            Value::Protocol(ProtocolValue::Iterable { .. }) => "iterable".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // members_of
    // ------------------------------------------------------------------

    /// All members reachable from a value set: name → value set.
    pub fn members_of(&self, values: &ValueSet) -> IndexMap<String, ValueSet> {
        let mut members = IndexMap::new();
        for id in values.iter() {
            self.collect_members(id, &mut members);
        }
        members
    }

    fn collect_members(&self, id: ValueId, out: &mut IndexMap<String, ValueSet>) {
        let store = &self.session.store;
        match store.get(id) {
            Value::Module(module) => {
                if let Some(scope) = self.session.modules.get(*module).scope {
                    for (name, variable) in &self.session.scopes.get(scope).variables {
                        out.entry(name.clone())
                            .or_insert_with(|| variable.values.clone());
                    }
                }
            }
            Value::Instance(instance) => {
                for (name, values) in &instance.attributes {
                    out.entry(name.clone()).or_insert_with(|| values.clone());
                }
                self.collect_class_members(instance.class, out);
            }
            Value::Class(_) => self.collect_class_members(id, out),
            Value::Primitive(kind) | Value::Constant { kind, .. } => {
                if let Some(class) = self.session.builtins.primitive_classes.get(kind) {
                    self.collect_class_members(*class, out);
                }
            }
            Value::Sequence(seq) => {
                let names: &[&str] = match seq.kind {
                    SequenceKind::Set | SequenceKind::FrozenSet => {
                        &["add", "pop", "discard", "union", "intersection"]
                    }
                    _ => &["append", "extend", "insert", "pop", "index", "count"],
                };
                for name in names {
                    out.entry((*name).to_string()).or_default();
                }
            }
            Value::Dict(_) => {
                for name in ["get", "keys", "values", "items", "setdefault", "pop"] {
                    out.entry(name.to_string()).or_default();
                }
            }
            Value::Generator(_) => {
                for name in ["send", "close", "throw"] {
                    out.entry(name.to_string()).or_default();
                }
            }
            _ => {}
        }
    }

    fn collect_class_members(&self, class: ValueId, out: &mut IndexMap<String, ValueSet>) {
        let store = &self.session.store;
        let Value::Class(c) = store.get(class) else {
            return;
        };
        for entry in &c.mro {
            let Value::Class(entry_class) = store.get(*entry) else {
                continue;
            };
            for (name, values) in &entry_class.members {
                out.entry(name.clone()).or_insert_with(|| values.clone());
            }
            if let Some(scope) = entry_class.scope {
                for (name, variable) in &self.session.scopes.get(scope).variables {
                    out.entry(name.clone())
                        .or_insert_with(|| variable.values.clone());
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    /// Completions at a position: after a dot, the receiver's members;
    /// otherwise every name visible in the enclosing scope chain.
    pub fn completions_at(&self, module: ModuleId, position: Position) -> Vec<Completion> {
        let Some(offset) = self.offset_of(module, position) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(ast) = self.session.modules.get(module).ast.clone() {
            if let Some(receiver_node) = find_attribute_receiver_at(&ast, offset) {
                if let Some(values) = self.session.expr_values.get(&(module, receiver_node)) {
                    for (name, member_values) in self.members_of(values) {
                        out.push(Completion {
                            kind: self.completion_kind(&member_values),
                            name,
                        });
                    }
                    return out;
                }
            }
        }
        let Some(scope) = self.session.scopes.innermost_at(module, offset) else {
            return Vec::new();
        };
        for (name, scope_id) in self.session.scopes.visible_names(scope) {
            let values = self.session.scopes.get(scope_id).variables[&name].values.clone();
            out.push(Completion {
                kind: self.completion_kind(&values),
                name,
            });
        }
        out
    }

    fn completion_kind(&self, values: &ValueSet) -> CompletionKind {
        let store = &self.session.store;
        for id in values.iter() {
            match store.get(id) {
                Value::Module(_) => return CompletionKind::Module,
                Value::Class(_) => return CompletionKind::Class,
                Value::Function(_)
                | Value::BoundMethod { .. }
                | Value::Builtin(_)
                | Value::Protocol(ProtocolValue::Callable { .. }) => {
                    return CompletionKind::Function
                }
                _ => {}
            }
        }
        CompletionKind::Value
    }

    // ------------------------------------------------------------------
    // Signatures
    // ------------------------------------------------------------------

    /// Callable overloads in a value set.
    pub fn signatures_of(&self, values: &ValueSet) -> Vec<SignatureDescription> {
        let mut out = Vec::new();
        for id in values.iter() {
            self.signature_of(id, false, &mut out);
        }
        out
    }

    fn signature_of(&self, id: ValueId, skip_first: bool, out: &mut Vec<SignatureDescription>) {
        let store = &self.session.store;
        match store.get(id) {
            Value::Function(function) => {
                let data = store.function(*function);
                let mut parameters = Vec::new();
                let params = match &data.source {
                    FunctionSource::Def(def) => &def.params,
                    FunctionSource::Lambda(lambda) => &lambda.params,
                };
                for param in &params.params {
                    let Some(name) = param.name() else { continue };
                    let default = data
                        .default_values
                        .get(name)
                        .map(|values| self.describe_set(values));
                    let display_name = match &param.star {
                        Some(star) => format!("{}{name}", star.text),
                        None => name.to_string(),
                    };
                    parameters.push(ParameterDescription {
                        name: display_name,
                        default,
                    });
                }
                if skip_first && !parameters.is_empty() && !data.is_staticmethod {
                    parameters.remove(0);
                }
                let mut combined: Vec<ValueId> = Vec::new();
                for state in data.contexts.values() {
                    for value in state.returns.iter() {
                        if !combined.contains(&value) {
                            combined.push(value);
                        }
                    }
                }
                let returns_text = if combined.is_empty() {
                    "None".to_string()
                } else {
                    let mut names: Vec<String> =
                        combined.iter().map(|v| self.describe_value(*v)).collect();
                    names.sort();
                    names.dedup();
                    names.join(" | ")
                };
                out.push(SignatureDescription {
                    name: data.qualname.clone(),
                    parameters,
                    returns: returns_text,
                    doc: data.doc.clone(),
                });
            }
            Value::BoundMethod { function, .. } => {
                self.signature_of(*function, true, out);
            }
            Value::Class(class) => {
                // A class's call signature is its constructor's.
                let mut found = false;
                for entry in &class.mro {
                    if let Value::Class(entry_class) = store.get(*entry) {
                        if let Some(scope) = entry_class.scope {
                            if let Some(init) =
                                self.session.scopes.get(scope).variables.get("__init__")
                            {
                                for init_id in init.values.iter() {
                                    self.signature_of(init_id, true, out);
                                    found = true;
                                }
                            }
                        }
                    }
                    if found {
                        break;
                    }
                }
                if !found {
                    out.push(SignatureDescription {
                        name: class.qualname.clone(),
                        parameters: Vec::new(),
                        returns: class.name.clone(),
                        doc: class.doc.clone(),
                    });
                }
            }
            Value::Builtin(builtin) => {
                out.push(builtin_signature(*builtin));
            }
            Value::Partial { callee, args, .. } => {
                // The bound prefix disappears from the visible signature.
                let mut inner = Vec::new();
                self.signature_of(*callee, false, &mut inner);
                for mut signature in inner {
                    let bound = args.len();
                    if signature.parameters.len() >= bound {
                        signature.parameters.drain(..bound);
                    }
                    out.push(signature);
                }
            }
            Value::Protocol(ProtocolValue::Callable { returns }) => {
                out.push(SignatureDescription {
                    name: "<callable>".to_string(),
                    parameters: Vec::new(),
                    returns: self.describe_set(returns),
                    doc: None,
                });
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Definitions and references
    // ------------------------------------------------------------------

    fn variable_sites_at(&self, module: ModuleId, position: Position) -> Option<Vec<SiteRef>> {
        let offset = self.offset_of(module, position)?;
        let ast = self.session.modules.get(module).ast.clone()?;
        let name = find_name_at(&ast, offset)?;
        // Try scope-chain resolution first.
        let scope = self.session.scopes.innermost_at(module, offset)?;
        if let Some(resolved) = self.session.scopes.resolve_read(scope, &name) {
            let variable = self.session.scopes.get(resolved).variables.get(&name)?;
            return Some(variable.sites.clone());
        }
        // Fall back to any module-scope variable with this name whose
        // sites include the queried position (attribute references).
        for entry in self.session.modules.iter() {
            let Some(scope) = entry.scope else { continue };
            if let Some(variable) = self.session.scopes.get(scope).variables.get(&name) {
                let hit = variable
                    .sites
                    .iter()
                    .any(|site| site.module == module && site.span.contains(offset));
                if hit {
                    return Some(variable.sites.clone());
                }
            }
        }
        None
    }

    /// Definition sites of the name at a position.
    pub fn definition_of(&self, module: ModuleId, position: Position) -> Vec<DefinitionResult> {
        let Some(sites) = self.variable_sites_at(module, position) else {
            return Vec::new();
        };
        sites
            .iter()
            .filter(|site| site.kind == SiteKind::Definition)
            .map(|site| DefinitionResult {
                module: self.session.modules.get(site.module).name.clone(),
                span: site.span,
            })
            .collect()
    }

    /// All sites of the name at a position, classified as definition,
    /// value, or reference.
    pub fn references_of(&self, module: ModuleId, position: Position) -> Vec<ReferenceResult> {
        let Some(sites) = self.variable_sites_at(module, position) else {
            return Vec::new();
        };
        sites
            .iter()
            .map(|site| ReferenceResult {
                module: self.session.modules.get(site.module).name.clone(),
                span: site.span,
                kind: site.kind,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Parse and analysis diagnostics for a module, in source order.
    pub fn diagnostics_of(&self, module: ModuleId) -> Vec<Diagnostic> {
        let entry = self.session.modules.get(module);
        let mut out = entry.parse_diagnostics.clone();
        for unit in &entry.units {
            if let Some(diagnostics) = self.session.unit_diagnostics.get(unit) {
                out.extend(diagnostics.iter().cloned());
            }
        }
        // Function-body units report into their defining module too.
        for (unit, diagnostics) in &self.session.unit_diagnostics {
            if entry.units.contains(unit) {
                continue;
            }
            if let crate::queue::UnitKind::FunctionBody { function, .. } =
                self.session.queue.kind(*unit)
            {
                if self.session.store.function(*function).module == module {
                    out.extend(diagnostics.iter().cloned());
                }
            }
        }
        out.sort_by_key(|d| (d.span.start, d.span.end));
        out.dedup();
        out
    }

    // ------------------------------------------------------------------
    // Descriptions
    // ------------------------------------------------------------------

    /// Human-readable description of one value.
    pub fn describe_value(&self, id: ValueId) -> String {
        self.describe_depth(id, 0)
    }

    /// Depth-limited description: self-referential containers bottom out
    /// at their bare type name.
    fn describe_depth(&self, id: ValueId, depth: usize) -> String {
        if depth > 6 {
            return self.type_name_of(id);
        }
        let store = &self.session.store;
        match store.get(id) {
            Value::Any => "Any".to_string(),
            Value::Primitive(kind) | Value::Constant { kind, .. } => kind.type_name().to_string(),
            Value::Sequence(seq) => {
                if seq.kind == SequenceKind::Tuple && !seq.elements.is_empty() {
                    let inner: Vec<String> = seq
                        .elements
                        .iter()
                        .map(|element| self.describe_set_depth(element, depth + 1))
                        .collect();
                    format!("tuple[{}]", inner.join(", "))
                } else {
                    let element = self.element_union(seq, depth + 1);
                    if element.is_empty() {
                        seq.kind.type_name().to_string()
                    } else {
                        format!("{}[{}]", seq.kind.type_name(), element)
                    }
                }
            }
            Value::Dict(_) | Value::SysModules => "dict".to_string(),
            Value::Generator(gen) => {
                let element = self.describe_set_depth(&gen.element, depth + 1);
                if gen.is_coroutine {
                    format!("coroutine[{element}]")
                } else {
                    format!("generator[{element}]")
                }
            }
            Value::Function(function) => {
                let data = store.function(*function);
                let params = match &data.source {
                    FunctionSource::Def(def) => def
                        .params
                        .params
                        .iter()
                        .filter_map(|p| p.name())
                        .collect::<Vec<_>>()
                        .join(", "),
                    FunctionSource::Lambda(lambda) => lambda
                        .params
                        .params
                        .iter()
                        .filter_map(|p| p.name())
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                let mut returns: Vec<String> = Vec::new();
                for state in data.contexts.values() {
                    for value in state.returns.iter() {
                        let name = self.describe_depth(value, depth + 1);
                        if !returns.contains(&name) {
                            returns.push(name);
                        }
                    }
                }
                returns.sort();
                let returns = if returns.is_empty() {
                    "None".to_string()
                } else {
                    returns.join(" | ")
                };
                format!("{}({params}) -> {returns}", data.qualname)
            }
            Value::BoundMethod { function, .. } => self.describe_depth(*function, depth + 1),
            Value::Class(class) => format!("class {}", class.qualname),
            Value::Instance(instance) => match store.get(instance.class) {
                Value::Class(class) => class.name.clone(),
                _ => "object".to_string(),
            },
            Value::Module(module) => {
                format!("module {}", self.session.modules.get(*module).name)
            }
            Value::Super { .. } => "super".to_string(),
            Value::Partial { callee, .. } => {
                format!(
                    "functools.partial({})",
                    self.describe_depth(*callee, depth + 1)
                )
            }
            Value::Builtin(builtin) => builtin_signature(*builtin).name,
            Value::BuiltinMethod { .. } => "builtin method".to_string(),
            Value::Protocol(ProtocolValue::Callable { returns }) => {
                format!("(...) -> {}", self.describe_set_depth(returns, depth + 1))
            }
            Value::Protocol(ProtocolValue::Iterable { element }) => {
                format!("iterable[{}]", self.describe_set_depth(element, depth + 1))
            }
        }
    }

    /// Description of a whole set, `|`-joined and sorted.
    pub fn describe_set(&self, values: &ValueSet) -> String {
        self.describe_set_depth(values, 0)
    }

    fn describe_set_depth(&self, values: &ValueSet, depth: usize) -> String {
        let mut names: Vec<String> = values
            .iter()
            .map(|id| self.describe_depth(id, depth))
            .collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            "Unknown".to_string()
        } else {
            names.join(" | ")
        }
    }

    fn element_union(&self, seq: &crate::value::SequenceValue, depth: usize) -> String {
        let mut names: Vec<String> = Vec::new();
        for set in seq.elements.iter().chain(std::iter::once(&seq.fallback)) {
            for id in set.iter() {
                let name = self.describe_depth(id, depth);
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        names.join(" | ")
    }
}

fn builtin_signature(builtin: BuiltinFn) -> SignatureDescription {
    let (name, returns) = match builtin {
        BuiltinFn::Len => ("len(obj)", "int"),
        BuiltinFn::Abs => ("abs(x)", "int"),
        BuiltinFn::Range => ("range(start, stop, step)", "list[int]"),
        BuiltinFn::Xrange => ("xrange(start, stop, step)", "list[int]"),
        BuiltinFn::Open => ("open(file, mode)", "TextIOWrapper | BufferedIOBase"),
        BuiltinFn::Iter => ("iter(obj)", "iterator"),
        BuiltinFn::Next => ("next(iterator, default)", "Any"),
        BuiltinFn::Getattr => ("getattr(obj, name, default)", "Any"),
        BuiltinFn::Setattr => ("setattr(obj, name, value)", "None"),
        BuiltinFn::Hasattr => ("hasattr(obj, name)", "bool"),
        BuiltinFn::Vars => ("vars(obj)", "dict"),
        BuiltinFn::Dir => ("dir(obj)", "list[str]"),
        BuiltinFn::Sorted => ("sorted(iterable, key, reverse)", "list"),
        BuiltinFn::Repr => ("repr(obj)", "str"),
        BuiltinFn::Print => ("print(*values)", "None"),
        BuiltinFn::Super => ("super(type, obj)", "super"),
        BuiltinFn::Isinstance => ("isinstance(obj, class_or_tuple)", "bool"),
        BuiltinFn::Issubclass => ("issubclass(cls, class_or_tuple)", "bool"),
        BuiltinFn::Type => ("type(obj)", "type"),
        BuiltinFn::Partial => ("functools.partial(func, *args)", "callable"),
        BuiltinFn::Wraps => ("functools.wraps(wrapped)", "decorator"),
        BuiltinFn::Staticmethod => ("staticmethod(func)", "function"),
        BuiltinFn::Classmethod => ("classmethod(func)", "function"),
        BuiltinFn::Property => ("property(fget)", "property"),
    };
    SignatureDescription {
        name: name.to_string(),
        parameters: Vec::new(),
        returns: returns.to_string(),
        doc: None,
    }
}

// ============================================================================
// Position finders
// ============================================================================

/// The innermost expression node covering `offset`.
fn find_expression_at(module: &CstModule, offset: u32) -> Option<NodeId> {
    let mut best: Option<(u32, NodeId)> = None;
    walk_statements(&module.body, &mut |expr| {
        let span = expr.span();
        if span.start <= offset && offset < span.end.max(span.start + 1) {
            let size = span.end.saturating_sub(span.start);
            if best.map(|(s, _)| size <= s).unwrap_or(true) {
                best = Some((size, expr.node_id()));
            }
        }
    });
    best.map(|(_, id)| id)
}

/// The identifier text at `offset` (a plain name or an attribute name).
fn find_name_at(module: &CstModule, offset: u32) -> Option<String> {
    let mut found: Option<String> = None;
    walk_statements(&module.body, &mut |expr| {
        match expr {
            Expression::Name(name) => {
                if name.span.contains(offset) {
                    found = Some(name.value().to_string());
                }
            }
            Expression::Attribute(attribute) => {
                if attribute.attr.span.contains(offset) {
                    found = Some(attribute.attr.value().to_string());
                }
            }
            _ => {}
        }
    });
    found
}

/// When `offset` is on (or right after) an attribute name, the receiver
/// expression's node, for member completions.
fn find_attribute_receiver_at(module: &CstModule, offset: u32) -> Option<NodeId> {
    let mut found: Option<NodeId> = None;
    walk_statements(&module.body, &mut |expr| {
        if let Expression::Attribute(attribute) = expr {
            let zone = Span::new(attribute.dot.span.start, attribute.attr.span.end + 1);
            if zone.contains(offset) {
                found = Some(attribute.value.node_id());
            }
        }
    });
    found
}

fn walk_statements(body: &[Statement], visit: &mut dyn FnMut(&Expression)) {
    for statement in body {
        walk_statement(statement, visit);
    }
}

fn walk_statement(statement: &Statement, visit: &mut dyn FnMut(&Expression)) {
    match statement {
        Statement::Simple(line) => {
            for part in &line.parts {
                walk_small(&part.statement, visit);
            }
        }
        Statement::Compound(compound) => walk_compound(compound, visit),
    }
}

fn walk_small(statement: &SmallStatement, visit: &mut dyn FnMut(&Expression)) {
    match statement {
        SmallStatement::Expr(s) => walk_expression(&s.value, visit),
        SmallStatement::Assign(s) => {
            for target in &s.targets {
                walk_expression(&target.target, visit);
            }
            walk_expression(&s.value, visit);
        }
        SmallStatement::AugAssign(s) => {
            walk_expression(&s.target, visit);
            walk_expression(&s.value, visit);
        }
        SmallStatement::AnnAssign(s) => {
            walk_expression(&s.target, visit);
            walk_expression(&s.annotation, visit);
            if let Some((_, value)) = &s.value {
                walk_expression(value, visit);
            }
        }
        SmallStatement::Return(s) => {
            if let Some(value) = &s.value {
                walk_expression(value, visit);
            }
        }
        SmallStatement::Del(s) => {
            for (target, _) in &s.targets {
                walk_expression(target, visit);
            }
        }
        SmallStatement::Assert(s) => {
            walk_expression(&s.test, visit);
            if let Some((_, msg)) = &s.msg {
                walk_expression(msg, visit);
            }
        }
        SmallStatement::Raise(s) => {
            if let Some(exc) = &s.exc {
                walk_expression(exc, visit);
            }
            if let Some((_, cause)) = &s.from_part {
                walk_expression(cause, visit);
            }
            for (_, value) in &s.comma_parts {
                walk_expression(value, visit);
            }
        }
        SmallStatement::Print(s) => {
            if let Some((_, file, _)) = &s.chevron {
                walk_expression(file, visit);
            }
            for (value, _) in &s.args {
                walk_expression(value, visit);
            }
        }
        SmallStatement::Exec(s) => {
            walk_expression(&s.body, visit);
            if let Some(in_part) = &s.in_part {
                walk_expression(&in_part.globals, visit);
                if let Some((_, locals)) = &in_part.locals {
                    walk_expression(locals, visit);
                }
            }
        }
        _ => {}
    }
}

fn walk_compound(compound: &CompoundStatement, visit: &mut dyn FnMut(&Expression)) {
    match compound {
        CompoundStatement::FunctionDef(def) => {
            for decorator in &def.decorators {
                walk_expression(&decorator.expression, visit);
            }
            for param in &def.params.params {
                if let Some((_, annotation)) = &param.annotation {
                    walk_expression(annotation, visit);
                }
                if let Some((_, default)) = &param.default {
                    walk_expression(default, visit);
                }
            }
            if let Some((_, returns)) = &def.returns {
                walk_expression(returns, visit);
            }
            walk_suite(&def.body, visit);
        }
        CompoundStatement::ClassDef(def) => {
            for decorator in &def.decorators {
                walk_expression(&decorator.expression, visit);
            }
            if let Some(arguments) = &def.arguments {
                for arg in &arguments.args {
                    walk_expression(&arg.value, visit);
                }
            }
            walk_suite(&def.body, visit);
        }
        CompoundStatement::If(s) => {
            walk_expression(&s.test, visit);
            walk_suite(&s.body, visit);
            for elif in &s.elifs {
                walk_expression(&elif.test, visit);
                walk_suite(&elif.body, visit);
            }
            if let Some(orelse) = &s.orelse {
                walk_suite(&orelse.body, visit);
            }
        }
        CompoundStatement::While(s) => {
            walk_expression(&s.test, visit);
            walk_suite(&s.body, visit);
            if let Some(orelse) = &s.orelse {
                walk_suite(&orelse.body, visit);
            }
        }
        CompoundStatement::For(s) => {
            walk_expression(&s.target, visit);
            walk_expression(&s.iter, visit);
            walk_suite(&s.body, visit);
            if let Some(orelse) = &s.orelse {
                walk_suite(&orelse.body, visit);
            }
        }
        CompoundStatement::With(s) => {
            for item in &s.items {
                walk_expression(&item.context, visit);
                if let Some((_, target)) = &item.as_part {
                    walk_expression(target, visit);
                }
            }
            walk_suite(&s.body, visit);
        }
        CompoundStatement::Try(s) => {
            walk_suite(&s.body, visit);
            for handler in &s.handlers {
                if let Some(exc_type) = &handler.exc_type {
                    walk_expression(exc_type, visit);
                }
                walk_suite(&handler.body, visit);
            }
            if let Some(orelse) = &s.orelse {
                walk_suite(&orelse.body, visit);
            }
            if let Some(finally) = &s.finally {
                walk_suite(&finally.body, visit);
            }
        }
    }
}

fn walk_suite(suite: &Suite, visit: &mut dyn FnMut(&Expression)) {
    match suite {
        Suite::Block { body, .. } => walk_statements(body, visit),
        Suite::Inline { parts, .. } => {
            for part in parts {
                walk_small(&part.statement, visit);
            }
        }
    }
}

fn walk_expression(expr: &Expression, visit: &mut dyn FnMut(&Expression)) {
    visit(expr);
    match expr {
        Expression::Tuple(tuple) => {
            for element in &tuple.elements {
                walk_expression(&element.value, visit);
            }
        }
        Expression::List(list) => {
            for element in &list.elements {
                walk_expression(&element.value, visit);
            }
        }
        Expression::Set(set) => {
            for element in &set.elements {
                walk_expression(&element.value, visit);
            }
        }
        Expression::Dict(dict) => {
            for element in &dict.elements {
                match element {
                    pythia_cst::DictElement::Pair { key, value, .. } => {
                        walk_expression(key, visit);
                        walk_expression(value, visit);
                    }
                    pythia_cst::DictElement::Unpack { value, .. } => {
                        walk_expression(value, visit);
                    }
                }
            }
        }
        Expression::ListComp(comp) => {
            walk_expression(&comp.element, visit);
            walk_comp_for(&comp.comp, visit);
        }
        Expression::SetComp(comp) => {
            walk_expression(&comp.element, visit);
            walk_comp_for(&comp.comp, visit);
        }
        Expression::DictComp(comp) => {
            walk_expression(&comp.key, visit);
            walk_expression(&comp.value, visit);
            walk_comp_for(&comp.comp, visit);
        }
        Expression::Generator(generator) => {
            walk_expression(&generator.element, visit);
            walk_comp_for(&generator.comp, visit);
        }
        Expression::Call(call) => {
            walk_expression(&call.func, visit);
            for arg in &call.args {
                walk_expression(&arg.value, visit);
            }
        }
        Expression::Attribute(attribute) => walk_expression(&attribute.value, visit),
        Expression::Subscript(subscript) => {
            walk_expression(&subscript.value, visit);
            for element in &subscript.elements {
                match &element.index {
                    pythia_cst::SubscriptIndex::Index(index) => walk_expression(index, visit),
                    pythia_cst::SubscriptIndex::Slice(slice) => {
                        if let Some(lower) = &slice.lower {
                            walk_expression(lower, visit);
                        }
                        if let Some(upper) = &slice.upper {
                            walk_expression(upper, visit);
                        }
                        if let Some((_, Some(step))) = &slice.step {
                            walk_expression(step, visit);
                        }
                    }
                }
            }
        }
        Expression::Binary(binary) => {
            walk_expression(&binary.left, visit);
            walk_expression(&binary.right, visit);
        }
        Expression::Unary(unary) => walk_expression(&unary.operand, visit),
        Expression::Boolean(boolean) => {
            walk_expression(&boolean.left, visit);
            walk_expression(&boolean.right, visit);
        }
        Expression::Compare(compare) => {
            walk_expression(&compare.left, visit);
            for part in &compare.comparisons {
                walk_expression(&part.right, visit);
            }
        }
        Expression::Conditional(conditional) => {
            walk_expression(&conditional.body, visit);
            walk_expression(&conditional.test, visit);
            walk_expression(&conditional.orelse, visit);
        }
        Expression::Lambda(lambda) => {
            for param in &lambda.params.params {
                if let Some((_, default)) = &param.default {
                    walk_expression(default, visit);
                }
            }
            walk_expression(&lambda.body, visit);
        }
        Expression::Yield(yield_expr) => {
            if let Some(value) = &yield_expr.value {
                walk_expression(value, visit);
            }
        }
        Expression::Await(await_expr) => walk_expression(&await_expr.value, visit),
        Expression::Starred(starred) => walk_expression(&starred.value, visit),
        Expression::Repr(repr) => walk_expression(&repr.value, visit),
        Expression::Parenthesized(paren) => walk_expression(&paren.value, visit),
        _ => {}
    }
}

fn walk_comp_for(comp: &pythia_cst::CompFor, visit: &mut dyn FnMut(&Expression)) {
    walk_expression(&comp.target, visit);
    walk_expression(&comp.iter, visit);
    for comp_if in &comp.ifs {
        walk_expression(&comp_if.test, visit);
    }
    if let Some(inner) = &comp.inner {
        walk_comp_for(inner, visit);
    }
}
