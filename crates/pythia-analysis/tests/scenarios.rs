//! End-to-end analysis scenarios over the query API.

use pythia_analysis::{AnalysisSession, SiteKind};
use pythia_core::cancel::CancellationToken;
use pythia_core::config::AnalysisConfig;
use pythia_core::diagnostics::DiagnosticCode;
use pythia_core::span::Position;
use pythia_core::version::PythonVersion;

fn session() -> AnalysisSession {
    AnalysisSession::new(AnalysisConfig::default())
}

fn py2_session() -> AnalysisSession {
    AnalysisSession::new(AnalysisConfig::for_version(PythonVersion::V2_7))
}

// ============================================================================
// S1: call-context sensitivity
// ============================================================================

#[test]
fn cartesian_simple() {
    let mut session = session();
    let module = session.add_module("s1", "def f(a): return a\nx = f(42)\ny = f('fob')\n");
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(2, 0)),
        vec!["int".to_string()]
    );
    assert_eq!(
        query.type_names_at(module, Position::new(3, 0)),
        vec!["str".to_string()]
    );
}

// ============================================================================
// S2: recursive list
// ============================================================================

#[test]
fn recursive_list_terminates() {
    let mut session = session();
    let module = session.add_module(
        "s2",
        "x = []\nx.append(x)\nx.append(1)\nx.append('a')\ny = x[0]\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let names = query.type_names_at(module, Position::new(5, 0));
    for expected in ["list", "int", "str"] {
        assert!(names.iter().any(|n| n == expected), "missing {expected} in {names:?}");
    }
}

// ============================================================================
// S3: method resolution order
// ============================================================================

#[test]
fn diamond_mro() {
    let mut session = session();
    let module = session.add_module(
        "s3",
        "class F: pass\nclass E: pass\nclass D: pass\nclass C(D, F): pass\nclass B(D, E): pass\nclass A(B, C): pass\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let a = query
        .values_of_name_at(module, Position::new(6, 6), "A")
        .unwrap();
    assert_eq!(
        query.mro_of(&a),
        vec!["A", "B", "C", "D", "E", "F", "object"]
    );
}

#[test]
fn inconsistent_mro_is_diagnosed() {
    let mut session = session();
    let module = session.add_module(
        "s3bad",
        "class A: pass\nclass B: pass\nclass C(A, B): pass\nclass D(B, A): pass\nclass E(C, D): pass\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let diagnostics = query.diagnostics_of(module);
    assert!(diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::InvalidMro));
    // Lookup degrades to the class itself plus object.
    let e = query
        .values_of_name_at(module, Position::new(5, 6), "E")
        .unwrap();
    assert_eq!(query.mro_of(&e), vec!["E", "object"]);
}

// ============================================================================
// S4: star-import re-export chain
// ============================================================================

#[test]
fn import_star_reexport_chain() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("fob/oar")).unwrap();
    std::fs::write(root.join("fob/__init__.py"), "from oar import *\n").unwrap();
    std::fs::write(root.join("fob/oar/__init__.py"), "from .baz import *\n").unwrap();
    std::fs::write(
        root.join("fob/oar/baz.py"),
        "import fob.oar.quox as quox\nfunc = quox.func\n",
    )
    .unwrap();
    std::fs::write(root.join("fob/oar/quox.py"), "def func(): return 42\n").unwrap();

    let config = AnalysisConfig::for_version(PythonVersion::V2_7).with_search_path(root);
    let mut session = AnalysisSession::new(config);
    session.load_module_by_name("fob").unwrap();
    session.analyze().unwrap();

    let query = session.query();
    for module_name in ["fob", "fob.oar", "fob.oar.baz", "fob.oar.quox"] {
        let module = query.module_named(module_name).unwrap();
        let func = query
            .module_binding(module, "func")
            .unwrap_or_else(|| panic!("no 'func' in {module_name}"));
        assert!(!func.is_empty(), "'func' empty in {module_name}");
        assert_eq!(
            query.describe_set(&func),
            "fob.oar.quox.func() -> int",
            "bad description in {module_name}"
        );
    }
}

// ============================================================================
// S5: isinstance narrowing
// ============================================================================

#[test]
fn assert_isinstance_narrows() {
    let mut session = session();
    let module = session.add_module(
        "s5",
        "x = None\nif True:\n    assert isinstance(x, int)\n    z = 100\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    // Inside the narrowed region x is int.
    assert_eq!(
        query.values_of_name_at(module, Position::new(4, 4), "x").map(|v| query.type_names(&v)),
        Some(vec!["int".to_string()])
    );
    // z is int.
    assert_eq!(
        query.type_names_at(module, Position::new(4, 4)),
        vec!["int".to_string()]
    );
    // Outside, x keeps its module-level binding.
    let outside = query
        .values_of_name_at(module, Position::new(1, 0), "x")
        .unwrap();
    assert!(query.type_names(&outside).contains(&"None".to_string()));
}

#[test]
fn isinstance_branch_complement() {
    let mut session = session();
    let module = session.add_module(
        "s5b",
        "x = 1\nx = 'a'\nif isinstance(x, int):\n    y = x\nelse:\n    z = x\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    // The true branch sees only int.
    assert_eq!(
        query.type_names_at(module, Position::new(4, 4)),
        vec!["int".to_string()]
    );
    // The false branch sees the complement.
    assert_eq!(
        query.type_names_at(module, Position::new(6, 4)),
        vec!["str".to_string()]
    );
}

// ============================================================================
// S6: functools.partial
// ============================================================================

#[test]
fn functools_partial_binds_prefix() {
    let mut session = session();
    let module = session.add_module(
        "s6",
        "from _functools import partial\ndef fob(a, b, c, d):\n    return a, b, c, d\np = partial(fob, 123, 3.14)\nr = p('abc', [])\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let r = query
        .values_of_name_at(module, Position::new(5, 0), "r")
        .unwrap();
    assert_eq!(query.describe_set(&r), "tuple[int, float, str, list]");
}

// ============================================================================
// S7: find-references across modules
// ============================================================================

#[test]
fn find_references_across_modules() {
    let mut session = session();
    let mod1 = session.add_module("mod1", "def f(abc): return abc\n");
    let _mod2 = session.add_module("mod2", "import mod1\nz = mod1.f(42)\n");
    session.analyze().unwrap();
    let query = session.query();

    // Position of `f` in its definition: line 1, column 4.
    let references = query.references_of(mod1, Position::new(1, 4));
    assert!(
        references
            .iter()
            .any(|r| r.module == "mod1" && r.kind == SiteKind::Definition),
        "missing definition site: {references:?}"
    );
    assert!(
        references
            .iter()
            .any(|r| r.module == "mod1" && r.kind == SiteKind::Value),
        "missing value site: {references:?}"
    );
    assert!(
        references
            .iter()
            .any(|r| r.module == "mod2" && r.kind == SiteKind::Reference),
        "missing cross-module reference: {references:?}"
    );

    // The definition query narrows to the definition site.
    let definitions = query.definition_of(mod1, Position::new(1, 4));
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].module, "mod1");
}

// ============================================================================
// Instances, methods, super
// ============================================================================

#[test]
fn self_attributes_flow_to_instances() {
    let mut session = session();
    let module = session.add_module(
        "attrs",
        "class C:\n    def __init__(self):\n        self.x = 1\nc = C()\ny = c.x\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(5, 0)),
        vec!["int".to_string()]
    );
}

#[test]
fn super_searches_mro_after_class() {
    let mut session = session();
    let module = session.add_module(
        "supers",
        "class Base:\n    def greet(self): return 'base'\nclass Child(Base):\n    def greet(self): return super().greet()\nc = Child().greet()\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(5, 0)),
        vec!["str".to_string()]
    );
}

#[test]
fn properties_read_as_values() {
    let mut session = session();
    let module = session.add_module(
        "props",
        "class C:\n    @property\n    def size(self):\n        return 10\nc = C()\nn = c.size\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(6, 0)),
        vec!["int".to_string()]
    );
}

// ============================================================================
// Generators and async
// ============================================================================

#[test]
fn generator_elements_flow_to_loops() {
    let mut session = session();
    let module = session.add_module(
        "gens",
        "def gen():\n    yield 1\n    yield 'a'\nfor v in gen():\n    pass\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let names = query.type_names_at(module, Position::new(4, 4));
    assert!(names.contains(&"int".to_string()), "{names:?}");
    assert!(names.contains(&"str".to_string()), "{names:?}");
}

#[test]
fn await_returns_function_result() {
    let mut session = session();
    let module = session.add_module(
        "asyncs",
        "async def fetch():\n    return 42\nasync def main():\n    value = await fetch()\n    return value\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(4, 4)),
        vec!["int".to_string()]
    );
}

// ============================================================================
// Builtins
// ============================================================================

#[test]
fn open_mode_selects_file_class() {
    let mut session = session();
    let module = session.add_module(
        "files",
        "t = open('a.txt')\nb = open('a.bin', 'rb')\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(1, 0)),
        vec!["TextIOWrapper".to_string()]
    );
    assert_eq!(
        query.type_names_at(module, Position::new(2, 0)),
        vec!["BufferedIOBase".to_string()]
    );
}

#[test]
fn sys_modules_overrides_imports() {
    let mut session = session();
    let module = session.add_module(
        "overrides",
        "import sys\nsys.modules['fake'] = 42\nimport fake\nx = fake\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(4, 0)),
        vec!["int".to_string()]
    );
}

#[test]
fn getattr_reads_members() {
    let mut session = session();
    let module = session.add_module(
        "getattrs",
        "class C:\n    def __init__(self):\n        self.field = 'x'\nc = C()\nv = getattr(c, 'field')\nw = getattr(c, 'missing', 3)\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    assert_eq!(
        query.type_names_at(module, Position::new(5, 0)),
        vec!["str".to_string()]
    );
    let w = query.type_names_at(module, Position::new(6, 0));
    assert!(w.contains(&"int".to_string()), "{w:?}");
}

// ============================================================================
// Version-dependent semantics
// ============================================================================

#[test]
fn division_follows_version() {
    let mut py3 = session();
    let module3 = py3.add_module("div3", "x = 1 / 2\n");
    py3.analyze().unwrap();
    assert_eq!(
        py3.query().type_names_at(module3, Position::new(1, 0)),
        vec!["float".to_string()]
    );

    let mut py2 = py2_session();
    let module2 = py2.add_module("div2", "x = 1 / 2\n");
    py2.analyze().unwrap();
    assert_eq!(
        py2.query().type_names_at(module2, Position::new(1, 0)),
        vec!["int".to_string()]
    );

    let mut future = py2_session();
    let module_future =
        future.add_module("divf", "from __future__ import division\nx = 1 / 2\n");
    future.analyze().unwrap();
    assert_eq!(
        future.query().type_names_at(module_future, Position::new(2, 0)),
        vec!["float".to_string()]
    );
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn unresolved_name_is_diagnosed() {
    let mut session = session();
    let module = session.add_module("names", "y = missing_name\n");
    session.analyze().unwrap();
    let diagnostics = session.query().diagnostics_of(module);
    assert!(diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::UsedBeforeAssignment));
}

#[test]
fn unresolved_import_is_diagnosed_and_binding_is_empty() {
    let mut session = session();
    let module = session.add_module("imports", "import no_such_module\nx = no_such_module\n");
    session.analyze().unwrap();
    let query = session.query();
    assert!(query
        .diagnostics_of(module)
        .iter()
        .any(|d| d.code == DiagnosticCode::UnresolvedImport));
    let binding = query.module_binding(module, "no_such_module").unwrap();
    assert!(binding.is_empty());
}

#[test]
fn calling_non_callable_is_diagnosed() {
    let mut session = session();
    let module = session.add_module("calls", "x = 1\ny = x()\n");
    session.analyze().unwrap();
    assert!(session
        .query()
        .diagnostics_of(module)
        .iter()
        .any(|d| d.code == DiagnosticCode::NotCallable));
}

// ============================================================================
// Fixpoint properties
// ============================================================================

#[test]
fn analysis_is_idempotent() {
    let source = "def f(a): return a\nx = f(42)\ny = f('fob')\nclass C(object): pass\nc = C()\n";
    let mut session = session();
    let module = session.add_module("idem", source);
    session.analyze().unwrap();
    let first_types = session.query().type_names_at(module, Position::new(2, 0));
    let first_diags = session.query().diagnostics_of(module);

    session.set_module_source(module, source);
    session.analyze().unwrap();
    let second_types = session.query().type_names_at(module, Position::new(2, 0));
    let second_diags = session.query().diagnostics_of(module);

    assert_eq!(first_types, second_types);
    assert_eq!(first_diags, second_diags);
}

#[test]
fn mutual_recursion_terminates() {
    let mut session = session();
    session.add_module(
        "recur",
        "def f(x):\n    return g(x + 1)\ndef g(x):\n    return f(x * 2)\na = f(1)\n",
    );
    session.analyze().unwrap();
}

#[test]
fn self_recursive_growth_is_widened() {
    let mut session = session();
    session.add_module(
        "widen",
        "def f(x):\n    return f((x,))\na = f(1)\n",
    );
    // Termination is the property under test.
    session.analyze().unwrap();
}

#[test]
fn cancellation_propagates() {
    let mut session = session();
    session.add_module("cancelme", "x = 1\n");
    let token = CancellationToken::new();
    token.cancel();
    assert!(session.analyze_with(&token).is_err());
}

// ============================================================================
// Completions and signatures
// ============================================================================

#[test]
fn completions_after_dot_list_members() {
    let mut session = session();
    let module = session.add_module(
        "completions",
        "class C:\n    def method(self): return 1\nc = C()\nc.method\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    // Position inside `.method` on the last line.
    let completions = query.completions_at(module, Position::new(4, 3));
    assert!(
        completions.iter().any(|c| c.name == "method"),
        "{completions:?}"
    );
}

#[test]
fn scope_completions_include_locals_and_builtins() {
    let mut session = session();
    let module = session.add_module(
        "scopecomp",
        "top = 1\ndef f(arg):\n    local = 2\n    return local\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let completions = query.completions_at(module, Position::new(4, 4));
    let names: Vec<&str> = completions.iter().map(|c| c.name.as_str()).collect();
    for expected in ["local", "arg", "top", "len"] {
        assert!(names.contains(&expected), "missing {expected} in {names:?}");
    }
}

#[test]
fn signatures_describe_parameters_and_returns() {
    let mut session = session();
    let module = session.add_module(
        "sigs",
        "def add(a, b=2):\n    return a + b\nr = add(1)\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let add = query
        .values_of_name_at(module, Position::new(3, 4), "add")
        .unwrap();
    let signatures = query.signatures_of(&add);
    assert_eq!(signatures.len(), 1);
    let signature = &signatures[0];
    assert_eq!(signature.name, "sigs.add");
    assert_eq!(signature.parameters.len(), 2);
    assert_eq!(signature.parameters[0].name, "a");
    assert_eq!(signature.parameters[1].name, "b");
    assert_eq!(signature.parameters[1].default.as_deref(), Some("int"));
    assert!(signature.returns.contains("int"), "{}", signature.returns);
}

// ============================================================================
// Docstrings
// ============================================================================

#[test]
fn docstrings_are_captured() {
    let mut session = session();
    let module = session.add_module(
        "docs",
        "\"\"\"Module doc.\"\"\"\ndef f():\n    \"\"\"Function doc.\"\"\"\n    return 1\nr = f()\n",
    );
    session.analyze().unwrap();
    let query = session.query();
    let f = query
        .values_of_name_at(module, Position::new(5, 4), "f")
        .unwrap();
    let signatures = query.signatures_of(&f);
    assert_eq!(signatures[0].doc.as_deref(), Some("Function doc."));
}
