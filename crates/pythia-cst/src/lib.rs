//! A Python tokenizer, error-tolerant parser, and verbatim concrete
//! syntax tree.
//!
//! This crate parses Python source (versions 2.6 through 3.7) into a CST
//! that preserves every byte of the input: whitespace, comments,
//! continuations, and even syntactically invalid regions, which become
//! explicit error nodes. Re-emitting the tree with [`Codegen`] reproduces
//! the source exactly.
//!
//! # Quick start
//!
//! ```
//! use pythia_core::PythonVersion;
//! use pythia_cst::{emit, parse_module};
//!
//! let parsed = parse_module("def hello(): print('world')\n", PythonVersion::V3_7);
//! assert!(parsed.diagnostics.is_empty());
//! assert_eq!(emit(&parsed.module), "def hello(): print('world')\n");
//! ```
//!
//! # Error tolerance
//!
//! [`parse_module`] never fails. Invalid input produces a tree with error
//! nodes plus diagnostics, and the round-trip guarantee still holds:
//!
//! ```
//! use pythia_core::PythonVersion;
//! use pythia_cst::{emit, parse_module};
//!
//! let source = "def ((:\nx = 1\n";
//! let parsed = parse_module(source, PythonVersion::V3_7);
//! assert!(!parsed.diagnostics.is_empty());
//! assert_eq!(emit(&parsed.module), source);
//! ```
//!
//! # Formatting
//!
//! [`format::format_module`] applies a tri-valued option bundle
//! ([`format::FormatOptions`]) that rewrites only the whitespace slots an
//! enabled option governs; everything else is preserved.

pub mod codegen;
pub mod format;
mod nodes;
pub mod parser;
pub mod tokenizer;

pub use codegen::{Codegen, CodegenState};
pub use format::{format_module, FormatOptions};
pub use nodes::*;
pub use parser::{render_diagnostic, Parser};
pub use tokenizer::{is_keyword, tokenize, StringPrefix, Token, TokenKind, TokenizeOutput};

use pythia_core::diagnostics::Diagnostic;
use pythia_core::version::PythonVersion;

/// Result of [`parse_module`]: the CST plus all tokenizer and parser
/// diagnostics, in source order.
#[derive(Debug)]
pub struct ParseOutput {
    /// The parsed module. Always present, whatever the input.
    pub module: Module,
    /// Lexical and syntax diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse `source` at the given language version.
///
/// Never fails: any byte string yields a module whose re-emitted text
/// equals the input. Syntax problems are reported in
/// [`ParseOutput::diagnostics`].
pub fn parse_module(source: &str, version: PythonVersion) -> ParseOutput {
    let tokenized = tokenizer::tokenize(source, version);
    let mut diagnostics = tokenized.diagnostics;
    let (module, parse_diagnostics) = Parser::new(tokenized.tokens, version).parse_module();
    diagnostics.extend(parse_diagnostics);
    diagnostics.sort_by_key(|d| (d.span.start, d.span.end));
    ParseOutput {
        module,
        diagnostics,
    }
}

/// Re-emit a module verbatim.
pub fn emit(module: &Module) -> String {
    let mut state = CodegenState::default();
    module.codegen(&mut state);
    state.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &str, version: PythonVersion) {
        let parsed = parse_module(source, version);
        assert_eq!(emit(&parsed.module), source, "round-trip of {source:?}");
    }

    #[test]
    fn parses_bare_minimum_funcdef() {
        let parsed = parse_module("def f(): ...\n", PythonVersion::V3_7);
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn statements_round_trip() {
        for src in [
            "x = 1\n",
            "x = y = [1, 2, 3]\n",
            "x += 1\n",
            "x: int = 5\n",
            "del a, b\n",
            "import os.path as p, sys\n",
            "from . import helpers\n",
            "from ..pkg.mod import (a, b as c,)\n",
            "from fob import *\n",
            "global a, b\n",
            "assert x, 'message'\n",
            "raise ValueError('nope') from err\n",
            "return\n",
            "def f(a, b=1, *args, **kwargs):\n    return a\n",
            "class C(Base, metaclass=Meta):\n    pass\n",
            "@deco\n@mod.deco(arg)\ndef g(): pass\n",
            "if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n",
            "while x:\n    break\nelse:\n    continue\n",
            "for i, j in pairs:\n    print(i)\nelse:\n    pass\n",
            "with open('f') as fh, lock:\n    pass\n",
            "try:\n    pass\nexcept ValueError as e:\n    pass\nexcept Exception:\n    raise\nelse:\n    pass\nfinally:\n    pass\n",
            "x = 1; y = 2;\n",
            "def gen():\n    yield 1\n    x = yield\n    yield from other()\n",
            "async def main():\n    await task\n    async with cm() as c:\n        pass\n    async for item in aiter():\n        pass\n",
            "lambda a, b=2: a + b\n",
            "x = a if cond else b\n",
            "y = not a or b and c\n",
            "z = a < b <= c != d\n",
            "t = (1,)\nu = ()\nv = 1, 2\n",
            "s = {1, 2}\nd = {'k': v, **rest}\ne = {}\n",
            "lc = [x for x in xs if x]\nsc = {x for x in xs}\ndc = {k: v for k, v in items}\ngen = (x for x in xs)\n",
            "call(gen_arg for gen_arg in xs)\n",
            "m = a[1:2, ::3]\nn = a[...]\n",
            "f = obj.attr.method(1, *args, key=2, **kw)\n",
            "s = 'a' \"b\" '''c\nd'''\n",
            "fs = f'{x!r:>10}'\n",
            "n = 0x_FF + 0o17 + 0b101 + 1_000 + 3.14e-2 + 2j\n",
            "star, *rest = items\n",
            "x = *a, *b\n",
            "print('still a call on py3')\n",
        ] {
            roundtrip(src, PythonVersion::V3_7);
        }
    }

    #[test]
    fn py2_statements_round_trip() {
        for src in [
            "print 'hello'\n",
            "print >> sys.stderr, 'err',\n",
            "exec code in globs, locs\n",
            "raise ValueError, 'msg', tb\n",
            "try:\n    pass\nexcept ValueError, e:\n    pass\n",
            "x = 42L\n",
            "y = `x`\n",
            "if a <> b:\n    pass\n",
            "def f((a, b), c):\n    return a\n",
        ] {
            roundtrip(src, PythonVersion::V2_7);
        }
    }

    #[test]
    fn whitespace_oddities_round_trip() {
        for src in [
            "",
            "\n",
            "# only a comment",
            "x = 1",
            "x = (1 +\n     2)\n",
            "x = 1 \\\n    + 2\n",
            "def f():\n\n    # comment inside\n    pass\n\n\n",
            "if x:\n\tpass\n",
            "a = [\n    1,\n    2,  # trailing comment\n]\n",
            "\u{feff}x = 1\n",
        ] {
            roundtrip(src, PythonVersion::V3_7);
        }
    }

    #[test]
    fn invalid_input_round_trips_and_diagnoses() {
        for src in [
            "def (:\n",
            "x = = 2\n",
            "class :\n    pass\n",
            "x = $\ny = 2\n",
            "if x\n    pass\n",
            "f(,)\n",
        ] {
            let parsed = parse_module(src, PythonVersion::V3_7);
            assert!(!parsed.diagnostics.is_empty(), "expected diagnostics for {src:?}");
            assert_eq!(emit(&parsed.module), src, "round-trip of {src:?}");
        }
    }

    #[test]
    fn recovery_resumes_at_next_statement() {
        let parsed = parse_module("x = $\ny = 2\n", PythonVersion::V3_7);
        assert_eq!(parsed.module.body.len(), 2);
        // The second statement parsed cleanly as an assignment.
        let Statement::Simple(line) = &parsed.module.body[1] else {
            panic!("expected simple statement");
        };
        assert!(matches!(
            line.parts[0].statement,
            SmallStatement::Assign(_)
        ));
    }

    #[test]
    fn name_mangling_in_class_body() {
        let parsed = parse_module(
            "class C:\n    def m(self):\n        return self.__x\n",
            PythonVersion::V3_7,
        );
        assert!(parsed.diagnostics.is_empty());
        // Find the attribute name and check its resolved value.
        let Statement::Compound(CompoundStatement::ClassDef(class)) = &parsed.module.body[0] else {
            panic!("expected class");
        };
        let Suite::Block { body, .. } = &class.body else {
            panic!("expected block");
        };
        let Statement::Compound(CompoundStatement::FunctionDef(def)) = &body[0] else {
            panic!("expected def");
        };
        let Suite::Block { body, .. } = &def.body else {
            panic!("expected block");
        };
        let Statement::Simple(line) = &body[0] else {
            panic!("expected simple");
        };
        let SmallStatement::Return(ret) = &line.parts[0].statement else {
            panic!("expected return");
        };
        let Some(Expression::Attribute(attr)) = ret.value.as_ref() else {
            panic!("expected attribute");
        };
        assert_eq!(attr.attr.as_written(), "__x");
        assert_eq!(attr.attr.value(), "_C__x");
        // Dunder names are left alone.
        let parsed = parse_module("class C:\n    x = __init__\n", PythonVersion::V3_7);
        assert!(emit(&parsed.module).contains("__init__"));
    }

    #[test]
    fn version_gates() {
        // nonlocal is a name on 2.x, so `nonlocal x` is a syntax error.
        let parsed = parse_module("def f():\n    nonlocal x\n", PythonVersion::V2_7);
        assert!(!parsed.diagnostics.is_empty());
        let parsed = parse_module("def f():\n    nonlocal x\n", PythonVersion::V3_7);
        assert!(parsed.diagnostics.is_empty());
        // Annotations parse on 3.x only.
        let parsed = parse_module("def f(a: int) -> int:\n    return a\n", PythonVersion::V3_7);
        assert!(parsed.diagnostics.is_empty());
        let parsed = parse_module("def f(a: int) -> int:\n    return a\n", PythonVersion::V2_7);
        assert!(!parsed.diagnostics.is_empty());
        // print statement vs. function.
        let parsed = parse_module("print 'x'\n", PythonVersion::V2_7);
        assert!(parsed.diagnostics.is_empty());
        let parsed = parse_module("print 'x'\n", PythonVersion::V3_7);
        assert!(!parsed.diagnostics.is_empty());
    }

    #[test]
    fn node_ids_are_unique() {
        let parsed = parse_module("def f(a):\n    return a + 1\n", PythonVersion::V3_7);
        let mut seen = std::collections::HashSet::new();
        // Spot-check a few ids via the module body.
        let Statement::Compound(CompoundStatement::FunctionDef(def)) = &parsed.module.body[0]
        else {
            panic!("expected def");
        };
        assert!(seen.insert(def.node_id));
        assert!(seen.insert(def.name.node_id));
        for param in &def.params.params {
            assert!(seen.insert(param.node_id));
        }
    }
}
