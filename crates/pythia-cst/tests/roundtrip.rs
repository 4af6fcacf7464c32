//! Round-trip and error-tolerance properties over whole files.

use pythia_core::version::PythonVersion;
use pythia_cst::{emit, parse_module};

fn assert_roundtrip(source: &str, version: PythonVersion) {
    let parsed = parse_module(source, version);
    assert_eq!(emit(&parsed.module), source, "round-trip of {source:?}");
}

#[test]
fn roundtrip_realistic_module() {
    let source = r#""""A small but busy module."""
from __future__ import division

import os
import sys as system
from collections import (
    OrderedDict,
    defaultdict as dd,
)


CONSTANT = 42
NAMES = ['alpha', 'beta',
         'gamma']


class Base(object):
    """Base class."""

    #: class attribute
    registry = {}

    def __init__(self, name, value=None):
        self.name = name
        self.value = value or CONSTANT

    @property
    def label(self):
        return '%s=%r' % (self.name, self.value)

    @staticmethod
    def make(name):
        return Base(name)


class Child(Base):
    def __init__(self, name):
        super().__init__(name, value=1)

    def walk(self):
        for key, value in sorted(self.registry.items()):
            if isinstance(value, Base):
                yield key
            elif key not in NAMES:
                continue
            else:
                yield value


def main(argv=None):
    argv = argv if argv is not None else sys.argv[1:]
    try:
        child = Child(argv[0])
    except IndexError as exc:
        print('usage: prog NAME', file=system.stderr)
        return 2
    finally:
        pass
    total = sum(x ** 2 for x in range(10) if x % 2 == 0)
    lookup = {name: len(name) for name in NAMES}
    flags = {bool(x) for x in argv}
    return 0 if child and total and lookup and flags else 1


if __name__ == '__main__':
    sys.exit(main())
"#;
    assert_roundtrip(source, PythonVersion::V3_7);
}

#[test]
fn roundtrip_py2_module() {
    let source = r#"# -*- coding: utf-8 -*-
import sys

print >> sys.stderr, 'starting',
print 'hello', 'world'


def compat(values):
    result = []
    for v in values:
        if v <> None:
            result.append(`v`)
    try:
        exec 'x = 1' in {}, {}
    except ValueError, e:
        raise RuntimeError, 'bad', None
    return result


total = 10L / 3
squares = [x * x for x in range(10)]
"#;
    assert_roundtrip(source, PythonVersion::V2_7);
}

#[test]
fn roundtrip_preserves_odd_formatting() {
    let sources = [
        "x   =   1\n",
        "def f( a , b = 2 ):\n\treturn a\n",
        "result = (1 +\n          2 +  # inline comment\n          3)\n",
        "d = { 'a' : 1 , }\n",
        "if x:   pass\n",
        "x = 1 ;; y = 2\n",  // double semicolon is an error but preserved
        "x = [\n]\n",
        "s = 'one' 'two'   'three'\n",
        "\n\n\n# just comments\n\n",
        "def f():\n    return (\n        1,\n        2,\n    )\n",
    ];
    for source in sources {
        assert_roundtrip(source, PythonVersion::V3_7);
    }
}

#[test]
fn error_tolerance_never_panics_and_preserves_bytes() {
    let sources = [
        "def f(:\n    pass\n",
        "class\n",
        "x = ((((\n",
        "))))\n",
        "if : else : while\n",
        "import\n",
        "from import *\n",
        "lambda lambda lambda\n",
        "x = 'unterminated\ny = 2\n",
        "\t\tweird indent\nok = 1\n",
        "@@@@\ndef g(): pass\n",
        "x = 1 @@ y\n",
    ];
    for source in sources {
        let parsed = parse_module(source, PythonVersion::V3_7);
        assert!(
            !parsed.diagnostics.is_empty(),
            "expected diagnostics for {source:?}"
        );
        assert_eq!(emit(&parsed.module), source, "round-trip of {source:?}");
    }
}

#[test]
fn error_recovery_keeps_later_statements() {
    let source = "good = 1\nbad syntax here $\nalso_good = 2\n";
    let parsed = parse_module(source, PythonVersion::V3_7);
    assert_eq!(emit(&parsed.module), source);
    // Three statements: good, the error region, also_good.
    assert_eq!(parsed.module.body.len(), 3);
}

#[test]
fn arbitrary_bytes_roundtrip() {
    // A crude generator of unpleasant inputs; deterministic so failures
    // reproduce.
    let fragments = [
        "def ", "class ", "(", ")", ":", "\n", "    ", "\t", "'", "\"", "x", "1", "+", "=",
        "#c", "\\", "@", ",", "[", "]", "{", "}", "if ", "else", "*", ".", "...",
    ];
    let mut seed = 0x2545f4914f6cdd1du64;
    for _ in 0..200 {
        let mut source = String::new();
        for _ in 0..24 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let idx = (seed >> 33) as usize % fragments.len();
            source.push_str(fragments[idx]);
        }
        let parsed = parse_module(&source, PythonVersion::V3_7);
        assert_eq!(emit(&parsed.module), source, "round-trip of {source:?}");
    }
}
