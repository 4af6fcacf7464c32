use super::*;

fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source, PythonVersion::V3_7)
        .tokens
        .iter()
        .map(|t| t.kind)
        .collect()
}

fn reassemble(source: &str, version: PythonVersion) -> String {
    let out = tokenize(source, version);
    let mut buf = String::new();
    for tok in &out.tokens {
        buf.push_str(&tok.leading);
        buf.push_str(&tok.text);
    }
    buf
}

#[test]
fn empty_source() {
    let out = tokenize("", PythonVersion::V3_7);
    assert_eq!(out.tokens.len(), 1);
    assert_eq!(out.tokens[0].kind, TokenKind::EndMarker);
}

#[test]
fn simple_assignment() {
    assert_eq!(
        kinds("x = 1\n"),
        vec![
            TokenKind::Name,
            TokenKind::Op,
            TokenKind::Int,
            TokenKind::Newline,
            TokenKind::EndMarker,
        ]
    );
}

#[test]
fn tokens_partition_the_source() {
    let sources = [
        "x = 1\n",
        "def f(a, b=2):\n    return a + b\n",
        "# comment\n\nif x:\n\tpass\n",
        "x = (1 +\n     2)\n",
        "s = 'it\\'s'\nt = \"\"\"multi\nline\"\"\"\n",
        "x = 1",
        "while True:\n    break\nelse:\n    pass\n",
        "a = [1, 2,\n  # inner comment\n  3]\n",
        "x = 1 \\\n    + 2\n",
    ];
    for src in sources {
        assert_eq!(reassemble(src, PythonVersion::V3_7), src, "{src:?}");
    }
}

#[test]
fn partition_holds_for_garbage() {
    let sources = ["x = $ ?\n", "\"unterminated\ny = 2\n", "def :::\n  ???"];
    for src in sources {
        assert_eq!(reassemble(src, PythonVersion::V3_7), src, "{src:?}");
    }
}

#[test]
fn indent_dedent_pairing() {
    let out = tokenize("if x:\n    y = 1\nz = 2\n", PythonVersion::V3_7);
    let indents = out
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Indent)
        .count();
    let dedents = out
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Dedent)
        .count();
    assert_eq!(indents, 1);
    assert_eq!(dedents, 1);
}

#[test]
fn dedent_emitted_at_eof() {
    let out = tokenize("if x:\n    y = 1", PythonVersion::V3_7);
    let last_kinds: Vec<_> = out.tokens.iter().map(|t| t.kind).collect();
    // Synthesized newline, then the closing dedent, then the end marker.
    assert_eq!(
        &last_kinds[last_kinds.len() - 3..],
        &[TokenKind::Newline, TokenKind::Dedent, TokenKind::EndMarker]
    );
}

#[test]
fn blank_lines_are_trivia() {
    let out = tokenize("x = 1\n\n\ny = 2\n", PythonVersion::V3_7);
    assert!(out.tokens.iter().all(|t| t.kind != TokenKind::Indent));
    let y = out.tokens.iter().find(|t| t.text == "y").unwrap();
    assert_eq!(y.leading, "\n\n");
}

#[test]
fn comments_attach_to_next_token() {
    let out = tokenize("x = 1  # note\ny = 2\n", PythonVersion::V3_7);
    let newline = out
        .tokens
        .iter()
        .find(|t| t.kind == TokenKind::Newline)
        .unwrap();
    assert_eq!(newline.leading, "  # note");
}

#[test]
fn newlines_inside_brackets_are_trivia() {
    let out = tokenize("x = (1,\n     2)\n", PythonVersion::V3_7);
    let newlines = out
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Newline)
        .count();
    assert_eq!(newlines, 1);
}

#[test]
fn keywords_by_version() {
    assert!(is_keyword("print", PythonVersion::V2_7));
    assert!(!is_keyword("print", PythonVersion::V3_0));
    assert!(is_keyword("exec", PythonVersion::V2_6));
    assert!(!is_keyword("nonlocal", PythonVersion::V2_7));
    assert!(is_keyword("nonlocal", PythonVersion::V3_0));
    assert!(!is_keyword("async", PythonVersion::V3_4));
    assert!(is_keyword("async", PythonVersion::V3_5));
    assert!(is_keyword("await", PythonVersion::V3_7));
    assert!(!is_keyword("True", PythonVersion::V2_7));
    assert!(is_keyword("True", PythonVersion::V3_7));
}

#[test]
fn print_tokenizes_as_name_on_py3() {
    let out = tokenize("print(1)\n", PythonVersion::V3_7);
    assert_eq!(out.tokens[0].kind, TokenKind::Name);
    let out2 = tokenize("print 1\n", PythonVersion::V2_7);
    assert_eq!(out2.tokens[0].kind, TokenKind::Keyword);
}

#[test]
fn string_prefixes() {
    let out = tokenize("r'a' b'b' rb'c' u'd' f'e'", PythonVersion::V3_7);
    let strings: Vec<_> = out
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::String)
        .collect();
    assert_eq!(strings.len(), 5);
    assert_eq!(strings[0].string_prefix, StringPrefix::RAW);
    assert_eq!(strings[1].string_prefix, StringPrefix::BYTES);
    assert_eq!(
        strings[2].string_prefix,
        StringPrefix::RAW | StringPrefix::BYTES
    );
    assert_eq!(strings[3].string_prefix, StringPrefix::UNICODE);
    assert_eq!(strings[4].string_prefix, StringPrefix::FORMAT);
}

#[test]
fn fstring_prefix_not_recognized_before_36() {
    let out = tokenize("f'{x}'", PythonVersion::V3_5);
    // `f` scans as a plain name, the string follows separately.
    assert_eq!(out.tokens[0].kind, TokenKind::Name);
    assert_eq!(out.tokens[0].text, "f");
    assert_eq!(out.tokens[1].kind, TokenKind::String);
}

#[test]
fn fstring_is_one_token() {
    let out = tokenize("x = f'{a}{b!r}'\n", PythonVersion::V3_7);
    let strings: Vec<_> = out
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::String)
        .collect();
    assert_eq!(strings.len(), 1);
    assert_eq!(strings[0].text, "f'{a}{b!r}'");
}

#[test]
fn triple_quoted_string_spans_lines() {
    let out = tokenize("s = '''a\nb'''\n", PythonVersion::V3_7);
    let s = out
        .tokens
        .iter()
        .find(|t| t.kind == TokenKind::String)
        .unwrap();
    assert_eq!(s.text, "'''a\nb'''");
}

#[test]
fn numbers() {
    let out = tokenize("a = 1 + 2.5 + 0x1f + 3j + 1e10\n", PythonVersion::V3_7);
    let nums: Vec<_> = out
        .tokens
        .iter()
        .filter(|t| {
            matches!(
                t.kind,
                TokenKind::Int | TokenKind::Float | TokenKind::Imaginary
            )
        })
        .map(|t| (t.kind, t.text.as_str()))
        .collect();
    assert_eq!(
        nums,
        vec![
            (TokenKind::Int, "1"),
            (TokenKind::Float, "2.5"),
            (TokenKind::Int, "0x1f"),
            (TokenKind::Imaginary, "3j"),
            (TokenKind::Float, "1e10"),
        ]
    );
}

#[test]
fn py2_long_suffix() {
    let out = tokenize("x = 42L\n", PythonVersion::V2_7);
    let n = out.tokens.iter().find(|t| t.kind == TokenKind::Int).unwrap();
    assert_eq!(n.text, "42L");
}

#[test]
fn mixed_indentation_diagnostic() {
    let out = tokenize("if x:\n    a = 1\n  \tb = 2\n", PythonVersion::V3_7);
    assert!(out
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::InconsistentIndentation));
}

#[test]
fn unmatched_dedent_diagnostic() {
    let out = tokenize("if x:\n        a = 1\n    b = 2\nc = 3\n", PythonVersion::V3_7);
    assert!(out
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::UnmatchedDedent));
}

#[test]
fn ellipsis_and_arrow_operators() {
    let out = tokenize("def f() -> int: ...\n", PythonVersion::V3_7);
    assert!(out.tokens.iter().any(|t| t.is_op("->")));
    assert!(out.tokens.iter().any(|t| t.is_op("...")));
}

#[test]
fn legacy_ne_operator() {
    let out = tokenize("a <> b\n", PythonVersion::V2_7);
    assert!(out.tokens.iter().any(|t| t.is_op("<>")));
    let out3 = tokenize("a <> b\n", PythonVersion::V3_7);
    assert!(out3.tokens.iter().any(|t| t.is_op("<")));
}

#[test]
fn spans_are_accurate() {
    let src = "foo = bar\n";
    let out = tokenize(src, PythonVersion::V3_7);
    let foo = &out.tokens[0];
    assert_eq!((foo.span.start, foo.span.end), (0, 3));
    let bar = &out.tokens[2];
    assert_eq!(&src[bar.span.start as usize..bar.span.end as usize], "bar");
}
