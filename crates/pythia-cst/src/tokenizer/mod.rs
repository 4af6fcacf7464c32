//! Tokenizer for Python source code.
//!
//! The tokenizer turns source text into a flat token stream. Every byte of
//! the input lands either in some token's `text` or in some token's
//! `leading` trivia, so concatenating `leading ++ text` over the stream
//! reproduces the input exactly. This is the foundation of the verbatim
//! round-trip guarantee: the parser only rearranges tokens into a tree, it
//! never drops or invents bytes.
//!
//! # Trivia
//!
//! Whitespace, comments, backslash line-continuations, blank lines, and
//! newlines inside brackets are all *trivia* and accumulate into the
//! `leading` field of the next token. Synthetic tokens (INDENT, DEDENT,
//! the end-of-file marker, and a newline synthesized at EOF) have empty
//! `text`.
//!
//! # Version awareness
//!
//! The active keyword set depends on the configured [`PythonVersion`]:
//! `print` and `exec` are keywords on 2.x only, `nonlocal` appears on 3.x,
//! `async`/`await` from 3.5, and f-string prefixes are recognized from
//! 3.6. F-strings are emitted as a single token; their interior
//! expressions are opaque at this level.
//!
//! # Error tolerance
//!
//! The tokenizer never fails. Unrecognizable input becomes an
//! [`TokenKind::Error`] token plus a diagnostic, and scanning continues
//! with the next character. Indentation problems (mixed tabs and spaces,
//! dedents matching no open level) are diagnostics, not fatal errors.

pub mod encoding;

use bitflags::bitflags;
use pythia_core::diagnostics::{Diagnostic, DiagnosticCode};
use pythia_core::span::Span;
use pythia_core::version::PythonVersion;

// ============================================================================
// Tokens
// ============================================================================

bitflags! {
    /// String-literal prefix flags, combined freely (`rb'..'`, `Rf"..."`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StringPrefix: u8 {
        /// `r` / `R`: no escape processing.
        const RAW = 1 << 0;
        /// `b` / `B`: a bytes literal.
        const BYTES = 1 << 1;
        /// `u` / `U`: an explicit unicode literal.
        const UNICODE = 1 << 2;
        /// `f` / `F`: a formatted string literal (3.6+).
        const FORMAT = 1 << 3;
    }
}

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// An identifier.
    Name,
    /// A keyword at the active language version.
    Keyword,
    /// An integer literal (including 2.x `L` longs).
    Int,
    /// A floating-point literal.
    Float,
    /// An imaginary literal (`1j`).
    Imaginary,
    /// A string literal, one token even for f-strings.
    String,
    /// An operator or delimiter.
    Op,
    /// A logical-line terminator. Text is empty when synthesized at EOF.
    Newline,
    /// Increase of indentation. Zero-width.
    Indent,
    /// Decrease of indentation. Zero-width.
    Dedent,
    /// End of input. Zero-width; carries trailing trivia.
    EndMarker,
    /// A character sequence the tokenizer could not recognize.
    Error,
}

/// One token: kind, the trivia preceding it, its verbatim text, and its
/// byte span. String tokens additionally carry their prefix flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// Whitespace, comments, continuations, and suppressed newlines since
    /// the previous token.
    pub leading: String,
    /// The verbatim token text. Empty for synthetic tokens.
    pub text: String,
    /// Byte span of `text` within the source.
    pub span: Span,
    /// Prefix flags; only meaningful for [`TokenKind::String`].
    pub string_prefix: StringPrefix,
}

impl Token {
    fn new(kind: TokenKind, leading: String, text: String, span: Span) -> Self {
        Self {
            kind,
            leading,
            text,
            span,
            string_prefix: StringPrefix::empty(),
        }
    }

    /// Whether this token is the given operator/delimiter.
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// Whether this token is the given keyword.
    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == kw
    }
}

/// Output of [`tokenize`]: the token stream plus any diagnostics raised
/// while scanning.
#[derive(Debug)]
pub struct TokenizeOutput {
    /// The tokens, ending with an [`TokenKind::EndMarker`].
    pub tokens: Vec<Token>,
    /// Indentation and lexical diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

// ============================================================================
// Keyword tables
// ============================================================================

const KEYWORDS_COMMON: &[&str] = &[
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "not", "or", "pass",
    "raise", "return", "try", "while", "with", "yield",
];

const KEYWORDS_PY2_ONLY: &[&str] = &["exec", "print"];

const KEYWORDS_PY3_ONLY: &[&str] = &["False", "None", "True", "nonlocal"];

const KEYWORDS_ASYNC: &[&str] = &["async", "await"];

/// Whether `word` is a keyword at `version`.
pub fn is_keyword(word: &str, version: PythonVersion) -> bool {
    if KEYWORDS_COMMON.contains(&word) {
        return true;
    }
    if version.is_py3() {
        if KEYWORDS_PY3_ONLY.contains(&word) {
            return true;
        }
        if version.has_async_await() && KEYWORDS_ASYNC.contains(&word) {
            return true;
        }
        false
    } else {
        KEYWORDS_PY2_ONLY.contains(&word)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

/// Tokenize `source` at the given language version. Never fails; lexical
/// problems are reported through [`TokenizeOutput::diagnostics`].
pub fn tokenize(source: &str, version: PythonVersion) -> TokenizeOutput {
    Lexer::new(source, version).run()
}

struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    version: PythonVersion,
    pos: usize,
    /// Start offset of the trivia run preceding the next token.
    trivia_start: usize,
    /// Open-bracket depth; newlines inside brackets are trivia.
    paren_depth: usize,
    /// Indentation columns of open blocks. Always starts with 0.
    indents: Vec<usize>,
    /// True at the start of a logical line (indentation pending).
    at_line_start: bool,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str, version: PythonVersion) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            version,
            pos: 0,
            trivia_start: 0,
            paren_depth: 0,
            indents: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn run(mut self) -> TokenizeOutput {
        loop {
            if self.at_line_start && self.paren_depth == 0 {
                self.handle_line_start();
            } else {
                self.skip_inline_trivia();
            }
            if self.pos >= self.bytes.len() {
                break;
            }
            self.next_token();
        }
        self.finish();
        TokenizeOutput {
            tokens: self.tokens,
            diagnostics: self.diagnostics,
        }
    }

    // ------------------------------------------------------------------
    // Trivia and line starts
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Take the accumulated trivia run for the token starting at `self.pos`.
    fn take_leading(&mut self) -> String {
        let leading = self.source[self.trivia_start..self.pos].to_string();
        self.trivia_start = self.pos;
        leading
    }

    fn push_token(&mut self, kind: TokenKind, start: usize) {
        let leading = self.source[self.trivia_start..start].to_string();
        let text = self.source[start..self.pos].to_string();
        self.trivia_start = self.pos;
        self.tokens.push(Token::new(
            kind,
            leading,
            text,
            Span::new(start as u32, self.pos as u32),
        ));
    }

    fn push_synthetic(&mut self, kind: TokenKind) {
        // Indent/dedent markers are zero-width and carry no trivia, so
        // a line's indentation stays attached to its first real token.
        let leading = match kind {
            TokenKind::Indent | TokenKind::Dedent => String::new(),
            _ => self.take_leading(),
        };
        let at = self.pos as u32;
        self.tokens
            .push(Token::new(kind, leading, String::new(), Span::at(at)));
    }

    /// Whether a UTF-8 byte-order mark sits at the current position. It is
    /// treated as trivia so round-tripping preserves it.
    fn at_bom(&self) -> bool {
        self.bytes[self.pos..].starts_with(b"\xef\xbb\xbf")
    }

    /// Consume inline whitespace, comments, and escaped newlines. Inside
    /// brackets, real newlines are also trivia.
    fn skip_inline_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if self.at_bom() {
                self.pos += 3;
                continue;
            }
            match ch {
                b' ' | b'\t' | b'\x0c' => self.pos += 1,
                b'#' => self.skip_comment(),
                b'\\' if matches!(self.peek_at(1), Some(b'\n')) => self.pos += 2,
                b'\\' if matches!(self.peek_at(1), Some(b'\r')) => {
                    self.pos += 2;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                }
                b'\r' | b'\n' if self.paren_depth > 0 => self.pos += 1,
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.pos += 1;
        }
    }

    /// At the start of a logical line: fold blank and comment-only lines
    /// into trivia, then measure the indentation of the first real line
    /// and emit INDENT/DEDENT as needed.
    fn handle_line_start(&mut self) {
        loop {
            let line_start = self.pos;
            let mut saw_tab = false;
            let mut saw_space_then_tab = false;
            let mut column = 0usize;
            while let Some(ch) = self.peek() {
                if self.at_bom() {
                    self.pos += 3;
                    continue;
                }
                match ch {
                    b' ' => {
                        column += 1;
                        self.pos += 1;
                    }
                    b'\t' => {
                        if column > 0 && !saw_tab {
                            saw_space_then_tab = true;
                        }
                        saw_tab = true;
                        column = (column / 8 + 1) * 8;
                        self.pos += 1;
                    }
                    b'\x0c' => {
                        // Form feed resets the column count.
                        column = 0;
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // Blank line: its newline is trivia, try the next line.
                Some(b'\n') => {
                    self.pos += 1;
                    continue;
                }
                Some(b'\r') => {
                    self.pos += 1;
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    continue;
                }
                // Comment-only line: consume comment, then its newline.
                Some(b'#') => {
                    self.skip_comment();
                    continue;
                }
                // End of input: indentation does not matter.
                None => return,
                Some(_) => {
                    if saw_space_then_tab {
                        self.diagnostics.push(Diagnostic::new(
                            DiagnosticCode::InconsistentIndentation,
                            Span::new(line_start as u32, self.pos as u32),
                            "indentation mixes spaces and tabs",
                        ));
                    }
                    self.apply_indent(column, line_start);
                    self.at_line_start = false;
                    return;
                }
            }
        }
    }

    fn apply_indent(&mut self, column: usize, line_start: usize) {
        let current = *self.indents.last().unwrap_or(&0);
        if column > current {
            self.indents.push(column);
            self.push_synthetic(TokenKind::Indent);
        } else if column < current {
            while *self.indents.last().unwrap_or(&0) > column {
                self.indents.pop();
                self.push_synthetic(TokenKind::Dedent);
            }
            if *self.indents.last().unwrap_or(&0) != column {
                // Dedent to a level that was never opened. Recover by
                // treating it as the nearest enclosing level.
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticCode::UnmatchedDedent,
                    Span::new(line_start as u32, self.pos as u32),
                    "unindent does not match any outer indentation level",
                ));
            }
        }
    }

    fn finish(&mut self) {
        // Synthesize a final newline when the file does not end with one.
        let needs_newline = self
            .tokens
            .iter()
            .rev()
            .find(|t| !matches!(t.kind, TokenKind::Indent | TokenKind::Dedent))
            .is_some_and(|t| t.kind != TokenKind::Newline);
        if needs_newline {
            self.push_synthetic(TokenKind::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_synthetic(TokenKind::Dedent);
        }
        self.push_synthetic(TokenKind::EndMarker);
    }

    // ------------------------------------------------------------------
    // Token scanning
    // ------------------------------------------------------------------

    fn next_token(&mut self) {
        let start = self.pos;
        let ch = match self.peek() {
            Some(c) => c,
            None => return,
        };

        if ch == b'\n' {
            self.pos += 1;
            self.push_token(TokenKind::Newline, start);
            self.at_line_start = true;
            return;
        }
        if ch == b'\r' {
            self.pos += 1;
            if self.peek() == Some(b'\n') {
                self.pos += 1;
            }
            self.push_token(TokenKind::Newline, start);
            self.at_line_start = true;
            return;
        }

        if is_name_start(self.char_at(start)) {
            self.scan_name_or_prefixed_string(start);
            return;
        }

        if ch.is_ascii_digit() {
            self.scan_number(start);
            return;
        }
        if ch == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.scan_number(start);
            return;
        }

        if ch == b'\'' || ch == b'"' {
            self.scan_string(start, StringPrefix::empty());
            return;
        }

        if self.scan_operator(start) {
            return;
        }

        // Unrecognizable character: error token, keep going.
        let c = self.char_at(start);
        self.pos += c.len_utf8();
        self.push_token(TokenKind::Error, start);
        self.diagnostics.push(Diagnostic::new(
            DiagnosticCode::ParseError,
            Span::new(start as u32, self.pos as u32),
            format!("unexpected character {c:?}"),
        ));
    }

    fn char_at(&self, offset: usize) -> char {
        self.source[offset..].chars().next().unwrap_or('\0')
    }

    fn scan_name_or_prefixed_string(&mut self, start: usize) {
        let mut end = self.pos;
        while end < self.bytes.len() && is_name_continue(self.char_at(end)) {
            end += self.char_at(end).len_utf8();
        }
        let word = &self.source[start..end];

        // A short all-prefix-letter word immediately followed by a quote
        // is a string prefix.
        if word.len() <= 3 {
            if let Some(prefix) = parse_string_prefix(word, self.version) {
                if matches!(self.bytes.get(end), Some(b'\'' | b'"')) {
                    self.pos = end;
                    self.scan_string(start, prefix);
                    return;
                }
            }
        }

        self.pos = end;
        let kind = if is_keyword(word, self.version) {
            TokenKind::Keyword
        } else {
            TokenKind::Name
        };
        self.push_token(kind, start);
    }

    fn scan_number(&mut self, start: usize) {
        let mut kind = TokenKind::Int;
        if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B'))
        {
            self.pos += 2;
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_')
            {
                self.pos += 1;
            }
        } else {
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') {
                kind = TokenKind::Float;
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
                    self.pos += 1;
                }
            }
            if matches!(self.peek(), Some(b'e' | b'E'))
                && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some(b'+' | b'-'))
                        && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
            {
                kind = TokenKind::Float;
                self.pos += 1;
                if matches!(self.peek(), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        if matches!(self.peek(), Some(b'j' | b'J')) {
            kind = TokenKind::Imaginary;
            self.pos += 1;
        } else if matches!(self.peek(), Some(b'l' | b'L')) && !self.version.is_py3() {
            self.pos += 1;
        }
        self.push_token(kind, start);
    }

    fn scan_string(&mut self, start: usize, prefix: StringPrefix) {
        let quote = self.peek().unwrap_or(b'"');
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let quote_len = if triple { 3 } else { 1 };
        self.pos += quote_len;

        let mut terminated = false;
        while let Some(ch) = self.peek() {
            if ch == b'\\' {
                // A backslash always escapes the next character for the
                // purpose of finding the terminator, even in raw strings.
                self.pos += 1;
                if let Some(c) = self.peek() {
                    self.pos += if c < 0x80 { 1 } else { self.char_at(self.pos).len_utf8() };
                }
                continue;
            }
            if !triple && (ch == b'\n' || ch == b'\r') {
                break;
            }
            if ch == quote {
                if !triple {
                    self.pos += 1;
                    terminated = true;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    terminated = true;
                    break;
                }
            }
            self.pos += self.char_at(self.pos).len_utf8();
        }

        if terminated {
            let text_start = start;
            self.push_token(TokenKind::String, text_start);
            if let Some(tok) = self.tokens.last_mut() {
                tok.string_prefix = prefix;
            }
        } else {
            self.push_token(TokenKind::Error, start);
            self.diagnostics.push(Diagnostic::new(
                DiagnosticCode::ParseError,
                Span::new(start as u32, self.pos as u32),
                "unterminated string literal",
            ));
        }
    }

    fn scan_operator(&mut self, start: usize) -> bool {
        const THREE: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
        const TWO: &[&str] = &[
            "**", "//", ">>", "<<", "<=", ">=", "==", "!=", "->", "+=", "-=", "*=", "/=", "%=",
            "&=", "|=", "^=", "@=",
        ];
        const ONE: &[u8] = b"+-*/%&|^~<>()[]{},:.;@=";

        let rest = &self.source[self.pos..];
        for op in THREE {
            if rest.starts_with(op) {
                self.pos += op.len();
                self.push_token(TokenKind::Op, start);
                return true;
            }
        }
        if rest.starts_with("<>") && self.version.has_legacy_repr() {
            self.pos += 2;
            self.push_token(TokenKind::Op, start);
            return true;
        }
        for op in TWO {
            if rest.starts_with(op) {
                self.pos += op.len();
                self.push_token(TokenKind::Op, start);
                return true;
            }
        }
        let ch = self.peek().unwrap_or(0);
        if ONE.contains(&ch) {
            self.pos += 1;
            match ch {
                b'(' | b'[' | b'{' => self.paren_depth += 1,
                b')' | b']' | b'}' => self.paren_depth = self.paren_depth.saturating_sub(1),
                _ => {}
            }
            self.push_token(TokenKind::Op, start);
            return true;
        }
        if ch == b'`' && self.version.has_legacy_repr() {
            self.pos += 1;
            self.push_token(TokenKind::Op, start);
            return true;
        }
        false
    }
}

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn parse_string_prefix(word: &str, version: PythonVersion) -> Option<StringPrefix> {
    let mut prefix = StringPrefix::empty();
    for ch in word.chars() {
        let flag = match ch {
            'r' | 'R' => StringPrefix::RAW,
            'b' | 'B' => StringPrefix::BYTES,
            'u' | 'U' => StringPrefix::UNICODE,
            'f' | 'F' if version.has_fstrings() => StringPrefix::FORMAT,
            _ => return None,
        };
        if prefix.contains(flag) {
            return None;
        }
        prefix |= flag;
    }
    Some(prefix)
}

#[cfg(test)]
mod tests;
