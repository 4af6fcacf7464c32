//! Error-tolerant recursive-descent parser.
//!
//! The parser consumes the token stream produced by the tokenizer and
//! builds the verbatim CST. It follows Python's reference grammar at the
//! configured version, with two obligations beyond ordinary parsing:
//!
//! - **Never fail.** On a syntax error the parser records a diagnostic,
//!   rewinds to the start of the offending statement, wraps its tokens
//!   (through the end of the logical line, or the whole indented block
//!   for stray indentation) in an error node that preserves their exact
//!   text, and continues with the next statement.
//! - **Never drop a byte.** Every token the parser consumes lands in some
//!   node's atoms, so codegen reproduces the input exactly, valid or not.
//!
//! Name mangling is applied while parsing: inside a class body,
//! identifiers of the form `__name` (no trailing double underscore) get
//! their resolved form `_Class__name` recorded next to the verbatim text.

mod errors;

pub use errors::render_diagnostic;

use pythia_core::diagnostics::{Diagnostic, DiagnosticCode};
use pythia_core::span::Span;
use pythia_core::version::PythonVersion;

use crate::nodes::*;
use crate::tokenizer::{Token, TokenKind};

/// Signal used internally to unwind to the nearest statement boundary.
/// The diagnostic has already been recorded when this is raised.
struct ParseFail;

type PResult<T> = Result<T, ParseFail>;

/// Parses a token stream into a [`Module`].
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    version: PythonVersion,
    ids: NodeIdGenerator,
    diagnostics: Vec<Diagnostic>,
    /// Enclosing class names, innermost last, for `__name` mangling.
    class_stack: Vec<String>,
}

impl Parser {
    /// Create a parser over `tokens` at the given version.
    pub fn new(tokens: Vec<Token>, version: PythonVersion) -> Self {
        Self {
            tokens,
            pos: 0,
            version,
            ids: NodeIdGenerator::new(),
            diagnostics: Vec::new(),
            class_stack: Vec::new(),
        }
    }

    /// Parse the whole stream into a module. Infallible: syntax errors
    /// become diagnostics plus error nodes.
    pub fn parse_module(mut self) -> (Module, Vec<Diagnostic>) {
        let mut body = Vec::new();
        while !self.at_kind(TokenKind::EndMarker) {
            if self.at_kind(TokenKind::Dedent) {
                // Structurally impossible at the top level; swallow it so
                // the loop always makes progress.
                let start = self.cur_start();
                let atom = self.bump_atom();
                let error = ErrorStatement {
                    node_id: self.ids.next_id(),
                    span: self.span_from(start),
                    tokens: vec![atom],
                    newline: None,
                };
                body.push(Statement::Simple(self.wrap_error_line(error)));
                continue;
            }
            if self.at_kind(TokenKind::Newline) {
                let statement = self.error_statement_here("unexpected token");
                body.push(Statement::Simple(self.wrap_error_line(statement)));
                continue;
            }
            body.push(self.parse_statement());
        }
        let eof = self.bump_atom();
        let span = Span::new(0, eof.span.end);
        let module = Module {
            node_id: self.ids.next_id(),
            span,
            body,
            eof,
        };
        (module, self.diagnostics)
    }

    // ------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn at_kind(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        self.peek().is_keyword(kw)
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndMarker) || self.at_op(";")
    }

    fn bump_atom(&mut self) -> Atom {
        let token = self.tokens[self.pos].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        Atom::from_token(token)
    }

    fn cur_start(&self) -> u32 {
        self.peek().span.start
    }

    fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].span.end
        }
    }

    fn span_from(&self, start: u32) -> Span {
        Span::new(start.min(self.prev_end()), self.prev_end())
    }

    fn expect_op(&mut self, op: &str) -> PResult<Atom> {
        if self.at_op(op) {
            Ok(self.bump_atom())
        } else {
            self.fail(format!("expected '{op}'"))
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PResult<Atom> {
        if self.at_keyword(kw) {
            Ok(self.bump_atom())
        } else {
            self.fail(format!("expected '{kw}'"))
        }
    }

    fn expect_newline(&mut self) -> PResult<Atom> {
        if self.at_kind(TokenKind::Newline) {
            Ok(self.bump_atom())
        } else {
            self.fail("expected end of line")
        }
    }

    fn fail<T>(&mut self, message: impl Into<String>) -> PResult<T> {
        let span = self.peek().span;
        self.diagnostics
            .push(Diagnostic::new(DiagnosticCode::ParseError, span, message));
        Err(ParseFail)
    }

    // ------------------------------------------------------------------
    // Names and mangling
    // ------------------------------------------------------------------

    fn mangle(&self, ident: &str) -> Option<String> {
        let class_name = self.class_stack.last()?;
        if !ident.starts_with("__") || ident.ends_with("__") {
            return None;
        }
        let trimmed = class_name.trim_start_matches('_');
        if trimmed.is_empty() {
            return None;
        }
        Some(format!("_{trimmed}{ident}"))
    }

    fn make_name(&mut self, tok: Atom) -> Name {
        let mangled = self.mangle(&tok.text);
        Name {
            node_id: self.ids.next_id(),
            span: tok.span,
            tok,
            mangled,
        }
    }

    fn expect_name(&mut self) -> PResult<Name> {
        if self.at_kind(TokenKind::Name) {
            let tok = self.bump_atom();
            Ok(self.make_name(tok))
        } else {
            self.fail("expected an identifier")
        }
    }

    // ------------------------------------------------------------------
    // Error recovery
    // ------------------------------------------------------------------

    /// Consume from the current position through the end of the logical
    /// line (or a whole stray indented block) into raw atoms.
    fn consume_error_region(&mut self) -> (Vec<Atom>, Option<Atom>) {
        let mut atoms = Vec::new();
        let mut depth = 0usize;
        let newline = loop {
            match self.peek().kind {
                TokenKind::EndMarker => break None,
                TokenKind::Newline if depth == 0 => break Some(self.bump_atom()),
                TokenKind::Indent => {
                    depth += 1;
                    atoms.push(self.bump_atom());
                }
                TokenKind::Dedent => {
                    if depth == 0 {
                        break None;
                    }
                    depth -= 1;
                    atoms.push(self.bump_atom());
                    if depth == 0 {
                        break None;
                    }
                }
                _ => atoms.push(self.bump_atom()),
            }
        };
        (atoms, newline)
    }

    fn error_statement_here(&mut self, message: &str) -> ErrorStatement {
        let start = self.cur_start();
        let span = self.peek().span;
        self.diagnostics
            .push(Diagnostic::new(DiagnosticCode::ParseError, span, message));
        let (tokens, newline) = self.consume_error_region();
        ErrorStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            tokens,
            newline,
        }
    }

    fn wrap_error_line(&mut self, mut statement: ErrorStatement) -> SimpleStatementLine {
        let span = statement.span;
        let newline = statement.newline.take().unwrap_or(Atom {
            leading: String::new(),
            text: String::new(),
            span: Span::at(span.end),
        });
        SimpleStatementLine {
            node_id: self.ids.next_id(),
            span,
            parts: vec![SmallStatementPart {
                statement: SmallStatement::Error(statement),
                semicolon: None,
            }],
            newline,
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Statement {
        let mark = self.pos;
        let result = self.try_parse_statement();
        match result {
            Ok(statement) => statement,
            Err(ParseFail) => {
                self.pos = mark;
                let start = self.cur_start();
                let (tokens, newline) = self.consume_error_region();
                let error = ErrorStatement {
                    node_id: self.ids.next_id(),
                    span: self.span_from(start),
                    tokens,
                    newline,
                };
                Statement::Simple(self.wrap_error_line(error))
            }
        }
    }

    fn try_parse_statement(&mut self) -> PResult<Statement> {
        if self.at_kind(TokenKind::Indent) {
            return self.fail("unexpected indent");
        }
        let tok = self.peek();
        if tok.kind == TokenKind::Keyword {
            match tok.text.as_str() {
                "if" => return Ok(Statement::Compound(CompoundStatement::If(self.parse_if()?))),
                "while" => {
                    return Ok(Statement::Compound(CompoundStatement::While(
                        self.parse_while()?,
                    )))
                }
                "for" => {
                    return Ok(Statement::Compound(CompoundStatement::For(
                        self.parse_for(None)?,
                    )))
                }
                "try" => {
                    return Ok(Statement::Compound(CompoundStatement::Try(
                        self.parse_try()?,
                    )))
                }
                "with" => {
                    return Ok(Statement::Compound(CompoundStatement::With(
                        self.parse_with(None)?,
                    )))
                }
                "def" => {
                    return Ok(Statement::Compound(CompoundStatement::FunctionDef(
                        self.parse_function_def(Vec::new(), None)?,
                    )))
                }
                "class" => {
                    return Ok(Statement::Compound(CompoundStatement::ClassDef(
                        self.parse_class_def(Vec::new())?,
                    )))
                }
                "async" => {
                    let async_tok = self.bump_atom();
                    if self.at_keyword("def") {
                        return Ok(Statement::Compound(CompoundStatement::FunctionDef(
                            self.parse_function_def(Vec::new(), Some(async_tok))?,
                        )));
                    }
                    if self.at_keyword("for") {
                        return Ok(Statement::Compound(CompoundStatement::For(
                            self.parse_for(Some(async_tok))?,
                        )));
                    }
                    if self.at_keyword("with") {
                        return Ok(Statement::Compound(CompoundStatement::With(
                            self.parse_with(Some(async_tok))?,
                        )));
                    }
                    return self.fail("expected 'def', 'for', or 'with' after 'async'");
                }
                _ => {}
            }
        }
        if self.at_op("@") {
            return self.parse_decorated();
        }
        Ok(Statement::Simple(self.parse_simple_line()?))
    }

    fn parse_decorated(&mut self) -> PResult<Statement> {
        let mut decorators = Vec::new();
        while self.at_op("@") {
            let start = self.cur_start();
            let at = self.bump_atom();
            let expression = self.parse_test()?;
            let newline = self.expect_newline()?;
            decorators.push(Decorator {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                at,
                expression,
                newline,
            });
        }
        if self.at_keyword("class") {
            return Ok(Statement::Compound(CompoundStatement::ClassDef(
                self.parse_class_def(decorators)?,
            )));
        }
        if self.at_keyword("def") {
            return Ok(Statement::Compound(CompoundStatement::FunctionDef(
                self.parse_function_def(decorators, None)?,
            )));
        }
        if self.at_keyword("async") {
            let async_tok = self.bump_atom();
            if self.at_keyword("def") {
                return Ok(Statement::Compound(CompoundStatement::FunctionDef(
                    self.parse_function_def(decorators, Some(async_tok))?,
                )));
            }
        }
        self.fail("expected a function or class definition after decorators")
    }

    fn parse_simple_line(&mut self) -> PResult<SimpleStatementLine> {
        let start = self.cur_start();
        let mut parts = Vec::new();
        loop {
            let statement = self.parse_small_statement()?;
            let semicolon = if self.at_op(";") {
                Some(self.bump_atom())
            } else {
                None
            };
            let had_semicolon = semicolon.is_some();
            parts.push(SmallStatementPart {
                statement,
                semicolon,
            });
            if !had_semicolon
                || self.at_kind(TokenKind::Newline)
                || self.at_kind(TokenKind::EndMarker)
            {
                break;
            }
        }
        let newline = self.expect_newline_or_eof()?;
        Ok(SimpleStatementLine {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            parts,
            newline,
        })
    }

    fn expect_newline_or_eof(&mut self) -> PResult<Atom> {
        if self.at_kind(TokenKind::Newline) {
            Ok(self.bump_atom())
        } else if self.at_kind(TokenKind::EndMarker) {
            // The tokenizer synthesizes a newline before the end marker,
            // so this only happens for pathological streams.
            Ok(Atom {
                leading: String::new(),
                text: String::new(),
                span: Span::at(self.prev_end()),
            })
        } else {
            self.fail("expected end of line")
        }
    }

    fn parse_small_statement(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        if self.peek().kind == TokenKind::Keyword {
            match self.peek().text.as_str() {
                "return" => {
                    let return_tok = self.bump_atom();
                    let value = if self.at_line_end() {
                        None
                    } else {
                        Some(self.parse_testlist_star(true)?)
                    };
                    return Ok(SmallStatement::Return(ReturnStatement {
                        node_id: self.ids.next_id(),
                        span: self.span_from(start),
                        return_tok,
                        value,
                    }));
                }
                "pass" => {
                    let tok = self.bump_atom();
                    return Ok(SmallStatement::Pass(PassStatement {
                        node_id: self.ids.next_id(),
                        span: self.span_from(start),
                        tok,
                    }));
                }
                "break" => {
                    let tok = self.bump_atom();
                    return Ok(SmallStatement::Break(BreakStatement {
                        node_id: self.ids.next_id(),
                        span: self.span_from(start),
                        tok,
                    }));
                }
                "continue" => {
                    let tok = self.bump_atom();
                    return Ok(SmallStatement::Continue(ContinueStatement {
                        node_id: self.ids.next_id(),
                        span: self.span_from(start),
                        tok,
                    }));
                }
                "del" => return self.parse_del(),
                "import" => return self.parse_import(),
                "from" => return self.parse_import_from(),
                "global" => return self.parse_global(),
                "nonlocal" if self.version.has_nonlocal() => return self.parse_nonlocal(),
                "assert" => return self.parse_assert(),
                "raise" => return self.parse_raise(),
                "print" if self.version.print_is_keyword() => return self.parse_print(),
                "exec" if !self.version.is_py3() => return self.parse_exec(),
                "yield" => {
                    let value = self.parse_yield_expr()?;
                    return Ok(SmallStatement::Expr(ExprStatement {
                        node_id: self.ids.next_id(),
                        span: self.span_from(start),
                        value,
                    }));
                }
                _ => {}
            }
        }
        self.parse_expr_like_statement()
    }

    /// Expression statements, assignments, augmented assignments, and
    /// annotated assignments all begin with an expression list.
    fn parse_expr_like_statement(&mut self) -> PResult<SmallStatement> {
        const AUG_OPS: &[&str] = &[
            "+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@=",
        ];
        let start = self.cur_start();
        let first = self.parse_testlist_star(true)?;

        // Annotated assignment: `target: annotation [= value]`
        if self.at_op(":") && self.version.has_annotations() {
            let colon = self.bump_atom();
            let annotation = self.parse_test()?;
            let value = if self.at_op("=") {
                let eq = self.bump_atom();
                let value = self.parse_assign_value()?;
                Some((eq, value))
            } else {
                None
            };
            return Ok(SmallStatement::AnnAssign(AnnAssignStatement {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                target: first,
                colon,
                annotation,
                value,
            }));
        }

        // Augmented assignment.
        if self.peek().kind == TokenKind::Op && AUG_OPS.contains(&self.peek().text.as_str()) {
            let op = self.bump_atom();
            let value = self.parse_assign_value()?;
            return Ok(SmallStatement::AugAssign(AugAssignStatement {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                target: first,
                op,
                value,
            }));
        }

        // Chained assignment.
        if self.at_op("=") {
            let mut targets = Vec::new();
            let mut current = first;
            while self.at_op("=") {
                let eq = self.bump_atom();
                targets.push(AssignTarget {
                    target: current,
                    eq,
                });
                current = self.parse_assign_value()?;
            }
            return Ok(SmallStatement::Assign(AssignStatement {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                targets,
                value: current,
            }));
        }

        Ok(SmallStatement::Expr(ExprStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            value: first,
        }))
    }

    fn parse_assign_value(&mut self) -> PResult<Expression> {
        if self.at_keyword("yield") {
            self.parse_yield_expr()
        } else {
            self.parse_testlist_star(true)
        }
    }

    fn parse_del(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let del_tok = self.bump_atom();
        let mut targets = Vec::new();
        loop {
            let target = self.parse_expr()?;
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none() || self.at_line_end();
            targets.push((target, comma));
            if done {
                break;
            }
        }
        Ok(SmallStatement::Del(DelStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            del_tok,
            targets,
        }))
    }

    fn parse_dotted_name(&mut self) -> PResult<DottedName> {
        let mut parts = Vec::new();
        loop {
            if !self.at_kind(TokenKind::Name) {
                return self.fail("expected a module name");
            }
            let name = self.bump_atom();
            let dot = if self.at_op(".") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = dot.is_none();
            parts.push(DottedPart { name, dot });
            if done {
                break;
            }
        }
        Ok(DottedName { parts })
    }

    fn parse_import(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let import_tok = self.bump_atom();
        let mut names = Vec::new();
        loop {
            let alias_start = self.cur_start();
            let name = self.parse_dotted_name()?;
            let as_name = if self.at_keyword("as") {
                let as_tok = self.bump_atom();
                Some((as_tok, self.expect_name()?))
            } else {
                None
            };
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            names.push(ImportAlias {
                node_id: self.ids.next_id(),
                span: self.span_from(alias_start),
                name,
                as_name,
                comma,
            });
            if done {
                break;
            }
        }
        Ok(SmallStatement::Import(ImportStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            import_tok,
            names,
        }))
    }

    fn parse_import_from(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let from_tok = self.bump_atom();
        let mut dots = Vec::new();
        while self.at_op(".") || self.at_op("...") {
            dots.push(self.bump_atom());
        }
        let module = if self.at_kind(TokenKind::Name) {
            Some(self.parse_dotted_name()?)
        } else {
            None
        };
        if module.is_none() && dots.is_empty() {
            return self.fail("expected a module name after 'from'");
        }
        let import_tok = self.expect_keyword("import")?;
        if self.at_op("*") {
            let star = self.bump_atom();
            return Ok(SmallStatement::ImportFrom(ImportFromStatement {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                from_tok,
                dots,
                module,
                import_tok,
                lpar: None,
                names: ImportNames::Star(star),
                rpar: None,
            }));
        }
        let lpar = if self.at_op("(") {
            Some(self.bump_atom())
        } else {
            None
        };
        let mut aliases = Vec::new();
        loop {
            if lpar.is_some() && self.at_op(")") {
                break;
            }
            let alias_start = self.cur_start();
            if !self.at_kind(TokenKind::Name) {
                return self.fail("expected an imported name");
            }
            let name = self.bump_atom();
            let as_name = if self.at_keyword("as") {
                let as_tok = self.bump_atom();
                Some((as_tok, self.expect_name()?))
            } else {
                None
            };
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            aliases.push(FromImportAlias {
                node_id: self.ids.next_id(),
                span: self.span_from(alias_start),
                name,
                as_name,
                comma,
            });
            if done {
                break;
            }
        }
        let rpar = if lpar.is_some() {
            Some(self.expect_op(")")?)
        } else {
            None
        };
        Ok(SmallStatement::ImportFrom(ImportFromStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            from_tok,
            dots,
            module,
            import_tok,
            lpar,
            names: ImportNames::Aliases(aliases),
            rpar,
        }))
    }

    fn parse_name_list(&mut self) -> PResult<Vec<(Name, Option<Atom>)>> {
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            names.push((name, comma));
            if done {
                break;
            }
        }
        Ok(names)
    }

    fn parse_global(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let global_tok = self.bump_atom();
        let names = self.parse_name_list()?;
        Ok(SmallStatement::Global(GlobalStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            global_tok,
            names,
        }))
    }

    fn parse_nonlocal(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let nonlocal_tok = self.bump_atom();
        let names = self.parse_name_list()?;
        Ok(SmallStatement::Nonlocal(NonlocalStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            nonlocal_tok,
            names,
        }))
    }

    fn parse_assert(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let assert_tok = self.bump_atom();
        let test = self.parse_test()?;
        let msg = if self.at_op(",") {
            let comma = self.bump_atom();
            Some((comma, self.parse_test()?))
        } else {
            None
        };
        Ok(SmallStatement::Assert(AssertStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            assert_tok,
            test,
            msg,
        }))
    }

    fn parse_raise(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let raise_tok = self.bump_atom();
        let mut exc = None;
        let mut from_part = None;
        let mut comma_parts = Vec::new();
        if !self.at_line_end() {
            exc = Some(self.parse_test()?);
            if self.at_keyword("from") && self.version.is_py3() {
                let from_tok = self.bump_atom();
                from_part = Some((from_tok, self.parse_test()?));
            } else if !self.version.is_py3() {
                while self.at_op(",") {
                    let comma = self.bump_atom();
                    comma_parts.push((comma, self.parse_test()?));
                }
            }
        }
        Ok(SmallStatement::Raise(RaiseStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            raise_tok,
            exc,
            from_part,
            comma_parts,
        }))
    }

    fn parse_print(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let print_tok = self.bump_atom();
        let chevron = if self.at_op(">>") {
            let chevron_tok = self.bump_atom();
            let file = self.parse_test()?;
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            Some((chevron_tok, file, comma))
        } else {
            None
        };
        let mut args = Vec::new();
        while !self.at_line_end() {
            let value = self.parse_test()?;
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            args.push((value, comma));
            if done {
                break;
            }
        }
        Ok(SmallStatement::Print(PrintStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            print_tok,
            chevron,
            args,
        }))
    }

    fn parse_exec(&mut self) -> PResult<SmallStatement> {
        let start = self.cur_start();
        let exec_tok = self.bump_atom();
        let body = self.parse_expr()?;
        let in_part = if self.at_keyword("in") {
            let in_tok = self.bump_atom();
            let globals = self.parse_test()?;
            let locals = if self.at_op(",") {
                let comma = self.bump_atom();
                Some((comma, self.parse_test()?))
            } else {
                None
            };
            Some(ExecIn {
                in_tok,
                globals,
                locals,
            })
        } else {
            None
        };
        Ok(SmallStatement::Exec(ExecStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            exec_tok,
            body,
            in_part,
        }))
    }

    // ------------------------------------------------------------------
    // Compound statements
    // ------------------------------------------------------------------

    fn parse_suite(&mut self) -> PResult<Suite> {
        if self.at_kind(TokenKind::Newline) {
            let newline = self.bump_atom();
            if !self.at_kind(TokenKind::Indent) {
                return self.fail("expected an indented block");
            }
            let indent = self.bump_atom();
            let mut body = Vec::new();
            while !self.at_kind(TokenKind::Dedent) && !self.at_kind(TokenKind::EndMarker) {
                if self.at_kind(TokenKind::Newline) {
                    let statement = self.error_statement_here("unexpected blank logical line");
                    body.push(Statement::Simple(self.wrap_error_line(statement)));
                    continue;
                }
                body.push(self.parse_statement());
            }
            let dedent = if self.at_kind(TokenKind::Dedent) {
                self.bump_atom()
            } else {
                Atom {
                    leading: String::new(),
                    text: String::new(),
                    span: Span::at(self.prev_end()),
                }
            };
            Ok(Suite::Block {
                newline,
                indent,
                body,
                dedent,
            })
        } else {
            let mut parts = Vec::new();
            loop {
                let statement = self.parse_small_statement()?;
                let semicolon = if self.at_op(";") {
                    Some(self.bump_atom())
                } else {
                    None
                };
                let had_semicolon = semicolon.is_some();
                parts.push(SmallStatementPart {
                    statement,
                    semicolon,
                });
                if !had_semicolon || self.at_kind(TokenKind::Newline) {
                    break;
                }
            }
            let newline = self.expect_newline_or_eof()?;
            Ok(Suite::Inline { parts, newline })
        }
    }

    fn parse_else(&mut self) -> PResult<ElseClause> {
        let else_tok = self.bump_atom();
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        Ok(ElseClause {
            else_tok,
            colon,
            body,
        })
    }

    fn parse_if(&mut self) -> PResult<IfStatement> {
        let start = self.cur_start();
        let if_tok = self.bump_atom();
        let test = self.parse_test()?;
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        let mut elifs = Vec::new();
        while self.at_keyword("elif") {
            let elif_tok = self.bump_atom();
            let test = self.parse_test()?;
            let colon = self.expect_op(":")?;
            let body = self.parse_suite()?;
            elifs.push(ElifClause {
                elif_tok,
                test,
                colon,
                body,
            });
        }
        let orelse = if self.at_keyword("else") {
            Some(self.parse_else()?)
        } else {
            None
        };
        Ok(IfStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            if_tok,
            test,
            colon,
            body,
            elifs,
            orelse,
        })
    }

    fn parse_while(&mut self) -> PResult<WhileStatement> {
        let start = self.cur_start();
        let while_tok = self.bump_atom();
        let test = self.parse_test()?;
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        let orelse = if self.at_keyword("else") {
            Some(self.parse_else()?)
        } else {
            None
        };
        Ok(WhileStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            while_tok,
            test,
            colon,
            body,
            orelse,
        })
    }

    fn parse_for(&mut self, async_tok: Option<Atom>) -> PResult<ForStatement> {
        let start = async_tok
            .as_ref()
            .map(|a| a.span.start)
            .unwrap_or_else(|| self.cur_start());
        let for_tok = self.bump_atom();
        let target = self.parse_target_list()?;
        let in_tok = self.expect_keyword("in")?;
        let iter = self.parse_testlist_star(false)?;
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        let orelse = if self.at_keyword("else") {
            Some(self.parse_else()?)
        } else {
            None
        };
        Ok(ForStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            async_tok,
            for_tok,
            target,
            in_tok,
            iter,
            colon,
            body,
            orelse,
        })
    }

    fn parse_with(&mut self, async_tok: Option<Atom>) -> PResult<WithStatement> {
        let start = async_tok
            .as_ref()
            .map(|a| a.span.start)
            .unwrap_or_else(|| self.cur_start());
        let with_tok = self.bump_atom();
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let as_part = if self.at_keyword("as") {
                let as_tok = self.bump_atom();
                Some((as_tok, self.parse_expr()?))
            } else {
                None
            };
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            items.push(WithItem {
                context,
                as_part,
                comma,
            });
            if done {
                break;
            }
        }
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        Ok(WithStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            async_tok,
            with_tok,
            items,
            colon,
            body,
        })
    }

    fn parse_try(&mut self) -> PResult<TryStatement> {
        let start = self.cur_start();
        let try_tok = self.bump_atom();
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        let mut handlers = Vec::new();
        while self.at_keyword("except") {
            let handler_start = self.cur_start();
            let except_tok = self.bump_atom();
            let mut exc_type = None;
            let mut binding = None;
            if !self.at_op(":") {
                exc_type = Some(self.parse_test()?);
                if self.at_keyword("as") {
                    let sep = self.bump_atom();
                    binding = Some(ExceptBinding {
                        sep,
                        name: self.expect_name()?,
                    });
                } else if self.at_op(",") && self.version.has_except_comma() {
                    let sep = self.bump_atom();
                    binding = Some(ExceptBinding {
                        sep,
                        name: self.expect_name()?,
                    });
                }
            }
            let colon = self.expect_op(":")?;
            let body = self.parse_suite()?;
            handlers.push(ExceptHandler {
                node_id: self.ids.next_id(),
                span: self.span_from(handler_start),
                except_tok,
                exc_type,
                binding,
                colon,
                body,
            });
        }
        let orelse = if self.at_keyword("else") && !handlers.is_empty() {
            Some(self.parse_else()?)
        } else {
            None
        };
        let finally = if self.at_keyword("finally") {
            let finally_tok = self.bump_atom();
            let colon = self.expect_op(":")?;
            let body = self.parse_suite()?;
            Some(FinallyClause {
                finally_tok,
                colon,
                body,
            })
        } else {
            None
        };
        if handlers.is_empty() && finally.is_none() {
            return self.fail("expected 'except' or 'finally' after try block");
        }
        Ok(TryStatement {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            try_tok,
            colon,
            body,
            handlers,
            orelse,
            finally,
        })
    }

    fn parse_function_def(
        &mut self,
        decorators: Vec<Decorator>,
        async_tok: Option<Atom>,
    ) -> PResult<FunctionDef> {
        let start = decorators
            .first()
            .map(|d| d.span.start)
            .or_else(|| async_tok.as_ref().map(|a| a.span.start))
            .unwrap_or_else(|| self.cur_start());
        let def_tok = self.bump_atom();
        let name = self.expect_name()?;
        let lpar = self.expect_op("(")?;
        let params = self.parse_parameters(true)?;
        let rpar = self.expect_op(")")?;
        let returns = if self.at_op("->") && self.version.has_annotations() {
            let arrow = self.bump_atom();
            Some((arrow, self.parse_test()?))
        } else {
            None
        };
        let colon = self.expect_op(":")?;
        let body = self.parse_suite()?;
        Ok(FunctionDef {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            decorators,
            async_tok,
            def_tok,
            name,
            lpar,
            params,
            rpar,
            returns,
            colon,
            body,
        })
    }

    fn parse_class_def(&mut self, decorators: Vec<Decorator>) -> PResult<ClassDef> {
        let start = decorators
            .first()
            .map(|d| d.span.start)
            .unwrap_or_else(|| self.cur_start());
        let class_tok = self.bump_atom();
        let name = self.expect_name()?;
        let arguments = if self.at_op("(") {
            let lpar = self.bump_atom();
            let args = self.parse_call_args()?;
            let rpar = self.expect_op(")")?;
            Some(ClassArguments { lpar, args, rpar })
        } else {
            None
        };
        let colon = self.expect_op(":")?;
        self.class_stack.push(name.value().to_string());
        let body = self.parse_suite();
        self.class_stack.pop();
        Ok(ClassDef {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            decorators,
            class_tok,
            name,
            arguments,
            colon,
            body: body?,
        })
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    fn parse_param_target(&mut self) -> PResult<ParamTarget> {
        if self.at_op("(") && !self.version.is_py3() {
            let lpar = self.bump_atom();
            let mut elements = Vec::new();
            while !self.at_op(")") {
                let target = self.parse_param_target()?;
                let comma = if self.at_op(",") {
                    Some(self.bump_atom())
                } else {
                    None
                };
                let done = comma.is_none();
                elements.push((target, comma));
                if done {
                    break;
                }
            }
            let rpar = self.expect_op(")")?;
            return Ok(ParamTarget::Tuple {
                lpar,
                elements,
                rpar,
            });
        }
        Ok(ParamTarget::Name(self.expect_name()?))
    }

    /// Parse a parameter list up to (not including) the closing `)` or,
    /// for lambdas, the `:`. `allow_annotations` is false for lambdas.
    fn parse_parameters(&mut self, allow_annotations: bool) -> PResult<Parameters> {
        let mut params = Vec::new();
        loop {
            if self.at_op(")") || self.at_op(":") || self.at_line_end() {
                break;
            }
            let start = self.cur_start();
            let star = if self.at_op("*") || self.at_op("**") {
                Some(self.bump_atom())
            } else {
                None
            };
            let target = if star.is_some() && (self.at_op(",") || self.at_op(")") || self.at_op(":"))
            {
                // Bare `*` keyword-only separator.
                None
            } else {
                Some(self.parse_param_target()?)
            };
            let annotation = if allow_annotations
                && self.version.has_annotations()
                && self.at_op(":")
                && target.is_some()
            {
                let colon = self.bump_atom();
                Some((colon, self.parse_test()?))
            } else {
                None
            };
            let default = if self.at_op("=") {
                let eq = self.bump_atom();
                Some((eq, self.parse_test()?))
            } else {
                None
            };
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            params.push(Param {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                star,
                target,
                annotation,
                default,
                comma,
            });
            if done {
                break;
            }
        }
        Ok(Parameters { params })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// `test`: conditional expression or lambda.
    fn parse_test(&mut self) -> PResult<Expression> {
        if self.at_keyword("lambda") {
            return self.parse_lambda();
        }
        let start = self.cur_start();
        let body = self.parse_or_test()?;
        if self.at_keyword("if") {
            let if_tok = self.bump_atom();
            let test = self.parse_or_test()?;
            let else_tok = self.expect_keyword("else")?;
            let orelse = self.parse_test()?;
            return Ok(Expression::Conditional(Box::new(ConditionalExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                body,
                if_tok,
                test,
                else_tok,
                orelse,
            })));
        }
        Ok(body)
    }

    fn parse_lambda(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let lambda_tok = self.bump_atom();
        let params = self.parse_parameters(false)?;
        let colon = self.expect_op(":")?;
        let body = self.parse_test()?;
        Ok(Expression::Lambda(Box::new(LambdaExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            lambda_tok,
            params,
            colon,
            body,
        })))
    }

    fn parse_or_test(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let mut left = self.parse_and_test()?;
        while self.at_keyword("or") {
            let op = self.bump_atom();
            let right = self.parse_and_test()?;
            left = Expression::Boolean(Box::new(BooleanExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                left,
                op,
                right,
            }));
        }
        Ok(left)
    }

    fn parse_and_test(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let mut left = self.parse_not_test()?;
        while self.at_keyword("and") {
            let op = self.bump_atom();
            let right = self.parse_not_test()?;
            left = Expression::Boolean(Box::new(BooleanExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                left,
                op,
                right,
            }));
        }
        Ok(left)
    }

    fn parse_not_test(&mut self) -> PResult<Expression> {
        if self.at_keyword("not") {
            let start = self.cur_start();
            let op = self.bump_atom();
            let operand = self.parse_not_test()?;
            return Ok(Expression::Unary(Box::new(UnaryExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                op,
                operand,
            })));
        }
        self.parse_comparison()
    }

    fn at_compare_op(&self) -> bool {
        if self.peek().kind == TokenKind::Op {
            matches!(
                self.peek().text.as_str(),
                "<" | ">" | "==" | ">=" | "<=" | "!=" | "<>"
            )
        } else {
            self.at_keyword("in") || self.at_keyword("is") || self.at_keyword("not")
        }
    }

    fn parse_comparison(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let left = self.parse_expr()?;
        if !self.at_compare_op() {
            return Ok(left);
        }
        let mut comparisons = Vec::new();
        while self.at_compare_op() {
            let first = self.bump_atom();
            let second = if first.text == "is" && self.at_keyword("not") {
                Some(self.bump_atom())
            } else if first.text == "not" {
                Some(self.expect_keyword("in")?)
            } else {
                None
            };
            let right = self.parse_expr()?;
            comparisons.push(ComparisonPart {
                op: CompareOp { first, second },
                right,
            });
        }
        Ok(Expression::Compare(Box::new(CompareExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            left,
            comparisons,
        })))
    }

    /// Left-associative binary operator ladder, from `|` down to `%`.
    fn parse_binary_ladder(&mut self, level: usize) -> PResult<Expression> {
        const LEVELS: &[&[&str]] = &[
            &["|"],
            &["^"],
            &["&"],
            &["<<", ">>"],
            &["+", "-"],
            &["*", "/", "//", "%", "@"],
        ];
        if level >= LEVELS.len() {
            return self.parse_factor();
        }
        let start = self.cur_start();
        let mut left = self.parse_binary_ladder(level + 1)?;
        loop {
            let at_level = self.peek().kind == TokenKind::Op
                && LEVELS[level].contains(&self.peek().text.as_str());
            if !at_level {
                break;
            }
            if self.peek().text == "@" && !self.version.has_matrix_multiply() {
                break;
            }
            let op = self.bump_atom();
            let right = self.parse_binary_ladder(level + 1)?;
            left = Expression::Binary(Box::new(BinaryExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                left,
                op,
                right,
            }));
        }
        Ok(left)
    }

    /// `expr`: the bitwise-or level (no comparisons). Also the grammar
    /// level for assignment and loop targets.
    fn parse_expr(&mut self) -> PResult<Expression> {
        self.parse_binary_ladder(0)
    }

    fn parse_factor(&mut self) -> PResult<Expression> {
        if self.peek().kind == TokenKind::Op
            && matches!(self.peek().text.as_str(), "+" | "-" | "~")
        {
            let start = self.cur_start();
            let op = self.bump_atom();
            let operand = self.parse_factor()?;
            return Ok(Expression::Unary(Box::new(UnaryExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                op,
                operand,
            })));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let left = self.parse_atom_expr()?;
        if self.at_op("**") {
            let op = self.bump_atom();
            let right = self.parse_factor()?;
            return Ok(Expression::Binary(Box::new(BinaryExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                left,
                op,
                right,
            })));
        }
        Ok(left)
    }

    fn parse_atom_expr(&mut self) -> PResult<Expression> {
        if self.at_keyword("await") {
            let start = self.cur_start();
            let await_tok = self.bump_atom();
            let value = self.parse_atom_expr()?;
            return Ok(Expression::Await(Box::new(AwaitExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                await_tok,
                value,
            })));
        }
        let start = self.cur_start();
        let mut value = self.parse_atom()?;
        loop {
            if self.at_op("(") {
                let lpar = self.bump_atom();
                let args = self.parse_call_args()?;
                let rpar = self.expect_op(")")?;
                value = Expression::Call(Box::new(CallExpr {
                    node_id: self.ids.next_id(),
                    span: self.span_from(start),
                    func: value,
                    lpar,
                    args,
                    rpar,
                }));
            } else if self.at_op("[") {
                let lbracket = self.bump_atom();
                let elements = self.parse_subscript_elements()?;
                let rbracket = self.expect_op("]")?;
                value = Expression::Subscript(Box::new(SubscriptExpr {
                    node_id: self.ids.next_id(),
                    span: self.span_from(start),
                    value,
                    lbracket,
                    elements,
                    rbracket,
                }));
            } else if self.at_op(".") {
                let dot = self.bump_atom();
                let attr = self.expect_name()?;
                value = Expression::Attribute(Box::new(AttributeExpr {
                    node_id: self.ids.next_id(),
                    span: self.span_from(start),
                    value,
                    dot,
                    attr,
                }));
            } else {
                break;
            }
        }
        Ok(value)
    }

    fn parse_call_args(&mut self) -> PResult<Vec<CallArg>> {
        let mut args = Vec::new();
        loop {
            if self.at_op(")") {
                break;
            }
            let star = if self.at_op("*") || self.at_op("**") {
                Some(self.bump_atom())
            } else {
                None
            };
            // Keyword argument: NAME '=' (not '==').
            let keyword = if star.is_none()
                && self.at_kind(TokenKind::Name)
                && self.peek_at(1).is_op("=")
            {
                let name = self.bump_atom();
                let eq = self.bump_atom();
                Some((name, eq))
            } else {
                None
            };
            let value = self.parse_test()?;
            // A bare generator expression as the sole argument.
            if args.is_empty()
                && star.is_none()
                && keyword.is_none()
                && (self.at_keyword("for")
                    || (self.at_keyword("async") && self.peek_at(1).is_keyword("for")))
            {
                let comp = self.parse_comp_for()?;
                let span = Span::new(value.span().start, self.prev_end());
                let generator = Expression::Generator(Box::new(GeneratorExpr {
                    node_id: self.ids.next_id(),
                    span,
                    lpar: None,
                    element: value,
                    comp,
                    rpar: None,
                }));
                args.push(CallArg {
                    star: None,
                    keyword: None,
                    value: generator,
                    comma: None,
                });
                break;
            }
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            args.push(CallArg {
                star,
                keyword,
                value,
                comma,
            });
            if done {
                break;
            }
        }
        Ok(args)
    }

    fn parse_subscript_elements(&mut self) -> PResult<Vec<SubscriptElement>> {
        let mut elements = Vec::new();
        loop {
            if self.at_op("]") {
                break;
            }
            let index = self.parse_subscript_index()?;
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            elements.push(SubscriptElement { index, comma });
            if done {
                break;
            }
        }
        Ok(elements)
    }

    fn parse_subscript_index(&mut self) -> PResult<SubscriptIndex> {
        let start = self.cur_start();
        let lower = if self.at_op(":") {
            None
        } else {
            Some(self.parse_test()?)
        };
        if !self.at_op(":") {
            match lower {
                Some(expr) => return Ok(SubscriptIndex::Index(expr)),
                None => return self.fail("expected a subscript"),
            }
        }
        let colon = self.bump_atom();
        let upper = if self.at_op(":") || self.at_op("]") || self.at_op(",") {
            None
        } else {
            Some(self.parse_test()?)
        };
        let step = if self.at_op(":") {
            let colon2 = self.bump_atom();
            let step_value = if self.at_op("]") || self.at_op(",") {
                None
            } else {
                Some(self.parse_test()?)
            };
            Some((colon2, step_value))
        } else {
            None
        };
        Ok(SubscriptIndex::Slice(SliceExpr {
            span: self.span_from(start),
            lower,
            colon,
            upper,
            step,
        }))
    }

    fn parse_yield_expr(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let yield_tok = self.bump_atom();
        let from_tok = if self.at_keyword("from") && self.version.has_yield_from() {
            Some(self.bump_atom())
        } else {
            None
        };
        let value = if from_tok.is_some() {
            Some(self.parse_test()?)
        } else if self.at_line_end() || self.at_op(")") || self.at_op("]") || self.at_op("}") {
            None
        } else {
            Some(self.parse_testlist_star(false)?)
        };
        Ok(Expression::Yield(Box::new(YieldExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            yield_tok,
            from_tok,
            value,
        })))
    }

    /// `testlist_star_expr`: one or more tests (or starred expressions,
    /// 3.x) joined by commas into a tuple.
    fn parse_testlist_star(&mut self, allow_star: bool) -> PResult<Expression> {
        let start = self.cur_start();
        let first = self.parse_star_or_test(allow_star)?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elements = Vec::new();
        let mut value = first;
        loop {
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            elements.push(Element { value, comma });
            if done || self.at_testlist_end() {
                break;
            }
            value = self.parse_star_or_test(allow_star)?;
        }
        Ok(Expression::Tuple(TupleExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            elements,
        }))
    }

    fn at_testlist_end(&self) -> bool {
        self.at_line_end()
            || self.at_op("=")
            || self.at_op(")")
            || self.at_op("]")
            || self.at_op("}")
            || self.at_op(":")
            || self.at_keyword("in")
            || self.at_keyword("for")
            || self.at_keyword("async")
    }

    fn parse_star_or_test(&mut self, allow_star: bool) -> PResult<Expression> {
        if self.at_op("*") && allow_star && self.version.is_py3() {
            let start = self.cur_start();
            let star = self.bump_atom();
            let value = self.parse_expr()?;
            return Ok(Expression::Starred(Box::new(StarredExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                star,
                value,
            })));
        }
        self.parse_test()
    }

    /// The target of a `for` statement or comprehension clause: the
    /// bitwise-or grammar level, so `in` is not consumed.
    fn parse_target_list(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let first = self.parse_target_item()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut elements = Vec::new();
        let mut value = first;
        loop {
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            elements.push(Element { value, comma });
            if done || self.at_keyword("in") || self.at_op("=") || self.at_line_end() {
                break;
            }
            value = self.parse_target_item()?;
        }
        Ok(Expression::Tuple(TupleExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            elements,
        }))
    }

    fn parse_target_item(&mut self) -> PResult<Expression> {
        if self.at_op("*") && self.version.is_py3() {
            let start = self.cur_start();
            let star = self.bump_atom();
            let value = self.parse_expr()?;
            return Ok(Expression::Starred(Box::new(StarredExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                star,
                value,
            })));
        }
        self.parse_expr()
    }

    fn parse_comp_for(&mut self) -> PResult<CompFor> {
        let async_tok = if self.at_keyword("async") && self.peek_at(1).is_keyword("for") {
            Some(self.bump_atom())
        } else {
            None
        };
        let for_tok = self.expect_keyword("for")?;
        let target = self.parse_target_list()?;
        let in_tok = self.expect_keyword("in")?;
        let iter = self.parse_or_test()?;
        let mut ifs = Vec::new();
        while self.at_keyword("if") {
            let if_tok = self.bump_atom();
            let test = self.parse_or_test()?;
            ifs.push(CompIf { if_tok, test });
        }
        let inner = if self.at_keyword("for")
            || (self.at_keyword("async") && self.peek_at(1).is_keyword("for"))
        {
            Some(Box::new(self.parse_comp_for()?))
        } else {
            None
        };
        Ok(CompFor {
            async_tok,
            for_tok,
            target,
            in_tok,
            iter,
            ifs,
            inner,
        })
    }

    // ------------------------------------------------------------------
    // Atoms
    // ------------------------------------------------------------------

    fn parse_atom(&mut self) -> PResult<Expression> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::Name => {
                let atom = self.bump_atom();
                let name = self.make_name(atom);
                Ok(Expression::Name(name))
            }
            // `True` / `False` / `None` are keywords on 3.x but still
            // name expressions; the interpreter resolves them by name.
            TokenKind::Keyword if matches!(tok.text.as_str(), "True" | "False" | "None") => {
                let atom = self.bump_atom();
                let name = self.make_name(atom);
                Ok(Expression::Name(name))
            }
            TokenKind::Int => {
                let atom = self.bump_atom();
                Ok(Expression::Integer(IntegerLiteral {
                    node_id: self.ids.next_id(),
                    span: atom.span,
                    tok: atom,
                }))
            }
            TokenKind::Float => {
                let atom = self.bump_atom();
                Ok(Expression::Float(FloatLiteral {
                    node_id: self.ids.next_id(),
                    span: atom.span,
                    tok: atom,
                }))
            }
            TokenKind::Imaginary => {
                let atom = self.bump_atom();
                Ok(Expression::Imaginary(ImaginaryLiteral {
                    node_id: self.ids.next_id(),
                    span: atom.span,
                    tok: atom,
                }))
            }
            TokenKind::String => self.parse_string_group(),
            TokenKind::Op => match tok.text.as_str() {
                "(" => self.parse_paren_atom(),
                "[" => self.parse_bracket_atom(),
                "{" => self.parse_brace_atom(),
                "..." => {
                    let atom = self.bump_atom();
                    Ok(Expression::Ellipsis(EllipsisLiteral {
                        node_id: self.ids.next_id(),
                        span: atom.span,
                        tok: atom,
                    }))
                }
                "`" if self.version.has_legacy_repr() => {
                    let start = self.cur_start();
                    let lbacktick = self.bump_atom();
                    let value = self.parse_testlist_star(false)?;
                    let rbacktick = self.expect_op("`")?;
                    Ok(Expression::Repr(Box::new(ReprExpr {
                        node_id: self.ids.next_id(),
                        span: self.span_from(start),
                        lbacktick,
                        value,
                        rbacktick,
                    })))
                }
                _ => self.fail("expected an expression"),
            },
            _ => self.fail("expected an expression"),
        }
    }

    fn parse_string_group(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let mut parts = Vec::new();
        while self.at_kind(TokenKind::String) {
            let prefix = self.peek().string_prefix;
            let atom = self.bump_atom();
            parts.push(StringLiteral {
                node_id: self.ids.next_id(),
                span: atom.span,
                tok: atom,
                prefix,
            });
        }
        if parts.len() == 1 {
            let only = parts.into_iter().next().unwrap();
            return Ok(Expression::Str(only));
        }
        Ok(Expression::Concatenated(ConcatenatedString {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            parts,
        }))
    }

    fn parse_paren_atom(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let lpar = self.bump_atom();
        // Empty tuple.
        if self.at_op(")") {
            let rpar = self.bump_atom();
            let tuple = Expression::Tuple(TupleExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                elements: Vec::new(),
            });
            return Ok(Expression::Parenthesized(Box::new(ParenthesizedExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lpar,
                value: tuple,
                rpar,
            })));
        }
        // Parenthesized yield.
        if self.at_keyword("yield") {
            let value = self.parse_yield_expr()?;
            let rpar = self.expect_op(")")?;
            return Ok(Expression::Parenthesized(Box::new(ParenthesizedExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lpar,
                value,
                rpar,
            })));
        }
        let first = self.parse_star_or_test(true)?;
        // Generator expression.
        if self.at_keyword("for") || (self.at_keyword("async") && self.peek_at(1).is_keyword("for"))
        {
            let comp = self.parse_comp_for()?;
            let rpar = self.expect_op(")")?;
            return Ok(Expression::Generator(Box::new(GeneratorExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lpar: Some(lpar),
                element: first,
                comp,
                rpar: Some(rpar),
            })));
        }
        // Tuple.
        if self.at_op(",") {
            let tuple_start = first.span().start;
            let mut elements = Vec::new();
            let mut value = first;
            loop {
                let comma = if self.at_op(",") {
                    Some(self.bump_atom())
                } else {
                    None
                };
                let done = comma.is_none();
                elements.push(Element { value, comma });
                if done || self.at_op(")") {
                    break;
                }
                value = self.parse_star_or_test(true)?;
            }
            let tuple = Expression::Tuple(TupleExpr {
                node_id: self.ids.next_id(),
                span: Span::new(tuple_start, self.prev_end()),
                elements,
            });
            let rpar = self.expect_op(")")?;
            return Ok(Expression::Parenthesized(Box::new(ParenthesizedExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lpar,
                value: tuple,
                rpar,
            })));
        }
        let rpar = self.expect_op(")")?;
        Ok(Expression::Parenthesized(Box::new(ParenthesizedExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            lpar,
            value: first,
            rpar,
        })))
    }

    fn parse_bracket_atom(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let lbracket = self.bump_atom();
        if self.at_op("]") {
            let rbracket = self.bump_atom();
            return Ok(Expression::List(ListExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lbracket,
                elements: Vec::new(),
                rbracket,
            }));
        }
        let first = self.parse_star_or_test(true)?;
        if self.at_keyword("for") || (self.at_keyword("async") && self.peek_at(1).is_keyword("for"))
        {
            let comp = self.parse_comp_for()?;
            let rbracket = self.expect_op("]")?;
            return Ok(Expression::ListComp(Box::new(ListCompExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lbracket,
                element: first,
                comp,
                rbracket,
            })));
        }
        let mut elements = Vec::new();
        let mut value = first;
        loop {
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            elements.push(Element { value, comma });
            if done || self.at_op("]") {
                break;
            }
            value = self.parse_star_or_test(true)?;
        }
        let rbracket = self.expect_op("]")?;
        Ok(Expression::List(ListExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            lbracket,
            elements,
            rbracket,
        }))
    }

    fn parse_brace_atom(&mut self) -> PResult<Expression> {
        let start = self.cur_start();
        let lbrace = self.bump_atom();
        if self.at_op("}") {
            let rbrace = self.bump_atom();
            return Ok(Expression::Dict(DictExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lbrace,
                elements: Vec::new(),
                rbrace,
            }));
        }
        // `**mapping` opens a dict display.
        if self.at_op("**") {
            return self.parse_dict_rest(start, lbrace, None);
        }
        let first = self.parse_star_or_test(true)?;
        if self.at_op(":") {
            let colon = self.bump_atom();
            let value = self.parse_test()?;
            // Dict comprehension.
            if self.at_keyword("for")
                || (self.at_keyword("async") && self.peek_at(1).is_keyword("for"))
            {
                let comp = self.parse_comp_for()?;
                let rbrace = self.expect_op("}")?;
                return Ok(Expression::DictComp(Box::new(DictCompExpr {
                    node_id: self.ids.next_id(),
                    span: self.span_from(start),
                    lbrace,
                    key: first,
                    colon,
                    value,
                    comp,
                    rbrace,
                })));
            }
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let pair = DictElement::Pair {
                key: first,
                colon,
                value,
                comma,
            };
            return self.parse_dict_rest(start, lbrace, Some(pair));
        }
        // Set comprehension.
        if self.at_keyword("for") || (self.at_keyword("async") && self.peek_at(1).is_keyword("for"))
        {
            let comp = self.parse_comp_for()?;
            let rbrace = self.expect_op("}")?;
            return Ok(Expression::SetComp(Box::new(SetCompExpr {
                node_id: self.ids.next_id(),
                span: self.span_from(start),
                lbrace,
                element: first,
                comp,
                rbrace,
            })));
        }
        // Set display.
        let mut elements = Vec::new();
        let mut value = first;
        loop {
            let comma = if self.at_op(",") {
                Some(self.bump_atom())
            } else {
                None
            };
            let done = comma.is_none();
            elements.push(Element { value, comma });
            if done || self.at_op("}") {
                break;
            }
            value = self.parse_star_or_test(true)?;
        }
        let rbrace = self.expect_op("}")?;
        Ok(Expression::Set(SetExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            lbrace,
            elements,
            rbrace,
        }))
    }

    fn parse_dict_rest(
        &mut self,
        start: u32,
        lbrace: Atom,
        first: Option<DictElement>,
    ) -> PResult<Expression> {
        let mut elements = Vec::new();
        let mut more = match first {
            Some(element) => {
                let more = matches!(
                    &element,
                    DictElement::Pair { comma: Some(_), .. }
                        | DictElement::Unpack { comma: Some(_), .. }
                );
                elements.push(element);
                more
            }
            None => true,
        };
        while more && !self.at_op("}") {
            if self.at_op("**") {
                let star = self.bump_atom();
                let value = self.parse_expr()?;
                let comma = if self.at_op(",") {
                    Some(self.bump_atom())
                } else {
                    None
                };
                more = comma.is_some();
                elements.push(DictElement::Unpack { star, value, comma });
            } else {
                let key = self.parse_test()?;
                let colon = self.expect_op(":")?;
                let value = self.parse_test()?;
                let comma = if self.at_op(",") {
                    Some(self.bump_atom())
                } else {
                    None
                };
                more = comma.is_some();
                elements.push(DictElement::Pair {
                    key,
                    colon,
                    value,
                    comma,
                });
            }
        }
        let rbrace = self.expect_op("}")?;
        Ok(Expression::Dict(DictExpr {
            node_id: self.ids.next_id(),
            span: self.span_from(start),
            lbrace,
            elements,
            rbrace,
        }))
    }
}
