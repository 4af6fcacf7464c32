//! Statement nodes.

use pythia_core::span::Span;

use super::{Atom, CallArg, Expression, Name, NodeId, Parameters};

/// A statement: one logical line of small statements, or a compound
/// statement with a suite.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Simple(SimpleStatementLine),
    Compound(CompoundStatement),
}

impl Statement {
    /// The byte span this statement covers.
    pub fn span(&self) -> Span {
        match self {
            Statement::Simple(s) => s.span,
            Statement::Compound(c) => c.span(),
        }
    }
}

/// A logical line of `;`-separated small statements.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleStatementLine {
    pub node_id: NodeId,
    pub span: Span,
    pub parts: Vec<SmallStatementPart>,
    pub newline: Atom,
}

/// One small statement with its optional trailing semicolon.
#[derive(Debug, Clone, PartialEq)]
pub struct SmallStatementPart {
    pub statement: SmallStatement,
    pub semicolon: Option<Atom>,
}

/// The small (single-line) statements.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum SmallStatement {
    Expr(ExprStatement),
    Assign(AssignStatement),
    AugAssign(AugAssignStatement),
    AnnAssign(AnnAssignStatement),
    Return(ReturnStatement),
    Pass(PassStatement),
    Break(BreakStatement),
    Continue(ContinueStatement),
    Del(DelStatement),
    Import(ImportStatement),
    ImportFrom(ImportFromStatement),
    Global(GlobalStatement),
    Nonlocal(NonlocalStatement),
    Assert(AssertStatement),
    Raise(RaiseStatement),
    /// 2.x `print` statement.
    Print(PrintStatement),
    /// 2.x `exec` statement.
    Exec(ExecStatement),
    /// A region the parser could not make sense of.
    Error(ErrorStatement),
}

impl SmallStatement {
    /// The byte span this statement covers.
    pub fn span(&self) -> Span {
        match self {
            SmallStatement::Expr(s) => s.span,
            SmallStatement::Assign(s) => s.span,
            SmallStatement::AugAssign(s) => s.span,
            SmallStatement::AnnAssign(s) => s.span,
            SmallStatement::Return(s) => s.span,
            SmallStatement::Pass(s) => s.span,
            SmallStatement::Break(s) => s.span,
            SmallStatement::Continue(s) => s.span,
            SmallStatement::Del(s) => s.span,
            SmallStatement::Import(s) => s.span,
            SmallStatement::ImportFrom(s) => s.span,
            SmallStatement::Global(s) => s.span,
            SmallStatement::Nonlocal(s) => s.span,
            SmallStatement::Assert(s) => s.span,
            SmallStatement::Raise(s) => s.span,
            SmallStatement::Print(s) => s.span,
            SmallStatement::Exec(s) => s.span,
            SmallStatement::Error(s) => s.span,
        }
    }
}

/// The compound (suite-carrying) statements.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum CompoundStatement {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    If(IfStatement),
    While(WhileStatement),
    For(ForStatement),
    With(WithStatement),
    Try(TryStatement),
}

impl CompoundStatement {
    /// The byte span this statement covers.
    pub fn span(&self) -> Span {
        match self {
            CompoundStatement::FunctionDef(s) => s.span,
            CompoundStatement::ClassDef(s) => s.span,
            CompoundStatement::If(s) => s.span,
            CompoundStatement::While(s) => s.span,
            CompoundStatement::For(s) => s.span,
            CompoundStatement::With(s) => s.span,
            CompoundStatement::Try(s) => s.span,
        }
    }
}

// ============================================================================
// Suites
// ============================================================================

/// The body of a compound statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Suite {
    /// `:\n <indented statements>`
    Block {
        newline: Atom,
        indent: Atom,
        body: Vec<Statement>,
        dedent: Atom,
    },
    /// `: stmt; stmt` on the header line.
    Inline {
        parts: Vec<SmallStatementPart>,
        newline: Atom,
    },
}

impl Suite {
    /// Iterate the statements of the suite. Inline suites are exposed as
    /// a single synthesized simple line is *not* done here; callers that
    /// need statement granularity match on the variant.
    pub fn is_empty(&self) -> bool {
        match self {
            Suite::Block { body, .. } => body.is_empty(),
            Suite::Inline { parts, .. } => parts.is_empty(),
        }
    }
}

// ============================================================================
// Small statements
// ============================================================================

/// An expression evaluated for effect.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub value: Expression,
}

/// One `target =` link of a (possibly chained) assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub target: Expression,
    pub eq: Atom,
}

/// `a = b = value`
#[derive(Debug, Clone, PartialEq)]
pub struct AssignStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub targets: Vec<AssignTarget>,
    pub value: Expression,
}

/// `target op= value`
#[derive(Debug, Clone, PartialEq)]
pub struct AugAssignStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub target: Expression,
    pub op: Atom,
    pub value: Expression,
}

/// `target: annotation [= value]` (3.6+)
#[derive(Debug, Clone, PartialEq)]
pub struct AnnAssignStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub target: Expression,
    pub colon: Atom,
    pub annotation: Expression,
    pub value: Option<(Atom, Expression)>,
}

/// `return [value]`
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub return_tok: Atom,
    pub value: Option<Expression>,
}

/// `pass`
#[derive(Debug, Clone, PartialEq)]
pub struct PassStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

/// `break`
#[derive(Debug, Clone, PartialEq)]
pub struct BreakStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

/// `continue`
#[derive(Debug, Clone, PartialEq)]
pub struct ContinueStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

/// `del target, ...`
#[derive(Debug, Clone, PartialEq)]
pub struct DelStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub del_tok: Atom,
    pub targets: Vec<(Expression, Option<Atom>)>,
}

/// A dotted module path with its interleaved dots.
#[derive(Debug, Clone, PartialEq)]
pub struct DottedName {
    pub parts: Vec<DottedPart>,
}

/// One identifier of a dotted path, with the dot that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct DottedPart {
    pub name: Atom,
    pub dot: Option<Atom>,
}

impl DottedName {
    /// The canonical dotted string, trivia stripped.
    pub fn dotted(&self) -> String {
        let mut out = String::new();
        for (idx, part) in self.parts.iter().enumerate() {
            if idx > 0 {
                out.push('.');
            }
            out.push_str(&part.name.text);
        }
        out
    }

    /// The first identifier of the path.
    pub fn head(&self) -> &str {
        self.parts.first().map(|p| p.name.text.as_str()).unwrap_or("")
    }
}

/// `import a.b as c, d`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub import_tok: Atom,
    pub names: Vec<ImportAlias>,
}

/// One `a.b [as c]` clause of an import statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias {
    pub node_id: NodeId,
    pub span: Span,
    pub name: DottedName,
    pub as_name: Option<(Atom, Name)>,
    pub comma: Option<Atom>,
}

impl ImportAlias {
    /// The name bound in the importing scope: the alias, or for plain
    /// `import a.b` the head `a`.
    pub fn bound_name(&self) -> &str {
        match &self.as_name {
            Some((_, name)) => name.value(),
            None => self.name.head(),
        }
    }
}

/// The imported-name list of a `from` import: `*` or aliases.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportNames {
    Star(Atom),
    Aliases(Vec<FromImportAlias>),
}

/// One `name [as alias]` clause of a `from` import.
#[derive(Debug, Clone, PartialEq)]
pub struct FromImportAlias {
    pub node_id: NodeId,
    pub span: Span,
    pub name: Atom,
    pub as_name: Option<(Atom, Name)>,
    pub comma: Option<Atom>,
}

impl FromImportAlias {
    /// The name bound in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.as_name {
            Some((_, name)) => name.value(),
            None => &self.name.text,
        }
    }
}

/// `from [.]* module import names`
#[derive(Debug, Clone, PartialEq)]
pub struct ImportFromStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub from_tok: Atom,
    /// Leading dots of a relative import. `...` tokens count as three.
    pub dots: Vec<Atom>,
    pub module: Option<DottedName>,
    pub import_tok: Atom,
    pub lpar: Option<Atom>,
    pub names: ImportNames,
    pub rpar: Option<Atom>,
}

impl ImportFromStatement {
    /// The relative-import level: number of leading dots.
    pub fn level(&self) -> usize {
        self.dots.iter().map(|d| d.text.len()).sum()
    }
}

/// `global a, b`
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub global_tok: Atom,
    pub names: Vec<(Name, Option<Atom>)>,
}

/// `nonlocal a, b` (3.x)
#[derive(Debug, Clone, PartialEq)]
pub struct NonlocalStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub nonlocal_tok: Atom,
    pub names: Vec<(Name, Option<Atom>)>,
}

/// `assert test [, msg]`
#[derive(Debug, Clone, PartialEq)]
pub struct AssertStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub assert_tok: Atom,
    pub test: Expression,
    pub msg: Option<(Atom, Expression)>,
}

/// `raise [exc [from cause]]`, or the 2.x `raise E, v[, tb]` form.
#[derive(Debug, Clone, PartialEq)]
pub struct RaiseStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub raise_tok: Atom,
    pub exc: Option<Expression>,
    /// 3.x `from cause`.
    pub from_part: Option<(Atom, Expression)>,
    /// 2.x comma-separated value and traceback.
    pub comma_parts: Vec<(Atom, Expression)>,
}

/// The 2.x `print` statement, including `print >> file, args`.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub print_tok: Atom,
    /// `>> file` redirection with its optional following comma.
    pub chevron: Option<(Atom, Expression, Option<Atom>)>,
    pub args: Vec<(Expression, Option<Atom>)>,
}

/// The 2.x `exec` statement: `exec body [in globals [, locals]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub exec_tok: Atom,
    pub body: Expression,
    pub in_part: Option<ExecIn>,
}

/// The `in globals [, locals]` tail of an exec statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecIn {
    pub in_tok: Atom,
    pub globals: Expression,
    pub locals: Option<(Atom, Expression)>,
}

/// A statement region the parser could not make sense of. Raw tokens are
/// preserved verbatim; downstream analysis skips these.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub tokens: Vec<Atom>,
    pub newline: Option<Atom>,
}

// ============================================================================
// Compound statements
// ============================================================================

/// `@expression` before a def or class.
#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub node_id: NodeId,
    pub span: Span,
    pub at: Atom,
    pub expression: Expression,
    pub newline: Atom,
}

/// `def name(params) [-> returns]: body`, possibly async.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub node_id: NodeId,
    pub span: Span,
    pub decorators: Vec<Decorator>,
    pub async_tok: Option<Atom>,
    pub def_tok: Atom,
    pub name: Name,
    pub lpar: Atom,
    pub params: Parameters,
    pub rpar: Atom,
    pub returns: Option<(Atom, Expression)>,
    pub colon: Atom,
    pub body: Suite,
}

impl FunctionDef {
    /// Whether this is an `async def`.
    pub fn is_async(&self) -> bool {
        self.async_tok.is_some()
    }
}

/// The parenthesized base/keyword list of a class definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassArguments {
    pub lpar: Atom,
    pub args: Vec<CallArg>,
    pub rpar: Atom,
}

/// `class name(bases): body`
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub node_id: NodeId,
    pub span: Span,
    pub decorators: Vec<Decorator>,
    pub class_tok: Atom,
    pub name: Name,
    pub arguments: Option<ClassArguments>,
    pub colon: Atom,
    pub body: Suite,
}

/// `elif test: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ElifClause {
    pub elif_tok: Atom,
    pub test: Expression,
    pub colon: Atom,
    pub body: Suite,
}

/// `else: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ElseClause {
    pub else_tok: Atom,
    pub colon: Atom,
    pub body: Suite,
}

/// `if test: body [elif ...]* [else ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub if_tok: Atom,
    pub test: Expression,
    pub colon: Atom,
    pub body: Suite,
    pub elifs: Vec<ElifClause>,
    pub orelse: Option<ElseClause>,
}

/// `while test: body [else ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub while_tok: Atom,
    pub test: Expression,
    pub colon: Atom,
    pub body: Suite,
    pub orelse: Option<ElseClause>,
}

/// `for target in iter: body [else ...]`, possibly async.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub async_tok: Option<Atom>,
    pub for_tok: Atom,
    pub target: Expression,
    pub in_tok: Atom,
    pub iter: Expression,
    pub colon: Atom,
    pub body: Suite,
    pub orelse: Option<ElseClause>,
}

/// One `context [as target]` item of a with statement.
#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expression,
    pub as_part: Option<(Atom, Expression)>,
    pub comma: Option<Atom>,
}

/// `with items: body`, possibly async.
#[derive(Debug, Clone, PartialEq)]
pub struct WithStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub async_tok: Option<Atom>,
    pub with_tok: Atom,
    pub items: Vec<WithItem>,
    pub colon: Atom,
    pub body: Suite,
}

/// The exception binding of an except clause: `as name` (or `, name` on
/// 2.x).
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptBinding {
    /// The `as` keyword, or on 2.x possibly a comma.
    pub sep: Atom,
    pub name: Name,
}

/// `except [type [as name]]: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub node_id: NodeId,
    pub span: Span,
    pub except_tok: Atom,
    pub exc_type: Option<Expression>,
    pub binding: Option<ExceptBinding>,
    pub colon: Atom,
    pub body: Suite,
}

/// `finally: body`
#[derive(Debug, Clone, PartialEq)]
pub struct FinallyClause {
    pub finally_tok: Atom,
    pub colon: Atom,
    pub body: Suite,
}

/// `try: body [except ...]* [else ...] [finally ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    pub node_id: NodeId,
    pub span: Span,
    pub try_tok: Atom,
    pub colon: Atom,
    pub body: Suite,
    pub handlers: Vec<ExceptHandler>,
    pub orelse: Option<ElseClause>,
    pub finally: Option<FinallyClause>,
}

// ============================================================================
// Module
// ============================================================================

/// A parsed module: the top-level statement list plus the end-of-file
/// atom carrying any trailing trivia.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub node_id: NodeId,
    pub span: Span,
    pub body: Vec<Statement>,
    /// Zero-width end marker; its `leading` holds trailing trivia.
    pub eof: Atom,
}
