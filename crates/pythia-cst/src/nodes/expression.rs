//! Expression nodes.

use pythia_core::span::Span;

use super::{Atom, NodeId};
use crate::tokenizer::StringPrefix;

/// Any Python expression.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Name(Name),
    Integer(IntegerLiteral),
    Float(FloatLiteral),
    Imaginary(ImaginaryLiteral),
    Str(StringLiteral),
    Concatenated(ConcatenatedString),
    Ellipsis(EllipsisLiteral),
    Tuple(TupleExpr),
    List(ListExpr),
    Set(SetExpr),
    Dict(DictExpr),
    ListComp(Box<ListCompExpr>),
    SetComp(Box<SetCompExpr>),
    DictComp(Box<DictCompExpr>),
    Generator(Box<GeneratorExpr>),
    Call(Box<CallExpr>),
    Attribute(Box<AttributeExpr>),
    Subscript(Box<SubscriptExpr>),
    Binary(Box<BinaryExpr>),
    Unary(Box<UnaryExpr>),
    Boolean(Box<BooleanExpr>),
    Compare(Box<CompareExpr>),
    Conditional(Box<ConditionalExpr>),
    Lambda(Box<LambdaExpr>),
    Yield(Box<YieldExpr>),
    Await(Box<AwaitExpr>),
    Starred(Box<StarredExpr>),
    Repr(Box<ReprExpr>),
    Parenthesized(Box<ParenthesizedExpr>),
    Error(ErrorExpr),
}

impl Expression {
    /// The byte span this expression covers.
    pub fn span(&self) -> Span {
        match self {
            Expression::Name(n) => n.span,
            Expression::Integer(n) => n.span,
            Expression::Float(n) => n.span,
            Expression::Imaginary(n) => n.span,
            Expression::Str(n) => n.span,
            Expression::Concatenated(n) => n.span,
            Expression::Ellipsis(n) => n.span,
            Expression::Tuple(n) => n.span,
            Expression::List(n) => n.span,
            Expression::Set(n) => n.span,
            Expression::Dict(n) => n.span,
            Expression::ListComp(n) => n.span,
            Expression::SetComp(n) => n.span,
            Expression::DictComp(n) => n.span,
            Expression::Generator(n) => n.span,
            Expression::Call(n) => n.span,
            Expression::Attribute(n) => n.span,
            Expression::Subscript(n) => n.span,
            Expression::Binary(n) => n.span,
            Expression::Unary(n) => n.span,
            Expression::Boolean(n) => n.span,
            Expression::Compare(n) => n.span,
            Expression::Conditional(n) => n.span,
            Expression::Lambda(n) => n.span,
            Expression::Yield(n) => n.span,
            Expression::Await(n) => n.span,
            Expression::Starred(n) => n.span,
            Expression::Repr(n) => n.span,
            Expression::Parenthesized(n) => n.span,
            Expression::Error(n) => n.span,
        }
    }

    /// The node id.
    pub fn node_id(&self) -> NodeId {
        match self {
            Expression::Name(n) => n.node_id,
            Expression::Integer(n) => n.node_id,
            Expression::Float(n) => n.node_id,
            Expression::Imaginary(n) => n.node_id,
            Expression::Str(n) => n.node_id,
            Expression::Concatenated(n) => n.node_id,
            Expression::Ellipsis(n) => n.node_id,
            Expression::Tuple(n) => n.node_id,
            Expression::List(n) => n.node_id,
            Expression::Set(n) => n.node_id,
            Expression::Dict(n) => n.node_id,
            Expression::ListComp(n) => n.node_id,
            Expression::SetComp(n) => n.node_id,
            Expression::DictComp(n) => n.node_id,
            Expression::Generator(n) => n.node_id,
            Expression::Call(n) => n.node_id,
            Expression::Attribute(n) => n.node_id,
            Expression::Subscript(n) => n.node_id,
            Expression::Binary(n) => n.node_id,
            Expression::Unary(n) => n.node_id,
            Expression::Boolean(n) => n.node_id,
            Expression::Compare(n) => n.node_id,
            Expression::Conditional(n) => n.node_id,
            Expression::Lambda(n) => n.node_id,
            Expression::Yield(n) => n.node_id,
            Expression::Await(n) => n.node_id,
            Expression::Starred(n) => n.node_id,
            Expression::Repr(n) => n.node_id,
            Expression::Parenthesized(n) => n.node_id,
            Expression::Error(n) => n.node_id,
        }
    }

    /// Strip parentheses, returning the innermost expression.
    pub fn unparenthesized(&self) -> &Expression {
        match self {
            Expression::Parenthesized(p) => p.value.unparenthesized(),
            other => other,
        }
    }

    /// The name text when this is (possibly parenthesized) a plain name.
    pub fn as_name(&self) -> Option<&Name> {
        match self.unparenthesized() {
            Expression::Name(n) => Some(n),
            _ => None,
        }
    }
}

// ============================================================================
// Atoms and literals
// ============================================================================

/// An identifier.
///
/// `value()` answers the *resolved* identifier: inside a class body,
/// `__name`-style identifiers are mangled to `_Class__name` at parse time
/// while the verbatim token text is kept for round-tripping.
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub node_id: NodeId,
    pub span: Span,
    /// The verbatim identifier token.
    pub tok: Atom,
    /// Mangled form, present only inside class scopes for `__name`
    /// identifiers without trailing underscores.
    pub mangled: Option<String>,
}

impl Name {
    /// The identifier as written.
    pub fn as_written(&self) -> &str {
        &self.tok.text
    }

    /// The resolved identifier (mangled form when applicable).
    pub fn value(&self) -> &str {
        self.mangled.as_deref().unwrap_or(&self.tok.text)
    }
}

/// An integer literal.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegerLiteral {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

impl IntegerLiteral {
    /// Parse the literal value, tolerating radix prefixes, separators, and
    /// the 2.x `L` suffix. Values outside `i64` come back as `None`.
    pub fn value(&self) -> Option<i64> {
        let text = self.tok.text.replace('_', "");
        let text = text.trim_end_matches(['l', 'L']);
        if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok()
        } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
            i64::from_str_radix(oct, 8).ok()
        } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2).ok()
        } else {
            text.parse().ok()
        }
    }
}

/// A floating-point literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatLiteral {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

/// An imaginary literal (`3j`).
#[derive(Debug, Clone, PartialEq)]
pub struct ImaginaryLiteral {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

/// A single string literal token, f-strings included.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
    /// Raw/bytes/unicode/format prefix flags.
    pub prefix: StringPrefix,
}

impl StringLiteral {
    /// Whether this is an f-string.
    pub fn is_fstring(&self) -> bool {
        self.prefix.contains(StringPrefix::FORMAT)
    }

    /// Whether this is a bytes literal.
    pub fn is_bytes(&self) -> bool {
        self.prefix.contains(StringPrefix::BYTES)
    }

    /// The literal's content with prefix and quotes stripped and, for
    /// non-raw strings, common escapes processed.
    pub fn value(&self) -> String {
        let text = &self.tok.text;
        let body_start = text.find(['\'', '"']).unwrap_or(0);
        let body = &text[body_start..];
        let (open_len, close_len) = if body.starts_with("'''") || body.starts_with("\"\"\"") {
            (3, 3)
        } else {
            (1, 1)
        };
        let inner = &body[open_len.min(body.len())..body.len().saturating_sub(close_len)];
        if self.prefix.contains(StringPrefix::RAW) {
            return inner.to_string();
        }
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some('\n') => {}
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }
}

/// Adjacent string literals, implicitly concatenated.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatenatedString {
    pub node_id: NodeId,
    pub span: Span,
    pub parts: Vec<StringLiteral>,
}

/// The `...` literal.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipsisLiteral {
    pub node_id: NodeId,
    pub span: Span,
    pub tok: Atom,
}

// ============================================================================
// Displays
// ============================================================================

/// One element of a comma-separated expression list.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub value: Expression,
    pub comma: Option<Atom>,
}

/// A tuple display without its own brackets (`a, b`). Parenthesized
/// tuples appear as `Parenthesized(Tuple(..))`.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub elements: Vec<Element>,
}

/// A list display `[a, b]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbracket: Atom,
    pub elements: Vec<Element>,
    pub rbracket: Atom,
}

/// A set display `{a, b}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SetExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbrace: Atom,
    pub elements: Vec<Element>,
    pub rbrace: Atom,
}

/// One entry of a dict display.
#[derive(Debug, Clone, PartialEq)]
pub enum DictElement {
    /// `key: value`
    Pair {
        key: Expression,
        colon: Atom,
        value: Expression,
        comma: Option<Atom>,
    },
    /// `**mapping` (3.5+)
    Unpack {
        star: Atom,
        value: Expression,
        comma: Option<Atom>,
    },
}

/// A dict display `{k: v}`.
#[derive(Debug, Clone, PartialEq)]
pub struct DictExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbrace: Atom,
    pub elements: Vec<DictElement>,
    pub rbrace: Atom,
}

// ============================================================================
// Comprehensions
// ============================================================================

/// The `for target in iter [if cond]*` clause chain of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct CompFor {
    pub async_tok: Option<Atom>,
    pub for_tok: Atom,
    pub target: Expression,
    pub in_tok: Atom,
    pub iter: Expression,
    pub ifs: Vec<CompIf>,
    pub inner: Option<Box<CompFor>>,
}

/// An `if cond` filter inside a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct CompIf {
    pub if_tok: Atom,
    pub test: Expression,
}

/// `[elt for ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct ListCompExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbracket: Atom,
    pub element: Expression,
    pub comp: CompFor,
    pub rbracket: Atom,
}

/// `{elt for ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct SetCompExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbrace: Atom,
    pub element: Expression,
    pub comp: CompFor,
    pub rbrace: Atom,
}

/// `{k: v for ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct DictCompExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbrace: Atom,
    pub key: Expression,
    pub colon: Atom,
    pub value: Expression,
    pub comp: CompFor,
    pub rbrace: Atom,
}

/// `(elt for ...)`. Parens are absent when the generator is the sole
/// argument of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lpar: Option<Atom>,
    pub element: Expression,
    pub comp: CompFor,
    pub rpar: Option<Atom>,
}

// ============================================================================
// Compound expressions
// ============================================================================

/// One argument at a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    /// `*` or `**` for unpacking arguments.
    pub star: Option<Atom>,
    /// Keyword name and `=` for keyword arguments.
    pub keyword: Option<(Atom, Atom)>,
    pub value: Expression,
    pub comma: Option<Atom>,
}

impl CallArg {
    /// The keyword name, when this is a keyword argument.
    pub fn keyword_name(&self) -> Option<&str> {
        self.keyword.as_ref().map(|(name, _)| name.text.as_str())
    }

    /// Whether this is a plain positional argument.
    pub fn is_positional(&self) -> bool {
        self.star.is_none() && self.keyword.is_none()
    }
}

/// A call `f(a, b=c)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub func: Expression,
    pub lpar: Atom,
    pub args: Vec<CallArg>,
    pub rpar: Atom,
}

/// An attribute access `value.attr`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub value: Expression,
    pub dot: Atom,
    pub attr: Name,
}

/// One element between subscript brackets.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptElement {
    pub index: SubscriptIndex,
    pub comma: Option<Atom>,
}

/// Either a plain index or a slice.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptIndex {
    Index(Expression),
    Slice(SliceExpr),
}

/// `lower : upper [: step]`, any part optional.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceExpr {
    pub span: Span,
    pub lower: Option<Expression>,
    pub colon: Atom,
    pub upper: Option<Expression>,
    pub step: Option<(Atom, Option<Expression>)>,
}

/// A subscript `value[index]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub value: Expression,
    pub lbracket: Atom,
    pub elements: Vec<SubscriptElement>,
    pub rbracket: Atom,
}

/// A binary arithmetic/bitwise operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub left: Expression,
    pub op: Atom,
    pub right: Expression,
}

/// A unary operation (`-x`, `+x`, `~x`, `not x`).
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub op: Atom,
    pub operand: Expression,
}

/// `and` / `or`.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub left: Expression,
    pub op: Atom,
    pub right: Expression,
}

/// A comparison operator, one or two atoms (`is not`, `not in`).
#[derive(Debug, Clone, PartialEq)]
pub struct CompareOp {
    pub first: Atom,
    pub second: Option<Atom>,
}

impl CompareOp {
    /// Canonical operator text (`"is not"`, `"<"`, ...).
    pub fn as_str(&self) -> String {
        match &self.second {
            Some(second) => format!("{} {}", self.first.text, second.text),
            None => self.first.text.clone(),
        }
    }
}

/// One `op rhs` link of a comparison chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonPart {
    pub op: CompareOp,
    pub right: Expression,
}

/// A (possibly chained) comparison `a < b <= c`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub left: Expression,
    pub comparisons: Vec<ComparisonPart>,
}

/// A conditional expression `body if test else orelse`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub body: Expression,
    pub if_tok: Atom,
    pub test: Expression,
    pub else_tok: Atom,
    pub orelse: Expression,
}

/// A lambda expression.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lambda_tok: Atom,
    pub params: Parameters,
    pub colon: Atom,
    pub body: Expression,
}

/// `yield [value]` or `yield from value`.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub yield_tok: Atom,
    pub from_tok: Option<Atom>,
    pub value: Option<Expression>,
}

/// `await value` (3.5+).
#[derive(Debug, Clone, PartialEq)]
pub struct AwaitExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub await_tok: Atom,
    pub value: Expression,
}

/// `*value` in displays, calls, and unpacking targets.
#[derive(Debug, Clone, PartialEq)]
pub struct StarredExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub star: Atom,
    pub value: Expression,
}

/// A 2.x backtick repr expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lbacktick: Atom,
    pub value: Expression,
    pub rbacktick: Atom,
}

/// An explicitly parenthesized expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParenthesizedExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub lpar: Atom,
    pub value: Expression,
    pub rpar: Atom,
}

/// An expression region the parser could not make sense of. The raw
/// tokens are preserved verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorExpr {
    pub node_id: NodeId,
    pub span: Span,
    pub tokens: Vec<Atom>,
}

// ============================================================================
// Parameters
// ============================================================================

/// The parameter list of a `def` or `lambda`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub params: Vec<Param>,
}

impl Parameters {
    /// Positional/keyword parameter names in declaration order, skipping
    /// star markers and tuple targets.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().filter_map(|p| p.name())
    }
}

/// What a parameter binds: a plain name, or (2.x) a nested tuple target.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamTarget {
    Name(Name),
    /// 2.x tuple parameter `def f((a, b)):`.
    Tuple {
        lpar: Atom,
        elements: Vec<(ParamTarget, Option<Atom>)>,
        rpar: Atom,
    },
}

/// A single formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub node_id: NodeId,
    pub span: Span,
    /// `*` or `**`, when present. A bare `*` separator has no target.
    pub star: Option<Atom>,
    pub target: Option<ParamTarget>,
    /// `: annotation`
    pub annotation: Option<(Atom, Expression)>,
    /// `= default`
    pub default: Option<(Atom, Expression)>,
    pub comma: Option<Atom>,
}

impl Param {
    /// The bound name for plain-name parameters.
    pub fn name(&self) -> Option<&str> {
        match &self.target {
            Some(ParamTarget::Name(name)) => Some(name.value()),
            _ => None,
        }
    }

    /// Whether this is a `*args` catch-all.
    pub fn is_star_args(&self) -> bool {
        self.star.as_ref().is_some_and(|s| s.text == "*") && self.target.is_some()
    }

    /// Whether this is a `**kwargs` catch-all.
    pub fn is_kwargs(&self) -> bool {
        self.star.as_ref().is_some_and(|s| s.text == "**")
    }

    /// Whether this is the bare `*` keyword-only separator.
    pub fn is_star_separator(&self) -> bool {
        self.star.as_ref().is_some_and(|s| s.text == "*") && self.target.is_none()
    }
}
