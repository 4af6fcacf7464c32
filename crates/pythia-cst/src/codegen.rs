//! Code generation: re-emitting a CST verbatim.
//!
//! Every node emits its atoms in source order; since atoms partition the
//! input (each carries its leading trivia plus verbatim text), emitting a
//! freshly parsed module reproduces the source byte-for-byte. The
//! formatter edits trivia in place and then reuses this same emitter.

use crate::nodes::*;

/// Accumulates emitted source text.
#[derive(Debug, Default)]
pub struct CodegenState {
    buf: String,
}

impl CodegenState {
    /// Emit one atom: leading trivia, then token text.
    pub fn atom(&mut self, atom: &Atom) {
        self.buf.push_str(&atom.leading);
        self.buf.push_str(&atom.text);
    }

    /// The emitted text.
    pub fn into_string(self) -> String {
        self.buf
    }
}

impl std::fmt::Display for CodegenState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.buf)
    }
}

/// Nodes that can re-emit themselves.
pub trait Codegen {
    /// Append this node's verbatim text to `state`.
    fn codegen(&self, state: &mut CodegenState);
}

impl<T: Codegen> Codegen for Box<T> {
    fn codegen(&self, state: &mut CodegenState) {
        (**self).codegen(state);
    }
}

impl<T: Codegen> Codegen for Option<T> {
    fn codegen(&self, state: &mut CodegenState) {
        if let Some(node) = self {
            node.codegen(state);
        }
    }
}

impl<T: Codegen> Codegen for Vec<T> {
    fn codegen(&self, state: &mut CodegenState) {
        for node in self {
            node.codegen(state);
        }
    }
}

impl Codegen for Atom {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(self);
    }
}

// ============================================================================
// Module and statements
// ============================================================================

impl Codegen for Module {
    fn codegen(&self, state: &mut CodegenState) {
        self.body.codegen(state);
        state.atom(&self.eof);
    }
}

impl Codegen for Statement {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            Statement::Simple(s) => s.codegen(state),
            Statement::Compound(c) => c.codegen(state),
        }
    }
}

impl Codegen for SimpleStatementLine {
    fn codegen(&self, state: &mut CodegenState) {
        self.parts.codegen(state);
        state.atom(&self.newline);
    }
}

impl Codegen for SmallStatementPart {
    fn codegen(&self, state: &mut CodegenState) {
        self.statement.codegen(state);
        self.semicolon.codegen(state);
    }
}

impl Codegen for SmallStatement {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            SmallStatement::Expr(s) => s.value.codegen(state),
            SmallStatement::Assign(s) => s.codegen(state),
            SmallStatement::AugAssign(s) => s.codegen(state),
            SmallStatement::AnnAssign(s) => s.codegen(state),
            SmallStatement::Return(s) => s.codegen(state),
            SmallStatement::Pass(s) => state.atom(&s.tok),
            SmallStatement::Break(s) => state.atom(&s.tok),
            SmallStatement::Continue(s) => state.atom(&s.tok),
            SmallStatement::Del(s) => s.codegen(state),
            SmallStatement::Import(s) => s.codegen(state),
            SmallStatement::ImportFrom(s) => s.codegen(state),
            SmallStatement::Global(s) => s.codegen(state),
            SmallStatement::Nonlocal(s) => s.codegen(state),
            SmallStatement::Assert(s) => s.codegen(state),
            SmallStatement::Raise(s) => s.codegen(state),
            SmallStatement::Print(s) => s.codegen(state),
            SmallStatement::Exec(s) => s.codegen(state),
            SmallStatement::Error(s) => s.codegen(state),
        }
    }
}

impl Codegen for AssignStatement {
    fn codegen(&self, state: &mut CodegenState) {
        for target in &self.targets {
            target.target.codegen(state);
            state.atom(&target.eq);
        }
        self.value.codegen(state);
    }
}

impl Codegen for AugAssignStatement {
    fn codegen(&self, state: &mut CodegenState) {
        self.target.codegen(state);
        state.atom(&self.op);
        self.value.codegen(state);
    }
}

impl Codegen for AnnAssignStatement {
    fn codegen(&self, state: &mut CodegenState) {
        self.target.codegen(state);
        state.atom(&self.colon);
        self.annotation.codegen(state);
        if let Some((eq, value)) = &self.value {
            state.atom(eq);
            value.codegen(state);
        }
    }
}

impl Codegen for ReturnStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.return_tok);
        self.value.codegen(state);
    }
}

impl Codegen for DelStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.del_tok);
        for (target, comma) in &self.targets {
            target.codegen(state);
            comma.codegen(state);
        }
    }
}

impl Codegen for DottedName {
    fn codegen(&self, state: &mut CodegenState) {
        for part in &self.parts {
            state.atom(&part.name);
            part.dot.codegen(state);
        }
    }
}

impl Codegen for ImportStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.import_tok);
        self.names.codegen(state);
    }
}

impl Codegen for ImportAlias {
    fn codegen(&self, state: &mut CodegenState) {
        self.name.codegen(state);
        if let Some((as_tok, name)) = &self.as_name {
            state.atom(as_tok);
            name.codegen(state);
        }
        self.comma.codegen(state);
    }
}

impl Codegen for ImportFromStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.from_tok);
        self.dots.codegen(state);
        self.module.codegen(state);
        state.atom(&self.import_tok);
        self.lpar.codegen(state);
        match &self.names {
            ImportNames::Star(star) => state.atom(star),
            ImportNames::Aliases(aliases) => aliases.codegen(state),
        }
        self.rpar.codegen(state);
    }
}

impl Codegen for FromImportAlias {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.name);
        if let Some((as_tok, name)) = &self.as_name {
            state.atom(as_tok);
            name.codegen(state);
        }
        self.comma.codegen(state);
    }
}

impl Codegen for GlobalStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.global_tok);
        for (name, comma) in &self.names {
            name.codegen(state);
            comma.codegen(state);
        }
    }
}

impl Codegen for NonlocalStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.nonlocal_tok);
        for (name, comma) in &self.names {
            name.codegen(state);
            comma.codegen(state);
        }
    }
}

impl Codegen for AssertStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.assert_tok);
        self.test.codegen(state);
        if let Some((comma, msg)) = &self.msg {
            state.atom(comma);
            msg.codegen(state);
        }
    }
}

impl Codegen for RaiseStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.raise_tok);
        self.exc.codegen(state);
        if let Some((from_tok, cause)) = &self.from_part {
            state.atom(from_tok);
            cause.codegen(state);
        }
        for (comma, value) in &self.comma_parts {
            state.atom(comma);
            value.codegen(state);
        }
    }
}

impl Codegen for PrintStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.print_tok);
        if let Some((chevron, file, comma)) = &self.chevron {
            state.atom(chevron);
            file.codegen(state);
            comma.codegen(state);
        }
        for (value, comma) in &self.args {
            value.codegen(state);
            comma.codegen(state);
        }
    }
}

impl Codegen for ExecStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.exec_tok);
        self.body.codegen(state);
        if let Some(in_part) = &self.in_part {
            state.atom(&in_part.in_tok);
            in_part.globals.codegen(state);
            if let Some((comma, locals)) = &in_part.locals {
                state.atom(comma);
                locals.codegen(state);
            }
        }
    }
}

impl Codegen for ErrorStatement {
    fn codegen(&self, state: &mut CodegenState) {
        self.tokens.codegen(state);
        self.newline.codegen(state);
    }
}

// ============================================================================
// Compound statements
// ============================================================================

impl Codegen for CompoundStatement {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            CompoundStatement::FunctionDef(s) => s.codegen(state),
            CompoundStatement::ClassDef(s) => s.codegen(state),
            CompoundStatement::If(s) => s.codegen(state),
            CompoundStatement::While(s) => s.codegen(state),
            CompoundStatement::For(s) => s.codegen(state),
            CompoundStatement::With(s) => s.codegen(state),
            CompoundStatement::Try(s) => s.codegen(state),
        }
    }
}

impl Codegen for Suite {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            Suite::Block {
                newline,
                indent,
                body,
                dedent,
            } => {
                state.atom(newline);
                state.atom(indent);
                body.codegen(state);
                state.atom(dedent);
            }
            Suite::Inline { parts, newline } => {
                parts.codegen(state);
                state.atom(newline);
            }
        }
    }
}

impl Codegen for Decorator {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.at);
        self.expression.codegen(state);
        state.atom(&self.newline);
    }
}

impl Codegen for FunctionDef {
    fn codegen(&self, state: &mut CodegenState) {
        self.decorators.codegen(state);
        self.async_tok.codegen(state);
        state.atom(&self.def_tok);
        self.name.codegen(state);
        state.atom(&self.lpar);
        self.params.codegen(state);
        state.atom(&self.rpar);
        if let Some((arrow, returns)) = &self.returns {
            state.atom(arrow);
            returns.codegen(state);
        }
        state.atom(&self.colon);
        self.body.codegen(state);
    }
}

impl Codegen for ClassDef {
    fn codegen(&self, state: &mut CodegenState) {
        self.decorators.codegen(state);
        state.atom(&self.class_tok);
        self.name.codegen(state);
        if let Some(arguments) = &self.arguments {
            state.atom(&arguments.lpar);
            arguments.args.codegen(state);
            state.atom(&arguments.rpar);
        }
        state.atom(&self.colon);
        self.body.codegen(state);
    }
}

impl Codegen for ElifClause {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.elif_tok);
        self.test.codegen(state);
        state.atom(&self.colon);
        self.body.codegen(state);
    }
}

impl Codegen for ElseClause {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.else_tok);
        state.atom(&self.colon);
        self.body.codegen(state);
    }
}

impl Codegen for IfStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.if_tok);
        self.test.codegen(state);
        state.atom(&self.colon);
        self.body.codegen(state);
        self.elifs.codegen(state);
        self.orelse.codegen(state);
    }
}

impl Codegen for WhileStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.while_tok);
        self.test.codegen(state);
        state.atom(&self.colon);
        self.body.codegen(state);
        self.orelse.codegen(state);
    }
}

impl Codegen for ForStatement {
    fn codegen(&self, state: &mut CodegenState) {
        self.async_tok.codegen(state);
        state.atom(&self.for_tok);
        self.target.codegen(state);
        state.atom(&self.in_tok);
        self.iter.codegen(state);
        state.atom(&self.colon);
        self.body.codegen(state);
        self.orelse.codegen(state);
    }
}

impl Codegen for WithStatement {
    fn codegen(&self, state: &mut CodegenState) {
        self.async_tok.codegen(state);
        state.atom(&self.with_tok);
        for item in &self.items {
            item.context.codegen(state);
            if let Some((as_tok, target)) = &item.as_part {
                state.atom(as_tok);
                target.codegen(state);
            }
            item.comma.codegen(state);
        }
        state.atom(&self.colon);
        self.body.codegen(state);
    }
}

impl Codegen for ExceptHandler {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.except_tok);
        self.exc_type.codegen(state);
        if let Some(binding) = &self.binding {
            state.atom(&binding.sep);
            binding.name.codegen(state);
        }
        state.atom(&self.colon);
        self.body.codegen(state);
    }
}

impl Codegen for TryStatement {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.try_tok);
        state.atom(&self.colon);
        self.body.codegen(state);
        self.handlers.codegen(state);
        self.orelse.codegen(state);
        if let Some(finally) = &self.finally {
            state.atom(&finally.finally_tok);
            state.atom(&finally.colon);
            finally.body.codegen(state);
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

impl Codegen for Expression {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            Expression::Name(n) => n.codegen(state),
            Expression::Integer(n) => state.atom(&n.tok),
            Expression::Float(n) => state.atom(&n.tok),
            Expression::Imaginary(n) => state.atom(&n.tok),
            Expression::Str(n) => state.atom(&n.tok),
            Expression::Concatenated(n) => {
                for part in &n.parts {
                    state.atom(&part.tok);
                }
            }
            Expression::Ellipsis(n) => state.atom(&n.tok),
            Expression::Tuple(n) => n.elements.codegen(state),
            Expression::List(n) => {
                state.atom(&n.lbracket);
                n.elements.codegen(state);
                state.atom(&n.rbracket);
            }
            Expression::Set(n) => {
                state.atom(&n.lbrace);
                n.elements.codegen(state);
                state.atom(&n.rbrace);
            }
            Expression::Dict(n) => {
                state.atom(&n.lbrace);
                n.elements.codegen(state);
                state.atom(&n.rbrace);
            }
            Expression::ListComp(n) => {
                state.atom(&n.lbracket);
                n.element.codegen(state);
                n.comp.codegen(state);
                state.atom(&n.rbracket);
            }
            Expression::SetComp(n) => {
                state.atom(&n.lbrace);
                n.element.codegen(state);
                n.comp.codegen(state);
                state.atom(&n.rbrace);
            }
            Expression::DictComp(n) => {
                state.atom(&n.lbrace);
                n.key.codegen(state);
                state.atom(&n.colon);
                n.value.codegen(state);
                n.comp.codegen(state);
                state.atom(&n.rbrace);
            }
            Expression::Generator(n) => {
                n.lpar.codegen(state);
                n.element.codegen(state);
                n.comp.codegen(state);
                n.rpar.codegen(state);
            }
            Expression::Call(n) => {
                n.func.codegen(state);
                state.atom(&n.lpar);
                n.args.codegen(state);
                state.atom(&n.rpar);
            }
            Expression::Attribute(n) => {
                n.value.codegen(state);
                state.atom(&n.dot);
                n.attr.codegen(state);
            }
            Expression::Subscript(n) => {
                n.value.codegen(state);
                state.atom(&n.lbracket);
                n.elements.codegen(state);
                state.atom(&n.rbracket);
            }
            Expression::Binary(n) => {
                n.left.codegen(state);
                state.atom(&n.op);
                n.right.codegen(state);
            }
            Expression::Unary(n) => {
                state.atom(&n.op);
                n.operand.codegen(state);
            }
            Expression::Boolean(n) => {
                n.left.codegen(state);
                state.atom(&n.op);
                n.right.codegen(state);
            }
            Expression::Compare(n) => {
                n.left.codegen(state);
                for part in &n.comparisons {
                    state.atom(&part.op.first);
                    part.op.second.codegen(state);
                    part.right.codegen(state);
                }
            }
            Expression::Conditional(n) => {
                n.body.codegen(state);
                state.atom(&n.if_tok);
                n.test.codegen(state);
                state.atom(&n.else_tok);
                n.orelse.codegen(state);
            }
            Expression::Lambda(n) => {
                state.atom(&n.lambda_tok);
                n.params.codegen(state);
                state.atom(&n.colon);
                n.body.codegen(state);
            }
            Expression::Yield(n) => {
                state.atom(&n.yield_tok);
                n.from_tok.codegen(state);
                n.value.codegen(state);
            }
            Expression::Await(n) => {
                state.atom(&n.await_tok);
                n.value.codegen(state);
            }
            Expression::Starred(n) => {
                state.atom(&n.star);
                n.value.codegen(state);
            }
            Expression::Repr(n) => {
                state.atom(&n.lbacktick);
                n.value.codegen(state);
                state.atom(&n.rbacktick);
            }
            Expression::Parenthesized(n) => {
                state.atom(&n.lpar);
                n.value.codegen(state);
                state.atom(&n.rpar);
            }
            Expression::Error(n) => n.tokens.codegen(state),
        }
    }
}

impl Codegen for Name {
    fn codegen(&self, state: &mut CodegenState) {
        state.atom(&self.tok);
    }
}

impl Codegen for Element {
    fn codegen(&self, state: &mut CodegenState) {
        self.value.codegen(state);
        self.comma.codegen(state);
    }
}

impl Codegen for DictElement {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            DictElement::Pair {
                key,
                colon,
                value,
                comma,
            } => {
                key.codegen(state);
                state.atom(colon);
                value.codegen(state);
                comma.codegen(state);
            }
            DictElement::Unpack { star, value, comma } => {
                state.atom(star);
                value.codegen(state);
                comma.codegen(state);
            }
        }
    }
}

impl Codegen for CompFor {
    fn codegen(&self, state: &mut CodegenState) {
        self.async_tok.codegen(state);
        state.atom(&self.for_tok);
        self.target.codegen(state);
        state.atom(&self.in_tok);
        self.iter.codegen(state);
        for comp_if in &self.ifs {
            state.atom(&comp_if.if_tok);
            comp_if.test.codegen(state);
        }
        if let Some(inner) = &self.inner {
            inner.codegen(state);
        }
    }
}

impl Codegen for CallArg {
    fn codegen(&self, state: &mut CodegenState) {
        self.star.codegen(state);
        if let Some((name, eq)) = &self.keyword {
            state.atom(name);
            state.atom(eq);
        }
        self.value.codegen(state);
        self.comma.codegen(state);
    }
}

impl Codegen for SubscriptElement {
    fn codegen(&self, state: &mut CodegenState) {
        match &self.index {
            SubscriptIndex::Index(expr) => expr.codegen(state),
            SubscriptIndex::Slice(slice) => slice.codegen(state),
        }
        self.comma.codegen(state);
    }
}

impl Codegen for SliceExpr {
    fn codegen(&self, state: &mut CodegenState) {
        self.lower.codegen(state);
        state.atom(&self.colon);
        self.upper.codegen(state);
        if let Some((colon2, step)) = &self.step {
            state.atom(colon2);
            step.codegen(state);
        }
    }
}

impl Codegen for Parameters {
    fn codegen(&self, state: &mut CodegenState) {
        self.params.codegen(state);
    }
}

impl Codegen for ParamTarget {
    fn codegen(&self, state: &mut CodegenState) {
        match self {
            ParamTarget::Name(name) => name.codegen(state),
            ParamTarget::Tuple {
                lpar,
                elements,
                rpar,
            } => {
                state.atom(lpar);
                for (target, comma) in elements {
                    target.codegen(state);
                    comma.codegen(state);
                }
                state.atom(rpar);
            }
        }
    }
}

impl Codegen for Param {
    fn codegen(&self, state: &mut CodegenState) {
        self.star.codegen(state);
        self.target.codegen(state);
        if let Some((colon, annotation)) = &self.annotation {
            state.atom(colon);
            annotation.codegen(state);
        }
        if let Some((eq, default)) = &self.default {
            state.atom(eq);
            default.codegen(state);
        }
        self.comma.codegen(state);
    }
}
