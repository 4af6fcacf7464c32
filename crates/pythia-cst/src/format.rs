//! Whitespace formatting over the CST.
//!
//! The formatter rewrites the trivia slots a chosen option governs and
//! leaves every other byte alone. Each option is tri-valued: `Some(true)`
//! enforces the space, `Some(false)` removes it, `None` preserves the
//! input. Slots whose trivia spans a line break or carries a comment are
//! never rewritten by the spacing options; the structural options
//! (semicolon removal, statement and import splitting, comment wrapping)
//! handle multi-line concerns explicitly.

use serde::{Deserialize, Serialize};

use crate::nodes::*;

// ============================================================================
// Options
// ============================================================================

/// The formatting-option bundle. All spacing options default to
/// "preserve".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub space_around_default_equals: Option<bool>,
    pub space_before_function_paren: Option<bool>,
    pub space_within_empty_paren: Option<bool>,
    pub space_within_function_declaration_parens: Option<bool>,
    pub space_around_annotation_arrow: Option<bool>,
    pub space_before_class_paren: Option<bool>,
    pub space_within_empty_base_class_list: Option<bool>,
    pub space_within_class_declaration_parens: Option<bool>,
    pub space_before_call_paren: Option<bool>,
    pub space_within_empty_call_argument_list: Option<bool>,
    pub space_within_call_parens: Option<bool>,
    pub space_within_index_brackets: Option<bool>,
    pub space_before_index_bracket: Option<bool>,
    pub spaces_within_parens: Option<bool>,
    pub space_within_empty_tuple: Option<bool>,
    pub spaces_within_parenthesised_tuple: Option<bool>,
    pub spaces_within_empty_list: Option<bool>,
    pub spaces_within_list: Option<bool>,
    pub spaces_around_binary_operators: Option<bool>,
    pub spaces_around_assignment_operator: Option<bool>,
    pub replace_multiple_imports_with_multiple_statements: Option<bool>,
    pub remove_trailing_semicolons: Option<bool>,
    pub break_multiple_statements_per_line: Option<bool>,
    pub wrap_comments: Option<bool>,
    pub wrapping_width: Option<u32>,
}

impl FormatOptions {
    /// The comment-wrapping width, defaulting to 80 columns.
    pub fn width(&self) -> usize {
        self.wrapping_width.unwrap_or(80) as usize
    }
}

/// Apply `options` to a parsed module in place. Re-emit with
/// [`crate::Codegen`] to get the formatted source.
pub fn format_module(module: &mut Module, options: &FormatOptions) {
    let mut formatter = Formatter { options };
    formatter.walk_body(&mut module.body);
    if options.wrap_comments == Some(true) {
        wrap_comment_trivia_in_body(&mut module.body, options.width());
        wrap_comment_trivia(&mut module.eof.leading, options.width());
    }
}

// ============================================================================
// Trivia editing primitives
// ============================================================================

/// Whether a trivia run can be rewritten by a spacing option: plain
/// horizontal whitespace only.
fn is_simple_space(trivia: &str) -> bool {
    trivia.chars().all(|c| c == ' ' || c == '\t')
}

fn set_space(atom: &mut Atom, on: bool) {
    if is_simple_space(&atom.leading) {
        atom.leading = if on { " ".to_string() } else { String::new() };
    }
}

fn apply_space(atom: &mut Atom, option: Option<bool>) {
    if let Some(on) = option {
        set_space(atom, on);
    }
}

/// The indentation of a line, taken from the text after the last newline
/// of a leading-trivia run.
fn indent_of(leading: &str) -> String {
    let tail = match leading.rfind('\n') {
        Some(idx) => &leading[idx + 1..],
        None => leading,
    };
    tail.chars().take_while(|c| *c == ' ' || *c == '\t').collect()
}

// ============================================================================
// First-atom access
// ============================================================================

/// The first atom of an expression, for rewriting the space before it.
fn first_atom_mut(expr: &mut Expression) -> &mut Atom {
    match expr {
        Expression::Name(n) => &mut n.tok,
        Expression::Integer(n) => &mut n.tok,
        Expression::Float(n) => &mut n.tok,
        Expression::Imaginary(n) => &mut n.tok,
        Expression::Str(n) => &mut n.tok,
        Expression::Concatenated(n) => &mut n.parts[0].tok,
        Expression::Ellipsis(n) => &mut n.tok,
        Expression::Tuple(n) => first_atom_mut(&mut n.elements[0].value),
        Expression::List(n) => &mut n.lbracket,
        Expression::Set(n) => &mut n.lbrace,
        Expression::Dict(n) => &mut n.lbrace,
        Expression::ListComp(n) => &mut n.lbracket,
        Expression::SetComp(n) => &mut n.lbrace,
        Expression::DictComp(n) => &mut n.lbrace,
        Expression::Generator(n) => match &mut n.lpar {
            Some(lpar) => lpar,
            None => first_atom_mut(&mut n.element),
        },
        Expression::Call(n) => first_atom_mut(&mut n.func),
        Expression::Attribute(n) => first_atom_mut(&mut n.value),
        Expression::Subscript(n) => first_atom_mut(&mut n.value),
        Expression::Binary(n) => first_atom_mut(&mut n.left),
        Expression::Unary(n) => &mut n.op,
        Expression::Boolean(n) => first_atom_mut(&mut n.left),
        Expression::Compare(n) => first_atom_mut(&mut n.left),
        Expression::Conditional(n) => first_atom_mut(&mut n.body),
        Expression::Lambda(n) => &mut n.lambda_tok,
        Expression::Yield(n) => &mut n.yield_tok,
        Expression::Await(n) => &mut n.await_tok,
        Expression::Starred(n) => &mut n.star,
        Expression::Repr(n) => &mut n.lbacktick,
        Expression::Parenthesized(n) => &mut n.lpar,
        Expression::Error(n) => match n.tokens.first_mut() {
            Some(atom) => atom,
            None => unreachable!("error expression with no tokens"),
        },
    }
}

/// The first atom of a small statement, for indentation rewrites when
/// lines are split.
fn first_atom_mut_small(statement: &mut SmallStatement) -> &mut Atom {
    match statement {
        SmallStatement::Expr(s) => first_atom_mut(&mut s.value),
        SmallStatement::Assign(s) => match s.targets.first_mut() {
            Some(target) => first_atom_mut(&mut target.target),
            None => first_atom_mut(&mut s.value),
        },
        SmallStatement::AugAssign(s) => first_atom_mut(&mut s.target),
        SmallStatement::AnnAssign(s) => first_atom_mut(&mut s.target),
        SmallStatement::Return(s) => &mut s.return_tok,
        SmallStatement::Pass(s) => &mut s.tok,
        SmallStatement::Break(s) => &mut s.tok,
        SmallStatement::Continue(s) => &mut s.tok,
        SmallStatement::Del(s) => &mut s.del_tok,
        SmallStatement::Import(s) => &mut s.import_tok,
        SmallStatement::ImportFrom(s) => &mut s.from_tok,
        SmallStatement::Global(s) => &mut s.global_tok,
        SmallStatement::Nonlocal(s) => &mut s.nonlocal_tok,
        SmallStatement::Assert(s) => &mut s.assert_tok,
        SmallStatement::Raise(s) => &mut s.raise_tok,
        SmallStatement::Print(s) => &mut s.print_tok,
        SmallStatement::Exec(s) => &mut s.exec_tok,
        SmallStatement::Error(s) => match s.tokens.first_mut() {
            Some(atom) => atom,
            None => unreachable!("error statement with no tokens"),
        },
    }
}

// ============================================================================
// The formatter walk
// ============================================================================

struct Formatter<'opts> {
    options: &'opts FormatOptions,
}

impl Formatter<'_> {
    fn walk_body(&mut self, body: &mut Vec<Statement>) {
        for statement in body.iter_mut() {
            self.walk_statement(statement);
        }
        if self.options.break_multiple_statements_per_line == Some(true) {
            break_statement_lines(body);
        }
        if self.options.replace_multiple_imports_with_multiple_statements == Some(true) {
            split_multi_imports(body);
        }
    }

    fn walk_statement(&mut self, statement: &mut Statement) {
        match statement {
            Statement::Simple(line) => {
                for part in line.parts.iter_mut() {
                    self.walk_small(&mut part.statement);
                }
                if self.options.remove_trailing_semicolons == Some(true) {
                    if let Some(last) = line.parts.last_mut() {
                        if let Some(semi) = last.semicolon.take() {
                            if !is_simple_space(&semi.leading) {
                                // Keep any comment that sat before the
                                // semicolon.
                                line.newline.leading.insert_str(0, &semi.leading);
                            }
                        }
                    }
                }
            }
            Statement::Compound(compound) => self.walk_compound(compound),
        }
    }

    fn walk_small(&mut self, statement: &mut SmallStatement) {
        match statement {
            SmallStatement::Expr(s) => self.walk_expression(&mut s.value),
            SmallStatement::Assign(s) => {
                for target in s.targets.iter_mut() {
                    self.walk_expression(&mut target.target);
                    apply_space(&mut target.eq, self.options.spaces_around_assignment_operator);
                }
                if s.targets.last().is_some() {
                    apply_space(
                        first_atom_mut(&mut s.value),
                        self.options.spaces_around_assignment_operator,
                    );
                }
                self.walk_expression(&mut s.value);
            }
            SmallStatement::AugAssign(s) => {
                self.walk_expression(&mut s.target);
                apply_space(&mut s.op, self.options.spaces_around_assignment_operator);
                apply_space(
                    first_atom_mut(&mut s.value),
                    self.options.spaces_around_assignment_operator,
                );
                self.walk_expression(&mut s.value);
            }
            SmallStatement::AnnAssign(s) => {
                self.walk_expression(&mut s.target);
                self.walk_expression(&mut s.annotation);
                if let Some((eq, value)) = &mut s.value {
                    apply_space(eq, self.options.spaces_around_assignment_operator);
                    apply_space(
                        first_atom_mut(value),
                        self.options.spaces_around_assignment_operator,
                    );
                    self.walk_expression(value);
                }
            }
            SmallStatement::Return(s) => {
                if let Some(value) = &mut s.value {
                    self.walk_expression(value);
                }
            }
            SmallStatement::Del(s) => {
                for (target, _) in s.targets.iter_mut() {
                    self.walk_expression(target);
                }
            }
            SmallStatement::Assert(s) => {
                self.walk_expression(&mut s.test);
                if let Some((_, msg)) = &mut s.msg {
                    self.walk_expression(msg);
                }
            }
            SmallStatement::Raise(s) => {
                if let Some(exc) = &mut s.exc {
                    self.walk_expression(exc);
                }
                if let Some((_, cause)) = &mut s.from_part {
                    self.walk_expression(cause);
                }
                for (_, value) in s.comma_parts.iter_mut() {
                    self.walk_expression(value);
                }
            }
            SmallStatement::Print(s) => {
                if let Some((_, file, _)) = &mut s.chevron {
                    self.walk_expression(file);
                }
                for (value, _) in s.args.iter_mut() {
                    self.walk_expression(value);
                }
            }
            SmallStatement::Exec(s) => {
                self.walk_expression(&mut s.body);
                if let Some(in_part) = &mut s.in_part {
                    self.walk_expression(&mut in_part.globals);
                    if let Some((_, locals)) = &mut in_part.locals {
                        self.walk_expression(locals);
                    }
                }
            }
            SmallStatement::Pass(_)
            | SmallStatement::Break(_)
            | SmallStatement::Continue(_)
            | SmallStatement::Import(_)
            | SmallStatement::ImportFrom(_)
            | SmallStatement::Global(_)
            | SmallStatement::Nonlocal(_)
            | SmallStatement::Error(_) => {}
        }
    }

    fn walk_compound(&mut self, compound: &mut CompoundStatement) {
        match compound {
            CompoundStatement::FunctionDef(def) => self.walk_function_def(def),
            CompoundStatement::ClassDef(def) => self.walk_class_def(def),
            CompoundStatement::If(s) => {
                self.walk_expression(&mut s.test);
                self.walk_suite(&mut s.body);
                for elif in s.elifs.iter_mut() {
                    self.walk_expression(&mut elif.test);
                    self.walk_suite(&mut elif.body);
                }
                if let Some(orelse) = &mut s.orelse {
                    self.walk_suite(&mut orelse.body);
                }
            }
            CompoundStatement::While(s) => {
                self.walk_expression(&mut s.test);
                self.walk_suite(&mut s.body);
                if let Some(orelse) = &mut s.orelse {
                    self.walk_suite(&mut orelse.body);
                }
            }
            CompoundStatement::For(s) => {
                self.walk_expression(&mut s.target);
                self.walk_expression(&mut s.iter);
                self.walk_suite(&mut s.body);
                if let Some(orelse) = &mut s.orelse {
                    self.walk_suite(&mut orelse.body);
                }
            }
            CompoundStatement::With(s) => {
                for item in s.items.iter_mut() {
                    self.walk_expression(&mut item.context);
                    if let Some((_, target)) = &mut item.as_part {
                        self.walk_expression(target);
                    }
                }
                self.walk_suite(&mut s.body);
            }
            CompoundStatement::Try(s) => {
                self.walk_suite(&mut s.body);
                for handler in s.handlers.iter_mut() {
                    if let Some(exc_type) = &mut handler.exc_type {
                        self.walk_expression(exc_type);
                    }
                    self.walk_suite(&mut handler.body);
                }
                if let Some(orelse) = &mut s.orelse {
                    self.walk_suite(&mut orelse.body);
                }
                if let Some(finally) = &mut s.finally {
                    self.walk_suite(&mut finally.body);
                }
            }
        }
    }

    fn walk_function_def(&mut self, def: &mut FunctionDef) {
        for decorator in def.decorators.iter_mut() {
            self.walk_expression(&mut decorator.expression);
        }
        apply_space(&mut def.lpar, self.options.space_before_function_paren);
        if def.params.params.is_empty() {
            apply_space(&mut def.rpar, self.options.space_within_empty_paren);
        } else {
            if let Some(first) = def.params.params.first_mut() {
                apply_space(
                    first_param_atom_mut(first),
                    self.options.space_within_function_declaration_parens,
                );
            }
            apply_space(
                &mut def.rpar,
                self.options.space_within_function_declaration_parens,
            );
        }
        self.walk_parameters(&mut def.params);
        if let Some((arrow, returns)) = &mut def.returns {
            apply_space(arrow, self.options.space_around_annotation_arrow);
            apply_space(
                first_atom_mut(returns),
                self.options.space_around_annotation_arrow,
            );
            self.walk_expression(returns);
        }
        self.walk_suite(&mut def.body);
    }

    fn walk_class_def(&mut self, def: &mut ClassDef) {
        for decorator in def.decorators.iter_mut() {
            self.walk_expression(&mut decorator.expression);
        }
        if let Some(arguments) = &mut def.arguments {
            apply_space(&mut arguments.lpar, self.options.space_before_class_paren);
            if arguments.args.is_empty() {
                apply_space(
                    &mut arguments.rpar,
                    self.options.space_within_empty_base_class_list,
                );
            } else {
                if let Some(first) = arguments.args.first_mut() {
                    apply_space(
                        call_arg_first_atom_mut(first),
                        self.options.space_within_class_declaration_parens,
                    );
                }
                apply_space(
                    &mut arguments.rpar,
                    self.options.space_within_class_declaration_parens,
                );
            }
            for arg in arguments.args.iter_mut() {
                self.walk_expression(&mut arg.value);
            }
        }
        self.walk_suite(&mut def.body);
    }

    fn walk_parameters(&mut self, params: &mut Parameters) {
        for param in params.params.iter_mut() {
            if let Some((_, annotation)) = &mut param.annotation {
                self.walk_expression(annotation);
            }
            if let Some((eq, default)) = &mut param.default {
                apply_space(eq, self.options.space_around_default_equals);
                apply_space(
                    first_atom_mut(default),
                    self.options.space_around_default_equals,
                );
                self.walk_expression(default);
            }
        }
    }

    fn walk_suite(&mut self, suite: &mut Suite) {
        match suite {
            Suite::Block { body, .. } => self.walk_body(body),
            Suite::Inline { parts, .. } => {
                for part in parts.iter_mut() {
                    self.walk_small(&mut part.statement);
                }
            }
        }
    }

    fn walk_expression(&mut self, expr: &mut Expression) {
        match expr {
            Expression::Call(call) => {
                self.walk_expression(&mut call.func);
                apply_space(&mut call.lpar, self.options.space_before_call_paren);
                if call.args.is_empty() {
                    apply_space(
                        &mut call.rpar,
                        self.options.space_within_empty_call_argument_list,
                    );
                } else {
                    if let Some(first) = call.args.first_mut() {
                        apply_space(
                            call_arg_first_atom_mut(first),
                            self.options.space_within_call_parens,
                        );
                    }
                    apply_space(&mut call.rpar, self.options.space_within_call_parens);
                }
                for arg in call.args.iter_mut() {
                    self.walk_expression(&mut arg.value);
                }
            }
            Expression::Subscript(sub) => {
                self.walk_expression(&mut sub.value);
                apply_space(&mut sub.lbracket, self.options.space_before_index_bracket);
                if let Some(first) = sub.elements.first_mut() {
                    let atom = match &mut first.index {
                        SubscriptIndex::Index(e) => first_atom_mut(e),
                        SubscriptIndex::Slice(slice) => match &mut slice.lower {
                            Some(lower) => first_atom_mut(lower),
                            None => &mut slice.colon,
                        },
                    };
                    apply_space(atom, self.options.space_within_index_brackets);
                }
                apply_space(&mut sub.rbracket, self.options.space_within_index_brackets);
                for element in sub.elements.iter_mut() {
                    match &mut element.index {
                        SubscriptIndex::Index(e) => self.walk_expression(e),
                        SubscriptIndex::Slice(slice) => {
                            if let Some(lower) = &mut slice.lower {
                                self.walk_expression(lower);
                            }
                            if let Some(upper) = &mut slice.upper {
                                self.walk_expression(upper);
                            }
                            if let Some((_, Some(step))) = &mut slice.step {
                                self.walk_expression(step);
                            }
                        }
                    }
                }
            }
            Expression::Parenthesized(paren) => {
                match &mut paren.value {
                    Expression::Tuple(tuple) if tuple.elements.is_empty() => {
                        apply_space(&mut paren.rpar, self.options.space_within_empty_tuple);
                    }
                    Expression::Tuple(tuple) => {
                        apply_space(
                            first_atom_mut(&mut tuple.elements[0].value),
                            self.options.spaces_within_parenthesised_tuple,
                        );
                        apply_space(
                            &mut paren.rpar,
                            self.options.spaces_within_parenthesised_tuple,
                        );
                    }
                    inner => {
                        apply_space(first_atom_mut(inner), self.options.spaces_within_parens);
                        apply_space(&mut paren.rpar, self.options.spaces_within_parens);
                    }
                }
                self.walk_expression(&mut paren.value);
            }
            Expression::List(list) => {
                if list.elements.is_empty() {
                    apply_space(&mut list.rbracket, self.options.spaces_within_empty_list);
                } else {
                    apply_space(
                        first_atom_mut(&mut list.elements[0].value),
                        self.options.spaces_within_list,
                    );
                    apply_space(&mut list.rbracket, self.options.spaces_within_list);
                }
                for element in list.elements.iter_mut() {
                    self.walk_expression(&mut element.value);
                }
            }
            Expression::Binary(binary) => {
                self.walk_expression(&mut binary.left);
                apply_space(&mut binary.op, self.options.spaces_around_binary_operators);
                apply_space(
                    first_atom_mut(&mut binary.right),
                    self.options.spaces_around_binary_operators,
                );
                self.walk_expression(&mut binary.right);
            }
            Expression::Boolean(boolean) => {
                self.walk_expression(&mut boolean.left);
                apply_space(&mut boolean.op, self.options.spaces_around_binary_operators);
                apply_space(
                    first_atom_mut(&mut boolean.right),
                    self.options.spaces_around_binary_operators,
                );
                self.walk_expression(&mut boolean.right);
            }
            Expression::Compare(compare) => {
                self.walk_expression(&mut compare.left);
                for part in compare.comparisons.iter_mut() {
                    apply_space(
                        &mut part.op.first,
                        self.options.spaces_around_binary_operators,
                    );
                    apply_space(
                        first_atom_mut(&mut part.right),
                        self.options.spaces_around_binary_operators,
                    );
                    self.walk_expression(&mut part.right);
                }
            }
            Expression::Tuple(tuple) => {
                for element in tuple.elements.iter_mut() {
                    self.walk_expression(&mut element.value);
                }
            }
            Expression::Set(set) => {
                for element in set.elements.iter_mut() {
                    self.walk_expression(&mut element.value);
                }
            }
            Expression::Dict(dict) => {
                for element in dict.elements.iter_mut() {
                    match element {
                        DictElement::Pair { key, value, .. } => {
                            self.walk_expression(key);
                            self.walk_expression(value);
                        }
                        DictElement::Unpack { value, .. } => self.walk_expression(value),
                    }
                }
            }
            Expression::ListComp(comp) => {
                self.walk_expression(&mut comp.element);
                self.walk_comp_for(&mut comp.comp);
            }
            Expression::SetComp(comp) => {
                self.walk_expression(&mut comp.element);
                self.walk_comp_for(&mut comp.comp);
            }
            Expression::DictComp(comp) => {
                self.walk_expression(&mut comp.key);
                self.walk_expression(&mut comp.value);
                self.walk_comp_for(&mut comp.comp);
            }
            Expression::Generator(generator) => {
                self.walk_expression(&mut generator.element);
                self.walk_comp_for(&mut generator.comp);
            }
            Expression::Attribute(attribute) => self.walk_expression(&mut attribute.value),
            Expression::Unary(unary) => self.walk_expression(&mut unary.operand),
            Expression::Conditional(cond) => {
                self.walk_expression(&mut cond.body);
                self.walk_expression(&mut cond.test);
                self.walk_expression(&mut cond.orelse);
            }
            Expression::Lambda(lambda) => {
                self.walk_parameters(&mut lambda.params);
                self.walk_expression(&mut lambda.body);
            }
            Expression::Yield(yield_expr) => {
                if let Some(value) = &mut yield_expr.value {
                    self.walk_expression(value);
                }
            }
            Expression::Await(await_expr) => self.walk_expression(&mut await_expr.value),
            Expression::Starred(starred) => self.walk_expression(&mut starred.value),
            Expression::Repr(repr) => self.walk_expression(&mut repr.value),
            Expression::Name(_)
            | Expression::Integer(_)
            | Expression::Float(_)
            | Expression::Imaginary(_)
            | Expression::Str(_)
            | Expression::Concatenated(_)
            | Expression::Ellipsis(_)
            | Expression::Error(_) => {}
        }
    }

    fn walk_comp_for(&mut self, comp: &mut CompFor) {
        self.walk_expression(&mut comp.target);
        self.walk_expression(&mut comp.iter);
        for comp_if in comp.ifs.iter_mut() {
            self.walk_expression(&mut comp_if.test);
        }
        if let Some(inner) = &mut comp.inner {
            self.walk_comp_for(inner);
        }
    }
}

fn first_param_atom_mut(param: &mut Param) -> &mut Atom {
    match (&mut param.star, &mut param.target) {
        (Some(star), _) => star,
        (None, Some(ParamTarget::Name(name))) => &mut name.tok,
        (None, Some(ParamTarget::Tuple { lpar, .. })) => lpar,
        (None, None) => unreachable!("param with neither star nor target"),
    }
}

fn call_arg_first_atom_mut(arg: &mut CallArg) -> &mut Atom {
    match (&mut arg.star, &mut arg.keyword) {
        (Some(star), _) => star,
        (None, Some((name, _))) => name,
        (None, None) => first_atom_mut(&mut arg.value),
    }
}

// ============================================================================
// Structural rewrites
// ============================================================================

/// Split `a = 1; b = 2` lines into one statement per line.
fn break_statement_lines(body: &mut Vec<Statement>) {
    let mut rewritten = Vec::with_capacity(body.len());
    for statement in body.drain(..) {
        match statement {
            Statement::Simple(mut line) if line.parts.len() > 1 => {
                let indent = indent_of(&first_atom_mut_small(&mut line.parts[0].statement).leading);
                let total = line.parts.len();
                let newline_text = if line.newline.text.is_empty() {
                    "\n".to_string()
                } else {
                    line.newline.text.clone()
                };
                for (idx, mut part) in line.parts.drain(..).enumerate() {
                    part.semicolon = None;
                    if idx > 0 {
                        let first = first_atom_mut_small(&mut part.statement);
                        first.leading = indent.clone();
                    }
                    let newline = if idx + 1 == total {
                        line.newline.clone()
                    } else {
                        Atom::synthetic(newline_text.clone())
                    };
                    rewritten.push(Statement::Simple(SimpleStatementLine {
                        node_id: line.node_id,
                        span: line.span,
                        parts: vec![part],
                        newline,
                    }));
                }
            }
            other => rewritten.push(other),
        }
    }
    *body = rewritten;
}

/// Split `import a, b` into `import a` / `import b` lines.
fn split_multi_imports(body: &mut Vec<Statement>) {
    let mut rewritten = Vec::with_capacity(body.len());
    for statement in body.drain(..) {
        let splittable = matches!(
            &statement,
            Statement::Simple(line) if line.parts.len() == 1
                && matches!(&line.parts[0].statement, SmallStatement::Import(import) if import.names.len() > 1)
        );
        if !splittable {
            rewritten.push(statement);
            continue;
        }
        let Statement::Simple(mut line) = statement else {
            unreachable!()
        };
        let SmallStatement::Import(import) = line.parts.remove(0).statement else {
            unreachable!()
        };
        let indent = indent_of(&import.import_tok.leading);
        let total = import.names.len();
        let newline_text = if line.newline.text.is_empty() {
            "\n".to_string()
        } else {
            line.newline.text.clone()
        };
        for (idx, mut alias) in import.names.into_iter().enumerate() {
            alias.comma = None;
            let mut import_tok = import.import_tok.clone();
            if idx > 0 {
                import_tok.leading = indent.clone();
            }
            if let Some(first_part) = alias.name.parts.first_mut() {
                first_part.name.leading = " ".to_string();
            }
            let newline = if idx + 1 == total {
                line.newline.clone()
            } else {
                Atom::synthetic(newline_text.clone())
            };
            let span = alias.span;
            rewritten.push(Statement::Simple(SimpleStatementLine {
                node_id: line.node_id,
                span,
                parts: vec![SmallStatementPart {
                    statement: SmallStatement::Import(ImportStatement {
                        node_id: import.node_id,
                        span,
                        import_tok,
                        names: vec![alias],
                    }),
                    semicolon: None,
                }],
                newline,
            }));
        }
    }
    *body = rewritten;
}

// ============================================================================
// Comment wrapping
// ============================================================================

fn wrap_comment_trivia_in_body(body: &mut [Statement], width: usize) {
    for statement in body.iter_mut() {
        if let Statement::Simple(line) = statement {
            for part in line.parts.iter_mut() {
                let first = first_atom_mut_small(&mut part.statement);
                wrap_comment_trivia(&mut first.leading, width);
            }
            wrap_comment_trivia(&mut line.newline.leading, width);
        } else if let Statement::Compound(compound) = statement {
            wrap_compound_comments(compound, width);
        }
    }
}

fn wrap_compound_comments(compound: &mut CompoundStatement, width: usize) {
    let suites: Vec<&mut Suite> = match compound {
        CompoundStatement::FunctionDef(s) => vec![&mut s.body],
        CompoundStatement::ClassDef(s) => vec![&mut s.body],
        CompoundStatement::If(s) => {
            let mut suites = vec![&mut s.body];
            for elif in s.elifs.iter_mut() {
                suites.push(&mut elif.body);
            }
            if let Some(orelse) = &mut s.orelse {
                suites.push(&mut orelse.body);
            }
            suites
        }
        CompoundStatement::While(s) => {
            let mut suites = vec![&mut s.body];
            if let Some(orelse) = &mut s.orelse {
                suites.push(&mut orelse.body);
            }
            suites
        }
        CompoundStatement::For(s) => {
            let mut suites = vec![&mut s.body];
            if let Some(orelse) = &mut s.orelse {
                suites.push(&mut orelse.body);
            }
            suites
        }
        CompoundStatement::With(s) => vec![&mut s.body],
        CompoundStatement::Try(s) => {
            let mut suites = vec![&mut s.body];
            for handler in s.handlers.iter_mut() {
                suites.push(&mut handler.body);
            }
            if let Some(orelse) = &mut s.orelse {
                suites.push(&mut orelse.body);
            }
            if let Some(finally) = &mut s.finally {
                suites.push(&mut finally.body);
            }
            suites
        }
    };
    for suite in suites {
        if let Suite::Block { body, .. } = suite {
            wrap_comment_trivia_in_body(body, width);
        }
    }
}

/// Re-wrap over-long comment lines inside a trivia run, preserving the
/// comment's indentation and `#` prefix.
fn wrap_comment_trivia(trivia: &mut String, width: usize) {
    if !trivia.contains('#') {
        return;
    }
    let mut out = String::with_capacity(trivia.len());
    for (idx, line) in trivia.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let Some(hash) = line.find('#') else {
            out.push_str(line);
            continue;
        };
        if line.chars().count() <= width {
            out.push_str(line);
            continue;
        }
        let indent = &line[..hash];
        // Only wrap full comment lines; trailing comments stay put.
        if !indent.chars().all(|c| c == ' ' || c == '\t') {
            out.push_str(line);
            continue;
        }
        let body = line[hash..].trim_start_matches('#');
        let prefix = format!("{indent}#");
        let mut column = prefix.chars().count();
        out.push_str(&prefix);
        let mut first_word = true;
        for word in body.split_whitespace() {
            let needed = word.chars().count() + 1;
            if !first_word && column + needed > width {
                out.push('\n');
                out.push_str(&prefix);
                column = prefix.chars().count();
            }
            out.push(' ');
            out.push_str(word);
            column += needed;
            first_word = false;
        }
    }
    *trivia = out;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_module, Codegen, CodegenState};
    use pythia_core::version::PythonVersion;

    fn format_source(source: &str, options: &FormatOptions) -> String {
        let mut parsed = parse_module(source, PythonVersion::V3_7);
        format_module(&mut parsed.module, options);
        let mut state = CodegenState::default();
        parsed.module.codegen(&mut state);
        state.into_string()
    }

    #[test]
    fn default_options_preserve_everything() {
        let sources = [
            "x=1\n",
            "def f( a,b ):\n    return a+b\n",
            "import os ,  sys\n",
        ];
        for src in sources {
            assert_eq!(format_source(src, &FormatOptions::default()), src);
        }
    }

    #[test]
    fn assignment_operator_spacing_on() {
        let options = FormatOptions {
            spaces_around_assignment_operator: Some(true),
            ..Default::default()
        };
        assert_eq!(format_source("x=1\n", &options), "x = 1\n");
        assert_eq!(format_source("x  =  1\n", &options), "x = 1\n");
    }

    #[test]
    fn assignment_operator_spacing_off() {
        let options = FormatOptions {
            spaces_around_assignment_operator: Some(false),
            ..Default::default()
        };
        assert_eq!(format_source("x = 1\n", &options), "x=1\n");
    }

    #[test]
    fn binary_operator_spacing() {
        let options = FormatOptions {
            spaces_around_binary_operators: Some(true),
            ..Default::default()
        };
        assert_eq!(format_source("y = a+b*c\n", &options), "y = a + b * c\n");
    }

    #[test]
    fn multiline_spacing_slots_are_left_alone() {
        let options = FormatOptions {
            spaces_around_binary_operators: Some(true),
            ..Default::default()
        };
        let src = "y = (a +\n     b)\n";
        // The operand on the next line keeps its line break.
        assert_eq!(format_source(src, &options), src);
    }

    #[test]
    fn function_paren_spacing() {
        let options = FormatOptions {
            space_before_function_paren: Some(false),
            space_within_function_declaration_parens: Some(false),
            ..Default::default()
        };
        assert_eq!(
            format_source("def f ( a, b ):\n    pass\n", &options),
            "def f(a, b):\n    pass\n"
        );
    }

    #[test]
    fn empty_paren_spacing() {
        let options = FormatOptions {
            space_within_empty_paren: Some(false),
            ..Default::default()
        };
        assert_eq!(
            format_source("def f( ):\n    pass\n", &options),
            "def f():\n    pass\n"
        );
    }

    #[test]
    fn default_equals_spacing() {
        let options = FormatOptions {
            space_around_default_equals: Some(false),
            ..Default::default()
        };
        assert_eq!(
            format_source("def f(a = 1):\n    pass\n", &options),
            "def f(a=1):\n    pass\n"
        );
    }

    #[test]
    fn call_spacing() {
        let options = FormatOptions {
            space_before_call_paren: Some(false),
            space_within_call_parens: Some(false),
            ..Default::default()
        };
        assert_eq!(format_source("f ( 1, 2 )\n", &options), "f(1, 2)\n");
    }

    #[test]
    fn index_spacing() {
        let options = FormatOptions {
            space_before_index_bracket: Some(false),
            space_within_index_brackets: Some(false),
            ..Default::default()
        };
        assert_eq!(format_source("a [ 0 ]\n", &options), "a[0]\n");
    }

    #[test]
    fn list_spacing() {
        let options = FormatOptions {
            spaces_within_list: Some(true),
            ..Default::default()
        };
        assert_eq!(format_source("x = [1, 2]\n", &options), "x = [ 1, 2 ]\n");
    }

    #[test]
    fn annotation_arrow_spacing() {
        let options = FormatOptions {
            space_around_annotation_arrow: Some(true),
            ..Default::default()
        };
        assert_eq!(
            format_source("def f()->int:\n    pass\n", &options),
            "def f() -> int:\n    pass\n"
        );
    }

    #[test]
    fn remove_trailing_semicolons() {
        let options = FormatOptions {
            remove_trailing_semicolons: Some(true),
            ..Default::default()
        };
        assert_eq!(format_source("x = 1;\n", &options), "x = 1\n");
        // Interior semicolons stay.
        assert_eq!(format_source("x = 1; y = 2\n", &options), "x = 1; y = 2\n");
    }

    #[test]
    fn break_multiple_statements() {
        let options = FormatOptions {
            break_multiple_statements_per_line: Some(true),
            ..Default::default()
        };
        assert_eq!(format_source("x = 1; y = 2\n", &options), "x = 1\ny = 2\n");
    }

    #[test]
    fn break_multiple_statements_keeps_indent() {
        let options = FormatOptions {
            break_multiple_statements_per_line: Some(true),
            ..Default::default()
        };
        assert_eq!(
            format_source("if a:\n    x = 1; y = 2\n", &options),
            "if a:\n    x = 1\n    y = 2\n"
        );
    }

    #[test]
    fn split_multiple_imports() {
        let options = FormatOptions {
            replace_multiple_imports_with_multiple_statements: Some(true),
            ..Default::default()
        };
        assert_eq!(
            format_source("import os, sys\n", &options),
            "import os\nimport sys\n"
        );
    }

    #[test]
    fn wrap_long_comments() {
        let options = FormatOptions {
            wrap_comments: Some(true),
            wrapping_width: Some(30),
            ..Default::default()
        };
        let src = "# this is a very long comment that should wrap at the configured width\nx = 1\n";
        let formatted = format_source(src, &options);
        for line in formatted.lines().filter(|l| l.starts_with('#')) {
            assert!(line.chars().count() <= 30, "line too long: {line:?}");
        }
        assert!(formatted.ends_with("x = 1\n"));
    }
}
