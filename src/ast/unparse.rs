//! Pretty-printer turning the AST back into source text.
//!
//! Used by the `internal` diagnostic dump and by the round-trip tests:
//! parsing the unparsed output must produce a structurally equal tree.
//! Output is normalized (four-space indents, canonical spacing), so
//! equality with the original source holds modulo whitespace.

use super::expr::{Arguments, Comprehension, Expr, ExprKind};
use super::ops::{BoolOperator, UnaryOperator};
use super::pattern::{Pat, PatKind};
use super::stmt::{Stmt, StmtKind};
use super::{ConstantValue, Module};
use crate::intern::Interner;

pub fn unparse_module(module: &Module<'_>, interner: &Interner) -> String {
    let mut unparser = Unparser::new(interner);
    unparser.module(module);
    unparser.out
}

pub fn unparse_expr(expr: &Expr<'_>, interner: &Interner) -> String {
    let mut unparser = Unparser::new(interner);
    unparser.expr(expr, 0);
    unparser.out
}

pub fn unparse_stmt(stmt: &Stmt<'_>, interner: &Interner) -> String {
    let mut unparser = Unparser::new(interner);
    unparser.stmt(stmt);
    unparser.out
}

struct Unparser<'i> {
    interner: &'i Interner,
    out: String,
    indent: usize,
}

// Expression precedence levels, aligned with the operator table so the
// printer parenthesizes exactly where reparsing would otherwise regroup.
const PREC_NAMED: i32 = 1;
const PREC_LAMBDA: i32 = 2;
const PREC_IFEXP: i32 = 3;
const PREC_UNARY: i32 = 14;
const PREC_AWAIT: i32 = 16;
const PREC_POSTFIX: i32 = 17;
const PREC_ATOM: i32 = 20;

impl<'i> Unparser<'i> {
    fn new(interner: &'i Interner) -> Self {
        Unparser { interner, out: String::new(), indent: 0 }
    }

    fn name(&self, sym: crate::intern::Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    fn module(&mut self, module: &Module<'_>) {
        if let Some(doc) = module.docstring {
            let doc = self.name(doc).to_string();
            self.write(&format!("\"\"\"{}\"\"\"", doc));
            self.newline();
        }
        for (i, stmt) in module.body.iter().enumerate() {
            if i > 0 {
                self.newline();
            }
            self.stmt(stmt);
        }
        self.out.push('\n');
    }

    fn block(&mut self, body: &[&Stmt<'_>]) {
        self.write(":");
        self.indent += 1;
        if body.is_empty() {
            self.newline();
            self.write("pass");
        }
        for stmt in body {
            self.newline();
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn docstring_block(&mut self, docstring: Option<crate::intern::Symbol>, body: &[&Stmt<'_>]) {
        self.write(":");
        self.indent += 1;
        if let Some(doc) = docstring {
            let doc = self.name(doc).to_string();
            self.newline();
            self.write(&format!("\"\"\"{}\"\"\"", doc));
        } else if body.is_empty() {
            self.newline();
            self.write("pass");
        }
        for stmt in body {
            self.newline();
            self.stmt(stmt);
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt<'_>) {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                for decorator in def.decorators {
                    self.write("@");
                    self.expr(decorator, 0);
                    self.newline();
                }
                if def.is_async {
                    self.write("async ");
                }
                self.write("def ");
                self.write(&self.name(def.name).to_string());
                self.write("(");
                self.arguments(&def.args);
                self.write(")");
                if let Some(returns) = def.returns {
                    self.write(" -> ");
                    self.expr(returns, 0);
                }
                self.docstring_block(def.docstring, def.body);
            }
            StmtKind::ClassDef(def) => {
                for decorator in def.decorators {
                    self.write("@");
                    self.expr(decorator, 0);
                    self.newline();
                }
                self.write("class ");
                self.write(&self.name(def.name).to_string());
                if !def.bases.is_empty() || !def.keywords.is_empty() {
                    self.write("(");
                    let mut first = true;
                    for base in def.bases {
                        if !first {
                            self.write(", ");
                        }
                        first = false;
                        self.expr(base, 0);
                    }
                    for keyword in def.keywords {
                        if !first {
                            self.write(", ");
                        }
                        first = false;
                        if let Some(arg) = keyword.arg {
                            self.write(&format!("{}=", self.name(arg)));
                        } else {
                            self.write("**");
                        }
                        self.expr(keyword.value, 0);
                    }
                    self.write(")");
                }
                self.docstring_block(def.docstring, def.body);
            }
            StmtKind::Return { value } => {
                self.write("return");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value, 0);
                }
            }
            StmtKind::Delete { targets } => {
                self.write("del ");
                self.comma_exprs(targets);
            }
            StmtKind::Assign { targets, value } => {
                for target in *targets {
                    self.expr(target, 0);
                    self.write(" = ");
                }
                self.expr(value, 0);
            }
            StmtKind::AugAssign { target, op, value, .. } => {
                self.expr(target, 0);
                self.write(&format!(" {}= ", op.as_str()));
                self.expr(value, 0);
            }
            StmtKind::AnnAssign { target, annotation, value } => {
                self.expr(target, 0);
                self.write(": ");
                self.expr(annotation, 0);
                if let Some(value) = value {
                    self.write(" = ");
                    self.expr(value, 0);
                }
            }
            StmtKind::For { target, iter, body, orelse, is_async } => {
                if *is_async {
                    self.write("async ");
                }
                self.write("for ");
                self.expr(target, 0);
                self.write(" in ");
                self.expr(iter, 0);
                self.block(body);
                if !orelse.is_empty() {
                    self.newline();
                    self.write("else");
                    self.block(orelse);
                }
            }
            StmtKind::While { test, body, orelse } => {
                self.write("while ");
                self.expr(test, 0);
                self.block(body);
                if !orelse.is_empty() {
                    self.newline();
                    self.write("else");
                    self.block(orelse);
                }
            }
            StmtKind::If { test, body, orelse } => {
                self.write("if ");
                self.expr(test, 0);
                self.block(body);
                if !orelse.is_empty() {
                    self.newline();
                    // Collapse a single nested if back into elif.
                    if orelse.len() == 1 {
                        if let StmtKind::If { .. } = &orelse[0].kind {
                            self.write("el");
                            self.stmt(orelse[0]);
                            return;
                        }
                    }
                    self.write("else");
                    self.block(orelse);
                }
            }
            StmtKind::With { items, body, is_async } => {
                if *is_async {
                    self.write("async ");
                }
                self.write("with ");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(item.context_expr, 0);
                    if let Some(vars) = item.optional_vars {
                        self.write(" as ");
                        self.expr(vars, 0);
                    }
                }
                self.block(body);
            }
            StmtKind::Match { subject, cases } => {
                self.write("match ");
                self.expr(subject, 0);
                self.write(":");
                self.indent += 1;
                for case in *cases {
                    self.newline();
                    self.write("case ");
                    self.pattern(case.pattern);
                    if let Some(guard) = case.guard {
                        self.write(" if ");
                        self.expr(guard, 0);
                    }
                    self.block(case.body);
                }
                self.indent -= 1;
            }
            StmtKind::Raise { exc, cause } => {
                self.write("raise");
                if let Some(exc) = exc {
                    self.write(" ");
                    self.expr(exc, 0);
                }
                if let Some(cause) = cause {
                    self.write(" from ");
                    self.expr(cause, 0);
                }
            }
            StmtKind::Try { body, handlers, orelse, finalbody } => {
                self.write("try");
                self.block(body);
                for handler in *handlers {
                    self.newline();
                    self.write("except");
                    if let Some(typ) = handler.typ {
                        self.write(" ");
                        self.expr(typ, 0);
                    }
                    if let Some(name) = handler.name {
                        self.write(&format!(" as {}", self.name(name)));
                    }
                    self.block(handler.body);
                }
                if !orelse.is_empty() {
                    self.newline();
                    self.write("else");
                    self.block(orelse);
                }
                if !finalbody.is_empty() {
                    self.newline();
                    self.write("finally");
                    self.block(finalbody);
                }
            }
            StmtKind::Assert { test, msg } => {
                self.write("assert ");
                self.expr(test, 0);
                if let Some(msg) = msg {
                    self.write(", ");
                    self.expr(msg, 0);
                }
            }
            StmtKind::Import { names } => {
                self.write("import ");
                for (i, alias) in names.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.write(&self.name(alias.name).to_string());
                    if let Some(asname) = alias.asname {
                        self.write(&format!(" as {}", self.name(asname)));
                    }
                }
            }
            StmtKind::ImportFrom { module, names } => {
                self.write(&format!("from {} import ", self.name(*module)));
                for (i, alias) in names.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.write(&self.name(alias.name).to_string());
                    if let Some(asname) = alias.asname {
                        self.write(&format!(" as {}", self.name(asname)));
                    }
                }
            }
            StmtKind::Global { names } => {
                self.write("global ");
                let parts: Vec<String> = names.iter().map(|n| self.name(*n).to_string()).collect();
                self.write(&parts.join(", "));
            }
            StmtKind::Nonlocal { names } => {
                self.write("nonlocal ");
                let parts: Vec<String> = names.iter().map(|n| self.name(*n).to_string()).collect();
                self.write(&parts.join(", "));
            }
            StmtKind::Expr { value } => self.expr(value, 0),
            StmtKind::Pass => self.write("pass"),
            StmtKind::Break => self.write("break"),
            StmtKind::Continue => self.write("continue"),
            StmtKind::Inline { body } => {
                for (i, stmt) in body.iter().enumerate() {
                    if i > 0 {
                        self.write("; ");
                    }
                    self.stmt(stmt);
                }
            }
            StmtKind::Invalid => self.write("<invalid statement>"),
        }
        if let Some(comment) = stmt.comment.get() {
            self.write("  ");
            self.write(&self.name(comment).to_string());
        }
    }

    fn arguments(&mut self, args: &Arguments<'_>) {
        let mut first = true;
        let positional = args.posonlyargs.len() + args.args.len();
        let default_base = positional.saturating_sub(args.defaults.len());
        let mut index = 0;

        for arg in args.posonlyargs.iter().chain(args.args.iter()) {
            if !first {
                self.write(", ");
            }
            first = false;
            self.write(&self.name(arg.name).to_string());
            if let Some(annotation) = arg.annotation {
                self.write(": ");
                self.expr(annotation, 0);
            }
            if index >= default_base {
                self.write(" = ");
                self.expr(args.defaults[index - default_base], 0);
            }
            index += 1;
            if index == args.posonlyargs.len() && !args.posonlyargs.is_empty() {
                self.write(", /");
            }
        }

        if let Some(vararg) = args.vararg {
            if !first {
                self.write(", ");
            }
            first = false;
            self.write(&format!("*{}", self.name(vararg.name)));
        } else if !args.kwonlyargs.is_empty() {
            if !first {
                self.write(", ");
            }
            first = false;
            self.write("*");
        }

        for (i, arg) in args.kwonlyargs.iter().enumerate() {
            if !first {
                self.write(", ");
            }
            first = false;
            self.write(&self.name(arg.name).to_string());
            if let Some(annotation) = arg.annotation {
                self.write(": ");
                self.expr(annotation, 0);
            }
            if let Some(Some(default)) = args.kw_defaults.get(i) {
                self.write(" = ");
                self.expr(default, 0);
            }
        }

        if let Some(kwarg) = args.kwarg {
            if !first {
                self.write(", ");
            }
            self.write(&format!("**{}", self.name(kwarg.name)));
        }
    }

    fn comma_exprs(&mut self, exprs: &[&Expr<'_>]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.expr(expr, 0);
        }
    }

    fn comprehensions(&mut self, generators: &[Comprehension<'_>]) {
        for generator in generators {
            if generator.is_async {
                self.write(" async for ");
            } else {
                self.write(" for ");
            }
            self.expr(generator.target, 0);
            self.write(" in ");
            self.expr(generator.iter, PREC_IFEXP + 1);
            for cond in generator.ifs {
                self.write(" if ");
                self.expr(cond, PREC_IFEXP + 1);
            }
        }
    }

    fn string_literal(&mut self, text: &str) {
        self.write("\"");
        for c in text.chars() {
            match c {
                '\n' => self.write("\\n"),
                '\t' => self.write("\\t"),
                '\r' => self.write("\\r"),
                '\\' => self.write("\\\\"),
                '"' => self.write("\\\""),
                other => self.out.push(other),
            }
        }
        self.write("\"");
    }

    fn constant(&mut self, value: ConstantValue) {
        match value {
            ConstantValue::Int(v) => self.write(&v.to_string()),
            ConstantValue::Float(v) => {
                let mut text = format!("{}", v);
                if !text.contains('.') && !text.contains('e') && !text.contains("inf") && !text.contains("nan") {
                    text.push_str(".0");
                }
                self.write(&text);
            }
            ConstantValue::Bool(true) => self.write("True"),
            ConstantValue::Bool(false) => self.write("False"),
            ConstantValue::Str(sym) => {
                let text = self.name(sym).to_string();
                self.string_literal(&text);
            }
            ConstantValue::None => self.write("None"),
        }
    }

    /// Writes `expr`, parenthesizing when its precedence is below the
    /// context's minimum.
    fn expr(&mut self, expr: &Expr<'_>, min_prec: i32) {
        let prec = Self::precedence(expr);
        let parens = prec < min_prec;
        if parens {
            self.write("(");
        }
        self.expr_inner(expr, prec);
        if parens {
            self.write(")");
        }
    }

    fn precedence(expr: &Expr<'_>) -> i32 {
        use super::ops::BinaryOperator as B;
        match &expr.kind {
            ExprKind::NamedExpr { .. } => PREC_NAMED,
            ExprKind::Lambda { .. } => PREC_LAMBDA,
            ExprKind::IfExp { .. } => PREC_IFEXP,
            ExprKind::BoolOp { op: BoolOperator::Or, .. } => 4,
            ExprKind::BoolOp { op: BoolOperator::And, .. } => 5,
            ExprKind::Compare { .. } => 7,
            ExprKind::BinOp { op, .. } => match op {
                B::BitOr => 8,
                B::BitXor => 9,
                B::BitAnd => 10,
                B::LShift | B::RShift => 11,
                B::Add | B::Sub => 12,
                B::Mult | B::Div | B::FloorDiv | B::Mod | B::MatMult => 13,
                B::Pow => 15,
            },
            ExprKind::UnaryOp { op, .. } => match op {
                UnaryOperator::Not => 6,
                _ => PREC_UNARY,
            },
            ExprKind::Await { .. } => PREC_AWAIT,
            ExprKind::Yield { .. } | ExprKind::YieldFrom { .. } => PREC_NAMED,
            ExprKind::Call { .. } | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => PREC_POSTFIX,
            ExprKind::Starred { .. } => PREC_NAMED,
            _ => PREC_ATOM,
        }
    }

    fn expr_inner(&mut self, expr: &Expr<'_>, prec: i32) {
        match &expr.kind {
            ExprKind::BoolOp { op, values, .. } => {
                let sep = match op {
                    BoolOperator::And => " and ",
                    BoolOperator::Or => " or ",
                };
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.write(sep);
                    }
                    self.expr(value, prec + 1);
                }
            }
            ExprKind::NamedExpr { target, value } => {
                self.expr(target, PREC_ATOM);
                self.write(" := ");
                self.expr(value, prec + 1);
            }
            ExprKind::BinOp { left, op, right, .. } => {
                let right_assoc = matches!(op, super::ops::BinaryOperator::Pow);
                let (lmin, rmin) = if right_assoc { (prec + 1, prec) } else { (prec, prec + 1) };
                self.expr(left, lmin);
                self.write(&format!(" {} ", op.as_str()));
                self.expr(right, rmin);
            }
            ExprKind::UnaryOp { op, operand, .. } => {
                match op {
                    UnaryOperator::Not => self.write("not "),
                    other => self.write(other.as_str()),
                }
                self.expr(operand, prec);
            }
            ExprKind::Lambda { args, body } => {
                self.write("lambda");
                if !args.is_empty() {
                    self.write(" ");
                    self.arguments(args);
                }
                self.write(": ");
                self.expr(body, PREC_LAMBDA);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.expr(body, prec + 1);
                self.write(" if ");
                self.expr(test, prec + 1);
                self.write(" else ");
                self.expr(orelse, prec);
            }
            ExprKind::Dict { keys, values } => {
                self.write("{");
                for (i, (key, value)) in keys.iter().zip(values.iter()).enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.expr(key, 0);
                    self.write(": ");
                    self.expr(value, 0);
                }
                self.write("}");
            }
            ExprKind::Set { elts } => {
                self.write("{");
                self.comma_exprs(elts);
                self.write("}");
            }
            ExprKind::ListComp { elt, generators } => {
                self.write("[");
                self.expr(elt, PREC_IFEXP);
                self.comprehensions(generators);
                self.write("]");
            }
            ExprKind::SetComp { elt, generators } => {
                self.write("{");
                self.expr(elt, PREC_IFEXP);
                self.comprehensions(generators);
                self.write("}");
            }
            ExprKind::DictComp { key, value, generators } => {
                self.write("{");
                self.expr(key, PREC_IFEXP);
                self.write(": ");
                self.expr(value, PREC_IFEXP);
                self.comprehensions(generators);
                self.write("}");
            }
            ExprKind::GeneratorExp { elt, generators } => {
                self.write("(");
                self.expr(elt, PREC_IFEXP);
                self.comprehensions(generators);
                self.write(")");
            }
            ExprKind::Await { value } => {
                self.write("await ");
                self.expr(value, PREC_AWAIT);
            }
            ExprKind::Yield { value } => {
                self.write("yield");
                if let Some(value) = value {
                    self.write(" ");
                    self.expr(value, 0);
                }
            }
            ExprKind::YieldFrom { value } => {
                self.write("yield from ");
                self.expr(value, 0);
            }
            ExprKind::Compare { left, ops, comparators, .. } => {
                self.expr(left, prec + 1);
                for (op, comparator) in ops.iter().zip(comparators.iter()) {
                    self.write(&format!(" {} ", op.as_str()));
                    self.expr(comparator, prec + 1);
                }
            }
            ExprKind::Call { func, args, keywords } => {
                self.expr(func, PREC_POSTFIX);
                self.write("(");
                let mut first = true;
                for arg in *args {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.expr(arg, 0);
                }
                for keyword in *keywords {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    match keyword.arg {
                        Some(arg) => self.write(&format!("{}=", self.name(arg))),
                        None => self.write("**"),
                    }
                    self.expr(keyword.value, 0);
                }
                self.write(")");
            }
            ExprKind::FormattedValue { value, conversion, format_spec } => {
                self.write("{");
                self.expr(value, 0);
                if let Some(conversion) = conversion {
                    self.write(&format!("!{}", conversion));
                }
                if let Some(spec) = format_spec {
                    self.write(&format!(":{}", self.name(*spec)));
                }
                self.write("}");
            }
            ExprKind::JoinedStr { values } => {
                self.write("f\"");
                for value in *values {
                    match &value.kind {
                        ExprKind::Constant { value: ConstantValue::Str(sym), .. } => {
                            let text = self.name(*sym).to_string();
                            for c in text.chars() {
                                match c {
                                    '{' => self.write("{{"),
                                    '}' => self.write("}}"),
                                    '"' => self.write("\\\""),
                                    '\n' => self.write("\\n"),
                                    other => self.out.push(other),
                                }
                            }
                        }
                        _ => self.expr(value, 0),
                    }
                }
                self.write("\"");
            }
            ExprKind::Constant { value, .. } => self.constant(*value),
            ExprKind::Attribute { value, attr, .. } => {
                self.expr(value, PREC_POSTFIX);
                self.write(&format!(".{}", self.name(*attr)));
            }
            ExprKind::Subscript { value, slice, .. } => {
                self.expr(value, PREC_POSTFIX);
                self.write("[");
                self.expr(slice, 0);
                self.write("]");
            }
            ExprKind::Starred { value, .. } => {
                self.write("*");
                self.expr(value, PREC_POSTFIX);
            }
            ExprKind::Name { id, .. } => self.write(&self.name(*id).to_string()),
            ExprKind::List { elts, .. } => {
                self.write("[");
                self.comma_exprs(elts);
                self.write("]");
            }
            ExprKind::Tuple { elts, .. } => {
                self.write("(");
                self.comma_exprs(elts);
                if elts.len() == 1 {
                    self.write(",");
                }
                self.write(")");
            }
            ExprKind::Slice { lower, upper, step } => {
                if let Some(lower) = lower {
                    self.expr(lower, 0);
                }
                self.write(":");
                if let Some(upper) = upper {
                    self.expr(upper, 0);
                }
                if let Some(step) = step {
                    self.write(":");
                    self.expr(step, 0);
                }
            }
            ExprKind::NotImplemented => self.write("<error>"),
        }
    }

    fn pattern(&mut self, pattern: &Pat<'_>) {
        match &pattern.kind {
            PatKind::MatchValue { value } => self.expr(value, 0),
            PatKind::MatchSingleton { value } => self.constant(*value),
            PatKind::MatchSequence { patterns } => {
                self.write("[");
                for (i, pattern) in patterns.iter().enumerate() {
                    if i > 0 {
                        self.write(", ");
                    }
                    self.pattern(pattern);
                }
                self.write("]");
            }
            PatKind::MatchMapping { keys, patterns, rest } => {
                self.write("{");
                let mut first = true;
                for (key, pattern) in keys.iter().zip(patterns.iter()) {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.expr(key, 0);
                    self.write(": ");
                    self.pattern(pattern);
                }
                if let Some(rest) = rest {
                    if !first {
                        self.write(", ");
                    }
                    self.write(&format!("**{}", self.name(*rest)));
                }
                self.write("}");
            }
            PatKind::MatchClass { cls, patterns, kwd_attrs, kwd_patterns } => {
                self.expr(cls, PREC_POSTFIX);
                self.write("(");
                let mut first = true;
                for pattern in *patterns {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.pattern(pattern);
                }
                for (attr, pattern) in kwd_attrs.iter().zip(kwd_patterns.iter()) {
                    if !first {
                        self.write(", ");
                    }
                    first = false;
                    self.write(&format!("{}=", self.name(*attr)));
                    self.pattern(pattern);
                }
                self.write(")");
            }
            PatKind::MatchStar { name } => match name {
                Some(name) => self.write(&format!("*{}", self.name(*name))),
                None => self.write("*_"),
            },
            PatKind::MatchAs { pattern, name } => match (pattern, name) {
                (Some(inner), Some(name)) => {
                    self.pattern(inner);
                    self.write(&format!(" as {}", self.name(*name)));
                }
                (None, Some(name)) => self.write(&self.name(*name).to_string()),
                _ => self.write("_"),
            },
            PatKind::MatchOr { patterns } => {
                for (i, pattern) in patterns.iter().enumerate() {
                    if i > 0 {
                        self.write(" | ");
                    }
                    self.pattern(pattern);
                }
            }
        }
    }
}
