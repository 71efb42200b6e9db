//! Generic tree traversal.
//!
//! [`TreeWalk`] provides a default recursive visit for every node kind;
//! passes override the kinds they care about and fall back to the
//! `walk_*` functions for the rest. A recursion depth is threaded through
//! every call so passes can guard against runaway nesting or indent their
//! dumps.

use super::expr::{Comprehension, Expr, ExprKind};
use super::pattern::{Pat, PatKind};
use super::stmt::{Stmt, StmtKind};
use super::Module;

pub trait TreeWalk<'a>: Sized {
    fn visit_module(&mut self, module: &'a Module<'a>, depth: usize) {
        walk_module(self, module, depth);
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt<'a>, depth: usize) {
        walk_stmt(self, stmt, depth);
    }

    fn visit_expr(&mut self, expr: &'a Expr<'a>, depth: usize) {
        walk_expr(self, expr, depth);
    }

    fn visit_pattern(&mut self, pattern: &'a Pat<'a>, depth: usize) {
        walk_pattern(self, pattern, depth);
    }
}

pub fn walk_module<'a, V: TreeWalk<'a>>(v: &mut V, module: &'a Module<'a>, depth: usize) {
    for stmt in module.body {
        v.visit_stmt(stmt, depth + 1);
    }
}

fn walk_comprehensions<'a, V: TreeWalk<'a>>(v: &mut V, generators: &'a [Comprehension<'a>], depth: usize) {
    for generator in generators {
        v.visit_expr(generator.target, depth);
        v.visit_expr(generator.iter, depth);
        for cond in generator.ifs {
            v.visit_expr(cond, depth);
        }
    }
}

pub fn walk_expr<'a, V: TreeWalk<'a>>(v: &mut V, expr: &'a Expr<'a>, depth: usize) {
    let d = depth + 1;
    match &expr.kind {
        ExprKind::BoolOp { values, .. } => {
            for value in *values {
                v.visit_expr(value, d);
            }
        }
        ExprKind::NamedExpr { target, value } => {
            v.visit_expr(target, d);
            v.visit_expr(value, d);
        }
        ExprKind::BinOp { left, right, .. } => {
            v.visit_expr(left, d);
            v.visit_expr(right, d);
        }
        ExprKind::UnaryOp { operand, .. } => v.visit_expr(operand, d),
        ExprKind::Lambda { args, body } => {
            for arg in args.named() {
                if let Some(annotation) = arg.annotation {
                    v.visit_expr(annotation, d);
                }
            }
            for default in args.defaults {
                v.visit_expr(default, d);
            }
            v.visit_expr(body, d);
        }
        ExprKind::IfExp { test, body, orelse } => {
            v.visit_expr(test, d);
            v.visit_expr(body, d);
            v.visit_expr(orelse, d);
        }
        ExprKind::Dict { keys, values } => {
            for key in *keys {
                v.visit_expr(key, d);
            }
            for value in *values {
                v.visit_expr(value, d);
            }
        }
        ExprKind::Set { elts } => {
            for elt in *elts {
                v.visit_expr(elt, d);
            }
        }
        ExprKind::ListComp { elt, generators } | ExprKind::SetComp { elt, generators } => {
            walk_comprehensions(v, generators, d);
            v.visit_expr(elt, d);
        }
        ExprKind::GeneratorExp { elt, generators } => {
            walk_comprehensions(v, generators, d);
            v.visit_expr(elt, d);
        }
        ExprKind::DictComp { key, value, generators } => {
            walk_comprehensions(v, generators, d);
            v.visit_expr(key, d);
            v.visit_expr(value, d);
        }
        ExprKind::Await { value } => v.visit_expr(value, d),
        ExprKind::Yield { value } => {
            if let Some(value) = value {
                v.visit_expr(value, d);
            }
        }
        ExprKind::YieldFrom { value } => v.visit_expr(value, d),
        ExprKind::Compare { left, comparators, .. } => {
            v.visit_expr(left, d);
            for comparator in *comparators {
                v.visit_expr(comparator, d);
            }
        }
        ExprKind::Call { func, args, keywords } => {
            v.visit_expr(func, d);
            for arg in *args {
                v.visit_expr(arg, d);
            }
            for keyword in *keywords {
                v.visit_expr(keyword.value, d);
            }
        }
        ExprKind::FormattedValue { value, .. } => v.visit_expr(value, d),
        ExprKind::JoinedStr { values } => {
            for value in *values {
                v.visit_expr(value, d);
            }
        }
        ExprKind::Attribute { value, .. } => v.visit_expr(value, d),
        ExprKind::Subscript { value, slice, .. } => {
            v.visit_expr(value, d);
            v.visit_expr(slice, d);
        }
        ExprKind::Starred { value, .. } => v.visit_expr(value, d),
        ExprKind::List { elts, .. } | ExprKind::Tuple { elts, .. } => {
            for elt in *elts {
                v.visit_expr(elt, d);
            }
        }
        ExprKind::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                v.visit_expr(part, d);
            }
        }
        ExprKind::Constant { .. } | ExprKind::Name { .. } | ExprKind::NotImplemented => {}
    }
}

pub fn walk_stmt<'a, V: TreeWalk<'a>>(v: &mut V, stmt: &'a Stmt<'a>, depth: usize) {
    let d = depth + 1;
    match &stmt.kind {
        StmtKind::FunctionDef(def) => {
            for decorator in def.decorators {
                v.visit_expr(decorator, d);
            }
            for arg in def.args.named() {
                if let Some(annotation) = arg.annotation {
                    v.visit_expr(annotation, d);
                }
            }
            for default in def.args.defaults {
                v.visit_expr(default, d);
            }
            if let Some(returns) = def.returns {
                v.visit_expr(returns, d);
            }
            for stmt in def.body {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::ClassDef(def) => {
            for decorator in def.decorators {
                v.visit_expr(decorator, d);
            }
            for base in def.bases {
                v.visit_expr(base, d);
            }
            for keyword in def.keywords {
                v.visit_expr(keyword.value, d);
            }
            for stmt in def.body {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::Return { value } => {
            if let Some(value) = value {
                v.visit_expr(value, d);
            }
        }
        StmtKind::Delete { targets } => {
            for target in *targets {
                v.visit_expr(target, d);
            }
        }
        StmtKind::Assign { targets, value } => {
            v.visit_expr(value, d);
            for target in *targets {
                v.visit_expr(target, d);
            }
        }
        StmtKind::AugAssign { target, value, .. } => {
            v.visit_expr(value, d);
            v.visit_expr(target, d);
        }
        StmtKind::AnnAssign { target, annotation, value } => {
            v.visit_expr(annotation, d);
            if let Some(value) = value {
                v.visit_expr(value, d);
            }
            v.visit_expr(target, d);
        }
        StmtKind::For { target, iter, body, orelse, .. } => {
            v.visit_expr(iter, d);
            v.visit_expr(target, d);
            for stmt in *body {
                v.visit_stmt(stmt, d);
            }
            for stmt in *orelse {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::While { test, body, orelse } => {
            v.visit_expr(test, d);
            for stmt in *body {
                v.visit_stmt(stmt, d);
            }
            for stmt in *orelse {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::If { test, body, orelse } => {
            v.visit_expr(test, d);
            for stmt in *body {
                v.visit_stmt(stmt, d);
            }
            for stmt in *orelse {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::With { items, body, .. } => {
            for item in *items {
                v.visit_expr(item.context_expr, d);
                if let Some(vars) = item.optional_vars {
                    v.visit_expr(vars, d);
                }
            }
            for stmt in *body {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::Match { subject, cases } => {
            v.visit_expr(subject, d);
            for case in *cases {
                v.visit_pattern(case.pattern, d);
                if let Some(guard) = case.guard {
                    v.visit_expr(guard, d);
                }
                for stmt in case.body {
                    v.visit_stmt(stmt, d);
                }
            }
        }
        StmtKind::Raise { exc, cause } => {
            for part in [exc, cause].into_iter().flatten() {
                v.visit_expr(part, d);
            }
        }
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            for stmt in *body {
                v.visit_stmt(stmt, d);
            }
            for handler in *handlers {
                if let Some(typ) = handler.typ {
                    v.visit_expr(typ, d);
                }
                for stmt in handler.body {
                    v.visit_stmt(stmt, d);
                }
            }
            for stmt in *orelse {
                v.visit_stmt(stmt, d);
            }
            for stmt in *finalbody {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::Assert { test, msg } => {
            v.visit_expr(test, d);
            if let Some(msg) = msg {
                v.visit_expr(msg, d);
            }
        }
        StmtKind::Expr { value } => v.visit_expr(value, d),
        StmtKind::Inline { body } => {
            for stmt in *body {
                v.visit_stmt(stmt, d);
            }
        }
        StmtKind::Import { .. }
        | StmtKind::ImportFrom { .. }
        | StmtKind::Global { .. }
        | StmtKind::Nonlocal { .. }
        | StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Invalid => {}
    }
}

pub fn walk_pattern<'a, V: TreeWalk<'a>>(v: &mut V, pattern: &'a Pat<'a>, depth: usize) {
    let d = depth + 1;
    match &pattern.kind {
        PatKind::MatchValue { value } => v.visit_expr(value, d),
        PatKind::MatchSequence { patterns } | PatKind::MatchOr { patterns } => {
            for pattern in *patterns {
                v.visit_pattern(pattern, d);
            }
        }
        PatKind::MatchMapping { keys, patterns, .. } => {
            for key in *keys {
                v.visit_expr(key, d);
            }
            for pattern in *patterns {
                v.visit_pattern(pattern, d);
            }
        }
        PatKind::MatchClass { cls, patterns, kwd_patterns, .. } => {
            v.visit_expr(cls, d);
            for pattern in *patterns {
                v.visit_pattern(pattern, d);
            }
            for pattern in *kwd_patterns {
                v.visit_pattern(pattern, d);
            }
        }
        PatKind::MatchAs { pattern, .. } => {
            if let Some(pattern) = pattern {
                v.visit_pattern(pattern, d);
            }
        }
        PatKind::MatchSingleton { .. } | PatKind::MatchStar { .. } => {}
    }
}
