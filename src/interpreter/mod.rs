//! The tree-walking evaluator.
//!
//! Execution walks the analyzed AST directly: binary operators prefer the
//! native implementation sema resolved onto the node and fall back to the
//! magic-method closure on the left operand's class; names resolve
//! through the current frame and then the live module globals; user
//! exceptions travel through an exception slot that every checkpoint
//! tests, short-circuiting until a handler or the top frame.

pub mod generator;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::expr::{ExprKind, ExprRef, Keyword};
use crate::ast::ops::{BinaryOperator, BoolOperator, CmpOperator, UnaryOperator};
use crate::ast::pattern::{PatKind, PatRef};
use crate::ast::stmt::{ClassDef, FunctionDef, StmtKind, StmtRef};
use crate::ast::{ConstantValue, Loc, Module};
use crate::builtins::{self, binary_key, NativeOperators};
use crate::error::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::importlib::{ImportLib, ModuleSource};
use crate::intern::{Interner, Symbol};
use crate::parser::format_spec::FormatSpec;
use crate::sema::types::TypeRegistry;
use crate::value::{
    BoundMethod, CastError, Closure, ExceptionValue, Instance, OutputSink, Value,
};

use generator::GeneratorState;

/// Control flow signals threaded through statement execution.
pub enum Flow<'a> {
    Normal,
    Return(Value<'a>),
    Break,
    Continue,
}

struct Frame<'a> {
    env: Vec<(Symbol, Value<'a>)>,
}

/// Evaluated module environments, cached per dotted module path.
type ModuleEnvs<'a> = HashMap<Symbol, Rc<Vec<(Symbol, Value<'a>)>>>;

pub struct Interpreter<'a, 'ctx> {
    pub(crate) interner: &'ctx mut Interner,
    pub(crate) registry: &'ctx TypeRegistry<'a>,
    pub(crate) imports: &'ctx ImportLib<'a>,
    /// Arena for short-lived nodes the evaluator materializes itself
    /// (synthetic lambda wrappers), separate from the AST arena.
    transient: &'a crate::arena::Arena,
    operators: NativeOperators,

    /// The module environment: an ordered array of named values.
    globals: Vec<(Symbol, Value<'a>)>,
    frames: Vec<Frame<'a>>,

    /// The exception slot; set by `raise` and runtime failures, cleared
    /// by a matching handler.
    exception: Option<Rc<ExceptionValue<'a>>>,

    module_envs: ModuleEnvs<'a>,
    pub sink: OutputSink,
    pub errors: DiagnosticSink,
    pub cast_error: CastError,
    file: String,
    depth: usize,
}

const MAX_DEPTH: usize = 512;

impl<'a, 'ctx> Interpreter<'a, 'ctx> {
    pub fn new(
        interner: &'ctx mut Interner,
        registry: &'ctx TypeRegistry<'a>,
        imports: &'ctx ImportLib<'a>,
        transient: &'a crate::arena::Arena,
    ) -> Self {
        let globals = builtins::builtin_values(interner, registry);
        Interpreter {
            interner,
            registry,
            imports,
            transient,
            operators: NativeOperators::new(),
            globals,
            frames: Vec::new(),
            exception: None,
            module_envs: HashMap::new(),
            sink: OutputSink::new(),
            errors: DiagnosticSink::new(),
            cast_error: CastError::default(),
            file: String::new(),
            depth: 0,
        }
    }

    /// Continues a previous session's environment (the REPL path).
    pub fn resume(
        interner: &'ctx mut Interner,
        registry: &'ctx TypeRegistry<'a>,
        imports: &'ctx ImportLib<'a>,
        transient: &'a crate::arena::Arena,
        globals: Vec<(Symbol, Value<'a>)>,
    ) -> Self {
        let mut interp = Self::new(interner, registry, imports, transient);
        interp.globals = globals;
        interp
    }

    /// Hands the environment back for the next REPL input.
    pub fn take_globals(self) -> Vec<(Symbol, Value<'a>)> {
        self.globals
    }

    /// The pending exception, if evaluation ended with one uncaught.
    pub fn exception(&self) -> Option<&ExceptionValue<'a>> {
        self.exception.as_deref()
    }

    /// The current environment, for the REPL's `%globals`.
    pub fn globals(&self) -> &[(Symbol, Value<'a>)] {
        &self.globals
    }

    /// Evaluates a module top to bottom. Returns `Invalid` when an
    /// exception reached the top frame.
    pub fn eval_module(&mut self, module: &'a Module<'a>) -> Value<'a> {
        self.file = self.interner.resolve(module.filename).to_string();
        for stmt in module.body {
            match self.exec_stmt(stmt) {
                Flow::Return(_) | Flow::Break | Flow::Continue => break,
                Flow::Normal => {}
            }
            if let Some(exc) = &self.exception {
                let kind = DiagnosticKind::RuntimeError(format!("{}: {}", exc.class_name, exc.message));
                let diagnostic = Diagnostic::new(kind, stmt.loc, self.file.clone());
                self.errors.push(diagnostic);
                return Value::Invalid;
            }
        }
        Value::None
    }

    /// Evaluates a single expression against the current environment
    /// (the REPL path).
    pub fn eval_expr_toplevel(&mut self, expr: ExprRef<'a>) -> Value<'a> {
        let value = self.eval(expr);
        if let Some(exc) = self.exception.take() {
            let kind = DiagnosticKind::RuntimeError(format!("{}: {}", exc.class_name, exc.message));
            let diagnostic = Diagnostic::new(kind, expr.loc, self.file.clone());
            self.errors.push(diagnostic);
            return Value::Invalid;
        }
        value
    }

    // ==================================================================
    // Environment
    // ==================================================================

    fn lookup(&self, name: Symbol) -> Option<Value<'a>> {
        if let Some(frame) = self.frames.last() {
            if let Some((_, value)) = frame.env.iter().rev().find(|(n, _)| *n == name) {
                return Some(value.clone());
            }
        }
        self.globals
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| value.clone())
    }

    pub(crate) fn define(&mut self, name: Symbol, value: Value<'a>) {
        self.interner.retain(name);
        match self.frames.last_mut() {
            Some(frame) => frame.env.push((name, value)),
            None => self.globals.push((name, value)),
        }
    }

    /// Pushes a call frame, counting its bindings as live uses.
    fn push_frame(&mut self, env: Vec<(Symbol, Value<'a>)>) {
        for (name, _) in &env {
            self.interner.retain(*name);
        }
        self.frames.push(Frame { env });
    }

    /// Pops a call frame, releasing its bindings.
    fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            for (name, _) in &frame.env {
                self.interner.release(*name);
            }
        }
    }

    fn assign_name(&mut self, name: Symbol, value: Value<'a>) {
        if let Some(frame) = self.frames.last_mut() {
            if let Some(slot) = frame.env.iter_mut().rev().find(|(n, _)| *n == name) {
                slot.1 = value;
                return;
            }
        } else if let Some(slot) = self.globals.iter_mut().rev().find(|(n, _)| *n == name) {
            slot.1 = value;
            return;
        }
        self.define(name, value);
    }

    // ==================================================================
    // Errors and exceptions
    // ==================================================================

    pub(crate) fn raise_message(&mut self, class_id: i32, message: String) {
        let class_name = self
            .registry
            .class(class_id)
            .map(|meta| self.interner.resolve(meta.name).to_string())
            .unwrap_or_else(|| "Exception".to_string());
        self.exception = Some(Rc::new(ExceptionValue {
            class_id,
            class_name,
            message,
            payload: None,
        }));
    }

    pub(crate) fn runtime_error(&mut self, message: impl Into<String>) -> Value<'a> {
        self.raise_message(self.registry.exception_class, message.into());
        Value::Invalid
    }

    fn check(&self) -> bool {
        self.exception.is_some()
    }

    // ==================================================================
    // Statements
    // ==================================================================

    fn exec_block(&mut self, body: &'a [StmtRef<'a>]) -> Flow<'a> {
        for stmt in body {
            if self.check() {
                return Flow::Normal;
            }
            match self.exec_stmt(stmt) {
                Flow::Normal => {}
                other => return other,
            }
        }
        Flow::Normal
    }

    pub(crate) fn exec_stmt(&mut self, stmt: StmtRef<'a>) -> Flow<'a> {
        if self.check() {
            return Flow::Normal;
        }
        match &stmt.kind {
            StmtKind::FunctionDef(def) => {
                let closure = self.make_closure(def);
                self.define(def.name, Value::Closure(closure));
                Flow::Normal
            }

            StmtKind::ClassDef(def) => {
                self.define(def.name, Value::Class(def));
                Flow::Normal
            }

            StmtKind::Return { value } => {
                let result = match value {
                    Some(value) => self.eval(value),
                    None => Value::None,
                };
                Flow::Return(result)
            }

            StmtKind::Delete { targets } => {
                for target in *targets {
                    if let ExprKind::Name { id, .. } = &target.kind {
                        if let Some(frame) = self.frames.last_mut() {
                            if let Some(pos) = frame.env.iter().rposition(|(n, _)| n == id) {
                                frame.env.remove(pos);
                                continue;
                            }
                        }
                        if let Some(pos) = self.globals.iter().rposition(|(n, _)| n == id) {
                            self.globals.remove(pos);
                        }
                    }
                }
                Flow::Normal
            }

            StmtKind::Assign { targets, value } => {
                let value = self.eval(value);
                if self.check() {
                    return Flow::Normal;
                }
                for target in *targets {
                    self.assign_target(target, value.clone());
                }
                Flow::Normal
            }

            StmtKind::AugAssign { target, op, value, native } => {
                let current = self.eval(target);
                let rhs = self.eval(value);
                if self.check() {
                    return Flow::Normal;
                }
                let result = match native.get() {
                    Some(f) => {
                        let combined = f(&current, &rhs);
                        self.check_native_result(combined, *op, &current, &rhs, stmt.loc)
                    }
                    None => self.dynamic_binop(*op, current, rhs, stmt.loc),
                };
                if self.check() {
                    return Flow::Normal;
                }
                self.assign_target(target, result);
                Flow::Normal
            }

            StmtKind::AnnAssign { target, value, .. } => {
                if let Some(value) = value {
                    let value = self.eval(value);
                    if self.check() {
                        return Flow::Normal;
                    }
                    self.assign_target(target, value);
                }
                Flow::Normal
            }

            StmtKind::If { test, body, orelse } => {
                let test = self.eval(test);
                if self.check() {
                    return Flow::Normal;
                }
                if test.is_truthy() {
                    self.exec_block(body)
                } else {
                    self.exec_block(orelse)
                }
            }

            StmtKind::While { test, body, orelse } => {
                loop {
                    let test = self.eval(test);
                    if self.check() {
                        return Flow::Normal;
                    }
                    if !test.is_truthy() {
                        break;
                    }
                    match self.exec_block(body) {
                        Flow::Break => return Flow::Normal,
                        Flow::Return(v) => return Flow::Return(v),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if self.check() {
                        return Flow::Normal;
                    }
                }
                self.exec_block(orelse)
            }

            StmtKind::For { target, iter, body, orelse, .. } => {
                let iterable = self.eval(iter);
                if self.check() {
                    return Flow::Normal;
                }
                let Some(mut iterator) = self.make_iterator(iterable, stmt.loc) else {
                    return Flow::Normal;
                };
                loop {
                    let Some(item) = self.iterator_next(&mut iterator) else { break };
                    if self.check() {
                        return Flow::Normal;
                    }
                    self.assign_target(target, item);
                    match self.exec_block(body) {
                        Flow::Break => return Flow::Normal,
                        Flow::Return(v) => return Flow::Return(v),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if self.check() {
                        return Flow::Normal;
                    }
                }
                self.exec_block(orelse)
            }

            StmtKind::With { items, body, .. } => self.exec_with(items, body),

            StmtKind::Match { subject, cases } => {
                let subject = self.eval(subject);
                if self.check() {
                    return Flow::Normal;
                }
                for case in *cases {
                    let mut captured: Vec<(Symbol, Value<'a>)> = Vec::new();
                    if !self.try_match(case.pattern, &subject, &mut captured) {
                        continue;
                    }
                    for (name, value) in captured {
                        self.assign_name(name, value);
                    }
                    // Guards run after binding; failure falls through.
                    if let Some(guard) = case.guard {
                        let keep = self.eval(guard);
                        if self.check() {
                            return Flow::Normal;
                        }
                        if !keep.is_truthy() {
                            continue;
                        }
                    }
                    return self.exec_block(case.body);
                }
                Flow::Normal
            }

            StmtKind::Raise { exc, cause: _ } => {
                self.exec_raise(*exc);
                Flow::Normal
            }

            StmtKind::Try { body, handlers, orelse, finalbody } => {
                self.exec_try(body, handlers, orelse, finalbody)
            }

            StmtKind::Assert { test, msg } => {
                let passed = self.eval(test);
                if self.check() {
                    return Flow::Normal;
                }
                if !passed.is_truthy() {
                    let message = match msg {
                        Some(msg) => self.eval(msg).to_display_string(),
                        None => "assertion failed".to_string(),
                    };
                    self.runtime_error(message);
                }
                Flow::Normal
            }

            StmtKind::Import { names } => {
                for alias in names.iter() {
                    if self.ensure_module_env(alias.name).is_none() {
                        let name = self.interner.resolve(alias.name).to_string();
                        self.runtime_error(format!("no module named '{}'", name));
                        return Flow::Normal;
                    }
                    let target = alias.asname.unwrap_or(alias.name);
                    self.define(target, Value::Module(alias.name));
                }
                Flow::Normal
            }

            StmtKind::ImportFrom { module, names } => {
                let Some(env) = self.ensure_module_env(*module) else {
                    let name = self.interner.resolve(*module).to_string();
                    self.runtime_error(format!("no module named '{}'", name));
                    return Flow::Normal;
                };
                let star = self.interner.intern("*");
                for alias in names.iter() {
                    if alias.name == star {
                        for (name, value) in env.iter() {
                            self.define(*name, value.clone());
                        }
                        continue;
                    }
                    match env.iter().rev().find(|(n, _)| *n == alias.name) {
                        Some((_, value)) => {
                            let target = alias.asname.unwrap_or(alias.name);
                            let value = value.clone();
                            self.define(target, value);
                        }
                        None => {
                            let name = self.interner.resolve(alias.name).to_string();
                            self.runtime_error(format!("cannot import '{}'", name));
                            return Flow::Normal;
                        }
                    }
                }
                Flow::Normal
            }

            StmtKind::Expr { value } => {
                self.eval(value);
                Flow::Normal
            }

            StmtKind::Inline { body } => self.exec_block(body),

            StmtKind::Global { .. } | StmtKind::Nonlocal { .. } => Flow::Normal,
            StmtKind::Pass => Flow::Normal,
            StmtKind::Break => Flow::Break,
            StmtKind::Continue => Flow::Continue,
            StmtKind::Invalid => Flow::Normal,
        }
    }

    fn exec_with(&mut self, items: &'a [crate::ast::stmt::WithItem<'a>], body: &'a [StmtRef<'a>]) -> Flow<'a> {
        let mut contexts: Vec<Value<'a>> = Vec::new();
        for item in items {
            let ctx = self.eval(item.context_expr);
            if self.check() {
                break;
            }
            let entered = match self.magic_method(&ctx, "__enter__") {
                Some(method) => self.invoke(method, vec![], Loc::default()),
                None => ctx.clone(),
            };
            if self.check() {
                break;
            }
            contexts.push(ctx);
            if let Some(vars) = item.optional_vars {
                self.assign_target(vars, entered);
            }
        }

        let flow = if self.check() { Flow::Normal } else { self.exec_block(body) };

        // __exit__ runs on every path, last-opened first; a pending
        // exception is stashed so cleanup itself can run, and survives
        // unless an __exit__ raised its own.
        let pending = self.exception.take();
        for ctx in contexts.iter().rev() {
            if let Some(method) = self.magic_method(ctx, "__exit__") {
                self.invoke(method, vec![], Loc::default());
            }
        }
        if self.exception.is_none() {
            self.exception = pending;
        }
        flow
    }

    fn exec_raise(&mut self, exc: Option<ExprRef<'a>>) {
        let Some(exc) = exc else {
            self.runtime_error("no active exception to re-raise");
            return;
        };
        let value = self.eval(exc);
        if self.check() {
            return;
        }
        match value {
            Value::Exception(e) => self.exception = Some(e),
            Value::Object(instance) => {
                let class_name = self.interner.resolve(instance.class.name).to_string();
                let message = instance
                    .attrs
                    .borrow()
                    .first()
                    .map(Value::to_display_string)
                    .unwrap_or_default();
                self.exception = Some(Rc::new(ExceptionValue {
                    class_id: instance.class_id,
                    class_name,
                    message,
                    payload: Some(Value::Object(instance.clone())),
                }));
            }
            Value::BuiltinClass(class_id) => self.raise_message(class_id, String::new()),
            Value::Class(def) => {
                let class_name = self.interner.resolve(def.name).to_string();
                self.exception = Some(Rc::new(ExceptionValue {
                    class_id: def.class_id.get(),
                    class_name,
                    message: String::new(),
                    payload: None,
                }));
            }
            Value::Str(message) => {
                self.raise_message(self.registry.exception_class, message.as_ref().clone());
            }
            other => {
                self.runtime_error(format!("exceptions must derive from Exception, not '{}'", other.tag().as_str()));
            }
        }
    }

    fn exec_try(
        &mut self,
        body: &'a [StmtRef<'a>],
        handlers: &'a [crate::ast::stmt::ExceptHandler<'a>],
        orelse: &'a [StmtRef<'a>],
        finalbody: &'a [StmtRef<'a>],
    ) -> Flow<'a> {
        let flow = self.exec_block(body);

        let mut result = flow;
        if let Some(exc) = self.exception.take() {
            let mut handled = false;
            for handler in handlers {
                if !self.handler_matches(handler, &exc) {
                    continue;
                }
                if let Some(name) = handler.name {
                    let bound = exc
                        .payload
                        .clone()
                        .unwrap_or_else(|| Value::Exception(exc.clone()));
                    self.assign_name(name, bound);
                }
                result = self.exec_block(handler.body);
                handled = true;
                break;
            }
            if !handled {
                self.exception = Some(exc);
            }
        } else if matches!(result, Flow::Normal) {
            result = self.exec_block(orelse);
        }

        // finally always runs; a pending exception survives it unless the
        // final block raises its own.
        if !finalbody.is_empty() {
            let pending = self.exception.take();
            let final_flow = self.exec_block(finalbody);
            if self.exception.is_none() {
                self.exception = pending;
            }
            if !matches!(final_flow, Flow::Normal) {
                return final_flow;
            }
        }
        result
    }

    fn handler_matches(&mut self, handler: &crate::ast::stmt::ExceptHandler<'a>, exc: &ExceptionValue<'a>) -> bool {
        let Some(typ) = handler.typ else { return true };
        let class_value = self.eval(typ);
        match class_value {
            // The base Exception class catches everything.
            Value::BuiltinClass(class_id) if class_id == self.registry.exception_class => true,
            Value::BuiltinClass(class_id) => class_id == exc.class_id,
            Value::Class(def) => def.class_id.get() == exc.class_id,
            _ => false,
        }
    }

    // ==================================================================
    // Assignment targets
    // ==================================================================

    pub(crate) fn assign_target(&mut self, target: ExprRef<'a>, value: Value<'a>) {
        match &target.kind {
            ExprKind::Name { id, .. } => self.assign_name(*id, value),
            ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
                self.destructure(elts, value, target.loc);
            }
            ExprKind::Starred { value: inner, .. } => self.assign_target(inner, value),
            ExprKind::Attribute { value: obj, attr, offset, .. } => {
                let obj = self.eval(obj);
                if self.check() {
                    return;
                }
                match obj {
                    Value::Object(instance) => {
                        let slot = if offset.get() >= 0 {
                            offset.get()
                        } else {
                            self.registry
                                .class(instance.class_id)
                                .and_then(|meta| meta.get_attribute(*attr))
                                .map(|a| a.offset)
                                .unwrap_or(-1)
                        };
                        if slot < 0 {
                            let attr = self.interner.resolve(*attr).to_string();
                            self.runtime_error(format!("object has no attribute '{}'", attr));
                            return;
                        }
                        instance.attrs.borrow_mut()[slot as usize] = value;
                    }
                    other => {
                        let msg = format!("cannot set attribute on '{}'", other.tag().as_str());
                        self.runtime_error(msg);
                    }
                }
            }
            ExprKind::Subscript { value: container, slice, .. } => {
                let container = self.eval(container);
                let index = self.eval(slice);
                if self.check() {
                    return;
                }
                match container {
                    Value::List(items) => {
                        let len = items.borrow().len() as i64;
                        match index.as_int() {
                            Some(raw) => {
                                let idx = if raw < 0 { raw + len } else { raw };
                                if idx < 0 || idx >= len {
                                    self.runtime_error("list index out of range");
                                    return;
                                }
                                items.borrow_mut()[idx as usize] = value;
                            }
                            None => {
                                self.runtime_error("list indices must be integers");
                            }
                        }
                    }
                    Value::Dict(entries) => {
                        let mut entries = entries.borrow_mut();
                        match entries.iter_mut().find(|(k, _)| *k == index) {
                            Some(slot) => slot.1 = value,
                            None => entries.push((index, value)),
                        }
                    }
                    other => {
                        let msg = format!("'{}' does not support item assignment", other.tag().as_str());
                        self.runtime_error(msg);
                    }
                }
            }
            _ => {
                self.runtime_error("invalid assignment target");
            }
        }
    }

    fn destructure(&mut self, targets: &'a [ExprRef<'a>], value: Value<'a>, loc: Loc) {
        let items: Vec<Value<'a>> = match &value {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.as_ref().clone(),
            other => {
                let msg = format!("cannot unpack '{}'", other.tag().as_str());
                self.runtime_error(msg);
                return;
            }
        };

        let star_pos = targets
            .iter()
            .position(|t| matches!(t.kind, ExprKind::Starred { .. }));
        match star_pos {
            None => {
                if items.len() != targets.len() {
                    let msg = format!("expected {} values to unpack, got {}", targets.len(), items.len());
                    self.runtime_error(msg);
                    return;
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign_target(target, item);
                }
            }
            Some(star) => {
                let after = targets.len() - star - 1;
                if items.len() < targets.len() - 1 {
                    let msg = format!("not enough values to unpack at {}:{}", loc.lineno, loc.col);
                    self.runtime_error(msg);
                    return;
                }
                for (target, item) in targets[..star].iter().zip(items.iter()) {
                    self.assign_target(target, item.clone());
                }
                let middle = items[star..items.len() - after].to_vec();
                self.assign_target(targets[star], Value::list(middle));
                for (target, item) in targets[star + 1..].iter().zip(items[items.len() - after..].iter()) {
                    self.assign_target(target, item.clone());
                }
            }
        }
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    pub(crate) fn eval(&mut self, expr: ExprRef<'a>) -> Value<'a> {
        if self.check() {
            return Value::Invalid;
        }
        match &expr.kind {
            ExprKind::Constant { value, .. } => self.constant_value(*value),

            ExprKind::Name { id, .. } => match self.lookup(*id) {
                Some(value) => value,
                None => {
                    let name = self.interner.resolve(*id).to_string();
                    self.runtime_error(format!("name '{}' is not defined", name))
                }
            },

            ExprKind::BinOp { left, op, right, native, method } => {
                let lhs = self.eval(left);
                let rhs = self.eval(right);
                if self.check() {
                    return Value::Invalid;
                }
                if let Some(f) = native.get() {
                    let result = f(&lhs, &rhs);
                    return self.check_native_result(result, *op, &lhs, &rhs, expr.loc);
                }
                if let Some(magic) = method.get() {
                    if let Some(bound) = self.instance_method(&lhs, magic) {
                        return self.invoke(bound, vec![rhs], expr.loc);
                    }
                }
                self.dynamic_binop(*op, lhs, rhs, expr.loc)
            }

            ExprKind::BoolOp { op, values, .. } => {
                // Short-circuit; the deciding operand is the result.
                let mut last = Value::None;
                for value in *values {
                    last = self.eval(value);
                    if self.check() {
                        return Value::Invalid;
                    }
                    match op {
                        BoolOperator::And if !last.is_truthy() => return last,
                        BoolOperator::Or if last.is_truthy() => return last,
                        _ => {}
                    }
                }
                last
            }

            ExprKind::UnaryOp { op, operand, native, method } => {
                let value = self.eval(operand);
                if self.check() {
                    return Value::Invalid;
                }
                if let Some(f) = native.get() {
                    let result = f(&value);
                    if !matches!(result, Value::Invalid) {
                        return result;
                    }
                }
                if let Some(magic) = method.get() {
                    if let Some(bound) = self.instance_method(&value, magic) {
                        return self.invoke(bound, vec![], expr.loc);
                    }
                }
                self.dynamic_unop(*op, value)
            }

            ExprKind::Compare { left, ops, comparators, natives, methods } => {
                let mut lhs = self.eval(left);
                for (index, (op, comparator)) in ops.iter().zip(comparators.iter()).enumerate() {
                    let rhs = self.eval(comparator);
                    if self.check() {
                        return Value::Invalid;
                    }
                    let holds = match natives[index].get() {
                        Some(f) => match f(&lhs, &rhs) {
                            Value::Bool(b) => b,
                            _ => self.dynamic_compare(*op, &lhs, &rhs),
                        },
                        None => {
                            // The magic-method closure sema resolved.
                            let magic = methods[index]
                                .get()
                                .and_then(|magic| self.instance_method(&lhs, magic));
                            match magic {
                                Some(bound) => {
                                    let result = self.invoke(bound, vec![rhs.clone()], expr.loc);
                                    result.is_truthy()
                                }
                                None => self.dynamic_compare(*op, &lhs, &rhs),
                            }
                        }
                    };
                    if self.check() {
                        return Value::Invalid;
                    }
                    if !holds {
                        return Value::Bool(false);
                    }
                    lhs = rhs;
                }
                Value::Bool(true)
            }

            ExprKind::NamedExpr { target, value } => {
                let value = self.eval(value);
                if self.check() {
                    return Value::Invalid;
                }
                self.assign_target(target, value.clone());
                value
            }

            ExprKind::Lambda { .. } => self.make_lambda(expr),

            ExprKind::IfExp { test, body, orelse } => {
                let test = self.eval(test);
                if self.check() {
                    return Value::Invalid;
                }
                if test.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }

            ExprKind::Dict { keys, values } => {
                let mut entries = Vec::new();
                for (key, value) in keys.iter().zip(values.iter()) {
                    let key = self.eval(key);
                    let value = self.eval(value);
                    if self.check() {
                        return Value::Invalid;
                    }
                    entries.push((key, value));
                }
                Value::Dict(Rc::new(RefCell::new(entries)))
            }

            ExprKind::Set { elts } => {
                let mut items: Vec<Value<'a>> = Vec::new();
                for elt in *elts {
                    let value = self.eval(elt);
                    if self.check() {
                        return Value::Invalid;
                    }
                    if !items.contains(&value) {
                        items.push(value);
                    }
                }
                Value::Set(Rc::new(RefCell::new(items)))
            }

            ExprKind::List { elts, .. } => {
                let mut items = Vec::new();
                for elt in *elts {
                    items.push(self.eval(elt));
                    if self.check() {
                        return Value::Invalid;
                    }
                }
                Value::list(items)
            }

            ExprKind::Tuple { elts, .. } => {
                let mut items = Vec::new();
                for elt in *elts {
                    items.push(self.eval(elt));
                    if self.check() {
                        return Value::Invalid;
                    }
                }
                Value::Tuple(Rc::new(items))
            }

            ExprKind::ListComp { elt, generators } => {
                let items = self.eval_comprehension(elt, None, generators);
                Value::list(items.into_iter().map(|(v, _)| v).collect())
            }
            ExprKind::SetComp { elt, generators } => {
                let items = self.eval_comprehension(elt, None, generators);
                let mut unique: Vec<Value<'a>> = Vec::new();
                for (item, _) in items {
                    if !unique.contains(&item) {
                        unique.push(item);
                    }
                }
                Value::Set(Rc::new(RefCell::new(unique)))
            }
            ExprKind::DictComp { key, value, generators } => {
                let items = self.eval_comprehension(key, Some(value), generators);
                let mut entries: Vec<(Value<'a>, Value<'a>)> = Vec::new();
                for (k, v) in items {
                    let v = v.unwrap_or(Value::None);
                    match entries.iter_mut().find(|(existing, _)| *existing == k) {
                        Some(slot) => slot.1 = v,
                        None => entries.push((k, v)),
                    }
                }
                Value::Dict(Rc::new(RefCell::new(entries)))
            }
            ExprKind::GeneratorExp { elt, generators } => {
                // Comprehension generators evaluate eagerly into a list
                // iterator; the lazy protocol stays observable through
                // user generator functions.
                let items = self.eval_comprehension(elt, None, generators);
                Value::list(items.into_iter().map(|(v, _)| v).collect())
            }

            ExprKind::Await { value } => {
                let awaited = self.eval(value);
                if self.check() {
                    return Value::Invalid;
                }
                match awaited {
                    // Synchronous await: drive a generator to completion.
                    Value::Generator(gen) => {
                        let mut last = Value::None;
                        while let Some(value) = self.advance_generator(&gen) {
                            last = value;
                            if self.check() {
                                return Value::Invalid;
                            }
                        }
                        self.clear_stop_iteration();
                        last
                    }
                    other => other,
                }
            }

            ExprKind::Yield { .. } | ExprKind::YieldFrom { .. } => {
                // Reached only outside a generator frame; inside one the
                // state machine intercepts the statement forms.
                self.runtime_error("'yield' outside generator")
            }

            ExprKind::Call { func, args, keywords } => self.eval_call(expr, func, args, keywords),

            ExprKind::Attribute { value, attr, offset, .. } => {
                let obj = self.eval(value);
                if self.check() {
                    return Value::Invalid;
                }
                self.eval_attribute(obj, *attr, offset.get(), expr.loc)
            }

            ExprKind::Subscript { value, slice, .. } => {
                let container = self.eval(value);
                if self.check() {
                    return Value::Invalid;
                }
                self.eval_subscript(container, slice)
            }

            ExprKind::Starred { value, .. } => self.eval(value),

            ExprKind::Slice { .. } => {
                // Standalone slices only appear inside subscripts, which
                // handle them directly.
                Value::None
            }

            ExprKind::FormattedValue { value, conversion, format_spec } => {
                let value = self.eval(value);
                if self.check() {
                    return Value::Invalid;
                }
                Value::string(self.format_value(&value, *conversion, *format_spec))
            }

            ExprKind::JoinedStr { values } => {
                let mut out = String::new();
                for value in *values {
                    let part = self.eval(value);
                    if self.check() {
                        return Value::Invalid;
                    }
                    out.push_str(&part.to_display_string());
                }
                Value::string(out)
            }

            ExprKind::NotImplemented => Value::Invalid,
        }
    }

    fn constant_value(&mut self, constant: ConstantValue) -> Value<'a> {
        match constant {
            ConstantValue::Int(v) => {
                if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
                    Value::I32(v as i32)
                } else {
                    Value::I64(v)
                }
            }
            ConstantValue::Float(v) => Value::F64(v),
            ConstantValue::Bool(v) => Value::Bool(v),
            ConstantValue::Str(sym) => Value::string(self.interner.resolve(sym).to_string()),
            ConstantValue::None => Value::None,
        }
    }

    // ==================================================================
    // Operators at runtime
    // ==================================================================

    /// A native operator returned `Invalid`: classify the failure.
    fn check_native_result(
        &mut self,
        result: Value<'a>,
        op: BinaryOperator,
        lhs: &Value<'a>,
        rhs: &Value<'a>,
        loc: Loc,
    ) -> Value<'a> {
        if !matches!(result, Value::Invalid) {
            return result;
        }
        let _ = loc;
        if matches!(op, BinaryOperator::Div | BinaryOperator::FloorDiv | BinaryOperator::Mod)
            && rhs.as_int() == Some(0)
        {
            return self.runtime_error("division by zero");
        }
        self.runtime_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.as_str(),
            lhs.tag().as_str(),
            rhs.tag().as_str()
        ))
    }

    /// Operator dispatch for nodes sema could not resolve statically
    /// (operands typed `Any`): try the native table by runtime tag, then
    /// the magic method on the left operand's class.
    fn dynamic_binop(&mut self, op: BinaryOperator, lhs: Value<'a>, rhs: Value<'a>, loc: Loc) -> Value<'a> {
        let key = binary_key(op.fingerprint(), lhs.tag().as_str(), rhs.tag().as_str());
        if let Some(f) = self.operators.binary(&key) {
            let result = f(&lhs, &rhs);
            return self.check_native_result(result, op, &lhs, &rhs, loc);
        }

        // Mixed numeric widths promote to f64 when either side is float.
        if lhs.is_numeric() && rhs.is_numeric() {
            if matches!(lhs.tag().as_str(), "f32" | "f64") || matches!(rhs.tag().as_str(), "f32" | "f64") {
                let key = binary_key(op.fingerprint(), "f64", "f64");
                if let Some(f) = self.operators.binary(&key) {
                    let a = Value::F64(lhs.as_float().unwrap_or(0.0));
                    let b = Value::F64(rhs.as_float().unwrap_or(0.0));
                    let result = f(&a, &b);
                    return self.check_native_result(result, op, &a, &b, loc);
                }
            } else {
                let key = binary_key(op.fingerprint(), "i64", "i64");
                if let Some(f) = self.operators.binary(&key) {
                    let a = Value::I64(lhs.as_int().unwrap_or(0));
                    let b = Value::I64(rhs.as_int().unwrap_or(0));
                    let result = f(&a, &b);
                    return self.check_native_result(result, op, &a, &b, loc);
                }
            }
        }

        // Container conveniences.
        match (&lhs, &rhs, op) {
            (Value::List(a), Value::List(b), BinaryOperator::Add) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                return Value::list(items);
            }
            (Value::Str(s), other, BinaryOperator::Mult) | (other, Value::Str(s), BinaryOperator::Mult) => {
                if let Some(n) = other.as_int() {
                    return Value::string(s.repeat(n.max(0) as usize));
                }
            }
            _ => {}
        }

        // Magic methods: lhs.__op__ then rhs.__rop__.
        for (receiver, argument, reverse) in [(&lhs, &rhs, false), (&rhs, &lhs, true)] {
            let magic = self.interner.intern(op.magic_name(reverse));
            if let Some(bound) = self.instance_method(receiver, magic) {
                return self.invoke(bound, vec![argument.clone()], loc);
            }
        }

        self.runtime_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.as_str(),
            lhs.tag().as_str(),
            rhs.tag().as_str()
        ))
    }

    fn dynamic_unop(&mut self, op: UnaryOperator, value: Value<'a>) -> Value<'a> {
        match op {
            UnaryOperator::Not => Value::Bool(!value.is_truthy()),
            UnaryOperator::UAdd => value,
            UnaryOperator::USub => match &value {
                Value::F64(v) => Value::F64(-v),
                Value::F32(v) => Value::F32(-v),
                other => match other.as_int() {
                    Some(v) => Value::I64(-v),
                    None => self.runtime_error(format!("bad operand type for unary -: '{}'", value.tag().as_str())),
                },
            },
            UnaryOperator::Invert => match value.as_int() {
                Some(v) => Value::I64(!v),
                None => self.runtime_error(format!("bad operand type for unary ~: '{}'", value.tag().as_str())),
            },
        }
    }

    fn values_identical(a: &Value<'a>, b: &Value<'a>) -> bool {
        match (a, b) {
            (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
            (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
            (Value::Set(x), Value::Set(y)) => Rc::ptr_eq(x, y),
            (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
            (Value::Object(x), Value::Object(y)) => Rc::ptr_eq(x, y),
            _ => a == b,
        }
    }

    fn dynamic_compare(&mut self, op: CmpOperator, lhs: &Value<'a>, rhs: &Value<'a>) -> bool {
        match op {
            CmpOperator::Eq => lhs == rhs,
            CmpOperator::NotEq => lhs != rhs,
            CmpOperator::Is => Self::values_identical(lhs, rhs),
            CmpOperator::IsNot => !Self::values_identical(lhs, rhs),
            CmpOperator::In | CmpOperator::NotIn => {
                let contained = match rhs {
                    Value::List(items) => items.borrow().iter().any(|i| i == lhs),
                    Value::Tuple(items) => items.iter().any(|i| i == lhs),
                    Value::Set(items) => items.borrow().iter().any(|i| i == lhs),
                    Value::Dict(entries) => entries.borrow().iter().any(|(k, _)| k == lhs),
                    Value::Str(haystack) => match lhs {
                        Value::Str(needle) => haystack.contains(needle.as_str()),
                        _ => false,
                    },
                    other => {
                        self.runtime_error(format!("'{}' is not a container", other.tag().as_str()));
                        return false;
                    }
                };
                if op == CmpOperator::In {
                    contained
                } else {
                    !contained
                }
            }
            CmpOperator::Lt | CmpOperator::LtE | CmpOperator::Gt | CmpOperator::GtE => {
                if matches!(lhs, Value::Object(_)) {
                    if let Some(name) = op.magic_name(false) {
                        let magic = self.interner.intern(name);
                        if let Some(bound) = self.instance_method(lhs, magic) {
                            let result = self.invoke(bound, vec![rhs.clone()], Loc::default());
                            return result.is_truthy();
                        }
                    }
                }
                let ordering = match (lhs, rhs) {
                    (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
                    _ => match (lhs.as_float(), rhs.as_float()) {
                        (Some(a), Some(b)) => a.partial_cmp(&b),
                        _ => None,
                    },
                };
                match ordering {
                    Some(ordering) => match op {
                        CmpOperator::Lt => ordering.is_lt(),
                        CmpOperator::LtE => ordering.is_le(),
                        CmpOperator::Gt => ordering.is_gt(),
                        CmpOperator::GtE => ordering.is_ge(),
                        _ => false,
                    },
                    None => {
                        self.runtime_error(format!(
                            "'{}' not supported between '{}' and '{}'",
                            op.as_str(),
                            lhs.tag().as_str(),
                            rhs.tag().as_str()
                        ));
                        false
                    }
                }
            }
        }
    }

    // ==================================================================
    // Attributes, subscripts, formatting
    // ==================================================================

    fn eval_attribute(&mut self, obj: Value<'a>, attr: Symbol, offset: i32, loc: Loc) -> Value<'a> {
        match &obj {
            Value::Object(instance) => {
                let slot = if offset >= 0 {
                    offset
                } else {
                    self.registry
                        .class(instance.class_id)
                        .and_then(|meta| meta.get_attribute(attr))
                        .map(|a| a.offset)
                        .unwrap_or(-1)
                };
                if slot < 0 {
                    let name = self.interner.resolve(attr).to_string();
                    return self.runtime_error(format!("object has no attribute '{}'", name));
                }
                let value = instance.attrs.borrow()[slot as usize].clone();
                let is_method = self
                    .registry
                    .class(instance.class_id)
                    .map(|meta| meta.attributes.get(slot as usize).map(|a| a.is_method).unwrap_or(false))
                    .unwrap_or(false);
                if is_method {
                    if let Value::Closure(closure) = value {
                        return Value::BoundMethod(Rc::new(BoundMethod {
                            receiver: obj.clone(),
                            closure,
                        }));
                    }
                }
                value
            }
            Value::Module(module) => {
                let Some(env) = self.ensure_module_env(*module) else {
                    let name = self.interner.resolve(*module).to_string();
                    return self.runtime_error(format!("no module named '{}'", name));
                };
                match env.iter().rev().find(|(n, _)| *n == attr) {
                    Some((_, value)) => value.clone(),
                    None => {
                        let name = self.interner.resolve(attr).to_string();
                        self.runtime_error(format!("module has no attribute '{}'", name))
                    }
                }
            }
            Value::Exception(exc) => {
                let name = self.interner.resolve(attr).to_string();
                if name == "message" {
                    return Value::string(exc.message.clone());
                }
                self.runtime_error(format!("exception has no attribute '{}'", name))
            }
            other => {
                let _ = loc;
                let name = self.interner.resolve(attr).to_string();
                self.runtime_error(format!(
                    "'{}' object has no attribute '{}'",
                    other.tag().as_str(),
                    name
                ))
            }
        }
    }

    fn eval_subscript(&mut self, container: Value<'a>, slice: ExprRef<'a>) -> Value<'a> {
        if let ExprKind::Slice { lower, upper, step } = &slice.kind {
            let lower = lower.map(|e| self.eval(e)).and_then(|v| v.as_int());
            let upper = upper.map(|e| self.eval(e)).and_then(|v| v.as_int());
            let step = step.map(|e| self.eval(e)).and_then(|v| v.as_int()).unwrap_or(1);
            if self.check() {
                return Value::Invalid;
            }
            return self.eval_slice(container, lower, upper, step);
        }

        let index = self.eval(slice);
        if self.check() {
            return Value::Invalid;
        }
        match &container {
            Value::List(items) => {
                let items = items.borrow();
                self.index_sequence(&items, &index)
            }
            Value::Tuple(items) => self.index_sequence(items, &index),
            Value::Str(text) => match index.as_int() {
                Some(raw) => {
                    let chars: Vec<char> = text.chars().collect();
                    let idx = if raw < 0 { raw + chars.len() as i64 } else { raw };
                    if idx < 0 || idx >= chars.len() as i64 {
                        return self.runtime_error("string index out of range");
                    }
                    Value::string(chars[idx as usize].to_string())
                }
                None => self.runtime_error("string indices must be integers"),
            },
            Value::Dict(entries) => {
                let found = entries.borrow().iter().find(|(k, _)| *k == index).map(|(_, v)| v.clone());
                match found {
                    Some(value) => value,
                    None => self.runtime_error(format!("key not found: {}", index.to_repr_string())),
                }
            }
            other => self.runtime_error(format!("'{}' is not subscriptable", other.tag().as_str())),
        }
    }

    fn index_sequence(&mut self, items: &[Value<'a>], index: &Value<'a>) -> Value<'a> {
        match index.as_int() {
            Some(raw) => {
                let len = items.len() as i64;
                let idx = if raw < 0 { raw + len } else { raw };
                if idx < 0 || idx >= len {
                    return self.runtime_error("index out of range");
                }
                items[idx as usize].clone()
            }
            None => self.runtime_error("indices must be integers"),
        }
    }

    fn eval_slice(&mut self, container: Value<'a>, lower: Option<i64>, upper: Option<i64>, step: i64) -> Value<'a> {
        if step == 0 {
            return self.runtime_error("slice step cannot be zero");
        }
        let items: Vec<Value<'a>> = match &container {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.as_ref().clone(),
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let sliced = slice_indices(chars.len(), lower, upper, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect::<String>();
                return Value::string(sliced);
            }
            other => return self.runtime_error(format!("'{}' cannot be sliced", other.tag().as_str())),
        };
        let sliced: Vec<Value<'a>> = slice_indices(items.len(), lower, upper, step)
            .into_iter()
            .map(|i| items[i].clone())
            .collect();
        Value::list(sliced)
    }

    fn format_value(&mut self, value: &Value<'a>, conversion: Option<char>, format_spec: Option<Symbol>) -> String {
        let text = match conversion {
            Some('r') => value.to_repr_string(),
            _ => value.to_display_string(),
        };
        let Some(spec) = format_spec else { return text };
        let spec = FormatSpec::parse(self.interner.resolve(spec));
        match value {
            Value::F32(_) | Value::F64(_) => spec.apply_float(value.as_float().unwrap_or(0.0)),
            Value::Bool(_) => spec.apply_str(&text),
            other => match other.as_int() {
                Some(v) => spec.apply_int(v),
                None => spec.apply_str(&text),
            },
        }
    }

    // ==================================================================
    // Calls
    // ==================================================================

    fn make_closure(&mut self, def: &'a FunctionDef<'a>) -> Rc<Closure<'a>> {
        let env = self.frames.last().map(|frame| frame.env.clone()).unwrap_or_default();
        Rc::new(Closure { def, env })
    }

    /// Lambdas run through the same calling convention as named
    /// functions: a synthetic single-return `FunctionDef` wraps the body
    /// in the transient arena.
    fn make_lambda(&mut self, expr: ExprRef<'a>) -> Value<'a> {
        use std::cell::Cell;
        let ExprKind::Lambda { args, body } = &expr.kind else { return Value::Invalid };
        let name = self.interner.intern("<lambda>");
        let stmt = self
            .transient
            .alloc(crate::ast::Stmt::new(body.loc, StmtKind::Return { value: Some(body) }));
        let body_slice = self.transient.alloc_slice([&*stmt]);
        let def = self.transient.alloc(FunctionDef {
            name,
            args: **args,
            body: body_slice,
            decorators: &[],
            returns: None,
            docstring: None,
            is_async: false,
            generator: Cell::new(false),
            arrow: Cell::new(crate::sema::types::TypeId::UNKNOWN),
        });
        let env = self.frames.last().map(|frame| frame.env.clone()).unwrap_or_default();
        Value::Closure(Rc::new(Closure { def, env }))
    }

    fn instance_method(&mut self, receiver: &Value<'a>, name: Symbol) -> Option<Value<'a>> {
        match receiver {
            Value::Object(instance) => {
                let attr = self.registry.class(instance.class_id)?.get_attribute(name)?;
                if !attr.is_method || attr.offset < 0 {
                    return None;
                }
                let value = instance.attrs.borrow()[attr.offset as usize].clone();
                match value {
                    Value::Closure(closure) => Some(Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: receiver.clone(),
                        closure,
                    }))),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn magic_method(&mut self, receiver: &Value<'a>, name: &str) -> Option<Value<'a>> {
        let sym = self.interner.intern(name);
        self.instance_method(receiver, sym)
    }

    fn eval_call(
        &mut self,
        expr: ExprRef<'a>,
        func: ExprRef<'a>,
        args: &'a [ExprRef<'a>],
        keywords: &'a [Keyword<'a>],
    ) -> Value<'a> {
        let callee = self.eval(func);
        if self.check() {
            return Value::Invalid;
        }

        // Positional arguments, with `*expr` unpacking.
        let mut positional: Vec<Value<'a>> = Vec::new();
        for arg in args {
            if let ExprKind::Starred { value, .. } = &arg.kind {
                let unpacked = self.eval(value);
                if self.check() {
                    return Value::Invalid;
                }
                match unpacked {
                    Value::List(items) => positional.extend(items.borrow().iter().cloned()),
                    Value::Tuple(items) => positional.extend(items.iter().cloned()),
                    other => {
                        return self.runtime_error(format!("cannot unpack '{}'", other.tag().as_str()));
                    }
                }
            } else {
                positional.push(self.eval(arg));
                if self.check() {
                    return Value::Invalid;
                }
            }
        }

        // Keyword arguments, with `**expr` unpacking.
        let mut named: Vec<(Symbol, Value<'a>)> = Vec::new();
        for keyword in keywords {
            match keyword.arg {
                Some(name) => {
                    let value = self.eval(keyword.value);
                    if self.check() {
                        return Value::Invalid;
                    }
                    named.push((name, value));
                }
                None => {
                    let unpacked = self.eval(keyword.value);
                    if self.check() {
                        return Value::Invalid;
                    }
                    match unpacked {
                        Value::Dict(entries) => {
                            for (key, value) in entries.borrow().iter() {
                                if let Value::Str(name) = key {
                                    let sym = self.interner.intern(name.as_str());
                                    named.push((sym, value.clone()));
                                }
                            }
                        }
                        other => {
                            return self.runtime_error(format!(
                                "argument after ** must be a dict, not '{}'",
                                other.tag().as_str()
                            ));
                        }
                    }
                }
            }
        }

        self.invoke_with_keywords(callee, positional, named, expr.loc)
    }

    pub(crate) fn invoke(&mut self, callee: Value<'a>, args: Vec<Value<'a>>, loc: Loc) -> Value<'a> {
        self.invoke_with_keywords(callee, args, Vec::new(), loc)
    }

    fn invoke_with_keywords(
        &mut self,
        callee: Value<'a>,
        positional: Vec<Value<'a>>,
        named: Vec<(Symbol, Value<'a>)>,
        loc: Loc,
    ) -> Value<'a> {
        match callee {
            Value::Native(f) => match f(&mut self.sink, &positional) {
                Ok(value) => value,
                Err(message) => self.runtime_error(message),
            },
            Value::Closure(closure) => self.call_closure(closure, None, positional, named, loc),
            Value::BoundMethod(method) => {
                let receiver = method.receiver.clone();
                self.call_closure(method.closure.clone(), Some(receiver), positional, named, loc)
            }
            Value::Class(def) => self.construct(def, positional, named, loc),
            Value::BuiltinClass(class_id) => {
                let message = positional.first().map(Value::to_display_string).unwrap_or_default();
                let class_name = self
                    .registry
                    .class(class_id)
                    .map(|meta| self.interner.resolve(meta.name).to_string())
                    .unwrap_or_else(|| "Exception".to_string());
                Value::Exception(Rc::new(ExceptionValue {
                    class_id,
                    class_name,
                    message,
                    payload: None,
                }))
            }
            other => {
                // Invoking a non-callable produces Invalid and an error.
                self.runtime_error(format!("'{}' object is not callable", other.tag().as_str()))
            }
        }
    }

    fn call_closure(
        &mut self,
        closure: Rc<Closure<'a>>,
        receiver: Option<Value<'a>>,
        positional: Vec<Value<'a>>,
        named: Vec<(Symbol, Value<'a>)>,
        loc: Loc,
    ) -> Value<'a> {
        if self.depth >= MAX_DEPTH {
            return self.runtime_error("maximum recursion depth exceeded");
        }

        let def = closure.def;
        let mut env = closure.env.clone();
        // Self-binding makes recursion work for nested functions.
        env.push((def.name, Value::Closure(closure.clone())));

        match self.bind_parameters(def, receiver, positional, named, &mut env, loc) {
            Ok(()) => {}
            Err(message) => return self.runtime_error(message),
        }

        if def.generator.get() {
            return Value::Generator(Rc::new(RefCell::new(GeneratorState::new(def, env))));
        }

        self.depth += 1;
        self.push_frame(env);
        let flow = self.exec_block(def.body);
        self.pop_frame();
        self.depth -= 1;

        match flow {
            Flow::Return(value) => value,
            _ => Value::None,
        }
    }

    /// Binds positional and keyword arguments against the declaration,
    /// respecting defaults, `*args` and `**kwargs`.
    fn bind_parameters(
        &mut self,
        def: &'a FunctionDef<'a>,
        receiver: Option<Value<'a>>,
        positional: Vec<Value<'a>>,
        named: Vec<(Symbol, Value<'a>)>,
        env: &mut Vec<(Symbol, Value<'a>)>,
        _loc: Loc,
    ) -> Result<(), String> {
        let params: Vec<&crate::ast::expr::Arg<'a>> =
            def.args.posonlyargs.iter().chain(def.args.args.iter()).collect();

        let mut supplied: Vec<Option<Value<'a>>> = vec![None; params.len()];
        let mut cursor = 0usize;

        if let Some(receiver) = receiver {
            if params.is_empty() {
                return Err(format!(
                    "method '{}' takes no parameters",
                    self.interner.resolve(def.name)
                ));
            }
            supplied[0] = Some(receiver);
            cursor = 1;
        }

        let mut extra: Vec<Value<'a>> = Vec::new();
        for value in positional {
            if cursor < params.len() {
                supplied[cursor] = Some(value);
                cursor += 1;
            } else {
                extra.push(value);
            }
        }

        let mut leftovers: Vec<(Symbol, Value<'a>)> = Vec::new();
        let mut kwonly: Vec<(Symbol, Value<'a>)> = Vec::new();
        for (name, value) in named {
            if let Some(index) = params.iter().position(|p| p.name == name) {
                if supplied[index].is_some() {
                    return Err(format!(
                        "got multiple values for argument '{}'",
                        self.interner.resolve(name)
                    ));
                }
                supplied[index] = Some(value);
            } else if def.args.kwonlyargs.iter().any(|p| p.name == name) {
                kwonly.push((name, value));
            } else if def.args.kwarg.is_some() {
                leftovers.push((name, value));
            } else {
                return Err(format!(
                    "unexpected keyword argument '{}'",
                    self.interner.resolve(name)
                ));
            }
        }

        // Defaults for trailing positional parameters.
        let default_base = params.len().saturating_sub(def.args.defaults.len());
        for (index, slot) in supplied.iter_mut().enumerate() {
            if slot.is_none() {
                if index >= default_base {
                    let default = def.args.defaults[index - default_base];
                    let value = self.eval(default);
                    *slot = Some(value);
                } else {
                    return Err(format!(
                        "missing required argument '{}'",
                        self.interner.resolve(params[index].name)
                    ));
                }
            }
        }

        for (param, value) in params.iter().zip(supplied) {
            env.push((param.name, value.expect("filled above")));
        }

        match def.args.vararg {
            Some(vararg) => env.push((vararg.name, Value::list(extra))),
            None => {
                if !extra.is_empty() {
                    return Err(format!(
                        "too many positional arguments for '{}'",
                        self.interner.resolve(def.name)
                    ));
                }
            }
        }

        for (index, param) in def.args.kwonlyargs.iter().enumerate() {
            match kwonly.iter().position(|(n, _)| *n == param.name) {
                Some(pos) => {
                    let (_, value) = kwonly.remove(pos);
                    env.push((param.name, value));
                }
                None => match def.args.kw_defaults.get(index).copied().flatten() {
                    Some(default) => {
                        let value = self.eval(default);
                        env.push((param.name, value));
                    }
                    None => {
                        return Err(format!(
                            "missing required keyword argument '{}'",
                            self.interner.resolve(param.name)
                        ));
                    }
                },
            }
        }

        if let Some(kwarg) = def.args.kwarg {
            let entries: Vec<(Value<'a>, Value<'a>)> = leftovers
                .into_iter()
                .map(|(name, value)| {
                    let key = Value::string(self.interner.resolve(name).to_string());
                    (key, value)
                })
                .collect();
            env.push((kwarg.name, Value::Dict(Rc::new(RefCell::new(entries)))));
        }

        Ok(())
    }

    /// Instantiates a user class: field initializers first, then either
    /// `__init__` or positional/keyword field override.
    fn construct(
        &mut self,
        def: &'a ClassDef<'a>,
        positional: Vec<Value<'a>>,
        named: Vec<(Symbol, Value<'a>)>,
        loc: Loc,
    ) -> Value<'a> {
        let class_id = def.class_id.get();
        let Some(meta) = self.registry.class(class_id) else {
            return self.runtime_error("class was not analyzed");
        };

        let attr_specs: Vec<(Symbol, bool, Option<StmtRef<'a>>)> = meta
            .attributes
            .iter()
            .map(|attr| (attr.name, attr.is_method, attr.stmt))
            .collect();

        let mut slots: Vec<Value<'a>> = Vec::with_capacity(attr_specs.len());
        for (_, is_method, stmt) in &attr_specs {
            if *is_method {
                let closure = match stmt.map(|s| &s.kind) {
                    Some(StmtKind::FunctionDef(method_def)) => {
                        Value::Closure(self.make_closure(method_def))
                    }
                    _ => Value::None,
                };
                slots.push(closure);
            } else {
                let initial = match stmt.map(|s| &s.kind) {
                    Some(StmtKind::AnnAssign { value: Some(value), .. }) => self.eval(value),
                    Some(StmtKind::Assign { value, .. }) => self.eval(value),
                    _ => Value::None,
                };
                if self.check() {
                    return Value::Invalid;
                }
                slots.push(initial);
            }
        }

        let instance = Rc::new(Instance {
            class: def,
            class_id,
            attrs: RefCell::new(slots),
        });
        let object = Value::Object(instance.clone());

        let init_name = self.interner.intern("__init__");
        let has_init = attr_specs.iter().any(|(name, is_method, _)| *is_method && *name == init_name);
        if has_init {
            if let Some(init) = self.instance_method(&object, init_name) {
                self.invoke_with_keywords(init, positional, named, loc);
                if self.check() {
                    return Value::Invalid;
                }
            }
            return object;
        }

        // Constructor-by-fields: positionals in declaration order, then
        // keywords by name.
        let field_offsets: Vec<usize> = attr_specs
            .iter()
            .enumerate()
            .filter(|(_, (_, is_method, _))| !is_method)
            .map(|(offset, _)| offset)
            .collect();

        if positional.len() > field_offsets.len() {
            return self.runtime_error(format!(
                "{}() takes at most {} arguments",
                self.interner.resolve(def.name),
                field_offsets.len()
            ));
        }
        for (value, offset) in positional.into_iter().zip(field_offsets.iter()) {
            instance.attrs.borrow_mut()[*offset] = value;
        }
        for (name, value) in named {
            match attr_specs.iter().position(|(n, is_method, _)| !is_method && *n == name) {
                Some(offset) => instance.attrs.borrow_mut()[offset] = value,
                None => {
                    let name = self.interner.resolve(name).to_string();
                    return self.runtime_error(format!("unexpected field '{}'", name));
                }
            }
        }

        object
    }

    // ==================================================================
    // Iteration and comprehensions
    // ==================================================================

    pub(crate) fn make_iterator(&mut self, value: Value<'a>, loc: Loc) -> Option<ValueIter<'a>> {
        let _ = loc;
        match value {
            Value::List(items) => Some(ValueIter::Items(items.borrow().clone(), 0)),
            Value::Tuple(items) => Some(ValueIter::Items(items.as_ref().clone(), 0)),
            Value::Set(items) => Some(ValueIter::Items(items.borrow().clone(), 0)),
            Value::Dict(entries) => {
                let keys: Vec<Value<'a>> = entries.borrow().iter().map(|(k, _)| k.clone()).collect();
                Some(ValueIter::Items(keys, 0))
            }
            Value::Str(text) => {
                let chars: Vec<Value<'a>> = text.chars().map(|c| Value::string(c.to_string())).collect();
                Some(ValueIter::Items(chars, 0))
            }
            Value::Generator(gen) => Some(ValueIter::Generator(gen)),
            object @ Value::Object(_) => {
                // The __iter__/__next__ protocol.
                match self.magic_method(&object, "__iter__") {
                    Some(method) => {
                        let iterator = self.invoke(method, vec![], loc);
                        if self.check() {
                            return None;
                        }
                        Some(ValueIter::Protocol(iterator))
                    }
                    None => {
                        self.runtime_error("object is not iterable");
                        None
                    }
                }
            }
            other => {
                self.runtime_error(format!("'{}' is not iterable", other.tag().as_str()));
                None
            }
        }
    }

    pub(crate) fn iterator_next(&mut self, iterator: &mut ValueIter<'a>) -> Option<Value<'a>> {
        match iterator {
            ValueIter::Items(items, index) => {
                if *index < items.len() {
                    let item = items[*index].clone();
                    *index += 1;
                    Some(item)
                } else {
                    None
                }
            }
            ValueIter::Generator(gen) => {
                let gen = gen.clone();
                let next = self.advance_generator(&gen);
                if next.is_none() {
                    self.clear_stop_iteration();
                }
                next
            }
            ValueIter::Protocol(object) => {
                let object = object.clone();
                let next = self.magic_method(&object, "__next__")?;
                let value = self.invoke(next, vec![], Loc::default());
                if self.stop_iteration_pending() {
                    self.clear_stop_iteration();
                    return None;
                }
                if self.check() {
                    return None;
                }
                Some(value)
            }
        }
    }

    pub(crate) fn stop_iteration_pending(&self) -> bool {
        self.exception
            .as_ref()
            .map(|exc| exc.class_id == self.registry.stop_iteration_class)
            .unwrap_or(false)
    }

    pub(crate) fn clear_stop_iteration(&mut self) {
        if self.stop_iteration_pending() {
            self.exception = None;
        }
    }

    /// Evaluates comprehension generators in a nested scope, yielding
    /// `(elt, value?)` pairs (the second slot serves dict comps).
    fn eval_comprehension(
        &mut self,
        elt: ExprRef<'a>,
        value: Option<ExprRef<'a>>,
        generators: &'a [crate::ast::expr::Comprehension<'a>],
    ) -> Vec<(Value<'a>, Option<Value<'a>>)> {
        // The comprehension runs in its own scope seeded from the
        // current one.
        let seed = self.frames.last().map(|f| f.env.clone()).unwrap_or_default();
        self.push_frame(seed);
        let mut out = Vec::new();
        self.comprehension_level(elt, value, generators, 0, &mut out);
        self.pop_frame();
        out
    }

    fn comprehension_level(
        &mut self,
        elt: ExprRef<'a>,
        value: Option<ExprRef<'a>>,
        generators: &'a [crate::ast::expr::Comprehension<'a>],
        level: usize,
        out: &mut Vec<(Value<'a>, Option<Value<'a>>)>,
    ) {
        if self.check() {
            return;
        }
        let Some(generator) = generators.get(level) else {
            let key = self.eval(elt);
            if self.check() {
                return;
            }
            let val = value.map(|v| self.eval(v));
            out.push((key, val));
            return;
        };

        let iterable = self.eval(generator.iter);
        if self.check() {
            return;
        }
        let Some(mut iterator) = self.make_iterator(iterable, generator.iter.loc) else {
            return;
        };
        'items: while let Some(item) = self.iterator_next(&mut iterator) {
            if self.check() {
                return;
            }
            self.assign_target(generator.target, item);
            for cond in generator.ifs {
                let keep = self.eval(cond);
                if self.check() {
                    return;
                }
                if !keep.is_truthy() {
                    continue 'items;
                }
            }
            self.comprehension_level(elt, value, generators, level + 1, out);
        }
    }

    // ==================================================================
    // Modules at runtime
    // ==================================================================

    /// Evaluates (once) and returns the environment of an imported
    /// module.
    fn ensure_module_env(&mut self, name: Symbol) -> Option<Rc<Vec<(Symbol, Value<'a>)>>> {
        if let Some(env) = self.module_envs.get(&name) {
            return Some(env.clone());
        }
        let module_name = self.interner.resolve(name).to_string();
        let source = self.imports.get(&module_name)?;

        let env = match source {
            ModuleSource::Native { exports } => {
                let env: Vec<(Symbol, Value<'a>)> =
                    exports.iter().map(|e| (e.name, Value::Native(e.func))).collect();
                Rc::new(env)
            }
            ModuleSource::Parsed { module, .. } => {
                let module = *module;
                // Evaluate the module body in a fresh global environment.
                let saved_globals = std::mem::replace(
                    &mut self.globals,
                    builtins::builtin_values(self.interner, self.registry),
                );
                let saved_frames = std::mem::take(&mut self.frames);
                self.eval_module(module);
                let env = std::mem::replace(&mut self.globals, saved_globals);
                self.frames = saved_frames;
                Rc::new(env)
            }
        };

        self.module_envs.insert(name, env.clone());
        Some(env)
    }

    // ==================================================================
    // Patterns
    // ==================================================================

    fn try_match(
        &mut self,
        pattern: PatRef<'a>,
        subject: &Value<'a>,
        captured: &mut Vec<(Symbol, Value<'a>)>,
    ) -> bool {
        match &pattern.kind {
            PatKind::MatchValue { value } => {
                let expected = self.eval(value);
                !self.check() && expected == *subject
            }
            PatKind::MatchSingleton { value } => {
                let expected = self.constant_value(*value);
                expected == *subject
            }
            PatKind::MatchSequence { patterns } => {
                let items: Vec<Value<'a>> = match subject {
                    Value::List(items) => items.borrow().clone(),
                    Value::Tuple(items) => items.as_ref().clone(),
                    _ => return false,
                };
                let star = patterns
                    .iter()
                    .position(|p| matches!(p.kind, PatKind::MatchStar { .. }));
                match star {
                    None => {
                        if items.len() != patterns.len() {
                            return false;
                        }
                        patterns
                            .iter()
                            .zip(items.iter())
                            .all(|(p, item)| self.try_match(p, item, captured))
                    }
                    Some(star) => {
                        let after = patterns.len() - star - 1;
                        if items.len() < patterns.len() - 1 {
                            return false;
                        }
                        for (p, item) in patterns[..star].iter().zip(items.iter()) {
                            if !self.try_match(p, item, captured) {
                                return false;
                            }
                        }
                        for (p, item) in patterns[star + 1..].iter().zip(items[items.len() - after..].iter()) {
                            if !self.try_match(p, item, captured) {
                                return false;
                            }
                        }
                        if let PatKind::MatchStar { name: Some(name) } = &patterns[star].kind {
                            let middle = items[star..items.len() - after].to_vec();
                            captured.push((*name, Value::list(middle)));
                        }
                        true
                    }
                }
            }
            PatKind::MatchMapping { keys, patterns, rest } => {
                let Value::Dict(entries) = subject else { return false };
                let entries_snapshot = entries.borrow().clone();
                let mut matched_keys: Vec<Value<'a>> = Vec::new();
                for (key_expr, sub) in keys.iter().zip(patterns.iter()) {
                    let key = self.eval(key_expr);
                    if self.check() {
                        return false;
                    }
                    let Some((_, value)) = entries_snapshot.iter().find(|(k, _)| *k == key) else {
                        return false;
                    };
                    if !self.try_match(sub, value, captured) {
                        return false;
                    }
                    matched_keys.push(key);
                }
                if let Some(rest) = rest {
                    let remaining: Vec<(Value<'a>, Value<'a>)> = entries_snapshot
                        .into_iter()
                        .filter(|(k, _)| !matched_keys.contains(k))
                        .collect();
                    captured.push((*rest, Value::Dict(Rc::new(RefCell::new(remaining)))));
                }
                true
            }
            PatKind::MatchClass { cls, patterns, kwd_attrs, kwd_patterns } => {
                let class_value = self.eval(cls);
                if self.check() {
                    return false;
                }
                let Value::Object(instance) = subject else { return false };
                let matches_class = match class_value {
                    Value::Class(def) => def.class_id.get() == instance.class_id,
                    Value::BuiltinClass(id) => id == instance.class_id,
                    _ => false,
                };
                if !matches_class {
                    return false;
                }
                let Some(meta) = self.registry.class(instance.class_id) else { return false };
                let fields: Vec<i32> = meta
                    .attributes
                    .iter()
                    .filter(|a| !a.is_method)
                    .map(|a| a.offset)
                    .collect();
                let named_offsets: Vec<(Symbol, i32)> =
                    meta.attributes.iter().map(|a| (a.name, a.offset)).collect();

                for (index, sub) in patterns.iter().enumerate() {
                    let Some(offset) = fields.get(index) else { return false };
                    let value = instance.attrs.borrow()[*offset as usize].clone();
                    if !self.try_match(sub, &value, captured) {
                        return false;
                    }
                }
                for (attr, sub) in kwd_attrs.iter().zip(kwd_patterns.iter()) {
                    let Some((_, offset)) = named_offsets.iter().find(|(n, _)| n == attr) else {
                        return false;
                    };
                    let value = instance.attrs.borrow()[*offset as usize].clone();
                    if !self.try_match(sub, &value, captured) {
                        return false;
                    }
                }
                true
            }
            PatKind::MatchStar { name } => {
                if let Some(name) = name {
                    captured.push((*name, subject.clone()));
                }
                true
            }
            PatKind::MatchAs { pattern: inner, name } => {
                if let Some(inner) = inner {
                    if !self.try_match(inner, subject, captured) {
                        return false;
                    }
                }
                if let Some(name) = name {
                    captured.push((*name, subject.clone()));
                }
                true
            }
            PatKind::MatchOr { patterns } => {
                for sub in *patterns {
                    if self.try_match(sub, subject, captured) {
                        return true;
                    }
                }
                false
            }
        }
    }
}

/// A live iteration over a runtime value.
pub(crate) enum ValueIter<'a> {
    Items(Vec<Value<'a>>, usize),
    Generator(Rc<RefCell<GeneratorState<'a>>>),
    Protocol(Value<'a>),
}

/// Normalized index sequence for a slice over a len-sized sequence.
fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let normalize = |v: i64| -> i64 {
        if v < 0 {
            (v + len).clamp(0, len)
        } else {
            v.clamp(0, len)
        }
    };
    let mut out = Vec::new();
    if step > 0 {
        let start = normalize(lower.unwrap_or(0));
        let stop = normalize(upper.unwrap_or(len));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        let start = match lower {
            Some(v) => normalize(v).min(len - 1),
            None => len - 1,
        };
        let stop = match upper {
            Some(v) => normalize(v),
            None => -1,
        };
        let mut i = start;
        while i > stop && i >= 0 {
            out.push(i as usize);
            i += step;
        }
    }
    out
}
