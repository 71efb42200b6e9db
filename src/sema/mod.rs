//! Semantic analysis: name resolution, type inference, operator
//! resolution, import chasing and class attribute layout.
//!
//! The analyzer mutates the tree in place — varids on names, native
//! operators on operator nodes, attribute offsets, class ids, function
//! arrows — and collects every diagnostic instead of stopping at the
//! first. A node that could not be resolved keeps `TypeId::UNKNOWN`,
//! which downstream checks treat as "already reported, skip" to avoid
//! error cascades.

pub mod bindings;
mod import;
pub mod types;

#[cfg(test)]
mod tests;

use crate::arena::Arena;
use crate::ast::expr::{Arguments, Comprehension, ExprKind, ExprRef};
use crate::ast::ops::{BinaryOperator, CmpOperator, UnaryOperator};
use crate::ast::pattern::{PatKind, PatRef};
use crate::ast::stmt::{ClassDef, FunctionDef, StmtKind, StmtRef};
use crate::ast::{ConstantValue, Loc, Module};
use crate::builtins::{self, binary_key, unary_key, NativeOperators};
use crate::error::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::importlib::ImportLib;
use crate::intern::{Interner, Symbol};
use crate::suggest::find_similar;

use bindings::Bindings;
use types::{primitive_by_name, Arrow, TypeId, TypeKind, TypeRegistry};

struct FuncCtx {
    declared_ret: TypeId,
    inferred_ret: TypeId,
    has_yield: bool,
    yield_ty: TypeId,
}

pub struct SemanticAnalyser<'a, 'ctx> {
    pub(crate) arena: &'a Arena,
    pub(crate) interner: &'ctx mut Interner,
    pub(crate) registry: &'ctx mut TypeRegistry<'a>,
    pub(crate) imports: &'ctx mut ImportLib<'a>,
    pub(crate) operators: &'ctx NativeOperators,
    pub errors: DiagnosticSink,
    pub(crate) bindings: Bindings<'a>,
    file: String,
    func_stack: Vec<FuncCtx>,
    class_stack: Vec<i32>,
}

impl<'a, 'ctx> SemanticAnalyser<'a, 'ctx> {
    pub fn new(
        arena: &'a Arena,
        interner: &'ctx mut Interner,
        registry: &'ctx mut TypeRegistry<'a>,
        imports: &'ctx mut ImportLib<'a>,
        operators: &'ctx NativeOperators,
    ) -> Self {
        let mut bindings = Bindings::new();
        builtins::register_builtins(&mut bindings, registry, interner);
        SemanticAnalyser {
            arena,
            interner,
            registry,
            imports,
            operators,
            errors: DiagnosticSink::new(),
            bindings,
            file: String::new(),
            func_stack: Vec::new(),
            class_stack: Vec::new(),
        }
    }

    /// Continues a previous session's bindings (the REPL path): no
    /// builtin re-seeding, module-scope names carry over.
    pub fn resume(
        arena: &'a Arena,
        interner: &'ctx mut Interner,
        registry: &'ctx mut TypeRegistry<'a>,
        imports: &'ctx mut ImportLib<'a>,
        operators: &'ctx NativeOperators,
        bindings: Bindings<'a>,
    ) -> Self {
        SemanticAnalyser {
            arena,
            interner,
            registry,
            imports,
            operators,
            errors: DiagnosticSink::new(),
            bindings,
            file: String::new(),
            func_stack: Vec::new(),
            class_stack: Vec::new(),
        }
    }

    /// Hands the binding state back for the next REPL input.
    pub fn into_bindings(self) -> Bindings<'a> {
        self.bindings
    }

    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    /// Module-scope bindings in declaration order: the module's exports.
    pub fn exports(&self) -> Vec<(Symbol, TypeId)> {
        self.bindings
            .globals()
            .iter()
            .map(|entry| (entry.name, entry.ty))
            .collect()
    }

    /// Analyzes a whole module, visiting definitions in source order so
    /// varids stay stable.
    pub fn exec_module(&mut self, module: &'a Module<'a>) {
        self.file = self.interner.resolve(module.filename).to_string();
        for stmt in module.body {
            self.exec_stmt(stmt);
        }
    }

    fn report(&mut self, kind: DiagnosticKind, loc: Loc) {
        let diagnostic = Diagnostic::new(kind, loc, self.file.clone());
        self.errors.push(diagnostic);
    }

    fn report_hint(&mut self, kind: DiagnosticKind, loc: Loc, hint: String) {
        let diagnostic = Diagnostic::new(kind, loc, self.file.clone()).with_hint(hint);
        self.errors.push(diagnostic);
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.registry.name(ty, self.interner)
    }

    /// Writes the inferred type onto the node, guarding against cyclic
    /// types first.
    fn set_type(&mut self, expr: ExprRef<'a>, ty: TypeId) -> TypeId {
        if self.registry.has_cycle(ty) {
            expr.ty.set(TypeId::UNKNOWN);
            return TypeId::UNKNOWN;
        }
        expr.ty.set(ty);
        ty
    }

    // ==================================================================
    // Statements
    // ==================================================================

    fn exec_block(&mut self, body: &'a [StmtRef<'a>]) {
        for stmt in body {
            self.exec_stmt(stmt);
        }
    }

    pub(crate) fn exec_stmt(&mut self, stmt: StmtRef<'a>) {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => self.exec_function_def(stmt, def),
            StmtKind::ClassDef(def) => self.exec_class_def(stmt, def),

            StmtKind::Return { value } => {
                let ty = match value {
                    Some(value) => self.exec_expr(value),
                    None => TypeId::NONE,
                };
                let Some((declared, inferred)) =
                    self.func_stack.last().map(|ctx| (ctx.declared_ret, ctx.inferred_ret))
                else {
                    return;
                };
                match self.registry.unify(inferred, ty) {
                    Some(unified) => {
                        if let Some(ctx) = self.func_stack.last_mut() {
                            ctx.inferred_ret = unified;
                        }
                    }
                    None => {
                        let msg = format!(
                            "incompatible return types: {} and {}",
                            self.type_name(inferred),
                            self.type_name(ty)
                        );
                        self.report(DiagnosticKind::TypeError(msg), stmt.loc);
                    }
                }
                if !declared.is_unknown()
                    && declared != TypeId::ANY
                    && !ty.is_unknown()
                    && self.registry.unify(declared, ty).is_none()
                {
                    let msg = format!(
                        "return value of type {} does not match declared {}",
                        self.type_name(ty),
                        self.type_name(declared)
                    );
                    self.report(DiagnosticKind::TypeError(msg), stmt.loc);
                }
            }

            StmtKind::Delete { targets } => {
                for target in *targets {
                    if let ExprKind::Name { id, varid, .. } = &target.kind {
                        match self.bindings.lookup(*id) {
                            Some((vid, _)) => varid.set(vid),
                            None => self.name_error(*id, target.loc),
                        }
                    } else {
                        self.exec_expr(target);
                    }
                }
            }

            StmtKind::Assign { targets, value } => {
                let ty = self.exec_expr(value);
                for target in *targets {
                    self.bind_target(target, ty);
                }
            }

            StmtKind::AugAssign { target, op, value, native } => {
                let tt = self.exec_expr(target);
                let vt = self.exec_expr(value);
                if !tt.is_unknown() && !vt.is_unknown() {
                    if let (Some(lf), Some(rf)) = (self.registry.fingerprint(tt), self.registry.fingerprint(vt)) {
                        let key = binary_key(op.fingerprint(), lf, rf);
                        if let Some(f) = self.operators.binary(&key) {
                            native.set(Some(f));
                            return;
                        }
                    }
                    if self.class_magic_binop(tt, vt, *op).is_none() {
                        self.unsupported_operand(op.as_str(), tt, vt, stmt.loc);
                    }
                }
            }

            StmtKind::AnnAssign { target, annotation, value } => {
                let declared = self.resolve_annotation(annotation);
                if let Some(value) = value {
                    let vt = self.exec_expr(value);
                    if !vt.is_unknown() && !declared.is_unknown() && self.registry.unify(declared, vt).is_none() {
                        let msg = format!(
                            "expected {}, found {}",
                            self.type_name(declared),
                            self.type_name(vt)
                        );
                        self.report(DiagnosticKind::TypeError(msg), stmt.loc);
                    }
                }
                self.bind_annotated_target(target, annotation, declared);
            }

            StmtKind::For { target, iter, body, orelse, .. } => {
                let iter_ty = self.exec_expr(iter);
                let elem = self.registry.element_type(iter_ty);
                self.bind_target(target, elem);
                self.exec_block(body);
                self.exec_block(orelse);
            }

            StmtKind::While { test, body, orelse } => {
                self.exec_expr(test);
                self.exec_block(body);
                self.exec_block(orelse);
            }

            StmtKind::If { test, body, orelse } => {
                self.exec_expr(test);
                self.exec_block(body);
                self.exec_block(orelse);
            }

            StmtKind::With { items, body, .. } => {
                for item in *items {
                    let ctx_ty = self.exec_expr(item.context_expr);
                    if let Some(vars) = item.optional_vars {
                        let bound = self.enter_result(ctx_ty);
                        self.bind_target(vars, bound);
                    }
                }
                self.exec_block(body);
            }

            StmtKind::Match { subject, cases } => {
                let subject_ty = self.exec_expr(subject);
                for case in *cases {
                    self.bind_pattern(case.pattern, subject_ty);
                    if let Some(guard) = case.guard {
                        self.exec_expr(guard);
                    }
                    self.exec_block(case.body);
                }
            }

            StmtKind::Raise { exc, cause } => {
                if let Some(exc) = exc {
                    self.exec_expr(exc);
                }
                if let Some(cause) = cause {
                    self.exec_expr(cause);
                }
            }

            StmtKind::Try { body, handlers, orelse, finalbody } => {
                self.exec_block(body);
                for handler in *handlers {
                    let handler_ty = match handler.typ {
                        Some(typ) => {
                            let t = self.exec_expr(typ);
                            // The handler variable holds an instance of
                            // the named exception class.
                            match self.registry.as_arrow(t).and_then(|arrow| arrow.ctor_of) {
                                Some(instance) => instance,
                                None => TypeId::ANY,
                            }
                        }
                        None => TypeId::ANY,
                    };
                    if let Some(name) = handler.name {
                        self.bindings.add(name, handler.loc, None, handler_ty);
                    }
                    self.exec_block(handler.body);
                }
                self.exec_block(orelse);
                self.exec_block(finalbody);
            }

            StmtKind::Assert { test, msg } => {
                self.exec_expr(test);
                if let Some(msg) = msg {
                    self.exec_expr(msg);
                }
            }

            StmtKind::Import { names } => self.exec_import(stmt, names),
            StmtKind::ImportFrom { module, names } => self.exec_import_from(stmt, *module, names),

            StmtKind::Global { names } | StmtKind::Nonlocal { names } => {
                // Declarations only redirect later stores; resolution
                // itself walks the scope chain.
                for name in *names {
                    if self.bindings.lookup(*name).is_none() {
                        self.bindings.add(*name, stmt.loc, None, TypeId::ANY);
                    }
                }
            }

            StmtKind::Expr { value } => {
                self.exec_expr(value);
            }

            StmtKind::Inline { body } => self.exec_block(body),

            StmtKind::Pass | StmtKind::Break | StmtKind::Continue | StmtKind::Invalid => {}
        }
    }

    // ==================================================================
    // Definitions
    // ==================================================================

    fn in_class(&self) -> Option<i32> {
        self.class_stack.last().copied()
    }

    fn exec_function_def(&mut self, stmt: StmtRef<'a>, def: &'a FunctionDef<'a>) {
        for decorator in def.decorators {
            self.exec_expr(decorator);
        }
        // Defaults evaluate in the enclosing scope at definition time.
        for default in def.args.defaults {
            self.exec_expr(default);
        }
        for default in def.args.kw_defaults.iter().flatten() {
            self.exec_expr(default);
        }

        let in_class = self.in_class();
        let self_name = self.interner.intern("self");

        let mut params: Vec<(Symbol, TypeId)> = Vec::new();
        let mut is_method = false;
        for (index, arg) in def.args.named().enumerate() {
            if index == 0 && in_class.is_some() && arg.name == self_name {
                is_method = true;
                continue;
            }
            let ty = match arg.annotation {
                Some(annotation) => self.resolve_annotation(annotation),
                None => TypeId::ANY,
            };
            params.push((arg.name, ty));
        }

        let declared_ret = match def.returns {
            Some(returns) => self.resolve_annotation(returns),
            None => TypeId::ANY,
        };

        let positional = def.args.posonlyargs.len() + def.args.args.len();
        let positional = if is_method { positional - 1 } else { positional };
        let default_base = positional.saturating_sub(def.args.defaults.len());
        let mut defaults: Vec<bool> = (0..positional).map(|i| i >= default_base).collect();
        for kw_default in def.args.kw_defaults {
            defaults.push(kw_default.is_some());
        }
        defaults.truncate(params.len());
        while defaults.len() < params.len() {
            defaults.push(false);
        }

        let (arg_types, arg_names): (Vec<TypeId>, Vec<Symbol>) =
            params.iter().map(|(n, t)| (*t, *n)).unzip();
        let mut arrow = Arrow::new(arg_types, declared_ret, arg_names, defaults);
        arrow.variadic = def.args.vararg.is_some() || def.args.kwarg.is_some();
        let arrow_id = self.registry.arrow(arrow);
        def.arrow.set(arrow_id);

        // Bind before the body so recursion resolves.
        let varid = self.bindings.add(def.name, stmt.loc, def.returns, arrow_id);
        let _ = varid;

        if let Some(class_id) = in_class {
            if let Some(meta) = self.registry.class_mut(class_id) {
                meta.insert_attribute(def.name, Some(stmt), arrow_id, true);
            }
        }

        self.func_stack.push(FuncCtx {
            declared_ret,
            inferred_ret: TypeId::UNKNOWN,
            has_yield: false,
            yield_ty: TypeId::UNKNOWN,
        });
        self.bindings.enter_scope(None);

        if is_method {
            if let Some(class_id) = in_class {
                let instance = self.registry.class(class_id).map(|m| m.instance_type).unwrap_or(TypeId::ANY);
                self.bindings.add(self_name, stmt.loc, None, instance);
            }
        }
        for (index, arg) in def.args.named().enumerate() {
            if is_method && index == 0 {
                continue;
            }
            let slot = if is_method { index - 1 } else { index };
            let ty = params.get(slot).map(|(_, t)| *t).unwrap_or(TypeId::ANY);
            self.bindings.add(arg.name, arg.loc, arg.annotation, ty);
        }
        if let Some(vararg) = def.args.vararg {
            let list = self.registry.list_of(TypeId::ANY);
            self.bindings.add(vararg.name, vararg.loc, None, list);
        }
        if let Some(kwarg) = def.args.kwarg {
            let dict = self.registry.dict_of(TypeId::STR, TypeId::ANY);
            self.bindings.add(kwarg.name, kwarg.loc, None, dict);
        }

        self.exec_block(def.body);

        self.bindings.leave_scope();
        let ctx = self.func_stack.pop().expect("function context pushed above");

        if ctx.has_yield {
            def.generator.set(true);
        }

        if !ctx.inferred_ret.is_unknown()
            && declared_ret != TypeId::ANY
            && !ctx.has_yield
            && self.registry.unify(declared_ret, ctx.inferred_ret).is_none()
        {
            let msg = format!(
                "function '{}' returns {} but declares {}",
                self.interner.resolve(def.name),
                self.type_name(ctx.inferred_ret),
                self.type_name(declared_ret)
            );
            self.report(DiagnosticKind::TypeError(msg), stmt.loc);
        }
    }

    fn exec_class_def(&mut self, stmt: StmtRef<'a>, def: &'a ClassDef<'a>) {
        for decorator in def.decorators {
            self.exec_expr(decorator);
        }
        for base in def.bases {
            self.exec_expr(base);
        }

        let namespace = match self.bindings.current_namespace() {
            Some(ns) => format!("{}.{}", self.interner.resolve(ns), self.interner.resolve(def.name)),
            None => self.interner.resolve(def.name).to_string(),
        };
        let class_id = self.registry.new_class(def, namespace);
        def.class_id.set(class_id);
        let instance = self.registry.class(class_id).map(|m| m.instance_type).unwrap_or(TypeId::ANY);

        // Placeholder binding first so the body can reference the class.
        let class_vid = self.bindings.add(def.name, stmt.loc, None, TypeId::UNKNOWN);

        self.class_stack.push(class_id);
        self.bindings.enter_scope(Some(def.name));

        for member in def.body {
            self.exec_stmt(member);
            match &member.kind {
                StmtKind::AnnAssign { target, value, .. } => {
                    if let ExprKind::Name { id, .. } = &target.kind {
                        let ty = self
                            .bindings
                            .lookup_local(*id)
                            .map(|(_, entry)| entry.ty)
                            .unwrap_or(TypeId::ANY);
                        if let Some(meta) = self.registry.class_mut(class_id) {
                            meta.insert_attribute(*id, Some(member), ty, false);
                        }
                        let _ = value;
                    }
                }
                StmtKind::Assign { targets, .. } => {
                    for target in *targets {
                        if let ExprKind::Name { id, .. } = &target.kind {
                            let ty = self
                                .bindings
                                .lookup_local(*id)
                                .map(|(_, entry)| entry.ty)
                                .unwrap_or(TypeId::ANY);
                            if let Some(meta) = self.registry.class_mut(class_id) {
                                meta.insert_attribute(*id, Some(member), ty, false);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        self.bindings.leave_scope();
        self.class_stack.pop();

        // Constructor: an explicit __init__ wins, otherwise one parameter
        // per field in declaration order, all optional (fields carry
        // initializers).
        let init_name = self.interner.intern("__init__");
        let ctor = {
            let meta = self.registry.class(class_id).expect("class registered above");
            match meta.get_attribute(init_name) {
                Some(attr) if attr.is_method => {
                    let base = self.registry.as_arrow(attr.ty).cloned();
                    base.map(|mut arrow| {
                        arrow.ret = instance;
                        arrow.ctor_of = Some(instance);
                        arrow
                    })
                }
                _ => {
                    let fields: Vec<(Symbol, TypeId, bool)> = meta
                        .attributes
                        .iter()
                        .filter(|attr| !attr.is_method)
                        .map(|attr| (attr.name, attr.ty, true))
                        .collect();
                    let mut arrow = Arrow::new(
                        fields.iter().map(|(_, t, _)| *t).collect(),
                        instance,
                        fields.iter().map(|(n, _, _)| *n).collect(),
                        fields.iter().map(|(_, _, d)| *d).collect(),
                    );
                    arrow.ctor_of = Some(instance);
                    Some(arrow)
                }
            }
        };

        if let Some(arrow) = ctor {
            let ctor_id = self.registry.arrow(arrow);
            def.ctor.set(ctor_id);
            if let Some(meta) = self.registry.class_mut(class_id) {
                meta.ctor = ctor_id;
            }
            self.bindings.set_type(class_vid, ctor_id);
        }
    }

    // ==================================================================
    // Targets and annotations
    // ==================================================================

    fn bind_target(&mut self, target: ExprRef<'a>, ty: TypeId) {
        match &target.kind {
            ExprKind::Name { id, varid, .. } => {
                let existing = self.bindings.lookup_local(*id).map(|(vid, _)| vid);
                match existing {
                    Some(vid) => {
                        self.bindings.set_type(vid, ty);
                        varid.set(vid);
                    }
                    None => {
                        let vid = self.bindings.add(*id, target.loc, None, ty);
                        varid.set(vid);
                    }
                }
                target.ty.set(ty);
            }
            ExprKind::Tuple { elts, .. } | ExprKind::List { elts, .. } => {
                let element_types: Option<Vec<TypeId>> = match self.registry.kind(ty) {
                    TypeKind::Tuple(types) if types.len() == elts.len() => Some(types.clone()),
                    _ => None,
                };
                match element_types {
                    Some(types) => {
                        for (elt, elt_ty) in elts.iter().zip(types) {
                            self.bind_target(elt, elt_ty);
                        }
                    }
                    None => {
                        let elem = self.registry.element_type(ty);
                        for elt in *elts {
                            if let ExprKind::Starred { value, .. } = &elt.kind {
                                let rest = self.registry.list_of(elem);
                                self.bind_target(value, rest);
                            } else {
                                self.bind_target(elt, elem);
                            }
                        }
                    }
                }
            }
            ExprKind::Starred { value, .. } => {
                let rest = self.registry.list_of(self.registry.element_type(ty));
                self.bind_target(value, rest);
            }
            ExprKind::Attribute { value, attr, offset, .. } => {
                let obj_ty = self.exec_expr(value);
                if obj_ty.is_unknown() {
                    return;
                }
                if let TypeKind::Class(class_id) = self.registry.kind(obj_ty) {
                    let class_id = *class_id;
                    let found = self
                        .registry
                        .class(class_id)
                        .and_then(|meta| meta.get_attribute(*attr))
                        .map(|a| (a.offset, a.ty));
                    match found {
                        Some((slot, declared)) => {
                            offset.set(slot);
                            if !ty.is_unknown() && self.registry.unify(declared, ty).is_none() {
                                let msg = format!(
                                    "attribute '{}' expects {}, found {}",
                                    self.interner.resolve(*attr),
                                    self.type_name(declared),
                                    self.type_name(ty)
                                );
                                self.report(DiagnosticKind::TypeError(msg), target.loc);
                            }
                        }
                        None => self.attribute_error(obj_ty, *attr, target.loc),
                    }
                }
            }
            ExprKind::Subscript { value, slice, .. } => {
                self.exec_expr(value);
                self.exec_expr(slice);
            }
            _ => {
                self.exec_expr(target);
            }
        }
    }

    fn bind_annotated_target(&mut self, target: ExprRef<'a>, annotation: ExprRef<'a>, ty: TypeId) {
        if let ExprKind::Name { id, varid, .. } = &target.kind {
            let existing = self.bindings.lookup_local(*id).map(|(vid, _)| vid);
            match existing {
                Some(vid) => {
                    self.bindings.set_type(vid, ty);
                    varid.set(vid);
                }
                None => {
                    let vid = self.bindings.add(*id, target.loc, Some(annotation), ty);
                    varid.set(vid);
                }
            }
            target.ty.set(ty);
        } else {
            self.bind_target(target, ty);
        }
    }

    /// Resolves a type annotation expression to a type id.
    pub(crate) fn resolve_annotation(&mut self, annotation: ExprRef<'a>) -> TypeId {
        match &annotation.kind {
            ExprKind::Name { id, varid, .. } => {
                let text = self.interner.resolve(*id).to_string();
                if let Some((vid, _)) = self.bindings.lookup(*id) {
                    varid.set(vid);
                }
                if let Some(primitive) = primitive_by_name(&text) {
                    return primitive;
                }
                match self.bindings.lookup(*id) {
                    Some((_, entry)) => {
                        // A class name annotates the instance type.
                        match self.registry.as_arrow(entry.ty).and_then(|arrow| arrow.ctor_of) {
                            Some(instance) => instance,
                            None => TypeId::ANY,
                        }
                    }
                    None => {
                        self.name_error(*id, annotation.loc);
                        TypeId::UNKNOWN
                    }
                }
            }
            ExprKind::Constant { value: ConstantValue::None, .. } => TypeId::NONE,
            ExprKind::Subscript { value, slice, .. } => {
                let container = match &value.kind {
                    ExprKind::Name { id, .. } => self.interner.resolve(*id).to_string(),
                    _ => String::new(),
                };
                match container.as_str() {
                    "List" | "list" => {
                        let elem = self.resolve_annotation(slice);
                        self.registry.list_of(elem)
                    }
                    "Set" | "set" => {
                        let elem = self.resolve_annotation(slice);
                        self.registry.set_of(elem)
                    }
                    "Dict" | "dict" => match &slice.kind {
                        ExprKind::Tuple { elts, .. } if elts.len() == 2 => {
                            let key = self.resolve_annotation(elts[0]);
                            let value = self.resolve_annotation(elts[1]);
                            self.registry.dict_of(key, value)
                        }
                        _ => TypeId::ANY,
                    },
                    "Tuple" | "tuple" => match &slice.kind {
                        ExprKind::Tuple { elts, .. } => {
                            let types: Vec<TypeId> =
                                elts.iter().map(|e| self.resolve_annotation(e)).collect();
                            self.registry.tuple_of(types)
                        }
                        _ => TypeId::ANY,
                    },
                    _ => TypeId::ANY,
                }
            }
            _ => TypeId::ANY,
        }
    }

    // ==================================================================
    // Patterns
    // ==================================================================

    fn bind_pattern(&mut self, pattern: PatRef<'a>, subject_ty: TypeId) {
        match &pattern.kind {
            PatKind::MatchValue { value } => {
                self.exec_expr(value);
            }
            PatKind::MatchSingleton { .. } => {}
            PatKind::MatchSequence { patterns } => {
                let elem = self.registry.element_type(subject_ty);
                for sub in *patterns {
                    if let PatKind::MatchStar { name: Some(name) } = &sub.kind {
                        let rest = self.registry.list_of(elem);
                        self.bindings.add(*name, sub.loc, None, rest);
                    } else {
                        self.bind_pattern(sub, elem);
                    }
                }
            }
            PatKind::MatchMapping { keys, patterns, rest } => {
                for key in *keys {
                    self.exec_expr(key);
                }
                let value_ty = match self.registry.kind(subject_ty) {
                    TypeKind::Dict(_, value) => *value,
                    _ => TypeId::ANY,
                };
                for sub in *patterns {
                    self.bind_pattern(sub, value_ty);
                }
                if let Some(rest) = rest {
                    self.bindings.add(*rest, pattern.loc, None, subject_ty);
                }
            }
            PatKind::MatchClass { cls, patterns, kwd_attrs, kwd_patterns } => {
                let cls_ty = self.exec_expr(cls);
                let instance = self
                    .registry
                    .as_arrow(cls_ty)
                    .and_then(|arrow| arrow.ctor_of)
                    .unwrap_or(TypeId::ANY);
                let attr_types: Vec<TypeId> = match self.registry.kind(instance) {
                    TypeKind::Class(class_id) => self
                        .registry
                        .class(*class_id)
                        .map(|meta| {
                            meta.attributes
                                .iter()
                                .filter(|a| !a.is_method)
                                .map(|a| a.ty)
                                .collect()
                        })
                        .unwrap_or_default(),
                    _ => Vec::new(),
                };
                for (index, sub) in patterns.iter().enumerate() {
                    let ty = attr_types.get(index).copied().unwrap_or(TypeId::ANY);
                    self.bind_pattern(sub, ty);
                }
                for (attr, sub) in kwd_attrs.iter().zip(kwd_patterns.iter()) {
                    let ty = match self.registry.kind(instance) {
                        TypeKind::Class(class_id) => self
                            .registry
                            .class(*class_id)
                            .and_then(|meta| meta.get_attribute(*attr))
                            .map(|a| a.ty)
                            .unwrap_or(TypeId::ANY),
                        _ => TypeId::ANY,
                    };
                    self.bind_pattern(sub, ty);
                }
            }
            PatKind::MatchStar { name } => {
                if let Some(name) = name {
                    let list = self.registry.list_of(TypeId::ANY);
                    self.bindings.add(*name, pattern.loc, None, list);
                }
            }
            PatKind::MatchAs { pattern: inner, name } => {
                if let Some(inner) = inner {
                    self.bind_pattern(inner, subject_ty);
                }
                if let Some(name) = name {
                    self.bindings.add(*name, pattern.loc, None, subject_ty);
                }
            }
            PatKind::MatchOr { patterns } => {
                for sub in *patterns {
                    self.bind_pattern(sub, subject_ty);
                }
            }
        }
    }

    // ==================================================================
    // Expressions
    // ==================================================================

    fn name_error(&mut self, name: Symbol, loc: Loc) {
        let text = self.interner.resolve(name).to_string();
        let candidates = self.bindings.visible_names(self.interner);
        let hint = find_similar(&text, candidates.iter().copied(), 2)
            .map(|similar| format!("did you mean '{}'?", similar));
        let kind = DiagnosticKind::NameError { name: text };
        match hint {
            Some(hint) => self.report_hint(kind, loc, hint),
            None => self.report(kind, loc),
        }
    }

    fn attribute_error(&mut self, obj_ty: TypeId, attr: Symbol, loc: Loc) {
        let kind = DiagnosticKind::AttributeError {
            class_name: self.type_name(obj_ty),
            attr: self.interner.resolve(attr).to_string(),
        };
        self.report(kind, loc);
    }

    fn unsupported_operand(&mut self, op: &str, lhs: TypeId, rhs: TypeId, loc: Loc) {
        let kind = DiagnosticKind::UnsupportedOperand {
            op: op.to_string(),
            lhs: self.type_name(lhs),
            rhs: self.type_name(rhs),
        };
        self.report(kind, loc);
    }

    /// Looks up the magic-method pair for a binary operator on the
    /// operand classes: `lhs.__op__` first, then `rhs.__rop__`.
    fn class_magic_binop(&mut self, lhs: TypeId, rhs: TypeId, op: BinaryOperator) -> Option<(Symbol, TypeId)> {
        for (ty, reverse) in [(lhs, false), (rhs, true)] {
            if let TypeKind::Class(class_id) = self.registry.kind(ty) {
                let method = self.interner.intern(op.magic_name(reverse));
                if let Some(attr) = self.registry.class(*class_id).and_then(|m| m.get_attribute(method)) {
                    let ret = self.registry.as_arrow(attr.ty).map(|a| a.ret).unwrap_or(TypeId::ANY);
                    return Some((method, ret));
                }
            }
        }
        None
    }

    pub(crate) fn exec_expr(&mut self, expr: ExprRef<'a>) -> TypeId {
        let ty = self.infer_expr(expr);
        self.set_type(expr, ty)
    }

    fn infer_expr(&mut self, expr: ExprRef<'a>) -> TypeId {
        match &expr.kind {
            ExprKind::Constant { value, .. } => match value {
                ConstantValue::Int(_) => TypeId::I32,
                ConstantValue::Float(_) => TypeId::F64,
                ConstantValue::Bool(_) => TypeId::BOOL,
                ConstantValue::Str(_) => TypeId::STR,
                ConstantValue::None => TypeId::NONE,
            },

            ExprKind::Name { id, varid, .. } => match self.bindings.lookup(*id) {
                Some((vid, entry)) => {
                    varid.set(vid);
                    entry.ty
                }
                None => {
                    self.name_error(*id, expr.loc);
                    TypeId::UNKNOWN
                }
            },

            ExprKind::BinOp { left, op, right, native, method } => {
                let lt = self.exec_expr(left);
                let rt = self.exec_expr(right);
                if lt.is_unknown() || rt.is_unknown() {
                    return TypeId::UNKNOWN;
                }
                if lt == TypeId::ANY || rt == TypeId::ANY {
                    return TypeId::ANY;
                }
                if let (Some(lf), Some(rf)) = (self.registry.fingerprint(lt), self.registry.fingerprint(rt)) {
                    let key = binary_key(op.fingerprint(), lf, rf);
                    if let Some(f) = self.operators.binary(&key) {
                        native.set(Some(f));
                        return lt;
                    }
                }
                // String repetition has no table entry; the evaluator
                // dispatches it dynamically.
                if *op == BinaryOperator::Mult {
                    let int_side = |t: TypeId| {
                        matches!(
                            self.registry.fingerprint(t),
                            Some("i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64")
                        )
                    };
                    if (lt == TypeId::STR && int_side(rt)) || (rt == TypeId::STR && int_side(lt)) {
                        return TypeId::STR;
                    }
                }
                if let Some((magic, ret)) = self.class_magic_binop(lt, rt, *op) {
                    method.set(Some(magic));
                    return ret;
                }
                self.unsupported_operand(op.as_str(), lt, rt, expr.loc);
                TypeId::UNKNOWN
            }

            ExprKind::BoolOp { op, values, native } => {
                let mut types = Vec::new();
                for value in *values {
                    types.push(self.exec_expr(value));
                }
                if types.iter().all(|t| *t == TypeId::BOOL) {
                    let key = binary_key(op.fingerprint(), "bool", "bool");
                    native.set(self.operators.boolean(&key));
                    return TypeId::BOOL;
                }
                self.registry.common_type(&types)
            }

            ExprKind::UnaryOp { op, operand, native, method } => {
                let ot = self.exec_expr(operand);
                if ot.is_unknown() {
                    return TypeId::UNKNOWN;
                }
                if *op == UnaryOperator::Not {
                    if let Some(fp) = self.registry.fingerprint(ot) {
                        native.set(self.operators.unary(&unary_key("Not", fp)));
                    }
                    return TypeId::BOOL;
                }
                if let Some(fp) = self.registry.fingerprint(ot) {
                    let key = unary_key(op.fingerprint(), fp);
                    if let Some(f) = self.operators.unary(&key) {
                        native.set(Some(f));
                        return ot;
                    }
                }
                if let TypeKind::Class(class_id) = self.registry.kind(ot) {
                    let magic = self.interner.intern(op.magic_name());
                    if let Some(attr) = self.registry.class(*class_id).and_then(|m| m.get_attribute(magic)) {
                        let ret = self.registry.as_arrow(attr.ty).map(|a| a.ret).unwrap_or(TypeId::ANY);
                        method.set(Some(magic));
                        return ret;
                    }
                }
                if ot == TypeId::ANY {
                    return TypeId::ANY;
                }
                let name = self.type_name(ot);
                self.report(
                    DiagnosticKind::UnsupportedOperand {
                        op: op.as_str().to_string(),
                        lhs: name.clone(),
                        rhs: name,
                    },
                    expr.loc,
                );
                TypeId::UNKNOWN
            }

            ExprKind::Compare { left, ops, comparators, natives, methods } => {
                let mut lhs_ty = self.exec_expr(left);
                for (index, (op, comparator)) in ops.iter().zip(comparators.iter()).enumerate() {
                    let rhs_ty = self.exec_expr(comparator);
                    self.resolve_comparison(expr, *op, lhs_ty, rhs_ty, &natives[index], &methods[index]);
                    lhs_ty = rhs_ty;
                }
                TypeId::BOOL
            }

            ExprKind::NamedExpr { target, value } => {
                let ty = self.exec_expr(value);
                self.bind_target(target, ty);
                ty
            }

            ExprKind::Lambda { args, body } => self.exec_lambda(args, body),

            ExprKind::IfExp { test, body, orelse } => {
                self.exec_expr(test);
                let bt = self.exec_expr(body);
                let ot = self.exec_expr(orelse);
                match self.registry.unify(bt, ot) {
                    Some(unified) => unified,
                    None => {
                        let msg = format!(
                            "if-expression arms differ: {} and {}",
                            self.type_name(bt),
                            self.type_name(ot)
                        );
                        self.report(DiagnosticKind::TypeError(msg), expr.loc);
                        TypeId::UNKNOWN
                    }
                }
            }

            ExprKind::Dict { keys, values } => {
                let key_types: Vec<TypeId> = keys.iter().map(|k| self.exec_expr(k)).collect();
                let value_types: Vec<TypeId> = values.iter().map(|v| self.exec_expr(v)).collect();
                let key = self.registry.common_type(&key_types);
                let value = self.registry.common_type(&value_types);
                self.registry.dict_of(key, value)
            }

            ExprKind::Set { elts } => {
                let types: Vec<TypeId> = elts.iter().map(|e| self.exec_expr(e)).collect();
                let elem = self.registry.common_type(&types);
                self.registry.set_of(elem)
            }

            ExprKind::List { elts, .. } => {
                let types: Vec<TypeId> = elts.iter().map(|e| self.exec_expr(e)).collect();
                let elem = self.registry.common_type(&types);
                self.registry.list_of(elem)
            }

            ExprKind::Tuple { elts, .. } => {
                let types: Vec<TypeId> = elts.iter().map(|e| self.exec_expr(e)).collect();
                self.registry.tuple_of(types)
            }

            ExprKind::ListComp { elt, generators } => {
                let elem = self.exec_comprehension(elt, generators);
                self.registry.list_of(elem)
            }
            ExprKind::SetComp { elt, generators } => {
                let elem = self.exec_comprehension(elt, generators);
                self.registry.set_of(elem)
            }
            ExprKind::GeneratorExp { elt, generators } => {
                let elem = self.exec_comprehension(elt, generators);
                self.registry.generator_of(elem)
            }
            ExprKind::DictComp { key, value, generators } => {
                self.bindings.enter_scope(None);
                for generator in *generators {
                    let iter_ty = self.exec_expr(generator.iter);
                    let elem = self.registry.element_type(iter_ty);
                    self.bind_target(generator.target, elem);
                    for cond in generator.ifs {
                        self.exec_expr(cond);
                    }
                }
                let key_ty = self.exec_expr(key);
                let value_ty = self.exec_expr(value);
                self.bindings.leave_scope();
                self.registry.dict_of(key_ty, value_ty)
            }

            ExprKind::Await { value } => {
                // Synchronous await: the operand's value passes through.
                self.exec_expr(value)
            }

            ExprKind::Yield { value } => {
                let ty = match value {
                    Some(value) => self.exec_expr(value),
                    None => TypeId::NONE,
                };
                if let Some(ctx) = self.func_stack.last_mut() {
                    ctx.has_yield = true;
                    ctx.yield_ty = ty;
                }
                TypeId::ANY
            }

            ExprKind::YieldFrom { value } => {
                let inner = self.exec_expr(value);
                if let Some(ctx) = self.func_stack.last_mut() {
                    ctx.has_yield = true;
                    ctx.yield_ty = TypeId::ANY;
                }
                self.registry.element_type(inner)
            }

            ExprKind::Call { func, args, keywords } => self.exec_call(expr, func, args, keywords),

            ExprKind::Attribute { value, attr, offset, .. } => {
                let obj_ty = self.exec_expr(value);
                if obj_ty.is_unknown() {
                    return TypeId::UNKNOWN;
                }
                enum Owner {
                    Class(i32),
                    Module(Symbol),
                    AnyLike,
                    Other,
                }
                let owner = match self.registry.kind(obj_ty) {
                    TypeKind::Class(class_id) => Owner::Class(*class_id),
                    TypeKind::Module(name) => Owner::Module(*name),
                    TypeKind::Any | TypeKind::Unknown => Owner::AnyLike,
                    _ => Owner::Other,
                };
                match owner {
                    Owner::Class(class_id) => {
                        let found = self
                            .registry
                            .class(class_id)
                            .and_then(|meta| meta.get_attribute(*attr))
                            .map(|a| (a.offset, a.ty));
                        match found {
                            Some((slot, ty)) => {
                                offset.set(slot);
                                ty
                            }
                            None => {
                                self.attribute_error(obj_ty, *attr, expr.loc);
                                TypeId::UNKNOWN
                            }
                        }
                    }
                    Owner::Module(name) => {
                        let module_name = self.interner.resolve(name).to_string();
                        let found = self.imports.get(&module_name).and_then(|m| m.export_type(*attr));
                        match found {
                            Some(ty) => ty,
                            None => {
                                self.attribute_error(obj_ty, *attr, expr.loc);
                                TypeId::UNKNOWN
                            }
                        }
                    }
                    Owner::AnyLike => TypeId::ANY,
                    Owner::Other => {
                        self.attribute_error(obj_ty, *attr, expr.loc);
                        TypeId::UNKNOWN
                    }
                }
            }

            ExprKind::Subscript { value, slice, .. } => {
                let container = self.exec_expr(value);
                let index_ty = self.exec_expr(slice);
                if container.is_unknown() {
                    return TypeId::UNKNOWN;
                }
                let is_slice = matches!(slice.kind, ExprKind::Slice { .. });
                if is_slice {
                    return container;
                }
                let _ = index_ty;
                let element = match self.registry.kind(container) {
                    TypeKind::List(elem) | TypeKind::Set(elem) => Some(*elem),
                    TypeKind::Dict(_, value) => Some(*value),
                    TypeKind::Str => Some(TypeId::STR),
                    TypeKind::Tuple(_) | TypeKind::Any => Some(TypeId::ANY),
                    _ => None,
                };
                match element {
                    Some(ty) => ty,
                    None => {
                        let msg = format!("'{}' is not subscriptable", self.type_name(container));
                        self.report(DiagnosticKind::TypeError(msg), expr.loc);
                        TypeId::UNKNOWN
                    }
                }
            }

            ExprKind::Starred { value, .. } => self.exec_expr(value),

            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.exec_expr(part);
                }
                TypeId::ANY
            }

            ExprKind::FormattedValue { value, .. } => {
                self.exec_expr(value);
                TypeId::STR
            }

            ExprKind::JoinedStr { values } => {
                for value in *values {
                    self.exec_expr(value);
                }
                TypeId::STR
            }

            ExprKind::NotImplemented => TypeId::UNKNOWN,
        }
    }

    fn resolve_comparison(
        &mut self,
        expr: ExprRef<'a>,
        op: CmpOperator,
        lhs: TypeId,
        rhs: TypeId,
        native: &std::cell::Cell<Option<crate::value::NativeBinaryFn>>,
        method: &std::cell::Cell<Option<Symbol>>,
    ) {
        if lhs.is_unknown() || rhs.is_unknown() {
            return;
        }
        // Identity and membership need no operator resolution.
        if matches!(op, CmpOperator::Is | CmpOperator::IsNot | CmpOperator::In | CmpOperator::NotIn) {
            return;
        }
        if let (Some(lf), Some(rf)) = (self.registry.fingerprint(lhs), self.registry.fingerprint(rhs)) {
            let key = binary_key(op.fingerprint(), lf, rf);
            if let Some(f) = self.operators.compare(&key) {
                native.set(Some(f));
                return;
            }
        }
        for (ty, reverse) in [(lhs, false), (rhs, true)] {
            if let TypeKind::Class(class_id) = self.registry.kind(ty) {
                if let Some(name) = op.magic_name(reverse) {
                    let magic = self.interner.intern(name);
                    if self
                        .registry
                        .class(*class_id)
                        .and_then(|m| m.get_attribute(magic))
                        .is_some()
                    {
                        method.set(Some(magic));
                        return;
                    }
                }
            }
        }
        if lhs == TypeId::ANY || rhs == TypeId::ANY {
            return;
        }
        self.unsupported_operand(op.as_str(), lhs, rhs, expr.loc);
    }

    fn exec_lambda(&mut self, args: &'a Arguments<'a>, body: ExprRef<'a>) -> TypeId {
        for default in args.defaults {
            self.exec_expr(default);
        }
        self.bindings.enter_scope(None);
        let mut names = Vec::new();
        let mut types = Vec::new();
        for arg in args.named() {
            self.bindings.add(arg.name, arg.loc, None, TypeId::ANY);
            names.push(arg.name);
            types.push(TypeId::ANY);
        }
        let ret = self.exec_expr(body);
        self.bindings.leave_scope();

        let count = names.len();
        let default_base = count.saturating_sub(args.defaults.len());
        let defaults = (0..count).map(|i| i >= default_base).collect();
        let mut arrow = Arrow::new(types, ret, names, defaults);
        arrow.variadic = args.vararg.is_some() || args.kwarg.is_some();
        self.registry.arrow(arrow)
    }

    fn exec_comprehension(&mut self, elt: ExprRef<'a>, generators: &'a [Comprehension<'a>]) -> TypeId {
        self.bindings.enter_scope(None);
        for generator in generators {
            let iter_ty = self.exec_expr(generator.iter);
            let elem = self.registry.element_type(iter_ty);
            self.bind_target(generator.target, elem);
            for cond in generator.ifs {
                self.exec_expr(cond);
            }
        }
        let elem = self.exec_expr(elt);
        self.bindings.leave_scope();
        elem
    }

    fn enter_result(&mut self, ctx_ty: TypeId) -> TypeId {
        // `with x as v`: v is whatever __enter__ returns, or the context
        // value itself for non-class contexts.
        if let TypeKind::Class(class_id) = self.registry.kind(ctx_ty) {
            let enter = self.interner.intern("__enter__");
            if let Some(attr) = self.registry.class(*class_id).and_then(|m| m.get_attribute(enter)) {
                return self.registry.as_arrow(attr.ty).map(|a| a.ret).unwrap_or(TypeId::ANY);
            }
        }
        ctx_ty
    }

    fn exec_call(
        &mut self,
        expr: ExprRef<'a>,
        func: ExprRef<'a>,
        args: &'a [ExprRef<'a>],
        keywords: &'a [crate::ast::expr::Keyword<'a>],
    ) -> TypeId {
        let func_ty = self.exec_expr(func);

        let arg_types: Vec<TypeId> = args.iter().map(|a| self.exec_expr(a)).collect();
        let kw_types: Vec<(Option<Symbol>, TypeId)> = keywords
            .iter()
            .map(|kw| (kw.arg, self.exec_expr(kw.value)))
            .collect();

        if func_ty.is_unknown() {
            return TypeId::UNKNOWN;
        }
        if func_ty == TypeId::ANY {
            return TypeId::ANY;
        }

        let arrow = match self.registry.as_arrow(func_ty) {
            Some(arrow) => arrow.clone(),
            None => {
                let callee = match &func.kind {
                    ExprKind::Name { id, .. } => self.interner.resolve(*id).to_string(),
                    ExprKind::Attribute { attr, .. } => self.interner.resolve(*attr).to_string(),
                    _ => self.type_name(func_ty),
                };
                let msg = format!("'{}' is not callable", callee);
                self.report(DiagnosticKind::TypeError(msg), expr.loc);
                return TypeId::UNKNOWN;
            }
        };

        if arrow.variadic {
            return arrow.ret;
        }

        // Unpacking forms defeat static arity checking.
        let has_unpack = args.iter().any(|a| matches!(a.kind, ExprKind::Starred { .. }))
            || keywords.iter().any(|kw| kw.arg.is_none());
        if has_unpack {
            return arrow.ret;
        }

        if arg_types.len() > arrow.args.len() {
            let msg = format!(
                "too many arguments: expected {}, got {}",
                arrow.args.len(),
                arg_types.len()
            );
            self.report(DiagnosticKind::TypeError(msg), expr.loc);
            return arrow.ret;
        }

        let mut supplied = vec![false; arrow.args.len()];
        for (index, ty) in arg_types.iter().enumerate() {
            supplied[index] = true;
            if !ty.is_unknown() && self.registry.unify(arrow.args[index], *ty).is_none() {
                let msg = format!(
                    "argument {} expects {}, found {}",
                    index + 1,
                    self.type_name(arrow.args[index]),
                    self.type_name(*ty)
                );
                self.report(DiagnosticKind::TypeError(msg), expr.loc);
            }
        }

        for (name, ty) in &kw_types {
            let Some(name) = name else { continue };
            match arrow.arg_names.iter().position(|n| n == name) {
                Some(index) => {
                    supplied[index] = true;
                    if !ty.is_unknown() && self.registry.unify(arrow.args[index], *ty).is_none() {
                        let msg = format!(
                            "keyword '{}' expects {}, found {}",
                            self.interner.resolve(*name),
                            self.type_name(arrow.args[index]),
                            self.type_name(*ty)
                        );
                        self.report(DiagnosticKind::TypeError(msg), expr.loc);
                    }
                }
                None => {
                    let msg = format!("unexpected keyword argument '{}'", self.interner.resolve(*name));
                    self.report(DiagnosticKind::TypeError(msg), expr.loc);
                }
            }
        }

        for (index, provided) in supplied.iter().enumerate() {
            let has_default = arrow.defaults.get(index).copied().unwrap_or(false);
            if !provided && !has_default {
                let name = arrow
                    .arg_names
                    .get(index)
                    .map(|n| self.interner.resolve(*n).to_string())
                    .unwrap_or_else(|| format!("#{}", index + 1));
                let msg = format!("missing required argument '{}'", name);
                self.report(DiagnosticKind::TypeError(msg), expr.loc);
            }
        }

        arrow.ret
    }
}

/// Runs analysis on an imported module with the shared registry and
/// import library, merging diagnostics into the caller's sink.
pub fn analyze_for_import<'a>(
    module: &'a Module<'a>,
    arena: &'a Arena,
    interner: &mut Interner,
    registry: &mut TypeRegistry<'a>,
    operators: &NativeOperators,
    imports: &mut ImportLib<'a>,
    sink: &mut DiagnosticSink,
) -> Vec<(Symbol, TypeId)> {
    let mut sema = SemanticAnalyser::new(arena, interner, registry, imports, operators);
    sema.exec_module(module);
    let exports = sema.exports();
    for diagnostic in sema.errors.iter() {
        sink.push(diagnostic.clone());
    }
    exports
}
