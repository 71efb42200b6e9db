use crate::arena::Arena;
use crate::ast::expr::ExprKind;
use crate::ast::ops::ExprContext;
use crate::ast::stmt::StmtKind;
use crate::ast::visit::{walk_expr, TreeWalk};
use crate::ast::{Expr, Module};
use crate::buffer::StringBuffer;
use crate::builtins::{NativeModuleBuilder, NativeOperators};
use crate::error::DiagnosticKind;
use crate::importlib::ImportLib;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::sema::types::{TypeId, TypeRegistry};
use crate::sema::SemanticAnalyser;
use crate::value::{OutputSink, Value};

struct Session<'a> {
    module: &'a Module<'a>,
    errors: crate::error::DiagnosticSink,
    interner: Interner,
    registry: TypeRegistry<'a>,
}

fn analyze<'a>(arena: &'a Arena, source: &str) -> Session<'a> {
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, arena);
    let module = parser.parse_module("test");
    assert!(!parser.has_errors(), "unexpected parse errors in: {source}");

    let mut sema = SemanticAnalyser::new(arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    let errors = sema.errors;

    Session { module, errors, interner, registry }
}

fn first_error_kind(session: &Session<'_>) -> &'static str {
    session.errors.iter().next().expect("a diagnostic").kind.name()
}

#[test]
fn literal_addition_infers_i32_and_resolves_native_op() {
    let arena = Arena::new();
    let session = analyze(&arena, "a = 1 + 2\n");
    assert!(!session.errors.has_errors());

    let StmtKind::Assign { targets, value } = &session.module.body[0].kind else { panic!() };
    assert_eq!(value.ty.get(), TypeId::I32);
    assert_eq!(targets[0].ty.get(), TypeId::I32);
    let ExprKind::BinOp { native, .. } = &value.kind else { panic!() };
    let add = native.get().expect("native Add-i32-i32 resolved");
    assert_eq!(add(&Value::I32(1), &Value::I32(2)), Value::I32(3));
}

#[test]
fn names_resolve_to_varids() {
    let arena = Arena::new();
    let session = analyze(&arena, "a = 1\nb = a\n");
    assert!(!session.errors.has_errors());
    let StmtKind::Assign { value, .. } = &session.module.body[1].kind else { panic!() };
    let ExprKind::Name { varid, .. } = &value.kind else { panic!() };
    assert!(varid.get() >= 0);
}

#[test]
fn unresolved_name_is_a_name_error_with_hint() {
    let arena = Arena::new();
    let session = analyze(&arena, "total = 1\nprint(totl)\n");
    assert!(session.errors.has_errors());
    let diagnostic = session.errors.iter().next().unwrap();
    assert_eq!(diagnostic.kind.name(), "NameError");
    assert!(diagnostic.hint.as_deref().unwrap_or("").contains("total"));
}

#[test]
fn every_name_has_varid_or_module_has_name_error() {
    struct NameCheck {
        all_ok: bool,
    }
    impl<'a> TreeWalk<'a> for NameCheck {
        fn visit_expr(&mut self, expr: &'a Expr<'a>, depth: usize) {
            if let ExprKind::Name { varid, ctx, .. } = &expr.kind {
                if matches!(ctx.get(), ExprContext::Load | ExprContext::Store) && varid.get() < 0 {
                    self.all_ok = false;
                }
            }
            walk_expr(self, expr, depth);
        }
    }

    let arena = Arena::new();
    let session = analyze(&arena, "x = 1\ny = x + missing\n");
    let mut check = NameCheck { all_ok: true };
    for stmt in session.module.body {
        check.visit_stmt(stmt, 0);
    }
    let has_name_error = session.errors.iter().any(|d| d.kind.name() == "NameError");
    assert!(check.all_ok || has_name_error);
    assert!(has_name_error);
}

#[test]
fn function_arrow_keeps_parallel_arrays() {
    let arena = Arena::new();
    let session = analyze(&arena, "def f(x: i32, y: f64 = 1.0) -> i32:\n    return x\n");
    assert!(!session.errors.has_errors());
    let StmtKind::FunctionDef(def) = &session.module.body[0].kind else { panic!() };
    let arrow = session.registry.as_arrow(def.arrow.get()).expect("arrow built");
    assert_eq!(arrow.args.len(), arrow.arg_names.len());
    assert_eq!(arrow.args, vec![TypeId::I32, TypeId::F64]);
    assert_eq!(arrow.ret, TypeId::I32);
    assert_eq!(arrow.defaults, vec![false, true]);
}

#[test]
fn return_type_mismatch_is_reported() {
    let arena = Arena::new();
    let session = analyze(&arena, "def f() -> i32:\n    return \"no\"\n");
    assert!(session.errors.has_errors());
    assert_eq!(first_error_kind(&session), "TypeError");
}

#[test]
fn call_argument_type_mismatch_is_reported() {
    let arena = Arena::new();
    let session = analyze(&arena, "def f(x: i32) -> i32:\n    return x\nf(\"s\")\n");
    assert!(session.errors.has_errors());
    assert_eq!(first_error_kind(&session), "TypeError");
}

#[test]
fn call_arity_is_checked() {
    let arena = Arena::new();
    let session = analyze(&arena, "def f(x: i32) -> i32:\n    return x\nf(1, 2)\n");
    assert!(session.errors.iter().any(|d| format!("{}", d.kind).contains("too many")));

    let arena = Arena::new();
    let session = analyze(&arena, "def f(x: i32) -> i32:\n    return x\nf()\n");
    assert!(session.errors.iter().any(|d| format!("{}", d.kind).contains("missing required")));
}

#[test]
fn keyword_arguments_match_by_name() {
    let arena = Arena::new();
    let session = analyze(&arena, "def f(x: i32, y: i32 = 0) -> i32:\n    return x\nf(x=1, y=2)\n");
    assert!(!session.errors.has_errors());

    let arena = Arena::new();
    let session = analyze(&arena, "def f(x: i32) -> i32:\n    return x\nf(z=1)\n");
    assert!(session.errors.iter().any(|d| format!("{}", d.kind).contains("unexpected keyword")));
}

#[test]
fn calling_a_non_callable_is_reported() {
    let arena = Arena::new();
    let session = analyze(&arena, "x = 1\nx()\n");
    assert!(session
        .errors
        .iter()
        .any(|d| format!("{}", d.kind).contains("not callable")));
}

#[test]
fn unsupported_operand_between_int_and_str() {
    let arena = Arena::new();
    let session = analyze(&arena, "a = 1 + \"x\"\n");
    assert!(session.errors.has_errors());
    assert_eq!(first_error_kind(&session), "UnsupportedOperand");
}

#[test]
fn class_attributes_get_declaration_offsets() {
    let arena = Arena::new();
    let session = analyze(&arena, "class P:\n    x: i32 = 0\n    y: i32 = 0\n");
    assert!(!session.errors.has_errors());
    let StmtKind::ClassDef(def) = &session.module.body[0].kind else { panic!() };
    let class_id = def.class_id.get();
    assert!(class_id >= 0);
    let meta = session.registry.class(class_id).unwrap();
    let x = session.interner.lookup("x").unwrap();
    let y = session.interner.lookup("y").unwrap();
    assert_eq!(meta.get_attribute(x).unwrap().offset, 0);
    assert_eq!(meta.get_attribute(y).unwrap().offset, 1);
    assert_eq!(meta.get_attribute(x).unwrap().ty, TypeId::I32);
}

#[test]
fn constructor_call_yields_instance_and_attributes_type() {
    let arena = Arena::new();
    let source = "class P:\n    x: i32 = 0\n    y: i32 = 0\np = P()\nq = p.x + p.y\n";
    let session = analyze(&arena, source);
    assert!(!session.errors.has_errors(), "{:?}", session.errors.iter().next().map(|d| d.kind.clone()));
    let StmtKind::Assign { value, .. } = &session.module.body[2].kind else { panic!() };
    assert_eq!(value.ty.get(), TypeId::I32);
}

#[test]
fn attribute_store_offsets_are_resolved() {
    let arena = Arena::new();
    let source = "class P:\n    x: i32 = 0\np = P()\np.x = 3\n";
    let session = analyze(&arena, source);
    assert!(!session.errors.has_errors());
    let StmtKind::Assign { targets, .. } = &session.module.body[2].kind else { panic!() };
    let ExprKind::Attribute { offset, .. } = &targets[0].kind else { panic!() };
    assert_eq!(offset.get(), 0);
}

#[test]
fn missing_attribute_is_reported() {
    let arena = Arena::new();
    let session = analyze(&arena, "class P:\n    x: i32 = 0\np = P()\nprint(p.z)\n");
    assert!(session.errors.has_errors());
    assert_eq!(first_error_kind(&session), "AttributeError");
}

#[test]
fn magic_method_resolves_operator_on_user_class() {
    let arena = Arena::new();
    let source = "class V:\n    x: i32 = 0\n    def __add__(self, other) -> i32:\n        return self.x\nv = V()\nw = v + v\n";
    let session = analyze(&arena, source);
    assert!(!session.errors.has_errors(), "{:?}", session.errors.iter().next().map(|d| d.kind.clone()));
    let StmtKind::Assign { value, .. } = &session.module.body[2].kind else { panic!() };
    let ExprKind::BinOp { method, native, .. } = &value.kind else { panic!() };
    assert!(native.get().is_none());
    let magic = method.get().expect("__add__ resolved");
    assert_eq!(session.interner.resolve(magic), "__add__");
    assert_eq!(value.ty.get(), TypeId::I32);
}

#[test]
fn chained_comparison_resolves_each_link() {
    let arena = Arena::new();
    let session = analyze(&arena, "r = 1 < 2 <= 3\n");
    assert!(!session.errors.has_errors());
    let StmtKind::Assign { value, .. } = &session.module.body[0].kind else { panic!() };
    assert_eq!(value.ty.get(), TypeId::BOOL);
    let ExprKind::Compare { natives, .. } = &value.kind else { panic!() };
    assert!(natives.iter().all(|n| n.get().is_some()));
}

#[test]
fn if_expression_arms_must_unify() {
    let arena = Arena::new();
    let session = analyze(&arena, "x = 1 if True else \"s\"\n");
    assert!(session.errors.has_errors());
    assert_eq!(first_error_kind(&session), "TypeError");
}

#[test]
fn list_elements_deduce_element_type() {
    let arena = Arena::new();
    let session = analyze(&arena, "xs = [1, 2, 3]\nfor x in xs:\n    y = x + 1\n");
    assert!(!session.errors.has_errors());
    let StmtKind::Assign { value, .. } = &session.module.body[0].kind else { panic!() };
    let name = session.registry.name(value.ty.get(), &session.interner);
    assert_eq!(name, "List[i32]");
}

#[test]
fn annotated_assignment_checks_value_type() {
    let arena = Arena::new();
    let session = analyze(&arena, "x: i32 = \"no\"\n");
    assert!(session.errors.has_errors());
    assert_eq!(first_error_kind(&session), "TypeError");
}

#[test]
fn analysis_continues_after_errors() {
    let arena = Arena::new();
    let session = analyze(&arena, "a = missing1\nb = missing2\n");
    assert_eq!(session.errors.iter().filter(|d| d.kind.name() == "NameError").count(), 2);
}

#[test]
fn missing_module_reports_module_not_found() {
    let arena = Arena::new();
    let session = analyze(&arena, "import surely_not_a_module\n");
    assert!(session
        .errors
        .iter()
        .any(|d| matches!(d.kind, DiagnosticKind::ModuleNotFoundError(_))));
}

#[test]
fn native_module_import_resolves_function_type() {
    fn native_add<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
        match (args.first().and_then(Value::as_int), args.get(1).and_then(Value::as_int)) {
            (Some(a), Some(b)) => Ok(Value::I32((a + b) as i32)),
            _ => Err("native_add expects two integers".to_string()),
        }
    }

    let arena = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    NativeModuleBuilder::new("nmodule")
        .function("native_add", &[TypeId::I32, TypeId::I32], TypeId::I32, native_add)
        .register(&mut imports, &mut registry, &mut interner);

    let source = "from nmodule import native_add\nr = native_add(2, 3)\n";
    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("test");
    assert!(!parser.has_errors());

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(!sema.has_errors(), "{:?}", sema.errors.iter().next().map(|d| d.kind.clone()));

    let StmtKind::Assign { value, .. } = &module.body[1].kind else { panic!() };
    assert_eq!(value.ty.get(), TypeId::I32);
}

#[test]
fn import_error_for_missing_export() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    NativeModuleBuilder::new("nmodule").register(&mut imports, &mut registry, &mut interner);

    let source = "from nmodule import not_there\n";
    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("test");

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(sema.errors.iter().any(|d| matches!(d.kind, DiagnosticKind::ImportError { .. })));
}

#[test]
fn generator_functions_are_flagged() {
    let arena = Arena::new();
    let session = analyze(&arena, "def g(n: i32):\n    yield n\n");
    assert!(!session.errors.has_errors());
    let StmtKind::FunctionDef(def) = &session.module.body[0].kind else { panic!() };
    assert!(def.generator.get());
}

#[test]
fn file_import_resolves_exports() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("mathmod.py"), "def double(x: i32) -> i32:\n    return x * 2\n").unwrap();

    let arena = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    imports.add_to_path(dir.path().to_path_buf());
    let operators = NativeOperators::new();

    let source = "from mathmod import double\nr = double(4)\n";
    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("test");
    assert!(!parser.has_errors());

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(!sema.has_errors(), "{:?}", sema.errors.iter().next().map(|d| d.kind.clone()));

    let StmtKind::Assign { value, .. } = &module.body[1].kind else { panic!() };
    assert_eq!(value.ty.get(), TypeId::I32);
}
