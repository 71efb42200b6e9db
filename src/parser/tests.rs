use crate::arena::Arena;
use crate::ast::expr::ExprKind;
use crate::ast::ops::{BinaryOperator, BoolOperator, CmpOperator, ExprContext, UnaryOperator};
use crate::ast::pattern::PatKind;
use crate::ast::stmt::StmtKind;
use crate::ast::unparse::unparse_module;
use crate::ast::Module;
use crate::buffer::StringBuffer;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::parser::Parser;

fn parse<'a>(arena: &'a Arena, interner: &mut Interner, source: &str) -> (&'a Module<'a>, bool) {
    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, interner, arena);
    let module = parser.parse_module("test");
    (module, parser.has_errors())
}

fn parse_ok<'a>(arena: &'a Arena, interner: &mut Interner, source: &str) -> &'a Module<'a> {
    let (module, errors) = parse(arena, interner, source);
    assert!(!errors, "unexpected parse errors in: {source}");
    module
}

#[test]
fn parses_simple_assignment() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "a = 1 + 2\n");
    assert_eq!(module.body.len(), 1);
    let StmtKind::Assign { targets, value } = &module.body[0].kind else {
        panic!("expected assignment");
    };
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].ctx(), ExprContext::Store);
    let ExprKind::BinOp { op, .. } = &value.kind else {
        panic!("expected binop value");
    };
    assert_eq!(*op, BinaryOperator::Add);
}

#[test]
fn precedence_groups_multiplication_first() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "x = 1 + 2 * 3\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::BinOp { op, right, .. } = &value.kind else { panic!() };
    assert_eq!(*op, BinaryOperator::Add);
    let ExprKind::BinOp { op: inner, .. } = &right.kind else {
        panic!("rhs should be the multiplication");
    };
    assert_eq!(*inner, BinaryOperator::Mult);
}

#[test]
fn power_is_right_associative() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "x = 2 ** 3 ** 2\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::BinOp { op, right, .. } = &value.kind else { panic!() };
    assert_eq!(*op, BinaryOperator::Pow);
    assert!(matches!(right.kind, ExprKind::BinOp { op: BinaryOperator::Pow, .. }));
}

#[test]
fn chained_comparison_is_one_node() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "r = 1 < x <= 10\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::Compare { ops, comparators, .. } = &value.kind else { panic!() };
    assert_eq!(ops.len(), 2);
    assert_eq!(comparators.len(), 2);
    assert_eq!(ops[0], CmpOperator::Lt);
    assert_eq!(ops[1], CmpOperator::LtE);
}

#[test]
fn bool_chain_folds_into_one_node() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "r = a and b and c\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::BoolOp { op, values, .. } = &value.kind else { panic!() };
    assert_eq!(*op, BoolOperator::And);
    assert_eq!(values.len(), 3);
}

#[test]
fn not_in_and_is_not_merge() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "r = a not in b\ns = a is not b\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::Compare { ops, .. } = &value.kind else { panic!() };
    assert_eq!(ops[0], CmpOperator::NotIn);
    let StmtKind::Assign { value, .. } = &module.body[1].kind else { panic!() };
    let ExprKind::Compare { ops, .. } = &value.kind else { panic!() };
    assert_eq!(ops[0], CmpOperator::IsNot);
}

#[test]
fn unary_minus_binds_looser_than_power() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "x = -2 ** 2\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::UnaryOp { op, operand, .. } = &value.kind else {
        panic!("expected unary at the top");
    };
    assert_eq!(*op, UnaryOperator::USub);
    assert!(matches!(operand.kind, ExprKind::BinOp { op: BinaryOperator::Pow, .. }));
}

#[test]
fn function_def_with_typed_parameters() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "def f(x: i32, y: i32 = 0) -> i32:\n    return x + y\n");
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    assert_eq!(interner.resolve(def.name), "f");
    assert_eq!(def.args.args.len(), 2);
    assert_eq!(def.args.defaults.len(), 1);
    assert!(def.args.args[0].annotation.is_some());
    assert!(def.returns.is_some());
    assert_eq!(def.body.len(), 1);
}

#[test]
fn function_def_with_variadics() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "def f(a, /, b, *args, c, d=1, **kw):\n    pass\n");
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    assert_eq!(def.args.posonlyargs.len(), 1);
    assert_eq!(def.args.args.len(), 1);
    assert!(def.args.vararg.is_some());
    assert_eq!(def.args.kwonlyargs.len(), 2);
    assert_eq!(def.args.kw_defaults.len(), 2);
    assert!(def.args.kw_defaults[0].is_none());
    assert!(def.args.kw_defaults[1].is_some());
    assert!(def.args.kwarg.is_some());
}

#[test]
fn docstring_is_extracted_from_function_body() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "def f():\n    \"\"\"doc\"\"\"\n    return 1\n");
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    assert_eq!(def.docstring.map(|d| interner.resolve(d).to_string()).as_deref(), Some("doc"));
    assert_eq!(def.body.len(), 1);
}

#[test]
fn module_docstring_is_extracted() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "\"\"\"module doc\"\"\"\nx = 1\n");
    assert_eq!(module.docstring.map(|d| interner.resolve(d).to_string()).as_deref(), Some("module doc"));
    assert_eq!(module.body.len(), 1);
}

#[test]
fn class_def_with_annotated_fields() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "class P:\n    x: i32 = 0\n    y: i32 = 0\n");
    let StmtKind::ClassDef(def) = &module.body[0].kind else { panic!() };
    assert_eq!(interner.resolve(def.name), "P");
    assert_eq!(def.body.len(), 2);
    assert!(matches!(def.body[0].kind, StmtKind::AnnAssign { .. }));
}

#[test]
fn elif_chain_nests_in_orelse() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
    let module = parse_ok(&arena, &mut interner, source);
    let StmtKind::If { orelse, .. } = &module.body[0].kind else { panic!() };
    assert_eq!(orelse.len(), 1);
    let StmtKind::If { orelse: inner, .. } = &orelse[0].kind else {
        panic!("elif should nest as an If in orelse");
    };
    assert_eq!(inner.len(), 1);
}

#[test]
fn while_and_for_with_else() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "while x:\n    break\nelse:\n    y = 1\nfor i in xs:\n    continue\nelse:\n    y = 2\n";
    let module = parse_ok(&arena, &mut interner, source);
    let StmtKind::While { orelse, .. } = &module.body[0].kind else { panic!() };
    assert_eq!(orelse.len(), 1);
    let StmtKind::For { orelse, target, .. } = &module.body[1].kind else { panic!() };
    assert_eq!(orelse.len(), 1);
    assert_eq!(target.ctx(), ExprContext::Store);
}

#[test]
fn for_target_tuple_gets_store_context() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "for k, v in items:\n    pass\n");
    let StmtKind::For { target, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::Tuple { elts, .. } = &target.kind else { panic!("expected tuple target") };
    assert_eq!(elts.len(), 2);
    assert_eq!(elts[0].ctx(), ExprContext::Store);
}

#[test]
fn with_items_bind_targets() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "with open(p) as f, lock:\n    pass\n");
    let StmtKind::With { items, .. } = &module.body[0].kind else { panic!() };
    assert_eq!(items.len(), 2);
    assert!(items[0].optional_vars.is_some());
    assert!(items[1].optional_vars.is_none());
}

#[test]
fn try_except_else_finally() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "try:\n    x = 1\nexcept ValueError as e:\n    x = 2\nexcept:\n    x = 3\nelse:\n    x = 4\nfinally:\n    x = 5\n";
    let module = parse_ok(&arena, &mut interner, source);
    let StmtKind::Try { handlers, orelse, finalbody, .. } = &module.body[0].kind else { panic!() };
    assert_eq!(handlers.len(), 2);
    assert!(handlers[0].typ.is_some());
    assert!(handlers[0].name.is_some());
    assert!(handlers[1].typ.is_none());
    assert_eq!(orelse.len(), 1);
    assert_eq!(finalbody.len(), 1);
}

#[test]
fn match_with_all_pattern_forms() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "match v:\n    case [1, *rest]:\n        a = 1\n    case {\"k\": x, **extra}:\n        a = 2\n    case Point(0, y=q):\n        a = 3\n    case 1 | 2 as both:\n        a = 4\n    case None:\n        a = 5\n    case _:\n        a = 6\n";
    let module = parse_ok(&arena, &mut interner, source);
    let StmtKind::Match { cases, .. } = &module.body[0].kind else { panic!() };
    assert_eq!(cases.len(), 6);
    assert!(matches!(cases[0].pattern.kind, PatKind::MatchSequence { .. }));
    assert!(matches!(cases[1].pattern.kind, PatKind::MatchMapping { .. }));
    assert!(matches!(cases[2].pattern.kind, PatKind::MatchClass { .. }));
    assert!(matches!(cases[3].pattern.kind, PatKind::MatchAs { pattern: Some(_), .. }));
    assert!(matches!(cases[4].pattern.kind, PatKind::MatchSingleton { .. }));
    assert!(matches!(cases[5].pattern.kind, PatKind::MatchAs { pattern: None, name: None }));
}

#[test]
fn match_case_guard() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "match v:\n    case x if x > 0:\n        a = 1\n";
    let module = parse_ok(&arena, &mut interner, source);
    let StmtKind::Match { cases, .. } = &module.body[0].kind else { panic!() };
    assert!(cases[0].guard.is_some());
}

#[test]
fn comprehensions_parse() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "a = [x * x for x in xs if x > 0]\nb = {x for x in xs}\nc = {k: v for k, v in ps}\nd = (x for x in xs)\n";
    let module = parse_ok(&arena, &mut interner, source);
    let kinds: Vec<_> = module
        .body
        .iter()
        .map(|s| {
            let StmtKind::Assign { value, .. } = &s.kind else { panic!() };
            &value.kind
        })
        .collect();
    assert!(matches!(kinds[0], ExprKind::ListComp { .. }));
    assert!(matches!(kinds[1], ExprKind::SetComp { .. }));
    assert!(matches!(kinds[2], ExprKind::DictComp { .. }));
    assert!(matches!(kinds[3], ExprKind::GeneratorExp { .. }));
}

#[test]
fn listcomp_filter_is_recorded() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "a = [x for x in xs if x if x > 1]\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::ListComp { generators, .. } = &value.kind else { panic!() };
    assert_eq!(generators[0].ifs.len(), 2);
}

#[test]
fn call_arguments_all_forms() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "r = f(1, *rest, key=2, **kw)\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::Call { args, keywords, .. } = &value.kind else { panic!() };
    assert_eq!(args.len(), 2);
    assert!(matches!(args[1].kind, ExprKind::Starred { .. }));
    assert_eq!(keywords.len(), 2);
    assert!(keywords[0].arg.is_some());
    assert!(keywords[1].arg.is_none());
}

#[test]
fn lambda_with_defaults() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "f = lambda x, y=2: x + y\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::Lambda { args, .. } = &value.kind else { panic!() };
    assert_eq!(args.args.len(), 2);
    assert_eq!(args.defaults.len(), 1);
}

#[test]
fn conditional_expression_both_forms() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "a = x if c else y\nb = if c: x else y\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    assert!(matches!(value.kind, ExprKind::IfExp { .. }));
    let StmtKind::Assign { value, .. } = &module.body[1].kind else { panic!() };
    assert!(matches!(value.kind, ExprKind::IfExp { .. }));
}

#[test]
fn fstring_fragments_alternate() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "s = f\"x={x} and y={y:>4}!\"\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::JoinedStr { values } = &value.kind else { panic!() };
    assert_eq!(values.len(), 5);
    assert!(matches!(values[0].kind, ExprKind::Constant { .. }));
    assert!(matches!(values[1].kind, ExprKind::FormattedValue { .. }));
    let ExprKind::FormattedValue { format_spec, .. } = &values[3].kind else { panic!() };
    assert_eq!(format_spec.map(|s| interner.resolve(s).to_string()).as_deref(), Some(">4"));
}

#[test]
fn fstring_brace_escapes() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "s = f\"{{literal}} {x}\"\n");
    let StmtKind::Assign { value, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::JoinedStr { values } = &value.kind else { panic!() };
    let ExprKind::Constant { value: first, .. } = &values[0].kind else { panic!() };
    let crate::ast::ConstantValue::Str(sym) = first else { panic!() };
    assert_eq!(interner.resolve(*sym), "{literal} ");
}

#[test]
fn aug_and_ann_assign() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "x += 1\ny: i32 = 5\nz: f64\n");
    assert!(matches!(module.body[0].kind, StmtKind::AugAssign { op: BinaryOperator::Add, .. }));
    assert!(matches!(module.body[1].kind, StmtKind::AnnAssign { value: Some(_), .. }));
    assert!(matches!(module.body[2].kind, StmtKind::AnnAssign { value: None, .. }));
}

#[test]
fn chained_assignment_collects_targets() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "a = b = 1\n");
    let StmtKind::Assign { targets, .. } = &module.body[0].kind else { panic!() };
    assert_eq!(targets.len(), 2);
}

#[test]
fn tuple_assignment_and_starred_target() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "a, *rest = xs\n");
    let StmtKind::Assign { targets, .. } = &module.body[0].kind else { panic!() };
    let ExprKind::Tuple { elts, .. } = &targets[0].kind else { panic!() };
    assert!(matches!(elts[1].kind, ExprKind::Starred { .. }));
    assert_eq!(elts[1].ctx(), ExprContext::Store);
}

#[test]
fn imports_parse() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "import a.b.c as d\nfrom m import x as y, z\n");
    let StmtKind::Import { names } = &module.body[0].kind else { panic!() };
    assert_eq!(interner.resolve(names[0].name), "a.b.c");
    assert!(names[0].asname.is_some());
    let StmtKind::ImportFrom { module: m, names } = &module.body[1].kind else { panic!() };
    assert_eq!(interner.resolve(*m), "m");
    assert_eq!(names.len(), 2);
}

#[test]
fn subscripts_and_slices() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "a = xs[1]\nb = xs[1:2]\nc = xs[::2]\n");
    let StmtKind::Assign { value, .. } = &module.body[1].kind else { panic!() };
    let ExprKind::Subscript { slice, .. } = &value.kind else { panic!() };
    assert!(matches!(slice.kind, ExprKind::Slice { lower: Some(_), upper: Some(_), step: None }));
    let StmtKind::Assign { value, .. } = &module.body[2].kind else { panic!() };
    let ExprKind::Subscript { slice, .. } = &value.kind else { panic!() };
    assert!(matches!(slice.kind, ExprKind::Slice { lower: None, upper: None, step: Some(_) }));
}

#[test]
fn walrus_parses_as_named_expr() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "while (n := next_chunk()):\n    pass\n");
    let StmtKind::While { test, .. } = &module.body[0].kind else { panic!() };
    assert!(matches!(test.kind, ExprKind::NamedExpr { .. }));
}

#[test]
fn yield_forms() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "def g():\n    yield\n    yield 1\n    yield from xs\n";
    let module = parse_ok(&arena, &mut interner, source);
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    let values: Vec<_> = def
        .body
        .iter()
        .map(|s| {
            let StmtKind::Expr { value } = &s.kind else { panic!() };
            &value.kind
        })
        .collect();
    assert!(matches!(values[0], ExprKind::Yield { value: None }));
    assert!(matches!(values[1], ExprKind::Yield { value: Some(_) }));
    assert!(matches!(values[2], ExprKind::YieldFrom { .. }));
}

#[test]
fn await_parses_inside_async_def() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "async def f():\n    x = await g()\n");
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    assert!(def.is_async);
    let StmtKind::Assign { value, .. } = &def.body[0].kind else { panic!() };
    assert!(matches!(value.kind, ExprKind::Await { .. }));
}

#[test]
fn decorators_attach_to_def() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "@trace\n@memo(size=2)\ndef f():\n    pass\n");
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    assert_eq!(def.decorators.len(), 2);
    assert!(matches!(def.decorators[1].kind, ExprKind::Call { .. }));
}

#[test]
fn inline_comment_attaches_to_statement() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "x = 1  # the answer\n");
    let comment = module.body[0].comment.get().expect("comment attached");
    assert_eq!(interner.resolve(comment), "# the answer");
}

#[test]
fn semicolon_statements_fold_inline() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "x = 1; y = 2\n");
    let StmtKind::Inline { body } = &module.body[0].kind else { panic!() };
    assert_eq!(body.len(), 2);
}

#[test]
fn global_nonlocal_del_pass() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "def f():\n    global a, b\n    nonlocal c\n    del d\n    pass\n";
    let (module, _) = parse(&arena, &mut interner, source);
    let StmtKind::FunctionDef(def) = &module.body[0].kind else { panic!() };
    assert!(matches!(def.body[0].kind, StmtKind::Global { .. }));
    assert!(matches!(def.body[1].kind, StmtKind::Nonlocal { .. }));
    let StmtKind::Delete { targets } = &def.body[2].kind else { panic!() };
    assert_eq!(targets[0].ctx(), ExprContext::Del);
    assert!(matches!(def.body[3].kind, StmtKind::Pass));
}

#[test]
fn error_recovery_inserts_invalid_and_continues() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let (module, had_errors) = parse(&arena, &mut interner, "x = = 1\ny = 2\n");
    assert!(had_errors);
    assert!(module.body.iter().any(|s| matches!(s.kind, StmtKind::Invalid)));
    assert!(module.body.iter().any(|s| matches!(s.kind, StmtKind::Assign { .. })));
}

#[test]
fn error_reports_expected_set() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let lexer = Lexer::new(StringBuffer::new("def f(:\n    pass\n"));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    parser.parse_module("test");
    assert!(parser.has_errors());
    let first = parser.errors().iter().next().unwrap();
    assert_eq!(first.kind.name(), "ParseError");
}

#[test]
fn statement_locations_are_ordered() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let module = parse_ok(&arena, &mut interner, "if x:\n    a = 1\n    b = 2\n");
    let stmt = module.body[0];
    assert_eq!(stmt.loc.lineno, 1);
    assert!(stmt.loc.end_lineno >= 3);
    assert!(stmt.loc.lineno <= stmt.loc.end_lineno);
}

#[test]
fn unparse_reparse_is_stable() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let source = "def fib(n: i32) -> i32:\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\n\nclass P:\n    x: i32 = 0\n\nfor i in range(10):\n    total += fib(i) * 2 ** i\n";
    let module = parse_ok(&arena, &mut interner, source);
    let printed = unparse_module(module, &interner);

    let arena2 = Arena::new();
    let module2 = parse_ok(&arena2, &mut interner, &printed);
    let printed2 = unparse_module(module2, &interner);
    assert_eq!(printed, printed2);
}

#[test]
fn replay_lexer_feeds_parser() {
    use crate::lexer::{ReplayLexer, TokenStream};
    let mut interner = Interner::new();
    let mut lexer = Lexer::new(StringBuffer::new("a = 1\n"));
    let tokens = lexer.extract(&mut interner);

    let arena = Arena::new();
    let mut parser = Parser::new(ReplayLexer::new(tokens), &mut interner, &arena);
    let module = parser.parse_module("replay");
    assert!(!parser.has_errors());
    assert_eq!(module.body.len(), 1);
}
