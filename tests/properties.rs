//! Property-based checks: randomly generated arithmetic trees evaluate
//! to the same value as a reference integer evaluator, and parsing then
//! pretty-printing then reparsing is structurally stable.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pythia::arena::Arena;
use pythia::ast::unparse::unparse_module;
use pythia::buffer::StringBuffer;
use pythia::builtins::NativeOperators;
use pythia::importlib::ImportLib;
use pythia::intern::Interner;
use pythia::interpreter::Interpreter;
use pythia::lexer::Lexer;
use pythia::parser::Parser;
use pythia::sema::types::TypeRegistry;
use pythia::sema::SemanticAnalyser;

/// Builds a random parenthesized arithmetic expression and its value.
///
/// The reference evaluator wraps at i32, matching the runtime's integer
/// literals.
fn gen_expr(rng: &mut StdRng, depth: usize) -> (String, i32) {
    if depth == 0 || rng.gen_bool(0.3) {
        let n = rng.gen_range(0..9_i32);
        return (n.to_string(), n);
    }
    let (left_src, left) = gen_expr(rng, depth - 1);
    let (right_src, right) = gen_expr(rng, depth - 1);
    match rng.gen_range(0..3) {
        0 => (format!("({} + {})", left_src, right_src), left.wrapping_add(right)),
        1 => (format!("({} - {})", left_src, right_src), left.wrapping_sub(right)),
        _ => (format!("({} * {})", left_src, right_src), left.wrapping_mul(right)),
    }
}

fn eval_print(source: &str) -> String {
    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("prop");
    assert!(!parser.has_errors(), "parse errors in: {source}");

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(!sema.has_errors(), "sema errors in: {source}");
    drop(sema);

    let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
    interp.eval_module(module);
    assert!(interp.exception().is_none(), "exception in: {source}");
    interp.sink.lines.join("\n")
}

#[test]
fn random_arithmetic_matches_reference_evaluator() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let (expr, expected) = gen_expr(&mut rng, 4);
        let source = format!("print({})\n", expr);
        let printed = eval_print(&source);
        assert_eq!(printed, expected.to_string(), "mismatch for {expr}");
    }
}

#[test]
fn random_trees_survive_unparse_reparse() {
    let mut rng = StdRng::seed_from_u64(0xf00d);
    for _ in 0..100 {
        let (expr, _) = gen_expr(&mut rng, 3);
        let source = format!("r = {}\n", expr);

        let arena = Arena::new();
        let mut interner = Interner::new();
        let lexer = Lexer::new(StringBuffer::new(source.clone()));
        let mut parser = Parser::new(lexer, &mut interner, &arena);
        let module = parser.parse_module("prop");
        assert!(!parser.has_errors());
        let printed = unparse_module(module, &interner);

        let arena2 = Arena::new();
        let lexer2 = Lexer::new(StringBuffer::new(printed.clone()));
        let mut parser2 = Parser::new(lexer2, &mut interner, &arena2);
        let module2 = parser2.parse_module("prop");
        assert!(!parser2.has_errors(), "reparse failed for: {printed}");
        let printed2 = unparse_module(module2, &interner);
        assert_eq!(printed, printed2);
    }
}

#[test]
fn random_comparison_chains_match_reference() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..100 {
        let a = rng.gen_range(0..20_i64);
        let b = rng.gen_range(0..20_i64);
        let c = rng.gen_range(0..20_i64);
        let expected = a < b && b <= c;
        let source = format!("print({} < {} <= {})\n", a, b, c);
        let printed = eval_print(&source);
        assert_eq!(printed, if expected { "True" } else { "False" });
    }
}
