//! End-to-end pipeline checks across lexer, parser, sema and evaluator,
//! exercised through the public API the CLI drives.

use pythia::arena::Arena;
use pythia::buffer::StringBuffer;
use pythia::builtins::NativeOperators;
use pythia::importlib::ImportLib;
use pythia::intern::Interner;
use pythia::interpreter::Interpreter;
use pythia::lexer::Lexer;
use pythia::parser::Parser;
use pythia::sema::types::TypeRegistry;
use pythia::sema::SemanticAnalyser;
use pythia::value::{CastError, Value};

fn run_lines(source: &str) -> Vec<String> {
    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("pipeline");
    assert!(!parser.has_errors(), "parse errors in: {source}");

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(!sema.has_errors(), "sema errors in: {source}");
    drop(sema);

    let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
    interp.eval_module(module);
    assert!(interp.exception().is_none());
    interp.sink.lines.clone()
}

#[test]
fn interner_bijection_holds_across_a_parse() {
    let mut interner = Interner::new();
    let words = ["alpha", "beta", "alpha", "gamma", "beta", ""];
    let mut symbols = Vec::new();
    for word in words {
        symbols.push((word, interner.intern(word)));
    }
    for (word, sym) in &symbols {
        assert_eq!(interner.resolve(*sym), *word);
    }
    for (a, sa) in &symbols {
        for (b, sb) in &symbols {
            assert_eq!(sa == sb, a == b, "interner not bijective for {a:?}/{b:?}");
        }
    }
}

#[test]
fn value_tag_fidelity() {
    let values = [
        Value::Bool(true),
        Value::I32(7),
        Value::I64(1 << 40),
        Value::F64(2.5),
        Value::string("s"),
        Value::None,
    ];
    let mut error = CastError::default();
    for value in &values {
        // is::<T>() implies cast::<T>() succeeds without the error slot.
        if value.is::<i32>() {
            value.cast::<i32>(&mut error);
            assert!(!error.failed);
        }
        if value.is::<f64>() {
            value.cast::<f64>(&mut error);
            assert!(!error.failed);
        }
        if value.is::<bool>() {
            value.cast::<bool>(&mut error);
            assert!(!error.failed);
        }
    }
}

#[test]
fn parse_errors_are_recoverable_and_reported() {
    let arena = Arena::new();
    let mut interner = Interner::new();
    let (module, diagnostics) = pythia::parse_one("x = = 1\ny = 2\n", "broken", &arena, &mut interner);
    assert!(diagnostics.has_parse_errors());
    // Recovery kept parsing: the second statement is present.
    assert!(module.body.len() >= 2);
}

#[test]
fn full_program_smoke() {
    let source = r#"
"""Inventory report demo."""

class Item:
    name: str = ""
    price: i32 = 0
    def total(self, count: i32) -> i32:
        return self.price * count

def describe(item, count):
    return f"{item.name}: {item.total(count)}"

items = [Item("bolt", 3), Item("nut", 2)]
report = [describe(item, 10) for item in items]
for line in report:
    print(line)

total = 0
for item in items:
    total += item.price
print(f"total={total}")
"#;
    let lines = run_lines(source);
    assert_eq!(
        lines,
        vec![
            "bolt: 30".to_string(),
            "nut: 20".to_string(),
            "total=5".to_string(),
        ]
    );
}

#[test]
fn exceptions_do_not_terminate_the_embedding() {
    let source = "def risky(n):\n    if n == 0:\n        raise Exception(\"zero\")\n    return 10 // n\nfor n in [2, 0, 5]:\n    try:\n        print(risky(n))\n    except Exception as e:\n        print(e)\n";
    let lines = run_lines(source);
    assert_eq!(lines, vec!["5".to_string(), "zero".to_string(), "2".to_string()]);
}

#[test]
fn generators_interleave_with_collections() {
    let source = "def evens(limit):\n    n = 0\n    while n < limit:\n        yield n\n        n += 2\nsquares = [x * x for x in evens(7)]\nprint(squares)\n";
    let lines = run_lines(source);
    assert_eq!(lines, vec!["[0, 4, 16, 36]".to_string()]);
}

#[test]
fn module_search_path_resolves_nested_packages() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("tools/text")).unwrap();
    std::fs::write(dir.path().join("tools/text/__init__.py"), "def shout(s: str) -> str:\n    return s + \"!\"\n").unwrap();

    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    imports.add_to_path(dir.path().to_path_buf());
    let operators = NativeOperators::new();

    let source = "from tools.text import shout\nprint(shout(\"hey\"))\n";
    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("pipeline");
    assert!(!parser.has_errors());

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(!sema.has_errors());
    drop(sema);

    let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
    interp.eval_module(module);
    assert!(interp.exception().is_none());
    assert_eq!(interp.sink.lines, vec!["hey!".to_string()]);
}
