use crate::arena::Arena;
use crate::buffer::StringBuffer;
use crate::builtins::{NativeModuleBuilder, NativeOperators};
use crate::importlib::ImportLib;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::sema::types::{TypeId, TypeRegistry};
use crate::sema::SemanticAnalyser;
use crate::value::{OutputSink, Value};

use super::Interpreter;

/// Runs the whole pipeline and returns (output lines, clean), where
/// clean means no sema errors, no runtime errors and no pending
/// exception.
fn run(source: &str) -> (Vec<String>, bool) {
    run_with(source, |_, _, _| {})
}

fn run_with<F>(source: &str, prepare: F) -> (Vec<String>, bool)
where
    F: for<'a> FnOnce(&mut ImportLib<'a>, &mut TypeRegistry<'a>, &mut Interner),
{
    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    prepare(&mut imports, &mut registry, &mut interner);

    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("test");
    assert!(!parser.has_errors(), "parse errors in: {source}");

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    let sema_clean = !sema.has_errors();
    if !sema_clean {
        let first = sema.errors.iter().next().map(|d| format!("{}", d.kind));
        panic!("sema errors in {source:?}: {first:?}");
    }
    drop(sema);

    let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
    interp.eval_module(module);
    let clean = !interp.errors.has_errors() && interp.exception().is_none();
    (interp.sink.lines.clone(), clean)
}

/// Runs the pipeline and hands the named global to the check closure.
fn check_global(source: &str, name: &str, check: impl FnOnce(&Value<'_>)) {
    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    let lexer = Lexer::new(StringBuffer::new(source));
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module = parser.parse_module("test");
    assert!(!parser.has_errors());

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    assert!(!sema.has_errors());
    drop(sema);

    let sym = interner.lookup(name).expect("global name interned");

    let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
    interp.eval_module(module);
    assert!(interp.exception().is_none());

    let value = interp
        .globals()
        .iter()
        .rev()
        .find(|(n, _)| *n == sym)
        .map(|(_, v)| v.clone())
        .expect("global defined");
    check(&value);
}

#[test]
fn scenario_literal_addition() {
    // `a = 1 + 2` ends with env["a"] == i32 3.
    check_global("a = 1 + 2\n", "a", |value| {
        assert_eq!(*value, Value::I32(3));
    });
}

#[test]
fn scenario_function_call_prints_square() {
    let source = "def f(x: i32) -> i32:\n    return x * x\nprint(f(5))\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["25".to_string()]);
}

#[test]
fn scenario_class_fields() {
    let source = "class P:\n    x: i32 = 0\n    y: i32 = 0\np = P(); p.x = 3; p.y = 4; print(p.x + p.y)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["7".to_string()]);
}

#[test]
fn scenario_native_module() {
    fn native_add<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
        match (args.first().and_then(Value::as_int), args.get(1).and_then(Value::as_int)) {
            (Some(a), Some(b)) => Ok(Value::I32((a + b) as i32)),
            _ => Err("native_add expects two integers".to_string()),
        }
    }

    let source = "from nmodule import native_add\nprint(native_add(2, 3))\n";
    let (lines, clean) = run_with(source, |imports, registry, interner| {
        NativeModuleBuilder::new("nmodule")
            .function("native_add", &[TypeId::I32, TypeId::I32], TypeId::I32, native_add)
            .register(imports, registry, interner);
    });
    assert!(clean);
    assert_eq!(lines, vec!["5".to_string()]);
}

#[test]
fn scenario_match_sequence_with_star() {
    let source = "v = [1, 2, 3]\nmatch v:\n    case [1, *rest]:\n        print(len(rest))\n    case _:\n        print(-1)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["2".to_string()]);
}

#[test]
fn scenario_try_except_prints_message() {
    let source = "try:\n    raise Exception(\"x\")\nexcept Exception as e:\n    print(e)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["x".to_string()]);
}

#[test]
fn while_loop_accumulates() {
    let source = "total = 0\ni = 0\nwhile i < 5:\n    total += i\n    i += 1\nprint(total)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["10".to_string()]);
}

#[test]
fn for_over_range_with_else() {
    let source = "s = 0\nfor i in range(4):\n    s += i\nelse:\n    print(s)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["6".to_string()]);
}

#[test]
fn break_skips_loop_else() {
    let source = "for i in range(5):\n    if i == 2:\n        break\nelse:\n    print(\"else\")\nprint(i)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["2".to_string()]);
}

#[test]
fn recursion_works_for_fib() {
    let source = "def fib(n: i32) -> i32:\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nprint(fib(10))\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["55".to_string()]);
}

#[test]
fn closures_capture_enclosing_locals() {
    let source = "def outer():\n    base = 10\n    def inner(x):\n        return base + x\n    return inner(5)\nprint(outer())\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["15".to_string()]);
}

#[test]
fn default_and_keyword_arguments() {
    let source = "def greet(name, prefix=\"hi\"):\n    return prefix + \" \" + name\nprint(greet(\"ada\"))\nprint(greet(\"ada\", prefix=\"yo\"))\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["hi ada".to_string(), "yo ada".to_string()]);
}

#[test]
fn varargs_and_kwargs_collect() {
    let source = "def f(*args, **kw):\n    return len(args) + len(kw)\nprint(f(1, 2, 3, a=1, b=2))\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["5".to_string()]);
}

#[test]
fn bool_operators_short_circuit() {
    let source = "def boom():\n    raise Exception(\"called\")\nr = False and boom()\nprint(r)\ns = True or boom()\nprint(s)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["False".to_string(), "True".to_string()]);
}

#[test]
fn chained_comparison_evaluates_as_conjunction() {
    let source = "x = 5\nprint(1 < x < 10)\nprint(1 < x < 3)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["True".to_string(), "False".to_string()]);
}

#[test]
fn division_by_zero_is_caught_by_except() {
    let source = "try:\n    x = 1 // 0\nexcept Exception as e:\n    print(\"caught\")\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["caught".to_string()]);
}

#[test]
fn uncaught_exception_surfaces_as_runtime_error() {
    let source = "raise Exception(\"boom\")\n";
    let (_, clean) = run(source);
    assert!(!clean);
}

#[test]
fn finally_runs_on_exception_path() {
    let source = "try:\n    try:\n        raise Exception(\"inner\")\n    finally:\n        print(\"cleanup\")\nexcept Exception as e:\n    print(e)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["cleanup".to_string(), "inner".to_string()]);
}

#[test]
fn generators_yield_in_sequence() {
    let source = "def g(n: i32):\n    i = 0\n    while i < n:\n        yield i\n        i += 1\nfor v in g(3):\n    print(v)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["0".to_string(), "1".to_string(), "2".to_string()]);
}

#[test]
fn yield_from_flattens() {
    let source = "def inner():\n    yield 1\n    yield 2\ndef outer():\n    yield 0\n    yield from inner()\nfor v in outer():\n    print(v)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["0".to_string(), "1".to_string(), "2".to_string()]);
}

#[test]
fn await_drives_generator_to_completion() {
    let source = "async def work():\n    return 41\nasync def main():\n    x = await work()\n    return x + 1\nprint(await main())\n";
    // Module-level await of a non-generator passes through unchanged;
    // async functions without yields run synchronously.
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["42".to_string()]);
}

#[test]
fn fstrings_interpolate_and_format() {
    let source = "x = 7\nname = \"pad\"\nprint(f\"x={x} {name:>5}!\")\nprint(f\"{3.14159:.2f}\")\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["x=7   pad!".to_string(), "3.14".to_string()]);
}

#[test]
fn list_comprehension_with_filter() {
    let source = "xs = [1, 2, 3, 4, 5]\nsquares = [x * x for x in xs if x % 2 == 1]\nprint(squares)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["[1, 9, 25]".to_string()]);
}

#[test]
fn dict_operations() {
    let source = "d = {\"a\": 1, \"b\": 2}\nd[\"c\"] = 3\nprint(d[\"a\"] + d[\"c\"])\nprint(len(d))\nprint(\"b\" in d)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["4".to_string(), "3".to_string(), "True".to_string()]);
}

#[test]
fn tuple_unpacking_with_star() {
    let source = "a, *rest = [1, 2, 3, 4]\nprint(a)\nprint(rest)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["1".to_string(), "[2, 3, 4]".to_string()]);
}

#[test]
fn slices_of_lists_and_strings() {
    let source = "xs = [0, 1, 2, 3, 4]\nprint(xs[1:3])\nprint(xs[::2])\nprint(\"hello\"[1:4])\nprint(xs[-2])\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(
        lines,
        vec!["[1, 2]".to_string(), "[0, 2, 4]".to_string(), "ell".to_string(), "3".to_string()]
    );
}

#[test]
fn methods_bind_their_receiver() {
    let source = "class Counter:\n    count: i32 = 0\n    def bump(self, by: i32) -> i32:\n        self.count = self.count + by\n        return self.count\nc = Counter()\nc.bump(2)\nprint(c.bump(3))\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["5".to_string()]);
}

#[test]
fn magic_add_on_user_class() {
    let source = "class V:\n    x: i32 = 0\n    def __add__(self, other):\n        r = V()\n        r.x = self.x + other.x\n        return r\na = V(1)\nb = V(2)\nc = a + b\nprint(c.x)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["3".to_string()]);
}

#[test]
fn with_calls_enter_and_exit_in_order() {
    let source = "class Ctx:\n    label: str = \"\"\n    def __enter__(self):\n        print(\"enter \" + self.label)\n        return self\n    def __exit__(self):\n        print(\"exit \" + self.label)\nwith Ctx(\"a\") as a, Ctx(\"b\") as b:\n    print(\"body\")\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(
        lines,
        vec![
            "enter a".to_string(),
            "enter b".to_string(),
            "body".to_string(),
            "exit b".to_string(),
            "exit a".to_string(),
        ]
    );
}

#[test]
fn lambda_values_are_callable() {
    let source = "double = lambda x: x * 2\nprint(double(21))\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["42".to_string()]);
}

#[test]
fn walrus_binds_in_condition() {
    let source = "xs = [1, 2, 3]\nif (n := len(xs)) > 2:\n    print(n)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["3".to_string()]);
}

#[test]
fn conditional_expression_extension_form() {
    let source = "x = 5\ny = if x > 3: \"big\" else \"small\"\nprint(y)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["big".to_string()]);
}

#[test]
fn match_guard_falls_through() {
    let source = "v = 5\nmatch v:\n    case x if x > 10:\n        print(\"big\")\n    case x if x > 3:\n        print(\"medium\")\n    case _:\n        print(\"small\")\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["medium".to_string()]);
}

#[test]
fn match_class_pattern_destructures() {
    let source = "class Point:\n    x: i32 = 0\n    y: i32 = 0\np = Point(0, 4)\nmatch p:\n    case Point(0, y=h):\n        print(h)\n    case _:\n        print(-1)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["4".to_string()]);
}

#[test]
fn file_module_import_executes_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("counting.py"),
        "print(\"loaded\")\ndef triple(x: i32) -> i32:\n    return x * 3\n",
    )
    .unwrap();

    let source = "import counting\nfrom counting import triple\nprint(triple(4))\n";
    let (lines, clean) = run_with(source, |imports, _, _| {
        imports.add_to_path(dir.path().to_path_buf());
    });
    assert!(clean);
    assert_eq!(lines, vec!["loaded".to_string(), "12".to_string()]);
}

#[test]
fn module_attribute_access_through_alias() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("helpers.py"), "def answer() -> i32:\n    return 42\n").unwrap();

    let source = "import helpers as h\nprint(h.answer())\n";
    let (lines, clean) = run_with(source, |imports, _, _| {
        imports.add_to_path(dir.path().to_path_buf());
    });
    assert!(clean);
    assert_eq!(lines, vec!["42".to_string()]);
}

#[test]
fn string_operations() {
    let source = "s = \"ab\" + \"cd\"\nprint(s)\nprint(s * 2)\nprint(\"b\" in s)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["abcd".to_string(), "abcdabcd".to_string(), "True".to_string()]);
}

#[test]
fn set_membership_and_dedup() {
    let source = "s = {1, 2, 2, 3}\nprint(len(s))\nprint(2 in s)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["3".to_string(), "True".to_string()]);
}

#[test]
fn assert_raises_on_failure() {
    let source = "try:\n    assert 1 == 2, \"mismatch\"\nexcept Exception as e:\n    print(e)\n";
    let (lines, clean) = run(source);
    assert!(clean);
    assert_eq!(lines, vec!["mismatch".to_string()]);
}
