//! Native operators and builtin functions.
//!
//! The operator tables map signature fingerprints like `"Add-i32-i32"` to
//! plain function pointers over [`Value`]s; sema resolves each operator
//! node against them once, and the evaluator just calls what was resolved.
//! Division and shift edge cases return `Invalid`, which the evaluator
//! turns into a runtime diagnostic at the node that produced them.

use std::collections::HashMap;

use crate::importlib::{ImportLib, ModuleSource, NativeExport};
use crate::intern::{Interner, Symbol};
use crate::sema::bindings::Bindings;
use crate::sema::types::{Arrow, TypeId, TypeRegistry};
use crate::value::{NativeBinaryFn, NativeFn, NativeUnaryFn, OutputSink, Value};

/// The four native operator tables, keyed by signature fingerprint.
pub struct NativeOperators {
    binary: HashMap<String, NativeBinaryFn>,
    unary: HashMap<String, NativeUnaryFn>,
    boolean: HashMap<String, NativeBinaryFn>,
    compare: HashMap<String, NativeBinaryFn>,
}

pub fn binary_key(op: &str, lhs: &str, rhs: &str) -> String {
    format!("{}-{}-{}", op, lhs, rhs)
}

pub fn unary_key(op: &str, operand: &str) -> String {
    format!("{}-{}", op, operand)
}

macro_rules! int_ops {
    ($table:expr, $tag:literal, $var:ident, $ty:ty) => {{
        fn add<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x.wrapping_add(*y)),
                _ => Value::Invalid,
            }
        }
        fn sub<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x.wrapping_sub(*y)),
                _ => Value::Invalid,
            }
        }
        fn mult<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x.wrapping_mul(*y)),
                _ => Value::Invalid,
            }
        }
        fn div<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => match x.checked_div(*y) {
                    Some(v) => Value::$var(v),
                    None => Value::Invalid,
                },
                _ => Value::Invalid,
            }
        }
        fn floordiv<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => {
                    if *y == 0 {
                        Value::Invalid
                    } else {
                        Value::$var(x.div_euclid(*y))
                    }
                }
                _ => Value::Invalid,
            }
        }
        fn modulo<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => {
                    if *y == 0 {
                        Value::Invalid
                    } else {
                        Value::$var(x.rem_euclid(*y))
                    }
                }
                _ => Value::Invalid,
            }
        }
        fn pow<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => match u32::try_from(*y as i64) {
                    Ok(exp) => Value::$var(x.wrapping_pow(exp)),
                    Err(_) => Value::Invalid,
                },
                _ => Value::Invalid,
            }
        }
        fn shl<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x.wrapping_shl(*y as u32)),
                _ => Value::Invalid,
            }
        }
        fn shr<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x.wrapping_shr(*y as u32)),
                _ => Value::Invalid,
            }
        }
        fn bitor<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x | y),
                _ => Value::Invalid,
            }
        }
        fn bitxor<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x ^ y),
                _ => Value::Invalid,
            }
        }
        fn bitand<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x & y),
                _ => Value::Invalid,
            }
        }

        let table: &mut NativeOperators = $table;
        for (op, f) in [
            ("Add", add as NativeBinaryFn),
            ("Sub", sub),
            ("Mult", mult),
            ("Div", div),
            ("FloorDiv", floordiv),
            ("Mod", modulo),
            ("Pow", pow),
            ("LShift", shl),
            ("RShift", shr),
            ("BitOr", bitor),
            ("BitXor", bitxor),
            ("BitAnd", bitand),
        ] {
            table.binary.insert(binary_key(op, $tag, $tag), f);
        }
        cmp_ops!(table, $tag, $var);
    }};
}

macro_rules! float_ops {
    ($table:expr, $tag:literal, $var:ident) => {{
        fn add<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x + y),
                _ => Value::Invalid,
            }
        }
        fn sub<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x - y),
                _ => Value::Invalid,
            }
        }
        fn mult<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x * y),
                _ => Value::Invalid,
            }
        }
        fn div<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x / y),
                _ => Value::Invalid,
            }
        }
        fn floordiv<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var((x / y).floor()),
                _ => Value::Invalid,
            }
        }
        fn modulo<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x % y),
                _ => Value::Invalid,
            }
        }
        fn pow<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::$var(x.powf(*y)),
                _ => Value::Invalid,
            }
        }

        let table: &mut NativeOperators = $table;
        for (op, f) in [
            ("Add", add as NativeBinaryFn),
            ("Sub", sub),
            ("Mult", mult),
            ("Div", div),
            ("FloorDiv", floordiv),
            ("Mod", modulo),
            ("Pow", pow),
        ] {
            table.binary.insert(binary_key(op, $tag, $tag), f);
        }
        cmp_ops!(table, $tag, $var);
    }};
}

macro_rules! cmp_ops {
    ($table:expr, $tag:literal, $var:ident) => {{
        fn eq<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::Bool(x == y),
                _ => Value::Invalid,
            }
        }
        fn ne<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::Bool(x != y),
                _ => Value::Invalid,
            }
        }
        fn lt<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::Bool(x < y),
                _ => Value::Invalid,
            }
        }
        fn le<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::Bool(x <= y),
                _ => Value::Invalid,
            }
        }
        fn gt<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::Bool(x > y),
                _ => Value::Invalid,
            }
        }
        fn ge<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::$var(x), Value::$var(y)) => Value::Bool(x >= y),
                _ => Value::Invalid,
            }
        }

        let table: &mut NativeOperators = $table;
        for (op, f) in [
            ("Eq", eq as NativeBinaryFn),
            ("NotEq", ne),
            ("Lt", lt),
            ("LtE", le),
            ("Gt", gt),
            ("GtE", ge),
        ] {
            table.compare.insert(binary_key(op, $tag, $tag), f);
        }
    }};
}

macro_rules! signed_unary {
    ($table:expr, $tag:literal, $var:ident) => {{
        fn neg<'v>(a: &Value<'v>) -> Value<'v> {
            match a {
                Value::$var(x) => Value::$var(x.wrapping_neg()),
                _ => Value::Invalid,
            }
        }
        fn pos<'v>(a: &Value<'v>) -> Value<'v> {
            match a {
                Value::$var(x) => Value::$var(*x),
                _ => Value::Invalid,
            }
        }
        fn invert<'v>(a: &Value<'v>) -> Value<'v> {
            match a {
                Value::$var(x) => Value::$var(!x),
                _ => Value::Invalid,
            }
        }
        let table: &mut NativeOperators = $table;
        table.unary.insert(unary_key("USub", $tag), neg as NativeUnaryFn);
        table.unary.insert(unary_key("UAdd", $tag), pos as NativeUnaryFn);
        table.unary.insert(unary_key("Invert", $tag), invert as NativeUnaryFn);
    }};
}

macro_rules! float_unary {
    ($table:expr, $tag:literal, $var:ident) => {{
        fn neg<'v>(a: &Value<'v>) -> Value<'v> {
            match a {
                Value::$var(x) => Value::$var(-x),
                _ => Value::Invalid,
            }
        }
        fn pos<'v>(a: &Value<'v>) -> Value<'v> {
            match a {
                Value::$var(x) => Value::$var(*x),
                _ => Value::Invalid,
            }
        }
        let table: &mut NativeOperators = $table;
        table.unary.insert(unary_key("USub", $tag), neg as NativeUnaryFn);
        table.unary.insert(unary_key("UAdd", $tag), pos as NativeUnaryFn);
    }};
}

impl NativeOperators {
    pub fn new() -> Self {
        let mut table = NativeOperators {
            binary: HashMap::new(),
            unary: HashMap::new(),
            boolean: HashMap::new(),
            compare: HashMap::new(),
        };

        int_ops!(&mut table, "i8", I8, i8);
        int_ops!(&mut table, "i16", I16, i16);
        int_ops!(&mut table, "i32", I32, i32);
        int_ops!(&mut table, "i64", I64, i64);
        int_ops!(&mut table, "u8", U8, u8);
        int_ops!(&mut table, "u16", U16, u16);
        int_ops!(&mut table, "u32", U32, u32);
        int_ops!(&mut table, "u64", U64, u64);
        float_ops!(&mut table, "f32", F32);
        float_ops!(&mut table, "f64", F64);

        signed_unary!(&mut table, "i8", I8);
        signed_unary!(&mut table, "i16", I16);
        signed_unary!(&mut table, "i32", I32);
        signed_unary!(&mut table, "i64", I64);
        float_unary!(&mut table, "f32", F32);
        float_unary!(&mut table, "f64", F64);

        fn bool_and<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => Value::Bool(*x && *y),
                _ => Value::Invalid,
            }
        }
        fn bool_or<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => Value::Bool(*x || *y),
                _ => Value::Invalid,
            }
        }
        fn bool_not<'v>(a: &Value<'v>) -> Value<'v> {
            match a {
                Value::Bool(x) => Value::Bool(!x),
                _ => Value::Invalid,
            }
        }
        table.boolean.insert(binary_key("And", "bool", "bool"), bool_and);
        table.boolean.insert(binary_key("Or", "bool", "bool"), bool_or);
        table.unary.insert(unary_key("Not", "bool"), bool_not);
        cmp_ops!(&mut table, "bool", Bool);

        fn str_concat<'v>(a: &Value<'v>, b: &Value<'v>) -> Value<'v> {
            match (a, b) {
                (Value::Str(x), Value::Str(y)) => Value::string(format!("{}{}", x, y)),
                _ => Value::Invalid,
            }
        }
        table.binary.insert(binary_key("Add", "str", "str"), str_concat);
        cmp_ops!(&mut table, "str", Str);

        table
    }

    pub fn binary(&self, key: &str) -> Option<NativeBinaryFn> {
        self.binary.get(key).copied()
    }

    pub fn unary(&self, key: &str) -> Option<NativeUnaryFn> {
        self.unary.get(key).copied()
    }

    pub fn boolean(&self, key: &str) -> Option<NativeBinaryFn> {
        self.boolean.get(key).copied()
    }

    pub fn compare(&self, key: &str) -> Option<NativeBinaryFn> {
        self.compare.get(key).copied()
    }
}

impl Default for NativeOperators {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------
// Builtin functions
// ----------------------------------------------------------------------

fn builtin_print<'v>(sink: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    let parts: Vec<String> = args.iter().map(Value::to_display_string).collect();
    sink.write_line(parts.join(" "));
    Ok(Value::None)
}

fn builtin_len<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    let arg = args.first().ok_or("len() takes exactly one argument")?;
    let length = match arg {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Set(items) => items.borrow().len(),
        Value::Dict(items) => items.borrow().len(),
        other => return Err(format!("object of type '{}' has no len()", other.tag().as_str())),
    };
    Ok(Value::I32(length as i32))
}

fn builtin_range<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    let ints: Vec<i64> = args
        .iter()
        .map(|a| a.as_int().ok_or_else(|| "range() expects integers".to_string()))
        .collect::<Result<_, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err("range() takes 1 to 3 arguments".to_string()),
    };
    if step == 0 {
        return Err("range() step must not be zero".to_string());
    }
    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::I32(current as i32));
        current += step;
    }
    Ok(Value::list(items))
}

fn builtin_abs<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    match args.first() {
        Some(Value::F64(v)) => Ok(Value::F64(v.abs())),
        Some(Value::F32(v)) => Ok(Value::F32(v.abs())),
        Some(other) => other
            .as_int()
            .map(|v| Value::I64(v.abs()))
            .ok_or_else(|| "abs() expects a number".to_string()),
        None => Err("abs() takes exactly one argument".to_string()),
    }
}

fn builtin_min<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    extremum(args, true)
}

fn builtin_max<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    extremum(args, false)
}

fn extremum<'v>(args: &[Value<'v>], smallest: bool) -> Result<Value<'v>, String> {
    let items: Vec<Value<'v>> = match args {
        [Value::List(items)] => items.borrow().clone(),
        other => other.to_vec(),
    };
    let mut best: Option<Value<'v>> = None;
    for item in items {
        let current = item.as_float().ok_or("min()/max() expect numbers")?;
        let replace = match &best {
            None => true,
            Some(b) => {
                let bv = b.as_float().unwrap_or(0.0);
                if smallest {
                    current < bv
                } else {
                    current > bv
                }
            }
        };
        if replace {
            best = Some(item);
        }
    }
    best.ok_or_else(|| "min()/max() of empty sequence".to_string())
}

fn builtin_sin<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    match args.first().and_then(Value::as_float) {
        Some(v) => Ok(Value::F64(v.sin())),
        None => Err("sin() expects a number".to_string()),
    }
}

fn builtin_str<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    Ok(Value::string(args.first().map(Value::to_display_string).unwrap_or_default()))
}

fn builtin_int<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    match args.first() {
        Some(Value::Str(s)) => s
            .trim()
            .parse::<i64>()
            .map(|v| Value::I32(v as i32))
            .map_err(|_| format!("invalid literal for int(): '{}'", s)),
        Some(other) => match other.as_float() {
            Some(v) => Ok(Value::I32(v as i32)),
            None => Err("int() expects a number or string".to_string()),
        },
        None => Ok(Value::I32(0)),
    }
}

fn builtin_float<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    match args.first() {
        Some(Value::Str(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::F64)
            .map_err(|_| format!("invalid literal for float(): '{}'", s)),
        Some(other) => match other.as_float() {
            Some(v) => Ok(Value::F64(v)),
            None => Err("float() expects a number or string".to_string()),
        },
        None => Ok(Value::F64(0.0)),
    }
}

fn builtin_bool<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
    Ok(Value::Bool(args.first().map(Value::is_truthy).unwrap_or(false)))
}

/// Builtins with their native implementations; the arrow is built at
/// registration time.
pub fn builtin_functions() -> &'static [(&'static str, NativeFn)] {
    &[
        ("print", builtin_print),
        ("len", builtin_len),
        ("range", builtin_range),
        ("abs", builtin_abs),
        ("min", builtin_min),
        ("max", builtin_max),
        ("sin", builtin_sin),
        ("str", builtin_str),
        ("int", builtin_int),
        ("float", builtin_float),
        ("bool", builtin_bool),
    ]
}

/// Seeds the root binding scope: primitive type names and the builtin
/// functions, so name resolution and call typing see them.
pub fn register_builtins<'a>(
    bindings: &mut Bindings<'a>,
    registry: &mut TypeRegistry<'a>,
    interner: &mut Interner,
) {
    use crate::ast::Loc;
    use crate::sema::types::primitive_names;

    for (name, _) in primitive_names() {
        let sym = interner.intern(name);
        bindings.add(sym, Loc::default(), None, TypeId::TYPE);
    }

    // Builtin exception classes are names too.
    for class_id in [registry.exception_class, registry.stop_iteration_class] {
        if let Some(meta) = registry.class(class_id) {
            let name = meta.name;
            let instance = meta.instance_type;
            let mut ctor = Arrow::variadic(instance);
            ctor.ctor_of = Some(instance);
            let ctor = registry.arrow(ctor);
            bindings.add(name, Loc::default(), None, ctor);
        }
    }

    let ret_for = |name: &str, registry: &mut TypeRegistry<'a>| -> TypeId {
        match name {
            "print" => TypeId::NONE,
            "len" | "int" => TypeId::I32,
            "range" => registry.list_of(TypeId::I32),
            "abs" | "min" | "max" => TypeId::ANY,
            "sin" | "float" => TypeId::F64,
            "str" => TypeId::STR,
            "bool" => TypeId::BOOL,
            _ => TypeId::ANY,
        }
    };

    for (name, _) in builtin_functions() {
        let ret = ret_for(name, registry);
        let arrow = registry.arrow(Arrow::variadic(ret));
        let sym = interner.intern(name);
        bindings.add(sym, Loc::default(), None, arrow);
    }
}

/// The builtin environment the evaluator starts from, mirroring the
/// binding seeds above.
pub fn builtin_values<'a>(interner: &mut Interner, registry: &TypeRegistry<'a>) -> Vec<(Symbol, Value<'a>)> {
    let mut env: Vec<(Symbol, Value<'a>)> = Vec::new();
    for (name, _) in crate::sema::types::primitive_names() {
        env.push((interner.intern(name), Value::None));
    }
    env.push((interner.intern("Exception"), Value::BuiltinClass(registry.exception_class)));
    env.push((interner.intern("StopIteration"), Value::BuiltinClass(registry.stop_iteration_class)));
    for (name, func) in builtin_functions() {
        env.push((interner.intern(name), Value::Native(*func)));
    }
    env
}

// ----------------------------------------------------------------------
// Native modules
// ----------------------------------------------------------------------

/// Fluent registration of a native module: functions with their
/// parameter and return types, injected through the import library.
///
/// ```
/// use pythia::builtins::NativeModuleBuilder;
/// use pythia::importlib::ImportLib;
/// use pythia::intern::Interner;
/// use pythia::sema::types::{TypeId, TypeRegistry};
/// use pythia::value::{OutputSink, Value};
///
/// fn native_add<'v>(_: &mut OutputSink, args: &[Value<'v>]) -> Result<Value<'v>, String> {
///     match (args.first().and_then(Value::as_int), args.get(1).and_then(Value::as_int)) {
///         (Some(a), Some(b)) => Ok(Value::I32((a + b) as i32)),
///         _ => Err("native_add expects two integers".to_string()),
///     }
/// }
///
/// let mut interner = Interner::new();
/// let mut registry = TypeRegistry::new(&mut interner);
/// let mut imports = ImportLib::new();
/// NativeModuleBuilder::new("nmodule")
///     .function("native_add", &[TypeId::I32, TypeId::I32], TypeId::I32, native_add)
///     .register(&mut imports, &mut registry, &mut interner);
/// assert!(imports.is_registered("nmodule"));
/// ```
pub struct NativeModuleBuilder {
    name: String,
    functions: Vec<(String, Vec<TypeId>, TypeId, NativeFn)>,
}

impl NativeModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        NativeModuleBuilder { name: name.into(), functions: Vec::new() }
    }

    pub fn function(mut self, name: &str, params: &[TypeId], ret: TypeId, func: NativeFn) -> Self {
        self.functions.push((name.to_string(), params.to_vec(), ret, func));
        self
    }

    pub fn register<'a>(
        self,
        imports: &mut ImportLib<'a>,
        registry: &mut TypeRegistry<'a>,
        interner: &mut Interner,
    ) {
        let mut exports = Vec::new();
        for (name, params, ret, func) in self.functions {
            let arg_names: Vec<Symbol> = (0..params.len())
                .map(|i| interner.intern(&format!("a{}", i)))
                .collect();
            let defaults = vec![false; params.len()];
            let arrow = registry.arrow(Arrow::new(params, ret, arg_names, defaults));
            exports.push(NativeExport { name: interner.intern(&name), ty: arrow, func });
        }
        imports.add_module(&self.name, ModuleSource::Native { exports });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_add_fingerprint_resolves_and_adds() {
        let table = NativeOperators::new();
        let add = table.binary("Add-i32-i32").expect("native integer add");
        let result = add(&Value::I32(2), &Value::I32(3));
        assert_eq!(result, Value::I32(5));
    }

    #[test]
    fn mismatched_operands_yield_invalid() {
        let table = NativeOperators::new();
        let add = table.binary("Add-i32-i32").unwrap();
        assert_eq!(add(&Value::I32(2), &Value::F64(3.0)), Value::Invalid);
    }

    #[test]
    fn division_by_zero_yields_invalid() {
        let table = NativeOperators::new();
        let div = table.binary("Div-i64-i64").unwrap();
        assert_eq!(div(&Value::I64(1), &Value::I64(0)), Value::Invalid);
    }

    #[test]
    fn float_operations_work() {
        let table = NativeOperators::new();
        let mult = table.binary("Mult-f64-f64").unwrap();
        assert_eq!(mult(&Value::F64(2.5), &Value::F64(4.0)), Value::F64(10.0));
    }

    #[test]
    fn comparison_returns_bool() {
        let table = NativeOperators::new();
        let lt = table.compare("Lt-i32-i32").unwrap();
        assert_eq!(lt(&Value::I32(1), &Value::I32(2)), Value::Bool(true));
    }

    #[test]
    fn string_concat_is_native() {
        let table = NativeOperators::new();
        let add = table.binary("Add-str-str").unwrap();
        assert_eq!(add(&Value::string("ab"), &Value::string("cd")), Value::string("abcd"));
    }

    #[test]
    fn unary_negation() {
        let table = NativeOperators::new();
        let neg = table.unary("USub-i32").unwrap();
        assert_eq!(neg(&Value::I32(5)), Value::I32(-5));
        let not = table.unary("Not-bool").unwrap();
        assert_eq!(not(&Value::Bool(true)), Value::Bool(false));
    }

    #[test]
    fn python_style_modulo_is_nonnegative() {
        let table = NativeOperators::new();
        let modulo = table.binary("Mod-i32-i32").unwrap();
        assert_eq!(modulo(&Value::I32(-7), &Value::I32(3)), Value::I32(2));
    }

    #[test]
    fn print_joins_arguments() {
        let mut sink = OutputSink::new();
        builtin_print(&mut sink, &[Value::I32(1), Value::string("x")]).unwrap();
        assert_eq!(sink.lines, vec!["1 x".to_string()]);
    }

    #[test]
    fn len_counts_collections() {
        let mut sink = OutputSink::new();
        let list = Value::list(vec![Value::I32(1), Value::I32(2)]);
        assert_eq!(builtin_len(&mut sink, &[list]).unwrap(), Value::I32(2));
        assert_eq!(builtin_len(&mut sink, &[Value::string("abc")]).unwrap(), Value::I32(3));
        assert!(builtin_len(&mut sink, &[Value::I32(1)]).is_err());
    }

    #[test]
    fn range_produces_sequences() {
        let mut sink = OutputSink::new();
        let r = builtin_range(&mut sink, &[Value::I32(3)]).unwrap();
        assert_eq!(r, Value::list(vec![Value::I32(0), Value::I32(1), Value::I32(2)]));
        let r = builtin_range(&mut sink, &[Value::I32(5), Value::I32(1), Value::I32(-2)]).unwrap();
        assert_eq!(r, Value::list(vec![Value::I32(5), Value::I32(3)]));
    }

    #[test]
    fn conversions_round_trip() {
        let mut sink = OutputSink::new();
        assert_eq!(builtin_int(&mut sink, &[Value::string("42")]).unwrap(), Value::I32(42));
        assert_eq!(builtin_float(&mut sink, &[Value::I32(2)]).unwrap(), Value::F64(2.0));
        assert_eq!(builtin_str(&mut sink, &[Value::I32(7)]).unwrap(), Value::string("7"));
        assert_eq!(builtin_bool(&mut sink, &[Value::I32(0)]).unwrap(), Value::Bool(false));
    }
}
