//! The type registry: every type the analyzer reasons about, interned
//! behind a small integer id.
//!
//! Ids are handed out once and never mutated, so composite types refer to
//! their parts by id and cannot form cycles by construction; a defensive
//! cycle check still guards type assignment, mirroring the invariant the
//! evaluator depends on. Class metadata (attribute layout, constructor
//! arrow, namespace) lives here as well, keyed by the class id written
//! into the `ClassDef` node.

use crate::ast::stmt::{ClassDef, StmtRef};
use crate::intern::{Interner, Symbol};

/// Interned type handle. `UNKNOWN` doubles as "not yet inferred" and
/// "analysis failed here, skip dependent checks".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const UNKNOWN: TypeId = TypeId(0);
    pub const ANY: TypeId = TypeId(1);
    pub const TYPE: TypeId = TypeId(2);
    pub const BOOL: TypeId = TypeId(3);
    pub const I8: TypeId = TypeId(4);
    pub const I16: TypeId = TypeId(5);
    pub const I32: TypeId = TypeId(6);
    pub const I64: TypeId = TypeId(7);
    pub const U8: TypeId = TypeId(8);
    pub const U16: TypeId = TypeId(9);
    pub const U32: TypeId = TypeId(10);
    pub const U64: TypeId = TypeId(11);
    pub const F32: TypeId = TypeId(12);
    pub const F64: TypeId = TypeId(13);
    pub const STR: TypeId = TypeId(14);
    pub const NONE: TypeId = TypeId(15);

    pub fn is_unknown(self) -> bool {
        self == TypeId::UNKNOWN
    }
}

impl Default for TypeId {
    fn default() -> Self {
        TypeId::UNKNOWN
    }
}

/// A function type: parameter types, names, default-presence, return.
///
/// `args.len() == arg_names.len()` always holds. `ctor_of` links a
/// constructor arrow back to the instance type it builds.
#[derive(Debug, Clone, PartialEq)]
pub struct Arrow {
    pub args: Vec<TypeId>,
    pub ret: TypeId,
    pub arg_names: Vec<Symbol>,
    pub defaults: Vec<bool>,
    pub variadic: bool,
    pub ctor_of: Option<TypeId>,
}

impl Arrow {
    pub fn new(args: Vec<TypeId>, ret: TypeId, arg_names: Vec<Symbol>, defaults: Vec<bool>) -> Self {
        debug_assert_eq!(args.len(), arg_names.len());
        Arrow { args, ret, arg_names, defaults, variadic: false, ctor_of: None }
    }

    pub fn variadic(ret: TypeId) -> Self {
        Arrow { args: Vec::new(), ret, arg_names: Vec::new(), defaults: Vec::new(), variadic: true, ctor_of: None }
    }

    /// Number of arguments that must be supplied.
    pub fn required(&self) -> usize {
        self.defaults.iter().filter(|d| !**d).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Unknown,
    /// Supertype marker used when element types disagree.
    Any,
    /// The type of type names themselves.
    Type,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
    NoneType,
    Module(Symbol),
    Arrow(Arrow),
    /// An instance of the class with this id.
    Class(i32),
    List(TypeId),
    Set(TypeId),
    Dict(TypeId, TypeId),
    Tuple(Vec<TypeId>),
    Generator(TypeId),
}

/// One attribute or method of a class, at its slot offset.
#[derive(Clone)]
pub struct ClassAttr<'a> {
    pub name: Symbol,
    pub offset: i32,
    pub stmt: Option<StmtRef<'a>>,
    pub ty: TypeId,
    pub is_method: bool,
}

/// Per-class metadata built by the analyzer.
pub struct ClassMeta<'a> {
    pub name: Symbol,
    pub def: Option<&'a ClassDef<'a>>,
    pub attributes: Vec<ClassAttr<'a>>,
    pub ctor: TypeId,
    pub namespace: String,
    pub instance_type: TypeId,
}

impl<'a> ClassMeta<'a> {
    pub fn get_attribute(&self, name: Symbol) -> Option<&ClassAttr<'a>> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Inserts or overrides an attribute, assigning the next offset for a
    /// new name.
    pub fn insert_attribute(
        &mut self,
        name: Symbol,
        stmt: Option<StmtRef<'a>>,
        ty: TypeId,
        is_method: bool,
    ) -> i32 {
        if let Some(existing) = self.attributes.iter_mut().find(|attr| attr.name == name) {
            existing.stmt = stmt;
            existing.ty = ty;
            existing.is_method = is_method;
            return existing.offset;
        }
        let offset = self.attributes.len() as i32;
        self.attributes.push(ClassAttr { name, offset, stmt, ty, is_method });
        offset
    }
}

/// The process-wide (per embedding) type table.
pub struct TypeRegistry<'a> {
    kinds: Vec<TypeKind>,
    classes: Vec<ClassMeta<'a>>,
    /// Builtin exception class ids, pre-registered.
    pub exception_class: i32,
    pub stop_iteration_class: i32,
}

impl<'a> TypeRegistry<'a> {
    pub fn new(interner: &mut Interner) -> Self {
        let kinds = vec![
            TypeKind::Unknown,
            TypeKind::Any,
            TypeKind::Type,
            TypeKind::Bool,
            TypeKind::I8,
            TypeKind::I16,
            TypeKind::I32,
            TypeKind::I64,
            TypeKind::U8,
            TypeKind::U16,
            TypeKind::U32,
            TypeKind::U64,
            TypeKind::F32,
            TypeKind::F64,
            TypeKind::Str,
            TypeKind::NoneType,
        ];
        let mut registry = TypeRegistry {
            kinds,
            classes: Vec::new(),
            exception_class: -1,
            stop_iteration_class: -1,
        };
        registry.exception_class = registry.builtin_class(interner.intern("Exception"));
        registry.stop_iteration_class = registry.builtin_class(interner.intern("StopIteration"));
        registry
    }

    fn builtin_class(&mut self, name: Symbol) -> i32 {
        let class_id = self.classes.len() as i32;
        let instance_type = self.insert(TypeKind::Class(class_id));
        self.classes.push(ClassMeta {
            name,
            def: None,
            attributes: Vec::new(),
            ctor: TypeId::UNKNOWN,
            namespace: String::new(),
            instance_type,
        });
        class_id
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        self.kinds.get(id.0 as usize).unwrap_or(&TypeKind::Unknown)
    }

    fn insert(&mut self, kind: TypeKind) -> TypeId {
        // Structural types are deduplicated; arrows are cheap enough to
        // intern fresh.
        if !matches!(kind, TypeKind::Arrow(_)) {
            if let Some(pos) = self.kinds.iter().position(|k| *k == kind) {
                return TypeId(pos as u32);
            }
        }
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    pub fn arrow(&mut self, arrow: Arrow) -> TypeId {
        self.insert(TypeKind::Arrow(arrow))
    }

    pub fn list_of(&mut self, elem: TypeId) -> TypeId {
        self.insert(TypeKind::List(elem))
    }

    pub fn set_of(&mut self, elem: TypeId) -> TypeId {
        self.insert(TypeKind::Set(elem))
    }

    pub fn dict_of(&mut self, key: TypeId, value: TypeId) -> TypeId {
        self.insert(TypeKind::Dict(key, value))
    }

    pub fn tuple_of(&mut self, elems: Vec<TypeId>) -> TypeId {
        self.insert(TypeKind::Tuple(elems))
    }

    pub fn generator_of(&mut self, elem: TypeId) -> TypeId {
        self.insert(TypeKind::Generator(elem))
    }

    pub fn module(&mut self, name: Symbol) -> TypeId {
        self.insert(TypeKind::Module(name))
    }

    pub fn as_arrow(&self, id: TypeId) -> Option<&Arrow> {
        match self.kind(id) {
            TypeKind::Arrow(arrow) => Some(arrow),
            _ => None,
        }
    }

    // --------------------------------------------------------------
    // Classes
    // --------------------------------------------------------------

    /// Registers a user class and returns its id; the instance type is
    /// created alongside.
    pub fn new_class(&mut self, def: &'a ClassDef<'a>, namespace: String) -> i32 {
        let class_id = self.classes.len() as i32;
        let instance_type = self.insert(TypeKind::Class(class_id));
        self.classes.push(ClassMeta {
            name: def.name,
            def: Some(def),
            attributes: Vec::new(),
            ctor: TypeId::UNKNOWN,
            namespace,
            instance_type,
        });
        class_id
    }

    pub fn class(&self, class_id: i32) -> Option<&ClassMeta<'a>> {
        self.classes.get(class_id as usize)
    }

    pub fn class_mut(&mut self, class_id: i32) -> Option<&mut ClassMeta<'a>> {
        self.classes.get_mut(class_id as usize)
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    // --------------------------------------------------------------
    // Queries
    // --------------------------------------------------------------

    /// The native-operator fingerprint of a primitive, if it has one.
    pub fn fingerprint(&self, id: TypeId) -> Option<&'static str> {
        match self.kind(id) {
            TypeKind::Bool => Some("bool"),
            TypeKind::I8 => Some("i8"),
            TypeKind::I16 => Some("i16"),
            TypeKind::I32 => Some("i32"),
            TypeKind::I64 => Some("i64"),
            TypeKind::U8 => Some("u8"),
            TypeKind::U16 => Some("u16"),
            TypeKind::U32 => Some("u32"),
            TypeKind::U64 => Some("u64"),
            TypeKind::F32 => Some("f32"),
            TypeKind::F64 => Some("f64"),
            TypeKind::Str => Some("str"),
            _ => None,
        }
    }

    /// Human-readable type name for diagnostics.
    pub fn name(&self, id: TypeId, interner: &Interner) -> String {
        match self.kind(id) {
            TypeKind::Unknown => "<unknown>".to_string(),
            TypeKind::Any => "Any".to_string(),
            TypeKind::Type => "type".to_string(),
            TypeKind::NoneType => "None".to_string(),
            TypeKind::Module(name) => format!("module '{}'", interner.resolve(*name)),
            TypeKind::Arrow(arrow) => {
                let args: Vec<String> = arrow.args.iter().map(|a| self.name(*a, interner)).collect();
                format!("({}) -> {}", args.join(", "), self.name(arrow.ret, interner))
            }
            TypeKind::Class(class_id) => self
                .class(*class_id)
                .map(|meta| interner.resolve(meta.name).to_string())
                .unwrap_or_else(|| "<class>".to_string()),
            TypeKind::List(elem) => format!("List[{}]", self.name(*elem, interner)),
            TypeKind::Set(elem) => format!("Set[{}]", self.name(*elem, interner)),
            TypeKind::Dict(key, value) => {
                format!("Dict[{}, {}]", self.name(*key, interner), self.name(*value, interner))
            }
            TypeKind::Tuple(elems) => {
                let parts: Vec<String> = elems.iter().map(|e| self.name(*e, interner)).collect();
                format!("Tuple[{}]", parts.join(", "))
            }
            TypeKind::Generator(elem) => format!("Generator[{}]", self.name(*elem, interner)),
            other => fingerprint_name(other).to_string(),
        }
    }

    /// Unifies two types: equal types unify to themselves, `Any` and
    /// `Unknown` act as wildcards.
    pub fn unify(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        if a == b {
            return Some(a);
        }
        if a.is_unknown() || a == TypeId::ANY {
            return Some(b);
        }
        if b.is_unknown() || b == TypeId::ANY {
            return Some(a);
        }
        None
    }

    /// The element type produced by iterating a value of this type.
    pub fn element_type(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::List(elem) | TypeKind::Set(elem) | TypeKind::Generator(elem) => *elem,
            TypeKind::Dict(key, _) => *key,
            TypeKind::Str => TypeId::STR,
            TypeKind::Tuple(elems) => {
                let mut iter = elems.iter();
                let first = match iter.next() {
                    Some(first) => *first,
                    None => return TypeId::ANY,
                };
                for elem in iter {
                    if *elem != first {
                        return TypeId::ANY;
                    }
                }
                first
            }
            _ => TypeId::ANY,
        }
    }

    /// Common element type of a sequence display: all equal yields that
    /// type, anything mixed yields the supertype marker.
    pub fn common_type(&self, elems: &[TypeId]) -> TypeId {
        let mut iter = elems.iter().filter(|id| !id.is_unknown());
        let first = match iter.next() {
            Some(first) => *first,
            None => return TypeId::ANY,
        };
        for elem in iter {
            if *elem != first {
                return TypeId::ANY;
            }
        }
        first
    }

    /// Detects a composite type reaching back to itself. Ids reference
    /// earlier ids only, so this holds vacuously unless a registry bug
    /// introduced one; callers check before mutating a node's type.
    pub fn has_cycle(&self, root: TypeId) -> bool {
        fn walk(registry: &TypeRegistry<'_>, id: TypeId, stack: &mut Vec<TypeId>) -> bool {
            if stack.contains(&id) {
                return true;
            }
            stack.push(id);
            let cyclic = match registry.kind(id) {
                TypeKind::Arrow(arrow) => {
                    arrow.args.iter().any(|a| walk(registry, *a, stack)) || walk(registry, arrow.ret, stack)
                }
                TypeKind::List(e) | TypeKind::Set(e) | TypeKind::Generator(e) => walk(registry, *e, stack),
                TypeKind::Dict(k, v) => walk(registry, *k, stack) || walk(registry, *v, stack),
                TypeKind::Tuple(elems) => elems.iter().any(|e| walk(registry, *e, stack)),
                _ => false,
            };
            stack.pop();
            cyclic
        }
        let mut stack = Vec::new();
        match self.kind(root) {
            TypeKind::Arrow(arrow) => {
                stack.push(root);
                arrow.args.iter().any(|a| walk(self, *a, &mut stack)) || walk(self, arrow.ret, &mut stack)
            }
            _ => walk(self, root, &mut stack),
        }
    }
}

fn fingerprint_name(kind: &TypeKind) -> &'static str {
    match kind {
        TypeKind::Bool => "bool",
        TypeKind::I8 => "i8",
        TypeKind::I16 => "i16",
        TypeKind::I32 => "i32",
        TypeKind::I64 => "i64",
        TypeKind::U8 => "u8",
        TypeKind::U16 => "u16",
        TypeKind::U32 => "u32",
        TypeKind::U64 => "u64",
        TypeKind::F32 => "f32",
        TypeKind::F64 => "f64",
        TypeKind::Str => "str",
        _ => "<type>",
    }
}

/// Builtin primitive type names visible to annotations.
pub fn primitive_by_name(name: &str) -> Option<TypeId> {
    match name {
        "bool" => Some(TypeId::BOOL),
        "i8" => Some(TypeId::I8),
        "i16" => Some(TypeId::I16),
        "i32" | "int" => Some(TypeId::I32),
        "i64" => Some(TypeId::I64),
        "u8" => Some(TypeId::U8),
        "u16" => Some(TypeId::U16),
        "u32" => Some(TypeId::U32),
        "u64" => Some(TypeId::U64),
        "f32" => Some(TypeId::F32),
        "f64" | "float" => Some(TypeId::F64),
        "str" => Some(TypeId::STR),
        "None" => Some(TypeId::NONE),
        _ => None,
    }
}

/// Mapping used to seed the root bindings with type names.
pub fn primitive_names() -> &'static [(&'static str, TypeId)] {
    &[
        ("bool", TypeId::BOOL),
        ("i8", TypeId::I8),
        ("i16", TypeId::I16),
        ("i32", TypeId::I32),
        ("i64", TypeId::I64),
        ("u8", TypeId::U8),
        ("u16", TypeId::U16),
        ("u32", TypeId::U32),
        ("u64", TypeId::U64),
        ("f32", TypeId::F32),
        ("f64", TypeId::F64),
        ("int", TypeId::I32),
        ("float", TypeId::F64),
        ("str", TypeId::STR),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_ids_are_stable() {
        let mut interner = Interner::new();
        let registry = TypeRegistry::new(&mut interner);
        assert_eq!(*registry.kind(TypeId::I32), TypeKind::I32);
        assert_eq!(*registry.kind(TypeId::STR), TypeKind::Str);
        assert_eq!(registry.fingerprint(TypeId::I32), Some("i32"));
    }

    #[test]
    fn composite_types_deduplicate() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new(&mut interner);
        let a = registry.list_of(TypeId::I32);
        let b = registry.list_of(TypeId::I32);
        assert_eq!(a, b);
        let c = registry.list_of(TypeId::F64);
        assert_ne!(a, c);
    }

    #[test]
    fn unify_treats_any_as_wildcard() {
        let mut interner = Interner::new();
        let registry = TypeRegistry::new(&mut interner);
        assert_eq!(registry.unify(TypeId::I32, TypeId::I32), Some(TypeId::I32));
        assert_eq!(registry.unify(TypeId::ANY, TypeId::I32), Some(TypeId::I32));
        assert_eq!(registry.unify(TypeId::I32, TypeId::F64), None);
    }

    #[test]
    fn element_type_of_containers() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new(&mut interner);
        let list = registry.list_of(TypeId::I32);
        assert_eq!(registry.element_type(list), TypeId::I32);
        let dict = registry.dict_of(TypeId::STR, TypeId::I64);
        assert_eq!(registry.element_type(dict), TypeId::STR);
        assert_eq!(registry.element_type(TypeId::STR), TypeId::STR);
    }

    #[test]
    fn common_type_mixed_is_any() {
        let mut interner = Interner::new();
        let registry = TypeRegistry::new(&mut interner);
        assert_eq!(registry.common_type(&[TypeId::I32, TypeId::I32]), TypeId::I32);
        assert_eq!(registry.common_type(&[TypeId::I32, TypeId::F64]), TypeId::ANY);
        assert_eq!(registry.common_type(&[]), TypeId::ANY);
    }

    #[test]
    fn arrow_preserves_argument_parallel_arrays() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new(&mut interner);
        let x = interner.intern("x");
        let y = interner.intern("y");
        let id = registry.arrow(Arrow::new(
            vec![TypeId::I32, TypeId::I32],
            TypeId::I32,
            vec![x, y],
            vec![false, true],
        ));
        let arrow = registry.as_arrow(id).unwrap();
        assert_eq!(arrow.args.len(), arrow.arg_names.len());
        assert_eq!(arrow.required(), 1);
    }

    #[test]
    fn builtin_exception_classes_exist() {
        let mut interner = Interner::new();
        let registry = TypeRegistry::new(&mut interner);
        let exc = registry.class(registry.exception_class).unwrap();
        assert_eq!(interner.resolve(exc.name), "Exception");
        let stop = registry.class(registry.stop_iteration_class).unwrap();
        assert_eq!(interner.resolve(stop.name), "StopIteration");
    }

    #[test]
    fn fresh_types_have_no_cycles() {
        let mut interner = Interner::new();
        let mut registry = TypeRegistry::new(&mut interner);
        let list = registry.list_of(TypeId::I32);
        let arrow = registry.arrow(Arrow::new(vec![list], list, vec![Symbol::EMPTY], vec![false]));
        assert!(!registry.has_cycle(arrow));
        assert!(!registry.has_cycle(list));
    }

    #[test]
    fn annotation_names_resolve() {
        assert_eq!(primitive_by_name("i32"), Some(TypeId::I32));
        assert_eq!(primitive_by_name("int"), Some(TypeId::I32));
        assert_eq!(primitive_by_name("float"), Some(TypeId::F64));
        assert_eq!(primitive_by_name("Widget"), None);
    }
}
