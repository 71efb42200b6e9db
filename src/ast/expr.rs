//! Expression nodes.

use std::cell::Cell;

use super::ops::{BinaryOperator, BoolOperator, CmpOperator, ExprContext, UnaryOperator};
use super::{ConstantValue, Loc};
use crate::intern::Symbol;
use crate::sema::types::TypeId;
use crate::value::{NativeBinaryFn, NativeUnaryFn};

pub type ExprRef<'a> = &'a Expr<'a>;

/// An expression node: location, the type inferred by sema, and the
/// variant payload.
pub struct Expr<'a> {
    pub loc: Loc,
    pub ty: Cell<TypeId>,
    pub kind: ExprKind<'a>,
}

impl<'a> Expr<'a> {
    pub fn new(loc: Loc, kind: ExprKind<'a>) -> Self {
        Expr { loc, ty: Cell::new(TypeId::UNKNOWN), kind }
    }
}

/// One formal parameter.
pub struct Arg<'a> {
    pub name: Symbol,
    pub annotation: Option<ExprRef<'a>>,
    pub loc: Loc,
}

/// The full formal parameter list of a function or lambda.
///
/// `defaults` aligns with the tail of `posonlyargs + args`; `kw_defaults`
/// aligns with `kwonlyargs` (entry per argument, `None` when required).
#[derive(Clone, Copy)]
pub struct Arguments<'a> {
    pub posonlyargs: &'a [Arg<'a>],
    pub args: &'a [Arg<'a>],
    pub vararg: Option<&'a Arg<'a>>,
    pub kwonlyargs: &'a [Arg<'a>],
    pub kw_defaults: &'a [Option<ExprRef<'a>>],
    pub kwarg: Option<&'a Arg<'a>>,
    pub defaults: &'a [ExprRef<'a>],
}

impl<'a> Arguments<'a> {
    pub const EMPTY: Arguments<'static> = Arguments {
        posonlyargs: &[],
        args: &[],
        vararg: None,
        kwonlyargs: &[],
        kw_defaults: &[],
        kwarg: None,
        defaults: &[],
    };

    /// Number of named (non-variadic) parameters.
    pub fn len(&self) -> usize {
        self.posonlyargs.len() + self.args.len() + self.kwonlyargs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.vararg.is_none() && self.kwarg.is_none()
    }

    /// Positional then keyword-only parameters, in declaration order.
    pub fn named(&self) -> impl Iterator<Item = &Arg<'a>> {
        self.posonlyargs.iter().chain(self.args.iter()).chain(self.kwonlyargs.iter())
    }
}

/// One keyword argument at a call site; `arg` is `None` for `**expr`.
pub struct Keyword<'a> {
    pub arg: Option<Symbol>,
    pub value: ExprRef<'a>,
}

/// One `for target in iter [if cond]*` clause of a comprehension.
pub struct Comprehension<'a> {
    pub target: ExprRef<'a>,
    pub iter: ExprRef<'a>,
    pub ifs: &'a [ExprRef<'a>],
    pub is_async: bool,
}

pub enum ExprKind<'a> {
    /// `a and b and c` — one node per operator kind, n values.
    BoolOp {
        op: BoolOperator,
        values: &'a [ExprRef<'a>],
        native: Cell<Option<NativeBinaryFn>>,
    },

    /// `target := value`
    NamedExpr { target: ExprRef<'a>, value: ExprRef<'a> },

    BinOp {
        left: ExprRef<'a>,
        op: BinaryOperator,
        right: ExprRef<'a>,
        /// Native implementation resolved by sema from the operator table.
        native: Cell<Option<NativeBinaryFn>>,
        /// Magic method resolved by sema when no native operator applies.
        method: Cell<Option<Symbol>>,
    },

    UnaryOp {
        op: UnaryOperator,
        operand: ExprRef<'a>,
        native: Cell<Option<NativeUnaryFn>>,
        method: Cell<Option<Symbol>>,
    },

    Lambda { args: &'a Arguments<'a>, body: ExprRef<'a> },

    /// `body if test else orelse`, also written `if test: body else orelse`.
    IfExp { test: ExprRef<'a>, body: ExprRef<'a>, orelse: ExprRef<'a> },

    /// `{k: v, ...}` — keys and values are parallel arrays.
    Dict { keys: &'a [ExprRef<'a>], values: &'a [ExprRef<'a>] },

    Set { elts: &'a [ExprRef<'a>] },

    ListComp { elt: ExprRef<'a>, generators: &'a [Comprehension<'a>] },
    SetComp { elt: ExprRef<'a>, generators: &'a [Comprehension<'a>] },
    DictComp {
        key: ExprRef<'a>,
        value: ExprRef<'a>,
        generators: &'a [Comprehension<'a>],
    },
    GeneratorExp { elt: ExprRef<'a>, generators: &'a [Comprehension<'a>] },

    Await { value: ExprRef<'a> },
    Yield { value: Option<ExprRef<'a>> },
    YieldFrom { value: ExprRef<'a> },

    /// Chained comparison: `left ops[0] comparators[0] ops[1] ...`.
    /// `ops.len() == comparators.len()`; `natives` aligns with `ops`.
    Compare {
        left: ExprRef<'a>,
        ops: &'a [CmpOperator],
        comparators: &'a [ExprRef<'a>],
        natives: &'a [Cell<Option<NativeBinaryFn>>],
        methods: &'a [Cell<Option<Symbol>>],
    },

    Call {
        func: ExprRef<'a>,
        args: &'a [ExprRef<'a>],
        keywords: &'a [Keyword<'a>],
    },

    /// One `{expr[:spec]}` interpolation site inside an f-string.
    FormattedValue {
        value: ExprRef<'a>,
        conversion: Option<char>,
        format_spec: Option<Symbol>,
    },

    /// An f-string: literal fragments and formatted values, in order.
    JoinedStr { values: &'a [ExprRef<'a>] },

    Constant { value: ConstantValue, kind: Option<Symbol> },

    Attribute {
        value: ExprRef<'a>,
        attr: Symbol,
        ctx: Cell<ExprContext>,
        /// Attribute slot offset in the owning class, resolved by sema.
        offset: Cell<i32>,
    },

    Subscript { value: ExprRef<'a>, slice: ExprRef<'a>, ctx: Cell<ExprContext> },

    Starred { value: ExprRef<'a>, ctx: Cell<ExprContext> },

    Name {
        id: Symbol,
        ctx: Cell<ExprContext>,
        /// Binding index after sema; -1 means unresolved.
        varid: Cell<i32>,
    },

    List { elts: &'a [ExprRef<'a>], ctx: Cell<ExprContext> },
    Tuple { elts: &'a [ExprRef<'a>], ctx: Cell<ExprContext> },

    /// Can appear only as the index of a `Subscript`.
    Slice {
        lower: Option<ExprRef<'a>>,
        upper: Option<ExprRef<'a>>,
        step: Option<ExprRef<'a>>,
    },

    /// Recovery sentinel emitted when expression parsing fails.
    NotImplemented,
}

impl<'a> Expr<'a> {
    /// The expression context, for targets and deletions.
    pub fn ctx(&self) -> ExprContext {
        match &self.kind {
            ExprKind::Attribute { ctx, .. }
            | ExprKind::Subscript { ctx, .. }
            | ExprKind::Starred { ctx, .. }
            | ExprKind::Name { ctx, .. }
            | ExprKind::List { ctx, .. }
            | ExprKind::Tuple { ctx, .. } => ctx.get(),
            _ => ExprContext::Load,
        }
    }

    /// Re-tags this expression (and its element sub-targets) as `Store`
    /// or `Del`. Used after the parser discovers the node is an
    /// assignment target.
    pub fn set_ctx(&self, new: ExprContext) {
        match &self.kind {
            ExprKind::Attribute { ctx, .. }
            | ExprKind::Subscript { ctx, .. }
            | ExprKind::Name { ctx, .. } => ctx.set(new),
            ExprKind::Starred { ctx, value } => {
                ctx.set(new);
                value.set_ctx(new);
            }
            ExprKind::List { ctx, elts } | ExprKind::Tuple { ctx, elts } => {
                ctx.set(new);
                for elt in *elts {
                    elt.set_ctx(new);
                }
            }
            _ => {}
        }
    }
}
