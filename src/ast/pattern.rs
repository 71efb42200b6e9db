//! Match patterns.

use super::expr::ExprRef;
use super::stmt::StmtRef;
use super::{ConstantValue, Loc};
use crate::intern::Symbol;

pub type PatRef<'a> = &'a Pat<'a>;

pub struct Pat<'a> {
    pub loc: Loc,
    pub kind: PatKind<'a>,
}

impl<'a> Pat<'a> {
    pub fn new(loc: Loc, kind: PatKind<'a>) -> Self {
        Pat { loc, kind }
    }
}

/// One `case pattern [if guard]:` branch.
pub struct MatchCase<'a> {
    pub pattern: PatRef<'a>,
    pub guard: Option<ExprRef<'a>>,
    pub body: &'a [StmtRef<'a>],
}

pub enum PatKind<'a> {
    /// A literal value to compare against: `case 1:` / `case "x":`.
    MatchValue { value: ExprRef<'a> },

    /// `case None:` / `case True:` / `case False:` — matched by identity.
    MatchSingleton { value: ConstantValue },

    /// `case [p, q, *rest]:`
    MatchSequence { patterns: &'a [PatRef<'a>] },

    /// `case {"k": p, **rest}:` — extra keys are captured by `rest`.
    MatchMapping {
        keys: &'a [ExprRef<'a>],
        patterns: &'a [PatRef<'a>],
        rest: Option<Symbol>,
    },

    /// `case Cls(p, kw=q):`
    MatchClass {
        cls: ExprRef<'a>,
        patterns: &'a [PatRef<'a>],
        kwd_attrs: &'a [Symbol],
        kwd_patterns: &'a [PatRef<'a>],
    },

    /// `case [*name]:` — `None` for the anonymous `*_`.
    MatchStar { name: Option<Symbol> },

    /// `case p as name:`; a bare capture `case name:` has no inner
    /// pattern, and the wildcard `case _:` has neither.
    MatchAs { pattern: Option<PatRef<'a>>, name: Option<Symbol> },

    /// `case p | q:`
    MatchOr { patterns: &'a [PatRef<'a>] },
}
