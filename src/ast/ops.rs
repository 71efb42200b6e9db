//! Operator kinds shared by the lexer, parser, sema and evaluator.
//!
//! Each operator knows its surface spelling, the name used in native
//! operator fingerprints (`"Add-i32-i32"`), and the magic-method pair it
//! maps to on user classes (`__add__` / `__radd__`).

/// Binary arithmetic and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl BinaryOperator {
    /// Surface spelling, as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mult => "*",
            BinaryOperator::MatMult => "@",
            BinaryOperator::Div => "/",
            BinaryOperator::Mod => "%",
            BinaryOperator::Pow => "**",
            BinaryOperator::LShift => "<<",
            BinaryOperator::RShift => ">>",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::FloorDiv => "//",
        }
    }

    /// Name used in native operator signature keys.
    pub fn fingerprint(self) -> &'static str {
        match self {
            BinaryOperator::Add => "Add",
            BinaryOperator::Sub => "Sub",
            BinaryOperator::Mult => "Mult",
            BinaryOperator::MatMult => "MatMult",
            BinaryOperator::Div => "Div",
            BinaryOperator::Mod => "Mod",
            BinaryOperator::Pow => "Pow",
            BinaryOperator::LShift => "LShift",
            BinaryOperator::RShift => "RShift",
            BinaryOperator::BitOr => "BitOr",
            BinaryOperator::BitXor => "BitXor",
            BinaryOperator::BitAnd => "BitAnd",
            BinaryOperator::FloorDiv => "FloorDiv",
        }
    }

    /// Magic method implementing the operator on a user class.
    pub fn magic_name(self, reverse: bool) -> &'static str {
        match (self, reverse) {
            (BinaryOperator::Add, false) => "__add__",
            (BinaryOperator::Add, true) => "__radd__",
            (BinaryOperator::Sub, false) => "__sub__",
            (BinaryOperator::Sub, true) => "__rsub__",
            (BinaryOperator::Mult, false) => "__mul__",
            (BinaryOperator::Mult, true) => "__rmul__",
            (BinaryOperator::MatMult, false) => "__matmul__",
            (BinaryOperator::MatMult, true) => "__rmatmul__",
            (BinaryOperator::Div, false) => "__truediv__",
            (BinaryOperator::Div, true) => "__rtruediv__",
            (BinaryOperator::Mod, false) => "__mod__",
            (BinaryOperator::Mod, true) => "__rmod__",
            (BinaryOperator::Pow, false) => "__pow__",
            (BinaryOperator::Pow, true) => "__rpow__",
            (BinaryOperator::LShift, false) => "__lshift__",
            (BinaryOperator::LShift, true) => "__rlshift__",
            (BinaryOperator::RShift, false) => "__rshift__",
            (BinaryOperator::RShift, true) => "__rrshift__",
            (BinaryOperator::BitOr, false) => "__or__",
            (BinaryOperator::BitOr, true) => "__ror__",
            (BinaryOperator::BitXor, false) => "__xor__",
            (BinaryOperator::BitXor, true) => "__rxor__",
            (BinaryOperator::BitAnd, false) => "__and__",
            (BinaryOperator::BitAnd, true) => "__rand__",
            (BinaryOperator::FloorDiv, false) => "__floordiv__",
            (BinaryOperator::FloorDiv, true) => "__rfloordiv__",
        }
    }
}

/// Short-circuit boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOperator {
    And,
    Or,
}

impl BoolOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            BoolOperator::And => "and",
            BoolOperator::Or => "or",
        }
    }

    pub fn fingerprint(self) -> &'static str {
        match self {
            BoolOperator::And => "And",
            BoolOperator::Or => "Or",
        }
    }

    pub fn magic_name(self, reverse: bool) -> &'static str {
        match (self, reverse) {
            (BoolOperator::And, false) => "__and__",
            (BoolOperator::And, true) => "__rand__",
            (BoolOperator::Or, false) => "__or__",
            (BoolOperator::Or, true) => "__ror__",
        }
    }
}

/// Prefix unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Invert,
    Not,
    UAdd,
    USub,
}

impl UnaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOperator::Invert => "~",
            UnaryOperator::Not => "not",
            UnaryOperator::UAdd => "+",
            UnaryOperator::USub => "-",
        }
    }

    pub fn fingerprint(self) -> &'static str {
        match self {
            UnaryOperator::Invert => "Invert",
            UnaryOperator::Not => "Not",
            UnaryOperator::UAdd => "UAdd",
            UnaryOperator::USub => "USub",
        }
    }

    pub fn magic_name(self) -> &'static str {
        match self {
            UnaryOperator::Invert => "__invert__",
            UnaryOperator::Not => "__not__",
            UnaryOperator::UAdd => "__pos__",
            UnaryOperator::USub => "__neg__",
        }
    }
}

/// Comparison operators, chainable inside one `Compare` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOperator::Eq => "==",
            CmpOperator::NotEq => "!=",
            CmpOperator::Lt => "<",
            CmpOperator::LtE => "<=",
            CmpOperator::Gt => ">",
            CmpOperator::GtE => ">=",
            CmpOperator::Is => "is",
            CmpOperator::IsNot => "is not",
            CmpOperator::In => "in",
            CmpOperator::NotIn => "not in",
        }
    }

    pub fn fingerprint(self) -> &'static str {
        match self {
            CmpOperator::Eq => "Eq",
            CmpOperator::NotEq => "NotEq",
            CmpOperator::Lt => "Lt",
            CmpOperator::LtE => "LtE",
            CmpOperator::Gt => "Gt",
            CmpOperator::GtE => "GtE",
            CmpOperator::Is => "Is",
            CmpOperator::IsNot => "IsNot",
            CmpOperator::In => "In",
            CmpOperator::NotIn => "NotIn",
        }
    }

    /// Magic method pair; `Is`/`IsNot` have none and resolve natively.
    pub fn magic_name(self, reverse: bool) -> Option<&'static str> {
        match (self, reverse) {
            (CmpOperator::Eq, false) => Some("__eq__"),
            (CmpOperator::Eq, true) => Some("__eq__"),
            (CmpOperator::NotEq, false) => Some("__ne__"),
            (CmpOperator::NotEq, true) => Some("__ne__"),
            (CmpOperator::Lt, false) => Some("__lt__"),
            (CmpOperator::Lt, true) => Some("__gt__"),
            (CmpOperator::LtE, false) => Some("__le__"),
            (CmpOperator::LtE, true) => Some("__ge__"),
            (CmpOperator::Gt, false) => Some("__gt__"),
            (CmpOperator::Gt, true) => Some("__lt__"),
            (CmpOperator::GtE, false) => Some("__ge__"),
            (CmpOperator::GtE, true) => Some("__le__"),
            (CmpOperator::In, _) => Some("__contains__"),
            (CmpOperator::NotIn, _) => Some("__contains__"),
            (CmpOperator::Is, _) | (CmpOperator::IsNot, _) => None,
        }
    }
}

/// How an expression is used: read, written, or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExprContext {
    #[default]
    Load,
    Store,
    Del,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_surface_spelling_round_trips() {
        assert_eq!(BinaryOperator::FloorDiv.as_str(), "//");
        assert_eq!(BinaryOperator::Pow.as_str(), "**");
    }

    #[test]
    fn add_magic_pair() {
        assert_eq!(BinaryOperator::Add.magic_name(false), "__add__");
        assert_eq!(BinaryOperator::Add.magic_name(true), "__radd__");
    }

    #[test]
    fn comparison_reverse_swaps_direction() {
        assert_eq!(CmpOperator::Lt.magic_name(false), Some("__lt__"));
        assert_eq!(CmpOperator::Lt.magic_name(true), Some("__gt__"));
    }

    #[test]
    fn identity_has_no_magic_method() {
        assert_eq!(CmpOperator::Is.magic_name(false), None);
        assert_eq!(CmpOperator::IsNot.magic_name(true), None);
    }

    #[test]
    fn fingerprints_match_table_keys() {
        assert_eq!(BinaryOperator::Add.fingerprint(), "Add");
        assert_eq!(UnaryOperator::USub.fingerprint(), "USub");
        assert_eq!(BoolOperator::And.fingerprint(), "And");
    }
}
