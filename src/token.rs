//! Tokens, the keyword table, and the operator configuration table.
//!
//! The operator table is the single source of truth shared by the lexer
//! (which feeds its keys into the matching trie) and the parser (which
//! reads precedence and operator kinds out of it while climbing).

use std::collections::HashMap;

use crate::ast::ops::{BinaryOperator, BoolOperator, CmpOperator, UnaryOperator};
use crate::intern::Symbol;

/// Columns a tab advances.
pub const TAB_SIZE: u32 = 4;

/// A half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both operands.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Token kinds.
///
/// `Incorrect` marks input known to be wrong that we still lex so the
/// parser can recover and keep going. `Eof` is sticky: peeking past the
/// end keeps returning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Int,
    Float,
    Str,
    FString,
    Docstring,
    Comment,
    Newline,
    Indent,
    Dedent,
    Incorrect,
    Eof,

    // Keywords
    Def,
    Return,
    Yield,
    YieldFrom,
    Async,
    Import,
    From,
    As,
    If,
    Elif,
    Else,
    Try,
    Except,
    Finally,
    Match,
    Case,
    Raise,
    While,
    For,
    With,
    Class,
    Assert,
    Global,
    Nonlocal,
    Del,
    Pass,
    Break,
    Continue,
    Await,
    Lambda,
    In,

    // Operators, classified by the operator table
    Arrow,
    Walrus,
    Assign,
    AugAssign,
    BoolOp,
    BinaryOp,
    CompareOp,
    UnaryOp,

    // Punctuation whose identity is the kind
    LParen,
    RParen,
    LSquare,
    RSquare,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Star,
    DoubleStar,
}

impl TokenKind {
    /// True for kinds that can begin a statement, used by error resync.
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Def
                | TokenKind::Class
                | TokenKind::If
                | TokenKind::While
                | TokenKind::For
                | TokenKind::With
                | TokenKind::Try
                | TokenKind::Match
                | TokenKind::Return
                | TokenKind::Raise
                | TokenKind::Import
                | TokenKind::From
                | TokenKind::Pass
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Assert
                | TokenKind::Global
                | TokenKind::Nonlocal
                | TokenKind::Del
                | TokenKind::Async
        )
    }
}

/// A lexed token: kind, interned text, byte span and position.
///
/// The lexeme is [`Symbol::EMPTY`] for punctuation whose identity is the
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: Symbol,
    pub span: Span,
    pub line: u32,
    pub col: u32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: Symbol, span: Span, line: u32, col: u32) -> Self {
        Token { kind, lexeme, span, line, col }
    }

    pub fn eof(line: u32, col: u32) -> Self {
        Token::new(TokenKind::Eof, Symbol::EMPTY, Span::default(), line, col)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

/// Keyword spellings and their token kinds.
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("def", TokenKind::Def),
    ("return", TokenKind::Return),
    ("yield", TokenKind::Yield),
    ("async", TokenKind::Async),
    ("import", TokenKind::Import),
    ("from", TokenKind::From),
    ("as", TokenKind::As),
    ("if", TokenKind::If),
    ("elif", TokenKind::Elif),
    ("else", TokenKind::Else),
    ("try", TokenKind::Try),
    ("except", TokenKind::Except),
    ("finally", TokenKind::Finally),
    ("match", TokenKind::Match),
    ("case", TokenKind::Case),
    ("raise", TokenKind::Raise),
    ("while", TokenKind::While),
    ("for", TokenKind::For),
    ("with", TokenKind::With),
    ("class", TokenKind::Class),
    ("assert", TokenKind::Assert),
    ("global", TokenKind::Global),
    ("nonlocal", TokenKind::Nonlocal),
    ("del", TokenKind::Del),
    ("pass", TokenKind::Pass),
    ("break", TokenKind::Break),
    ("continue", TokenKind::Continue),
    ("await", TokenKind::Await),
    ("lambda", TokenKind::Lambda),
    ("in", TokenKind::In),
];

/// Lookup a keyword kind by spelling.
pub fn keyword_kind(word: &str) -> Option<TokenKind> {
    KEYWORDS.iter().find(|(kw, _)| *kw == word).map(|(_, kind)| *kind)
}

/// Everything the parser needs to know about one operator spelling.
#[derive(Debug, Clone, Copy)]
pub struct OpConfig {
    pub precedence: i32,
    pub left_associative: bool,
    pub kind: TokenKind,
    pub binary: Option<BinaryOperator>,
    pub unary: Option<UnaryOperator>,
    pub boolean: Option<BoolOperator>,
    pub compare: Option<CmpOperator>,
}

impl OpConfig {
    fn new(precedence: i32, left_associative: bool, kind: TokenKind) -> Self {
        OpConfig {
            precedence,
            left_associative,
            kind,
            binary: None,
            unary: None,
            boolean: None,
            compare: None,
        }
    }

    fn binary(mut self, op: BinaryOperator) -> Self {
        self.binary = Some(op);
        self
    }

    fn unary(mut self, op: UnaryOperator) -> Self {
        self.unary = Some(op);
        self
    }

    fn boolean(mut self, op: BoolOperator) -> Self {
        self.boolean = Some(op);
        self
    }

    fn compare(mut self, op: CmpOperator) -> Self {
        self.compare = Some(op);
        self
    }
}

// Precedence levels follow Python:
//   or < and < not < comparison < | < ^ < & < shifts < +- < */ < unary < **
fn build_operator_table() -> HashMap<&'static str, OpConfig> {
    use BinaryOperator as B;
    use BoolOperator as L;
    use CmpOperator as C;
    use TokenKind as T;
    use UnaryOperator as U;

    let mut map = HashMap::new();

    map.insert(":=", OpConfig::new(1, false, T::Walrus));
    map.insert("=", OpConfig::new(2, false, T::Assign));

    for spelling in ["+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "|=", "^=", "&=", "@="] {
        let inner = &spelling[..spelling.len() - 1];
        let op = match inner {
            "+" => B::Add,
            "-" => B::Sub,
            "*" => B::Mult,
            "/" => B::Div,
            "//" => B::FloorDiv,
            "%" => B::Mod,
            "**" => B::Pow,
            ">>" => B::RShift,
            "<<" => B::LShift,
            "|" => B::BitOr,
            "^" => B::BitXor,
            "&" => B::BitAnd,
            "@" => B::MatMult,
            _ => unreachable!(),
        };
        map.insert(spelling, OpConfig::new(2, false, T::AugAssign).binary(op));
    }

    map.insert("or", OpConfig::new(4, true, T::BoolOp).boolean(L::Or));
    map.insert("and", OpConfig::new(5, true, T::BoolOp).boolean(L::And));
    map.insert("not", OpConfig::new(6, true, T::UnaryOp).unary(U::Not));

    map.insert("==", OpConfig::new(7, true, T::CompareOp).compare(C::Eq));
    map.insert("!=", OpConfig::new(7, true, T::CompareOp).compare(C::NotEq));
    map.insert("<", OpConfig::new(7, true, T::CompareOp).compare(C::Lt));
    map.insert("<=", OpConfig::new(7, true, T::CompareOp).compare(C::LtE));
    map.insert(">", OpConfig::new(7, true, T::CompareOp).compare(C::Gt));
    map.insert(">=", OpConfig::new(7, true, T::CompareOp).compare(C::GtE));
    map.insert("is", OpConfig::new(7, true, T::CompareOp).compare(C::Is));
    map.insert("is not", OpConfig::new(7, true, T::CompareOp).compare(C::IsNot));
    map.insert("in", OpConfig::new(7, true, T::In).compare(C::In));
    map.insert("not in", OpConfig::new(7, true, T::CompareOp).compare(C::NotIn));

    map.insert("|", OpConfig::new(8, true, T::BinaryOp).binary(B::BitOr));
    map.insert("^", OpConfig::new(9, true, T::BinaryOp).binary(B::BitXor));
    map.insert("&", OpConfig::new(10, true, T::BinaryOp).binary(B::BitAnd));
    map.insert("<<", OpConfig::new(11, true, T::BinaryOp).binary(B::LShift));
    map.insert(">>", OpConfig::new(11, true, T::BinaryOp).binary(B::RShift));

    map.insert("+", OpConfig::new(12, true, T::BinaryOp).binary(B::Add).unary(U::UAdd));
    map.insert("-", OpConfig::new(12, true, T::BinaryOp).binary(B::Sub).unary(U::USub));

    map.insert("*", OpConfig::new(13, true, T::Star).binary(B::Mult));
    map.insert("/", OpConfig::new(13, true, T::BinaryOp).binary(B::Div));
    map.insert("//", OpConfig::new(13, true, T::BinaryOp).binary(B::FloorDiv));
    map.insert("%", OpConfig::new(13, true, T::BinaryOp).binary(B::Mod));
    map.insert("@", OpConfig::new(13, true, T::BinaryOp).binary(B::MatMult));

    map.insert("~", OpConfig::new(14, true, T::UnaryOp).unary(U::Invert));
    map.insert("**", OpConfig::new(15, false, T::DoubleStar).binary(B::Pow));

    map.insert("->", OpConfig::new(0, true, T::Arrow));
    map.insert(".", OpConfig::new(18, true, T::Dot));

    map
}

/// Trie over operator spellings; the lexer walks it byte by byte and keeps
/// the longest match.
pub struct OpTrie {
    nodes: Vec<TrieNode>,
}

#[derive(Default)]
struct TrieNode {
    children: HashMap<u8, u32>,
    terminal: bool,
}

impl OpTrie {
    fn new() -> Self {
        OpTrie { nodes: vec![TrieNode::default()] }
    }

    fn insert(&mut self, key: &str) {
        let mut state = 0usize;
        for &byte in key.as_bytes() {
            state = match self.nodes[state].children.get(&byte) {
                Some(&next) => next as usize,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[state].children.insert(byte, next as u32);
                    next
                }
            };
        }
        self.nodes[state].terminal = true;
    }

    /// Root state.
    pub fn start(&self) -> u32 {
        0
    }

    /// Advances one byte; `None` means no operator continues this way.
    pub fn step(&self, state: u32, byte: u8) -> Option<u32> {
        self.nodes[state as usize].children.get(&byte).copied()
    }

    /// True if the state spells a complete operator.
    pub fn is_terminal(&self, state: u32) -> bool {
        self.nodes[state as usize].terminal
    }
}

/// The operator configuration table plus its matching trie.
pub struct OperatorTable {
    configs: HashMap<&'static str, OpConfig>,
    trie: OpTrie,
}

impl OperatorTable {
    pub fn new() -> Self {
        let configs = build_operator_table();
        let mut trie = OpTrie::new();
        for key in configs.keys() {
            // Multi-word spellings ("is not") are merged by the parser,
            // not matched by the lexer.
            if !key.contains(' ') && !key.chars().next().unwrap().is_ascii_alphabetic() {
                trie.insert(key);
            }
        }
        Self { configs, trie }
    }

    pub fn get(&self, spelling: &str) -> Option<&OpConfig> {
        self.configs.get(spelling)
    }

    pub fn trie(&self) -> &OpTrie {
        &self.trie
    }

    /// Word operators (`and`, `or`, `not`, `is`) the lexer must classify
    /// after scanning an identifier.
    pub fn word_operator(&self, word: &str) -> Option<&OpConfig> {
        match word {
            "and" | "or" | "not" | "is" => self.configs.get(word),
            _ => None,
        }
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}
