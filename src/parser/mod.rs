//! Recursive-descent parser with Pratt-style precedence climbing.
//!
//! Parsing is single-pass: each grammar production directly builds the
//! complete node for its form. Errors never abort the parse — a failed
//! statement is recorded in the diagnostic sink, the token stream resyncs
//! at the next likely statement start, and an `Invalid` sentinel keeps the
//! tree well-formed. Expression-level failures yield `NotImplemented`
//! sentinels the same way.

mod expr;
pub mod format_spec;
mod fstring;
mod pattern;
mod stmt;

#[cfg(test)]
mod tests;

use crate::arena::Arena;
use crate::ast::{Loc, Module, Stmt, StmtKind, StmtRef};
use crate::error::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::intern::{Interner, Symbol};
use crate::lexer::TokenStream;
use crate::token::{OperatorTable, Token, TokenKind};

pub(crate) type ParseResult<T> = Result<T, Diagnostic>;

/// What bracket construct the parser is inside, which changes how `:` and
/// `for` read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingContext {
    Expression,
    Slice,
    Comprehension,
}

pub struct Parser<'a, 'i, L: TokenStream> {
    pub(crate) lexer: L,
    pub(crate) interner: &'i mut Interner,
    pub(crate) arena: &'a Arena,
    pub(crate) errors: DiagnosticSink,
    pub(crate) operators: OperatorTable,
    pub(crate) file: String,

    /// Bracket-construct stack.
    pub(crate) contexts: Vec<ParsingContext>,
    /// `async def` nesting, consulted by `await` and async comprehensions.
    pub(crate) async_stack: Vec<bool>,

    /// Location of the most recently consumed token, for end positions.
    pub(crate) last: Loc,

    started: bool,
}

impl<'a, 'i, L: TokenStream> Parser<'a, 'i, L> {
    pub fn new(lexer: L, interner: &'i mut Interner, arena: &'a Arena) -> Self {
        let file = lexer.file_name();
        Parser {
            lexer,
            interner,
            arena,
            errors: DiagnosticSink::new(),
            operators: OperatorTable::new(),
            file,
            contexts: Vec::new(),
            async_stack: Vec::new(),
            last: Loc::default(),
            started: false,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.has_errors()
    }

    pub fn errors(&self) -> &DiagnosticSink {
        &self.errors
    }

    pub fn take_errors(&mut self) -> DiagnosticSink {
        std::mem::take(&mut self.errors)
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    pub(crate) fn tok(&mut self) -> Token {
        if !self.started {
            self.started = true;
            return self.lexer.next_token(self.interner);
        }
        self.lexer.token()
    }

    pub(crate) fn advance(&mut self) -> Token {
        if self.started {
            self.last = Loc::from_token(&self.lexer.token());
        }
        self.started = true;
        self.lexer.next_token(self.interner)
    }

    pub(crate) fn peek(&mut self) -> Token {
        if !self.started {
            self.tok();
        }
        self.lexer.peek_token(self.interner)
    }

    pub(crate) fn text(&self, token: &Token) -> &str {
        self.interner.resolve(token.lexeme)
    }

    pub(crate) fn at(&mut self, kind: TokenKind) -> bool {
        self.tok().kind == kind
    }

    /// True if the current token is the given operator spelling.
    pub(crate) fn at_op(&mut self, kind: TokenKind, spelling: &str) -> bool {
        let token = self.tok();
        token.kind == kind && self.text(&token) == spelling
    }

    /// Consumes the current token if it matches.
    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expected(&mut self, what: &str) -> Diagnostic {
        let token = self.tok();
        let found = match token.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            _ => {
                let text = self.text(&token);
                if text.is_empty() {
                    format!("{:?}", token.kind)
                } else {
                    format!("'{}'", text)
                }
            }
        };
        Diagnostic::new(
            DiagnosticKind::ParseError { expected: what.to_string(), found },
            Loc::from_token(&token),
            self.file.clone(),
        )
    }

    /// Consumes a token of the given kind or produces a `ParseError`.
    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        let token = self.tok();
        if token.kind == kind {
            self.advance();
            Ok(token)
        } else {
            Err(self.expected(what))
        }
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.errors.push(diagnostic);
    }

    pub(crate) fn skip_newlines(&mut self) {
        loop {
            match self.tok().kind {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Comment => {
                    self.advance();
                }
                _ => break,
            }
        }
    }

    /// Advances to the next likely statement start after an error.
    pub(crate) fn resync(&mut self) {
        loop {
            let token = self.tok();
            match token.kind {
                TokenKind::Eof | TokenKind::Dedent => break,
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                kind if kind.starts_statement() => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn intern(&mut self, text: &str) -> Symbol {
        self.interner.intern(text)
    }

    pub(crate) fn loc(&mut self) -> Loc {
        Loc::from_token(&self.tok())
    }

    // ------------------------------------------------------------------
    // Module entry
    // ------------------------------------------------------------------

    /// Parses a whole module: docstring, then statements until eof.
    pub fn parse_module(&mut self, name: &str) -> &'a Module<'a> {
        let name = self.intern(name);
        let filename = self.interner.intern(&self.file.clone());

        self.skip_newlines();

        let mut docstring = None;
        if self.at(TokenKind::Docstring) {
            let token = self.tok();
            docstring = Some(token.lexeme);
            self.advance();
            self.skip_newlines();
        }

        let mut body: Vec<StmtRef<'a>> = Vec::new();
        while !self.at(TokenKind::Eof) {
            // Stray block tokens after error recovery are dropped.
            if self.at(TokenKind::Indent) || self.at(TokenKind::Dedent) {
                self.advance();
                continue;
            }
            let stmt = self.parse_statement_or_recover();
            body.push(stmt);
            self.attach_comment(stmt);
            self.skip_newlines();
        }

        self.arena.alloc(Module {
            name,
            filename,
            body: self.arena.alloc_slice(body),
            docstring,
        })
    }

    /// Parses one statement, converting a failure into an `Invalid`
    /// sentinel after resyncing.
    pub(crate) fn parse_statement_or_recover(&mut self) -> StmtRef<'a> {
        let loc = self.loc();
        match self.parse_statement() {
            Ok(stmt) => stmt,
            Err(diagnostic) => {
                self.report(diagnostic);
                self.resync();
                self.arena.alloc(Stmt::new(loc, StmtKind::Invalid))
            }
        }
    }

    /// Attaches a trailing same-line comment to the statement.
    pub(crate) fn attach_comment(&mut self, stmt: StmtRef<'a>) {
        let token = self.tok();
        if token.kind == TokenKind::Comment && token.line == stmt.loc.end_lineno {
            stmt.comment.set(Some(token.lexeme));
            self.advance();
        }
    }
}
