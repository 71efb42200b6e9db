//! UTF-8 character stream to token stream.
//!
//! The lexer is lazy: tokens are produced on demand through
//! [`TokenStream`], which is what the parser consumes. Block structure is
//! synthesized here — newlines emit `Newline`, and indentation changes at
//! the start of the next visible line emit `Indent` / `Dedent` so the
//! parser stays token-driven. Operators are matched against the operator
//! trie, longest spelling wins.
//!
//! Identifiers deliberately admit `?`, `!` and `-` after the first
//! character, so `empty?` and `set-value` are single names; binary minus
//! needs surrounding whitespace unless the left operand ends in a digit.
//!
//! [`ReplayLexer`] feeds back a pre-extracted token vector, used by the
//! fuzz harness and by tests that want to probe the parser with a
//! hand-built stream.

use std::collections::VecDeque;

use crate::buffer::CharStream;
use crate::intern::{Interner, Symbol};
use crate::token::{keyword_kind, OperatorTable, Span, Token, TokenKind};

/// Uniform token supply: a live lexer or a replay buffer.
pub trait TokenStream {
    /// Advances and returns the new current token.
    fn next_token(&mut self, interner: &mut Interner) -> Token;

    /// Returns the upcoming token without advancing.
    fn peek_token(&mut self, interner: &mut Interner) -> Token;

    /// The current token.
    fn token(&self) -> Token;

    fn file_name(&self) -> String;

    /// Extracts the remaining tokens, ending with `Eof`.
    fn extract(&mut self, interner: &mut Interner) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(interner);
            let done = tok.is_eof();
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }
}

/// The lexer proper.
pub struct Lexer<S: CharStream> {
    reader: S,
    operators: OperatorTable,
    queue: VecDeque<Token>,
    current: Token,
    indent_stack: Vec<u32>,
    at_line_start: bool,
    last_was_newline: bool,
    interactive: bool,
    eof_reached: bool,
}

impl<S: CharStream> Lexer<S> {
    pub fn new(reader: S) -> Self {
        Lexer {
            reader,
            operators: OperatorTable::new(),
            queue: VecDeque::new(),
            current: Token::eof(0, 0),
            indent_stack: vec![0],
            at_line_start: true,
            last_was_newline: false,
            interactive: false,
            eof_reached: false,
        }
    }

    /// Interactive mode: a second consecutive newline with a pending
    /// indent synthesizes a dedent so the REPL can end a block.
    pub fn interactive(reader: S) -> Self {
        let mut lexer = Self::new(reader);
        lexer.interactive = true;
        lexer
    }

    pub fn reader_mut(&mut self) -> &mut S {
        &mut self.reader
    }

    fn push(&mut self, token: Token) {
        self.queue.push_back(token);
    }

    fn make(&self, kind: TokenKind, lexeme: Symbol, start: usize, line: u32, col: u32) -> Token {
        Token::new(kind, lexeme, Span::new(start, self.reader.position()), line, col)
    }

    fn skip_horizontal(&mut self) {
        while matches!(self.reader.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.reader.consume();
        }
    }

    /// Queues at least one token.
    fn refill(&mut self, interner: &mut Interner) {
        if self.eof_reached {
            self.push(Token::eof(self.reader.line(), self.reader.col()));
            return;
        }

        self.skip_horizontal();

        let line = self.reader.line();
        let col = self.reader.col();
        let start = self.reader.position();

        let c = match self.reader.peek() {
            None => {
                // Close every open block before the final eof.
                while self.indent_stack.len() > 1 {
                    self.indent_stack.pop();
                    self.push(Token::new(TokenKind::Dedent, Symbol::EMPTY, Span::new(start, start), line, col));
                }
                self.eof_reached = true;
                self.push(Token::eof(line, col));
                return;
            }
            Some(c) => c,
        };

        if c == '\n' {
            self.reader.consume();
            self.push(self.make(TokenKind::Newline, Symbol::EMPTY, start, line, col));
            if self.interactive && self.last_was_newline && self.indent_stack.len() > 1 {
                self.indent_stack.pop();
                self.push(self.make(TokenKind::Dedent, Symbol::EMPTY, start, line, col));
            }
            self.last_was_newline = true;
            self.at_line_start = true;
            return;
        }
        self.last_was_newline = false;

        if self.at_line_start {
            self.at_line_start = false;
            let indent = self.reader.indent();
            let top = *self.indent_stack.last().unwrap();
            if indent > top {
                self.indent_stack.push(indent);
                self.push(self.make(TokenKind::Indent, Symbol::EMPTY, start, line, col));
            } else if indent < top {
                while self.indent_stack.len() > 1 && *self.indent_stack.last().unwrap() > indent {
                    self.indent_stack.pop();
                    self.push(self.make(TokenKind::Dedent, Symbol::EMPTY, start, line, col));
                }
            }
        }

        let token = self.scan(c, interner, start, line, col);
        self.push(token);
    }

    fn scan(&mut self, c: char, interner: &mut Interner, start: usize, line: u32, col: u32) -> Token {
        if c.is_ascii_alphabetic() || c == '_' {
            return self.scan_word(interner, start, line, col);
        }
        if c.is_ascii_digit() {
            return self.scan_number(interner, start, line, col);
        }
        if c == '"' || c == '\'' {
            return self.scan_string(c, interner, start, line, col, false);
        }
        if c == '#' {
            return self.scan_comment(interner, start, line, col);
        }
        self.scan_operator(c, interner, start, line, col)
    }

    fn is_identifier_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '?' || c == '!' || c == '-'
    }

    fn scan_word(&mut self, interner: &mut Interner, start: usize, line: u32, col: u32) -> Token {
        let mut word = String::new();
        while let Some(c) = self.reader.peek() {
            if Self::is_identifier_char(c) {
                word.push(c);
                self.reader.consume();
            } else {
                break;
            }
        }

        // f-string: an `f` prefix directly attached to a quote.
        if (word == "f" || word == "F") && matches!(self.reader.peek(), Some('"') | Some('\'')) {
            let quote = self.reader.peek().unwrap();
            return self.scan_string(quote, interner, start, line, col, true);
        }

        if let Some(kind) = keyword_kind(&word) {
            let lexeme = interner.intern(&word);
            return self.make(kind, lexeme, start, line, col);
        }
        if let Some(config) = self.operators.word_operator(&word) {
            let kind = config.kind;
            let lexeme = interner.intern(&word);
            return self.make(kind, lexeme, start, line, col);
        }

        let lexeme = interner.intern(&word);
        self.make(TokenKind::Identifier, lexeme, start, line, col)
    }

    fn scan_number(&mut self, interner: &mut Interner, start: usize, line: u32, col: u32) -> Token {
        let mut text = String::new();
        let mut kind = TokenKind::Int;

        let first = self.reader.peek().unwrap();
        text.push(first);
        self.reader.consume();

        // Base prefix: 0x / 0o / 0b
        if first == '0' {
            if let Some(prefix) = self.reader.peek() {
                if matches!(prefix, 'x' | 'X' | 'o' | 'O' | 'b' | 'B') {
                    text.push(prefix);
                    self.reader.consume();
                    while let Some(c) = self.reader.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            text.push(c);
                            self.reader.consume();
                        } else {
                            break;
                        }
                    }
                    let lexeme = interner.intern(&text);
                    return self.make(TokenKind::Int, lexeme, start, line, col);
                }
            }
        }

        while let Some(c) = self.reader.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.reader.consume();
            } else {
                break;
            }
        }

        if self.reader.peek() == Some('.') {
            kind = TokenKind::Float;
            text.push('.');
            self.reader.consume();
            while let Some(c) = self.reader.peek() {
                if c.is_ascii_digit() || c == '_' {
                    text.push(c);
                    self.reader.consume();
                } else {
                    break;
                }
            }
        }

        // Scientific notation, consumed greedily.
        if matches!(self.reader.peek(), Some('e') | Some('E')) {
            kind = TokenKind::Float;
            text.push('e');
            self.reader.consume();
            if matches!(self.reader.peek(), Some('+') | Some('-')) {
                text.push(self.reader.peek().unwrap());
                self.reader.consume();
            }
            let mut digits = 0;
            while let Some(c) = self.reader.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.reader.consume();
                    digits += 1;
                } else {
                    break;
                }
            }
            if digits == 0 {
                let lexeme = interner.intern(&text);
                return self.make(TokenKind::Incorrect, lexeme, start, line, col);
            }
        }

        let lexeme = interner.intern(&text);
        self.make(kind, lexeme, start, line, col)
    }

    fn scan_string(
        &mut self,
        quote: char,
        interner: &mut Interner,
        start: usize,
        line: u32,
        col: u32,
        fstring: bool,
    ) -> Token {
        self.reader.consume(); // opening quote
        let mut text = String::new();

        // Detect triple quotes with single-character lookahead: an
        // immediately repeated quote is either the empty string or the
        // start of a triple-quoted literal.
        let mut triple = false;
        if self.reader.peek() == Some(quote) {
            self.reader.consume();
            if self.reader.peek() == Some(quote) {
                self.reader.consume();
                triple = true;
            } else {
                let lexeme = interner.intern("");
                let kind = if fstring { TokenKind::FString } else { TokenKind::Str };
                return self.make(kind, lexeme, start, line, col);
            }
        }

        let mut closing = 0;
        loop {
            let c = match self.reader.peek() {
                None => {
                    let lexeme = interner.intern(&text);
                    return self.make(TokenKind::Incorrect, lexeme, start, line, col);
                }
                Some(c) => c,
            };

            if c == quote {
                self.reader.consume();
                if !triple {
                    break;
                }
                closing += 1;
                if closing == 3 {
                    break;
                }
                continue;
            }
            // Quotes seen so far were literal content.
            for _ in 0..closing {
                text.push(quote);
            }
            closing = 0;

            if c == '\\' && !triple {
                self.reader.consume();
                let escaped = self.reader.peek().unwrap_or('\\');
                self.reader.consume();
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '\'' => '\'',
                    '"' => '"',
                    other => other,
                });
                continue;
            }

            text.push(c);
            self.reader.consume();
        }

        let kind = if fstring {
            TokenKind::FString
        } else if triple {
            TokenKind::Docstring
        } else {
            TokenKind::Str
        };
        let lexeme = interner.intern(&text);
        self.make(kind, lexeme, start, line, col)
    }

    fn scan_comment(&mut self, interner: &mut Interner, start: usize, line: u32, col: u32) -> Token {
        let mut text = String::new();
        while let Some(c) = self.reader.peek() {
            if c == '\n' {
                break;
            }
            text.push(c);
            self.reader.consume();
        }
        let lexeme = interner.intern(&text);
        self.make(TokenKind::Comment, lexeme, start, line, col)
    }

    fn scan_operator(&mut self, c: char, interner: &mut Interner, start: usize, line: u32, col: u32) -> Token {
        // Single-character punctuation not in the operator trie.
        let punct = |kind| {
            let span = Span::new(start, start + c.len_utf8());
            Token::new(kind, Symbol::EMPTY, span, line, col)
        };
        match c {
            '(' => {
                self.reader.consume();
                return punct(TokenKind::LParen);
            }
            ')' => {
                self.reader.consume();
                return punct(TokenKind::RParen);
            }
            '[' => {
                self.reader.consume();
                return punct(TokenKind::LSquare);
            }
            ']' => {
                self.reader.consume();
                return punct(TokenKind::RSquare);
            }
            '{' => {
                self.reader.consume();
                return punct(TokenKind::LBrace);
            }
            '}' => {
                self.reader.consume();
                return punct(TokenKind::RBrace);
            }
            ',' => {
                self.reader.consume();
                return punct(TokenKind::Comma);
            }
            ';' => {
                self.reader.consume();
                return punct(TokenKind::Semicolon);
            }
            _ => {}
        }

        // Walk the trie, remembering the longest complete operator.
        let trie = self.operators.trie();
        let mut state = trie.start();
        let mut spelled = String::new();
        let mut matched: Option<String> = None;

        while let Some(c) = self.reader.peek() {
            if !c.is_ascii() {
                break;
            }
            match trie.step(state, c as u8) {
                Some(next) => {
                    spelled.push(c);
                    self.reader.consume();
                    state = next;
                    if trie.is_terminal(state) {
                        matched = Some(spelled.clone());
                    }
                }
                None => break,
            }
        }

        if let Some(op) = matched {
            let kind = self.operators.get(&op).map(|cfg| cfg.kind).unwrap_or(TokenKind::Incorrect);
            let lexeme = interner.intern(&op);
            return self.make(kind, lexeme, start, line, col);
        }

        // ':' reaches here when it is not the start of ':='.
        if spelled == ":" {
            return self.make(TokenKind::Colon, Symbol::EMPTY, start, line, col);
        }

        if spelled.is_empty() {
            self.reader.consume();
            spelled.push(c);
        }
        let lexeme = interner.intern(&spelled);
        self.make(TokenKind::Incorrect, lexeme, start, line, col)
    }
}

impl<S: CharStream> TokenStream for Lexer<S> {
    fn next_token(&mut self, interner: &mut Interner) -> Token {
        if self.queue.is_empty() {
            self.refill(interner);
        }
        self.current = self.queue.pop_front().expect("refill queues a token");
        self.current
    }

    fn peek_token(&mut self, interner: &mut Interner) -> Token {
        if self.queue.is_empty() {
            self.refill(interner);
        }
        *self.queue.front().expect("refill queues a token")
    }

    fn token(&self) -> Token {
        self.current
    }

    fn file_name(&self) -> String {
        self.reader.file_name().to_string()
    }
}

/// Replays a pre-extracted token vector.
pub struct ReplayLexer {
    tokens: Vec<Token>,
    index: usize,
    started: bool,
}

impl ReplayLexer {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| !t.is_eof()).unwrap_or(true) {
            tokens.push(Token::eof(0, 0));
        }
        ReplayLexer { tokens, index: 0, started: false }
    }
}

impl TokenStream for ReplayLexer {
    fn next_token(&mut self, _interner: &mut Interner) -> Token {
        if !self.started {
            self.started = true;
        } else if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        self.tokens[self.index]
    }

    fn peek_token(&mut self, _interner: &mut Interner) -> Token {
        if !self.started {
            return self.tokens[0];
        }
        let next = (self.index + 1).min(self.tokens.len() - 1);
        self.tokens[next]
    }

    fn token(&self) -> Token {
        if !self.started {
            return Token::eof(0, 0);
        }
        self.tokens[self.index]
    }

    fn file_name(&self) -> String {
        "<replay buffer>".to_string()
    }
}
