//! Statement grammar.

use super::{ParseResult, Parser};
use crate::ast::expr::ExprRef;
use crate::ast::ops::ExprContext;
use crate::ast::stmt::{Alias, ClassDef, ExceptHandler, FunctionDef, Stmt, StmtKind, StmtRef, WithItem};
use crate::ast::{Loc, MatchCase};
use crate::intern::Symbol;
use crate::lexer::TokenStream;
use crate::token::TokenKind;

impl<'a, 'i, L: TokenStream> Parser<'a, 'i, L> {
    pub(crate) fn parse_statement(&mut self) -> ParseResult<StmtRef<'a>> {
        let token = self.tok();
        match token.kind {
            TokenKind::Def => self.parse_function_def(false, Vec::new()),
            TokenKind::Class => self.parse_class_def(Vec::new()),
            TokenKind::Async => self.parse_async_statement(),
            TokenKind::BinaryOp if self.text(&token) == "@" => self.parse_decorated(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(false),
            TokenKind::With => self.parse_with(false),
            TokenKind::Try => self.parse_try(),
            TokenKind::Match => self.parse_match(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Raise => self.parse_raise(),
            TokenKind::Assert => self.parse_assert(),
            TokenKind::Import => self.parse_import(),
            TokenKind::From => self.parse_import_from(),
            TokenKind::Global => self.parse_scope_decl(true),
            TokenKind::Nonlocal => self.parse_scope_decl(false),
            TokenKind::Del => self.parse_delete(),
            TokenKind::Pass => self.parse_simple_keyword(StmtKind::Pass),
            TokenKind::Break => self.parse_simple_keyword(StmtKind::Break),
            TokenKind::Continue => self.parse_simple_keyword(StmtKind::Continue),
            _ => self.parse_expr_statement(),
        }
    }

    fn finish(&mut self, start: Loc, kind: StmtKind<'a>) -> StmtRef<'a> {
        self.arena.alloc(Stmt::new(start.to(self.last), kind))
    }

    /// The statement must be over; anything else is a parse error.
    fn expect_statement_end(&mut self) -> ParseResult<()> {
        match self.tok().kind {
            TokenKind::Newline
            | TokenKind::Eof
            | TokenKind::Dedent
            | TokenKind::Comment
            | TokenKind::Semicolon => Ok(()),
            _ => Err(self.expected("end of statement")),
        }
    }

    // ------------------------------------------------------------------
    // Suites
    // ------------------------------------------------------------------

    /// Parses `: NEWLINE INDENT stmts DEDENT` or an inline suite, and
    /// extracts a leading docstring when asked to.
    pub(crate) fn parse_block(&mut self, allow_docstring: bool) -> ParseResult<(&'a [StmtRef<'a>], Option<Symbol>)> {
        self.expect(TokenKind::Colon, "':'")?;

        // Inline suite: `if x: y; z`
        if !self.at(TokenKind::Newline) && !self.at(TokenKind::Comment) {
            let mut body = Vec::new();
            loop {
                let stmt = self.parse_statement()?;
                body.push(stmt);
                if !self.eat(TokenKind::Semicolon) || self.at(TokenKind::Newline) || self.at(TokenKind::Eof) {
                    break;
                }
            }
            return Ok((self.arena.alloc_slice(body), None));
        }

        while self.at(TokenKind::Comment) {
            self.advance();
        }
        self.expect(TokenKind::Newline, "newline after ':'")?;
        self.skip_newlines();
        self.expect(TokenKind::Indent, "an indented block")?;
        self.skip_newlines();

        let mut docstring = None;
        if allow_docstring && self.at(TokenKind::Docstring) {
            let token = self.tok();
            docstring = Some(token.lexeme);
            self.advance();
            self.skip_newlines();
        }

        let mut body: Vec<StmtRef<'a>> = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::Eof) {
            let stmt = self.parse_statement_or_recover();
            body.push(stmt);
            self.attach_comment(stmt);
            self.skip_newlines();
        }
        self.eat(TokenKind::Dedent);

        Ok((self.arena.alloc_slice(body), docstring))
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    fn parse_decorated(&mut self) -> ParseResult<StmtRef<'a>> {
        let mut decorators: Vec<ExprRef<'a>> = Vec::new();
        while self.at_op(TokenKind::BinaryOp, "@") {
            self.advance();
            decorators.push(self.parse_expression()?);
            self.expect(TokenKind::Newline, "newline after decorator")?;
            self.skip_newlines();
        }

        match self.tok().kind {
            TokenKind::Def => self.parse_function_def(false, decorators),
            TokenKind::Class => self.parse_class_def(decorators),
            TokenKind::Async => {
                self.advance();
                if self.at(TokenKind::Def) {
                    self.parse_function_def(true, decorators)
                } else {
                    Err(self.expected("'def' after 'async'"))
                }
            }
            _ => Err(self.expected("'def' or 'class' after decorators")),
        }
    }

    fn parse_async_statement(&mut self) -> ParseResult<StmtRef<'a>> {
        self.advance(); // async
        match self.tok().kind {
            TokenKind::Def => self.parse_function_def(true, Vec::new()),
            TokenKind::For => self.parse_for(true),
            TokenKind::With => self.parse_with(true),
            _ => Err(self.expected("'def', 'for' or 'with' after 'async'")),
        }
    }

    fn parse_function_def(&mut self, is_async: bool, decorators: Vec<ExprRef<'a>>) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.expect(TokenKind::Def, "'def'")?;
        let name = self.expect(TokenKind::Identifier, "a function name")?.lexeme;

        self.expect(TokenKind::LParen, "'('")?;
        let args = self.parse_parameter_list()?;
        self.expect(TokenKind::RParen, "')'")?;

        let returns = if self.eat(TokenKind::Arrow) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.async_stack.push(is_async);
        let result = self.parse_block(true);
        self.async_stack.pop();
        let (body, docstring) = result?;

        let def = self.arena.alloc(FunctionDef {
            name,
            args,
            body,
            decorators: self.arena.alloc_slice(decorators),
            returns,
            docstring,
            is_async,
            generator: std::cell::Cell::new(false),
            arrow: std::cell::Cell::new(crate::sema::types::TypeId::UNKNOWN),
        });
        Ok(self.finish(start, StmtKind::FunctionDef(def)))
    }

    fn parse_class_def(&mut self, decorators: Vec<ExprRef<'a>>) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect(TokenKind::Identifier, "a class name")?.lexeme;

        let mut bases: Vec<ExprRef<'a>> = Vec::new();
        let mut keywords = Vec::new();
        if self.eat(TokenKind::LParen) {
            if !self.at(TokenKind::RParen) {
                let (args, kwargs) = self.parse_call_arguments()?;
                bases = args;
                keywords = kwargs;
            }
            self.expect(TokenKind::RParen, "')'")?;
        }

        let (body, docstring) = self.parse_block(true)?;

        let def = self.arena.alloc(ClassDef {
            name,
            bases: self.arena.alloc_slice(bases),
            keywords: self.arena.alloc_slice(keywords),
            body,
            decorators: self.arena.alloc_slice(decorators),
            docstring,
            class_id: std::cell::Cell::new(-1),
            ctor: std::cell::Cell::new(crate::sema::types::TypeId::UNKNOWN),
        });
        Ok(self.finish(start, StmtKind::ClassDef(def)))
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    fn parse_if(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance(); // if / elif
        let test = self.parse_expression()?;
        let (body, _) = self.parse_block(false)?;

        let orelse: &'a [StmtRef<'a>] = if self.at(TokenKind::Elif) {
            let nested = self.parse_if()?;
            self.arena.alloc_slice([nested])
        } else if self.eat(TokenKind::Else) {
            let (orelse, _) = self.parse_block(false)?;
            orelse
        } else {
            &[]
        };

        Ok(self.finish(start, StmtKind::If { test, body, orelse }))
    }

    fn parse_while(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let test = self.parse_expression()?;
        let (body, _) = self.parse_block(false)?;
        let orelse = if self.eat(TokenKind::Else) {
            self.parse_block(false)?.0
        } else {
            &[]
        };
        Ok(self.finish(start, StmtKind::While { test, body, orelse }))
    }

    fn parse_for(&mut self, is_async: bool) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.expect(TokenKind::For, "'for'")?;
        let target = self.parse_target_list()?;
        target.set_ctx(ExprContext::Store);
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_expr_list()?;
        let (body, _) = self.parse_block(false)?;
        let orelse = if self.eat(TokenKind::Else) {
            self.parse_block(false)?.0
        } else {
            &[]
        };
        Ok(self.finish(start, StmtKind::For { target, iter, body, orelse, is_async }))
    }

    fn parse_with(&mut self, is_async: bool) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.expect(TokenKind::With, "'with'")?;

        let mut items = Vec::new();
        loop {
            let context_expr = self.parse_expression()?;
            let optional_vars = if self.eat(TokenKind::As) {
                let target = self.parse_expression()?;
                target.set_ctx(ExprContext::Store);
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context_expr, optional_vars });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        let (body, _) = self.parse_block(false)?;
        Ok(self.finish(start, StmtKind::With { items: self.arena.alloc_slice(items), body, is_async }))
    }

    fn parse_try(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let (body, _) = self.parse_block(false)?;

        let mut handlers = Vec::new();
        while self.at(TokenKind::Except) {
            let handler_start = self.loc();
            self.advance();
            let typ = if !self.at(TokenKind::Colon) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let name = if self.eat(TokenKind::As) {
                Some(self.expect(TokenKind::Identifier, "a name after 'as'")?.lexeme)
            } else {
                None
            };
            let (handler_body, _) = self.parse_block(false)?;
            handlers.push(ExceptHandler {
                typ,
                name,
                body: handler_body,
                loc: handler_start.to(self.last),
            });
        }

        let orelse = if self.eat(TokenKind::Else) {
            self.parse_block(false)?.0
        } else {
            &[]
        };
        let finalbody = if self.eat(TokenKind::Finally) {
            self.parse_block(false)?.0
        } else {
            &[]
        };

        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.expected("'except' or 'finally' after 'try' body"));
        }

        Ok(self.finish(
            start,
            StmtKind::Try { body, handlers: self.arena.alloc_slice(handlers), orelse, finalbody },
        ))
    }

    fn parse_match(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let subject = self.parse_expr_list()?;
        self.expect(TokenKind::Colon, "':'")?;
        while self.at(TokenKind::Comment) {
            self.advance();
        }
        self.expect(TokenKind::Newline, "newline after ':'")?;
        self.skip_newlines();
        self.expect(TokenKind::Indent, "an indented block of case clauses")?;
        self.skip_newlines();

        let mut cases = Vec::new();
        while self.at(TokenKind::Case) {
            self.advance();
            let pattern = self.parse_pattern()?;
            let guard = if self.eat(TokenKind::If) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            let (body, _) = self.parse_block(false)?;
            cases.push(MatchCase { pattern, guard, body });
            self.skip_newlines();
        }
        self.eat(TokenKind::Dedent);

        if cases.is_empty() {
            return Err(self.expected("at least one 'case' clause"));
        }

        Ok(self.finish(start, StmtKind::Match { subject, cases: self.arena.alloc_slice(cases) }))
    }

    // ------------------------------------------------------------------
    // Simple statements
    // ------------------------------------------------------------------

    fn parse_simple_keyword(&mut self, kind: StmtKind<'a>) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        self.expect_statement_end()?;
        Ok(self.finish(start, kind))
    }

    fn parse_return(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let value = if self.statement_continues() {
            Some(self.parse_expr_list()?)
        } else {
            None
        };
        self.expect_statement_end()?;
        Ok(self.finish(start, StmtKind::Return { value }))
    }

    fn parse_raise(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let mut exc = None;
        let mut cause = None;
        if self.statement_continues() {
            exc = Some(self.parse_expression()?);
            if self.eat(TokenKind::From) {
                cause = Some(self.parse_expression()?);
            }
        }
        self.expect_statement_end()?;
        Ok(self.finish(start, StmtKind::Raise { exc, cause }))
    }

    fn parse_assert(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let test = self.parse_expression()?;
        let msg = if self.eat(TokenKind::Comma) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_statement_end()?;
        Ok(self.finish(start, StmtKind::Assert { test, msg }))
    }

    fn parse_delete(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let mut targets = Vec::new();
        loop {
            let target = self.parse_expression()?;
            target.set_ctx(ExprContext::Del);
            targets.push(target);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_statement_end()?;
        Ok(self.finish(start, StmtKind::Delete { targets: self.arena.alloc_slice(targets) }))
    }

    fn parse_scope_decl(&mut self, global: bool) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let mut names = Vec::new();
        loop {
            names.push(self.expect(TokenKind::Identifier, "a name")?.lexeme);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_statement_end()?;
        let names = self.arena.alloc_slice(names);
        let kind = if global {
            StmtKind::Global { names }
        } else {
            StmtKind::Nonlocal { names }
        };
        Ok(self.finish(start, kind))
    }

    /// `import a.b.c [as d], ...`
    fn parse_import(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let mut names = Vec::new();
        loop {
            let name = self.parse_dotted_name()?;
            let asname = if self.eat(TokenKind::As) {
                Some(self.expect(TokenKind::Identifier, "a name after 'as'")?.lexeme)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_statement_end()?;
        Ok(self.finish(start, StmtKind::Import { names: self.arena.alloc_slice(names) }))
    }

    /// `from m import x [as y], ...`
    fn parse_import_from(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        self.advance();
        let module = self.parse_dotted_name()?;
        self.expect(TokenKind::Import, "'import'")?;

        let mut names = Vec::new();
        if self.at(TokenKind::Star) {
            self.advance();
            let star = self.intern("*");
            names.push(Alias { name: star, asname: None });
        } else {
            let parens = self.eat(TokenKind::LParen);
            loop {
                let name = self.expect(TokenKind::Identifier, "an imported name")?.lexeme;
                let asname = if self.eat(TokenKind::As) {
                    Some(self.expect(TokenKind::Identifier, "a name after 'as'")?.lexeme)
                } else {
                    None
                };
                names.push(Alias { name, asname });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if parens && self.at(TokenKind::RParen) {
                    break;
                }
            }
            if parens {
                self.expect(TokenKind::RParen, "')'")?;
            }
        }
        self.expect_statement_end()?;
        Ok(self.finish(start, StmtKind::ImportFrom { module, names: self.arena.alloc_slice(names) }))
    }

    fn parse_dotted_name(&mut self) -> ParseResult<Symbol> {
        let mut path = String::new();
        let first = self.expect(TokenKind::Identifier, "a module name")?;
        path.push_str(self.interner.resolve(first.lexeme));
        while self.at(TokenKind::Dot) {
            self.advance();
            let part = self.expect(TokenKind::Identifier, "a name after '.'")?;
            path.push('.');
            path.push_str(self.interner.resolve(part.lexeme));
        }
        Ok(self.intern(&path))
    }

    fn statement_continues(&mut self) -> bool {
        !matches!(
            self.tok().kind,
            TokenKind::Newline
                | TokenKind::Eof
                | TokenKind::Dedent
                | TokenKind::Comment
                | TokenKind::Semicolon
        )
    }

    // ------------------------------------------------------------------
    // Expression statements and assignments
    // ------------------------------------------------------------------

    fn parse_expr_statement(&mut self) -> ParseResult<StmtRef<'a>> {
        let start = self.loc();
        let first = self.parse_expr_list()?;

        let stmt = match self.tok().kind {
            TokenKind::Assign => {
                let mut targets = vec![first];
                let mut value = None;
                while self.eat(TokenKind::Assign) {
                    let next = self.parse_expr_list()?;
                    if self.at(TokenKind::Assign) {
                        targets.push(next);
                    } else {
                        value = Some(next);
                    }
                }
                let value = value.ok_or_else(|| self.expected("a value after '='"))?;
                for target in &targets {
                    target.set_ctx(ExprContext::Store);
                }
                self.finish(start, StmtKind::Assign { targets: self.arena.alloc_slice(targets), value })
            }
            TokenKind::AugAssign => {
                let token = self.tok();
                let spelling = self.text(&token).to_string();
                let op = self
                    .operators
                    .get(spelling.as_str())
                    .and_then(|cfg| cfg.binary)
                    .ok_or_else(|| self.expected("an augmented assignment operator"))?;
                self.advance();
                let value = self.parse_expr_list()?;
                first.set_ctx(ExprContext::Store);
                self.finish(
                    start,
                    StmtKind::AugAssign { target: first, op, value, native: std::cell::Cell::new(None) },
                )
            }
            TokenKind::Colon => {
                self.advance();
                let annotation = self.parse_expression()?;
                let value = if self.eat(TokenKind::Assign) {
                    Some(self.parse_expr_list()?)
                } else {
                    None
                };
                first.set_ctx(ExprContext::Store);
                self.finish(start, StmtKind::AnnAssign { target: first, annotation, value })
            }
            _ => self.finish(start, StmtKind::Expr { value: first }),
        };

        // `<stmt>; <stmt>` folds into one inline statement.
        if self.at(TokenKind::Semicolon) {
            let mut body = vec![stmt];
            while self.eat(TokenKind::Semicolon) {
                if !self.statement_continues() {
                    break;
                }
                body.push(self.parse_statement()?);
            }
            return Ok(self.finish(start, StmtKind::Inline { body: self.arena.alloc_slice(body) }));
        }

        self.expect_statement_end()?;
        Ok(stmt)
    }
}
