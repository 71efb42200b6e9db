//! Expression grammar: Pratt-style precedence climbing over the operator
//! table, primaries, displays, comprehensions and call arguments.

use std::cell::Cell;

use super::{ParseResult, Parser, ParsingContext};
use crate::ast::expr::{Arg, Arguments, Comprehension, Expr, ExprKind, ExprRef, Keyword};
use crate::ast::ops::{CmpOperator, ExprContext, UnaryOperator};
use crate::ast::{ConstantValue, Loc};
use crate::lexer::TokenStream;
use crate::token::{Token, TokenKind};

// Precedence of `not`, unary +/-/~ and the operand floor of `*expr`.
const PREC_NOT: i32 = 6;
const PREC_BITOR: i32 = 8;
const PREC_UNARY: i32 = 14;

impl<'a, 'i, L: TokenStream> Parser<'a, 'i, L> {
    pub(crate) fn mk(&mut self, start: Loc, kind: ExprKind<'a>) -> ExprRef<'a> {
        self.arena.alloc(Expr::new(start.to(self.last), kind))
    }

    /// A full expression: lambda, conditional, or operator expression.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<ExprRef<'a>> {
        if self.at(TokenKind::Lambda) {
            return self.parse_lambda();
        }

        let start = self.loc();
        let expr = self.parse_expr_prec(0)?;

        // `body if test else orelse`
        if self.at(TokenKind::If) {
            self.advance();
            let test = self.parse_expr_prec(0)?;
            self.expect(TokenKind::Else, "'else' in conditional expression")?;
            let orelse = self.parse_expression()?;
            return Ok(self.mk(start, ExprKind::IfExp { test, body: expr, orelse }));
        }

        Ok(expr)
    }

    /// An expression list: `a, b, c` folds into a tuple.
    pub(crate) fn parse_expr_list(&mut self) -> ParseResult<ExprRef<'a>> {
        let start = self.loc();
        let first = self.parse_expression()?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }

        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if !self.expression_starts() {
                break;
            }
            elts.push(self.parse_expression()?);
        }
        Ok(self.mk(
            start,
            ExprKind::Tuple { elts: self.arena.alloc_slice(elts), ctx: Cell::new(ExprContext::Load) },
        ))
    }

    /// Assignment/loop targets: like an expression list but stopping
    /// before `in`, so `for x in y` does not parse a comparison.
    pub(crate) fn parse_target_list(&mut self) -> ParseResult<ExprRef<'a>> {
        let start = self.loc();
        let first = self.parse_expr_prec(PREC_BITOR)?;
        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }

        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if !self.expression_starts() {
                break;
            }
            elts.push(self.parse_expr_prec(PREC_BITOR)?);
        }
        Ok(self.mk(
            start,
            ExprKind::Tuple { elts: self.arena.alloc_slice(elts), ctx: Cell::new(ExprContext::Load) },
        ))
    }

    /// True if the current token can begin an expression.
    pub(crate) fn expression_starts(&mut self) -> bool {
        let token = self.tok();
        match token.kind {
            TokenKind::Identifier
            | TokenKind::Int
            | TokenKind::Float
            | TokenKind::Str
            | TokenKind::Docstring
            | TokenKind::FString
            | TokenKind::LParen
            | TokenKind::LSquare
            | TokenKind::LBrace
            | TokenKind::Lambda
            | TokenKind::Yield
            | TokenKind::Await
            | TokenKind::If
            | TokenKind::Star
            | TokenKind::UnaryOp => true,
            TokenKind::BinaryOp => {
                let text = self.text(&token);
                text == "+" || text == "-"
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Operator climbing
    // ------------------------------------------------------------------

    pub(crate) fn parse_expr_prec(&mut self, min_prec: i32) -> ParseResult<ExprRef<'a>> {
        let left = self.parse_unary()?;
        self.parse_operators(left, min_prec)
    }

    /// Describes the operator at the cursor, after merging the two-token
    /// spellings `not in` and `is not`.
    fn operator_at(&mut self) -> Option<(&'static str, u8)> {
        let token = self.tok();
        match token.kind {
            TokenKind::BoolOp | TokenKind::BinaryOp | TokenKind::CompareOp | TokenKind::Star | TokenKind::DoubleStar => {
                let text = self.text(&token).to_string();
                let key: Option<&'static str> = match text.as_str() {
                    "or" => Some("or"),
                    "and" => Some("and"),
                    "+" => Some("+"),
                    "-" => Some("-"),
                    "*" => Some("*"),
                    "/" => Some("/"),
                    "//" => Some("//"),
                    "%" => Some("%"),
                    "@" => Some("@"),
                    "**" => Some("**"),
                    "|" => Some("|"),
                    "^" => Some("^"),
                    "&" => Some("&"),
                    "<<" => Some("<<"),
                    ">>" => Some(">>"),
                    "==" => Some("=="),
                    "!=" => Some("!="),
                    "<" => Some("<"),
                    "<=" => Some("<="),
                    ">" => Some(">"),
                    ">=" => Some(">="),
                    "is" => {
                        let next = self.peek();
                        if next.kind == TokenKind::UnaryOp && self.text(&next) == "not" {
                            return Some(("is not", 2));
                        }
                        Some("is")
                    }
                    _ => None,
                };
                key.map(|k| (k, 1))
            }
            TokenKind::In => Some(("in", 1)),
            TokenKind::UnaryOp if self.text(&token) == "not" && self.peek().kind == TokenKind::In => {
                Some(("not in", 2))
            }
            TokenKind::Walrus => Some((":=", 1)),
            _ => None,
        }
    }

    fn consume_operator(&mut self, width: u8) {
        for _ in 0..width {
            self.advance();
        }
    }

    /// Climbs binary/boolean/comparison operators above `min_prec`.
    pub(crate) fn parse_operators(&mut self, mut left: ExprRef<'a>, min_prec: i32) -> ParseResult<ExprRef<'a>> {
        loop {
            let Some((key, width)) = self.operator_at() else { break };
            let config = match self.operators.get(key) {
                Some(config) => *config,
                None => break,
            };
            if config.precedence < min_prec {
                break;
            }

            let start = left.loc;

            if let Some(op) = config.boolean {
                self.consume_operator(width);
                let mut values = vec![left];
                values.push(self.parse_expr_prec(config.precedence + 1)?);
                // `a and b and c` folds into a single node.
                while let Some((next_key, next_width)) = self.operator_at() {
                    if next_key != key {
                        break;
                    }
                    self.consume_operator(next_width);
                    values.push(self.parse_expr_prec(config.precedence + 1)?);
                }
                left = self.mk(
                    start,
                    ExprKind::BoolOp {
                        op,
                        values: self.arena.alloc_slice(values),
                        native: Cell::new(None),
                    },
                );
                continue;
            }

            if config.compare.is_some() {
                left = self.parse_compare_chain(left, start)?;
                continue;
            }

            if config.kind == TokenKind::Walrus {
                self.consume_operator(width);
                left.set_ctx(ExprContext::Store);
                let value = self.parse_expr_prec(config.precedence)?;
                left = self.mk(start, ExprKind::NamedExpr { target: left, value });
                continue;
            }

            let op = match config.binary {
                Some(op) => op,
                None => break,
            };
            self.consume_operator(width);
            let next_min = config.precedence + if config.left_associative { 1 } else { 0 };
            let right = self.parse_expr_prec(next_min)?;
            left = self.mk(
                start,
                ExprKind::BinOp {
                    left,
                    op,
                    right,
                    native: Cell::new(None),
                    method: Cell::new(None),
                },
            );
        }
        Ok(left)
    }

    /// `a < b <= c` — one node, parallel ops and comparators.
    fn parse_compare_chain(&mut self, left: ExprRef<'a>, start: Loc) -> ParseResult<ExprRef<'a>> {
        let mut ops: Vec<CmpOperator> = Vec::new();
        let mut comparators: Vec<ExprRef<'a>> = Vec::new();

        while let Some((key, width)) = self.operator_at() {
            let config = match self.operators.get(key) {
                Some(config) => *config,
                None => break,
            };
            let Some(op) = config.compare else { break };
            self.consume_operator(width);
            ops.push(op);
            comparators.push(self.parse_expr_prec(config.precedence + 1)?);
        }

        let natives = self.arena.alloc_slice(ops.iter().map(|_| Cell::new(None)));
        let methods = self.arena.alloc_slice(ops.iter().map(|_| Cell::new(None)));
        Ok(self.mk(
            start,
            ExprKind::Compare {
                left,
                ops: self.arena.alloc_slice(ops),
                comparators: self.arena.alloc_slice(comparators),
                natives,
                methods,
            },
        ))
    }

    // ------------------------------------------------------------------
    // Prefix and postfix
    // ------------------------------------------------------------------

    fn parse_unary(&mut self) -> ParseResult<ExprRef<'a>> {
        let token = self.tok();
        let start = self.loc();

        match token.kind {
            TokenKind::UnaryOp => {
                let text = self.text(&token);
                let (op, floor) = if text == "not" {
                    (UnaryOperator::Not, PREC_NOT + 1)
                } else {
                    (UnaryOperator::Invert, PREC_UNARY + 1)
                };
                self.advance();
                let operand = self.parse_expr_prec(floor)?;
                return Ok(self.mk(
                    start,
                    ExprKind::UnaryOp { op, operand, native: Cell::new(None), method: Cell::new(None) },
                ));
            }
            TokenKind::BinaryOp => {
                let text = self.text(&token);
                let op = match text {
                    "+" => Some(UnaryOperator::UAdd),
                    "-" => Some(UnaryOperator::USub),
                    _ => None,
                };
                if let Some(op) = op {
                    self.advance();
                    let operand = self.parse_expr_prec(PREC_UNARY + 1)?;
                    return Ok(self.mk(
                        start,
                        ExprKind::UnaryOp { op, operand, native: Cell::new(None), method: Cell::new(None) },
                    ));
                }
            }
            TokenKind::Await => {
                self.advance();
                let atom = self.parse_primary()?;
                let value = self.parse_postfix(atom)?;
                return Ok(self.mk(start, ExprKind::Await { value }));
            }
            _ => {}
        }

        let atom = self.parse_primary()?;
        self.parse_postfix(atom)
    }

    fn parse_postfix(&mut self, mut expr: ExprRef<'a>) -> ParseResult<ExprRef<'a>> {
        loop {
            let start = expr.loc;
            match self.tok().kind {
                TokenKind::LParen => {
                    self.advance();
                    self.contexts.push(ParsingContext::Expression);
                    let (args, keywords) = self.parse_call_arguments()?;
                    self.contexts.pop();
                    self.expect(TokenKind::RParen, "')'")?;
                    expr = self.mk(
                        start,
                        ExprKind::Call {
                            func: expr,
                            args: self.arena.alloc_slice(args),
                            keywords: self.arena.alloc_slice(keywords),
                        },
                    );
                }
                TokenKind::LSquare => {
                    self.advance();
                    self.contexts.push(ParsingContext::Slice);
                    let slice = self.parse_subscript()?;
                    self.contexts.pop();
                    self.expect(TokenKind::RSquare, "']'")?;
                    expr = self.mk(
                        start,
                        ExprKind::Subscript { value: expr, slice, ctx: Cell::new(ExprContext::Load) },
                    );
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect(TokenKind::Identifier, "an attribute name")?.lexeme;
                    expr = self.mk(
                        start,
                        ExprKind::Attribute {
                            value: expr,
                            attr,
                            ctx: Cell::new(ExprContext::Load),
                            offset: Cell::new(-1),
                        },
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    // ------------------------------------------------------------------
    // Primaries
    // ------------------------------------------------------------------

    fn parse_primary(&mut self) -> ParseResult<ExprRef<'a>> {
        let token = self.tok();
        let start = self.loc();

        match token.kind {
            TokenKind::Int => {
                self.advance();
                let value = self.parse_int_literal(&token)?;
                let kind = self.intern("int");
                Ok(self.mk(start, ExprKind::Constant { value, kind: Some(kind) }))
            }
            TokenKind::Float => {
                self.advance();
                let text = self.text(&token).replace('_', "");
                let value = text.parse::<f64>().map_err(|_| self.expected("a float literal"))?;
                let kind = self.intern("float");
                Ok(self.mk(
                    start,
                    ExprKind::Constant { value: ConstantValue::Float(value), kind: Some(kind) },
                ))
            }
            TokenKind::Str | TokenKind::Docstring => {
                self.advance();
                let kind = self.intern("str");
                Ok(self.mk(
                    start,
                    ExprKind::Constant { value: ConstantValue::Str(token.lexeme), kind: Some(kind) },
                ))
            }
            TokenKind::FString => {
                self.advance();
                self.parse_fstring(&token, start)
            }
            TokenKind::Identifier => {
                self.advance();
                let text = self.text(&token);
                let constant = match text {
                    "True" => Some(ConstantValue::Bool(true)),
                    "False" => Some(ConstantValue::Bool(false)),
                    "None" => Some(ConstantValue::None),
                    _ => None,
                };
                if let Some(value) = constant {
                    let kind = self.intern(value.kind_str());
                    return Ok(self.mk(start, ExprKind::Constant { value, kind: Some(kind) }));
                }
                Ok(self.mk(
                    start,
                    ExprKind::Name {
                        id: token.lexeme,
                        ctx: Cell::new(ExprContext::Load),
                        varid: Cell::new(-1),
                    },
                ))
            }
            TokenKind::LParen => self.parse_paren(start),
            TokenKind::LSquare => self.parse_list_display(start),
            TokenKind::LBrace => self.parse_brace_display(start),
            TokenKind::Lambda => self.parse_lambda(),
            TokenKind::If => self.parse_if_expression(start),
            TokenKind::Star => {
                self.advance();
                let value = self.parse_expr_prec(PREC_BITOR)?;
                Ok(self.mk(start, ExprKind::Starred { value, ctx: Cell::new(ExprContext::Load) }))
            }
            TokenKind::Yield => {
                self.advance();
                if self.at(TokenKind::From) {
                    self.advance();
                    let value = self.parse_expression()?;
                    return Ok(self.mk(start, ExprKind::YieldFrom { value }));
                }
                let value = if self.expression_starts() {
                    Some(self.parse_expr_list()?)
                } else {
                    None
                };
                Ok(self.mk(start, ExprKind::Yield { value }))
            }
            _ => Err(self.expected("an expression")),
        }
    }

    fn parse_int_literal(&mut self, token: &Token) -> ParseResult<ConstantValue> {
        let text = self.text(token).replace('_', "");
        let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16)
        } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
            i64::from_str_radix(oct, 8)
        } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2)
        } else {
            text.parse::<i64>()
        };
        parsed.map(ConstantValue::Int).map_err(|_| self.expected("an integer literal"))
    }

    /// `(...)`: grouping, tuple display, generator expression, or the
    /// empty tuple.
    fn parse_paren(&mut self, start: Loc) -> ParseResult<ExprRef<'a>> {
        self.advance();
        self.contexts.push(ParsingContext::Expression);

        if self.at(TokenKind::RParen) {
            self.contexts.pop();
            self.advance();
            return Ok(self.mk(
                start,
                ExprKind::Tuple { elts: &[], ctx: Cell::new(ExprContext::Load) },
            ));
        }

        let first = self.parse_expression()?;

        let result = if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.peek().kind == TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            self.mk(start, ExprKind::GeneratorExp { elt: first, generators })
        } else if self.at(TokenKind::Comma) {
            let mut elts = vec![first];
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RParen) {
                    break;
                }
                elts.push(self.parse_expression()?);
            }
            self.mk(
                start,
                ExprKind::Tuple { elts: self.arena.alloc_slice(elts), ctx: Cell::new(ExprContext::Load) },
            )
        } else {
            first
        };

        self.contexts.pop();
        self.expect(TokenKind::RParen, "')'")?;
        Ok(result)
    }

    /// `[...]`: list display or list comprehension.
    fn parse_list_display(&mut self, start: Loc) -> ParseResult<ExprRef<'a>> {
        self.advance();
        self.contexts.push(ParsingContext::Expression);

        if self.at(TokenKind::RSquare) {
            self.contexts.pop();
            self.advance();
            return Ok(self.mk(start, ExprKind::List { elts: &[], ctx: Cell::new(ExprContext::Load) }));
        }

        let first = self.parse_expression()?;

        let result = if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.peek().kind == TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            self.mk(start, ExprKind::ListComp { elt: first, generators })
        } else {
            let mut elts = vec![first];
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RSquare) {
                    break;
                }
                elts.push(self.parse_expression()?);
            }
            self.mk(
                start,
                ExprKind::List { elts: self.arena.alloc_slice(elts), ctx: Cell::new(ExprContext::Load) },
            )
        };

        self.contexts.pop();
        self.expect(TokenKind::RSquare, "']'")?;
        Ok(result)
    }

    /// `{...}`: dict or set display, or their comprehensions.
    fn parse_brace_display(&mut self, start: Loc) -> ParseResult<ExprRef<'a>> {
        self.advance();
        self.contexts.push(ParsingContext::Expression);

        if self.at(TokenKind::RBrace) {
            self.contexts.pop();
            self.advance();
            return Ok(self.mk(start, ExprKind::Dict { keys: &[], values: &[] }));
        }

        let first = self.parse_expression()?;

        let result = if self.eat(TokenKind::Colon) {
            let first_value = self.parse_expression()?;
            if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.peek().kind == TokenKind::For) {
                let generators = self.parse_comprehensions()?;
                self.mk(start, ExprKind::DictComp { key: first, value: first_value, generators })
            } else {
                let mut keys = vec![first];
                let mut values = vec![first_value];
                while self.eat(TokenKind::Comma) {
                    if self.at(TokenKind::RBrace) {
                        break;
                    }
                    keys.push(self.parse_expression()?);
                    self.expect(TokenKind::Colon, "':' in dict display")?;
                    values.push(self.parse_expression()?);
                }
                self.mk(
                    start,
                    ExprKind::Dict {
                        keys: self.arena.alloc_slice(keys),
                        values: self.arena.alloc_slice(values),
                    },
                )
            }
        } else if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.peek().kind == TokenKind::For) {
            let generators = self.parse_comprehensions()?;
            self.mk(start, ExprKind::SetComp { elt: first, generators })
        } else {
            let mut elts = vec![first];
            while self.eat(TokenKind::Comma) {
                if self.at(TokenKind::RBrace) {
                    break;
                }
                elts.push(self.parse_expression()?);
            }
            self.mk(start, ExprKind::Set { elts: self.arena.alloc_slice(elts) })
        };

        self.contexts.pop();
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(result)
    }

    /// The expression form `if cond: a else b`.
    fn parse_if_expression(&mut self, start: Loc) -> ParseResult<ExprRef<'a>> {
        self.advance();
        let test = self.parse_expr_prec(0)?;
        self.expect(TokenKind::Colon, "':' in if-expression")?;
        let body = self.parse_expr_prec(0)?;
        self.expect(TokenKind::Else, "'else' in if-expression")?;
        let orelse = self.parse_expression()?;
        Ok(self.mk(start, ExprKind::IfExp { test, body, orelse }))
    }

    fn parse_lambda(&mut self) -> ParseResult<ExprRef<'a>> {
        let start = self.loc();
        self.expect(TokenKind::Lambda, "'lambda'")?;
        let args = self.parse_lambda_params()?;
        self.expect(TokenKind::Colon, "':' after lambda parameters")?;
        let body = self.parse_expression()?;
        let args = self.arena.alloc(args);
        Ok(self.mk(start, ExprKind::Lambda { args, body }))
    }

    fn parse_lambda_params(&mut self) -> ParseResult<Arguments<'a>> {
        let mut args: Vec<Arg<'a>> = Vec::new();
        let mut defaults: Vec<ExprRef<'a>> = Vec::new();
        let mut vararg = None;
        let mut kwarg = None;

        while !self.at(TokenKind::Colon) {
            if self.eat(TokenKind::Star) {
                let name = self.expect(TokenKind::Identifier, "a parameter name after '*'")?;
                vararg = Some(&*self.arena.alloc(Arg {
                    name: name.lexeme,
                    annotation: None,
                    loc: Loc::from_token(&name),
                }));
            } else if self.eat(TokenKind::DoubleStar) {
                let name = self.expect(TokenKind::Identifier, "a parameter name after '**'")?;
                kwarg = Some(&*self.arena.alloc(Arg {
                    name: name.lexeme,
                    annotation: None,
                    loc: Loc::from_token(&name),
                }));
            } else {
                let name = self.expect(TokenKind::Identifier, "a parameter name")?;
                args.push(Arg { name: name.lexeme, annotation: None, loc: Loc::from_token(&name) });
                if self.eat(TokenKind::Assign) {
                    defaults.push(self.parse_expression()?);
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(Arguments {
            posonlyargs: &[],
            args: self.arena.alloc_slice(args),
            vararg,
            kwonlyargs: &[],
            kw_defaults: &[],
            kwarg,
            defaults: self.arena.alloc_slice(defaults),
        })
    }

    // ------------------------------------------------------------------
    // Comprehensions, subscripts, arguments
    // ------------------------------------------------------------------

    pub(crate) fn parse_comprehensions(&mut self) -> ParseResult<&'a [Comprehension<'a>]> {
        self.contexts.push(ParsingContext::Comprehension);
        let mut generators = Vec::new();

        loop {
            let is_async = if self.at(TokenKind::Async) && self.peek().kind == TokenKind::For {
                self.advance();
                if !self.async_stack.last().copied().unwrap_or(false) {
                    let loc = self.loc();
                    let diagnostic = crate::error::Diagnostic::new(
                        crate::error::DiagnosticKind::SyntaxError("'async for' outside async function".to_string()),
                        loc,
                        self.file.clone(),
                    );
                    self.report(diagnostic);
                }
                true
            } else {
                false
            };
            if !self.eat(TokenKind::For) {
                break;
            }
            let target = self.parse_target_list()?;
            target.set_ctx(ExprContext::Store);
            self.expect(TokenKind::In, "'in'")?;
            let iter = self.parse_expr_prec(0)?;

            let mut ifs = Vec::new();
            while self.at(TokenKind::If) {
                self.advance();
                ifs.push(self.parse_expr_prec(0)?);
            }
            generators.push(Comprehension { target, iter, ifs: self.arena.alloc_slice(ifs), is_async });

            if !self.at(TokenKind::For) && !(self.at(TokenKind::Async) && self.peek().kind == TokenKind::For) {
                break;
            }
        }

        self.contexts.pop();
        if generators.is_empty() {
            return Err(self.expected("'for' in comprehension"));
        }
        Ok(self.arena.alloc_slice(generators))
    }

    /// The index of a subscript: a slice `l:u:s`, a plain expression, or
    /// a tuple of either.
    fn parse_subscript(&mut self) -> ParseResult<ExprRef<'a>> {
        let start = self.loc();
        let first = self.parse_slice_item(start)?;

        if !self.at(TokenKind::Comma) {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::RSquare) {
                break;
            }
            let item_start = self.loc();
            elts.push(self.parse_slice_item(item_start)?);
        }
        Ok(self.mk(
            start,
            ExprKind::Tuple { elts: self.arena.alloc_slice(elts), ctx: Cell::new(ExprContext::Load) },
        ))
    }

    fn parse_slice_item(&mut self, start: Loc) -> ParseResult<ExprRef<'a>> {
        let lower = if self.at(TokenKind::Colon) {
            None
        } else {
            Some(self.parse_expression()?)
        };

        if !self.eat(TokenKind::Colon) {
            return lower.ok_or_else(|| self.expected("an index or slice"));
        }

        let upper = if self.at(TokenKind::Colon) || self.at(TokenKind::RSquare) || self.at(TokenKind::Comma) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let step = if self.eat(TokenKind::Colon) {
            if self.at(TokenKind::RSquare) || self.at(TokenKind::Comma) {
                None
            } else {
                Some(self.parse_expression()?)
            }
        } else {
            None
        };

        Ok(self.mk(start, ExprKind::Slice { lower, upper, step }))
    }

    /// Call-site arguments: positionals, `*expr`, `name=expr`, `**expr`,
    /// or a bare generator expression.
    pub(crate) fn parse_call_arguments(&mut self) -> ParseResult<(Vec<ExprRef<'a>>, Vec<Keyword<'a>>)> {
        let mut args: Vec<ExprRef<'a>> = Vec::new();
        let mut keywords: Vec<Keyword<'a>> = Vec::new();

        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::DoubleStar) {
                self.advance();
                let value = self.parse_expression()?;
                keywords.push(Keyword { arg: None, value });
            } else if self.at(TokenKind::Star) {
                let start = self.loc();
                self.advance();
                let value = self.parse_expr_prec(PREC_BITOR)?;
                args.push(self.mk(start, ExprKind::Starred { value, ctx: Cell::new(ExprContext::Load) }));
            } else if self.at(TokenKind::Identifier) && self.peek().kind == TokenKind::Assign {
                let name = self.tok().lexeme;
                self.advance();
                self.advance();
                let value = self.parse_expression()?;
                keywords.push(Keyword { arg: Some(name), value });
            } else {
                let start = self.loc();
                let value = self.parse_expression()?;
                if self.at(TokenKind::For) || (self.at(TokenKind::Async) && self.peek().kind == TokenKind::For) {
                    let generators = self.parse_comprehensions()?;
                    args.push(self.mk(start, ExprKind::GeneratorExp { elt: value, generators }));
                } else {
                    args.push(value);
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok((args, keywords))
    }

    /// The formal parameter list of a `def`, with `/`, `*`, `*args`,
    /// `**kwargs` and defaults.
    pub(crate) fn parse_parameter_list(&mut self) -> ParseResult<Arguments<'a>> {
        let mut posonlyargs: Vec<Arg<'a>> = Vec::new();
        let mut args: Vec<Arg<'a>> = Vec::new();
        let mut defaults: Vec<ExprRef<'a>> = Vec::new();
        let mut vararg: Option<&'a Arg<'a>> = None;
        let mut kwonlyargs: Vec<Arg<'a>> = Vec::new();
        let mut kw_defaults: Vec<Option<ExprRef<'a>>> = Vec::new();
        let mut kwarg: Option<&'a Arg<'a>> = None;
        let mut seen_star = false;

        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            let token = self.tok();
            match token.kind {
                TokenKind::Star => {
                    self.advance();
                    if self.at(TokenKind::Identifier) {
                        vararg = Some(self.parse_parameter()?);
                    }
                    seen_star = true;
                }
                TokenKind::DoubleStar => {
                    self.advance();
                    kwarg = Some(self.parse_parameter()?);
                }
                TokenKind::BinaryOp if self.text(&token) == "/" => {
                    // Everything declared so far was positional-only.
                    self.advance();
                    posonlyargs.append(&mut args);
                }
                TokenKind::Identifier => {
                    let arg = self.parse_parameter()?;
                    let default = if self.eat(TokenKind::Assign) {
                        Some(self.parse_expression()?)
                    } else {
                        None
                    };
                    if seen_star {
                        kwonlyargs.push(Arg { name: arg.name, annotation: arg.annotation, loc: arg.loc });
                        kw_defaults.push(default);
                    } else {
                        args.push(Arg { name: arg.name, annotation: arg.annotation, loc: arg.loc });
                        if let Some(default) = default {
                            defaults.push(default);
                        }
                    }
                }
                _ => return Err(self.expected("a parameter name")),
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        Ok(Arguments {
            posonlyargs: self.arena.alloc_slice(posonlyargs),
            args: self.arena.alloc_slice(args),
            vararg,
            kwonlyargs: self.arena.alloc_slice(kwonlyargs),
            kw_defaults: self.arena.alloc_slice(kw_defaults),
            kwarg,
            defaults: self.arena.alloc_slice(defaults),
        })
    }

    fn parse_parameter(&mut self) -> ParseResult<&'a Arg<'a>> {
        let name = self.expect(TokenKind::Identifier, "a parameter name")?;
        let annotation = if self.eat(TokenKind::Colon) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(self.arena.alloc(Arg { name: name.lexeme, annotation, loc: Loc::from_token(&name) }))
    }
}
