//! Match-pattern grammar.

use std::cell::Cell;

use super::{ParseResult, Parser};
use crate::ast::expr::ExprKind;
use crate::ast::ops::{ExprContext, UnaryOperator};
use crate::ast::pattern::{Pat, PatKind, PatRef};
use crate::ast::{ConstantValue, Loc};
use crate::intern::Symbol;
use crate::lexer::TokenStream;
use crate::token::TokenKind;

impl<'a, 'i, L: TokenStream> Parser<'a, 'i, L> {
    fn mk_pat(&mut self, start: Loc, kind: PatKind<'a>) -> PatRef<'a> {
        self.arena.alloc(Pat::new(start.to(self.last), kind))
    }

    /// `p | q | r`, each alternative an as-pattern.
    pub(crate) fn parse_pattern(&mut self) -> ParseResult<PatRef<'a>> {
        let start = self.loc();
        let first = self.parse_as_pattern()?;

        if !self.at_op(TokenKind::BinaryOp, "|") {
            return Ok(first);
        }

        let mut patterns = vec![first];
        while self.at_op(TokenKind::BinaryOp, "|") {
            self.advance();
            patterns.push(self.parse_as_pattern()?);
        }
        Ok(self.mk_pat(start, PatKind::MatchOr { patterns: self.arena.alloc_slice(patterns) }))
    }

    fn parse_as_pattern(&mut self) -> ParseResult<PatRef<'a>> {
        let start = self.loc();
        let pattern = self.parse_closed_pattern()?;
        if self.eat(TokenKind::As) {
            let name = self.expect(TokenKind::Identifier, "a capture name after 'as'")?.lexeme;
            return Ok(self.mk_pat(start, PatKind::MatchAs { pattern: Some(pattern), name: Some(name) }));
        }
        Ok(pattern)
    }

    fn parse_closed_pattern(&mut self) -> ParseResult<PatRef<'a>> {
        let token = self.tok();
        let start = self.loc();

        match token.kind {
            TokenKind::Int | TokenKind::Float | TokenKind::Str => {
                let value = self.parse_expr_prec(7)?;
                Ok(self.mk_pat(start, PatKind::MatchValue { value }))
            }
            // A negative literal: `case -1:`.
            TokenKind::BinaryOp if self.text(&token) == "-" => {
                self.advance();
                let operand = self.parse_expr_prec(15)?;
                let value = self.mk(
                    start,
                    ExprKind::UnaryOp {
                        op: UnaryOperator::USub,
                        operand,
                        native: Cell::new(None),
                        method: Cell::new(None),
                    },
                );
                Ok(self.mk_pat(start, PatKind::MatchValue { value }))
            }
            TokenKind::Identifier => {
                let text = self.text(&token).to_string();
                match text.as_str() {
                    "True" => {
                        self.advance();
                        Ok(self.mk_pat(start, PatKind::MatchSingleton { value: ConstantValue::Bool(true) }))
                    }
                    "False" => {
                        self.advance();
                        Ok(self.mk_pat(start, PatKind::MatchSingleton { value: ConstantValue::Bool(false) }))
                    }
                    "None" => {
                        self.advance();
                        Ok(self.mk_pat(start, PatKind::MatchSingleton { value: ConstantValue::None }))
                    }
                    "_" => {
                        self.advance();
                        Ok(self.mk_pat(start, PatKind::MatchAs { pattern: None, name: None }))
                    }
                    _ => self.parse_name_pattern(token.lexeme, start),
                }
            }
            TokenKind::LSquare => {
                self.advance();
                let patterns = self.parse_sequence_items(TokenKind::RSquare)?;
                self.expect(TokenKind::RSquare, "']'")?;
                Ok(self.mk_pat(start, PatKind::MatchSequence { patterns }))
            }
            TokenKind::LParen => {
                self.advance();
                let patterns = self.parse_sequence_items(TokenKind::RParen)?;
                self.expect(TokenKind::RParen, "')'")?;
                // A parenthesized single pattern is just grouping.
                if patterns.len() == 1 && !matches!(patterns[0].kind, PatKind::MatchStar { .. }) {
                    Ok(patterns[0])
                } else {
                    Ok(self.mk_pat(start, PatKind::MatchSequence { patterns }))
                }
            }
            TokenKind::LBrace => self.parse_mapping_pattern(start),
            TokenKind::Star => {
                self.advance();
                let name_token = self.expect(TokenKind::Identifier, "a name after '*'")?;
                let text = self.text(&name_token);
                let name = if text == "_" { None } else { Some(name_token.lexeme) };
                Ok(self.mk_pat(start, PatKind::MatchStar { name }))
            }
            _ => Err(self.expected("a pattern")),
        }
    }

    /// An identifier opens a capture, a dotted value pattern, or a class
    /// pattern.
    fn parse_name_pattern(&mut self, name: Symbol, start: Loc) -> ParseResult<PatRef<'a>> {
        self.advance();

        let mut cls = self.mk(
            start,
            ExprKind::Name { id: name, ctx: Cell::new(ExprContext::Load), varid: Cell::new(-1) },
        );

        let mut dotted = false;
        while self.at(TokenKind::Dot) {
            dotted = true;
            self.advance();
            let attr = self.expect(TokenKind::Identifier, "an attribute name")?.lexeme;
            cls = self.mk(
                start,
                ExprKind::Attribute {
                    value: cls,
                    attr,
                    ctx: Cell::new(ExprContext::Load),
                    offset: Cell::new(-1),
                },
            );
        }

        if self.at(TokenKind::LParen) {
            return self.parse_class_pattern(cls, start);
        }
        if dotted {
            return Ok(self.mk_pat(start, PatKind::MatchValue { value: cls }));
        }
        Ok(self.mk_pat(start, PatKind::MatchAs { pattern: None, name: Some(name) }))
    }

    /// `Cls(p, q, attr=r)`
    fn parse_class_pattern(&mut self, cls: crate::ast::expr::ExprRef<'a>, start: Loc) -> ParseResult<PatRef<'a>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut patterns: Vec<PatRef<'a>> = Vec::new();
        let mut kwd_attrs: Vec<Symbol> = Vec::new();
        let mut kwd_patterns: Vec<PatRef<'a>> = Vec::new();

        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Identifier) && self.peek().kind == TokenKind::Assign {
                let attr = self.tok().lexeme;
                self.advance();
                self.advance();
                kwd_attrs.push(attr);
                kwd_patterns.push(self.parse_pattern()?);
            } else {
                patterns.push(self.parse_pattern()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        Ok(self.mk_pat(
            start,
            PatKind::MatchClass {
                cls,
                patterns: self.arena.alloc_slice(patterns),
                kwd_attrs: self.arena.alloc_slice(kwd_attrs),
                kwd_patterns: self.arena.alloc_slice(kwd_patterns),
            },
        ))
    }

    fn parse_sequence_items(&mut self, close: TokenKind) -> ParseResult<&'a [PatRef<'a>]> {
        let mut patterns: Vec<PatRef<'a>> = Vec::new();
        while !self.at(close) && !self.at(TokenKind::Eof) {
            patterns.push(self.parse_pattern()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(self.arena.alloc_slice(patterns))
    }

    /// `{key: p, ..., **rest}`
    fn parse_mapping_pattern(&mut self, start: Loc) -> ParseResult<PatRef<'a>> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut keys = Vec::new();
        let mut patterns: Vec<PatRef<'a>> = Vec::new();
        let mut rest = None;

        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::DoubleStar) {
                self.advance();
                rest = Some(self.expect(TokenKind::Identifier, "a name after '**'")?.lexeme);
            } else {
                keys.push(self.parse_expr_prec(7)?);
                self.expect(TokenKind::Colon, "':' in mapping pattern")?;
                patterns.push(self.parse_pattern()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(self.mk_pat(
            start,
            PatKind::MatchMapping {
                keys: self.arena.alloc_slice(keys),
                patterns: self.arena.alloc_slice(patterns),
                rest,
            },
        ))
    }
}
