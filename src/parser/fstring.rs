//! f-string scanning.
//!
//! The lexer hands over the raw body between the quotes; this pass splits
//! it into alternating literal fragments and `{expr[!conv][:format]}`
//! interpolation sites. Interpolated expressions are sub-parsed with a
//! nested lexer over the fragment text, allocating into the same arena as
//! the surrounding module.

use super::{ParseResult, Parser};
use crate::ast::expr::{ExprKind, ExprRef};
use crate::ast::{ConstantValue, Loc};
use crate::buffer::StringBuffer;
use crate::lexer::{Lexer, TokenStream};
use crate::token::Token;

impl<'a, 'i, L: TokenStream> Parser<'a, 'i, L> {
    pub(crate) fn parse_fstring(&mut self, token: &Token, start: Loc) -> ParseResult<ExprRef<'a>> {
        let body = self.interner.resolve(token.lexeme).to_string();
        let mut values: Vec<ExprRef<'a>> = Vec::new();
        let mut literal = String::new();
        let chars: Vec<char> = body.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '{' => {
                    if !literal.is_empty() {
                        values.push(self.literal_fragment(&literal, start));
                        literal.clear();
                    }
                    let (site, consumed) = self.scan_interpolation(&chars[i + 1..], start)?;
                    values.push(site);
                    i += consumed + 1;
                }
                '}' => {
                    return Err(self.expected("'{' before '}' in f-string"));
                }
                _ => {
                    literal.push(c);
                    i += 1;
                }
            }
        }

        if !literal.is_empty() {
            values.push(self.literal_fragment(&literal, start));
        }

        Ok(self.mk(start, ExprKind::JoinedStr { values: self.arena.alloc_slice(values) }))
    }

    fn literal_fragment(&mut self, text: &str, start: Loc) -> ExprRef<'a> {
        let sym = self.intern(text);
        let kind = self.intern("str");
        self.mk(start, ExprKind::Constant { value: ConstantValue::Str(sym), kind: Some(kind) })
    }

    /// Scans one interpolation site starting just after `{`; returns the
    /// node and the number of characters consumed including the `}`.
    fn scan_interpolation(&mut self, rest: &[char], start: Loc) -> ParseResult<(ExprRef<'a>, usize)> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut end = None;

        for (idx, &c) in rest.iter().enumerate() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '{' | '[' | '(' => depth += 1,
                    '}' if depth == 0 => {
                        end = Some(idx);
                        break;
                    }
                    '}' | ']' | ')' => depth = depth.saturating_sub(1),
                    _ => {}
                },
            }
        }

        let end = end.ok_or_else(|| self.expected("'}' closing f-string expression"))?;
        let inner: String = rest[..end].iter().collect();

        // Split off `:format` at depth zero, then a trailing `!conv`.
        let mut split = None;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        for (idx, c) in inner.char_indices() {
            match quote {
                Some(q) => {
                    if c == q {
                        quote = None;
                    }
                }
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '{' | '[' | '(' => depth += 1,
                    '}' | ']' | ')' => depth = depth.saturating_sub(1),
                    ':' if depth == 0 => {
                        split = Some(idx);
                        break;
                    }
                    _ => {}
                },
            }
        }

        let (expr_text, format_spec) = match split {
            Some(idx) => (inner[..idx].to_string(), Some(inner[idx + 1..].to_string())),
            None => (inner, None),
        };

        let (expr_text, conversion) = match expr_text.char_indices().rev().nth(1) {
            Some((idx, '!')) => {
                let conv = expr_text.chars().last().expect("checked above: len >= 2");
                if matches!(conv, 's' | 'r' | 'a') {
                    (expr_text[..idx].to_string(), Some(conv))
                } else {
                    (expr_text, None)
                }
            }
            _ => (expr_text, None),
        };

        let value = self.subparse_expression(&expr_text)?;
        let format_spec = format_spec.map(|spec| self.intern(&spec));
        let site = self.mk(start, ExprKind::FormattedValue { value, conversion, format_spec });
        Ok((site, end + 1))
    }

    /// Parses an expression fragment with a nested lexer over its text.
    fn subparse_expression(&mut self, text: &str) -> ParseResult<ExprRef<'a>> {
        let lexer = Lexer::new(StringBuffer::with_name(text.to_string(), self.file.clone()));
        let mut sub = Parser::new(lexer, &mut *self.interner, self.arena);
        let result = sub.parse_expression();
        let errors = sub.take_errors();
        for diagnostic in errors.iter() {
            self.errors.push(diagnostic.clone());
        }
        match result {
            Ok(expr) => Ok(expr),
            Err(diagnostic) => Err(diagnostic),
        }
    }
}
