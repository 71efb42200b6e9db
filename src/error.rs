//! The diagnostic model.
//!
//! Parse, sema and runtime errors all flow through [`Diagnostic`]s
//! collected in a [`DiagnosticSink`]; nothing in the pipeline aborts on
//! first error. The sink keeps a ring of rendered lines that the REPL's
//! `%log` meta-command replays.

use thiserror::Error;

use crate::ast::Loc;
use crate::style;

/// The user-visible error kinds.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DiagnosticKind {
    /// Unexpected token; recoverable, parsing continues with sentinels.
    #[error("expected {expected}, found {found}")]
    ParseError { expected: String, found: String },

    /// A parse error no recovery applies to.
    #[error("invalid syntax: {0}")]
    SyntaxError(String),

    #[error("name '{name}' is not defined")]
    NameError { name: String },

    #[error("{0}")]
    TypeError(String),

    #[error("'{class_name}' object has no attribute '{attr}'")]
    AttributeError { class_name: String, attr: String },

    #[error("unsupported operand type(s) for {op}: '{lhs}' and '{rhs}'")]
    UnsupportedOperand { op: String, lhs: String, rhs: String },

    #[error("no module named '{0}'")]
    ModuleNotFoundError(String),

    #[error("cannot import name '{name}' from '{module}'")]
    ImportError { name: String, module: String },

    #[error("{0}")]
    RuntimeError(String),
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::ParseError { .. } => "ParseError",
            DiagnosticKind::SyntaxError(_) => "SyntaxError",
            DiagnosticKind::NameError { .. } => "NameError",
            DiagnosticKind::TypeError(_) => "TypeError",
            DiagnosticKind::AttributeError { .. } => "AttributeError",
            DiagnosticKind::UnsupportedOperand { .. } => "UnsupportedOperand",
            DiagnosticKind::ModuleNotFoundError(_) => "ModuleNotFoundError",
            DiagnosticKind::ImportError { .. } => "ImportError",
            DiagnosticKind::RuntimeError(_) => "RuntimeError",
        }
    }

    /// Parse-family errors map to exit code 2, everything else to 1.
    pub fn is_parse(&self) -> bool {
        matches!(self, DiagnosticKind::ParseError { .. } | DiagnosticKind::SyntaxError(_))
    }
}

/// One reported error with its source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub loc: Loc,
    pub file: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, loc: Loc, file: impl Into<String>) -> Self {
        Diagnostic { kind, loc, file: file.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Renders `{file}:{line}:{col}: {kind}: {message}` plus a source
    /// snippet with a caret underline when the source is available.
    pub fn render(&self, source: Option<&str>) -> String {
        let header = format!(
            "{}:{}:{}: {}: {}",
            self.file,
            self.loc.lineno,
            self.loc.col,
            style::error_label(self.kind.name()),
            self.kind
        );

        let mut result = header;

        if let Some(source) = source {
            if let Some(line) = source.lines().nth(self.loc.lineno.saturating_sub(1) as usize) {
                let width = (self.loc.span.end - self.loc.span.start).max(1).min(line.len().max(1));
                let carets = format!("{}{}", " ".repeat(self.loc.col as usize), "^".repeat(width));
                let line_num = style::gutter(&format!("{:4}", self.loc.lineno));
                let pipe = style::gutter("|");
                result.push_str(&format!(
                    "\n{} {} {}\n     {} {}",
                    line_num,
                    pipe,
                    line,
                    pipe,
                    style::underline(&carets)
                ));
            }
        }

        if let Some(hint) = &self.hint {
            result.push_str(&format!("\n     {} {}: {}", style::gutter("|"), style::hint("help"), hint));
        }

        result
    }
}

/// Collects diagnostics across passes.
///
/// The rendered-line ring holds the most recent output for `%log`.
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    log: Vec<String>,
}

const LOG_CAPACITY: usize = 64;

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink { diagnostics: Vec::new(), log: Vec::new() }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.log.len() == LOG_CAPACITY {
            self.log.remove(0);
        }
        self.log.push(diagnostic.render(None));
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn has_parse_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.kind.is_parse())
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Recent rendered diagnostics, oldest first.
    pub fn recent_log(&self) -> &[String] {
        &self.log
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }

    /// Prints every diagnostic with its source snippet to stderr.
    pub fn show_diagnostics(&self, source: Option<&str>) {
        for diagnostic in &self.diagnostics {
            eprintln!("{}", diagnostic.render(source));
        }
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    fn loc_at(line: u32, col: u32, span: Span) -> Loc {
        Loc { span, lineno: line, col, end_lineno: line }
    }

    #[test]
    fn render_includes_position_and_kind() {
        let diag = Diagnostic::new(
            DiagnosticKind::NameError { name: "x".to_string() },
            loc_at(3, 6, Span::new(10, 11)),
            "demo.py",
        );
        let rendered = diag.render(None);
        assert!(rendered.contains("demo.py:3:6"));
        assert!(rendered.contains("NameError"));
        assert!(rendered.contains("name 'x' is not defined"));
    }

    #[test]
    fn render_underlines_snippet() {
        let source = "a = 1\nprint(x)\n";
        let diag = Diagnostic::new(
            DiagnosticKind::NameError { name: "x".to_string() },
            loc_at(2, 6, Span::new(12, 13)),
            "demo.py",
        );
        let rendered = diag.render(Some(source));
        assert!(rendered.contains("print(x)"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn render_appends_hint() {
        let diag = Diagnostic::new(
            DiagnosticKind::NameError { name: "prnt".to_string() },
            loc_at(1, 0, Span::new(0, 4)),
            "demo.py",
        )
        .with_hint("did you mean 'print'?");
        assert!(diag.render(None).contains("did you mean 'print'?"));
    }

    #[test]
    fn sink_collects_and_reports() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.has_errors());
        sink.push(Diagnostic::new(
            DiagnosticKind::SyntaxError("unterminated string".to_string()),
            loc_at(1, 0, Span::default()),
            "demo.py",
        ));
        assert!(sink.has_errors());
        assert!(sink.has_parse_errors());
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn parse_kinds_are_classified() {
        let parse = DiagnosticKind::ParseError { expected: "':'".to_string(), found: "newline".to_string() };
        let name = DiagnosticKind::NameError { name: "x".to_string() };
        assert!(parse.is_parse());
        assert!(!name.is_parse());
    }

    #[test]
    fn log_keeps_recent_lines() {
        let mut sink = DiagnosticSink::new();
        for i in 0..70 {
            sink.push(Diagnostic::new(
                DiagnosticKind::RuntimeError(format!("error {i}")),
                loc_at(1, 0, Span::default()),
                "demo.py",
            ));
        }
        assert_eq!(sink.recent_log().len(), 64);
        assert!(sink.recent_log().last().unwrap().contains("error 69"));
    }
}
