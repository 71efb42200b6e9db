//! Pythia: a compiler front-end and tree-walking interpreter for a
//! Python-like, dynamically-typed language.
//!
//! The pipeline runs source bytes through a character stream, the lexer
//! (with indent/dedent synthesis), a recursive-descent parser with
//! Pratt-style precedence climbing, semantic analysis (name resolution
//! with de Bruijn-like varids, type inference, operator and import
//! resolution, class attribute layout), and finally a tree-walking
//! evaluator over a polymorphic tagged [`Value`](value::Value).
//!
//! ## Example
//!
//! ```
//! use pythia::arena::Arena;
//! use pythia::builtins::NativeOperators;
//! use pythia::importlib::ImportLib;
//! use pythia::intern::Interner;
//! use pythia::interpreter::Interpreter;
//! use pythia::sema::types::TypeRegistry;
//! use pythia::sema::SemanticAnalyser;
//!
//! let arena = Arena::new();
//! let transient = Arena::new();
//! let mut interner = Interner::new();
//! let (module, diagnostics) = pythia::parse_one("print(2 + 3)\n", "demo", &arena, &mut interner);
//! assert!(!diagnostics.has_errors());
//!
//! let mut registry = TypeRegistry::new(&mut interner);
//! let mut imports = ImportLib::new();
//! let operators = NativeOperators::new();
//! let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
//! sema.exec_module(module);
//! assert!(!sema.has_errors());
//! drop(sema);
//!
//! let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
//! interp.eval_module(module);
//! assert_eq!(interp.sink.lines, vec!["5".to_string()]);
//! ```

pub mod arena;
pub mod ast;
pub mod buffer;
pub mod builtins;
pub mod cli;
pub mod error;
pub mod importlib;
pub mod intern;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod style;
pub mod suggest;
pub mod token;
pub mod value;

pub use arena::Arena;
pub use ast::Module;
pub use error::{Diagnostic, DiagnosticKind, DiagnosticSink};
pub use intern::{Interner, Symbol, SymbolEq};
pub use interpreter::Interpreter;
pub use lexer::{Lexer, ReplayLexer, TokenStream};
pub use parser::Parser;
pub use sema::SemanticAnalyser;
pub use value::{Value, ValueTag};

use buffer::StringBuffer;

/// Parses one source string into a module, returning the parse
/// diagnostics alongside. The entry point the REPL and embedders drive.
pub fn parse_one<'a>(
    source: &str,
    name: &str,
    arena: &'a Arena,
    interner: &mut Interner,
) -> (&'a Module<'a>, DiagnosticSink) {
    let lexer = Lexer::new(StringBuffer::with_name(source.to_string(), format!("<{}>", name)));
    let mut parser = Parser::new(lexer, interner, arena);
    let module = parser.parse_module(name);
    let errors = parser.take_errors();
    (module, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_one_returns_module_and_clean_sink() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let (module, diagnostics) = parse_one("x = 1\n", "unit", &arena, &mut interner);
        assert_eq!(module.body.len(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn parse_one_collects_errors_without_panicking() {
        let arena = Arena::new();
        let mut interner = Interner::new();
        let (_, diagnostics) = parse_one("def (:\n", "unit", &arena, &mut interner);
        assert!(diagnostics.has_errors());
    }
}
