//! Command-line interface: `run`, `repl` and `internal`.
//!
//! Exit codes follow the pipeline stage that failed: `2` for parse
//! errors, `1` for sema or runtime errors, `0` otherwise.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser as ClapParser, Subcommand};

use crate::arena::Arena;
use crate::ast::unparse::unparse_module;
use crate::buffer::{CharStream, ConsoleBuffer, FileBuffer, FilterAction, StringBuffer};
use crate::builtins::NativeOperators;
use crate::importlib::ImportLib;
use crate::intern::Interner;
use crate::interpreter::Interpreter;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::sema::types::TypeRegistry;
use crate::sema::SemanticAnalyser;
use crate::style;
use crate::value::OutputSink;

#[derive(ClapParser)]
#[command(name = "pythia")]
#[command(about = "The Pythia language", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse, analyze and evaluate a script
    Run {
        /// Script path
        file: PathBuf,
    },
    /// Interactive session (`%globals`, `%log`, `%exit` meta-commands)
    Repl,
    /// Parse and analyze only, dumping the tree and diagnostics
    Internal {
        /// Script path
        file: PathBuf,
    },
}

/// Entry point; returns the process exit code.
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run { file } => cmd_run(&file),
        Commands::Repl => cmd_repl(),
        Commands::Internal { file } => cmd_internal(&file),
    }
}

fn cmd_run(file: &Path) -> i32 {
    let buffer = match FileBuffer::open(file) {
        Ok(buffer) => buffer,
        Err(err) => {
            eprintln!("{}: cannot open {}: {}", style::error_label("error"), file.display(), err);
            return 1;
        }
    };
    let source = buffer.source().to_string();

    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    if let Some(dir) = file.parent() {
        imports.add_to_path(dir.to_path_buf());
    }
    let operators = NativeOperators::new();

    let lexer = Lexer::new(buffer);
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module_name = file.file_stem().and_then(|s| s.to_str()).unwrap_or("main").to_string();
    let module = parser.parse_module(&module_name);
    let parse_errors = parser.take_errors();
    if parse_errors.has_errors() {
        parse_errors.show_diagnostics(Some(&source));
        return 2;
    }

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    if sema.has_errors() {
        sema.errors.show_diagnostics(Some(&source));
        return 1;
    }
    drop(sema);

    let mut interp = Interpreter::new(&mut interner, &registry, &imports, &transient);
    interp.sink = OutputSink::echoing();
    interp.eval_module(module);
    if interp.errors.has_errors() {
        interp.errors.show_diagnostics(Some(&source));
        return 1;
    }
    0
}

fn cmd_internal(file: &Path) -> i32 {
    let buffer = match FileBuffer::open(file) {
        Ok(buffer) => buffer,
        Err(err) => {
            eprintln!("{}: cannot open {}: {}", style::error_label("error"), file.display(), err);
            return 1;
        }
    };
    let source = buffer.source().to_string();

    let arena = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    if let Some(dir) = file.parent() {
        imports.add_to_path(dir.to_path_buf());
    }
    let operators = NativeOperators::new();

    let lexer = Lexer::new(buffer);
    let mut parser = Parser::new(lexer, &mut interner, &arena);
    let module_name = file.file_stem().and_then(|s| s.to_str()).unwrap_or("main").to_string();
    let module = parser.parse_module(&module_name);
    let parse_errors = parser.take_errors();

    let mut sema = SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators);
    sema.exec_module(module);
    let exports = sema.exports();
    let sema_errors = std::mem::take(&mut sema.errors);
    drop(sema);

    println!("{}", style::heading("== tree =="));
    println!("{}", unparse_module(module, &interner));

    println!("{}", style::heading("== bindings =="));
    for (index, (name, ty)) in exports.iter().enumerate() {
        println!(
            "{:>4}  {:<24} {}",
            index,
            interner.resolve(*name),
            registry.name(*ty, &interner)
        );
    }

    println!("{}", style::heading("== stats =="));
    println!("interned strings: {}", interner.len());
    println!("classes: {}", registry.class_count());
    println!("arena bytes: {}", arena.allocated_bytes());

    println!("{}", style::heading("== interner =="));
    let mut report = String::new();
    if interner.report(&mut report).is_ok() {
        print!("{}", report);
    }

    if parse_errors.has_errors() {
        parse_errors.show_diagnostics(Some(&source));
        return 2;
    }
    if sema_errors.has_errors() {
        sema_errors.show_diagnostics(Some(&source));
        return 1;
    }
    0
}

/// Reads one line from the console stream, or `None` at end of input.
fn read_line(console: &mut ConsoleBuffer) -> Option<String> {
    let mut line = String::new();
    loop {
        match console.peek() {
            None => {
                if line.is_empty() {
                    return None;
                }
                return Some(line);
            }
            Some('\n') => {
                console.consume();
                return Some(line);
            }
            Some(c) => {
                line.push(c);
                console.consume();
            }
        }
    }
}

/// Reads one logical input: a single line, or a block header followed by
/// indented lines up to a blank line.
fn read_unit(console: &mut ConsoleBuffer, in_block: &Rc<std::cell::Cell<bool>>) -> Option<String> {
    let first = read_line(console)?;
    if !first.trim_end().ends_with(':') {
        return Some(first);
    }

    in_block.set(true);
    let mut unit = first;
    unit.push('\n');
    loop {
        let Some(line) = read_line(console) else { break };
        if line.trim().is_empty() {
            break;
        }
        unit.push_str(&line);
        unit.push('\n');
    }
    in_block.set(false);
    Some(unit)
}

fn cmd_repl() -> i32 {
    println!("pythia {} — interactive session ({} to leave)", env!("CARGO_PKG_VERSION"), style::hint("%exit"));

    let arena = Arena::new();
    let transient = Arena::new();
    let mut interner = Interner::new();
    let mut registry = TypeRegistry::new(&mut interner);
    let mut imports = ImportLib::new();
    let operators = NativeOperators::new();

    let mut bindings = None;
    let mut globals: Option<Vec<(crate::intern::Symbol, crate::value::Value<'_>)>> = None;
    let mut session_log: Vec<String> = Vec::new();

    // Meta-commands are intercepted by the console filter and drained by
    // the loop, which has the session state the commands need.
    let meta: Rc<std::cell::RefCell<Vec<String>>> = Rc::new(std::cell::RefCell::new(Vec::new()));
    let in_block = Rc::new(std::cell::Cell::new(false));

    let mut console = ConsoleBuffer::new();
    console.set_filter({
        let meta = meta.clone();
        move |line| {
            if line.starts_with('%') {
                meta.borrow_mut().push(line.to_string());
                FilterAction::Consumed
            } else {
                FilterAction::Keep
            }
        }
    });
    console.set_on_next_line({
        let in_block = in_block.clone();
        move |_| {
            if in_block.get() {
                print!("{}", style::prompt("... "));
            } else {
                print!("{}", style::prompt(">>> "));
            }
            std::io::stdout().flush().ok();
        }
    });

    loop {
        let unit = read_unit(&mut console, &in_block);

        // Handle any meta-commands the filter intercepted.
        let commands: Vec<String> = meta.borrow_mut().drain(..).collect();
        for command in commands {
            let command = command.trim();
            if command == "%exit" || command == "%quit" {
                return 0;
            }
            if command == "%globals" {
                if let Some(globals) = &globals {
                    print_globals(globals, &interner);
                } else {
                    println!("(empty environment)");
                }
                continue;
            }
            if command.starts_with("%log") {
                for line in &session_log {
                    println!("{}", line);
                }
                continue;
            }
            println!("unknown meta-command: {}", command);
        }

        let Some(unit) = unit else { return 0 };
        if unit.trim().is_empty() {
            continue;
        }

        // Parse this input.
        let lexer = Lexer::interactive(StringBuffer::with_name(unit.clone(), "<console>"));
        let mut parser = Parser::new(lexer, &mut interner, &arena);
        let module = parser.parse_module("console");
        let parse_errors = parser.take_errors();
        if parse_errors.has_errors() {
            for diagnostic in parse_errors.iter() {
                let rendered = diagnostic.render(Some(&unit));
                println!("{}", rendered);
                session_log.push(rendered);
            }
            continue;
        }

        // Analyze against the session bindings.
        let mut sema = match bindings.take() {
            Some(bindings) => {
                SemanticAnalyser::resume(&arena, &mut interner, &mut registry, &mut imports, &operators, bindings)
            }
            None => SemanticAnalyser::new(&arena, &mut interner, &mut registry, &mut imports, &operators),
        };
        sema.exec_module(module);
        let had_sema_errors = sema.has_errors();
        let sema_errors = std::mem::take(&mut sema.errors);
        bindings = Some(sema.into_bindings());
        if had_sema_errors {
            for diagnostic in sema_errors.iter() {
                let rendered = diagnostic.render(Some(&unit));
                println!("{}", rendered);
                session_log.push(rendered);
            }
            continue;
        }

        // Evaluate against the session environment.
        let mut interp = match globals.take() {
            Some(globals) => Interpreter::resume(&mut interner, &registry, &imports, &transient, globals),
            None => Interpreter::new(&mut interner, &registry, &imports, &transient),
        };
        interp.sink = OutputSink::echoing();
        interp.eval_module(module);
        for diagnostic in interp.errors.iter() {
            let rendered = diagnostic.render(Some(&unit));
            println!("{}", rendered);
            session_log.push(rendered);
        }
        globals = Some(interp.take_globals());
    }
}

fn print_globals(globals: &[(crate::intern::Symbol, crate::value::Value<'_>)], interner: &Interner) {
    println!("{}", style::heading(&format!("{:>4}  {:<24} value", "id", "name")));
    for (index, (name, value)) in globals.iter().enumerate() {
        println!("{:>4}  {:<24} {}", index, interner.resolve(*name), value.to_repr_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_command() {
        let cli = Cli::try_parse_from(["pythia", "run", "script.py"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { .. }));
    }

    #[test]
    fn cli_parses_repl_and_internal() {
        assert!(matches!(
            Cli::try_parse_from(["pythia", "repl"]).unwrap().command,
            Commands::Repl
        ));
        assert!(matches!(
            Cli::try_parse_from(["pythia", "internal", "x.py"]).unwrap().command,
            Commands::Internal { .. }
        ));
    }

    #[test]
    fn cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["pythia", "transmogrify"]).is_err());
    }
}
