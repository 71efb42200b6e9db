//! Terminal styling for diagnostics and the REPL.
//!
//! One function per *role* rather than per color: call sites say what a
//! piece of text means (an error label, a gutter, a hint) and the escape
//! codes live in one place. Every function closes with a reset.

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const BLUE: &str = "\x1b[34m";
const CYAN: &str = "\x1b[36m";

fn wrap(codes: &str, text: &str) -> String {
    format!("{}{}{}", codes, text, RESET)
}

/// The label in front of an error kind: bold red.
pub fn error_label(text: &str) -> String {
    format!("{}{}{}{}", BOLD, RED, text, RESET)
}

/// Line numbers and the pipes framing a source snippet.
pub fn gutter(text: &str) -> String {
    wrap(BLUE, text)
}

/// The caret underline beneath the offending span.
pub fn underline(text: &str) -> String {
    wrap(RED, text)
}

/// Inline hints: the `help:` label, highlighted meta-commands.
pub fn hint(text: &str) -> String {
    wrap(CYAN, text)
}

/// Section headings in the `internal` dump and `%globals` output.
pub fn heading(text: &str) -> String {
    wrap(BOLD, text)
}

/// The REPL prompt.
pub fn prompt(text: &str) -> String {
    wrap(BLUE, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_resets_at_the_end() {
        for styled in [
            error_label("NameError"),
            gutter("   3 |"),
            underline("^^^"),
            hint("help"),
            heading("== tree =="),
            prompt(">>> "),
        ] {
            assert!(styled.ends_with(RESET), "missing reset in {styled:?}");
        }
    }

    #[test]
    fn error_label_is_bold_and_red() {
        let styled = error_label("TypeError");
        assert!(styled.contains(BOLD));
        assert!(styled.contains(RED));
        assert!(styled.contains("TypeError"));
    }

    #[test]
    fn roles_keep_their_text_verbatim() {
        assert!(gutter("  12 |").contains("  12 |"));
        assert!(hint("%exit").contains("%exit"));
    }
}
