//! String interning for O(1) identifier comparison.
//!
//! Every identifier, keyword and string literal that flows through the
//! pipeline is interned once and handled as a [`Symbol`] afterwards.
//! Symbols are lightweight integer handles: equality is integer equality
//! regardless of string length, and the integer doubles as a stable index
//! for dense side tables (bindings, class attributes).
//!
//! ## Example
//!
//! ```
//! use pythia::intern::{Interner, Symbol};
//!
//! let mut interner = Interner::new();
//! let a = interner.intern("lineno");
//! let b = interner.intern("lineno");
//! assert_eq!(a, b);
//! assert_eq!(interner.resolve(a), "lineno");
//! assert_eq!(interner.resolve(Symbol::EMPTY), "");
//! ```
//!
//! Symbol `0` is reserved for the empty string. Ids grow monotonically and
//! are never reused within a session; resolving an id the interner never
//! produced yields the empty string rather than panicking, so stale handles
//! degrade to harmless no-ops in diagnostics.

use std::collections::HashMap;

/// A lightweight handle to an interned string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// The empty string symbol, always at index 0.
    pub const EMPTY: Symbol = Symbol(0);

    /// Returns the internal index of this symbol, usable for dense storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for Symbol {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Usage counters kept per interned string.
///
/// `created` counts every intern request that returned this symbol;
/// `live` tracks retain/release pairs. Both feed the `%globals` report in
/// the REPL and are purely diagnostic.
#[derive(Debug, Default, Clone, Copy)]
struct UseCount {
    created: u64,
    live: i64,
}

/// A string interner with per-entry usage statistics.
///
/// The interner is an explicit handle owned by the embedding context and
/// threaded by `&mut`; there is no process-wide table.
pub struct Interner {
    map: HashMap<String, Symbol>,
    vec: Vec<String>,
    counts: Vec<UseCount>,
}

impl Interner {
    /// Creates an interner with only the empty string pre-interned.
    pub fn new() -> Self {
        Interner {
            map: HashMap::new(),
            vec: vec![String::new()],
            counts: vec![UseCount::default()],
        }
    }

    /// Interns a string, returning its symbol.
    ///
    /// Returns the existing symbol if the string was already interned.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.map.get(s) {
            if sym != Symbol::EMPTY {
                self.counts[sym.index()].created += 1;
            }
            return sym;
        }
        let sym = Symbol(self.vec.len() as u32);
        self.vec.push(s.to_string());
        self.counts.push(UseCount { created: 1, live: 0 });
        self.map.insert(s.to_string(), sym);
        sym
    }

    /// Returns the string for the given symbol.
    ///
    /// Unknown symbols resolve to the empty string.
    pub fn resolve(&self, sym: Symbol) -> &str {
        self.vec.get(sym.index()).map(String::as_str).unwrap_or("")
    }

    /// Looks up an existing interned string without creating a new entry.
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.map.get(s).copied()
    }

    /// Marks one more live use of the symbol.
    ///
    /// The empty string never gains a nonzero live count.
    pub fn retain(&mut self, sym: Symbol) {
        if sym != Symbol::EMPTY {
            if let Some(count) = self.counts.get_mut(sym.index()) {
                count.live += 1;
            }
        }
    }

    /// Releases one live use of the symbol.
    pub fn release(&mut self, sym: Symbol) {
        if sym != Symbol::EMPTY {
            if let Some(count) = self.counts.get_mut(sym.index()) {
                count.live -= 1;
            }
        }
    }

    /// Number of live uses recorded for the symbol.
    pub fn live_uses(&self, sym: Symbol) -> i64 {
        self.counts.get(sym.index()).map(|c| c.live).unwrap_or(0)
    }

    /// Number of intern requests that returned the symbol.
    pub fn total_uses(&self, sym: Symbol) -> u64 {
        self.counts.get(sym.index()).map(|c| c.created).unwrap_or(0)
    }

    /// Returns the number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.vec.len()
    }

    /// Returns `true` if only the empty string is present.
    pub fn is_empty(&self) -> bool {
        self.vec.len() <= 1
    }

    /// Writes a usage report, most-requested first.
    pub fn report(&self, out: &mut dyn std::fmt::Write) -> std::fmt::Result {
        let mut rows: Vec<(usize, &UseCount)> = self.counts.iter().enumerate().skip(1).collect();
        rows.sort_by(|a, b| b.1.created.cmp(&a.1.created));
        writeln!(out, "{:>6}  {:>8}  {:>6}  string", "id", "requests", "live")?;
        for (id, count) in rows {
            writeln!(out, "{:>6}  {:>8}  {:>6}  {}", id, count.created, count.live, self.vec[id])?;
        }
        Ok(())
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience trait for comparing a [`Symbol`] to a string literal.
pub trait SymbolEq {
    /// Returns `true` if this symbol resolves to the given string.
    fn is(&self, interner: &Interner, s: &str) -> bool;
}

impl SymbolEq for Symbol {
    #[inline]
    fn is(&self, interner: &Interner, s: &str) -> bool {
        interner.resolve(*self) == s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_returns_same_symbol_for_same_string() {
        let mut interner = Interner::new();
        let s1 = interner.intern("hello");
        let s2 = interner.intern("hello");
        assert_eq!(s1, s2);
    }

    #[test]
    fn intern_returns_different_symbols_for_different_strings() {
        let mut interner = Interner::new();
        assert_ne!(interner.intern("hello"), interner.intern("world"));
    }

    #[test]
    fn resolve_returns_original_string() {
        let mut interner = Interner::new();
        let sym = interner.intern("def");
        assert_eq!(interner.resolve(sym), "def");
    }

    #[test]
    fn empty_symbol_resolves_to_empty_string() {
        let interner = Interner::new();
        assert_eq!(interner.resolve(Symbol::EMPTY), "");
    }

    #[test]
    fn unknown_symbol_resolves_to_empty_string() {
        let interner = Interner::new();
        let stale = Symbol(999);
        assert_eq!(interner.resolve(stale), "");
    }

    #[test]
    fn ids_are_monotonic() {
        let mut interner = Interner::new();
        let a = interner.intern("a");
        let b = interner.intern("b");
        let c = interner.intern("c");
        assert!(a.index() < b.index());
        assert!(b.index() < c.index());
    }

    #[test]
    fn total_uses_counts_repeat_requests() {
        let mut interner = Interner::new();
        let sym = interner.intern("x");
        interner.intern("x");
        interner.intern("x");
        assert_eq!(interner.total_uses(sym), 3);
    }

    #[test]
    fn retain_release_balance_live_count() {
        let mut interner = Interner::new();
        let sym = interner.intern("name");
        interner.retain(sym);
        interner.retain(sym);
        assert_eq!(interner.live_uses(sym), 2);
        interner.release(sym);
        assert_eq!(interner.live_uses(sym), 1);
    }

    #[test]
    fn empty_string_never_gains_live_count() {
        let mut interner = Interner::new();
        interner.retain(Symbol::EMPTY);
        assert_eq!(interner.live_uses(Symbol::EMPTY), 0);
    }

    #[test]
    fn lookup_does_not_create() {
        let mut interner = Interner::new();
        assert!(interner.lookup("missing").is_none());
        let sym = interner.intern("present");
        assert_eq!(interner.lookup("present"), Some(sym));
    }

    #[test]
    fn symbol_is_matches_interned_string() {
        let mut interner = Interner::new();
        let sym = interner.intern("while");
        assert!(sym.is(&interner, "while"));
        assert!(!sym.is(&interner, "for"));
    }

    #[test]
    fn report_lists_entries() {
        let mut interner = Interner::new();
        interner.intern("alpha");
        interner.intern("alpha");
        interner.intern("beta");
        let mut out = String::new();
        interner.report(&mut out).unwrap();
        assert!(out.contains("alpha"));
        assert!(out.contains("beta"));
    }
}
