//! Bump allocation backing the AST.
//!
//! One [`Arena`] owns every node of a module: allocation hands out plain
//! `&'a` references, and the whole tree is reclaimed in a single shot
//! when the arena goes away. "Parent owns child" is therefore a property
//! of the reference graph — the parent holds the only path to its
//! children inside the same arena — rather than per-node bookkeeping.
//!
//! Unlike a typed pool, the arena is deliberately untyped: expressions,
//! statements, patterns and slices of any of them interleave in the same
//! bump region, which is what a sum-typed tree wants.
//!
//! ## Example
//!
//! ```
//! use pythia::arena::Arena;
//!
//! let arena = Arena::new();
//! let lineno = arena.alloc(7u32);
//! let names = arena.alloc_slice(["left", "right"]);
//! assert_eq!(*lineno, 7);
//! assert_eq!(names.len(), 2);
//! ```
//!
//! The bump allocator never runs destructors, so nodes must not own
//! droppable payloads: strings are interned
//! [`Symbol`](crate::intern::Symbol)s and sequences are arena slices.

use bumpalo::Bump;

/// An untyped bump arena for AST nodes, slices and strings.
pub struct Arena {
    bump: Bump,
}

impl Arena {
    pub fn new() -> Self {
        Arena { bump: Bump::new() }
    }

    /// Moves a value into the arena; the reference stays valid for as
    /// long as the arena does, across any number of later allocations.
    pub fn alloc<T>(&self, value: T) -> &T {
        self.bump.alloc(value)
    }

    /// Collects an iterator into an arena-owned slice. The exact-size
    /// bound lets the arena reserve the slice in one step.
    pub fn alloc_slice<T, I>(&self, items: I) -> &[T]
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        self.bump.alloc_slice_fill_iter(items)
    }

    /// Copies a string into the arena.
    pub fn alloc_str(&self, s: &str) -> &str {
        self.bump.alloc_str(s)
    }

    /// Bytes currently allocated, for the `internal` diagnostic dump.
    pub fn allocated_bytes(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Drops every allocation at once but keeps the capacity, so a
    /// session can reuse the arena between inputs.
    pub fn reset(&mut self) {
        self.bump.reset();
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}
