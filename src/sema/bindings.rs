//! Name bindings with de Bruijn-like indexing.
//!
//! A binding scope is a flat array of entries; a name's *varid* is its
//! stable global index (scope offset + local position). Entering a
//! function, class or comprehension pushes a nested scope whose offset is
//! the running total, so varids from enclosing scopes stay valid inside.
//! Within one scope the entry array only ever grows.

use crate::ast::expr::ExprRef;
use crate::ast::Loc;
use crate::intern::{Interner, Symbol};

use super::types::TypeId;

/// One resolved name: its defining location, the annotation that typed it
/// (when present), and the inferred type.
pub struct BindingEntry<'a> {
    pub name: Symbol,
    pub loc: Loc,
    pub annotation: Option<ExprRef<'a>>,
    pub ty: TypeId,
}

struct Scope<'a> {
    offset: usize,
    entries: Vec<BindingEntry<'a>>,
    /// Class scopes keep their namespace name for attribute diagnostics.
    namespace: Option<Symbol>,
}

pub struct Bindings<'a> {
    scopes: Vec<Scope<'a>>,
}

impl<'a> Bindings<'a> {
    pub fn new() -> Self {
        Bindings {
            scopes: vec![Scope { offset: 0, entries: Vec::new(), namespace: None }],
        }
    }

    /// Total number of entries across the live scope chain.
    pub fn size(&self) -> usize {
        let last = self.scopes.last().expect("root scope always present");
        last.offset + last.entries.len()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn enter_scope(&mut self, namespace: Option<Symbol>) {
        let offset = self.size();
        self.scopes.push(Scope { offset, entries: Vec::new(), namespace });
    }

    pub fn leave_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn current_namespace(&self) -> Option<Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.namespace)
    }

    /// Adds an entry to the innermost scope, returning its varid.
    pub fn add(&mut self, name: Symbol, loc: Loc, annotation: Option<ExprRef<'a>>, ty: TypeId) -> i32 {
        let scope = self.scopes.last_mut().expect("root scope always present");
        let varid = (scope.offset + scope.entries.len()) as i32;
        scope.entries.push(BindingEntry { name, loc, annotation, ty });
        varid
    }

    /// Resolves a name through the scope chain, innermost first.
    pub fn lookup(&self, name: Symbol) -> Option<(i32, &BindingEntry<'a>)> {
        for scope in self.scopes.iter().rev() {
            if let Some(pos) = scope.entries.iter().rposition(|entry| entry.name == name) {
                return Some(((scope.offset + pos) as i32, &scope.entries[pos]));
            }
        }
        None
    }

    /// Resolves only in the innermost scope.
    pub fn lookup_local(&self, name: Symbol) -> Option<(i32, &BindingEntry<'a>)> {
        let scope = self.scopes.last()?;
        scope
            .entries
            .iter()
            .rposition(|entry| entry.name == name)
            .map(|pos| ((scope.offset + pos) as i32, &scope.entries[pos]))
    }

    /// Resolves only in the module (root) scope.
    pub fn lookup_global(&self, name: Symbol) -> Option<(i32, &BindingEntry<'a>)> {
        let scope = self.scopes.first()?;
        scope
            .entries
            .iter()
            .rposition(|entry| entry.name == name)
            .map(|pos| ((scope.offset + pos) as i32, &scope.entries[pos]))
    }

    pub fn get(&self, varid: i32) -> Option<&BindingEntry<'a>> {
        if varid < 0 {
            return None;
        }
        let varid = varid as usize;
        for scope in self.scopes.iter().rev() {
            if varid >= scope.offset && varid < scope.offset + scope.entries.len() {
                return Some(&scope.entries[varid - scope.offset]);
            }
        }
        None
    }

    pub fn set_type(&mut self, varid: i32, ty: TypeId) {
        if varid < 0 {
            return;
        }
        let varid = varid as usize;
        for scope in self.scopes.iter_mut().rev() {
            if varid >= scope.offset && varid < scope.offset + scope.entries.len() {
                scope.entries[varid - scope.offset].ty = ty;
                return;
            }
        }
    }

    /// Every visible name, for did-you-mean suggestions.
    pub fn visible_names<'s>(&'s self, interner: &'s Interner) -> Vec<&'s str> {
        let mut names = Vec::new();
        for scope in self.scopes.iter().rev() {
            for entry in &scope.entries {
                names.push(interner.resolve(entry.name));
            }
        }
        names
    }

    /// The module-scope entries, in declaration order. These are a
    /// module's exports.
    pub fn globals(&self) -> &[BindingEntry<'a>] {
        &self.scopes[0].entries
    }
}

impl<'a> Default for Bindings<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(interner: &mut Interner, s: &str) -> Symbol {
        interner.intern(s)
    }

    #[test]
    fn add_assigns_sequential_varids() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let a = bindings.add(sym(&mut interner, "a"), Loc::default(), None, TypeId::I32);
        let b = bindings.add(sym(&mut interner, "b"), Loc::default(), None, TypeId::F64);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }

    #[test]
    fn nested_scope_offsets_continue_numbering() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        bindings.add(sym(&mut interner, "a"), Loc::default(), None, TypeId::I32);
        bindings.enter_scope(None);
        let inner = bindings.add(sym(&mut interner, "x"), Loc::default(), None, TypeId::I32);
        assert_eq!(inner, 1);
        assert_eq!(bindings.size(), 2);
    }

    #[test]
    fn lookup_walks_outward() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let a = sym(&mut interner, "a");
        bindings.add(a, Loc::default(), None, TypeId::I32);
        bindings.enter_scope(None);
        let (varid, entry) = bindings.lookup(a).expect("outer binding visible");
        assert_eq!(varid, 0);
        assert_eq!(entry.ty, TypeId::I32);
    }

    #[test]
    fn shadowing_resolves_to_innermost() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let x = sym(&mut interner, "x");
        bindings.add(x, Loc::default(), None, TypeId::I32);
        bindings.enter_scope(None);
        bindings.add(x, Loc::default(), None, TypeId::F64);
        let (varid, entry) = bindings.lookup(x).unwrap();
        assert_eq!(varid, 1);
        assert_eq!(entry.ty, TypeId::F64);
    }

    #[test]
    fn leave_scope_restores_outer_resolution() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let x = sym(&mut interner, "x");
        bindings.add(x, Loc::default(), None, TypeId::I32);
        bindings.enter_scope(None);
        bindings.add(x, Loc::default(), None, TypeId::F64);
        bindings.leave_scope();
        let (varid, _) = bindings.lookup(x).unwrap();
        assert_eq!(varid, 0);
    }

    #[test]
    fn get_by_varid_reaches_outer_scopes() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let a = sym(&mut interner, "a");
        bindings.add(a, Loc::default(), None, TypeId::I32);
        bindings.enter_scope(None);
        bindings.add(sym(&mut interner, "b"), Loc::default(), None, TypeId::F64);
        assert_eq!(bindings.get(0).unwrap().name, a);
        assert!(bindings.get(-1).is_none());
    }

    #[test]
    fn size_only_grows_within_scope() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let before = bindings.size();
        bindings.add(sym(&mut interner, "a"), Loc::default(), None, TypeId::I32);
        let mid = bindings.size();
        bindings.add(sym(&mut interner, "b"), Loc::default(), None, TypeId::I32);
        assert!(before < mid && mid < bindings.size());
    }

    #[test]
    fn class_namespace_is_visible() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        let ns = sym(&mut interner, "P");
        bindings.enter_scope(Some(ns));
        assert_eq!(bindings.current_namespace(), Some(ns));
        bindings.leave_scope();
        assert_eq!(bindings.current_namespace(), None);
    }

    #[test]
    fn visible_names_include_all_scopes() {
        let mut interner = Interner::new();
        let mut bindings: Bindings<'_> = Bindings::new();
        bindings.add(sym(&mut interner, "outer"), Loc::default(), None, TypeId::I32);
        bindings.enter_scope(None);
        bindings.add(sym(&mut interner, "inner"), Loc::default(), None, TypeId::I32);
        let names = bindings.visible_names(&interner);
        assert!(names.contains(&"outer"));
        assert!(names.contains(&"inner"));
    }
}
