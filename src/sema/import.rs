//! Import resolution: `import a.b.c [as d]` and `from m import x [as y]`.
//!
//! Modules load through the import library, which parses and analyzes
//! each file once and caches the result. Imported names bind into the
//! current scope with their resolved types; a module that cannot be
//! found is a `ModuleNotFoundError`, a name the module does not export
//! is an `ImportError`.

use crate::ast::stmt::{Alias, StmtRef};
use crate::error::DiagnosticKind;
use crate::intern::Symbol;

use super::SemanticAnalyser;

impl<'a, 'ctx> SemanticAnalyser<'a, 'ctx> {
    pub(crate) fn exec_import(&mut self, stmt: StmtRef<'a>, names: &'a [Alias]) {
        for alias in names {
            let module_name = self.interner.resolve(alias.name).to_string();
            let loaded = self
                .imports
                .import_file(
                    &module_name,
                    self.arena,
                    self.interner,
                    self.registry,
                    self.operators,
                    &mut self.errors,
                )
                .is_some();

            if !loaded {
                self.report(DiagnosticKind::ModuleNotFoundError(module_name), stmt.loc);
                continue;
            }

            // `import a.b.c as d` binds d; without `as`, the dotted path
            // itself is the bound name.
            let target = alias.asname.unwrap_or(alias.name);
            let module_ty = self.registry.module(alias.name);
            self.bindings.add(target, stmt.loc, None, module_ty);
        }
    }

    pub(crate) fn exec_import_from(&mut self, stmt: StmtRef<'a>, module: Symbol, names: &'a [Alias]) {
        let module_name = self.interner.resolve(module).to_string();
        let loaded = self
            .imports
            .import_file(
                &module_name,
                self.arena,
                self.interner,
                self.registry,
                self.operators,
                &mut self.errors,
            )
            .is_some();

        if !loaded {
            self.report(DiagnosticKind::ModuleNotFoundError(module_name), stmt.loc);
            return;
        }

        let star = self.interner.intern("*");
        for alias in names {
            if alias.name == star {
                let exports: Vec<(Symbol, super::types::TypeId)> = self
                    .imports
                    .get(&module_name)
                    .map(|source| {
                        source
                            .export_names()
                            .into_iter()
                            .filter_map(|name| source.export_type(name).map(|ty| (name, ty)))
                            .collect()
                    })
                    .unwrap_or_default();
                for (name, ty) in exports {
                    self.bindings.add(name, stmt.loc, None, ty);
                }
                continue;
            }

            let found = self.imports.get(&module_name).and_then(|source| source.export_type(alias.name));
            match found {
                Some(ty) => {
                    let target = alias.asname.unwrap_or(alias.name);
                    self.bindings.add(target, stmt.loc, None, ty);
                }
                None => {
                    let kind = DiagnosticKind::ImportError {
                        name: self.interner.resolve(alias.name).to_string(),
                        module: module_name.clone(),
                    };
                    self.report(kind, stmt.loc);
                }
            }
        }
    }
}
