//! The import library: module path resolution and the cache of parsed,
//! analyzed modules.
//!
//! Lookup order is the current working directory, then each entry on the
//! search path (seeded from `PYTHONPATH`); for each root, a package
//! directory `a/b/c/__init__.py` wins over a file module `a/b/c.py`.
//! A module is parsed and analyzed at most once per session — repeated
//! imports return the cached entry. Native modules register through
//! [`add_module`](ImportLib::add_module) and look like any other export
//! table to the analyzer.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::arena::Arena;
use crate::ast::Module;
use crate::builtins::NativeOperators;
use crate::error::DiagnosticSink;
use crate::intern::{Interner, Symbol};
use crate::sema::types::{TypeId, TypeRegistry};
use crate::value::NativeFn;

/// One function exported by a native module.
pub struct NativeExport {
    pub name: Symbol,
    pub ty: TypeId,
    pub func: NativeFn,
}

/// A cached module: script source analyzed to its exports, or a native
/// export table.
pub enum ModuleSource<'a> {
    Parsed {
        module: &'a Module<'a>,
        exports: Vec<(Symbol, TypeId)>,
    },
    Native {
        exports: Vec<NativeExport>,
    },
}

impl<'a> ModuleSource<'a> {
    /// Looks up an exported name's type.
    pub fn export_type(&self, name: Symbol) -> Option<TypeId> {
        match self {
            ModuleSource::Parsed { exports, .. } => {
                exports.iter().rev().find(|(n, _)| *n == name).map(|(_, ty)| *ty)
            }
            ModuleSource::Native { exports } => {
                exports.iter().find(|e| e.name == name).map(|e| e.ty)
            }
        }
    }

    /// Every exported name, in declaration order.
    pub fn export_names(&self) -> Vec<Symbol> {
        match self {
            ModuleSource::Parsed { exports, .. } => exports.iter().map(|(n, _)| *n).collect(),
            ModuleSource::Native { exports } => exports.iter().map(|e| e.name).collect(),
        }
    }
}

pub struct ImportLib<'a> {
    search_paths: Vec<PathBuf>,
    cache: HashMap<String, ModuleSource<'a>>,
    in_progress: HashSet<String>,
}

impl<'a> ImportLib<'a> {
    /// An import library with the search path seeded from `PYTHONPATH`
    /// (colon-separated).
    pub fn new() -> Self {
        let mut lib = ImportLib {
            search_paths: Vec::new(),
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        };
        if let Ok(path) = std::env::var("PYTHONPATH") {
            for dir in path.split(':').filter(|d| !d.is_empty()) {
                lib.add_to_path(PathBuf::from(dir));
            }
        }
        lib
    }

    /// Appends a lookup directory, ignoring duplicates.
    pub fn add_to_path(&mut self, dir: PathBuf) {
        if !self.search_paths.contains(&dir) {
            self.search_paths.push(dir);
        }
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Registers a pre-built module under a name (native modules).
    pub fn add_module(&mut self, name: &str, source: ModuleSource<'a>) {
        self.cache.insert(name.to_string(), source);
    }

    /// Creates an empty module owned by the library's arena lifetime.
    pub fn new_module(&mut self, name: &str, arena: &'a Arena, interner: &mut Interner) -> &'a Module<'a> {
        let module = arena.alloc(Module {
            name: interner.intern(name),
            filename: interner.intern("<native>"),
            body: &[],
            docstring: None,
        });
        self.add_module(name, ModuleSource::Parsed { module, exports: Vec::new() });
        module
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleSource<'a>> {
        self.cache.get(name)
    }

    /// Resolves a dotted module path to a file, or `None`.
    pub fn lookup_module(&self, name: &str) -> Option<PathBuf> {
        let frags: Vec<&str> = name.split('.').collect();

        let cwd = std::env::current_dir().ok();
        let roots = cwd.iter().map(PathBuf::as_path).chain(self.search_paths.iter().map(PathBuf::as_path));

        for root in roots {
            if let Some(path) = Self::module_under(root, &frags) {
                return Some(path);
            }
        }
        None
    }

    fn module_under(root: &Path, frags: &[&str]) -> Option<PathBuf> {
        let mut base = root.to_path_buf();
        for frag in frags {
            base.push(frag);
        }

        // A package directory wins over a file module.
        let init = base.join("__init__.py");
        if base.is_dir() && init.is_file() {
            return Some(init);
        }
        let file = base.with_extension("py");
        if file.is_file() {
            return Some(file);
        }
        None
    }

    /// Loads, parses and analyzes the module at this dotted path, cached
    /// by path. Returns `None` when the module cannot be found; parse and
    /// sema diagnostics land in the sink either way.
    pub fn import_file(
        &mut self,
        name: &str,
        arena: &'a Arena,
        interner: &mut Interner,
        registry: &mut TypeRegistry<'a>,
        operators: &NativeOperators,
        sink: &mut DiagnosticSink,
    ) -> Option<&ModuleSource<'a>> {
        if self.cache.contains_key(name) {
            return self.cache.get(name);
        }
        if self.in_progress.contains(name) {
            // Circular import; resolve to nothing rather than recursing.
            return None;
        }

        let path = self.lookup_module(name)?;
        let buffer = match crate::buffer::FileBuffer::open(&path) {
            Ok(buffer) => buffer,
            Err(_) => return None,
        };

        self.in_progress.insert(name.to_string());
        let lexer = crate::lexer::Lexer::new(buffer);
        let mut parser = crate::parser::Parser::new(lexer, interner, arena);
        let module = parser.parse_module(name);
        let parse_errors = parser.take_errors();
        for diagnostic in parse_errors.iter() {
            sink.push(diagnostic.clone());
        }

        let exports = crate::sema::analyze_for_import(module, arena, interner, registry, operators, self, sink);
        self.in_progress.remove(name);

        self.cache.insert(name.to_string(), ModuleSource::Parsed { module, exports });
        self.cache.get(name)
    }
}

impl<'a> Default for ImportLib<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn search_path_deduplicates() {
        let mut lib = ImportLib::new();
        let before = lib.search_paths().len();
        lib.add_to_path(PathBuf::from("/tmp/pythia-mods"));
        lib.add_to_path(PathBuf::from("/tmp/pythia-mods"));
        assert_eq!(lib.search_paths().len(), before + 1);
    }

    #[test]
    fn lookup_finds_file_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("helpers.py"), "x = 1\n").unwrap();
        let mut lib = ImportLib::new();
        lib.add_to_path(dir.path().to_path_buf());
        let found = lib.lookup_module("helpers").expect("module file found");
        assert!(found.ends_with("helpers.py"));
    }

    #[test]
    fn lookup_prefers_package_init() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::write(dir.path().join("pkg/__init__.py"), "").unwrap();
        fs::write(dir.path().join("pkg.py"), "").unwrap();
        let mut lib = ImportLib::new();
        lib.add_to_path(dir.path().to_path_buf());
        let found = lib.lookup_module("pkg").unwrap();
        assert!(found.ends_with("__init__.py"));
    }

    #[test]
    fn lookup_resolves_dotted_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/c.py"), "y = 2\n").unwrap();
        let mut lib = ImportLib::new();
        lib.add_to_path(dir.path().to_path_buf());
        let found = lib.lookup_module("a.b.c").unwrap();
        assert!(found.ends_with("c.py"));
    }

    #[test]
    fn missing_module_resolves_to_none() {
        let lib = ImportLib::new();
        assert!(lib.lookup_module("definitely.not.there").is_none());
    }

    #[test]
    fn registered_modules_are_cached() {
        let mut lib = ImportLib::new();
        lib.add_module("native_demo", ModuleSource::Native { exports: Vec::new() });
        assert!(lib.is_registered("native_demo"));
        assert!(lib.get("native_demo").is_some());
    }
}
