//! Per-file top-level declaration cache.
//!
//! A request completes against one edited buffer, but name resolution needs
//! the top-level declarations of every other file in the same package. Those
//! files change rarely, so their declaration sets are built once and reused
//! until the file's mtime moves.
//!
//! Entries allocate into the persistent half of the [`DeclStore`]; the file
//! scope is created parentless and gets re-parented onto the request's
//! package scope before each merge, so cached declarations resolve against
//! fresh per-request state without being rebuilt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::semantic::decl::{DeclFlags, DeclId, DeclKind, DeclStore, ScopeId};
use crate::syntax::ast::{foreach_decl, Decl};

use super::file_cache::FileCache;
use super::lookup::LookupContext;

/// One resolved import of a file: the local alias (if any) and the archive
/// the package loads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageImport {
    pub alias: Option<String>,
    pub abs_path: PathBuf,
}

/// Top-level declarations of one file, keyed for merging.
#[derive(Debug)]
pub struct FileDecls {
    pub path: PathBuf,
    pub mtime: i64,
    pub package: Option<String>,
    pub decls: FxHashMap<String, DeclId>,
    pub imports: Vec<PackageImport>,
    /// Scope the declarations resolve in; parentless until a request wires
    /// it to its package scope.
    pub scope: ScopeId,
}

#[derive(Default)]
pub struct DeclCache {
    entries: Mutex<FxHashMap<PathBuf, Arc<FileDecls>>>,
}

impl DeclCache {
    pub fn new() -> DeclCache {
        DeclCache::default()
    }

    /// Returns the declaration set for a file, rebuilding when its mtime
    /// changed. `None` means the file could not be read.
    pub fn get(
        &self,
        path: &Path,
        store: &mut DeclStore,
        files: &FileCache,
        lookup: &LookupContext,
    ) -> Option<Arc<FileDecls>> {
        let entry = files.get(path)?;
        if let Some(cached) = self.entries.lock().get(path) {
            if cached.mtime == entry.mtime {
                return Some(cached.clone());
            }
        }

        let was_transient = store.transient_mode();
        store.set_transient(false);
        let built = Arc::new(build(path, entry.mtime, &entry.file, store, lookup));
        store.set_transient(was_transient);

        debug!(path = %path.display(), decls = built.decls.len(), "file declarations rebuilt");
        self.entries
            .lock()
            .insert(path.to_path_buf(), built.clone());
        Some(built)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn build(
    path: &Path,
    mtime: i64,
    file: &crate::syntax::ast::File,
    store: &mut DeclStore,
    lookup: &LookupContext,
) -> FileDecls {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let scope = store.new_scope(None);

    let mut imports = Vec::new();
    let mut decls = FxHashMap::default();
    for decl in &file.decls {
        if let Decl::Import { specs } = decl {
            for spec in specs {
                if spec.alias.as_deref() == Some("_") {
                    continue;
                }
                match lookup.resolve(dir, &spec.path) {
                    Some(abs_path) => imports.push(PackageImport {
                        alias: spec.alias.clone(),
                        abs_path,
                    }),
                    None => debug!(path = %spec.path, "import does not resolve"),
                }
            }
            continue;
        }
        append_top_level(decl, scope, store, &mut decls);
    }

    FileDecls {
        path: path.to_path_buf(),
        mtime,
        package: file.package.clone(),
        decls,
        imports,
        scope,
    }
}

/// Folds one top-level declaration group into the name → declaration map.
/// Methods hang off their receiver type, through a stub when the type has
/// not been seen yet.
fn append_top_level(
    decl: &Decl,
    scope: ScopeId,
    store: &mut DeclStore,
    decls: &mut FxHashMap<String, DeclId>,
) {
    let Some(kind) = decl_kind(decl) else { return };

    let mut parts = Vec::new();
    foreach_decl(decl, |name, typ, value, value_index| {
        parts.push((name.to_string(), typ.cloned(), value.cloned(), value_index));
    });

    let method_of = decl.method_of().map(str::to_string);
    for (name, typ, value, value_index) in parts {
        // A named type keeps its anonymous body; anything else gets it
        // lifted so `var x struct { ... }` resolves through a `$s_N` decl.
        let typ = typ.map(|t| {
            if kind == DeclKind::Type {
                store.anonymify(&t, DeclFlags::default(), scope)
            } else {
                store.anonymify_type(&t, DeclFlags::default(), scope)
            }
        });
        let value = value.map(|v| store.anonymify(&v, DeclFlags::default(), scope));
        let id = store.new_decl_full(
            name.clone(),
            kind,
            DeclFlags::default(),
            typ,
            value,
            value_index,
            scope,
        );

        if let Some(owner) = &method_of {
            let owner_id = *decls.entry(owner.clone()).or_insert_with(|| {
                store.alloc(crate::semantic::decl::Decl::new(
                    owner.clone(),
                    DeclKind::MethodsStub,
                    scope,
                ))
            });
            store.add_child(owner_id, id);
        } else {
            match decls.get(&name) {
                Some(&existing) => store.expand_or_replace(existing, id),
                None => {
                    decls.insert(name, id);
                }
            }
        }
    }
}

fn decl_kind(decl: &Decl) -> Option<DeclKind> {
    match decl {
        Decl::Const { .. } => Some(DeclKind::Const),
        Decl::Var { .. } => Some(DeclKind::Var),
        Decl::Type { .. } => Some(DeclKind::Type),
        Decl::Func(_) => Some(DeclKind::Func),
        Decl::Import { .. } | Decl::Bad(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn build_from(src: &str) -> (DeclStore, Arc<FileDecls>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.go");
        fs::write(&path, src).unwrap();

        let mut store = DeclStore::new();
        let files = FileCache::new();
        let lookup = LookupContext::new();
        let cache = DeclCache::new();
        let fd = cache.get(&path, &mut store, &files, &lookup).unwrap();
        (store, fd)
    }

    #[test]
    fn methods_attach_to_their_receiver_type() {
        let (store, fd) = build_from(
            "package tree\n\
             func (t *Tree) Walk() {}\n\
             type Tree struct { Left int }\n",
        );
        assert_eq!(fd.package.as_deref(), Some("tree"));

        // The method arrived first; the stub it created was promoted when
        // the type declaration followed.
        let tree = fd.decls["Tree"];
        let d = store.decl(tree);
        assert_eq!(d.kind, DeclKind::Type);
        assert!(d.children.contains_key("Walk"));
        assert!(d.children.contains_key("Left"));
        assert!(!fd.decls.contains_key("Walk"));
    }

    #[test]
    fn imports_resolve_and_blank_imports_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.go");
        fs::write(
            &path,
            "package main\n\
             import (\n\
             \t_ \"ignored\"\n\
             \tu \"./util\"\n\
             \t\"unresolvable/pkg\"\n\
             )\n\
             var X int\n",
        )
        .unwrap();

        let mut store = DeclStore::new();
        let files = FileCache::new();
        let lookup = LookupContext::new();
        let cache = DeclCache::new();
        let fd = cache.get(&path, &mut store, &files, &lookup).unwrap();

        assert_eq!(fd.imports.len(), 1);
        assert_eq!(fd.imports[0].alias.as_deref(), Some("u"));
        assert!(fd.imports[0].abs_path.ends_with("util.a"));
        assert!(fd.decls.contains_key("X"));
    }

    #[test]
    fn unchanged_file_reuses_the_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.go");
        fs::write(&path, "package lib\nvar A int\n").unwrap();

        let mut store = DeclStore::new();
        let files = FileCache::new();
        let lookup = LookupContext::new();
        let cache = DeclCache::new();
        let first = cache.get(&path, &mut store, &files, &lookup).unwrap();
        let second = cache.get(&path, &mut store, &files, &lookup).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn entries_allocate_in_the_persistent_half() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.go");
        fs::write(&path, "package lib\nvar A int\n").unwrap();

        let mut store = DeclStore::new();
        store.set_transient(true);
        let files = FileCache::new();
        let lookup = LookupContext::new();
        let cache = DeclCache::new();
        let fd = cache.get(&path, &mut store, &files, &lookup).unwrap();
        assert!(!fd.decls["A"].is_transient());
        assert!(!fd.scope.is_transient());
        // The caller's mode is untouched.
        assert!(store.transient_mode());
    }

    #[test]
    fn anonymous_struct_types_are_lifted() {
        let (store, fd) = build_from("package p\nvar Cfg struct { Debug bool }\n");
        let cfg = fd.decls["Cfg"];
        let typ = store.decl(cfg).typ.clone().unwrap();
        let crate::syntax::ast::Expr::Ident(name) = &*typ else {
            panic!("expected lifted type name, got {typ:?}");
        };
        assert!(name.starts_with("$s_"));
    }
}
