//! Imported-package cache.
//!
//! Each archive installs once into the persistent half of the [`DeclStore`]:
//! a `module` declaration holding the exported names as children, plus a
//! private scope where every package alias the export data mentions is
//! bound. Entries are keyed by archive path and live until the archive's
//! mtime moves (or forever, for the synthetic `unsafe` package).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, error};

use crate::semantic::decl::{is_exported, Decl, DeclFlags, DeclId, DeclKind, DeclStore, ScopeId};
use crate::syntax::ast::{foreach_decl, Decl as AstDecl};

use super::archive::{parse_archive, ExportData};
use super::file_cache::file_mtime;
use super::lookup::UNSAFE_PACKAGE;

/// Export section of the compiler-internal `unsafe` package, which has no
/// archive on disk.
const UNSAFE_EXPORT: &[u8] = b"
import
$$
package unsafe
\ttype @\"\".Pointer uintptr
\tfunc @\"\".Offsetof (? any) uintptr
\tfunc @\"\".Sizeof (? any) uintptr
\tfunc @\"\".Alignof (? any) uintptr
\tfunc @\"\".Typeof (i interface { }) interface { }
\tfunc @\"\".Reflect (i interface { }) (typ interface { }, addr @\"\".Pointer)
\tfunc @\"\".Unreflect (typ interface { }, addr @\"\".Pointer) interface { }
\tfunc @\"\".New (typ interface { }) @\"\".Pointer
\tfunc @\"\".NewArray (typ interface { }, n int) @\"\".Pointer

$$
";

/// Marker mtime for entries that never go stale.
pub const IMMORTAL: i64 = -1;

#[derive(Debug)]
pub struct PackageEntry {
    pub path: PathBuf,
    pub mtime: i64,
    pub default_alias: String,
    /// The `module` declaration carrying the exported names.
    pub main: DeclId,
    /// Scope the package's type expressions resolve in.
    pub scope: ScopeId,
}

impl PackageEntry {
    /// Whether the archive on disk has moved past this entry.
    pub fn is_stale(&self) -> bool {
        self.mtime != IMMORTAL && file_mtime(&self.path) != Some(self.mtime)
    }
}

pub struct PackageCache {
    entries: Mutex<FxHashMap<PathBuf, Arc<PackageEntry>>>,
}

impl PackageCache {
    pub fn new(store: &mut DeclStore) -> PackageCache {
        let cache = PackageCache {
            entries: Mutex::new(FxHashMap::default()),
        };
        cache.seed_unsafe(store);
        cache
    }

    pub fn get(&self, path: &Path) -> Option<Arc<PackageEntry>> {
        self.entries.lock().get(path).cloned()
    }

    pub fn entries(&self) -> Vec<Arc<PackageEntry>> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every entry and re-seeds the built-in package. The declarations
    /// already allocated stay in the store; nothing references them after
    /// the next request rebinds its imports.
    pub fn clear(&self, store: &mut DeclStore) {
        self.entries.lock().clear();
        self.seed_unsafe(store);
    }

    fn seed_unsafe(&self, store: &mut DeclStore) {
        match parse_archive(UNSAFE_EXPORT, UNSAFE_PACKAGE) {
            Ok(export) => {
                self.install(Path::new(UNSAFE_PACKAGE), IMMORTAL, &export, store);
            }
            Err(err) => error!(%err, "built-in package failed to parse"),
        }
    }

    /// Installs parsed export data under an archive path, replacing any
    /// previous entry for it.
    pub fn install(
        &self,
        path: &Path,
        mtime: i64,
        export: &ExportData,
        store: &mut DeclStore,
    ) -> Arc<PackageEntry> {
        let was_transient = store.transient_mode();
        store.set_transient(false);

        let scope = store.new_scope(Some(DeclStore::UNIVERSE));
        let main = store.alloc(Decl::new(
            path.display().to_string(),
            DeclKind::Package,
            scope,
        ));

        // Transitively referenced packages get their own declarations.
        let mut others: FxHashMap<String, DeclId> = FxHashMap::default();
        for record in &export.records {
            let target = if record.package.is_empty() {
                main
            } else {
                *others.entry(record.package.clone()).or_insert_with(|| {
                    store.alloc(Decl::new(record.package.clone(), DeclKind::Package, scope))
                })
            };
            add_export_decl(store, target, &record.decl, scope);
        }

        // Bind every alias the type expressions may mention, the package's
        // own name included.
        store
            .scope_mut(scope)
            .entities
            .insert(export.default_alias.clone(), main);
        for pref in &export.packages {
            // The default alias is already bound; a self-referential package
            // ref must not replace it with an empty shell.
            if store.scope(scope).entities.contains_key(&pref.alias) {
                continue;
            }
            let target = if pref.key.is_empty() {
                main
            } else {
                *others.entry(pref.key.clone()).or_insert_with(|| {
                    store.alloc(Decl::new(pref.key.clone(), DeclKind::Package, scope))
                })
            };
            store.scope_mut(scope).entities.insert(pref.alias.clone(), target);
        }

        store.set_transient(was_transient);

        debug!(path = %path.display(), alias = %export.default_alias, "package installed");
        let entry = Arc::new(PackageEntry {
            path: path.to_path_buf(),
            mtime,
            default_alias: export.default_alias.clone(),
            main,
            scope,
        });
        self.entries
            .lock()
            .insert(path.to_path_buf(), entry.clone());
        entry
    }
}

/// Hangs one exported declaration off its package. Unexported names are
/// dropped unless they are types (unexported types can still surface
/// through exported signatures); methods attach to their receiver, through
/// a stub when it has not been seen yet.
fn add_export_decl(store: &mut DeclStore, pkg: DeclId, decl: &AstDecl, scope: ScopeId) {
    let kind = match decl {
        AstDecl::Const { .. } => DeclKind::Const,
        AstDecl::Var { .. } => DeclKind::Var,
        AstDecl::Type { .. } => DeclKind::Type,
        AstDecl::Func(_) => DeclKind::Func,
        AstDecl::Import { .. } | AstDecl::Bad(_) => return,
    };
    let method_of = decl.method_of().map(str::to_string);

    let mut parts = Vec::new();
    foreach_decl(decl, |name, typ, value, value_index| {
        parts.push((name.to_string(), typ.cloned(), value.cloned(), value_index));
    });

    for (name, typ, value, value_index) in parts {
        if !is_exported(&name) && kind != DeclKind::Type {
            continue;
        }
        let id = store.new_decl_full(
            name.clone(),
            kind,
            DeclFlags::FOREIGN,
            typ,
            value,
            value_index,
            scope,
        );

        if let Some(owner) = &method_of {
            match store.decl(pkg).children.get(owner).copied() {
                Some(owner_id) => store.add_child(owner_id, id),
                None => {
                    let stub =
                        store.alloc(Decl::new(owner.clone(), DeclKind::MethodsStub, scope));
                    store.add_child(stub, id);
                    store.add_child(pkg, stub);
                }
            }
        } else {
            match store.decl(pkg).children.get(&name).copied() {
                Some(existing) => store.expand_or_replace(existing, id),
                None => store.add_child(pkg, id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn install_text(archive: &[u8], name: &str) -> (DeclStore, PackageCache, Arc<PackageEntry>) {
        let mut store = DeclStore::new();
        let cache = PackageCache::new(&mut store);
        let export = parse_archive(archive, name).unwrap();
        let entry = cache.install(Path::new(name), 42, &export, &mut store);
        (store, cache, entry)
    }

    #[test]
    fn seeds_the_builtin_package() {
        let mut store = DeclStore::new();
        let cache = PackageCache::new(&mut store);
        let entry = cache.get(Path::new("unsafe")).unwrap();
        assert_eq!(entry.mtime, IMMORTAL);
        assert!(!entry.is_stale());
        assert_eq!(entry.default_alias, "unsafe");

        let main = store.decl(entry.main);
        assert_eq!(main.kind, DeclKind::Package);
        assert!(main.children.contains_key("Pointer"));
        assert!(main.children.contains_key("Sizeof"));
        // Self references resolve through the scope.
        assert_eq!(store.lookup(entry.scope, "unsafe"), Some(entry.main));
    }

    #[test]
    fn installs_types_with_their_methods() {
        let (store, _, entry) = install_text(
            b"\nimport\n$$\npackage tree\n\
              \tfunc (t *@\"\".Tree) Walk () {}\n\
              \ttype @\"\".Tree struct { Left *@\"\".Tree; secret int }\n\
              \tfunc @\"\".NewTree () *@\"\".Tree\n\n$$\n",
            "tree.a",
        );
        assert_eq!(entry.default_alias, "tree");
        let main = store.decl(entry.main);
        assert!(main.children.contains_key("NewTree"));

        let tree = store.decl(main.children["Tree"]);
        assert_eq!(tree.kind, DeclKind::Type);
        assert!(tree.flags.contains(DeclFlags::FOREIGN));
        // Method seen before the type, attached through a promoted stub.
        assert!(tree.children.contains_key("Walk"));
        assert!(tree.children.contains_key("Left"));
        // Unexported fields of foreign structs never surface.
        assert!(!tree.children.contains_key("secret"));
    }

    #[test]
    fn unexported_names_drop_except_types() {
        let (store, _, entry) = install_text(
            b"\nimport\n$$\npackage p\n\
              \tvar @\"\".hidden int\n\
              \ttype @\"\".node struct { Next *@\"\".node }\n\
              \tfunc @\"\".Head () *@\"\".node\n\n$$\n",
            "p.a",
        );
        let main = store.decl(entry.main);
        assert!(!main.children.contains_key("hidden"));
        assert!(main.children.contains_key("node"));
        assert!(main.children.contains_key("Head"));
    }

    #[test]
    fn imported_aliases_bind_in_the_package_scope() {
        let (store, _, entry) = install_text(
            b"\nimport\n$$\npackage printer\n\
              \timport ast \"go/ast\"\n\
              \ttype @\"go/ast\".Node interface { }\n\
              \tfunc @\"\".Print (n @\"go/ast\".Node)\n\n$$\n",
            "printer.a",
        );
        let ast_pkg = store.lookup(entry.scope, "ast").unwrap();
        assert_eq!(store.decl(ast_pkg).kind, DeclKind::Package);
        assert!(store.decl(ast_pkg).children.contains_key("Node"));
    }

    #[test]
    fn clear_drops_entries_and_reseeds() {
        let (mut store, cache, entry) = install_text(
            b"\nimport\n$$\npackage tiny\n\tvar @\"\".X int\n\n$$\n",
            "tiny.a",
        );
        assert!(cache.get(&entry.path).is_some());
        cache.clear(&mut store);
        assert!(cache.get(&entry.path).is_none());
        assert!(cache.get(Path::new("unsafe")).is_some());
    }
}
