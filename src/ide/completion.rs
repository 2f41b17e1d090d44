//! The completion engine.
//!
//! A [`Session`] owns the declaration arena and every cache, and turns one
//! `(buffer, path, cursor)` request into ranked candidates. The request
//! pipeline: rip the cursor's declaration out of the buffer, load sibling
//! files and their imported archives, build a fresh package scope, walk the
//! buffer down to the cursor, classify what sits left of it, then collect,
//! filter and sort.
//!
//! A request never surfaces an error: anything unrecoverable inside the
//! pipeline trips the panic boundary, which drops all caches and answers
//! with an empty candidate list.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::config::Config;
use crate::project::{
    file_mtime, parse_archive, DeclCache, ExportData, FileCache, LookupContext, PackageCache,
    PackageImport,
};
use crate::semantic::decl::{is_exported, DeclId, DeclKind, DeclStore, ScopeId};
use crate::semantic::{decl_infer_type, expr_to_decl, type_to_decl, Visited};
use crate::syntax::ast::Decl;
use crate::syntax::{check_type_expr, pretty_type};

use super::buffer::analyze_buffer;
use super::cursor::{deduce_cursor_context, CursorContext, CursorLoc};
use super::ripper::rip_off;

/// Cap on concurrent archive loads, to bound filesystem pressure.
const MAX_LOADERS: usize = 8;

/// One completion candidate, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    /// Canonical rendering of the type; empty when inference gave up.
    pub typ: String,
    pub class: DeclKind,
}

#[derive(Debug, Default)]
pub struct Completion {
    pub candidates: Vec<Candidate>,
    /// Bytes of the partial identifier the client should replace.
    pub partial_len: usize,
}

/// Long-lived completion state: configuration, the declaration arena and
/// the three caches. One session serves requests serially.
pub struct Session {
    config: Config,
    store: DeclStore,
    files: FileCache,
    decls: DeclCache,
    packages: PackageCache,
    lookup: LookupContext,
}

impl Session {
    pub fn new(config: Config) -> Session {
        let mut store = DeclStore::new();
        let packages = PackageCache::new(&mut store);
        let mut lookup = LookupContext::new();
        lookup.set_lib_path(&config.lib_path);
        Session {
            config,
            store,
            files: FileCache::new(),
            decls: DeclCache::new(),
            packages,
            lookup,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_config(&mut self, config: Config) {
        self.lookup.set_lib_path(&config.lib_path);
        self.config = config;
    }

    /// Archive resolution settings beyond `lib-path` (install root, module
    /// manifest, target platform).
    pub fn lookup_mut(&mut self) -> &mut LookupContext {
        &mut self.lookup
    }

    /// Completes at a byte offset in `buffer`, which is the in-editor
    /// content of the file at `path` (possibly broken around the cursor).
    pub fn complete(&mut self, buffer: &str, path: &Path, cursor: u32) -> Completion {
        let result = catch_unwind(AssertUnwindSafe(|| self.run(buffer, path, cursor)));
        self.store.clear_transient();
        match result {
            Ok(completion) => completion,
            Err(_) => {
                warn!(path = %path.display(), cursor, "completion panicked, dropping caches");
                self.drop_cache();
                Completion::default()
            }
        }
    }

    /// Clears every cache and rebuilds the arena from scratch.
    pub fn drop_cache(&mut self) {
        self.store = DeclStore::new();
        self.packages = PackageCache::new(&mut self.store);
        self.files.clear();
        self.decls.clear();
    }

    /// Textual dump of the package cache for the `status` request.
    pub fn status(&self) -> String {
        use std::fmt::Write as _;
        let mut entries = self.packages.entries();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        let mut out = format!(
            "packages cached: {}\nfiles cached: {}\n",
            entries.len(),
            self.files.len()
        );
        for entry in entries {
            let _ = writeln!(
                out,
                "  {} (alias {}, mtime {})",
                entry.path.display(),
                entry.default_alias,
                entry.mtime
            );
        }
        out
    }

    fn run(&mut self, buffer: &str, path: &Path, cursor: u32) -> Completion {
        self.store.clear_transient();

        // Split off the declaration under edit so the rest of the buffer can
        // go through the strict parser.
        let ripped = rip_off(buffer, cursor);
        let (outer, region) = match &ripped {
            Some(r) => {
                let (file, _) = crate::parser::parse_file_with_errors(&r.outer);
                let decls = crate::parser::parse_decl_list(&r.region);
                (file, Some((decls, cursor - r.start)))
            }
            None => {
                let (file, _) = crate::parser::parse_file_with_errors(buffer);
                (file, None)
            }
        };

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let siblings = self.load_siblings(path, dir, outer.package.as_deref());
        let buffer_imports = resolve_imports(&outer.decls, dir, &self.lookup);

        // Every archive any loaded file mentions, loaded in parallel.
        let mut archives: Vec<PathBuf> =
            buffer_imports.iter().map(|i| i.abs_path.clone()).collect();
        for fd in &siblings {
            archives.extend(fd.imports.iter().map(|i| i.abs_path.clone()));
        }
        archives.sort();
        archives.dedup();
        self.load_archives(&archives);

        // Per-request scopes live in the transient half from here on.
        self.store.set_transient(true);
        let package_scope = self.store.new_scope(Some(DeclStore::UNIVERSE));
        for fd in &siblings {
            self.store.scope_mut(fd.scope).parent = Some(package_scope);
            self.bind_aliases(&fd.imports, fd.scope);
            for &id in fd.decls.values() {
                self.store.merge_decl(package_scope, id);
            }
        }

        let file_scope = self.store.new_scope(Some(package_scope));
        self.bind_aliases(&buffer_imports, file_scope);

        let inner = analyze_buffer(
            &mut self.store,
            &outer,
            region.as_ref().map(|(d, c)| (d.as_slice(), *c)),
            file_scope,
        );

        let ctx = deduce_cursor_context(buffer, cursor);
        let ids = self.gather(&ctx, inner);
        let candidates = self.render(ids, &ctx);
        Completion {
            candidates,
            partial_len: ctx.partial.len(),
        }
    }

    /// Declaration sets of the other `.go` files in the buffer's directory
    /// that belong to the same package.
    fn load_siblings(
        &mut self,
        path: &Path,
        dir: &Path,
        package: Option<&str>,
    ) -> Vec<std::sync::Arc<crate::project::FileDecls>> {
        let Some(package) = package else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let p = entry.path();
            if p == path || p.extension().map_or(true, |e| e != "go") {
                continue;
            }
            let Some(fd) = self.decls.get(&p, &mut self.store, &self.files, &self.lookup) else {
                continue;
            };
            if fd.package.as_deref() == Some(package) {
                out.push(fd);
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        out
    }

    /// Installs every stale or missing archive. Reading and parsing fan out
    /// over a bounded pool; installation into the arena stays on the request
    /// thread.
    fn load_archives(&mut self, paths: &[PathBuf]) {
        let stale: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| self.packages.get(p).map_or(true, |e| e.is_stale()))
            .collect();
        if stale.is_empty() {
            return;
        }

        let parsed: Vec<(&PathBuf, Option<(i64, ExportData)>)> =
            match rayon::ThreadPoolBuilder::new()
                .num_threads(stale.len().min(MAX_LOADERS))
                .build()
            {
                Ok(pool) => pool.install(|| {
                    stale
                        .par_iter()
                        .map(|p| (*p, read_archive(p)))
                        .collect()
                }),
                Err(_) => stale.iter().map(|p| (*p, read_archive(p))).collect(),
            };

        for (path, loaded) in parsed {
            if let Some((mtime, export)) = loaded {
                self.packages.install(path, mtime, &export, &mut self.store);
            }
        }
    }

    /// Binds each import's alias to its package declaration in a file scope.
    fn bind_aliases(&mut self, imports: &[PackageImport], scope: ScopeId) {
        for imp in imports {
            let Some(entry) = self.packages.get(&imp.abs_path) else {
                continue;
            };
            let alias = match &imp.alias {
                Some(a) if a != "." && !self.config.deny_module_renames => a.clone(),
                _ => entry.default_alias.clone(),
            };
            self.store
                .scope_mut(scope)
                .entities
                .insert(alias, entry.main);
        }
    }

    /// The raw candidate set for a cursor context, before filtering.
    fn gather(&mut self, ctx: &CursorContext, inner: ScopeId) -> Vec<DeclId> {
        match &ctx.loc {
            CursorLoc::ImportPath => Vec::new(),
            CursorLoc::Expr(Some(e)) => match expr_to_decl(&mut self.store, e, inner) {
                Some(d) => self.members(d),
                None => Vec::new(),
            },
            CursorLoc::StructLiteral(t) => {
                match type_to_decl(&mut self.store, Some(t), inner) {
                    Some(d) => {
                        let mut fields = self.members(d);
                        fields.retain(|&id| self.store.decl(id).kind == DeclKind::Var);
                        fields
                    }
                    None => Vec::new(),
                }
            }
            // A dot whose left side did not parse offers nothing.
            CursorLoc::Expr(None) => Vec::new(),
            CursorLoc::Bare => self.in_scope(inner),
        }
    }

    /// Direct children of a declaration plus the transitive children of its
    /// embedded bases; a name closer to the root shadows the same name
    /// deeper down. Package members surface only when exported.
    fn members(&mut self, id: DeclId) -> Vec<DeclId> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut visited = Visited::default();
        self.collect_members(id, &mut out, &mut seen, &mut visited);
        out
    }

    fn collect_members(
        &mut self,
        id: DeclId,
        out: &mut Vec<DeclId>,
        seen: &mut FxHashSet<String>,
        visited: &mut Visited,
    ) {
        if !visited.insert(id) {
            return;
        }
        let (kind, children, embedded, typ, scope) = {
            let d = self.store.decl(id);
            (
                d.kind,
                d.children.clone(),
                d.embedded.clone(),
                d.typ.clone(),
                d.scope,
            )
        };
        let exported_only = kind == DeclKind::Package;
        for (name, cid) in &children {
            if exported_only && !is_exported(name) {
                continue;
            }
            if seen.insert(name.clone()) {
                out.push(*cid);
            }
        }
        for e in &embedded {
            if let Some(base) = type_to_decl(&mut self.store, Some(e), scope) {
                self.collect_members(base, out, seen, visited);
            }
        }
        // A type whose body is another named type inherits its members.
        if kind == DeclKind::Type {
            if let Some(next) = type_to_decl(&mut self.store, typ.as_deref(), scope) {
                if next != id {
                    self.collect_members(next, out, seen, visited);
                }
            }
        }
    }

    /// Every name visible from a scope, closer bindings shadowing farther
    /// ones; the universe scope contributes only on request.
    fn in_scope(&mut self, inner: ScopeId) -> Vec<DeclId> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut cursor = Some(inner);
        while let Some(s) = cursor {
            if s == DeclStore::UNIVERSE && !self.config.propose_builtins {
                break;
            }
            let scope = self.store.scope(s);
            for (name, &id) in &scope.entities {
                if seen.insert(name.clone()) {
                    out.push(id);
                }
            }
            cursor = scope.parent;
        }
        out
    }

    /// Filters, infers types, renders and sorts.
    fn render(&mut self, ids: Vec<DeclId>, ctx: &CursorContext) -> Vec<Candidate> {
        let mut kept: Vec<DeclId> = ids
            .into_iter()
            .filter(|&id| self.store.decl(id).matches())
            .collect();
        if self.config.class_filtering {
            if let Some(class) = ctx.class {
                kept.retain(|&id| self.store.decl(id).kind == class);
            }
        }

        if !ctx.partial.is_empty() {
            let exact: Vec<DeclId> = kept
                .iter()
                .copied()
                .filter(|&id| self.store.decl(id).name.starts_with(&ctx.partial))
                .collect();
            kept = if exact.is_empty() && self.config.ignore_case {
                let lower = ctx.partial.to_lowercase();
                kept.into_iter()
                    .filter(|&id| {
                        self.store.decl(id).name.to_lowercase().starts_with(&lower)
                    })
                    .collect()
            } else {
                exact
            };
        }

        let mut candidates = Vec::with_capacity(kept.len());
        for id in kept {
            let Some(candidate) = self.to_candidate(id) else {
                continue;
            };
            candidates.push(candidate);
        }
        candidates.sort_by(|a, b| (a.class, &a.name).cmp(&(b.class, &b.name)));
        debug!(count = candidates.len(), "candidates ready");
        candidates
    }

    /// Renders one declaration; `None` drops candidates whose type carries
    /// an unparsable subtree.
    fn to_candidate(&mut self, id: DeclId) -> Option<Candidate> {
        let (name, kind, typ) = {
            let d = self.store.decl(id);
            (d.name.clone(), d.kind, d.typ.clone())
        };
        let typ = match kind {
            DeclKind::Package => String::new(),
            DeclKind::Type => match typ {
                Some(t) => {
                    if !check_type_expr(&t) {
                        return None;
                    }
                    pretty_type(&t)
                }
                None => String::new(),
            },
            _ => match decl_infer_type(&mut self.store, id) {
                Some((t, _)) => {
                    if !check_type_expr(&t) {
                        return None;
                    }
                    pretty_type(&t)
                }
                None => String::new(),
            },
        };
        Some(Candidate {
            name,
            typ,
            class: kind,
        })
    }
}

/// Resolves the import specs of a parsed file against the importing
/// directory, dropping blank imports and unresolvable paths.
fn resolve_imports(decls: &[Decl], dir: &Path, lookup: &LookupContext) -> Vec<PackageImport> {
    let mut out = Vec::new();
    for decl in decls {
        let Decl::Import { specs } = decl else {
            continue;
        };
        for spec in specs {
            if spec.alias.as_deref() == Some("_") {
                continue;
            }
            match lookup.resolve(dir, &spec.path) {
                Some(abs_path) => out.push(PackageImport {
                    alias: spec.alias.clone(),
                    abs_path,
                }),
                None => debug!(path = %spec.path, "import does not resolve"),
            }
        }
    }
    out
}

/// Reads and parses one archive off-thread. `None` skips the slot: either
/// the file is gone or the export data is bad, and completion proceeds
/// without it.
fn read_archive(path: &Path) -> Option<(i64, ExportData)> {
    let mtime = file_mtime(path)?;
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            debug!(path = %path.display(), %err, "archive unreadable");
            return None;
        }
    };
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match parse_archive(&data, &name) {
        Ok(export) => Some((mtime, export)),
        Err(err) => {
            warn!(path = %path.display(), %err, "archive skipped");
            None
        }
    }
}
