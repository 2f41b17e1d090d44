//! Declarations, scopes and the arena that owns them.
//!
//! The whole semantic graph lives in a [`DeclStore`] split into two halves.
//! The persistent half holds the universe scope and everything imported
//! from package archives; the transient half holds per-request state built
//! from the edited buffer and is discarded wholesale after every request.
//! Ids carry the half in their high bit, so a stale transient id is cheap
//! to assert against. Persistent entries never reference transient ids;
//! merging goes the other way, by deep-copying into the transient half.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::syntax::ast::{Expr, ExprRef, Field};

/// Declaration class, ordered the way candidates sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeclKind {
    Const,
    Func,
    Package,
    Type,
    Var,
    /// Methods seen before their receiver type; promoted on merge.
    MethodsStub,
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeclKind::Const => "const",
            DeclKind::Func => "func",
            DeclKind::Package => "module",
            DeclKind::Type => "type",
            DeclKind::Var => "var",
            DeclKind::MethodsStub => "stub",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeclFlags(u8);

impl DeclFlags {
    /// Imported from another package; unexported names are invisible.
    pub const FOREIGN: DeclFlags = DeclFlags(1);
    /// Bound by a `range` clause; typed through the range rules.
    pub const RANGEVAR: DeclFlags = DeclFlags(2);

    pub fn contains(self, other: DeclFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DeclFlags {
    type Output = DeclFlags;
    fn bitor(self, rhs: DeclFlags) -> DeclFlags {
        DeclFlags(self.0 | rhs.0)
    }
}

const TRANSIENT_BIT: u32 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl DeclId {
    fn index(self) -> usize {
        (self.0 & !TRANSIENT_BIT) as usize
    }

    pub fn is_transient(self) -> bool {
        self.0 & TRANSIENT_BIT != 0
    }
}

impl ScopeId {
    fn index(self) -> usize {
        (self.0 & !TRANSIENT_BIT) as usize
    }

    pub fn is_transient(self) -> bool {
        self.0 & TRANSIENT_BIT != 0
    }
}

/// A single declaration with its children (fields and methods for structs,
/// methods for interfaces) and embedded types.
///
/// Names starting with `$` describe lifted anonymous types (`$s_N` for
/// structs, `$i_N` for interfaces); they never surface as candidates.
#[derive(Debug, Clone)]
pub struct Decl {
    pub name: String,
    pub kind: DeclKind,
    pub flags: DeclFlags,
    pub typ: Option<ExprRef>,
    /// Initializer, when the type is not known at parse time.
    pub value: Option<ExprRef>,
    /// Tuple component selected from a multi-valued `value`; `-1` when the
    /// value is single.
    pub value_index: i32,
    pub children: FxHashMap<String, DeclId>,
    pub embedded: Vec<ExprRef>,
    /// Scope this was declared in (not its visibility scope); inference
    /// resolves the type expression there.
    pub scope: ScopeId,
}

impl Decl {
    pub fn new(name: impl Into<String>, kind: DeclKind, scope: ScopeId) -> Decl {
        Decl {
            name: name.into(),
            kind,
            flags: DeclFlags::default(),
            typ: None,
            value: None,
            value_index: -1,
            children: FxHashMap::default(),
            embedded: Vec::new(),
            scope,
        }
    }

    pub fn var(
        name: impl Into<String>,
        typ: Option<ExprRef>,
        value: Option<ExprRef>,
        value_index: i32,
        scope: ScopeId,
    ) -> Decl {
        let mut d = Decl::new(name, DeclKind::Var, scope);
        d.typ = typ;
        d.value = value;
        d.value_index = value_index;
        d
    }

    /// Whether this declaration may surface as a completion candidate.
    pub fn matches(&self) -> bool {
        !self.name.starts_with('$') && self.kind != DeclKind::MethodsStub
    }
}

#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub entities: FxHashMap<String, DeclId>,
}

/// The two-half arena. [`DeclStore::UNIVERSE`] is always scope 0 in the
/// persistent half.
pub struct DeclStore {
    persistent: Vec<Decl>,
    transient: Vec<Decl>,
    persistent_scopes: Vec<Scope>,
    transient_scopes: Vec<Scope>,
    transient_mode: bool,
    anon_counter: u32,
}

impl DeclStore {
    pub const UNIVERSE: ScopeId = ScopeId(0);

    pub fn new() -> DeclStore {
        let mut store = DeclStore {
            persistent: Vec::new(),
            transient: Vec::new(),
            persistent_scopes: vec![Scope::default()],
            transient_scopes: Vec::new(),
            transient_mode: false,
            anon_counter: 0,
        };
        store.seed_universe();
        store
    }

    /// Switches which half subsequent allocations land in.
    pub fn set_transient(&mut self, on: bool) {
        self.transient_mode = on;
    }

    pub fn transient_mode(&self) -> bool {
        self.transient_mode
    }

    /// Drops all per-request state. Persistent entries survive untouched.
    pub fn clear_transient(&mut self) {
        self.transient.clear();
        self.transient_scopes.clear();
        self.transient_mode = false;
    }

    pub fn transient_len(&self) -> usize {
        self.transient.len()
    }

    // Allocation and access -----------------------------------------------

    pub fn alloc(&mut self, decl: Decl) -> DeclId {
        if self.transient_mode {
            self.transient.push(decl);
            DeclId((self.transient.len() - 1) as u32 | TRANSIENT_BIT)
        } else {
            self.persistent.push(decl);
            DeclId((self.persistent.len() - 1) as u32)
        }
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        if id.is_transient() {
            &self.transient[id.index()]
        } else {
            &self.persistent[id.index()]
        }
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        if id.is_transient() {
            &mut self.transient[id.index()]
        } else {
            &mut self.persistent[id.index()]
        }
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let scope = Scope {
            parent,
            entities: FxHashMap::default(),
        };
        if self.transient_mode {
            self.transient_scopes.push(scope);
            ScopeId((self.transient_scopes.len() - 1) as u32 | TRANSIENT_BIT)
        } else {
            self.persistent_scopes.push(scope);
            ScopeId((self.persistent_scopes.len() - 1) as u32)
        }
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        if id.is_transient() {
            &self.transient_scopes[id.index()]
        } else {
            &self.persistent_scopes[id.index()]
        }
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        if id.is_transient() {
            &mut self.transient_scopes[id.index()]
        } else {
            &mut self.persistent_scopes[id.index()]
        }
    }

    // Scope operations -----------------------------------------------------

    /// Resolves a name through the scope chain.
    pub fn lookup(&self, mut scope: ScopeId, name: &str) -> Option<DeclId> {
        loop {
            let s = self.scope(scope);
            if let Some(&id) = s.entities.get(name) {
                return Some(id);
            }
            scope = s.parent?;
        }
    }

    /// Adds a declaration to a scope, or returns the one already there.
    pub fn add_named(&mut self, scope: ScopeId, id: DeclId) -> DeclId {
        let name = self.decl(id).name.clone();
        let s = self.scope_mut(scope);
        *s.entities.entry(name).or_insert(id)
    }

    /// Unconditionally (re)binds a name in a scope.
    pub fn replace_named(&mut self, scope: ScopeId, id: DeclId) {
        let name = self.decl(id).name.clone();
        self.scope_mut(scope).entities.insert(name, id);
    }

    /// Opens a fresh child scope unless the current one is still empty.
    pub fn advance_scope(&mut self, scope: ScopeId) -> ScopeId {
        if self.scope(scope).entities.is_empty() {
            scope
        } else {
            self.new_scope(Some(scope))
        }
    }

    /// Merges a declaration into a scope. A same-name entry is deep-copied
    /// first so shared package state is never mutated, then expanded or
    /// replaced in place.
    pub fn merge_decl(&mut self, scope: ScopeId, id: DeclId) {
        let name = self.decl(id).name.clone();
        let existing = self.scope(scope).entities.get(&name).copied();
        match existing {
            None => {
                self.scope_mut(scope).entities.insert(name, id);
            }
            Some(old) => {
                let copy = self.deep_copy(old);
                self.expand_or_replace(copy, id);
                self.scope_mut(scope).entities.insert(name, copy);
            }
        }
    }

    /// Shallow-copies a declaration (children map and embedded list are
    /// cloned, the declarations they point at are shared).
    pub fn deep_copy(&mut self, id: DeclId) -> DeclId {
        let copy = self.decl(id).clone();
        self.alloc(copy)
    }

    /// Combines two same-name declarations. A methods stub on either side
    /// expands the other; otherwise the newer declaration wins and any
    /// children it carries are merged in.
    pub fn expand_or_replace(&mut self, target: DeclId, other: DeclId) {
        let other_decl = self.decl(other).clone();
        {
            let t = self.decl_mut(target);
            if t.kind == DeclKind::MethodsStub {
                t.typ = other_decl.typ.clone();
                t.kind = other_decl.kind;
                t.flags = other_decl.flags;
            } else if other_decl.kind != DeclKind::MethodsStub {
                t.typ = other_decl.typ.clone();
                t.kind = other_decl.kind;
                t.flags = other_decl.flags;
                t.value = other_decl.value.clone();
                t.value_index = other_decl.value_index;
            }
        }
        for (_, child) in other_decl.children.iter() {
            self.add_child(target, *child);
        }
        if !other_decl.embedded.is_empty() {
            let t = self.decl_mut(target);
            t.embedded = other_decl.embedded.clone();
            t.scope = other_decl.scope;
        }
    }

    pub fn add_child(&mut self, parent: DeclId, child: DeclId) {
        let name = self.decl(child).name.clone();
        self.decl_mut(parent).children.insert(name, child);
    }

    // Construction from AST -----------------------------------------------

    /// Builds a declaration with children and embedded types derived from
    /// its type expression.
    pub fn new_decl_full(
        &mut self,
        name: impl Into<String>,
        kind: DeclKind,
        flags: DeclFlags,
        typ: Option<ExprRef>,
        value: Option<ExprRef>,
        value_index: i32,
        scope: ScopeId,
    ) -> DeclId {
        let children = typ
            .as_deref()
            .map(|t| self.type_to_children(t, flags, scope))
            .unwrap_or_default();
        let embedded = typ.as_deref().map(type_to_embedded).unwrap_or_default();
        self.alloc(Decl {
            name: name.into(),
            kind,
            flags,
            typ,
            value,
            value_index,
            children,
            embedded,
            scope,
        })
    }

    /// Children of a struct (fields as vars, with anonymous fields named
    /// after their type) or interface (methods as funcs).
    pub fn type_to_children(
        &mut self,
        typ: &Expr,
        flags: DeclFlags,
        scope: ScopeId,
    ) -> FxHashMap<String, DeclId> {
        match typ {
            Expr::StructType(fields) => {
                self.fields_to_children(fields, DeclKind::Var, flags, scope, true)
            }
            Expr::InterfaceType(fields) => {
                self.fields_to_children(fields, DeclKind::Func, flags, scope, false)
            }
            _ => FxHashMap::default(),
        }
    }

    fn fields_to_children(
        &mut self,
        fields: &[Field],
        kind: DeclKind,
        flags: DeclFlags,
        scope: ScopeId,
        add_anonymous: bool,
    ) -> FxHashMap<String, DeclId> {
        let foreign = flags.contains(DeclFlags::FOREIGN);
        let mut out = FxHashMap::default();
        for field in fields {
            for name in &field.names {
                if foreign && !is_exported(name) {
                    continue;
                }
                let mut d = Decl::new(name.clone(), kind, scope);
                d.typ = Some(field.typ.clone());
                d.flags = flags;
                let id = self.alloc(d);
                out.insert(name.clone(), id);
            }
            if kind == DeclKind::Var && field.names.is_empty() && add_anonymous {
                let tp = crate::semantic::infer::get_type_path(Some(&field.typ));
                if tp.name.is_empty() || (foreign && !is_exported(&tp.name)) {
                    continue;
                }
                let mut d = Decl::new(tp.name.clone(), kind, scope);
                d.typ = Some(field.typ.clone());
                d.flags = flags;
                let id = self.alloc(d);
                out.insert(tp.name, id);
            }
        }
        out
    }

    // Anonymous type lifting ----------------------------------------------

    /// Rewrites an expression so that every anonymous struct or interface
    /// type in a type position becomes a reference to a freshly registered
    /// `$s_N` / `$i_N` type declaration. The original tree is untouched.
    pub fn anonymify(&mut self, e: &ExprRef, flags: DeclFlags, scope: ScopeId) -> ExprRef {
        match &**e {
            Expr::CompositeLit { typ, elts } => ExprRef::new(Expr::CompositeLit {
                typ: typ.as_ref().map(|t| self.lift_anon(t, flags, scope)),
                elts: elts
                    .iter()
                    .map(|x| self.anonymify(x, flags, scope))
                    .collect(),
            }),
            Expr::MapType { key, value } => ExprRef::new(Expr::MapType {
                key: self.lift_anon(key, flags, scope),
                value: self.lift_anon(value, flags, scope),
            }),
            Expr::ArrayType { len, elem } => ExprRef::new(Expr::ArrayType {
                len: len.clone(),
                elem: self.lift_anon(elem, flags, scope),
            }),
            Expr::Ellipsis(elem) => ExprRef::new(Expr::Ellipsis(self.lift_anon(elem, flags, scope))),
            Expr::ChanType { dir, elem } => ExprRef::new(Expr::ChanType {
                dir: *dir,
                elem: self.lift_anon(elem, flags, scope),
            }),
            Expr::Call(fun, args) => ExprRef::new(Expr::Call(
                self.lift_anon(fun, flags, scope),
                args.iter()
                    .map(|x| self.anonymify(x, flags, scope))
                    .collect(),
            )),
            Expr::Paren(x) => ExprRef::new(Expr::Paren(self.lift_anon(x, flags, scope))),
            Expr::Selector(x, sel) => {
                ExprRef::new(Expr::Selector(self.anonymify(x, flags, scope), sel.clone()))
            }
            Expr::Star(x) => ExprRef::new(Expr::Star(self.anonymify(x, flags, scope))),
            Expr::Unary(op, x) => ExprRef::new(Expr::Unary(*op, self.anonymify(x, flags, scope))),
            Expr::Binary(op, x, y) => ExprRef::new(Expr::Binary(
                *op,
                self.anonymify(x, flags, scope),
                self.anonymify(y, flags, scope),
            )),
            Expr::Index(x, i) => ExprRef::new(Expr::Index(
                self.anonymify(x, flags, scope),
                self.anonymify(i, flags, scope),
            )),
            Expr::Slice(x) => ExprRef::new(Expr::Slice(self.anonymify(x, flags, scope))),
            Expr::KeyValue(k, v) => ExprRef::new(Expr::KeyValue(
                self.anonymify(k, flags, scope),
                self.anonymify(v, flags, scope),
            )),
            Expr::TypeAssert { x, typ } => ExprRef::new(Expr::TypeAssert {
                x: self.anonymify(x, flags, scope),
                typ: typ.as_ref().map(|t| self.lift_anon(t, flags, scope)),
            }),
            Expr::StructType(fields) => {
                ExprRef::new(Expr::StructType(self.lift_fields(fields, flags, scope)))
            }
            Expr::InterfaceType(fields) => {
                ExprRef::new(Expr::InterfaceType(self.lift_fields(fields, flags, scope)))
            }
            Expr::FuncType(sig) => ExprRef::new(Expr::FuncType(std::sync::Arc::new(
                crate::syntax::ast::Signature {
                    params: self.lift_fields(&sig.params, flags, scope).to_vec(),
                    results: self.lift_fields(&sig.results, flags, scope).to_vec(),
                },
            ))),
            Expr::FuncLit { sig, body } => ExprRef::new(Expr::FuncLit {
                sig: sig.clone(),
                body: body.clone(),
            }),
            _ => e.clone(),
        }
    }

    fn lift_fields(
        &mut self,
        fields: &[Field],
        flags: DeclFlags,
        scope: ScopeId,
    ) -> std::sync::Arc<Vec<Field>> {
        std::sync::Arc::new(
            fields
                .iter()
                .map(|f| Field::new(f.names.clone(), self.lift_anon(&f.typ, flags, scope)))
                .collect(),
        )
    }

    /// Like [`anonymify`](Self::anonymify), but also lifts the expression
    /// itself when it is an anonymous struct or interface type, as happens
    /// with `var x struct { ... }`.
    pub fn anonymify_type(&mut self, e: &ExprRef, flags: DeclFlags, scope: ScopeId) -> ExprRef {
        self.lift_anon(e, flags, scope)
    }

    fn lift_anon(&mut self, e: &ExprRef, flags: DeclFlags, scope: ScopeId) -> ExprRef {
        let rewritten = self.anonymify(e, flags, scope);
        let name = match &*rewritten {
            Expr::StructType(_) => {
                let n = self.anon_counter;
                self.anon_counter += 1;
                format!("$s_{n}")
            }
            Expr::InterfaceType(_) => {
                let n = self.anon_counter;
                self.anon_counter += 1;
                format!("$i_{n}")
            }
            _ => return rewritten,
        };
        let id = self.new_decl_full(
            name.clone(),
            DeclKind::Type,
            flags,
            Some(rewritten),
            None,
            -1,
            scope,
        );
        self.add_named(scope, id);
        Expr::ident(name)
    }

    // Universe -------------------------------------------------------------

    fn seed_universe(&mut self) {
        let builtin = Expr::ident("built-in");

        let types = [
            "bool",
            "byte",
            "complex64",
            "complex128",
            "float32",
            "float64",
            "int8",
            "int16",
            "int32",
            "int64",
            "string",
            "uint8",
            "uint16",
            "uint32",
            "uint64",
            "int",
            "uint",
            "uintptr",
            "rune",
        ];
        for name in types {
            let mut d = Decl::new(name, DeclKind::Type, Self::UNIVERSE);
            d.typ = Some(builtin.clone());
            let id = self.alloc(d);
            self.add_named(Self::UNIVERSE, id);
        }

        for name in ["true", "false", "iota", "nil"] {
            let mut d = Decl::new(name, DeclKind::Const, Self::UNIVERSE);
            d.typ = Some(builtin.clone());
            let id = self.alloc(d);
            self.add_named(Self::UNIVERSE, id);
        }

        // Built-in functions carry display-only pseudo signatures; the call
        // inference special-cases them by name.
        let funcs = [
            ("append", "func([]type, ...type) []type"),
            ("cap", "func(container) int"),
            ("close", "func(channel)"),
            ("complex", "func(real, imag) complex"),
            ("copy", "func(dst, src)"),
            ("delete", "func(map[typeA]typeB, typeA)"),
            ("imag", "func(complex)"),
            ("len", "func(container) int"),
            ("make", "func(type, len[, cap]) type"),
            ("new", "func(type) *type"),
            ("panic", "func(interface{})"),
            ("print", "func(...interface{})"),
            ("println", "func(...interface{})"),
            ("real", "func(complex)"),
            ("recover", "func() interface{}"),
        ];
        for (name, typ) in funcs {
            let mut d = Decl::new(name, DeclKind::Func, Self::UNIVERSE);
            d.typ = Some(Expr::ident(typ));
            let id = self.alloc(d);
            self.add_named(Self::UNIVERSE, id);
        }

        // The error interface with its Error() string method.
        let error_sig = crate::syntax::ast::Signature {
            params: vec![],
            results: vec![Field::new(vec![], Expr::ident("string"))],
        };
        let mut method = Decl::new("Error", DeclKind::Func, Self::UNIVERSE);
        method.typ = Some(ExprRef::new(Expr::FuncType(std::sync::Arc::new(error_sig))));
        let method_id = self.alloc(method);
        let mut error_decl = Decl::new("error", DeclKind::Type, Self::UNIVERSE);
        error_decl.typ = Some(ExprRef::new(Expr::InterfaceType(std::sync::Arc::new(
            vec![],
        ))));
        error_decl.children.insert("Error".to_string(), method_id);
        let id = self.alloc(error_decl);
        self.add_named(Self::UNIVERSE, id);
    }
}

impl Default for DeclStore {
    fn default() -> Self {
        DeclStore::new()
    }
}

pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Embedded type expressions of a struct or interface; archive records mark
/// embedded fields with the placeholder name `?`.
pub fn type_to_embedded(typ: &Expr) -> Vec<ExprRef> {
    let fields = match typ {
        Expr::StructType(fields) | Expr::InterfaceType(fields) => fields,
        _ => return Vec::new(),
    };
    fields
        .iter()
        .filter(|f| f.names.is_empty() || f.names[0] == "?")
        .map(|f| f.typ.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::pretty_type;
    use std::sync::Arc;

    #[test]
    fn universe_has_builtins() {
        let store = DeclStore::new();
        let int = store.lookup(DeclStore::UNIVERSE, "int").unwrap();
        assert_eq!(store.decl(int).kind, DeclKind::Type);
        let nil = store.lookup(DeclStore::UNIVERSE, "nil").unwrap();
        assert_eq!(store.decl(nil).kind, DeclKind::Const);
        let len = store.lookup(DeclStore::UNIVERSE, "len").unwrap();
        assert_eq!(store.decl(len).kind, DeclKind::Func);
        let err = store.lookup(DeclStore::UNIVERSE, "error").unwrap();
        assert!(store.decl(err).children.contains_key("Error"));
    }

    #[test]
    fn lookup_walks_parent_chain() {
        let mut store = DeclStore::new();
        let inner = store.new_scope(Some(DeclStore::UNIVERSE));
        assert!(store.lookup(inner, "string").is_some());
        assert!(store.lookup(inner, "no-such-name").is_none());
    }

    #[test]
    fn add_named_keeps_first_binding() {
        let mut store = DeclStore::new();
        let s = store.new_scope(Some(DeclStore::UNIVERSE));
        let a = store.alloc(Decl::new("x", DeclKind::Var, s));
        let b = store.alloc(Decl::new("x", DeclKind::Const, s));
        assert_eq!(store.add_named(s, a), a);
        assert_eq!(store.add_named(s, b), a);
    }

    #[test]
    fn merge_promotes_methods_stub() {
        let mut store = DeclStore::new();
        let s = store.new_scope(Some(DeclStore::UNIVERSE));

        // Method arrives before its receiver type.
        let walk = store.alloc(Decl::new("Walk", DeclKind::Func, s));
        let mut stub = Decl::new("Tree", DeclKind::MethodsStub, s);
        stub.children.insert("Walk".into(), walk);
        let stub = store.alloc(stub);
        store.merge_decl(s, stub);

        let struct_type = ExprRef::new(Expr::StructType(Arc::new(vec![Field::new(
            vec!["Left".into()],
            Expr::ident("int"),
        )])));
        let typ = store.new_decl_full(
            "Tree",
            DeclKind::Type,
            DeclFlags::default(),
            Some(struct_type),
            None,
            -1,
            s,
        );
        store.merge_decl(s, typ);

        let merged = store.lookup(s, "Tree").unwrap();
        let d = store.decl(merged);
        assert_eq!(d.kind, DeclKind::Type);
        assert!(d.children.contains_key("Walk"));
        assert!(d.children.contains_key("Left"));
    }

    #[test]
    fn merge_does_not_mutate_original() {
        let mut store = DeclStore::new();
        let s = store.new_scope(Some(DeclStore::UNIVERSE));
        let orig = store.new_decl_full(
            "T",
            DeclKind::Type,
            DeclFlags::default(),
            Some(ExprRef::new(Expr::StructType(Arc::new(vec![])))),
            None,
            -1,
            s,
        );
        store.replace_named(s, orig);

        let mut stub = Decl::new("T", DeclKind::MethodsStub, s);
        let m = store.alloc(Decl::new("M", DeclKind::Func, s));
        stub.children.insert("M".into(), m);
        let stub = store.alloc(stub);
        store.merge_decl(s, stub);

        assert!(store.decl(orig).children.is_empty());
        let merged = store.lookup(s, "T").unwrap();
        assert_ne!(merged, orig);
        assert!(store.decl(merged).children.contains_key("M"));
    }

    #[test]
    fn clear_transient_drops_request_state() {
        let mut store = DeclStore::new();
        store.set_transient(true);
        let s = store.new_scope(Some(DeclStore::UNIVERSE));
        let id = store.alloc(Decl::new("local", DeclKind::Var, s));
        assert!(id.is_transient());
        assert!(s.is_transient());
        store.clear_transient();
        assert_eq!(store.transient_len(), 0);
        // Universe unaffected.
        assert!(store.lookup(DeclStore::UNIVERSE, "int").is_some());
    }

    #[test]
    fn anonymify_lifts_struct_literal_type() {
        let mut store = DeclStore::new();
        let s = store.new_scope(Some(DeclStore::UNIVERSE));
        let lit = ExprRef::new(Expr::CompositeLit {
            typ: Some(ExprRef::new(Expr::StructType(Arc::new(vec![Field::new(
                vec!["X".into()],
                Expr::ident("int"),
            )])))),
            elts: vec![],
        });
        let rewritten = store.anonymify(&lit, DeclFlags::default(), s);
        let Expr::CompositeLit { typ, .. } = &*rewritten else {
            panic!("expected composite literal");
        };
        let Some(t) = typ else { panic!("missing type") };
        let Expr::Ident(name) = &**t else {
            panic!("expected lifted ident, got {t:?}");
        };
        assert!(name.starts_with("$s_"));
        let lifted = store.lookup(s, name).unwrap();
        assert!(store.decl(lifted).children.contains_key("X"));
        assert!(!store.decl(lifted).matches());
        assert_eq!(pretty_type(&Expr::Ident(name.clone())), "struct");
    }

    #[test]
    fn embedded_fields_collect_from_struct_and_interface() {
        let struct_type = Expr::StructType(Arc::new(vec![
            Field::new(vec![], Expr::ident("Base")),
            Field::new(vec!["Named".into()], Expr::ident("int")),
            Field::new(vec!["?".into()], Expr::ident("Mixin")),
        ]));
        let embedded = type_to_embedded(&struct_type);
        assert_eq!(embedded.len(), 2);
    }
}
