//! Type inference over declaration values and expressions.
//!
//! Inference answers "what type does this expression have, and in which
//! scope does that type expression make sense". It never evaluates
//! constants and it gives up (returns `None`) rather than guessing.
//!
//! Cycle handling: inference of a declaration's initializer guards against
//! self-referential values with a visited set threaded through the call
//! tree; type-alias chains and embedded-type walks each guard their own
//! recursion with a fresh set per entry, matching the mark/unmark
//! discipline of path-scoped traversal.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::semantic::decl::{DeclId, DeclKind, DeclStore, ScopeId};
use crate::syntax::ast::{BinaryOp, Expr, ExprRef, Signature, UnaryOp};

pub type Visited = FxHashSet<DeclId>;

/// `pkg.Name`, `Name` or neither, extracted from a type expression after
/// stripping pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypePath {
    pub pkg: String,
    pub name: String,
}

impl TypePath {
    pub fn is_nil(&self) -> bool {
        self.pkg.is_empty() && self.name.is_empty()
    }
}

pub fn get_type_path(e: Option<&Expr>) -> TypePath {
    let Some(e) = e else {
        return TypePath::default();
    };
    match e {
        Expr::Ident(name) => TypePath {
            pkg: String::new(),
            name: name.clone(),
        },
        Expr::Star(x) => get_type_path(Some(x)),
        Expr::Selector(x, sel) => {
            let pkg = match &**x {
                Expr::Ident(name) => name.clone(),
                _ => String::new(),
            };
            TypePath {
                pkg,
                name: sel.clone(),
            }
        }
        _ => TypePath::default(),
    }
}

/// Resolves a type path to its declaration. A qualified path whose package
/// cannot be found fails outright instead of falling back to the bare name.
pub fn lookup_path(store: &mut DeclStore, tp: &TypePath, scope: ScopeId) -> Option<DeclId> {
    if tp.is_nil() {
        return None;
    }
    if !tp.pkg.is_empty() {
        let pkg = store.lookup(scope, &tp.pkg)?;
        return if tp.name.is_empty() {
            Some(pkg)
        } else {
            find_child(store, pkg, &tp.name)
        };
    }
    store.lookup(scope, &tp.name)
}

pub fn type_to_decl(store: &mut DeclStore, t: Option<&Expr>, scope: ScopeId) -> Option<DeclId> {
    let tp = get_type_path(t);
    let id = lookup_path(store, &tp, scope)?;
    // A variable "declaration" here means the type expression points back
    // at a value; that is never a usable type.
    if store.decl(id).kind == DeclKind::Var {
        return None;
    }
    Some(id)
}

pub fn expr_to_decl(store: &mut DeclStore, e: &ExprRef, scope: ScopeId) -> Option<DeclId> {
    let (t, s, _) = infer_type_of(store, e, scope, -1)?;
    type_to_decl(store, Some(&t), s)
}

// Child lookup -------------------------------------------------------------

/// Looks a name up among a declaration's direct children, advancing through
/// named-type indirections until a struct or interface is reached.
pub fn find_child(store: &mut DeclStore, id: DeclId, name: &str) -> Option<DeclId> {
    if let Some(&c) = store.decl(id).children.get(name) {
        return Some(c);
    }
    let adv = advance_to_struct_or_interface(store, id, &mut Visited::default())?;
    if adv != id {
        find_child(store, adv, name)
    } else {
        None
    }
}

/// [`find_child`], falling back to a depth-first walk of embedded types.
/// The first match wins; embedding cycles terminate.
pub fn find_child_transitive(store: &mut DeclStore, id: DeclId, name: &str) -> Option<DeclId> {
    find_child_transitive_inner(store, id, name, &mut Visited::default())
}

fn find_child_transitive_inner(
    store: &mut DeclStore,
    id: DeclId,
    name: &str,
    walked: &mut Visited,
) -> Option<DeclId> {
    if !walked.insert(id) {
        return None;
    }
    let mut found = find_child(store, id, name);
    if found.is_none() {
        let (embedded, scope) = {
            let d = store.decl(id);
            (d.embedded.clone(), d.scope)
        };
        for e in embedded {
            if let Some(td) = type_to_decl(store, Some(&e), scope) {
                if let Some(c) = find_child_transitive_inner(store, td, name, walked) {
                    found = Some(c);
                    break;
                }
            }
        }
    }
    walked.remove(&id);
    found
}

fn advance_to_struct_or_interface(
    store: &mut DeclStore,
    id: DeclId,
    chain: &mut Visited,
) -> Option<DeclId> {
    if !chain.insert(id) {
        return None;
    }
    let (typ, scope, is_si) = {
        let d = store.decl(id);
        let is_si = d.typ.as_deref().is_some_and(struct_interface_predicate);
        (d.typ.clone(), d.scope, is_si)
    };
    let result = if is_si {
        Some(id)
    } else {
        match type_to_decl(store, typ.as_deref(), scope) {
            Some(next) => advance_to_struct_or_interface(store, next, chain),
            None => None,
        }
    };
    chain.remove(&id);
    result
}

// Advancing to a shape -----------------------------------------------------

type TypePredicate = fn(&Expr) -> bool;

/// Follows named-type indirections until the type expression satisfies the
/// predicate.
fn advance_to_type(
    store: &mut DeclStore,
    pred: TypePredicate,
    v: ExprRef,
    scope: ScopeId,
) -> Option<(ExprRef, ScopeId)> {
    advance_to_type_inner(store, pred, v, scope, &mut Visited::default())
}

fn advance_to_type_inner(
    store: &mut DeclStore,
    pred: TypePredicate,
    v: ExprRef,
    scope: ScopeId,
    chain: &mut Visited,
) -> Option<(ExprRef, ScopeId)> {
    if pred(&v) {
        return Some((v, scope));
    }
    let id = type_to_decl(store, Some(&v), scope)?;
    if !chain.insert(id) {
        return None;
    }
    let (typ, dscope) = {
        let d = store.decl(id);
        (d.typ.clone(), d.scope)
    };
    let result = typ.and_then(|t| advance_to_type_inner(store, pred, t, dscope, chain));
    chain.remove(&id);
    result
}

fn struct_interface_predicate(v: &Expr) -> bool {
    matches!(v, Expr::StructType(_) | Expr::InterfaceType(_))
}

fn chan_predicate(v: &Expr) -> bool {
    matches!(v, Expr::ChanType { .. })
}

fn index_predicate(v: &Expr) -> bool {
    matches!(v, Expr::ArrayType { .. } | Expr::MapType { .. } | Expr::Ellipsis(_))
}

fn star_predicate(v: &Expr) -> bool {
    matches!(v, Expr::Star(_))
}

fn func_predicate(v: &Expr) -> bool {
    matches!(v, Expr::FuncType(_))
}

fn range_predicate(v: &Expr) -> bool {
    match v {
        Expr::Ident(name) => name == "string",
        Expr::ArrayType { .. } | Expr::MapType { .. } | Expr::ChanType { .. } | Expr::Ellipsis(_) => {
            true
        }
        _ => false,
    }
}

// Expression inference -----------------------------------------------------

/// Infers the type of an expression. Returns the type expression, the scope
/// it resolves in, and whether the expression itself denotes a type. For a
/// multi-valued expression `index` selects the tuple component; `-1` means
/// single-valued.
pub fn infer_type_of(
    store: &mut DeclStore,
    e: &ExprRef,
    scope: ScopeId,
    index: i32,
) -> Option<(ExprRef, ScopeId, bool)> {
    infer_type(store, e, scope, index, &mut Visited::default())
}

pub(crate) fn infer_type(
    store: &mut DeclStore,
    e: &ExprRef,
    scope: ScopeId,
    index: i32,
    visited: &mut Visited,
) -> Option<(ExprRef, ScopeId, bool)> {
    match &**e {
        Expr::CompositeLit { typ, .. } => typ.clone().map(|t| (t, scope, true)),
        Expr::BasicLit(lit) => Some((
            Expr::ident(literal_type_name(lit)),
            DeclStore::UNIVERSE,
            false,
        )),
        Expr::Ident(name) => {
            let id = store.lookup(scope, name)?;
            if store.decl(id).kind == DeclKind::Package {
                return Some((e.clone(), scope, false));
            }
            let is_type = store.decl(id).kind == DeclKind::Type;
            let (typ, s) = decl_infer_type_inner(store, id, visited)?;
            Some((typ, s, is_type))
        }
        Expr::Unary(UnaryOp::Addr, x) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            Some((Arc::new(Expr::Star(it)), s, false))
        }
        Expr::Unary(UnaryOp::Recv, x) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            match index {
                -1 | 0 => {
                    let (it, s) = advance_to_type(store, chan_predicate, it, s)?;
                    match &*it {
                        Expr::ChanType { elem, .. } => Some((elem.clone(), s, false)),
                        _ => None,
                    }
                }
                // `v, ok := <-ch` second value.
                1 => Some((Expr::ident("bool"), DeclStore::UNIVERSE, false)),
                _ => None,
            }
        }
        Expr::Unary(UnaryOp::Arith, x) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            Some((it, s, false))
        }
        Expr::Binary(BinaryOp::Logic, _, _) => {
            Some((Expr::ident("bool"), DeclStore::UNIVERSE, false))
        }
        Expr::Binary(BinaryOp::Arith, x, y) => {
            // Both sides have the same type; take whichever infers.
            let r = infer_type(store, x, scope, -1, visited)
                .or_else(|| infer_type(store, y, scope, -1, visited))?;
            Some((r.0, r.1, false))
        }
        Expr::Binary(BinaryOp::Shift, x, _) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            Some((it, s, false))
        }
        Expr::Index(x, _) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            let (it, s) = advance_to_type(store, index_predicate, it, s)?;
            match &*it {
                Expr::ArrayType { elem, .. } | Expr::Ellipsis(elem) => {
                    Some((elem.clone(), s, false))
                }
                Expr::MapType { value, .. } => match index {
                    -1 | 0 => Some((value.clone(), s, false)),
                    1 => Some((Expr::ident("bool"), DeclStore::UNIVERSE, false)),
                    _ => None,
                },
                _ => None,
            }
        }
        Expr::Slice(x) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            let (it, s) = advance_to_type(store, index_predicate, it, s)?;
            match &*it {
                Expr::ArrayType { elem, .. } => Some((
                    Arc::new(Expr::ArrayType {
                        len: None,
                        elem: elem.clone(),
                    }),
                    s,
                    false,
                )),
                _ => None,
            }
        }
        Expr::Star(x) => {
            let (it, s, is_type) = infer_type(store, x, scope, -1, visited)?;
            if is_type {
                Some((Arc::new(Expr::Star(it)), s, true))
            } else {
                let (it, s) = advance_to_type(store, star_predicate, it, s)?;
                match &*it {
                    Expr::Star(inner) => Some((inner.clone(), s, false)),
                    _ => None,
                }
            }
        }
        Expr::Call(fun, args) => {
            let (it, s, is_type) = infer_type(store, fun, scope, -1, visited)?;
            if is_type {
                // A conversion yields a value of the named type.
                return Some((it, scope, false));
            }
            if let Expr::Ident(type_name) = &*it {
                if let Some((t, s)) = check_builtin_call(store, type_name, fun, args, scope, visited)
                {
                    return Some((t, s, false));
                }
            }
            let (it, _) = advance_to_type(store, func_predicate, it, s)?;
            match &*it {
                Expr::FuncType(sig) => Some((func_return_type(sig, index)?, s, false)),
                _ => None,
            }
        }
        Expr::Paren(x) => infer_type(store, x, scope, index, visited),
        Expr::Selector(x, sel) => {
            let (it, s, _) = infer_type(store, x, scope, -1, visited)?;
            let d = type_to_decl(store, Some(&it), s)?;
            let c = find_child_transitive(store, d, sel)?;
            if store.decl(c).kind == DeclKind::Type {
                Some((e.clone(), scope, true))
            } else {
                let (typ, s) = decl_infer_type_inner(store, c, visited)?;
                Some((typ, s, false))
            }
        }
        Expr::FuncLit { sig, .. } => Some((Arc::new(Expr::FuncType(sig.clone())), scope, false)),
        Expr::TypeAssert { x, typ } => match typ {
            None => infer_type(store, x, scope, -1, visited),
            Some(t) => match index {
                -1 | 0 => {
                    let (it, _, _) = infer_type(store, t, scope, -1, visited)?;
                    Some((it, scope, false))
                }
                1 => Some((Expr::ident("bool"), DeclStore::UNIVERSE, false)),
                _ => None,
            },
        },
        _ if e.is_type_expr() => Some((e.clone(), scope, true)),
        _ => None,
    }
}

/// Infers a declaration's type from its initializer, caching the result on
/// the declaration.
pub fn decl_infer_type(store: &mut DeclStore, id: DeclId) -> Option<(ExprRef, ScopeId)> {
    decl_infer_type_inner(store, id, &mut Visited::default())
}

fn decl_infer_type_inner(
    store: &mut DeclStore,
    id: DeclId,
    visited: &mut Visited,
) -> Option<(ExprRef, ScopeId)> {
    use crate::semantic::decl::DeclFlags;

    let (kind, flags, typ, value, value_index, dscope, name) = {
        let d = store.decl(id);
        (
            d.kind,
            d.flags,
            d.typ.clone(),
            d.value.clone(),
            d.value_index,
            d.scope,
            d.name.clone(),
        )
    };

    if flags.contains(DeclFlags::RANGEVAR) {
        let value = value?;
        let (t, s) = infer_range_type(store, &value, dscope, value_index, visited)?;
        store.decl_mut(id).typ = Some(t.clone());
        return Some((t, s));
    }

    match kind {
        // Packages are handled in selector inference directly.
        DeclKind::Package => return None,
        DeclKind::Type => return Some((Expr::ident(name), dscope)),
        _ => {}
    }

    if let (Some(t), None) = (&typ, &value) {
        return Some((t.clone(), dscope));
    }

    if !visited.insert(id) {
        return None;
    }
    let result = value.and_then(|v| infer_type(store, &v, dscope, value_index, visited));
    visited.remove(&id);

    let (t, s, _) = result?;
    store.decl_mut(id).typ = Some(t.clone());
    Some((t, s))
}

/// Range clause typing:
/// `int, rune` over strings, `int, elem` over slices and arrays,
/// `key, value` over maps, `elem, _` over channels.
fn infer_range_type(
    store: &mut DeclStore,
    e: &ExprRef,
    scope: ScopeId,
    value_index: i32,
    visited: &mut Visited,
) -> Option<(ExprRef, ScopeId)> {
    let (t, s, _) = infer_type(store, e, scope, -1, visited)?;
    let (t, s) = advance_to_type(store, range_predicate, t, s)?;

    let (first, second): (Option<(ExprRef, ScopeId)>, Option<(ExprRef, ScopeId)>) = match &*t {
        Expr::Ident(name) if name == "string" => (
            Some((Expr::ident("int"), DeclStore::UNIVERSE)),
            Some((Expr::ident("rune"), DeclStore::UNIVERSE)),
        ),
        Expr::ArrayType { elem, .. } | Expr::Ellipsis(elem) => (
            Some((Expr::ident("int"), DeclStore::UNIVERSE)),
            Some((elem.clone(), s)),
        ),
        Expr::MapType { key, value } => (Some((key.clone(), s)), Some((value.clone(), s))),
        Expr::ChanType { elem, .. } => (Some((elem.clone(), s)), None),
        _ => (None, None),
    };

    match value_index {
        0 => first,
        1 => second,
        _ => None,
    }
}

/// Built-in functions get their result types by name; their declared
/// "signatures" are display-only.
fn check_builtin_call(
    store: &mut DeclStore,
    type_name: &str,
    fun: &Expr,
    args: &[ExprRef],
    scope: ScopeId,
    visited: &mut Visited,
) -> Option<(ExprRef, ScopeId)> {
    if !type_name.starts_with("func(") {
        return None;
    }
    let Expr::Ident(name) = fun else {
        return None;
    };
    match name.as_str() {
        "new" => args
            .first()
            .map(|a| (Arc::new(Expr::Star(a.clone())) as ExprRef, scope)),
        "make" => args.first().map(|a| (a.clone(), scope)),
        "append" => {
            let a = args.first()?;
            let (t, s, _) = infer_type(store, a, scope, -1, visited)?;
            Some((t, s))
        }
        "complex" => Some((Expr::ident("complex"), DeclStore::UNIVERSE)),
        "cap" | "copy" | "len" => Some((Expr::ident("int"), DeclStore::UNIVERSE)),
        _ => None,
    }
}

/// Predeclared type of an untyped literal, judged from its lexical shape.
fn literal_type_name(lit: &str) -> &'static str {
    match lit.as_bytes().first() {
        Some(b'"') | Some(b'`') => "string",
        Some(b'\'') => "rune",
        _ => {
            let hex = lit.starts_with("0x") || lit.starts_with("0X");
            if lit.ends_with('i') && !hex {
                "complex"
            } else if lit.contains('.') || (!hex && (lit.contains('e') || lit.contains('E'))) {
                "float64"
            } else {
                "int"
            }
        }
    }
}

/// Result type of a call; `index` selects the tuple component counting
/// grouped result names, `-1` takes the first.
fn func_return_type(sig: &Signature, index: i32) -> Option<ExprRef> {
    if sig.results.is_empty() {
        return None;
    }
    if index == -1 {
        return Some(sig.results[0].typ.clone());
    }
    let mut i = 0i32;
    for field in &sig.results {
        let width = field.names.len().max(1) as i32;
        if i <= index && index < i + width {
            return Some(field.typ.clone());
        }
        i += width;
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::semantic::decl::{Decl, DeclFlags};
    use crate::syntax::ast::Field;
    use crate::syntax::pretty_type;

    struct Fixture {
        store: DeclStore,
        scope: ScopeId,
    }

    impl Fixture {
        fn new() -> Fixture {
            let mut store = DeclStore::new();
            let scope = store.new_scope(Some(DeclStore::UNIVERSE));
            Fixture { store, scope }
        }

        fn add_type(&mut self, name: &str, typ: ExprRef) -> DeclId {
            let id = self.store.new_decl_full(
                name,
                DeclKind::Type,
                DeclFlags::default(),
                Some(typ),
                None,
                -1,
                self.scope,
            );
            self.store.replace_named(self.scope, id);
            id
        }

        fn add_var(&mut self, name: &str, typ: Option<ExprRef>, value: Option<ExprRef>) {
            let d = Decl::var(name, typ, value, -1, self.scope);
            let id = self.store.alloc(d);
            self.store.replace_named(self.scope, id);
        }

        fn infer(&mut self, src: &str) -> String {
            let e = crate::parser::parse_expr(src);
            match infer_type_of(&mut self.store, &e, self.scope, -1) {
                Some((t, _, _)) => pretty_type(&t),
                None => String::new(),
            }
        }
    }

    fn tree_struct() -> ExprRef {
        ExprRef::new(Expr::StructType(std::sync::Arc::new(vec![
            Field::new(vec!["Left".into()], Arc::new(Expr::Star(Expr::ident("Tree")))),
            Field::new(vec!["Value".into()], Expr::ident("int")),
        ])))
    }

    #[test]
    fn var_with_explicit_type() {
        let mut fx = Fixture::new();
        fx.add_var("x", Some(Expr::ident("string")), None);
        assert_eq!(fx.infer("x"), "string");
    }

    #[test]
    fn selector_through_named_struct() {
        let mut fx = Fixture::new();
        let t = tree_struct();
        fx.add_type("Tree", t);
        fx.add_var("root", Some(Arc::new(Expr::Star(Expr::ident("Tree")))), None);
        assert_eq!(fx.infer("root.Left"), "*Tree");
        assert_eq!(fx.infer("root.Value"), "int");
        assert_eq!(fx.infer("root.Left.Left.Value"), "int");
    }

    #[test]
    fn initializer_inference_caches_type() {
        let mut fx = Fixture::new();
        fx.add_var("a", Some(Expr::ident("int")), None);
        fx.add_var("b", None, Some(crate::parser::parse_expr("a + 1")));
        assert_eq!(fx.infer("b"), "int");
        let id = fx.store.lookup(fx.scope, "b").unwrap();
        assert!(fx.store.decl(id).typ.is_some());
    }

    #[test]
    fn self_referential_value_terminates() {
        let mut fx = Fixture::new();
        fx.add_var("x", None, Some(crate::parser::parse_expr("x")));
        assert_eq!(fx.infer("x"), "");
    }

    #[test]
    fn channel_receive_and_ok_form() {
        let mut fx = Fixture::new();
        fx.add_var(
            "ch",
            Some(crate::parser::parse_expr("chan string")),
            None,
        );
        assert_eq!(fx.infer("<-ch"), "string");
        let e = crate::parser::parse_expr("<-ch");
        let (t, _, _) = infer_type_of(&mut fx.store, &e, fx.scope, 1).unwrap();
        assert_eq!(pretty_type(&t), "bool");
    }

    #[test]
    fn index_map_and_slice() {
        let mut fx = Fixture::new();
        fx.add_var("m", Some(crate::parser::parse_expr("map[string][]int")), None);
        assert_eq!(fx.infer("m[k]"), "[]int");
        assert_eq!(fx.infer("m[k][0]"), "int");
        let e = crate::parser::parse_expr("m[k]");
        let (t, _, _) = infer_type_of(&mut fx.store, &e, fx.scope, 1).unwrap();
        assert_eq!(pretty_type(&t), "bool");
    }

    #[test]
    fn call_result_and_tuple_index() {
        let mut fx = Fixture::new();
        fx.add_var(
            "f",
            Some(crate::parser::parse_expr("func() (int, string)")),
            None,
        );
        assert_eq!(fx.infer("f()"), "int");
        let e = crate::parser::parse_expr("f()");
        let (t, _, _) = infer_type_of(&mut fx.store, &e, fx.scope, 1).unwrap();
        assert_eq!(pretty_type(&t), "string");
    }

    #[test]
    fn grouped_result_names_count_one_component_each() {
        let mut fx = Fixture::new();
        fx.add_var(
            "f",
            Some(crate::parser::parse_expr("func() (a, b int, c string)")),
            None,
        );
        let e = crate::parser::parse_expr("f()");
        for (index, want) in [(0, "int"), (1, "int"), (2, "string")] {
            let (t, _, _) = infer_type_of(&mut fx.store, &e, fx.scope, index).unwrap();
            assert_eq!(pretty_type(&t), want, "component {index}");
        }
        assert!(infer_type_of(&mut fx.store, &e, fx.scope, 3).is_none());
    }

    #[test]
    fn literals_carry_their_predeclared_types() {
        let mut fx = Fixture::new();
        assert_eq!(fx.infer("42"), "int");
        assert_eq!(fx.infer("0x1F"), "int");
        assert_eq!(fx.infer("3.14"), "float64");
        assert_eq!(fx.infer("1e9"), "float64");
        assert_eq!(fx.infer("\"hi\""), "string");
        assert_eq!(fx.infer("'x'"), "rune");
        assert_eq!(fx.infer("x + 1"), "int");
    }

    #[test]
    fn conversions_and_builtins() {
        let mut fx = Fixture::new();
        fx.add_var("s", Some(Expr::ident("string")), None);
        assert_eq!(fx.infer("[]byte(s)"), "[]byte");
        assert_eq!(fx.infer("len(s)"), "int");
        assert_eq!(fx.infer("new(int)"), "*int");
        assert_eq!(fx.infer("make(map[int]bool)"), "map[int]bool");
    }

    #[test]
    fn deref_and_addr() {
        let mut fx = Fixture::new();
        fx.add_var("p", Some(crate::parser::parse_expr("*int")), None);
        assert_eq!(fx.infer("*p"), "int");
        assert_eq!(fx.infer("&p"), "**int");
    }

    #[test]
    fn embedded_type_methods_found_transitively() {
        let mut fx = Fixture::new();
        let base = ExprRef::new(Expr::StructType(std::sync::Arc::new(vec![Field::new(
            vec!["Id".into()],
            Expr::ident("int"),
        )])));
        fx.add_type("Base", base);
        let outer = ExprRef::new(Expr::StructType(std::sync::Arc::new(vec![
            Field::new(vec![], Expr::ident("Base")),
            Field::new(vec!["Name".into()], Expr::ident("string")),
        ])));
        fx.add_type("Outer", outer);
        fx.add_var("o", Some(Expr::ident("Outer")), None);
        assert_eq!(fx.infer("o.Id"), "int");
        assert_eq!(fx.infer("o.Name"), "string");
    }

    #[test]
    fn embedding_cycle_terminates() {
        let mut fx = Fixture::new();
        let a = ExprRef::new(Expr::StructType(std::sync::Arc::new(vec![Field::new(
            vec![],
            Expr::ident("B"),
        )])));
        let b = ExprRef::new(Expr::StructType(std::sync::Arc::new(vec![Field::new(
            vec![],
            Expr::ident("A"),
        )])));
        fx.add_type("A", a);
        fx.add_type("B", b);
        fx.add_var("x", Some(Expr::ident("A")), None);
        assert_eq!(fx.infer("x.Missing"), "");
    }

    #[test]
    fn range_typing() {
        let mut fx = Fixture::new();
        fx.add_var("m", Some(crate::parser::parse_expr("map[string]float64")), None);
        let mut key = Decl::var("k", None, Some(Expr::ident("m")), 0, fx.scope);
        key.flags = DeclFlags::RANGEVAR;
        let key = fx.store.alloc(key);
        fx.store.replace_named(fx.scope, key);
        let mut val = Decl::var("v", None, Some(Expr::ident("m")), 1, fx.scope);
        val.flags = DeclFlags::RANGEVAR;
        let val = fx.store.alloc(val);
        fx.store.replace_named(fx.scope, val);
        assert_eq!(fx.infer("k"), "string");
        assert_eq!(fx.infer("v"), "float64");

        fx.add_var("s", Some(Expr::ident("string")), None);
        let mut r = Decl::var("r", None, Some(Expr::ident("s")), 1, fx.scope);
        r.flags = DeclFlags::RANGEVAR;
        let r = fx.store.alloc(r);
        fx.store.replace_named(fx.scope, r);
        assert_eq!(fx.infer("r"), "rune");
    }

    #[test]
    fn type_alias_chain_advances() {
        let mut fx = Fixture::new();
        fx.add_type("Inner", tree_struct());
        fx.add_type("Alias", Expr::ident("Inner"));
        fx.add_var("a", Some(Expr::ident("Alias")), None);
        assert_eq!(fx.infer("a.Value"), "int");
    }

    #[test]
    fn type_assert_forms() {
        let mut fx = Fixture::new();
        fx.add_var("x", Some(Expr::ident("error")), None);

        // Qualified assert target resolves through a package declaration.
        let stringer = fx.store.new_decl_full(
            "Stringer",
            DeclKind::Type,
            DeclFlags::FOREIGN,
            Some(ExprRef::new(Expr::InterfaceType(Arc::new(vec![])))),
            None,
            -1,
            fx.scope,
        );
        let mut pkg = Decl::new("fmt", DeclKind::Package, fx.scope);
        pkg.children.insert("Stringer".into(), stringer);
        let pkg = fx.store.alloc(pkg);
        fx.store.replace_named(fx.scope, pkg);

        assert_eq!(fx.infer("x.(fmt.Stringer)"), "fmt.Stringer");
        let e = crate::parser::parse_expr("x.(int)");
        let (t, _, _) = infer_type_of(&mut fx.store, &e, fx.scope, 1).unwrap();
        assert_eq!(pretty_type(&t), "bool");
    }
}
