//! Scope construction for the edited buffer.
//!
//! Stage 1 registers every top-level declaration (outer file and ripped
//! region alike) into the file scope. Stage 2 re-enters the ripped region as
//! local code: it finds the function whose body holds the cursor, binds its
//! receiver, parameters and named results, then walks statements, opening
//! nested scopes for blocks and control-flow constructs on the cursor path.
//! Function literals are inspected wherever they appear, since the line
//! being edited often sits inside one.

use std::sync::Arc;

use crate::semantic::decl::{Decl as SemDecl, DeclFlags, DeclKind, DeclStore, ScopeId};
use crate::syntax::ast::{
    foreach_decl, Block, CaseClause, CommClause, Decl, Expr, ExprRef, File, FuncDecl, Signature,
    Stmt,
};

/// Registers a top-level declaration group into a scope, merging with
/// whatever siblings already put there. Methods fold into their receiver
/// type through a stub.
pub fn merge_top_level(store: &mut DeclStore, decl: &Decl, scope: ScopeId) {
    let kind = match decl {
        Decl::Const { .. } => DeclKind::Const,
        Decl::Var { .. } => DeclKind::Var,
        Decl::Type { .. } => DeclKind::Type,
        Decl::Func(_) => DeclKind::Func,
        Decl::Import { .. } | Decl::Bad(_) => return,
    };
    let method_of = decl.method_of().map(str::to_string);

    let mut parts = Vec::new();
    foreach_decl(decl, |name, typ, value, value_index| {
        parts.push((name.to_string(), typ.cloned(), value.cloned(), value_index));
    });

    for (name, typ, value, value_index) in parts {
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
        match &method_of {
            Some(owner) => {
                let mut stub = SemDecl::new(owner.clone(), DeclKind::MethodsStub, scope);
                stub.children.insert(name, id);
                let stub_id = store.alloc(stub);
                store.merge_decl(scope, stub_id);
            }
            None => store.merge_decl(scope, id),
        }
    }
}

/// Builds the scope chain at the cursor. `ripped` carries the declaration
/// list of the cut region together with the cursor re-based into it; when
/// absent the cursor sits at the top level and the file scope is the
/// answer.
pub fn analyze_buffer(
    store: &mut DeclStore,
    outer: &File,
    ripped: Option<(&[Decl], u32)>,
    file_scope: ScopeId,
) -> ScopeId {
    for decl in &outer.decls {
        merge_top_level(store, decl, file_scope);
    }
    let Some((decls, cursor)) = ripped else {
        return file_scope;
    };
    for decl in decls {
        merge_top_level(store, decl, file_scope);
    }

    for decl in decls {
        if let Decl::Func(f) = decl {
            if let Some(body) = &f.body {
                if cursor >= body.lbrace && cursor <= body.rbrace {
                    let mut w = Walker {
                        store,
                        cursor,
                        scope: file_scope,
                    };
                    w.enter_function(f, body);
                    return w.scope;
                }
            }
        }
    }
    file_scope
}

struct Walker<'a> {
    store: &'a mut DeclStore,
    cursor: u32,
    scope: ScopeId,
}

impl Walker<'_> {
    fn enter_function(&mut self, f: &FuncDecl, body: &Block) {
        self.scope = self.store.new_scope(Some(self.scope));
        if let Some(recv) = &f.recv {
            self.bind_fields(std::slice::from_ref(recv));
        }
        self.bind_fields(&f.sig.params);
        self.bind_fields(&f.sig.results);
        self.process_stmts(&body.stmts);
    }

    /// Parameter-style bindings: every named field becomes a var of the
    /// field's type.
    fn bind_fields(&mut self, fields: &[crate::syntax::ast::Field]) {
        for field in fields {
            for name in &field.names {
                if name == "_" || name == "?" {
                    continue;
                }
                let typ = self
                    .store
                    .anonymify(&field.typ, DeclFlags::default(), self.scope);
                let id = self.store.new_decl_full(
                    name.clone(),
                    DeclKind::Var,
                    DeclFlags::default(),
                    Some(typ),
                    None,
                    -1,
                    self.scope,
                );
                self.store.replace_named(self.scope, id);
            }
        }
    }

    fn process_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.process_stmt(stmt);
        }
    }

    fn process_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Decl(decl) => self.process_decl_stmt(decl),
            Stmt::Assign {
                lhs, rhs, define, ..
            } => {
                for e in lhs.iter().chain(rhs) {
                    self.scan_expr(e);
                }
                if *define {
                    self.scope = self.store.advance_scope(self.scope);
                    self.bind_assign(lhs, rhs);
                }
            }
            Stmt::Expr(e) | Stmt::Go(e) | Stmt::Defer(e) | Stmt::IncDec(e) => self.scan_expr(e),
            Stmt::Send { chan, value } => {
                self.scan_expr(chan);
                self.scan_expr(value);
            }
            Stmt::Return(exprs) => {
                for e in exprs {
                    self.scan_expr(e);
                }
            }
            Stmt::Block(block) => {
                if block.contains(self.cursor) {
                    self.scope = self.store.new_scope(Some(self.scope));
                    self.process_stmts(&block.stmts);
                }
            }
            Stmt::If {
                init,
                cond,
                body,
                els,
                ..
            } => {
                self.scope = self.store.new_scope(Some(self.scope));
                if let Some(init) = init {
                    self.process_stmt(init);
                }
                if let Some(cond) = cond {
                    self.scan_expr(cond);
                }
                if body.contains(self.cursor) {
                    self.process_stmts(&body.stmts);
                } else if let Some(els) = els {
                    self.process_stmt(els);
                }
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
                ..
            } => {
                self.scope = self.store.new_scope(Some(self.scope));
                if let Some(init) = init {
                    self.process_stmt(init);
                }
                if let Some(cond) = cond {
                    self.scan_expr(cond);
                }
                if let Some(post) = post {
                    self.process_stmt(post);
                }
                if body.contains(self.cursor) {
                    self.process_stmts(&body.stmts);
                }
            }
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
                ..
            } => {
                self.scope = self.store.new_scope(Some(self.scope));
                self.scan_expr(x);
                if *define {
                    self.bind_range_var(key.as_ref(), x, 0);
                    self.bind_range_var(value.as_ref(), x, 1);
                }
                if body.contains(self.cursor) {
                    self.process_stmts(&body.stmts);
                }
            }
            Stmt::Switch {
                init,
                tag,
                clauses,
                ..
            } => {
                self.scope = self.store.new_scope(Some(self.scope));
                if let Some(init) = init {
                    self.process_stmt(init);
                }
                if let Some(tag) = tag {
                    self.scan_expr(tag);
                }
                if let Some(clause) = cursor_clause(clauses, self.cursor) {
                    self.scope = self.store.new_scope(Some(self.scope));
                    self.process_stmts(&clause.body);
                }
            }
            Stmt::TypeSwitch {
                init,
                bind,
                x,
                clauses,
                ..
            } => {
                self.scope = self.store.new_scope(Some(self.scope));
                if let Some(init) = init {
                    self.process_stmt(init);
                }
                self.scan_expr(x);
                if let Some(clause) = cursor_clause(clauses, self.cursor) {
                    self.scope = self.store.new_scope(Some(self.scope));
                    if let Some(name) = bind {
                        self.bind_switch_var(name, x, clause);
                    }
                    self.process_stmts(&clause.body);
                }
            }
            Stmt::Select { clauses, .. } => {
                if let Some(clause) = cursor_comm_clause(clauses, self.cursor) {
                    self.scope = self.store.new_scope(Some(self.scope));
                    if let Some(comm) = &clause.comm {
                        self.process_stmt(comm);
                    }
                    self.process_stmts(&clause.body);
                }
            }
            Stmt::Labeled(_, inner) => self.process_stmt(inner),
            Stmt::Bad(_) | Stmt::Empty | Stmt::Branch => {}
        }
    }

    /// A declaration at statement position. Vars and consts shadow from a
    /// fresh scope; a local type goes into the current scope so the next
    /// statement sees it.
    fn process_decl_stmt(&mut self, decl: &Decl) {
        match decl {
            Decl::Var { .. } | Decl::Const { .. } => {
                self.scope = self.store.advance_scope(self.scope);
                self.add_decl_group(decl);
            }
            Decl::Type { .. } => self.add_decl_group(decl),
            _ => {}
        }
    }

    fn add_decl_group(&mut self, decl: &Decl) {
        let kind = match decl {
            Decl::Const { .. } => DeclKind::Const,
            Decl::Var { .. } => DeclKind::Var,
            Decl::Type { .. } => DeclKind::Type,
            _ => return,
        };
        let mut parts = Vec::new();
        foreach_decl(decl, |name, typ, value, value_index| {
            parts.push((name.to_string(), typ.cloned(), value.cloned(), value_index));
        });
        for (name, typ, value, value_index) in parts {
            if let Some(v) = &value {
                self.scan_expr(v);
            }
            let typ = typ.map(|t| {
                if kind == DeclKind::Type {
                    self.store.anonymify(&t, DeclFlags::default(), self.scope)
                } else {
                    self.store
                        .anonymify_type(&t, DeclFlags::default(), self.scope)
                }
            });
            let value = value.map(|v| self.store.anonymify(&v, DeclFlags::default(), self.scope));
            let id = self.store.new_decl_full(
                name,
                kind,
                DeclFlags::default(),
                typ,
                value,
                value_index,
                self.scope,
            );
            self.store.replace_named(self.scope, id);
        }
    }

    /// `:=` bindings. One value per name when counts match; otherwise every
    /// name unpacks a component of the single multi-valued expression.
    fn bind_assign(&mut self, lhs: &[ExprRef], rhs: &[ExprRef]) {
        for (i, target) in lhs.iter().enumerate() {
            let Expr::Ident(name) = &**target else {
                continue;
            };
            if name == "_" {
                continue;
            }
            let (value, value_index) = if rhs.len() == lhs.len() {
                (rhs.get(i).cloned(), -1)
            } else {
                (rhs.first().cloned(), i as i32)
            };
            let value =
                value.map(|v| self.store.anonymify(&v, DeclFlags::default(), self.scope));
            let d = SemDecl::var(name.clone(), None, value, value_index, self.scope);
            let id = self.store.alloc(d);
            self.store.replace_named(self.scope, id);
        }
    }

    fn bind_range_var(&mut self, target: Option<&ExprRef>, x: &ExprRef, index: i32) {
        let Some(target) = target else { return };
        let Expr::Ident(name) = &**target else {
            return;
        };
        if name == "_" {
            return;
        }
        let mut d = SemDecl::var(name.clone(), None, Some(x.clone()), index, self.scope);
        d.flags = DeclFlags::RANGEVAR;
        let id = self.store.alloc(d);
        self.store.replace_named(self.scope, id);
    }

    /// The `v` of `switch v := x.(type)`: typed by the case when the clause
    /// names exactly one type, dynamically typed otherwise.
    fn bind_switch_var(&mut self, name: &str, x: &ExprRef, clause: &CaseClause) {
        let (typ, value) = if clause.exprs.len() == 1 {
            (Some(clause.exprs[0].clone()), None)
        } else {
            let assert = Arc::new(Expr::TypeAssert {
                x: x.clone(),
                typ: None,
            });
            (None, Some(assert))
        };
        let id = self.store.new_decl_full(
            name.to_string(),
            DeclKind::Var,
            DeclFlags::default(),
            typ,
            value,
            -1,
            self.scope,
        );
        self.store.replace_named(self.scope, id);
    }

    /// Looks for function literals anywhere in an expression and descends
    /// into the one holding the cursor.
    fn scan_expr(&mut self, e: &ExprRef) {
        match &**e {
            Expr::FuncLit { sig, body } => {
                if body.contains(self.cursor) || self.cursor == body.lbrace {
                    self.enter_literal(sig, body);
                }
            }
            Expr::Unary(_, x)
            | Expr::Star(x)
            | Expr::Paren(x)
            | Expr::Slice(x)
            | Expr::Ellipsis(x)
            | Expr::Selector(x, _) => self.scan_expr(x),
            Expr::Binary(_, x, y) | Expr::Index(x, y) | Expr::KeyValue(x, y) => {
                self.scan_expr(x);
                self.scan_expr(y);
            }
            Expr::Call(fun, args) => {
                self.scan_expr(fun);
                for a in args {
                    self.scan_expr(a);
                }
            }
            Expr::CompositeLit { elts, .. } => {
                for elt in elts {
                    self.scan_expr(elt);
                }
            }
            Expr::TypeAssert { x, .. } => self.scan_expr(x),
            _ => {}
        }
    }

    fn enter_literal(&mut self, sig: &Arc<Signature>, body: &Block) {
        self.scope = self.store.new_scope(Some(self.scope));
        self.bind_fields(&sig.params);
        self.bind_fields(&sig.results);
        self.process_stmts(&body.stmts);
    }
}

/// The clause whose colon the cursor has passed; the last one wins when
/// several qualify.
fn cursor_clause(clauses: &[CaseClause], cursor: u32) -> Option<&CaseClause> {
    clauses.iter().rev().find(|c| c.colon < cursor)
}

fn cursor_comm_clause(clauses: &[CommClause], cursor: u32) -> Option<&CommClause> {
    clauses.iter().rev().find(|c| c.colon < cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_decl_list;
    use crate::semantic::infer::infer_type_of;
    use crate::syntax::pretty_type;

    /// Runs both stages on a buffer whose cursor is marked with `@`.
    fn analyze(src: &str) -> (DeclStore, ScopeId) {
        let cursor = src.find('@').expect("cursor marker") as u32;
        let clean = src.replace('@', "");
        let mut store = DeclStore::new();
        let file_scope = store.new_scope(Some(DeclStore::UNIVERSE));
        let decls = parse_decl_list(&clean);
        let scope = analyze_buffer(
            &mut store,
            &File::default(),
            Some((&decls, cursor)),
            file_scope,
        );
        (store, scope)
    }

    fn type_of(store: &mut DeclStore, scope: ScopeId, name: &str) -> String {
        let e = Expr::ident(name);
        match infer_type_of(store, &e, scope, -1) {
            Some((t, _, _)) => pretty_type(&t),
            None => String::new(),
        }
    }

    #[test]
    fn parameters_and_receiver_are_in_scope() {
        let (mut store, scope) = analyze(
            "func (t *Tree) Insert(value int) (ok bool) {\n\t@\n}\n\
             type Tree struct { Left int }\n",
        );
        assert_eq!(type_of(&mut store, scope, "value"), "int");
        assert_eq!(type_of(&mut store, scope, "ok"), "bool");
        assert_eq!(type_of(&mut store, scope, "t"), "*Tree");
    }

    #[test]
    fn short_declaration_binds_tuple_components() {
        let (mut store, scope) = analyze(
            "func f(m map[string]int) {\n\tx, ok := m[\"k\"]\n\t@\n}\n",
        );
        assert_eq!(type_of(&mut store, scope, "x"), "int");
        assert_eq!(type_of(&mut store, scope, "ok"), "bool");
    }

    #[test]
    fn range_over_map_binds_key_and_value() {
        let (mut store, scope) = analyze(
            "func f(m map[string]float64) {\n\tfor k, v := range m {\n\t\t@\n\t}\n}\n",
        );
        assert_eq!(type_of(&mut store, scope, "k"), "string");
        assert_eq!(type_of(&mut store, scope, "v"), "float64");
    }

    #[test]
    fn blocks_gate_on_the_cursor() {
        let (mut store, scope) = analyze(
            "func f() {\n\
             \tif true {\n\t\ta := 1\n\t} else {\n\t\tb := \"s\"\n\t\t@\n\t}\n}\n",
        );
        assert_eq!(type_of(&mut store, scope, "b"), "string");
        assert_eq!(type_of(&mut store, scope, "a"), "");
    }

    #[test]
    fn type_switch_binds_the_case_type() {
        let (mut store, scope) = analyze(
            "func f(x interface{}) {\n\
             \tswitch v := x.(type) {\n\
             \tcase int:\n\t\t_ = v\n\
             \tcase string:\n\t\t@\n\
             \t}\n}\n",
        );
        assert_eq!(type_of(&mut store, scope, "v"), "string");
    }

    #[test]
    fn select_receive_binding() {
        let (mut store, scope) = analyze(
            "func f(ch chan int) {\n\
             \tselect {\n\
             \tcase v, ok := <-ch:\n\t\t@\n\
             \t}\n}\n",
        );
        assert_eq!(type_of(&mut store, scope, "v"), "int");
        assert_eq!(type_of(&mut store, scope, "ok"), "bool");
    }

    #[test]
    fn function_literal_bodies_are_entered() {
        let (mut store, scope) = analyze(
            "func f() {\n\
             \tgo func(n int) {\n\t\t@\n\t}(1)\n}\n",
        );
        assert_eq!(type_of(&mut store, scope, "n"), "int");
    }

    #[test]
    fn local_type_is_usable_below_its_declaration() {
        let (mut store, scope) = analyze(
            "func f() {\n\ttype pair struct { A int }\n\tp := pair{}\n\t@\n}\n",
        );
        let e = crate::parser::parse_expr("p.A");
        let (t, _, _) = infer_type_of(&mut store, &e, scope, -1).unwrap();
        assert_eq!(pretty_type(&t), "int");
    }

    #[test]
    fn analysis_is_idempotent() {
        let src = "func f() {\n\tx := 1\n\t@\n}\n";
        let (mut s1, sc1) = analyze(src);
        let (mut s2, sc2) = analyze(src);
        assert_eq!(type_of(&mut s1, sc1, "x"), type_of(&mut s2, sc2, "x"));
    }
}
