//! AST node types.
//!
//! Expressions are immutable once built and shared through [`ExprRef`]
//! (`Arc<Expr>`): archive export records cross thread boundaries during the
//! parallel package load, and type inference hands subtrees around freely.
//! Statements and declarations carry byte spans because the buffer analyzer
//! gates scope construction on the cursor position.

use std::sync::Arc;

/// Shared handle to an expression node.
pub type ExprRef = Arc<Expr>;

/// Half-open byte range into the originating buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }
}

/// Channel direction bitset; both bits set means bidirectional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChanDir(u8);

impl ChanDir {
    pub const SEND: ChanDir = ChanDir(1);
    pub const RECV: ChanDir = ChanDir(2);
    pub const BOTH: ChanDir = ChanDir(3);

    pub fn can_send(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn can_recv(self) -> bool {
        self.0 & 2 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `&x`
    Addr,
    /// `<-ch`
    Recv,
    /// `+ - ! ^` (operand-typed)
    Arith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `== != < <= > >= && ||` — always `bool`
    Logic,
    /// `+ - * / % | ^ & &^` — operand-typed
    Arith,
    /// `<< >>` — left-operand-typed
    Shift,
}

/// A named or anonymous entry in a struct, interface or parameter list.
/// `names` is empty for anonymous (embedded) fields and unnamed parameters.
#[derive(Debug, Clone)]
pub struct Field {
    pub names: Vec<String>,
    pub typ: ExprRef,
}

impl Field {
    pub fn new(names: Vec<String>, typ: ExprRef) -> Self {
        Field { names, typ }
    }
}

/// Function signature. Variadic parameters are expressed with an
/// [`Expr::Ellipsis`] type on the final parameter, never as a flag.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
}

#[derive(Debug, Clone)]
pub enum Expr {
    /// Sentinel for an unparsable subtree; candidates whose type contains
    /// one are dropped by the completion filter.
    Bad,
    Ident(String),
    /// Literal text, kept verbatim (only array lengths are ever rendered).
    BasicLit(String),
    Selector(ExprRef, String),
    /// `*T` as a type, or a pointer dereference as a value.
    Star(ExprRef),
    Unary(UnaryOp, ExprRef),
    Binary(BinaryOp, ExprRef, ExprRef),
    Index(ExprRef, ExprRef),
    /// `x[lo:hi]`; the bounds do not matter for inference.
    Slice(ExprRef),
    Call(ExprRef, Vec<ExprRef>),
    Paren(ExprRef),
    CompositeLit {
        typ: Option<ExprRef>,
        elts: Vec<ExprRef>,
    },
    KeyValue(ExprRef, ExprRef),
    FuncLit {
        sig: Arc<Signature>,
        body: Block,
    },
    /// `x.(T)`; `typ` is `None` for the `x.(type)` switch guard.
    TypeAssert {
        x: ExprRef,
        typ: Option<ExprRef>,
    },

    // Type expressions.
    /// `[N]T` when `len` is set, `[]T` otherwise. A `[...]T` length is a
    /// `BasicLit("...")`.
    ArrayType {
        len: Option<ExprRef>,
        elem: ExprRef,
    },
    /// `...T` — the variadic tag.
    Ellipsis(ExprRef),
    MapType {
        key: ExprRef,
        value: ExprRef,
    },
    ChanType {
        dir: ChanDir,
        elem: ExprRef,
    },
    FuncType(Arc<Signature>),
    StructType(Arc<Vec<Field>>),
    InterfaceType(Arc<Vec<Field>>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> ExprRef {
        Arc::new(Expr::Ident(name.into()))
    }

    pub fn is_type_expr(&self) -> bool {
        matches!(
            self,
            Expr::ArrayType { .. }
                | Expr::Ellipsis(_)
                | Expr::MapType { .. }
                | Expr::ChanType { .. }
                | Expr::FuncType(_)
                | Expr::StructType(_)
                | Expr::InterfaceType(_)
        )
    }
}

/// A braced statement list with its brace offsets (cursor gating needs both).
#[derive(Debug, Clone)]
pub struct Block {
    pub lbrace: u32,
    pub rbrace: u32,
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn contains(&self, cursor: u32) -> bool {
        cursor > self.lbrace && cursor <= self.rbrace
    }
}

/// `case a, b:` — an empty `exprs` list is the `default` clause.
#[derive(Debug, Clone)]
pub struct CaseClause {
    pub exprs: Vec<ExprRef>,
    pub colon: u32,
    pub body: Vec<Stmt>,
}

/// A `select` communication clause; `comm` is the send/receive statement.
#[derive(Debug, Clone)]
pub struct CommClause {
    pub comm: Option<Box<Stmt>>,
    pub colon: u32,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Bad(Span),
    Empty,
    Decl(Decl),
    Expr(ExprRef),
    Send {
        chan: ExprRef,
        value: ExprRef,
    },
    IncDec(ExprRef),
    Assign {
        lhs: Vec<ExprRef>,
        rhs: Vec<ExprRef>,
        /// `:=` rather than `=`.
        define: bool,
        tok_off: u32,
    },
    Go(ExprRef),
    Defer(ExprRef),
    Return(Vec<ExprRef>),
    /// break/continue/goto/fallthrough — no scope effect.
    Branch,
    Block(Block),
    If {
        if_off: u32,
        init: Option<Box<Stmt>>,
        cond: Option<ExprRef>,
        body: Block,
        els: Option<Box<Stmt>>,
        end: u32,
    },
    For {
        for_off: u32,
        init: Option<Box<Stmt>>,
        cond: Option<ExprRef>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        for_off: u32,
        key: Option<ExprRef>,
        value: Option<ExprRef>,
        define: bool,
        x: ExprRef,
        body: Block,
    },
    Switch {
        init: Option<Box<Stmt>>,
        tag: Option<ExprRef>,
        lbrace: u32,
        rbrace: u32,
        clauses: Vec<CaseClause>,
    },
    TypeSwitch {
        init: Option<Box<Stmt>>,
        /// The `v` of `switch v := x.(type)`.
        bind: Option<String>,
        x: ExprRef,
        lbrace: u32,
        rbrace: u32,
        clauses: Vec<CaseClause>,
    },
    Select {
        lbrace: u32,
        rbrace: u32,
        clauses: Vec<CommClause>,
    },
    Labeled(String, Box<Stmt>),
}

#[derive(Debug, Clone)]
pub struct ValueSpec {
    pub names: Vec<String>,
    pub typ: Option<ExprRef>,
    pub values: Vec<ExprRef>,
}

#[derive(Debug, Clone)]
pub struct TypeSpec {
    pub name: String,
    pub typ: ExprRef,
    pub alias: bool,
}

#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub alias: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub recv: Option<Field>,
    pub name: String,
    pub sig: Arc<Signature>,
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Bad(Span),
    Import {
        specs: Vec<ImportSpec>,
    },
    Const {
        specs: Vec<ValueSpec>,
        tok_off: u32,
    },
    Var {
        specs: Vec<ValueSpec>,
        tok_off: u32,
    },
    Type {
        specs: Vec<TypeSpec>,
        tok_off: u32,
    },
    Func(FuncDecl),
}

impl Decl {
    /// Receiver type name for a method declaration, following one pointer
    /// indirection; empty result means "not a method".
    pub fn method_of(&self) -> Option<&str> {
        let Decl::Func(f) = self else { return None };
        let recv = f.recv.as_ref()?;
        match &*recv.typ {
            Expr::Ident(name) => Some(name),
            Expr::Star(inner) => match &**inner {
                Expr::Ident(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A parsed source file (or declaration list, in which case `package` is
/// absent).
#[derive(Debug, Clone, Default)]
pub struct File {
    pub package: Option<String>,
    pub decls: Vec<Decl>,
}

/// Splits a declaration group into per-name (type, value, value_index)
/// triples, the shape the declaration model is built from. For a
/// multi-name/single-value spec the index selects the tuple component;
/// `-1` marks a plain single value.
pub fn foreach_decl(decl: &Decl, mut f: impl FnMut(&str, Option<&ExprRef>, Option<&ExprRef>, i32)) {
    match decl {
        Decl::Const { specs, .. } | Decl::Var { specs, .. } => {
            for spec in specs {
                for (i, name) in spec.names.iter().enumerate() {
                    let (value, vi) = spec_value_index(spec, i);
                    if spec.typ.is_some() {
                        // With an explicit type the value is irrelevant.
                        f(name, spec.typ.as_ref(), None, -1);
                    } else {
                        f(name, None, value, vi);
                    }
                }
            }
        }
        Decl::Type { specs, .. } => {
            for spec in specs {
                f(&spec.name, Some(&spec.typ), None, -1);
            }
        }
        Decl::Func(fd) => {
            let typ = ExprRef::new(Expr::FuncType(fd.sig.clone()));
            // The closure receives a reference, so the temporary lives here.
            f(&fd.name, Some(&typ), None, -1);
        }
        Decl::Import { .. } | Decl::Bad(_) => {}
    }
}

fn spec_value_index(spec: &ValueSpec, i: usize) -> (Option<&ExprRef>, i32) {
    if spec.values.is_empty() {
        return (None, -1);
    }
    if spec.names.len() == 1 {
        return (spec.values.first(), -1);
    }
    if spec.values.len() > 1 {
        // Plain multi-assignment: one value per name.
        (spec.values.get(i), -1)
    } else {
        // Tuple unpack: one multi-valued expression for all names.
        (spec.values.first(), i as i32)
    }
}
