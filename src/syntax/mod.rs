//! AST types shared by the source parser, the archive readers and the
//! semantic model, plus the canonical type renderer.

pub mod ast;
pub mod printer;

pub use ast::{
    Block, CaseClause, ChanDir, CommClause, Decl, Expr, ExprRef, Field, File, FuncDecl,
    ImportSpec, Signature, Span, Stmt, TypeSpec, ValueSpec,
};
pub use printer::{check_type_expr, pretty_type};
