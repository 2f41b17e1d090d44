//! Declaration model, scope graph and type inference.

pub mod decl;
pub mod infer;

pub use decl::{Decl, DeclFlags, DeclId, DeclKind, DeclStore, Scope, ScopeId};
pub use infer::{
    decl_infer_type, expr_to_decl, find_child, find_child_transitive, get_type_path,
    infer_type_of, type_to_decl, TypePath, Visited,
};
