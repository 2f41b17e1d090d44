//! # gocaret
//!
//! Core library of a Go autocompletion daemon. A client hands over a source
//! buffer (possibly mid-edit and syntactically broken around the cursor), a
//! file path and a byte offset; the library answers with ranked completion
//! candidates and the length of the partial identifier to replace.
//!
//! ## Module structure (dependency order)
//!
//! ```text
//! ide       → buffer analysis, cursor resolution, completion engine
//!   ↓
//! project   → file/package caches, archive readers, package lookup
//!   ↓
//! semantic  → declaration records, scope graph, type inference
//!   ↓
//! syntax    → AST types, spans, canonical type rendering
//!   ↓
//! parser    → logos lexer with semicolon insertion, recursive-descent parser
//! ```

/// Parser: logos lexer, semicolon insertion, recursive-descent Go parser
pub mod parser;

/// Syntax: AST types, spans, type pretty-printer
pub mod syntax;

/// Semantic model: declarations, scopes, type inference
pub mod semantic;

/// Project: file cache, declaration cache, archive import, package lookup
pub mod project;

/// IDE features: buffer analysis, cursor context, completion
pub mod ide;

/// Persistent daemon configuration
pub mod config;

pub use config::Config;
pub use ide::{Candidate, Completion, Session};
pub use project::LookupContext;
pub use semantic::DeclKind;
