//! Tokenizer and error-tolerant Go parser.

pub mod lexer;
pub mod parser;

pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse_decl_list, parse_expr, parse_file, parse_file_with_errors, SyntaxError};
