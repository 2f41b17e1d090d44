//! Textual export section parser.
//!
//! The section is a `package NAME` clause followed by one declaration per
//! line: `import`, `const`, `type`, `var`, plain functions and methods.
//! Names are qualified as `@"import/path".Name`; an empty path means the
//! archive's own package. References are rewritten to `alias.Name` selectors
//! using the aliases the `import` lines declared (falling back to the last
//! path segment), and constant values are replaced by a `0` literal since
//! only their presence matters for completion.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::{ArchiveError, ExportData, ExportRecord, PackageRef};
use crate::parser::{tokenize, Token, TokenKind};
use crate::syntax::ast::{
    ChanDir, Decl, Expr, ExprRef, Field, FuncDecl, Signature, Span, TypeSpec, ValueSpec,
};

pub fn parse(src: &str) -> Result<ExportData, ArchiveError> {
    let mut parser = TextParser {
        src,
        toks: tokenize(src),
        pos: 0,
        default_alias: String::new(),
        aliases: IndexMap::default(),
        records: Vec::new(),
    };
    parser.aliases.insert("unsafe".to_string(), "unsafe".to_string());
    parser.parse_export()?;
    Ok(ExportData {
        default_alias: parser.default_alias,
        packages: parser
            .aliases
            .into_iter()
            .map(|(key, alias)| PackageRef { key, alias })
            .collect(),
        records: parser.records,
    })
}

struct TextParser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
    default_alias: String,
    /// Import path → alias, in first-mention order.
    aliases: IndexMap<String, String>,
    records: Vec<ExportRecord>,
}

impl<'a> TextParser<'a> {
    fn kind(&self) -> TokenKind {
        self.toks
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn text(&self) -> &'a str {
        self.toks
            .get(self.pos)
            .map(|t| t.text(self.src))
            .unwrap_or("")
    }

    fn token(&self) -> Option<Token> {
        self.toks.get(self.pos).copied()
    }

    fn bump(&mut self) {
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&'a str, ArchiveError> {
        if !self.at(kind) {
            return Err(ArchiveError::Malformed(format!(
                "expected {kind:?}, got {:?} ({:?})",
                self.kind(),
                self.text()
            )));
        }
        let text = self.text();
        self.bump();
        Ok(text)
    }

    fn expect_line_end(&mut self) -> Result<(), ArchiveError> {
        if self.at(TokenKind::Eof) {
            return Ok(());
        }
        self.expect(TokenKind::Semi)?;
        Ok(())
    }

    /// Consumes the rest of the current declaration line, balancing braces.
    fn skip_line(&mut self) {
        let mut depth = 0u32;
        loop {
            match self.kind() {
                TokenKind::Eof => return,
                TokenKind::Semi if depth == 0 => {
                    self.bump();
                    return;
                }
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.bump();
        }
    }

    // Names -----------------------------------------------------------------

    /// Identifier, keyword-shaped identifier, or the `?` placeholder.
    fn parse_name(&mut self) -> Result<String, ArchiveError> {
        match self.kind() {
            TokenKind::Ident => {
                let name = self.text().to_string();
                self.bump();
                Ok(name)
            }
            TokenKind::Error if self.text() == "?" => {
                self.bump();
                Ok("?".to_string())
            }
            k => {
                // The host language's keywords are ordinary identifiers here.
                if let Some(text) = k.static_text() {
                    if text.chars().all(|c| c.is_ascii_alphabetic()) {
                        self.bump();
                        return Ok(text.to_string());
                    }
                }
                Err(ArchiveError::Malformed(format!(
                    "expected name, got {:?}",
                    self.text()
                )))
            }
        }
    }

    /// Consumes adjacent ident/number/`·` tokens as one compiler-generated
    /// name. Names containing `·` belong to internal symbols and make the
    /// caller drop the line.
    fn parse_dot_ident(&mut self) -> Result<String, ArchiveError> {
        let first = self.token().ok_or(ArchiveError::Truncated)?;
        let mut name = self.parse_name()?;
        let mut end = first.end();
        while let Some(tok) = self.token() {
            if tok.start != end {
                break;
            }
            match tok.kind {
                TokenKind::Ident | TokenKind::Number => name.push_str(tok.text(self.src)),
                TokenKind::Error if tok.text(self.src) == "·" => name.push('·'),
                _ => break,
            }
            end = tok.end();
            self.bump();
        }
        Ok(name)
    }

    /// `@"path".name`; the path is returned raw (empty means this archive).
    fn parse_exported_name(&mut self) -> Result<(String, String), ArchiveError> {
        self.expect(TokenKind::At)?;
        let quoted = self.expect(TokenKind::Str)?;
        let path = unquote(quoted);
        self.expect(TokenKind::Period)?;
        let name = self.parse_dot_ident()?;
        Ok((path, name))
    }

    /// Alias an import path resolves to inside type expressions, registering
    /// the package for scope binding.
    fn beautify(&mut self, path: &str) -> String {
        if path.is_empty() {
            return self.default_alias.clone();
        }
        if let Some(alias) = self.aliases.get(path) {
            return alias.clone();
        }
        // Referenced without an import line; fall back to the last segment.
        let alias = path.rsplit('/').next().unwrap_or(path).to_string();
        self.aliases.insert(path.to_string(), alias.clone());
        alias
    }

    fn exported_ref(&mut self) -> Result<ExprRef, ArchiveError> {
        let (path, name) = self.parse_exported_name()?;
        let alias = self.beautify(&path);
        Ok(Arc::new(Expr::Selector(Expr::ident(alias), name)))
    }

    // Types -----------------------------------------------------------------

    fn parse_type(&mut self) -> Result<ExprRef, ArchiveError> {
        match self.kind() {
            TokenKind::Struct => self.parse_struct_type(),
            TokenKind::Interface => self.parse_interface_type(),
            TokenKind::Map => {
                self.bump();
                self.expect(TokenKind::LBrack)?;
                let key = self.parse_type()?;
                self.expect(TokenKind::RBrack)?;
                let value = self.parse_type()?;
                Ok(Arc::new(Expr::MapType { key, value }))
            }
            TokenKind::Chan => {
                self.bump();
                let dir = if self.eat(TokenKind::Arrow) {
                    ChanDir::SEND
                } else {
                    ChanDir::BOTH
                };
                let elem = self.parse_type()?;
                Ok(Arc::new(Expr::ChanType { dir, elem }))
            }
            TokenKind::Arrow => {
                self.bump();
                self.expect(TokenKind::Chan)?;
                let elem = self.parse_type()?;
                Ok(Arc::new(Expr::ChanType {
                    dir: ChanDir::RECV,
                    elem,
                }))
            }
            TokenKind::Func => {
                self.bump();
                let sig = self.parse_signature()?;
                Ok(Arc::new(Expr::FuncType(Arc::new(sig))))
            }
            TokenKind::LBrack => {
                self.bump();
                if self.eat(TokenKind::RBrack) {
                    let elem = self.parse_type()?;
                    return Ok(Arc::new(Expr::ArrayType { len: None, elem }));
                }
                let len = self.expect(TokenKind::Number)?.to_string();
                self.expect(TokenKind::RBrack)?;
                let elem = self.parse_type()?;
                Ok(Arc::new(Expr::ArrayType {
                    len: Some(Arc::new(Expr::BasicLit(len))),
                    elem,
                }))
            }
            TokenKind::Star => {
                self.bump();
                Ok(Arc::new(Expr::Star(self.parse_type()?)))
            }
            TokenKind::At => self.exported_ref(),
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_type()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Ident => {
                let name = self.text().to_string();
                self.bump();
                Ok(Expr::ident(name))
            }
            _ => Err(ArchiveError::Malformed(format!(
                "unexpected token in type: {:?}",
                self.text()
            ))),
        }
    }

    fn parse_struct_type(&mut self) -> Result<ExprRef, ArchiveError> {
        self.expect(TokenKind::Struct)?;
        self.expect(TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            fields.push(self.parse_field()?);
            if !self.eat(TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Arc::new(Expr::StructType(Arc::new(fields))))
    }

    /// `Name Type [tag]`; `?` names mark embedded fields.
    fn parse_field(&mut self) -> Result<Field, ArchiveError> {
        let name = self.parse_name()?;
        let typ = self.parse_type()?;
        self.eat(TokenKind::Str);
        let names = if name == "?" { vec![] } else { vec![name] };
        Ok(Field::new(names, typ))
    }

    fn parse_interface_type(&mut self) -> Result<ExprRef, ArchiveError> {
        self.expect(TokenKind::Interface)?;
        self.expect(TokenKind::LBrace)?;
        let mut methods = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            methods.push(self.parse_method_spec()?);
            if !self.eat(TokenKind::Semi) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Arc::new(Expr::InterfaceType(Arc::new(methods))))
    }

    fn parse_method_spec(&mut self) -> Result<Field, ArchiveError> {
        let name = if self.at(TokenKind::At) {
            // Qualified method name; the package part is irrelevant here.
            let (path, name) = self.parse_exported_name()?;
            if !self.at(TokenKind::LParen) {
                // An embedded interface rather than a method.
                let alias = self.beautify(&path);
                return Ok(Field::new(
                    vec![],
                    Arc::new(Expr::Selector(Expr::ident(alias), name)),
                ));
            }
            name
        } else {
            let name = self.parse_name()?;
            if !self.at(TokenKind::LParen) {
                return Ok(Field::new(vec![], Expr::ident(name)));
            }
            name
        };
        let sig = self.parse_signature()?;
        Ok(Field::new(
            vec![name],
            Arc::new(Expr::FuncType(Arc::new(sig))),
        ))
    }

    // Signatures ------------------------------------------------------------

    fn parse_signature(&mut self) -> Result<Signature, ArchiveError> {
        let params = self.parse_params()?;
        let results = match self.kind() {
            TokenKind::LParen => self.parse_params()?,
            TokenKind::Ident
            | TokenKind::Struct
            | TokenKind::Interface
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Func
            | TokenKind::LBrack
            | TokenKind::Star
            | TokenKind::Arrow
            | TokenKind::At => vec![Field::new(vec![], self.parse_type()?)],
            _ => vec![],
        };
        Ok(Signature { params, results })
    }

    fn parse_params(&mut self) -> Result<Vec<Field>, ArchiveError> {
        self.expect(TokenKind::LParen)?;
        let mut fields = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                fields.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(fields)
    }

    fn parse_param(&mut self) -> Result<Field, ArchiveError> {
        let name = self.parse_name()?;
        let typ = if self.eat(TokenKind::DotDotDot) {
            Arc::new(Expr::Ellipsis(self.parse_type()?))
        } else {
            self.parse_type()?
        };
        self.eat(TokenKind::Str);
        let names = if name == "?" { vec![] } else { vec![name] };
        Ok(Field::new(names, typ))
    }

    // Declarations ----------------------------------------------------------

    fn parse_export(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::Package)?;
        self.default_alias = self.expect(TokenKind::Ident)?.to_string();
        if self.at(TokenKind::Ident) && self.text() == "safe" {
            self.bump();
        }
        self.expect_line_end()?;

        loop {
            match self.kind() {
                TokenKind::Eof => return Ok(()),
                TokenKind::Semi => self.bump(),
                TokenKind::Import => self.parse_import_decl()?,
                TokenKind::Const => self.parse_const_decl()?,
                TokenKind::Type => self.parse_type_decl()?,
                TokenKind::Var => self.parse_var_decl()?,
                TokenKind::Func => self.parse_func_decl()?,
                _ => {
                    return Err(ArchiveError::Malformed(format!(
                        "unexpected declaration start: {:?}",
                        self.text()
                    )))
                }
            }
        }
    }

    fn parse_import_decl(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::Import)?;
        let alias = self.expect(TokenKind::Ident)?.to_string();
        let path = unquote(self.expect(TokenKind::Str)?);
        self.aliases.insert(path, alias);
        self.expect_line_end()
    }

    fn parse_const_decl(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::Const)?;
        let (path, name) = self.parse_exported_name()?;
        if name.contains('·') {
            self.skip_line();
            return Ok(());
        }
        let typ = if !self.at(TokenKind::Assign) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Assign)?;
        // The value is irrelevant to completion; a parseable stand-in does.
        self.skip_line();
        self.records.push(ExportRecord {
            package: path,
            decl: Decl::Const {
                specs: vec![ValueSpec {
                    names: vec![name],
                    typ,
                    values: vec![Arc::new(Expr::BasicLit("0".to_string()))],
                }],
                tok_off: 0,
            },
        });
        Ok(())
    }

    fn parse_type_decl(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::Type)?;
        let (path, name) = self.parse_exported_name()?;
        if name.contains('·') {
            self.skip_line();
            return Ok(());
        }
        let typ = self.parse_type()?;
        self.expect_line_end()?;
        self.records.push(ExportRecord {
            package: path,
            decl: Decl::Type {
                specs: vec![TypeSpec {
                    name,
                    typ,
                    alias: false,
                }],
                tok_off: 0,
            },
        });
        Ok(())
    }

    fn parse_var_decl(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::Var)?;
        let (path, name) = self.parse_exported_name()?;
        if name.contains('·') {
            self.skip_line();
            return Ok(());
        }
        let typ = self.parse_type()?;
        self.expect_line_end()?;
        self.records.push(ExportRecord {
            package: path,
            decl: Decl::Var {
                specs: vec![ValueSpec {
                    names: vec![name],
                    typ: Some(typ),
                    values: vec![],
                }],
                tok_off: 0,
            },
        });
        Ok(())
    }

    fn parse_func_decl(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::Func)?;
        if self.at(TokenKind::LParen) {
            return self.parse_method_decl();
        }
        let (path, name) = self.parse_exported_name()?;
        if name.contains('·') {
            debug!(name, "skipping internal symbol");
            self.skip_line();
            return Ok(());
        }
        let sig = self.parse_signature()?;
        self.skip_func_body()?;
        self.expect_line_end()?;
        self.records.push(ExportRecord {
            package: path,
            decl: Decl::Func(FuncDecl {
                recv: None,
                name,
                sig: Arc::new(sig),
                body: None,
                span: Span::default(),
            }),
        });
        Ok(())
    }

    /// `(recv [*]@"path".Type) Name Signature` — the receiver's package path
    /// names the owning package and is stripped from the receiver type.
    fn parse_method_decl(&mut self) -> Result<(), ArchiveError> {
        self.expect(TokenKind::LParen)?;
        // Some compilers qualify the receiver name itself.
        let recv_name = if self.at(TokenKind::At) {
            self.parse_exported_name()?.1
        } else {
            self.parse_name()?
        };
        let pointer = self.eat(TokenKind::Star);
        let (path, type_name) = self.parse_exported_name()?;
        self.expect(TokenKind::RParen)?;
        if type_name.contains('·') {
            self.skip_line();
            return Ok(());
        }

        let name = self.parse_dot_ident()?;
        if name.contains('·') {
            self.skip_line();
            return Ok(());
        }
        let sig = self.parse_signature()?;
        self.skip_func_body()?;
        self.expect_line_end()?;

        let mut recv_typ = Expr::ident(type_name);
        if pointer {
            recv_typ = Arc::new(Expr::Star(recv_typ));
        }
        let names = if recv_name == "?" {
            vec![]
        } else {
            vec![recv_name]
        };
        self.records.push(ExportRecord {
            package: path,
            decl: Decl::Func(FuncDecl {
                recv: Some(Field::new(names, recv_typ)),
                name,
                sig: Arc::new(sig),
                body: None,
                span: Span::default(),
            }),
        });
        Ok(())
    }

    fn skip_func_body(&mut self) -> Result<(), ArchiveError> {
        if !self.at(TokenKind::LBrace) {
            return Ok(());
        }
        self.bump();
        let mut depth = 1u32;
        while depth > 0 {
            match self.kind() {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                TokenKind::Eof => return Err(ArchiveError::Truncated),
                _ => {}
            }
            self.bump();
        }
        Ok(())
    }
}

fn unquote(lit: &str) -> String {
    lit.trim_matches('"').to_string()
}
