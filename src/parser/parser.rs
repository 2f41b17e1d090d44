//! Error-tolerant recursive-descent Go parser.
//!
//! Buffers arrive mid-edit, so every production degrades to a `Bad` node
//! and resynchronizes instead of failing. The completion pipeline only
//! needs declarations, scope-affecting statements and enough expression
//! structure for type inference; operator precedence and offsets are exact,
//! constant evaluation is not attempted.

use std::sync::Arc;

use tracing::debug;

use crate::parser::lexer::{tokenize, Token, TokenKind};
use crate::syntax::ast::{
    BinaryOp, Block, CaseClause, ChanDir, CommClause, Decl, Expr, ExprRef, Field, File, FuncDecl,
    ImportSpec, Signature, Span, Stmt, TypeSpec, UnaryOp, ValueSpec,
};

/// A recoverable syntax error with the byte offset it was noticed at.
#[derive(Debug, Clone, thiserror::Error)]
#[error("syntax error at offset {offset}: {message}")]
pub struct SyntaxError {
    pub offset: u32,
    pub message: String,
}

const MAX_ERRORS: usize = 100;

/// Parses a whole source file. Never fails; unparsable regions come back as
/// `Bad` nodes.
pub fn parse_file(src: &str) -> File {
    parse_file_with_errors(src).0
}

pub fn parse_file_with_errors(src: &str) -> (File, Vec<SyntaxError>) {
    let mut p = Parser::new(src);
    let package = p.parse_package_clause();
    let decls = p.parse_decls_until_eof();
    if !p.errors.is_empty() {
        debug!(errors = p.errors.len(), "parsed file with recoveries");
    }
    (File { package, decls }, p.errors)
}

/// Parses a bare top-level declaration list with no package clause. Offsets
/// refer directly into `src`.
pub fn parse_decl_list(src: &str) -> Vec<Decl> {
    let mut p = Parser::new(src);
    p.parse_decls_until_eof()
}

/// Parses a single expression (or type expression); `Expr::Bad` on failure.
pub fn parse_expr(src: &str) -> ExprRef {
    let mut p = Parser::new(src);
    let e = p.expr();
    p.eat(TokenKind::Semi);
    if p.at(TokenKind::Eof) && p.errors.is_empty() {
        e
    } else {
        Arc::new(Expr::Bad)
    }
}

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
    /// Set while parsing if/for/switch headers, where `{` opens the body
    /// rather than a composite literal.
    no_lit: bool,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            src,
            toks: tokenize(src),
            pos: 0,
            errors: Vec::new(),
            no_lit: false,
        }
    }

    // Token plumbing -------------------------------------------------------

    fn kind(&self) -> TokenKind {
        self.toks
            .get(self.pos)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn kind_at(&self, n: usize) -> TokenKind {
        self.toks
            .get(self.pos + n)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn offset(&self) -> u32 {
        self.toks
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.src.len() as u32)
    }

    fn text(&self) -> &'a str {
        self.toks
            .get(self.pos)
            .map(|t| t.text(self.src))
            .unwrap_or("")
    }

    fn bump(&mut self) -> u32 {
        let off = self.offset();
        if self.pos < self.toks.len() {
            self.pos += 1;
        }
        off
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> u32 {
        if self.at(kind) {
            self.bump()
        } else {
            self.error(format!(
                "expected {:?}, found {:?}",
                kind,
                self.kind()
            ));
            self.offset()
        }
    }

    fn error(&mut self, message: String) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(SyntaxError {
                offset: self.offset(),
                message,
            });
        }
    }

    fn ident(&mut self) -> String {
        if self.at(TokenKind::Ident) {
            let name = self.text().to_string();
            self.bump();
            name
        } else {
            self.error("expected identifier".into());
            String::new()
        }
    }

    /// Consumes a terminating semicolon; a closing brace or paren also ends
    /// the construct without one.
    fn finish_line(&mut self) {
        match self.kind() {
            TokenKind::Semi => {
                self.bump();
            }
            TokenKind::RBrace | TokenKind::RParen | TokenKind::Eof => {}
            _ => {
                self.error("expected ';'".into());
                self.sync_line();
            }
        }
    }

    fn sync_line(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Eof => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Like [`sync_line`](Self::sync_line), but also stops in front of a
    /// keyword that can start a top-level declaration, so garbage without a
    /// terminator does not swallow the declaration after it.
    fn sync_decl(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Semi => {
                    self.bump();
                    return;
                }
                TokenKind::RBrace
                | TokenKind::Eof
                | TokenKind::Import
                | TokenKind::Const
                | TokenKind::Var
                | TokenKind::Type
                | TokenKind::Func => return,
                _ => {
                    self.bump();
                }
            }
        }
    }

    // File level -----------------------------------------------------------

    fn parse_package_clause(&mut self) -> Option<String> {
        if !self.eat(TokenKind::Package) {
            return None;
        }
        let name = self.ident();
        self.finish_line();
        Some(name)
    }

    fn parse_decls_until_eof(&mut self) -> Vec<Decl> {
        let mut decls = Vec::new();
        while !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semi) {
                continue;
            }
            let start = self.offset();
            match self.kind() {
                TokenKind::Import => decls.push(self.parse_import_decl()),
                TokenKind::Const | TokenKind::Var | TokenKind::Type => {
                    decls.push(self.parse_gen_decl())
                }
                TokenKind::Func => decls.push(self.parse_func_decl()),
                _ => {
                    self.error(format!("expected declaration, found {:?}", self.kind()));
                    self.bump();
                    self.sync_decl();
                    decls.push(Decl::Bad(Span::new(start, self.offset())));
                }
            }
        }
        decls
    }

    fn parse_import_decl(&mut self) -> Decl {
        self.expect(TokenKind::Import);
        let mut specs = Vec::new();
        if self.eat(TokenKind::LParen) {
            while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                if self.eat(TokenKind::Semi) {
                    continue;
                }
                if let Some(spec) = self.parse_import_spec() {
                    specs.push(spec);
                } else {
                    self.sync_line();
                }
            }
            self.expect(TokenKind::RParen);
        } else if let Some(spec) = self.parse_import_spec() {
            specs.push(spec);
        }
        self.finish_line();
        Decl::Import { specs }
    }

    fn parse_import_spec(&mut self) -> Option<ImportSpec> {
        let alias = match self.kind() {
            TokenKind::Ident => {
                let a = self.text().to_string();
                self.bump();
                Some(a)
            }
            TokenKind::Period => {
                self.bump();
                Some(".".to_string())
            }
            _ => None,
        };
        if !self.at(TokenKind::Str) && !self.at(TokenKind::RawStr) {
            self.error("expected import path string".into());
            return None;
        }
        let raw = self.text();
        let path = raw[1..raw.len().saturating_sub(1)].to_string();
        self.bump();
        Some(ImportSpec { alias, path })
    }

    fn parse_gen_decl(&mut self) -> Decl {
        let keyword = self.kind();
        let tok_off = self.bump();
        if keyword == TokenKind::Type {
            let mut specs = Vec::new();
            if self.eat(TokenKind::LParen) {
                while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                    if self.eat(TokenKind::Semi) {
                        continue;
                    }
                    specs.push(self.parse_type_spec());
                    self.finish_line();
                }
                self.expect(TokenKind::RParen);
            } else {
                specs.push(self.parse_type_spec());
            }
            self.finish_line();
            return Decl::Type { specs, tok_off };
        }
        let mut specs = Vec::new();
        if self.eat(TokenKind::LParen) {
            while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                if self.eat(TokenKind::Semi) {
                    continue;
                }
                specs.push(self.parse_value_spec());
                self.finish_line();
            }
            self.expect(TokenKind::RParen);
        } else {
            specs.push(self.parse_value_spec());
        }
        self.finish_line();
        if keyword == TokenKind::Const {
            Decl::Const { specs, tok_off }
        } else {
            Decl::Var { specs, tok_off }
        }
    }

    fn parse_type_spec(&mut self) -> TypeSpec {
        let name = self.ident();
        let alias = self.eat(TokenKind::Assign);
        let typ = self.parse_type();
        TypeSpec { name, typ, alias }
    }

    fn parse_value_spec(&mut self) -> ValueSpec {
        let mut names = vec![self.ident()];
        while self.eat(TokenKind::Comma) {
            names.push(self.ident());
        }
        let typ = if self.type_start() && !self.at(TokenKind::Assign) {
            Some(self.parse_type())
        } else {
            None
        };
        let mut values = Vec::new();
        if self.eat(TokenKind::Assign) {
            values = self.expr_list();
        }
        ValueSpec { names, typ, values }
    }

    fn parse_func_decl(&mut self) -> Decl {
        let start = self.expect(TokenKind::Func);
        let recv = if self.at(TokenKind::LParen) {
            Some(self.parse_receiver())
        } else {
            None
        };
        let name = self.ident();
        let sig = Arc::new(self.parse_signature());
        let (body, end) = if self.at(TokenKind::LBrace) {
            let block = self.parse_block();
            let end = block.rbrace + 1;
            (Some(block), end)
        } else {
            (None, self.offset())
        };
        self.finish_line();
        Decl::Func(FuncDecl {
            recv,
            name,
            sig,
            body,
            span: Span::new(start, end),
        })
    }

    fn parse_receiver(&mut self) -> Field {
        self.expect(TokenKind::LParen);
        let field = if self.at(TokenKind::Ident) && self.kind_at(1) != TokenKind::RParen {
            let name = self.ident();
            let typ = self.parse_type();
            Field::new(vec![name], typ)
        } else {
            Field::new(Vec::new(), self.parse_type())
        };
        self.expect(TokenKind::RParen);
        field
    }

    // Types ----------------------------------------------------------------

    fn type_start(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Ident
                | TokenKind::Star
                | TokenKind::LBrack
                | TokenKind::Map
                | TokenKind::Chan
                | TokenKind::Arrow
                | TokenKind::Func
                | TokenKind::Struct
                | TokenKind::Interface
                | TokenKind::LParen
        )
    }

    fn parse_type(&mut self) -> ExprRef {
        match self.kind() {
            TokenKind::Ident => {
                let name = self.text().to_string();
                self.bump();
                if self.at(TokenKind::Period) && self.kind_at(1) == TokenKind::Ident {
                    self.bump();
                    let sel = self.ident();
                    Arc::new(Expr::Selector(Expr::ident(name), sel))
                } else {
                    Expr::ident(name)
                }
            }
            TokenKind::Star => {
                self.bump();
                Arc::new(Expr::Star(self.parse_type()))
            }
            TokenKind::LBrack => {
                self.bump();
                let len = if self.at(TokenKind::RBrack) {
                    None
                } else if self.at(TokenKind::DotDotDot) {
                    self.bump();
                    Some(Arc::new(Expr::BasicLit("...".into())))
                } else {
                    let saved = std::mem::replace(&mut self.no_lit, false);
                    let e = self.expr();
                    self.no_lit = saved;
                    Some(e)
                };
                self.expect(TokenKind::RBrack);
                Arc::new(Expr::ArrayType {
                    len,
                    elem: self.parse_type(),
                })
            }
            TokenKind::Map => {
                self.bump();
                self.expect(TokenKind::LBrack);
                let key = self.parse_type();
                self.expect(TokenKind::RBrack);
                Arc::new(Expr::MapType {
                    key,
                    value: self.parse_type(),
                })
            }
            TokenKind::Chan => {
                self.bump();
                let dir = if self.eat(TokenKind::Arrow) {
                    ChanDir::SEND
                } else {
                    ChanDir::BOTH
                };
                Arc::new(Expr::ChanType {
                    dir,
                    elem: self.parse_type(),
                })
            }
            TokenKind::Arrow => {
                self.bump();
                self.expect(TokenKind::Chan);
                Arc::new(Expr::ChanType {
                    dir: ChanDir::RECV,
                    elem: self.parse_type(),
                })
            }
            TokenKind::Func => {
                self.bump();
                Arc::new(Expr::FuncType(Arc::new(self.parse_signature())))
            }
            TokenKind::Struct => {
                self.bump();
                Arc::new(Expr::StructType(Arc::new(self.parse_struct_body())))
            }
            TokenKind::Interface => {
                self.bump();
                Arc::new(Expr::InterfaceType(Arc::new(self.parse_interface_body())))
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_type();
                self.expect(TokenKind::RParen);
                Arc::new(Expr::Paren(inner))
            }
            _ => {
                self.error(format!("expected type, found {:?}", self.kind()));
                Arc::new(Expr::Bad)
            }
        }
    }

    fn parse_struct_body(&mut self) -> Vec<Field> {
        let mut fields = Vec::new();
        self.expect(TokenKind::LBrace);
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semi) {
                continue;
            }
            match self.parse_struct_field() {
                Some(field) => fields.push(field),
                None => self.sync_line(),
            }
            // Optional tag string.
            if self.at(TokenKind::Str) || self.at(TokenKind::RawStr) {
                self.bump();
            }
            self.finish_line();
        }
        self.expect(TokenKind::RBrace);
        fields
    }

    fn parse_struct_field(&mut self) -> Option<Field> {
        // Embedded pointer type.
        if self.at(TokenKind::Star) {
            return Some(Field::new(Vec::new(), self.parse_type()));
        }
        if !self.at(TokenKind::Ident) {
            self.error("expected field declaration".into());
            return None;
        }
        // Embedded qualified type.
        if self.kind_at(1) == TokenKind::Period {
            return Some(Field::new(Vec::new(), self.parse_type()));
        }
        let mut names = vec![self.ident()];
        while self.at(TokenKind::Comma) && self.kind_at(1) == TokenKind::Ident {
            self.bump();
            names.push(self.ident());
        }
        if names.len() == 1 && !self.type_start() {
            // Embedded plain type.
            return Some(Field::new(Vec::new(), Expr::ident(names.remove(0))));
        }
        let typ = self.parse_type();
        Some(Field::new(names, typ))
    }

    fn parse_interface_body(&mut self) -> Vec<Field> {
        let mut fields = Vec::new();
        self.expect(TokenKind::LBrace);
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Semi) {
                continue;
            }
            if self.at(TokenKind::Ident) && self.kind_at(1) == TokenKind::LParen {
                let name = self.ident();
                let sig = Arc::new(self.parse_signature());
                fields.push(Field::new(vec![name], Arc::new(Expr::FuncType(sig))));
            } else if self.type_start() {
                fields.push(Field::new(Vec::new(), self.parse_type()));
            } else {
                self.error("expected method or embedded interface".into());
                self.sync_line();
            }
            self.finish_line();
        }
        self.expect(TokenKind::RBrace);
        fields
    }

    fn parse_signature(&mut self) -> Signature {
        let params = self.parse_param_list();
        let results = if self.at(TokenKind::LParen) {
            self.parse_param_list()
        } else if self.type_start() && !self.at(TokenKind::LParen) {
            vec![Field::new(Vec::new(), self.parse_type())]
        } else {
            Vec::new()
        };
        Signature { params, results }
    }

    /// Parses a parenthesized parameter list, resolving the name/type
    /// ambiguity the way idents group in practice: a run of plain idents
    /// followed by a type is a named group, a run followed by `)` is a list
    /// of type names.
    fn parse_param_list(&mut self) -> Vec<Field> {
        let mut fields = Vec::new();
        self.expect(TokenKind::LParen);
        let mut pending: Vec<String> = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
            if self.at(TokenKind::Ident)
                && matches!(self.kind_at(1), TokenKind::Comma | TokenKind::RParen)
            {
                pending.push(self.ident());
                self.eat(TokenKind::Comma);
                continue;
            }
            if self.at(TokenKind::Ident) && self.kind_at(1) != TokenKind::Period {
                // Named parameter, possibly closing a pending ident group.
                pending.push(self.ident());
                let typ = self.parse_param_type();
                fields.push(Field::new(std::mem::take(&mut pending), typ));
            } else {
                for name in pending.drain(..) {
                    fields.push(Field::new(Vec::new(), Expr::ident(name)));
                }
                let typ = self.parse_param_type();
                fields.push(Field::new(Vec::new(), typ));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        for name in pending {
            fields.push(Field::new(Vec::new(), Expr::ident(name)));
        }
        self.expect(TokenKind::RParen);
        fields
    }

    fn parse_param_type(&mut self) -> ExprRef {
        if self.eat(TokenKind::DotDotDot) {
            Arc::new(Expr::Ellipsis(self.parse_type()))
        } else {
            self.parse_type()
        }
    }

    // Statements -----------------------------------------------------------

    fn parse_block(&mut self) -> Block {
        let lbrace = self.expect(TokenKind::LBrace);
        let saved = std::mem::replace(&mut self.no_lit, false);
        let stmts = self.parse_stmt_list();
        self.no_lit = saved;
        let rbrace = if self.at(TokenKind::RBrace) {
            self.bump()
        } else {
            self.error("expected '}'".into());
            self.src.len() as u32
        };
        Block {
            lbrace,
            rbrace,
            stmts,
        }
    }

    fn parse_stmt_list(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            match self.kind() {
                TokenKind::RBrace | TokenKind::Case | TokenKind::Default | TokenKind::Eof => {
                    break
                }
                TokenKind::Semi => {
                    self.bump();
                }
                _ => stmts.push(self.parse_stmt()),
            }
        }
        stmts
    }

    fn parse_stmt(&mut self) -> Stmt {
        let start = self.offset();
        let stmt = match self.kind() {
            TokenKind::Const | TokenKind::Var | TokenKind::Type => {
                return Stmt::Decl(self.parse_gen_decl());
            }
            TokenKind::Go => {
                self.bump();
                let e = self.expr();
                Stmt::Go(e)
            }
            TokenKind::Defer => {
                self.bump();
                let e = self.expr();
                Stmt::Defer(e)
            }
            TokenKind::Return => {
                self.bump();
                let exprs = if matches!(
                    self.kind(),
                    TokenKind::Semi
                        | TokenKind::RBrace
                        | TokenKind::Case
                        | TokenKind::Default
                        | TokenKind::Eof
                ) {
                    Vec::new()
                } else {
                    self.expr_list()
                };
                Stmt::Return(exprs)
            }
            TokenKind::Break | TokenKind::Continue | TokenKind::Goto | TokenKind::Fallthrough => {
                self.bump();
                self.eat(TokenKind::Ident);
                Stmt::Branch
            }
            TokenKind::LBrace => {
                let block = self.parse_block();
                return Stmt::Block(block);
            }
            TokenKind::If => return self.parse_if_stmt(),
            TokenKind::For => return self.parse_for_stmt(),
            TokenKind::Switch => return self.parse_switch_stmt(),
            TokenKind::Select => return self.parse_select_stmt(),
            TokenKind::Ident if self.kind_at(1) == TokenKind::Colon => {
                let label = self.ident();
                self.bump();
                return Stmt::Labeled(label, Box::new(self.parse_stmt()));
            }
            TokenKind::Semi => {
                self.bump();
                return Stmt::Empty;
            }
            _ => {
                let stmt = self.parse_simple_stmt(false);
                if matches!(stmt, Stmt::Bad(_)) {
                    self.sync_line();
                    return Stmt::Bad(Span::new(start, self.offset()));
                }
                stmt
            }
        };
        self.finish_line();
        stmt
    }

    /// Expression statement, assignment, short declaration, send or
    /// inc/dec. In for-headers (`allow_range`) a `range` right-hand side
    /// comes back as a body-less `Stmt::Range`.
    fn parse_simple_stmt(&mut self, allow_range: bool) -> Stmt {
        let start = self.offset();
        if allow_range && self.at(TokenKind::Range) {
            self.bump();
            let x = self.expr();
            return Stmt::Range {
                for_off: 0,
                key: None,
                value: None,
                define: false,
                x,
                body: empty_block(),
            };
        }
        let lhs = self.expr_list();
        if lhs.is_empty() || matches!(&*lhs[0], Expr::Bad) {
            return Stmt::Bad(Span::new(start, self.offset()));
        }
        match self.kind() {
            TokenKind::Define | TokenKind::Assign => {
                let define = self.at(TokenKind::Define);
                let tok_off = self.bump();
                if allow_range && self.at(TokenKind::Range) {
                    self.bump();
                    let x = self.expr();
                    let mut it = lhs.into_iter();
                    return Stmt::Range {
                        for_off: 0,
                        key: it.next(),
                        value: it.next(),
                        define,
                        x,
                        body: empty_block(),
                    };
                }
                let rhs = self.expr_list();
                Stmt::Assign {
                    lhs,
                    rhs,
                    define,
                    tok_off,
                }
            }
            TokenKind::AssignOp => {
                let tok_off = self.bump();
                let rhs = self.expr_list();
                Stmt::Assign {
                    lhs,
                    rhs,
                    define: false,
                    tok_off,
                }
            }
            TokenKind::Arrow => {
                self.bump();
                let value = self.expr();
                Stmt::Send {
                    chan: lhs.into_iter().next().unwrap_or_else(|| Arc::new(Expr::Bad)),
                    value,
                }
            }
            TokenKind::Inc | TokenKind::Dec => {
                self.bump();
                Stmt::IncDec(lhs.into_iter().next().unwrap_or_else(|| Arc::new(Expr::Bad)))
            }
            _ => Stmt::Expr(lhs.into_iter().next().unwrap_or_else(|| Arc::new(Expr::Bad))),
        }
    }

    fn parse_if_stmt(&mut self) -> Stmt {
        let if_off = self.expect(TokenKind::If);
        let saved = std::mem::replace(&mut self.no_lit, true);
        let mut init = None;
        let mut cond = None;
        if !self.at(TokenKind::LBrace) {
            let stmt = self.parse_simple_stmt(false);
            if self.eat(TokenKind::Semi) {
                init = Some(Box::new(stmt));
                if !self.at(TokenKind::LBrace) {
                    cond = Some(self.expr());
                }
            } else {
                cond = stmt_expr(stmt, &mut init);
            }
        }
        self.no_lit = saved;
        let body = self.parse_block();
        let mut end = body.rbrace + 1;
        let els = if self.eat(TokenKind::Else) {
            let stmt = if self.at(TokenKind::If) {
                self.parse_if_stmt()
            } else {
                Stmt::Block(self.parse_block())
            };
            end = match &stmt {
                Stmt::If { end, .. } => *end,
                Stmt::Block(b) => b.rbrace + 1,
                _ => end,
            };
            Some(Box::new(stmt))
        } else {
            None
        };
        Stmt::If {
            if_off,
            init,
            cond,
            body,
            els,
            end,
        }
    }

    fn parse_for_stmt(&mut self) -> Stmt {
        let for_off = self.expect(TokenKind::For);
        let saved = std::mem::replace(&mut self.no_lit, true);
        let mut init = None;
        let mut cond = None;
        let mut post = None;
        let mut range = None;
        if !self.at(TokenKind::LBrace) {
            let stmt = self.parse_simple_stmt(true);
            if let Stmt::Range { .. } = stmt {
                range = Some(stmt);
            } else if self.eat(TokenKind::Semi) {
                // Three-clause form.
                init = Some(Box::new(stmt));
                if !self.at(TokenKind::Semi) && !self.at(TokenKind::LBrace) {
                    cond = Some(self.expr());
                }
                self.eat(TokenKind::Semi);
                if !self.at(TokenKind::LBrace) {
                    post = Some(Box::new(self.parse_simple_stmt(false)));
                }
            } else {
                cond = stmt_expr(stmt, &mut init);
            }
        }
        self.no_lit = saved;
        let body = self.parse_block();
        if let Some(Stmt::Range {
            key,
            value,
            define,
            x,
            ..
        }) = range
        {
            return Stmt::Range {
                for_off,
                key,
                value,
                define,
                x,
                body,
            };
        }
        Stmt::For {
            for_off,
            init,
            cond,
            post,
            body,
        }
    }

    fn parse_switch_stmt(&mut self) -> Stmt {
        self.expect(TokenKind::Switch);
        let saved = std::mem::replace(&mut self.no_lit, true);
        let mut init = None;
        let mut tag_stmt = None;
        if !self.at(TokenKind::LBrace) {
            let stmt = self.parse_simple_stmt(false);
            if self.eat(TokenKind::Semi) {
                init = Some(Box::new(stmt));
                if !self.at(TokenKind::LBrace) {
                    tag_stmt = Some(self.parse_simple_stmt(false));
                }
            } else {
                tag_stmt = Some(stmt);
            }
        }
        self.no_lit = saved;
        let lbrace = self.expect(TokenKind::LBrace);
        let clauses = self.parse_case_clauses();
        let rbrace = if self.at(TokenKind::RBrace) {
            self.bump()
        } else {
            self.src.len() as u32
        };

        // A `x.(type)` guard turns this into a type switch.
        match tag_stmt {
            Some(Stmt::Assign {
                lhs, rhs, define, ..
            }) if define
                && rhs.len() == 1
                && matches!(&*rhs[0], Expr::TypeAssert { typ: None, .. }) =>
            {
                let bind = lhs.first().and_then(|e| match &**e {
                    Expr::Ident(name) => Some(name.clone()),
                    _ => None,
                });
                let Expr::TypeAssert { x, .. } = &*rhs[0] else {
                    unreachable!()
                };
                Stmt::TypeSwitch {
                    init,
                    bind,
                    x: x.clone(),
                    lbrace,
                    rbrace,
                    clauses,
                }
            }
            Some(Stmt::Expr(e)) if matches!(&*e, Expr::TypeAssert { typ: None, .. }) => {
                let Expr::TypeAssert { x, .. } = &*e else {
                    unreachable!()
                };
                Stmt::TypeSwitch {
                    init,
                    bind: None,
                    x: x.clone(),
                    lbrace,
                    rbrace,
                    clauses,
                }
            }
            Some(Stmt::Expr(e)) => Stmt::Switch {
                init,
                tag: Some(e),
                lbrace,
                rbrace,
                clauses,
            },
            Some(other) => {
                // Malformed tag; keep the init effect at least.
                if init.is_none() {
                    init = Some(Box::new(other));
                }
                Stmt::Switch {
                    init,
                    tag: None,
                    lbrace,
                    rbrace,
                    clauses,
                }
            }
            None => Stmt::Switch {
                init,
                tag: None,
                lbrace,
                rbrace,
                clauses,
            },
        }
    }

    fn parse_case_clauses(&mut self) -> Vec<CaseClause> {
        let mut clauses = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.kind() {
                TokenKind::Case => {
                    self.bump();
                    let exprs = self.expr_list();
                    let colon = self.expect(TokenKind::Colon);
                    let body = self.parse_stmt_list();
                    clauses.push(CaseClause { exprs, colon, body });
                }
                TokenKind::Default => {
                    self.bump();
                    let colon = self.expect(TokenKind::Colon);
                    let body = self.parse_stmt_list();
                    clauses.push(CaseClause {
                        exprs: Vec::new(),
                        colon,
                        body,
                    });
                }
                _ => {
                    self.error("expected 'case' or 'default'".into());
                    self.sync_line();
                }
            }
        }
        clauses
    }

    fn parse_select_stmt(&mut self) -> Stmt {
        self.expect(TokenKind::Select);
        let lbrace = self.expect(TokenKind::LBrace);
        let mut clauses = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            match self.kind() {
                TokenKind::Case => {
                    self.bump();
                    let comm = Some(Box::new(self.parse_simple_stmt(false)));
                    let colon = self.expect(TokenKind::Colon);
                    let body = self.parse_stmt_list();
                    clauses.push(CommClause { comm, colon, body });
                }
                TokenKind::Default => {
                    self.bump();
                    let colon = self.expect(TokenKind::Colon);
                    let body = self.parse_stmt_list();
                    clauses.push(CommClause {
                        comm: None,
                        colon,
                        body,
                    });
                }
                _ => {
                    self.error("expected 'case' or 'default'".into());
                    self.sync_line();
                }
            }
        }
        let rbrace = if self.at(TokenKind::RBrace) {
            self.bump()
        } else {
            self.src.len() as u32
        };
        Stmt::Select {
            lbrace,
            rbrace,
            clauses,
        }
    }

    // Expressions ----------------------------------------------------------

    fn expr_list(&mut self) -> Vec<ExprRef> {
        let mut list = vec![self.expr()];
        while self.eat(TokenKind::Comma) {
            list.push(self.expr());
        }
        list
    }

    fn expr(&mut self) -> ExprRef {
        self.binary_expr(1)
    }

    fn binary_expr(&mut self, min_prec: u8) -> ExprRef {
        let mut lhs = self.unary_expr();
        loop {
            let Some((prec, op)) = binary_op(self.kind()) else {
                return lhs;
            };
            if prec < min_prec {
                return lhs;
            }
            self.bump();
            let rhs = self.binary_expr(prec + 1);
            lhs = Arc::new(Expr::Binary(op, lhs, rhs));
        }
    }

    fn unary_expr(&mut self) -> ExprRef {
        match self.kind() {
            TokenKind::Plus | TokenKind::Minus | TokenKind::Not | TokenKind::Caret => {
                self.bump();
                Arc::new(Expr::Unary(UnaryOp::Arith, self.unary_expr()))
            }
            TokenKind::And => {
                self.bump();
                Arc::new(Expr::Unary(UnaryOp::Addr, self.unary_expr()))
            }
            TokenKind::Star => {
                self.bump();
                Arc::new(Expr::Star(self.unary_expr()))
            }
            TokenKind::Arrow => {
                if self.kind_at(1) == TokenKind::Chan {
                    self.parse_type()
                } else {
                    self.bump();
                    Arc::new(Expr::Unary(UnaryOp::Recv, self.unary_expr()))
                }
            }
            _ => self.primary_expr(),
        }
    }

    fn primary_expr(&mut self) -> ExprRef {
        let mut x = self.operand();
        loop {
            match self.kind() {
                TokenKind::Period => match self.kind_at(1) {
                    TokenKind::Ident => {
                        self.bump();
                        let sel = self.ident();
                        x = Arc::new(Expr::Selector(x, sel));
                    }
                    TokenKind::LParen => {
                        self.bump();
                        self.bump();
                        let typ = if self.eat(TokenKind::Type) {
                            None
                        } else {
                            Some(self.parse_type())
                        };
                        self.expect(TokenKind::RParen);
                        x = Arc::new(Expr::TypeAssert { x, typ });
                    }
                    _ => {
                        // Dangling selector; treat as a selector with an
                        // empty name so inference still sees the base.
                        self.bump();
                        x = Arc::new(Expr::Selector(x, String::new()));
                        return x;
                    }
                },
                TokenKind::LParen => {
                    self.bump();
                    let saved = std::mem::replace(&mut self.no_lit, false);
                    let mut args = Vec::new();
                    while !self.at(TokenKind::RParen) && !self.at(TokenKind::Eof) {
                        args.push(self.expr());
                        self.eat(TokenKind::DotDotDot);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.no_lit = saved;
                    self.expect(TokenKind::RParen);
                    x = Arc::new(Expr::Call(x, args));
                }
                TokenKind::LBrack => {
                    self.bump();
                    let saved = std::mem::replace(&mut self.no_lit, false);
                    if self.eat(TokenKind::Colon) {
                        self.skip_slice_bounds();
                        x = Arc::new(Expr::Slice(x));
                    } else {
                        let index = self.expr();
                        if self.eat(TokenKind::Colon) {
                            self.skip_slice_bounds();
                            x = Arc::new(Expr::Slice(x));
                        } else {
                            x = Arc::new(Expr::Index(x, index));
                        }
                    }
                    self.no_lit = saved;
                    self.expect(TokenKind::RBrack);
                }
                TokenKind::LBrace if !self.no_lit && composite_type(&x) => {
                    let elts = self.parse_literal_body();
                    x = Arc::new(Expr::CompositeLit {
                        typ: Some(x),
                        elts,
                    });
                }
                _ => return x,
            }
        }
    }

    fn skip_slice_bounds(&mut self) {
        while !self.at(TokenKind::RBrack) && !self.at(TokenKind::Eof) {
            if self.eat(TokenKind::Colon) {
                continue;
            }
            self.expr();
        }
    }

    fn operand(&mut self) -> ExprRef {
        match self.kind() {
            TokenKind::Ident => {
                let name = self.text().to_string();
                self.bump();
                Expr::ident(name)
            }
            TokenKind::Number | TokenKind::Char | TokenKind::Str | TokenKind::RawStr => {
                let text = self.text().to_string();
                self.bump();
                Arc::new(Expr::BasicLit(text))
            }
            TokenKind::LParen => {
                self.bump();
                let saved = std::mem::replace(&mut self.no_lit, false);
                let inner = self.expr();
                self.no_lit = saved;
                self.expect(TokenKind::RParen);
                Arc::new(Expr::Paren(inner))
            }
            TokenKind::Func => {
                self.bump();
                let sig = Arc::new(self.parse_signature());
                if self.at(TokenKind::LBrace) {
                    let body = self.parse_block();
                    Arc::new(Expr::FuncLit { sig, body })
                } else {
                    Arc::new(Expr::FuncType(sig))
                }
            }
            TokenKind::LBrack
            | TokenKind::Map
            | TokenKind::Chan
            | TokenKind::Struct
            | TokenKind::Interface => self.parse_type(),
            _ => {
                self.error(format!("expected expression, found {:?}", self.kind()));
                Arc::new(Expr::Bad)
            }
        }
    }

    fn parse_literal_body(&mut self) -> Vec<ExprRef> {
        self.expect(TokenKind::LBrace);
        let saved = std::mem::replace(&mut self.no_lit, false);
        let mut elts = Vec::new();
        while !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
            let elt = self.parse_literal_elt();
            let elt = if self.eat(TokenKind::Colon) {
                let value = self.parse_literal_elt();
                Arc::new(Expr::KeyValue(elt, value))
            } else {
                elt
            };
            elts.push(elt);
            if !self.eat(TokenKind::Comma) {
                self.eat(TokenKind::Semi);
                if !self.at(TokenKind::RBrace) && !self.at(TokenKind::Eof) {
                    // Malformed element; make progress.
                    self.bump();
                }
            }
        }
        self.no_lit = saved;
        self.expect(TokenKind::RBrace);
        elts
    }

    fn parse_literal_elt(&mut self) -> ExprRef {
        if self.at(TokenKind::LBrace) {
            // Nested literal with elided type.
            let elts = self.parse_literal_body();
            Arc::new(Expr::CompositeLit { typ: None, elts })
        } else {
            self.expr()
        }
    }
}

fn empty_block() -> Block {
    Block {
        lbrace: 0,
        rbrace: 0,
        stmts: Vec::new(),
    }
}

/// Extracts the condition expression from a header statement, diverting
/// anything non-expression into the init slot.
fn stmt_expr(stmt: Stmt, init: &mut Option<Box<Stmt>>) -> Option<ExprRef> {
    match stmt {
        Stmt::Expr(e) => Some(e),
        other => {
            *init = Some(Box::new(other));
            None
        }
    }
}

fn binary_op(kind: TokenKind) -> Option<(u8, BinaryOp)> {
    Some(match kind {
        TokenKind::OrOr => (1, BinaryOp::Logic),
        TokenKind::AndAnd => (2, BinaryOp::Logic),
        TokenKind::Eq
        | TokenKind::NotEq
        | TokenKind::Less
        | TokenKind::LessEq
        | TokenKind::Greater
        | TokenKind::GreaterEq => (3, BinaryOp::Logic),
        TokenKind::Plus | TokenKind::Minus | TokenKind::Or | TokenKind::Caret => {
            (4, BinaryOp::Arith)
        }
        TokenKind::Star | TokenKind::Slash | TokenKind::Percent | TokenKind::AndNot => {
            (5, BinaryOp::Arith)
        }
        TokenKind::And => (5, BinaryOp::Arith),
        TokenKind::Shl | TokenKind::Shr => (5, BinaryOp::Shift),
        _ => return None,
    })
}

/// Whether a parsed expression can head a composite literal.
fn composite_type(e: &Expr) -> bool {
    matches!(
        e,
        Expr::Ident(_)
            | Expr::Selector(_, _)
            | Expr::ArrayType { .. }
            | Expr::MapType { .. }
            | Expr::StructType(_)
    )
}
