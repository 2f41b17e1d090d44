//! Classifying what sits immediately left of the cursor.
//!
//! The resolver works on tokens of the buffer prefix, scanned backwards.
//! The only expression shape it accepts is a dotted identifier chain with
//! balanced `()`/`[]` suffixes; anything else terminates the scan and the
//! request degrades to plain in-scope name filtering.

use crate::parser::{parse_expr, tokenize, Token, TokenKind};
use crate::semantic::DeclKind;
use crate::syntax::ast::{Expr, ExprRef};

/// Where the cursor sits, beyond the plain "after an expression dot" case.
#[derive(Debug)]
pub enum CursorLoc {
    /// No dot before the cursor; candidates come from the enclosing scopes.
    Bare,
    /// After a dot. `None` means the chain left of the dot did not parse;
    /// such a cursor gets no candidates rather than the whole scope.
    Expr(Option<ExprRef>),
    /// Inside the type-prefixed braces of a composite literal.
    StructLiteral(ExprRef),
    /// Inside an import path string; the core offers nothing here.
    ImportPath,
}

#[derive(Debug)]
pub struct CursorContext {
    pub loc: CursorLoc,
    pub partial: String,
    /// Declaration class the user asked for by typing its keyword.
    pub class: Option<DeclKind>,
}

impl CursorContext {
    fn bare(partial: String, class: Option<DeclKind>) -> CursorContext {
        CursorContext {
            loc: CursorLoc::Bare,
            partial,
            class,
        }
    }
}

pub fn deduce_cursor_context(src: &str, cursor: u32) -> CursorContext {
    let cursor = (cursor as usize).min(src.len());
    let prefix = &src[..cursor];
    let mut toks = tokenize(prefix);
    // Inserted terminators at the very cursor are an artifact of cutting
    // the buffer, not real context.
    while toks.last().is_some_and(|t| t.len == 0) {
        toks.pop();
    }

    if let Some(ctx) = import_path_context(prefix, &toks) {
        return ctx;
    }

    let Some(&last) = toks.last() else {
        return CursorContext::bare(String::new(), None);
    };

    // Identifier (or keyword) still being typed right at the cursor.
    let (partial, before_partial) = if last.end() as usize == cursor
        && (last.kind == TokenKind::Ident || last.kind.static_text().is_some_and(is_word))
    {
        (last.text(prefix).to_string(), toks.len() - 1)
    } else {
        (String::new(), toks.len())
    };

    let class = class_keyword(&toks, before_partial, prefix);
    if class.is_some() {
        return CursorContext::bare(partial, class);
    }

    // `<expr>.partial` — extract the chain left of the dot.
    if before_partial > 0 && toks[before_partial - 1].kind == TokenKind::Period {
        let expr = if before_partial >= 2 {
            extract_expr(prefix, &toks, before_partial - 2)
        } else {
            None
        };
        return CursorContext {
            loc: CursorLoc::Expr(expr),
            partial,
            class: None,
        };
    }

    if let Some(typ) = struct_literal_context(prefix, &toks, before_partial) {
        return CursorContext {
            loc: CursorLoc::StructLiteral(typ),
            partial,
            class: None,
        };
    }

    CursorContext::bare(partial, None)
}

fn is_word(text: &str) -> bool {
    text.chars().all(|c| c.is_ascii_alphabetic())
}

/// `const | var | type | func | module` directly before the partial filters
/// candidates by declaration class.
fn class_keyword(toks: &[Token], before: usize, src: &str) -> Option<DeclKind> {
    let tok = toks.get(before.checked_sub(1)?)?;
    match tok.kind {
        TokenKind::Const => Some(DeclKind::Const),
        TokenKind::Var => Some(DeclKind::Var),
        TokenKind::Type => Some(DeclKind::Type),
        TokenKind::Func => Some(DeclKind::Func),
        TokenKind::Ident if tok.text(src) == "module" => Some(DeclKind::Package),
        _ => None,
    }
}

/// Walks backwards from `end` over `ident(.ident)*` with balanced suffix
/// groups and parses the covered bytes.
fn extract_expr(src: &str, toks: &[Token], end: usize) -> Option<ExprRef> {
    let mut lo = None;
    let mut j = end as i64;
    loop {
        if j < 0 {
            break;
        }
        match toks[j as usize].kind {
            TokenKind::Ident => {
                lo = Some(j as usize);
                j -= 1;
                if j >= 0 && toks[j as usize].kind == TokenKind::Period {
                    j -= 1;
                    continue;
                }
                break;
            }
            TokenKind::RParen | TokenKind::RBrack | TokenKind::RBrace => {
                j = skip_balanced(toks, j as usize)?;
                lo = Some(j as usize);
                j -= 1;
            }
            _ => break,
        }
    }

    let lo = lo?;
    let text = &src[toks[lo].start as usize..toks[end].end() as usize];
    let expr = parse_expr(text);
    match &*expr {
        Expr::Bad => None,
        _ => Some(expr),
    }
}

/// From a closing delimiter, returns the index of its opener.
fn skip_balanced(toks: &[Token], close: usize) -> Option<i64> {
    let (open_kind, close_kind) = match toks[close].kind {
        TokenKind::RParen => (TokenKind::LParen, TokenKind::RParen),
        TokenKind::RBrack => (TokenKind::LBrack, TokenKind::RBrack),
        TokenKind::RBrace => (TokenKind::LBrace, TokenKind::RBrace),
        _ => return None,
    };
    let mut depth = 1;
    let mut j = close as i64 - 1;
    while j >= 0 {
        let k = toks[j as usize].kind;
        if k == close_kind {
            depth += 1;
        } else if k == open_kind {
            depth -= 1;
            if depth == 0 {
                return Some(j);
            }
        }
        j -= 1;
    }
    None
}

/// Cursor inside the string of an `import` clause. An unterminated path
/// lexes as an error token at the opening quote followed by fragments of
/// the path text.
fn import_path_context(src: &str, toks: &[Token]) -> Option<CursorContext> {
    let quote = toks
        .iter()
        .rposition(|t| t.kind == TokenKind::Error && t.text(src).starts_with('"'))?;
    // Everything after the quote must look like path text.
    for tok in &toks[quote + 1..] {
        match tok.kind {
            TokenKind::Ident
            | TokenKind::Number
            | TokenKind::Period
            | TokenKind::Slash
            | TokenKind::Minus => {}
            _ => return None,
        }
    }
    // Before it: earlier finished imports, an optional group paren, and the
    // keyword itself.
    let mut i = quote;
    while i > 0
        && matches!(
            toks[i - 1].kind,
            TokenKind::Str | TokenKind::Semi | TokenKind::Ident
        )
    {
        i -= 1;
    }
    if i > 0 && toks[i - 1].kind == TokenKind::LParen {
        i -= 1;
    }
    if i > 0 && toks[i - 1].kind == TokenKind::Import {
        return Some(CursorContext {
            loc: CursorLoc::ImportPath,
            partial: String::new(),
            class: None,
        });
    }
    None
}

/// Cursor inside `T{ ... }` where `T` is a (possibly qualified) type name:
/// the enclosing unmatched brace is found, and the tokens before it must
/// form an identifier chain sitting in a value position.
fn struct_literal_context(src: &str, toks: &[Token], before: usize) -> Option<ExprRef> {
    // Innermost unmatched `{`, scanning backwards.
    let mut depth = 0i32;
    let mut open = None;
    let mut j = before as i64 - 1;
    while j >= 0 {
        match toks[j as usize].kind {
            TokenKind::RBrace => depth += 1,
            TokenKind::LBrace => {
                if depth == 0 {
                    open = Some(j as usize);
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
        j -= 1;
    }
    let open = open?;
    if open == 0 {
        return None;
    }
    let tail = open - 1;
    if toks[tail].kind != TokenKind::Ident {
        return None;
    }
    let expr = extract_expr(src, toks, tail)?;
    if !matches!(&*expr, Expr::Ident(_) | Expr::Selector(..)) {
        return None;
    }

    // Reject brace-delimited statement bodies: the chain must follow a
    // token that starts a value position, not a signature or condition.
    let mut lo = tail;
    while lo > 0
        && matches!(toks[lo - 1].kind, TokenKind::Period)
        && lo >= 2
        && toks[lo - 2].kind == TokenKind::Ident
    {
        lo -= 2;
    }
    let ok = match lo.checked_sub(1).map(|i| toks[i].kind) {
        None => false,
        Some(
            TokenKind::Comma
            | TokenKind::LParen
            | TokenKind::LBrack
            | TokenKind::LBrace
            | TokenKind::Assign
            | TokenKind::Define
            | TokenKind::Colon
            | TokenKind::Return
            | TokenKind::Semi,
        ) => true,
        Some(_) => false,
    };
    if ok {
        Some(expr)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::pretty_type;

    fn ctx(src: &str) -> CursorContext {
        deduce_cursor_context(src, src.len() as u32)
    }

    fn expr_text(c: &CursorContext) -> String {
        match &c.loc {
            CursorLoc::Expr(Some(e)) => pretty_type(e),
            _ => String::new(),
        }
    }

    #[test]
    fn dot_after_identifier() {
        let c = ctx("x := 1\nfmt.");
        assert_eq!(expr_text(&c), "fmt");
        assert_eq!(c.partial, "");
    }

    #[test]
    fn partial_after_dot() {
        let c = ctx("fmt.Pr");
        assert_eq!(expr_text(&c), "fmt");
        assert_eq!(c.partial, "Pr");
    }

    #[test]
    fn dotted_chain_with_call_and_index_suffixes() {
        let c = ctx("a.b(x, y).c[0].");
        let CursorLoc::Expr(Some(e)) = &c.loc else {
            panic!("expected an expression, got {:?}", c.loc);
        };
        // a.b(x, y).c[0] — index of a selector of a call.
        let Expr::Index(x, _) = &**e else {
            panic!("expected index expression, got {e:?}");
        };
        let Expr::Selector(x, sel) = &**x else {
            panic!("expected selector, got {x:?}");
        };
        assert_eq!(sel, "c");
        assert!(matches!(&**x, Expr::Call(..)));
    }

    #[test]
    fn composite_literal_suffix_is_part_of_the_chain() {
        let c = ctx("tree.Node{x: 1}.");
        let CursorLoc::Expr(Some(e)) = &c.loc else {
            panic!("expected an expression, got {:?}", c.loc);
        };
        assert!(matches!(&**e, Expr::CompositeLit { .. }));
    }

    #[test]
    fn bare_partial_without_dot() {
        let c = ctx("fm");
        assert!(matches!(c.loc, CursorLoc::Bare));
        assert_eq!(c.partial, "fm");
    }

    #[test]
    fn lone_dot_yields_no_expression() {
        let c = ctx("\t.");
        assert!(matches!(c.loc, CursorLoc::Expr(None)));
        assert_eq!(c.partial, "");
    }

    #[test]
    fn class_filter_keywords() {
        let c = ctx("type ");
        assert_eq!(c.class, Some(DeclKind::Type));
        assert_eq!(c.partial, "");

        let c = ctx("func Re");
        assert_eq!(c.class, Some(DeclKind::Func));
        assert_eq!(c.partial, "Re");

        let c = ctx("module f");
        assert_eq!(c.class, Some(DeclKind::Package));
        assert_eq!(c.partial, "f");
    }

    #[test]
    fn import_path_position() {
        let c = ctx("import (\n\t\"fm");
        assert!(matches!(c.loc, CursorLoc::ImportPath));
        let c = ctx("import \"enc");
        assert!(matches!(c.loc, CursorLoc::ImportPath));
    }

    #[test]
    fn struct_literal_position() {
        let c = ctx("t := tree.Node{");
        let CursorLoc::StructLiteral(e) = &c.loc else {
            panic!("expected struct literal context, got {:?}", c.loc);
        };
        assert_eq!(pretty_type(e), "tree.Node");
    }

    #[test]
    fn function_body_is_not_a_struct_literal() {
        let c = ctx("func f() {\n\t");
        assert!(matches!(c.loc, CursorLoc::Bare));
    }

    #[test]
    fn empty_buffer() {
        let c = deduce_cursor_context("", 0);
        assert!(matches!(c.loc, CursorLoc::Bare));
        assert_eq!(c.partial, "");
    }
}
