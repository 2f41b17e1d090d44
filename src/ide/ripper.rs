//! Cutting the cursor's declaration out of a broken buffer.
//!
//! The buffer is usually syntactically valid everywhere except inside the
//! declaration being edited. Splitting that declaration off lets the rest of
//! the file go through the strict file parser while the ripped part goes
//! through the tolerant declaration-list parser.

use crate::parser::{tokenize, TokenKind};

/// A buffer split at the cursor's top-level braced declaration. `start` is
/// the byte offset the region was cut from, for mapping the cursor into it.
#[derive(Debug)]
pub struct Ripped {
    pub outer: String,
    pub region: String,
    pub start: u32,
}

/// Finds the outermost brace-enclosed region containing the cursor and cuts
/// the whole enclosing declaration (from the previous top-level statement
/// boundary through the matching closing brace, or end of input when the
/// braces never re-balance). A cursor sitting exactly on the opening brace
/// counts as inside. `None` means the cursor is at the top level.
pub fn rip_off(src: &str, cursor: u32) -> Option<Ripped> {
    let toks = tokenize(src);
    let mut depth = 0u32;
    let mut decl_start = 0u32;
    let mut at_boundary = true;
    let mut open_brace: Option<u32> = None;

    for tok in &toks {
        if at_boundary && depth == 0 && tok.kind != TokenKind::Semi {
            decl_start = tok.start;
            at_boundary = false;
        }
        match tok.kind {
            TokenKind::LBrace => {
                if depth == 0 {
                    open_brace = Some(tok.start);
                }
                depth += 1;
            }
            TokenKind::RBrace => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(lb) = open_brace.take() {
                        if cursor >= lb && cursor <= tok.start {
                            return Some(split(src, decl_start, tok.end()));
                        }
                    }
                }
            }
            TokenKind::Semi if depth == 0 => at_boundary = true,
            _ => {}
        }
    }

    // Unbalanced braces: the edited declaration runs to end of input.
    if depth > 0 {
        if let Some(lb) = open_brace {
            if cursor >= lb {
                return Some(split(src, decl_start, src.len() as u32));
            }
        }
    }
    None
}

fn split(src: &str, start: u32, end: u32) -> Ripped {
    let (start, end) = (start as usize, end as usize);
    Ripped {
        outer: format!("{}{}", &src[..start], &src[end..]),
        region: src[start..end].to_string(),
        start: start as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "package main\n\
                       import \"fmt\"\n\
                       func A() {\n\tfmt.\n}\n\
                       func B() {}\n";

    #[test]
    fn rips_the_enclosing_declaration_with_its_header() {
        let cursor = SRC.find("fmt.").unwrap() as u32 + 4;
        let r = rip_off(SRC, cursor).unwrap();
        assert!(r.region.starts_with("func A()"));
        assert!(r.region.ends_with('}'));
        assert!(r.outer.contains("package main"));
        assert!(r.outer.contains("func B() {}"));
        assert!(!r.outer.contains("fmt.\n"));
        // The cursor maps into the region.
        let rel = cursor - r.start;
        assert_eq!(&r.region[rel as usize - 4..rel as usize], "fmt.");
    }

    #[test]
    fn cursor_on_opening_brace_belongs_to_the_region() {
        let cursor = SRC.find("{\n\tfmt").unwrap() as u32;
        let r = rip_off(SRC, cursor).unwrap();
        assert!(r.region.starts_with("func A()"));
    }

    #[test]
    fn top_level_cursor_rips_nothing() {
        assert!(rip_off(SRC, 0).is_none());
        let between = SRC.find("func B").unwrap() as u32 - 1;
        assert!(rip_off(SRC, between).is_none());
    }

    #[test]
    fn unbalanced_body_runs_to_end_of_input() {
        let src = "package main\nvar X int\nfunc Broken() {\n\tif X > \n";
        let cursor = src.len() as u32;
        let r = rip_off(src, cursor).unwrap();
        assert!(r.region.starts_with("func Broken()"));
        assert!(r.outer.contains("var X int"));
    }

    #[test]
    fn earlier_declarations_are_not_ripped() {
        let cursor = SRC.find("func B() {}").unwrap() as u32 + 10;
        let r = rip_off(SRC, cursor).unwrap();
        assert!(r.region.starts_with("func B()"));
        assert!(r.outer.contains("func A()"));
    }
}
