//! Canonical type rendering for completion output.
//!
//! Anonymous struct and interface types render as the bare keywords, lifted
//! anonymous type names (`$s_N` / `$i_N`) are beautified the same way, and
//! binary-import qualified names (`!path!name`) collapse to the final
//! segment. Multi-result functions wrap their results in parentheses.

use std::fmt::Write;

use super::ast::{Expr, Field};

/// Renders a type expression into its canonical display string.
pub fn pretty_type(e: &Expr) -> String {
    let mut out = String::with_capacity(32);
    write_type(&mut out, e);
    out
}

fn write_type(out: &mut String, e: &Expr) {
    match e {
        Expr::Star(x) => {
            out.push('*');
            write_type(out, x);
        }
        Expr::Ident(name) => write_ident(out, name),
        Expr::ArrayType { len, elem } => {
            match len.as_deref() {
                Some(Expr::BasicLit(text)) => {
                    let _ = write!(out, "[{text}]");
                }
                Some(_) | None => out.push_str("[]"),
            }
            write_type(out, elem);
        }
        Expr::Selector(x, sel) => {
            write_type(out, x);
            let _ = write!(out, ".{sel}");
        }
        Expr::FuncType(sig) => {
            out.push_str("func(");
            write_field_list(out, &sig.params);
            out.push(')');
            let mut results = String::new();
            let n = write_field_list(&mut results, &sig.results);
            if n > 0 {
                if results.contains([',', ' ']) {
                    let _ = write!(out, " ({results})");
                } else {
                    let _ = write!(out, " {results}");
                }
            }
        }
        Expr::MapType { key, value } => {
            out.push_str("map[");
            write_type(out, key);
            out.push(']');
            write_type(out, value);
        }
        Expr::InterfaceType(_) => out.push_str("interface{}"),
        Expr::Ellipsis(elem) => {
            out.push_str("...");
            write_type(out, elem);
        }
        Expr::StructType(_) => out.push_str("struct"),
        Expr::ChanType { dir, elem } => {
            if !dir.can_send() {
                out.push_str("<-chan ");
            } else if !dir.can_recv() {
                out.push_str("chan<- ");
            } else {
                out.push_str("chan ");
            }
            write_type(out, elem);
        }
        Expr::Paren(x) => {
            out.push('(');
            write_type(out, x);
            out.push(')');
        }
        Expr::BasicLit(text) => out.push_str(text),
        // Anything else is not a type; render nothing rather than garbage.
        _ => {}
    }
}

fn write_ident(out: &mut String, name: &str) {
    if let Some(rest) = name.strip_prefix('$') {
        // Lifted anonymous types.
        match rest.as_bytes().first() {
            Some(b's') => out.push_str("struct"),
            Some(b'i') => out.push_str("interface{}"),
            _ => {}
        }
    } else if let Some(rest) = name.strip_prefix('#') {
        out.push_str(rest);
    } else if name.starts_with('!') {
        // "!import/path!name" from the binary reader.
        let tail = name.rsplit('!').next().unwrap_or(name);
        out.push_str(tail);
    } else {
        out.push_str(name);
    }
}

fn write_field_list(out: &mut String, fields: &[Field]) -> usize {
    let mut count = 0;
    for (i, field) in fields.iter().enumerate() {
        if !field.names.is_empty() {
            let mut wrote_name = false;
            for (j, name) in field.names.iter().enumerate() {
                count += 1;
                if name == "?" {
                    continue;
                }
                wrote_name = true;
                out.push_str(name);
                if j != field.names.len() - 1 {
                    out.push_str(", ");
                }
            }
            if wrote_name {
                out.push(' ');
            }
        } else {
            count += 1;
        }
        write_type(out, &field.typ);
        if i != fields.len() - 1 {
            out.push_str(", ");
        }
    }
    count
}

/// Rejects type expressions containing an error sentinel anywhere; the
/// completion filter drops such candidates.
pub fn check_type_expr(e: &Expr) -> bool {
    match e {
        Expr::Bad => false,
        Expr::Star(x) | Expr::Ellipsis(x) | Expr::Paren(x) => check_type_expr(x),
        Expr::ArrayType { elem, .. } | Expr::ChanType { elem, .. } => check_type_expr(elem),
        Expr::Selector(x, _) => check_type_expr(x),
        Expr::MapType { key, value } => check_type_expr(key) && check_type_expr(value),
        Expr::FuncType(sig) => {
            sig.params.iter().all(|f| check_type_expr(&f.typ))
                && sig.results.iter().all(|f| check_type_expr(&f.typ))
        }
        _ => true,
    }
}
