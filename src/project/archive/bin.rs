//! Compact binary export data reader.
//!
//! Layout: a uvarint version (0), the string and declaration section
//! lengths, both sections, then a package table. Declarations and types are
//! referenced by byte offset into the declaration section; type offsets
//! below [`PREDECL_RESERVED`] index a fixed table of predeclared types.
//! Named types install a placeholder before recursing into their body, so
//! self-referential types terminate. Positions and constant values are
//! decoded only far enough to skip them.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::{ArchiveError, ExportData, ExportRecord, PackageRef};
use crate::syntax::ast::{
    ChanDir, Decl, Expr, ExprRef, Field, FuncDecl, Signature, Span, TypeSpec, ValueSpec,
};

const PREDECL_RESERVED: u64 = 32;
const DELTA_NEW_FILE: i64 = -64;

// Type kind tags.
const DEFINED_TYPE: u64 = 0;
const POINTER_TYPE: u64 = 1;
const SLICE_TYPE: u64 = 2;
const ARRAY_TYPE: u64 = 3;
const CHAN_TYPE: u64 = 4;
const MAP_TYPE: u64 = 5;
const SIGNATURE_TYPE: u64 = 6;
const STRUCT_TYPE: u64 = 7;
const INTERFACE_TYPE: u64 = 8;

/// A decoded type. `und` chains a named type to its underlying one; only
/// constant decoding needs to follow the chain.
struct BinType {
    typ: ExprRef,
    und: Option<Ty>,
}

type Ty = Rc<RefCell<BinType>>;

fn leaf(typ: ExprRef) -> Ty {
    Rc::new(RefCell::new(BinType { typ, und: None }))
}

fn underlying_expr(t: &Ty) -> ExprRef {
    let mut cur = t.clone();
    loop {
        let next = cur.borrow().und.clone();
        match next {
            Some(u) => cur = u,
            None => return cur.borrow().typ.clone(),
        }
    }
}

/// One referenced package. The index is fixed after the package table is
/// read; `decl_typ` memoises processed declarations.
struct PkgInner {
    full_name: String,
    /// Record key: empty for the archive's own package.
    key: String,
    index: FxHashMap<String, u64>,
    decl_typ: RefCell<FxHashMap<String, Ty>>,
}

#[derive(Clone)]
struct BinPkg(Rc<PkgInner>);

struct BinParser<'a> {
    string_data: &'a [u8],
    decl_data: &'a [u8],
    string_cache: FxHashMap<u64, String>,
    typ_cache: FxHashMap<u64, Ty>,
    pkg_cache: FxHashMap<u64, BinPkg>,
    records: Vec<ExportRecord>,
}

pub fn parse(data: &[u8], archive_name: &str) -> Result<ExportData, ArchiveError> {
    let mut r = ByteReader::new(data);
    let version = r.uvarint()?;
    if version != 0 {
        return Err(ArchiveError::UnsupportedVersion(version));
    }
    let s_len = r.uvarint()? as usize;
    let d_len = r.uvarint()? as usize;
    let start = r.pos;
    if data.len() < start + s_len + d_len {
        return Err(ArchiveError::Truncated);
    }

    let mut typ_cache = FxHashMap::default();
    for (i, typ) in predeclared().into_iter().enumerate() {
        typ_cache.insert(i as u64, leaf(typ));
    }
    let mut p = BinParser {
        string_data: &data[start..start + s_len],
        decl_data: &data[start + s_len..start + s_len + d_len],
        string_cache: FxHashMap::default(),
        typ_cache,
        pkg_cache: FxHashMap::default(),
        records: Vec::new(),
    };
    r.pos = start + s_len + d_len;

    let mut default_alias = String::new();
    let mut package_refs = Vec::new();
    let mut pkgs = Vec::new();
    let n_pkgs = r.uvarint()?;
    for _ in 0..n_pkgs {
        let path_off = r.uvarint()?;
        let path = p.string_at(path_off)?;
        let name = p.string_at(r.uvarint()?)?;
        let _height = r.uvarint()?;

        let (full_name, key) = if path.is_empty() {
            default_alias = name.clone();
            (format!("!{archive_name}!{name}"), String::new())
        } else {
            let full = format!("!{path}!{name}");
            (full.clone(), full)
        };
        package_refs.push(PackageRef {
            key: key.clone(),
            alias: full_name.clone(),
        });

        let n_syms = r.uvarint()?;
        let mut index = FxHashMap::default();
        for _ in 0..n_syms {
            let sym = p.string_at(r.uvarint()?)?;
            index.insert(sym, r.uvarint()?);
        }

        let pkg = BinPkg(Rc::new(PkgInner {
            full_name,
            key,
            index,
            decl_typ: RefCell::new(FxHashMap::default()),
        }));
        p.pkg_cache.insert(path_off, pkg.clone());
        pkgs.push(pkg);
    }

    for pkg in &pkgs {
        let mut names: Vec<String> = pkg.0.index.keys().cloned().collect();
        names.sort();
        for name in &names {
            do_decl(&mut p, pkg, name)?;
        }
    }

    Ok(ExportData {
        default_alias,
        packages: package_refs,
        records: p.records,
    })
}

impl<'a> BinParser<'a> {
    fn string_at(&mut self, off: u64) -> Result<String, ArchiveError> {
        if let Some(s) = self.string_cache.get(&off) {
            return Ok(s.clone());
        }
        let tail = self
            .string_data
            .get(off as usize..)
            .ok_or(ArchiveError::Truncated)?;
        let mut r = ByteReader::new(tail);
        let len = r.uvarint()? as usize;
        let bytes = r.read(len)?;
        let s = String::from_utf8_lossy(bytes).into_owned();
        self.string_cache.insert(off, s.clone());
        Ok(s)
    }

    fn pkg_at(&self, off: u64) -> Result<BinPkg, ArchiveError> {
        self.pkg_cache
            .get(&off)
            .cloned()
            .ok_or_else(|| ArchiveError::Malformed(format!("missing package at offset {off}")))
    }

    fn record(&mut self, pkg: &BinPkg, decl: Decl) {
        self.records.push(ExportRecord {
            package: pkg.0.key.clone(),
            decl,
        });
    }
}

fn do_decl(p: &mut BinParser<'_>, pkg: &BinPkg, name: &str) -> Result<Ty, ArchiveError> {
    if let Some(t) = pkg.0.decl_typ.borrow().get(name) {
        return Ok(t.clone());
    }
    let off = *pkg
        .0
        .index
        .get(name)
        .ok_or_else(|| ArchiveError::Malformed(format!("{name:?} not in {}", pkg.0.full_name)))?;
    let data = p.decl_data;
    let tail = data
        .get(off as usize..)
        .ok_or(ArchiveError::Truncated)?;
    let mut r = ByteReader::new(tail);
    let t = obj(p, &mut r, pkg, name)?;
    pkg.0.decl_typ.borrow_mut().insert(name.to_string(), t.clone());
    Ok(t)
}

fn obj(
    p: &mut BinParser<'_>,
    r: &mut ByteReader<'_>,
    pkg: &BinPkg,
    name: &str,
) -> Result<Ty, ArchiveError> {
    let tag = r.byte()?;
    pos(p, r)?;
    match tag {
        b'A' => {
            let t = typ(p, r)?;
            let expr = t.borrow().typ.clone();
            p.record(
                pkg,
                Decl::Type {
                    specs: vec![TypeSpec {
                        name: name.to_string(),
                        typ: expr,
                        alias: true,
                    }],
                    tok_off: 0,
                },
            );
            Ok(t)
        }
        b'C' => {
            let t = value(p, r)?;
            let expr = t.borrow().typ.clone();
            p.record(
                pkg,
                Decl::Const {
                    specs: vec![ValueSpec {
                        names: vec![name.to_string()],
                        typ: Some(expr),
                        values: vec![Arc::new(Expr::BasicLit("0".to_string()))],
                    }],
                    tok_off: 0,
                },
            );
            Ok(t)
        }
        b'F' => {
            let sig = signature(p, r)?;
            p.record(
                pkg,
                Decl::Func(FuncDecl {
                    recv: None,
                    name: name.to_string(),
                    sig: sig.clone(),
                    body: None,
                    span: Span::default(),
                }),
            );
            Ok(leaf(Arc::new(Expr::FuncType(sig))))
        }
        b'T' => {
            // Recursive types need a stub before the body is decoded.
            let stub = leaf(Arc::new(Expr::Selector(
                Expr::ident(pkg.0.full_name.clone()),
                name.to_string(),
            )));
            pkg.0
                .decl_typ
                .borrow_mut()
                .insert(name.to_string(), stub.clone());
            let und = typ(p, r)?;
            stub.borrow_mut().und = Some(und.clone());
            let und_expr = und.borrow().typ.clone();
            p.record(
                pkg,
                Decl::Type {
                    specs: vec![TypeSpec {
                        name: name.to_string(),
                        typ: und_expr.clone(),
                        alias: false,
                    }],
                    tok_off: 0,
                },
            );

            if matches!(&*und_expr, Expr::InterfaceType(_)) {
                // Interface method sets live in the type itself.
                return Ok(stub);
            }

            let n_methods = r.uvarint()?;
            for _ in 0..n_methods {
                pos(p, r)?;
                let mname = p.string_at(r.uvarint()?)?;
                let recv = strip_receiver(param(p, r)?);
                let msig = signature(p, r)?;
                p.record(
                    pkg,
                    Decl::Func(FuncDecl {
                        recv: Some(recv),
                        name: mname,
                        sig: msig,
                        body: None,
                        span: Span::default(),
                    }),
                );
            }
            Ok(stub)
        }
        b'V' => {
            let t = typ(p, r)?;
            let expr = t.borrow().typ.clone();
            p.record(
                pkg,
                Decl::Var {
                    specs: vec![ValueSpec {
                        names: vec![name.to_string()],
                        typ: Some(expr),
                        values: vec![],
                    }],
                    tok_off: 0,
                },
            );
            Ok(t)
        }
        other => Err(ArchiveError::Malformed(format!(
            "unexpected declaration tag {:?}",
            other as char
        ))),
    }
}

fn typ(p: &mut BinParser<'_>, r: &mut ByteReader<'_>) -> Result<Ty, ArchiveError> {
    let off = r.uvarint()?;
    typ_at(p, off)
}

fn typ_at(p: &mut BinParser<'_>, off: u64) -> Result<Ty, ArchiveError> {
    if let Some(t) = p.typ_cache.get(&off) {
        return Ok(t.clone());
    }
    if off < PREDECL_RESERVED {
        return Err(ArchiveError::Malformed(format!(
            "predeclared type missing from cache: {off}"
        )));
    }
    let data = p.decl_data;
    let tail = data
        .get((off - PREDECL_RESERVED) as usize..)
        .ok_or(ArchiveError::Truncated)?;
    let mut r = ByteReader::new(tail);
    let t = do_type(p, &mut r)?;
    p.typ_cache.insert(off, t.clone());
    Ok(t)
}

fn do_type(p: &mut BinParser<'_>, r: &mut ByteReader<'_>) -> Result<Ty, ArchiveError> {
    match r.uvarint()? {
        DEFINED_TYPE => {
            let name = p.string_at(r.uvarint()?)?;
            let pkg = p.pkg_at(r.uvarint()?)?;
            do_decl(p, &pkg, &name)
        }
        POINTER_TYPE => {
            let elt = typ(p, r)?;
            let inner = elt.borrow().typ.clone();
            Ok(leaf(Arc::new(Expr::Star(inner))))
        }
        SLICE_TYPE => {
            let elt = typ(p, r)?;
            let elem = elt.borrow().typ.clone();
            Ok(leaf(Arc::new(Expr::ArrayType { len: None, elem })))
        }
        ARRAY_TYPE => {
            let n = r.uvarint()?;
            let elt = typ(p, r)?;
            let elem = elt.borrow().typ.clone();
            Ok(leaf(Arc::new(Expr::ArrayType {
                len: Some(Arc::new(Expr::BasicLit(n.to_string()))),
                elem,
            })))
        }
        CHAN_TYPE => {
            let dir = match r.uvarint()? {
                1 => ChanDir::RECV,
                2 => ChanDir::SEND,
                3 => ChanDir::BOTH,
                d => {
                    return Err(ArchiveError::Malformed(format!(
                        "unexpected channel direction {d}"
                    )))
                }
            };
            let elt = typ(p, r)?;
            let elem = elt.borrow().typ.clone();
            Ok(leaf(Arc::new(Expr::ChanType { dir, elem })))
        }
        MAP_TYPE => {
            let key = typ(p, r)?;
            let val = typ(p, r)?;
            let (key, value) = (key.borrow().typ.clone(), val.borrow().typ.clone());
            Ok(leaf(Arc::new(Expr::MapType { key, value })))
        }
        SIGNATURE_TYPE => {
            let _ = p.pkg_at(r.uvarint()?)?;
            let sig = signature(p, r)?;
            Ok(leaf(Arc::new(Expr::FuncType(sig))))
        }
        STRUCT_TYPE => {
            let _ = p.pkg_at(r.uvarint()?)?;
            let n = r.uvarint()?;
            let mut fields = Vec::with_capacity(n as usize);
            for _ in 0..n {
                pos(p, r)?;
                let fname = p.string_at(r.uvarint()?)?;
                let ftyp = typ(p, r)?;
                let embedded = r.uvarint()? != 0;
                let _tag = p.string_at(r.uvarint()?)?;
                let names = if fname.is_empty() || embedded {
                    vec![]
                } else {
                    vec![fname]
                };
                fields.push(Field::new(names, ftyp.borrow().typ.clone()));
            }
            Ok(leaf(Arc::new(Expr::StructType(Arc::new(fields)))))
        }
        INTERFACE_TYPE => {
            let _ = p.pkg_at(r.uvarint()?)?;
            let n_embeds = r.uvarint()?;
            let mut embeds = Vec::with_capacity(n_embeds as usize);
            for _ in 0..n_embeds {
                pos(p, r)?;
                let t = typ(p, r)?;
                let expr = t.borrow().typ.clone();
                if matches!(&*expr, Expr::Selector(..)) {
                    embeds.push(expr);
                }
            }
            let n_methods = r.uvarint()?;
            let mut fields = Vec::with_capacity((n_methods + n_embeds) as usize);
            for _ in 0..n_methods {
                pos(p, r)?;
                let mname = p.string_at(r.uvarint()?)?;
                let msig = signature(p, r)?;
                fields.push(Field::new(vec![mname], Arc::new(Expr::FuncType(msig))));
            }
            for embed in embeds {
                fields.push(Field::new(vec![], embed));
            }
            Ok(leaf(Arc::new(Expr::InterfaceType(Arc::new(fields)))))
        }
        k => Err(ArchiveError::Malformed(format!(
            "unexpected type kind tag {k}"
        ))),
    }
}

fn signature(
    p: &mut BinParser<'_>,
    r: &mut ByteReader<'_>,
) -> Result<Arc<Signature>, ArchiveError> {
    let mut params = param_list(p, r)?;
    let results = param_list(p, r)?;
    // The variadic flag is present only for non-empty parameter lists.
    if !params.is_empty() && r.uvarint()? != 0 {
        let last = params.last_mut().expect("non-empty");
        let elem = match &*last.typ {
            Expr::ArrayType { elem, .. } => elem.clone(),
            _ => {
                return Err(ArchiveError::Malformed(
                    "variadic parameter is not a slice".to_string(),
                ))
            }
        };
        last.typ = Arc::new(Expr::Ellipsis(elem));
    }
    Ok(Arc::new(Signature { params, results }))
}

fn param_list(
    p: &mut BinParser<'_>,
    r: &mut ByteReader<'_>,
) -> Result<Vec<Field>, ArchiveError> {
    let n = r.uvarint()?;
    let mut fields = Vec::with_capacity(n as usize);
    for _ in 0..n {
        fields.push(param(p, r)?);
    }
    Ok(fields)
}

fn param(p: &mut BinParser<'_>, r: &mut ByteReader<'_>) -> Result<Field, ArchiveError> {
    pos(p, r)?;
    let name = p.string_at(r.uvarint()?)?;
    let t = typ(p, r)?;
    let names = if name.is_empty() { vec![] } else { vec![name] };
    let typ = t.borrow().typ.clone();
    Ok(Field::new(names, typ))
}

/// Receiver types arrive qualified with the owning package's full name;
/// strip the qualifier so the receiver names its type directly.
fn strip_receiver(f: Field) -> Field {
    let typ = match &*f.typ {
        Expr::Star(inner) => match &**inner {
            Expr::Selector(_, sel) => Arc::new(Expr::Star(Expr::ident(sel.clone()))),
            _ => f.typ.clone(),
        },
        Expr::Selector(_, sel) => Expr::ident(sel.clone()),
        _ => f.typ.clone(),
    };
    Field::new(f.names, typ)
}

fn pos(p: &mut BinParser<'_>, r: &mut ByteReader<'_>) -> Result<(), ArchiveError> {
    if r.varint()? != DELTA_NEW_FILE {
        return Ok(());
    }
    let l = r.varint()?;
    if l == -1 {
        return Ok(());
    }
    let _file = p.string_at(r.uvarint()?)?;
    Ok(())
}

/// Decodes and discards a constant value; the encoding depends on the
/// constant's underlying predeclared type.
fn value(p: &mut BinParser<'_>, r: &mut ByteReader<'_>) -> Result<Ty, ArchiveError> {
    let t = typ(p, r)?;
    let underlying = underlying_expr(&t);
    let Expr::Ident(name) = &*underlying else {
        return Err(ArchiveError::Malformed(format!(
            "constant of non-basic type {underlying:?}"
        )));
    };
    match name.as_str() {
        "bool" | "&untypedBool&" => {
            r.uvarint()?;
        }
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "uintptr" | "byte" | "rune" | "&untypedInt&" | "&untypedRune&" => {
            mpint(r, name)?;
        }
        "float32" | "float64" | "&untypedFloat&" => {
            mpfloat(r, name)?;
        }
        "complex64" | "complex128" | "&untypedComplex&" => {
            mpfloat(r, name)?;
            mpfloat(r, name)?;
        }
        "string" | "&untypedString&" => {
            p.string_at(r.uvarint()?)?;
        }
        _ => {
            return Err(ArchiveError::Malformed(format!(
                "unexpected constant type {name}"
            )))
        }
    }
    Ok(t)
}

fn int_size(name: &str) -> Result<(bool, u32), ArchiveError> {
    if name.starts_with('&') {
        return Ok((true, 64));
    }
    Ok(match name {
        "float32" | "complex64" => (true, 3),
        "float64" | "complex128" => (true, 7),
        "int8" => (true, 1),
        "int16" => (true, 2),
        "int32" | "rune" => (true, 4),
        "int64" | "int" => (true, 8),
        "uint8" | "byte" => (false, 1),
        "uint16" => (false, 2),
        "uint32" => (false, 4),
        "uint64" | "uint" | "uintptr" => (false, 8),
        _ => {
            return Err(ArchiveError::Malformed(format!(
                "unexpected integer type {name}"
            )))
        }
    })
}

/// Skips a multi-precision integer, reporting whether it was zero (a zero
/// mantissa means no exponent follows in the float encoding).
fn mpint(r: &mut ByteReader<'_>, type_name: &str) -> Result<bool, ArchiveError> {
    let (signed, max_bytes) = int_size(type_name)?;
    let mut max_small: u32 = 256 - max_bytes;
    if signed {
        max_small = 256 - 2 * max_bytes;
    }
    if max_bytes == 1 {
        max_small = 256;
    }

    let n = r.byte()?;
    if (n as u32) < max_small {
        let mut v = n as i64;
        if signed {
            v >>= 1;
            if n & 1 != 0 {
                v = !v;
            }
        }
        return Ok(v == 0);
    }

    let mut v = n.wrapping_neg();
    if signed {
        v = (n & !1u8).wrapping_neg() >> 1;
    }
    if v < 1 || v as u32 > max_bytes {
        return Err(ArchiveError::Malformed(format!(
            "weird integer encoding: {n}, {signed} => {v}"
        )));
    }
    r.read(v as usize)?;
    Ok(false)
}

fn mpfloat(r: &mut ByteReader<'_>, type_name: &str) -> Result<(), ArchiveError> {
    if !mpint(r, type_name)? {
        r.varint()?;
    }
    Ok(())
}

/// The fixed table of types referenced by reserved offsets.
fn predeclared() -> Vec<ExprRef> {
    let mut out: Vec<ExprRef> = [
        // basic types
        "bool", "int", "int8", "int16", "int32", "int64", "uint", "uint8", "uint16", "uint32",
        "uint64", "uintptr", "float32", "float64", "complex64", "complex128", "string",
        // aliases
        "byte", "rune",
        // error
        "error",
        // untyped sentinels
        "&untypedBool&", "&untypedInt&", "&untypedRune&", "&untypedFloat&", "&untypedComplex&",
        "&untypedString&", "&untypedNil&",
    ]
    .iter()
    .map(|n| Expr::ident(*n))
    .collect();
    out.push(Arc::new(Expr::Selector(
        Expr::ident("unsafe"),
        "Pointer".to_string(),
    )));
    out.push(Expr::ident("&invalid-type&"));
    out.push(Expr::ident("any"));
    out
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> ByteReader<'a> {
        ByteReader { buf, pos: 0 }
    }

    fn byte(&mut self) -> Result<u8, ArchiveError> {
        let b = *self.buf.get(self.pos).ok_or(ArchiveError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        let end = self.pos.checked_add(n).ok_or(ArchiveError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(ArchiveError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn uvarint(&mut self) -> Result<u64, ArchiveError> {
        let mut x: u64 = 0;
        let mut shift = 0u32;
        loop {
            let b = self.byte()?;
            if shift >= 64 {
                return Err(ArchiveError::Malformed("varint overflow".to_string()));
            }
            x |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(x);
            }
            shift += 7;
        }
    }

    fn varint(&mut self) -> Result<i64, ArchiveError> {
        let ux = self.uvarint()?;
        let mut x = (ux >> 1) as i64;
        if ux & 1 != 0 {
            x = !x;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::pretty_type;

    fn uv(out: &mut Vec<u8>, mut n: u64) {
        loop {
            let mut b = (n & 0x7f) as u8;
            n >>= 7;
            if n != 0 {
                b |= 0x80;
            }
            out.push(b);
            if n == 0 {
                return;
            }
        }
    }

    fn iv(out: &mut Vec<u8>, n: i64) {
        let zigzag = ((n << 1) ^ (n >> 63)) as u64;
        uv(out, zigzag);
    }

    #[derive(Default)]
    struct Strings {
        data: Vec<u8>,
        offsets: std::collections::HashMap<String, u64>,
    }

    impl Strings {
        fn off(&mut self, s: &str) -> u64 {
            if let Some(&off) = self.offsets.get(s) {
                return off;
            }
            let off = self.data.len() as u64;
            uv(&mut self.data, s.len() as u64);
            self.data.extend_from_slice(s.as_bytes());
            self.offsets.insert(s.to_string(), off);
            off
        }
    }

    fn pos(out: &mut Vec<u8>) {
        iv(out, 0);
    }

    /// Encodes a one-package stream: `type T struct { F int }` with method
    /// `M`, `var X int`, and variadic `func Sum(xs ...int)`.
    fn fixture() -> Vec<u8> {
        let mut strings = Strings::default();
        let s_empty = strings.off("");
        let s_demo = strings.off("demo");
        let s_t = strings.off("T");
        let s_x = strings.off("X");
        let s_m = strings.off("M");
        let s_recv = strings.off("t");
        let s_f = strings.off("F");
        let s_xs = strings.off("xs");
        let s_sum = strings.off("Sum");

        const INT: u64 = 1; // predeclared index of "int"
        let pkg_path_off = s_empty;

        let mut decls = Vec::new();

        // struct { F int }
        let struct_off = PREDECL_RESERVED + decls.len() as u64;
        uv(&mut decls, STRUCT_TYPE);
        uv(&mut decls, pkg_path_off);
        uv(&mut decls, 1); // one field
        pos(&mut decls);
        uv(&mut decls, s_f);
        uv(&mut decls, INT);
        uv(&mut decls, 0); // not embedded
        uv(&mut decls, s_empty); // tag

        // defined type reference to T (for the method receiver)
        let tref_off = PREDECL_RESERVED + decls.len() as u64;
        uv(&mut decls, DEFINED_TYPE);
        uv(&mut decls, s_t);
        uv(&mut decls, pkg_path_off);

        // []int
        let slice_off = PREDECL_RESERVED + decls.len() as u64;
        uv(&mut decls, SLICE_TYPE);
        uv(&mut decls, INT);

        // var X int
        let x_off = decls.len() as u64;
        decls.push(b'V');
        pos(&mut decls);
        uv(&mut decls, INT);

        // type T + method M
        let t_off = decls.len() as u64;
        decls.push(b'T');
        pos(&mut decls);
        uv(&mut decls, struct_off);
        uv(&mut decls, 1); // one method
        pos(&mut decls);
        uv(&mut decls, s_m);
        // receiver param
        pos(&mut decls);
        uv(&mut decls, s_recv);
        uv(&mut decls, tref_off);
        // method signature: no params, no results
        uv(&mut decls, 0);
        uv(&mut decls, 0);

        // func Sum(xs ...int)
        let sum_off = decls.len() as u64;
        decls.push(b'F');
        pos(&mut decls);
        uv(&mut decls, 1); // one param
        pos(&mut decls);
        uv(&mut decls, s_xs);
        uv(&mut decls, slice_off);
        uv(&mut decls, 0); // no results
        uv(&mut decls, 1); // variadic

        let mut out = Vec::new();
        uv(&mut out, 0); // version
        uv(&mut out, strings.data.len() as u64);
        uv(&mut out, decls.len() as u64);
        out.extend_from_slice(&strings.data);
        out.extend_from_slice(&decls);

        uv(&mut out, 1); // one package
        uv(&mut out, s_empty); // path: own package
        uv(&mut out, s_demo);
        uv(&mut out, 0); // height
        uv(&mut out, 3); // symbols
        uv(&mut out, s_sum);
        uv(&mut out, sum_off);
        uv(&mut out, s_t);
        uv(&mut out, t_off);
        uv(&mut out, s_x);
        uv(&mut out, x_off);
        out
    }

    #[test]
    fn decodes_package_with_type_method_var_and_variadic_func() {
        let export = parse(&fixture(), "demo.a").unwrap();
        assert_eq!(export.default_alias, "demo");
        assert!(export.records.iter().all(|r| r.package.is_empty()));

        let type_rec = export
            .records
            .iter()
            .find_map(|r| match &r.decl {
                Decl::Type { specs, .. } if specs[0].name == "T" => Some(&specs[0]),
                _ => None,
            })
            .unwrap();
        assert!(matches!(&*type_rec.typ, Expr::StructType(fields) if fields.len() == 1));

        let method = export
            .records
            .iter()
            .find_map(|r| match &r.decl {
                Decl::Func(f) if f.name == "M" => Some(&r.decl),
                _ => None,
            })
            .unwrap();
        assert_eq!(method.method_of(), Some("T"));

        let sum = export
            .records
            .iter()
            .find_map(|r| match &r.decl {
                Decl::Func(f) if f.name == "Sum" => Some(f),
                _ => None,
            })
            .unwrap();
        assert_eq!(pretty_type(&sum.sig.params[0].typ), "...int");

        let var = export
            .records
            .iter()
            .find_map(|r| match &r.decl {
                Decl::Var { specs, .. } if specs[0].names[0] == "X" => Some(&specs[0]),
                _ => None,
            })
            .unwrap();
        assert_eq!(pretty_type(var.typ.as_ref().unwrap()), "int");
    }

    #[test]
    fn agrees_with_the_textual_reader_on_an_equivalent_archive() {
        let bin = parse(&fixture(), "demo.a").unwrap();
        let src = "package demo\n\
                   \tfunc @\"\".Sum (xs ...int)\n\
                   \ttype @\"\".T struct { F int }\n\
                   \tvar @\"\".X int\n";
        let text = crate::project::archive::text::parse(src).unwrap();
        assert_eq!(bin.default_alias, text.default_alias);

        let sum_param = |e: &ExportData| {
            e.records
                .iter()
                .find_map(|r| match &r.decl {
                    Decl::Func(f) if f.name == "Sum" => Some(pretty_type(&f.sig.params[0].typ)),
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(sum_param(&bin), sum_param(&text));

        let t_field = |e: &ExportData| {
            e.records
                .iter()
                .find_map(|r| match &r.decl {
                    Decl::Type { specs, .. } if specs[0].name == "T" => match &*specs[0].typ {
                        Expr::StructType(fields) => {
                            Some((fields[0].names.clone(), pretty_type(&fields[0].typ)))
                        }
                        _ => None,
                    },
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(t_field(&bin), t_field(&text));

        let x_type = |e: &ExportData| {
            e.records
                .iter()
                .find_map(|r| match &r.decl {
                    Decl::Var { specs, .. } if specs[0].names[0] == "X" => {
                        specs[0].typ.as_ref().map(|t| pretty_type(t))
                    }
                    _ => None,
                })
                .unwrap()
        };
        assert_eq!(x_type(&bin), x_type(&text));
    }

    #[test]
    fn own_package_is_qualified_with_archive_name() {
        let export = parse(&fixture(), "demo.a").unwrap();
        assert_eq!(export.packages.len(), 1);
        assert_eq!(export.packages[0].key, "");
        assert_eq!(export.packages[0].alias, "!demo.a!demo");
    }

    #[test]
    fn bad_version_is_rejected() {
        let mut data = Vec::new();
        uv(&mut data, 7);
        let err = parse(&data, "x.a").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedVersion(7)));
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let data = fixture();
        let err = parse(&data[..data.len() / 2], "demo.a").unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::Truncated | ArchiveError::Malformed(_)
        ));
    }
}
