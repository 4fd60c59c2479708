//! Stable, deterministic name mangling (§6).
//!
//! The public contract: two [`Path`]s map to the same mangled symbol iff
//! they are structurally equal ignoring lifetimes (`Path::mono_key`'s
//! notion of equality) — so mangling never consults [`PathParams::lifetimes`]
//! — and `demangle(mangle(p)) == p` modulo that same lifetime erasure (§8).
//!
//! The scheme is a flat length-prefixed encoding in the tradition of the
//! Itanium/Rust legacy manglers: every identifier is `<byte-len>_<escaped
//! text>`, every variable-length list is `<count>_<elements...>`, and every
//! fixed-shape node starts with a one-byte tag. Characters outside
//! `[A-Za-z0-9_]` (anything a C identifier can't hold) are escaped as
//! `$uXXXX` (four hex digits of the Unicode scalar value) before the length
//! prefix is computed, so the output is always a legal C identifier.

use std::rc::Rc;

use crate::error::{Context, Result};
use crate::path::{GenericPath, Lifetime, Path, PathData, PathParams};
use crate::symbol::{intern, Symbol};
use crate::ty::{AutoTraits, PtrKind, Primitive, RefKind, TypeRef};

const PREFIX: &str = "_ZT";

fn escape_ident(s: &str, out: &mut String) {
  let mut escaped = String::with_capacity(s.len());
  for c in s.chars() {
    if c.is_ascii_alphanumeric() || c == '_' { escaped.push(c); }
    else { escaped.push_str(&format!("$u{:04x}", c as u32)); }
  }
  out.push_str(&escaped.len().to_string());
  out.push('_');
  out.push_str(&escaped);
}

fn mangle_ident(sym: Symbol, out: &mut String) { escape_ident(sym.as_str(), out); }

fn mangle_list<T>(items: &[T], out: &mut String, mut f: impl FnMut(&T, &mut String)) {
  out.push_str(&items.len().to_string());
  out.push('_');
  for item in items { f(item, out); }
}

fn mangle_params(pp: &PathParams, out: &mut String) {
  mangle_list(&pp.types, out, |t, out| mangle_type(t, out));
}

fn mangle_generic(g: &GenericPath, out: &mut String) {
  mangle_ident(g.crate_name, out);
  mangle_list(&g.components, out, |c, out| mangle_ident(*c, out));
  mangle_params(&g.params, out);
}

fn primitive_code(p: Primitive) -> char {
  use Primitive::*;
  match p {
    Bool => 'a', Char => 'c',
    I8 => '1', I16 => '2', I32 => '4', I64 => '8', I128 => 'o', Isize => 'z',
    U8 => 'A', U16 => 'B', U32 => 'C', U64 => 'D', U128 => 'O', Usize => 'Z',
    F32 => 'f', F64 => 'd',
  }
}

fn code_primitive(c: char) -> Option<Primitive> {
  use Primitive::*;
  Some(match c {
    'a' => Bool, 'c' => Char,
    '1' => I8, '2' => I16, '4' => I32, '8' => I64, 'o' => I128, 'z' => Isize,
    'A' => U8, 'B' => U16, 'C' => U32, 'D' => U64, 'O' => U128, 'Z' => Usize,
    'f' => F32, 'd' => F64,
    _ => return None,
  })
}

fn mangle_type(ty: &TypeRef, out: &mut String) {
  match ty {
    TypeRef::Primitive(p) => { out.push('P'); out.push(primitive_code(*p)); }
    TypeRef::Path(p) => { out.push('A'); mangle_path(p, out); }
    TypeRef::Tuple(tys) => { out.push('T'); mangle_list(tys, out, |t, out| mangle_type(t, out)); }
    TypeRef::Array(t, n) => { out.push('R'); out.push_str(&n.to_string()); out.push('_'); mangle_type(t, out); }
    TypeRef::Slice(t) => { out.push('S'); mangle_type(t, out); }
    TypeRef::Borrow(k, t) => {
      out.push('B');
      out.push(match k { RefKind::Shared => 's', RefKind::Mut => 'm', RefKind::Owned => 'o' });
      mangle_type(t, out);
    }
    TypeRef::Pointer(k, t) => {
      out.push('O');
      out.push(match k { PtrKind::Const => 'c', PtrKind::Mut => 'm' });
      mangle_type(t, out);
    }
    TypeRef::FnPtr(args, ret) => {
      out.push('F');
      mangle_list(args, out, |t, out| mangle_type(t, out));
      mangle_type(ret, out);
    }
    TypeRef::NamedFunction(p) => { out.push('N'); mangle_path(p, out); }
    TypeRef::TraitObject(p, auto) => { out.push('D'); mangle_path(p, out); out.push_str(&format!("{:02x}", auto.bits())); }
    TypeRef::Erased(idx) => { out.push('X'); out.push_str(&idx.to_string()); out.push('_'); }
    TypeRef::Diverge => out.push('V'),
    TypeRef::Infer(_) | TypeRef::SelfPlaceholder =>
      // Unreachable on well-formed input: only monomorphised (or never-generic)
      // paths are ever mangled (§3's "no MIR body reachable for emission
      // contains unresolved generic parameters").
      out.push('?'),
  }
}

fn mangle_path(path: &Path, out: &mut String) {
  match &*path.0 {
    PathData::Generic(g) => { out.push('G'); mangle_generic(g, out); }
    PathData::InherentUfcs { self_ty, item, method_params, impl_params } => {
      out.push('I');
      mangle_type(self_ty, out);
      mangle_ident(*item, out);
      mangle_params(method_params, out);
      mangle_params(impl_params, out);
    }
    PathData::KnownUfcs { self_ty, trait_, item } => {
      out.push('K');
      mangle_type(self_ty, out);
      mangle_generic(trait_, out);
      mangle_ident(*item, out);
    }
  }
}

/// Mangle `path` into a symbol that is a legal C identifier and depends only
/// on `path`'s structure modulo lifetime arguments.
#[must_use] pub fn mangle(path: &Path) -> String {
  let mut out = String::from(PREFIX);
  mangle_path(path, &mut out);
  out
}

const TYPE_PREFIX: &str = "_ZTy";

/// Mangle a [`TypeRef`] into a legal C identifier, for naming the anonymous
/// struct typedef codegen emits for a tuple/array/erased type (nominal
/// `Path` types already have a name; this covers everything else that still
/// needs one). Uses the same node encoding as [`mangle`], just under a
/// distinct prefix so a type name can never collide with a function/static
/// symbol built from the same underlying structure.
#[must_use] pub fn mangle_type_name(ty: &TypeRef) -> String {
  let mut out = String::from(TYPE_PREFIX);
  mangle_type(ty, &mut out);
  out
}

// --- demangling -------------------------------------------------------

struct Reader<'a> { s: &'a [u8], pos: usize }

impl<'a> Reader<'a> {
  fn new(s: &'a str) -> Self { Self { s: s.as_bytes(), pos: 0 } }
  fn peek(&self) -> Option<u8> { self.s.get(self.pos).copied() }
  fn next_byte(&mut self, ctx: &Context) -> Result<u8> {
    let b = self.peek().ok_or_else(|| crate::bug!(ctx, "demangle: unexpected end of input"))?;
    self.pos += 1;
    Ok(b)
  }
  fn next_char(&mut self, ctx: &Context) -> Result<char> { Ok(self.next_byte(ctx)? as char) }
  fn expect(&mut self, b: u8, ctx: &Context) -> Result<()> {
    let got = self.next_byte(ctx)?;
    if got != b { return Err(crate::bug!(ctx, "demangle: expected {:?}, found {:?}", b as char, got as char)) }
    Ok(())
  }
  fn decimal(&mut self, ctx: &Context) -> Result<u64> {
    let start = self.pos;
    while self.peek().is_some_and(|b| b.is_ascii_digit()) { self.pos += 1; }
    if self.pos == start { return Err(crate::bug!(ctx, "demangle: expected decimal digits")) }
    std::str::from_utf8(&self.s[start..self.pos]).unwrap().parse()
      .map_err(|_| crate::bug!(ctx, "demangle: decimal overflow"))
  }
  fn take(&mut self, n: usize, ctx: &Context) -> Result<&'a str> {
    if self.pos + n > self.s.len() { return Err(crate::bug!(ctx, "demangle: length prefix overruns input")) }
    let slice = &self.s[self.pos..self.pos + n];
    self.pos += n;
    std::str::from_utf8(slice).map_err(|_| crate::bug!(ctx, "demangle: invalid utf8"))
  }
}

fn unescape_ident(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut chars = s.chars().peekable();
  while let Some(c) = chars.next() {
    if c == '$' && chars.peek() == Some(&'u') {
      chars.next();
      let hex: String = (0..4).filter_map(|_| chars.next()).collect();
      if let Ok(code) = u32::from_str_radix(&hex, 16) {
        if let Some(ch) = char::from_u32(code) { out.push(ch); continue }
      }
      out.push('$'); out.push('u'); out.push_str(&hex);
    } else {
      out.push(c);
    }
  }
  out
}

fn demangle_ident(r: &mut Reader<'_>, ctx: &Context) -> Result<Symbol> {
  let len = r.decimal(ctx)? as usize;
  r.expect(b'_', ctx)?;
  let raw = r.take(len, ctx)?;
  Ok(intern(&unescape_ident(raw)))
}

fn demangle_list<T>(r: &mut Reader<'_>, ctx: &Context, mut f: impl FnMut(&mut Reader<'_>, &Context) -> Result<T>) -> Result<Vec<T>> {
  let n = r.decimal(ctx)? as usize;
  r.expect(b'_', ctx)?;
  (0..n).map(|_| f(r, ctx)).collect()
}

fn demangle_params(r: &mut Reader<'_>, ctx: &Context) -> Result<PathParams> {
  let types = demangle_list(r, ctx, demangle_type)?;
  Ok(PathParams { types: Rc::from(types), lifetimes: Rc::from([] as [Lifetime; 0]) })
}

fn demangle_generic(r: &mut Reader<'_>, ctx: &Context) -> Result<GenericPath> {
  let crate_name = demangle_ident(r, ctx)?;
  let components = demangle_list(r, ctx, demangle_ident)?;
  let params = demangle_params(r, ctx)?;
  Ok(GenericPath { crate_name, components: Rc::from(components), params })
}

fn demangle_type(r: &mut Reader<'_>, ctx: &Context) -> Result<TypeRef> {
  let tag = r.next_char(ctx)?;
  Ok(match tag {
    'P' => {
      let c = r.next_char(ctx)?;
      TypeRef::Primitive(code_primitive(c).ok_or_else(|| crate::bug!(ctx, "demangle: bad primitive code {c:?}"))?)
    }
    'A' => TypeRef::Path(demangle_path(r, ctx)?),
    'T' => TypeRef::Tuple(Rc::from(demangle_list(r, ctx, demangle_type)?)),
    'R' => { let n = r.decimal(ctx)?; r.expect(b'_', ctx)?; TypeRef::Array(Rc::new(demangle_type(r, ctx)?), n) }
    'S' => TypeRef::Slice(Rc::new(demangle_type(r, ctx)?)),
    'B' => {
      let k = match r.next_char(ctx)? {
        's' => RefKind::Shared, 'm' => RefKind::Mut, 'o' => RefKind::Owned,
        c => return Err(crate::bug!(ctx, "demangle: bad borrow kind {c:?}")),
      };
      TypeRef::Borrow(k, Rc::new(demangle_type(r, ctx)?))
    }
    'O' => {
      let k = match r.next_char(ctx)? {
        'c' => PtrKind::Const, 'm' => PtrKind::Mut,
        c => return Err(crate::bug!(ctx, "demangle: bad pointer kind {c:?}")),
      };
      TypeRef::Pointer(k, Rc::new(demangle_type(r, ctx)?))
    }
    'F' => {
      let args = demangle_list(r, ctx, demangle_type)?;
      let ret = demangle_type(r, ctx)?;
      TypeRef::FnPtr(Rc::from(args), Rc::new(ret))
    }
    'N' => TypeRef::NamedFunction(demangle_path(r, ctx)?),
    'D' => {
      let p = demangle_path(r, ctx)?;
      let hex = r.take(2, ctx)?;
      let bits = u8::from_str_radix(hex, 16).map_err(|_| crate::bug!(ctx, "demangle: bad auto-trait byte"))?;
      TypeRef::TraitObject(p, AutoTraits::from_bits_truncate(bits))
    }
    'X' => { let idx = r.decimal(ctx)?; r.expect(b'_', ctx)?; TypeRef::Erased(idx as u32) }
    'V' => TypeRef::Diverge,
    c => return Err(crate::bug!(ctx, "demangle: unknown type tag {c:?}")),
  })
}

fn demangle_path(r: &mut Reader<'_>, ctx: &Context) -> Result<Path> {
  let tag = r.next_char(ctx)?;
  Ok(match tag {
    'G' => { let g = demangle_generic(r, ctx)?; Path::generic(g.crate_name, g.components, g.params) }
    'I' => {
      let self_ty = demangle_type(r, ctx)?;
      let item = demangle_ident(r, ctx)?;
      let method_params = demangle_params(r, ctx)?;
      let impl_params = demangle_params(r, ctx)?;
      Path::inherent_ufcs(self_ty, item, method_params, impl_params)
    }
    'K' => {
      let self_ty = demangle_type(r, ctx)?;
      let trait_ = demangle_generic(r, ctx)?;
      let item = demangle_ident(r, ctx)?;
      Path::known_ufcs(self_ty, trait_, item)
    }
    c => return Err(crate::bug!(ctx, "demangle: unknown path tag {c:?}")),
  })
}

/// Parse a string produced by [`mangle`] back into a [`Path`]. Lifetime
/// arguments never round-trip (mangling erases them), matching §8's
/// `demangle(mangle(p)) == p` property "modulo lifetime erasure".
pub fn demangle(sym: &str) -> Result<Path> {
  let ctx = Context::none();
  let rest = sym.strip_prefix(PREFIX).ok_or_else(|| crate::bug!(ctx, "demangle: missing {PREFIX} prefix"))?;
  let mut r = Reader::new(rest);
  let path = demangle_path(&mut r, &ctx)?;
  if r.pos != r.s.len() { return Err(crate::bug!(ctx, "demangle: trailing input after path")) }
  Ok(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::path::PathParams;

  fn sym(s: &str) -> Symbol { intern(s) }

  #[test]
  fn round_trips_generic_path() {
    let p = Path::generic(sym("krate"), [sym("a"), sym("b")], PathParams::from_types(Rc::from([
      TypeRef::Primitive(Primitive::I32),
      TypeRef::Tuple(Rc::from([TypeRef::Primitive(Primitive::Bool)])),
    ])));
    let m = mangle(&p);
    assert!(m.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'), "mangled name {m:?} must be a legal C identifier");
    let back = demangle(&m).unwrap();
    assert_eq!(p.mono_key(), back.mono_key());
  }

  #[test]
  fn round_trips_inherent_ufcs_with_escaped_ident() {
    let p = Path::drop_glue(TypeRef::Path(Path::generic(sym("krate"), [sym("Widget")], PathParams::empty())));
    let m = mangle(&p);
    let back = demangle(&m).unwrap();
    assert_eq!(p.mono_key(), back.mono_key());
  }

  #[test]
  fn round_trips_known_ufcs_and_ignores_lifetimes() {
    let trait_ = GenericPath { crate_name: sym("core"), components: Rc::from([sym("clone"), sym("Clone")]), params: PathParams::empty() };
    let a = Path::known_ufcs(TypeRef::Primitive(Primitive::I32), trait_.clone(), sym("clone"));
    let b = Path::inherent_ufcs(TypeRef::Primitive(Primitive::I32), sym("clone"),
      PathParams { types: Rc::from([]), lifetimes: Rc::from([crate::path::Lifetime(sym("'a"))]) }, PathParams::empty());
    assert_ne!(mangle(&a), mangle(&b), "different path shapes mangle differently");
    let back = demangle(&mangle(&a)).unwrap();
    assert_eq!(back.mono_key(), a.mono_key());
  }

  #[test]
  fn distinct_paths_mangle_distinctly() {
    let a = Path::generic(sym("k"), [sym("f")], PathParams::from_types(Rc::from([TypeRef::Primitive(Primitive::I32)])));
    let b = Path::generic(sym("k"), [sym("f")], PathParams::from_types(Rc::from([TypeRef::Primitive(Primitive::U32)])));
    assert_ne!(mangle(&a), mangle(&b));
  }
}
