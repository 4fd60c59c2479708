//! Target description.
//!
//! The core never hardcodes a target; every size, alignment, atomic
//! capability, and dialect choice is read off a [`TargetSpec`] supplied by
//! the driver (queried via [`Target_GetCurSpec`]-style access in the
//! original implementation; here threaded explicitly instead of living in
//! a process global, per the design notes in the crate root).

use std::fmt;

/// The C dialect the codegen backend should target.
///
/// This is the single switch that the whole of [`crate::codegen`] consults
/// to decide between GCC/Clang-compatible output and MSVC-compatible
/// output: empty-struct handling, 128-bit integer emulation, atomics, and
/// inline assembly all branch on this.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CodegenMode {
  /// GCC/Clang and other C11-conformant compilers on a Unix-like ABI.
  Gcc,
  /// Microsoft's C compiler. Forbids empty structs, lacks a native
  /// `__int128`, and uses `Interlocked*` instead of `<stdatomic.h>`.
  Msvc,
}

impl CodegenMode {
  /// Whether this dialect needs `u128`/`i128` emulated via a `{lo, hi}`
  /// struct and a hand-written arithmetic library, rather than using a
  /// native 128-bit integer type.
  #[must_use] pub fn needs_i128_emulation(self) -> bool { matches!(self, CodegenMode::Msvc) }
  /// Whether zero-sized struct fields must be replaced with a `char _d`
  /// placeholder (MSVC rejects empty structs/unions outright).
  #[must_use] pub fn forbids_empty_structs(self) -> bool { matches!(self, CodegenMode::Msvc) }
}

/// Per-architecture facts the codegen needs: pointer width, endianness, and
/// which atomic widths the target actually supports natively.
#[derive(Clone, Debug)]
pub struct TargetArch {
  /// The architecture name as it would appear in a target triple, e.g. `"x86_64"`.
  pub name: String,
  /// Pointer width in bits (typically 32 or 64).
  pub pointer_bits: u32,
  /// `true` for big-endian targets.
  pub big_endian: bool,
  /// Which scalar widths support lock-free atomic operations.
  pub atomics: AtomicSupport,
}

/// Which scalar widths the target can perform atomic operations on without
/// a fallback lock.
#[derive(Clone, Copy, Debug, Default)]
pub struct AtomicSupport {
  /// 8-bit atomics available.
  pub u8: bool,
  /// 16-bit atomics available.
  pub u16: bool,
  /// 32-bit atomics available.
  pub u32: bool,
  /// 64-bit atomics available.
  pub u64: bool,
  /// Pointer-width atomics available (implied by `u32`/`u64` as appropriate
  /// but tracked separately since some targets have atomic pointers without
  /// atomic 64-bit integers on a 32-bit pointer target).
  pub ptr: bool,
}

/// The full target description threaded through enumeration, monomorphisation
/// and codegen.
#[derive(Clone, Debug)]
pub struct TargetSpec {
  /// Target family, e.g. `"unix"` or `"windows"`.
  pub family: String,
  /// Operating system name, e.g. `"linux"`, `"macos"`, `"windows"`.
  pub os_name: String,
  /// ABI/environment qualifier, e.g. `"gnu"`, `"musl"`, `"msvc"`.
  pub env_name: String,
  /// Which C dialect to emit.
  pub codegen_mode: CodegenMode,
  /// Architecture-specific facts.
  pub arch: TargetArch,
}

impl TargetSpec {
  /// A reasonable default used by tests and by callers that only care about
  /// the `x86_64-unknown-linux-gnu`-shaped common case.
  #[must_use] pub fn linux_x86_64() -> Self {
    Self {
      family: "unix".into(),
      os_name: "linux".into(),
      env_name: "gnu".into(),
      codegen_mode: CodegenMode::Gcc,
      arch: TargetArch {
        name: "x86_64".into(),
        pointer_bits: 64,
        big_endian: false,
        atomics: AtomicSupport { u8: true, u16: true, u32: true, u64: true, ptr: true },
      },
    }
  }

  /// A Windows/MSVC target, for exercising the MSVC-dialect codegen paths.
  #[must_use] pub fn windows_x86_64() -> Self {
    Self {
      family: "windows".into(),
      os_name: "windows".into(),
      env_name: "msvc".into(),
      codegen_mode: CodegenMode::Msvc,
      arch: TargetArch {
        name: "x86_64".into(),
        pointer_bits: 64,
        big_endian: false,
        atomics: AtomicSupport { u8: true, u16: true, u32: true, u64: true, ptr: true },
      },
    }
  }

  /// Size of a pointer on this target, in bytes.
  #[must_use] pub fn pointer_size(&self) -> u64 { u64::from(self.arch.pointer_bits) / 8 }
}

impl fmt::Display for TargetSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}-{}-{}", self.arch.name, self.family, self.os_name, self.env_name)
  }
}
