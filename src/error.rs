//! Error handling for the core (see the design notes in the crate root).
//!
//! Three kinds of failure, all fatal, all represented by one [`Error`] type:
//!
//! * [`Error::Bug`] — an internal invariant was violated. The frontend is
//!   trusted to hand us a well-typed program, so anything that looks
//!   ill-typed down here is *our* bug, not the user's.
//! * [`Error::Todo`] — a construct we know exists but haven't implemented.
//! * [`Error::User`] — a problem that is genuinely the user's fault
//!   (unresolved `link_name`, missing lang item) and is reported as a
//!   one-line diagnostic.
//!
//! None of these are locally recoverable: every fallible function in this
//! crate returns `Result<T, Error>` and the only sane thing to do with an
//! `Err` is propagate it to the driver, which prints it and exits non-zero.

use std::fmt;
use crate::path::Path;
use crate::span::FileSpan;

/// Where in the pipeline an error was detected, for the formatted context
/// chain that accompanies every [`Error::Bug`] and [`Error::Todo`].
#[derive(Clone, Debug, Default)]
pub struct Context {
  /// The function instance currently being processed, if any.
  pub function: Option<Path>,
  /// The basic block currently being scanned or lowered.
  pub block: Option<u32>,
  /// The statement index within the block, or `None` for the terminator.
  pub stmt: Option<u32>,
}

impl Context {
  /// An empty context, for errors raised outside of any function body.
  #[must_use] pub fn none() -> Self { Self::default() }
}

impl fmt::Display for Context {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.function {
      Some(p) => write!(f, "in {p}")?,
      None => write!(f, "at top level")?,
    }
    if let Some(bb) = self.block {
      write!(f, ", bb{bb}")?;
      match self.stmt {
        Some(s) => write!(f, "[{s}]")?,
        None => write!(f, "[term]")?,
      }
    }
    Ok(())
  }
}

/// A single fatal error, tagged by which of the three kinds it is.
#[derive(thiserror::Error, Debug)]
pub enum Error {
  /// An internal invariant was violated: this is always a compiler bug.
  #[error("BUG at {site}: {msg} ({ctx})")]
  Bug {
    /// `file:line:column` of the `bug!` call site.
    site: &'static str,
    /// Human-readable description of the violated invariant.
    msg: String,
    /// The enclosing function/block/statement, for locating the input
    /// that triggered this.
    ctx: Context,
  },
  /// A construct that is valid input but not yet handled by this backend.
  #[error("unimplemented at {site}: {msg} ({ctx})")]
  Todo {
    /// `file:line:column` of the `todo_!` call site.
    site: &'static str,
    /// Description of the unhandled case.
    msg: String,
    /// The enclosing function/block/statement.
    ctx: Context,
  },
  /// A problem caused by the user's program or command line, reported as a
  /// plain diagnostic with no internal context chain.
  #[error("error: {0}")]
  User(String),
}

impl Error {
  /// Construct a [`Error::Bug`]. Prefer the [`bug!`] macro, which fills in
  /// `site` automatically.
  #[must_use] pub fn bug(site: &'static str, msg: impl Into<String>, ctx: Context) -> Self {
    Error::Bug { site, msg: msg.into(), ctx }
  }
  /// Construct a [`Error::Todo`]. Prefer the [`todo_!`] macro.
  #[must_use] pub fn todo(site: &'static str, msg: impl Into<String>, ctx: Context) -> Self {
    Error::Todo { site, msg: msg.into(), ctx }
  }
  /// Construct a [`Error::User`] diagnostic referring to a source span.
  #[must_use] pub fn user_at(span: &FileSpan, msg: impl fmt::Display) -> Self {
    Error::User(format!("{span}: {msg}"))
  }
  /// Construct a [`Error::User`] diagnostic with no source location
  /// (e.g. a missing lang item, which has no single blame site).
  #[must_use] pub fn user(msg: impl fmt::Display) -> Self { Error::User(msg.to_string()) }

  /// `true` for the two kinds that indicate a compiler defect rather than
  /// a problem with the input program.
  #[must_use] pub fn is_internal(&self) -> bool { !matches!(self, Error::User(_)) }
}

/// Raise a [`Error::Bug`], capturing the call site automatically.
///
/// ```ignore
/// if locals.is_empty() { return Err(bug!(ctx, "function with no locals")) }
/// ```
#[macro_export]
macro_rules! bug {
  ($ctx:expr, $($arg:tt)*) => {
    $crate::error::Error::bug(concat!(file!(), ":", line!(), ":", column!()), format!($($arg)*), $ctx.clone())
  };
}

/// Raise a [`Error::Todo`], capturing the call site automatically.
#[macro_export]
macro_rules! todo_ {
  ($ctx:expr, $($arg:tt)*) => {
    $crate::error::Error::todo(concat!(file!(), ":", line!(), ":", column!()), format!($($arg)*), $ctx.clone())
  };
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
