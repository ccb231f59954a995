//! Compile-time error types shared across the xpbc pipeline.
//!
//! This compiler reports every fault as a single flat error contract: one
//! `ERROR: ...` line and exit code 1. `CompileError` is the typed
//! equivalent of that contract's four classes (argument/IO, lexical,
//! syntactic, container); `xpbc_drv` is the only place that turns one of
//! these into the externally visible line and exit code.

use thiserror::Error;

/// A fault raised by any phase of the compiler.
///
/// Every variant that can be tied to a location in the source carries a
/// byte offset, never a line/column — this compiler never reports
/// diagnostics any other way.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Wrong argument count or an unopenable file.
    #[error("{0}")]
    Io(String),

    /// A lexical fault: invalid escape, or a number literal combining a
    /// base prefix with a decimal point.
    #[error("{message} at file index {offset}")]
    Lex { offset: usize, message: String },

    /// A syntactic fault: unexpected token, unclosed scope, nested
    /// definition, non-power-of-two width, unknown type first byte.
    #[error("{message} at file index {offset}")]
    Parse { offset: usize, message: String },

    /// A fault discovered while reading a finalized `XPB` container: bad
    /// magic, unsupported size exponent, constant wider than the host
    /// word, unsupported `.data` emission width.
    #[error("{0}")]
    Container(String),
}

/// Result type alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, CompileError>;
