//! Diagnostic rendering.
//!
//! `Handler` is the single place `xpbc-drv` asks to turn a fault into the
//! `ERROR: ...` line printed to stderr, and to decide the process exit
//! code. There is no recovery: the handler renders the first fatal
//! diagnostic it is given and the caller exits immediately after.
//!
//! ```
//! use xpbc_util::diagnostic::{DiagnosticBuilder, Handler};
//!
//! let mut handler = Handler::new();
//! handler.emit(DiagnosticBuilder::error("unexpected token").at(12).build());
//! assert!(handler.has_errors());
//! ```

mod builder;
mod level;

pub use builder::DiagnosticBuilder;
pub use level::Level;

/// One reportable fault.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub offset: Option<usize>,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{}: {} at file index {}", self.level, self.message, offset),
            None => write!(f, "{}: {}", self.level, self.message),
        }
    }
}

/// Collects diagnostics for a single compilation.
///
/// Only ever holds at most one entry in practice, since every error in this
/// compiler is fatal and the caller aborts on first emission — kept as a
/// `Vec` rather than a single `Option` so it reads the same as a handler
/// that one day tolerates recoverable warnings.
#[derive(Default)]
pub struct Handler {
    diagnostics: Vec<Diagnostic>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == Level::Error)
    }

    pub fn first(&self) -> Option<&Diagnostic> {
        self.diagnostics.first()
    }
}
