//! Fluent construction of a [`Diagnostic`].
//!
//! Mirrors the shape of a builder, trimmed to what this compiler actually
//! reports: a level, a message, and an optional byte offset into the
//! source. There is no multi-span/snippet rendering: this compiler's
//! error contract never shows source context, only the offending offset.

use super::{Diagnostic, Level};

pub struct DiagnosticBuilder {
    level: Level,
    message: String,
    offset: Option<usize>,
}

impl DiagnosticBuilder {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            message: message.into(),
            offset: None,
        }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> Diagnostic {
        Diagnostic {
            level: self.level,
            message: self.message,
            offset: self.offset,
        }
    }
}
