//! xpbc-util — foundation types shared by every phase of the xpbc pipeline.
//!
//! Four pieces: a growable [`buffer::ByteBuffer`], byte-offset [`span::Span`]s
//! over an owned [`span::SourceMap`], the typed [`error::CompileError`] /
//! [`diagnostic`] rendering layer, and the [`xpb`] wire-format constants the
//! emitter writes and the reader reads back.

pub mod buffer;
pub mod diagnostic;
pub mod error;
pub mod span;
pub mod xpb;

pub use buffer::ByteBuffer;
pub use error::{CompileError, Result};
pub use span::{SourceMap, Span};
