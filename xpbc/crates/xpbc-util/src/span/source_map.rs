//! A single owned source buffer, sliced by [`Span`].

use super::Span;

/// Owns the raw bytes of one compilation's source file.
///
/// The lexer and parser never hold the source text themselves; they hold
/// spans and seek back into a `SourceMap` only when they actually need the
/// bytes (string literal contents, a type identifier's first byte, an
/// unexpected-token error message). The lexer itself never materializes
/// token text.
pub struct SourceMap {
    bytes: Vec<u8>,
}

impl SourceMap {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Slices the source by a span. Panics on an out-of-bounds span — spans
    /// produced by this crate's own lexer are always in-bounds by
    /// construction, so this is an invariant violation, not a user-facing
    /// error path.
    pub fn slice(&self, span: Span) -> &[u8] {
        &self.bytes[span.offset..span.end()]
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_returns_exact_span() {
        let map = SourceMap::new(b"main():{ }".to_vec());
        assert_eq!(map.slice(Span::new(0, 4)), b"main");
    }
}
