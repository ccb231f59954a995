//! Growable byte buffer.
//!
//! Every container section is built by repeated appends rather than the
//! allocate-then-concat-then-free dance a naive C port would use:
//! `ByteBuffer` is a thin `Vec<u8>` wrapper, since only the final on-disk
//! bytes are observable, never the intermediate allocation pattern.

/// A growable, owned byte sequence.
#[derive(Clone, Debug, Default)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    /// Allocates a zero-filled buffer of `len` bytes.
    pub fn allocate(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    /// Appends `other`'s bytes to the end of `self`. Neither buffer is
    /// consumed by reference in the original design, but here `self` is the
    /// accumulator and `other` is only borrowed.
    pub fn append(&mut self, other: &[u8]) {
        self.bytes.extend_from_slice(other);
    }

    /// Resizes in place, preserving `min(old_len, new_len)` bytes and
    /// zero-filling any growth.
    pub fn resize(&mut self, new_len: usize) {
        self.bytes.resize(new_len, 0);
    }

    /// Overwrites `self.bytes[offset..offset + data.len()]` in place. Used
    /// by the emitter's back-patch operations (function/block header
    /// counts written after the fact).
    pub fn patch(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Returns a new buffer holding `a`'s bytes followed by `b`'s. Neither
    /// input is modified.
    pub fn concat(a: &[u8], b: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(a.len() + b.len());
        bytes.extend_from_slice(a);
        bytes.extend_from_slice(b);
        Self { bytes }
    }
}
