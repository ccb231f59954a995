//! A forward-seeking byte cursor over a finalized `XPB` container.
//!
//! Every read is bounds-checked and turned into a [`CompileError::Container`]
//! on failure — a truncated or corrupt container is the generator's only
//! route to a fatal error once the magic number has already checked out.

use xpbc_util::CompileError;

#[derive(Clone, Copy)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.position)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CompileError> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(truncated_container)?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CompileError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, CompileError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, CompileError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

fn truncated_container() -> CompileError {
    CompileError::Container("container is truncated".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_the_cursor() {
        let mut reader = ByteReader::new(&[1, 0, 0, 0, 2, 0]);
        assert_eq!(reader.read_u32().unwrap(), 1);
        assert_eq!(reader.read_u8().unwrap(), 2);
        assert_eq!(reader.position(), 5);
    }

    #[test]
    fn read_past_the_end_is_a_container_error() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert!(matches!(reader.read_u32(), Err(CompileError::Container(_))));
    }

    #[test]
    fn seek_repositions_the_cursor() {
        let mut reader = ByteReader::new(&[1, 2, 3, 4]);
        reader.seek(2);
        assert_eq!(reader.read_u8().unwrap(), 3);
    }
}
