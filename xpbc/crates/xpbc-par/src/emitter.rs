//! IR Emitter.
//!
//! Accumulates the function table, static section, and program logic as
//! three independent [`ByteBuffer`]s and finalizes them into a single
//! `XPB` container. Forward references are supported because the function
//! table is append-only and searched by linear scan: a mapping keyed by
//! the identifier bytes would serve the same purpose, but the on-disk
//! layout doesn't change either way, and the scan is never the bottleneck
//! for the handful of functions a program in this language can express.

use xpbc_util::xpb::{self, Primitive};
use xpbc_util::{ByteBuffer, CompileError};

/// Per-compilation state for the three `XPB` sections. Built fresh for
/// every compilation rather than held in mutable module statics: each
/// subsystem's state lives in an owned record, so there is no reset dance
/// between compilations.
pub struct Emitter {
    function_table: ByteBuffer,
    static_section: ByteBuffer,
    program_logic: ByteBuffer,
    function_count: u32,
    next_static_id: u32,
    current_function_index: usize,
    current_block_index: usize,
}

impl Emitter {
    /// Seeds the built-in `print` function at `2^32 − 256`, exactly as
    /// `resetBytecodeGen` does.
    pub fn new() -> Self {
        let mut emitter = Self {
            function_table: ByteBuffer::allocate(4),
            static_section: ByteBuffer::allocate(4),
            program_logic: ByteBuffer::new(),
            function_count: 0,
            next_static_id: u32::MAX,
            current_function_index: 0,
            current_block_index: 0,
        };
        emitter.append_to_function_table(xpb::PRINT_IDENTIFIER.as_bytes(), xpb::PRINT_FUNCTION_ID);
        emitter
    }

    /// Appends `{id:4, length:8, bytes}` to the function table.
    pub fn append_to_function_table(&mut self, identifier: &[u8], id: u32) {
        self.function_table.append(&id.to_le_bytes());
        self.function_table.append(&(identifier.len() as u64).to_le_bytes());
        self.function_table.append(identifier);
        self.function_count += 1;
    }

    /// Linear scan for `identifier`, matching by length then byte equality.
    pub fn find_in_function_table(&self, identifier: &[u8]) -> Option<u32> {
        let table = self.function_table.as_slice();
        let mut cursor = 4usize; // skip the 4-byte count prefix
        while cursor + 12 <= table.len() {
            let id = u32::from_le_bytes(table[cursor..cursor + 4].try_into().unwrap());
            let len = u64::from_le_bytes(table[cursor + 4..cursor + 12].try_into().unwrap()) as usize;
            let name_start = cursor + 12;
            let name = &table[name_start..name_start + len];
            if name == identifier {
                return Some(id);
            }
            cursor = name_start + len;
        }
        None
    }

    /// Allocates the next static ID (top-down from `2^32 − 1`), appends a
    /// static entry, and returns the assigned ID — semantically a pointer
    /// to the data, not the data's own ID.
    pub fn create_static_data(
        &mut self,
        primitive: Primitive,
        size_exp: u8,
        count: u64,
        data: &[u8],
    ) -> Result<u32, CompileError> {
        if size_exp < xpb::MIN_SIZE_EXPONENT {
            return Err(unsupported_size_exponent());
        }
        let id = self.next_static_id;
        self.next_static_id -= 1;

        self.static_section.append(&id.to_le_bytes());
        self.static_section.append(&[primitive.to_byte()]);
        self.static_section.append(&[size_exp]);
        self.static_section.append(&count.to_le_bytes());
        self.static_section.append(data);
        Ok(id)
    }

    /// Writes a 2-byte `(primitive, size_exp)` tag into the static section
    /// or program logic.
    pub fn insert_type_identifier(
        &mut self,
        primitive: Primitive,
        size_exp: u8,
        into_static: bool,
    ) -> Result<(), CompileError> {
        if size_exp < xpb::MIN_SIZE_EXPONENT {
            return Err(unsupported_size_exponent());
        }
        let target = if into_static {
            &mut self.static_section
        } else {
            &mut self.program_logic
        };
        target.append(&[primitive.to_byte(), size_exp]);
        Ok(())
    }

    /// Writes a raw 4-byte little-endian value into program logic — used
    /// for opcodes (function IDs and reserved small opcodes, both as
    /// 32-bit two's complement) and plain operand IDs.
    pub fn insert_u32(&mut self, value: u32) {
        self.program_logic.append(&value.to_le_bytes());
    }

    pub fn insert_opcode(&mut self, opcode: i32) {
        self.program_logic.append(&opcode.to_le_bytes());
    }

    /// Writes an inline constant operand: the 4-byte zero sentinel, type,
    /// size exponent, and value. When `size_exp` is the "platform pointer
    /// width" sentinel, the *actual* resolved exponent (always 6 — a
    /// 64-bit host word — on this compiler's only supported target) is
    /// also written before the value, so the reader can recover the true
    /// width without knowing what compiled the container.
    pub fn insert_constant(
        &mut self,
        primitive: Primitive,
        size_exp: u8,
        value: u64,
    ) -> Result<(), CompileError> {
        self.program_logic.append(&xpb::CONSTANT_OPERAND_ID.to_le_bytes());
        self.program_logic.append(&[primitive.to_byte(), size_exp]);

        let resolved_exp = if size_exp == xpb::POINTER_WIDTH_SENTINEL {
            let resolved = 6u8; // log2(64 bits) on this compiler's x86-64 target
            self.program_logic.append(&[resolved]);
            resolved
        } else {
            if size_exp < xpb::MIN_SIZE_EXPONENT {
                return Err(unsupported_size_exponent());
            }
            size_exp
        };

        let width = xpb::byte_width(resolved_exp);
        self.program_logic.append(&value.to_le_bytes()[..width]);
        Ok(())
    }

    /// Records the current program-logic offset and writes the 16-byte
    /// function header (id at offset 0, block/in/out counts back-patched
    /// later).
    pub fn initialise_function_definition(&mut self, id: u32) {
        self.current_function_index = self.program_logic.len();
        self.program_logic.append(&[0u8; 16]);
        self.program_logic.patch(self.current_function_index, &id.to_le_bytes());
    }

    /// Back-patches the function header's block/in/out counts. The wire
    /// layout is `{id:4, blocks:4, ins:4, outs:4}`.
    pub fn finalise_function_definition(&mut self, block_count: u32, in_count: u32, out_count: u32) {
        let base = self.current_function_index;
        self.program_logic.patch(base + 4, &block_count.to_le_bytes());
        self.program_logic.patch(base + 8, &in_count.to_le_bytes());
        self.program_logic.patch(base + 12, &out_count.to_le_bytes());
    }

    /// Records the current offset and writes the 12-byte block header
    /// (`{instructions:8, args:4}`, instruction count back-patched later).
    pub fn initialise_block_definition(&mut self, argument_count: u32) {
        self.current_block_index = self.program_logic.len();
        self.program_logic.append(&[0u8; 12]);
        self.program_logic
            .patch(self.current_block_index + 8, &argument_count.to_le_bytes());
    }

    pub fn finalise_block_definition(&mut self, instruction_count: u64) {
        self.program_logic
            .patch(self.current_block_index, &instruction_count.to_le_bytes());
    }

    /// Writes the function/static counts, computes absolute section
    /// offsets, and concatenates header || function table || static
    /// section || program logic into the final container bytes.
    pub fn finalise_bytecode(mut self) -> Vec<u8> {
        self.function_table.patch(0, &self.function_count.to_le_bytes());
        let static_count = u32::MAX - self.next_static_id;
        self.static_section.patch(0, &static_count.to_le_bytes());

        let function_table_offset = xpb::HEADER_LEN as u64;
        let static_section_offset = function_table_offset + self.function_table.len() as u64;
        let program_logic_offset = static_section_offset + self.static_section.len() as u64;

        let mut header = ByteBuffer::allocate(xpb::HEADER_LEN);
        header.patch(0, &xpb::MAGIC);
        header.patch(4, &xpb::VERSION_MAJOR.to_le_bytes());
        header.patch(8, &xpb::VERSION_MINOR.to_le_bytes());
        header.patch(12, &xpb::VERSION_PATCH.to_le_bytes());
        header.patch(16, &function_table_offset.to_le_bytes());
        header.patch(24, &static_section_offset.to_le_bytes());
        header.patch(32, &program_logic_offset.to_le_bytes());

        let mut container = header.into_vec();
        container.extend_from_slice(self.function_table.as_slice());
        container.extend_from_slice(self.static_section.as_slice());
        container.extend_from_slice(self.program_logic.as_slice());
        container
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

fn unsupported_size_exponent() -> CompileError {
    CompileError::Container("size exponents less than 3 are not supported".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_seeds_print_builtin() {
        let emitter = Emitter::new();
        assert_eq!(
            emitter.find_in_function_table(b"print"),
            Some(xpb::PRINT_FUNCTION_ID)
        );
        assert_eq!(emitter.find_in_function_table(b"main"), None);
    }

    #[test]
    fn function_table_round_trips_after_append() {
        let mut emitter = Emitter::new();
        emitter.append_to_function_table(b"main", 0);
        assert_eq!(emitter.find_in_function_table(b"main"), Some(0));
        assert_eq!(emitter.function_count, 2);
    }

    #[test]
    fn static_ids_allocate_top_down() {
        let mut emitter = Emitter::new();
        let first = emitter
            .create_static_data(Primitive::UnsignedInteger, 3, 1, &[1])
            .unwrap();
        let second = emitter
            .create_static_data(Primitive::UnsignedInteger, 3, 1, &[2])
            .unwrap();
        assert_eq!(first, u32::MAX);
        assert_eq!(second, u32::MAX - 1);
    }

    #[test]
    fn finalise_writes_consistent_header_offsets() {
        let mut emitter = Emitter::new();
        emitter.append_to_function_table(b"main", 0);
        emitter.initialise_function_definition(0);
        emitter.initialise_block_definition(0);
        emitter.finalise_block_definition(0);
        emitter.finalise_function_definition(1, 0, 0);

        let bytes = emitter.finalise_bytecode();
        assert_eq!(&bytes[0..4], &xpb::MAGIC);
        let function_table_offset = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let static_offset = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
        let program_logic_offset = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
        assert_eq!(function_table_offset, xpb::HEADER_LEN as u64);
        assert!(static_offset > function_table_offset);
        assert!(program_logic_offset >= static_offset);

        let function_count = u32::from_le_bytes(
            bytes[function_table_offset as usize..function_table_offset as usize + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(function_count, 2); // print + main
    }

    #[test]
    fn size_exponent_below_three_is_a_container_error() {
        let mut emitter = Emitter::new();
        let err = emitter
            .create_static_data(Primitive::UnsignedInteger, 2, 1, &[0])
            .unwrap_err();
        assert!(matches!(err, CompileError::Container(_)));
    }
}
