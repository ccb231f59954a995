//! Trivial callee-saved register free-list.
//!
//! Grounded in `allocateRegister`'s fixed list of five general-purpose
//! registers. There is no spilling: a register is reclaimed only when the
//! generator can prove (by last-use position, see `generator.rs`) that its
//! bound value is never read again, so a function that keeps more than
//! five values live *at the same program point* still exhausts the list
//! and the generator reports a `Container` fault rather than silently
//! miscompiling. Supplanting this with a real allocator (graph coloring,
//! linear scan with spill slots) is future work, not something this
//! minimal backend attempts.

use xpbc_util::CompileError;

const FREE_LIST: [&str; 5] = ["r12", "r13", "r14", "r15", "rcx"];

pub struct RegisterFile {
    free: Vec<&'static str>,
    bound: std::collections::HashMap<u32, &'static str>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            free: FREE_LIST.iter().rev().copied().collect(),
            bound: std::collections::HashMap::new(),
        }
    }

    /// Pops a register off the free list without binding it to any SSA id —
    /// used for the scratch register `idiv` needs for its divisor.
    pub fn take_scratch(&mut self) -> Result<&'static str, CompileError> {
        self.free.pop().ok_or_else(exhausted)
    }

    pub fn release_scratch(&mut self, register: &'static str) {
        self.free.push(register);
    }

    /// Allocates a register and binds it to `id` for the rest of the
    /// function.
    pub fn allocate(&mut self, id: u32) -> Result<&'static str, CompileError> {
        let register = self.free.pop().ok_or_else(exhausted)?;
        self.bound.insert(id, register);
        Ok(register)
    }

    pub fn get(&self, id: u32) -> Result<&'static str, CompileError> {
        self.bound.get(&id).copied().ok_or_else(|| {
            CompileError::Container(format!("reference to variable {id} before it was declared"))
        })
    }

    /// Returns `id`'s register to the free list. A no-op if `id` is not
    /// currently bound (already released, or never allocated). Callers
    /// only do this once a last-use scan has proven the value is dead.
    pub fn release(&mut self, id: u32) {
        if let Some(register) = self.bound.remove(&id) {
            self.free.push(register);
        }
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

fn exhausted() -> CompileError {
    CompileError::Container("exhausted the fixed five-register free-list".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_fetch_round_trips() {
        let mut file = RegisterFile::new();
        let reg = file.allocate(7).unwrap();
        assert_eq!(file.get(7).unwrap(), reg);
    }

    #[test]
    fn sixth_allocation_is_exhausted() {
        let mut file = RegisterFile::new();
        for i in 0..5 {
            file.allocate(i).unwrap();
        }
        assert!(matches!(file.allocate(5), Err(CompileError::Container(_))));
    }

    #[test]
    fn unbound_lookup_is_a_container_error() {
        let file = RegisterFile::new();
        assert!(matches!(file.get(1), Err(CompileError::Container(_))));
    }

    #[test]
    fn released_register_is_available_for_reallocation() {
        let mut file = RegisterFile::new();
        let first = file.allocate(1).unwrap();
        file.release(1);
        let second = file.allocate(2).unwrap();
        assert_eq!(first, second);
        assert!(file.get(1).is_err());
    }

    #[test]
    fn releasing_an_unbound_id_is_a_no_op() {
        let mut file = RegisterFile::new();
        file.release(42);
        for i in 0..5 {
            file.allocate(i).unwrap();
        }
        assert!(matches!(file.allocate(5), Err(CompileError::Container(_))));
    }

    #[test]
    fn six_values_fit_when_two_are_released_before_the_sixth_is_needed() {
        let mut file = RegisterFile::new();
        for i in 0..5 {
            file.allocate(i).unwrap();
        }
        file.release(0);
        file.release(1);
        assert!(file.allocate(5).is_ok());
        assert!(file.allocate(6).is_ok());
    }
}
