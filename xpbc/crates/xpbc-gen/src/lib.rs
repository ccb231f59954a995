//! xpbc-gen — reads a finalized `XPB` container and lowers it to NASM
//! assembly text for Linux x86-64.

pub mod generator;
pub mod reader;
pub mod register;

pub use generator::generate;
