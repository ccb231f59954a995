//! xpbc-par — lowers a token stream straight into an `XPB` bytecode
//! container. There is no separate AST: the recursive-descent [`parser`]
//! drives the [`emitter`] as it recognizes each construct, matching the
//! single-pass shape of the reference compiler this language's container
//! format was modeled on.

pub mod emitter;
pub mod operation;
pub mod parser;

pub use emitter::Emitter;
pub use operation::Operation;
pub use parser::compile;
