//! xpbc-lex — a lookahead-1 token stream over a byte-oriented source.
//!
//! Source text never makes it past this crate as text: [`token::Token`]s
//! are pure `(kind, span)` values, and [`lexer::Lexer`] keeps only a
//! two-slot lookahead cache, not an accumulated token vector.

pub mod cursor;
pub mod lexer;
pub mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenKind};
