/*!
# Rust Language Module

Lexical analysis and compilation of the C-like source language into
assembly text for the machine module.

*/

#[macro_use]
mod error;
mod compile;
mod fold;
mod lex;
mod prescan;
mod scope;
mod token;

#[cfg(test)]
mod tests;

/// Zero-based character range within a source line.
pub type Column = std::ops::Range<usize>;

pub use compile::compile;
pub use error::Error;
pub use error::ErrorCode;
pub use lex::{lex, Spanned};
pub use token::{Operator, Token, Word};
