//! Syntax layer for `.sm` rule files.
//!
//! Scanning and parsing are two separate passes: [`lexer::Scanner`] turns the
//! raw text into [`token::Token`]s, and [`parser`] consumes that stream with a
//! single token of lookahead to build the [`crate::ast`] tree.

use serde::{Deserialize, Serialize};

pub mod lexer;
pub mod parser;
pub mod token;

pub use lexer::{tokenize, Scanner};
pub use parser::parse_checker;
pub use token::{CmpOp, Keyword, Token, TokenKind};

/// Represents a byte span in the source text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
