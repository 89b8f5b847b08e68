//! Token types produced by the scanner.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::syntax::Span;

/// Reserved words. Identifiers spelled like one of these never reach the
/// parser as [`TokenKind::Ident`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Keyword {
    Decl,
    Sm,
    Stateful,
    True,
    False,
    AnyPointer,
    AnyExpr,
    Pat,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Self> {
        let keyword = match text {
            "decl" => Keyword::Decl,
            "sm" => Keyword::Sm,
            "stateful" => Keyword::Stateful,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "any_pointer" => Keyword::AnyPointer,
            "any_expr" => Keyword::AnyExpr,
            "pat" => Keyword::Pat,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Decl => "decl",
            Keyword::Sm => "sm",
            Keyword::Stateful => "stateful",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::AnyPointer => "any_pointer",
            Keyword::AnyExpr => "any_expr",
            Keyword::Pat => "pat",
        }
    }
}

/// Comparison operators accepted inside a `{ lhs OP rhs }` pattern.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
}

impl CmpOp {
    pub fn from_lexeme(text: &str) -> Option<Self> {
        let op = match text {
            "<=" => CmpOp::Le,
            "<" => CmpOp::Lt,
            "==" => CmpOp::Eq,
            "!=" => CmpOp::Ne,
            ">=" => CmpOp::Ge,
            ">" => CmpOp::Gt,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Le => "<=",
            CmpOp::Lt => "<",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Ge => ">=",
            CmpOp::Gt => ">",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Number(u64),
    /// Quoted string with the quotes removed.
    Str(String),
    /// `$name$` with the dollars removed.
    DollarPattern(String),
    /// Body of a `{{ ... }}` block with the braces removed.
    Code(String),
    Comparison(CmpOp),
    Action,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LSquare,
    RSquare,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Assign,
    Star,
    Pipe,
}

impl TokenKind {
    /// Short name used when describing what the parser expected.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Ident(_) => "identifier",
            TokenKind::Keyword(_) => "keyword",
            TokenKind::Number(_) => "number",
            TokenKind::Str(_) => "string",
            TokenKind::DollarPattern(_) => "special pattern",
            TokenKind::Code(_) => "code block",
            TokenKind::Comparison(_) => "comparison",
            TokenKind::Action => "'=>'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LSquare => "'['",
            TokenKind::RSquare => "']'",
            TokenKind::Comma => "','",
            TokenKind::Dot => "'.'",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Assign => "'='",
            TokenKind::Star => "'*'",
            TokenKind::Pipe => "'|'",
        }
    }
}

/// A scanned token. `line` is the number of newlines that precede the token
/// in the input, i.e. its 0-based line index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: usize,
}

impl Token {
    /// The raw source text of this token, delimiters included.
    pub fn lexeme<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.span.start..self.span.end).unwrap_or("")
    }

    pub fn is(&self, kind: &TokenKind) -> bool {
        &self.kind == kind
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Keyword(keyword)
    }
}
