//! Scanner for `.sm` rule files.
//!
//! Converts source text into a forward-only stream of [`Token`]s. The token
//! shapes live in `tokens.pest`; this module drives that grammar one token at
//! a time, drops whitespace and comments, and keeps the running line counter.
//!
//! Every consumed lexeme advances the counter by the newlines it contains,
//! so multi-line comments, strings and code blocks never desynchronise the
//! line reported for later tokens.

use pest::Parser;
use pest_derive::Parser;
use tracing::trace;

use crate::diagnostics::SmError;
use crate::syntax::token::{CmpOp, Keyword, Token, TokenKind};
use crate::syntax::Span;

#[derive(Parser)]
#[grammar = "syntax/tokens.pest"]
struct TokenGrammar;

/// Forward-only token stream over one source buffer.
///
/// The scanner stops for good after the first error or at end of input.
pub struct Scanner<'src> {
    source: &'src str,
    pos: usize,
    line: usize,
    finished: bool,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            line: 0,
            finished: false,
        }
    }

    pub fn source(&self) -> &'src str {
        self.source
    }

    /// Byte offset of the next unread character.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Number of newlines consumed so far.
    pub fn line(&self) -> usize {
        self.line
    }

    fn next_token(&mut self) -> Result<Option<Token>, SmError> {
        loop {
            let rest = &self.source[self.pos..];
            if rest.is_empty() {
                return Ok(None);
            }

            let pair = TokenGrammar::parse(Rule::token, rest)
                .ok()
                .and_then(|mut pairs| pairs.next())
                .and_then(|token| token.into_inner().next());
            let Some(pair) = pair else {
                return Err(self.illegal_character());
            };

            let text = pair.as_str();
            let start = self.pos;
            let end = start + text.len();
            let line = self.line;
            let newlines = count_newlines(text);
            self.pos = end;
            self.line += newlines;

            let kind = match pair.as_rule() {
                Rule::newline | Rule::blank => continue,
                Rule::comment => {
                    if newlines > 0 {
                        trace!(line, newlines, "skipped multi-line comment");
                    }
                    continue;
                }
                Rule::code_block => {
                    trace!(line, newlines, "code block");
                    TokenKind::Code(strip(text, 2).to_string())
                }
                Rule::ident => match Keyword::from_ident(text) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Ident(text.to_string()),
                },
                Rule::number => TokenKind::Number(self.number(text, start)?),
                Rule::string => TokenKind::Str(strip(text, 1).to_string()),
                Rule::dollar_pattern => TokenKind::DollarPattern(strip(text, 1).to_string()),
                Rule::action => TokenKind::Action,
                Rule::comparison => match CmpOp::from_lexeme(text) {
                    Some(op) => TokenKind::Comparison(op),
                    None => return Err(self.unrecognised(start, text)),
                },
                Rule::punct => match punctuation(text) {
                    Some(kind) => kind,
                    None => return Err(self.unrecognised(start, text)),
                },
                _ => return Err(self.unrecognised(start, text)),
            };

            return Ok(Some(Token {
                kind,
                span: Span::new(start, end),
                line,
            }));
        }
    }

    fn number(&self, text: &str, start: usize) -> Result<u64, SmError> {
        let parsed = match text.strip_prefix("0x") {
            Some(digits) => u64::from_str_radix(digits, 16),
            None => text.parse::<u64>(),
        };
        parsed.map_err(|_| {
            SmError::lexical(
                self.source,
                start,
                text,
                "Integer literal does not fit in 64 bits",
            )
        })
    }

    fn illegal_character(&self) -> SmError {
        let ch = self.source[self.pos..].chars().next().unwrap_or_default();
        SmError::lexical(
            self.source,
            self.pos,
            ch.to_string(),
            format!("Illegal character '{}'", ch),
        )
    }

    fn unrecognised(&self, start: usize, text: &str) -> SmError {
        SmError::lexical(self.source, start, text, "Unrecognised token")
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Token, SmError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_token() {
            Ok(Some(token)) => Some(Ok(token)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for Scanner<'_> {}

/// Scans the whole input, stopping at the first lexical error.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SmError> {
    Scanner::new(source).collect()
}

fn punctuation(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "(" => TokenKind::LParen,
        ")" => TokenKind::RParen,
        "{" => TokenKind::LBrace,
        "}" => TokenKind::RBrace,
        "[" => TokenKind::LSquare,
        "]" => TokenKind::RSquare,
        "," => TokenKind::Comma,
        "." => TokenKind::Dot,
        ":" => TokenKind::Colon,
        ";" => TokenKind::Semicolon,
        "=" => TokenKind::Assign,
        "*" => TokenKind::Star,
        "|" => TokenKind::Pipe,
        _ => return None,
    };
    Some(kind)
}

/// Drops `n` delimiter bytes from each end.
fn strip(text: &str, n: usize) -> &str {
    text.get(n..text.len().saturating_sub(n)).unwrap_or("")
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_keywords_are_promoted() {
        assert_eq!(
            kinds("stateful decl any_pointer ptr"),
            vec![
                TokenKind::Keyword(Keyword::Stateful),
                TokenKind::Keyword(Keyword::Decl),
                TokenKind::Keyword(Keyword::AnyPointer),
                TokenKind::Ident("ptr".into()),
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(kinds("smx decls"), vec![
            TokenKind::Ident("smx".into()),
            TokenKind::Ident("decls".into()),
        ]);
    }

    #[test]
    fn test_comparisons_match_longest_first() {
        assert_eq!(
            kinds("<= < == != >= > = =>"),
            vec![
                TokenKind::Comparison(CmpOp::Le),
                TokenKind::Comparison(CmpOp::Lt),
                TokenKind::Comparison(CmpOp::Eq),
                TokenKind::Comparison(CmpOp::Ne),
                TokenKind::Comparison(CmpOp::Ge),
                TokenKind::Comparison(CmpOp::Gt),
                TokenKind::Assign,
                TokenKind::Action,
            ]
        );
    }

    #[test]
    fn test_delimiters_are_stripped() {
        assert_eq!(
            kinds(r#"'single' "double" $leaked$ {{ body }}"#),
            vec![
                TokenKind::Str("single".into()),
                TokenKind::Str("double".into()),
                TokenKind::DollarPattern("leaked".into()),
                TokenKind::Code(" body ".into()),
            ]
        );
    }

    #[test]
    fn test_code_block_closes_at_first_double_brace() {
        assert_eq!(
            kinds("{{ a }} }}"),
            vec![
                TokenKind::Code(" a ".into()),
                TokenKind::RBrace,
                TokenKind::RBrace,
            ]
        );
    }

    #[test]
    fn test_unterminated_code_block_is_two_braces() {
        assert_eq!(
            kinds("{{ a"),
            vec![
                TokenKind::LBrace,
                TokenKind::LBrace,
                TokenKind::Ident("a".into()),
            ]
        );
    }

    #[test]
    fn test_line_counter_spans_comments_and_blocks() {
        let source = "a /* one\ntwo */ b\n{{ x\ny\n}} c";
        let tokens = tokenize(source).unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_hex_overflow_is_lexical_error() {
        let err = tokenize("0x10000000000000000").unwrap_err();
        assert!(matches!(err, SmError::Lexical(_)));
    }

    #[test]
    fn test_scanner_stops_after_error() {
        let mut scanner = Scanner::new("a ? b");
        assert!(matches!(scanner.next(), Some(Ok(_))));
        assert!(matches!(scanner.next(), Some(Err(SmError::Lexical(_)))));
        assert!(scanner.next().is_none());
    }
}
