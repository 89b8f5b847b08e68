//! Error values for the `.sm` front end and their rendering.
//!
//! Every failure aborts the parse immediately; there are no warnings and no
//! batching. Lexical and syntax errors carry the whole source text so they
//! can reconstruct the offending line on their own:
//!
//! ```text
//! malloc.sm:3:18: Parse error, expected identifier at ";":
//!   decl any_pointer ;
//!                    ^
//! ```
//!
//! The filename prefix only appears once a path has been attached with
//! [`SmError::with_filename`]. `SmError` also implements
//! [`miette::Diagnostic`] so callers can hand it to a `miette::Report`.

use std::fmt;
use std::path::{Path, PathBuf};

use miette::{Diagnostic, LabeledSpan, SourceCode};
use thiserror::Error;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::fragment::FragmentCompileError;

/// Type-safe classification of [`SmError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// No token rule matched, or a literal was out of range.
    Lexical,
    /// No grammar production matched, including premature end of input.
    Syntax,
    /// An embedded fragment was rejected by the fragment compiler.
    FragmentCompile,
    /// The rule file could not be read.
    Io,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Lexical => "Lexical",
            ErrorType::Syntax => "Syntax",
            ErrorType::FragmentCompile => "FragmentCompile",
            ErrorType::Io => "Io",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure located at a byte offset of the rule file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    /// The complete input the scanner was given.
    pub text: String,
    /// Byte offset of the offending lexeme.
    pub offset: usize,
    /// The offending lexeme; empty at end of input.
    pub value: String,
    pub message: String,
    pub filename: Option<PathBuf>,
}

impl SourceError {
    pub fn new(
        text: impl Into<String>,
        offset: usize,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let offset = offset.min(text.len());
        Self {
            text,
            offset,
            value: value.into(),
            message: message.into(),
            filename: None,
        }
    }

    fn before(&self) -> &str {
        self.text.get(..self.offset).unwrap_or("")
    }

    fn line_start(&self) -> usize {
        self.before().rfind('\n').map_or(0, |idx| idx + 1)
    }

    /// End of the offending line, before any `\r\n` or `\n`.
    fn line_end(&self) -> usize {
        let after = self.text.get(self.offset..).unwrap_or("");
        let end = after
            .find('\n')
            .map_or(self.text.len(), |idx| self.offset + idx);
        let ends_at_newline = end < self.text.len() && end > self.offset;
        if ends_at_newline && self.text.as_bytes().get(end - 1) == Some(&b'\r') {
            end - 1
        } else {
            end
        }
    }

    /// 0-based line index: the number of newlines before the offset.
    pub fn line(&self) -> usize {
        self.before().bytes().filter(|b| *b == b'\n').count()
    }

    /// 0-based column, counted in characters from the start of the line.
    pub fn column(&self) -> usize {
        self.text
            .get(self.line_start()..self.offset)
            .map_or(0, |prefix| prefix.chars().count())
    }

    /// The full source line containing the offset, without its newline.
    pub fn source_line(&self) -> &str {
        self.text
            .get(self.line_start()..self.line_end())
            .unwrap_or("")
    }

    /// Whitespace up to the column followed by one caret per display column
    /// of the lexeme. A lexeme spanning several lines is underlined up to
    /// the end of its first line.
    pub fn caret_line(&self) -> String {
        let prefix = self.text.get(self.line_start()..self.offset).unwrap_or("");
        let mut line = String::with_capacity(prefix.len() + self.value.len());
        for ch in prefix.chars() {
            if ch == '\t' {
                line.push('\t');
            } else {
                line.extend(std::iter::repeat(' ').take(ch.width().unwrap_or(0)));
            }
        }
        let first_line = self.value.split('\n').next().unwrap_or("");
        let width = UnicodeWidthStr::width(first_line).max(1);
        line.extend(std::iter::repeat('^').take(width));
        line
    }

    fn label_len(&self) -> usize {
        if self.offset >= self.text.len() {
            0
        } else {
            self.value.len().max(1).min(self.text.len() - self.offset)
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(filename) = &self.filename {
            write!(
                f,
                "{}:{}:{}: ",
                filename.display(),
                self.line() + 1,
                self.column() + 1
            )?;
        }
        write!(
            f,
            "{} at \"{}\":\n{}\n{}",
            self.message,
            self.value,
            self.source_line(),
            self.caret_line()
        )
    }
}

/// A fragment compiler failure, decorated with where the fragment sits in
/// the rule file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFailure {
    pub error: FragmentCompileError,
    /// 0-based line of the opening `{{` in the rule file.
    pub line_offset: usize,
    /// Characters before the fragment text on the `{{` line.
    pub column_offset: usize,
    pub filename: Option<PathBuf>,
}

impl FragmentFailure {
    /// 1-based line in the rule file.
    pub fn line(&self) -> usize {
        self.line_offset + self.error.line
    }

    /// 1-based column in the rule file. Only the fragment's first line
    /// shares its rule-file line with the text before `{{`.
    pub fn column(&self) -> Option<usize> {
        self.error.column.map(|column| {
            if self.error.line == 1 {
                self.column_offset + column
            } else {
                column
            }
        })
    }
}

impl fmt::Display for FragmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{}:{}", filename.display(), self.line())?,
            None => write!(f, "line {}", self.line())?,
        }
        if let Some(column) = self.column() {
            write!(f, ":{}", column)?;
        }
        write!(f, ": error in code fragment: {}", self.error.message)
    }
}

/// Unified error type for the scanner, parser and fragment pass.
#[derive(Debug, Error)]
pub enum SmError {
    #[error("{0}")]
    Lexical(SourceError),
    #[error("{0}")]
    Syntax(SourceError),
    #[error("{0}")]
    FragmentCompile(FragmentFailure),
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SmError {
    pub fn lexical(
        text: &str,
        offset: usize,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SmError::Lexical(SourceError::new(text, offset, value, message))
    }

    pub fn syntax(
        text: &str,
        offset: usize,
        value: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        SmError::Syntax(SourceError::new(text, offset, value, message))
    }

    pub fn fragment(
        error: FragmentCompileError,
        line_offset: usize,
        column_offset: usize,
        filename: Option<&Path>,
    ) -> Self {
        SmError::FragmentCompile(FragmentFailure {
            error,
            line_offset,
            column_offset,
            filename: filename.map(Path::to_path_buf),
        })
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            SmError::Lexical(_) => ErrorType::Lexical,
            SmError::Syntax(_) => ErrorType::Syntax,
            SmError::FragmentCompile(_) => ErrorType::FragmentCompile,
            SmError::Io { .. } => ErrorType::Io,
        }
    }

    /// The located error behind a lexical or syntax failure.
    pub fn source_error(&self) -> Option<&SourceError> {
        match self {
            SmError::Lexical(err) | SmError::Syntax(err) => Some(err),
            _ => None,
        }
    }

    /// Attaches the rule file path for rendering. An existing filename is
    /// left untouched.
    pub fn with_filename(mut self, path: &Path) -> Self {
        match &mut self {
            SmError::Lexical(err) | SmError::Syntax(err) => {
                err.filename.get_or_insert_with(|| path.to_path_buf());
            }
            SmError::FragmentCompile(failure) => {
                failure.filename.get_or_insert_with(|| path.to_path_buf());
            }
            SmError::Io { .. } => {}
        }
        self
    }
}

impl Diagnostic for SmError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match self {
            SmError::Lexical(_) => "sm::lex",
            SmError::Syntax(_) => "sm::syntax",
            SmError::FragmentCompile(_) => "sm::fragment",
            SmError::Io { .. } => "sm::io",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            SmError::FragmentCompile(failure) => Some(Box::new(format!(
                "the fragment opens on line {} of the rule file",
                failure.line_offset + 1
            ))),
            _ => None,
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.source_error()
            .map(|err| &err.text as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let err = self.source_error()?;
        let label = LabeledSpan::new(Some(err.message.clone()), err.offset, err.label_len());
        Some(Box::new(std::iter::once(label)))
    }
}

#[cfg(test)]
mod diagnostics_tests {
    use miette::Report;

    use super::*;

    #[test]
    fn test_line_and_column_from_offset() {
        let err = SourceError::new("a\nb\nc?\n", 5, "?", "Illegal character '?'");
        assert_eq!(err.line(), 2);
        assert_eq!(err.column(), 1);
        assert_eq!(err.source_line(), "c?");
        assert_eq!(err.caret_line(), " ^");
    }

    #[test]
    fn test_source_line_extends_to_end_of_line() {
        let err = SourceError::new("foo bar baz", 4, "bar", "Parse error");
        assert_eq!(err.source_line(), "foo bar baz");
        assert_eq!(err.caret_line(), "    ^^^");
    }

    #[test]
    fn test_end_of_input_has_single_caret() {
        let text = "sm x {\n";
        let err = SourceError::new(text, text.len(), "", "Unexpected end of input");
        assert_eq!(err.line(), 1);
        assert_eq!(err.source_line(), "");
        assert_eq!(err.caret_line(), "^");
    }

    #[test]
    fn test_tabs_are_preserved_in_caret_padding() {
        let err = SourceError::new("\tx ?", 3, "?", "Illegal character '?'");
        assert_eq!(err.caret_line(), "\t  ^");
    }

    #[test]
    fn test_wide_characters_widen_padding() {
        let err = SourceError::new("'日本' ?", 9, "?", "Illegal character '?'");
        assert_eq!(err.column(), 5);
        assert_eq!(err.caret_line(), "       ^");
    }

    #[test]
    fn test_filename_prefix() {
        let err = SmError::syntax("sm x {\n  decl any_pointer ;\n}", 26, ";", "Parse error")
            .with_filename(Path::new("rules.sm"));
        let rendered = err.to_string();
        assert!(rendered.starts_with("rules.sm:2:20: Parse error at \";\":"));
        let expected_tail = format!("  decl any_pointer ;\n{}^", " ".repeat(19));
        assert!(rendered.ends_with(&expected_tail));
    }

    #[test]
    fn test_with_filename_keeps_first_path() {
        let err = SmError::lexical("?", 0, "?", "Illegal character '?'")
            .with_filename(Path::new("first.sm"))
            .with_filename(Path::new("second.sm"));
        assert!(err.to_string().starts_with("first.sm:1:1:"));
    }

    #[test]
    fn test_fragment_failure_reports_file_line() {
        let error = FragmentCompileError {
            message: "unknown function 'eror'".to_string(),
            line: 2,
            column: Some(5),
        };
        let err = SmError::fragment(error, 10, 12, Some(Path::new("rules.sm")));
        assert_eq!(err.error_type(), ErrorType::FragmentCompile);
        assert_eq!(
            err.to_string(),
            "rules.sm:12:5: error in code fragment: unknown function 'eror'"
        );
    }

    #[test]
    fn test_fragment_first_line_column_counts_from_rule_line() {
        let error = FragmentCompileError {
            message: "unknown function 'eror'".to_string(),
            line: 1,
            column: Some(2),
        };
        let err = SmError::fragment(error, 1, 18, None);
        assert_eq!(
            err.to_string(),
            "line 2:20: error in code fragment: unknown function 'eror'"
        );
    }

    #[test]
    fn test_crlf_source_line_drops_carriage_return() {
        let text = "sm X {\r\n decl any_pointer ;\r\n}";
        let err = SourceError::new(text, 26, ";", "Parse error, expected identifier");
        assert_eq!(err.source_line(), " decl any_pointer ;");
        assert_eq!(err.caret_line(), format!("{}^", " ".repeat(18)));
    }

    #[test]
    fn test_miette_report_includes_label_and_code() {
        let err = SmError::syntax("sm 42 { }", 3, "42", "Parse error, expected identifier");
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("sm::syntax"));
        assert!(output.contains("expected identifier"));
    }
}
