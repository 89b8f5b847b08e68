//! Handles all user-facing output for the CLI.
//!
//! Every printer takes a `WriteColor`, so commands write to a `StandardStream`
//! while tests capture into a `termcolor::Buffer`.

use std::io;
use std::path::Path;

use termcolor::{Color, ColorSpec, WriteColor};

use crate::ast::Checker;
use crate::fragment::BuiltinRegistry;
use crate::syntax::{Token, TokenKind};

// ============================================================================
// CHECK REPORTS
// ============================================================================

/// `ok: <file> (<n> sm)`.
pub fn print_ok(writer: &mut impl WriteColor, path: &Path, checker: &Checker) -> io::Result<()> {
    print_label(writer, "ok", Color::Green)?;
    writeln!(writer, " {} ({} sm)", path.display(), checker.sms.len())
}

/// One note per named pattern used but never defined, per state machine.
pub fn print_unresolved(writer: &mut impl WriteColor, path: &Path, checker: &Checker) -> io::Result<()> {
    for sm in &checker.sms {
        for name in sm.unresolved_references() {
            print_label(writer, "note", Color::Cyan)?;
            writeln!(
                writer,
                " {}: sm {} uses undefined pattern '{}'",
                path.display(),
                sm.name,
                name
            )?;
        }
    }
    Ok(())
}

// ============================================================================
// DUMPS
// ============================================================================

/// `line:offset kind lexeme`, with a 1-based line.
pub fn print_token(writer: &mut impl WriteColor, source: &str, token: &Token) -> io::Result<()> {
    writer.set_color(ColorSpec::new().set_dimmed(true))?;
    write!(writer, "{}:{}", token.line + 1, token.span.start)?;
    writer.reset()?;
    writeln!(writer, " {} {}", token_kind(&token.kind), token.lexeme(source))
}

pub fn print_ast(writer: &mut impl WriteColor, checker: &Checker, json: bool) -> Result<(), super::CliError> {
    if json {
        serde_json::to_writer_pretty(&mut *writer, checker)?;
        writeln!(writer)?;
    } else {
        writeln!(writer, "{:#?}", checker)?;
    }
    Ok(())
}

/// `name/arity  doc` for each builtin, in name order.
pub fn print_builtins(writer: &mut impl WriteColor, registry: &BuiltinRegistry) -> io::Result<()> {
    for builtin in registry.builtins() {
        writer.set_color(ColorSpec::new().set_bold(true))?;
        write!(writer, "{}/{}", builtin.name, builtin.arity)?;
        writer.reset()?;
        writeln!(writer, "  {}", builtin.doc)?;
    }
    Ok(())
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

fn print_label(writer: &mut impl WriteColor, label: &str, color: Color) -> io::Result<()> {
    writer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(writer, "{}:", label)?;
    writer.reset()
}

fn token_kind(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Ident(_) => "ident",
        TokenKind::Keyword(_) => "keyword",
        TokenKind::Number(_) => "number",
        TokenKind::Str(_) => "string",
        TokenKind::DollarPattern(_) => "dollar",
        TokenKind::Code(_) => "code",
        TokenKind::Comparison(_) => "cmp",
        _ => "punct",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::tokenize;
    use termcolor::Buffer;

    fn captured(buffer: Buffer) -> String {
        String::from_utf8(buffer.into_inner()).unwrap()
    }

    #[test]
    fn test_ok_line() {
        let checker = crate::parse_string("sm a { } sm b { }").unwrap();
        let mut out = Buffer::no_color();
        print_ok(&mut out, Path::new("two.sm"), &checker).unwrap();
        assert_eq!(captured(out), "ok: two.sm (2 sm)\n");
    }

    #[test]
    fn test_unresolved_note() {
        let checker = crate::parse_string("sm a { ptr: missing => ptr.x; }").unwrap();
        let mut out = Buffer::no_color();
        print_unresolved(&mut out, Path::new("a.sm"), &checker).unwrap();
        assert_eq!(captured(out), "note: a.sm: sm a uses undefined pattern 'missing'\n");
    }

    #[test]
    fn test_token_dump() {
        let source = "sm x\n{";
        let mut out = Buffer::no_color();
        for token in tokenize(source).unwrap() {
            print_token(&mut out, source, &token).unwrap();
        }
        assert_eq!(captured(out), "1:0 keyword sm\n1:3 ident x\n2:5 punct {\n");
    }

    #[test]
    fn test_builtin_listing() {
        let mut out = Buffer::no_color();
        print_builtins(&mut out, &BuiltinRegistry::standard()).unwrap();
        let listing = captured(out);
        let names: Vec<&str> = listing.lines().filter_map(|l| l.split("  ").next()).collect();
        assert_eq!(names, vec!["error/1", "note/1", "set_state/1", "warning/1"]);
        assert!(listing.contains("set_state/1  Move the tracked variable into the named state.\n"));
    }
}
