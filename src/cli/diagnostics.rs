//! Error presentation for the CLI.
//!
//! Two styles: the plain format (the error's own `Display`, with the header
//! line colorized) and a miette graphical report.

use std::io;

use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme};
use termcolor::{Color, ColorSpec, WriteColor};

use super::args::DiagnosticStyle;

/// Renders `error` in the requested style. `color` only affects the fancy
/// style; the plain text is colorized through `writer`.
pub fn render(error: &dyn Diagnostic, style: DiagnosticStyle, color: bool) -> String {
    match style {
        DiagnosticStyle::Plain => error.to_string(),
        DiagnosticStyle::Fancy => {
            let theme = if color {
                GraphicalTheme::unicode()
            } else {
                GraphicalTheme::unicode_nocolor()
            };
            let mut out = String::new();
            if GraphicalReportHandler::new_themed(theme)
                .render_report(&mut out, error)
                .is_err()
            {
                // Fall back to the plain rendering.
                out = error.to_string();
            }
            out
        }
    }
}

/// Writes a diagnostic to `writer`, painting the first line red.
pub fn print_diagnostic(
    writer: &mut impl WriteColor,
    error: &dyn Diagnostic,
    style: DiagnosticStyle,
) -> io::Result<()> {
    let text = render(error, style, writer.supports_color());
    if style == DiagnosticStyle::Fancy {
        return writeln!(writer, "{}", text.trim_end());
    }

    let (header, rest) = text.split_once('\n').unwrap_or((&text, ""));
    writer.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(writer, "{}", header)?;
    writer.reset()?;
    writeln!(writer)?;
    if !rest.is_empty() {
        writeln!(writer, "{}", rest)?;
    }
    Ok(())
}
