//! Front end for `.sm` state-machine rule files.
//!
//! A rule file declares one or more state machines for a static checker of
//! C code. [`parse_string`] and [`parse_file`] run the whole pipeline:
//! scan, parse into a [`Checker`], then compile every embedded `{{ ... }}`
//! fragment. The `_with` variants take a caller-supplied
//! [`FragmentCompiler`].

use std::fs;
use std::path::Path;

pub use crate::ast::Checker;
pub use crate::diagnostics::{ErrorType, SmError};
pub use crate::fragment::{FragmentCompiler, ScriptCompiler};

pub mod ast;
pub mod cli;
pub mod diagnostics;
pub mod fragment;
pub mod syntax;

/// Parses rule text and compiles its fragments with [`ScriptCompiler`].
pub fn parse_string(text: &str) -> Result<Checker, SmError> {
    parse_string_with(text, &ScriptCompiler::default())
}

pub fn parse_string_with(text: &str, compiler: &dyn FragmentCompiler) -> Result<Checker, SmError> {
    let checker = syntax::parse_checker(text)?;
    fragment::compile_fragments(&checker, compiler)?;
    Ok(checker)
}

/// Reads and parses a rule file. The path is attached to the checker, and to
/// any error, for rendering.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Checker, SmError> {
    parse_file_with(path, &ScriptCompiler::default())
}

pub fn parse_file_with(
    path: impl AsRef<Path>,
    compiler: &dyn FragmentCompiler,
) -> Result<Checker, SmError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| SmError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = syntax::parse_checker(&text).and_then(|mut checker| {
        checker.set_filename(path.to_path_buf());
        fragment::compile_fragments(&checker, compiler)?;
        Ok(checker)
    });
    parsed.map_err(|err| err.with_filename(path))
}
