//! # Code Fragments
//!
//! Rule files embed `{{ ... }}` blocks written in a separate snippet
//! language. The parser keeps them as raw text plus the line they start on;
//! this module compiles them in one pass over the finished tree.
//!
//! ## Module Structure
//!
//! - **`builtins`**: functions a snippet may call (`error`, `set_state`, ...)
//! - **`script`**: the default snippet compiler
//!
//! The snippet compiler is a capability supplied by the caller through
//! [`FragmentCompiler`]. Compiled units run against a [`FragmentEnv`], the
//! narrow interface the analysis engine exposes to snippets.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::ast::{Checker, Node, Visitor};
use crate::diagnostics::SmError;

pub mod builtins;
pub mod script;

pub use builtins::{Builtin, BuiltinRegistry, Value};
pub use script::ScriptCompiler;

// ============================================================================
// CORE TYPES AND TRAITS
// ============================================================================

/// What a fragment compiler is given for one fragment.
#[derive(Debug, Clone, Copy)]
pub struct FragmentSource<'a> {
    pub text: &'a str,
    /// 0-based rule-file line of the opening `{{`.
    pub line_offset: usize,
    pub filename: Option<&'a Path>,
}

impl FragmentSource<'_> {
    /// Maps a 1-based line inside the fragment to a 1-based rule-file line.
    pub fn file_line(&self, fragment_line: usize) -> usize {
        self.line_offset + fragment_line
    }
}

/// Rejection of a fragment by its compiler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FragmentCompileError {
    pub message: String,
    /// 1-based line within the fragment text.
    pub line: usize,
    /// 1-based column, when the compiler knows it.
    pub column: Option<usize>,
}

/// Failure while running a compiled fragment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct FragmentRuntimeError {
    pub message: String,
    /// 1-based line in the rule file.
    pub line: usize,
    pub filename: Option<PathBuf>,
}

impl fmt::Display for FragmentRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filename {
            Some(filename) => write!(f, "{}:{}: {}", filename.display(), self.line, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Capabilities the analysis engine grants to running fragments.
pub trait FragmentEnv {
    /// Describes the tracked variable `name` as it should appear in messages.
    fn variable(&self, name: &str) -> Option<String>;
    fn report(&mut self, severity: Severity, message: String);
    fn request_transition(&mut self, state: &str);
}

/// A fragment after compilation.
pub trait CompiledFragment: fmt::Debug + Send + Sync {
    fn run(&self, env: &mut dyn FragmentEnv) -> Result<(), FragmentRuntimeError>;
}

/// Turns fragment text into a runnable unit.
pub trait FragmentCompiler {
    fn compile(
        &self,
        fragment: FragmentSource<'_>,
    ) -> Result<Arc<dyn CompiledFragment>, FragmentCompileError>;
}

// ============================================================================
// COMPILATION PASS
// ============================================================================

/// Compiles every fragment of `checker` that is not compiled yet and
/// returns how many were compiled. Stops at the first rejection.
pub fn compile_fragments(
    checker: &Checker,
    compiler: &dyn FragmentCompiler,
) -> Result<usize, SmError> {
    let mut pass = CompilePass {
        compiler,
        filename: checker.filename(),
        compiled: 0,
    };
    checker.accept(&mut pass)?;
    debug!(fragments = pass.compiled, "compiled code fragments");
    Ok(pass.compiled)
}

struct CompilePass<'c> {
    compiler: &'c dyn FragmentCompiler,
    filename: Option<&'c Path>,
    compiled: usize,
}

impl<'a> Visitor<'a> for CompilePass<'_> {
    type Error = SmError;

    fn visit(&mut self, node: Node<'a>) -> Result<(), Self::Error> {
        let Node::Fragment(fragment) = node else {
            return Ok(());
        };
        if fragment.is_compiled() {
            return Ok(());
        }
        let source = FragmentSource {
            text: &fragment.source,
            line_offset: fragment.line_offset,
            filename: self.filename,
        };
        let unit = self
            .compiler
            .compile(source)
            .map_err(|err| {
                SmError::fragment(err, fragment.line_offset, fragment.column_offset, self.filename)
            })?;
        if fragment.set_compiled(unit) {
            self.compiled += 1;
        }
        Ok(())
    }
}

// ============================================================================
// RECORDING ENVIRONMENT
// ============================================================================

/// A [`FragmentEnv`] that records everything fragments ask for.
#[derive(Debug, Clone, Default)]
pub struct RecordingEnv {
    pub variables: im::HashMap<String, String>,
    pub reports: Vec<(Severity, String)>,
    pub transitions: Vec<String>,
}

impl RecordingEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.variables.insert(name.into(), description.into());
        self
    }

    pub fn messages(&self, severity: Severity) -> Vec<&str> {
        self.reports
            .iter()
            .filter(|(level, _)| *level == severity)
            .map(|(_, message)| message.as_str())
            .collect()
    }
}

impl FragmentEnv for RecordingEnv {
    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name).cloned()
    }

    fn report(&mut self, severity: Severity, message: String) {
        self.reports.push((severity, message));
    }

    fn request_transition(&mut self, state: &str) {
        self.transitions.push(state.to_string());
    }
}
