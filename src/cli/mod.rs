//! The `smlang` command-line interface.
//!
//! This module is the entry point for all CLI commands and orchestrates the
//! library functions. The library never prints; everything user-facing goes
//! through [`output`] and [`diagnostics`].

use std::fs;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};
use thiserror::Error;
use tracing::{debug, Level};
use walkdir::WalkDir;

use crate::cli::args::{ColorMode, Command, SmArgs};
use crate::diagnostics::SmError;
use crate::fragment::ScriptCompiler;
use crate::syntax::Scanner;

pub mod args;
pub mod diagnostics;
pub mod output;

/// Failures of a CLI command.
#[derive(Debug, Error, miette::Diagnostic)]
pub enum CliError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Sm(#[from] SmError),
    #[error("could not serialize the syntax tree: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not write output: {0}")]
    Output(#[from] io::Error),
}

/// The main entry point for the CLI.
pub fn run() {
    let args = SmArgs::parse();
    init_tracing(args.verbose);

    let mut stdout = StandardStream::stdout(color_choice(args.color, io::stdout().is_terminal()));
    let result = match &args.command {
        Command::Check { paths } => handle_check(&mut stdout, paths),
        Command::Tokens { file } => handle_tokens(&mut stdout, file),
        Command::Ast { file, json } => handle_ast(&mut stdout, file, *json),
        Command::Builtins => handle_builtins(&mut stdout),
    };

    let _ = stdout.flush();
    if let Err(err) = result {
        let mut stderr = StandardStream::stderr(color_choice(args.color, io::stderr().is_terminal()));
        if diagnostics::print_diagnostic(&mut stderr, &err, args.diagnostics).is_err() {
            eprintln!("{}", err);
        }
        process::exit(1);
    }
}

// ============================================================================
// COMMAND HANDLERS
// ============================================================================

fn handle_check(stdout: &mut StandardStream, paths: &[PathBuf]) -> Result<(), CliError> {
    let files = collect_rule_files(paths)?;
    debug!(files = files.len(), "checking rule files");
    for file in files {
        let checker = crate::parse_file(&file)?;
        output::print_ok(stdout, &file, &checker)?;
        output::print_unresolved(stdout, &file, &checker)?;
    }
    Ok(())
}

fn handle_tokens(stdout: &mut StandardStream, file: &Path) -> Result<(), CliError> {
    let source = read_source(file)?;
    for token in Scanner::new(&source) {
        let token = token.map_err(|err| err.with_filename(file))?;
        output::print_token(stdout, &source, &token)?;
    }
    Ok(())
}

fn handle_ast(stdout: &mut StandardStream, file: &Path, json: bool) -> Result<(), CliError> {
    let checker = crate::parse_file(file)?;
    output::print_ast(stdout, &checker, json)
}

fn handle_builtins(stdout: &mut StandardStream) -> Result<(), CliError> {
    let compiler = ScriptCompiler::default();
    output::print_builtins(stdout, compiler.registry())?;
    Ok(())
}

// ============================================================================
// PRIVATE HELPERS
// ============================================================================

/// Expands directories into their `*.sm` files, each directory in sorted
/// order. Plain file arguments are kept as given.
fn collect_rule_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>, SmError> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|err| walk_error(path, err))?;
            let is_rule_file = entry.path().extension().is_some_and(|ext| ext == "sm");
            if entry.file_type().is_file() && is_rule_file {
                files.push(entry.into_path());
            }
        }
    }
    Ok(files)
}

fn walk_error(root: &Path, err: walkdir::Error) -> SmError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "filesystem loop"));
    SmError::Io { path, source }
}

fn read_source(path: &Path) -> Result<String, SmError> {
    fs::read_to_string(path).map_err(|source| SmError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn color_choice(mode: ColorMode, is_terminal: bool) -> ColorChoice {
    match mode {
        ColorMode::Always => ColorChoice::Always,
        ColorMode::Never => ColorChoice::Never,
        ColorMode::Auto if is_terminal => ColorChoice::Auto,
        ColorMode::Auto => ColorChoice::Never,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .try_init();
}
