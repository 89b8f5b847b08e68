//! Defines the command-line arguments and subcommands for the `smlang` CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "smlang",
    version,
    about = "Check, tokenize and inspect .sm state-machine rule files."
)]
pub struct SmArgs {
    #[command(subcommand)]
    pub command: Command,

    /// How errors are rendered.
    #[arg(long, value_enum, default_value_t = DiagnosticStyle::Plain, global = true)]
    pub diagnostics: DiagnosticStyle,

    /// When to color terminal output.
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    pub color: ColorMode,

    /// Log verbosity on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse rule files and compile their fragments.
    Check {
        /// Rule files, or directories searched for `*.sm` files.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Print the token stream of a rule file.
    Tokens {
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Show the syntax tree of a rule file.
    Ast {
        #[arg(required = true)]
        file: PathBuf,
        /// Emit JSON instead of the debug tree.
        #[arg(long)]
        json: bool,
    },
    /// List the builtins available to code fragments.
    Builtins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiagnosticStyle {
    /// The one-line-plus-caret format.
    Plain,
    /// A miette report with labels and help.
    Fancy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}
