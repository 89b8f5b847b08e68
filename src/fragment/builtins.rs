//! Builtin functions callable from action scripts.
//!
//! Every builtin takes already-evaluated [`Value`]s and acts only through
//! the [`FragmentEnv`] capabilities, so scripts cannot reach the analysis
//! engine in any other way.

use std::fmt;

use im::HashMap;

use super::{FragmentEnv, Severity};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Runtime value of a script expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    Int(u64),
}

impl Value {
    /// `%r` rendering: strings are quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(text) => format!("'{}'", text),
            Value::Int(value) => value.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(text) => f.write_str(text),
            Value::Int(value) => write!(f, "{}", value),
        }
    }
}

/// Builtin function type. Arity is checked at compile time, so `args`
/// always has the registered length. An `Err` is the runtime message.
pub type BuiltinFn = fn(args: &[Value], env: &mut dyn FragmentEnv) -> Result<(), String>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub func: BuiltinFn,
    pub doc: &'static str,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Registry for all builtins, inspectable at runtime.
#[derive(Debug, Clone, Default)]
pub struct BuiltinRegistry {
    builtins: HashMap<String, Builtin>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard builtins.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        register_std_builtins(&mut registry);
        registry
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.builtins.get(name)
    }

    /// Sorted builtin names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Builtins in name order.
    pub fn builtins(&self) -> impl Iterator<Item = &Builtin> + '_ {
        self.list().into_iter().filter_map(move |name| self.get(name))
    }

    // API for extensibility.
    pub fn register(&mut self, builtin: Builtin) {
        self.builtins.insert(builtin.name.to_string(), builtin);
    }
}

// ============================================================================
// STANDARD BUILTINS
// ============================================================================

pub fn register_std_builtins(registry: &mut BuiltinRegistry) {
    registry.register(Builtin {
        name: "error",
        arity: 1,
        func: report_error,
        doc: "Report an error diagnostic at the current program point.",
    });
    registry.register(Builtin {
        name: "warning",
        arity: 1,
        func: report_warning,
        doc: "Report a warning diagnostic at the current program point.",
    });
    registry.register(Builtin {
        name: "note",
        arity: 1,
        func: report_note,
        doc: "Attach an informational note.",
    });
    registry.register(Builtin {
        name: "set_state",
        arity: 1,
        func: set_state,
        doc: "Move the tracked variable into the named state.",
    });
}

fn report_error(args: &[Value], env: &mut dyn FragmentEnv) -> Result<(), String> {
    env.report(Severity::Error, first(args)?.to_string());
    Ok(())
}

fn report_warning(args: &[Value], env: &mut dyn FragmentEnv) -> Result<(), String> {
    env.report(Severity::Warning, first(args)?.to_string());
    Ok(())
}

fn report_note(args: &[Value], env: &mut dyn FragmentEnv) -> Result<(), String> {
    env.report(Severity::Note, first(args)?.to_string());
    Ok(())
}

fn set_state(args: &[Value], env: &mut dyn FragmentEnv) -> Result<(), String> {
    match first(args)? {
        Value::Str(state) if !state.is_empty() => {
            env.request_transition(state);
            Ok(())
        }
        other => Err(format!("set_state() needs a state name, got {}", other.repr())),
    }
}

fn first(args: &[Value]) -> Result<&Value, String> {
    args.first()
        .ok_or_else(|| "missing argument".to_string())
}
