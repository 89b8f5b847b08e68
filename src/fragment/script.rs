//! Action scripts: the default fragment language.
//!
//! A script is a sequence of builtin calls, optionally separated by `;`.
//! Arguments are strings, integers, tracked-variable names, or a format
//! expression `'template %s' % arg` / `'%s and %s' % (a, b)`. Compilation
//! checks syntax, builtin names, arity and placeholder counts; variable
//! lookups happen when the script runs.

use std::path::PathBuf;
use std::sync::Arc;

use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::builtins::{Builtin, BuiltinRegistry, Value};
use super::{
    CompiledFragment, FragmentCompileError, FragmentCompiler, FragmentEnv, FragmentRuntimeError,
    FragmentSource,
};

#[derive(Parser)]
#[grammar = "fragment/script.pest"]
struct ScriptGrammar;

// ============================================================================
// COMPILED FORM
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Str(String),
    Int(u64),
    Var(String),
    Format { template: String, args: Vec<Expr> },
}

#[derive(Debug, Clone)]
struct Call {
    builtin: Builtin,
    args: Vec<Expr>,
    /// 1-based rule-file line.
    line: usize,
}

/// A compiled action script.
#[derive(Debug)]
pub struct Script {
    calls: Vec<Call>,
    filename: Option<PathBuf>,
}

impl Script {
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Builtins called by this script, in order.
    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls.iter().map(|call| call.builtin.name).collect()
    }

    fn eval(&self, expr: &Expr, env: &dyn FragmentEnv, line: usize) -> Result<Value, FragmentRuntimeError> {
        match expr {
            Expr::Str(text) => Ok(Value::Str(text.clone())),
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Var(name) => env
                .variable(name)
                .map(Value::Str)
                .ok_or_else(|| self.runtime_error(format!("name '{}' is not defined", name), line)),
            Expr::Format { template, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg, env, line))
                    .collect::<Result<Vec<_>, _>>()?;
                format_template(template, &values).map_err(|message| self.runtime_error(message, line))
            }
        }
    }

    fn runtime_error(&self, message: String, line: usize) -> FragmentRuntimeError {
        FragmentRuntimeError {
            message,
            line,
            filename: self.filename.clone(),
        }
    }
}

impl CompiledFragment for Script {
    fn run(&self, env: &mut dyn FragmentEnv) -> Result<(), FragmentRuntimeError> {
        for call in &self.calls {
            let args = call
                .args
                .iter()
                .map(|arg| self.eval(arg, &*env, call.line))
                .collect::<Result<Vec<_>, _>>()?;
            (call.builtin.func)(&args, &mut *env).map_err(|message| {
                self.runtime_error(format!("{}(): {}", call.builtin.name, message), call.line)
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// COMPILER
// ============================================================================

/// The default [`FragmentCompiler`], backed by a [`BuiltinRegistry`].
#[derive(Debug, Clone)]
pub struct ScriptCompiler {
    registry: BuiltinRegistry,
}

impl Default for ScriptCompiler {
    fn default() -> Self {
        Self::with_registry(BuiltinRegistry::standard())
    }
}

impl ScriptCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: BuiltinRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BuiltinRegistry {
        &self.registry
    }

    pub fn compile_script(&self, fragment: FragmentSource<'_>) -> Result<Script, FragmentCompileError> {
        let pairs = ScriptGrammar::parse(Rule::script, fragment.text).map_err(syntax_error)?;

        let mut calls = Vec::new();
        for pair in pairs.flat_map(|script| script.into_inner()) {
            if pair.as_rule() == Rule::call {
                calls.push(self.build_call(pair, &fragment)?);
            }
        }

        Ok(Script {
            calls,
            filename: fragment.filename.map(PathBuf::from),
        })
    }

    fn build_call(&self, pair: Pair<Rule>, fragment: &FragmentSource<'_>) -> Result<Call, FragmentCompileError> {
        let (line, column) = pair.as_span().start_pos().line_col();
        let mut inner = pair.into_inner();
        let name = inner.next().map(|ident| ident.as_str()).unwrap_or_default();

        let Some(builtin) = self.registry.get(name) else {
            return Err(compile_error(format!("unknown function '{}'", name), line, column));
        };
        let args = inner.map(build_expr).collect::<Result<Vec<_>, _>>()?;
        if args.len() != builtin.arity {
            return Err(compile_error(
                format!(
                    "{}() takes {} argument(s), {} given",
                    builtin.name,
                    builtin.arity,
                    args.len()
                ),
                line,
                column,
            ));
        }

        Ok(Call {
            builtin: *builtin,
            args,
            line: fragment.file_line(line),
        })
    }
}

impl FragmentCompiler for ScriptCompiler {
    fn compile(
        &self,
        fragment: FragmentSource<'_>,
    ) -> Result<Arc<dyn CompiledFragment>, FragmentCompileError> {
        let script = self.compile_script(fragment)?;
        Ok(Arc::new(script))
    }
}

// ============================================================================
// AST BUILDERS
// ============================================================================

fn build_expr(pair: Pair<Rule>) -> Result<Expr, FragmentCompileError> {
    let (line, column) = pair.as_span().start_pos().line_col();
    match pair.as_rule() {
        Rule::expr => match pair.into_inner().next() {
            Some(inner) => build_expr(inner),
            None => Err(compile_error("empty expression".to_string(), line, column)),
        },
        Rule::format => {
            let mut inner = pair.into_inner();
            let template = match inner.next() {
                Some(string) => string_body(string),
                None => String::new(),
            };
            let args = match inner.next() {
                Some(tuple) if tuple.as_rule() == Rule::tuple => tuple
                    .into_inner()
                    .map(build_expr)
                    .collect::<Result<Vec<_>, _>>()?,
                Some(single) => vec![build_expr(single)?],
                None => vec![],
            };
            let expected = count_placeholders(&template)
                .map_err(|message| compile_error(message, line, column))?;
            if expected != args.len() {
                return Err(compile_error(
                    format!(
                        "format string expects {} argument(s), {} given",
                        expected,
                        args.len()
                    ),
                    line,
                    column,
                ));
            }
            Ok(Expr::Format { template, args })
        }
        Rule::string => Ok(Expr::Str(string_body(pair))),
        Rule::number => pair
            .as_str()
            .parse::<u64>()
            .map(Expr::Int)
            .map_err(|_| compile_error("integer literal does not fit in 64 bits".to_string(), line, column)),
        Rule::ident => Ok(Expr::Var(pair.as_str().to_string())),
        rule => Err(compile_error(format!("unexpected {:?}", rule), line, column)),
    }
}

fn string_body(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|body| body.as_str().to_string())
        .unwrap_or_default()
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Number of arguments `template` consumes.
fn count_placeholders(template: &str) -> Result<usize, String> {
    let mut count = 0;
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            continue;
        }
        match chars.next() {
            Some('%') => {}
            Some('s' | 'i' | 'd' | 'r') => count += 1,
            Some(other) => return Err(format!("unsupported format character '{}'", other)),
            None => return Err("incomplete format".to_string()),
        }
    }
    Ok(count)
}

fn format_template(template: &str, args: &[Value]) -> Result<Value, String> {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(spec @ ('s' | 'i' | 'd' | 'r')) => {
                let value = args.next().ok_or("not enough arguments for format string")?;
                match (spec, value) {
                    ('s', value) => out.push_str(&value.to_string()),
                    ('r', value) => out.push_str(&value.repr()),
                    (_, Value::Int(number)) => out.push_str(&number.to_string()),
                    (_, Value::Str(_)) => {
                        return Err(format!("%{} format: a number is required", spec))
                    }
                }
            }
            Some(other) => return Err(format!("unsupported format character '{}'", other)),
            None => return Err("incomplete format".to_string()),
        }
    }
    if args.next().is_some() {
        return Err("not all arguments converted during string formatting".to_string());
    }
    Ok(Value::Str(out))
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

fn compile_error(message: String, line: usize, column: usize) -> FragmentCompileError {
    FragmentCompileError {
        message,
        line,
        column: Some(column),
    }
}

fn syntax_error(error: pest::error::Error<Rule>) -> FragmentCompileError {
    let (line, column) = match error.line_col {
        LineColLocation::Pos(position) => position,
        LineColLocation::Span(start, _) => start,
    };
    compile_error(format!("invalid syntax, {}", error.variant.message()), line, column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{RecordingEnv, Severity};

    fn source(text: &str, line_offset: usize) -> FragmentSource<'_> {
        FragmentSource {
            text,
            line_offset,
            filename: None,
        }
    }

    fn compile(text: &str) -> Result<Script, FragmentCompileError> {
        ScriptCompiler::default().compile_script(source(text, 0))
    }

    #[test]
    fn test_format_with_tracked_variable() {
        let script = compile(" error('use of possibly-NULL pointer %s' % ptr) ").unwrap();
        let mut env = RecordingEnv::new().with_variable("ptr", "p");
        script.run(&mut env).unwrap();
        assert_eq!(
            env.messages(Severity::Error),
            vec!["use of possibly-NULL pointer p"]
        );
    }

    #[test]
    fn test_tuple_format_and_escapes() {
        let script = compile(r#"note("%s freed %r times, 100%%" % (ptr, 2))"#).unwrap();
        let mut env = RecordingEnv::new().with_variable("ptr", "buf");
        script.run(&mut env).unwrap();
        assert_eq!(env.messages(Severity::Note), vec!["buf freed 2 times, 100%"]);
    }

    #[test]
    fn test_multiple_calls_and_transition() {
        let script = compile("warning('odd');\nset_state('ptr.free')\n# trailing comment\n").unwrap();
        assert_eq!(script.call_names(), vec!["warning", "set_state"]);
        let mut env = RecordingEnv::new();
        script.run(&mut env).unwrap();
        assert_eq!(env.transitions, vec!["ptr.free"]);
    }

    #[test]
    fn test_empty_script_compiles() {
        assert!(compile("   \n ").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_function_reports_line() {
        let err = compile("\n  eror('x')").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, Some(3));
        assert!(err.message.contains("eror"));
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = compile("error('a')\nerror('b'").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.starts_with("invalid syntax"));
    }

    #[test]
    fn test_arity_is_checked() {
        let err = compile("error('a', 'b')").unwrap_err();
        assert_eq!(err.message, "error() takes 1 argument(s), 2 given");
    }

    #[test]
    fn test_placeholder_count_is_checked() {
        let err = compile("error('%s and %s' % ptr)").unwrap_err();
        assert_eq!(err.message, "format string expects 2 argument(s), 1 given");
    }

    #[test]
    fn test_unknown_variable_fails_at_run_time_with_file_line() {
        let compiler = ScriptCompiler::default();
        let script = compiler
            .compile_script(source("\nerror('bad %s' % q)", 7))
            .unwrap();
        let err = script.run(&mut RecordingEnv::new()).unwrap_err();
        assert_eq!(err.line, 9);
        assert_eq!(err.message, "name 'q' is not defined");
    }

    #[test]
    fn test_number_placeholder_rejects_strings() {
        let err = format_template("%d", &[Value::Str("x".into())]).unwrap_err();
        assert!(err.contains("number is required"));
    }
}
