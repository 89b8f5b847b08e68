//! Abstract syntax tree for `.sm` rule files.
//!
//! Every node is owned by its parent and the whole tree by the [`Checker`].
//! Nodes are built once by the parser and never change afterwards, with two
//! exceptions that are each written exactly once after parsing: the
//! checker's filename and each [`Fragment`]'s compiled unit.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::fragment::CompiledFragment;
use crate::syntax::{CmpOp, Span};

pub mod visit;

pub use visit::{Node, Visitor};

/// Root of a parsed rule file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checker {
    pub sms: Vec<Sm>,
    filename: Option<PathBuf>,
}

impl Checker {
    pub fn new(sms: Vec<Sm>) -> Self {
        Self {
            sms,
            filename: None,
        }
    }

    /// The rule file this checker was read from, if it came from a file.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Records the originating file. Only the first call has any effect.
    pub(crate) fn set_filename(&mut self, path: PathBuf) {
        self.filename.get_or_insert(path);
    }

    pub fn sm(&self, name: &str) -> Option<&Sm> {
        self.sms.iter().find(|sm| sm.name == name)
    }

    /// Every fragment in the tree, in post-order.
    pub fn fragments(&self) -> Vec<&Fragment> {
        let mut collector = visit::FragmentCollector::default();
        match self.accept(&mut collector) {
            Ok(()) => collector.fragments,
            Err(never) => match never {},
        }
    }
}

/// One `sm NAME { ... }` block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sm {
    pub name: String,
    pub clauses: Vec<Clause>,
    pub span: Span,
}

impl Sm {
    pub fn decls(&self) -> impl Iterator<Item = &Decl> {
        self.clauses.iter().filter_map(|clause| match clause {
            Clause::Decl(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn decl(&self, name: &str) -> Option<&Decl> {
        self.decls().find(|decl| decl.name == name)
    }

    pub fn named_patterns(&self) -> impl Iterator<Item = &NamedPattern> {
        self.clauses.iter().filter_map(|clause| match clause {
            Clause::NamedPattern(pattern) => Some(pattern),
            _ => None,
        })
    }

    pub fn named_pattern(&self, name: &str) -> Option<&NamedPattern> {
        self.named_patterns().find(|pattern| pattern.name == name)
    }

    pub fn state_clauses(&self) -> impl Iterator<Item = &StateClause> {
        self.clauses.iter().filter_map(|clause| match clause {
            Clause::State(state) => Some(state),
            _ => None,
        })
    }

    /// States `var` can be moved into: the distinct `TransitionTo` targets
    /// whose variable part is `var`, in first-seen order.
    pub fn reachable_states(&self, var: &str) -> Vec<&StateName> {
        let mut states: Vec<&StateName> = Vec::new();
        for rule in self.state_clauses().flat_map(|clause| &clause.rules) {
            for outcome in &rule.outcomes {
                if let Some(target) = outcome.transition_target() {
                    if target.var() == Some(var) && !states.contains(&target) {
                        states.push(target);
                    }
                }
            }
        }
        states
    }

    /// Named-pattern references with no `pat` definition in this block.
    ///
    /// Resolution is not part of parsing; this is a query for consumers.
    pub fn unresolved_references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let patterns = self
            .named_patterns()
            .map(|named| &named.pattern)
            .chain(
                self.state_clauses()
                    .flat_map(|clause| &clause.rules)
                    .map(|rule| &rule.pattern),
            );
        for pattern in patterns {
            for name in pattern.references() {
                if self.named_pattern(name).is_none() && !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Clause {
    Decl(Decl),
    NamedPattern(NamedPattern),
    /// A free-floating `{{ ... }}` block between clauses.
    Fragment(Fragment),
    State(StateClause),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    AnyPointer,
    AnyExpr,
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::AnyPointer => "any_pointer",
            DeclKind::AnyExpr => "any_expr",
        }
    }
}

/// `[stateful] decl KIND NAME;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decl {
    pub kind: DeclKind,
    pub name: String,
    pub stateful: bool,
    pub span: Span,
}

/// `pat NAME pattern;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedPattern {
    pub name: String,
    pub pattern: Pattern,
    pub span: Span,
}

/// `states : rule | rule ... ;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateClause {
    pub states: Vec<StateName>,
    /// Tried in source order; the first matching rule applies.
    pub rules: Vec<PatternRule>,
    pub span: Span,
}

/// A state name exactly as written: `var.state`, `state`, `var.*` or `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StateName(String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `*` or `var.*`.
    pub fn is_wildcard(&self) -> bool {
        self.0 == "*" || self.0.ends_with(".*")
    }

    /// The variable part of a dotted name.
    pub fn var(&self) -> Option<&str> {
        self.0.split_once('.').map(|(var, _)| var)
    }

    /// The state part: after the dot, or the whole name when undotted.
    pub fn state(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(_, state)| state)
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for StateName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// `pattern => outcome, outcome ...`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternRule {
    pub pattern: Pattern,
    pub outcomes: Vec<Outcome>,
}

/// Literal or identifier on the value side of a C-level pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Operand {
    Ident(String),
    Str(String),
    Int(u64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Ident(name) => f.write_str(name),
            Operand::Str(text) => write!(f, "'{}'", text),
            Operand::Int(value) => write!(f, "{}", value),
        }
    }
}

/// Built-in sentinel patterns, written `$name$`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialPattern {
    /// The tracked value became unreachable.
    Leaked,
}

impl SpecialPattern {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "leaked" => Some(SpecialPattern::Leaked),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpecialPattern::Leaked => "leaked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Pattern {
    /// `{ lhs = rhs }`
    Assignment { lhs: String, rhs: Operand },
    /// `{ lhs = fnname(args) }`
    ResultOfFnCall {
        lhs: String,
        fnname: String,
        args: Vec<Operand>,
    },
    /// `{ fnname(args) }`
    ArgsOfFnCall { fnname: String, args: Vec<Operand> },
    /// `{ lhs OP rhs }`
    Comparison { lhs: String, op: CmpOp, rhs: Operand },
    /// `{ *var }`
    VarDereference { var: String },
    /// `{ array[index] }`
    ArrayLookup { array: String, index: String },
    /// `{ var }`
    VarUsage { var: String },
    /// A bare identifier naming a `pat` definition.
    NamedPatternReference { name: String },
    Special(SpecialPattern),
    /// Matches if either side matches, left first.
    Or(Box<Pattern>, Box<Pattern>),
}

impl Pattern {
    /// Names of all `pat` definitions this pattern refers to.
    pub fn references(&self) -> Vec<&str> {
        match self {
            Pattern::NamedPatternReference { name } => vec![name.as_str()],
            Pattern::Or(left, right) => {
                let mut names = left.references();
                names.extend(right.references());
                names
            }
            _ => vec![],
        }
    }

    /// The alternatives of an `Or` chain, left to right.
    pub fn alternatives(&self) -> Vec<&Pattern> {
        match self {
            Pattern::Or(left, right) => {
                let mut alternatives = left.alternatives();
                alternatives.extend(right.alternatives());
                alternatives
            }
            other => vec![other],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Outcome {
    TransitionTo(StateName),
    /// Applies only along the `guard` branch of a boolean-valued match.
    Boolean { guard: bool, outcome: Box<Outcome> },
    Fragment(Fragment),
}

impl Outcome {
    /// The state this outcome moves to, looking through boolean guards.
    pub fn transition_target(&self) -> Option<&StateName> {
        match self {
            Outcome::TransitionTo(state) => Some(state),
            Outcome::Boolean { outcome, .. } => outcome.transition_target(),
            Outcome::Fragment(_) => None,
        }
    }
}

/// An embedded `{{ ... }}` code block.
#[derive(Clone, Serialize)]
pub struct Fragment {
    /// Text between the braces, verbatim.
    pub source: String,
    /// 0-based line of the rule file holding the opening `{{`.
    pub line_offset: usize,
    /// Characters on that line before the fragment text, `{{` included.
    pub column_offset: usize,
    #[serde(skip)]
    compiled: OnceCell<Arc<dyn CompiledFragment>>,
}

impl Fragment {
    pub fn new(source: impl Into<String>, line_offset: usize) -> Self {
        Self {
            source: source.into(),
            line_offset,
            column_offset: 0,
            compiled: OnceCell::new(),
        }
    }

    pub fn with_column_offset(mut self, column_offset: usize) -> Self {
        self.column_offset = column_offset;
        self
    }

    /// The compiled unit, present once the fragment pass has run.
    pub fn compiled(&self) -> Option<&Arc<dyn CompiledFragment>> {
        self.compiled.get()
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Stores the compiled unit. Returns `false` if one was already set.
    pub(crate) fn set_compiled(&self, unit: Arc<dyn CompiledFragment>) -> bool {
        self.compiled.set(unit).is_ok()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("source", &self.source)
            .field("line_offset", &self.line_offset)
            .field("column_offset", &self.column_offset)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// Fragments compare by text and position; the compiled unit is ignored.
impl PartialEq for Fragment {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.line_offset == other.line_offset
            && self.column_offset == other.column_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(name: &str) -> Outcome {
        Outcome::TransitionTo(StateName::new(name))
    }

    #[test]
    fn test_state_name_parts() {
        let dotted = StateName::new("ptr.null");
        assert_eq!(dotted.var(), Some("ptr"));
        assert_eq!(dotted.state(), "null");
        assert!(!dotted.is_wildcard());

        assert!(StateName::new("*").is_wildcard());
        assert!(StateName::new("ptr.*").is_wildcard());
        assert_eq!(StateName::new("start").var(), None);
        assert_eq!(StateName::new("start").state(), "start");
    }

    #[test]
    fn test_transition_target_looks_through_guards() {
        let outcome = Outcome::Boolean {
            guard: true,
            outcome: Box::new(transition("ptr.null")),
        };
        assert_eq!(
            outcome.transition_target().map(StateName::as_str),
            Some("ptr.null")
        );
        assert!(Outcome::Fragment(Fragment::new("x", 0))
            .transition_target()
            .is_none());
    }

    #[test]
    fn test_or_alternatives_are_flattened_in_order() {
        let pattern = Pattern::Or(
            Box::new(Pattern::Special(SpecialPattern::Leaked)),
            Box::new(Pattern::Or(
                Box::new(Pattern::VarUsage { var: "a".into() }),
                Box::new(Pattern::NamedPatternReference { name: "b".into() }),
            )),
        );
        assert_eq!(pattern.alternatives().len(), 3);
        assert_eq!(pattern.references(), vec!["b"]);
    }

    #[test]
    fn test_fragment_equality_ignores_compiled_unit() {
        let a = Fragment::new(" error('x') ", 3);
        let b = Fragment::new(" error('x') ", 3);
        assert_eq!(a, b);
        assert_ne!(a, Fragment::new(" error('x') ", 4));
        assert!(!a.is_compiled());
    }

    #[test]
    fn test_filename_is_set_once() {
        let mut checker = Checker::new(vec![]);
        checker.set_filename(PathBuf::from("a.sm"));
        checker.set_filename(PathBuf::from("b.sm"));
        assert_eq!(checker.filename(), Some(Path::new("a.sm")));
    }
}
