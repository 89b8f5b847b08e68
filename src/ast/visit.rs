//! Kind-dispatch traversal over the AST.
//!
//! [`Node`] is a closed set of borrowed node kinds. [`Checker::accept`] walks
//! the tree in post-order (children before their parent) and hands every
//! node to a [`Visitor`], which matches on the kind it cares about.

use std::convert::Infallible;

use super::{
    Checker, Clause, Decl, Fragment, NamedPattern, Outcome, Pattern, PatternRule, Sm,
    StateClause,
};

#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Checker(&'a Checker),
    Sm(&'a Sm),
    Decl(&'a Decl),
    NamedPattern(&'a NamedPattern),
    StateClause(&'a StateClause),
    PatternRule(&'a PatternRule),
    Pattern(&'a Pattern),
    Outcome(&'a Outcome),
    Fragment(&'a Fragment),
}

pub trait Visitor<'a> {
    type Error;

    fn visit(&mut self, node: Node<'a>) -> Result<(), Self::Error>;
}

impl Checker {
    /// Walks the whole tree in post-order, stopping at the first error.
    pub fn accept<'a, V: Visitor<'a>>(&'a self, visitor: &mut V) -> Result<(), V::Error> {
        for sm in &self.sms {
            walk_sm(sm, visitor)?;
        }
        visitor.visit(Node::Checker(self))
    }
}

fn walk_sm<'a, V: Visitor<'a>>(sm: &'a Sm, visitor: &mut V) -> Result<(), V::Error> {
    for clause in &sm.clauses {
        match clause {
            Clause::Decl(decl) => visitor.visit(Node::Decl(decl))?,
            Clause::NamedPattern(named) => {
                walk_pattern(&named.pattern, visitor)?;
                visitor.visit(Node::NamedPattern(named))?;
            }
            Clause::Fragment(fragment) => visitor.visit(Node::Fragment(fragment))?,
            Clause::State(state) => {
                for rule in &state.rules {
                    walk_rule(rule, visitor)?;
                }
                visitor.visit(Node::StateClause(state))?;
            }
        }
    }
    visitor.visit(Node::Sm(sm))
}

fn walk_rule<'a, V: Visitor<'a>>(rule: &'a PatternRule, visitor: &mut V) -> Result<(), V::Error> {
    walk_pattern(&rule.pattern, visitor)?;
    for outcome in &rule.outcomes {
        walk_outcome(outcome, visitor)?;
    }
    visitor.visit(Node::PatternRule(rule))
}

fn walk_pattern<'a, V: Visitor<'a>>(pattern: &'a Pattern, visitor: &mut V) -> Result<(), V::Error> {
    if let Pattern::Or(left, right) = pattern {
        walk_pattern(left, visitor)?;
        walk_pattern(right, visitor)?;
    }
    visitor.visit(Node::Pattern(pattern))
}

fn walk_outcome<'a, V: Visitor<'a>>(outcome: &'a Outcome, visitor: &mut V) -> Result<(), V::Error> {
    match outcome {
        Outcome::Boolean { outcome: inner, .. } => walk_outcome(inner, visitor)?,
        Outcome::Fragment(fragment) => visitor.visit(Node::Fragment(fragment))?,
        Outcome::TransitionTo(_) => {}
    }
    visitor.visit(Node::Outcome(outcome))
}

/// Gathers every fragment, wherever it is nested.
#[derive(Default)]
pub(crate) struct FragmentCollector<'a> {
    pub(crate) fragments: Vec<&'a Fragment>,
}

impl<'a> Visitor<'a> for FragmentCollector<'a> {
    type Error = Infallible;

    fn visit(&mut self, node: Node<'a>) -> Result<(), Self::Error> {
        if let Node::Fragment(fragment) = node {
            self.fragments.push(fragment);
        }
        Ok(())
    }
}
