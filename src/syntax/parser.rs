//! `.sm` Parser
//!
//! Deterministic recursive descent over the scanner's token stream, one
//! token of lookahead. The grammar:
//!
//! ```text
//! checker   := sm+
//! sm        := 'sm' ID '{' clause* '}'
//! clause    := ['stateful'] 'decl' ('any_pointer'|'any_expr') ID ';'
//!            | 'pat' ID pattern ';'
//!            | CODE
//!            | statename (',' statename)* ':' rule ('|' rule)* ';'
//! statename := ID ['.' (ID|'*')] | '*'
//! rule      := pattern '=>' outcome (',' outcome)*
//! pattern   := ('{' cpattern '}' | ID | DOLLARPAT) ['|' pattern]
//! outcome   := statename | ('true'|'false') '=' outcome | CODE
//! ```
//!
//! There is no error recovery: the first unexpected token aborts the parse.
//! Fragments are kept as raw text here; compiling them is a later pass.

use tracing::debug;

use crate::ast::{
    Checker, Clause, Decl, DeclKind, Fragment, NamedPattern, Operand, Outcome, Pattern,
    PatternRule, Sm, SpecialPattern, StateClause, StateName,
};
use crate::diagnostics::SmError;
use crate::syntax::lexer::Scanner;
use crate::syntax::token::{Keyword, Token, TokenKind};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses rule-file text into a [`Checker`] without compiling fragments.
///
/// Every call owns a fresh scanner and line counter.
pub fn parse_checker(source: &str) -> Result<Checker, SmError> {
    let checker = Parser::new(source).checker()?;
    debug!(sms = checker.sms.len(), "parsed rule file");
    Ok(checker)
}

// ============================================================================
// PARSER STATE
// ============================================================================

struct Parser<'src> {
    source: &'src str,
    tokens: Scanner<'src>,
    lookahead: Option<Token>,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        Self {
            source,
            tokens: Scanner::new(source),
            lookahead: None,
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, SmError> {
        if self.lookahead.is_none() {
            self.lookahead = self.tokens.next().transpose()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>, SmError> {
        Ok(self.peek()?.map(|token| token.kind.clone()))
    }

    fn at(&mut self, kind: &TokenKind) -> Result<bool, SmError> {
        Ok(self.peek()?.is_some_and(|token| token.is(kind)))
    }

    /// Consumes the next token; running out of input is a syntax error.
    fn bump(&mut self) -> Result<Token, SmError> {
        self.peek()?;
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => Err(self.end_of_input()),
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<Option<Token>, SmError> {
        if self.at(kind)? {
            self.bump().map(Some)
        } else {
            Ok(None)
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, SmError> {
        let token = self.bump()?;
        if token.is(&kind) {
            Ok(token)
        } else {
            Err(self.unexpected(&token, kind.describe()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Token, SmError> {
        let token = self.bump()?;
        if token.is_keyword(keyword) {
            Ok(token)
        } else {
            Err(self.unexpected(&token, &format!("'{}'", keyword.as_str())))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Token), SmError> {
        let token = self.bump()?;
        match &token.kind {
            TokenKind::Ident(name) => Ok((name.clone(), token)),
            _ => Err(self.unexpected(&token, "identifier")),
        }
    }

    fn unexpected(&self, token: &Token, expected: &str) -> SmError {
        SmError::syntax(
            self.source,
            token.span.start,
            token.lexeme(self.source),
            format!("Parse error, expected {}", expected),
        )
    }

    fn end_of_input(&self) -> SmError {
        SmError::syntax(self.source, self.source.len(), "", "Unexpected end of input")
    }

    // ========================================================================
    // HIGH-LEVEL RULES
    // ========================================================================

    fn checker(&mut self) -> Result<Checker, SmError> {
        let mut sms: Vec<Sm> = Vec::new();
        loop {
            let (sm, name_token) = self.sm()?;
            if sms.iter().any(|existing| existing.name == sm.name) {
                return Err(SmError::syntax(
                    self.source,
                    name_token.span.start,
                    name_token.lexeme(self.source),
                    format!("Duplicate state machine '{}'", sm.name),
                ));
            }
            sms.push(sm);
            if self.peek()?.is_none() {
                break;
            }
        }
        Ok(Checker::new(sms))
    }

    fn sm(&mut self) -> Result<(Sm, Token), SmError> {
        let start = self.expect_keyword(Keyword::Sm)?;
        let (name, name_token) = self.expect_ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut clauses: Vec<Clause> = Vec::new();
        while !self.at(&TokenKind::RBrace)? {
            let clause = self.clause(&clauses)?;
            clauses.push(clause);
        }
        let end = self.expect(TokenKind::RBrace)?;

        let sm = Sm {
            name,
            clauses,
            span: start.span.to(end.span),
        };
        Ok((sm, name_token))
    }

    fn clause(&mut self, earlier: &[Clause]) -> Result<Clause, SmError> {
        match self.peek_kind()? {
            Some(TokenKind::Keyword(Keyword::Stateful | Keyword::Decl)) => {
                self.decl(earlier).map(Clause::Decl)
            }
            Some(TokenKind::Keyword(Keyword::Pat)) => self.named_pattern().map(Clause::NamedPattern),
            Some(TokenKind::Code(_)) => {
                let token = self.bump()?;
                Ok(Clause::Fragment(fragment(self.source, token)))
            }
            Some(TokenKind::Ident(_) | TokenKind::Star) => self.state_clause().map(Clause::State),
            Some(_) => {
                let token = self.bump()?;
                Err(self.unexpected(&token, "a clause or '}'"))
            }
            None => Err(self.end_of_input()),
        }
    }

    // ========================================================================
    // DECLARATIONS
    // ========================================================================

    /// Declaration names must be unique within their `sm` block.
    fn decl(&mut self, earlier: &[Clause]) -> Result<Decl, SmError> {
        let stateful = self.eat(&TokenKind::Keyword(Keyword::Stateful))?;
        let decl_token = self.expect_keyword(Keyword::Decl)?;

        let kind_token = self.bump()?;
        let kind = match kind_token.kind {
            TokenKind::Keyword(Keyword::AnyPointer) => DeclKind::AnyPointer,
            TokenKind::Keyword(Keyword::AnyExpr) => DeclKind::AnyExpr,
            _ => return Err(self.unexpected(&kind_token, "'any_pointer' or 'any_expr'")),
        };
        let (name, name_token) = self.expect_ident()?;
        let duplicate = earlier
            .iter()
            .any(|clause| matches!(clause, Clause::Decl(existing) if existing.name == name));
        if duplicate {
            return Err(SmError::syntax(
                self.source,
                name_token.span.start,
                name_token.lexeme(self.source),
                format!("Duplicate declaration of '{}'", name),
            ));
        }
        let end = self.expect(TokenKind::Semicolon)?;

        let start = stateful.as_ref().unwrap_or(&decl_token).span;
        Ok(Decl {
            kind,
            name,
            stateful: stateful.is_some(),
            span: start.to(end.span),
        })
    }

    fn named_pattern(&mut self) -> Result<NamedPattern, SmError> {
        let start = self.expect_keyword(Keyword::Pat)?;
        let (name, _) = self.expect_ident()?;
        let pattern = self.pattern()?;
        let end = self.expect(TokenKind::Semicolon)?;
        Ok(NamedPattern {
            name,
            pattern,
            span: start.span.to(end.span),
        })
    }

    // ========================================================================
    // STATE CLAUSES AND RULES
    // ========================================================================

    fn state_clause(&mut self) -> Result<StateClause, SmError> {
        let first = self.bump()?;
        let start = first.span;
        let mut states = vec![self.state_name(first)?];
        while self.eat(&TokenKind::Comma)?.is_some() {
            let token = self.bump()?;
            states.push(self.state_name(token)?);
        }
        self.expect(TokenKind::Colon)?;

        let mut rules = vec![self.rule()?];
        while self.eat(&TokenKind::Pipe)?.is_some() {
            rules.push(self.rule()?);
        }
        let end = self.expect(TokenKind::Semicolon)?;

        Ok(StateClause {
            states,
            rules,
            span: start.to(end.span),
        })
    }

    /// Finishes a state name whose first token has already been consumed.
    fn state_name(&mut self, first: Token) -> Result<StateName, SmError> {
        match first.kind {
            TokenKind::Star => Ok(StateName::new("*")),
            TokenKind::Ident(var) => {
                if self.eat(&TokenKind::Dot)?.is_none() {
                    return Ok(StateName::new(var));
                }
                let token = self.bump()?;
                match token.kind {
                    TokenKind::Ident(state) => Ok(StateName::new(format!("{}.{}", var, state))),
                    TokenKind::Star => Ok(StateName::new(format!("{}.*", var))),
                    _ => Err(self.unexpected(&token, "state name or '*'")),
                }
            }
            _ => Err(self.unexpected(&first, "state name")),
        }
    }

    fn rule(&mut self) -> Result<PatternRule, SmError> {
        let pattern = self.pattern()?;
        self.expect(TokenKind::Action)?;
        let mut outcomes = vec![self.outcome()?];
        while self.eat(&TokenKind::Comma)?.is_some() {
            outcomes.push(self.outcome()?);
        }
        Ok(PatternRule { pattern, outcomes })
    }

    // ========================================================================
    // PATTERNS
    // ========================================================================

    /// `a | b | c` nests to the right: `Or(a, Or(b, c))`.
    fn pattern(&mut self) -> Result<Pattern, SmError> {
        let left = self.primary_pattern()?;
        if self.eat(&TokenKind::Pipe)?.is_some() {
            let right = self.pattern()?;
            return Ok(Pattern::Or(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn primary_pattern(&mut self) -> Result<Pattern, SmError> {
        let token = self.bump()?;
        match &token.kind {
            TokenKind::LBrace => {
                let pattern = self.c_pattern()?;
                self.expect(TokenKind::RBrace)?;
                Ok(pattern)
            }
            TokenKind::Ident(name) => Ok(Pattern::NamedPatternReference { name: name.clone() }),
            TokenKind::DollarPattern(name) => match SpecialPattern::from_name(name) {
                Some(special) => Ok(Pattern::Special(special)),
                None => Err(SmError::syntax(
                    self.source,
                    token.span.start,
                    token.lexeme(self.source),
                    format!("Unknown special pattern '${}$'", name),
                )),
            },
            _ => Err(self.unexpected(&token, "'{', pattern name or special pattern")),
        }
    }

    /// The C-level pattern inside `{ ... }`. A bare identifier is a usage
    /// only once the next token rules out every longer form.
    fn c_pattern(&mut self) -> Result<Pattern, SmError> {
        let token = self.bump()?;
        let lhs = match token.kind {
            TokenKind::Star => {
                let (var, _) = self.expect_ident()?;
                return Ok(Pattern::VarDereference { var });
            }
            TokenKind::Ident(name) => name,
            _ => return Err(self.unexpected(&token, "identifier or '*'")),
        };

        match self.peek_kind()? {
            Some(TokenKind::Assign) => {
                self.bump()?;
                self.assignment(lhs)
            }
            Some(TokenKind::LParen) => {
                self.bump()?;
                let args = self.call_args()?;
                Ok(Pattern::ArgsOfFnCall { fnname: lhs, args })
            }
            Some(TokenKind::Comparison(op)) => {
                self.bump()?;
                let rhs_token = self.bump()?;
                let rhs = match rhs_token.kind {
                    TokenKind::Number(value) => Operand::Int(value),
                    TokenKind::Ident(name) => Operand::Ident(name),
                    _ => return Err(self.unexpected(&rhs_token, "number or identifier")),
                };
                Ok(Pattern::Comparison { lhs, op, rhs })
            }
            Some(TokenKind::LSquare) => {
                self.bump()?;
                let (index, _) = self.expect_ident()?;
                self.expect(TokenKind::RSquare)?;
                Ok(Pattern::ArrayLookup { array: lhs, index })
            }
            _ => Ok(Pattern::VarUsage { var: lhs }),
        }
    }

    /// After `lhs =`: a literal, a plain identifier, or a call.
    fn assignment(&mut self, lhs: String) -> Result<Pattern, SmError> {
        let token = self.bump()?;
        let rhs = match token.kind {
            TokenKind::Str(text) => Operand::Str(text),
            TokenKind::Number(value) => Operand::Int(value),
            TokenKind::Ident(name) => {
                if self.eat(&TokenKind::LParen)?.is_some() {
                    let args = self.call_args()?;
                    return Ok(Pattern::ResultOfFnCall {
                        lhs,
                        fnname: name,
                        args,
                    });
                }
                Operand::Ident(name)
            }
            _ => return Err(self.unexpected(&token, "string, number or identifier")),
        };
        Ok(Pattern::Assignment { lhs, rhs })
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn call_args(&mut self) -> Result<Vec<Operand>, SmError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen)?.is_some() {
            return Ok(args);
        }
        loop {
            let token = self.bump()?;
            let arg = match token.kind {
                TokenKind::Ident(name) => Operand::Ident(name),
                TokenKind::Str(text) => Operand::Str(text),
                TokenKind::Number(value) => Operand::Int(value),
                _ => return Err(self.unexpected(&token, "argument")),
            };
            args.push(arg);
            if self.eat(&TokenKind::Comma)?.is_none() {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    // ========================================================================
    // OUTCOMES
    // ========================================================================

    fn outcome(&mut self) -> Result<Outcome, SmError> {
        let token = self.bump()?;
        match token.kind {
            TokenKind::Keyword(Keyword::True) | TokenKind::Keyword(Keyword::False) => {
                let guard = token.is_keyword(Keyword::True);
                self.expect(TokenKind::Assign)?;
                let outcome = self.outcome()?;
                Ok(Outcome::Boolean {
                    guard,
                    outcome: Box::new(outcome),
                })
            }
            TokenKind::Code(_) => Ok(Outcome::Fragment(fragment(self.source, token))),
            TokenKind::Ident(_) | TokenKind::Star => self.state_name(token).map(Outcome::TransitionTo),
            _ => Err(self.unexpected(&token, "state name, 'true', 'false' or code block")),
        }
    }
}

/// Builds a fragment from a code-block token, remembering where its text
/// starts on the `{{` line.
fn fragment(source: &str, token: Token) -> Fragment {
    let before = source.get(..token.span.start).unwrap_or("");
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    let column_offset = before.get(line_start..).map_or(0, |prefix| prefix.chars().count()) + 2;
    let text = match token.kind {
        TokenKind::Code(text) => text,
        _ => String::new(),
    };
    Fragment::new(text, token.line).with_column_offset(column_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::CmpOp;

    fn only_rules(source: &str) -> Vec<PatternRule> {
        let checker = parse_checker(source).unwrap();
        match &checker.sms[0].clauses[0] {
            Clause::State(clause) => clause.rules.clone(),
            other => panic!("expected a state clause, got {:?}", other),
        }
    }

    #[test]
    fn test_bare_identifier_is_usage() {
        let rules = only_rules("sm m { ptr.free: { ptr } => ptr.bad; }");
        assert_eq!(rules[0].pattern, Pattern::VarUsage { var: "ptr".into() });
    }

    #[test]
    fn test_comparison_is_not_usage() {
        let rules = only_rules("sm m { a.b: { ptr == 0 } => a.c; }");
        assert_eq!(
            rules[0].pattern,
            Pattern::Comparison {
                lhs: "ptr".into(),
                op: CmpOp::Eq,
                rhs: Operand::Int(0),
            }
        );
    }

    #[test]
    fn test_assignment_forms() {
        let rules = only_rules(
            "sm m { a.b: { q = 0 } => a.c | { q = 'x' } => a.c | { q = r } => a.c \
             | { q = malloc(n, 'k', 4) } => a.c; }",
        );
        assert_eq!(
            rules[0].pattern,
            Pattern::Assignment { lhs: "q".into(), rhs: Operand::Int(0) }
        );
        assert_eq!(
            rules[1].pattern,
            Pattern::Assignment { lhs: "q".into(), rhs: Operand::Str("x".into()) }
        );
        assert_eq!(
            rules[2].pattern,
            Pattern::Assignment { lhs: "q".into(), rhs: Operand::Ident("r".into()) }
        );
        assert_eq!(
            rules[3].pattern,
            Pattern::ResultOfFnCall {
                lhs: "q".into(),
                fnname: "malloc".into(),
                args: vec![
                    Operand::Ident("n".into()),
                    Operand::Str("k".into()),
                    Operand::Int(4),
                ],
            }
        );
    }

    #[test]
    fn test_call_without_arguments() {
        let rules = only_rules("sm m { a.b: { ptr = malloc() } => a.c | { f() } => a.d; }");
        assert_eq!(
            rules[0].pattern,
            Pattern::ResultOfFnCall { lhs: "ptr".into(), fnname: "malloc".into(), args: vec![] }
        );
        assert_eq!(
            rules[1].pattern,
            Pattern::ArgsOfFnCall { fnname: "f".into(), args: vec![] }
        );
    }

    #[test]
    fn test_dereference_and_lookup() {
        let rules = only_rules("sm m { a.b: { *ptr } => a.c | { arr[i] } => a.d; }");
        assert_eq!(rules[0].pattern, Pattern::VarDereference { var: "ptr".into() });
        assert_eq!(
            rules[1].pattern,
            Pattern::ArrayLookup { array: "arr".into(), index: "i".into() }
        );
    }

    #[test]
    fn test_or_pattern_nests_right() {
        let rules = only_rules("sm m { a.b: $leaked$ | x | { y } => a.c; }");
        assert_eq!(
            rules[0].pattern,
            Pattern::Or(
                Box::new(Pattern::Special(SpecialPattern::Leaked)),
                Box::new(Pattern::Or(
                    Box::new(Pattern::NamedPatternReference { name: "x".into() }),
                    Box::new(Pattern::VarUsage { var: "y".into() }),
                )),
            )
        );
    }

    #[test]
    fn test_fragment_records_column_of_its_text() {
        let rules = only_rules("sm a {\n  p.s: { p } => {{ eror('x') }};\n}");
        match &rules[0].outcomes[0] {
            Outcome::Fragment(fragment) => {
                assert_eq!(fragment.line_offset, 1);
                assert_eq!(fragment.column_offset, 18);
            }
            other => panic!("expected a fragment, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_boolean_outcome() {
        let rules = only_rules("sm m { a.b: { x } => true=false=a.c; }");
        assert_eq!(
            rules[0].outcomes,
            vec![Outcome::Boolean {
                guard: true,
                outcome: Box::new(Outcome::Boolean {
                    guard: false,
                    outcome: Box::new(Outcome::TransitionTo(StateName::new("a.c"))),
                }),
            }]
        );
    }

    #[test]
    fn test_unknown_special_pattern_is_rejected() {
        let err = parse_checker("sm m { a.b: $vanished$ => a.c; }").unwrap_err();
        let located = err.source_error().unwrap();
        assert_eq!(located.value, "$vanished$");
        assert!(matches!(err, SmError::Syntax(_)));
    }

    #[test]
    fn test_duplicate_decl_points_at_second_name() {
        let source = "sm m {\n decl any_expr x;\n decl any_pointer x;\n}";
        let err = parse_checker(source).unwrap_err();
        let located = err.source_error().unwrap();
        assert_eq!(located.line(), 2);
        assert_eq!(located.value, "x");
        assert_eq!(located.column(), 18);
    }

    #[test]
    fn test_duplicate_sm_name_is_rejected() {
        let err = parse_checker("sm a { } sm a { }").unwrap_err();
        assert_eq!(err.source_error().unwrap().offset, 12);
    }

    #[test]
    fn test_empty_input_is_end_of_input_error() {
        let err = parse_checker("").unwrap_err();
        let located = err.source_error().unwrap();
        assert_eq!(located.offset, 0);
        assert_eq!(located.message, "Unexpected end of input");
    }

    #[test]
    fn test_truncated_clause_is_end_of_input_error() {
        let err = parse_checker("sm m { ptr.a: { ptr } =>").unwrap_err();
        assert!(matches!(err, SmError::Syntax(_)));
        assert_eq!(err.source_error().unwrap().offset, 24);
    }
}
