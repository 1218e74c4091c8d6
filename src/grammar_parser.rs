//! Recursive descent parser for tokenized grammar sources
//!
//! Consumes one file's token stream and produces a [`GrammarFile`]: the rule
//! list, the recorded imports, and the dialect selected by the file's single
//! `!syntax` tag. Precedence is standard BNF: repetition binds tightest,
//! then concatenation, then alternation, with `( )` grouping and `[ ]`
//! optional groups.

use crate::ast::{fold_name, Expr, GrammarFile, Rule};
use crate::dialect::{AlternationToken, DialectProfile, RuleNameForm};
use crate::error::{ConfigError, EngineError, ParseError, ParseErrorKind};
use crate::token::{Directive, Lexer, Pos, Token};

/// Tokenize and parse one grammar source.
pub fn parse_grammar_file(source: &str, origin: &str) -> Result<GrammarFile, EngineError> {
    let output = Lexer::new(source, origin).tokenize()?;

    let mut syntax: Option<(String, Pos)> = None;
    let mut imports = Vec::new();
    for directive in output.directives {
        match directive {
            Directive::Syntax { name, pos } => {
                if syntax.is_some() {
                    return Err(ConfigError::MultipleSyntax {
                        origin: origin.to_string(),
                        line: pos.line,
                        column: pos.column,
                    }
                    .into());
                }
                syntax = Some((name, pos));
            }
            Directive::Import(import) => imports.push(import),
        }
    }

    let (dialect_name, syntax_pos) = syntax.ok_or_else(|| ConfigError::MissingSyntax {
        origin: origin.to_string(),
    })?;
    let dialect = DialectProfile::lookup(&dialect_name).ok_or_else(|| {
        ConfigError::UnknownDialect {
            origin: origin.to_string(),
            line: syntax_pos.line,
            column: syntax_pos.column,
            name: dialect_name,
        }
    })?;

    let mut parser = Parser {
        tokens: output.tokens,
        pos: 0,
        origin: origin.to_string(),
        dialect,
    };
    let rules = parser.parse_rule_list()?;

    Ok(GrammarFile {
        origin: origin.to_string(),
        dialect,
        rules,
        imports,
    })
}

struct Parser {
    tokens: Vec<(Token, Pos)>,
    pos: usize,
    origin: String,
    dialect: &'static DialectProfile,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|(t, _)| t)
            .unwrap_or(&Token::Eof)
    }

    fn here(&self) -> Pos {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, p)| *p)
            .unwrap_or(Pos { line: 1, column: 1 })
    }

    fn consume(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn err(&self, kind: ParseErrorKind) -> EngineError {
        self.err_at(self.here(), kind)
    }

    fn err_at(&self, pos: Pos, kind: ParseErrorKind) -> EngineError {
        ParseError {
            origin: self.origin.clone(),
            line: pos.line,
            column: pos.column,
            kind,
        }
        .into()
    }

    fn unexpected(&self, expected: &str) -> EngineError {
        match self.peek() {
            Token::Eof => self.err(ParseErrorKind::UnexpectedEndOfInput {
                expected: expected.to_string(),
            }),
            found => self.err(ParseErrorKind::UnexpectedToken {
                found: describe(found),
                expected: expected.to_string(),
            }),
        }
    }

    fn parse_rule_list(&mut self) -> Result<Vec<Rule>, EngineError> {
        let mut rules: Vec<Rule> = Vec::new();

        loop {
            while *self.peek() == Token::RuleEnd {
                self.consume();
            }
            if *self.peek() == Token::Eof {
                break;
            }
            self.parse_rule(&mut rules)?;
        }

        Ok(rules)
    }

    // rule := name ("=" | "=/") alternation RuleEnd
    fn parse_rule(&mut self, rules: &mut Vec<Rule>) -> Result<(), EngineError> {
        let head_pos = self.here();
        let (name, angled) = match self.peek().clone() {
            Token::Name { text, angled } => {
                self.consume();
                (text, angled)
            }
            _ => return Err(self.unexpected("rule name")),
        };
        self.check_rule_name(&name, angled)?;

        let incremental = match self.peek() {
            Token::DefinedAs => {
                self.consume();
                false
            }
            Token::IncAlternative => {
                self.consume();
                true
            }
            _ => return Err(self.unexpected("\"=\"")),
        };

        let expr = self.parse_alternation()?;

        match self.peek() {
            Token::RuleEnd => {
                self.consume();
            }
            Token::Eof => {}
            _ => return Err(self.unexpected("end of rule")),
        }

        if incremental {
            let folded = fold_name(&name);
            let existing = rules
                .iter_mut()
                .find(|r| fold_name(&r.name) == folded)
                .ok_or_else(|| {
                    self.err_at(head_pos, ParseErrorKind::IncrementalWithoutBase(name.clone()))
                })?;
            existing.expr = append_alternatives(existing.expr.clone(), expr);
        } else {
            rules.push(Rule::new(name, self.origin.clone(), expr));
        }
        Ok(())
    }

    fn check_rule_name(&self, name: &str, angled: bool) -> Result<(), EngineError> {
        if self.dialect.rule_name_form == RuleNameForm::Angled && !angled {
            return Err(self.err(ParseErrorKind::MalformedRuleHead(format!(
                "rule name \"{}\" must be written <{}>",
                name, name
            ))));
        }
        let valid = !name.is_empty()
            && name.chars().next().is_some_and(|c| c.is_alphabetic())
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(self.err(ParseErrorKind::MalformedRuleHead(format!(
                "\"{}\" is not a valid rule name",
                name
            ))));
        }
        Ok(())
    }

    // alternation := concatenation *(alt-op concatenation)
    fn parse_alternation(&mut self) -> Result<Expr, EngineError> {
        let mut alts = vec![self.parse_concatenation()?];

        loop {
            match self.peek() {
                Token::Slash => {
                    if self.dialect.alternation_token != AlternationToken::Slash {
                        return Err(self.err(ParseErrorKind::UndefinedOperator("/".to_string())));
                    }
                }
                Token::Pipe => {
                    if self.dialect.alternation_token != AlternationToken::Pipe {
                        return Err(self.err(ParseErrorKind::UndefinedOperator("|".to_string())));
                    }
                }
                _ => break,
            }
            self.consume();
            alts.push(self.parse_concatenation()?);
        }

        Ok(if alts.len() == 1 {
            alts.into_iter().next().unwrap_or(Expr::Sequence(vec![]))
        } else {
            Expr::Alternation(alts)
        })
    }

    // concatenation := repetition +
    fn parse_concatenation(&mut self) -> Result<Expr, EngineError> {
        let mut items = Vec::new();

        while starts_element(self.peek()) {
            items.push(self.parse_repetition()?);
        }

        match items.len() {
            0 => Err(self.unexpected("expression")),
            1 => Ok(items.into_iter().next().unwrap_or(Expr::Sequence(vec![]))),
            _ => Ok(Expr::Sequence(items)),
        }
    }

    // repetition := [bounds] element, bounds := n | n"*" | n"*"m | "*" | "*"m
    fn parse_repetition(&mut self) -> Result<Expr, EngineError> {
        let bounds = match self.peek().clone() {
            Token::Number(n) => {
                self.consume();
                if *self.peek() == Token::Star {
                    self.consume();
                    if let Token::Number(m) = *self.peek() {
                        self.consume();
                        Some((n, Some(m)))
                    } else {
                        Some((n, None))
                    }
                } else {
                    Some((n, Some(n)))
                }
            }
            Token::Star => {
                self.consume();
                if let Token::Number(m) = *self.peek() {
                    self.consume();
                    Some((0, Some(m)))
                } else {
                    Some((0, None))
                }
            }
            _ => None,
        };

        let element = self.parse_element()?;

        Ok(match bounds {
            Some((min, max)) => Expr::repeat(element, min, max),
            None => element,
        })
    }

    fn parse_element(&mut self) -> Result<Expr, EngineError> {
        match self.peek().clone() {
            Token::Name { text, angled } => {
                if self.dialect.rule_name_form == RuleNameForm::Angled && !angled {
                    return Err(self.unexpected("angle-bracketed rule name"));
                }
                self.consume();
                Ok(Expr::rule_ref(text))
            }
            Token::Literal(text) => {
                self.consume();
                Ok(Expr::literal(text))
            }
            Token::NumLiteral(text) => {
                self.consume();
                Ok(Expr::exact_literal(text))
            }
            Token::Range { lo, hi } => {
                self.consume();
                Ok(Expr::range(lo, hi))
            }
            Token::LParen => {
                self.consume();
                let inner = self.parse_alternation()?;
                if *self.peek() != Token::RParen {
                    return Err(self.unexpected("\")\""));
                }
                self.consume();
                Ok(inner)
            }
            Token::LBracket => {
                self.consume();
                let inner = self.parse_alternation()?;
                if *self.peek() != Token::RBracket {
                    return Err(self.unexpected("\"]\""));
                }
                self.consume();
                Ok(Expr::optional(inner))
            }
            _ => Err(self.unexpected("expression")),
        }
    }
}

fn starts_element(token: &Token) -> bool {
    matches!(
        token,
        Token::Name { .. }
            | Token::Literal(_)
            | Token::NumLiteral(_)
            | Token::Range { .. }
            | Token::LParen
            | Token::LBracket
            | Token::Number(_)
            | Token::Star
    )
}

/// Merge a `=/` body into the existing definition.
fn append_alternatives(existing: Expr, added: Expr) -> Expr {
    let mut alts = match existing {
        Expr::Alternation(alts) => alts,
        other => vec![other],
    };
    match added {
        Expr::Alternation(more) => alts.extend(more),
        other => alts.push(other),
    }
    Expr::Alternation(alts)
}

fn describe(token: &Token) -> String {
    match token {
        Token::Name { text, angled } => {
            if *angled {
                format!("name <{}>", text)
            } else {
                format!("name \"{}\"", text)
            }
        }
        Token::Literal(text) => format!("string {:?}", text),
        Token::NumLiteral(_) => "numeric terminal".to_string(),
        Token::Range { .. } => "character range".to_string(),
        Token::DefinedAs => "\"=\"".to_string(),
        Token::IncAlternative => "\"=/\"".to_string(),
        Token::Slash => "\"/\"".to_string(),
        Token::Pipe => "\"|\"".to_string(),
        Token::LParen => "\"(\"".to_string(),
        Token::RParen => "\")\"".to_string(),
        Token::LBracket => "\"[\"".to_string(),
        Token::RBracket => "\"]\"".to_string(),
        Token::Star => "\"*\"".to_string(),
        Token::Number(n) => format!("number {}", n),
        Token::RuleEnd => "end of rule".to_string(),
        Token::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Terminal;
    use crate::error::ParseErrorKind;

    fn parse_abnf(body: &str) -> GrammarFile {
        let source = format!("; !syntax(\"abnf\")\n{}", body);
        parse_grammar_file(&source, "test.abnf").expect("parse failed")
    }

    #[test]
    fn single_rule_with_alternation() {
        let file = parse_abnf("digit = \"0\" / \"1\" / \"2\"");
        assert_eq!(file.rules.len(), 1);
        assert_eq!(file.rules[0].name, "digit");
        match &file.rules[0].expr {
            Expr::Alternation(alts) => assert_eq!(alts.len(), 3),
            other => panic!("expected alternation, got {:?}", other),
        }
    }

    #[test]
    fn precedence_repetition_binds_tightest() {
        let file = parse_abnf("r = 1*3\"a\" \"b\"");
        match &file.rules[0].expr {
            Expr::Sequence(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(
                    items[0],
                    Expr::repeat(Expr::literal("a"), 1, Some(3))
                );
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn optional_brackets_become_bounded_repetition() {
        let file = parse_abnf("r = [\"x\"] \"y\"");
        match &file.rules[0].expr {
            Expr::Sequence(items) => {
                assert_eq!(items[0], Expr::optional(Expr::literal("x")));
            }
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn exact_repetition_count() {
        let file = parse_abnf("r = 4DIGIT");
        assert_eq!(
            file.rules[0].expr,
            Expr::repeat(Expr::rule_ref("DIGIT"), 4, Some(4))
        );
    }

    #[test]
    fn numeric_terminal_is_exact() {
        let file = parse_abnf("r = %d72.73");
        assert_eq!(
            file.rules[0].expr,
            Expr::Terminal(Terminal::Literal {
                text: "HI".to_string(),
                exact: true
            })
        );
    }

    #[test]
    fn incremental_alternative_extends_rule() {
        let file = parse_abnf("r = \"a\"\nr =/ \"b\" / \"c\"");
        assert_eq!(file.rules.len(), 1);
        match &file.rules[0].expr {
            Expr::Alternation(alts) => assert_eq!(alts.len(), 3),
            other => panic!("expected alternation, got {:?}", other),
        }
    }

    #[test]
    fn incremental_without_base_fails() {
        let source = "; !syntax(\"abnf\")\nr =/ \"a\"";
        let err = parse_grammar_file(source, "t.abnf").unwrap_err();
        match err {
            EngineError::Parse(e) => {
                assert!(matches!(e.kind, ParseErrorKind::IncrementalWithoutBase(_)))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn missing_syntax_tag_is_config_error() {
        let err = parse_grammar_file("r = \"a\"", "t.abnf").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::MissingSyntax { .. })
        ));
    }

    #[test]
    fn second_syntax_tag_is_config_error() {
        let source = "; !syntax(\"abnf\")\n; !syntax(\"abnf\")\nr = \"a\"";
        let err = parse_grammar_file(source, "t.abnf").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::MultipleSyntax { line: 2, .. })
        ));
    }

    #[test]
    fn unknown_dialect_is_config_error() {
        let source = "; !syntax(\"ebnf\")\nr = \"a\"";
        let err = parse_grammar_file(source, "t.abnf").unwrap_err();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::UnknownDialect { .. })
        ));
    }

    #[test]
    fn pipe_in_abnf_is_undefined_operator() {
        let source = "; !syntax(\"abnf\")\nr = \"a\" | \"b\"";
        let err = parse_grammar_file(source, "t.abnf").unwrap_err();
        match err {
            EngineError::Parse(e) => {
                assert_eq!(e.kind, ParseErrorKind::UndefinedOperator("|".to_string()))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn rfc1035_requires_angled_rule_names() {
        let good = "; !syntax(\"abnf-rfc1035\")\n<label> ::= <letter> | \"x\"\n<letter> ::= \"a\"";
        let file = parse_grammar_file(good, "t.abnf").expect("parse failed");
        assert_eq!(file.rules.len(), 2);

        let bad = "; !syntax(\"abnf-rfc1035\")\nlabel ::= \"a\"";
        let err = parse_grammar_file(bad, "t.abnf").unwrap_err();
        match err {
            EngineError::Parse(e) => {
                assert!(matches!(e.kind, ParseErrorKind::MalformedRuleHead(_)))
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn duplicate_definitions_kept_for_linker() {
        let file = parse_abnf("r = \"a\"\nr = \"b\"");
        assert_eq!(file.rules.len(), 2);
    }

    #[test]
    fn imports_recorded_but_not_resolved() {
        let source =
            "; !syntax(\"abnf\")\n; !import(\"label\", \"B.abnf\")\ndomain = label \".\" label";
        let file = parse_grammar_file(source, "A.abnf").expect("parse failed");
        assert_eq!(file.imports.len(), 1);
        assert_eq!(file.imports[0].file, "B.abnf");
    }

    #[test]
    fn continuation_lines_parse_as_one_rule() {
        let file = parse_abnf("r = \"a\"\n      / \"b\"");
        assert_eq!(file.rules.len(), 1);
        match &file.rules[0].expr {
            Expr::Alternation(alts) => assert_eq!(alts.len(), 2),
            other => panic!("expected alternation, got {:?}", other),
        }
    }

    #[test]
    fn reparsing_is_deterministic() {
        let source = "; !syntax(\"abnf\")\nnum = 1*DIGIT [\".\" 1*DIGIT]\n";
        let a = parse_grammar_file(source, "t.abnf").expect("parse failed");
        let b = parse_grammar_file(source, "t.abnf").expect("parse failed");
        assert_eq!(a, b);
    }
}
