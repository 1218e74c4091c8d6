//! Tokenizer for BNF/ABNF grammar sources
//!
//! Converts grammar text into a token stream plus a side list of directives
//! found in `;` comments (`!syntax("...")` and `!import("...", ..., "...")`).
//! The lexer is dialect-independent: both alternation operators and both
//! rule-name spellings are tokenized, and the parser enforces what the
//! selected dialect actually defines.
//!
//! Line structure matters in ABNF: a rule ends at a line break unless the
//! next content line is indented (a continuation). The lexer resolves this
//! and emits explicit [`Token::RuleEnd`] markers, so the parser never sees
//! raw newlines.

use crate::ast::{ImportDirective, ImportSymbol};
use crate::error::{LexError, LexErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Rule name, bare or `<...>`-wrapped.
    Name { text: String, angled: bool },
    /// Quoted string literal.
    Literal(String),
    /// Literal derived from numeric terminals (`%d72.73`); always exact.
    NumLiteral(String),
    /// Single-character range terminal (`%x30-39`).
    Range { lo: char, hi: char },
    /// `=` (or `::=` in RFC 1035 notation).
    DefinedAs,
    /// `=/` incremental alternative.
    IncAlternative,
    Slash,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Star,
    /// Repetition bound digits.
    Number(u32),
    /// End of a rule definition (non-continuation line break).
    RuleEnd,
    Eof,
}

/// Line/column of a token or directive, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

/// Directive extracted from a comment.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Syntax { name: String, pos: Pos },
    Import(ImportDirective),
}

/// Tokenizer output: the token stream and every directive in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutput {
    pub tokens: Vec<(Token, Pos)>,
    pub directives: Vec<Directive>,
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    origin: String,
}

impl Lexer {
    pub fn new(input: &str, origin: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            origin: origin.to_string(),
        }
    }

    pub fn tokenize(&mut self) -> Result<ScanOutput, LexError> {
        let mut tokens: Vec<(Token, Pos)> = Vec::new();
        let mut directives = Vec::new();

        while self.pos < self.input.len() {
            let indented = matches!(self.peek(), Some(' ') | Some('\t'));
            self.skip_inline_ws();

            match self.peek() {
                None => break,
                Some('\n') => {
                    self.advance();
                }
                Some(';') => {
                    self.lex_comment(&mut directives)?;
                    if self.peek() == Some('\n') {
                        self.advance();
                    }
                }
                Some(_) => {
                    // Content line. An unindented line starts a new rule.
                    if !indented {
                        push_rule_end(&mut tokens, self.here());
                    }
                    loop {
                        self.skip_inline_ws();
                        match self.peek() {
                            None => break,
                            Some('\n') => {
                                self.advance();
                                break;
                            }
                            Some(';') => {
                                self.lex_comment(&mut directives)?;
                            }
                            Some(_) => {
                                let pos = self.here();
                                let token = self.next_token()?;
                                tokens.push((token, pos));
                            }
                        }
                    }
                }
            }
        }

        push_rule_end(&mut tokens, self.here());
        tokens.push((Token::Eof, self.here()));
        Ok(ScanOutput { tokens, directives })
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn err(&self, pos: Pos, kind: LexErrorKind) -> LexError {
        LexError {
            origin: self.origin.clone(),
            line: pos.line,
            column: pos.column,
            kind,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if let Some(c) = ch {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        ch
    }

    fn skip_inline_ws(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
            self.advance();
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        match self.peek() {
            Some('"') => self.read_string(),
            Some('%') => self.read_numeric_terminal(),
            Some('<') => self.read_angled_name(),
            Some('=') => {
                self.advance();
                if self.peek() == Some('/') {
                    self.advance();
                    Ok(Token::IncAlternative)
                } else {
                    Ok(Token::DefinedAs)
                }
            }
            Some(':') => {
                // RFC 1035 sources write "::=" for defined-as.
                self.advance();
                if self.peek() == Some(':') {
                    self.advance();
                    if self.peek() == Some('=') {
                        self.advance();
                        return Ok(Token::DefinedAs);
                    }
                }
                Err(self.err(pos, LexErrorKind::UnexpectedChar(':')))
            }
            Some('/') => {
                self.advance();
                Ok(Token::Slash)
            }
            Some('|') => {
                self.advance();
                Ok(Token::Pipe)
            }
            Some('(') => {
                self.advance();
                Ok(Token::LParen)
            }
            Some(')') => {
                self.advance();
                Ok(Token::RParen)
            }
            Some('[') => {
                self.advance();
                Ok(Token::LBracket)
            }
            Some(']') => {
                self.advance();
                Ok(Token::RBracket)
            }
            Some('*') => {
                self.advance();
                Ok(Token::Star)
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => Ok(self.read_ident()),
            Some(ch) => Err(self.err(pos, LexErrorKind::UnexpectedChar(ch))),
            None => Err(self.err(pos, LexErrorKind::UnexpectedChar('\0'))),
        }
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        self.advance(); // opening quote
        let mut s = String::new();

        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return Ok(Token::Literal(s));
                }
                // ABNF string literals cannot span lines.
                Some('\n') | None => {
                    return Err(self.err(pos, LexErrorKind::UnterminatedString));
                }
                Some(ch) => {
                    s.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_angled_name(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        self.advance(); // '<'
        let mut name = String::new();

        loop {
            match self.peek() {
                Some('>') => {
                    self.advance();
                    return Ok(Token::Name {
                        text: name,
                        angled: true,
                    });
                }
                Some('\n') | None => {
                    return Err(self.err(pos, LexErrorKind::UnterminatedRuleName));
                }
                Some(ch) => {
                    name.push(ch);
                    self.advance();
                }
            }
        }
    }

    fn read_ident(&mut self) -> Token {
        let mut ident = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '-' || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        Token::Name {
            text: ident,
            angled: false,
        }
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        digits
            .parse::<u32>()
            .map(Token::Number)
            .map_err(|_| self.err(pos, LexErrorKind::InvalidRepetitionBound(digits)))
    }

    fn read_numeric_terminal(&mut self) -> Result<Token, LexError> {
        let pos = self.here();
        self.advance(); // '%'

        let radix = match self.advance() {
            Some('d') | Some('D') => 10,
            Some('x') | Some('X') => 16,
            Some('b') | Some('B') => 2,
            other => {
                let detail = match other {
                    Some(ch) => format!("unknown base '{}'", ch),
                    None => "missing base character".to_string(),
                };
                return Err(self.err(pos, LexErrorKind::InvalidNumericTerminal(detail)));
            }
        };

        let first = self.read_code_point(pos, radix)?;

        if self.peek() == Some('-') {
            self.advance();
            let second = self.read_code_point(pos, radix)?;
            if first > second {
                return Err(self.err(
                    pos,
                    LexErrorKind::InvalidNumericTerminal("descending range".to_string()),
                ));
            }
            return Ok(Token::Range {
                lo: first,
                hi: second,
            });
        }

        let mut text = String::new();
        text.push(first);
        while self.peek() == Some('.') {
            self.advance();
            text.push(self.read_code_point(pos, radix)?);
        }
        Ok(Token::NumLiteral(text))
    }

    fn read_code_point(&mut self, pos: Pos, radix: u32) -> Result<char, LexError> {
        let mut digits = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_digit(radix) {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.err(
                pos,
                LexErrorKind::InvalidNumericTerminal("missing digits".to_string()),
            ));
        }
        let value = u32::from_str_radix(&digits, radix).map_err(|_| {
            self.err(
                pos,
                LexErrorKind::InvalidNumericTerminal(format!("value \"{}\" out of range", digits)),
            )
        })?;
        char::from_u32(value).ok_or_else(|| {
            self.err(
                pos,
                LexErrorKind::InvalidNumericTerminal(format!("invalid code point {}", value)),
            )
        })
    }

    /// Consume a `;` comment to end of line; directives inside are parsed
    /// strictly and recorded, everything else is discarded.
    fn lex_comment(&mut self, directives: &mut Vec<Directive>) -> Result<(), LexError> {
        self.advance(); // ';'
        self.skip_inline_ws();

        if self.peek() == Some('!') {
            let directive = self.read_directive()?;
            directives.push(directive);
        }

        while !matches!(self.peek(), Some('\n') | None) {
            self.advance();
        }
        Ok(())
    }

    fn read_directive(&mut self) -> Result<Directive, LexError> {
        let pos = self.here();
        self.advance(); // '!'

        let mut word = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() {
                word.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match word.as_str() {
            "syntax" => {
                self.expect_directive_char('(', pos)?;
                self.skip_inline_ws();
                let name = self.read_directive_string(pos)?;
                self.skip_inline_ws();
                self.expect_directive_char(')', pos)?;
                Ok(Directive::Syntax { name, pos })
            }
            "import" => self.read_import(pos),
            other => Err(self.err(
                pos,
                LexErrorKind::MalformedDirective(format!("unknown tag \"!{}\"", other)),
            )),
        }
    }

    // !import("sym" [as "orig"], ..., "file")
    fn read_import(&mut self, pos: Pos) -> Result<Directive, LexError> {
        self.expect_directive_char('(', pos)?;

        let mut entries: Vec<(String, Option<String>)> = Vec::new();
        loop {
            self.skip_inline_ws();
            let name = self.read_directive_string(pos)?;
            self.skip_inline_ws();

            let alias = if self.peek_word("as") {
                self.advance();
                self.advance();
                self.skip_inline_ws();
                Some(self.read_directive_string(pos)?)
            } else {
                None
            };
            entries.push((name, alias));

            self.skip_inline_ws();
            match self.peek() {
                Some(',') => {
                    self.advance();
                }
                Some(')') => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(self.err(
                        pos,
                        LexErrorKind::MalformedDirective("expected ',' or ')'".to_string()),
                    ));
                }
            }
        }

        if entries.len() < 2 {
            return Err(self.err(
                pos,
                LexErrorKind::MalformedDirective(
                    "expected at least one symbol and a file name".to_string(),
                ),
            ));
        }
        let (file, file_alias) = entries.pop().unwrap_or_default();
        if file_alias.is_some() {
            return Err(self.err(
                pos,
                LexErrorKind::MalformedDirective("file name cannot be aliased".to_string()),
            ));
        }

        let symbols = entries
            .into_iter()
            .map(|(local, alias)| ImportSymbol {
                source: alias.unwrap_or_else(|| local.clone()),
                local,
            })
            .collect();

        Ok(Directive::Import(ImportDirective {
            symbols,
            file,
            line: pos.line,
            column: pos.column,
        }))
    }

    fn peek_word(&self, word: &str) -> bool {
        let chars: Vec<char> = word.chars().collect();
        for (i, expected) in chars.iter().enumerate() {
            if self.input.get(self.pos + i) != Some(expected) {
                return false;
            }
        }
        // Must not run into a longer identifier.
        !matches!(
            self.input.get(self.pos + chars.len()),
            Some(ch) if ch.is_alphanumeric()
        )
    }

    fn expect_directive_char(&mut self, expected: char, pos: Pos) -> Result<(), LexError> {
        if self.peek() == Some(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(
                pos,
                LexErrorKind::MalformedDirective(format!("expected '{}'", expected)),
            ))
        }
    }

    fn read_directive_string(&mut self, pos: Pos) -> Result<String, LexError> {
        if self.peek() != Some('"') {
            return Err(self.err(
                pos,
                LexErrorKind::MalformedDirective("expected quoted string".to_string()),
            ));
        }
        self.advance();
        let mut s = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    self.advance();
                    return Ok(s);
                }
                Some('\n') | None => {
                    return Err(self.err(
                        pos,
                        LexErrorKind::MalformedDirective("unterminated string".to_string()),
                    ));
                }
                Some(ch) => {
                    s.push(ch);
                    self.advance();
                }
            }
        }
    }
}

fn push_rule_end(tokens: &mut Vec<(Token, Pos)>, pos: Pos) {
    if matches!(tokens.last(), Some((t, _)) if *t != Token::RuleEnd) {
        tokens.push((Token::RuleEnd, pos));
    }
}
