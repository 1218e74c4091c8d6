//! BNF/ABNF grammar verification engine
//!
//! Parses grammars written in supported ABNF dialects, links them (possibly
//! across several files connected by `!import` directives) into one rule
//! table, and verifies input text against a chosen start symbol with a
//! memoized recursive-descent matcher.
//!
//! Every grammar file selects its dialect with a `!syntax` tag in a comment:
//!
//! ```text
//! ; !syntax("abnf")
//! num = 1*DIGIT
//! ```
//!
//! The usual entry point is [`Session`]:
//!
//! ```
//! use bnfcheck::Session;
//!
//! let mut session = Session::new();
//! session.add_grammar("; !syntax(\"abnf\")\nnum = 1*DIGIT", "num.abnf")?;
//! let linked = session.link()?;
//! let result = linked.verify("num", "2026")?;
//! assert!(result.accepted);
//! # Ok::<(), bnfcheck::EngineError>(())
//! ```

pub mod ast;
pub mod dialect;
pub mod error;
pub mod grammar_parser;
pub mod input_stream;
pub mod linker;
pub mod token;
pub mod verifier;

pub use ast::{Expr, GrammarFile, Rule, RuleTable, Terminal};
pub use dialect::{AlternationPolicy, DialectProfile, ABNF, ABNF_RFC1035};
pub use error::{ConfigError, EngineError, LexError, ParseError, ResourceLimit, Result};
pub use grammar_parser::parse_grammar_file;
pub use input_stream::InputStream;
pub use linker::{link, UnifiedGrammar};
pub use verifier::{verify, Limits, VerificationResult};

/// Collects grammar sources, then links them into a [`LinkedSession`].
#[derive(Debug, Default)]
pub struct Session {
    files: Vec<GrammarFile>,
    limits: Limits,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Session {
            files: Vec::new(),
            limits,
        }
    }

    /// Parse one grammar source. `origin` is the label `!import` directives
    /// in other files use to refer to it, conventionally its file name.
    pub fn add_grammar(&mut self, source: &str, origin: &str) -> Result<()> {
        self.files.push(parse_grammar_file(source, origin)?);
        Ok(())
    }

    /// Link everything added so far.
    pub fn link(self) -> Result<LinkedSession> {
        Ok(LinkedSession {
            grammar: link(&self.files)?,
            limits: self.limits,
        })
    }
}

/// A linked grammar ready to verify inputs. Reusable across inputs and
/// start symbols.
#[derive(Debug)]
pub struct LinkedSession {
    grammar: UnifiedGrammar,
    limits: Limits,
}

impl LinkedSession {
    pub fn grammar(&self) -> &UnifiedGrammar {
        &self.grammar
    }

    pub fn verify(&self, start: &str, input: &str) -> Result<VerificationResult> {
        verify(&self.grammar, start, input, &self.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trip() {
        let mut session = Session::new();
        session
            .add_grammar("; !syntax(\"abnf\")\nnum = 1*DIGIT", "num.abnf")
            .expect("parse failed");
        let linked = session.link().expect("link failed");

        assert!(linked.verify("num", "123").expect("verify failed").accepted);
        assert!(!linked.verify("num", "12a").expect("verify failed").accepted);
    }

    #[test]
    fn session_carries_limits() {
        let mut session = Session::with_limits(Limits {
            max_depth: 3,
            timeout: None,
        });
        session
            .add_grammar("; !syntax(\"abnf\")\nlist = \"x\" list / \"x\"", "g.abnf")
            .expect("parse failed");
        let linked = session.link().expect("link failed");

        let err = linked.verify("list", "xxxxxxxx").unwrap_err();
        assert!(matches!(err, EngineError::ResourceExceeded(_)));
    }
}
