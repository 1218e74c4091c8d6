//! Error taxonomy for the verification engine
//!
//! Every failure mode has a dedicated variant so callers can match on what
//! went wrong and where. Rejection of an input string is not an error: the
//! verifier reports it through `VerificationResult` with `accepted = false`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error for every engine operation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(
        "dialect conflict: {first_origin} selects \"{first}\" but {second_origin} selects \"{second}\""
    )]
    DialectConflict {
        first: String,
        first_origin: String,
        second: String,
        second_origin: String,
    },

    #[error("{origin}: imported symbol \"{symbol}\" not found in \"{file}\"")]
    UnresolvedImport {
        symbol: String,
        file: String,
        origin: String,
    },

    #[error("{origin}: rule \"{rule}\" references undefined symbol \"{symbol}\"")]
    UnresolvedSymbol {
        symbol: String,
        rule: String,
        origin: String,
    },

    #[error("symbol \"{symbol}\" defined in both {first_origin} and {second_origin}")]
    DuplicateSymbol {
        symbol: String,
        first_origin: String,
        second_origin: String,
    },

    #[error("start symbol \"{symbol}\" is not defined in the linked grammar")]
    UndefinedStartSymbol { symbol: String },

    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(ResourceLimit),
}

/// Which verification limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLimit {
    /// Rule nesting exceeded the configured maximum.
    Depth(usize),
    /// Wall-clock deadline passed.
    Timeout,
}

impl std::fmt::Display for ResourceLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceLimit::Depth(max) => write!(f, "rule nesting deeper than {}", max),
            ResourceLimit::Timeout => write!(f, "verification timed out"),
        }
    }
}

/// Tokenizer failure with its source position.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{origin}:{line}:{column}: {kind}")]
pub struct LexError {
    pub origin: String,
    pub line: usize,
    pub column: usize,
    pub kind: LexErrorKind,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unterminated rule name")]
    UnterminatedRuleName,

    #[error("invalid numeric terminal: {0}")]
    InvalidNumericTerminal(String),

    #[error("invalid repetition bound \"{0}\"")]
    InvalidRepetitionBound(String),

    #[error("malformed directive: {0}")]
    MalformedDirective(String),

    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
}

/// Grammar parse failure with its source position.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{origin}:{line}:{column}: {kind}")]
pub struct ParseError {
    pub origin: String,
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseErrorKind {
    #[error("operator \"{0}\" is not defined in this dialect")]
    UndefinedOperator(String),

    #[error("malformed rule head: {0}")]
    MalformedRuleHead(String),

    #[error("incremental alternative \"{0} =/\" has no prior definition")]
    IncrementalWithoutBase(String),

    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEndOfInput { expected: String },
}

/// Problems with a file's directives rather than its rules.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("{origin}: missing !syntax directive")]
    MissingSyntax { origin: String },

    #[error("{origin}:{line}:{column}: more than one !syntax directive")]
    MultipleSyntax {
        origin: String,
        line: usize,
        column: usize,
    },

    #[error("{origin}:{line}:{column}: unknown dialect \"{name}\"")]
    UnknownDialect {
        origin: String,
        line: usize,
        column: usize,
        name: String,
    },
}
