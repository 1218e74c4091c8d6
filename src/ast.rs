//! Rule and expression model for parsed grammars
//!
//! A grammar file parses into a list of [`Rule`]s, each owning an immutable
//! [`Expr`] tree. Cross-rule references are kept symbolic ([`Expr::RuleRef`])
//! rather than linked, so cyclic grammars stay representable; resolution
//! happens by name against a [`RuleTable`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::dialect::DialectProfile;

/// A terminal leaf: literal text or a single-character range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminal {
    /// Quoted or numeric literal. `exact` literals (from `%d`/`%x`/`%b`
    /// terminals) always match case-sensitively; quoted literals follow the
    /// dialect's case policy.
    Literal { text: String, exact: bool },
    /// Single character within an inclusive range, e.g. `%x30-39`.
    Range { lo: char, hi: char },
}

/// Production expression tree. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Terminal(Terminal),
    /// Reference to a rule by its written name.
    RuleRef(String),
    /// Ordered concatenation.
    Sequence(Vec<Expr>),
    /// Ordered alternatives; match policy comes from the dialect profile.
    Alternation(Vec<Expr>),
    /// `min` to `max` repetitions of the inner expression
    /// (`None` = unbounded).
    Repetition {
        inner: Box<Expr>,
        min: u32,
        max: Option<u32>,
    },
}

impl Expr {
    pub fn literal(text: impl Into<String>) -> Self {
        Expr::Terminal(Terminal::Literal {
            text: text.into(),
            exact: false,
        })
    }

    pub fn exact_literal(text: impl Into<String>) -> Self {
        Expr::Terminal(Terminal::Literal {
            text: text.into(),
            exact: true,
        })
    }

    pub fn range(lo: char, hi: char) -> Self {
        Expr::Terminal(Terminal::Range { lo, hi })
    }

    pub fn rule_ref(name: impl Into<String>) -> Self {
        Expr::RuleRef(name.into())
    }

    pub fn sequence(items: Vec<Expr>) -> Self {
        Expr::Sequence(items)
    }

    pub fn alternation(alts: Vec<Expr>) -> Self {
        Expr::Alternation(alts)
    }

    pub fn repeat(inner: Expr, min: u32, max: Option<u32>) -> Self {
        Expr::Repetition {
            inner: Box::new(inner),
            min,
            max,
        }
    }

    pub fn optional(inner: Expr) -> Self {
        Expr::repeat(inner, 0, Some(1))
    }
}

/// A named production with its source origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Name as written in the source; lookups fold case via [`fold_name`].
    pub name: String,
    pub origin: String,
    pub expr: Expr,
}

impl Rule {
    pub fn new(name: impl Into<String>, origin: impl Into<String>, expr: Expr) -> Self {
        Rule {
            name: name.into(),
            origin: origin.into(),
            expr,
        }
    }
}

/// Rule names are case-insensitive in every supported dialect; tables and
/// memo keys use the folded form.
pub fn fold_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// One imported symbol: the local name it binds to and the name it carries in
/// the source file (differs only under `"local" as "remote"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSymbol {
    pub local: String,
    pub source: String,
}

/// A recorded `!import("sym", ..., "file")` directive. Resolution is
/// deferred to the linker, which needs the referenced file's rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDirective {
    pub symbols: Vec<ImportSymbol>,
    pub file: String,
    pub line: usize,
    pub column: usize,
}

/// Output of parsing one grammar source: rules in declaration order (duplicate
/// names are preserved here and rejected by the linker), recorded imports, and
/// the dialect selected by the file's `!syntax` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarFile {
    pub origin: String,
    pub dialect: &'static DialectProfile,
    pub rules: Vec<Rule>,
    pub imports: Vec<ImportDirective>,
}

/// Name-indexed rule table with case-folded keys. Entries are shared
/// (`Arc`), so an imported rule aliases its definition instead of copying it.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, Arc<Rule>>,
}

impl RuleTable {
    pub fn new() -> Self {
        RuleTable {
            rules: HashMap::new(),
        }
    }

    /// Insert a rule, returning the previous entry for that name if any.
    pub fn insert(&mut self, rule: Arc<Rule>) -> Option<Arc<Rule>> {
        self.rules.insert(fold_name(&rule.name), rule)
    }

    /// Insert under an explicit local name (used for `as`-renamed imports).
    pub fn insert_as(&mut self, local: &str, rule: Arc<Rule>) -> Option<Arc<Rule>> {
        self.rules.insert(fold_name(local), rule)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(&fold_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(&fold_name(name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Rule>)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }
}
