//! Dialect profiles for the supported BNF/ABNF variants
//!
//! A profile is plain data consulted uniformly by the parser and the
//! verifier; switching dialects never changes the rule/expression model,
//! only how it is interpreted. Two profiles are built in, matching the
//! values accepted by the `!syntax` tag: `"abnf"` (RFC 2234/4234) and
//! `"abnf-rfc1035"` (the variant used by RFC 1035).

use crate::ast::{Expr, Rule};

/// How alternation picks among matching branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternationPolicy {
    /// First branch that matches wins.
    FirstMatch,
    /// Branch consuming the most input wins; ties go to declaration order.
    LongestMatch,
}

/// Accepted rule-name spelling on the left side of a definition and in
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleNameForm {
    /// Bare names; `<...>` wrapping allowed but not required.
    Plain,
    /// Names must be written `<name>` (RFC 1035 notation).
    Angled,
}

/// The alternation operator the dialect defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternationToken {
    Slash,
    Pipe,
}

/// Interpretation rules for one BNF/ABNF variant.
#[derive(Debug, PartialEq, Eq)]
pub struct DialectProfile {
    pub name: &'static str,
    /// Whether quoted literals match case-sensitively. Numeric terminals are
    /// always exact regardless of this flag.
    pub case_sensitive_literals: bool,
    pub alternation: AlternationPolicy,
    pub alternation_token: AlternationToken,
    pub rule_name_form: RuleNameForm,
    /// Whether the dialect carries predefined core rules (ALPHA, DIGIT, ...).
    pub has_core_rules: bool,
}

pub static ABNF: DialectProfile = DialectProfile {
    name: "abnf",
    case_sensitive_literals: false,
    alternation: AlternationPolicy::LongestMatch,
    alternation_token: AlternationToken::Slash,
    rule_name_form: RuleNameForm::Plain,
    has_core_rules: true,
};

pub static ABNF_RFC1035: DialectProfile = DialectProfile {
    name: "abnf-rfc1035",
    case_sensitive_literals: false,
    alternation: AlternationPolicy::FirstMatch,
    alternation_token: AlternationToken::Pipe,
    rule_name_form: RuleNameForm::Angled,
    has_core_rules: false,
};

impl DialectProfile {
    /// Resolve a `!syntax` tag value to a profile.
    pub fn lookup(name: &str) -> Option<&'static DialectProfile> {
        match name {
            "abnf" => Some(&ABNF),
            "abnf-rfc1035" => Some(&ABNF_RFC1035),
            _ => None,
        }
    }

    /// Predefined rules available to every grammar of this dialect.
    ///
    /// For `abnf` these are the RFC 4234 appendix B.1 core rules. A user
    /// rule with the same name shadows the core definition.
    pub fn core_rules(&self) -> Vec<Rule> {
        if !self.has_core_rules {
            return Vec::new();
        }
        let origin = "core:rfc4234";
        let rule = |name: &str, expr: Expr| Rule::new(name, origin, expr);

        vec![
            rule(
                "ALPHA",
                Expr::alternation(vec![Expr::range('\x41', '\x5A'), Expr::range('\x61', '\x7A')]),
            ),
            rule(
                "BIT",
                Expr::alternation(vec![Expr::literal("0"), Expr::literal("1")]),
            ),
            rule("CHAR", Expr::range('\x01', '\x7F')),
            rule("CR", Expr::exact_literal("\r")),
            rule(
                "CRLF",
                Expr::sequence(vec![Expr::rule_ref("CR"), Expr::rule_ref("LF")]),
            ),
            rule(
                "CTL",
                Expr::alternation(vec![Expr::range('\x00', '\x1F'), Expr::exact_literal("\x7F")]),
            ),
            rule("DIGIT", Expr::range('\x30', '\x39')),
            rule("DQUOTE", Expr::exact_literal("\"")),
            rule(
                "HEXDIG",
                Expr::alternation(vec![
                    Expr::rule_ref("DIGIT"),
                    Expr::literal("A"),
                    Expr::literal("B"),
                    Expr::literal("C"),
                    Expr::literal("D"),
                    Expr::literal("E"),
                    Expr::literal("F"),
                ]),
            ),
            rule("HTAB", Expr::exact_literal("\t")),
            rule("LF", Expr::exact_literal("\n")),
            rule(
                "LWSP",
                Expr::repeat(
                    Expr::alternation(vec![
                        Expr::rule_ref("WSP"),
                        Expr::sequence(vec![Expr::rule_ref("CRLF"), Expr::rule_ref("WSP")]),
                    ]),
                    0,
                    None,
                ),
            ),
            rule("OCTET", Expr::range('\x00', '\u{FF}')),
            rule("SP", Expr::exact_literal(" ")),
            rule("VCHAR", Expr::range('\x21', '\x7E')),
            rule(
                "WSP",
                Expr::alternation(vec![Expr::rule_ref("SP"), Expr::rule_ref("HTAB")]),
            ),
        ]
    }
}
