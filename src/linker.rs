//! Linking parsed grammar files into one unified rule table
//!
//! Linking checks that every file agrees on the dialect, rejects duplicate
//! definitions, resolves `!import` directives against the named files, adds
//! the dialect's core rules where no user rule shadows them, and finally
//! verifies that every rule reference has a definition. Imported rules are
//! shared (`Arc`), never copied, so an `as`-renamed import is an alias of
//! the original definition.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{fold_name, Expr, GrammarFile, Rule, RuleTable};
use crate::dialect::DialectProfile;
use crate::error::{ConfigError, EngineError, Result};

/// A fully linked grammar: one dialect, one closed rule table.
#[derive(Debug, Clone)]
pub struct UnifiedGrammar {
    pub dialect: &'static DialectProfile,
    pub rules: RuleTable,
}

/// Link parsed files into a [`UnifiedGrammar`].
pub fn link(files: &[GrammarFile]) -> Result<UnifiedGrammar> {
    let first = files.first().ok_or_else(|| ConfigError::MissingSyntax {
        origin: "<no grammar files>".to_string(),
    })?;
    let dialect = first.dialect;

    for file in &files[1..] {
        if file.dialect.name != dialect.name {
            return Err(EngineError::DialectConflict {
                first: dialect.name.to_string(),
                first_origin: first.origin.clone(),
                second: file.dialect.name.to_string(),
                second_origin: file.origin.clone(),
            });
        }
    }

    // Per-file tables, rejecting duplicates within a file.
    let mut file_tables: HashMap<&str, HashMap<String, Arc<Rule>>> = HashMap::new();
    for file in files {
        let table = file_tables.entry(file.origin.as_str()).or_default();
        for rule in &file.rules {
            let shared = Arc::new(rule.clone());
            if let Some(prior) = table.insert(fold_name(&rule.name), shared) {
                return Err(EngineError::DuplicateSymbol {
                    symbol: rule.name.clone(),
                    first_origin: prior.origin.clone(),
                    second_origin: rule.origin.clone(),
                });
            }
        }
    }

    // Global table. A name defined in two files is a collision unless both
    // entries are the same shared rule (an import alias of it).
    let mut rules = RuleTable::new();
    for file in files {
        if let Some(table) = file_tables.get(file.origin.as_str()) {
            for shared in table.values() {
                insert_shared(&mut rules, &shared.name, Arc::clone(shared))?;
            }
        }
    }

    // Resolve imports against the source file's own rules.
    for file in files {
        for import in &file.imports {
            let source_table = file_tables.get(import.file.as_str()).ok_or_else(|| {
                EngineError::UnresolvedImport {
                    symbol: import
                        .symbols
                        .first()
                        .map(|s| s.source.clone())
                        .unwrap_or_default(),
                    file: import.file.clone(),
                    origin: file.origin.clone(),
                }
            })?;
            for symbol in &import.symbols {
                let rule = source_table
                    .get(&fold_name(&symbol.source))
                    .ok_or_else(|| EngineError::UnresolvedImport {
                        symbol: symbol.source.clone(),
                        file: import.file.clone(),
                        origin: file.origin.clone(),
                    })?;
                insert_shared(&mut rules, &symbol.local, Arc::clone(rule))?;
            }
        }
    }

    // Core rules fill in underneath; user definitions shadow them.
    for core in dialect.core_rules() {
        if !rules.contains(&core.name) {
            rules.insert(Arc::new(core));
        }
    }

    for (_, rule) in rules.iter() {
        check_references(&rule.expr, rule, &rules)?;
    }

    debug!(
        dialect = dialect.name,
        files = files.len(),
        rules = rules.len(),
        "grammar linked"
    );
    Ok(UnifiedGrammar { dialect, rules })
}

fn insert_shared(rules: &mut RuleTable, name: &str, rule: Arc<Rule>) -> Result<()> {
    let incoming_origin = rule.origin.clone();
    if let Some(prior) = rules.insert_as(name, rule) {
        if let Some(current) = rules.get(name) {
            if !Arc::ptr_eq(&prior, current) {
                return Err(EngineError::DuplicateSymbol {
                    symbol: name.to_string(),
                    first_origin: prior.origin.clone(),
                    second_origin: incoming_origin,
                });
            }
        }
    }
    Ok(())
}

fn check_references(expr: &Expr, rule: &Rule, rules: &RuleTable) -> Result<()> {
    match expr {
        Expr::Terminal(_) => Ok(()),
        Expr::RuleRef(name) => {
            if rules.contains(name) {
                Ok(())
            } else {
                Err(EngineError::UnresolvedSymbol {
                    symbol: name.clone(),
                    rule: rule.name.clone(),
                    origin: rule.origin.clone(),
                })
            }
        }
        Expr::Sequence(items) | Expr::Alternation(items) => {
            for item in items {
                check_references(item, rule, rules)?;
            }
            Ok(())
        }
        Expr::Repetition { inner, .. } => check_references(inner, rule, rules),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar_parser::parse_grammar_file;

    fn file(source: &str, origin: &str) -> GrammarFile {
        parse_grammar_file(source, origin).expect("parse failed")
    }

    #[test]
    fn links_a_single_file() {
        let grammar = link(&[file("; !syntax(\"abnf\")\nnum = 1*DIGIT", "g.abnf")])
            .expect("link failed");
        assert!(grammar.rules.contains("num"));
        // core rule pulled in for the DIGIT reference
        assert!(grammar.rules.contains("DIGIT"));
    }

    #[test]
    fn user_rule_shadows_core_rule() {
        let grammar = link(&[file(
            "; !syntax(\"abnf\")\nDIGIT = \"0\" / \"1\"\nnum = 1*DIGIT",
            "g.abnf",
        )])
        .expect("link failed");
        let digit = grammar.rules.get("digit").expect("missing rule");
        assert_eq!(digit.origin, "g.abnf");
    }

    #[test]
    fn duplicate_in_one_file_is_rejected() {
        let err = link(&[file("; !syntax(\"abnf\")\nr = \"a\"\nr = \"b\"", "g.abnf")]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSymbol { .. }));
    }

    #[test]
    fn duplicate_across_files_is_rejected() {
        let a = file("; !syntax(\"abnf\")\nr = \"a\"", "a.abnf");
        let b = file("; !syntax(\"abnf\")\nr = \"b\"", "b.abnf");
        let err = link(&[a, b]).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateSymbol { .. }));
    }

    #[test]
    fn dialect_conflict_is_rejected() {
        let a = file("; !syntax(\"abnf\")\nr = \"a\"", "a.abnf");
        let b = file("; !syntax(\"abnf-rfc1035\")\n<s> ::= \"b\"", "b.abnf");
        let err = link(&[a, b]).unwrap_err();
        match err {
            EngineError::DialectConflict { first, second, .. } => {
                assert_eq!(first, "abnf");
                assert_eq!(second, "abnf-rfc1035");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn import_binds_symbol_from_other_file() {
        let a = file(
            "; !syntax(\"abnf\")\n; !import(\"label\", \"b.abnf\")\ndomain = label *(\".\" label)",
            "a.abnf",
        );
        let b = file("; !syntax(\"abnf\")\nlabel = 1*ALPHA", "b.abnf");
        let grammar = link(&[a, b]).expect("link failed");
        assert!(grammar.rules.contains("domain"));
        assert!(grammar.rules.contains("label"));
    }

    #[test]
    fn import_alias_shares_the_definition() {
        let a = file(
            "; !syntax(\"abnf\")\n; !import(\"name\" as \"label\", \"b.abnf\")\ndomain = 1*name",
            "a.abnf",
        );
        let b = file("; !syntax(\"abnf\")\nlabel = 1*ALPHA", "b.abnf");
        let grammar = link(&[a, b]).expect("link failed");

        let local = grammar.rules.get("name").expect("missing alias");
        let original = grammar.rules.get("label").expect("missing original");
        assert!(Arc::ptr_eq(local, original));
    }

    #[test]
    fn import_of_missing_symbol_fails() {
        let a = file(
            "; !syntax(\"abnf\")\n; !import(\"nothere\", \"b.abnf\")\nr = nothere",
            "a.abnf",
        );
        let b = file("; !syntax(\"abnf\")\nlabel = 1*ALPHA", "b.abnf");
        let err = link(&[a, b]).unwrap_err();
        match err {
            EngineError::UnresolvedImport { symbol, file, .. } => {
                assert_eq!(symbol, "nothere");
                assert_eq!(file, "b.abnf");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn import_of_missing_file_fails() {
        let a = file(
            "; !syntax(\"abnf\")\n; !import(\"label\", \"absent.abnf\")\nr = label",
            "a.abnf",
        );
        let err = link(&[a]).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedImport { .. }));
    }

    #[test]
    fn unresolved_reference_fails() {
        let err = link(&[file("; !syntax(\"abnf\")\nr = ghost", "g.abnf")]).unwrap_err();
        match err {
            EngineError::UnresolvedSymbol { symbol, rule, .. } => {
                assert_eq!(symbol, "ghost");
                assert_eq!(rule, "r");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn rfc1035_has_no_core_rules_injected() {
        let err = link(&[file("; !syntax(\"abnf-rfc1035\")\n<r> ::= <digit>", "g.bnf")]).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedSymbol { .. }));
    }
}
