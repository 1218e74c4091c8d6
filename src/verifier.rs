//! Memoized recursive-descent verification
//!
//! Matches input text against a start symbol of a linked grammar. Rule
//! results are memoized per (rule, offset), so a rule is evaluated at most
//! once per position. Re-entering a rule at the same position while it is
//! still being evaluated fails that branch, which turns left-recursive
//! grammars into rejections instead of infinite descent.
//!
//! Repetitions are greedy but back off within their enclosing sequence: the
//! iteration count is reduced from the greedy maximum until the rest of the
//! sequence matches. Alternation choices are committed once taken; under the
//! longest-match policy every branch is evaluated and the one consuming the
//! most input wins, with ties going to declaration order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::ast::{fold_name, Expr, Terminal};
use crate::dialect::AlternationPolicy;
use crate::error::{EngineError, ResourceLimit, Result};
use crate::input_stream::InputStream;
use crate::linker::UnifiedGrammar;

/// Resource bounds for one verification run.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum rule nesting depth.
    pub max_depth: usize,
    /// Optional wall-clock bound.
    pub timeout: Option<Duration>,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_depth: 256,
            timeout: None,
        }
    }
}

/// Outcome of verifying one input against one start symbol.
///
/// Rejection is a result, not an error. `failure_position` is the deepest
/// character offset reached by any failed match attempt, and
/// `failure_trace` is the rule stack (outermost first) active there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub accepted: bool,
    /// Characters consumed by the start rule's match, 0 when nothing matched.
    pub consumed: usize,
    pub failure_position: Option<usize>,
    pub failure_trace: Vec<String>,
}

impl VerificationResult {
    fn accepted(consumed: usize) -> Self {
        VerificationResult {
            accepted: true,
            consumed,
            failure_position: None,
            failure_trace: Vec::new(),
        }
    }
}

/// Verify `input` against `start` in the linked grammar. The whole input
/// must be consumed for acceptance.
pub fn verify(
    grammar: &UnifiedGrammar,
    start: &str,
    input: &str,
    limits: &Limits,
) -> Result<VerificationResult> {
    if !grammar.rules.contains(start) {
        return Err(EngineError::UndefinedStartSymbol {
            symbol: start.to_string(),
        });
    }

    let stream = InputStream::new(input);
    let mut ctx = MatchCtx {
        grammar,
        stream: &stream,
        limits,
        deadline: limits.timeout.map(|t| Instant::now() + t),
        ticks: 0,
        memo: HashMap::new(),
        stack: Vec::new(),
        deepest_offset: 0,
        deepest_trace: Vec::new(),
    };

    let matched = ctx.match_rule(start, 0)?;
    let result = match matched {
        Some(end) if end == stream.len() => VerificationResult::accepted(end),
        Some(end) => {
            // Matched a prefix; the rest of the input is unaccounted for.
            let (position, trace) = if ctx.deepest_offset > end {
                (ctx.deepest_offset, ctx.deepest_trace)
            } else {
                (end, vec![start.to_string()])
            };
            VerificationResult {
                accepted: false,
                consumed: end,
                failure_position: Some(position),
                failure_trace: trace,
            }
        }
        None => VerificationResult {
            accepted: false,
            consumed: 0,
            failure_position: Some(ctx.deepest_offset),
            failure_trace: ctx.deepest_trace,
        },
    };

    debug!(
        start,
        accepted = result.accepted,
        consumed = result.consumed,
        "verification finished"
    );
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Memo {
    InProgress,
    Done(Option<usize>),
}

struct MatchCtx<'a> {
    grammar: &'a UnifiedGrammar,
    stream: &'a InputStream,
    limits: &'a Limits,
    deadline: Option<Instant>,
    ticks: u64,
    /// (folded rule name, offset) -> match outcome.
    memo: HashMap<(String, usize), Memo>,
    stack: Vec<String>,
    deepest_offset: usize,
    deepest_trace: Vec<String>,
}

impl<'a> MatchCtx<'a> {
    /// Timeouts must fire even when backtracking never enters a rule, so
    /// every expression step polls the deadline. `Instant::now` is not
    /// free; only every 64th step actually reads the clock.
    fn check_deadline(&mut self) -> Result<()> {
        if self.ticks % 64 == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(EngineError::ResourceExceeded(ResourceLimit::Timeout));
                }
            }
        }
        self.ticks = self.ticks.wrapping_add(1);
        Ok(())
    }

    /// Match a rule at an offset, returning the end offset on success.
    fn match_rule(&mut self, name: &str, offset: usize) -> Result<Option<usize>> {
        let key = (fold_name(name), offset);
        match self.memo.get(&key) {
            Some(Memo::Done(result)) => return Ok(*result),
            // Already evaluating this rule here: a left-recursive cycle.
            Some(Memo::InProgress) => return Ok(None),
            None => {}
        }

        if self.stack.len() >= self.limits.max_depth {
            return Err(EngineError::ResourceExceeded(ResourceLimit::Depth(
                self.limits.max_depth,
            )));
        }

        let rule = self
            .grammar
            .rules
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| EngineError::UndefinedStartSymbol {
                symbol: name.to_string(),
            })?;

        self.memo.insert(key.clone(), Memo::InProgress);
        self.stack.push(rule.name.clone());
        let outcome = self.match_expr(&rule.expr, offset);
        self.stack.pop();
        let result = outcome?;
        self.memo.insert(key, Memo::Done(result));
        Ok(result)
    }

    fn match_expr(&mut self, expr: &Expr, offset: usize) -> Result<Option<usize>> {
        self.check_deadline()?;
        match expr {
            Expr::Terminal(terminal) => Ok(self.match_terminal(terminal, offset)),
            Expr::RuleRef(name) => self.match_rule(name, offset),
            Expr::Sequence(items) => self.match_children(items, offset),
            Expr::Alternation(alts) => self.match_alternation(alts, offset),
            Expr::Repetition { inner, min, max } => {
                // Standalone repetition: greedy is optimal since nothing
                // follows within this expression.
                let (ends, nullable) = self.repetition_ends(inner, offset, *max)?;
                if !min_reachable(ends.len(), nullable, *min, *max) {
                    return Ok(None);
                }
                Ok(ends.last().copied())
            }
        }
    }

    fn match_terminal(&mut self, terminal: &Terminal, offset: usize) -> Option<usize> {
        let matched = match terminal {
            Terminal::Literal { text, exact } => {
                let fold = !*exact && !self.grammar.dialect.case_sensitive_literals;
                let mut pos = offset;
                let mut ok = true;
                for expected in text.chars() {
                    match self.stream.at(pos) {
                        Some(actual)
                            if actual == expected
                                || (fold && actual.eq_ignore_ascii_case(&expected)) =>
                        {
                            pos += 1;
                        }
                        _ => {
                            ok = false;
                            break;
                        }
                    }
                }
                ok.then_some(pos)
            }
            Terminal::Range { lo, hi } => match self.stream.at(offset) {
                Some(ch) if ch >= *lo && ch <= *hi => Some(offset + 1),
                _ => None,
            },
        };

        if matched.is_none() {
            self.record_failure(offset);
        }
        matched
    }

    fn match_alternation(&mut self, alts: &[Expr], offset: usize) -> Result<Option<usize>> {
        match self.grammar.dialect.alternation {
            AlternationPolicy::FirstMatch => {
                for alt in alts {
                    if let Some(end) = self.match_expr(alt, offset)? {
                        return Ok(Some(end));
                    }
                }
                Ok(None)
            }
            AlternationPolicy::LongestMatch => {
                let mut best: Option<usize> = None;
                for alt in alts {
                    if let Some(end) = self.match_expr(alt, offset)? {
                        // Strictly greater keeps declaration order on ties.
                        if best.map_or(true, |b| end > b) {
                            best = Some(end);
                        }
                    }
                }
                Ok(best)
            }
        }
    }

    /// Match a sequence with repetition back-off: a repetition item first
    /// takes its greedy count, then yields iterations back until the rest of
    /// the sequence matches.
    fn match_children(&mut self, items: &[Expr], offset: usize) -> Result<Option<usize>> {
        let Some((first, rest)) = items.split_first() else {
            return Ok(Some(offset));
        };

        if let Expr::Repetition { inner, min, max } = first {
            let (ends, nullable) = self.repetition_ends(inner, offset, *max)?;
            if !min_reachable(ends.len(), nullable, *min, *max) {
                return Ok(None);
            }
            // When empty padding is what reaches the minimum, the only
            // candidate is the position after all consuming iterations.
            let lowest = (*min as usize).min(ends.len() - 1);
            for count in (lowest..ends.len()).rev() {
                if let Some(end) = self.match_children(rest, ends[count])? {
                    return Ok(Some(end));
                }
            }
            return Ok(None);
        }

        match self.match_expr(first, offset)? {
            Some(end) => self.match_children(rest, end),
            None => Ok(None),
        }
    }

    /// End offsets after 0, 1, 2, ... consuming iterations of `inner`, plus
    /// whether the next iteration would match without consuming. The scan
    /// stops at the bound, at the first failure, or at an empty match; an
    /// empty match can still satisfy a minimum count, since padding with
    /// empty iterations never moves the cursor.
    fn repetition_ends(
        &mut self,
        inner: &Expr,
        offset: usize,
        max: Option<u32>,
    ) -> Result<(Vec<usize>, bool)> {
        let mut ends = vec![offset];
        let mut cursor = offset;
        let mut nullable = false;
        while max.map_or(true, |m| (ends.len() as u32) <= m) {
            match self.match_expr(inner, cursor)? {
                Some(end) if end > cursor => {
                    ends.push(end);
                    cursor = end;
                }
                Some(_) => {
                    nullable = true;
                    break;
                }
                None => break,
            }
        }
        Ok((ends, nullable))
    }

    fn record_failure(&mut self, offset: usize) {
        if offset >= self.deepest_offset {
            self.deepest_offset = offset;
            self.deepest_trace = self.stack.clone();
        }
    }
}

/// Whether a repetition reaches its minimum count: either enough consuming
/// iterations, or an empty-matching iteration that can be repeated up to
/// the bound.
fn min_reachable(ends: usize, nullable: bool, min: u32, max: Option<u32>) -> bool {
    ends > min as usize || (nullable && max.map_or(true, |m| m >= min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar_parser::parse_grammar_file;
    use crate::linker::link;

    fn grammar(source: &str) -> UnifiedGrammar {
        let tagged = format!("; !syntax(\"abnf\")\n{}", source);
        link(&[parse_grammar_file(&tagged, "test.abnf").expect("parse failed")])
            .expect("link failed")
    }

    fn grammar_1035(source: &str) -> UnifiedGrammar {
        let tagged = format!("; !syntax(\"abnf-rfc1035\")\n{}", source);
        link(&[parse_grammar_file(&tagged, "test.bnf").expect("parse failed")])
            .expect("link failed")
    }

    fn run(g: &UnifiedGrammar, start: &str, input: &str) -> VerificationResult {
        verify(g, start, input, &Limits::default()).expect("verify failed")
    }

    #[test]
    fn single_character_alternation() {
        let g = grammar("digit = \"0\" / \"1\" / \"2\"");

        let ok = run(&g, "digit", "1");
        assert!(ok.accepted);
        assert_eq!(ok.consumed, 1);

        let bad = run(&g, "digit", "3");
        assert!(!bad.accepted);
        assert_eq!(bad.failure_position, Some(0));
        assert_eq!(bad.failure_trace, vec!["digit".to_string()]);
    }

    #[test]
    fn sequence_failure_reports_deepest_offset() {
        let g = grammar("digit = \"0\" / \"1\" / \"2\"\nnum = digit digit");

        assert!(run(&g, "num", "01").accepted);

        let bad = run(&g, "num", "0");
        assert!(!bad.accepted);
        assert_eq!(bad.failure_position, Some(1));
        assert_eq!(
            bad.failure_trace,
            vec!["num".to_string(), "digit".to_string()]
        );
    }

    #[test]
    fn full_consumption_is_required() {
        let g = grammar("digit = \"0\" / \"1\"");
        let result = run(&g, "digit", "10");
        assert!(!result.accepted);
        assert_eq!(result.consumed, 1);
        assert_eq!(result.failure_position, Some(1));
    }

    #[test]
    fn empty_input_matches_zero_minimum_repetition() {
        let g = grammar("r = *DIGIT");
        let result = run(&g, "r", "");
        assert!(result.accepted);
        assert_eq!(result.consumed, 0);
    }

    #[test]
    fn repetition_backs_off_for_rest_of_sequence() {
        // Greedy 2 "a"s would leave "ab" unmatchable; one iteration works.
        let g = grammar("r = 1*2\"a\" \"ab\"");
        assert!(run(&g, "r", "aab").accepted);
    }

    #[test]
    fn nullable_repetition_satisfies_minimum_count() {
        // Each of the two required iterations may derive empty, so the
        // language is {"", "x", "xx"}.
        let g = grammar("r = 2*2[\"x\"]");
        assert!(run(&g, "r", "").accepted);
        assert!(run(&g, "r", "x").accepted);
        assert!(run(&g, "r", "xx").accepted);
        assert!(!run(&g, "r", "xxx").accepted);
    }

    #[test]
    fn nullable_repetition_inside_sequence() {
        let g = grammar("r = 2*2[\"x\"] \"y\"");
        assert!(run(&g, "r", "y").accepted);
        assert!(run(&g, "r", "xy").accepted);
        assert!(run(&g, "r", "xxy").accepted);
        assert!(!run(&g, "r", "xxxy").accepted);
    }

    #[test]
    fn unbounded_nullable_repetition_still_terminates() {
        let g = grammar("r = *[\"x\"]");
        assert!(run(&g, "r", "").accepted);
        assert!(run(&g, "r", "xxx").accepted);
    }

    #[test]
    fn minimum_above_maximum_never_matches() {
        let g = grammar("r = 3*2\"a\"");
        assert!(!run(&g, "r", "aa").accepted);
        assert!(!run(&g, "r", "aaa").accepted);
    }

    #[test]
    fn repetition_bounds_are_enforced() {
        let g = grammar("r = 2*3DIGIT");
        assert!(!run(&g, "r", "1").accepted);
        assert!(run(&g, "r", "12").accepted);
        assert!(run(&g, "r", "123").accepted);
        assert!(!run(&g, "r", "1234").accepted);
    }

    #[test]
    fn quoted_literals_fold_case() {
        let g = grammar("r = \"abc\"");
        assert!(run(&g, "r", "AbC").accepted);
    }

    #[test]
    fn numeric_literals_are_exact() {
        let g = grammar("r = %d65");
        assert!(run(&g, "r", "A").accepted);
        assert!(!run(&g, "r", "a").accepted);
    }

    #[test]
    fn longest_match_wins_in_abnf() {
        let g = grammar("r = \"a\" / \"ab\"");
        assert!(run(&g, "r", "ab").accepted);
    }

    #[test]
    fn first_match_wins_in_rfc1035() {
        let g = grammar_1035("<r> ::= \"a\" | \"ab\"");
        let result = run(&g, "r", "ab");
        assert!(!result.accepted);
        assert_eq!(result.consumed, 1);
    }

    #[test]
    fn right_recursion_matches() {
        let g = grammar("list = \"x\" list / \"x\"");
        assert!(run(&g, "list", "xxx").accepted);
        assert!(!run(&g, "list", "").accepted);
    }

    #[test]
    fn left_recursion_rejects_instead_of_looping() {
        let g = grammar("list = list \"x\" / \"x\"");
        assert!(run(&g, "list", "x").accepted);
        assert!(!run(&g, "list", "xx").accepted);
    }

    #[test]
    fn depth_limit_is_reported() {
        let g = grammar("list = \"x\" list / \"x\"");
        let limits = Limits {
            max_depth: 5,
            timeout: None,
        };
        let err = verify(&g, "list", "xxxxxxxxxx", &limits).unwrap_err();
        assert_eq!(
            err,
            EngineError::ResourceExceeded(ResourceLimit::Depth(5))
        );
    }

    #[test]
    fn timeout_fires_during_repetition_backtracking() {
        // Six unbounded repetitions with no rule call between them: the
        // back-off search is exponential, so only the per-step deadline
        // poll can stop it.
        let g = grammar("r = *\"a\" *\"a\" *\"a\" *\"a\" *\"a\" *\"a\" \"b\"");
        let limits = Limits {
            max_depth: 256,
            timeout: Some(Duration::from_millis(20)),
        };
        let err = verify(&g, "r", &"a".repeat(60), &limits).unwrap_err();
        assert_eq!(err, EngineError::ResourceExceeded(ResourceLimit::Timeout));
    }

    #[test]
    fn expired_deadline_is_reported() {
        let g = grammar("r = \"a\"");
        let limits = Limits {
            max_depth: 256,
            timeout: Some(Duration::ZERO),
        };
        let err = verify(&g, "r", "a", &limits).unwrap_err();
        assert_eq!(err, EngineError::ResourceExceeded(ResourceLimit::Timeout));
    }

    #[test]
    fn undefined_start_symbol_is_an_error() {
        let g = grammar("r = \"a\"");
        let err = verify(&g, "missing", "a", &Limits::default()).unwrap_err();
        assert!(matches!(err, EngineError::UndefinedStartSymbol { .. }));
    }

    #[test]
    fn core_rules_are_usable() {
        let g = grammar("hex = 1*HEXDIG");
        assert!(run(&g, "hex", "7FfF").accepted);
        assert!(!run(&g, "hex", "7G").accepted);
    }

    #[test]
    fn rule_names_fold_case_at_verify_time() {
        let g = grammar("Num = 1*DIGIT");
        assert!(run(&g, "num", "42").accepted);
        assert!(run(&g, "NUM", "42").accepted);
    }
}
