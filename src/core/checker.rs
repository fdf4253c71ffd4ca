//! Existence checker
//!
//! Decides whether a compiled rule is already present in the live rule table
//! by listing its chain and matching the detection pattern line by line.
//!
//! Listing failures fail closed: the rule is reported absent so the applier
//! attempts the mutation, which then fails loudly if something is really
//! wrong.

use crate::core::backend::PacketFilter;
use crate::core::compiler::CompiledRule;
use crate::core::detect::{Matcher, RuleDetector, detection_pattern};
use crate::core::error::{Error, Result};
use crate::core::rule::FirewallRuleSpec;
use tracing::debug;

/// Returns true when `line` is a chain policy declaration (`-P INPUT ACCEPT`)
fn is_policy_line(line: &str) -> bool {
    line.chars().nth(1) == Some('P')
}

/// Scans `-S` output for a match.
///
/// Policy lines are skipped; every other line is numbered from 1. With
/// `numbered`, each line is compared as `<n> <line>`.
pub fn find_match<S: AsRef<str>>(matcher: &Matcher, lines: &[S], numbered: bool) -> Option<usize> {
    let mut rule_number = 0;
    for line in lines {
        let line = line.as_ref();
        if is_policy_line(line) {
            continue;
        }
        rule_number += 1;
        let hit = if numbered {
            matcher.is_match(&format!("{rule_number} {line}"))
        } else {
            matcher.is_match(line)
        };
        if hit {
            return Some(rule_number);
        }
    }
    None
}

/// Reports whether `compiled` already exists in the chain selected by `spec`.
///
/// # Errors
///
/// Returns `Error::ContractViolation` if `compiled` is empty. Listing
/// failures are not errors: they yield `Ok(false)`.
pub fn exists(
    spec: &FirewallRuleSpec,
    compiled: &CompiledRule,
    backend: &dyn PacketFilter,
    detector: &dyn RuleDetector,
) -> Result<bool> {
    if compiled.is_empty() {
        return Err(Error::ContractViolation("no rule supplied".to_string()));
    }

    let pattern = detection_pattern(spec, compiled);
    let matcher = detector.matcher(&pattern, spec.position.is_some());
    let chain = spec.chain();

    let lines = match backend.list_chain(chain) {
        Ok(lines) => lines,
        Err(e) => {
            debug!("{}: check fails with: {e}", spec.display_name());
            debug!(
                "{}: assuming rule {compiled} does not exist",
                spec.display_name()
            );
            return Ok(false);
        }
    };

    match find_match(&matcher, &lines, spec.position.is_some()) {
        Some(rule_number) => {
            debug!("{}: matched rule #{rule_number} in {chain}", spec.display_name());
            Ok(true)
        }
        None => Ok(false),
    }
}
