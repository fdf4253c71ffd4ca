//! Detection patterns for the existence check
//!
//! `iptables -S` never renders an ad-hoc insert position, so a positioned
//! rule (`INPUT 2 -p tcp ...`) is normalized into `2 -A INPUT -p tcp ...` and
//! compared against listing lines prefixed with their rule number.
//!
//! How a pattern is compared against a line is a [`RuleDetector`]. The
//! default [`RegexDetection`] treats the compiled rule as an unanchored
//! regular expression, which is what deployed rule comments are written
//! against: `.` in an address or `[` in a comment are regex syntax. Verbatim
//! containment also counts as a match, since `eth+` or `(public)` are regex
//! syntax that does not match its own text. [`LiteralDetection`] does plain
//! substring containment only.

use crate::core::compiler::CompiledRule;
use crate::core::rule::FirewallRuleSpec;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Builds the detection pattern for a compiled rule.
///
/// Without a position the pattern is the compiled text. With one, the first
/// `<CHAIN> <n>` pair is rewritten to `<n> -A <CHAIN>`.
pub fn detection_pattern(spec: &FirewallRuleSpec, compiled: &CompiledRule) -> String {
    if spec.position.is_none() {
        return compiled.as_str().to_string();
    }

    let chain = spec.chain().as_str();
    match Regex::new(&format!(r"{}\s(\d+)", regex::escape(chain))) {
        Ok(re) => re
            .replacen(compiled.as_str(), 1, format!("${{1}} -A {chain}"))
            .into_owned(),
        Err(e) => {
            debug!("Position rewrite pattern failed to build: {e}");
            compiled.as_str().to_string()
        }
    }
}

/// A compiled detection pattern, ready to test listing lines
///
/// A line matches when the regex (if any) matches or when it contains the
/// pattern text verbatim, so a rule always detects its own listing line.
/// Anchored matchers only accept hits at the start of the line.
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Option<Regex>,
    literal: String,
    anchored: bool,
}

impl Matcher {
    pub fn literal(pattern: &str, anchored: bool) -> Self {
        Self {
            regex: None,
            literal: pattern.to_string(),
            anchored,
        }
    }

    /// Returns `Err` if `pattern` is not a valid regular expression
    pub fn regex(pattern: &str, anchored: bool) -> Result<Self, regex::Error> {
        let re = if anchored {
            Regex::new(&format!("^(?:{pattern})"))?
        } else {
            Regex::new(pattern)?
        };
        Ok(Self {
            regex: Some(re),
            ..Self::literal(pattern, anchored)
        })
    }

    pub fn is_regex(&self) -> bool {
        self.regex.is_some()
    }

    pub fn is_match(&self, line: &str) -> bool {
        let literal_hit = if self.anchored {
            line.starts_with(self.literal.as_str())
        } else {
            line.contains(self.literal.as_str())
        };
        literal_hit || self.regex.as_ref().is_some_and(|re| re.is_match(line))
    }
}

/// Strategy for turning a detection pattern into a [`Matcher`]
///
/// `anchored` is set for positioned rules, whose pattern starts with the rule
/// number and must match from the start of a numbered line.
pub trait RuleDetector {
    fn matcher(&self, pattern: &str, anchored: bool) -> Matcher;
}

/// Pattern is a regular expression; unparsable patterns fall back to
/// substring containment
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexDetection;

impl RuleDetector for RegexDetection {
    fn matcher(&self, pattern: &str, anchored: bool) -> Matcher {
        Matcher::regex(pattern, anchored).unwrap_or_else(|e| {
            debug!("Detection pattern is not a valid regex, matching literally: {e}");
            Matcher::literal(pattern, anchored)
        })
    }
}

/// Pattern is matched as a plain substring
#[derive(Debug, Clone, Copy, Default)]
pub struct LiteralDetection;

impl RuleDetector for LiteralDetection {
    fn matcher(&self, pattern: &str, anchored: bool) -> Matcher {
        Matcher::literal(pattern, anchored)
    }
}

/// Detection strategy selected in configuration
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DetectionMode {
    #[default]
    Regex,
    Literal,
}

impl DetectionMode {
    pub fn detector(self) -> Box<dyn RuleDetector> {
        match self {
            DetectionMode::Regex => Box::new(RegexDetection),
            DetectionMode::Literal => Box::new(LiteralDetection),
        }
    }
}
