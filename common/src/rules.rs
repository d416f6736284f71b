//! Replacement rules and the line rewriter.
//!
//! A [`RuleSet`] is an ordered list of case-insensitive patterns, each paired with a literal
//! placeholder token. Rules are applied one after another, each to the output of the previous
//! one. Matching works on raw bytes so that lines which are not valid UTF-8 are still rewritten
//! instead of being rejected.

use std::borrow::Cow;

use regex::bytes::{NoExpand, Regex, RegexBuilder};

/// Rules applied to every line when no other rule set is configured.
pub const BUILTIN_RULES: &[(&str, &str)] = &[("amet", "AMET_REPLACE"), ("enim", "ENIM_REPLACE")];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid replacement pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Regex,
    replacement: Vec<u8>,
}

impl Rule {
    /// Compiles `pattern` case-insensitively; `replacement` is inserted literally (no `$1`
    /// expansion).
    fn new(pattern: &str, replacement: &str) -> Result<Self, Error> {
        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| Error::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            pattern: compiled,
            replacement: replacement.as_bytes().to_vec(),
        })
    }
}

/// Result of rewriting a single line.
#[derive(Debug)]
pub struct Rewrite<'a> {
    pub line: Cow<'a, [u8]>,
    pub replacements: usize,
}

/// Immutable, ordered set of replacement rules.
///
/// Built once at startup and shared (usually behind an `Arc`) by every file task.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: &[(&str, &str)]) -> Result<Self, Error> {
        let rules = rules
            .iter()
            .map(|(pattern, replacement)| Rule::new(pattern, replacement))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn builtin() -> Result<Self, Error> {
        Self::new(BUILTIN_RULES)
    }

    /// Applies every rule in order. Lines without any match are returned borrowed.
    #[must_use]
    pub fn rewrite_line<'a>(&self, input: &'a [u8]) -> Rewrite<'a> {
        let mut line = Cow::Borrowed(input);
        let mut replacements = 0;
        for rule in &self.rules {
            let count = rule.pattern.find_iter(&line).count();
            if count == 0 {
                continue;
            }
            replacements += count;
            line = Cow::Owned(
                rule.pattern
                    .replace_all(&line, NoExpand(rule.replacement.as_slice()))
                    .into_owned(),
            );
        }
        Rewrite { line, replacements }
    }
}
