//! Ordered rewrite tables.
//!
//! A [`RuleSet`] is an immutable list of literal or regex rewrites applied in
//! sequence. Tables are built once behind `once_cell::sync::Lazy` and shared
//! across threads. A pattern that fails to compile is logged and left out,
//! so applying a set never fails.

use std::borrow::Cow;

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
enum Rewrite {
    Literal { from: &'static str, to: &'static str },
    Pattern { regex: Regex, replacement: &'static str },
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    /// The rule only fires when the text contains this substring.
    pub guard: Option<&'static str>,
    rewrite: Rewrite,
}

impl Rule {
    pub fn literal(name: &'static str, from: &'static str, to: &'static str) -> Self {
        Self {
            name,
            guard: None,
            rewrite: Rewrite::Literal { from, to },
        }
    }

    pub fn pattern(name: &'static str, pattern: &str, replacement: &'static str) -> Option<Self> {
        match Regex::new(pattern) {
            Ok(regex) => Some(Self {
                name,
                guard: None,
                rewrite: Rewrite::Pattern { regex, replacement },
            }),
            Err(err) => {
                warn!(rule = name, error = %err, "dropping rule with invalid pattern");
                None
            }
        }
    }

    pub fn when(mut self, guard: &'static str) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if let Some(guard) = self.guard {
            if !text.contains(guard) {
                return Cow::Borrowed(text);
            }
        }
        match &self.rewrite {
            Rewrite::Literal { from, to } => {
                if from.is_empty() || !text.contains(from) {
                    Cow::Borrowed(text)
                } else {
                    Cow::Owned(text.replace(from, to))
                }
            }
            Rewrite::Pattern { regex, replacement } => regex.replace_all(text, *replacement),
        }
    }

    /// Length used for longest-first ordering of literal tables.
    fn key_len(&self) -> usize {
        match &self.rewrite {
            Rewrite::Literal { from, .. } => from.chars().count(),
            Rewrite::Pattern { .. } => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Builds a set from `(name, pattern, replacement)` triples.
    pub fn patterns(table: &[(&'static str, &'static str, &'static str)]) -> Self {
        Self::new(
            table
                .iter()
                .filter_map(|&(name, pattern, replacement)| Rule::pattern(name, pattern, replacement))
                .collect(),
        )
    }

    /// Builds a literal set from `(from, to)` pairs, longest `from` first so a
    /// short key never eats part of a longer one.
    pub fn literals_longest_first(name: &'static str, table: &[(&'static str, &'static str)]) -> Self {
        let mut rules: Vec<Rule> = table
            .iter()
            .map(|&(from, to)| Rule::literal(name, from, to))
            .collect();
        rules.sort_by(|a, b| b.key_len().cmp(&a.key_len()));
        Self::new(rules)
    }

    pub fn then(mut self, other: RuleSet) -> Self {
        self.rules.extend(other.rules);
        self
    }

    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for rule in &self.rules {
            let rewritten = match rule.apply(&current) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(rewritten) => rewritten,
            };
            current = rewritten;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn longest_literal_wins() {
        let set = RuleSet::literals_longest_first("demo", &[("a", "A"), ("abc", "X")]);
        assert_eq!(set.apply("abc a"), "X A");
    }

    #[test]
    fn invalid_pattern_is_dropped() {
        let set = RuleSet::patterns(&[("broken", "(unclosed", ""), ("digits", r"\d+", "#")]);
        assert_eq!(set.apply("a1b22"), "a#b#");
        assert_eq!(set.apply("(unclosed 7"), "(unclosed #");
    }

    #[test]
    fn guard_limits_rule_to_matching_text() {
        let rule = Rule::literal("dx", "dx", "d x").when("int");
        assert_eq!(rule.apply("int f dx"), "int f d x");
        assert_eq!(rule.apply("f dx"), "f dx");
    }
}
