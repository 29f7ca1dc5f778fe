//! Address pattern matching.
//!
//! Four rule categories, evaluated in a fixed precedence:
//! - Symmetric: placeholder templates capturing repeated characters
//! - Specific: literal prefix and suffix
//! - Edges: a long run of one character at either end
//! - Regexp: arbitrary regular expressions
//!
//! A [`RuleSet`] is immutable once built and is shared read-only by all workers.

mod pattern;
mod rules;

pub use pattern::{
    EdgeRule, EdgeSide, MatchResult, RegexpRule, Rule, RuleKind, RuleSet, SpecificRule,
    SymmetricRule, PLACEHOLDERS,
};
pub use rules::{AffixEntry, EdgesEntry, PatternsFile, RegexpEntry};
