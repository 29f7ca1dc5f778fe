//! Rule evaluation.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::crypto::strip_hex_prefix;

/// The category a rule belongs to. Categories are evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    Symmetric,
    Specific,
    Edges,
    Regexp,
}

impl RuleKind {
    pub const ALL: [RuleKind; 4] = [
        RuleKind::Symmetric,
        RuleKind::Specific,
        RuleKind::Edges,
        RuleKind::Regexp,
    ];

    /// Name used for record files and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            RuleKind::Symmetric => "symmetric",
            RuleKind::Specific => "specific",
            RuleKind::Edges => "edges",
            RuleKind::Regexp => "regexp",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which end of the address an edge rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeSide {
    #[default]
    Any,
    Prefix,
    Suffix,
}

impl FromStr for EdgeSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(EdgeSide::Any),
            "prefix" => Ok(EdgeSide::Prefix),
            "suffix" => Ok(EdgeSide::Suffix),
            _ => Err(format!("Unknown edge side: {}", s)),
        }
    }
}

impl fmt::Display for EdgeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeSide::Any => write!(f, "any"),
            EdgeSide::Prefix => write!(f, "prefix"),
            EdgeSide::Suffix => write!(f, "suffix"),
        }
    }
}

/// Outcome of a successful evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchResult {
    /// Category of the matching rule
    pub kind: RuleKind,
    /// Position of the rule within its category
    pub index: usize,
    /// Copied from the matching rule
    pub is_final: bool,
}

/// Placeholder symbols allowed in symmetric templates.
pub const PLACEHOLDERS: [u8; 2] = [b'X', b'Y'];

/// Prefix/suffix templates made of placeholders that capture repeated characters.
#[derive(Debug, Clone)]
pub struct SymmetricRule {
    pub index: usize,
    pub prefix: String,
    pub suffix: String,
    pub is_final: bool,
}

impl SymmetricRule {
    fn matches(&self, address: &str) -> bool {
        let addr = address.as_bytes();
        let (pre, suf) = (self.prefix.as_bytes(), self.suffix.as_bytes());
        if addr.len() < pre.len() + suf.len() {
            return false;
        }

        let Some(head) = capture(pre, &addr[..pre.len()]) else {
            return false;
        };
        let Some(tail) = capture(suf, &addr[addr.len() - suf.len()..]) else {
            return false;
        };

        let shared = PLACEHOLDERS
            .iter()
            .any(|p| pre.contains(p) && suf.contains(p));
        !shared || head == tail
    }
}

/// Captures the single character every placeholder of `template` stands for
/// within `part`.
///
/// Returns `None` if the template holds a non-placeholder character or two
/// placeholder positions see different characters.
#[inline]
fn capture(template: &[u8], part: &[u8]) -> Option<Option<u8>> {
    let mut symbol = None;
    for (&t, &c) in template.iter().zip(part) {
        if !PLACEHOLDERS.contains(&t) {
            return None;
        }
        match symbol {
            None => symbol = Some(c),
            Some(bound) if bound == c => {}
            Some(_) => return None,
        }
    }
    Some(symbol)
}

/// Literal prefix and suffix.
#[derive(Debug, Clone)]
pub struct SpecificRule {
    pub index: usize,
    pub prefix: String,
    pub suffix: String,
    pub is_final: bool,
}

impl SpecificRule {
    #[inline]
    fn matches(&self, address: &str) -> bool {
        address.starts_with(&self.prefix) && address.ends_with(&self.suffix)
    }

    /// Expected attempts before a hit, for an alphabet of `alphabet` symbols.
    pub fn estimated_difficulty(&self, alphabet: usize) -> u64 {
        let len = (self.prefix.len() + self.suffix.len()) as u32;
        (alphabet.max(1) as u64).saturating_pow(len)
    }
}

/// A run of one repeated character at an edge of the address.
#[derive(Debug, Clone)]
pub struct EdgeRule {
    pub min_count: usize,
    pub side: EdgeSide,
    pub is_final: bool,
}

impl EdgeRule {
    fn matches(&self, address: &str) -> bool {
        let check_prefix = matches!(self.side, EdgeSide::Prefix | EdgeSide::Any);
        let check_suffix = matches!(self.side, EdgeSide::Suffix | EdgeSide::Any);

        (check_prefix && leading_run(address.bytes()) >= self.min_count)
            || (check_suffix && leading_run(address.bytes().rev()) >= self.min_count)
    }
}

/// Length of the run of the first byte yielded by `bytes`.
fn leading_run(mut bytes: impl Iterator<Item = u8>) -> usize {
    match bytes.next() {
        Some(first) => 1 + bytes.take_while(|&b| b == first).count(),
        None => 0,
    }
}

/// A regular expression over the address body.
#[derive(Debug, Clone)]
pub struct RegexpRule {
    pub index: usize,
    pub pattern: String,
    /// `None` when the pattern failed to compile; such rules never match.
    pub compiled: Option<Regex>,
    pub is_final: bool,
}

impl RegexpRule {
    #[inline]
    fn matches(&self, address: &str) -> bool {
        self.compiled.as_ref().is_some_and(|re| re.is_match(address))
    }
}

/// One configured rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Symmetric(SymmetricRule),
    Specific(SpecificRule),
    Edge(EdgeRule),
    Regexp(RegexpRule),
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::Symmetric(_) => RuleKind::Symmetric,
            Rule::Specific(_) => RuleKind::Specific,
            Rule::Edge(_) => RuleKind::Edges,
            Rule::Regexp(_) => RuleKind::Regexp,
        }
    }

    /// Position within the rule's category. The edge rule is always 0.
    pub fn index(&self) -> usize {
        match self {
            Rule::Symmetric(r) => r.index,
            Rule::Specific(r) => r.index,
            Rule::Edge(_) => 0,
            Rule::Regexp(r) => r.index,
        }
    }

    pub fn is_final(&self) -> bool {
        match self {
            Rule::Symmetric(r) => r.is_final,
            Rule::Specific(r) => r.is_final,
            Rule::Edge(r) => r.is_final,
            Rule::Regexp(r) => r.is_final,
        }
    }

    /// Tests an already normalized address body.
    #[inline]
    pub fn matches(&self, address: &str) -> bool {
        match self {
            Rule::Symmetric(r) => r.matches(address),
            Rule::Specific(r) => r.matches(address),
            Rule::Edge(r) => r.matches(address),
            Rule::Regexp(r) => r.matches(address),
        }
    }

    fn result(&self) -> MatchResult {
        MatchResult {
            kind: self.kind(),
            index: self.index(),
            is_final: self.is_final(),
        }
    }
}

/// An immutable, validated set of rules.
///
/// Rules are stored in evaluation order (symmetric, specific, edges,
/// regexp; each category in listed order) so the first hit wins.
#[derive(Debug, Clone)]
pub struct RuleSet {
    case_sensitive: bool,
    symbols: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Assembles a rule set. Rules are sorted into evaluation order;
    /// literals must already be normalized for `case_sensitive`.
    pub(crate) fn from_parts(case_sensitive: bool, symbols: String, mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|rule| (rule.kind(), rule.index()));
        Self {
            case_sensitive,
            symbols,
            rules,
        }
    }

    /// Evaluates `address` against every rule, returning the first match.
    ///
    /// A leading `0x` is ignored. Without case sensitivity the address is
    /// lower-cased first.
    pub fn evaluate(&self, address: &str) -> Option<MatchResult> {
        let body = strip_hex_prefix(address);
        let check: Cow<'_, str> = if self.case_sensitive {
            Cow::Borrowed(body)
        } else {
            Cow::Owned(body.to_lowercase())
        };

        self.rules
            .iter()
            .find(|rule| rule.matches(&check))
            .map(Rule::result)
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// The address alphabet declared by the configuration.
    pub fn symbols(&self) -> &str {
        &self.symbols
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of rules in a category.
    pub fn count(&self, kind: RuleKind) -> usize {
        self.rules.iter().filter(|rule| rule.kind() == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule ends the run when matched.
    pub fn has_final(&self) -> bool {
        self.rules.iter().any(Rule::is_final)
    }

    /// Size of the alphabet used for difficulty estimates.
    pub fn alphabet_size(&self) -> usize {
        let mut symbols: Vec<char> = if self.case_sensitive {
            self.symbols.chars().collect()
        } else {
            self.symbols.to_lowercase().chars().collect()
        };
        symbols.sort_unstable();
        symbols.dedup();
        symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(case_sensitive: bool, rules: Vec<Rule>) -> RuleSet {
        RuleSet::from_parts(case_sensitive, "0123456789abcdef".into(), rules)
    }

    fn symmetric(index: usize, prefix: &str, suffix: &str) -> Rule {
        Rule::Symmetric(SymmetricRule {
            index,
            prefix: prefix.into(),
            suffix: suffix.into(),
            is_final: false,
        })
    }

    fn edge(min_count: usize, side: EdgeSide) -> Rule {
        Rule::Edge(EdgeRule {
            min_count,
            side,
            is_final: false,
        })
    }

    fn regexp(index: usize, pattern: &str, is_final: bool) -> Rule {
        Rule::Regexp(RegexpRule {
            index,
            pattern: pattern.into(),
            compiled: Regex::new(pattern).ok(),
            is_final,
        })
    }

    #[test]
    fn test_symmetric_match() {
        let rules = set(false, vec![symmetric(0, "XX", "XX")]);
        let hit = rules.evaluate("aaaa1234aaaa").unwrap();
        assert_eq!(hit.kind, RuleKind::Symmetric);
        assert_eq!(hit.index, 0);
    }

    #[test]
    fn test_symmetric_conflicts() {
        let rules = set(false, vec![symmetric(0, "XX", "XX")]);
        assert!(rules.evaluate("aabb1234ccdd").is_none());
        // same char within a side, different across sides
        assert!(rules.evaluate("aa00000000bb").is_none());
        // conflict within a side
        assert!(rules.evaluate("ab00000000bb").is_none());
    }

    #[test]
    fn test_symmetric_two_symbols() {
        let rules = set(false, vec![symmetric(0, "XXYY", "YYXX")]);
        // one character per side, X and Y alike
        assert!(rules.evaluate("0x1111abcdef1111").is_some());
        assert!(rules.evaluate("0x1122abcdef2211").is_none());
        assert!(rules.evaluate("0x1122abcdef1122").is_none());
        assert!(rules.evaluate("0x1111abcdef2222").is_none());
    }

    #[test]
    fn test_symmetric_disjoint_symbols() {
        let rules = set(false, vec![symmetric(0, "XXX", "YYY")]);
        assert!(rules.evaluate("777abcdef999").is_some());
    }

    #[test]
    fn test_symmetric_short_address() {
        let rules = set(false, vec![symmetric(0, "XXXX", "XXXX")]);
        assert!(rules.evaluate("aaaaaaa").is_none());
    }

    #[test]
    fn test_non_placeholder_fails() {
        let rules = set(false, vec![symmetric(0, "XZ", "XX")]);
        assert!(rules.evaluate("aaaa1234aaaa").is_none());
    }

    #[test]
    fn test_specific_case_handling() {
        let spec = |prefix: &str| {
            Rule::Specific(SpecificRule {
                index: 0,
                prefix: prefix.into(),
                suffix: String::new(),
                is_final: false,
            })
        };
        let insensitive = set(false, vec![spec("dead")]);
        assert!(insensitive.evaluate("0xDeAd0000").is_some());

        let sensitive = set(true, vec![spec("DeAd")]);
        assert!(sensitive.evaluate("0xDeAd0000").is_some());
        assert!(sensitive.evaluate("0xdead0000").is_none());
    }

    #[test]
    fn test_edge_prefix() {
        let rules = set(false, vec![edge(4, EdgeSide::Prefix)]);
        assert!(rules.evaluate("aaaaBBBB1234").is_some());
        assert!(rules.evaluate("aaabBBBB1234").is_none());
    }

    #[test]
    fn test_edge_sides() {
        let suffix = set(false, vec![edge(3, EdgeSide::Suffix)]);
        assert!(suffix.evaluate("1234fff").is_some());
        assert!(suffix.evaluate("fff1234").is_none());

        let any = set(false, vec![edge(3, EdgeSide::Any)]);
        assert!(any.evaluate("1234fff").is_some());
        assert!(any.evaluate("fff1234").is_some());
        assert!(any.evaluate("f1234ff").is_none());
    }

    #[test]
    fn test_edge_run_ignores_0x() {
        let rules = set(false, vec![edge(2, EdgeSide::Prefix)]);
        assert!(rules.evaluate("0x00ab").is_some());
    }

    #[test]
    fn test_precedence() {
        let rules = set(
            false,
            vec![regexp(0, "^aa", false), symmetric(0, "XX", "XX")],
        );
        let hit = rules.evaluate("aa5555aa").unwrap();
        assert_eq!(hit.kind, RuleKind::Symmetric);
    }

    #[test]
    fn test_regexp_first_listed_wins() {
        let rules = set(
            false,
            vec![regexp(1, "beef$", true), regexp(0, "^dead", false)],
        );
        let hit = rules.evaluate("dead0000beef").unwrap();
        assert_eq!(hit.index, 0);
        assert!(!hit.is_final);
    }

    #[test]
    fn test_invalid_regexp_skipped() {
        let rules = set(false, vec![regexp(0, "([", false), regexp(1, "cafe", true)]);
        let hit = rules.evaluate("00cafe00").unwrap();
        assert_eq!(hit.index, 1);
        assert!(hit.is_final);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let rules = set(false, vec![symmetric(0, "XY", "YX"), edge(3, EdgeSide::Any)]);
        for addr in ["12aaa21", "aaa000", "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"] {
            let first = rules.evaluate(addr);
            for _ in 0..10 {
                assert_eq!(rules.evaluate(addr), first);
            }
        }
    }

    #[test]
    fn test_difficulty() {
        let rule = SpecificRule {
            index: 0,
            prefix: "dead".into(),
            suffix: String::new(),
            is_final: false,
        };
        assert_eq!(rule.estimated_difficulty(16), 65536);
    }
}
