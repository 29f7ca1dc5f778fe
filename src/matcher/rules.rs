//! Rule configuration file: loading and validation.
//!
//! ```yaml
//! symbols: "0123456789abcdef"
//! case_sensitive: false
//! symmetric:
//!   - { prefix: "XXXX", suffix: "XXXX", final: false }
//! specific:
//!   - { prefix: "dead", suffix: "beef", final: true }
//! edges: { minCount: 8, side: any, final: false }
//! regexp:
//!   - { pattern: "^(ab){4}", final: false }
//! ```

use std::fs;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use super::pattern::{
    EdgeRule, EdgeSide, RegexpRule, Rule, RuleSet, SpecificRule, SymmetricRule, PLACEHOLDERS,
};
use crate::config::ConfigError;
use crate::crypto::strip_hex_prefix;

/// Raw rule configuration as written by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatternsFile {
    pub symbols: String,
    pub case_sensitive: bool,
    pub symmetric: Vec<AffixEntry>,
    pub specific: Vec<AffixEntry>,
    pub edges: EdgesEntry,
    pub regexp: Vec<RegexpEntry>,
}

/// A prefix/suffix pair, used by both symmetric and specific rules.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AffixEntry {
    pub prefix: String,
    pub suffix: String,
    #[serde(rename = "final")]
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EdgesEntry {
    #[serde(rename = "minCount", alias = "mincount", alias = "min_count")]
    pub min_count: i64,
    pub side: String,
    #[serde(rename = "final")]
    pub is_final: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegexpEntry {
    pub pattern: String,
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl PatternsFile {
    /// Reads a YAML rule file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&yaml)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
    }

    /// Parses YAML text.
    ///
    /// Plain scalars land in string fields verbatim, so an unquoted
    /// `prefix: 000000` stays six zeros.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Checks the static invariants of the file.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::EmptySymbols);
        }
        if self.edges.min_count < 0 {
            return Err(ConfigError::NegativeMinCount(self.edges.min_count));
        }
        if !self.edges.side.is_empty() {
            self.edges
                .side
                .parse::<EdgeSide>()
                .map_err(|_| ConfigError::InvalidSide(self.edges.side.clone()))?;
        }

        for (index, entry) in self.symmetric.iter().enumerate() {
            validate_template(index, "prefix", &entry.prefix)?;
            validate_template(index, "suffix", &entry.suffix)?;
        }

        if self.symmetric.is_empty()
            && self.specific.is_empty()
            && self.edges.min_count == 0
            && self.regexp.is_empty()
        {
            return Err(ConfigError::NoRules);
        }

        Ok(())
    }

    /// Validates and compiles the file into an immutable [`RuleSet`].
    pub fn into_rule_set(self) -> Result<RuleSet, ConfigError> {
        self.validate()?;

        let case_sensitive = self.case_sensitive;
        let normalize = |s: &str| {
            let s = strip_hex_prefix(s);
            if case_sensitive {
                s.to_string()
            } else {
                s.to_lowercase()
            }
        };

        let mut rules = Vec::new();

        for (index, entry) in self.symmetric.into_iter().enumerate() {
            rules.push(Rule::Symmetric(SymmetricRule {
                index,
                prefix: entry.prefix.to_ascii_uppercase(),
                suffix: entry.suffix.to_ascii_uppercase(),
                is_final: entry.is_final,
            }));
        }

        for (index, entry) in self.specific.into_iter().enumerate() {
            rules.push(Rule::Specific(SpecificRule {
                index,
                prefix: normalize(&entry.prefix),
                suffix: if case_sensitive {
                    entry.suffix
                } else {
                    entry.suffix.to_lowercase()
                },
                is_final: entry.is_final,
            }));
        }

        if self.edges.min_count > 0 {
            rules.push(Rule::Edge(EdgeRule {
                min_count: self.edges.min_count as usize,
                // checked by validate()
                side: self.edges.side.parse().unwrap_or_default(),
                is_final: self.edges.is_final,
            }));
        }

        for (index, entry) in self.regexp.into_iter().enumerate() {
            let source = if case_sensitive {
                entry.pattern.clone()
            } else {
                format!("(?i){}", entry.pattern)
            };
            let compiled = match Regex::new(&source) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(index, pattern = %entry.pattern, error = %e, "skipping invalid regexp rule");
                    None
                }
            };
            rules.push(Rule::Regexp(RegexpRule {
                index,
                pattern: entry.pattern,
                compiled,
                is_final: entry.is_final,
            }));
        }

        Ok(RuleSet::from_parts(case_sensitive, self.symbols, rules))
    }
}

fn validate_template(index: usize, field: &'static str, template: &str) -> Result<(), ConfigError> {
    let valid = !template.is_empty()
        && template
            .bytes()
            .all(|b| PLACEHOLDERS.contains(&b.to_ascii_uppercase()));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidTemplate {
            index,
            field,
            template: template.to_string(),
        })
    }
}

impl RuleSet {
    /// Loads, validates and compiles a YAML rule file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        PatternsFile::load(path)?.into_rule_set()
    }

    /// Parses, validates and compiles YAML rule text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        PatternsFile::from_yaml_str(yaml)?.into_rule_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::RuleKind;

    const FULL: &str = r#"
symbols: "0123456789abcdef"
case_sensitive: false
symmetric:
  - prefix: "xxxx"
    suffix: "XXXX"
specific:
  - prefix: "0xDEAD"
    suffix: "Beef"
    final: true
edges:
  minCount: 6
  side: prefix
regexp:
  - pattern: "^(ab){3}"
"#;

    fn base() -> PatternsFile {
        PatternsFile {
            symbols: "0123456789abcdef".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_full_file() {
        let rules = RuleSet::from_yaml_str(FULL).unwrap();
        assert!(!rules.case_sensitive());
        for kind in RuleKind::ALL {
            assert_eq!(rules.count(kind), 1, "{}", kind);
        }
        assert!(rules.has_final());

        let hit = rules.evaluate("0xdEaD000000000000000000000000000000bEeF").unwrap();
        assert_eq!(hit.kind, RuleKind::Specific);
        assert!(hit.is_final);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patterns.yaml");
        std::fs::write(&path, FULL).unwrap();
        let rules = RuleSet::load(&path).unwrap();
        assert_eq!(rules.rules().len(), 4);
    }

    #[test]
    fn test_unquoted_numeric_affixes_kept_verbatim() {
        let yaml = "symbols: 0123456789abcdef\nspecific:\n  - prefix: 000000\n    suffix: 0777\n    final: true\n";
        let file = PatternsFile::from_yaml_str(yaml).unwrap();
        assert_eq!(file.symbols, "0123456789abcdef");
        assert_eq!(file.specific[0].prefix, "000000");
        assert_eq!(file.specific[0].suffix, "0777");

        let rules = file.into_rule_set().unwrap();
        assert!(rules
            .evaluate("0x0abcdef00000000000000000000000000000a777")
            .is_none());
        let hit = rules
            .evaluate("0x000000abcdef0000000000000000000000000777")
            .unwrap();
        assert_eq!(hit.kind, RuleKind::Specific);
        assert!(hit.is_final);
    }

    #[test]
    fn test_missing_file() {
        let err = RuleSet::load(Path::new("/nonexistent/patterns.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_all_empty_rejected() {
        assert!(matches!(base().validate(), Err(ConfigError::NoRules)));
    }

    #[test]
    fn test_non_placeholder_template_rejected() {
        let mut file = base();
        file.symmetric.push(AffixEntry {
            prefix: "XZ".into(),
            suffix: "XX".into(),
            is_final: false,
        });
        assert!(matches!(
            file.validate(),
            Err(ConfigError::InvalidTemplate { index: 0, field: "prefix", .. })
        ));
    }

    #[test]
    fn test_empty_template_rejected() {
        let mut file = base();
        file.symmetric.push(AffixEntry {
            prefix: "XX".into(),
            suffix: String::new(),
            is_final: false,
        });
        assert!(matches!(
            file.validate(),
            Err(ConfigError::InvalidTemplate { field: "suffix", .. })
        ));
    }

    #[test]
    fn test_empty_symbols_rejected() {
        let mut file = base();
        file.symbols.clear();
        file.regexp.push(RegexpEntry {
            pattern: "^0".into(),
            is_final: false,
        });
        assert!(matches!(file.validate(), Err(ConfigError::EmptySymbols)));
    }

    #[test]
    fn test_negative_min_count_rejected() {
        let mut file = base();
        file.edges.min_count = -1;
        assert!(matches!(
            file.validate(),
            Err(ConfigError::NegativeMinCount(-1))
        ));
    }

    #[test]
    fn test_bad_side_rejected() {
        let mut file = base();
        file.edges.min_count = 4;
        file.edges.side = "middle".into();
        assert!(matches!(file.validate(), Err(ConfigError::InvalidSide(_))));
    }

    #[test]
    fn test_unset_side_means_any() {
        let mut file = base();
        file.edges.min_count = 3;
        let rules = file.into_rule_set().unwrap();
        assert!(rules.evaluate("1234fff").is_some());
        assert!(rules.evaluate("fff1234").is_some());
    }

    #[test]
    fn test_case_insensitive_regexp() {
        let mut file = base();
        file.regexp.push(RegexpEntry {
            pattern: "^CAFE".into(),
            is_final: false,
        });
        let rules = file.into_rule_set().unwrap();
        assert!(rules.evaluate("0xcafe1234").is_some());
    }

    #[test]
    fn test_invalid_regexp_is_not_fatal() {
        let mut file = base();
        file.regexp.push(RegexpEntry {
            pattern: "([".into(),
            is_final: false,
        });
        let rules = file.into_rule_set().unwrap();
        assert_eq!(rules.count(RuleKind::Regexp), 1);
        assert!(rules.evaluate("anything").is_none());
    }
}
