//! Validation rule language, compiled rule sets, and the default validator.

mod compiler;
mod validator;

pub use compiler::{compile, sort_pattern, RuleScope, FILTER_TYPES, MAX_PAGE_SIZE};
pub use validator::{MessageBag, RuleValidator, Validation, Validator};

use regex::Regex;
use std::fmt;

/// One validation constraint on an attribute path.
#[derive(Clone, Debug)]
pub enum Rule {
    Required,
    /// Required when `other` holds one of `values`. `*` in `other` resolves to the attribute's indices.
    RequiredIf { other: String, values: Vec<String> },
    /// Required unless `other` holds one of `values`.
    RequiredUnless { other: String, values: Vec<String> },
    Nullable,
    /// A map or a list.
    Array,
    Numeric,
    Integer,
    String,
    Boolean,
    Min(f64),
    Max(f64),
    In(Vec<String>),
    NotIn(Vec<String>),
    Regex(Regex),
    Email,
    Uuid,
    /// Validate with the rules declared for the field named by the `sibling` attribute.
    FilterValue {
        sibling: String,
        rules: Vec<(String, Vec<Rule>)>,
    },
}

impl Rule {
    /// Parse one rule written as `name` or `name:arg,arg`.
    pub fn parse(source: &str) -> Result<Rule, String> {
        let source = source.trim();
        let (name, args) = match source.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (source, None),
        };
        let list = || -> Vec<String> {
            args.map(|a| {
                a.split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
        };
        let number = || -> Result<f64, String> {
            args.and_then(|a| a.trim().parse().ok())
                .ok_or_else(|| format!("{} needs a numeric argument", name))
        };
        let reference = || -> Result<(String, Vec<String>), String> {
            let mut parts = list().into_iter();
            let other = parts
                .next()
                .ok_or_else(|| format!("{} needs a field argument", name))?;
            Ok((other, parts.collect()))
        };
        Ok(match name {
            "required" => Rule::Required,
            "required_if" => {
                let (other, values) = reference()?;
                Rule::RequiredIf { other, values }
            }
            "required_unless" => {
                let (other, values) = reference()?;
                Rule::RequiredUnless { other, values }
            }
            "nullable" => Rule::Nullable,
            "array" => Rule::Array,
            "numeric" => Rule::Numeric,
            "integer" => Rule::Integer,
            "string" => Rule::String,
            "boolean" => Rule::Boolean,
            "min" => Rule::Min(number()?),
            "max" => Rule::Max(number()?),
            "in" => Rule::In(list()),
            "not_in" => Rule::NotIn(list()),
            "regex" => {
                let pattern = args.ok_or("regex needs a pattern")?;
                Rule::Regex(Regex::new(strip_delimiters(pattern)).map_err(|e| e.to_string())?)
            }
            "email" => Rule::Email,
            "uuid" => Rule::Uuid,
            other => return Err(format!("unknown rule '{}'", other)),
        })
    }

    /// Parse a pipe-separated rule string such as `required|numeric|min:1`.
    pub fn parse_pipe(source: &str) -> Result<Vec<Rule>, String> {
        source
            .split('|')
            .filter(|s| !s.trim().is_empty())
            .map(Rule::parse)
            .collect()
    }

    /// Required-family rules run even when the attribute is absent.
    pub fn is_implicit(&self) -> bool {
        matches!(
            self,
            Rule::Required | Rule::RequiredIf { .. } | Rule::RequiredUnless { .. }
        )
    }

    /// Re-root attribute references under `prefix`.
    pub fn prefixed(&self, prefix: &str) -> Rule {
        match self {
            Rule::RequiredIf { other, values } => Rule::RequiredIf {
                other: format!("{}.{}", prefix, other),
                values: values.clone(),
            },
            Rule::RequiredUnless { other, values } => Rule::RequiredUnless {
                other: format!("{}.{}", prefix, other),
                values: values.clone(),
            },
            Rule::FilterValue { sibling, rules } => Rule::FilterValue {
                sibling: format!("{}.{}", prefix, sibling),
                rules: rules.clone(),
            },
            rule => rule.clone(),
        }
    }
}

fn strip_delimiters(pattern: &str) -> &str {
    let mut chars = pattern.chars();
    match (chars.next(), chars.last()) {
        (Some(first), Some(last)) if first == last && "/#~".contains(first) && pattern.len() > 1 => {
            &pattern[1..pattern.len() - 1]
        }
        _ => pattern,
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => f.write_str("required"),
            Rule::RequiredIf { other, values } => write!(f, "required_if:{},{}", other, values.join(",")),
            Rule::RequiredUnless { other, values } => {
                write!(f, "required_unless:{},{}", other, values.join(","))
            }
            Rule::Nullable => f.write_str("nullable"),
            Rule::Array => f.write_str("array"),
            Rule::Numeric => f.write_str("numeric"),
            Rule::Integer => f.write_str("integer"),
            Rule::String => f.write_str("string"),
            Rule::Boolean => f.write_str("boolean"),
            Rule::Min(n) => write!(f, "min:{}", n),
            Rule::Max(n) => write!(f, "max:{}", n),
            Rule::In(values) => write!(f, "in:{}", values.join(",")),
            Rule::NotIn(values) => write!(f, "not_in:{}", values.join(",")),
            Rule::Regex(re) => write!(f, "regex:{}", re.as_str()),
            Rule::Email => f.write_str("email"),
            Rule::Uuid => f.write_str("uuid"),
            Rule::FilterValue { sibling, .. } => write!(f, "filter_value:{}", sibling),
        }
    }
}

/// Ordered attribute-pattern → rules map. Re-inserting a key replaces it in place.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    entries: Vec<(String, Vec<Rule>)>,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, rules: Vec<Rule>) -> &mut Self {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = rules,
            None => self.entries.push((key, rules)),
        }
        self
    }

    /// Append one rule to `key`, creating the entry if needed.
    pub fn push(&mut self, key: &str, rule: Rule) -> &mut Self {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1.push(rule),
            None => self.entries.push((key.to_string(), vec![rule])),
        }
        self
    }

    pub fn extend(&mut self, other: RuleSet) -> &mut Self {
        for (key, rules) in other.entries {
            self.insert(key, rules);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&[Rule]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, r)| r.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<Rule>> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Rule])> {
        self.entries.iter().map(|(k, r)| (k.as_str(), r.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Each key with its rules joined the way they are written, e.g. `numeric|min:1`.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(k, rules)| {
                let text = rules.iter().map(Rule::to_string).collect::<Vec<_>>().join("|");
                (k.clone(), text)
            })
            .collect()
    }
}

impl IntoIterator for RuleSet {
    type Item = (String, Vec<Rule>);
    type IntoIter = std::vec::IntoIter<(String, Vec<Rule>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipe_rules() {
        let rules = Rule::parse_pipe("required|numeric|min:1|max:100").unwrap();
        assert_eq!(rules.len(), 4);
        assert!(matches!(rules[0], Rule::Required));
        assert!(matches!(rules[3], Rule::Max(n) if n == 100.0));
    }

    #[test]
    fn parses_references() {
        let rule = Rule::parse("required_if:filter.*.type,in,not_in").unwrap();
        assert_eq!(rule.to_string(), "required_if:filter.*.type,in,not_in");
    }

    #[test]
    fn regex_keeps_pipes_and_strips_delimiters() {
        let rule = Rule::parse("regex:#^(a|b)$#").unwrap();
        assert_eq!(rule.to_string(), "regex:^(a|b)$");
    }

    #[test]
    fn unknown_rule_is_rejected() {
        assert!(Rule::parse("sometimes_maybe").is_err());
        assert!(Rule::parse("min:abc").is_err());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut set = RuleSet::new();
        set.insert("a", vec![Rule::Required]);
        set.insert("b", vec![Rule::Numeric]);
        set.insert("a", vec![Rule::String]);
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(set.describe()[0].1, "string");
    }

    #[test]
    fn prefixed_reroots_references() {
        let rule = Rule::RequiredIf {
            other: "filter.*.type".into(),
            values: vec!["in".into()],
        };
        assert_eq!(rule.prefixed("user").to_string(), "required_if:user.filter.*.type,in");
    }
}
