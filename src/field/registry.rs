//! Ordered field registry: accumulate fields, then freeze into precomputed views.

use crate::error::ConfigError;
use crate::field::{Field, RuleSource};
use crate::rules::{sort_pattern, Rule, RuleSet};
use regex::Regex;

/// Marker stored per filterable field.
#[derive(Clone, Debug)]
pub enum FilterMarker {
    /// Any value is accepted.
    Any,
    /// Filter values must satisfy these rules.
    Rules(Vec<Rule>),
}

#[derive(Clone, Debug)]
struct Entry {
    field: Field,
    rules: Vec<Rule>,
    filter_rules: Option<Vec<Rule>>,
}

/// Accumulates fields in declaration order. Re-adding a name replaces the earlier field in place.
#[derive(Clone, Debug, Default)]
pub struct FieldRegistryBuilder {
    fields: Vec<Field>,
}

impl FieldRegistryBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.add_field(field);
        self
    }

    pub fn add_field(&mut self, field: Field) -> &mut Self {
        match self.fields.iter_mut().find(|f| f.name() == field.name()) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// Parse every declared rule and precompute the derived views.
    pub fn freeze(self) -> Result<FieldRegistry, ConfigError> {
        let entries = self
            .fields
            .into_iter()
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()?;
        FieldRegistry::derive(entries)
    }
}

fn parse_entry(field: Field) -> Result<Entry, ConfigError> {
    let invalid = |rule: &str, message: String| ConfigError::InvalidRule {
        field: field.name().to_string(),
        rule: rule.to_string(),
        message,
    };
    let rules = match field.validation() {
        None => Vec::new(),
        Some(RuleSource::Pipe(source)) => {
            Rule::parse_pipe(source).map_err(|message| invalid(source.as_str(), message))?
        }
        Some(RuleSource::List(list)) => list
            .iter()
            .map(|source| Rule::parse(source).map_err(|message| invalid(source.as_str(), message)))
            .collect::<Result<Vec<_>, _>>()?,
    };
    let filter_rules = match field.filter_validation() {
        Some(source) => Some(Rule::parse_pipe(source).map_err(|message| invalid(source, message))?),
        None => None,
    };
    Ok(Entry {
        field,
        rules,
        filter_rules,
    })
}

/// Frozen, ordered `name → Field` mapping with derived validation, filter and sort views.
#[derive(Clone, Debug, Default)]
pub struct FieldRegistry {
    entries: Vec<Entry>,
    validation: RuleSet,
    filters: Vec<(String, FilterMarker)>,
    sort: Vec<String>,
    sort_rule: Option<Regex>,
    external: Option<Box<FieldRegistry>>,
}

impl FieldRegistry {
    pub fn builder() -> FieldRegistryBuilder {
        FieldRegistryBuilder::default()
    }

    fn derive(entries: Vec<Entry>) -> Result<Self, ConfigError> {
        let mut validation = RuleSet::new();
        let mut filters = Vec::new();
        let mut sort = Vec::new();
        for entry in &entries {
            let name = entry.field.name();
            if !entry.rules.is_empty() {
                validation.insert(name, entry.rules.clone());
            }
            if entry.field.can_filter() {
                let marker = match &entry.filter_rules {
                    Some(rules) => FilterMarker::Rules(rules.clone()),
                    None => FilterMarker::Any,
                };
                filters.push((name.to_string(), marker));
            }
            if entry.field.can_sort() {
                sort.push(name.to_string());
            }
        }

        let sort_rule = if sort.is_empty() {
            None
        } else {
            let pattern = sort_pattern(sort.iter().map(String::as_str)).map_err(|e| {
                ConfigError::InvalidRule {
                    field: sort.join(","),
                    rule: "sort".into(),
                    message: e.to_string(),
                }
            })?;
            Some(pattern)
        };

        let external = if entries.iter().any(|e| e.field.is_api_only()) {
            let kept = entries
                .iter()
                .filter(|e| !e.field.is_api_only())
                .cloned()
                .collect();
            Some(Box::new(FieldRegistry::derive(kept)?))
        } else {
            None
        };

        Ok(FieldRegistry {
            entries,
            validation,
            filters,
            sort,
            sort_rule,
            external,
        })
    }

    pub fn has_fields(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn has_payload_validations(&self) -> bool {
        !self.validation.is_empty()
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn has_sort(&self) -> bool {
        !self.sort.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.entries.iter().map(|e| &e.field)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|f| f.name() == name)
    }

    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields().map(Field::name)
    }

    /// Names of fields that declare payload validation; these are the persisted attributes.
    pub fn payload_validation_keys(&self) -> impl Iterator<Item = &str> {
        self.validation.keys()
    }

    pub fn filter_keys(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(k, _)| k.as_str())
    }

    pub fn sort_keys(&self) -> impl Iterator<Item = &str> {
        self.sort.iter().map(String::as_str)
    }

    pub fn validation_rules(&self) -> &RuleSet {
        &self.validation
    }

    pub fn filters(&self) -> &[(String, FilterMarker)] {
        &self.filters
    }

    /// Grammar every `sort` value must match, when any field is sortable.
    pub fn sort_rule(&self) -> Option<&Regex> {
        self.sort_rule.as_ref()
    }

    /// The registry without api-only fields, used when validating raw external input.
    pub fn without_api_only(&self) -> &FieldRegistry {
        self.external.as_deref().unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_declaration_order_and_overwrites_in_place() {
        let registry = FieldRegistry::builder()
            .field(Field::new("b").sortable())
            .field(Field::new("a").rules("required"))
            .field(Field::new("b").filterable())
            .freeze()
            .unwrap();
        assert_eq!(registry.field_keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(registry.has_filters());
        assert!(!registry.has_sort());
        assert_eq!(registry.payload_validation_keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn filter_markers_carry_value_rules() {
        let registry = FieldRegistry::builder()
            .field(Field::new("age").filterable_with("integer|min:0"))
            .field(Field::new("name").filterable())
            .freeze()
            .unwrap();
        assert!(matches!(&registry.filters()[0].1, FilterMarker::Rules(r) if r.len() == 2));
        assert!(matches!(registry.filters()[1].1, FilterMarker::Any));
    }

    #[test]
    fn invalid_rule_fails_at_freeze() {
        let err = FieldRegistry::builder()
            .field(Field::new("age").rules("numeric|between_ish:1"))
            .freeze()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { ref field, .. } if field == "age"));
    }

    #[test]
    fn api_only_fields_drop_from_external_view() {
        let registry = FieldRegistry::builder()
            .field(Field::new("name").rules("required").sortable())
            .field(Field::new("user_id").rules("required").sortable().api_only())
            .freeze()
            .unwrap();
        let external = registry.without_api_only();
        assert_eq!(external.field_keys().collect::<Vec<_>>(), vec!["name"]);
        assert!(!external.sort_rule().unwrap().is_match("user_id"));
        assert!(registry.sort_rule().unwrap().is_match("user_id,-name"));
    }

    #[test]
    fn list_rules_keep_pipes() {
        let registry = FieldRegistry::builder()
            .field(Field::new("code").rule_list(["required", "regex:^(A|B)$"]))
            .freeze()
            .unwrap();
        assert_eq!(registry.validation_rules().describe()[0].1, "required|regex:^(A|B)$");
    }
}
