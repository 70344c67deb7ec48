//! Compile a field registry into the full rule set for an endpoint payload.

use crate::field::{FieldRegistry, FilterMarker};
use crate::rules::{Rule, RuleSet};
use regex::Regex;

/// Filter clause types accepted in `filter[i][type]`.
pub const FILTER_TYPES: &[&str] = &[
    "eq",
    "neq",
    "lt",
    "lte",
    "gt",
    "gte",
    "like",
    "between",
    "not_between",
    "is_null",
    "is_not_null",
    "in",
    "not_in",
];

/// Clause types that do not carry a single `value`.
const VALUELESS_TYPES: &[&str] = &["in", "not_in", "is_null", "is_not_null", "between", "not_between"];
const LIST_TYPES: &[&str] = &["in", "not_in"];
const RANGE_TYPES: &[&str] = &["between", "not_between"];

/// Largest page a client may request.
pub const MAX_PAGE_SIZE: f64 = 100.0;

/// Which fields take part in validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleScope {
    /// Every declared field.
    Full,
    /// Raw external input: fields flagged api-only are left out.
    External,
}

/// Build the rule set for a registry: field rules, paging rules, filter and sort grammar.
pub fn compile(registry: &FieldRegistry, scope: RuleScope) -> RuleSet {
    let registry = match scope {
        RuleScope::Full => registry,
        RuleScope::External => registry.without_api_only(),
    };
    let mut rules = RuleSet::new();

    if registry.has_payload_validations() {
        rules.extend(registry.validation_rules().clone());
    }

    rules.insert("fields.*", vec![Rule::In(owned(registry.field_keys()))]);
    rules.insert("page", vec![Rule::Array]);
    rules.insert("page.number", vec![Rule::Numeric, Rule::Min(1.0)]);
    rules.insert(
        "page.size",
        vec![Rule::Numeric, Rule::Min(1.0), Rule::Max(MAX_PAGE_SIZE)],
    );

    if registry.has_filters() {
        let type_ref = "filter.*.type".to_string();
        rules.insert(
            "filter.*.field",
            vec![Rule::Required, Rule::In(owned(registry.filter_keys()))],
        );
        rules.insert("filter.*.type", vec![Rule::In(owned(FILTER_TYPES.iter().copied()))]);
        rules.insert(
            "filter.*.value",
            vec![Rule::RequiredUnless {
                other: type_ref.clone(),
                values: owned(VALUELESS_TYPES.iter().copied()),
            }],
        );
        rules.insert(
            "filter.*.values",
            vec![
                Rule::RequiredIf {
                    other: type_ref.clone(),
                    values: owned(LIST_TYPES.iter().copied()),
                },
                Rule::Array,
            ],
        );
        for bound in ["filter.*.from", "filter.*.to"] {
            rules.insert(
                bound,
                vec![Rule::RequiredIf {
                    other: type_ref.clone(),
                    values: owned(RANGE_TYPES.iter().copied()),
                }],
            );
        }

        let value_rules: Vec<(String, Vec<Rule>)> = registry
            .filters()
            .iter()
            .filter_map(|(name, marker)| match marker {
                FilterMarker::Rules(r) => Some((name.clone(), r.clone())),
                FilterMarker::Any => None,
            })
            .collect();
        if !value_rules.is_empty() {
            let rule = Rule::FilterValue {
                sibling: "filter.*.field".into(),
                rules: value_rules,
            };
            for key in ["filter.*.value", "filter.*.from", "filter.*.to", "filter.*.values.*"] {
                rules.push(key, rule.clone());
            }
        }
    }

    if let Some(pattern) = registry.sort_rule() {
        rules.insert("sort", vec![Rule::Regex(pattern.clone())]);
    }

    rules
}

/// `^(-?(?:a|b),?)+$` over the escaped sortable keys.
pub fn sort_pattern<'a>(keys: impl IntoIterator<Item = &'a str>) -> Result<Regex, regex::Error> {
    let alternatives = keys
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("^(-?(?:{}),?)+$", alternatives))
}

fn owned<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    keys.into_iter().map(str::to_string).collect()
}
