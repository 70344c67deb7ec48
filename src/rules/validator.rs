//! Request validation against compiled rule sets.

use crate::payload::lookup;
use crate::rules::{Rule, RuleSet};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// Field → messages, in the order failures were found.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageBag {
    messages: Vec<(String, Vec<String>)>,
}

impl MessageBag {
    pub fn add(&mut self, key: &str, message: impl Into<String>) {
        let message = message.into();
        match self.messages.iter_mut().find(|(k, _)| k == key) {
            Some((_, list)) => list.push(message),
            None => self.messages.push((key.to_string(), vec![message])),
        }
    }

    pub fn get(&self, key: &str) -> &[String] {
        self.messages
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, m)| m.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        !self.get(key).is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(|(k, _)| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

impl Serialize for MessageBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.messages.len()))?;
        for (key, list) in &self.messages {
            map.serialize_entry(key, list)?;
        }
        map.end()
    }
}

/// Outcome of one validation run.
#[derive(Clone, Debug, Default)]
pub struct Validation {
    errors: MessageBag,
}

impl Validation {
    pub fn passes(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fails(&self) -> bool {
        !self.passes()
    }

    pub fn errors(&self) -> &MessageBag {
        &self.errors
    }

    pub fn into_errors(self) -> MessageBag {
        self.errors
    }
}

/// Validator collaborator: checks a payload tree against a rule set.
pub trait Validator: Send + Sync {
    fn validate(&self, payload: &Value, rules: &RuleSet) -> Validation;
}

/// Default validator for the built-in rule language, including `*` wildcard paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, payload: &Value, rules: &RuleSet) -> Validation {
        let mut errors = MessageBag::default();
        for (pattern, list) in rules.iter() {
            for (attribute, captures) in expand(pattern, payload) {
                let value = lookup(payload, &attribute);
                check_attribute(payload, &attribute, &captures, value, list, &mut errors);
            }
        }
        Validation { errors }
    }
}

fn check_attribute(
    data: &Value,
    attribute: &str,
    captures: &[String],
    value: Option<&Value>,
    rules: &[Rule],
    errors: &mut MessageBag,
) {
    let nullable = rules.iter().any(|r| matches!(r, Rule::Nullable));
    for rule in rules {
        if !rule.is_implicit() {
            match value {
                None => continue,
                Some(Value::Null) if nullable => continue,
                _ => {}
            }
        }
        if let Rule::FilterValue { sibling, rules: by_field } = rule {
            let sibling = resolve_reference(sibling, captures);
            let field = lookup(data, &sibling).and_then(Value::as_str);
            if let Some((_, field_rules)) = by_field.iter().find(|(name, _)| Some(name.as_str()) == field) {
                check_attribute(data, attribute, captures, value, field_rules, errors);
            }
            continue;
        }
        if let Err(message) = check(rule, data, attribute, captures, value, rules) {
            errors.add(attribute, message);
        }
    }
}

fn check(
    rule: &Rule,
    data: &Value,
    attribute: &str,
    captures: &[String],
    value: Option<&Value>,
    rules: &[Rule],
) -> Result<(), String> {
    let ok = |passed: bool, message: String| if passed { Ok(()) } else { Err(message) };
    match rule {
        Rule::Required => ok(
            value.is_some_and(is_filled),
            format!("The {} field is required.", attribute),
        ),
        Rule::RequiredIf { other, values } => {
            let other = resolve_reference(other, captures);
            let actual = lookup(data, &other).and_then(scalar_string);
            match actual {
                Some(actual) if values.contains(&actual) => ok(
                    value.is_some_and(is_filled),
                    format!("The {} field is required when {} is {}.", attribute, other, actual),
                ),
                _ => Ok(()),
            }
        }
        Rule::RequiredUnless { other, values } => {
            let other = resolve_reference(other, captures);
            let actual = lookup(data, &other).and_then(scalar_string);
            if actual.is_some_and(|a| values.contains(&a)) {
                return Ok(());
            }
            ok(
                value.is_some_and(is_filled),
                format!(
                    "The {} field is required unless {} is in {}.",
                    attribute,
                    other,
                    values.join(", ")
                ),
            )
        }
        Rule::Nullable | Rule::FilterValue { .. } => Ok(()),
        Rule::Array => ok(
            value.is_some_and(|v| v.is_array() || v.is_object()),
            format!("The {} must be an array.", attribute),
        ),
        Rule::Numeric => ok(
            value.and_then(as_number).is_some(),
            format!("The {} must be a number.", attribute),
        ),
        Rule::Integer => ok(
            value.is_some_and(is_integer),
            format!("The {} must be an integer.", attribute),
        ),
        Rule::String => ok(
            value.is_some_and(Value::is_string),
            format!("The {} must be a string.", attribute),
        ),
        Rule::Boolean => ok(
            value.is_some_and(is_boolean),
            format!("The {} field must be true or false.", attribute),
        ),
        Rule::Min(min) => {
            let size = value.and_then(|v| size_of(v, rules));
            ok(
                size.is_some_and(|(s, _)| s >= *min),
                format!("The {} must be at least {}{}.", attribute, min, unit(value, rules)),
            )
        }
        Rule::Max(max) => {
            let size = value.and_then(|v| size_of(v, rules));
            ok(
                size.is_some_and(|(s, _)| s <= *max),
                format!("The {} may not be greater than {}{}.", attribute, max, unit(value, rules)),
            )
        }
        Rule::In(allowed) => ok(
            value.is_some_and(|v| contained_in(v, allowed)),
            format!("The selected {} is invalid.", attribute),
        ),
        Rule::NotIn(denied) => ok(
            value.is_some_and(|v| !v.is_object() && !contained_in_any(v, denied)),
            format!("The selected {} is invalid.", attribute),
        ),
        Rule::Regex(re) => ok(
            value
                .and_then(scalar_string)
                .is_some_and(|s| re.is_match(&s)),
            format!("The {} format is invalid.", attribute),
        ),
        Rule::Email => ok(
            value
                .and_then(Value::as_str)
                .is_some_and(|s| s.contains('@') && s.len() >= 3),
            format!("The {} must be a valid email address.", attribute),
        ),
        Rule::Uuid => ok(
            value
                .and_then(Value::as_str)
                .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
            format!("The {} must be a valid UUID.", attribute),
        ),
    }
}

/// Expand `*` segments of `pattern` over the payload. Returns concrete paths with the
/// keys each wildcard matched.
fn expand(pattern: &str, data: &Value) -> Vec<(String, Vec<String>)> {
    let segments: Vec<&str> = pattern.split('.').collect();
    let mut out = Vec::new();
    walk(Some(data), &segments, String::new(), Vec::new(), &mut out);
    out
}

fn walk(
    node: Option<&Value>,
    segments: &[&str],
    prefix: String,
    captures: Vec<String>,
    out: &mut Vec<(String, Vec<String>)>,
) {
    let Some((head, rest)) = segments.split_first() else {
        out.push((prefix, captures));
        return;
    };
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    if *head == "*" {
        let children: Vec<(String, &Value)> = match node {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
            Some(Value::Array(list)) => list.iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect(),
            _ => Vec::new(),
        };
        for (key, child) in children {
            let mut captured = captures.clone();
            captured.push(key.clone());
            walk(Some(child), rest, join(&key), captured, out);
        }
    } else {
        let child = node.and_then(|n| match n {
            Value::Object(map) => map.get(*head),
            Value::Array(list) => head.parse::<usize>().ok().and_then(|i| list.get(i)),
            _ => None,
        });
        walk(child, rest, join(head), captures, out);
    }
}

/// Replace each `*` in `reference` with the wildcard keys of the attribute being checked.
fn resolve_reference(reference: &str, captures: &[String]) -> String {
    let mut captured = captures.iter();
    reference
        .split('.')
        .map(|segment| match segment {
            "*" => captured.next().map(String::as_str).unwrap_or("*"),
            other => other,
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn is_filled(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(list) => !list.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn is_integer(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_boolean(v: &Value) -> bool {
    match v {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0 | 1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

/// Size used by `min`/`max`: the number itself when a numeric rule is declared,
/// otherwise string length or item count.
fn size_of(v: &Value, rules: &[Rule]) -> Option<(f64, &'static str)> {
    let numeric = rules.iter().any(|r| matches!(r, Rule::Numeric | Rule::Integer));
    if numeric {
        if let Some(n) = as_number(v) {
            return Some((n, ""));
        }
    }
    match v {
        Value::String(s) => Some((s.chars().count() as f64, " characters")),
        Value::Array(list) => Some((list.len() as f64, " items")),
        Value::Object(map) => Some((map.len() as f64, " items")),
        Value::Number(n) => n.as_f64().map(|f| (f, "")),
        _ => None,
    }
}

fn unit(value: Option<&Value>, rules: &[Rule]) -> &'static str {
    value.and_then(|v| size_of(v, rules)).map(|(_, u)| u).unwrap_or("")
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contained_in(v: &Value, allowed: &[String]) -> bool {
    match v {
        Value::Array(list) => list.iter().all(|item| contained_in(item, allowed)),
        other => scalar_string(other).is_some_and(|s| allowed.contains(&s)),
    }
}

fn contained_in_any(v: &Value, denied: &[String]) -> bool {
    match v {
        Value::Array(list) => list.iter().any(|item| contained_in_any(item, denied)),
        other => scalar_string(other).is_some_and(|s| denied.contains(&s)),
    }
}
