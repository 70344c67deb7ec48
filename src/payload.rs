//! Dot-path addressable request input.
//!
//! A payload is the merged request input (query string, route parameters, JSON body)
//! as a `serde_json::Value` tree. Paths are dot separated; numeric segments index lists.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    payload: Value,
}

impl Default for Payload {
    fn default() -> Self {
        Payload {
            payload: Value::Object(Map::new()),
        }
    }
}

impl From<Value> for Payload {
    fn from(payload: Value) -> Self {
        Payload::new(payload)
    }
}

impl Payload {
    pub fn new(payload: Value) -> Self {
        Payload { payload }
    }

    /// Build a payload from decoded query-string pairs using bracket nesting:
    /// `filter[0][field]=age`, `fields[]=name`, `page[size]=10`.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut root = Map::new();
        for (key, value) in pairs {
            let segments = parse_bracket_key(key.as_ref());
            insert_segments(&mut root, &segments, Value::String(value.into()));
        }
        let mut payload = Value::Object(root);
        normalize_lists(&mut payload);
        Payload { payload }
    }

    pub fn get_payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_inner(self) -> Value {
        self.payload
    }

    /// Value at `path`, if present. A present `null` is `Some(Value::Null)`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.payload, path)
    }

    pub fn get_or<'a>(&'a self, path: &str, default: &'a Value) -> &'a Value {
        self.get(path).unwrap_or(default)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Positive integer at `path`; numeric strings (query-string input) are accepted.
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(value_as_u64)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Set `value` at `path`, creating intermediate maps as needed.
    pub fn set(&mut self, path: &str, value: Value) -> &mut Self {
        let segments: Vec<&str> = path.split('.').collect();
        assign(&mut self.payload, &segments, value);
        self
    }

    /// A new payload holding only the given top-level keys, in their original order.
    pub fn only<S: AsRef<str>>(&self, keys: &[S]) -> Payload {
        let payload = match &self.payload {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(k, _)| keys.iter().any(|key| key.as_ref() == k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            _ => Value::Object(Map::new()),
        };
        Payload { payload }
    }

    /// A new payload rooted at `path`. Absent or scalar values yield an empty map.
    pub fn pluck(&self, path: &str) -> Payload {
        match self.get(path) {
            Some(v @ (Value::Object(_) | Value::Array(_))) => Payload::new(v.clone()),
            _ => Payload::default(),
        }
    }

    /// Overlay the top-level keys of `other` on this payload; `other` wins on conflicts.
    pub fn merge(mut self, other: Payload) -> Payload {
        if let Value::Object(extra) = other.payload {
            match &mut self.payload {
                Value::Object(map) => map.extend(extra),
                root => *root = Value::Object(extra),
            }
        }
        self
    }
}

/// Resolve a dot path against a value tree. An exact top-level key wins over splitting.
pub fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if let Value::Object(map) = root {
        if let Some(v) = map.get(path) {
            return Some(v);
        }
    }
    let mut node = root;
    for segment in path.split('.') {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(list) => list.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Integer view of a value, accepting numeric strings.
pub fn value_as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn assign(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if let Value::Array(list) = node {
        if let Ok(idx) = head.parse::<usize>() {
            if idx < list.len() {
                return assign(&mut list[idx], rest, value);
            }
            if idx == list.len() {
                list.push(Value::Object(Map::new()));
                return assign(&mut list[idx], rest, value);
            }
        }
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map
            .entry(head.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        assign(child, rest, value);
    }
}

enum Segment {
    Key(String),
    Append,
}

fn parse_bracket_key(key: &str) -> Vec<Segment> {
    let Some(open) = key.find('[') else {
        return vec![Segment::Key(key.to_string())];
    };
    if open == 0 || !key.ends_with(']') {
        return vec![Segment::Key(key.to_string())];
    }
    let mut segments = vec![Segment::Key(key[..open].to_string())];
    for part in key[open + 1..key.len() - 1].split("][") {
        if part.is_empty() {
            segments.push(Segment::Append);
        } else {
            segments.push(Segment::Key(part.to_string()));
        }
    }
    segments
}

fn insert_segments(node: &mut Map<String, Value>, segments: &[Segment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let key = match head {
        Segment::Key(k) => k.clone(),
        Segment::Append => node.len().to_string(),
    };
    if rest.is_empty() {
        node.insert(key, value);
        return;
    }
    let child = node
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(map) = child {
        insert_segments(map, rest, value);
    }
}

/// Maps keyed exactly `0..n` in order become lists.
fn normalize_lists(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for v in map.values_mut() {
                normalize_lists(v);
            }
            let sequential = !map.is_empty()
                && map
                    .keys()
                    .enumerate()
                    .all(|(i, k)| k.parse::<usize>().ok() == Some(i));
            if sequential {
                let list = std::mem::take(map).into_iter().map(|(_, v)| v).collect();
                *value = Value::Array(list);
            }
        }
        Value::Array(list) => list.iter_mut().for_each(normalize_lists),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_walks_maps_and_lists() {
        let p = Payload::new(json!({"items": [{"name": "a"}, {"name": "b"}], "page": {"size": 10}}));
        assert_eq!(p.get("items.1.name"), Some(&json!("b")));
        assert_eq!(p.get("page.size"), Some(&json!(10)));
        assert!(p.get("page.number").is_none());
        assert!(p.has("items.0"));
    }

    #[test]
    fn present_null_counts_as_present() {
        let p = Payload::new(json!({"deleted_at": null}));
        assert!(p.has("deleted_at"));
    }

    #[test]
    fn exact_dotted_key_wins() {
        let p = Payload::new(json!({"a.b": 1, "a": {"b": 2}}));
        assert_eq!(p.get("a.b"), Some(&json!(1)));
    }

    #[test]
    fn pluck_map_round_trips() {
        let p = Payload::new(json!({"user": {"name": "x", "age": 3}}));
        assert_eq!(p.pluck("user").get_payload(), p.get("user").unwrap());
    }

    #[test]
    fn pluck_absent_is_empty_map() {
        let p = Payload::new(json!({"user": {"name": "x"}}));
        assert_eq!(p.pluck("order").get_payload(), &json!({}));
        assert_eq!(p.pluck("user.name").get_payload(), &json!({}));
    }

    #[test]
    fn only_is_idempotent_and_independent() {
        let p = Payload::new(json!({"a": 1, "b": 2, "c": {"d": 3}}));
        let once = p.only(&["c", "a"]);
        let twice = once.only(&["c", "a"]);
        assert_eq!(once, twice);
        assert_eq!(once.get_payload(), &json!({"a": 1, "c": {"d": 3}}));
        assert!(p.has("b"));
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut p = Payload::default();
        p.set("order.user_id", json!(7)).set("order.lines.0", json!("x"));
        assert_eq!(p.get("order.user_id"), Some(&json!(7)));
        assert_eq!(p.get("order.lines.0"), Some(&json!("x")));
    }

    #[test]
    fn set_into_existing_list() {
        let mut p = Payload::new(json!({"items": [{"a": 1}]}));
        p.set("items.0.b", json!(2));
        assert_eq!(p.get_payload(), &json!({"items": [{"a": 1, "b": 2}]}));
    }

    #[test]
    fn query_pairs_nest_brackets() {
        let p = Payload::from_query_pairs(vec![
            ("filter[0][field]", "age"),
            ("filter[0][type]", "gte"),
            ("filter[0][value]", "18"),
            ("fields[]", "name"),
            ("fields[]", "age"),
            ("page[number]", "2"),
            ("sort", "-name"),
        ]);
        assert_eq!(
            p.get_payload(),
            &json!({
                "filter": [{"field": "age", "type": "gte", "value": "18"}],
                "fields": ["name", "age"],
                "page": {"number": "2"},
                "sort": "-name"
            })
        );
        assert_eq!(p.get_u64("page.number"), Some(2));
    }

    #[test]
    fn merge_lets_route_params_win() {
        let body = Payload::new(json!({"id": 1, "name": "x"}));
        let merged = body.merge(Payload::new(json!({"id": "5"})));
        assert_eq!(merged.get("id"), Some(&json!("5")));
        assert_eq!(merged.get("name"), Some(&json!("x")));
    }
}
