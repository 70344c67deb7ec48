//! Transformers shape one record into its wire form.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

/// What the renderer asks of a transformer beyond the record itself.
#[derive(Clone, Debug, Default)]
pub struct TransformScope {
    /// Relations the client asked to embed.
    pub includes: Vec<String>,
}

impl TransformScope {
    pub fn includes(&self, relation: &str) -> bool {
        self.includes.iter().any(|r| r == relation)
    }
}

pub trait Transformer: Send + Sync {
    fn transform(&self, record: &Value, scope: &TransformScope) -> Value;
}

/// Record as stored, with declared date attributes normalized to RFC 3339.
#[derive(Clone, Debug, Default)]
pub struct DefaultTransformer {
    dates: Vec<String>,
}

impl DefaultTransformer {
    pub fn new() -> Self {
        DefaultTransformer::default()
    }

    pub fn with_dates<I, S>(dates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DefaultTransformer {
            dates: dates.into_iter().map(Into::into).collect(),
        }
    }
}

/// Parse the common stored date shapes into UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

impl Transformer for DefaultTransformer {
    fn transform(&self, record: &Value, _scope: &TransformScope) -> Value {
        let Value::Object(map) = record else {
            return match record {
                Value::Null => Value::Object(Map::new()),
                other => other.clone(),
            };
        };
        let mut out = map.clone();
        for key in &self.dates {
            if let Some(Value::String(raw)) = out.get(key) {
                if let Some(dt) = parse_date(raw) {
                    out.insert(key.clone(), Value::String(dt.to_rfc3339_opts(SecondsFormat::Secs, false)));
                }
            }
        }
        Value::Object(out)
    }
}

/// Data passes through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArrayTransformer;

impl Transformer for ArrayTransformer {
    fn transform(&self, record: &Value, _scope: &TransformScope) -> Value {
        record.clone()
    }
}

/// Produces nothing; used by bodiless responses.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlankTransformer;

impl Transformer for BlankTransformer {
    fn transform(&self, _record: &Value, _scope: &TransformScope) -> Value {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_normalizes_dates() {
        let t = DefaultTransformer::with_dates(["created_at", "born"]);
        let out = t.transform(
            &json!({"id": 1, "created_at": "2024-03-01 10:20:30", "born": "1990-05-06"}),
            &TransformScope::default(),
        );
        assert_eq!(out["created_at"], "2024-03-01T10:20:30+00:00");
        assert_eq!(out["born"], "1990-05-06T00:00:00+00:00");
        assert_eq!(out["id"], 1);
    }

    #[test]
    fn null_record_becomes_empty_object() {
        assert_eq!(DefaultTransformer::new().transform(&Value::Null, &TransformScope::default()), json!({}));
    }

    #[test]
    fn unparseable_dates_are_kept() {
        let t = DefaultTransformer::with_dates(["at"]);
        assert_eq!(t.transform(&json!({"at": "soon"}), &TransformScope::default())["at"], "soon");
    }
}
