//! Translate `filter`, `sort`, `include` and `page` payload entries into query operations.

use crate::error::ApiError;
use crate::payload::{value_as_u64, Payload};
use crate::query::{CompareOp, Direction, OrderTerm, Predicate, QueryBuilder};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    Between,
    NotBetween,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    #[serde(other)]
    Unknown,
}

/// One `filter[i]` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct FilterClause {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: Option<FilterType>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub values: Option<Value>,
    #[serde(default)]
    pub from: Option<Value>,
    #[serde(default)]
    pub to: Option<Value>,
}

impl FilterClause {
    /// The predicate for this clause; clauses without a known type contribute nothing.
    pub fn predicate(&self) -> Option<Predicate> {
        let field = self.field.clone();
        let value = || self.value.clone().unwrap_or(Value::Null);
        let compare = |op| Predicate::Compare {
            field: field.clone(),
            op,
            value: value(),
        };
        let range = |negated| Predicate::Between {
            field: field.clone(),
            from: self.from.clone().unwrap_or(Value::Null),
            to: self.to.clone().unwrap_or(Value::Null),
            negated,
        };
        let set = |negated| Predicate::In {
            field: field.clone(),
            values: list_of(self.values.as_ref()),
            negated,
        };
        Some(match self.kind? {
            FilterType::Eq => compare(CompareOp::Eq),
            FilterType::Neq => compare(CompareOp::Neq),
            FilterType::Lt => compare(CompareOp::Lt),
            FilterType::Lte => compare(CompareOp::Lte),
            FilterType::Gt => compare(CompareOp::Gt),
            FilterType::Gte => compare(CompareOp::Gte),
            FilterType::Like => Predicate::Compare {
                field: field.clone(),
                op: CompareOp::Like,
                value: Value::String(like_pattern(&value())),
            },
            FilterType::IsNull => Predicate::Null {
                field: field.clone(),
                negated: false,
            },
            FilterType::IsNotNull => Predicate::Null {
                field: field.clone(),
                negated: true,
            },
            FilterType::Between => range(false),
            FilterType::NotBetween => range(true),
            FilterType::In => set(false),
            FilterType::NotIn => set(true),
            FilterType::Unknown => return None,
        })
    }
}

fn like_pattern(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if text.contains('%') {
        text
    } else {
        format!("%{}%", text)
    }
}

fn list_of(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(list)) => list.clone(),
        Some(Value::Object(map)) => map.values().cloned().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

/// Comma-separated list with a trailing comma trimmed. Lists are accepted as-is.
fn split_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .trim_end_matches(',')
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(list) => list.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

/// Add one predicate per `filter` clause, in payload order. All clauses are conjunctive.
pub fn apply_filter<Q: QueryBuilder + ?Sized>(query: &mut Q, payload: &Payload) -> Result<(), ApiError> {
    let Some(filter) = payload.get("filter") else {
        return Ok(());
    };
    for clause in list_of(Some(filter)) {
        let clause: FilterClause = serde_json::from_value(clause).map_err(|e| {
            ApiError::http(StatusCode::BAD_REQUEST, format!("malformed filter clause: {}", e))
        })?;
        if let Some(predicate) = clause.predicate() {
            tracing::trace!(predicate = %predicate, "filter");
            query.add_predicate(predicate);
        }
    }
    Ok(())
}

/// Add order terms from `sort`; the first token is the primary key, `-` means descending.
pub fn apply_sort<Q: QueryBuilder + ?Sized>(query: &mut Q, payload: &Payload) {
    let Some(sort) = payload.get("sort") else {
        return;
    };
    for token in split_list(sort) {
        let term = match token.strip_prefix('-') {
            Some(field) => OrderTerm {
                field: field.to_string(),
                direction: Direction::Desc,
            },
            None => OrderTerm {
                field: token,
                direction: Direction::Asc,
            },
        };
        query.add_order(term);
    }
}

/// Request eager loading of each relation named in `include`.
pub fn apply_include<Q: QueryBuilder + ?Sized>(query: &mut Q, payload: &Payload) {
    if let Some(include) = payload.get("include") {
        for relation in split_list(include) {
            query.add_eager(&relation);
        }
    }
}

/// Requested page position; page numbers are 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSpec {
    pub number: u64,
    pub size: u64,
}

impl PageSpec {
    /// Rows to skip before this page. Saturates, so a page past any table reads as empty.
    pub fn offset(&self) -> u64 {
        self.number.saturating_sub(1).saturating_mul(self.size)
    }
}

pub fn page_spec(payload: &Payload, default_size: u64) -> PageSpec {
    PageSpec {
        number: payload.get("page.number").and_then(value_as_u64).unwrap_or(1),
        size: payload.get("page.size").and_then(value_as_u64).unwrap_or(default_size),
    }
}

/// `skip((number * size) - size)` then `take(size)`.
pub fn apply_offset<Q: QueryBuilder + ?Sized>(query: &mut Q, payload: &Payload, default_size: u64) -> PageSpec {
    let spec = page_spec(payload, default_size);
    query.skip(spec.offset());
    query.take(spec.size);
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldRegistry};
    use crate::query::QueryPlan;
    use crate::rules::{compile, RuleScope, RuleValidator, Validator};
    use serde_json::json;

    fn plan_for(payload: Value) -> QueryPlan {
        let payload = Payload::new(payload);
        let mut plan = QueryPlan::default();
        apply_filter(&mut plan, &payload).unwrap();
        apply_sort(&mut plan, &payload);
        apply_include(&mut plan, &payload);
        apply_offset(&mut plan, &payload, 25);
        plan
    }

    #[test]
    fn end_to_end_validation_and_plan() {
        let registry = FieldRegistry::builder()
            .field(Field::new("name").sortable().filterable())
            .field(Field::new("age").filterable_with("numeric"))
            .freeze()
            .unwrap();
        let payload = json!({
            "filter": [{"field": "age", "type": "gte", "value": 18}],
            "sort": "-name",
            "page": {"number": 1, "size": 2}
        });
        let validation = RuleValidator.validate(&payload, &compile(&registry, RuleScope::Full));
        assert!(validation.passes(), "{:?}", validation.errors());

        let plan = plan_for(payload);
        assert_eq!(plan.predicates[0].to_string(), "age >= 18");
        assert_eq!(plan.orders[0].to_string(), "name DESC");
        assert_eq!(plan.offset, Some(0));
        assert_eq!(plan.limit, Some(2));
    }

    #[test]
    fn offset_is_one_based() {
        let plan = plan_for(json!({"page": {"number": 2, "size": 10}}));
        assert_eq!((plan.offset, plan.limit), (Some(10), Some(10)));
        let plan = plan_for(json!({"page": {"number": "3", "size": "5"}}));
        assert_eq!((plan.offset, plan.limit), (Some(10), Some(5)));
        let plan = plan_for(json!({}));
        assert_eq!((plan.offset, plan.limit), (Some(0), Some(25)));
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let plan = plan_for(json!({"page": {"number": "200000000000000000", "size": "100"}}));
        assert_eq!((plan.offset, plan.limit), (Some(u64::MAX), Some(100)));
        let spec = PageSpec { number: u64::MAX, size: u64::MAX };
        assert_eq!(spec.offset(), u64::MAX);
    }

    #[test]
    fn filter_types_map_to_predicates() {
        let plan = plan_for(json!({"filter": [
            {"field": "a", "type": "neq", "value": "x"},
            {"field": "b", "type": "like", "value": "jo"},
            {"field": "c", "type": "like", "value": "jo%"},
            {"field": "d", "type": "is_not_null"},
            {"field": "e", "type": "not_between", "from": 1, "to": 5},
            {"field": "f", "type": "in", "values": [1, 2]}
        ]}));
        let text: Vec<String> = plan.predicates.iter().map(ToString::to_string).collect();
        assert_eq!(
            text,
            vec![
                "a <> 'x'",
                "b LIKE '%jo%'",
                "c LIKE 'jo%'",
                "d IS NOT NULL",
                "e NOT BETWEEN 1 AND 5",
                "f IN (1, 2)",
            ]
        );
    }

    #[test]
    fn clauses_without_type_are_skipped() {
        let plan = plan_for(json!({"filter": [{"field": "a", "value": 1}, {"field": "b", "type": "eq", "value": 2}]}));
        assert_eq!(plan.predicates.len(), 1);
        assert_eq!(plan.predicates[0].field(), "b");
    }

    #[test]
    fn sort_tokens_keep_precedence() {
        let plan = plan_for(json!({"sort": "-name,age,"}));
        let text: Vec<String> = plan.orders.iter().map(ToString::to_string).collect();
        assert_eq!(text, vec!["name DESC", "age ASC"]);
    }

    #[test]
    fn include_requests_relations() {
        let plan = plan_for(json!({"include": "posts,owner,"}));
        assert_eq!(plan.eager, vec!["posts", "owner"]);
    }

    #[test]
    fn malformed_clause_is_bad_request() {
        let mut plan = QueryPlan::default();
        let err = apply_filter(&mut plan, &Payload::new(json!({"filter": [{"type": "eq"}]}))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
