//! Predicate evaluation and ordering over JSON rows.

use crate::query::{CompareOp, Direction, OrderTerm, Predicate};
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Compare two scalars for filtering: numerically when both read as numbers, else as strings.
/// Null has no order. Not transitive across mixed types; sorting uses [`sort_order`].
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => Some(text(a)?.cmp(&text(b)?)),
    }
}

/// Loose equality: `1`, `1.0` and `"1"` are equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || compare_values(a, b) == Some(Ordering::Equal)
}

/// SQL LIKE, case-insensitive: `%` is any run, `_` any single character.
fn like(value: &Value, pattern: &Value) -> bool {
    let (Some(value), Some(pattern)) = (text(value), text(pattern)) else {
        return false;
    };
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .is_ok_and(|re| re.is_match(&value))
}

/// Whether `row` satisfies `predicate`. Missing columns read as null.
pub fn matches(row: &Value, predicate: &Predicate) -> bool {
    let column = row.get(predicate.field()).unwrap_or(&Value::Null);
    match predicate {
        Predicate::Compare { op: CompareOp::Like, value, .. } => like(column, value),
        Predicate::Compare { op, value, .. } => match compare_values(column, value) {
            None => false,
            Some(ord) => match op {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Neq => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Lte => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Gte => ord != Ordering::Less,
                CompareOp::Like => false,
            },
        },
        Predicate::Null { negated, .. } => column.is_null() != *negated,
        Predicate::Between { from, to, negated, .. } => {
            let within = matches!(compare_values(column, from), Some(Ordering::Greater | Ordering::Equal))
                && matches!(compare_values(column, to), Some(Ordering::Less | Ordering::Equal));
            !column.is_null() && within != *negated
        }
        Predicate::In { values, negated, .. } => {
            let found = values.iter().any(|v| values_equal(column, v));
            !column.is_null() && found != *negated
        }
    }
}

/// Sort rank: null, then booleans, then numbers (numeric strings included), then other
/// strings, then arrays and objects.
fn rank(v: &Value) -> (u8, f64, String) {
    match v {
        Value::Null => (0, 0.0, String::new()),
        Value::Bool(b) => (1, f64::from(u8::from(*b)), String::new()),
        Value::Number(n) => (2, n.as_f64().unwrap_or(0.0), String::new()),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(x) if x.is_finite() => (2, x, String::new()),
            _ => (3, 0.0, s.clone()),
        },
        other => (4, 0.0, other.to_string()),
    }
}

/// Total order for sorting. Unlike [`compare_values`] it is transitive across mixed types.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    let (ra, xa, sa) = rank(a);
    let (rb, xb, sb) = rank(b);
    ra.cmp(&rb).then_with(|| xa.total_cmp(&xb)).then_with(|| sa.cmp(&sb))
}

/// Stable multi-key sort; nulls order first ascending, last descending.
pub fn sort_rows(rows: &mut [Value], orders: &[OrderTerm]) {
    if orders.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for term in orders {
            let x = a.get(&term.field).unwrap_or(&Value::Null);
            let y = b.get(&term.field).unwrap_or(&Value::Null);
            let ord = match term.direction {
                Direction::Asc => sort_order(x, y),
                Direction::Desc => sort_order(x, y).reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compare(field: &str, op: CompareOp, value: Value) -> Predicate {
        Predicate::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    #[test]
    fn numeric_strings_compare_as_numbers() {
        assert_eq!(compare_values(&json!("10"), &json!(9)), Some(Ordering::Greater));
        assert!(values_equal(&json!(1), &json!("1")));
        assert!(!values_equal(&json!("a"), &json!("b")));
    }

    #[test]
    fn null_columns_fail_comparisons() {
        let row = json!({"age": null});
        assert!(!matches(&row, &compare("age", CompareOp::Neq, json!(1))));
        assert!(matches(&row, &Predicate::Null { field: "age".into(), negated: false }));
        assert!(matches(&json!({}), &Predicate::Null { field: "age".into(), negated: false }));
    }

    #[test]
    fn like_is_case_insensitive() {
        let row = json!({"name": "Alice"});
        assert!(matches(&row, &compare("name", CompareOp::Like, json!("%LIC%"))));
        assert!(matches(&row, &compare("name", CompareOp::Like, json!("a_ice"))));
        assert!(!matches(&row, &compare("name", CompareOp::Like, json!("lic"))));
    }

    #[test]
    fn ranges_and_sets() {
        let row = json!({"age": 20});
        let between = |negated| Predicate::Between {
            field: "age".into(),
            from: json!(18),
            to: json!("20"),
            negated,
        };
        assert!(matches(&row, &between(false)));
        assert!(!matches(&row, &between(true)));
        let set = Predicate::In {
            field: "age".into(),
            values: vec![json!(1), json!(20)],
            negated: true,
        };
        assert!(!matches(&row, &set));
    }

    #[test]
    fn sort_is_stable_with_tie_breaks() {
        let mut rows = vec![
            json!({"n": "b", "g": 1}),
            json!({"n": "a", "g": 2}),
            json!({"n": "c", "g": 1}),
            json!({"n": "d"}),
        ];
        sort_rows(
            &mut rows,
            &[
                OrderTerm { field: "g".into(), direction: Direction::Desc },
                OrderTerm { field: "n".into(), direction: Direction::Asc },
            ],
        );
        let order: Vec<&str> = rows.iter().filter_map(|r| r["n"].as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn mixed_type_columns_sort_by_type_then_value() {
        assert_eq!(sort_order(&json!(9), &json!(10)), Ordering::Less);
        assert_eq!(sort_order(&json!(10), &json!("1a")), Ordering::Less);
        assert_eq!(sort_order(&json!(9), &json!("1a")), Ordering::Less);

        let mut rows: Vec<Value> = ["1a", "10", "", "9", "abc", "true", "9.5"]
            .iter()
            .zip([json!("1a"), json!(10), Value::Null, json!(9), json!("abc"), json!(true), json!("9.5")])
            .map(|(label, v)| json!({"label": label, "v": v}))
            .collect();
        sort_rows(&mut rows, &[OrderTerm { field: "v".into(), direction: Direction::Asc }]);
        let order: Vec<&str> = rows.iter().filter_map(|r| r["label"].as_str()).collect();
        assert_eq!(order, vec!["", "true", "9", "9.5", "10", "1a", "abc"]);
    }
}
