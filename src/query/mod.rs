//! Query-shaping operations against an opaque queryable collection.
//!
//! A validated payload is translated into predicates, order terms, eager relations and
//! offset/limit by the `apply_*` functions; stores implement [`Queryable`] to run them.

mod plan;

pub use plan::{apply_filter, apply_include, apply_offset, apply_sort, page_spec, FilterClause, FilterType, PageSpec};

use crate::error::ApiError;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

/// One conjunctive condition on a column.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare { field: String, op: CompareOp, value: Value },
    Null { field: String, negated: bool },
    Between { field: String, from: Value, to: Value, negated: bool },
    In { field: String, values: Vec<Value>, negated: bool },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Compare { field, .. }
            | Predicate::Null { field, .. }
            | Predicate::Between { field, .. }
            | Predicate::In { field, .. } => field,
        }
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::String(s) => write!(f, "'{}'", s),
        other => write!(f, "{}", other),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { field, op, value } => {
                write!(f, "{} {} ", field, op.as_sql())?;
                write_value(f, value)
            }
            Predicate::Null { field, negated } => {
                write!(f, "{} IS {}NULL", field, if *negated { "NOT " } else { "" })
            }
            Predicate::Between { field, from, to, negated } => {
                write!(f, "{} {}BETWEEN ", field, if *negated { "NOT " } else { "" })?;
                write_value(f, from)?;
                f.write_str(" AND ")?;
                write_value(f, to)
            }
            Predicate::In { field, values, negated } => {
                write!(f, "{} {}IN (", field, if *negated { "NOT " } else { "" })?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_value(f, v)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderTerm {
    pub field: String,
    pub direction: Direction,
}

impl fmt::Display for OrderTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        write!(f, "{} {}", self.field, dir)
    }
}

/// Operations a queryable collection accepts while a plan is being built.
pub trait QueryBuilder {
    fn add_predicate(&mut self, predicate: Predicate);
    fn add_order(&mut self, term: OrderTerm);
    fn add_eager(&mut self, relation: &str);
    fn skip(&mut self, offset: u64);
    fn take(&mut self, limit: u64);
}

/// A queryable collection with terminal operations.
pub trait Queryable: QueryBuilder {
    fn get(&mut self) -> Result<Vec<Value>, ApiError>;

    /// One page of records. `columns` of `["*"]` selects everything.
    fn paginate(
        &mut self,
        size: u64,
        columns: &[String],
        page_name: &str,
        page: u64,
    ) -> Result<Page, ApiError>;
}

/// A page of records with its position in the full result.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub page_name: String,
    /// Extra query parameters to carry on pagination links.
    pub appends: Map<String, Value>,
}

impl Page {
    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn appends(mut self, appends: Map<String, Value>) -> Self {
        self.appends.extend(appends);
        self
    }
}

/// A recorded sequence of query operations, replayed by a store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPlan {
    pub predicates: Vec<Predicate>,
    pub orders: Vec<OrderTerm>,
    pub eager: Vec<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl QueryBuilder for QueryPlan {
    fn add_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    fn add_order(&mut self, term: OrderTerm) {
        self.orders.push(term);
    }

    fn add_eager(&mut self, relation: &str) {
        if !self.eager.iter().any(|r| r == relation) {
            self.eager.push(relation.to_string());
        }
    }

    fn skip(&mut self, offset: u64) {
        self.offset = Some(offset);
    }

    fn take(&mut self, limit: u64) {
        self.limit = Some(limit);
    }
}

impl QueryPlan {
    /// Human-readable operations, in the order they apply.
    pub fn describe(&self) -> Vec<String> {
        let mut out: Vec<String> = self.predicates.iter().map(|p| format!("where {}", p)).collect();
        out.extend(self.orders.iter().map(|o| format!("order {}", o)));
        out.extend(self.eager.iter().map(|r| format!("with {}", r)));
        out.extend(self.offset.map(|n| format!("skip {}", n)));
        out.extend(self.limit.map(|n| format!("take {}", n)));
        out
    }
}
