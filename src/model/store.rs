//! Record-store contract and table descriptions.

use crate::error::ApiError;
use crate::query::Queryable;
use serde_json::{Map, Value};

/// How new primary keys are generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyKind {
    #[default]
    Integer,
    Uuid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    /// Related row whose `foreign_key` equals our `local_key`, as an object or null.
    ToOne,
    /// Related rows whose `foreign_key` equals our `local_key`, as a list.
    ToMany,
}

/// A relation that `include` may name.
#[derive(Clone, Debug, PartialEq)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub table: String,
    pub local_key: String,
    pub foreign_key: String,
}

impl Relation {
    pub fn to_one(name: &str, table: &str, local_key: &str, foreign_key: &str) -> Self {
        Relation {
            name: name.into(),
            kind: RelationKind::ToOne,
            table: table.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn to_many(name: &str, table: &str, local_key: &str, foreign_key: &str) -> Self {
        Relation {
            kind: RelationKind::ToMany,
            ..Relation::to_one(name, table, local_key, foreign_key)
        }
    }
}

/// Table name, key and relations of one record type.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSpec {
    pub schema: String,
    pub name: String,
    pub key: String,
    pub key_kind: KeyKind,
    pub relations: Vec<Relation>,
}

impl TableSpec {
    pub fn new(name: &str) -> Self {
        TableSpec {
            schema: "public".into(),
            name: name.into(),
            key: "id".into(),
            key_kind: KeyKind::Integer,
            relations: Vec::new(),
        }
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn key(mut self, key: &str, kind: KeyKind) -> Self {
        self.key = key.into();
        self.key_kind = kind;
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn find_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// Abstract persistence for one record type. Records are JSON objects.
pub trait RecordStore: Send + Sync {
    /// Name of the primary-key attribute.
    fn key_name(&self) -> &str;

    fn find(&self, key: &Value) -> Result<Option<Value>, ApiError>;

    fn create(&self, attributes: Map<String, Value>) -> Result<Value, ApiError>;

    fn update(&self, record: &Value, attributes: Map<String, Value>) -> Result<Value, ApiError>;

    fn delete(&self, record: &Value) -> Result<bool, ApiError>;

    /// A fresh queryable over all records.
    fn query(&self) -> Box<dyn Queryable + '_>;
}
