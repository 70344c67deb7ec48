//! In-memory record store: tables of JSON rows, query evaluation and snapshot transactions.

mod eval;

use crate::error::{ApiError, ConfigError};
use crate::model::{KeyKind, RecordStore, RelationKind, TableSpec};
use crate::query::{OrderTerm, Page, Predicate, QueryBuilder, QueryPlan, Queryable};
use crate::transaction::Transactional;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

pub use eval::{compare_values, matches, values_equal};

#[derive(Clone, Debug)]
struct TableData {
    spec: TableSpec,
    rows: Vec<Value>,
    next_id: u64,
}

type Tables = BTreeMap<String, TableData>;

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    snapshots: Vec<Tables>,
    /// Thread that opened the outermost transaction still in progress.
    owner: Option<ThreadId>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<Inner>,
    released: Condvar,
}

/// Shared handle to a set of in-memory tables. Clones share the same data.
///
/// A transaction belongs to the thread that began it. Until its outermost level commits or
/// rolls back, every other thread touching the store waits, so a rollback never discards
/// another caller's writes.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Shared>,
}

fn poisoned<T>(_: T) -> ApiError {
    ApiError::Action("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Lock the tables, first waiting out any transaction another thread holds.
    fn lock(&self) -> Result<MutexGuard<'_, Inner>, ApiError> {
        let me = thread::current().id();
        let mut inner = self.inner.state.lock().map_err(poisoned)?;
        while inner.owner.is_some_and(|owner| owner != me) {
            inner = self.inner.released.wait(inner).map_err(poisoned)?;
        }
        Ok(inner)
    }

    fn end(&self, inner: &mut Inner) {
        if inner.snapshots.is_empty() {
            inner.owner = None;
            self.inner.released.notify_all();
        }
    }

    /// Declare a table. Redefining an existing table keeps its rows.
    pub fn define(&self, spec: TableSpec) -> Result<&Self, ApiError> {
        let mut inner = self.lock()?;
        match inner.tables.get_mut(&spec.name) {
            Some(table) => table.spec = spec,
            None => {
                let name = spec.name.clone();
                inner.tables.insert(
                    name,
                    TableData {
                        spec,
                        rows: Vec::new(),
                        next_id: 1,
                    },
                );
            }
        }
        Ok(self)
    }

    /// A record-store handle for one declared table.
    pub fn table(&self, name: &str) -> Result<MemoryTable, ConfigError> {
        let inner = self.lock().map_err(|_| ConfigError::UnknownTable(name.to_string()))?;
        let spec = inner
            .tables
            .get(name)
            .map(|t| t.spec.clone())
            .ok_or_else(|| ConfigError::UnknownTable(name.to_string()))?;
        Ok(MemoryTable {
            store: self.clone(),
            spec,
        })
    }

    /// All rows of a table, in insertion order.
    pub fn rows(&self, name: &str) -> Result<Vec<Value>, ApiError> {
        let inner = self.lock()?;
        Ok(inner.tables.get(name).map(|t| t.rows.clone()).unwrap_or_default())
    }

    /// Number of open transactions.
    pub fn depth(&self) -> usize {
        self.lock().map(|i| i.snapshots.len()).unwrap_or(0)
    }
}

impl Transactional for MemoryStore {
    fn begin(&self) -> Result<(), ApiError> {
        let mut inner = self.lock()?;
        inner.owner = Some(thread::current().id());
        let snapshot = inner.tables.clone();
        inner.snapshots.push(snapshot);
        tracing::trace!(depth = inner.snapshots.len(), "begin");
        Ok(())
    }

    fn commit(&self) -> Result<(), ApiError> {
        let mut inner = self.lock()?;
        inner.snapshots.pop();
        self.end(&mut inner);
        Ok(())
    }

    fn rollback(&self) -> Result<(), ApiError> {
        let mut inner = self.lock()?;
        if let Some(snapshot) = inner.snapshots.pop() {
            inner.tables = snapshot;
            tracing::debug!(depth = inner.snapshots.len(), "rolled back");
        }
        self.end(&mut inner);
        Ok(())
    }
}

/// One table of a [`MemoryStore`], usable as a [`RecordStore`].
#[derive(Clone, Debug)]
pub struct MemoryTable {
    store: MemoryStore,
    spec: TableSpec,
}

impl MemoryTable {
    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    fn with_table<T>(&self, f: impl FnOnce(&TableData) -> T) -> Result<T, ApiError> {
        let inner = self.store.lock()?;
        let table = inner
            .tables
            .get(&self.spec.name)
            .ok_or_else(|| ConfigError::UnknownTable(self.spec.name.clone()))?;
        Ok(f(table))
    }

    fn with_table_mut<T>(&self, f: impl FnOnce(&mut TableData) -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut inner = self.store.lock()?;
        let table = inner
            .tables
            .get_mut(&self.spec.name)
            .ok_or_else(|| ConfigError::UnknownTable(self.spec.name.clone()))?;
        f(table)
    }

    fn key_of<'v>(&self, record: &'v Value) -> Result<&'v Value, ApiError> {
        record
            .get(&self.spec.key)
            .ok_or_else(|| ConfigError::MissingIdentifier { key: self.spec.key.clone() }.into())
    }
}

impl RecordStore for MemoryTable {
    fn key_name(&self) -> &str {
        &self.spec.key
    }

    fn find(&self, key: &Value) -> Result<Option<Value>, ApiError> {
        let keyname = &self.spec.key;
        self.with_table(|t| {
            t.rows
                .iter()
                .find(|row| row.get(keyname).is_some_and(|k| values_equal(k, key)))
                .cloned()
        })
    }

    fn create(&self, attributes: Map<String, Value>) -> Result<Value, ApiError> {
        let keyname = self.spec.key.clone();
        let record = self.with_table_mut(|t| {
            let key = match attributes.get(&keyname) {
                Some(k) if !k.is_null() => {
                    if t.rows.iter().any(|row| row.get(&keyname).is_some_and(|r| values_equal(r, k))) {
                        return Err(ApiError::Conflict(format!("duplicate key {} in {}", k, t.spec.name)));
                    }
                    if let Some(n) = k.as_u64() {
                        t.next_id = t.next_id.max(n.saturating_add(1));
                    }
                    k.clone()
                }
                _ => match t.spec.key_kind {
                    KeyKind::Integer => {
                        let id = t.next_id;
                        let taken = id == u64::MAX
                            && t.rows.iter().any(|row| row.get(&keyname).and_then(Value::as_u64) == Some(id));
                        if taken {
                            return Err(ApiError::Conflict(format!("integer keys exhausted in {}", t.spec.name)));
                        }
                        t.next_id = id.saturating_add(1);
                        Value::from(id)
                    }
                    KeyKind::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                },
            };
            let mut row = Map::new();
            row.insert(keyname.clone(), key);
            row.extend(attributes.into_iter().filter(|(k, _)| *k != keyname));
            let row = Value::Object(row);
            t.rows.push(row.clone());
            Ok(row)
        })?;
        tracing::debug!(table = %self.spec.name, key = %record[&keyname], "created");
        Ok(record)
    }

    fn update(&self, record: &Value, attributes: Map<String, Value>) -> Result<Value, ApiError> {
        let key = self.key_of(record)?.clone();
        let keyname = self.spec.key.clone();
        self.with_table_mut(|t| {
            let row = t
                .rows
                .iter_mut()
                .find(|row| row.get(&keyname).is_some_and(|k| values_equal(k, &key)))
                .ok_or_else(|| ApiError::Conflict(format!("record {} no longer exists", key)))?;
            if let Value::Object(map) = row {
                for (k, v) in attributes {
                    if k != keyname {
                        map.insert(k, v);
                    }
                }
            }
            Ok(row.clone())
        })
    }

    fn delete(&self, record: &Value) -> Result<bool, ApiError> {
        let key = self.key_of(record)?.clone();
        let keyname = self.spec.key.clone();
        self.with_table_mut(|t| {
            let before = t.rows.len();
            t.rows.retain(|row| !row.get(&keyname).is_some_and(|k| values_equal(k, &key)));
            Ok(t.rows.len() < before)
        })
    }

    fn query(&self) -> Box<dyn Queryable + '_> {
        Box::new(MemoryQuery {
            table: self,
            plan: QueryPlan::default(),
        })
    }
}

/// A query over one memory table; operations are recorded and evaluated on `get`/`paginate`.
pub struct MemoryQuery<'a> {
    table: &'a MemoryTable,
    plan: QueryPlan,
}

impl MemoryQuery<'_> {
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Filtered and ordered rows, before paging.
    fn matching(&self) -> Result<Vec<Value>, ApiError> {
        let mut rows = self.table.with_table(|t| {
            t.rows
                .iter()
                .filter(|row| self.plan.predicates.iter().all(|p| matches(row, p)))
                .cloned()
                .collect::<Vec<_>>()
        })?;
        eval::sort_rows(&mut rows, &self.plan.orders);
        Ok(rows)
    }

    fn finish(&self, rows: Vec<Value>, columns: &[String]) -> Result<Vec<Value>, ApiError> {
        let mut rows = rows;
        self.load_eager(&mut rows)?;
        if !columns.is_empty() && !columns.iter().any(|c| c == "*") {
            for row in &mut rows {
                if let Value::Object(map) = row {
                    map.retain(|k, _| columns.contains(k) || self.plan.eager.contains(k));
                }
            }
        }
        Ok(rows)
    }

    fn load_eager(&self, rows: &mut [Value]) -> Result<(), ApiError> {
        for name in &self.plan.eager {
            let relation = self.table.spec.find_relation(name).ok_or_else(|| {
                ApiError::http(
                    axum::http::StatusCode::BAD_REQUEST,
                    format!("call to undefined relationship [{}]", name),
                )
            })?;
            let related = self.table.store.rows(&relation.table)?;
            for row in rows.iter_mut() {
                let local = row.get(&relation.local_key).cloned().unwrap_or(Value::Null);
                let mut linked = related.iter().filter(|r| {
                    !local.is_null() && r.get(&relation.foreign_key).is_some_and(|f| values_equal(f, &local))
                });
                let value = match relation.kind {
                    RelationKind::ToOne => linked.next().cloned().unwrap_or(Value::Null),
                    RelationKind::ToMany => Value::Array(linked.cloned().collect()),
                };
                if let Value::Object(map) = row {
                    map.insert(relation.name.clone(), value);
                }
            }
        }
        Ok(())
    }
}

fn to_index(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

impl QueryBuilder for MemoryQuery<'_> {
    fn add_predicate(&mut self, predicate: Predicate) {
        self.plan.add_predicate(predicate);
    }

    fn add_order(&mut self, term: OrderTerm) {
        self.plan.add_order(term);
    }

    fn add_eager(&mut self, relation: &str) {
        self.plan.add_eager(relation);
    }

    fn skip(&mut self, offset: u64) {
        self.plan.skip(offset);
    }

    fn take(&mut self, limit: u64) {
        self.plan.take(limit);
    }
}

impl Queryable for MemoryQuery<'_> {
    fn get(&mut self) -> Result<Vec<Value>, ApiError> {
        let rows = self.matching()?;
        let offset = to_index(self.plan.offset.unwrap_or(0));
        let rows: Vec<Value> = match self.plan.limit {
            Some(limit) => rows.into_iter().skip(offset).take(to_index(limit)).collect(),
            None => rows.into_iter().skip(offset).collect(),
        };
        self.finish(rows, &[])
    }

    fn paginate(&mut self, size: u64, columns: &[String], page_name: &str, page: u64) -> Result<Page, ApiError> {
        let rows = self.matching()?;
        let total = rows.len() as u64;
        let page = page.max(1);
        let offset = to_index((page - 1).saturating_mul(size));
        let items = rows.into_iter().skip(offset).take(to_index(size)).collect();
        Ok(Page {
            items: self.finish(items, columns)?,
            total,
            per_page: size,
            current_page: page,
            page_name: page_name.to_string(),
            appends: Map::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use crate::query::{apply_filter, apply_include, apply_sort};
    use crate::payload::Payload;
    use crate::transaction::run_in_transaction;
    use serde_json::json;

    fn attrs(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .define(TableSpec::new("users").relation(Relation::to_many("posts", "posts", "id", "user_id")))
            .unwrap()
            .define(TableSpec::new("posts").key("id", KeyKind::Uuid))
            .unwrap();
        let users = store.table("users").unwrap();
        for (name, age) in [("ann", 31), ("bob", 17), ("cy", 45), ("Dee", 18)] {
            users.create(attrs(json!({"name": name, "age": age}))).unwrap();
        }
        let posts = store.table("posts").unwrap();
        posts.create(attrs(json!({"user_id": 1, "title": "hello"}))).unwrap();
        posts.create(attrs(json!({"user_id": 1, "title": "again"}))).unwrap();
        store
    }

    fn query(store: &MemoryStore, payload: Value) -> Vec<Value> {
        let users = store.table("users").unwrap();
        let payload = Payload::new(payload);
        let mut q = users.query();
        apply_filter(q.as_mut(), &payload).unwrap();
        apply_sort(q.as_mut(), &payload);
        apply_include(q.as_mut(), &payload);
        q.get().unwrap()
    }

    fn names(rows: &[Value]) -> Vec<&str> {
        rows.iter().filter_map(|r| r["name"].as_str()).collect()
    }

    #[test]
    fn integer_keys_increment() {
        let store = seeded();
        let rows = store.rows("users").unwrap();
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[3]["id"], json!(4));
        let posts = store.rows("posts").unwrap();
        assert!(uuid::Uuid::parse_str(posts[0]["id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn filters_and_sorts() {
        let store = seeded();
        let rows = query(&store, json!({"filter": [{"field": "age", "type": "gte", "value": "18"}], "sort": "-age"}));
        assert_eq!(names(&rows), vec!["cy", "ann", "Dee"]);
        let rows = query(&store, json!({"filter": [{"field": "name", "type": "like", "value": "D"}]}));
        assert_eq!(names(&rows), vec!["Dee"]);
    }

    #[test]
    fn eager_loads_relations() {
        let store = seeded();
        let rows = query(&store, json!({"include": "posts", "sort": "id"}));
        assert_eq!(rows[0]["posts"].as_array().unwrap().len(), 2);
        assert_eq!(rows[1]["posts"], json!([]));
    }

    #[test]
    fn unknown_relation_is_bad_request() {
        let store = seeded();
        let users = store.table("users").unwrap();
        let mut q = users.query();
        q.add_eager("friends");
        assert!(q.get().is_err());
    }

    #[test]
    fn paginate_counts_before_paging() {
        let store = seeded();
        let users = store.table("users").unwrap();
        let page = users
            .query()
            .paginate(3, &["name".to_string()], "page[number]", 2)
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.items, vec![json!({"name": "Dee"})]);
        assert_eq!(page.last_page(), 2);
    }

    #[test]
    fn rollback_restores_rows() {
        let store = seeded();
        let users = store.table("users").unwrap();
        let result = run_in_transaction::<()>(&store, || {
            users.create(attrs(json!({"name": "eve"})))?;
            Err(ApiError::Action("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.rows("users").unwrap().len(), 4);
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn update_and_delete() {
        let store = seeded();
        let users = store.table("users").unwrap();
        let bob = users.find(&json!("2")).unwrap().unwrap();
        let bob = users.update(&bob, attrs(json!({"age": 18, "id": 99}))).unwrap();
        assert_eq!(bob, json!({"id": 2, "name": "bob", "age": 18}));
        assert!(users.delete(&bob).unwrap());
        assert!(!users.delete(&bob).unwrap());
        assert!(users.find(&json!(2)).unwrap().is_none());
    }

    #[test]
    fn duplicate_key_conflicts() {
        let store = seeded();
        let users = store.table("users").unwrap();
        let err = users.create(attrs(json!({"id": 1}))).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn largest_integer_key_does_not_overflow() {
        let store = seeded();
        let users = store.table("users").unwrap();
        users.create(attrs(json!({"id": u64::MAX, "name": "max"}))).unwrap();
        let err = users.create(attrs(json!({"name": "next"}))).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.rows("users").unwrap().len(), 5);
    }

    #[test]
    fn page_far_past_the_end_is_empty() {
        let store = seeded();
        let users = store.table("users").unwrap();
        let page = users
            .query()
            .paginate(100, &[], "page[number]", 200_000_000_000_000_000)
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 4);

        let mut q = users.query();
        q.skip(u64::MAX);
        q.take(u64::MAX);
        assert!(q.get().unwrap().is_empty());
    }

    #[test]
    fn other_threads_wait_for_an_open_transaction() {
        let store = seeded();
        let users = store.table("users").unwrap();
        store.begin().unwrap();
        users.create(attrs(json!({"name": "eve"}))).unwrap();

        let writer = {
            let store = store.clone();
            let users = users.clone();
            std::thread::spawn(move || {
                run_in_transaction(&store, || users.create(attrs(json!({"name": "fay"}))))
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!writer.is_finished());
        store.rollback().unwrap();

        writer.join().unwrap().unwrap();
        let rows = store.rows("users").unwrap();
        assert_eq!(names(&rows), vec!["ann", "bob", "cy", "Dee", "fay"]);
        assert_eq!(store.depth(), 0);
    }

    #[test]
    fn unknown_table_is_config_error() {
        assert!(matches!(MemoryStore::new().table("x"), Err(ConfigError::UnknownTable(_))));
    }
}
