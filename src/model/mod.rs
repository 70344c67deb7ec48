//! Generic CRUD over a [`RecordStore`]: the ready-made `run` action for model endpoints.

mod store;

pub use store::{KeyKind, RecordStore, Relation, RelationKind, TableSpec};

use crate::endpoint::{ApiEndpoint, Reply, RunContext};
use crate::error::{ApiError, ConfigError};
use crate::field::FieldRegistry;
use crate::payload::Payload;
use crate::query::{apply_filter, apply_include, apply_offset, apply_sort, page_spec, Queryable};
use crate::response::{DefaultTransformer, ResponseFactory, Transformer};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Page parameter name carried on pagination links.
pub const PAGE_NAME: &str = "page[number]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunType {
    ReadAll,
    Read,
    Create,
    Update,
    Delete,
}

impl RunType {
    /// Read, update and delete address one record by key.
    pub fn needs_identifier(self) -> bool {
        matches!(self, RunType::Read | RunType::Update | RunType::Delete)
    }
}

/// Optional interception points around a model action.
pub trait ModelHooks: Send + Sync {
    /// Returning false refuses the action with 400 Bad Request.
    fn pre_event(&self, _run_type: RunType, _payload: &Payload) -> bool {
        true
    }

    /// Adjust the record an action produced before it is rendered.
    fn post_event(&self, record: Value) -> Result<Value, ApiError> {
        Ok(record)
    }

    /// Last chance to shape a read-all query before it runs.
    fn modify_query(&self, _query: &mut dyn Queryable, _payload: &Payload) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl ModelHooks for NoHooks {}

/// An endpoint whose `run` is one CRUD action against a record store.
pub struct ModelEndpoint {
    name: String,
    fields: FieldRegistry,
    store: Arc<dyn RecordStore>,
    run_type: RunType,
    transformer: Arc<dyn Transformer>,
    paginate: bool,
    page_size: Option<u64>,
    bulk_identifier: Option<String>,
    hooks: Arc<dyn ModelHooks>,
}

impl ModelEndpoint {
    pub fn new(name: impl Into<String>, store: Arc<dyn RecordStore>, run_type: RunType, fields: FieldRegistry) -> Self {
        ModelEndpoint {
            name: name.into(),
            fields,
            store,
            run_type,
            transformer: Arc::new(DefaultTransformer::new()),
            paginate: true,
            page_size: None,
            bulk_identifier: None,
            hooks: Arc::new(NoHooks),
        }
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = transformer;
        self
    }

    /// Read-all returns one offset/limit slice instead of a page with totals.
    pub fn without_pagination(mut self) -> Self {
        self.paginate = false;
        self
    }

    pub fn page_size(mut self, size: u64) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn bulk(mut self, key: impl Into<String>) -> Self {
        self.bulk_identifier = Some(key.into());
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn ModelHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    fn identifier<'p>(&self, payload: &'p Payload) -> Result<&'p Value, ConfigError> {
        let key = self.store.key_name();
        payload.get(key).ok_or_else(|| ConfigError::MissingIdentifier { key: key.to_string() })
    }

    /// Attributes a write may persist: fields that declare payload validation.
    fn attributes(&self, payload: &Payload) -> Map<String, Value> {
        let keys: Vec<&str> = self.fields.payload_validation_keys().collect();
        match payload.only(&keys).into_inner() {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn read_all(&self, ctx: &RunContext<'_>) -> Result<Reply, ApiError> {
        let payload = ctx.payload();
        let mut query = self.store.query();
        apply_filter(&mut *query, payload)?;
        apply_sort(&mut *query, payload);
        apply_include(&mut *query, payload);
        self.hooks.modify_query(&mut *query, payload)?;

        if !self.paginate {
            apply_offset(&mut *query, payload, ctx.default_page_size());
            let items = query.get()?;
            return Ok(ResponseFactory::collection(items, self.transformer.clone()).into());
        }

        let spec = page_spec(payload, ctx.default_page_size());
        let columns = columns(payload.get("fields"));
        let mut appends = Map::new();
        appends.insert("filter".into(), payload.get("filter").cloned().unwrap_or(Value::Null));
        appends.insert("page".into(), json!({ "size": payload.get("page.size") }));
        appends.insert("sort".into(), payload.get("sort").cloned().unwrap_or(Value::Null));
        appends.insert("fields".into(), payload.get("fields").cloned().unwrap_or(Value::Null));
        let page = query
            .paginate(spec.size, &columns, PAGE_NAME, spec.number)?
            .appends(appends);
        Ok(ResponseFactory::paginated(page, self.transformer.clone()).into())
    }

    /// Identifier check, pre-event veto, the action, then post-event on whatever it produced.
    fn action(
        &self,
        payload: &Payload,
        f: impl FnOnce(&Payload) -> Result<Option<Value>, ApiError>,
    ) -> Result<Reply, ApiError> {
        if self.run_type.needs_identifier() {
            self.identifier(payload)?;
        }
        if !self.hooks.pre_event(self.run_type, payload) {
            return Err(ResponseFactory::error_bad_request());
        }
        match f(payload)? {
            Some(record) => {
                let record = self.hooks.post_event(record)?;
                Ok(ResponseFactory::item(record, self.transformer.clone()).into())
            }
            None => Ok(ResponseFactory::no_content().into()),
        }
    }

    fn delete(&self, payload: &Payload) -> Result<Reply, ApiError> {
        let key = self.identifier(payload)?;
        if !self.hooks.pre_event(self.run_type, payload) {
            return Err(ResponseFactory::error_bad_request());
        }
        let acknowledged = match self.store.find(key)? {
            Some(record) => {
                let deleted = self.store.delete(&record)?;
                self.hooks.post_event(record)?;
                deleted
            }
            None => false,
        };
        Ok(ResponseFactory::array(json!({ "data": { "acknowledged": acknowledged } })).into())
    }
}

fn columns(fields: Option<&Value>) -> Vec<String> {
    let columns: Vec<String> = match fields {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    if columns.is_empty() {
        vec!["*".to_string()]
    } else {
        columns
    }
}

impl ApiEndpoint for ModelEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<Reply, ApiError> {
        let payload = ctx.payload();
        match self.run_type {
            RunType::ReadAll => self.read_all(ctx),
            RunType::Read => self.action(payload, |p| self.store.find(self.identifier(p)?)),
            RunType::Create => self.action(payload, |p| self.store.create(self.attributes(p)).map(Some)),
            RunType::Update => self.action(payload, |p| match self.store.find(self.identifier(p)?)? {
                Some(record) => self.store.update(&record, self.attributes(p)).map(Some),
                None => Ok(None),
            }),
            RunType::Delete => self.delete(payload),
        }
    }

    fn bulk_identifier(&self) -> Option<&str> {
        self.bulk_identifier.as_deref()
    }

    fn default_page_size(&self) -> Option<u64> {
        self.page_size
    }

    fn transformer(&self) -> Option<Arc<dyn Transformer>> {
        Some(self.transformer.clone())
    }
}
