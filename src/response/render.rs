//! Renderer collaborator and the default JSON renderer.

use crate::payload::Payload;
use crate::query::Page;
use crate::response::factory::Data;
use crate::response::transformer::{TransformScope, Transformer};
use crate::response::wire::WireResponse;
use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Fieldset key for the primary resource when no resource key is set.
pub const PRIMARY_RESOURCE: &str = "data";

/// Include, exclude and sparse-fieldset requests for one render.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderOptions {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    /// Resource name → attributes to keep.
    pub fieldsets: BTreeMap<String, Vec<String>>,
    pub resource_key: Option<String>,
}

fn list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::Object(map)) => map.values().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

impl RenderOptions {
    /// Options requested by a (narrowed) payload: `include` and `fields`.
    pub fn from_payload(payload: &Payload) -> Self {
        let mut fieldsets = BTreeMap::new();
        let fields = list(payload.get("fields"));
        if !fields.is_empty() {
            fieldsets.insert(PRIMARY_RESOURCE.to_string(), fields);
        }
        RenderOptions {
            includes: list(payload.get("include")),
            excludes: Vec::new(),
            fieldsets,
            resource_key: None,
        }
    }

    fn primary_fieldset(&self) -> Option<&Vec<String>> {
        let key = self.resource_key.as_deref().unwrap_or(PRIMARY_RESOURCE);
        self.fieldsets.get(key)
    }

    fn scope(&self) -> TransformScope {
        TransformScope {
            includes: self.includes.clone(),
        }
    }
}

/// Renderer collaborator: turns envelope state into a wire response.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        data: Option<&Data>,
        transformer: Option<&dyn Transformer>,
        options: &RenderOptions,
        meta: &Map<String, Value>,
        status: StatusCode,
        headers: &[(String, String)],
    ) -> WireResponse;
}

/// `{"data": ...}` documents with optional `meta` and pagination.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl JsonRenderer {
    fn shape(&self, record: &Value, transformer: Option<&dyn Transformer>, options: &RenderOptions) -> Value {
        let scope = options.scope();
        let mut out = match transformer {
            Some(t) => t.transform(record, &scope),
            None => record.clone(),
        };
        if let Value::Object(map) = &mut out {
            map.retain(|k, _| !options.excludes.iter().any(|e| e == k));
            if let Some(fields) = options.primary_fieldset() {
                map.retain(|k, _| fields.contains(k) || options.includes.contains(k));
            }
            for relation in &options.includes {
                if let (Some(fields), Some(nested)) = (options.fieldsets.get(relation), map.get_mut(relation)) {
                    restrict(nested, fields);
                }
            }
        }
        out
    }
}

fn restrict(value: &mut Value, fields: &[String]) {
    match value {
        Value::Object(map) => map.retain(|k, _| fields.contains(k)),
        Value::Array(items) => items.iter_mut().for_each(|item| restrict(item, fields)),
        _ => {}
    }
}

/// Flatten a value into bracket-notation query pairs, skipping nulls.
fn query_pairs(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() { k.clone() } else { format!("{}[{}]", prefix, k) };
                query_pairs(&key, v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                query_pairs(&format!("{}[{}]", prefix, i), v, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            '#' => out.push_str("%23"),
            '%' => out.push_str("%25"),
            '+' => out.push_str("%2B"),
            ' ' => out.push_str("%20"),
            c => out.push(c),
        }
    }
    out
}

fn page_link(page: &Page, number: u64) -> String {
    let mut pairs = Vec::new();
    query_pairs("", &Value::Object(page.appends.clone()), &mut pairs);
    pairs.retain(|(k, _)| *k != page.page_name);
    pairs.push((page.page_name.clone(), number.to_string()));
    let qs: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, escape(v)))
        .collect();
    format!("?{}", qs.join("&"))
}

fn pagination(page: &Page) -> Value {
    let mut links = Map::new();
    if page.current_page > 1 {
        links.insert("previous".into(), Value::String(page_link(page, page.current_page - 1)));
    }
    if page.current_page < page.last_page() {
        links.insert("next".into(), Value::String(page_link(page, page.current_page + 1)));
    }
    json!({
        "total": page.total,
        "count": page.items.len(),
        "per_page": page.per_page,
        "current_page": page.current_page,
        "total_pages": page.last_page(),
        "links": links,
    })
}

impl Renderer for JsonRenderer {
    fn render(
        &self,
        data: Option<&Data>,
        transformer: Option<&dyn Transformer>,
        options: &RenderOptions,
        meta: &Map<String, Value>,
        status: StatusCode,
        headers: &[(String, String)],
    ) -> WireResponse {
        let mut meta = meta.clone();
        let body = match data {
            _ if status == StatusCode::NO_CONTENT => None,
            None => None,
            Some(Data::Raw(value)) => Some(value.clone()),
            Some(Data::Item(record)) => Some(json!({ "data": self.shape(record, transformer, options) })),
            Some(Data::Collection(items)) => {
                let items: Vec<Value> = items.iter().map(|r| self.shape(r, transformer, options)).collect();
                Some(json!({ "data": items }))
            }
            Some(Data::Page(page)) => {
                let items: Vec<Value> = page.items.iter().map(|r| self.shape(r, transformer, options)).collect();
                meta.insert("pagination".into(), pagination(page));
                Some(json!({ "data": items }))
            }
        };
        let body = match body {
            Some(Value::Object(mut doc)) if !meta.is_empty() => {
                match doc.get_mut("meta") {
                    Some(Value::Object(existing)) => existing.extend(meta),
                    _ => {
                        doc.insert("meta".into(), Value::Object(meta));
                    }
                }
                Some(Value::Object(doc))
            }
            other => other,
        };
        WireResponse::new(status, body).with_headers(headers.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::transformer::{ArrayTransformer, DefaultTransformer};

    fn render(data: Data, options: &RenderOptions) -> Value {
        JsonRenderer
            .render(Some(&data), Some(&DefaultTransformer::new()), options, &Map::new(), StatusCode::OK, &[])
            .body()
            .cloned()
            .unwrap_or(Value::Null)
    }

    #[test]
    fn collection_wraps_in_data() {
        let body = render(Data::Collection(vec![json!({"id": 1}), json!({"id": 2})]), &RenderOptions::default());
        assert_eq!(body, json!({"data": [{"id": 1}, {"id": 2}]}));
    }

    #[test]
    fn raw_is_rendered_as_is() {
        let body = JsonRenderer
            .render(
                Some(&Data::Raw(json!({"data": {"acknowledged": true}}))),
                Some(&ArrayTransformer),
                &RenderOptions::default(),
                &Map::new(),
                StatusCode::OK,
                &[],
            )
            .body()
            .cloned();
        assert_eq!(body, Some(json!({"data": {"acknowledged": true}})));
    }

    #[test]
    fn page_adds_pagination_meta_and_links() {
        let mut appends = Map::new();
        appends.insert("sort".into(), json!("-name"));
        appends.insert("filter".into(), Value::Null);
        appends.insert("page".into(), json!({"size": 1}));
        let page = Page {
            items: vec![json!({"id": 2})],
            total: 3,
            per_page: 1,
            current_page: 2,
            page_name: "page[number]".into(),
            appends,
        };
        let body = render(Data::Page(page), &RenderOptions::default());
        let pagination = &body["meta"]["pagination"];
        assert_eq!(pagination["total"], 3);
        assert_eq!(pagination["count"], 1);
        assert_eq!(pagination["total_pages"], 3);
        assert_eq!(pagination["links"]["next"], "?sort=-name&page[size]=1&page[number]=3");
        assert_eq!(pagination["links"]["previous"], "?sort=-name&page[size]=1&page[number]=1");
    }

    #[test]
    fn fieldsets_and_excludes_trim_records() {
        let payload = Payload::new(json!({"fields": ["name"], "include": "posts"}));
        let mut options = RenderOptions::from_payload(&payload);
        options.fieldsets.insert("posts".into(), vec!["title".into()]);
        options.excludes.push("secret".into());
        let body = render(
            Data::Item(json!({"id": 1, "name": "ann", "secret": "x", "posts": [{"id": 9, "title": "t"}]})),
            &options,
        );
        assert_eq!(body, json!({"data": {"name": "ann", "posts": [{"title": "t"}]}}));
    }

    #[test]
    fn no_content_has_no_body() {
        let wire = JsonRenderer.render(
            Some(&Data::Item(json!({"id": 1}))),
            None,
            &RenderOptions::default(),
            &Map::new(),
            StatusCode::NO_CONTENT,
            &[],
        );
        assert_eq!(wire.body(), None);
    }
}
