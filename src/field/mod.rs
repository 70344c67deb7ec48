//! Field declarations: payload validation, filter and sort metadata.

mod registry;

pub use registry::{FieldRegistry, FieldRegistryBuilder, FilterMarker};

/// Rule source as declared: a pipe-separated string or a list of single rules.
#[derive(Clone, Debug, PartialEq)]
pub enum RuleSource {
    Pipe(String),
    List(Vec<String>),
}

/// A declared field of an endpoint. Identity is `name`.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    validation: Option<RuleSource>,
    filterable: bool,
    filter_validation: Option<String>,
    sortable: bool,
    api_only: bool,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            validation: None,
            filterable: false,
            filter_validation: None,
            sortable: false,
            api_only: false,
        }
    }

    /// Payload validation as `required|string|max:255`. Empty strings declare nothing.
    pub fn rules(mut self, rules: impl Into<String>) -> Self {
        let rules = rules.into();
        self.validation = (!rules.trim().is_empty()).then_some(RuleSource::Pipe(rules));
        self
    }

    /// Payload validation as separate rules; use this when a rule (e.g. `regex:`) contains `|`.
    pub fn rule_list<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rules: Vec<String> = rules.into_iter().map(Into::into).collect();
        self.validation = (!rules.is_empty()).then_some(RuleSource::List(rules));
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    /// Filterable, with filter values checked against `rules`.
    pub fn filterable_with(mut self, rules: impl Into<String>) -> Self {
        let rules = rules.into();
        self.filterable = true;
        self.filter_validation = (!rules.trim().is_empty()).then_some(rules);
        self
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    /// Computed by the API (hooks, composer callbacks) rather than sent as raw input.
    pub fn api_only(mut self) -> Self {
        self.api_only = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn validation(&self) -> Option<&RuleSource> {
        self.validation.as_ref()
    }

    pub fn can_filter(&self) -> bool {
        self.filterable
    }

    pub fn filter_validation(&self) -> Option<&str> {
        self.filter_validation.as_deref()
    }

    pub fn can_sort(&self) -> bool {
        self.sortable
    }

    pub fn is_api_only(&self) -> bool {
        self.api_only
    }
}
