use serde::{Deserialize, Serialize};

use super::Filter;

/// A retrieve-multiple query against one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Entity logical name
    pub entity: String,
    pub filter: Option<Filter>,
    /// Columns to return (all when empty)
    #[serde(default)]
    pub select: Vec<String>,
}

impl Query {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            select: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter_opt(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Build the URL query string (without leading `?`), values URL-encoded
    pub fn to_query_string(&self) -> String {
        let mut params = Vec::new();

        if !self.select.is_empty() {
            params.push(format!("$select={}", self.select.join(",")));
        }
        if let Some(filter) = &self.filter {
            params.push(format!("$filter={}", urlencoding::encode(&filter.to_odata())));
        }

        params.join("&")
    }
}
