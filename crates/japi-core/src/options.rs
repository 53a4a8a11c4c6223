use serde::{Deserialize, Serialize};

use crate::params::PageSpec;

/// Options applied to every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginOptions {
    /// Default paging for collection fetches that omit `page`.
    pub pagination: Option<PageSpec>,
    /// Filter value standing for SQL `NULL`.
    pub null_string: String,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            pagination: None,
            null_string: "null".to_string(),
        }
    }
}

impl PluginOptions {
    pub fn with_pagination(mut self, page: PageSpec) -> Self {
        self.pagination = (!page.is_empty()).then_some(page);
        self
    }

    pub fn with_null_string(mut self, sentinel: &str) -> Self {
        self.null_string = sentinel.to_string();
        self
    }
}
