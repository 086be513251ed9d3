//! Read filter
//!
//! The dispatch engine never interprets a filter. It hashes it into the
//! operation identity and hands it to the pipe handler unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Paging and query parameters for a filtered read
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
    #[serde(default, rename = "where", skip_serializing_if = "BTreeMap::is_empty")]
    where_clause: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link_uri: Option<String>,
}

impl ReadFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Require the field `key` to equal `value`
    #[must_use]
    pub fn where_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.where_clause.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn link_uri(mut self, uri: impl Into<String>) -> Self {
        self.link_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn get_limit(&self) -> Option<u32> {
        self.limit
    }

    #[must_use]
    pub fn get_offset(&self) -> Option<u32> {
        self.offset
    }

    #[must_use]
    pub fn get_where(&self) -> &BTreeMap<String, String> {
        &self.where_clause
    }

    #[must_use]
    pub fn get_link_uri(&self) -> Option<&str> {
        self.link_uri.as_deref()
    }
}
