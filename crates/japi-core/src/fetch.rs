//! Execution seam between the compiler and a data-access layer.

use async_trait::async_trait;
use serde::Serialize;

use crate::compile::EagerLoad;
use crate::error::Result;
use crate::params::PageSpec;
use crate::sql::QueryPlan;
use crate::value::ObjectValue;

const DEFAULT_PAGE_SIZE: u64 = 10;

/// A compiled root query and the relations to eager-load for its rows.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub query: QueryPlan,
    pub includes: Vec<EagerLoad>,
}

/// Resolved paging of a page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRequest {
    Offset { limit: u64, offset: u64 },
    Numbered { page: u64, page_size: u64 },
}

impl PageRequest {
    /// `limit`/`offset` win over `page`/`pageSize` when both are given.
    pub fn from_spec(spec: &PageSpec) -> Self {
        if spec.limit.is_some() || spec.offset.is_some() {
            PageRequest::Offset {
                limit: spec.limit.unwrap_or(DEFAULT_PAGE_SIZE),
                offset: spec.offset.unwrap_or(0),
            }
        } else {
            PageRequest::Numbered {
                page: spec.page.unwrap_or(1).max(1),
                page_size: spec.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            }
        }
    }

    pub fn limit(&self) -> u64 {
        match *self {
            PageRequest::Offset { limit, .. } => limit,
            PageRequest::Numbered { page_size, .. } => page_size,
        }
    }

    pub fn offset(&self) -> u64 {
        match *self {
            PageRequest::Offset { offset, .. } => offset,
            PageRequest::Numbered { page, page_size } => {
                page.saturating_sub(1).saturating_mul(page_size)
            }
        }
    }

    pub fn pagination(&self, row_count: u64) -> Pagination {
        let size = self.limit();
        let page_count = if size == 0 { 0 } else { row_count.div_ceil(size) };
        let mut out = Pagination {
            row_count,
            page_count,
            page: None,
            page_size: None,
            limit: None,
            offset: None,
        };
        match *self {
            PageRequest::Offset { limit, offset } => {
                out.limit = Some(limit);
                out.offset = Some(offset);
            }
            PageRequest::Numbered { page, page_size } => {
                out.page = Some(page);
                out.page_size = Some(page_size);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub row_count: u64,
    pub page_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub rows: Vec<ObjectValue>,
    pub pagination: Pagination,
}

/// Result of a fetch, shaped by the execution mode.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Fetched {
    One(Option<ObjectValue>),
    Many(Vec<ObjectValue>),
    Page(Page),
}

impl Fetched {
    pub fn rows(&self) -> &[ObjectValue] {
        match self {
            Fetched::One(Some(row)) => std::slice::from_ref(row),
            Fetched::One(None) => &[],
            Fetched::Many(rows) => rows,
            Fetched::Page(page) => &page.rows,
        }
    }
}

/// Data-access layer executing compiled requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_one(&self, request: FetchRequest) -> Result<Option<ObjectValue>>;

    async fn fetch_all(&self, request: FetchRequest) -> Result<Vec<ObjectValue>>;

    async fn fetch_page(&self, request: FetchRequest, page: PageRequest) -> Result<Page>;
}
