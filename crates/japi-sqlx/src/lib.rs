//! sqlx execution layer for japi query plans

use anyhow::Context;
use async_trait::async_trait;
use japi_core::sql::Dialect;
use japi_core::{FetchRequest, Fetcher, JapiError, ObjectValue, Page, PageRequest, QueryPlan, Result};
use japi_shared::{DatabaseConfig, FetchTimer, QueryMetrics};
use tracing::{debug, instrument, warn};

pub mod connection;
pub mod eager;
pub mod row;

pub use connection::*;
pub use eager::{load_includes, LINK_COLUMN};
pub use row::{bind_value, build_query, decode_row, decode_value};

/// [`Fetcher`] running compiled requests on an `AnyPool`
#[derive(Debug, Clone)]
pub struct SqlxFetcher {
    connection: ConnectionManager,
}

impl SqlxFetcher {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Connect using the database section of the configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(ConnectionManager::from_config(config).await?))
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    fn dialect(&self) -> &'static dyn Dialect {
        self.connection.dialect().dialect()
    }

    async fn rows(&self, plan: &QueryPlan) -> anyhow::Result<Vec<ObjectValue>> {
        let (sql, binds) = plan.to_sql(self.dialect())?;
        debug!(sql = %sql, binds = binds.len(), "fetching rows");
        let rows = build_query(&sql, &binds)?
            .fetch_all(self.connection.pool())
            .await
            .with_context(|| format!("query failed: {sql}"))?;
        rows.iter().map(decode_row).collect()
    }

    async fn count(&self, plan: &QueryPlan) -> anyhow::Result<u64> {
        let (sql, binds) = plan.to_count_sql(self.dialect())?;
        debug!(sql = %sql, "counting rows");
        let row = build_query(&sql, &binds)?
            .fetch_one(self.connection.pool())
            .await
            .with_context(|| format!("count failed: {sql}"))?;
        let count = decode_row(&row)?
            .get("count")
            .and_then(|v| v.as_i64())
            .context("count query returned no integer")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn with_includes(
        &self,
        request: &FetchRequest,
        mut rows: Vec<ObjectValue>,
    ) -> anyhow::Result<Vec<ObjectValue>> {
        load_includes(self.connection.pool(), self.dialect(), &request.includes, &mut rows).await?;
        QueryMetrics::rows_fetched(rows.len());
        Ok(rows)
    }

    async fn one(&self, mut request: FetchRequest) -> anyhow::Result<Option<ObjectValue>> {
        request.query.limit(1);
        let mut rows = self.rows(&request.query).await?;
        rows.truncate(1);
        Ok(self.with_includes(&request, rows).await?.into_iter().next())
    }

    async fn all(&self, request: FetchRequest) -> anyhow::Result<Vec<ObjectValue>> {
        let rows = self.rows(&request.query).await?;
        self.with_includes(&request, rows).await
    }

    async fn page(&self, mut request: FetchRequest, page: PageRequest) -> anyhow::Result<Page> {
        let row_count = self.count(&request.query).await?;
        request.query.limit(page.limit()).offset(page.offset());
        let rows = self.rows(&request.query).await?;
        Ok(Page {
            rows: self.with_includes(&request, rows).await?,
            pagination: page.pagination(row_count),
        })
    }
}

fn failed(timer: &FetchTimer, err: anyhow::Error) -> JapiError {
    QueryMetrics::fetch_failed(timer.mode());
    warn!(error = %format!("{err:#}"), "fetch failed");
    err.into()
}

#[async_trait]
impl Fetcher for SqlxFetcher {
    #[instrument(skip_all, fields(table = %request.query.table_name()))]
    async fn fetch_one(&self, request: FetchRequest) -> Result<Option<ObjectValue>> {
        let timer = FetchTimer::new("one");
        self.one(request).await.map_err(|e| failed(&timer, e))
    }

    #[instrument(skip_all, fields(table = %request.query.table_name()))]
    async fn fetch_all(&self, request: FetchRequest) -> Result<Vec<ObjectValue>> {
        let timer = FetchTimer::new("all");
        self.all(request).await.map_err(|e| failed(&timer, e))
    }

    #[instrument(skip_all, fields(table = %request.query.table_name(), ?page))]
    async fn fetch_page(&self, request: FetchRequest, page: PageRequest) -> Result<Page> {
        let timer = FetchTimer::new("page");
        self.page(request, page).await.map_err(|e| failed(&timer, e))
    }
}
