//! Observability: structured logging and query metrics

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::{LoggingConfig, MetricsConfig, ObservabilityConfig};

static OBSERVABILITY: OnceCell<ObservabilitySystem> = OnceCell::new();

/// Process-wide logging and metrics setup
#[derive(Debug)]
pub struct ObservabilitySystem {
    metrics_enabled: bool,
}

impl ObservabilitySystem {
    /// Installs the subscriber and, when enabled, the Prometheus exporter. Once per process.
    pub fn init(config: &ObservabilityConfig) -> anyhow::Result<()> {
        let system = Self {
            metrics_enabled: config.metrics.enabled,
        };

        init_logging(&config.logging)?;
        if config.metrics.enabled {
            init_metrics(&config.metrics)?;
        }

        OBSERVABILITY
            .set(system)
            .map_err(|_| anyhow::anyhow!("Observability system already initialized"))?;

        info!("Observability system initialized");
        Ok(())
    }

    pub fn get() -> Option<&'static ObservabilitySystem> {
        OBSERVABILITY.get()
    }

    pub fn metrics_enabled(&self) -> bool {
        self.metrics_enabled
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs a global `tracing` subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_level(&config.level).into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format.to_lowercase().as_str() {
        "json" => {
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::CLOSE);
            registry.with(json_layer).try_init()?;
        }
        _ => {
            let pretty_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE);
            registry.with(pretty_layer).try_init()?;
        }
    }

    Ok(())
}

/// Installs the Prometheus recorder with an HTTP listener on `bind_address`.
pub fn init_metrics(config: &MetricsConfig) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = config.bind_address.parse()?;

    PrometheusBuilder::new()
        .with_http_listener(bind_addr)
        .install()?;

    info!("Prometheus metrics initialized on {}", bind_addr);
    Ok(())
}

/// Fetch metrics recorded by execution layers
pub struct QueryMetrics;

impl QueryMetrics {
    /// Record a fetch and its execution mode (`one`, `all`, `page`)
    pub fn fetch_started(mode: &'static str) {
        counter!("japi_fetch_total", "mode" => mode).increment(1);
    }

    /// Record a failed fetch
    pub fn fetch_failed(mode: &'static str) {
        counter!("japi_fetch_failed_total", "mode" => mode).increment(1);
    }

    /// Record rows returned by the root query
    pub fn rows_fetched(rows: usize) {
        counter!("japi_rows_fetched_total").increment(rows as u64);
    }

    /// Record one executed eager load
    pub fn eager_load(relation: &str) {
        counter!("japi_eager_loads_total", "relation" => relation.to_string()).increment(1);
    }

    pub fn fetch_duration(mode: &'static str, duration: Duration) {
        histogram!("japi_fetch_duration_seconds", "mode" => mode).record(duration.as_secs_f64());
    }
}

/// Records `japi_fetch_duration_seconds` when dropped
pub struct FetchTimer {
    start: Instant,
    mode: &'static str,
}

impl FetchTimer {
    pub fn new(mode: &'static str) -> Self {
        QueryMetrics::fetch_started(mode);
        Self {
            start: Instant::now(),
            mode,
        }
    }

    pub fn mode(&self) -> &'static str {
        self.mode
    }
}

impl Drop for FetchTimer {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            QueryMetrics::fetch_duration(self.mode, self.start.elapsed());
        }
    }
}
