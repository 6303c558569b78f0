use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::counter;
use pipeline_core::config::ObservabilityConfig;
use pipeline_domain::ports::GcObserver;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Counter of execution objects removed after their final state was persisted.
pub const WORKFLOW_GC_TOTAL: &str = "pipeline_workflow_gc_total";

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.clone().into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.log_format.as_str() {
        "json" => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_file(true)
                .with_line_number(true);
            registry.with(fmt_layer).try_init()?;
        }
        "pretty" => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_file(true)
                .with_line_number(true);
            registry.with(fmt_layer).try_init()?;
        }
        _ => {
            let fmt_layer = tracing_subscriber::fmt::layer().compact().with_target(false);
            registry.with(fmt_layer).try_init()?;
        }
    }

    info!(
        logging.format = %config.log_format,
        logging.level = %config.log_level,
        "Structured logging initialized"
    );
    Ok(())
}

/// Installs the Prometheus recorder and its scrape listener. Must run inside
/// the tokio runtime. Does nothing when metrics are disabled.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.metrics_enabled {
        debug!("Metrics exporter disabled");
        return Ok(());
    }
    let address: SocketAddr = config
        .metrics_address
        .parse()
        .with_context(|| format!("Invalid metrics address: {}", config.metrics_address))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(%address, "Prometheus exporter listening");
    Ok(())
}

/// Counts garbage-collected execution objects per namespace.
#[derive(Debug, Clone, Default)]
pub struct MetricsGcObserver;

impl GcObserver for MetricsGcObserver {
    fn workflow_collected(&self, namespace: &str) {
        counter!(WORKFLOW_GC_TOTAL, "namespace" => namespace.to_string()).increment(1);
    }
}
