use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use floodwatch::config::Config;
use floodwatch::detect::Detector;
use floodwatch::metrics::{run_reporter, Metrics};
use floodwatch::server;
use floodwatch::tracker::{run_sweeper, RateTracker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging, with optional OpenTelemetry OTLP export.
    // Set OTEL_EXPORTER_OTLP_ENDPOINT to enable.
    let otel_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "floodwatch".into());
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .map_err(|e| format!("failed to build OTLP exporter: {e}"))?;
        let provider = opentelemetry_sdk::trace::TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", service_name),
            ]))
            .build();
        opentelemetry::global::set_tracer_provider(provider.clone());
        let tracer = {
            use opentelemetry::trace::TracerProvider as _;
            provider.tracer("floodwatch")
        };
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .with(otel_layer)
        .init();

    let config = Config::from_env()?;

    info!(
        listen = %config.listen_addr,
        limit = config.request_limit,
        window = ?config.time_window,
        client_key = ?config.client_key,
        "starting floodwatch"
    );

    let tracker = Arc::new(RateTracker::new(config.request_limit, config.time_window));
    let metrics = Arc::new(Metrics::new());

    // Spawn metrics reporter (disabled when METRICS_INTERVAL=0)
    if config.metrics_interval_secs > 0 {
        tokio::spawn(run_reporter(
            metrics.clone(),
            tracker.clone(),
            config.metrics_interval_secs,
        ));
    }

    // Spawn expired-record sweeper (disabled when SWEEP_INTERVAL=0)
    if config.sweep_interval_secs > 0 {
        tokio::spawn(run_sweeper(tracker.clone(), config.sweep_interval_secs));
    } else {
        info!("record sweeping disabled, client records are never removed");
    }

    let detector = Detector::new(tracker, metrics, config.client_key);
    let app = server::router(detector);

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "listening for HTTP requests");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    opentelemetry::global::shutdown_tracer_provider();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
