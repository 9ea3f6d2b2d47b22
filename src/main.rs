//! Credit Risk Scoring Service - Main Entry Point
//!
//! Answers scoring requests received over NATS. Each request is scored on the
//! blocking pool, bounded by `pipeline.workers` concurrent requests.

use anyhow::Result;
use credit_risk_scoring::{
    config::{AppConfig, LoggingConfig},
    consumer::{RequestConsumer, WorkerPool},
    error::{ScoringError, Stage},
    metrics::{MetricsReporter, PipelineMetrics},
    models::ArtifactStore,
    pipeline::PredictionOrchestrator,
    producer::ResponsePublisher,
    types::{ErrorReply, ScoreRequest},
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("credit_risk_scoring={}", logging.level).parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_tracing(&config.logging)?;

    info!("Starting Credit Risk Scoring Service");
    info!(
        threshold = config.scoring.default_threshold,
        low_max = config.scoring.risk_tiers.low_max,
        medium_max = config.scoring.risk_tiers.medium_max,
        "Configuration loaded"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let artifacts = ArtifactStore::global().init(&config.artifacts)?;
    info!(
        version = %artifacts.version,
        features = artifacts.contract.len(),
        "Scoring artifacts ready"
    );

    let orchestrator = Arc::new(
        PredictionOrchestrator::from_artifacts(artifacts, &config.scoring)
            .with_metrics(metrics.clone()),
    );

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.request_subject,
        &config.nats.queue_group,
    );
    let publisher = ResponsePublisher::new(client.clone());

    let workers = WorkerPool::new(config.pipeline.workers);
    info!(
        workers = workers.size(),
        subject = consumer.subject(),
        "Starting request loop"
    );

    let handled_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    loop {
        let message = tokio::select! {
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        };

        let Some(permit) = workers.acquire().await else {
            break;
        };

        let orchestrator = orchestrator.clone();
        let publisher = publisher.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let reply_to = message.reply.clone();

            let request = match serde_json::from_slice::<ScoreRequest>(&message.payload) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize scoring request");
                    let reply = ErrorReply::malformed_request(format!(
                        "request body is not a scoring request: {}",
                        e
                    ));
                    if let Err(e) = publisher.reply(reply_to.as_ref(), &reply).await {
                        error!(error = %e, "Failed to publish error reply");
                    }
                    return;
                }
            };

            let records = request.record_count();
            let scored = tokio::task::spawn_blocking(move || orchestrator.handle(request)).await;

            let published = match scored {
                Ok(Ok(reply)) => {
                    debug!(records, "Request scored");
                    publisher.reply(reply_to.as_ref(), &reply).await
                }
                Ok(Err(e)) => publisher.reply_error(reply_to.as_ref(), &e).await,
                Err(e) => {
                    error!(error = %e, "Scoring task panicked");
                    let err = ScoringError::internal(Stage::Score, format!("scoring task failed: {}", e));
                    publisher.reply_error(reply_to.as_ref(), &err).await
                }
            };
            if let Err(e) = published {
                error!(error = %e, "Failed to publish reply");
            }

            let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                info!(handled = count, "Processing milestone");
            }
        });
    }

    info!("Scoring service shutting down...");
    workers.drain().await;
    if let Err(e) = client.flush().await {
        warn!(error = %e, "Failed to flush pending replies");
    }
    metrics.print_summary();

    Ok(())
}
