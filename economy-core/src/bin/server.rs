//! Economy engine server binary
//!
//! Opens the engine, serves `/health` and Prometheus `/metrics` over HTTP and
//! logs account statistics periodically until interrupted.

use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::Context;
use economy_core::{Config, Engine, WithdrawalStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

fn load_config() -> anyhow::Result<Config> {
    match std::env::var("ECONOMY_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading {}", path)),
        Err(_) => Config::from_env().context("loading config from environment"),
    }
}

async fn health_check(engine: web::Data<Engine>) -> impl Responder {
    let config = engine.config();
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        service: config.service_name.clone(),
        version: config.service_version.clone(),
    })
}

async fn prometheus_metrics(engine: web::Data<Engine>) -> impl Responder {
    match engine.metrics().render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Metrics rendering failed");
            HttpResponse::InternalServerError().body(format!("Failed to encode metrics: {}", e))
        }
    }
}

fn log_stats(engine: &Engine) {
    let accounts = match engine.ledger().approximate_account_count() {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(error = %e, "Account count unavailable");
            return;
        }
    };
    engine
        .metrics()
        .accounts_estimate
        .set(i64::try_from(accounts).unwrap_or(i64::MAX));

    let pending = match engine.ledger().count_withdrawals(WithdrawalStatus::Pending) {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Pending withdrawal count unavailable");
            None
        }
    };
    let season = match engine.active_season() {
        Ok(season) => season.map(|season| season.name),
        Err(e) => {
            tracing::warn!(error = %e, "Active season unavailable");
            None
        }
    };

    tracing::info!(
        accounts_estimate = accounts,
        pending_withdrawals = ?pending,
        active_season = ?season,
        "Economy stats"
    );
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = load_config()?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = %config.data_dir.display(),
        "Starting economy server"
    );

    let stats_interval = Duration::from_secs(config.stats_interval_secs.max(1));
    let bind_address = config.metrics_listen_addr.clone();

    let engine = Arc::new(Engine::open(config).context("opening engine")?);
    tracing::info!("Engine opened successfully");

    let stats_engine = engine.clone();
    let stats_task = actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(stats_interval);
        loop {
            ticker.tick().await;
            let engine = stats_engine.clone();
            // Counting scans storage; keep it off the async workers
            if let Err(e) = tokio::task::spawn_blocking(move || log_stats(&engine)).await {
                tracing::warn!(error = %e, "Stats task failed");
            }
        }
    });

    let data = web::Data::from(engine);
    tracing::info!(addr = %bind_address, "Serving health and metrics");

    // Returns once the server has handled SIGINT/SIGTERM and drained
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .route("/health", web::get().to(health_check))
            .route("/metrics", web::get().to(prometheus_metrics))
    })
    .bind(&bind_address)
    .with_context(|| format!("binding HTTP listener on {}", bind_address))?
    .run()
    .await
    .context("HTTP server failed")?;

    tracing::info!("Shutting down economy server");
    stats_task.abort();
    Ok(())
}
