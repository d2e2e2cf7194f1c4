use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;

use traffic_guard::api::{router, AppState};
use traffic_guard::config::{Settings, StoreBackend};
use traffic_guard::core::DnsResolver;
use traffic_guard::jobs::JobRunner;
use traffic_guard::store::{MemoryStore, RedisStore};
use traffic_guard::utils::init_logging;
use traffic_guard::TrafficService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("Starting traffic guard...");

    let settings = Settings::load().context("loading configuration")?;
    tracing::info!("Configuration loaded successfully");

    if settings.metrics.enabled {
        let listen: SocketAddr = settings
            .metrics
            .listen
            .parse()
            .context("parsing metrics.listen")?;
        PrometheusBuilder::new()
            .with_http_listener(listen)
            .install()
            .context("installing Prometheus exporter")?;
        tracing::info!(listen = %listen, "Metrics exporter listening");
    }

    let resolver = Arc::new(DnsResolver::from_system_conf().context("reading resolver configuration")?);
    let service = match settings.store.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&settings.redis.url)
                .await
                .context("connecting to Redis")?;
            TrafficService::from_store(Arc::new(store), resolver)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            TrafficService::from_store(Arc::new(MemoryStore::new()), resolver)
        }
    };
    let service = Arc::new(service);

    let mut jobs = JobRunner::new(service.clone(), settings.jobs.clone());
    let started = jobs.start();
    tracing::info!(jobs = %started, "Job runner started");

    let state = Arc::new(AppState {
        service,
        admin_token: settings.admin.token.clone(),
        admin_actor_id: settings.admin.actor_id,
    });
    if state.admin_token.is_empty() {
        tracing::warn!("admin.token is empty; admin and ingest routes will reject every request");
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("parsing server address")?;
    tracing::info!(host = %settings.server.host, port = %settings.server.port, "Server listening");

    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
        .context("serving HTTP")?;

    jobs.shutdown();
    tracing::info!("Traffic guard stopped");
    Ok(())
}
