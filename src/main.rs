//! KlipNote process entry point (spec §10, §5 "Scheduling model"): one
//! process hosting the HTTP surface and both worker pools on one Tokio
//! runtime. Grounded on the teacher's convention of a thin binary wiring
//! independently-versioned crates together (`dog-core`/`dog-axum`/`dog-queue`
//! composed by a caller, never by a framework god-object).

use std::sync::Arc;
use std::time::Duration;

use klipnote_core::{Config, Model};
use klipnote_media::LocalMediaStore;
use klipnote_queue::Broker;
use klipnote_store::MemoryJobStore;
use klipnote_worker::{run_exhaustion_listener, Belle2Service, WorkerPool, WorkerPoolConfig, WhisperXService};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().snapshot();

    let store = MemoryJobStore::new();
    let broker = Broker::new(config.worker_visibility_timeout(), config.max_deliveries());
    let media = LocalMediaStore::new(config.upload_dir());

    let recovered = store.recover_stale_processing_jobs();
    if recovered > 0 {
        info!(recovered, "restart recovery marked stale processing jobs as worker_lost");
    }

    tokio::spawn(broker.clone().run_reaper(Duration::from_secs(30)));
    tokio::spawn(run_exhaustion_listener(store.clone(), broker.events()));

    let belle2_pool = WorkerPool::new(
        WorkerPoolConfig {
            model: Model::Belle2,
            concurrency: config.belle2_concurrency(),
            dequeue_poll: Duration::from_secs(2),
            inference_timeout_multiplier: config.inference_multiplier(),
            inference_timeout_floor: Duration::from_secs(30),
        },
        store.clone(),
        broker.clone(),
        media.clone(),
        Arc::new(Belle2Service),
        Arc::new(tokio::sync::Semaphore::new(config.belle2_concurrency())),
    );
    belle2_pool.spawn();

    let whisperx_pool = WorkerPool::new(
        WorkerPoolConfig {
            model: Model::WhisperX,
            concurrency: config.whisperx_concurrency(),
            dequeue_poll: Duration::from_secs(2),
            inference_timeout_multiplier: config.inference_multiplier(),
            inference_timeout_floor: Duration::from_secs(30),
        },
        store.clone(),
        broker.clone(),
        media.clone(),
        Arc::new(WhisperXService),
        Arc::new(tokio::sync::Semaphore::new(config.whisperx_concurrency())),
    );
    whisperx_pool.spawn();

    let state = klipnote_http::AppState {
        store,
        broker,
        media,
        config: config.clone(),
    };
    let router = klipnote_http::build_router(state);

    let bind_addr = config.bind_addr();
    info!(%bind_addr, "starting klipnote-server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
