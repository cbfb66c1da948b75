//! Startup wiring for the enrichment pipeline and the HTTP surface.

use std::sync::Arc;

use actors::{
    ActorRef, MetadataWorker, PipelineArgs, ResultConsumer, SupervisorMessage, start_pipeline,
};
use axum::Router;
use book_metadata::{HttpMetadataProvider, LookupError};
use broker::{Broker, BrokerError, EventBus, InMemoryBroker, JobQueue};
use db::{BookRepository, DbError};
use realtime::{HubConfig, NotificationHub};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::auth::StaticTokenValidator;
use crate::config::AppConfig;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Metadata client error: {0}")]
    Metadata(#[from] LookupError),

    #[error("Failed to start pipeline: {0}")]
    Pipeline(String),
}

/// The broker the runtime was built on, kept for shutdown.
enum BrokerHandle {
    Memory,
    #[cfg(feature = "amqp")]
    Amqp(Arc<broker::AmqpBroker>),
}

async fn connect_broker(config: &AppConfig) -> Result<(Arc<dyn Broker>, BrokerHandle), InitError> {
    if config.uses_memory_broker() {
        tracing::info!("Using in-process broker");
        let memory: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        return Ok((memory, BrokerHandle::Memory));
    }

    connect_amqp(&config.broker_url).await
}

#[cfg(feature = "amqp")]
async fn connect_amqp(url: &str) -> Result<(Arc<dyn Broker>, BrokerHandle), InitError> {
    let amqp = Arc::new(broker::AmqpBroker::connect(url).await?);
    let shared: Arc<dyn Broker> = amqp.clone();
    Ok((shared, BrokerHandle::Amqp(amqp)))
}

#[cfg(not(feature = "amqp"))]
async fn connect_amqp(url: &str) -> Result<(Arc<dyn Broker>, BrokerHandle), InitError> {
    Err(InitError::Broker(BrokerError::Connection(format!(
        "AMQP support is not enabled, cannot connect to {}",
        url
    ))))
}

/// A running pipeline plus the state its routes serve from.
pub struct AppRuntime {
    state: AppState,
    supervisor: ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
    broker: BrokerHandle,
}

impl AppRuntime {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        crate::router(self.state.clone())
    }

    /// Close live streams, stop the workers and the consumer, then
    /// disconnect from the broker.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down");
        self.state.hub.shutdown();

        if let Err(e) = self.supervisor.send_message(SupervisorMessage::Shutdown) {
            tracing::warn!("Pipeline supervisor already stopped: {}", e);
        }
        if let Err(e) = self.handle.await {
            tracing::error!("Pipeline supervisor panicked: {}", e);
        }

        match self.broker {
            BrokerHandle::Memory => {}
            #[cfg(feature = "amqp")]
            BrokerHandle::Amqp(amqp) => {
                if let Err(e) = amqp.close().await {
                    tracing::warn!("Failed to close broker connection: {}", e);
                }
            }
        }
        tracing::info!("Shutdown complete");
    }
}

/// Build every collaborator from `config` and start the pipeline.
///
/// Should be called once at server startup before serving requests.
pub async fn init_app(config: &AppConfig) -> Result<AppRuntime, InitError> {
    tracing::info!("Initializing enrichment pipeline...");

    let db = db::connect(config.db_config()).await?;
    let store = Arc::new(BookRepository::new(db));

    let (broker, handle) = connect_broker(config).await?;
    let jobs = JobQueue::new(broker.clone());
    let bus = EventBus::new(broker);

    let hub = NotificationHub::new(HubConfig::default());
    let provider = HttpMetadataProvider::with_timeout(
        config.metadata_service_url.clone(),
        config.lookup_timeout,
    )?;
    tracing::info!("Metadata service: {}", provider.base_url());

    let worker = MetadataWorker::new(Arc::new(provider), bus.clone())
        .with_lookup_timeout(config.lookup_timeout);
    let consumer = ResultConsumer::new(store.clone(), hub.clone());

    let args = PipelineArgs::new(Arc::new(worker), jobs.clone(), Arc::new(consumer), bus)
        .with_worker_count(config.worker_count);
    let (supervisor, supervisor_handle) = start_pipeline(args)
        .await
        .map_err(|e| InitError::Pipeline(e.to_string()))?;

    let tokens = StaticTokenValidator::new(config.stream_tokens.iter().cloned());
    if tokens.is_empty() {
        tracing::warn!("No stream tokens configured, every /events request will be rejected");
    }

    let state = AppState::new(hub, store, jobs, Arc::new(tokens));

    tracing::info!(
        "Enrichment pipeline initialized with {} workers",
        config.worker_count
    );
    Ok(AppRuntime {
        state,
        supervisor,
        handle: supervisor_handle,
        broker: handle,
    })
}
