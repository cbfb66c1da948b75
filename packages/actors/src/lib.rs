//! Worker pool and event consumer for the enrichment pipeline.
//!
//! # Architecture
//!
//! - `Supervisor` - Top-level actor owning every child below
//! - `WorkerActor` - One competing consumer of the job queue; looks up
//!   metadata and publishes a result event for every job
//! - `ConsumerActor` - The results queue subscriber; applies successful
//!   results to books and broadcasts them to live clients
//!
//! The per-message logic lives in [`MetadataWorker`] and [`ResultConsumer`]
//! and can be driven without actors.
//!
//! # Usage
//!
//! ```ignore
//! use actors::{PipelineArgs, SupervisorMessage, start_pipeline};
//!
//! let (supervisor, handle) = start_pipeline(PipelineArgs::new(worker, jobs, consumer, bus)).await?;
//!
//! supervisor.send_message(SupervisorMessage::Shutdown)?;
//! handle.await?;
//! ```

mod consumer;
mod consumer_actor;
mod handler;
mod messages;
mod supervisor;
mod worker;
mod worker_actor;

pub use consumer::{ConsumeOutcome, ConsumerError, ResultConsumer};
pub use consumer_actor::{ConsumerActor, ConsumerArgs};
pub use handler::{ConsumerHandler, WorkerHandler};
pub use messages::{ConsumerMessage, ConsumerStats, PipelineStats, SupervisorMessage, WorkerMessage, WorkerStats};
pub use supervisor::{DEFAULT_WORKER_COUNT, PipelineArgs, RESTART_DELAY, Supervisor, start_pipeline};
pub use worker::{DEFAULT_LOOKUP_TIMEOUT, JobOutcome, MetadataWorker, WorkerError};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
