//! Message types for actor communication.

use ractor::RpcReplyPort;

use crate::consumer::ConsumeOutcome;
use crate::worker::JobOutcome;

/// Messages for a WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// A job was settled by this worker's subscription.
    Processed(JobOutcome),

    /// The job subscription stopped on its own.
    SubscriptionLost(String),

    /// Get this worker's counters.
    GetStats { reply: RpcReplyPort<WorkerStats> },
}

/// Messages for the ConsumerActor.
#[derive(Debug)]
pub enum ConsumerMessage {
    /// A result event was settled by the consumer's subscription.
    Processed(ConsumeOutcome),

    /// The results subscription stopped on its own.
    SubscriptionLost(String),

    /// Get the consumer's counters.
    GetStats { reply: RpcReplyPort<ConsumerStats> },
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Aggregate counters across every child.
    GetStats { reply: RpcReplyPort<PipelineStats> },

    /// Respawn a worker whose earlier restart failed.
    RestartWorker { worker_id: String },

    /// Respawn the consumer after an earlier restart failed.
    RestartConsumer,

    /// Stop every worker and the consumer, then the supervisor.
    Shutdown,
}

/// Counters of one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs_processed: u64,
    pub jobs_failed_lookup: u64,
    pub jobs_discarded: u64,
}

/// Counters of the event consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub results_applied: u64,
    pub results_skipped: u64,
    pub results_discarded: u64,
}

/// Counters of the whole pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Jobs whose result event was published, successful or not.
    pub jobs_processed: u64,
    /// Of those, jobs whose lookup failed.
    pub jobs_failed_lookup: u64,
    /// Jobs dropped without a lookup because they could not be decoded.
    pub jobs_discarded: u64,
    /// Successful results written to a book.
    pub results_applied: u64,
    /// Results not applied: failed lookups, missing books, undecodable messages.
    pub results_skipped: u64,
    /// Children respawned after failing.
    pub restarts: u64,
}

impl PipelineStats {
    pub(crate) fn add_worker(&mut self, stats: WorkerStats) {
        self.jobs_processed += stats.jobs_processed;
        self.jobs_failed_lookup += stats.jobs_failed_lookup;
        self.jobs_discarded += stats.jobs_discarded;
    }

    pub(crate) fn add_consumer(&mut self, stats: ConsumerStats) {
        self.results_applied += stats.results_applied;
        self.results_skipped += stats.results_skipped + stats.results_discarded;
    }
}
