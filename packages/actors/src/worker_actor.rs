//! Worker actor: one competing consumer on the job queue.

use std::sync::Arc;

use broker::{BrokerError, JobQueue, Subscription};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::WorkerHandler;
use crate::messages::{WorkerMessage, WorkerStats};
use crate::worker::{JobOutcome, MetadataWorker};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    worker: Arc<MetadataWorker>,
    jobs: JobQueue,
    /// Running consumer on the job queue.
    subscription: Option<Subscription>,
    /// Counters reported by the subscription.
    pub stats: WorkerStats,
}

impl WorkerActorState {
    fn record(&mut self, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Published(event) => {
                self.stats.jobs_processed += 1;
                if !event.success {
                    self.stats.jobs_failed_lookup += 1;
                }
            }
            JobOutcome::Discarded => self.stats.jobs_discarded += 1,
        }
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub worker: Arc<MetadataWorker>,
    pub jobs: JobQueue,
}

async fn subscribe(
    myself: &ActorRef<WorkerMessage>,
    worker: &Arc<MetadataWorker>,
    jobs: &JobQueue,
) -> Result<Subscription, BrokerError> {
    let handler = WorkerHandler::new(worker.clone()).with_reporter(myself.clone());
    jobs.consume(Arc::new(handler)).await
}

/// Worker actor that consumes enrichment jobs.
///
/// Messages are processed by the subscription task one at a time; the
/// actor owns that task and its counters. A lost subscription is replaced
/// once; if that fails the actor fails and is left to its supervisor.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        let subscription = subscribe(&myself, &args.worker, &args.jobs).await?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            worker: args.worker,
            jobs: args.jobs,
            subscription: Some(subscription),
            stats: WorkerStats::default(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Processed(outcome) => state.record(&outcome),

            WorkerMessage::SubscriptionLost(reason) => {
                tracing::warn!("Worker {} lost its job subscription: {}", state.worker_id, reason);
                if let Some(lost) = state.subscription.take() {
                    lost.cancel().await;
                }
                let subscription = subscribe(&myself, &state.worker, &state.jobs)
                    .await
                    .map_err(|e| {
                        ActorProcessingErr::from(format!(
                            "Worker {} could not resubscribe: {}",
                            state.worker_id, e
                        ))
                    })?;
                state.subscription = Some(subscription);
                tracing::info!("Worker {} resubscribed to jobs", state.worker_id);
            }

            WorkerMessage::GetStats { reply } => {
                let _ = reply.send(state.stats);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(subscription) = state.subscription.take() {
            subscription.cancel().await;
        }
        tracing::info!(
            "Worker {} stopped after {} jobs",
            state.worker_id,
            state.stats.jobs_processed
        );
        Ok(())
    }
}
