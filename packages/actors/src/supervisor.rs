//! Supervisor actor for the worker pool and the event consumer.

use std::sync::Arc;
use std::time::Duration;

use broker::{EventBus, JobQueue};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::task::JoinHandle;

use crate::consumer::ResultConsumer;
use crate::consumer_actor::{ConsumerActor, ConsumerArgs};
use crate::messages::{ConsumerMessage, PipelineStats, SupervisorMessage, WorkerMessage};
use crate::worker::MetadataWorker;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Default number of competing workers.
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// How long the supervisor waits for a child to report its stats.
const STATS_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause before retrying a child that could not be respawned.
pub const RESTART_DELAY: Duration = Duration::from_millis(500);

/// Everything the pipeline needs to run.
pub struct PipelineArgs {
    pub worker_count: usize,
    pub worker: Arc<MetadataWorker>,
    pub jobs: JobQueue,
    pub consumer: Arc<ResultConsumer>,
    pub bus: EventBus,
}

impl PipelineArgs {
    pub fn new(
        worker: Arc<MetadataWorker>,
        jobs: JobQueue,
        consumer: Arc<ResultConsumer>,
        bus: EventBus,
    ) -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            worker,
            jobs,
            consumer,
            bus,
        }
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }
}

/// A running worker and the task driving it.
struct WorkerSlot {
    worker_id: String,
    actor: ActorRef<WorkerMessage>,
    handle: JoinHandle<()>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    worker: Arc<MetadataWorker>,
    jobs: JobQueue,
    consumer_logic: Arc<ResultConsumer>,
    bus: EventBus,
    workers: Vec<WorkerSlot>,
    consumer: Option<(ActorRef<ConsumerMessage>, JoinHandle<()>)>,
    restarts: u64,
    stopping: bool,
}

impl SupervisorState {
    async fn spawn_worker(
        &mut self,
        myself: &ActorRef<SupervisorMessage>,
        worker_id: String,
    ) -> Result<(), ractor::SpawnErr> {
        let args = WorkerArgs {
            worker_id: worker_id.clone(),
            worker: self.worker.clone(),
            jobs: self.jobs.clone(),
        };
        let (actor, handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell()).await?;
        self.workers.push(WorkerSlot {
            worker_id,
            actor,
            handle,
        });
        Ok(())
    }

    async fn spawn_consumer(&mut self, myself: &ActorRef<SupervisorMessage>) -> Result<(), ractor::SpawnErr> {
        let args = ConsumerArgs {
            consumer: self.consumer_logic.clone(),
            bus: self.bus.clone(),
        };
        let consumer = Actor::spawn_linked(None, ConsumerActor, args, myself.get_cell()).await?;
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn restart_worker(&mut self, myself: &ActorRef<SupervisorMessage>, worker_id: String) {
        match self.spawn_worker(myself, worker_id.clone()).await {
            Ok(()) => {
                self.restarts += 1;
                tracing::info!("Restarted {}", worker_id);
            }
            Err(e) => {
                tracing::error!("Failed to restart {}, retrying in {:?}: {}", worker_id, RESTART_DELAY, e);
                retry_later(myself, SupervisorMessage::RestartWorker { worker_id });
            }
        }
    }

    async fn restart_consumer(&mut self, myself: &ActorRef<SupervisorMessage>) {
        match self.spawn_consumer(myself).await {
            Ok(()) => {
                self.restarts += 1;
                tracing::info!("Restarted result consumer");
            }
            Err(e) => {
                tracing::error!("Failed to restart result consumer, retrying in {:?}: {}", RESTART_DELAY, e);
                retry_later(myself, SupervisorMessage::RestartConsumer);
            }
        }
    }

    /// Stop every child and wait for each to finish its in-flight message.
    async fn stop_children(&mut self) {
        self.stopping = true;
        for slot in &self.workers {
            slot.actor.stop(None);
        }
        if let Some((consumer, _)) = &self.consumer {
            consumer.stop(None);
        }

        for slot in self.workers.drain(..) {
            let _ = slot.handle.await;
        }
        if let Some((_, handle)) = self.consumer.take() {
            let _ = handle.await;
        }
    }
}

fn retry_later(myself: &ActorRef<SupervisorMessage>, message: SupervisorMessage) {
    let myself = myself.clone();
    tokio::spawn(async move {
        tokio::time::sleep(RESTART_DELAY).await;
        // Gone if the supervisor stopped meanwhile.
        let _ = myself.send_message(message);
    });
}

/// Supervisor actor that owns the workers and the consumer.
///
/// A child that fails is respawned; while the broker stays unreachable the
/// respawn is retried every [`RESTART_DELAY`]. Counters of a failed child
/// are lost with it.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = PipelineArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting pipeline supervisor with {} workers", args.worker_count);

        let mut state = SupervisorState {
            worker: args.worker,
            jobs: args.jobs,
            consumer_logic: args.consumer,
            bus: args.bus,
            workers: Vec::with_capacity(args.worker_count),
            consumer: None,
            restarts: 0,
            stopping: false,
        };

        for n in 1..=args.worker_count {
            if let Err(e) = state.spawn_worker(&myself, format!("worker-{}", n)).await {
                state.stop_children().await;
                return Err(ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)));
            }
        }

        if let Err(e) = state.spawn_consumer(&myself).await {
            state.stop_children().await;
            return Err(ActorProcessingErr::from(format!("Failed to spawn consumer: {}", e)));
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetStats { reply } => {
                let mut stats = PipelineStats {
                    restarts: state.restarts,
                    ..PipelineStats::default()
                };

                for slot in &state.workers {
                    let result = ractor::rpc::call(
                        &slot.actor,
                        |reply| WorkerMessage::GetStats { reply },
                        Some(STATS_TIMEOUT),
                    )
                    .await;
                    if let Ok(CallResult::Success(worker_stats)) = result {
                        stats.add_worker(worker_stats);
                    }
                }

                if let Some((consumer, _)) = &state.consumer {
                    let result = ractor::rpc::call(
                        consumer,
                        |reply| ConsumerMessage::GetStats { reply },
                        Some(STATS_TIMEOUT),
                    )
                    .await;
                    if let Ok(CallResult::Success(consumer_stats)) = result {
                        stats.add_consumer(consumer_stats);
                    }
                }

                let _ = reply.send(stats);
            }

            SupervisorMessage::RestartWorker { worker_id } => {
                if !state.stopping {
                    state.restart_worker(&myself, worker_id).await;
                }
            }

            SupervisorMessage::RestartConsumer => {
                if !state.stopping && state.consumer.is_none() {
                    state.restart_consumer(&myself).await;
                }
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down pipeline supervisor");
                state.stop_children().await;
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!("Child actor {} terminated: {:?}", cell.get_id(), reason);
            }
            SupervisionEvent::ActorFailed(cell, error) => {
                // Its unacked message is already back on the queue.
                tracing::error!("Child actor {} failed: {}", cell.get_id(), error);
                if state.stopping {
                    return Ok(());
                }

                let id = cell.get_id();
                if let Some(index) = state.workers.iter().position(|slot| slot.actor.get_id() == id) {
                    let failed = state.workers.swap_remove(index);
                    state.restart_worker(&myself, failed.worker_id).await;
                } else if state
                    .consumer
                    .as_ref()
                    .is_some_and(|(consumer, _)| consumer.get_id() == id)
                {
                    state.consumer = None;
                    state.restart_consumer(&myself).await;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stop_children().await;
        tracing::info!("Pipeline supervisor stopped");
        Ok(())
    }
}

/// Start the worker pool and the event consumer.
///
/// Fails if any child cannot subscribe to its queue.
pub async fn start_pipeline(
    args: PipelineArgs,
) -> Result<(ActorRef<SupervisorMessage>, JoinHandle<()>), ractor::SpawnErr> {
    // Unnamed: ractor names are process-global.
    let (actor, handle) = Actor::spawn(None, Supervisor, args).await?;

    Ok((actor, handle))
}
