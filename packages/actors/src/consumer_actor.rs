//! Consumer actor: the single subscriber of the results queue.

use std::sync::Arc;

use broker::{BrokerError, EventBus, Subscription};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::consumer::{ConsumeOutcome, ResultConsumer};
use crate::handler::ConsumerHandler;
use crate::messages::{ConsumerMessage, ConsumerStats};

pub struct ConsumerActorState {
    consumer: Arc<ResultConsumer>,
    bus: EventBus,
    subscription: Option<Subscription>,
    pub stats: ConsumerStats,
}

pub struct ConsumerArgs {
    pub consumer: Arc<ResultConsumer>,
    pub bus: EventBus,
}

async fn subscribe(
    myself: &ActorRef<ConsumerMessage>,
    consumer: &Arc<ResultConsumer>,
    bus: &EventBus,
) -> Result<Subscription, BrokerError> {
    let handler = ConsumerHandler::new(consumer.clone()).with_reporter(myself.clone());
    bus.subscribe_results(Arc::new(handler)).await
}

/// Resubscribes once when its subscription is lost, then fails.
pub struct ConsumerActor;

impl Actor for ConsumerActor {
    type Msg = ConsumerMessage;
    type State = ConsumerActorState;
    type Arguments = ConsumerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting result consumer on {}", args.bus.results_queue().name);

        let subscription = subscribe(&myself, &args.consumer, &args.bus).await?;

        Ok(ConsumerActorState {
            consumer: args.consumer,
            bus: args.bus,
            subscription: Some(subscription),
            stats: ConsumerStats::default(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ConsumerMessage::Processed(outcome) => match outcome {
                ConsumeOutcome::Applied(_) => state.stats.results_applied += 1,
                ConsumeOutcome::Skipped | ConsumeOutcome::BookMissing => {
                    state.stats.results_skipped += 1
                }
                ConsumeOutcome::Discarded => state.stats.results_discarded += 1,
            },

            ConsumerMessage::SubscriptionLost(reason) => {
                tracing::warn!("Result consumer lost its subscription: {}", reason);
                if let Some(lost) = state.subscription.take() {
                    lost.cancel().await;
                }
                let subscription = subscribe(&myself, &state.consumer, &state.bus)
                    .await
                    .map_err(|e| {
                        ActorProcessingErr::from(format!("Result consumer could not resubscribe: {}", e))
                    })?;
                state.subscription = Some(subscription);
                tracing::info!("Result consumer resubscribed");
            }

            ConsumerMessage::GetStats { reply } => {
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
            "Result consumer stopped after applying {} results",
            state.stats.results_applied
        );
        Ok(())
    }
}
