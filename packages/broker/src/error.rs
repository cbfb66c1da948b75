/// Broker errors.
///
/// All of these are transient from the pipeline's point of view: the
/// affected message is redelivered, nothing is surfaced to end users.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Broker connection is closed")]
    Closed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}
