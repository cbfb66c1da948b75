//! Addressing and delivery types.

/// Where a message is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// A named durable queue, addressed through the default exchange.
    Queue(String),
    /// A durable topic exchange and routing key.
    Topic {
        exchange: String,
        routing_key: String,
    },
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Destination::Queue(name.into())
    }

    pub fn topic(exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Destination::Topic {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Queue(name) => write!(f, "queue:{}", name),
            Destination::Topic {
                exchange,
                routing_key,
            } => write!(f, "{}/{}", exchange, routing_key),
        }
    }
}

/// Binding of a queue to a topic exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicBinding {
    pub exchange: String,
    pub routing_key: String,
}

/// A durable queue a consumer reads from, with an optional binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub binding: Option<TopicBinding>,
}

impl QueueSpec {
    /// A plain durable queue.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
        }
    }

    /// Bind this queue to `exchange` under `routing_key`.
    pub fn bound_to(mut self, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        self.binding = Some(TopicBinding {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        });
        self
    }
}

/// A message handed to a [`crate::MessageHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub body: Vec<u8>,
    /// Set when this message was delivered before and not acked.
    pub redelivered: bool,
    pub delivery_tag: u64,
}
