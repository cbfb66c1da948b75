//! Broker topology.
//!
//! These names are part of the wire protocol shared with other services
//! and are deliberately not configurable.

/// Durable queue holding enrichment jobs.
pub const METADATA_FETCH_QUEUE: &str = "metadata_fetch";

/// Topic exchange result events are published on.
pub const BOOK_EVENTS_EXCHANGE: &str = "book_events";

/// Routing key for enrichment results.
pub const METADATA_FETCHED_ROUTING_KEY: &str = "book.metadata_fetched";

/// Durable queue this service binds to the result routing key.
pub const METADATA_RESULTS_QUEUE: &str = "api_metadata_results";
