//! Core domain types for the book enrichment pipeline.
//!
//! This crate contains shared types used across all packages:
//! - Book records and the producer-side `NewBook`
//! - The enrichment job carried on the job queue
//! - The result event carried on the event bus
//! - Broker topology constants

mod book;
mod events;
mod job;
mod topology;

pub use book::{Book, BookId, NewBook, ValidationError};
pub use events::{METADATA_FETCHED_EVENT, MetadataFetchedEvent};
pub use job::MetadataFetchJob;
pub use topology::{
    BOOK_EVENTS_EXCHANGE, METADATA_FETCH_QUEUE, METADATA_FETCHED_ROUTING_KEY,
    METADATA_RESULTS_QUEUE,
};
