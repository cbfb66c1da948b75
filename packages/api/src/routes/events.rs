//! Live stream of enrichment results.

use std::convert::Infallible;

use axum::{
    Router,
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};
use realtime::KEEPALIVE;
use serde::Deserialize;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub token: Option<String>,
}

/// GET /events?token=...
///
/// Registers a hub subscriber and writes its frames as `text/event-stream`.
/// A keepalive comment is written whenever the keepalive interval passes
/// without a frame. The stream ends when the hub closes the subscriber's
/// outbox; dropping the body deregisters it.
async fn event_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::TokenRequired)?;
    if !state.tokens.validate(&token) {
        return Err(ApiError::InvalidToken);
    }

    let mut subscriber = state.hub.register().map_err(|_| ApiError::ShuttingDown)?;
    let keepalive = state.hub.config().keepalive_interval;

    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = subscriber.recv() => {
                    match frame {
                        Some(frame) => {
                            ticker.reset();
                            yield Ok::<_, Infallible>(frame.encode());
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    yield Ok(KEEPALIVE.to_string());
                }
            }
        }

        tracing::debug!("Stream for subscriber {} ended", subscriber.id());
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
