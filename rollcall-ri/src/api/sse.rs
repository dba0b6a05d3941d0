//! Server-Sent Events for ingestion progress

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const HEARTBEAT: Duration = Duration::from_secs(15);

/// GET /events
///
/// Streams every ingestion event: cycle started/completed, per-provider batch
/// results, provider degraded/recovered, review queued and person reconciled.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT) => {
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) => {
                            let event_type = event.event_type();
                            match serde_json::to_string(&event) {
                                Ok(json) => {
                                    debug!("SSE: Broadcasting {}", event_type);
                                    yield Ok(Event::default().event(event_type).data(json));
                                }
                                Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("SSE: Client lagged, {} events skipped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
        info!("SSE: Event stream closed");
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT).text("keep-alive"))
}
