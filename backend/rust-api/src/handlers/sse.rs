use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    error::ApiError,
    metrics::SSE_CONNECTIONS_ACTIVE,
    models::{Session, SessionEvent},
    services::{session_by_id, AppState},
    utils::retry::RetryConfig,
};

/// SSE endpoint for timer, join, answer and leaderboard events
/// GET /api/v1/sessions/{session_id}/events
pub async fn session_events(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_by_id(
        state.sessions.as_ref(),
        &session_id,
        RetryConfig::single_retry(state.config.store.read_retry_backoff()),
    )
    .await?;

    tracing::info!(
        "Client connected to SSE stream: session={} code={}",
        session.id,
        session.access_code
    );

    let stream = event_stream(session, state.broadcaster.subscribe());
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Keeps the active-connection gauge in step with the stream's lifetime.
struct ConnectionGuard {
    session_id: String,
}

impl ConnectionGuard {
    fn new(session_id: String) -> Self {
        SSE_CONNECTIONS_ACTIVE.inc();
        Self { session_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        SSE_CONNECTIONS_ACTIVE.dec();
        tracing::info!("SSE stream closed: session={}", self.session_id);
    }
}

fn event_stream(
    session: Session,
    receiver: broadcast::Receiver<SessionEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let guard = ConnectionGuard::new(session.id.clone());

    stream::unfold(
        (session, receiver, guard),
        |(session, mut receiver, guard)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.concerns(&session) => {
                        let sse = Event::default()
                            .event(event.event_name())
                            .data(event.to_sse_data());
                        return Some((Ok(sse), (session, receiver, guard)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "SSE subscriber for session {} lagged, {} events skipped",
                            session.id,
                            skipped
                        );
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        },
    )
}
