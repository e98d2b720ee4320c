//! HTTP download side
//!
//! - `GET /` usage page
//! - `GET /download/:id` landing page of a waiting transfer
//! - `GET /download/direct/:id` pairs with the waiting upload and streams
//!   its archive
//!
//! The direct route is the consumer half of the handoff: it claims the
//! transfer from the registry, sends a fresh sink to the producer and then
//! answers with whichever arrives first, the archive head or a failure.

mod views;

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use trisend_common::{DIRECT_DOWNLOAD_ROUTE, DOWNLOAD_ROUTE, TransferId, direct_url};

use crate::transfers::{
    ConsumerSide, Handoff, RegistrationGuard, TransferContext, TransferFailure, TransferOutcome,
};

/// Shared state of the HTTP handlers
#[derive(Clone)]
struct AppState {
    ctx: TransferContext,
    /// What a sender types after `ssh`, shown on the home page
    ssh_target: Arc<str>,
}

/// Build the download router
///
/// `ssh_target` is the host (and port flag, if any) senders connect to,
/// e.g. `-p 2222 send.example.com`.
pub fn router(ctx: TransferContext, ssh_target: &str) -> Router {
    let state = AppState {
        ctx,
        ssh_target: Arc::from(ssh_target),
    };
    Router::new()
        .route("/", get(index))
        .route(&format!("{}/:id", DOWNLOAD_ROUTE), get(landing))
        .route(&format!("{}/:id", DIRECT_DOWNLOAD_ROUTE), get(direct_download))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Html<String> {
    Html(views::index_page(&state.ssh_target))
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Html(views::not_found_page())).into_response()
}

fn failure_response(failure: &TransferFailure) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(views::failure_page(failure)),
    )
        .into_response()
}

async fn landing(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(id) = TransferId::parse(&id) else {
        return not_found();
    };
    let Some(metadata) = state.ctx.registry.peek_metadata(&id) else {
        return not_found();
    };

    let url = direct_url(&state.ctx.settings.public_url, &id);
    Html(views::landing_page(&metadata, &url)).into_response()
}

async fn direct_download(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(id) = TransferId::parse(&id) else {
        return not_found();
    };
    let Some((handoff_tx, metadata)) = state.ctx.registry.resolve(&id) else {
        return not_found();
    };
    // Deletes the entry when the handoff concludes, whichever way it goes
    let registration = RegistrationGuard::new(state.ctx.registry.clone(), id.clone());

    let (handoff, consumer) = Handoff::pair();
    if handoff_tx.send(handoff).is_err() {
        debug!(transfer_id = %id, "producer left before pairing");
        return not_found();
    }
    info!(transfer_id = %id, file = %metadata.display_filename, "downloader attached");

    let ConsumerSide {
        head_rx,
        body_rx,
        mut outcome_rx,
    } = consumer;

    tokio::select! {
        biased;
        head = head_rx => match head {
            Ok(headers) => {
                let body = GuardedBody {
                    inner: ReceiverStream::new(body_rx),
                    _registration: registration,
                };
                let mut response = Response::new(Body::from_stream(body));
                *response.headers_mut() = headers;
                response
            }
            // Sink dropped without a head: the outcome says why
            Err(_) => failed_outcome(&id, (&mut outcome_rx).await),
        },
        outcome = &mut outcome_rx => failed_outcome(&id, outcome),
    }
}

fn failed_outcome(
    id: &TransferId,
    outcome: Result<TransferOutcome, oneshot::error::RecvError>,
) -> Response {
    let reason = match outcome {
        Ok(TransferOutcome::Failed(reason)) => reason,
        Ok(TransferOutcome::Completed) | Err(_) => TransferFailure::aborted(),
    };
    debug!(transfer_id = %id, kind = %reason.kind, "transfer failed before streaming");
    failure_response(&reason)
}

/// Response body that keeps the registry entry until streaming ends
struct GuardedBody {
    inner: ReceiverStream<io::Result<Bytes>>,
    _registration: RegistrationGuard,
}

impl Stream for GuardedBody {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
