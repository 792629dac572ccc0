//! Long-lived response bodies: the audio stream and the status events.
//!
//! Both stay open across track transitions. The audio body ends only when
//! its stream epoch ends or the client goes away.

use std::net::SocketAddr;
use std::sync::Arc;

use async_stream::stream;
use axum::{
    body::Body,
    extract::{connect_info::ConnectInfo, State},
    http::header,
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;

use crate::api::AppState;
use crate::error::{RadioError, RadioResult};
use crate::protocol_constants::{APP_NAME, EVENT_STREAM_MIME, OGG_AUDIO_MIME};
use crate::stream::ListenerGuard;

pub(super) async fn stream_audio(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> RadioResult<Response> {
    let listener = state
        .buffer
        .subscribe()
        .ok_or(RadioError::StreamUnavailable)?;

    let guard = Arc::new(ListenerGuard::new(listener.epoch(), remote_addr.ip()));
    let units = listener.into_stream();
    let body = stream! {
        futures::pin_mut!(units);
        while let Some(chunk) = units.next().await {
            guard.record_chunk(chunk.len());
            yield Ok::<Bytes, std::io::Error>(chunk);
        }
        // Only reached when the muxer went away, not on client disconnect.
        guard.record_error("stream epoch ended");
    };

    Response::builder()
        .header(header::CONTENT_TYPE, OGG_AUDIO_MIME)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("icy-name", APP_NAME)
        .body(Body::from_stream(body))
        .map_err(|e| RadioError::Internal(e.to_string()))
}

pub(super) async fn stream_events(State(state): State<AppState>) -> RadioResult<Response> {
    let subscription = state.events.subscribe();
    log::debug!(
        "[Events] Subscriber attached (initial frame: {})",
        subscription.initial().is_some()
    );
    let frames = subscription
        .into_stream()
        .map(Ok::<Bytes, std::io::Error>);

    Response::builder()
        .header(header::CONTENT_TYPE, EVENT_STREAM_MIME)
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(frames))
        .map_err(|e| RadioError::Internal(e.to_string()))
}
