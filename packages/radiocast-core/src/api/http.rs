//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the scheduler for business logic.

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::response::{api_message, api_ok, api_success};
use crate::api::stream::{stream_audio, stream_events};
use crate::api::AppState;
use crate::error::{RadioError, RadioResult};
use crate::protocol_constants::SERVICE_ID;
use crate::track::TrackDescriptor;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    url: Option<String>,
}

impl UrlQuery {
    fn require(&self) -> RadioResult<&str> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(RadioError::InvalidRequest("missing `url` argument".into())),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQuery {
    page: Option<usize>,
    /// Older clients send `index` instead of `page`.
    index: Option<usize>,
    use_autoqueue: Option<String>,
}

impl QueueQuery {
    fn page(&self) -> usize {
        self.page.or(self.index).unwrap_or(0)
    }

    fn wants_auto_queue(&self) -> bool {
        self.use_autoqueue.as_deref() == Some("1")
    }
}

#[derive(Debug, Serialize)]
struct QueueResponse {
    queue: Vec<TrackDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_queue: Option<Vec<TrackDescriptor>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/add", get(add_track))
        .route("/playlist", get(add_playlist))
        .route("/queue", get(get_queue))
        .route("/np", get(now_playing))
        .route("/nowplaying", get(now_playing))
        .route("/skip", get(skip))
        .route("/stream", get(stream_audio))
        .route("/events", get(stream_events))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe with stream diagnostics.
async fn health_check(State(state): State<AppState>) -> Response {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "stream": state.buffer.stats(),
        "muxerRunning": state.supervisor.muxer_running(),
        "feed": state.supervisor.state(),
        "queued": state.scheduler.queue_len(),
    }))
}

async fn add_track(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> RadioResult<Response> {
    let queued = state.scheduler.add_track(query.require()?).await?;
    Ok(api_message(
        format!("Queued '{}'", queued.track.title),
        Some(queued),
    ))
}

async fn add_playlist(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> RadioResult<Response> {
    let count = state.scheduler.add_playlist(query.require()?).await?;
    Ok(api_message(format!("Queued {} tracks", count), Some(count)))
}

async fn get_queue(State(state): State<AppState>, Query(query): Query<QueueQuery>) -> Response {
    let auto_queue = query
        .wants_auto_queue()
        .then(|| state.scheduler.auto_queue())
        .filter(|tracks| !tracks.is_empty());
    api_success(QueueResponse {
        queue: state.scheduler.queue_page(query.page()),
        auto_queue,
    })
}

async fn now_playing(State(state): State<AppState>) -> Response {
    api_success(state.scheduler.snapshot())
}

/// Returns immediately; the skip itself runs on a worker.
async fn skip(State(state): State<AppState>) -> Response {
    state.scheduler.skip();
    api_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::events::EventChannel;
    use crate::resolver::{MediaResolver, ResolveError};
    use crate::runtime::TokioSpawner;
    use crate::scheduler::PlaybackScheduler;
    use crate::state::{Config, PlaybackConfig, TranscoderConfig};
    use crate::stream::BroadcastBuffer;
    use crate::transcode::{FfmpegTranscoder, TranscodeSupervisor};

    /// Resolver that knows a single track.
    struct OneTrackResolver;

    #[async_trait]
    impl MediaResolver for OneTrackResolver {
        async fn resolve(
            &self,
            reference: &str,
            _want_direct_url: bool,
        ) -> Result<TrackDescriptor, ResolveError> {
            if reference != "ytsearch1:known" {
                return Err(ResolveError::Extractor("Video unavailable".into()));
            }
            Ok(TrackDescriptor {
                resolved: true,
                title: "Known Song".into(),
                duration: 200.0,
                media_url: Some("https://media.example.com/known.webm".into()),
                ..TrackDescriptor::unresolved(reference)
            })
        }

        async fn list_playlist(
            &self,
            _reference: &str,
        ) -> Result<Vec<TrackDescriptor>, ResolveError> {
            Ok(vec![
                TrackDescriptor::unresolved("a"),
                TrackDescriptor::unresolved("b"),
            ])
        }

        async fn related_tracks(
            &self,
            _track: &TrackDescriptor,
            _limit: usize,
        ) -> Vec<TrackDescriptor> {
            Vec::new()
        }
    }

    fn app_state(seeds: &[&str]) -> AppState {
        let config = Config {
            playback: PlaybackConfig {
                seed_tracks: seeds.iter().map(|s| s.to_string()).collect(),
                ..PlaybackConfig::default()
            },
            ..Config::default()
        };
        let buffer = Arc::new(BroadcastBuffer::new());
        let supervisor = Arc::new(TranscodeSupervisor::new(
            Arc::new(FfmpegTranscoder::new(TranscoderConfig::default())),
            Arc::clone(&buffer),
            &config.transcoder,
        ));
        let events = Arc::new(EventChannel::new(8));
        let scheduler = Arc::new(PlaybackScheduler::new(
            Arc::new(OneTrackResolver),
            supervisor.clone(),
            events.clone(),
            TokioSpawner::current(),
            config.playback.clone(),
        ));
        AppState {
            scheduler,
            buffer,
            supervisor,
            events,
            config: Arc::new(config),
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn url(url: Option<&str>) -> Query<UrlQuery> {
        Query(UrlQuery {
            url: url.map(str::to_string),
        })
    }

    async fn into_response(result: RadioResult<Response>) -> (StatusCode, Value) {
        let response = match result {
            Ok(response) => response,
            Err(e) => axum::response::IntoResponse::into_response(e),
        };
        let status = response.status();
        (status, body_json(response).await)
    }

    #[tokio::test]
    async fn add_without_url_is_a_structured_error() {
        let state = app_state(&[]);
        let (status, body) = into_response(add_track(State(state), url(None)).await).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], true);
        assert_eq!(body["msg"], "missing `url` argument");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn add_reports_resolution_failure() {
        let state = app_state(&[]);
        let (status, body) =
            into_response(add_track(State(state), url(Some("ytsearch1:nope"))).await).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "resolve_failed");
        assert!(body["msg"].as_str().unwrap().contains("Video unavailable"));
    }

    #[tokio::test]
    async fn add_queues_resolved_track() {
        let state = app_state(&[]);
        let (status, body) = into_response(
            add_track(State(state.clone()), url(Some("ytsearch1:known"))).await,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], false);
        assert_eq!(body["data"]["title"], "Known Song");
        assert_eq!(body["data"]["position"], 0);

        let body = body_json(now_playing(State(state)).await).await;
        assert!(body["data"]["now_playing"].is_null());
        assert_eq!(body["data"]["next_up"]["title"], "Known Song");
    }

    #[tokio::test]
    async fn playlist_returns_count() {
        let state = app_state(&[]);
        let (_, body) =
            into_response(add_playlist(State(state.clone()), url(Some("list"))).await).await;
        assert_eq!(body["data"], 2);
        assert_eq!(state.scheduler.queue_len(), 2);
    }

    #[tokio::test]
    async fn queue_is_paged() {
        let state = app_state(&["t0", "t1", "t2", "t3", "t4", "t5"]);
        let query = QueueQuery {
            page: Some(1),
            ..QueueQuery::default()
        };
        let body = body_json(get_queue(State(state.clone()), Query(query)).await).await;
        let queue = body["data"]["queue"].as_array().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0]["reference"], "t5");
        assert!(body["data"].get("auto_queue").is_none());

        let query = QueueQuery {
            index: Some(0),
            use_autoqueue: Some("1".into()),
            ..QueueQuery::default()
        };
        let body = body_json(get_queue(State(state), Query(query)).await).await;
        assert_eq!(body["data"]["queue"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn stream_without_epoch_is_not_found() {
        let state = app_state(&[]);
        let addr: std::net::SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let result = stream_audio(
            State(state),
            axum::extract::connect_info::ConnectInfo(addr),
        )
        .await;
        let (status, body) = into_response(result).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["msg"], "No stream available.");
    }

    #[tokio::test]
    async fn health_reports_idle_feed() {
        let state = app_state(&[]);
        let body = body_json(health_check(State(state)).await).await;
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["feed"]["state"], "idle");
        assert_eq!(body["data"]["stream"]["live"], false);
    }
}
