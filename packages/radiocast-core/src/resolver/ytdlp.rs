use std::process::Stdio;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use super::{MediaResolver, ResolveError};
use crate::protocol_constants::{OPUS_CODEC_NAME, OPUS_SAMPLE_RATE};
use crate::state::ResolverConfig;
use crate::track::{TrackDescriptor, MISSING_FIELD};
use crate::utils::format_duration;

/// Format selector: prefer WebM audio (usually Opus already), then any audio.
const AUDIO_FORMAT: &str = "bestaudio[ext=webm]/bestaudio/best";

const YOUTUBE_EXTRACTOR: &str = "youtube";
const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// [`MediaResolver`] that shells out to `yt-dlp` and asks an
/// Invidious-compatible API for related videos.
pub struct YtDlpResolver {
    config: ResolverConfig,
    max_duration_secs: f64,
    http_client: Client,
}

impl YtDlpResolver {
    pub fn new(config: ResolverConfig, max_duration_secs: f64, http_client: Client) -> Self {
        Self {
            config,
            max_duration_secs,
            http_client,
        }
    }

    /// Runs `yt-dlp --dump-single-json` on `reference`.
    ///
    /// `flat` skips format extraction (cheap, no media URL) and keeps
    /// playlist entries unprocessed.
    async fn dump_json(&self, reference: &str, flat: bool) -> Result<Value, ResolveError> {
        let mut cmd = Command::new(&self.config.ytdlp_path);
        cmd.args([
            "--dump-single-json",
            "--no-warnings",
            "--no-check-certificate",
            "--format",
            AUDIO_FORMAT,
        ]);
        if flat {
            cmd.args([
                "--flat-playlist",
                "--playlist-end",
                self.config.playlist_limit.to_string().as_str(),
            ]);
        }
        cmd.arg("--")
            .arg(reference)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(ResolveError::Spawn)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no output")
                .trim()
                .to_string();
            return Err(ResolveError::Extractor(reason));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }

    fn check_duration(&self, track: &TrackDescriptor) -> Result<(), ResolveError> {
        if track.exceeds_duration(self.max_duration_secs) {
            return Err(ResolveError::TooLong {
                duration: track.duration,
                max: self.max_duration_secs,
            });
        }
        Ok(())
    }

    /// Video id to ask the related-videos API about.
    ///
    /// Tracks from other sites are first looked up on YouTube by title.
    async fn youtube_id(&self, track: &TrackDescriptor) -> Option<String> {
        if track.extractor == YOUTUBE_EXTRACTOR && track.id != MISSING_FIELD {
            return Some(track.id.clone());
        }
        match self
            .resolve(&format!("ytsearch1:{}", track.title), false)
            .await
        {
            Ok(found) if found.id != MISSING_FIELD => Some(found.id),
            Ok(_) => None,
            Err(e) => {
                log::debug!(
                    "[Resolver] Could not relocate '{}' on YouTube: {}",
                    track.title,
                    e
                );
                None
            }
        }
    }

    async fn fetch_recommended(&self, video_id: &str) -> Result<RecommendedVideos, ResolveError> {
        let url = format!(
            "{}/api/v1/videos/{}",
            self.config.related_api_base.trim_end_matches('/'),
            video_id
        );
        let response = self
            .http_client
            .get(&url)
            .query(&[("fields", "recommendedVideos")])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(
        &self,
        reference: &str,
        want_direct_url: bool,
    ) -> Result<TrackDescriptor, ResolveError> {
        let info = self.dump_json(reference, !want_direct_url).await?;
        let track = descriptor_from_info(reference, &info, want_direct_url)
            .ok_or_else(|| ResolveError::NotFound(reference.to_string()))?;
        self.check_duration(&track)?;
        if want_direct_url && !track.is_playable() {
            return Err(ResolveError::NotFound(reference.to_string()));
        }
        Ok(track)
    }

    async fn list_playlist(&self, reference: &str) -> Result<Vec<TrackDescriptor>, ResolveError> {
        let info = self.dump_json(reference, true).await?;
        let tracks = playlist_entries(&info, self.config.playlist_limit, self.max_duration_secs);
        log::debug!(
            "[Resolver] Playlist {} listed {} playable entries",
            reference,
            tracks.len()
        );
        Ok(tracks)
    }

    async fn related_tracks(&self, track: &TrackDescriptor, limit: usize) -> Vec<TrackDescriptor> {
        if limit == 0 {
            return Vec::new();
        }
        let Some(video_id) = self.youtube_id(track).await else {
            return Vec::new();
        };
        match self.fetch_recommended(&video_id).await {
            Ok(recommended) => {
                related_descriptors(recommended, &video_id, limit, self.max_duration_secs)
            }
            Err(e) => {
                log::debug!("[Resolver] Related lookup for {} failed: {}", video_id, e);
                Vec::new()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractor output mapping
// ─────────────────────────────────────────────────────────────────────────────

fn text_field(info: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| info.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .unwrap_or(MISSING_FIELD)
        .to_string()
}

/// Maps one extractor info object to a descriptor.
///
/// Search results and single-entry playlists carry their track in
/// `entries`; the first usable entry is taken. Returns `None` when there is
/// nothing to describe.
fn descriptor_from_info(reference: &str, info: &Value, resolved: bool) -> Option<TrackDescriptor> {
    if let Some(entries) = info.get("entries").and_then(Value::as_array) {
        let first = entries.iter().find(|e| e.is_object())?;
        return descriptor_from_info(reference, first, resolved);
    }
    if !info.is_object() {
        return None;
    }

    let duration = info.get("duration").and_then(Value::as_f64).unwrap_or(0.0);
    let extractor = info
        .get("extractor")
        .or_else(|| info.get("ie_key"))
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .unwrap_or_else(|| MISSING_FIELD.to_string());
    let sample_rate = info.get("asr").and_then(Value::as_u64);
    let codec = info.get("acodec").and_then(Value::as_str);
    let need_reencode =
        sample_rate != Some(u64::from(OPUS_SAMPLE_RATE)) || codec != Some(OPUS_CODEC_NAME);

    let media_url = if resolved {
        info.get("url").and_then(Value::as_str).map(str::to_string)
    } else {
        None
    };
    let duration_string = resolved.then(|| {
        info.get("duration_string")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format_duration(duration))
    });

    Some(TrackDescriptor {
        reference: reference.to_string(),
        resolved: media_url.is_some(),
        title: text_field(info, &["title"]),
        id: text_field(info, &["id"]),
        canonical_url: text_field(info, &["webpage_url", "original_url", "url"]),
        duration,
        media_url,
        channel: text_field(info, &["uploader", "channel"]),
        channel_url: text_field(info, &["uploader_url", "channel_url"]),
        extractor,
        need_reencode,
        duration_string,
    })
}

/// Flat playlist entries, in order, as unresolved descriptors.
///
/// Private or deleted entries (null or without a URL) and entries over the
/// duration limit are skipped; at most `limit` are returned.
fn playlist_entries(info: &Value, limit: usize, max_duration_secs: f64) -> Vec<TrackDescriptor> {
    let Some(entries) = info.get("entries").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let url = entry.get("url").and_then(Value::as_str)?;
            let track = descriptor_from_info(url, entry, false)?;
            if track.exceeds_duration(max_duration_secs) {
                log::debug!(
                    "[Resolver] Skipping '{}' ({:.0}s over limit)",
                    track.title,
                    track.duration
                );
                return None;
            }
            Some(track)
        })
        .take(limit)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedVideos {
    #[serde(default)]
    recommended_videos: Vec<RecommendedVideo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendedVideo {
    video_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    author_url: Option<String>,
    #[serde(default)]
    length_seconds: Option<f64>,
}

fn related_descriptors(
    recommended: RecommendedVideos,
    current_id: &str,
    limit: usize,
    max_duration_secs: f64,
) -> Vec<TrackDescriptor> {
    recommended
        .recommended_videos
        .into_iter()
        .filter(|v| v.video_id != current_id)
        .map(|v| {
            let url = format!("{YOUTUBE_WATCH_URL}{}", v.video_id);
            let or_missing = |s: Option<String>| s.unwrap_or_else(|| MISSING_FIELD.to_string());
            TrackDescriptor {
                reference: url.clone(),
                resolved: false,
                title: or_missing(v.title),
                id: v.video_id,
                canonical_url: url,
                duration: v.length_seconds.unwrap_or(0.0),
                media_url: None,
                channel: or_missing(v.author),
                channel_url: v
                    .author_url
                    .map(|path| {
                        if path.starts_with('/') {
                            format!("https://www.youtube.com{path}")
                        } else {
                            path
                        }
                    })
                    .unwrap_or_else(|| MISSING_FIELD.to_string()),
                extractor: YOUTUBE_EXTRACTOR.to_string(),
                need_reencode: true,
                duration_string: None,
            }
        })
        .filter(|t| !t.exceeds_duration(max_duration_secs))
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_info_maps_to_resolved_descriptor() {
        let info = json!({
            "id": "abc123",
            "title": "Some Song",
            "webpage_url": "https://www.youtube.com/watch?v=abc123",
            "url": "https://rr1.googlevideo.com/videoplayback?id=abc",
            "duration": 215.0,
            "duration_string": "3:35",
            "uploader": "Some Artist",
            "uploader_url": "https://www.youtube.com/@artist",
            "extractor": "youtube",
            "asr": 48000,
            "acodec": "opus"
        });

        let track = descriptor_from_info("https://youtu.be/abc123", &info, true).unwrap();
        assert!(track.is_playable());
        assert_eq!(track.reference, "https://youtu.be/abc123");
        assert_eq!(track.canonical_url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(track.channel, "Some Artist");
        assert_eq!(track.duration_string.as_deref(), Some("3:35"));
        assert!(!track.need_reencode);
    }

    #[test]
    fn flat_info_is_not_resolved_and_fills_missing_fields() {
        let info = json!({
            "id": "abc123",
            "url": "https://www.youtube.com/watch?v=abc123",
            "ie_key": "Youtube"
        });

        let track = descriptor_from_info("ref", &info, false).unwrap();
        assert!(!track.resolved);
        assert!(track.media_url.is_none());
        assert_eq!(track.title, MISSING_FIELD);
        assert_eq!(track.channel_url, MISSING_FIELD);
        assert_eq!(track.canonical_url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(track.extractor, "youtube");
        assert!(track.need_reencode);
        assert_eq!(track.duration, 0.0);
    }

    #[test]
    fn non_opus_source_needs_reencode() {
        let info = json!({"id": "x", "url": "https://cdn/x.m4a", "asr": 44100, "acodec": "mp4a.40.2"});
        assert!(descriptor_from_info("x", &info, true).unwrap().need_reencode);

        let info = json!({"id": "x", "url": "https://cdn/x.webm", "asr": 44100, "acodec": "opus"});
        assert!(descriptor_from_info("x", &info, true).unwrap().need_reencode);
    }

    #[test]
    fn search_result_uses_first_entry() {
        let info = json!({
            "_type": "playlist",
            "entries": [null, {"id": "first", "title": "First", "url": "https://cdn/first"}, {"id": "second"}]
        });
        let track = descriptor_from_info("ytsearch1:first", &info, true).unwrap();
        assert_eq!(track.id, "first");
        assert_eq!(track.media_url.as_deref(), Some("https://cdn/first"));
        assert_eq!(track.duration_string.as_deref(), Some("0:00"));

        assert!(descriptor_from_info("x", &json!({"entries": []}), false).is_none());
    }

    #[test]
    fn playlist_skips_private_and_long_entries() {
        let info = json!({
            "entries": [
                {"id": "a", "title": "A", "url": "https://www.youtube.com/watch?v=a", "duration": 200.0},
                null,
                {"id": "long", "title": "Long", "url": "https://www.youtube.com/watch?v=long", "duration": 1000.0},
                {"id": "private", "title": "[Private video]"},
                {"id": "b", "title": "B", "url": "https://www.youtube.com/watch?v=b"},
                {"id": "c", "title": "C", "url": "https://www.youtube.com/watch?v=c", "duration": 100.0}
            ]
        });

        let tracks = playlist_entries(&info, 2, 900.0);
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(tracks.iter().all(|t| !t.resolved));
        assert_eq!(tracks[0].reference, "https://www.youtube.com/watch?v=a");
    }

    #[test]
    fn related_videos_become_unresolved_youtube_tracks() {
        let recommended: RecommendedVideos = serde_json::from_value(json!({
            "recommendedVideos": [
                {"videoId": "cur", "title": "Current", "lengthSeconds": 100},
                {"videoId": "r1", "title": "R1", "author": "A1", "authorUrl": "/channel/UC1", "lengthSeconds": 180},
                {"videoId": "r2", "title": "R2", "lengthSeconds": 4000},
                {"videoId": "r3", "title": "R3"},
                {"videoId": "r4", "title": "R4"}
            ]
        }))
        .unwrap();

        let tracks = related_descriptors(recommended, "cur", 2, 900.0);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id, "r1");
        assert_eq!(tracks[0].canonical_url, "https://www.youtube.com/watch?v=r1");
        assert_eq!(tracks[0].channel_url, "https://www.youtube.com/channel/UC1");
        assert_eq!(tracks[1].id, "r3");
        assert_eq!(tracks[1].channel, MISSING_FIELD);
        assert!(tracks.iter().all(|t| !t.is_playable()));
    }

    #[test]
    fn missing_recommendations_field_is_empty() {
        let recommended: RecommendedVideos = serde_json::from_value(json!({})).unwrap();
        assert!(related_descriptors(recommended, "x", 2, 900.0).is_empty());
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let resolver = YtDlpResolver::new(
            ResolverConfig {
                ytdlp_path: "/nonexistent/radiocast-yt-dlp".into(),
                ..ResolverConfig::default()
            },
            900.0,
            Client::new(),
        );
        let err = resolver.resolve("ytsearch1:anything", true).await.unwrap_err();
        assert!(matches!(err, ResolveError::Spawn(_)));

        let track = TrackDescriptor::unresolved("https://soundcloud.com/a/b");
        assert!(resolver.related_tracks(&track, 2).await.is_empty());
    }
}
