//! Server configuration.
//!
//! Loaded from an optional YAML file, then environment overrides; CLI flags
//! are applied on top in `main.rs`.

use std::path::Path;

use anyhow::{Context, Result};
use radiocast_core::{PlaybackConfig, ResolverConfig, TranscoderConfig};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in the fallback range).
    /// Override: `RADIOCAST_BIND_PORT`
    pub bind_port: u16,

    /// Capacity of the status event queue.
    pub event_channel_capacity: usize,

    /// ffmpeg location and encoding parameters.
    /// Override for the executable: `RADIOCAST_FFMPEG`
    pub transcoder: TranscoderConfig,

    /// Track selection policy.
    /// Override for the fallback track: `RADIOCAST_FALLBACK_TRACK`
    pub playback: PlaybackConfig,

    /// yt-dlp location and related-tracks API.
    /// Override for the executable: `RADIOCAST_YTDLP`
    pub resolver: ResolverConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = radiocast_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            event_channel_capacity: core.event_channel_capacity,
            transcoder: core.transcoder,
            playback: core.playback,
            resolver: core.resolver,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("RADIOCAST_BIND_PORT").and_then(|v| v.parse().ok()) {
            self.bind_port = port;
        }
        if let Some(path) = lookup("RADIOCAST_FFMPEG").filter(|v| !v.is_empty()) {
            self.transcoder.ffmpeg_path = path;
        }
        if let Some(path) = lookup("RADIOCAST_YTDLP").filter(|v| !v.is_empty()) {
            self.resolver.ytdlp_path = path;
        }
        if let Some(track) = lookup("RADIOCAST_FALLBACK_TRACK").filter(|v| !v.is_empty()) {
            self.playback.fallback_track = track;
        }
    }

    /// Converts to radiocast-core's Config type.
    pub fn to_core_config(&self) -> radiocast_core::Config {
        radiocast_core::Config {
            preferred_port: self.bind_port,
            event_channel_capacity: self.event_channel_capacity,
            transcoder: self.transcoder.clone(),
            playback: self.playback.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn missing_file_path_uses_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_port, 5000);
        assert_eq!(config.transcoder.ffmpeg_path, "ffmpeg");
        assert!(config.to_core_config().validate().is_ok());
    }

    #[test]
    fn loads_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bind_port: 8080\nplayback:\n  seed_tracks:\n    - ytsearch1:first song\n  fallback_track: ytsearch1:lofi\ntranscoder:\n  threads: 4\n"
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 8080);
        assert_eq!(core.transcoder.threads, 4);
        assert_eq!(core.transcoder.feed_chunk_size, 8192);
        assert_eq!(core.playback.seed_tracks, ["ytsearch1:first song"]);
        assert_eq!(core.playback.max_track_duration_secs, 900.0);
    }

    #[test]
    fn unreadable_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: [not a port").unwrap();
        let err = ServerConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("RADIOCAST_BIND_PORT", "9000"),
            ("RADIOCAST_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("RADIOCAST_YTDLP", ""),
            ("RADIOCAST_FALLBACK_TRACK", "ytsearch1:ambient"),
        ]
        .into_iter()
        .collect();

        let mut config = ServerConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.transcoder.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.resolver.ytdlp_path, "yt-dlp");
        assert_eq!(config.playback.fallback_track, "ytsearch1:ambient");
    }
}
