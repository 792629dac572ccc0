use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};

use super::TranscodeError;
use crate::state::TranscoderConfig;
use crate::track::ResolvedTrack;

/// Byte sink feeding a muxer's input.
pub type MuxerInput = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte source carrying a process's output.
pub type ProcessOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Spawns the external processes the supervisor drives.
///
/// Implementations hand back plain byte pipes, so the supervisor does not
/// care whether there is an actual OS process behind them.
pub trait Transcoder: Send + Sync {
    /// Starts the long-lived muxer: elementary stream in, container out.
    fn spawn_muxer(&self) -> Result<MuxerProcess, TranscodeError>;

    /// Starts a per-track fetcher reading from the track's media URL.
    fn spawn_fetcher(&self, track: &ResolvedTrack) -> Result<FetcherProcess, TranscodeError>;

    /// Returns a description of the transcoder for logging.
    fn description(&self) -> &'static str;
}

/// Owned handle on a spawned process.
///
/// Acquired on spawn, released with [`release`](Self::release), which kills
/// and reaps it. Handles without a process (test pipes) release as a no-op.
pub struct ProcessHandle {
    label: &'static str,
    child: Option<Child>,
    exited: Option<ExitStatus>,
}

impl ProcessHandle {
    pub fn new(label: &'static str, child: Child) -> Self {
        Self {
            label,
            child: Some(child),
            exited: None,
        }
    }

    /// Handle for pipes that have no process behind them.
    pub fn detached(label: &'static str) -> Self {
        Self {
            label,
            child: None,
            exited: None,
        }
    }

    /// Polls for exit without blocking.
    ///
    /// Returns `Some(success)` once the process has exited.
    pub fn try_exit(&mut self) -> Option<bool> {
        if let Some(status) = self.exited {
            return Some(status.success());
        }
        let child = self.child.as_mut()?;
        match child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("[Supervisor] {} exited with {}", self.label, status);
                self.exited = Some(status);
                Some(status.success())
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("[Supervisor] Failed to poll {}: {}", self.label, e);
                None
            }
        }
    }

    /// Kills the process if it is still running and waits for it.
    pub async fn release(mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if self.exited.is_none() {
            if let Err(e) = child.start_kill() {
                log::debug!("[Supervisor] Kill of {} failed: {}", self.label, e);
            }
        }
        match child.wait().await {
            Ok(status) => log::debug!("[Supervisor] Reaped {} ({})", self.label, status),
            Err(e) => log::warn!("[Supervisor] Failed to reap {}: {}", self.label, e),
        }
    }
}

/// A running muxer: its input, its container output and its process.
pub struct MuxerProcess {
    pub input: MuxerInput,
    pub output: ProcessOutput,
    pub handle: ProcessHandle,
}

/// A running fetcher: its elementary stream output and its process.
pub struct FetcherProcess {
    pub output: ProcessOutput,
    pub handle: ProcessHandle,
}

/// [`Transcoder`] backed by the `ffmpeg` executable.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Muxer command line. `-re` paces output at real time, so listeners
    /// receive audio at playback speed rather than as fast as it decodes.
    pub fn muxer_args(&self) -> Vec<String> {
        [
            "-re",
            "-i",
            "-",
            "-threads",
            self.config.threads.to_string().as_str(),
            "-c:a",
            "copy",
            "-f",
            "opus",
            "-loglevel",
            "error",
            "pipe:1",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Fetcher command line for one track.
    ///
    /// Sources that are already Opus at the output rate are stream-copied;
    /// everything else is re-encoded.
    pub fn fetcher_args(&self, media_url: &str, need_reencode: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-reconnect".into(),
            "1".into(),
            "-reconnect_streamed".into(),
            "1".into(),
            "-reconnect_delay_max".into(),
            self.config.reconnect_delay_max_secs.to_string(),
            "-i".into(),
            media_url.into(),
            "-threads".into(),
            self.config.threads.to_string(),
            "-vn".into(),
        ];
        if need_reencode {
            args.extend([
                "-c:a".into(),
                "libopus".into(),
                "-b:a".into(),
                format!("{}k", self.config.bitrate_kbps),
                "-ar".into(),
                self.config.sample_rate.to_string(),
            ]);
        } else {
            args.extend(["-c:a".into(), "copy".into()]);
        }
        args.extend([
            "-f".into(),
            "opus".into(),
            "-loglevel".into(),
            "error".into(),
            "pipe:1".into(),
        ]);
        args
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.config.ffmpeg_path);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self, mut cmd: Command) -> Result<Child, TranscodeError> {
        cmd.spawn().map_err(|source| TranscodeError::Spawn {
            program: self.config.ffmpeg_path.clone(),
            source,
        })
    }
}

impl Transcoder for FfmpegTranscoder {
    fn spawn_muxer(&self) -> Result<MuxerProcess, TranscodeError> {
        let mut cmd = self.command(&self.muxer_args());
        cmd.stdin(Stdio::piped());
        let mut child = self.spawn(cmd)?;

        let input = child
            .stdin
            .take()
            .ok_or(TranscodeError::MissingPipe("muxer stdin"))?;
        let output = child
            .stdout
            .take()
            .ok_or(TranscodeError::MissingPipe("muxer stdout"))?;
        log::info!("[Supervisor] Muxer started (pid {:?})", child.id());

        Ok(MuxerProcess {
            input: Box::new(input),
            output: Box::new(output),
            handle: ProcessHandle::new("muxer", child),
        })
    }

    fn spawn_fetcher(&self, track: &ResolvedTrack) -> Result<FetcherProcess, TranscodeError> {
        let args = self.fetcher_args(track.media_url(), track.descriptor().need_reencode);
        let mut cmd = self.command(&args);
        cmd.stdin(Stdio::null());
        let mut child = self.spawn(cmd)?;

        let output = child
            .stdout
            .take()
            .ok_or(TranscodeError::MissingPipe("fetcher stdout"))?;
        log::debug!(
            "[Supervisor] Fetcher started for '{}' (pid {:?}, reencode={})",
            track.title(),
            child.id(),
            track.descriptor().need_reencode
        );

        Ok(FetcherProcess {
            output: Box::new(output),
            handle: ProcessHandle::new("fetcher", child),
        })
    }

    fn description(&self) -> &'static str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackDescriptor;

    fn transcoder() -> FfmpegTranscoder {
        FfmpegTranscoder::new(TranscoderConfig::default())
    }

    #[test]
    fn muxer_reads_stdin_and_copies_to_stdout() {
        let args = transcoder().muxer_args().join(" ");
        assert_eq!(
            args,
            "-re -i - -threads 2 -c:a copy -f opus -loglevel error pipe:1"
        );
    }

    #[test]
    fn fetcher_copies_opus_sources() {
        let args = transcoder()
            .fetcher_args("https://media.example.com/a.webm", false)
            .join(" ");
        assert_eq!(
            args,
            "-reconnect 1 -reconnect_streamed 1 -reconnect_delay_max 5 \
             -i https://media.example.com/a.webm -threads 2 -vn -c:a copy \
             -f opus -loglevel error pipe:1"
        );
    }

    #[test]
    fn fetcher_reencodes_other_sources() {
        let args = transcoder().fetcher_args("https://media.example.com/a.m4a", true);
        let joined = args.join(" ");
        assert!(joined.contains("-c:a libopus -b:a 152k -ar 48000"));
        assert!(!joined.contains("copy"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            ffmpeg_path: "/nonexistent/radiocast-ffmpeg".into(),
            ..TranscoderConfig::default()
        });
        let track = TrackDescriptor {
            resolved: true,
            media_url: Some("https://media.example.com/a.webm".into()),
            ..TrackDescriptor::unresolved("x")
        }
        .into_resolved()
        .unwrap();

        assert!(matches!(
            transcoder.spawn_fetcher(&track),
            Err(TranscodeError::Spawn { .. })
        ));
        assert!(matches!(
            transcoder.spawn_muxer(),
            Err(TranscodeError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn detached_handle_never_reports_exit() {
        let mut handle = ProcessHandle::detached("test");
        assert_eq!(handle.try_exit(), None);
        handle.release().await;
    }
}
