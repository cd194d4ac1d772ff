//! Conversion of video containers the repository refuses into WebM
//!
//! The encoder runs as an external process. If it reports the preferred audio
//! codec as unavailable, the same attempt is repeated once with the fallback
//! codec. Whole attempts are retried with a fixed pause and a pause/stop
//! checkpoint before each one.

use crate::config::TranscodeConfig;
use crate::control::RunControl;
use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, with_retry};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, LazyLock};
use tokio::process::Command;

/// Extension of every transcoder output
pub const OUTPUT_EXTENSION: &str = "webm";

#[allow(clippy::expect_used)] // literal pattern
static ENCODER_MISSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)unknown encoder|encoder not found|error selecting an encoder|could not find tag for codec|only .* audio .* supported",
    )
    .expect("encoder pattern is valid")
});

/// Whether encoder diagnostics say the audio codec cannot be used
pub fn is_audio_codec_unsupported(stderr: &str, audio_codec: &str) -> bool {
    ENCODER_MISSING.is_match(stderr)
        && (stderr.contains(audio_codec) || stderr.to_ascii_lowercase().contains("audio"))
}

/// One encoder invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeJob {
    /// Source file
    pub input: PathBuf,
    /// Destination file (overwritten)
    pub output: PathBuf,
    /// Video codec name
    pub video_codec: String,
    /// Audio codec name
    pub audio_codec: String,
}

/// Why an encoder invocation failed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeFailure {
    /// Encoder diagnostics
    pub message: String,
    /// The requested audio codec is not available in this encoder build
    pub audio_codec_unsupported: bool,
}

/// External video encoder
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Run one conversion
    async fn encode(&self, job: &EncodeJob) -> std::result::Result<(), EncodeFailure>;

    /// Short encoder name for logs
    fn name(&self) -> &'static str;
}

/// `ffmpeg` command-line encoder
pub struct FfmpegEncoder {
    binary_path: PathBuf,
}

impl FfmpegEncoder {
    /// Use an explicit binary
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Find `ffmpeg` in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Explicit path from configuration, else PATH lookup
    pub fn from_config(config: &TranscodeConfig) -> Option<Self> {
        match &config.ffmpeg_path {
            Some(path) => Some(Self::new(path.clone())),
            None => Self::from_path(),
        }
    }

    fn args(job: &EncodeJob) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-v", "error", "-i"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        args.push(job.input.to_string_lossy().into_owned());
        args.extend(
            [
                "-c:v",
                job.video_codec.as_str(),
                "-b:v",
                "0",
                "-crf",
                "32",
                "-c:a",
                job.audio_codec.as_str(),
                "-f",
                "webm",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args.push(job.output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> std::result::Result<(), EncodeFailure> {
        let output = Command::new(&self.binary_path)
            .args(Self::args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EncodeFailure {
                message: format!("failed to execute ffmpeg: {}", e),
                audio_codec_unsupported: false,
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(EncodeFailure {
            audio_codec_unsupported: is_audio_codec_unsupported(&stderr, &job.audio_codec),
            message: stderr.trim().lines().last().unwrap_or("ffmpeg failed").to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Converts a video into the accepted container
pub struct Transcoder {
    config: Arc<TranscodeConfig>,
    encoder: Arc<dyn VideoEncoder>,
}

impl Transcoder {
    /// Create a transcoder around `encoder`
    pub fn new(config: Arc<TranscodeConfig>, encoder: Arc<dyn VideoEncoder>) -> Self {
        Self { config, encoder }
    }

    /// Convert `input` into `<out_dir>/<input stem>.webm`
    pub async fn transcode(
        &self,
        input: &Path,
        out_dir: &Path,
        control: &RunControl,
    ) -> Result<PathBuf> {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("video");
        let output = out_dir.join(format!("{}.{}", stem, OUTPUT_EXTENSION));
        let policy = RetryPolicy::fixed(self.config.attempts, self.config.pause);

        tracing::info!(
            input = %input.display(),
            encoder = self.encoder.name(),
            "Transcoding to {}",
            OUTPUT_EXTENSION
        );

        with_retry(&policy, control, "transcode", |attempt| {
            let output = output.clone();
            async move {
                tracing::debug!(input = %input.display(), attempt, "Encoder attempt");
                self.attempt(input, &output).await?;
                Ok(output)
            }
        })
        .await
    }

    async fn attempt(&self, input: &Path, output: &Path) -> Result<()> {
        // A leftover from a failed attempt must not count as output
        let _ = tokio::fs::remove_file(output).await;

        let mut job = EncodeJob {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            video_codec: self.config.video_codec.clone(),
            audio_codec: self.config.audio_codec.clone(),
        };

        if let Err(failure) = self.encoder.encode(&job).await {
            if !failure.audio_codec_unsupported {
                return Err(Error::Transcode(failure.message));
            }
            tracing::warn!(
                codec = %job.audio_codec,
                fallback = %self.config.fallback_audio_codec,
                "Audio codec unavailable, retrying with fallback"
            );
            job.audio_codec = self.config.fallback_audio_codec.clone();
            let _ = tokio::fs::remove_file(output).await;
            self.encoder
                .encode(&job)
                .await
                .map_err(|failure| Error::Transcode(failure.message))?;
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(Error::Transcode("encoder produced no output".to_string())),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Encoder that follows a per-call script
    struct ScriptedEncoder {
        script: Mutex<Vec<Step>>,
        jobs: Mutex<Vec<EncodeJob>>,
    }

    #[derive(Clone)]
    enum Step {
        Write,
        WriteNothing,
        Fail,
        NoAudioCodec,
    }

    impl ScriptedEncoder {
        fn new(script: Vec<Step>) -> Self {
            Self {
                script: Mutex::new(script),
                jobs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VideoEncoder for ScriptedEncoder {
        async fn encode(&self, job: &EncodeJob) -> std::result::Result<(), EncodeFailure> {
            self.jobs.lock().unwrap().push(job.clone());
            let step = {
                let mut script = self.script.lock().unwrap();
                if script.is_empty() {
                    Step::Write
                } else {
                    script.remove(0)
                }
            };
            match step {
                Step::Write => {
                    tokio::fs::write(&job.output, b"\x1a\x45\xdf\xa3webm").await.unwrap();
                    Ok(())
                }
                Step::WriteNothing => Ok(()),
                Step::Fail => Err(EncodeFailure {
                    message: "Invalid data found when processing input".into(),
                    audio_codec_unsupported: false,
                }),
                Step::NoAudioCodec => Err(EncodeFailure {
                    message: "Unknown encoder 'libopus'".into(),
                    audio_codec_unsupported: true,
                }),
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn transcoder(encoder: Arc<ScriptedEncoder>) -> Transcoder {
        let config = TranscodeConfig {
            pause: Duration::from_millis(5),
            ..Default::default()
        };
        Transcoder::new(Arc::new(config), encoder)
    }

    #[tokio::test]
    async fn test_output_is_webm_named_after_input() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::new(vec![]));
        let out = transcoder(encoder.clone())
            .transcode(Path::new("/src/clip.mp4"), dir.path(), &RunControl::new())
            .await
            .unwrap();

        assert_eq!(out, dir.path().join("clip.webm"));
        let jobs = encoder.jobs.lock().unwrap();
        assert_eq!(jobs[0].video_codec, "libvpx-vp9");
        assert_eq!(jobs[0].audio_codec, "libopus");
    }

    #[tokio::test]
    async fn test_audio_codec_fallback_within_one_attempt() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::new(vec![Step::NoAudioCodec]));
        transcoder(encoder.clone())
            .transcode(Path::new("clip.mov"), dir.path(), &RunControl::new())
            .await
            .unwrap();

        let jobs = encoder.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].audio_codec, "libvorbis");
    }

    #[tokio::test]
    async fn test_empty_output_counts_as_failure_then_retry() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::new(vec![Step::WriteNothing, Step::Fail]));
        transcoder(encoder.clone())
            .transcode(Path::new("clip.mkv"), dir.path(), &RunControl::new())
            .await
            .unwrap();
        assert_eq!(encoder.jobs.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_attempts_exhausted() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(ScriptedEncoder::new(vec![Step::Fail, Step::Fail, Step::Fail]));
        let err = transcoder(encoder.clone())
            .transcode(Path::new("clip.avi"), dir.path(), &RunControl::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transcode(_)));
        assert_eq!(encoder.jobs.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_audio_codec_signal_detection() {
        assert!(is_audio_codec_unsupported(
            "Unknown encoder 'libopus'",
            "libopus"
        ));
        assert!(!is_audio_codec_unsupported(
            "Unknown encoder 'libvpx-vp9'",
            "libopus"
        ));
        assert!(!is_audio_codec_unsupported(
            "moov atom not found",
            "libopus"
        ));
    }

    #[test]
    fn test_ffmpeg_args() {
        let args = FfmpegEncoder::args(&EncodeJob {
            input: PathBuf::from("in.mp4"),
            output: PathBuf::from("out.webm"),
            video_codec: "libvpx-vp9".into(),
            audio_codec: "libopus".into(),
        });
        let joined = args.join(" ");
        assert!(joined.starts_with("-y -v error -i in.mp4"));
        assert!(joined.contains("-c:v libvpx-vp9"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.ends_with("out.webm"));
    }
}
