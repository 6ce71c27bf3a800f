//! Media probing and transcoding via ffprobe/ffmpeg
//!
//! Both tools run as child processes through `tokio::process::Command`. The
//! `MediaProcessor` trait is the seam the ingestion pipeline consumes, so
//! tests can force probe or transcode failures without the binaries
//! installed.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tracing::debug;

use provider::BoxFuture;

/// Errors from media tool invocations.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("failed to spawn media tool: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("media tool exited with {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("unreadable tool output: {0}")]
    Parse(String),
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;

/// Probed characteristics of a media file. Every field is optional; a probe
/// that fails entirely leaves all of them unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u64>,
    pub frame_rate: Option<f64>,
}

impl From<MediaInfo> for provider::MediaAttributes {
    fn from(info: MediaInfo) -> Self {
        Self {
            duration_secs: info.duration_secs,
            width: info.width,
            height: info.height,
            bitrate: info.bitrate,
            frame_rate: info.frame_rate,
        }
    }
}

/// Target encoding parameters for a re-encode pass.
#[derive(Debug, Clone, Default)]
pub struct TranscodeParams {
    /// e.g. "1280x720"
    pub resolution: Option<String>,
    /// e.g. "1500k"
    pub bitrate: Option<String>,
    pub frame_rate: Option<u32>,
}

/// Seam between the ingestion pipeline and the media tools.
pub trait MediaProcessor: Send + Sync {
    /// Probe duration, resolution, bitrate, and frame rate.
    fn probe<'a>(&'a self, input: &'a Path) -> BoxFuture<'a, MediaResult<MediaInfo>>;

    /// Extract one frame at `offset_secs` as a JPEG thumbnail.
    fn thumbnail<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        offset_secs: f64,
    ) -> BoxFuture<'a, MediaResult<()>>;

    /// Re-encode to the requested parameters.
    fn transcode<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        params: &'a TranscodeParams,
    ) -> BoxFuture<'a, MediaResult<()>>;
}

/// Production implementation shelling out to ffprobe/ffmpeg.
pub struct FfmpegProcessor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegProcessor {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    async fn run(&self, program: &Path, args: Vec<String>) -> MediaResult<Vec<u8>> {
        debug!(program = %program.display(), ?args, "running media tool");
        let output = tokio::process::Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(500)
                    .collect(),
            });
        }
        Ok(output.stdout)
    }
}

impl MediaProcessor for FfmpegProcessor {
    fn probe<'a>(&'a self, input: &'a Path) -> BoxFuture<'a, MediaResult<MediaInfo>> {
        Box::pin(async move {
            let stdout = self
                .run(
                    &self.ffprobe,
                    vec![
                        "-v".into(),
                        "error".into(),
                        "-print_format".into(),
                        "json".into(),
                        "-show_format".into(),
                        "-show_streams".into(),
                        input.display().to_string(),
                    ],
                )
                .await?;
            let text = String::from_utf8_lossy(&stdout);
            parse_probe_output(&text)
        })
    }

    fn thumbnail<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        offset_secs: f64,
    ) -> BoxFuture<'a, MediaResult<()>> {
        Box::pin(async move {
            self.run(
                &self.ffmpeg,
                vec![
                    "-y".into(),
                    "-ss".into(),
                    format!("{offset_secs}"),
                    "-i".into(),
                    input.display().to_string(),
                    "-vframes".into(),
                    "1".into(),
                    "-q:v".into(),
                    "2".into(),
                    output.display().to_string(),
                ],
            )
            .await?;
            Ok(())
        })
    }

    fn transcode<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        params: &'a TranscodeParams,
    ) -> BoxFuture<'a, MediaResult<()>> {
        Box::pin(async move {
            let mut args = vec!["-y".into(), "-i".into(), input.display().to_string()];
            if let Some(resolution) = &params.resolution {
                args.push("-s".into());
                args.push(resolution.clone());
            }
            if let Some(bitrate) = &params.bitrate {
                args.push("-b:v".into());
                args.push(bitrate.clone());
            }
            if let Some(frame_rate) = params.frame_rate {
                args.push("-r".into());
                args.push(frame_rate.to_string());
            }
            args.push(output.display().to_string());

            self.run(&self.ffmpeg, args).await?;
            Ok(())
        })
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// Parse `ffprobe -print_format json` output into a [`MediaInfo`].
fn parse_probe_output(text: &str) -> MediaResult<MediaInfo> {
    let probe: ProbeOutput =
        serde_json::from_str(text).map_err(|e| MediaError::Parse(e.to_string()))?;

    let mut info = MediaInfo::default();
    if let Some(format) = probe.format {
        info.duration_secs = format.duration.as_deref().and_then(|d| d.parse().ok());
        info.bitrate = format.bit_rate.as_deref().and_then(|b| b.parse().ok());
    }
    if let Some(video) = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    {
        info.width = video.width;
        info.height = video.height;
        info.frame_rate = video.r_frame_rate.as_deref().and_then(parse_frame_rate);
    }
    Ok(info)
}

/// ffprobe reports frame rate as a fraction like "30000/1001".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 { None } else { Some(num / den) }
        }
        None => raw.parse().ok(),
    }
}
