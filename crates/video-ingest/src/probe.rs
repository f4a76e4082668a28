//! Stream metadata via `ffprobe`.

use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    ffmpeg::{is_v4l_source, resolve_source},
    types::{CaptureError, FrameSize},
};

/// Frame rate assumed when the container does not declare one.
pub const FALLBACK_FPS: f64 = 30.0;

/// Properties the encoder needs to mirror the input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub size: FrameSize,
    pub fps: f64,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Query the first video stream of `uri`.
pub fn probe(uri: &str) -> Result<VideoInfo, CaptureError> {
    let source = resolve_source(uri);
    let mut cmd = Command::new("ffprobe");
    cmd.args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=width,height,r_frame_rate,avg_frame_rate"])
        .args(["-of", "json"]);
    if is_v4l_source(uri) {
        cmd.args(["-f", "video4linux2"]);
    }
    cmd.arg(&source)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!(uri = %source, "probing input");
    let output = cmd.output().map_err(|source| CaptureError::Spawn {
        program: "ffprobe",
        source,
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::Probe {
            uri: uri.to_string(),
            reason: stderr.trim().to_string(),
        });
    }
    parse_probe_output(uri, &output.stdout)
}

/// Extract [`VideoInfo`] from ffprobe's JSON output.
pub fn parse_probe_output(uri: &str, json: &[u8]) -> Result<VideoInfo, CaptureError> {
    let failed = |reason: String| CaptureError::Probe {
        uri: uri.to_string(),
        reason,
    };
    let parsed: ProbeOutput =
        serde_json::from_slice(json).map_err(|err| failed(format!("malformed ffprobe output: {err}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| failed("no video stream".into()))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        return Err(failed("video stream has no dimensions".into()));
    };
    if width == 0 || height == 0 {
        return Err(failed(format!("video stream is {width}x{height}")));
    }

    let fps = [stream.r_frame_rate, stream.avg_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|rate| parse_rate(&rate))
        .unwrap_or_else(|| {
            warn!(uri, fallback = FALLBACK_FPS, "input declares no frame rate");
            FALLBACK_FPS
        });

    Ok(VideoInfo {
        size: FrameSize::new(width, height),
        fps,
    })
}

/// Parse an ffmpeg rational like `30000/1001` or a plain number. Zero and
/// undefined rates (`0/0`) yield `None`.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.trim().split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rational_rates() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn reads_first_video_stream() {
        let json = br#"{
            "programs": [],
            "streams": [
                { "width": 1920, "height": 1080, "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001" }
            ]
        }"#;
        let info = parse_probe_output("clip.mp4", json).unwrap();
        assert_eq!(info.size, FrameSize::new(1920, 1080));
        assert!((info.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn falls_back_to_average_then_default_rate() {
        let avg = br#"{"streams":[{"width":64,"height":48,"r_frame_rate":"0/0","avg_frame_rate":"15/1"}]}"#;
        assert_eq!(parse_probe_output("a", avg).unwrap().fps, 15.0);

        let none = br#"{"streams":[{"width":64,"height":48}]}"#;
        assert_eq!(parse_probe_output("b", none).unwrap().fps, FALLBACK_FPS);
    }

    #[test]
    fn missing_stream_is_an_error() {
        let err = parse_probe_output("audio.m4a", br#"{"streams":[]}"#).unwrap_err();
        assert!(err.to_string().contains("no video stream"));
        assert!(parse_probe_output("junk", b"not json").is_err());
    }
}
