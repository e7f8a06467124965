//! Rendered video inspection with `ffprobe`.

use std::path::Path;

use serde::Deserialize;

use slidecast_models::ConversionConfig;

use crate::command::{probe_tool, ToolCommand, ToolRunner};
use crate::error::{MediaError, MediaResult};

/// Allowed drift between the measured and the expected duration, in seconds.
pub const DURATION_TOLERANCE: f64 = 0.25;

/// What `ffprobe` reports about a rendered slideshow.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub pixel_format: String,
}

impl VideoInfo {
    /// Check the video against what `config` should produce for `slide_count` slides.
    pub fn verify(&self, config: &ConversionConfig, slide_count: usize) -> MediaResult<()> {
        let expected = config.expected_video_duration(slide_count);
        if (self.duration - expected).abs() > DURATION_TOLERANCE {
            return Err(MediaError::InvalidVideo(format!(
                "duration {:.2}s, expected {:.2}s",
                self.duration, expected
            )));
        }
        if self.height != config.resolution() {
            return Err(MediaError::InvalidVideo(format!(
                "height {}px, expected {}px",
                self.height,
                config.resolution()
            )));
        }
        if (self.fps - f64::from(config.fps())).abs() > 0.01 {
            return Err(MediaError::InvalidVideo(format!(
                "{:.2} fps, expected {}",
                self.fps,
                config.fps()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    streams: Vec<StreamEntry>,
    format: Option<FormatEntry>,
}

#[derive(Debug, Deserialize)]
struct FormatEntry {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Wrapper around a configurable `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct VideoProbe {
    binary: String,
}

impl Default for VideoProbe {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl VideoProbe {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub async fn probe_readiness(&self) -> MediaResult<()> {
        probe_tool(&self.binary, "-version").await
    }

    pub fn build_command(&self, video: &Path) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args([
                "-show_entries",
                "format=duration:stream=codec_type,width,height,pix_fmt,avg_frame_rate",
            ])
            .args(["-of", "json"])
            .arg(video.as_os_str())
    }

    /// Measure the first video stream of `video`.
    pub async fn inspect(&self, video: &Path) -> MediaResult<VideoInfo> {
        if !video.exists() {
            return Err(MediaError::FileNotFound(video.to_path_buf()));
        }
        let output = ToolRunner::new().run(&self.build_command(video)).await?;
        parse_report(&output.stdout)
    }
}

fn parse_report(json: &str) -> MediaResult<VideoInfo> {
    let report: Report = serde_json::from_str(json)?;

    let stream = report
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MediaError::InvalidVideo("no video stream".to_string()))?;

    let duration = report
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| MediaError::InvalidVideo("no container duration".to_string()))?;

    Ok(VideoInfo {
        duration,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        fps: stream
            .avg_frame_rate
            .as_deref()
            .and_then(frame_rate)
            .unwrap_or(0.0),
        pixel_format: stream.pix_fmt.unwrap_or_default(),
    })
}

/// `"24/1"` or `"29.97"` to frames per second.
fn frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            (den > 0.0).then_some(num.parse::<f64>().ok()? / den)
        }
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "streams": [
            {"codec_type": "video", "width": 1280, "height": 720,
             "pix_fmt": "yuv420p", "avg_frame_rate": "24/1"}
        ],
        "format": {"duration": "13.000000"}
    }"#;

    #[test]
    fn test_frame_rate() {
        assert_eq!(frame_rate("24/1"), Some(24.0));
        assert!((frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(frame_rate("25"), Some(25.0));
        assert_eq!(frame_rate("0/0"), None);
    }

    #[test]
    fn test_parse_report() {
        let info = parse_report(REPORT).unwrap();
        assert!((info.duration - 13.0).abs() < 1e-6);
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.pixel_format, "yuv420p");
    }

    #[test]
    fn test_parse_report_needs_video_and_duration() {
        let audio_only = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "1.0"}}"#;
        assert!(matches!(
            parse_report(audio_only),
            Err(MediaError::InvalidVideo(_))
        ));

        let no_format = r#"{"streams": [{"codec_type": "video", "height": 720}]}"#;
        assert!(matches!(
            parse_report(no_format),
            Err(MediaError::InvalidVideo(_))
        ));
    }

    #[test]
    fn test_verify_against_config() {
        let info = parse_report(REPORT).unwrap();
        let config = ConversionConfig::new(24, 720, 5, 1.0).unwrap();
        info.verify(&config, 3).unwrap();

        let err = info.verify(&config, 4).unwrap_err();
        assert!(err.to_string().contains("expected 17.00s"), "{err}");

        let taller = ConversionConfig::new(24, 1080, 5, 1.0).unwrap();
        assert!(info.verify(&taller, 3).is_err());

        let faster = ConversionConfig::new(30, 720, 5, 1.0).unwrap();
        assert!(info.verify(&faster, 3).is_err());
    }

    #[test]
    fn test_command_line() {
        let cmd = VideoProbe::new("/opt/ffprobe").build_command(Path::new("/out/output.mp4"));
        assert_eq!(cmd.program(), "/opt/ffprobe");
        let line = cmd.display();
        assert!(line.contains("-of json"));
        assert!(line.ends_with("/out/output.mp4"));
    }
}
