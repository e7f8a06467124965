//! Slideshow encoding through FFmpeg.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info};

use slidecast_models::{ConversionConfig, EncodingConfig, JobId};

use crate::collaborator::{sort_pages, Collaborator, InvocationOptions, RenderedPage, VideoEncoder};
use crate::command::{probe_tool, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::filters::build_slideshow_graph;

/// Encodes page images into an MP4 with optional cross-fades.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
    encoding: EncodingConfig,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg", EncodingConfig::default())
    }
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>, encoding: EncodingConfig) -> Self {
        Self {
            binary: binary.into(),
            encoding,
        }
    }

    pub fn encoding(&self) -> &EncodingConfig {
        &self.encoding
    }

    /// Build the FFmpeg invocation for `pages`, in page order.
    ///
    /// Each page is looped as a still for the per-slide duration; the filter
    /// graph handles scaling, frame rate, and transitions.
    pub fn build_command(
        &self,
        pages: &[RenderedPage],
        output: &Path,
        config: &ConversionConfig,
    ) -> MediaResult<FfmpegCommand> {
        if pages.is_empty() {
            return Err(MediaError::invalid_input("no pages to encode"));
        }

        let mut ordered = pages.to_vec();
        sort_pages(&mut ordered);

        let duration = f64::from(config.duration());
        let mut cmd = FfmpegCommand::new(output);
        for page in &ordered {
            cmd = cmd.looped_image(&page.path, duration);
        }

        let graph = build_slideshow_graph(ordered.len(), config, &self.encoding.pixel_format);
        Ok(cmd
            .filter_complex(graph.filter)
            .map(graph.output_label)
            .output_args(self.encoding.to_ffmpeg_args()))
    }
}

#[async_trait]
impl Collaborator for FfmpegEncoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe_readiness(&self) -> MediaResult<()> {
        probe_tool(&self.binary, "-version").await
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        job_id: &JobId,
        pages: &[RenderedPage],
        output: &Path,
        config: &ConversionConfig,
        opts: &InvocationOptions,
    ) -> MediaResult<()> {
        if let Some(missing) = pages.iter().find(|p| !p.path.exists()) {
            return Err(MediaError::FileNotFound(missing.path.clone()));
        }

        let cmd = self.build_command(pages, output, config)?;
        info!(
            job_id = %job_id,
            slides = pages.len(),
            fps = config.fps(),
            resolution = config.resolution(),
            transition = config.transition_duration(),
            expected_secs = config.expected_video_duration(pages.len()),
            "Encoding video"
        );

        let output_result = opts
            .runner()
            .run(&cmd.into_tool_command(&self.binary))
            .await?;

        if !output.exists() {
            return Err(MediaError::OutputMissing(output.to_path_buf()));
        }
        if !output_result.stderr.trim().is_empty() {
            debug!(job_id = %job_id, stderr = %output_result.stderr.trim(), "ffmpeg warnings");
        }

        info!(job_id = %job_id, output = %output.display(), "Video encoded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::probe::{VideoInfo, VideoProbe};

    fn pages(count: u32) -> Vec<RenderedPage> {
        (1..=count)
            .rev()
            .map(|i| RenderedPage::new(i, format!("/scratch/slide-{i}.png")))
            .collect()
    }

    fn input_files(args: &[String]) -> Vec<&str> {
        args.windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| w[1].as_str())
            .collect()
    }

    #[test]
    fn test_inputs_are_looped_in_page_order() {
        let config = ConversionConfig::new(24, 1080, 5, 1.0).unwrap();
        let args = FfmpegEncoder::default()
            .build_command(&pages(3), Path::new("/out/output.mp4"), &config)
            .unwrap()
            .build_args();

        assert_eq!(
            input_files(&args),
            vec!["/scratch/slide-1.png", "/scratch/slide-2.png", "/scratch/slide-3.png"]
        );
        assert_eq!(
            args.windows(4).filter(|w| *w == ["-loop", "1", "-t", "5.0000"]).count(),
            3
        );
        assert!(args.windows(2).any(|w| w == ["-map", "[x2]"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "libx264"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "yuv420p"]));
        assert_eq!(args.last().map(String::as_str), Some("/out/output.mp4"));
    }

    #[test]
    fn test_filter_offsets() {
        let config = ConversionConfig::new(30, 720, 4, 0.5).unwrap();
        let args = FfmpegEncoder::default()
            .build_command(&pages(3), Path::new("out.mp4"), &config)
            .unwrap()
            .build_args();
        let filter = args
            .windows(2)
            .find(|w| w[0] == "-filter_complex")
            .map(|w| w[1].clone())
            .unwrap();

        assert!(filter.contains("[0:v]scale=-2:720,fps=30,format=yuv420p[v0]"));
        assert!(filter.contains("duration=0.5000:offset=3.5000[x1]"));
        assert!(filter.contains("duration=0.5000:offset=7.0000[x2]"));
    }

    #[test]
    fn test_no_transition_uses_concat() {
        let config = ConversionConfig::new(24, 1080, 5, 0.0).unwrap();
        let args = FfmpegEncoder::default()
            .build_command(&pages(2), Path::new("out.mp4"), &config)
            .unwrap()
            .build_args();
        assert!(args.iter().any(|a| a.contains("concat=n=2:v=1:a=0[out]")));
        assert!(args.windows(2).any(|w| w == ["-map", "[out]"]));
    }

    #[test]
    fn test_encoding_settings_flow_into_args() {
        let encoder = FfmpegEncoder::new(
            "ffmpeg",
            EncodingConfig::default().with_preset("veryfast").with_crf(28),
        );
        let args = encoder
            .build_command(&pages(1), Path::new("out.mp4"), &ConversionConfig::default())
            .unwrap()
            .build_args();
        assert!(args.windows(2).any(|w| w == ["-preset", "veryfast"]));
        assert!(args.windows(2).any(|w| w == ["-crf", "28"]));
        assert!(args.windows(2).any(|w| w == ["-map", "[v0]"]));
    }

    #[test]
    fn test_empty_pages_rejected() {
        let err = FfmpegEncoder::default()
            .build_command(&[], Path::new("out.mp4"), &ConversionConfig::default())
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_page_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegEncoder::default()
            .encode(
                &JobId::new(),
                &[RenderedPage::new(1, dir.path().join("slide-1.png"))],
                &dir.path().join("output.mp4"),
                &ConversionConfig::default(),
                &InvocationOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    /// Generate solid-colour PNG slides with ffmpeg itself.
    async fn make_slides(dir: &Path, count: u32) -> Vec<RenderedPage> {
        let mut pages = Vec::new();
        for i in 1..=count {
            let path: PathBuf = dir.join(format!("slide-{i}.png"));
            let status = tokio::process::Command::new("ffmpeg")
                .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
                .arg(format!("color=c=0x{:02x}4080:s=640x360", i * 60))
                .args(["-frames:v", "1"])
                .arg(&path)
                .status()
                .await
                .unwrap();
            assert!(status.success());
            pages.push(RenderedPage::new(i, path));
        }
        pages
    }

    async fn encode_and_measure(count: u32, transition: f64) -> VideoInfo {
        let dir = tempfile::tempdir().unwrap();
        let pages = make_slides(dir.path(), count).await;
        let output = dir.path().join("output.mp4");
        let config = ConversionConfig::new(24, 720, 5, transition).unwrap();

        FfmpegEncoder::default()
            .encode(&JobId::new(), &pages, &output, &config, &InvocationOptions::new())
            .await
            .unwrap();
        let info = VideoProbe::default().inspect(&output).await.unwrap();
        info.verify(&config, count as usize).unwrap();
        info
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_crossfade_video_duration() {
        let info = encode_and_measure(3, 1.0).await;
        assert!((info.duration - 13.0).abs() < 0.2, "duration {}", info.duration);
        assert_eq!(info.height, 720);
        assert_eq!(info.pixel_format, "yuv420p");
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_hard_cut_video_duration() {
        let info = encode_and_measure(3, 0.0).await;
        assert!((info.duration - 15.0).abs() < 0.2, "duration {}", info.duration);
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_single_slide_video_duration() {
        let info = encode_and_measure(1, 1.0).await;
        assert!((info.duration - 5.0).abs() < 0.2, "duration {}", info.duration);
        assert!((info.fps - 24.0).abs() < 0.01);
    }
}
