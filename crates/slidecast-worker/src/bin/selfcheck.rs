use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use slidecast_media::{
    FfmpegEncoder, InvocationOptions, RenderedPage, ToolCommand, ToolRunner, VideoEncoder,
    VideoProbe,
};
use slidecast_models::{ConversionConfig, JobId};
use slidecast_storage::validate_base_path;
use slidecast_worker::{ConversionPipeline, WorkerConfig};

/// Slides in the sample slideshow.
const SAMPLE_SLIDES: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = WorkerConfig::from_env();

    println!(
        "slidecast-selfcheck: starting with storage_path={}",
        config.storage_path.display()
    );
    ensure_storage(&config.storage_path).await?;
    ensure_tools(&config).await?;

    if std::env::args().any(|arg| arg == "--skip-encode") {
        println!("slidecast-selfcheck: sample encode skipped");
    } else {
        let scratch = config.storage_path.join("temp").join("selfcheck");
        let result = verify_sample_encode(&config, &scratch).await;
        let _ = tokio::fs::remove_dir_all(&scratch).await;
        result?;
    }

    println!("slidecast-selfcheck: ok");
    Ok(())
}

async fn ensure_storage(path: &Path) -> anyhow::Result<()> {
    validate_base_path(path)
        .await
        .with_context(|| format!("storage path {} is not usable", path.display()))?;
    Ok(())
}

async fn ensure_tools(config: &WorkerConfig) -> anyhow::Result<()> {
    let report = ConversionPipeline::from_config(config).probe_readiness().await;

    let mut missing = Vec::new();
    for tool in &report {
        match &tool.error {
            None => println!("slidecast-selfcheck: {} ready", tool.name),
            Some(e) => {
                println!("slidecast-selfcheck: {} unavailable: {}", tool.name, e);
                missing.push(tool.name.as_str());
            }
        }
    }

    if !missing.is_empty() {
        bail!("required tools unavailable: {}", missing.join(", "));
    }
    Ok(())
}

/// Encode a short cross-faded slideshow from generated slides and check it
/// with ffprobe.
async fn verify_sample_encode(config: &WorkerConfig, scratch: &Path) -> anyhow::Result<()> {
    let probe = VideoProbe::new(&config.ffprobe_bin);
    probe
        .probe_readiness()
        .await
        .with_context(|| format!("{} is not usable", probe.binary()))?;

    tokio::fs::create_dir_all(scratch)
        .await
        .with_context(|| format!("cannot create {}", scratch.display()))?;

    let sample = ConversionConfig::new(24, 360, 2, 0.5)?;
    let mut pages = Vec::new();
    for index in 1..=SAMPLE_SLIDES {
        pages.push(RenderedPage::new(index, sample_slide(config, scratch, index).await?));
    }

    let output = scratch.join("output.mp4");
    FfmpegEncoder::new(&config.ffmpeg_bin, config.encoding.clone())
        .encode(&JobId::new(), &pages, &output, &sample, &InvocationOptions::new())
        .await
        .context("sample encode failed")?;

    let info = probe.inspect(&output).await.context("cannot inspect sample video")?;
    info.verify(&sample, pages.len())
        .context("sample video does not match its settings")?;

    println!(
        "slidecast-selfcheck: sample encode ok ({:.2}s, {}x{}, {})",
        info.duration, info.width, info.height, info.pixel_format
    );
    Ok(())
}

async fn sample_slide(config: &WorkerConfig, scratch: &Path, index: u32) -> anyhow::Result<PathBuf> {
    let path = scratch.join(format!("slide-{index}.png"));
    let cmd = ToolCommand::new(&config.ffmpeg_bin)
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg(format!("color=c=0x{:02x}4080:s=640x360", index * 60))
        .args(["-frames:v", "1"])
        .arg(path.as_os_str());
    ToolRunner::new()
        .run(&cmd)
        .await
        .with_context(|| format!("cannot generate sample slide {index}"))?;
    Ok(path)
}
