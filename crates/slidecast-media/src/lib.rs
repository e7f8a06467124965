#![deny(unreachable_patterns)]
//! External tool wrappers for slide-to-video conversion.
//!
//! This crate provides:
//! - A uniform collaborator contract with a readiness probe
//! - Document rendering via LibreOffice (deck -> PDF)
//! - Page rasterization via Poppler (PDF -> ordered PNG pages)
//! - Slideshow encoding via FFmpeg (pages -> MP4 with cross-fades)
//! - Output inspection via ffprobe
//! - Deadlines and cancellation for every external call

pub mod collaborator;
pub mod command;
pub mod encoder;
pub mod error;
pub mod filters;
pub mod probe;
pub mod rasterizer;
pub mod renderer;

pub use collaborator::{
    sort_pages, Collaborator, DocumentRenderer, InvocationOptions, PageRasterizer, RenderedPage,
    VideoEncoder,
};
pub use command::{probe_tool, FfmpegCommand, ToolCommand, ToolOutput, ToolRunner};
pub use encoder::FfmpegEncoder;
pub use error::{MediaError, MediaResult};
pub use filters::{build_slideshow_graph, SlideshowGraph};
pub use probe::{VideoInfo, VideoProbe, DURATION_TOLERANCE};
pub use rasterizer::{parse_page_index, PopplerRasterizer};
pub use renderer::LibreOfficeRenderer;
