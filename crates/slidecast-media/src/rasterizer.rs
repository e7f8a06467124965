//! PDF page rasterization through Poppler.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use slidecast_models::JobId;

use crate::collaborator::{sort_pages, Collaborator, InvocationOptions, PageRasterizer, RenderedPage};
use crate::command::{probe_tool, ToolCommand};
use crate::error::{MediaError, MediaResult};

/// File name prefix for rasterized pages (`slide-1.png`, `slide-01.png`, ...).
const PAGE_PREFIX: &str = "slide";

/// Rasterizes PDFs with `pdftoppm -png`.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    binary: String,
}

impl Default for PopplerRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

impl PopplerRasterizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Build the rasterization command; pages are scaled to `resolution`
    /// pixels tall with the width following the page aspect ratio.
    pub fn build_command(&self, document: &Path, out_dir: &Path, resolution: u32) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .args(["-png", "-scale-to-x", "-1", "-scale-to-y"])
            .arg(resolution.to_string())
            .arg(document.as_os_str())
            .arg(out_dir.join(PAGE_PREFIX).as_os_str())
    }

    /// Collect rasterized pages from `out_dir`, sorted by page index.
    pub async fn collect_pages(out_dir: &Path) -> MediaResult<Vec<RenderedPage>> {
        let mut pages = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_page_index) {
                pages.push(RenderedPage::new(index, entry.path()));
            }
        }
        sort_pages(&mut pages);
        Ok(pages)
    }
}

/// Page index from a rasterized file name.
///
/// pdftoppm zero-pads to the width of the page count, so `slide-7.png` and
/// `slide-07.png` both mean page 7. Returns `None` for any other file.
pub fn parse_page_index(file_name: &str) -> Option<u32> {
    let digits = file_name
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".png")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[async_trait]
impl Collaborator for PopplerRasterizer {
    fn name(&self) -> &str {
        "poppler"
    }

    async fn probe_readiness(&self) -> MediaResult<()> {
        probe_tool(&self.binary, "-v").await
    }
}

#[async_trait]
impl PageRasterizer for PopplerRasterizer {
    async fn rasterize(
        &self,
        job_id: &JobId,
        document: &Path,
        out_dir: &Path,
        resolution: u32,
        opts: &InvocationOptions,
    ) -> MediaResult<Vec<RenderedPage>> {
        if !document.exists() {
            return Err(MediaError::FileNotFound(document.to_path_buf()));
        }

        info!(job_id = %job_id, document = %document.display(), resolution, "Rasterizing pages");

        let cmd = self.build_command(document, out_dir, resolution);
        opts.runner().run(&cmd).await?;

        let pages = Self::collect_pages(out_dir).await?;
        if pages.is_empty() {
            return Err(MediaError::NoPagesRendered(PathBuf::from(document)));
        }
        debug!(job_id = %job_id, pages = pages.len(), "Pages rasterized");
        Ok(pages)
    }
}
