//! Contracts for the external tools the conversion pipeline drives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use slidecast_models::{ConversionConfig, JobId};

use crate::command::ToolRunner;
use crate::error::MediaResult;

/// Per-call deadline and cancellation signal.
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl InvocationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Whether the cancel signal has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// A [`ToolRunner`] honouring these options.
    pub fn runner(&self) -> ToolRunner {
        let mut runner = ToolRunner::new();
        if let Some(timeout) = self.timeout {
            runner = runner.with_timeout(timeout);
        }
        if let Some(cancel) = &self.cancel {
            runner = runner.with_cancel(cancel.clone());
        }
        runner
    }
}

/// One rasterized page. `index` is 1-based page order in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub index: u32,
    pub path: PathBuf,
}

impl RenderedPage {
    pub fn new(index: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
        }
    }
}

/// Sort pages into document order.
pub fn sort_pages(pages: &mut [RenderedPage]) {
    pages.sort_by_key(|p| p.index);
}

/// Common surface of every external tool wrapper.
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Short name used in logs and readiness reports.
    fn name(&self) -> &str;

    /// Check the tool can be invoked on this host.
    async fn probe_readiness(&self) -> MediaResult<()>;
}

/// Converts a slide deck into a PDF.
#[async_trait]
pub trait DocumentRenderer: Collaborator {
    /// Render `source` into `out_dir` and return the PDF path.
    async fn render(
        &self,
        job_id: &JobId,
        source: &Path,
        out_dir: &Path,
        opts: &InvocationOptions,
    ) -> MediaResult<PathBuf>;
}

/// Splits a PDF into one image per page.
#[async_trait]
pub trait PageRasterizer: Collaborator {
    /// Rasterize `document` into `out_dir`, `resolution` pixels tall.
    ///
    /// Pages come back sorted by index. An empty result is an error.
    async fn rasterize(
        &self,
        job_id: &JobId,
        document: &Path,
        out_dir: &Path,
        resolution: u32,
        opts: &InvocationOptions,
    ) -> MediaResult<Vec<RenderedPage>>;
}

/// Composes page images into a video file.
#[async_trait]
pub trait VideoEncoder: Collaborator {
    async fn encode(
        &self,
        job_id: &JobId,
        pages: &[RenderedPage],
        output: &Path,
        config: &ConversionConfig,
        opts: &InvocationOptions,
    ) -> MediaResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_pages_numeric_order() {
        let mut pages = vec![
            RenderedPage::new(10, "slide-10.png"),
            RenderedPage::new(2, "slide-02.png"),
            RenderedPage::new(1, "slide-01.png"),
        ];
        sort_pages(&mut pages);
        let order: Vec<u32> = pages.iter().map(|p| p.index).collect();
        assert_eq!(order, vec![1, 2, 10]);
    }

    #[test]
    fn test_options_cancel_state() {
        assert!(!InvocationOptions::new().is_cancelled());

        let (tx, rx) = watch::channel(false);
        let opts = InvocationOptions::new()
            .with_timeout(Duration::from_secs(5))
            .with_cancel(rx);
        assert!(!opts.is_cancelled());
        tx.send(true).unwrap();
        assert!(opts.is_cancelled());
    }
}
