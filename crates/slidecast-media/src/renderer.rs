//! Deck to PDF rendering through LibreOffice.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use slidecast_models::JobId;

use crate::collaborator::{Collaborator, DocumentRenderer, InvocationOptions};
use crate::command::{probe_tool, ToolCommand};
use crate::error::{MediaError, MediaResult};

/// Renders decks with `soffice --headless --convert-to pdf`.
#[derive(Debug, Clone)]
pub struct LibreOfficeRenderer {
    binary: String,
}

impl Default for LibreOfficeRenderer {
    fn default() -> Self {
        Self::new("soffice")
    }
}

impl LibreOfficeRenderer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Where LibreOffice writes the PDF for `source`.
    pub fn expected_output(source: &Path, out_dir: &Path) -> MediaResult<PathBuf> {
        let stem = source
            .file_stem()
            .ok_or_else(|| MediaError::invalid_input(format!("no file name in {}", source.display())))?;
        Ok(out_dir.join(format!("{}.pdf", stem.to_string_lossy())))
    }

    /// Build the conversion command.
    ///
    /// Each call gets its own profile directory under `out_dir`; concurrent
    /// `soffice` processes sharing one profile block on its lock.
    pub fn build_command(&self, source: &Path, out_dir: &Path) -> MediaResult<ToolCommand> {
        let out_dir = std::path::absolute(out_dir)?;
        let profile = out_dir.join(".lo-profile");
        Ok(ToolCommand::new(&self.binary)
            .arg(format!("-env:UserInstallation=file://{}", profile.display()))
            .args(["--headless", "--convert-to", "pdf", "--outdir"])
            .arg(out_dir.as_os_str())
            .arg(source.as_os_str()))
    }
}

#[async_trait]
impl Collaborator for LibreOfficeRenderer {
    fn name(&self) -> &str {
        "libreoffice"
    }

    async fn probe_readiness(&self) -> MediaResult<()> {
        probe_tool(&self.binary, "--version").await
    }
}

#[async_trait]
impl DocumentRenderer for LibreOfficeRenderer {
    async fn render(
        &self,
        job_id: &JobId,
        source: &Path,
        out_dir: &Path,
        opts: &InvocationOptions,
    ) -> MediaResult<PathBuf> {
        if !source.exists() {
            return Err(MediaError::FileNotFound(source.to_path_buf()));
        }

        info!(job_id = %job_id, source = %source.display(), "Rendering deck to PDF");

        let cmd = self.build_command(source, out_dir)?;
        let output = opts.runner().run(&cmd).await?;

        // soffice exits 0 for some unreadable inputs without writing anything
        let pdf = Self::expected_output(source, out_dir)?;
        if !pdf.exists() {
            return Err(MediaError::tool_failed(
                &self.binary,
                format!("no PDF produced at {}", pdf.display()),
                output.combined(),
                output.exit_code,
            ));
        }

        info!(job_id = %job_id, pdf = %pdf.display(), "Deck rendered");
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_output() {
        let pdf = LibreOfficeRenderer::expected_output(
            Path::new("/data/uploads/abc/input.pptx"),
            Path::new("/data/temp/abc"),
        )
        .unwrap();
        assert_eq!(pdf, PathBuf::from("/data/temp/abc/input.pdf"));

        // Only the last extension is replaced
        let dotted =
            LibreOfficeRenderer::expected_output(Path::new("/in/my.deck.pptx"), Path::new("/out"))
                .unwrap();
        assert_eq!(dotted, PathBuf::from("/out/my.deck.pdf"));
    }

    #[test]
    fn test_command_line() {
        let renderer = LibreOfficeRenderer::default();
        let cmd = renderer
            .build_command(Path::new("/in/deck.pptx"), Path::new("/scratch/job"))
            .unwrap();
        let line = cmd.display();
        assert!(line.starts_with("soffice -env:UserInstallation=file:///scratch/job/.lo-profile"));
        assert!(line.ends_with("--headless --convert-to pdf --outdir /scratch/job /in/deck.pptx"));
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = LibreOfficeRenderer::default()
            .render(
                &JobId::new(),
                &dir.path().join("missing.pptx"),
                dir.path(),
                &InvocationOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("deck.pptx");
        std::fs::write(&source, b"not really a deck").unwrap();

        let err = LibreOfficeRenderer::new("slidecast-no-such-soffice")
            .render(&JobId::new(), &source, dir.path(), &InvocationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound(_)));
    }
}
