//! File-backed [`TextExtractor`].
//!
//! Every failure is logged and yields an empty string; the pipeline treats
//! empty text as "nothing extracted from this file". Images are the one
//! exception: without a usable [`ImageReader`] they yield a placeholder.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use studyplan_core::TextExtractor;
use tracing::{debug, warn};

use crate::types::{DocumentKind, PdfCommand};

/// Instruction sent along with an image to a vision-capable model.
pub const READ_IMAGE_PROMPT: &str = "Extract all text from this image. Include any to-do items, deadlines, dates, course names, assignments, or tasks. Return only the extracted text, preserving the structure.";

/// Turns an image file into text, typically through a vision model.
pub trait ImageReader {
    fn read_image(&self, path: &Path) -> Result<String>;
}

#[derive(Clone, Default)]
pub struct FileExtractor {
    pdf: Option<PdfCommand>,
    images: Option<Arc<dyn ImageReader>>,
}

impl fmt::Debug for FileExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileExtractor")
            .field("pdf", &self.pdf)
            .field("images", &self.images.is_some())
            .finish()
    }
}

impl FileExtractor {
    /// Extractor without PDF support or image reading.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pdf_command(mut self, cmd: PdfCommand) -> Self {
        self.pdf = Some(cmd);
        self
    }

    pub fn with_image_reader<R: ImageReader + 'static>(mut self, reader: R) -> Self {
        self.images = Some(Arc::new(reader));
        self
    }

    fn read_image(&self, path: &Path) -> String {
        if let Some(reader) = &self.images {
            match reader.read_image(path) {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(file = %path.display(), "read image text");
                    return text;
                }
                Ok(_) => warn!(file = %path.display(), "image reader returned no text"),
                Err(e) => warn!(file = %path.display(), error = %format!("{e:#}"), "image reading failed"),
            }
        }
        image_placeholder(path)
    }

    fn try_extract(&self, path: &Path) -> Result<String> {
        match DocumentKind::from_path(path) {
            DocumentKind::Text => {
                let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            DocumentKind::Pdf => match &self.pdf {
                Some(cmd) => run_pdf_command(cmd, path),
                None => bail!("no PDF command configured"),
            },
            DocumentKind::Image => Ok(self.read_image(path)),
            DocumentKind::Unsupported => bail!("unsupported file type"),
        }
    }
}

fn image_placeholder(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("[Image uploaded: {name}]\nPlease manually describe the content.")
}

fn run_pdf_command(cmd: &PdfCommand, path: &Path) -> Result<String> {
    let out = Command::new(&cmd.program)
        .args(cmd.args_for(path))
        .output()
        .with_context(|| format!("spawn {}", cmd.program))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        bail!("{} exited with {}: {}", cmd.program, out.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

impl TextExtractor for FileExtractor {
    fn extract_text(&self, document: &Path) -> String {
        match self.try_extract(document) {
            Ok(text) => {
                debug!(file = %document.display(), chars = text.len(), "extracted text");
                text
            }
            Err(e) => {
                warn!(file = %document.display(), error = %format!("{e:#}"), "text extraction failed");
                String::new()
            }
        }
    }
}

/// Extract every path and join the non-empty results with a rule.
pub fn combine_documents<X: TextExtractor + ?Sized>(extractor: &X, paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| extractor.extract_text(p))
        .filter(|t| !t.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}
