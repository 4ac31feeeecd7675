//! PDF text extraction via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is CPU-bound and keeps
//! thread-local state. `tokio::task::spawn_blocking` moves the work onto the
//! blocking pool so Tokio worker threads never stall on a large document.
//!
//! ## Why a backend trait?
//!
//! pdfium is a shared library that may be missing on a given host. The
//! extractor only needs "bytes → page texts", so that is the seam: production
//! uses [`PdfiumBackend`], tests inject a fake.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::pipeline::content::clean_text;

/// A PDF yielding fewer characters than this is treated as image-only.
pub const MIN_PDF_CHARS: usize = 50;

/// Turns PDF bytes into one string per page.
///
/// Called from the blocking pool; implementations may block.
pub trait PdfTextBackend: Send + Sync {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// pdfium-backed extraction. Binds the library on every call.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    /// `library_path` may name the library file or the directory holding it;
    /// `None` uses the system library.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, ExtractError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(library_file(path)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExtractError::PdfEngineUnavailable {
            detail: format!("{e:?}"),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

impl PdfTextBackend for PdfiumBackend {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| ExtractError::CorruptPdf {
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let mut texts = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => texts.push(text.all()),
                Err(e) => warn!("Skipping page {}: no text layer ({e:?})", idx + 1),
            }
        }
        Ok(texts)
    }
}

/// Extract, join and clean the text of a PDF.
///
/// Pages are joined with a blank line. Fails with
/// [`ExtractError::UnreadablePdf`] below [`MIN_PDF_CHARS`] characters.
pub async fn extract_pdf_text(backend: Arc<dyn PdfTextBackend>, bytes: Vec<u8>) -> Result<String, ExtractError> {
    let pages = tokio::task::spawn_blocking(move || backend.page_texts(&bytes))
        .await
        .map_err(|e| ExtractError::Internal(format!("PDF task panicked: {e}")))??;

    let joined = pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let text = clean_text(&joined);

    let chars = text.chars().count();
    if chars < MIN_PDF_CHARS {
        warn!("PDF yielded only {chars} characters; treating as unreadable");
        return Err(ExtractError::UnreadablePdf { chars });
    }
    debug!("Extracted {chars} characters from {} PDF pages", pages.len());
    Ok(text)
}
