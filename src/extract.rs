//! One-shot entry points.
//!
//! Each call builds a [`Pipeline`] from the given config, runs one request
//! and drops it. Long-running services should build one `Pipeline` and share
//! it instead: building the chain creates HTTP clients.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::orchestrator::Pipeline;
use crate::output::ExtractedText;

/// Extract text from a URL or literal input.
///
/// # Errors
/// [`PipelineError::Exhausted`] when every strategy failed, or a
/// construction error for an invalid config.
pub async fn extract_text(input: impl AsRef<str>, config: &PipelineConfig) -> Result<ExtractedText, PipelineError> {
    let pipeline = Pipeline::new(config.clone())?;
    Ok(pipeline.extract_text(input.as_ref()).await?)
}

/// Blocking wrapper around [`extract_text`] for non-async callers.
///
/// Creates a Tokio runtime internally; do not call from inside one.
pub fn extract_text_sync(input: impl AsRef<str>, config: &PipelineConfig) -> Result<ExtractedText, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create Tokio runtime: {e}")))?
        .block_on(extract_text(input, config))
}

/// Text of an uploaded PDF (a résumé, usually). No network I/O.
pub async fn extract_pdf_bytes(bytes: Vec<u8>, config: &PipelineConfig) -> Result<String, PipelineError> {
    let pipeline = Pipeline::new(config.clone())?;
    Ok(pipeline.extract_pdf(bytes).await?)
}
