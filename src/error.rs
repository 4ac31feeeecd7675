//! Error types for the pagetext library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PipelineError`] is **fatal**: the pipeline cannot be built or run at all
//!   (invalid configuration, HTTP client construction failed). The one-shot
//!   helpers in [`crate::extract`] also fold request failures into it.
//!
//! * [`FetchError`] is **per attempt**: one strategy failed to obtain a
//!   document (connection refused, TLS failure, budget exceeded). Always
//!   absorbed by the orchestrator, which records it on the attempt and moves
//!   on to the next strategy.
//!
//! * [`ExtractError`] is **per document**: a document was obtained but no
//!   usable text could be recovered from it (image-only PDF, corrupt file).
//!
//! The terminal failure of a whole request is not an error enum but a
//! [`crate::output::FailureReport`], which carries the attempt history.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::output::{FailureReport, StrategyKind};

/// Fatal errors returned by pipeline construction.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP client for one of the strategies could not be created.
    #[error("Failed to build HTTP client for {strategy}: {detail}")]
    HttpClient { strategy: StrategyKind, detail: String },

    /// Every strategy failed (one-shot helpers only).
    #[error(transparent)]
    Exhausted(#[from] FailureReport),

    /// An uploaded document yielded no text (one-shot helpers only).
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A single strategy failed to obtain any document.
///
/// Responses that arrive but are challenge pages are not `FetchError`s; the
/// strategy hands them back as documents and the block detector decides.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchError {
    /// DNS, connect, TLS, protocol or body-read failure.
    #[error("{strategy}: transport error: {detail}")]
    Transport { strategy: StrategyKind, detail: String },

    /// The transport itself reported a timeout before the orchestrator's budget ran out.
    #[error("{strategy}: timed out after {secs}s")]
    Timeout { strategy: StrategyKind, secs: u64 },

    /// The strategy cannot run in this environment (no browser binary, etc).
    #[error("{strategy}: unavailable: {reason}")]
    Unavailable { strategy: StrategyKind, reason: String },
}

impl FetchError {
    pub(crate) fn transport(strategy: StrategyKind, err: impl std::fmt::Display) -> Self {
        FetchError::Transport {
            strategy,
            detail: err.to_string(),
        }
    }

    /// Map a reqwest failure, keeping timeouts distinct from other transport errors.
    pub(crate) fn from_reqwest(strategy: StrategyKind, err: reqwest::Error, secs: u64) -> Self {
        if err.is_timeout() {
            FetchError::Timeout { strategy, secs }
        } else {
            FetchError::transport(strategy, err)
        }
    }
}

/// Text could not be recovered from an obtained document.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractError {
    /// The PDF parsed, but carries (almost) no text layer, typically a scan.
    #[error("PDF contains no readable text ({chars} characters extracted)")]
    UnreadablePdf { chars: usize },

    /// The PDF bytes could not be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// The pdfium shared library could not be loaded.
    #[error(
        "PDF engine unavailable: {detail}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfEngineUnavailable { detail: String },

    /// Unexpected internal error (e.g. a blocking task panicked).
    #[error("Internal extraction error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether retrying with another acquisition strategy could change the result.
    ///
    /// An image-only PDF is the real document, and every strategy would fetch
    /// the same bytes; a missing PDF engine does not depend on the transport.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExtractError::UnreadablePdf { .. } | ExtractError::PdfEngineUnavailable { .. }
        )
    }
}
