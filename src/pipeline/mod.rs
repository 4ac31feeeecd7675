//! Leaf stages of the acquisition pipeline.
//!
//! Each submodule implements exactly one step and has no knowledge of the
//! strategy chain, so every stage is testable on fixtures alone.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ url ──▶ [strategy] ──▶ detect ──▶ content ──▶ gate
//!          (canon)   (raw bytes)   (blocked?)  (html/pdf)  (≥ N chars)
//! ```
//!
//! 1. [`url`]    : classify free-form input; canonicalise links
//! 2. [`proxy`]  : parse the configured proxy credential string once
//! 3. [`detect`] : decide whether a response is a real page or a challenge
//! 4. [`content`]: HTML/plain text to normalised text; dispatches PDFs to
//! 5. [`pdf`]    : pdfium text layer, in `spawn_blocking`
//! 6. [`gate`]   : minimum-length check; the only way to build a document

pub mod content;
pub mod detect;
pub mod gate;
pub mod pdf;
pub mod proxy;
pub mod url;
