//! # pagetext
//!
//! Turn a link, a pasted block of text or an uploaded PDF into clean plain
//! text for a language model, even when the page is defending itself against
//! automated retrieval.
//!
//! ## Why this crate?
//!
//! Job boards and social sites answer scripts with `403`s, Cloudflare
//! interstitials, `200 OK` pages that say "please enable JavaScript", and
//! `429`s. A single HTTP GET fails on a large share of real links. This crate
//! escalates through progressively more expensive acquisition strategies,
//! checks every response for challenge pages, and only returns text that
//! clears a minimum-length threshold. When nothing works it says *why*, so the
//! caller can ask the user to paste the text instead.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input
//!  │
//!  ├─ 1. Classify   URL-like? otherwise return the cleaned literal text
//!  ├─ 2. Acquire    Direct → Hardened headers → TLS impersonation → Reader → Headless browser
//!  ├─ 3. Detect     403 / 429 / challenge markers / near-empty bodies
//!  ├─ 4. Extract    HTML (DOM walk, boilerplate removal) or PDF (pdfium)
//!  └─ 5. Gate       ≥ min_text_length characters, else escalate
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagetext::{Pipeline, PipelineConfig, remediation_message, DocumentKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(PipelineConfig::from_env()?)?;
//!     match pipeline.extract_text("hh.ru/vacancy/123456").await {
//!         Ok(text) => println!("{}", text.text()),
//!         Err(report) => eprintln!("{}", remediation_message(report.cause, DocumentKind::Vacancy)),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature       | Default | Description |
//! |---------------|---------|-------------|
//! | `cli`         | on      | Enables the `pagetext` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `browser`     | on      | Headless Chromium strategy via `chromiumoxide` |
//! | `impersonate` | off     | Chrome TLS/HTTP2 fingerprint strategy via `wreq` (needs cmake + a C toolchain) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagetext = { version = "0.3", default-features = false, features = ["browser"] }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod messages;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod session;
pub mod strategy;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{ExtractError, FetchError, PipelineError};
pub use extract::{extract_pdf_bytes, extract_text, extract_text_sync};
pub use messages::{extraction_message, remediation_message, report_message, DocumentKind};
pub use orchestrator::Pipeline;
pub use output::{
    AcquisitionAttempt, AttemptOutcome, ExtractedDocument, ExtractedText, FailureCause, FailureReport, FetchRequest,
    RawDocument, StrategyKind,
};
pub use pipeline::pdf::{PdfTextBackend, PdfiumBackend};
pub use pipeline::proxy::{parse_proxy, ProxyEndpoint, ProxyScheme};
pub use pipeline::url::{looks_like_url, normalize_url};
pub use progress::{AcquisitionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{UserGuard, UserLocks};
pub use strategy::{AcquisitionStrategy, SharedStrategy};
