//! Progress-callback trait for per-attempt acquisition events.
//!
//! Inject an [`Arc<dyn AcquisitionProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the strategy chain.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a chat "typing…" indicator, a progress bar or
//! a metrics sink without the library knowing how the host application
//! communicates. The trait is `Send + Sync` because one pipeline instance
//! serves many concurrent requests.
//!
//! # Example
//!
//! ```rust
//! use pagetext::{AcquisitionProgressCallback, AttemptOutcome, PipelineConfig, StrategyKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     blocked: AtomicUsize,
//! }
//!
//! impl AcquisitionProgressCallback for CountingCallback {
//!     fn on_attempt_complete(&self, url: &str, strategy: StrategyKind, outcome: AttemptOutcome, _elapsed_ms: u64) {
//!         if outcome == AttemptOutcome::Blocked {
//!             let n = self.blocked.fetch_add(1, Ordering::SeqCst) + 1;
//!             eprintln!("{url}: {strategy} blocked ({n} so far)");
//!         }
//!     }
//! }
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { blocked: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

use crate::output::{AttemptOutcome, StrategyKind};

/// Called by the orchestrator as it works through one request.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events for different requests may arrive
/// concurrently from different tasks; events for one request are sequential.
pub trait AcquisitionProgressCallback: Send + Sync {
    /// Called once after the URL was normalized, before the first attempt.
    ///
    /// # Arguments
    /// * `url`       : normalized URL
    /// * `strategies`: number of strategies in the chain
    fn on_request_start(&self, url: &str, strategies: usize) {
        let _ = (url, strategies);
    }

    /// Called just before a strategy is invoked.
    ///
    /// # Arguments
    /// * `pass`: 0-based pass over the chain
    fn on_attempt_start(&self, url: &str, strategy: StrategyKind, pass: u32) {
        let _ = (url, strategy, pass);
    }

    /// Called after an attempt was classified.
    fn on_attempt_complete(&self, url: &str, strategy: StrategyKind, outcome: AttemptOutcome, elapsed_ms: u64) {
        let _ = (url, strategy, outcome, elapsed_ms);
    }

    /// Called once when the request finishes.
    ///
    /// # Arguments
    /// * `success` : whether a document passed the quality gate
    /// * `attempts`: number of strategy invocations made
    fn on_request_complete(&self, url: &str, success: bool, attempts: usize) {
        let _ = (url, success, attempts);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl AcquisitionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn AcquisitionProgressCallback>;
