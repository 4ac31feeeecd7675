//! The acquisition orchestrator: drives the strategy chain for one request.
//!
//! ## State machine
//!
//! ```text
//! Idle ─▶ TryingStrategy(i) ─▶ Classifying ─▶ Success
//!              │    ▲              │
//!              │    └── next i ◀───┘ (blocked / rate limited / too short)
//!              ▼
//!          Exhausted  (all passes done, deadline hit, or unreadable PDF)
//! ```
//!
//! - Each attempt (fetch, detection and extraction together) runs under
//!   `min(its own budget, time left before the umbrella deadline)`. A timeout
//!   or transport error is recorded and the next strategy runs.
//! - A response goes through the block detector. Blocked and rate-limited
//!   documents skip extraction.
//! - Clean documents are extracted and gated. Passing the gate ends the
//!   request.
//! - The chain is repeated up to `retry_count` times, with exponential
//!   backoff between passes (`retry_backoff_ms * 2^(pass-1)`).
//!
//! Strategies for one URL never run in parallel. Independent requests share
//! nothing mutable, so a `Pipeline` behind an `Arc` serves any number of
//! concurrent users.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, timeout, Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{ExtractError, FetchError, PipelineError};
use crate::output::{
    AcquisitionAttempt, AttemptOutcome, ExtractedDocument, ExtractedText, FailureReport, FetchRequest, StrategyKind,
};
use crate::pipeline::content::{clean_text, ContentExtractor};
use crate::pipeline::detect::{self, Verdict};
use crate::pipeline::pdf::{self, PdfTextBackend, PdfiumBackend};
use crate::pipeline::{gate, proxy, url};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::strategy::{self, SharedStrategy};

/// Content acquisition and extraction pipeline.
///
/// Build once at startup and share (`Arc<Pipeline>`) across request handlers.
pub struct Pipeline {
    config: PipelineConfig,
    strategies: Vec<SharedStrategy>,
    extractor: ContentExtractor,
    pdf: Arc<dyn PdfTextBackend>,
    progress: ProgressCallback,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("strategies", &self.strategy_kinds())
            .finish()
    }
}

/// What one attempt produced, before it is written to the ledger.
struct Classified {
    outcome: AttemptOutcome,
    status: Option<u16>,
    document_bytes: Option<usize>,
    content_type: Option<String>,
    detail: Option<String>,
    document: Option<ExtractedDocument>,
    /// Retrying cannot help (unreadable PDF, missing PDF engine).
    terminal: bool,
}

impl Classified {
    fn failed(outcome: AttemptOutcome, detail: String) -> Self {
        Self {
            outcome,
            status: None,
            document_bytes: None,
            content_type: None,
            detail: Some(detail),
            document: None,
            terminal: false,
        }
    }
}

impl Pipeline {
    /// Build the pipeline with the strategy chain described by `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let proxy = proxy::resolve_proxy(config.proxy.as_deref());
        if let Some(p) = &proxy {
            info!("Using proxy {p}");
        }
        let strategies = strategy::build_chain(&config, proxy.as_ref())?;
        Self::with_strategies(config, strategies)
    }

    /// Build the pipeline around an explicit strategy chain.
    ///
    /// The chain is used as given: order is escalation order.
    pub fn with_strategies(config: PipelineConfig, strategies: Vec<SharedStrategy>) -> Result<Self, PipelineError> {
        if strategies.is_empty() {
            return Err(PipelineError::InvalidConfig("strategy chain is empty".into()));
        }
        let pdf: Arc<dyn PdfTextBackend> = match &config.pdf_backend {
            Some(backend) => backend.clone(),
            None => Arc::new(PdfiumBackend::new(config.pdfium_library_path.clone())),
        };
        let progress: ProgressCallback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));

        Ok(Self {
            extractor: ContentExtractor::new(pdf.clone()),
            config,
            strategies,
            pdf,
            progress,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Strategies in chain order.
    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Turn free-form user input into text.
    ///
    /// URL-like input goes through the full acquisition chain; anything else
    /// is returned line-normalised without any network I/O.
    pub async fn extract_text(&self, input: &str) -> Result<ExtractedText, FailureReport> {
        match url::normalize_url(input, self.config.prefer_mobile) {
            None => Ok(ExtractedText::Literal {
                text: clean_text(input),
            }),
            Some(normalized) => {
                let request = FetchRequest::new(normalized, self.config.prefer_mobile);
                self.acquire(&request)
                    .await
                    .map(|document| ExtractedText::Fetched { document })
            }
        }
    }

    /// Text of an uploaded PDF. Single attempt, no retries.
    pub async fn extract_pdf(&self, bytes: Vec<u8>) -> Result<String, ExtractError> {
        pdf::extract_pdf_text(self.pdf.clone(), bytes).await
    }

    /// Run the strategy chain for one request.
    pub async fn acquire(&self, request: &FetchRequest) -> Result<ExtractedDocument, FailureReport> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.config.deadline_secs);
        let mut attempts: Vec<AcquisitionAttempt> = Vec::new();
        let mut deadline_exceeded = false;

        info!(
            "Acquiring {} ({} strategies × {} passes)",
            request.url,
            self.strategies.len(),
            self.config.retry_count
        );
        self.progress.on_request_start(&request.url, self.strategies.len());

        'passes: for pass in 0..self.config.retry_count {
            if pass > 0 {
                let backoff = Duration::from_millis(
                    self.config
                        .retry_backoff_ms
                        .saturating_mul(2u64.saturating_pow(pass - 1)),
                );
                if Instant::now() + backoff >= deadline {
                    deadline_exceeded = true;
                    break;
                }
                warn!(
                    "{}: pass {}/{} after {}ms",
                    request.url,
                    pass + 1,
                    self.config.retry_count,
                    backoff.as_millis()
                );
                sleep(backoff).await;
            }

            for strategy in &self.strategies {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    deadline_exceeded = true;
                    break 'passes;
                }
                let budget = strategy.budget().min(remaining);
                let capped_by_deadline = budget < strategy.budget();

                self.progress.on_attempt_start(&request.url, strategy.kind(), pass);
                let started_at = Utc::now();
                let t0 = Instant::now();

                // Detection and extraction (a large PDF can take a while) share
                // the attempt's budget, so the deadline holds end to end.
                let attempt = async {
                    match strategy.fetch(request).await {
                        Err(e) => Self::classify_fetch_error(e),
                        Ok(doc) => self.classify_document(request, strategy.kind(), doc).await,
                    }
                };
                let classified = match timeout(budget, attempt).await {
                    Ok(classified) => classified,
                    Err(_) => {
                        if capped_by_deadline {
                            deadline_exceeded = true;
                        }
                        Classified::failed(
                            AttemptOutcome::Timeout,
                            format!("no result within {}ms", budget.as_millis()),
                        )
                    }
                };

                let elapsed_ms = t0.elapsed().as_millis() as u64;
                self.log_attempt(request, strategy.kind(), &classified, elapsed_ms);
                self.progress
                    .on_attempt_complete(&request.url, strategy.kind(), classified.outcome, elapsed_ms);

                let terminal = classified.terminal;
                attempts.push(AcquisitionAttempt {
                    strategy: strategy.kind(),
                    pass,
                    started_at,
                    elapsed_ms,
                    outcome: classified.outcome,
                    status: classified.status,
                    document_bytes: classified.document_bytes,
                    content_type: classified.content_type,
                    detail: classified.detail,
                });

                if let Some(document) = classified.document {
                    info!(
                        "{}: {} chars via {} after {} attempts in {}ms",
                        request.url,
                        document.char_count(),
                        document.strategy_used(),
                        attempts.len(),
                        started.elapsed().as_millis()
                    );
                    self.progress.on_request_complete(&request.url, true, attempts.len());
                    return Ok(document);
                }
                if terminal || deadline_exceeded {
                    break 'passes;
                }
            }
        }

        let report = FailureReport::from_attempts(attempts, deadline_exceeded);
        warn!(
            "{}: exhausted after {} attempts in {}ms (cause: {}{})",
            request.url,
            report.attempts.len(),
            started.elapsed().as_millis(),
            report.cause,
            if report.deadline_exceeded { ", deadline reached" } else { "" }
        );
        self.progress
            .on_request_complete(&request.url, false, report.attempts.len());
        Err(report)
    }

    fn classify_fetch_error(err: FetchError) -> Classified {
        let outcome = match err {
            FetchError::Timeout { .. } => AttemptOutcome::Timeout,
            FetchError::Transport { .. } | FetchError::Unavailable { .. } => AttemptOutcome::TransportError,
        };
        Classified::failed(outcome, err.to_string())
    }

    /// Detector → extractor → gate for a document a strategy obtained.
    async fn classify_document(
        &self,
        request: &FetchRequest,
        kind: StrategyKind,
        doc: crate::output::RawDocument,
    ) -> Classified {
        let mut c = Classified {
            outcome: AttemptOutcome::Success,
            status: Some(doc.status),
            document_bytes: Some(doc.body.len()),
            content_type: doc.content_type.clone(),
            detail: None,
            document: None,
            terminal: false,
        };

        match detect::classify(&doc, self.config.min_body_bytes) {
            Verdict::RateLimited => {
                c.outcome = AttemptOutcome::RateLimited;
                c.detail = Some("HTTP 429".into());
                return c;
            }
            Verdict::Blocked(reason) => {
                c.outcome = AttemptOutcome::Blocked;
                c.detail = Some(reason.to_string());
                return c;
            }
            Verdict::Clean => {}
        }

        let text = match self.extractor.extract(&doc).await {
            Ok(text) => text,
            Err(e) => {
                c.outcome = AttemptOutcome::Unparseable;
                c.terminal = e.is_terminal();
                c.detail = Some(e.to_string());
                return c;
            }
        };

        match gate::admit(&request.url, text, kind, self.config.min_text_length) {
            Ok(document) => c.document = Some(document),
            Err(short) => {
                c.outcome = AttemptOutcome::Unparseable;
                c.detail = Some(short.to_string());
            }
        }
        c
    }

    fn log_attempt(&self, request: &FetchRequest, kind: StrategyKind, c: &Classified, elapsed_ms: u64) {
        let detail = c.detail.as_deref().unwrap_or("");
        match c.outcome {
            AttemptOutcome::Success => debug!(
                "{}: {kind} succeeded (HTTP {:?}, {:?} bytes, {elapsed_ms}ms)",
                request.url, c.status, c.document_bytes
            ),
            AttemptOutcome::Unparseable => debug!(
                "{}: {kind} unparseable (HTTP {:?}, {elapsed_ms}ms): {detail}",
                request.url, c.status
            ),
            outcome => warn!("{}: {kind} {outcome:?} after {elapsed_ms}ms: {detail}", request.url),
        }
    }
}
