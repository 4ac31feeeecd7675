//! Orchestrator integration tests.
//!
//! Every strategy here is a scripted fake, so these tests need no network,
//! no Chromium and no pdfium. Time-sensitive tests run on Tokio's paused
//! clock.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use pagetext::{
    AcquisitionProgressCallback, AcquisitionStrategy, AttemptOutcome, ExtractError, ExtractedText, FailureCause,
    FetchError, FetchRequest, PdfTextBackend, Pipeline, PipelineConfig, PipelineConfigBuilder, RawDocument,
    SharedStrategy, StrategyKind,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

type Respond = Box<dyn Fn(usize) -> Result<RawDocument, FetchError> + Send + Sync>;

/// A strategy that answers from a script and counts its invocations.
struct Scripted {
    kind: StrategyKind,
    budget: Duration,
    /// Simulated latency before answering.
    latency: Duration,
    respond: Respond,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(
        kind: StrategyKind,
        respond: impl Fn(usize) -> Result<RawDocument, FetchError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            budget: Duration::from_secs(20),
            latency: Duration::ZERO,
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
        })
    }

    /// A strategy that never answers within any budget.
    fn hanging(kind: StrategyKind, budget: Duration) -> Arc<Self> {
        Arc::new(Self {
            kind,
            budget,
            latency: Duration::from_secs(3600),
            respond: Box::new(move |_| Err(FetchError::Timeout { strategy: kind, secs: 3600 })),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AcquisitionStrategy for Scripted {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn fetch(&self, _request: &FetchRequest) -> Result<RawDocument, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(n)
    }
}

/// PDF backend that returns fixed page texts and counts calls.
struct FakePdf {
    pages: Vec<String>,
    calls: AtomicUsize,
}

impl FakePdf {
    fn new(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl PdfTextBackend for FakePdf {
    fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pages.clone())
    }
}

fn html_page(text: &str) -> RawDocument {
    let html = format!("<html><head><title>t</title></head><body><p>{text}</p></body></html>");
    RawDocument::new(200, Some("text/html; charset=utf-8"), html.into_bytes(), "https://example.com/job/1")
}

fn status_page(status: u16) -> RawDocument {
    let html = format!("<html><body><h1>Error {status}</h1>{}</body></html>", " ".repeat(600));
    RawDocument::new(status, Some("text/html"), html.into_bytes(), "https://example.com/job/1")
}

fn challenge_page() -> RawDocument {
    let html = format!(
        "<html><head><title>Just a moment...</title></head><body>\
         <div id=\"cf-wrapper\">Checking your browser before accessing example.com.</div>{}\
         </body></html>",
        "<!-- padding -->".repeat(40)
    );
    RawDocument::new(200, Some("text/html"), html.into_bytes(), "https://example.com/job/1")
}

fn config() -> PipelineConfigBuilder {
    PipelineConfig::builder().retry_backoff_ms(0)
}

fn pipeline(builder: PipelineConfigBuilder, chain: &[Arc<Scripted>]) -> Pipeline {
    let strategies: Vec<SharedStrategy> = chain.iter().map(|s| s.clone() as SharedStrategy).collect();
    Pipeline::with_strategies(builder.build().unwrap(), strategies).unwrap()
}

// ── Happy paths ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_direct_fetch_success_stops_the_chain() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(html_page(&"Rust job".repeat(75))));
    let browser = Scripted::new(StrategyKind::HeadlessBrowserRender, |_| Ok(html_page("unused")));
    let p = pipeline(config(), &[direct.clone(), browser.clone()]);

    let out = p.extract_text("https://example.com/job/1").await.unwrap();
    let doc = out.document().expect("fetched document");

    assert_eq!(doc.char_count(), 600);
    assert_eq!(doc.strategy_used(), StrategyKind::DirectFetch);
    assert_eq!(doc.source_url(), "https://example.com/job/1");
    assert_eq!(direct.calls(), 1);
    assert_eq!(browser.calls(), 0);
}

#[tokio::test]
async fn test_escalates_past_forbidden_and_challenge() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(status_page(403)));
    let hardened = Scripted::new(StrategyKind::HardenedHeaderFetch, |_| Ok(challenge_page()));
    let browser = Scripted::new(StrategyKind::HeadlessBrowserRender, |_| {
        Ok(html_page(&"Senior Rust engineer. ".repeat(60)))
    });
    let p = pipeline(config(), &[direct.clone(), hardened.clone(), browser.clone()]);

    let doc = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap();

    assert_eq!(doc.strategy_used(), StrategyKind::HeadlessBrowserRender);
    assert!(doc.char_count() >= 1000);
    assert_eq!((direct.calls(), hardened.calls(), browser.calls()), (1, 1, 1));
}

#[tokio::test]
async fn test_second_pass_can_succeed() {
    // Fails on the first call, succeeds on the second.
    let direct = Scripted::new(StrategyKind::DirectFetch, |n| {
        if n == 0 {
            Err(FetchError::Transport {
                strategy: StrategyKind::DirectFetch,
                detail: "connection reset".into(),
            })
        } else {
            Ok(html_page(&"Rust job".repeat(75)))
        }
    });
    let p = pipeline(config().retry_count(2), &[direct.clone()]);

    let doc = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap();
    assert_eq!(doc.strategy_used(), StrategyKind::DirectFetch);
    assert_eq!(direct.calls(), 2);
}

#[tokio::test]
async fn test_literal_input_makes_no_calls() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(html_page("unused")));
    let p = pipeline(config(), &[direct.clone()]);

    let out = p
        .extract_text("Looking for a Rust developer.\r\n\r\n\r\n\r\nRemote, full time.  ")
        .await
        .unwrap();

    assert_eq!(
        out,
        ExtractedText::Literal {
            text: "Looking for a Rust developer.\n\nRemote, full time.".into()
        }
    );
    assert_eq!(direct.calls(), 0);
}

#[tokio::test]
async fn test_bare_domain_is_fetched_over_https() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));

    struct Recording(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl AcquisitionStrategy for Recording {
        fn kind(&self) -> StrategyKind {
            StrategyKind::DirectFetch
        }
        fn budget(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
            self.0.lock().unwrap().push(request.url.clone());
            Ok(html_page(&"Rust job".repeat(75)))
        }
    }

    let p = Pipeline::with_strategies(
        config().build().unwrap(),
        vec![Arc::new(Recording(seen.clone())) as SharedStrategy],
    )
    .unwrap();

    p.extract_text("hh.ru/vacancy/123").await.unwrap();
    assert_eq!(seen.lock().unwrap().as_slice(), ["https://hh.ru/vacancy/123"]);
}

#[tokio::test]
async fn test_same_input_gives_same_text() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| {
        Ok(html_page(&"Backend developer, Rust and Postgres. ".repeat(20)))
    });
    let p = pipeline(config(), &[direct]);

    let a = p.extract_text("https://example.com/job/1").await.unwrap();
    let b = p.extract_text("https://example.com/job/1").await.unwrap();
    assert_eq!(a.text(), b.text());
}

#[tokio::test]
async fn test_repeat_requests_pick_the_same_strategy() {
    let cb = Arc::new(Counting::default());
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(status_page(403)));
    let hardened = Scripted::new(StrategyKind::HardenedHeaderFetch, |_| {
        Ok(html_page(&"Backend developer, Rust and Postgres. ".repeat(20)))
    });
    let browser = Scripted::new(StrategyKind::HeadlessBrowserRender, |_| {
        Ok(html_page(&"Rendered vacancy text. ".repeat(40)))
    });
    let p = pipeline(
        config().progress_callback(cb.clone()),
        &[direct.clone(), hardened.clone(), browser.clone()],
    );

    let a = p.extract_text("https://example.com/job/1").await.unwrap();
    let b = p.extract_text("https://example.com/job/1").await.unwrap();

    assert_eq!(a, b);
    for out in [&a, &b] {
        assert_eq!(out.document().unwrap().strategy_used(), StrategyKind::HardenedHeaderFetch);
    }
    assert_eq!(cb.finished.lock().unwrap().as_slice(), [(true, 2), (true, 2)]);
    assert_eq!((direct.calls(), hardened.calls(), browser.calls()), (2, 2, 0));
}

// ── Quality gate ─────────────────────────────────────────────────────────────

fn plain_text(chars: usize) -> RawDocument {
    RawDocument::new(200, Some("text/plain"), "a".repeat(chars).into_bytes(), "https://example.com/job/1")
}

#[tokio::test]
async fn test_gate_rejects_399_chars() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(plain_text(399)));
    let p = pipeline(config().min_body_bytes(100).retry_count(1), &[direct]);

    let report = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap_err();
    assert_eq!(report.cause, FailureCause::Unparseable);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::Unparseable);
}

#[tokio::test]
async fn test_gate_accepts_400_chars() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(plain_text(400)));
    let p = pipeline(config().min_body_bytes(100).retry_count(1), &[direct]);

    let doc = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap();
    assert_eq!(doc.char_count(), 400);
}

#[tokio::test]
async fn test_near_empty_body_counts_as_blocked() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| {
        Ok(RawDocument::new(200, Some("text/html"), b"<html></html>".to_vec(), "https://example.com/"))
    });
    let p = pipeline(config().retry_count(1), &[direct]);

    let report = p
        .acquire(&FetchRequest::new("https://example.com/", false))
        .await
        .unwrap_err();
    assert_eq!(report.cause, FailureCause::Blocked);
}

// ── Failure classification ───────────────────────────────────────────────────

#[tokio::test]
async fn test_all_blocked_reports_blocked_with_bounded_attempts() {
    let chain = [
        Scripted::new(StrategyKind::DirectFetch, |_| Ok(status_page(403))),
        Scripted::new(StrategyKind::HardenedHeaderFetch, |_| Ok(challenge_page())),
        Scripted::new(StrategyKind::HeadlessBrowserRender, |_| Ok(status_page(403))),
    ];
    let p = pipeline(config().retry_count(3), &chain);

    let report = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap_err();

    assert_eq!(report.cause, FailureCause::Blocked);
    assert!(!report.deadline_exceeded);
    assert_eq!(report.attempts.len(), 9);
    assert!(report.attempts.iter().all(|a| a.outcome == AttemptOutcome::Blocked));
    assert_eq!(report.attempts.last().map(|a| a.pass), Some(2));
    for s in &chain {
        assert_eq!(s.calls(), 3);
    }
}

#[tokio::test]
async fn test_rate_limited() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(status_page(429)));
    let hardened = Scripted::new(StrategyKind::HardenedHeaderFetch, |_| {
        Err(FetchError::Transport {
            strategy: StrategyKind::HardenedHeaderFetch,
            detail: "connection refused".into(),
        })
    });
    let p = pipeline(config().retry_count(1), &[direct, hardened]);

    let report = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap_err();
    assert_eq!(report.cause, FailureCause::RateLimited);
    assert_eq!(report.attempts[0].status, Some(429));
    assert_eq!(report.attempts[1].outcome, AttemptOutcome::TransportError);
}

#[tokio::test]
async fn test_transport_errors_only_is_network_down() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| {
        Err(FetchError::Transport {
            strategy: StrategyKind::DirectFetch,
            detail: "dns error".into(),
        })
    });
    let p = pipeline(config().retry_count(2), &[direct.clone()]);

    let report = p.extract_text("https://nowhere.invalid/").await.unwrap_err();
    assert_eq!(report.cause, FailureCause::NetworkDown);
    assert_eq!(direct.calls(), 2);
}

#[tokio::test]
async fn test_scanned_pdf_is_unparseable_and_stops_early() {
    let pdf = FakePdf::new(&["", "   "]);
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(4096, b' ');
        Ok(RawDocument::new(200, Some("application/pdf"), body, "https://example.com/cv.pdf"))
    });
    let browser = Scripted::new(StrategyKind::HeadlessBrowserRender, |_| Ok(html_page("unused")));
    let p = pipeline(
        config().retry_count(3).pdf_backend(pdf.clone()),
        &[direct.clone(), browser.clone()],
    );

    let report = p.extract_text("https://example.com/cv.pdf").await.unwrap_err();

    assert_eq!(report.cause, FailureCause::Unparseable);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(direct.calls(), 1);
    assert_eq!(browser.calls(), 0);
    assert_eq!(pdf.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fetched_pdf_with_text_layer() {
    let pdf = FakePdf::new(&[&"Experience: eight years of Rust. ".repeat(10), &"Education: MSc. ".repeat(10)]);
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(4096, b' ');
        Ok(RawDocument::new(200, Some("application/pdf"), body, "https://example.com/cv.pdf"))
    });
    let p = pipeline(config().pdf_backend(pdf), &[direct]);

    let out = p.extract_text("https://example.com/cv.pdf").await.unwrap();
    assert!(out.text().starts_with("Experience:"));
    assert!(out.text().contains("\n\nEducation:"));
}

#[tokio::test]
async fn test_uploaded_pdf_uses_the_backend_directly() {
    let pdf = FakePdf::new(&["Jane Doe, Rust developer. Ten years building backend services."]);
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(html_page("unused")));
    let p = pipeline(config().pdf_backend(pdf), &[direct.clone()]);

    let text = p.extract_pdf(b"%PDF-1.7".to_vec()).await.unwrap();
    assert!(text.starts_with("Jane Doe"));
    assert_eq!(direct.calls(), 0);

    let blank = FakePdf::new(&["  "]);
    let p = pipeline(config().pdf_backend(blank), &[direct]);
    let err = p.extract_pdf(b"%PDF-1.7".to_vec()).await.unwrap_err();
    assert!(matches!(err, ExtractError::UnreadablePdf { chars: 0 }));
}

/// Blocks its thread like pdfium on a very large file.
struct SlowPdf(Duration);

impl PdfTextBackend for SlowPdf {
    fn page_texts(&self, _bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        std::thread::sleep(self.0);
        Ok(vec!["Experience: eight years of Rust. ".repeat(20)])
    }
}

// Real clock: the paused clock does not advance while a blocking task runs.
#[tokio::test]
async fn test_deadline_covers_pdf_extraction() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| {
        let mut body = b"%PDF-1.7\n".to_vec();
        body.resize(4096, b' ');
        Ok(RawDocument::new(200, Some("application/pdf"), body, "https://example.com/cv.pdf"))
    });
    let browser = Scripted::new(StrategyKind::HeadlessBrowserRender, |_| Ok(html_page("unused")));
    let p = pipeline(
        config()
            .deadline_secs(1)
            .pdf_backend(Arc::new(SlowPdf(Duration::from_secs(3)))),
        &[direct.clone(), browser.clone()],
    );

    let started = std::time::Instant::now();
    let report = p.extract_text("https://example.com/cv.pdf").await.unwrap_err();

    assert!(started.elapsed() < Duration::from_millis(2500), "took {:?}", started.elapsed());
    assert!(report.deadline_exceeded);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::Timeout);
    assert_eq!(browser.calls(), 0);
}

#[test]
fn test_empty_chain_is_rejected() {
    let err = Pipeline::with_strategies(config().build().unwrap(), Vec::new()).unwrap_err();
    assert!(err.to_string().contains("empty"));
}

// ── Time budgets (paused clock) ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_strategy_timeout_moves_on() {
    let slow = Scripted::hanging(StrategyKind::DirectFetch, Duration::from_secs(5));
    let fast = Scripted::new(StrategyKind::HardenedHeaderFetch, |_| Ok(html_page(&"Rust job".repeat(75))));
    let p = pipeline(config(), &[slow.clone(), fast.clone()]);

    let started = tokio::time::Instant::now();
    let doc = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap();

    assert_eq!(doc.strategy_used(), StrategyKind::HardenedHeaderFetch);
    assert_eq!(slow.calls(), 1);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_stops_the_chain() {
    let a = Scripted::hanging(StrategyKind::DirectFetch, Duration::from_secs(20));
    let b = Scripted::hanging(StrategyKind::HardenedHeaderFetch, Duration::from_secs(20));
    let c = Scripted::new(StrategyKind::HeadlessBrowserRender, |_| Ok(html_page("unused")));
    let p = pipeline(config().deadline_secs(30).retry_count(3), &[a.clone(), b.clone(), c.clone()]);

    let started = tokio::time::Instant::now();
    let report = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap_err();

    assert!(report.deadline_exceeded);
    assert_eq!(report.cause, FailureCause::NetworkDown);
    assert_eq!(report.attempts.len(), 2);
    assert!(report.attempts.iter().all(|a| a.outcome == AttemptOutcome::Timeout));
    assert_eq!(c.calls(), 0);
    assert!(started.elapsed() <= Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_between_passes() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(status_page(503)));
    let p = pipeline(
        PipelineConfig::builder().retry_count(3).retry_backoff_ms(1000).deadline_secs(60),
        &[direct.clone()],
    );

    let started = tokio::time::Instant::now();
    let report = p
        .acquire(&FetchRequest::new("https://example.com/job/1", false))
        .await
        .unwrap_err();

    // 1 s before pass 2, 2 s before pass 3.
    assert_eq!(direct.calls(), 3);
    assert_eq!(report.cause, FailureCause::Blocked);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_secs(4));
}

// ── Progress callback ────────────────────────────────────────────────────────

#[derive(Default)]
struct Counting {
    requests: AtomicUsize,
    starts: AtomicUsize,
    completes: AtomicUsize,
    finished: Mutex<Vec<(bool, usize)>>,
}

impl AcquisitionProgressCallback for Counting {
    fn on_request_start(&self, _url: &str, _strategies: usize) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
    fn on_attempt_start(&self, _url: &str, _strategy: StrategyKind, _pass: u32) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_attempt_complete(&self, _url: &str, _strategy: StrategyKind, _outcome: AttemptOutcome, _elapsed_ms: u64) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_request_complete(&self, _url: &str, success: bool, attempts: usize) {
        self.finished.lock().unwrap().push((success, attempts));
    }
}

#[tokio::test]
async fn test_progress_callback_sees_every_attempt() {
    let cb = Arc::new(Counting::default());
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(status_page(403)));
    let hardened = Scripted::new(StrategyKind::HardenedHeaderFetch, |_| Ok(html_page(&"Rust job".repeat(75))));
    let p = pipeline(config().progress_callback(cb.clone()), &[direct, hardened]);

    p.extract_text("https://example.com/job/1").await.unwrap();

    assert_eq!(cb.requests.load(Ordering::SeqCst), 1);
    assert_eq!(cb.starts.load(Ordering::SeqCst), 2);
    assert_eq!(cb.completes.load(Ordering::SeqCst), 2);
    assert_eq!(cb.finished.lock().unwrap().as_slice(), [(true, 2)]);
}

#[tokio::test]
async fn test_progress_callback_not_called_for_literal_text() {
    let cb = Arc::new(Counting::default());
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(html_page("unused")));
    let p = pipeline(config().progress_callback(cb.clone()), &[direct]);

    p.extract_text("just some words").await.unwrap();
    assert_eq!(cb.requests.load(Ordering::SeqCst), 0);
}

// ── Concurrency ──────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_pipeline_serves_concurrent_requests() {
    let direct = Scripted::new(StrategyKind::DirectFetch, |_| Ok(html_page(&"Rust job".repeat(75))));
    let p = Arc::new(pipeline(config(), &[direct.clone()]));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.extract_text(&format!("https://example.com/job/{i}")).await })
        })
        .collect();
    for h in handles {
        assert!(h.await.unwrap().is_ok());
    }
    assert_eq!(direct.calls(), 8);
}
