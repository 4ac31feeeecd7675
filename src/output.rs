//! Request, attempt and result types.
//!
//! Every value here is request-scoped: it is created inside one pipeline
//! invocation and handed to the caller (or dropped) when that invocation
//! finishes. Nothing in this module is shared between concurrent requests.

use chrono::{DateTime, Utc};
use encoding_rs::{Encoding, UTF_8};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// The acquisition strategies, in escalating order of cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Single GET with a realistic browser header set.
    DirectFetch,
    /// Cookie pre-flight, referrer, sec-fetch-* headers and a human-like pause.
    HardenedHeaderFetch,
    /// Transport that reproduces a real Chrome TLS/HTTP2 fingerprint.
    TlsImpersonationFetch,
    /// Public reader service that returns the page pre-rendered as text.
    ReaderServiceFetch,
    /// Real browser engine: navigate, wait for network idle, scroll, read DOM.
    HeadlessBrowserRender,
}

impl StrategyKind {
    /// All strategies in chain order.
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::DirectFetch,
        StrategyKind::HardenedHeaderFetch,
        StrategyKind::TlsImpersonationFetch,
        StrategyKind::ReaderServiceFetch,
        StrategyKind::HeadlessBrowserRender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::DirectFetch => "DirectFetch",
            StrategyKind::HardenedHeaderFetch => "HardenedHeaderFetch",
            StrategyKind::TlsImpersonationFetch => "TlsImpersonationFetch",
            StrategyKind::ReaderServiceFetch => "ReaderServiceFetch",
            StrategyKind::HeadlessBrowserRender => "HeadlessBrowserRender",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user-submitted link, already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub prefer_mobile: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, prefer_mobile: bool) -> Self {
        Self {
            url: url.into(),
            prefer_mobile,
        }
    }
}

/// What a strategy hands back: raw bytes plus enough HTTP context to classify them.
///
/// Strategies never extract text themselves.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// HTTP status (browser renders report the main-frame status, or 200).
    pub status: u16,
    /// `Content-Type` without parameters, lowercased.
    pub content_type: Option<String>,
    /// `charset` parameter of the `Content-Type` header, lowercased.
    pub charset: Option<String>,
    pub body: Vec<u8>,
    /// URL after redirects.
    pub final_url: String,
}

impl RawDocument {
    pub fn new(status: u16, content_type: Option<&str>, body: Vec<u8>, final_url: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.map(normalize_content_type),
            charset: content_type.and_then(charset_param),
            body,
            final_url: final_url.into(),
        }
    }

    /// PDF by declared type or by magic bytes.
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("pdf"))
            || self.body.starts_with(b"%PDF")
    }

    /// Already-textual payloads that need line cleanup but no DOM parsing.
    pub fn is_plain_text(&self) -> bool {
        matches!(
            self.content_type.as_deref(),
            Some("text/plain") | Some("text/markdown") | Some("text/x-markdown")
        )
    }

    /// Body decoded to text.
    ///
    /// Encoding precedence: byte-order mark, then the header `charset`, then
    /// a `<meta>` charset declaration in the first KiB of an HTML body, then
    /// UTF-8.
    pub fn body_text(&self) -> Cow<'_, str> {
        let (text, encoding, had_errors) = self.encoding().decode(&self.body);
        if had_errors {
            debug!("{}: malformed {} sequences replaced", self.final_url, encoding.name());
        }
        text
    }

    /// Declared encoding of the body; UTF-8 when nothing is declared or the
    /// label is unknown.
    pub fn encoding(&self) -> &'static Encoding {
        self.charset
            .as_deref()
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .or_else(|| {
                if self.is_plain_text() {
                    None
                } else {
                    meta_charset(&self.body)
                }
            })
            .unwrap_or(UTF_8)
    }
}

fn normalize_content_type(raw: &str) -> String {
    raw.split(';').next().unwrap_or(raw).trim().to_ascii_lowercase()
}

fn charset_param(raw: &str) -> Option<String> {
    raw.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    })
}

/// Bytes of an HTML body searched for a `<meta>` charset declaration.
const META_PRESCAN_BYTES: usize = 1024;

static RE_META_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([a-z0-9_.:-]+)"#).unwrap());

/// `<meta charset>` or `<meta http-equiv content="...; charset=...">`.
///
/// A UTF-16 declaration in markup is read as UTF-8, as browsers do.
fn meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&body[..body.len().min(META_PRESCAN_BYTES)]);
    let label = RE_META_CHARSET.captures(&head)?.get(1)?.as_str().to_string();
    Encoding::for_label(label.as_bytes()).map(Encoding::output_encoding)
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Document was clean and its text passed the quality gate.
    Success,
    /// 403, another error status, a challenge page, or a near-empty body.
    Blocked,
    /// HTTP 429.
    RateLimited,
    /// DNS / connection / TLS / browser failure.
    TransportError,
    /// The strategy exceeded its budget (or the umbrella deadline cut it short).
    Timeout,
    /// Document obtained, but the extracted text was missing or below threshold.
    Unparseable,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

/// Diagnostic record of one strategy invocation.
///
/// Owned by the orchestrator for the duration of one request; copied into the
/// [`FailureReport`] when the chain is exhausted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionAttempt {
    pub strategy: StrategyKind,
    /// 0-based pass over the strategy chain.
    pub pass: u32,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
    pub status: Option<u16>,
    /// Size of the obtained document, when one was obtained.
    pub document_bytes: Option<usize>,
    pub content_type: Option<String>,
    /// Human-readable reason for a non-success outcome.
    pub detail: Option<String>,
}

/// Terminal artifact of a successful acquisition.
///
/// Only the quality gate constructs these, so `char_count == text.chars().count()`
/// and `char_count >= min_text_length` hold for every value a caller sees.
/// Serialize-only: deserializing would bypass the gate.
///
/// ```compile_fail
/// fn deserializable<T: serde::de::DeserializeOwned>() {}
/// deserializable::<pagetext::ExtractedDocument>();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedDocument {
    source_url: String,
    text: String,
    char_count: usize,
    strategy_used: StrategyKind,
}

impl ExtractedDocument {
    pub(crate) fn new(source_url: impl Into<String>, text: String, strategy_used: StrategyKind) -> Self {
        let char_count = text.chars().count();
        Self {
            source_url: source_url.into(),
            text,
            char_count,
            strategy_used,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn strategy_used(&self) -> StrategyKind {
        self.strategy_used
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Result of [`crate::Pipeline::extract_text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedText {
    /// Input was not URL-like; whitespace-normalized, no network I/O performed.
    Literal { text: String },
    /// Input was a URL and the pipeline acquired it.
    Fetched { document: ExtractedDocument },
}

impl ExtractedText {
    pub fn text(&self) -> &str {
        match self {
            ExtractedText::Literal { text } => text,
            ExtractedText::Fetched { document } => document.text(),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            ExtractedText::Literal { text } => text,
            ExtractedText::Fetched { document } => document.into_text(),
        }
    }

    pub fn document(&self) -> Option<&ExtractedDocument> {
        match self {
            ExtractedText::Literal { .. } => None,
            ExtractedText::Fetched { document } => Some(document),
        }
    }
}

/// Why the whole chain failed; selects the user-facing message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureCause {
    Blocked,
    RateLimited,
    NetworkDown,
    Unparseable,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureCause::Blocked => "blocked",
            FailureCause::RateLimited => "rate limited",
            FailureCause::NetworkDown => "network down",
            FailureCause::Unparseable => "unparseable",
        })
    }
}

/// Surfaced after every strategy (and every retry pass) failed.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("content acquisition exhausted after {} attempts ({cause})", .attempts.len())]
pub struct FailureReport {
    pub attempts: Vec<AcquisitionAttempt>,
    pub cause: FailureCause,
    /// The umbrella deadline stopped the chain before it ran to completion.
    pub deadline_exceeded: bool,
}

impl FailureReport {
    pub(crate) fn from_attempts(attempts: Vec<AcquisitionAttempt>, deadline_exceeded: bool) -> Self {
        let cause = classify_cause(&attempts);
        Self {
            attempts,
            cause,
            deadline_exceeded,
        }
    }
}

/// Priority over outcomes: any `Blocked` wins, then `RateLimited`, then a
/// document that was obtained but unreadable, then transport failures and
/// timeouts (both "network down" from the user's point of view).
pub(crate) fn classify_cause(attempts: &[AcquisitionAttempt]) -> FailureCause {
    let has = |o: AttemptOutcome| attempts.iter().any(|a| a.outcome == o);

    if has(AttemptOutcome::Blocked) {
        FailureCause::Blocked
    } else if has(AttemptOutcome::RateLimited) {
        FailureCause::RateLimited
    } else if has(AttemptOutcome::Unparseable) {
        FailureCause::Unparseable
    } else {
        FailureCause::NetworkDown
    }
}
