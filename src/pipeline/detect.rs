//! Block/challenge detection.
//!
//! ## Why is this separate from the strategies?
//!
//! Anti-bot layers rarely answer with an honest error. Cloudflare, DDoS-Guard
//! and friends return `200 OK` with an interstitial, and some sites return a
//! near-empty shell that only renders with JavaScript. Every strategy hands
//! its raw document to [`classify`], and this is the only place that decides
//! whether a syntactically successful response is usable.
//!
//! ## Rule order
//!
//! 1. `403` → blocked
//! 2. `429` → rate limited
//! 3. any other status ≥ 400 → blocked
//! 4. body shorter than `min_body_bytes` → blocked
//! 5. challenge marker (HTML/text only) → blocked: interstitial-only markup
//!    or element ids, a challenge phrase in the visible text, or a captcha
//!    phrase/widget on a page with almost no visible text
//! 6. otherwise clean

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

use crate::output::RawDocument;

/// Detector verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    Blocked(BlockReason),
    RateLimited,
}

impl Verdict {
    pub fn is_clean(&self) -> bool {
        matches!(self, Verdict::Clean)
    }
}

/// Why a document was classified as blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Forbidden,
    ErrorStatus(u16),
    TooShort { bytes: usize },
    ChallengeMarker(&'static str),
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Forbidden => write!(f, "HTTP 403"),
            BlockReason::ErrorStatus(s) => write!(f, "HTTP {s}"),
            BlockReason::TooShort { bytes } => write!(f, "body too short ({bytes} bytes)"),
            BlockReason::ChallengeMarker(m) => write!(f, "challenge marker {m:?}"),
        }
    }
}

/// Phrases that only appear in the title or visible text of interstitials
/// and block pages.
///
/// Vendor names ("cloudflare", "datadome", "perimeterx") are absent: genuine
/// pages load those vendors' scripts, and script URLs are not visible text.
pub const CHALLENGE_PHRASES: &[&str] = &[
    "are you human",
    "are you a robot",
    "verify you are human",
    "checking your browser",
    "just a moment...",
    "press & hold to confirm",
    "incapsula incident",
    "sucuri website firewall",
    "attention required!",
    "enable javascript and cookies to continue",
    "вы не робот",
];

/// Phrases that also turn up on real pages ("protected by reCAPTCHA" in a
/// footer), so they only count on a page with little visible text.
pub const SHORT_PAGE_PHRASES: &[&str] = &[
    "captcha",
    "access denied",
    "request unsuccessful",
    "ddos-guard",
    "доступ ограничен",
];

/// Markup fragments served only by interstitials, matched against the raw
/// lowercased body. Cloudflare's bot-management script
/// (`/cdn-cgi/challenge-platform/scripts/jsd/...`) runs on genuine pages, so
/// only the challenge orchestrator path is listed.
pub const INTERSTITIAL_MARKUP: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "/cdn-cgi/challenge-platform/h/",
    "geo.captcha-delivery.com",
    "captcha-delivery.com/captcha",
];

/// Element ids that only interstitials use.
pub const INTERSTITIAL_IDS: &[&str] = &["px-captcha", "cf-challenge-running", "challenge-form"];

/// Widget markup that embeds a captcha; a block page when little else is there.
pub const SHORT_PAGE_MARKUP: &[&str] = &["g-recaptcha", "h-captcha", "cf-turnstile"];

/// Pages with at most this many visible characters are interstitial-sized.
pub const INTERSTITIAL_MAX_CHARS: usize = 1500;

/// Text inside these elements never renders.
const NON_VISIBLE: &[&str] = &["script", "style", "noscript", "template"];

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Classify a fetched document.
pub fn classify(doc: &RawDocument, min_body_bytes: usize) -> Verdict {
    match doc.status {
        403 => return Verdict::Blocked(BlockReason::Forbidden),
        429 => return Verdict::RateLimited,
        s if s >= 400 => return Verdict::Blocked(BlockReason::ErrorStatus(s)),
        _ => {}
    }

    if doc.body.len() < min_body_bytes {
        return Verdict::Blocked(BlockReason::TooShort {
            bytes: doc.body.len(),
        });
    }

    if doc.is_pdf() {
        return Verdict::Clean;
    }

    let body = doc.body_text();
    let marker = if doc.is_plain_text() {
        find_text_marker(&body)
    } else {
        find_html_marker(&body)
    };
    match marker {
        Some(marker) => Verdict::Blocked(BlockReason::ChallengeMarker(marker)),
        None => Verdict::Clean,
    }
}

/// First challenge marker in an HTML document.
///
/// Raw markup is only searched for interstitial-specific fragments; phrases
/// are searched in the title and visible text.
pub fn find_html_marker(html: &str) -> Option<&'static str> {
    let markup = html.to_lowercase();
    if let Some(m) = INTERSTITIAL_MARKUP.iter().copied().find(|m| markup.contains(m)) {
        return Some(m);
    }

    let dom = Html::parse_document(html);
    let interstitial_id = dom.tree.nodes().find_map(|node| {
        let id = node.value().as_element()?.id()?;
        INTERSTITIAL_IDS.iter().copied().find(|known| known.eq_ignore_ascii_case(id))
    });
    if interstitial_id.is_some() {
        return interstitial_id;
    }

    let text = normalize(&visible_text(&dom));
    find_phrase(&text).or_else(|| {
        is_short(&text)
            .then(|| SHORT_PAGE_MARKUP.iter().copied().find(|m| markup.contains(m)))
            .flatten()
    })
}

/// First challenge phrase in already-textual content (reader output, plain text).
pub fn find_text_marker(text: &str) -> Option<&'static str> {
    find_phrase(&normalize(text))
}

fn find_phrase(text: &str) -> Option<&'static str> {
    CHALLENGE_PHRASES
        .iter()
        .copied()
        .find(|p| text.contains(p))
        .or_else(|| {
            is_short(text)
                .then(|| SHORT_PAGE_PHRASES.iter().copied().find(|p| text.contains(p)))
                .flatten()
        })
}

fn normalize(text: &str) -> String {
    RE_WHITESPACE.replace_all(text, " ").trim().to_lowercase()
}

fn is_short(text: &str) -> bool {
    text.chars().count() <= INTERSTITIAL_MAX_CHARS
}

/// Title plus every text node a browser would render.
fn visible_text(dom: &Html) -> String {
    let mut out = String::new();
    for node in dom.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| NON_VISIBLE.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    out
}
