//! Content extraction: raw document → normalised plain text.
//!
//! ## Why walk the DOM instead of stripping tags with a regex?
//!
//! Job boards wrap the posting in layers of navigation, cookie banners and
//! "similar vacancies" carousels, and those widgets routinely out-weigh the
//! posting itself. Walking the parsed tree lets us drop whole subtrees
//! (`<nav>`, `<form>`, known widget classes) before any text is emitted,
//! which a tag-stripping regex cannot do reliably.
//!
//! ## Routing
//!
//! | Document                              | Path                    |
//! |---------------------------------------|-------------------------|
//! | `application/pdf` or `%PDF` magic     | [`crate::pipeline::pdf`] |
//! | `text/plain`, `text/markdown`         | [`clean_text`] only     |
//! | anything else                         | [`html_to_text`]        |

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use crate::error::ExtractError;
use crate::output::RawDocument;
use crate::pipeline::pdf::{self, PdfTextBackend};

/// Elements whose whole subtree never contributes visible content.
const SKIP_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "canvas", "iframe", "nav", "footer",
    "header", "aside", "form", "button", "input", "select", "textarea", "option", "dialog",
];

/// Sites that embed unrelated listings next to the document, with the class /
/// `data-qa` fragments that mark those widgets.
const BOILERPLATE: &[(&str, &[&str])] = &[
    (
        "hh.ru",
        &[
            "related-vacancies",
            "recommended-vacancies",
            "similar-vacancies",
            "vacancy-serp",
            "vacancy-response-popup",
            "supernova-navi",
        ],
    ),
    (
        "linkedin.com",
        &["similar-jobs", "people-also-viewed", "jobs-premium", "browse-map", "global-nav"],
    ),
    ("superjob.ru", &["similar-vacancies", "vacancy-recommendations"]),
    ("career.habr.com", &["related-vacancies", "similar-vacancies"]),
    ("indeed.com", &["jobsearch-similar", "mosaic-zone"]),
];

/// Carries the document-level state of one extraction.
pub struct ContentExtractor {
    pdf: Arc<dyn PdfTextBackend>,
}

impl ContentExtractor {
    pub fn new(pdf: Arc<dyn PdfTextBackend>) -> Self {
        Self { pdf }
    }

    /// Extract normalised text from any supported document.
    ///
    /// HTML and plain text never fail (they may yield an empty string, which
    /// the quality gate rejects). PDFs fail with an [`ExtractError`] when
    /// they carry no text layer or cannot be parsed.
    pub async fn extract(&self, doc: &RawDocument) -> Result<String, ExtractError> {
        if doc.is_pdf() {
            return pdf::extract_pdf_text(self.pdf.clone(), doc.body.clone()).await;
        }
        let body = doc.body_text();
        let text = if doc.is_plain_text() {
            clean_text(&body)
        } else {
            html_to_text(&body, &doc.final_url)
        };
        debug!("Extracted {} chars from {}", text.chars().count(), doc.final_url);
        Ok(text)
    }
}

// ── Text cleanup ─────────────────────────────────────────────────────────────

static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Normalise line endings, trim every line, collapse runs of blank lines to
/// a single blank line and trim the whole text.
pub fn clean_text(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let trimmed = unified.split('\n').map(str::trim).collect::<Vec<_>>().join("\n");
    RE_BLANK_RUNS.replace_all(&trimmed, "\n\n").trim().to_string()
}

// ── HTML ─────────────────────────────────────────────────────────────────────

/// Visible text of an HTML document, one text node per line, cleaned.
///
/// `source_url` selects the boilerplate patterns for known sites; an
/// unparseable URL just means none apply.
pub fn html_to_text(html: &str, source_url: &str) -> String {
    let document = Html::parse_document(html);
    let patterns = boilerplate_for(source_url);

    let mut chunks = Vec::new();
    collect_text(document.root_element(), patterns, &mut chunks);
    clean_text(&chunks.join("\n"))
}

fn collect_text<'a>(element: ElementRef<'a>, patterns: &[&str], out: &mut Vec<&'a str>) {
    if is_excluded(element, patterns) {
        return;
    }
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let s: &str = text;
            if !s.trim().is_empty() {
                out.push(s);
            }
        } else if let Some(child_el) = ElementRef::wrap(child) {
            collect_text(child_el, patterns, out);
        }
    }
}

fn is_excluded(element: ElementRef<'_>, patterns: &[&str]) -> bool {
    let el = element.value();
    if SKIP_ELEMENTS.contains(&el.name()) {
        return true;
    }
    if el.attr("hidden").is_some() || el.attr("aria-hidden") == Some("true") {
        return true;
    }
    if patterns.is_empty() {
        return false;
    }
    let matches = |value: &str| patterns.iter().any(|p| value.contains(p));
    el.classes().any(matches)
        || el.attr("data-qa").is_some_and(matches)
        || el.id().is_some_and(matches)
}

fn boilerplate_for(source_url: &str) -> &'static [&'static str] {
    let Some(host) = url::Url::parse(source_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return &[];
    };
    BOILERPLATE
        .iter()
        .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{domain}")))
        .map(|(_, patterns)| *patterns)
        .unwrap_or(&[])
}
