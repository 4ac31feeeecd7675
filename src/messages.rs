//! User-facing remediation messages.
//!
//! The chat front-end never looks inside a [`FailureReport`]; it only needs a
//! sentence telling the user what to do next. The wording depends on what the
//! user was sending us, so callers pass a [`DocumentKind`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::output::{FailureCause, FailureReport};

/// What the user is expected to be sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Resume,
    #[default]
    Vacancy,
}

impl DocumentKind {
    fn noun(&self) -> &'static str {
        match self {
            DocumentKind::Resume => "résumé",
            DocumentKind::Vacancy => "vacancy",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "resume" | "résumé" | "cv" => Ok(DocumentKind::Resume),
            "vacancy" | "job" => Ok(DocumentKind::Vacancy),
            other => Err(format!("unknown document kind {other:?} (expected resume or vacancy)")),
        }
    }
}

/// Message for a request that exhausted every strategy.
pub fn remediation_message(cause: FailureCause, kind: DocumentKind) -> String {
    let noun = kind.noun();
    match cause {
        FailureCause::Blocked => format!(
            "This site is blocking automated access, so I couldn't read the {noun}. \
             Please copy the {noun} text and paste it here."
        ),
        FailureCause::RateLimited => format!(
            "The site is limiting requests right now. Try the link again in a few minutes, \
             or paste the {noun} text directly."
        ),
        FailureCause::NetworkDown => format!(
            "The site didn't respond. Check the link, try again later, or paste the {noun} text directly."
        ),
        FailureCause::Unparseable => format!(
            "I opened the page but couldn't find enough readable text for a {noun}. \
             Please paste the {noun} text manually."
        ),
    }
}

/// Convenience for [`remediation_message`] on a whole report.
pub fn report_message(report: &FailureReport, kind: DocumentKind) -> String {
    remediation_message(report.cause, kind)
}

/// Message for an uploaded document that yielded no text.
pub fn extraction_message(err: &ExtractError, kind: DocumentKind) -> String {
    let noun = kind.noun();
    match err {
        ExtractError::UnreadablePdf { .. } => format!(
            "This PDF has no text layer (it looks like a scan). \
             Please send the {noun} as a text-based PDF or paste the text."
        ),
        ExtractError::CorruptPdf { .. } => {
            format!("I couldn't open this PDF. Please re-export the {noun} or paste the text.")
        }
        ExtractError::PdfEngineUnavailable { .. } | ExtractError::Internal(_) => {
            format!("PDF reading is temporarily unavailable. Please paste the {noun} text instead.")
        }
    }
}
