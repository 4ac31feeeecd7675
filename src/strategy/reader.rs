//! Reader-service fetch.
//!
//! A public reader proxy (`https://r.jina.ai/<url>` by default) fetches and
//! renders the page on its own infrastructure and returns plain text. Useful
//! when our egress IP is the problem. The target URL leaves our control, which
//! is why the link is off unless configured.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{http_client, read_document, AcquisitionStrategy};
use crate::error::{FetchError, PipelineError};
use crate::output::{FetchRequest, RawDocument, StrategyKind};
use crate::pipeline::proxy::ProxyEndpoint;

/// The reader reports upstream failures inside a 200 body.
static RE_UPSTREAM_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)target url returned error (\d{3})").unwrap());

pub struct ReaderServiceFetch {
    client: reqwest::Client,
    base_url: String,
    budget: Duration,
}

impl ReaderServiceFetch {
    pub fn new(base_url: &str, proxy: Option<&ProxyEndpoint>, budget: Duration) -> Result<Self, PipelineError> {
        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        Ok(Self {
            client: http_client(StrategyKind::ReaderServiceFetch, proxy, budget, None)?,
            base_url,
            budget,
        })
    }

    fn reader_url(&self, target: &str) -> String {
        format!("{}{}", self.base_url, target)
    }
}

#[async_trait]
impl AcquisitionStrategy for ReaderServiceFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ReaderServiceFetch
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
        let url = self.reader_url(&request.url);
        debug!("ReaderServiceFetch: GET {url}");

        let response = self
            .client
            .get(&url)
            .header("accept", "text/plain")
            .header("x-return-format", "text")
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(self.kind(), e, self.budget.as_secs()))?;

        let mut doc = read_document(self.kind(), response, self.budget).await?;

        // Surface the upstream status so the detector sees the real block.
        if doc.status < 400 {
            let upstream = RE_UPSTREAM_STATUS
                .captures(&doc.body_text())
                .and_then(|c| c[1].parse::<u16>().ok());
            if let Some(status) = upstream.filter(|s| *s >= 400) {
                debug!("ReaderServiceFetch: upstream answered {status}");
                doc.status = status;
            }
        }

        // Reader output is text even when the service labels it otherwise.
        if !doc.is_pdf() && doc.content_type.as_deref() != Some("text/markdown") {
            doc.content_type = Some("text/plain".into());
        }
        doc.final_url = request.url.clone();
        Ok(doc)
    }
}
