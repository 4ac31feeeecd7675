//! Hardened-header fetch: behave like a person arriving at the site.
//!
//! 1. GET the site root with a fresh cookie jar, as if typed into the
//!    address bar, to pick up session and anti-bot cookies.
//! 2. Pause for a human-like, randomised interval.
//! 3. GET the target with the root as referrer, same-origin fetch metadata
//!    and the cookies from step 1.
//!
//! The jar lives for one attempt only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::cookie::Jar;
use tracing::debug;

use super::headers::{navigation_headers, pick_user_agent, Navigation};
use super::{http_client, read_capped, read_document, site_root, AcquisitionStrategy};
use crate::error::FetchError;
use crate::output::{FetchRequest, RawDocument, StrategyKind};
use crate::pipeline::proxy::ProxyEndpoint;

pub struct HardenedHeaderFetch {
    proxy: Option<ProxyEndpoint>,
    budget: Duration,
    delay_ms: (u64, u64),
}

impl HardenedHeaderFetch {
    /// `delay_ms` is the inclusive range of the pause between pre-flight and
    /// real request.
    pub fn new(proxy: Option<&ProxyEndpoint>, budget: Duration, delay_ms: (u64, u64)) -> Self {
        Self {
            proxy: proxy.cloned(),
            budget,
            delay_ms,
        }
    }

    fn human_delay(&self) -> Duration {
        let (min, max) = self.delay_ms;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

#[async_trait]
impl AcquisitionStrategy for HardenedHeaderFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::HardenedHeaderFetch
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
        let kind = self.kind();
        let jar = Arc::new(Jar::default());
        let client = http_client(kind, self.proxy.as_ref(), self.budget, Some(jar))
            .map_err(|e| FetchError::transport(kind, e))?;
        let ua = pick_user_agent(request.prefer_mobile);
        let root = site_root(&request.url);

        if let Some(root) = root.as_deref().filter(|r| *r != request.url) {
            // A failed pre-flight is not fatal; the real request decides.
            match client
                .get(root)
                .headers(navigation_headers(ua, Navigation::Direct, None))
                .send()
                .await
            {
                Ok(mut resp) => {
                    let status = resp.status();
                    // Drain the body so the connection can be reused.
                    let drained = read_capped(&mut resp).await.map(|b| b.len()).unwrap_or(0);
                    debug!("HardenedHeaderFetch: pre-flight {root} → {status} ({drained} bytes)");
                }
                Err(e) => debug!("HardenedHeaderFetch: pre-flight {root} failed: {e}"),
            }
        }

        let pause = self.human_delay();
        debug!("HardenedHeaderFetch: pausing {}ms", pause.as_millis());
        tokio::time::sleep(pause).await;

        let response = client
            .get(&request.url)
            .headers(navigation_headers(ua, Navigation::SameOrigin, root.as_deref()))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(kind, e, self.budget.as_secs()))?;

        read_document(kind, response, self.budget).await
    }
}
