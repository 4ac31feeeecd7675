//! Direct fetch: one GET with a realistic browser header set.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::headers::{browser_headers, pick_user_agent};
use super::{http_client, read_document, AcquisitionStrategy};
use crate::error::{FetchError, PipelineError};
use crate::output::{FetchRequest, RawDocument, StrategyKind};
use crate::pipeline::proxy::ProxyEndpoint;

/// Cheapest strategy. One client is built up front and shared; it keeps no
/// cookies, so concurrent requests cannot observe each other.
pub struct DirectFetch {
    client: reqwest::Client,
    budget: Duration,
}

impl DirectFetch {
    pub fn new(proxy: Option<&ProxyEndpoint>, budget: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            client: http_client(StrategyKind::DirectFetch, proxy, budget, None)?,
            budget,
        })
    }
}

#[async_trait]
impl AcquisitionStrategy for DirectFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectFetch
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
        let ua = pick_user_agent(request.prefer_mobile);
        debug!("DirectFetch: GET {} as {ua}", request.url);

        let response = self
            .client
            .get(&request.url)
            .headers(browser_headers(ua))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(self.kind(), e, self.budget.as_secs()))?;

        read_document(self.kind(), response, self.budget).await
    }
}
