//! Acquisition strategies.
//!
//! Every strategy implements [`AcquisitionStrategy`]: take a request, return
//! the raw document (bytes, status, content type) or a [`FetchError`]. No
//! strategy extracts text, retries, or decides whether a response is a block
//! page; that is the orchestrator's job.
//!
//! ## Chain order
//!
//! ```text
//! DirectFetch ─▶ HardenedHeaderFetch ─▶ TlsImpersonationFetch ─▶ ReaderServiceFetch ─▶ HeadlessBrowserRender
//!   (~100 ms)      (+cookie, +1–3 s)       (Chrome TLS/H2)          (third party)          (seconds)
//! ```
//!
//! Order is fixed and escalates by cost; configuration can only remove links.

pub mod browser;
pub mod direct;
pub mod hardened;
pub mod headers;
pub mod impersonate;
pub mod reader;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{FetchError, PipelineError};
use crate::output::{FetchRequest, RawDocument, StrategyKind};
use crate::pipeline::proxy::ProxyEndpoint;

pub use browser::HeadlessBrowserRender;
pub use direct::DirectFetch;
pub use hardened::HardenedHeaderFetch;
pub use impersonate::TlsImpersonationFetch;
pub use reader::ReaderServiceFetch;

/// Documents larger than this are truncated while reading.
pub const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// One way of obtaining a page.
///
/// Implementations are stateless between calls (per-attempt state such as a
/// cookie jar or browser process is created inside `fetch`), so one instance
/// serves concurrent requests for different users.
#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Hard budget for one `fetch`; the orchestrator cancels the future when
    /// it runs out.
    fn budget(&self) -> Duration;

    async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError>;
}

pub type SharedStrategy = Arc<dyn AcquisitionStrategy>;

/// Build the configured strategy chain in escalation order.
pub fn build_chain(
    config: &PipelineConfig,
    proxy: Option<&ProxyEndpoint>,
) -> Result<Vec<SharedStrategy>, PipelineError> {
    let http_budget = Duration::from_secs(config.strategy_timeout_secs);
    let mut chain: Vec<SharedStrategy> = vec![Arc::new(DirectFetch::new(proxy, http_budget)?)];

    if config.enable_hardened {
        chain.push(Arc::new(HardenedHeaderFetch::new(
            proxy,
            http_budget,
            config.human_delay_ms,
        )));
    }

    if config.enable_impersonate {
        match TlsImpersonationFetch::new(proxy, http_budget) {
            Some(s) => chain.push(Arc::new(s)),
            None => warn!("TLS impersonation requested but the `impersonate` feature is not compiled in; skipping"),
        }
    }

    if config.enable_reader {
        chain.push(Arc::new(ReaderServiceFetch::new(
            &config.reader_base_url,
            proxy,
            http_budget,
        )?));
    }

    if config.enable_browser {
        match HeadlessBrowserRender::new(config, proxy) {
            Some(s) => chain.push(Arc::new(s)),
            None => warn!("Headless render requested but the `browser` feature is not compiled in; skipping"),
        }
    }

    debug!(
        "Strategy chain: {}",
        chain.iter().map(|s| s.kind().as_str()).collect::<Vec<_>>().join(" → ")
    );
    Ok(chain)
}

// ── Shared reqwest plumbing ──────────────────────────────────────────────────

/// reqwest client for one strategy. `jar` gives the client a private cookie store.
pub(crate) fn http_client(
    kind: StrategyKind,
    proxy: Option<&ProxyEndpoint>,
    budget: Duration,
    jar: Option<Arc<Jar>>,
) -> Result<reqwest::Client, PipelineError> {
    let client_err = |e: reqwest::Error| PipelineError::HttpClient {
        strategy: kind,
        detail: e.to_string(),
    };

    let mut builder = reqwest::Client::builder()
        .timeout(budget)
        .connect_timeout(budget.min(Duration::from_secs(10)))
        .redirect(reqwest::redirect::Policy::limited(10));

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    if let Some(p) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(p.to_url()).map_err(client_err)?);
    }
    builder.build().map_err(client_err)
}

/// Read a response into a [`RawDocument`], capping the body at [`MAX_BODY_BYTES`].
pub(crate) async fn read_document(
    kind: StrategyKind,
    mut response: reqwest::Response,
    budget: Duration,
) -> Result<RawDocument, FetchError> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let final_url = response.url().to_string();

    let body = read_capped(&mut response)
        .await
        .map_err(|e| FetchError::from_reqwest(kind, e, budget.as_secs()))?;
    if body.len() == MAX_BODY_BYTES {
        warn!("{kind}: body reached {MAX_BODY_BYTES} bytes, truncated");
    }

    debug!("{kind}: HTTP {status}, {} bytes from {final_url}", body.len());
    Ok(RawDocument::new(status, content_type.as_deref(), body, final_url))
}

/// Stream a response body, stopping at [`MAX_BODY_BYTES`].
pub(crate) async fn read_capped(response: &mut reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() >= MAX_BODY_BYTES {
            body.truncate(MAX_BODY_BYTES);
            break;
        }
    }
    Ok(body)
}

/// `scheme://host[:port]/` of a URL, for cookie pre-flights and referrers.
pub(crate) fn site_root(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(match parsed.port() {
        Some(port) => format!("{}://{}:{}/", parsed.scheme(), host, port),
        None => format!("{}://{}/", parsed.scheme(), host),
    })
}
