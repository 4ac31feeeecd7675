//! Configuration types for the acquisition pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`] or loaded from the environment with
//! [`PipelineConfig::from_env`]. One config is shared read-only by every
//! concurrent request served by a [`crate::Pipeline`].
//!
//! # Design choice: builder over constructor
//! Most callers only touch the proxy and a timeout or two. The builder lets
//! them set what they care about and rely on documented defaults for the rest,
//! and `build()` is the one place constraints are validated.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::pipeline::pdf::PdfTextBackend;
use crate::progress::ProgressCallback;

/// Configuration for one [`crate::Pipeline`].
///
/// # Example
/// ```rust
/// use pagetext::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .proxy("user:secret@proxy.example.net:8080")
///     .retry_count(2)
///     .enable_browser(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry_count, 2);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Raw proxy credential string. Default: none.
    ///
    /// Parsed once when the pipeline is built. Accepted shapes are listed on
    /// [`crate::pipeline::proxy::parse_proxy`]; an unparseable string is
    /// logged and the pipeline runs without a proxy.
    pub proxy: Option<String>,

    /// Include the hardened-header strategy. Default: true.
    pub enable_hardened: bool,

    /// Include the TLS-fingerprint strategy. Default: true.
    ///
    /// Only effective when the crate is built with the `impersonate` feature;
    /// otherwise the strategy is skipped with a warning.
    pub enable_impersonate: bool,

    /// Include the reader-service strategy. Default: false.
    ///
    /// The page URL is sent to a third party, so this is opt-in.
    pub enable_reader: bool,

    /// Include the headless-browser strategy. Default: true.
    ///
    /// Requires the `browser` feature and a Chrome/Chromium binary.
    pub enable_browser: bool,

    /// Budget for each HTTP-based strategy attempt, in seconds. Default: 20.
    pub strategy_timeout_secs: u64,

    /// Budget for each headless-browser attempt, in seconds. Default: 30.
    ///
    /// Covers browser launch, navigation, network-idle wait and scrolling.
    pub browser_timeout_secs: u64,

    /// Umbrella deadline for one request across all strategies and passes,
    /// in seconds. Default: 60.
    ///
    /// When it is reached the in-flight strategy is cancelled and the request
    /// fails immediately.
    pub deadline_secs: u64,

    /// Full passes over the strategy chain. Default: 3.
    pub retry_count: u32,

    /// Pause before the second pass, doubled for every later one. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Minimum extracted characters for a document to count as real content.
    /// Default: 400.
    pub min_text_length: usize,

    /// Bodies shorter than this many bytes are treated as blocked. Default: 500.
    pub min_body_bytes: usize,

    /// Run the browser without a window. Default: true.
    pub headless: bool,

    /// Rewrite known hosts to their lighter mobile variant and send mobile
    /// user agents. Default: false.
    pub prefer_mobile: bool,

    /// Inclusive range of the human-like pause before the hardened request,
    /// in milliseconds. Default: (1000, 3000).
    pub human_delay_ms: (u64, u64),

    /// Reader service prefix; the target URL is appended. Default: `https://r.jina.ai/`.
    pub reader_base_url: String,

    /// Browser executable. Default: auto-detected.
    pub chrome_executable: Option<PathBuf>,

    /// Path to the pdfium shared library (file or directory). Default: system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// PDF text backend. Default: pdfium.
    pub pdf_backend: Option<Arc<dyn PdfTextBackend>>,

    /// Observer for attempt events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            enable_hardened: true,
            enable_impersonate: true,
            enable_reader: false,
            enable_browser: true,
            strategy_timeout_secs: 20,
            browser_timeout_secs: 30,
            deadline_secs: 60,
            retry_count: 3,
            retry_backoff_ms: 1000,
            min_text_length: 400,
            min_body_bytes: 500,
            headless: true,
            prefer_mobile: false,
            human_delay_ms: (1000, 3000),
            reader_base_url: "https://r.jina.ai/".to_string(),
            chrome_executable: None,
            pdfium_library_path: None,
            pdf_backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("proxy", &self.proxy.as_ref().map(|_| "<configured>"))
            .field("enable_hardened", &self.enable_hardened)
            .field("enable_impersonate", &self.enable_impersonate)
            .field("enable_reader", &self.enable_reader)
            .field("enable_browser", &self.enable_browser)
            .field("strategy_timeout_secs", &self.strategy_timeout_secs)
            .field("browser_timeout_secs", &self.browser_timeout_secs)
            .field("deadline_secs", &self.deadline_secs)
            .field("retry_count", &self.retry_count)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("min_text_length", &self.min_text_length)
            .field("min_body_bytes", &self.min_body_bytes)
            .field("headless", &self.headless)
            .field("prefer_mobile", &self.prefer_mobile)
            .field("human_delay_ms", &self.human_delay_ms)
            .field("reader_base_url", &self.reader_base_url)
            .field("chrome_executable", &self.chrome_executable)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("pdf_backend", &self.pdf_backend.as_ref().map(|_| "<dyn PdfTextBackend>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AcquisitionProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from `PAGETEXT_*` environment variables.
    ///
    /// Unset variables keep their defaults. `PROXY_URL` is honoured when
    /// `PAGETEXT_PROXY` is absent.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::builder_from_lookup(lookup)?.build()
    }

    /// Builder seeded from the environment, for callers (the CLI) that layer
    /// their own overrides on top before building.
    pub fn builder_from_lookup<F>(lookup: F) -> Result<PipelineConfigBuilder, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut b = Self::builder();

        if let Some(proxy) = get("PAGETEXT_PROXY").or_else(|| get("PROXY_URL")) {
            b = b.proxy(proxy);
        }
        if let Some(v) = get("PAGETEXT_ENABLE_HARDENED") {
            b = b.enable_hardened(parse_bool("PAGETEXT_ENABLE_HARDENED", &v)?);
        }
        if let Some(v) = get("PAGETEXT_ENABLE_IMPERSONATE") {
            b = b.enable_impersonate(parse_bool("PAGETEXT_ENABLE_IMPERSONATE", &v)?);
        }
        if let Some(v) = get("PAGETEXT_ENABLE_READER") {
            b = b.enable_reader(parse_bool("PAGETEXT_ENABLE_READER", &v)?);
        }
        if let Some(v) = get("PAGETEXT_ENABLE_BROWSER") {
            b = b.enable_browser(parse_bool("PAGETEXT_ENABLE_BROWSER", &v)?);
        }
        if let Some(v) = get("PAGETEXT_STRATEGY_TIMEOUT") {
            b = b.strategy_timeout_secs(parse_num("PAGETEXT_STRATEGY_TIMEOUT", &v)?);
        }
        if let Some(v) = get("PAGETEXT_BROWSER_TIMEOUT") {
            b = b.browser_timeout_secs(parse_num("PAGETEXT_BROWSER_TIMEOUT", &v)?);
        }
        if let Some(v) = get("PAGETEXT_DEADLINE") {
            b = b.deadline_secs(parse_num("PAGETEXT_DEADLINE", &v)?);
        }
        if let Some(v) = get("PAGETEXT_RETRY_COUNT") {
            b = b.retry_count(parse_num("PAGETEXT_RETRY_COUNT", &v)?);
        }
        if let Some(v) = get("PAGETEXT_MIN_TEXT_LENGTH") {
            b = b.min_text_length(parse_num("PAGETEXT_MIN_TEXT_LENGTH", &v)?);
        }
        if let Some(v) = get("PAGETEXT_HEADLESS") {
            b = b.headless(parse_bool("PAGETEXT_HEADLESS", &v)?);
        }
        if let Some(v) = get("PAGETEXT_PREFER_MOBILE") {
            b = b.prefer_mobile(parse_bool("PAGETEXT_PREFER_MOBILE", &v)?);
        }
        if let Some(v) = get("PAGETEXT_READER_URL") {
            b = b.reader_base_url(v);
        }
        if let Some(v) = get("PAGETEXT_CHROME") {
            b = b.chrome_executable(v);
        }
        if let Some(v) = get("PDFIUM_LIB_PATH") {
            b = b.pdfium_library_path(v);
        }

        Ok(b)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, PipelineError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::InvalidConfig(format!(
            "{key} must be a boolean (true/false), got {raw:?}"
        ))),
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, PipelineError> {
    raw.parse()
        .map_err(|_| PipelineError::InvalidConfig(format!("{key} must be a non-negative integer, got {raw:?}")))
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn proxy(mut self, raw: impl Into<String>) -> Self {
        self.config.proxy = Some(raw.into());
        self
    }

    pub fn enable_hardened(mut self, v: bool) -> Self {
        self.config.enable_hardened = v;
        self
    }

    pub fn enable_impersonate(mut self, v: bool) -> Self {
        self.config.enable_impersonate = v;
        self
    }

    pub fn enable_reader(mut self, v: bool) -> Self {
        self.config.enable_reader = v;
        self
    }

    pub fn enable_browser(mut self, v: bool) -> Self {
        self.config.enable_browser = v;
        self
    }

    pub fn strategy_timeout_secs(mut self, secs: u64) -> Self {
        self.config.strategy_timeout_secs = secs;
        self
    }

    pub fn browser_timeout_secs(mut self, secs: u64) -> Self {
        self.config.browser_timeout_secs = secs;
        self
    }

    pub fn deadline_secs(mut self, secs: u64) -> Self {
        self.config.deadline_secs = secs;
        self
    }

    pub fn retry_count(mut self, n: u32) -> Self {
        self.config.retry_count = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn min_text_length(mut self, n: usize) -> Self {
        self.config.min_text_length = n;
        self
    }

    pub fn min_body_bytes(mut self, n: usize) -> Self {
        self.config.min_body_bytes = n;
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn prefer_mobile(mut self, v: bool) -> Self {
        self.config.prefer_mobile = v;
        self
    }

    pub fn human_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.config.human_delay_ms = (min, max);
        self
    }

    pub fn reader_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.reader_base_url = url.into();
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn pdf_backend(mut self, backend: Arc<dyn PdfTextBackend>) -> Self {
        self.config.pdf_backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.retry_count == 0 {
            return Err(PipelineError::InvalidConfig("retry_count must be ≥ 1".into()));
        }
        if c.strategy_timeout_secs == 0 || c.browser_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "strategy timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.deadline_secs == 0 {
            return Err(PipelineError::InvalidConfig("deadline_secs must be ≥ 1".into()));
        }
        if c.min_text_length == 0 {
            return Err(PipelineError::InvalidConfig("min_text_length must be ≥ 1".into()));
        }
        if c.human_delay_ms.0 > c.human_delay_ms.1 {
            return Err(PipelineError::InvalidConfig(format!(
                "human_delay_ms minimum {} exceeds maximum {}",
                c.human_delay_ms.0, c.human_delay_ms.1
            )));
        }
        if !c.reader_base_url.starts_with("http://") && !c.reader_base_url.starts_with("https://") {
            return Err(PipelineError::InvalidConfig(format!(
                "reader_base_url must be an http(s) URL, got {:?}",
                c.reader_base_url
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::builder().build().unwrap();
        assert_eq!(c.retry_count, 3);
        assert_eq!(c.min_text_length, 400);
        assert!(!c.enable_reader);
        assert!(c.headless);
    }

    #[test]
    fn zero_retry_count_rejected() {
        let err = PipelineConfig::builder().retry_count(0).build().unwrap_err();
        assert!(err.to_string().contains("retry_count"));
    }

    #[test]
    fn inverted_delay_range_rejected() {
        let err = PipelineConfig::builder()
            .human_delay_ms(3000, 1000)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("human_delay_ms"));
    }

    #[test]
    fn env_overrides_defaults() {
        let c = PipelineConfig::from_lookup(lookup(&[
            ("PAGETEXT_RETRY_COUNT", "5"),
            ("PAGETEXT_ENABLE_BROWSER", "false"),
            ("PAGETEXT_HEADLESS", "0"),
            ("PAGETEXT_MIN_TEXT_LENGTH", "200"),
        ]))
        .unwrap();
        assert_eq!(c.retry_count, 5);
        assert!(!c.enable_browser);
        assert!(!c.headless);
        assert_eq!(c.min_text_length, 200);
    }

    #[test]
    fn proxy_url_is_fallback_for_pagetext_proxy() {
        let c = PipelineConfig::from_lookup(lookup(&[("PROXY_URL", "1.2.3.4:8080")])).unwrap();
        assert_eq!(c.proxy.as_deref(), Some("1.2.3.4:8080"));

        let c = PipelineConfig::from_lookup(lookup(&[
            ("PROXY_URL", "1.2.3.4:8080"),
            ("PAGETEXT_PROXY", "proxy.example.net:3128"),
        ]))
        .unwrap();
        assert_eq!(c.proxy.as_deref(), Some("proxy.example.net:3128"));
    }

    #[test]
    fn malformed_env_value_is_invalid_config() {
        let err = PipelineConfig::from_lookup(lookup(&[("PAGETEXT_DEADLINE", "soon")])).unwrap_err();
        assert!(err.to_string().contains("PAGETEXT_DEADLINE"));
    }

    #[test]
    fn debug_hides_proxy_credentials() {
        let c = PipelineConfig::builder()
            .proxy("alice:hunter2@proxy.example.net:8080")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
    }
}
