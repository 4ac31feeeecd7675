//! Headless-browser render.
//!
//! Launches Chromium through the DevTools protocol, navigates, waits for the
//! network to go quiet, scrolls to trigger lazy loading and returns the
//! rendered DOM. It costs seconds rather than milliseconds, so it is the last
//! link in the chain.
//!
//! ## Process lifetime
//!
//! Each attempt gets its own browser process and a throw-away profile
//! directory. Both are owned by a `BrowserSession`, and every exit path
//! releases them:
//!
//! - success, block page or error: `close()` shuts the browser down politely
//! - timeout (the orchestrator drops the future): `Drop` aborts the CDP
//!   handler tasks and the dropped `Browser` kills its child process, while
//!   the `TempDir` removes the profile

use std::path::PathBuf;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::pipeline::proxy::ProxyEndpoint;

/// Launch flags that remove the most obvious automation tells.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
const STEALTH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--no-sandbox",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-extensions",
    "--disable-popup-blocking",
    "--disable-background-networking",
    "--disable-sync",
    "--disable-translate",
    "--lang=ru-RU,ru,en-US,en",
];

/// Runs before any page script on every new document.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['ru-RU', 'ru', 'en-US', 'en'] });
    window.chrome = window.chrome || { runtime: {} };
    const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
    if (originalQuery) {
        window.navigator.permissions.query = (p) =>
            p && p.name === 'notifications'
                ? Promise.resolve({ state: Notification.permission })
                : originalQuery(p);
    }
"#;

#[cfg_attr(not(feature = "browser"), allow(dead_code))]
pub struct HeadlessBrowserRender {
    proxy: Option<ProxyEndpoint>,
    budget: Duration,
    headless: bool,
    chrome_executable: Option<PathBuf>,
}

impl HeadlessBrowserRender {
    /// `None` when the crate was built without the `browser` feature.
    pub fn new(config: &PipelineConfig, proxy: Option<&ProxyEndpoint>) -> Option<Self> {
        if !cfg!(feature = "browser") {
            return None;
        }
        if proxy.is_some_and(|p| p.scheme.is_socks() && p.has_credentials()) {
            tracing::warn!("Chromium cannot authenticate to SOCKS proxies; the browser will try without credentials");
        }
        Some(Self {
            proxy: proxy.cloned(),
            budget: Duration::from_secs(config.browser_timeout_secs),
            headless: config.headless,
            chrome_executable: config.chrome_executable.clone(),
        })
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait::async_trait]
impl crate::strategy::AcquisitionStrategy for HeadlessBrowserRender {
    fn kind(&self) -> crate::output::StrategyKind {
        crate::output::StrategyKind::HeadlessBrowserRender
    }

    fn budget(&self) -> Duration {
        self.budget
    }

    async fn fetch(
        &self,
        _request: &crate::output::FetchRequest,
    ) -> Result<crate::output::RawDocument, crate::error::FetchError> {
        Err(crate::error::FetchError::Unavailable {
            strategy: self.kind(),
            reason: "built without the `browser` feature".into(),
        })
    }
}

#[cfg(feature = "browser")]
mod imp {
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use chromiumoxide::cdp::browser_protocol::fetch::{
        AuthChallengeResponse, AuthChallengeResponseResponse, ContinueRequestParams, ContinueWithAuthParams,
        EnableParams, EventAuthRequired, EventRequestPaused,
    };
    use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
    use chromiumoxide::Page;
    use futures::StreamExt;
    use tempfile::TempDir;
    use tokio::task::JoinHandle;
    use tracing::{debug, info, warn};

    use super::{HeadlessBrowserRender, STEALTH_ARGS, STEALTH_SCRIPT};
    use crate::error::FetchError;
    use crate::output::{FetchRequest, RawDocument, StrategyKind};
    use crate::strategy::headers::pick_user_agent;
    use crate::strategy::AcquisitionStrategy;

    const KIND: StrategyKind = StrategyKind::HeadlessBrowserRender;
    const SCROLL_STEPS: usize = 6;
    const SCROLL_PAUSE: Duration = Duration::from_millis(350);

    /// One browser process plus everything that must die with it.
    struct BrowserSession {
        browser: Browser,
        tasks: Vec<JoinHandle<()>>,
        _profile: TempDir,
    }

    impl BrowserSession {
        async fn close(mut self) {
            if let Err(e) = self.browser.close().await {
                debug!("Browser close failed: {e}");
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Browser wait failed: {e}");
            }
        }
    }

    impl Drop for BrowserSession {
        fn drop(&mut self) {
            for task in &self.tasks {
                task.abort();
            }
        }
    }

    fn unavailable(reason: impl std::fmt::Display) -> FetchError {
        FetchError::Unavailable {
            strategy: KIND,
            reason: reason.to_string(),
        }
    }

    fn transport(err: impl std::fmt::Display) -> FetchError {
        FetchError::transport(KIND, err)
    }

    impl HeadlessBrowserRender {
        async fn launch(&self, user_agent: &str) -> Result<(BrowserSession, Page), FetchError> {
            let profile = tempfile::Builder::new()
                .prefix("pagetext-chrome-")
                .tempdir()
                .map_err(|e| unavailable(format!("cannot create profile dir: {e}")))?;

            let mut args: Vec<String> = STEALTH_ARGS.iter().map(|a| a.to_string()).collect();
            args.push(format!("--user-agent={user_agent}"));
            if let Some(p) = &self.proxy {
                args.push(format!("--proxy-server={}", p.server_url()));
            }

            let mut builder = BrowserConfig::builder()
                .user_data_dir(profile.path())
                .window_size(1366, 900)
                .request_timeout(self.budget)
                .args(args);
            if !self.headless {
                builder = builder.with_head();
            }
            if let Some(exe) = &self.chrome_executable {
                builder = builder.chrome_executable(exe);
            }
            let config = builder.build().map_err(unavailable)?;

            let (browser, mut handler) = Browser::launch(config).await.map_err(unavailable)?;
            let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

            let mut session = BrowserSession {
                browser,
                tasks: vec![handler_task],
                _profile: profile,
            };

            let page = session.browser.new_page("about:blank").await.map_err(transport)?;
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
                .await
                .map_err(transport)?;

            if let Some(p) = self.proxy.as_ref().filter(|p| p.has_credentials() && !p.scheme.is_socks()) {
                let tasks = answer_proxy_auth(
                    &page,
                    p.username.clone().unwrap_or_default(),
                    p.password.clone().unwrap_or_default(),
                )
                .await?;
                session.tasks.extend(tasks);
            }

            Ok((session, page))
        }

        async fn render(&self, page: &Page, request: &FetchRequest) -> Result<RawDocument, FetchError> {
            page.goto(request.url.as_str()).await.map_err(transport)?;

            let idle_budget = (self.budget / 3).min(Duration::from_secs(8));
            wait_for_network_idle(page, idle_budget).await;
            scroll_through(page).await;

            let content_type: String = page
                .evaluate("document.contentType")
                .await
                .ok()
                .and_then(|v| v.into_value().ok())
                .unwrap_or_else(|| "text/html".to_string());
            if content_type.contains("pdf") {
                return Err(unavailable("document is a PDF; the browser viewer exposes no bytes"));
            }

            let status: i64 = page
                .evaluate(
                    "(() => { const n = performance.getEntriesByType('navigation')[0]; \
                     return (n && n.responseStatus) || 200; })()",
                )
                .await
                .ok()
                .and_then(|v| v.into_value().ok())
                .unwrap_or(200);

            let html = page.content().await.map_err(transport)?;
            let final_url = page
                .url()
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| request.url.clone());

            let status = u16::try_from(status).unwrap_or(200);
            debug!("{KIND}: HTTP {status}, {} bytes from {final_url}", html.len());
            // The serialised DOM is UTF-8 whatever the page's <meta charset> says.
            Ok(RawDocument::new(
                status,
                Some(&format!("{content_type}; charset=utf-8")),
                html.into_bytes(),
                final_url,
            ))
        }
    }

    /// Enable the Fetch domain so the browser asks us for proxy credentials.
    ///
    /// With `handleAuthRequests` every request is paused and must be resumed,
    /// so one task continues paused requests and one answers auth challenges.
    async fn answer_proxy_auth(page: &Page, username: String, password: String) -> Result<Vec<JoinHandle<()>>, FetchError> {
        let mut paused = page.event_listener::<EventRequestPaused>().await.map_err(transport)?;
        let mut challenges = page.event_listener::<EventAuthRequired>().await.map_err(transport)?;
        page.execute(EnableParams::builder().handle_auth_requests(true).build())
            .await
            .map_err(transport)?;

        let resume_page = page.clone();
        let resume = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                if let Err(e) = resume_page
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                {
                    debug!("Failed to resume paused request: {e}");
                }
            }
        });

        let auth_page = page.clone();
        let auth = tokio::spawn(async move {
            while let Some(event) = challenges.next().await {
                let response = AuthChallengeResponse {
                    response: AuthChallengeResponseResponse::ProvideCredentials,
                    username: Some(username.clone()),
                    password: Some(password.clone()),
                };
                if let Err(e) = auth_page
                    .execute(ContinueWithAuthParams::new(event.request_id.clone(), response))
                    .await
                {
                    warn!("Failed to answer proxy auth challenge: {e}");
                }
            }
        });

        Ok(vec![resume, auth])
    }

    /// Poll the resource-timing buffer until it stops growing for a second.
    async fn wait_for_network_idle(page: &Page, budget: Duration) {
        let js = format!(
            r#"(async () => {{
                const timeoutMs = {timeout_ms};
                const idleMs = 1000;
                const interval = 250;
                const start = Date.now();
                const count = () => {{ try {{ return performance.getEntriesByType('resource').length; }} catch (_) {{ return 0; }} }};
                let last = count();
                let stable = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    const cur = count();
                    if (document.readyState === 'complete' && cur === last) {{
                        stable += interval;
                        if (stable >= idleMs) return true;
                    }} else {{
                        stable = 0;
                    }}
                    last = cur;
                }}
                return false;
            }})()"#,
            timeout_ms = budget.as_millis()
        );

        match page.evaluate(js).await.map(|v| v.into_value::<bool>()) {
            Ok(Ok(true)) => debug!("{KIND}: network idle"),
            Ok(_) => debug!("{KIND}: network still busy after {}ms, reading anyway", budget.as_millis()),
            Err(e) => debug!("{KIND}: idle heuristic failed: {e}"),
        }
    }

    /// Scroll down a viewport at a time so lazy sections load, then back up.
    async fn scroll_through(page: &Page) {
        for _ in 0..SCROLL_STEPS {
            let at_bottom = page
                .evaluate(
                    "(() => { window.scrollBy(0, window.innerHeight * 0.8); \
                     return window.innerHeight + window.scrollY >= document.body.scrollHeight - 2; })()",
                )
                .await
                .ok()
                .and_then(|v| v.into_value::<bool>().ok())
                .unwrap_or(true);
            tokio::time::sleep(SCROLL_PAUSE).await;
            if at_bottom {
                break;
            }
        }
        let _ = page.evaluate("window.scrollTo(0, 0)").await;
    }

    #[async_trait]
    impl AcquisitionStrategy for HeadlessBrowserRender {
        fn kind(&self) -> StrategyKind {
            KIND
        }

        fn budget(&self) -> Duration {
            self.budget
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
            let ua = pick_user_agent(request.prefer_mobile);
            info!("{KIND}: launching browser for {}", request.url);

            let (session, page) = self.launch(ua).await?;
            let result = self.render(&page, request).await;
            session.close().await;
            result
        }
    }
}
