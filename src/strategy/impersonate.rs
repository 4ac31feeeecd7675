//! TLS-fingerprint impersonation.
//!
//! Many anti-bot layers fingerprint the TLS ClientHello (JA3/JA4) and HTTP/2
//! SETTINGS frame before any content is served, and rustls looks nothing like
//! Chrome. `wreq` (BoringSSL) with a `wreq-util` emulation profile reproduces
//! Chrome's handshake, header order and H2 priorities.
//!
//! BoringSSL needs cmake and a C toolchain at build time, so this lives behind
//! the `impersonate` feature. Without it [`TlsImpersonationFetch::new`]
//! returns `None` and the chain skips the link.

use std::time::Duration;

use crate::pipeline::proxy::ProxyEndpoint;

#[cfg_attr(not(feature = "impersonate"), allow(dead_code))]
pub struct TlsImpersonationFetch {
    proxy: Option<ProxyEndpoint>,
    budget: Duration,
}

impl TlsImpersonationFetch {
    /// `None` when the crate was built without the `impersonate` feature.
    pub fn new(proxy: Option<&ProxyEndpoint>, budget: Duration) -> Option<Self> {
        if !cfg!(feature = "impersonate") {
            return None;
        }
        Some(Self {
            proxy: proxy.cloned(),
            budget,
        })
    }
}

#[cfg(not(feature = "impersonate"))]
#[async_trait::async_trait]
impl crate::strategy::AcquisitionStrategy for TlsImpersonationFetch {
    fn kind(&self) -> crate::output::StrategyKind {
        crate::output::StrategyKind::TlsImpersonationFetch
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
            reason: "built without the `impersonate` feature".into(),
        })
    }
}

#[cfg(feature = "impersonate")]
mod imp {
    use std::time::Duration;

    use async_trait::async_trait;
    use tracing::debug;
    use wreq_util::Emulation;

    use super::TlsImpersonationFetch;
    use crate::error::FetchError;
    use crate::output::{FetchRequest, RawDocument, StrategyKind};
    use crate::strategy::{AcquisitionStrategy, MAX_BODY_BYTES};

    const MAX_REDIRECTS: usize = 10;

    impl TlsImpersonationFetch {
        fn client(&self) -> Result<wreq::Client, FetchError> {
            let kind = StrategyKind::TlsImpersonationFetch;
            let mut builder = wreq::Client::builder()
                .emulation(Emulation::Chrome131)
                .timeout(self.budget);
            if let Some(p) = &self.proxy {
                let proxy = wreq::Proxy::all(p.to_url()).map_err(|e| FetchError::transport(kind, e))?;
                builder = builder.proxy(proxy);
            }
            builder.build().map_err(|e| FetchError::transport(kind, e))
        }
    }

    #[async_trait]
    impl AcquisitionStrategy for TlsImpersonationFetch {
        fn kind(&self) -> StrategyKind {
            StrategyKind::TlsImpersonationFetch
        }

        fn budget(&self) -> Duration {
            self.budget
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<RawDocument, FetchError> {
            let kind = self.kind();
            let secs = self.budget.as_secs();
            let map_err = |e: wreq::Error| {
                if e.is_timeout() {
                    FetchError::Timeout { strategy: kind, secs }
                } else {
                    FetchError::transport(kind, e)
                }
            };

            let client = self.client()?;
            let mut current = request.url.clone();

            // Redirects are followed by hand so the emulated header order is
            // kept on every hop.
            for _ in 0..=MAX_REDIRECTS {
                let mut response = client.get(&current).send().await.map_err(map_err)?;
                let status = response.status().as_u16();

                if (300..400).contains(&status) {
                    let next = response
                        .headers()
                        .get("location")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|loc| url::Url::parse(&current).ok()?.join(loc).ok());
                    if let Some(next) = next {
                        debug!("{kind}: redirect {current} → {next}");
                        current = next.to_string();
                        continue;
                    }
                }

                let content_type = response
                    .headers()
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let mut body = Vec::new();
                while let Some(chunk) = response.chunk().await.map_err(map_err)? {
                    body.extend_from_slice(&chunk);
                    if body.len() >= MAX_BODY_BYTES {
                        body.truncate(MAX_BODY_BYTES);
                        break;
                    }
                }

                debug!("{kind}: HTTP {status}, {} bytes from {current}", body.len());
                return Ok(RawDocument::new(status, content_type.as_deref(), body, current));
            }

            Err(FetchError::transport(
                kind,
                format!("more than {MAX_REDIRECTS} redirects"),
            ))
        }
    }
}
