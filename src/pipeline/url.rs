//! URL classification and canonicalisation.
//!
//! ## Why a loose pattern?
//!
//! Users paste links straight out of chat apps: `hh.ru/vacancy/123`,
//! `www.linkedin.com/jobs/view/42`, sometimes with a trailing space. Anything
//! that looks like `host.tld[/path]` is treated as a link; everything else is
//! literal text and never touches the network.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

static RE_URL_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(https?://)?((?:[\p{L}\p{N}-]+\.)+\p{L}{2,}|localhost|\d{1,3}(?:\.\d{1,3}){3})(:\d{1,5})?([/?#]\S*)?$",
    )
    .unwrap()
});

/// Hosts with a lighter mobile variant: (desktop registrable host, mobile host).
const MOBILE_HOSTS: &[(&str, &str)] = &[
    ("hh.ru", "m.hh.ru"),
    ("linkedin.com", "m.linkedin.com"),
    ("facebook.com", "m.facebook.com"),
    ("twitter.com", "mobile.twitter.com"),
    ("vk.com", "m.vk.com"),
];

/// Whether the trimmed input looks like a link.
pub fn looks_like_url(input: &str) -> bool {
    let s = input.trim();
    !s.is_empty() && RE_URL_LIKE.is_match(s)
}

/// Classify and canonicalise `input`.
///
/// Returns `None` when the input is not URL-like; callers must then treat it
/// as literal text. Otherwise returns an absolute `http(s)` URL, with the host
/// rewritten to its mobile variant when `prefer_mobile` is set and the host is
/// one of the known sites.
pub fn normalize_url(input: &str, prefer_mobile: bool) -> Option<String> {
    let s = input.trim();
    if !looks_like_url(s) {
        return None;
    }

    let lower = s.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        s.to_string()
    } else {
        format!("https://{s}")
    };

    let mut parsed = match Url::parse(&with_scheme) {
        Ok(u) => u,
        Err(e) => {
            debug!("URL-like input failed to parse ({e}): {s}");
            return None;
        }
    };

    if prefer_mobile {
        if let Some(mobile) = parsed.host_str().and_then(mobile_host) {
            // set_host only fails for cannot-be-a-base URLs, which http(s) never are
            if parsed.set_host(Some(mobile)).is_ok() {
                debug!("Rewrote host to mobile variant {mobile}");
            }
        }
    }

    Some(parsed.to_string())
}

/// Mobile counterpart of `host`, if it is a known desktop host.
fn mobile_host(host: &str) -> Option<&'static str> {
    let bare = host.strip_prefix("www.").unwrap_or(host);
    if bare.starts_with("m.") || bare.starts_with("mobile.") {
        return None;
    }
    MOBILE_HOSTS
        .iter()
        .find(|(desktop, _)| *desktop == bare)
        .map(|(_, mobile)| *mobile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_links_as_users_paste_them() {
        assert!(looks_like_url("https://hh.ru/vacancy/123"));
        assert!(looks_like_url("http://example.com"));
        assert!(looks_like_url("hh.ru/vacancy/123"));
        assert!(looks_like_url("  www.hh.ru/vacancy/123  "));
        assert!(looks_like_url("localhost:8080/job"));
        assert!(looks_like_url("127.0.0.1:3000/a?b=c"));
        assert!(looks_like_url("хабр.рф/вакансии"));
    }

    #[test]
    fn rejects_prose() {
        assert!(!looks_like_url(""));
        assert!(!looks_like_url("Senior Rust developer, 5 years"));
        assert!(!looks_like_url("see example.com for details"));
        assert!(!looks_like_url("e.g"));
        assert!(!looks_like_url("ftp://example.com/file"));
    }

    #[test]
    fn inserts_https_scheme() {
        assert_eq!(
            normalize_url("hh.ru/vacancy/123", false).as_deref(),
            Some("https://hh.ru/vacancy/123")
        );
        assert_eq!(
            normalize_url("http://example.com/job/1", false).as_deref(),
            Some("http://example.com/job/1")
        );
    }

    #[test]
    fn non_url_is_none() {
        assert_eq!(normalize_url("just some text", true), None);
    }

    #[test]
    fn mobile_rewrite_only_when_preferred() {
        assert_eq!(
            normalize_url("https://hh.ru/vacancy/1", true).as_deref(),
            Some("https://m.hh.ru/vacancy/1")
        );
        assert_eq!(
            normalize_url("www.linkedin.com/jobs/view/42", true).as_deref(),
            Some("https://m.linkedin.com/jobs/view/42")
        );
        assert_eq!(
            normalize_url("https://hh.ru/vacancy/1", false).as_deref(),
            Some("https://hh.ru/vacancy/1")
        );
    }

    #[test]
    fn mobile_rewrite_leaves_unknown_and_mobile_hosts() {
        assert_eq!(
            normalize_url("https://example.com/job/1", true).as_deref(),
            Some("https://example.com/job/1")
        );
        assert_eq!(
            normalize_url("https://m.hh.ru/vacancy/1", true).as_deref(),
            Some("https://m.hh.ru/vacancy/1")
        );
        assert_eq!(
            normalize_url("https://spb.hh.ru/vacancy/1", true).as_deref(),
            Some("https://spb.hh.ru/vacancy/1")
        );
    }
}
