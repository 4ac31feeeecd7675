//! Browser-like request headers.
//!
//! The pools are fixed and small: a real Chrome/Firefox/Safari population is
//! more convincing than a random string generator, and a fixed pool keeps test
//! expectations stable.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

pub const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

pub const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 13; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 18_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Mobile/15E148 Safari/604.1",
];

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";

/// Pick a user agent from the desktop or mobile pool.
pub fn pick_user_agent(mobile: bool) -> &'static str {
    let pool = if mobile { MOBILE_USER_AGENTS } else { DESKTOP_USER_AGENTS };
    pool.choose(&mut rand::thread_rng()).copied().unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// How a request relates to the previous navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Typed into the address bar.
    Direct,
    /// Followed a link from a page on the same site.
    SameOrigin,
}

/// Base header set every strategy sends.
pub fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    insert(&mut h, "user-agent", user_agent);
    insert(&mut h, "accept", ACCEPT_HTML);
    insert(&mut h, "accept-language", ACCEPT_LANGUAGE);
    insert(&mut h, "accept-encoding", "gzip, deflate, br");
    insert(&mut h, "upgrade-insecure-requests", "1");
    h
}

/// Base headers plus the fetch-metadata and client-hint headers a real
/// Chromium navigation carries.
pub fn navigation_headers(user_agent: &str, nav: Navigation, referer: Option<&str>) -> HeaderMap {
    let mut h = browser_headers(user_agent);
    insert(&mut h, "sec-fetch-dest", "document");
    insert(&mut h, "sec-fetch-mode", "navigate");
    insert(&mut h, "sec-fetch-user", "?1");
    insert(
        &mut h,
        "sec-fetch-site",
        match nav {
            Navigation::Direct => "none",
            Navigation::SameOrigin => "same-origin",
        },
    );
    if let Some(hints) = client_hints(user_agent) {
        insert(&mut h, "sec-ch-ua", hints.brands);
        insert(&mut h, "sec-ch-ua-mobile", if hints.mobile { "?1" } else { "?0" });
        insert(&mut h, "sec-ch-ua-platform", hints.platform);
    }
    if let Some(r) = referer {
        insert(&mut h, "referer", r);
    }
    h
}

struct ClientHints {
    brands: &'static str,
    mobile: bool,
    platform: &'static str,
}

/// Only Chromium sends client hints; Firefox and Safari agents get none.
fn client_hints(user_agent: &str) -> Option<ClientHints> {
    if !user_agent.contains("Chrome/") {
        return None;
    }
    let brands = if user_agent.contains("Chrome/130") {
        r#""Chromium";v="130", "Google Chrome";v="130", "Not?A_Brand";v="99""#
    } else {
        r#""Google Chrome";v="131", "Chromium";v="131", "Not_A Brand";v="24""#
    };
    let platform = if user_agent.contains("Android") {
        r#""Android""#
    } else if user_agent.contains("Windows") {
        r#""Windows""#
    } else if user_agent.contains("Macintosh") {
        r#""macOS""#
    } else {
        r#""Linux""#
    };
    Some(ClientHints {
        brands,
        mobile: user_agent.contains("Mobile"),
        platform,
    })
}

fn insert(h: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        h.insert(HeaderName::from_static(name), v);
    }
}
