//! Browser cookie extraction
//!
//! Best-effort loading of session cookies from locally installed browsers.
//! Each browser family stores cookies differently (SQLite with per-OS value
//! encryption for Chromium, plain SQLite for Firefox, a proprietary binary
//! file for Safari); everything is normalized into one name/value map.
//!
//! A single browser failing to read (not installed, profile locked, keychain
//! denied) must never abort the overall load. Failures are logged and the
//! iteration moves on.

mod chromium;
mod firefox;
mod safari;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Domain the client filters cookies to by default
pub const GOOGLE_DOMAIN: &str = "google.com";

/// A cookie as it came out of a browser store
#[derive(Debug, Clone)]
pub(crate) struct RawCookie {
    pub name: String,
    pub value: String,
    #[allow(dead_code)]
    pub host: String,
}

/// Why a single browser's store could not be read
#[derive(Debug, Error)]
pub(crate) enum CookieStoreError {
    /// No profile directory or cookie store on disk
    #[error("browser not installed or no cookie store found")]
    NotInstalled,

    /// The store exists but the OS refused access
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The browser does not exist on this platform
    #[error("not available on this platform")]
    UnsupportedPlatform,

    #[error("cookie database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to decrypt cookie values: {0}")]
    Decrypt(String),

    #[error("malformed cookie store: {0}")]
    Malformed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Browsers the loader knows how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Browser {
    Firefox,
    Chrome,
    Chromium,
    Opera,
    OperaGx,
    Brave,
    Edge,
    Vivaldi,
    Safari,
    Librewolf,
}

impl Browser {
    /// Iteration order when no specific browser is requested. On cookie name
    /// collision the value from the later browser wins.
    pub const ALL: [Browser; 10] = [
        Browser::Firefox,
        Browser::Chrome,
        Browser::Chromium,
        Browser::Opera,
        Browser::OperaGx,
        Browser::Brave,
        Browser::Edge,
        Browser::Vivaldi,
        Browser::Safari,
        Browser::Librewolf,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Browser::Firefox => "firefox",
            Browser::Chrome => "chrome",
            Browser::Chromium => "chromium",
            Browser::Opera => "opera",
            Browser::OperaGx => "opera_gx",
            Browser::Brave => "brave",
            Browser::Edge => "edge",
            Browser::Vivaldi => "vivaldi",
            Browser::Safari => "safari",
            Browser::Librewolf => "librewolf",
        }
    }

    /// Case-insensitive lookup by the names accepted in config
    pub fn from_name(name: &str) -> Option<Browser> {
        let lower = name.trim().to_ascii_lowercase();
        Browser::ALL.iter().copied().find(|b| b.name() == lower)
    }

    fn read(&self, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
        match self {
            Browser::Firefox | Browser::Librewolf => firefox::read(*self, domain),
            Browser::Safari => safari::read(domain),
            _ => chromium::read(*self, domain),
        }
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Source of cookies, the seam the merge loop iterates over
pub(crate) trait CookieSource {
    fn name(&self) -> &str;
    fn read(&self, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError>;
}

impl CookieSource for Browser {
    fn name(&self) -> &str {
        Browser::name(self)
    }

    fn read(&self, domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
        Browser::read(self, domain)
    }
}

/// Load cookies from installed browsers into one name/value map.
///
/// With `browser_name` set only that browser is tried; an unknown name logs a
/// warning and yields an empty map. Without it every supported browser is
/// tried in [`Browser::ALL`] order, and later browsers overwrite earlier ones
/// on name collision. Per-browser read failures are logged and suppressed.
pub fn load_browser_cookies(domain_name: &str, browser_name: Option<&str>) -> HashMap<String, String> {
    if let Some(name) = browser_name {
        let Some(browser) = Browser::from_name(name) else {
            let supported = Browser::ALL.map(|b| b.name()).join(", ");
            tracing::warn!(
                "Invalid browser name '{name}'. Supported names are: {supported}. \
                 No cookies will be loaded."
            );
            return HashMap::new();
        };
        let source: &dyn CookieSource = &browser;
        return merge_sources(&[source], domain_name);
    }

    let sources: Vec<&dyn CookieSource> = Browser::ALL.iter().map(|b| b as _).collect();
    merge_sources(&sources, domain_name)
}

/// Best-effort merge over cookie sources, later sources win on collision
pub(crate) fn merge_sources(sources: &[&dyn CookieSource], domain: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for source in sources {
        match source.read(domain) {
            Ok(found) => {
                tracing::debug!("{}: {} cookie(s) for '{domain}'", source.name(), found.len());
                for cookie in found {
                    cookies.insert(cookie.name, cookie.value);
                }
            }
            Err(CookieStoreError::NotInstalled) | Err(CookieStoreError::UnsupportedPlatform) => {
                tracing::debug!("{}: no cookies found or browser not installed", source.name());
            }
            Err(CookieStoreError::PermissionDenied(reason)) => {
                tracing::warn!(
                    "Permission denied while trying to load cookies from {}. {reason}",
                    source.name()
                );
            }
            Err(err) => {
                tracing::error!(
                    "Error happened while trying to load cookies from {}. {err}",
                    source.name()
                );
            }
        }
    }

    cookies
}

/// Render cookies as a `Cookie` request header value
pub(crate) fn cookie_header(cookies: &HashMap<String, String>) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Copy a possibly-locked SQLite database to a temp file before opening it.
/// Browsers keep their stores open with WAL journaling; reading a snapshot
/// sidesteps the lock without touching the live file.
pub(crate) fn snapshot_db(src: &Path) -> Result<PathBuf, CookieStoreError> {
    let file_name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cookies".to_string());
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let seq = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let dst = std::env::temp_dir().join(format!(
        "gemini_cookies_{}_{seq}_{file_name}.sqlite",
        std::process::id()
    ));
    std::fs::copy(src, &dst).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => CookieStoreError::PermissionDenied(e.to_string()),
        _ => CookieStoreError::Io(e),
    })?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSource {
        name: &'static str,
        result: Result<Vec<(&'static str, &'static str)>, fn() -> CookieStoreError>,
    }

    impl CookieSource for StubSource {
        fn name(&self) -> &str {
            self.name
        }

        fn read(&self, _domain: &str) -> Result<Vec<RawCookie>, CookieStoreError> {
            match &self.result {
                Ok(pairs) => Ok(pairs
                    .iter()
                    .map(|(n, v)| RawCookie {
                        name: n.to_string(),
                        value: v.to_string(),
                        host: ".google.com".to_string(),
                    })
                    .collect()),
                Err(make) => Err(make()),
            }
        }
    }

    #[test]
    fn test_later_source_wins_on_collision() {
        let first = StubSource {
            name: "firefox",
            result: Ok(vec![("__Secure-1PSID", "firefox_psid"), ("ANOTHER", "ff_val")]),
        };
        let second = StubSource {
            name: "chrome",
            result: Ok(vec![("__Secure-1PSID", "chrome_psid"), ("OTHER", "chrome_val")]),
        };

        let sources: [&dyn CookieSource; 2] = [&first, &second];
        let cookies = merge_sources(&sources, "google.com");
        assert_eq!(cookies.get("__Secure-1PSID").map(String::as_str), Some("chrome_psid"));
        assert_eq!(cookies.get("ANOTHER").map(String::as_str), Some("ff_val"));
        assert_eq!(cookies.get("OTHER").map(String::as_str), Some("chrome_val"));
    }

    #[test]
    fn test_failures_do_not_abort_the_load() {
        let broken = StubSource {
            name: "opera",
            result: Err(|| CookieStoreError::Decrypt("bad key".into())),
        };
        let missing = StubSource {
            name: "edge",
            result: Err(|| CookieStoreError::NotInstalled),
        };
        let denied = StubSource {
            name: "safari",
            result: Err(|| CookieStoreError::PermissionDenied("container".into())),
        };
        let working = StubSource {
            name: "firefox",
            result: Ok(vec![("__Secure-1PSID", "psid")]),
        };

        let sources: [&dyn CookieSource; 4] = [&broken, &missing, &denied, &working];
        let cookies = merge_sources(&sources, "google.com");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies.get("__Secure-1PSID").map(String::as_str), Some("psid"));
    }

    #[test]
    fn test_invalid_browser_name_yields_empty_map() {
        let cookies = load_browser_cookies("google.com", Some("nonexistentbrowser"));
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_browser_name_lookup() {
        assert_eq!(Browser::from_name("FireFox"), Some(Browser::Firefox));
        assert_eq!(Browser::from_name("opera_gx"), Some(Browser::OperaGx));
        assert_eq!(Browser::from_name("netscape"), None);
        for browser in Browser::ALL {
            assert_eq!(Browser::from_name(browser.name()), Some(browser));
        }
    }

    #[test]
    fn test_cookie_header_format() {
        let mut cookies = HashMap::new();
        cookies.insert("__Secure-1PSID".to_string(), "abc".to_string());
        assert_eq!(cookie_header(&cookies), "__Secure-1PSID=abc");
    }
}
