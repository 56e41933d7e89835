//! Environment-variable configuration
//!
//! Constructor arguments always win over the environment; the environment
//! wins over the built-in defaults.

use crate::cookies::GOOGLE_DOMAIN;

/// `true` enables browser cookie auto-loading when no cookies are passed in
pub const ENV_AUTO_LOAD_COOKIES: &str = "GEMINI_AUTO_LOAD_COOKIES";
/// Name of a single browser to read cookies from (e.g. `firefox`)
pub const ENV_PREFERRED_BROWSER: &str = "GEMINI_PREFERRED_BROWSER";
/// Session cookie values, mostly for CI and scripts
pub const ENV_SECURE_1PSID: &str = "SECURE_1PSID";
pub const ENV_SECURE_1PSIDTS: &str = "SECURE_1PSIDTS";

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub auto_load_cookies: bool,
    pub preferred_browser: Option<String>,
    pub cookie_domain: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            auto_load_cookies: true,
            preferred_browser: None,
            cookie_domain: GOOGLE_DOMAIN.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with whatever the environment sets
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_AUTO_LOAD_COOKIES) {
            config.auto_load_cookies = parse_bool(&raw);
        }
        if let Ok(browser) = std::env::var(ENV_PREFERRED_BROWSER) {
            if !browser.trim().is_empty() {
                config.preferred_browser = Some(browser.trim().to_string());
            }
        }
        config
    }

    pub fn with_auto_load_cookies(mut self, enabled: bool) -> Self {
        self.auto_load_cookies = enabled;
        self
    }

    pub fn with_preferred_browser(mut self, browser: impl Into<String>) -> Self {
        self.preferred_browser = Some(browser.into());
        self
    }
}

/// Anything but a literal "true" reads as false
fn parse_bool(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

/// Session cookies taken from the environment, if both halves are absent the
/// caller falls back to browser loading
pub fn env_cookies() -> (Option<String>, Option<String>) {
    (
        std::env::var(ENV_SECURE_1PSID).ok().filter(|v| !v.is_empty()),
        std::env::var(ENV_SECURE_1PSIDTS).ok().filter(|v| !v.is_empty()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.auto_load_cookies);
        assert!(config.preferred_browser.is_none());
        assert_eq!(config.cookie_domain, "google.com");
    }

    #[test]
    fn test_parse_bool_strictness() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" TRUE "));
        assert!(!parse_bool("1"));
        assert!(!parse_bool("yes"));
        assert!(!parse_bool("not_a_boolean"));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::default()
            .with_auto_load_cookies(false)
            .with_preferred_browser("edge");
        assert!(!config.auto_load_cookies);
        assert_eq!(config.preferred_browser.as_deref(), Some("edge"));
    }
}
