//! Session bootstrap and cookie rotation
//!
//! The frontend gates generate calls behind a page-embedded access token and
//! keeps the `__Secure-1PSIDTS` cookie fresh by rotating it every few
//! minutes. Both behaviors are mimicked here.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex_lite::Regex;
use reqwest::header;

use crate::cookies::cookie_header;
use crate::endpoints::{Endpoints, USER_AGENT};
use crate::error::{GeminiError, Result};

pub(crate) const SECURE_1PSID: &str = "__Secure-1PSID";
pub(crate) const SECURE_1PSIDTS: &str = "__Secure-1PSIDTS";

/// How often the background task rotates `__Secure-1PSIDTS`
pub(crate) const ROTATE_INTERVAL: Duration = Duration::from_secs(540);

/// Matches the `"SNlM0e":"<token>"` fragment embedded in the app page
fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""SNlM0e":"(.*?)""#).expect("valid literal pattern"))
}

/// Fetch the access token embedded in the app page. The token must accompany
/// every generate call. Cookies the server refreshes during the request are
/// folded back into the map.
pub(crate) async fn fetch_access_token(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    cookies: &mut HashMap<String, String>,
) -> Result<String> {
    let response = http
        .get(endpoints.init_url())
        .header(header::USER_AGENT, USER_AGENT)
        .header(header::COOKIE, cookie_header(cookies))
        .send()
        .await?;

    let status = response.status();
    let refreshed = set_cookie_values(response.headers());
    let text = response.text().await?;

    if !status.is_success() {
        return Err(GeminiError::Auth(format!(
            "app page returned status {status}"
        )));
    }

    match token_pattern().captures(&text).and_then(|c| c.get(1)) {
        Some(token) => {
            for (name, value) in refreshed {
                cookies.insert(name, value);
            }
            Ok(token.as_str().to_string())
        }
        None => Err(GeminiError::Auth(
            "no access token in the app page; session cookies are missing or expired".into(),
        )),
    }
}

/// Ask the accounts endpoint for a fresh `__Secure-1PSIDTS`. Returns `None`
/// when the server accepts the request but does not hand out a new value.
pub(crate) async fn rotate_1psidts(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    cookies: &HashMap<String, String>,
) -> Result<Option<String>> {
    let response = http
        .post(endpoints.rotate_cookies_url())
        .header(header::USER_AGENT, USER_AGENT)
        .header(header::COOKIE, cookie_header(cookies))
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"[000,"-0000000000000000000"]"#)
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GeminiError::Auth(
            "cookie rotation rejected; session cookies are no longer valid".into(),
        ));
    }
    if !status.is_success() {
        return Err(GeminiError::Api(format!(
            "cookie rotation returned status {status}"
        )));
    }

    Ok(set_cookie_values(response.headers())
        .into_iter()
        .find(|(name, _)| name == SECURE_1PSIDTS)
        .map(|(_, value)| value))
}

/// Extract `name=value` pairs from every `Set-Cookie` header
fn set_cookie_values(headers: &header::HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|raw| raw.to_str().ok())
        .filter_map(|raw| {
            let pair = raw.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn mock_endpoints(server: &MockServer) -> Endpoints {
        Endpoints {
            app: server.uri(),
            accounts: server.uri(),
            upload: server.uri(),
        }
    }

    fn session_cookies() -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        cookies.insert(SECURE_1PSID.to_string(), "psid-value".to_string());
        cookies
    }

    #[tokio::test]
    async fn test_fetch_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"...,"SNlM0e":"AFmKpT0token","..."#)
                    .insert_header("set-cookie", "__Secure-1PSIDTS=rotated; Path=/; Secure"),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let mut cookies = session_cookies();
        let token = fetch_access_token(&http, &mock_endpoints(&server), &mut cookies)
            .await
            .unwrap();

        assert_eq!(token, "AFmKpT0token");
        assert_eq!(cookies.get(SECURE_1PSIDTS).map(String::as_str), Some("rotated"));
    }

    #[tokio::test]
    async fn test_fetch_access_token_missing_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>signed out</html>"))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let mut cookies = session_cookies();
        let err = fetch_access_token(&http, &mock_endpoints(&server), &mut cookies)
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Auth(_)));
    }

    #[tokio::test]
    async fn test_rotate_returns_new_1psidts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/RotateCookies"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "__Secure-1PSIDTS=fresh-ts; Path=/; HttpOnly"),
            )
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let rotated = rotate_1psidts(&http, &mock_endpoints(&server), &session_cookies())
            .await
            .unwrap();
        assert_eq!(rotated.as_deref(), Some("fresh-ts"));
    }

    #[tokio::test]
    async fn test_rotate_unauthorized_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/RotateCookies"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let err = rotate_1psidts(&http, &mock_endpoints(&server), &session_cookies())
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Auth(_)));
    }

    #[test]
    fn test_set_cookie_values_parsing() {
        let mut headers = header::HeaderMap::new();
        headers.append(
            header::SET_COOKIE,
            "__Secure-1PSIDTS=abc; Path=/; Secure".parse().unwrap(),
        );
        headers.append(header::SET_COOKIE, "NID=xyz".parse().unwrap());
        headers.append(header::SET_COOKIE, "garbage".parse().unwrap());

        let pairs = set_cookie_values(&headers);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("__Secure-1PSIDTS".to_string(), "abc".to_string())));
        assert!(pairs.contains(&("NID".to_string(), "xyz".to_string())));
    }
}
