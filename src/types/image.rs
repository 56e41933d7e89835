//! Images attached to a response
//!
//! Web images come straight from search results and download anonymously.
//! AI-generated images sit behind an authenticated endpoint and need the
//! session cookies on the download request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reqwest::header;

use crate::cookies::cookie_header;
use crate::endpoints::USER_AGENT;
use crate::error::{GeminiError, Result};

/// An image referenced by a web search result inside a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebImage {
    pub url: String,
    pub title: String,
    pub alt: String,
}

/// An image produced by the image generation tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub url: String,
    pub title: String,
    pub alt: String,
    /// Session cookies the download request must carry
    pub(crate) cookies: HashMap<String, String>,
}

/// Any image attached to a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Image {
    Web(WebImage),
    Generated(GeneratedImage),
}

impl Image {
    pub fn url(&self) -> &str {
        match self {
            Image::Web(img) => &img.url,
            Image::Generated(img) => &img.url,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Image::Web(img) => &img.title,
            Image::Generated(img) => &img.title,
        }
    }

    pub fn alt(&self) -> &str {
        match self {
            Image::Web(img) => &img.alt,
            Image::Generated(img) => &img.alt,
        }
    }

    /// Download the image into `dir`, deriving a file name from the URL when
    /// none is given. Returns the path written.
    pub async fn save(&self, dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
        let (url, cookies) = match self {
            Image::Web(img) => (img.url.clone(), None),
            // Full-size variant of generated images
            Image::Generated(img) => (format!("{}=s2048", img.url), Some(&img.cookies)),
        };

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        let mut request = client.get(&url);
        if let Some(cookies) = cookies {
            request = request.header(header::COOKIE, cookie_header(cookies));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(GeminiError::Api(format!(
                "image download returned {} for {url}",
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if content_type.contains("text/html") {
            return Err(GeminiError::Api(format!(
                "image URL served an HTML page, the link may have expired: {url}"
            )));
        }

        let name = match filename {
            Some(name) => name.to_string(),
            None => filename_from_url(self.url()),
        };

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(name);
        let bytes = response.bytes().await?;
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!("saved image to {}", path.display());
        Ok(path)
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title(), self.url())
    }
}

/// Last path segment of the URL, or a timestamped fallback
fn filename_from_url(raw: &str) -> String {
    let segment = url::Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
    match segment {
        Some(name) => name,
        None => format!("image_{}.png", chrono::Utc::now().timestamp()),
    }
}
