//! File upload for attaching files to prompts
//!
//! Files go to a separate push endpoint which answers with an opaque
//! identifier. The generate call then references the identifier together
//! with the original file name.

use std::path::Path;

use reqwest::multipart;
use tracing::debug;

use crate::endpoints::{Endpoints, UPLOAD_PUSH_ID, USER_AGENT};
use crate::error::{GeminiError, Result};

/// Upload one file and return the identifier the generate call references
pub(crate) async fn upload_file(
    http: &reqwest::Client,
    endpoints: &Endpoints,
    path: &Path,
) -> Result<String> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            GeminiError::Parse(format!("path has no file name: {}", path.display()))
        })?;
    let bytes = tokio::fs::read(path).await?;
    debug!(file = %file_name, size = bytes.len(), "uploading file");

    let form = multipart::Form::new().part(
        "file",
        multipart::Part::bytes(bytes).file_name(file_name.clone()),
    );
    let response = http
        .post(endpoints.upload_url())
        .header("push-id", UPLOAD_PUSH_ID)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .multipart(form)
        .send()
        .await?
        .error_for_status()?;

    let identifier = response.text().await?;
    if identifier.is_empty() {
        return Err(GeminiError::Api(format!(
            "upload of {file_name} returned an empty identifier"
        )));
    }
    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_upload_returns_identifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .and(header("push-id", UPLOAD_PUSH_ID))
            .respond_with(ResponseTemplate::new(200).set_body_string("/contrib_service/ttl_1d/17"))
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let endpoints = Endpoints {
            upload: server.uri(),
            ..Endpoints::default()
        };
        let identifier = upload_file(&reqwest::Client::new(), &endpoints, file.path())
            .await
            .unwrap();
        assert_eq!(identifier, "/contrib_service/ttl_1d/17");
    }

    #[tokio::test]
    async fn test_upload_error_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let endpoints = Endpoints {
            upload: server.uri(),
            ..Endpoints::default()
        };
        let err = upload_file(&reqwest::Client::new(), &endpoints, file.path())
            .await
            .unwrap_err();
        assert!(matches!(err, GeminiError::Network(_)));
    }
}
