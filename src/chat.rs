//! Multi-turn conversations
//!
//! The server keeps no session object; continuity comes from threading the
//! `[cid, rid, rcid]` triple of the previous reply into the next request.
//! A session is therefore just a client handle plus that triple.

use std::path::PathBuf;

use crate::client::{ChatMetadata, GeminiClient};
use crate::error::{GeminiError, Result};
use crate::model::Model;
use crate::types::ModelOutput;

/// One conversation with the model. Cheap to create; holds no server state.
pub struct ChatSession {
    client: GeminiClient,
    model: Model,
    metadata: ChatMetadata,
    last_output: Option<ModelOutput>,
}

impl ChatSession {
    pub(crate) fn new(client: GeminiClient, model: Model) -> Self {
        Self {
            client,
            model,
            metadata: Default::default(),
            last_output: None,
        }
    }

    /// Resume a conversation from a previously saved position
    pub fn with_metadata(
        mut self,
        cid: impl Into<String>,
        rid: impl Into<String>,
        rcid: Option<String>,
    ) -> Self {
        self.metadata = [Some(cid.into()), Some(rid.into()), rcid];
        self
    }

    /// Send a message and advance the conversation to the reply
    pub async fn send_message(&mut self, prompt: &str) -> Result<ModelOutput> {
        self.send_message_with_files(prompt, &[]).await
    }

    /// Send a message with file attachments
    pub async fn send_message_with_files(
        &mut self,
        prompt: &str,
        files: &[PathBuf],
    ) -> Result<ModelOutput> {
        let output = self
            .client
            .generate(prompt, files, &self.metadata, self.model)
            .await?;
        self.advance(&output);
        self.last_output = Some(output.clone());
        Ok(output)
    }

    /// Re-select which candidate of the last reply the conversation
    /// continues from
    pub fn choose_candidate(&mut self, index: usize) -> Result<ModelOutput> {
        let output = self
            .last_output
            .as_mut()
            .ok_or_else(|| {
                GeminiError::InvalidArgument("no reply to choose a candidate from".into())
            })?;
        if index >= output.candidates.len() {
            return Err(GeminiError::InvalidArgument(format!(
                "candidate index {index} out of range, reply has {}",
                output.candidates.len()
            )));
        }
        output.chosen = index;
        let output = output.clone();
        self.advance(&output);
        Ok(output)
    }

    /// Conversation position `(cid, rid, rcid)`, if any turn has completed
    pub fn metadata(&self) -> &[Option<String>; 3] {
        &self.metadata
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn last_output(&self) -> Option<&ModelOutput> {
        self.last_output.as_ref()
    }

    fn advance(&mut self, output: &ModelOutput) {
        if let Some(cid) = output.metadata.first() {
            self.metadata[0] = Some(cid.clone());
        }
        if let Some(rid) = output.metadata.get(1) {
            self.metadata[1] = Some(rid.clone());
        }
        if let Some(rcid) = output.rcid() {
            self.metadata[2] = Some(rcid.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::ClientConfig;
    use crate::endpoints::Endpoints;

    use super::*;

    fn envelope(body: &Value) -> String {
        let outer = json!([["wrb.fr", null, body.to_string()]]);
        format!(")]}}'\n\n{outer}")
    }

    fn two_candidate_reply() -> String {
        envelope(&json!([
            null,
            ["c_1", "r_1"],
            null,
            null,
            [["rc_a", ["first answer"]], ["rc_b", ["second answer"]]]
        ]))
    }

    async fn mock_client(server: &MockServer) -> GeminiClient {
        app_page_mock().mount(server).await;
        GeminiClient::builder()
            .secure_1psid("test-psid")
            .config(ClientConfig::default().with_auto_load_cookies(false))
            .endpoints(Endpoints {
                app: server.uri(),
                accounts: server.uri(),
                upload: server.uri(),
            })
            .build()
            .unwrap()
    }

    fn app_page_mock() -> Mock {
        Mock::given(method("GET")).and(path("/app")).respond_with(
            ResponseTemplate::new(200).set_body_string(r#""SNlM0e":"token-123""#),
        )
    }

    #[tokio::test]
    async fn test_send_message_threads_metadata() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        Mock::given(method("POST"))
            .and(path(
                "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(two_candidate_reply()))
            .mount(&server)
            .await;

        let mut chat = client.start_chat();
        assert_eq!(chat.metadata(), &[None, None, None]);

        let output = chat.send_message("hello").await.unwrap();
        assert_eq!(output.text(), "first answer");
        assert_eq!(
            chat.metadata(),
            &[
                Some("c_1".to_string()),
                Some("r_1".to_string()),
                Some("rc_a".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_second_turn_carries_conversation_position() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        Mock::given(method("POST"))
            .and(path(
                "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate",
            ))
            .and(body_string_contains("rc_a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(two_candidate_reply()))
            .mount(&server)
            .await;

        let mut chat = client
            .start_chat()
            .with_metadata("c_1", "r_1", Some("rc_a".to_string()));
        let output = chat.send_message("follow up").await.unwrap();
        assert_eq!(output.text(), "first answer");
    }

    #[tokio::test]
    async fn test_choose_candidate() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        Mock::given(method("POST"))
            .and(path(
                "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(two_candidate_reply()))
            .mount(&server)
            .await;

        let mut chat = client.start_chat();
        chat.send_message("hello").await.unwrap();

        let chosen = chat.choose_candidate(1).unwrap();
        assert_eq!(chosen.text(), "second answer");
        assert_eq!(chat.metadata()[2], Some("rc_b".to_string()));

        let err = chat.choose_candidate(5).unwrap_err();
        assert!(matches!(err, GeminiError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_choose_candidate_before_any_reply_fails() {
        let server = MockServer::start().await;
        let client = mock_client(&server).await;
        let mut chat = client.start_chat();
        let err = chat.choose_candidate(0).unwrap_err();
        assert!(matches!(err, GeminiError::InvalidArgument(_)));
    }
}
