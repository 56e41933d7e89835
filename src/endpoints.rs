//! Endpoints of the web frontend
//!
//! None of these are documented; they are what the official frontend talks to
//! and they move underneath us. The `Endpoints` struct exists so tests can
//! point the client at a local mock server.

/// Generate RPC route, appended to the app base
pub const GENERATE_PATH: &str =
    "/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";

/// Backend version blob the frontend sends with every generate call
pub const BOQ_VERSION: &str = "boq_assistant-bard-web-server_20240625.13_p0";

/// Push channel id required by the upload endpoint
pub const UPLOAD_PUSH_ID: &str = "feeds/mcudyrk2a4khkz";

/// Browser user agent the requests claim to come from
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Base URLs for every remote surface the client touches
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// gemini.google.com
    pub app: String,
    /// accounts.google.com
    pub accounts: String,
    /// content-push.googleapis.com
    pub upload: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            app: "https://gemini.google.com".to_string(),
            accounts: "https://accounts.google.com".to_string(),
            upload: "https://content-push.googleapis.com".to_string(),
        }
    }
}

impl Endpoints {
    pub fn init_url(&self) -> String {
        format!("{}/app", self.app)
    }

    pub fn generate_url(&self) -> String {
        format!("{}{}", self.app, GENERATE_PATH)
    }

    pub fn rotate_cookies_url(&self) -> String {
        format!("{}/RotateCookies", self.accounts)
    }

    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.upload)
    }
}
