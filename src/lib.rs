//! Unofficial async client for the Gemini web app
//!
//! Authenticates with the `__Secure-1PSID` / `__Secure-1PSIDTS` browser
//! session cookies and mimics the requests of the official web frontend.
//! Cookies can be passed explicitly, read from the environment, or loaded
//! from the cookie stores of locally installed browsers.
//!
//! ```no_run
//! use gemini_web_client::GeminiClient;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GeminiClient::new()?;
//! client.init().await?;
//!
//! let mut chat = client.start_chat();
//! let reply = chat.send_message("Hello!").await?;
//! println!("{}", reply.text());
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! The wire protocol is private and unstable; expect breakage when the
//! frontend changes.

mod auth;
mod chat;
mod client;
pub mod config;
pub mod cookies;
mod endpoints;
mod error;
pub mod logging;
mod model;
mod types;
mod upload;

pub use chat::ChatSession;
pub use client::{GeminiClient, GeminiClientBuilder};
pub use config::ClientConfig;
pub use cookies::{load_browser_cookies, Browser};
pub use endpoints::Endpoints;
pub use error::{GeminiError, Result};
pub use model::Model;
pub use types::{Candidate, GeneratedImage, Image, ModelOutput, WebImage};
