//! Minimal conversation: cookies come from the environment or a local
//! browser, the chat carries context across turns.
//!
//! ```sh
//! SECURE_1PSID=... cargo run --example basic_usage
//! ```

use gemini_web_client::{GeminiClient, GeminiError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gemini_web_client::logging::init(true, false);

    let client = GeminiClient::new()?;
    if let Err(e) = client.init().await {
        match e {
            GeminiError::Auth(reason) => eprintln!("authentication failed: {reason}"),
            other => eprintln!("initialization failed: {other}"),
        }
        return Ok(());
    }

    let mut chat = client.start_chat();

    let reply = chat.send_message("Hello, how are you today?").await?;
    println!("Gemini: {reply}");

    let reply = chat.send_message("Tell me a short story about AI").await?;
    println!("Gemini: {reply}");

    client.close().await;
    Ok(())
}
