//! Model selection, file attachments, and image handling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gemini_web_client::{GeminiClient, GeminiError, Model};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gemini_web_client::logging::init(true, false);

    let client = GeminiClient::builder()
        .model(Model::G25Pro)
        .timeout(Duration::from_secs(60))
        .build()?;
    client.init().await?;

    let mut chat = client.start_chat();

    // Attach a document when one is present next to the binary
    let document = Path::new("assets/sample.pdf");
    if document.exists() {
        match chat
            .send_message_with_files("What's in this document?", &[PathBuf::from(document)])
            .await
        {
            Ok(reply) => println!("Gemini: {reply}"),
            Err(GeminiError::Parse(reason)) => eprintln!("could not read the reply: {reason}"),
            Err(other) => return Err(other.into()),
        }
    }

    let reply = chat
        .send_message("Generate an image of a mountain landscape")
        .await?;
    let images = reply.images();
    if images.is_empty() {
        println!("no images were generated");
        println!("Gemini: {reply}");
    } else {
        println!("generated {} image(s)", images.len());
        for (i, image) in images.iter().enumerate() {
            let saved = image
                .save(Path::new("output"), Some(&format!("generated_{i}.png")))
                .await?;
            println!("saved {}", saved.display());
        }
    }

    client.close().await;
    Ok(())
}
