//! Parsing of generate responses
//!
//! The endpoint answers with a `)]}'` anti-XSSI prefix followed by a JSON
//! array whose parts carry doubly-encoded JSON payloads. Nothing about the
//! shape is documented or stable; the parser navigates by index, tolerates
//! missing branches, and only errors when it cannot find any candidate at
//! all.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{GeminiError, Result};
use crate::types::image::{GeneratedImage, Image, WebImage};

/// Envelope error codes the service is known to emit
const ERROR_USAGE_LIMIT: i64 = 1037;
const ERROR_MODEL_INVALID: i64 = 1052;
const ERROR_IP_BLOCKED: i64 = 1060;

/// One reply candidate inside a response
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Reply candidate id, threaded back for follow-up requests
    pub rcid: String,
    pub text: String,
    /// Reasoning trace, present for thinking models
    pub thoughts: Option<String>,
    pub web_images: Vec<WebImage>,
    pub generated_images: Vec<GeneratedImage>,
}

impl Candidate {
    pub fn images(&self) -> Vec<Image> {
        self.web_images
            .iter()
            .cloned()
            .map(Image::Web)
            .chain(self.generated_images.iter().cloned().map(Image::Generated))
            .collect()
    }
}

/// Parsed output of one generate request
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// Conversation metadata `[cid, rid]` for follow-up requests
    pub metadata: Vec<String>,
    pub candidates: Vec<Candidate>,
    pub(crate) chosen: usize,
}

impl ModelOutput {
    /// The selected candidate, or the first one if the selection index no
    /// longer matches the candidate list. `None` only when the list is empty.
    pub fn chosen_candidate(&self) -> Option<&Candidate> {
        self.candidates.get(self.chosen).or_else(|| self.candidates.first())
    }

    /// Index of the currently selected candidate
    pub fn chosen(&self) -> usize {
        self.chosen
    }

    /// Text of the chosen candidate
    pub fn text(&self) -> &str {
        self.chosen_candidate().map(|c| c.text.as_str()).unwrap_or("")
    }

    pub fn thoughts(&self) -> Option<&str> {
        self.chosen_candidate().and_then(|c| c.thoughts.as_deref())
    }

    pub fn images(&self) -> Vec<Image> {
        self.chosen_candidate().map(Candidate::images).unwrap_or_default()
    }

    pub fn rcid(&self) -> Option<&str> {
        self.chosen_candidate().map(|c| c.rcid.as_str())
    }
}

impl std::fmt::Display for ModelOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// Index walk through nested arrays
fn path<'a>(value: &'a Value, indices: &[usize]) -> Option<&'a Value> {
    indices.iter().try_fold(value, |acc, &i| acc.get(i))
}

fn path_str(value: &Value, indices: &[usize]) -> Option<String> {
    path(value, indices).and_then(Value::as_str).map(str::to_string)
}

/// Parse the raw response text of a generate call
pub(crate) fn parse_response(
    raw: &str,
    model_name: &str,
    cookies: &HashMap<String, String>,
) -> Result<ModelOutput> {
    let line = raw
        .lines()
        .nth(2)
        .ok_or_else(|| GeminiError::Parse(format!("response too short: {}", snippet(raw))))?;
    let outer: Value = serde_json::from_str(line)
        .map_err(|e| GeminiError::Parse(format!("envelope is not JSON ({e}): {}", snippet(line))))?;

    // Each part's third element is a JSON document of its own; the one whose
    // index 4 holds candidates is the reply body.
    let parts: Vec<Value> = outer
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get(2))
                .filter_map(Value::as_str)
                .filter_map(|payload| serde_json::from_str(payload).ok())
                .collect()
        })
        .unwrap_or_default();

    let body = parts.iter().find(|part| {
        path(part, &[4])
            .and_then(Value::as_array)
            .map(|candidates| !candidates.is_empty())
            .unwrap_or(false)
    });

    let Some(body) = body else {
        return Err(envelope_error(&parts, model_name, raw));
    };

    let metadata = path(body, &[1])
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let raw_candidates = path(body, &[4]).and_then(Value::as_array).cloned().unwrap_or_default();
    let mut candidates = Vec::with_capacity(raw_candidates.len());
    for (index, candidate) in raw_candidates.iter().enumerate() {
        candidates.push(parse_candidate(candidate, index, &parts, cookies)?);
    }

    if candidates.is_empty() {
        return Err(GeminiError::Parse(format!(
            "no candidates in response: {}",
            snippet(raw)
        )));
    }

    Ok(ModelOutput {
        metadata,
        candidates,
        chosen: 0,
    })
}

fn parse_candidate(
    candidate: &Value,
    index: usize,
    parts: &[Value],
    cookies: &HashMap<String, String>,
) -> Result<Candidate> {
    let rcid = path_str(candidate, &[0]).unwrap_or_default();
    let mut text = path_str(candidate, &[1, 0]).unwrap_or_default();

    // Card answers (weather, sports) put a placeholder link in the text slot
    // and the rendered content elsewhere
    if text.starts_with("http://googleusercontent.com/card_content/") {
        if let Some(card) = path_str(candidate, &[22, 0]) {
            text = card;
        }
    }
    if text.contains("\\n") {
        text = text.replace("\\n", "\n");
    }

    let thoughts = path_str(candidate, &[37, 0, 0])
        .or_else(|| path_str(candidate, &[37, 0, 1]))
        .map(strip_html);

    let web_images = path(candidate, &[12, 1])
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|img| {
                    Some(WebImage {
                        url: path_str(img, &[0, 0, 0])?,
                        title: path_str(img, &[7, 0]).unwrap_or_default(),
                        alt: path_str(img, &[0, 4]).unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let generated_images = parse_generated_images(candidate, index, parts, cookies)?;

    Ok(Candidate {
        rcid,
        text,
        thoughts,
        web_images,
        generated_images,
    })
}

/// Generated images may arrive in the candidate itself or, for streaming
/// responses, in a later part of the same envelope
fn parse_generated_images(
    candidate: &Value,
    index: usize,
    parts: &[Value],
    cookies: &HashMap<String, String>,
) -> Result<Vec<GeneratedImage>> {
    if path(candidate, &[12, 7]).map(Value::is_null).unwrap_or(true) {
        return Ok(Vec::new());
    }

    let images = path(candidate, &[12, 7, 0])
        .and_then(Value::as_array)
        .filter(|imgs| !imgs.is_empty())
        .or_else(|| {
            parts.iter().find_map(|part| {
                path(part, &[4, index, 12, 7, 0])
                    .and_then(Value::as_array)
                    .filter(|imgs| !imgs.is_empty())
            })
        })
        .ok_or_else(|| {
            GeminiError::ImageGeneration(
                "the response reported generated images but carried none".into(),
            )
        })?;

    let mut generated = Vec::with_capacity(images.len());
    for (image_index, img) in images.iter().enumerate() {
        let Some(url) = path_str(img, &[0, 3, 3]) else {
            continue;
        };
        let title = path_str(img, &[3, 6])
            .map(|t| format!("[Generated image {t}]"))
            .unwrap_or_else(|| "[Generated image]".to_string());
        let alt = path_str(img, &[3, 5, image_index])
            .or_else(|| path_str(img, &[3, 5, 0]))
            .unwrap_or_default();
        generated.push(GeneratedImage {
            url,
            title,
            alt,
            cookies: cookies.clone(),
        });
    }

    if generated.is_empty() {
        return Err(GeminiError::ImageGeneration(
            "generated image entries were present but unreadable".into(),
        ));
    }
    Ok(generated)
}

/// Map a reply without candidates to a typed error via the envelope code
fn envelope_error(parts: &[Value], model_name: &str, raw: &str) -> GeminiError {
    let code = parts
        .iter()
        .find_map(|part| path(part, &[10, 0]).and_then(Value::as_i64));

    match code {
        Some(ERROR_USAGE_LIMIT) => GeminiError::UsageLimitExceeded(model_name.to_string()),
        Some(ERROR_MODEL_INVALID) => GeminiError::ModelInvalid(model_name.to_string()),
        Some(ERROR_IP_BLOCKED) => GeminiError::TemporarilyBlocked,
        Some(other) => GeminiError::Api(format!("service reported error code {other}")),
        None => GeminiError::Parse(format!("no reply body in response: {}", snippet(raw))),
    }
}

fn strip_html(text: String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn snippet(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}…")
    }
}
