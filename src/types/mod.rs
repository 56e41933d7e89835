//! Structured objects parsed out of generate responses

mod image;
mod response;

pub use image::{GeneratedImage, Image, WebImage};
pub use response::{Candidate, ModelOutput};

pub(crate) use response::parse_response;
