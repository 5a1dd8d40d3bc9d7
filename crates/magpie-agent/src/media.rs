//! Inline image handling for reply turns.
//!
//! Fetches the replied-to image through the chat service (which decrypts
//! when needed), guards the decoded size, and wraps the bytes in a `data:`
//! URL content part for the multimodal user message.

use base64::Engine;
use thiserror::Error;
use tracing::debug;

use crate::chat::ChatService;
use crate::provider::{ContentPart, ImageUrl};

/// Largest decoded image accepted inline. Exactly this size passes; one
/// byte over falls back to a text-only turn.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// System note appended when the size guard rejects the image.
pub const IMAGE_TOO_LARGE_NOTE: &str = "image was too large to process (>5MB)";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("image too large: {size} bytes")]
    TooLarge { size: usize },

    #[error("image retrieval failed: {0}")]
    Fetch(String),
}

/// Fetch the image behind `event_id` and return it as an inline content part.
pub async fn fetch_reply_image(
    chat: &dyn ChatService,
    conversation_id: &str,
    event_id: &str,
) -> Result<ContentPart, MediaError> {
    let image = chat
        .event_image(conversation_id, event_id)
        .await
        .map_err(|e| MediaError::Fetch(e.to_string()))?;
    let bytes = chat
        .download_media(&image)
        .await
        .map_err(|e| MediaError::Fetch(e.to_string()))?;

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::TooLarge { size: bytes.len() });
    }

    let mime = image
        .info
        .get("mimetype")
        .and_then(|m| m.as_str())
        .unwrap_or("image/png");
    debug!(
        event = event_id,
        size = bytes.len(),
        mime,
        "inlining reply image"
    );

    let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{mime};base64,{b64}"),
        },
    })
}
