//! Newline-delimited JSON framing: one `Message` per line.

use crate::error::ChordError;
use crate::network::Message;
use anyhow::Context;

/// Upper bound on a single frame; longer lines are rejected as malformed.
pub const MAX_FRAME_BYTES: usize = 1 << 20;

/// Encodes a message into a single frame, including the trailing newline.
pub fn encode(message: &Message) -> anyhow::Result<Vec<u8>> {
    let mut frame = serde_json::to_vec(message)
        .with_context(|| format!("failed to encode {} message", message.payload.kind()))?;
    frame.push(b'\n');
    Ok(frame)
}

/// Decodes one frame. Surrounding whitespace, including the newline terminator, is ignored.
/// Any failure is reported as `ChordError::MalformedMessage`.
pub fn decode(frame: &[u8]) -> Result<Message, ChordError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(ChordError::MalformedMessage(format!(
            "frame of {} bytes exceeds the {} byte limit",
            frame.len(),
            MAX_FRAME_BYTES
        )));
    }
    let text = std::str::from_utf8(frame)
        .map_err(|e| ChordError::MalformedMessage(format!("frame is not utf-8: {}", e)))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(ChordError::MalformedMessage("empty frame".to_string()));
    }
    serde_json::from_str(text).map_err(|e| ChordError::MalformedMessage(e.to_string()))
}
