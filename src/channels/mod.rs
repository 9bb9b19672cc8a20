//! Outbound message delivery.

pub mod whatsapp;

pub use whatsapp::WhatsAppChannel;

use async_trait::async_trait;

use crate::error::ChannelError;

/// Per-message body limit imposed by the WhatsApp transport.
pub const MAX_BODY_LENGTH: usize = 1590;

/// Outbound delivery boundary. Implementations must deliver chunks of a
/// long body sequentially, in order.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), ChannelError>;
}

/// Split a body into chunks of at most `max_len` characters, preferring
/// newline then space break points. Char-boundary safe.
pub fn split_body(text: &str, max_len: usize) -> Vec<String> {
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Byte offset of the max_len-th char; never lands mid-codepoint.
        let hard_cut = remaining
            .char_indices()
            .nth(max_len)
            .map(|(idx, _)| idx)
            .unwrap_or(remaining.len());

        let window = &remaining[..hard_cut];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&idx| idx > 0)
            .unwrap_or(hard_cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}
