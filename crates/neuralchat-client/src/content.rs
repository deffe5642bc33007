//! Builds the text actually sent to a provider for each message.
//!
//! Attached file content is injected here on every submission and never
//! written back into the stored message.

use neuralchat_types::{ChatMessage, UploadKind};

use crate::model::{Conversation, Message};

/// Longest file text injected into a request, in characters.
pub const MAX_FILE_CHARS: usize = 8000;

/// Keep the head and tail of long file text around a truncation notice.
pub fn truncate_file_content(text: &str) -> String {
    let total = text.chars().count();
    if total <= MAX_FILE_CHARS {
        return text.to_string();
    }
    let half = MAX_FILE_CHARS / 2;
    let head: String = text.chars().take(half).collect();
    let tail: String = text.chars().skip(total - half).collect();
    format!("{head}\n\n[... content truncated: {total} characters total ...]\n\n{tail}")
}

/// The provider-facing content of a message: typed text plus file blocks.
pub fn build_api_content(message: &Message) -> String {
    if message.files.is_empty() {
        return message.content.clone();
    }

    let mut extra = String::new();
    for file in &message.files {
        match (file.display_type, file.content.as_deref()) {
            (UploadKind::Image, _) => {
                extra.push_str(&format!("[Attached image: {}]\n", file.name));
            }
            (_, Some(text)) if !text.is_empty() => {
                extra.push_str(&format!("\n--- File: {} ---\n{}\n---\n", file.name, text));
            }
            (UploadKind::Binary, _) => {
                extra.push_str(&format!(
                    "[Attached binary file: {} ({})]\n",
                    file.name, file.mime_type
                ));
            }
            _ => {}
        }
    }

    let mut content = String::new();
    if !message.content.is_empty() {
        content.push_str(&message.content);
        content.push_str("\n\n");
    }
    content.push_str(extra.trim());
    content
}

/// The message list for `POST /chat`: system prompt first, then every message.
pub fn api_messages(conversation: &Conversation) -> Vec<ChatMessage> {
    let system = (!conversation.system_prompt.is_empty())
        .then(|| ChatMessage::system(conversation.system_prompt.clone()));

    system
        .into_iter()
        .chain(
            conversation
                .messages
                .iter()
                .map(|m| ChatMessage::new(m.role, build_api_content(m))),
        )
        .collect()
}
