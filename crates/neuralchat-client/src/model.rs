//! Client-side conversation model and its persisted form.

use std::collections::BTreeMap;

use neuralchat_types::{AUTO_SERVICE, ProviderKind, Role, UploadKind, UploadResponse};
use serde::{Deserialize, Serialize};

use crate::content::truncate_file_content;

/// Title of a conversation that has no user message yet.
pub const DEFAULT_TITLE: &str = "New conversation";

/// Storage key of the current state layout.
pub const STORAGE_KEY: &str = "neuralchat_v2";

/// Storage key of the previous layout, read when the current key is absent.
pub const LEGACY_STORAGE_KEY: &str = "neuralchat_state";

const TITLE_CHARS: usize = 48;

// ============================================================================
// Conversation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system_prompt: String,
    /// Unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
    /// Display name of the provider that answered last.
    #[serde(default)]
    pub used_service: Option<String>,
    #[serde(default)]
    pub pinned: bool,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

impl Conversation {
    pub fn new(id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            title: default_title(),
            messages: Vec::new(),
            system_prompt: String::new(),
            created_at,
            used_service: None,
            pinned: false,
        }
    }

    /// Derive the title from the first user message while it is still the default.
    pub fn update_title(&mut self) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        let Some(first) = self.messages.iter().find(|m| m.role == Role::User) else {
            return;
        };
        let raw = first.typed_text();
        let mut title: String = raw.chars().take(TITLE_CHARS).collect::<String>().replace('\n', " ");
        if raw.chars().count() > TITLE_CHARS {
            title.push('…');
        }
        self.title = title;
    }

    /// Whether the title or any message text contains `needle` (already lower-cased).
    pub fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self
                .messages
                .iter()
                .any(|m| m.text().to_lowercase().contains(needle))
    }
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Exactly what the user typed. Never contains injected file content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,
    /// Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>, files: Vec<FileAttachment>, timestamp: i64) -> Self {
        let text = text.into();
        Self {
            role: Role::User,
            content: text.clone(),
            display_text: Some(text.clone()),
            raw_text: Some(text),
            files,
            timestamp: Some(timestamp),
            service: None,
            model: None,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            display_text: None,
            raw_text: None,
            files: Vec::new(),
            timestamp: Some(timestamp),
            service: None,
            model: None,
        }
    }

    /// The text as typed or received, before any trimming.
    pub fn typed_text(&self) -> &str {
        [self.display_text.as_deref(), self.raw_text.as_deref()]
            .into_iter()
            .flatten()
            .find(|t| !t.is_empty())
            .unwrap_or(&self.content)
    }

    /// Readable text of the message, trimmed.
    pub fn text(&self) -> &str {
        self.typed_text().trim()
    }

    /// Replace the text of a user message.
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.content = text.clone();
        self.display_text = Some(text.clone());
        self.raw_text = Some(text);
    }
}

// ============================================================================
// FileAttachment
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub size: Option<u64>,
    pub display_type: UploadKind,
    /// Base64 image data kept for thumbnails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    /// Truncated text injected into provider requests. Never persisted.
    #[serde(skip)]
    pub content: Option<String>,
}

impl FileAttachment {
    pub fn from_upload(upload: &UploadResponse) -> Self {
        let (preview, content) = match upload.kind {
            UploadKind::Image => (Some(upload.content.clone()), None),
            UploadKind::Text => (None, Some(truncate_file_content(&upload.content))),
            UploadKind::Binary => (None, None),
        };
        Self {
            name: upload.filename.clone(),
            mime_type: upload.mime_type.clone(),
            size: Some(upload.size),
            display_type: upload.kind,
            preview,
            content,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Per-provider credentials held by the client and sent as request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default, rename = "key")]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub enabled: bool,
}

impl ServiceConfig {
    pub fn for_provider(kind: ProviderKind) -> Self {
        Self {
            api_key: String::new(),
            model: kind.default_model().to_string(),
            enabled: false,
        }
    }

    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }
}

// ============================================================================
// PersistedState
// ============================================================================

/// Everything the client stores between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub conversations: BTreeMap<String, Conversation>,
    #[serde(default)]
    pub current_id: Option<String>,
    #[serde(default = "default_service")]
    pub selected_service: String,
    #[serde(default)]
    pub theme: Theme,
    /// Keyed by provider id. Unknown ids are ignored on load.
    #[serde(default)]
    pub api_keys: BTreeMap<String, ServiceConfig>,
}

fn default_service() -> String {
    AUTO_SERVICE.to_string()
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            conversations: BTreeMap::new(),
            current_id: None,
            selected_service: default_service(),
            theme: Theme::default(),
            api_keys: default_api_keys(),
        }
    }
}

pub fn default_api_keys() -> BTreeMap<String, ServiceConfig> {
    ProviderKind::ALL
        .into_iter()
        .map(|kind| (kind.id().to_string(), ServiceConfig::for_provider(kind)))
        .collect()
}

impl PersistedState {
    /// Normalize state read from storage.
    ///
    /// User messages get their text restored from `rawText`, file payloads
    /// are dropped, and saved credentials are merged over the defaults for
    /// known providers only.
    pub fn migrate(mut self) -> Self {
        for conversation in self.conversations.values_mut() {
            for message in &mut conversation.messages {
                if message.role == Role::User
                    && let Some(raw) = message.raw_text.clone()
                {
                    if !raw.is_empty() {
                        message.content = raw.clone();
                    }
                    let display = if raw.is_empty() {
                        message
                            .display_text
                            .clone()
                            .filter(|d| !d.is_empty())
                            .unwrap_or_else(|| message.content.clone())
                    } else {
                        raw
                    };
                    message.display_text = Some(display);
                }
                for file in &mut message.files {
                    file.content = None;
                }
            }
        }

        let mut api_keys = default_api_keys();
        for (id, saved) in std::mem::take(&mut self.api_keys) {
            let Ok(kind) = id.parse::<ProviderKind>() else {
                continue;
            };
            let mut merged = saved;
            if merged.model.trim().is_empty() {
                merged.model = kind.default_model().to_string();
            }
            api_keys.insert(kind.id().to_string(), merged);
        }
        self.api_keys = api_keys;

        if self.selected_service.trim().is_empty() {
            self.selected_service = default_service();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_derived_from_first_user_message() {
        let mut conversation = Conversation::new("conv_1", 0);
        conversation.update_title();
        assert_eq!(conversation.title, DEFAULT_TITLE);

        conversation
            .messages
            .push(Message::user("Plan a trip\nto Lisbon", Vec::new(), 1));
        conversation.update_title();
        assert_eq!(conversation.title, "Plan a trip to Lisbon");

        // Only a default title is replaced.
        conversation.messages[0].set_text("Something else");
        conversation.update_title();
        assert_eq!(conversation.title, "Plan a trip to Lisbon");
    }

    #[test]
    fn long_titles_are_cut_at_48_characters() {
        let mut conversation = Conversation::new("conv_1", 0);
        let text = "é".repeat(60);
        conversation.messages.push(Message::user(&text, Vec::new(), 1));
        conversation.update_title();
        assert_eq!(conversation.title, format!("{}…", "é".repeat(48)));
    }

    #[test]
    fn file_content_is_never_serialized() {
        let upload = UploadResponse {
            kind: UploadKind::Text,
            filename: "notes.md".to_string(),
            content: "secret body".to_string(),
            mime_type: "text/markdown".to_string(),
            size: 11,
        };
        let attachment = FileAttachment::from_upload(&upload);
        assert_eq!(attachment.content.as_deref(), Some("secret body"));

        let json = serde_json::to_string(&attachment).unwrap();
        assert!(!json.contains("secret body"));
        assert!(json.contains("\"displayType\":\"text\""));
    }

    #[test]
    fn images_keep_a_preview() {
        let upload = UploadResponse {
            kind: UploadKind::Image,
            filename: "cat.png".to_string(),
            content: "iVBORw==".to_string(),
            mime_type: "image/png".to_string(),
            size: 4,
        };
        let attachment = FileAttachment::from_upload(&upload);
        assert_eq!(attachment.preview.as_deref(), Some("iVBORw=="));
        assert!(attachment.content.is_none());
    }

    #[test]
    fn migrate_restores_raw_text_and_merges_keys() {
        let saved = r#"{
            "conversations": {
                "conv_1": {
                    "id": "conv_1",
                    "title": "Old",
                    "createdAt": 1,
                    "messages": [
                        {"role": "user", "content": "hi\n\n--- File: a.txt ---\nx\n---", "rawText": "hi"}
                    ]
                }
            },
            "currentId": "conv_1",
            "apiKeys": {
                "groq": {"key": "gsk", "model": "", "enabled": true},
                "mistral": {"key": "nope"}
            }
        }"#;
        let state: PersistedState = serde_json::from_str(saved).unwrap();
        let state = state.migrate();

        let message = &state.conversations["conv_1"].messages[0];
        assert_eq!(message.content, "hi");
        assert_eq!(message.display_text.as_deref(), Some("hi"));

        assert_eq!(state.api_keys.len(), 3);
        assert_eq!(state.api_keys["groq"].api_key, "gsk");
        assert_eq!(
            state.api_keys["groq"].model,
            ProviderKind::Groq.default_model()
        );
        assert_eq!(state.api_keys["cerebras"].model, "gpt-oss-120b");
        assert_eq!(state.selected_service, "auto");
        assert_eq!(state.theme, Theme::Dark);
    }
}
