//! View models for the conversation list and the message thread.
//!
//! Views are recomputed from store state on demand. Message bodies are HTML:
//! user text is escaped, assistant text is rendered as Markdown.

use chrono::{DateTime, Local, Utc};
use neuralchat_types::{ProviderKind, Role};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd, html};

use crate::model::{Conversation, FileAttachment, Message};
use crate::store::ConversationStore;

const PREVIEW_CHARS: usize = 60;
const SHORT_MODEL_CHARS: usize = 24;
const NO_MESSAGES: &str = "No messages";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationItem {
    pub id: String,
    pub icon: &'static str,
    pub title: String,
    pub preview: String,
    /// Relative creation time; empty for conversations without messages.
    pub time: String,
    pub active: bool,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub index: usize,
    pub role: Role,
    pub author: &'static str,
    pub html: String,
    /// `Service · shortModel` for assistant messages with provenance.
    pub service_tag: Option<String>,
    pub time: String,
    pub files: Vec<FileChip>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChip {
    pub name: String,
    pub icon: &'static str,
    pub label: String,
    pub size: String,
    /// `data:` URI for image thumbnails.
    pub thumbnail: Option<String>,
}

// ============================================================================
// Conversation list
// ============================================================================

/// Items for the sidebar, filtered by the search query, pinned first then newest.
pub fn conversation_list(store: &ConversationStore, now: DateTime<Utc>) -> Vec<ConversationItem> {
    let current = store.current_id();
    store
        .sorted_conversations()
        .into_iter()
        .map(|c| ConversationItem {
            id: c.id.clone(),
            icon: conversation_icon(c),
            title: c.title.clone(),
            preview: preview(c),
            time: if c.messages.is_empty() {
                String::new()
            } else {
                relative_time(c.created_at, now)
            },
            active: current == Some(c.id.as_str()),
            pinned: c.pinned,
        })
        .collect()
}

pub fn conversation_icon(conversation: &Conversation) -> &'static str {
    if conversation.pinned {
        return "📌";
    }
    if conversation.messages.is_empty() {
        return "💬";
    }
    match conversation
        .used_service
        .as_deref()
        .and_then(ProviderKind::from_display_name)
    {
        Some(ProviderKind::Groq) => "⚡",
        Some(ProviderKind::Cerebras) => "🧠",
        Some(ProviderKind::OpenRouter) => "🌐",
        None => "💬",
    }
}

fn preview(conversation: &Conversation) -> String {
    let text = conversation
        .messages
        .iter()
        .rev()
        .find(|m| m.role != Role::System)
        .map(Message::text)
        .unwrap_or_default();
    if text.is_empty() {
        return NO_MESSAGES.to_string();
    }
    text.chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

/// `now`, `Nm`, `Nh`, `Nd` within a week, then the local day and month.
pub fn relative_time(timestamp_ms: i64, now: DateTime<Utc>) -> String {
    let diff = now.timestamp_millis() - timestamp_ms;
    let minutes = diff / 60_000;
    let hours = diff / 3_600_000;
    let days = diff / 86_400_000;
    if minutes < 1 {
        "now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m")
    } else if hours < 24 {
        format!("{hours}h")
    } else if days < 7 {
        format!("{days}d")
    } else {
        DateTime::from_timestamp_millis(timestamp_ms)
            .map(|t| t.with_timezone(&Local).format("%-d %b").to_string())
            .unwrap_or_default()
    }
}

// ============================================================================
// Messages
// ============================================================================

pub fn message_views(conversation: &Conversation) -> Vec<MessageView> {
    conversation
        .messages
        .iter()
        .enumerate()
        .map(|(index, message)| message_view(index, message))
        .collect()
}

pub fn message_view(index: usize, message: &Message) -> MessageView {
    let is_user = message.role == Role::User;
    let html = if is_user {
        escape_html(message.typed_text()).replace('\n', "<br>")
    } else {
        render_markdown(&message.content)
    };
    let service_tag = match (is_user, message.service.as_deref()) {
        (false, Some(service)) => Some(match message.model.as_deref() {
            Some(model) if !model.is_empty() => format!("{service} · {}", shorten_model(model)),
            _ => service.to_string(),
        }),
        _ => None,
    };
    MessageView {
        index,
        role: message.role,
        author: if is_user { "You" } else { "Assistant" },
        html,
        service_tag,
        time: message.timestamp.map(format_time).unwrap_or_default(),
        files: message.files.iter().map(file_chip).collect(),
    }
}

fn format_time(timestamp_ms: i64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}

fn file_chip(file: &FileAttachment) -> FileChip {
    FileChip {
        name: file.name.clone(),
        icon: file_icon(&file.mime_type),
        label: file_label(&file.mime_type, &file.name),
        size: file.size.map(format_file_size).unwrap_or_default(),
        thumbnail: file
            .preview
            .as_ref()
            .map(|data| format!("data:{};base64,{data}", file.mime_type)),
    }
}

/// Render Markdown to HTML. Soft breaks become `<br />`, raw HTML is escaped
/// and code blocks get a header naming their language.
pub fn render_markdown(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut events = Vec::new();
    for event in Parser::new_ext(text, options) {
        match event {
            Event::SoftBreak => events.push(Event::HardBreak),
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match &kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or_default().to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                let lang = if lang.is_empty() { "text".to_string() } else { lang };
                events.push(Event::Html(
                    format!(
                        "<div class=\"code-block\"><div class=\"code-block-header\"><span class=\"code-lang\">{}</span></div>",
                        escape_html(&lang)
                    )
                    .into(),
                ));
                events.push(Event::Start(Tag::CodeBlock(kind)));
            }
            Event::End(TagEnd::CodeBlock) => {
                events.push(Event::End(TagEnd::CodeBlock));
                events.push(Event::Html("</div>".into()));
            }
            other => events.push(other),
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Last path segment, without a `:tag` suffix, at most 24 characters.
pub fn shorten_model(model: &str) -> String {
    let name = model.rsplit('/').next().unwrap_or(model);
    let name = name.split(':').next().unwrap_or(name);
    let short: String = name.chars().take(SHORT_MODEL_CHARS).collect();
    if short.is_empty() {
        model.to_string()
    } else {
        short
    }
}

pub fn file_icon(mime_type: &str) -> &'static str {
    if mime_type.is_empty() {
        "📎"
    } else if mime_type.starts_with("image/") {
        "🖼️"
    } else if mime_type == "application/pdf" {
        "📄"
    } else if mime_type.contains("json") {
        "🔧"
    } else if mime_type.contains("csv") {
        "📊"
    } else if ["python", "javascript", "typescript"]
        .iter()
        .any(|lang| mime_type.contains(lang))
    {
        "💻"
    } else if mime_type.starts_with("text/") {
        "📝"
    } else {
        "📎"
    }
}

pub fn file_label(mime_type: &str, filename: &str) -> String {
    if mime_type.is_empty() {
        return "File".to_string();
    }
    if let Some(subtype) = mime_type.strip_prefix("image/") {
        return subtype.to_uppercase();
    }
    if mime_type == "application/pdf" {
        return "PDF".to_string();
    }
    if mime_type.contains("json") {
        return "JSON".to_string();
    }
    if mime_type.contains("csv") {
        return "CSV".to_string();
    }
    if let Some((_, ext)) = filename.rsplit_once('.')
        && !ext.is_empty()
    {
        return ext.to_uppercase();
    }
    if mime_type.starts_with("text/") {
        "TEXT".to_string()
    } else {
        "FILE".to_string()
    }
}

/// `B` below 1 KiB, then `KB` and `MB` with one decimal. Zero renders empty.
pub fn format_file_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    match bytes {
        0 => String::new(),
        b if b < KIB => format!("{b} B"),
        b if b < MIB => format!("{:.1} KB", b as f64 / KIB as f64),
        b => format!("{:.1} MB", b as f64 / MIB as f64),
    }
}
