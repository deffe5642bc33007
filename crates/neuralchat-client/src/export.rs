//! Conversation export in Markdown, JSON and plain text, and JSON import.

use std::str::FromStr;

use chrono::{DateTime, Local, Utc};
use neuralchat_types::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Conversation, Message};

const FILE_TITLE_CHARS: usize = 30;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unknown export format '{0}'")]
    UnknownFormat(String),

    #[error("invalid conversation export: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "md",
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown",
            ExportFormat::Json => "application/json",
            ExportFormat::Text => "text/plain",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            "json" => Ok(ExportFormat::Json),
            "text" | "txt" => Ok(ExportFormat::Text),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// The JSON export document.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument {
    title: String,
    #[serde(default)]
    exported_at: Option<String>,
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExportMessage {
    role: Role,
    #[serde(default)]
    content: String,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

pub fn export(
    conversation: &Conversation,
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<String, ExportError> {
    match format {
        ExportFormat::Markdown => Ok(export_markdown(conversation, exported_at)),
        ExportFormat::Json => export_json(conversation, exported_at),
        ExportFormat::Text => Ok(export_text(conversation, exported_at)),
    }
}

fn local_stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn provenance(message: &Message) -> Option<String> {
    let service = message.service.as_deref()?;
    Some(match message.model.as_deref() {
        Some(model) => format!("{service} · {model}"),
        None => service.to_string(),
    })
}

pub fn export_markdown(conversation: &Conversation, exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "# {}\n\n_Exported: {}_\n\n---\n\n",
        conversation.title,
        local_stamp(exported_at)
    );
    if !conversation.system_prompt.is_empty() {
        out.push_str(&format!(
            "**System Prompt:** {}\n\n---\n\n",
            conversation.system_prompt
        ));
    }
    for message in &conversation.messages {
        let heading = match message.role {
            Role::User => "👤 You".to_string(),
            _ => match provenance(message) {
                Some(p) => format!("🤖 Assistant ({p})"),
                None => "🤖 Assistant".to_string(),
            },
        };
        out.push_str(&format!(
            "## {heading}\n\n{}\n\n---\n\n",
            message.typed_text()
        ));
    }
    out
}

pub fn export_json(
    conversation: &Conversation,
    exported_at: DateTime<Utc>,
) -> Result<String, ExportError> {
    let document = ExportDocument {
        title: conversation.title.clone(),
        exported_at: Some(exported_at.to_rfc3339()),
        system_prompt: conversation.system_prompt.clone(),
        messages: conversation
            .messages
            .iter()
            .map(|m| ExportMessage {
                role: m.role,
                content: m.typed_text().to_string(),
                service: m.service.clone(),
                model: m.model.clone(),
                timestamp: m.timestamp,
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn export_text(conversation: &Conversation, exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "{}\nExported: {}\n{}\n\n",
        conversation.title,
        local_stamp(exported_at),
        "=".repeat(50)
    );
    for message in &conversation.messages {
        let label = match (message.role, message.service.as_deref()) {
            (Role::User, _) => "YOU".to_string(),
            (_, Some(service)) => format!("ASSISTANT - {service}"),
            (_, None) => "ASSISTANT".to_string(),
        };
        out.push_str(&format!(
            "[{label}]\n{}\n\n{}\n\n",
            message.typed_text(),
            "-".repeat(40)
        ));
    }
    out
}

/// `neuralchat-<title>.<ext>` with the title cut to 30 characters and
/// whitespace runs replaced by dashes.
pub fn export_file_name(conversation: &Conversation, format: ExportFormat) -> String {
    let title: String = conversation.title.chars().take(FILE_TITLE_CHARS).collect();
    let slug = title.split_whitespace().collect::<Vec<_>>().join("-");
    format!("neuralchat-{slug}.{}", format.extension())
}

/// Rebuild a conversation from a JSON export.
pub fn import_json(json: &str, id: &str, created_at: i64) -> Result<Conversation, ExportError> {
    let document: ExportDocument = serde_json::from_str(json)?;

    let mut conversation = Conversation::new(id, created_at);
    conversation.title = document.title;
    conversation.system_prompt = document.system_prompt;
    conversation.messages = document
        .messages
        .into_iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let timestamp = m.timestamp.unwrap_or(created_at);
            let mut message = match m.role {
                Role::User => Message::user(m.content, Vec::new(), timestamp),
                _ => Message::assistant(m.content, timestamp),
            };
            message.service = m.service;
            message.model = m.model;
            message
        })
        .collect();
    conversation.used_service = conversation
        .messages
        .iter()
        .rev()
        .find_map(|m| m.service.clone());
    Ok(conversation)
}
