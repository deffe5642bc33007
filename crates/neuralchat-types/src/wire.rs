//! Request and response bodies of the relay HTTP surface.

use serde::{Deserialize, Serialize};

use crate::ChatMessage;

/// Service name that asks the relay to pick a provider round-robin.
pub const AUTO_SERVICE: &str = "auto";

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// Body of `GET /services`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesResponse {
    pub services: Vec<String>,
}

/// Body of `GET /models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// Body of every JSON error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// How an uploaded file is presented to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Text,
    Image,
    Binary,
}

/// Body of a successful `POST /upload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "type")]
    pub kind: UploadKind,
    pub filename: String,
    pub content: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub size: u64,
}

/// One `data:` payload of the `/chat` event stream.
///
/// The first frame names the provider, content frames follow, and the stream
/// ends with either [`StreamFrame::Done`] or a single [`StreamFrame::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Meta { service: String, model: String },
    Content(String),
    Error(String),
    Done,
}

const DONE_MARKER: &str = "[DONE]";

/// Untagged variants are tried in order: a frame carrying an `error` is an
/// error, and `content` wins over a `service` sent alongside it.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FramePayload {
    Error {
        error: String,
    },
    Content {
        content: String,
    },
    Meta {
        service: String,
        #[serde(default)]
        model: String,
    },
}

impl StreamFrame {
    /// Encode the frame as the text following `data: `.
    pub fn to_data(&self) -> String {
        let payload = match self {
            StreamFrame::Done => return DONE_MARKER.to_string(),
            StreamFrame::Meta { service, model } => FramePayload::Meta {
                service: service.clone(),
                model: model.clone(),
            },
            StreamFrame::Content(content) => FramePayload::Content {
                content: content.clone(),
            },
            StreamFrame::Error(error) => FramePayload::Error {
                error: error.clone(),
            },
        };
        // Plain string fields always serialize.
        serde_json::to_string(&payload).unwrap_or_default()
    }

    /// Decode the text following `data: `.
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        let data = data.trim();
        if data == DONE_MARKER {
            return Ok(StreamFrame::Done);
        }
        Ok(match serde_json::from_str::<FramePayload>(data)? {
            FramePayload::Meta { service, model } => StreamFrame::Meta { service, model },
            FramePayload::Content { content } => StreamFrame::Content(content),
            FramePayload::Error { error } => StreamFrame::Error(error),
        })
    }
}
