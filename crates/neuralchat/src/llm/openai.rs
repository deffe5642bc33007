//! OpenAI-compatible LLM provider.
//!
//! Groq, Cerebras and OpenRouter all expose the same `chat/completions`
//! streaming API; they differ only in base URL, sampling defaults and a few
//! headers.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use neuralchat_types::{ChatMessage, ProviderKind};
use reqwest::Client;

use super::error::{LLMError, api_error, stream_error_message};
use super::provider::LLMProvider;
use super::types::{ChatRequest, ChatStream, Sampling};

/// Default API root for a provider.
pub fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Groq => "https://api.groq.com/openai/v1",
        ProviderKind::Cerebras => "https://api.cerebras.ai/v1",
        ProviderKind::OpenRouter => "https://openrouter.ai/api/v1",
    }
}

/// OpenAI-compatible provider bound to one API key and model.
pub struct OpenAICompatibleProvider {
    client: Client,
    kind: ProviderKind,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAICompatibleProvider {
    #[must_use]
    pub fn new(
        client: Client,
        kind: ProviderKind,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        match self.kind {
            ProviderKind::OpenRouter => builder
                .header("HTTP-Referer", "http://localhost:3000")
                .header("X-Title", "NeuralChat"),
            _ => builder,
        }
    }

    fn supports_model_listing(&self) -> bool {
        matches!(self.kind, ProviderKind::Cerebras)
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat_stream(&self, messages: Vec<ChatMessage>) -> Result<ChatStream, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest::streaming(
            self.model.clone(),
            messages,
            Sampling::for_provider(self.kind),
        );

        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        Ok(Box::pin(StreamParser::new(response.bytes_stream())))
    }

    async fn list_models(&self) -> Result<Vec<String>, LLMError> {
        if !self.supports_model_listing() {
            return Ok(self
                .kind
                .curated_models()
                .iter()
                .map(|m| m.to_string())
                .collect());
        }

        let url = format!("{}/models", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[derive(serde::Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(serde::Deserialize)]
struct ModelEntry {
    id: String,
}

// --- Streaming ---

/// What one upstream SSE line means for the fragment stream.
#[derive(Debug, PartialEq)]
enum LineEvent {
    Skip,
    Token(String),
    Error(String),
    Done,
}

fn parse_line(line: &str) -> LineEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return LineEvent::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return LineEvent::Done;
    }

    if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
        if let Some(choice) = chunk.choices.first()
            && let Some(ref content) = choice.delta.content
            && !content.is_empty()
        {
            return LineEvent::Token(content.clone());
        }
        return LineEvent::Skip;
    }

    match stream_error_message(data) {
        Some(message) => LineEvent::Error(message),
        None => LineEvent::Skip,
    }
}

/// Turns an upstream SSE byte stream into content fragments.
///
/// Lines are split on raw bytes so multi-byte characters spanning two
/// network chunks are decoded intact.
struct StreamParser<S> {
    inner: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S> StreamParser<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    fn finish_with(&mut self, event: LineEvent) -> Poll<Option<Result<String, LLMError>>> {
        match event {
            LineEvent::Token(content) => Poll::Ready(Some(Ok(content))),
            LineEvent::Error(message) => {
                self.done = true;
                Poll::Ready(Some(Err(LLMError::Stream(message))))
            }
            LineEvent::Done | LineEvent::Skip => {
                self.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<S> Stream for StreamParser<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
{
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            if let Some(line) = self.next_line() {
                match parse_line(&line) {
                    LineEvent::Skip => continue,
                    event => return self.finish_with(event),
                }
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(LLMError::Request(e))));
                }
                Poll::Ready(None) => {
                    // Trailing line without a newline.
                    let rest = std::mem::take(&mut self.buffer);
                    let line = String::from_utf8_lossy(&rest).trim().to_string();
                    let event = parse_line(&line);
                    return self.finish_with(event);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn byte_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, reqwest::Error>> + Unpin {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from(c)))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(chunks: Vec<&'static str>) -> Vec<Result<String, String>> {
        StreamParser::new(byte_stream(chunks))
            .map(|r| r.map_err(|e| e.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn yields_content_deltas_in_order() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(out, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
    }

    #[tokio::test]
    async fn empty_deltas_are_not_yielded() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n",
            "data: {\"choices\":[]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert_eq!(out, vec![Ok("x".to_string())]);
    }

    #[tokio::test]
    async fn lines_split_across_chunks_are_reassembled() {
        let out = collect(vec![
            "data: {\"choices\":[{\"del",
            "ta\":{\"content\":\"caf\u{e9}\"}}]}\n",
            "data: [DONE]\n",
        ])
        .await;
        assert_eq!(out, vec![Ok("caf\u{e9}".to_string())]);
    }

    #[tokio::test]
    async fn malformed_lines_and_comments_are_skipped() {
        let out = collect(vec![
            ": OPENROUTER PROCESSING\n",
            "data: {broken\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
        ])
        .await;
        assert_eq!(out, vec![Ok("ok".to_string())]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_is_parsed() {
        let out = collect(vec!["data: {\"choices\":[{\"delta\":{\"content\":\"end\"}}]}"]).await;
        assert_eq!(out, vec![Ok("end".to_string())]);
    }

    #[tokio::test]
    async fn upstream_error_event_ends_stream() {
        let out = collect(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n",
            "data: {\"error\":{\"message\":\"context length exceeded\"}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n",
        ])
        .await;
        assert_eq!(
            out,
            vec![
                Ok("par".to_string()),
                Err("context length exceeded".to_string())
            ]
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let provider = OpenAICompatibleProvider::new(
            Client::new(),
            ProviderKind::Groq,
            "https://example.test/v1/".to_string(),
            "key".to_string(),
            "m".to_string(),
        );
        assert_eq!(provider.base_url, "https://example.test/v1");
        assert_eq!(provider.name(), "Groq");
        assert_eq!(provider.model(), "m");
    }

    #[tokio::test]
    async fn curated_models_without_live_listing() {
        let provider = OpenAICompatibleProvider::new(
            Client::new(),
            ProviderKind::OpenRouter,
            default_base_url(ProviderKind::OpenRouter).to_string(),
            "key".to_string(),
            "openrouter/auto".to_string(),
        );
        let models = provider.list_models().await.unwrap();
        assert!(models.contains(&"openrouter/auto".to_string()));
    }
}
