//! Streaming chat relay.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use neuralchat_types::{AUTO_SERVICE, ChatBody, StreamFrame};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::llm::{ChatStream, RequestCredentials};
use crate::response;
use crate::server::AppState;

/// Frames buffered between the relay task and the response body.
const RELAY_BUFFER: usize = 32;

const IDLE_TIMEOUT_MESSAGE: &str = "Stream idle timeout";

const X_SERVICE: &str = "x-service";

/// POST /chat
///
/// Selects a provider, opens its stream and relays it as SSE frames:
/// `{service, model}` first, then `{content}` per fragment, then `[DONE]`
/// or a single terminal `{error}`.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return response::internal_error(rejection.body_text()).into_response(),
    };

    let request = RequestCredentials::from_headers(&headers);
    let available = state.providers.resolve(&request);
    let provider = match state.selector.select(body.service.as_deref(), &available) {
        Ok(provider) => provider,
        Err(e) => return response::bad_request(e.to_string()).into_response(),
    };

    info!(
        service = provider.name(),
        model = provider.model(),
        messages = body.messages.len(),
        requested = body.service.as_deref().unwrap_or(AUTO_SERVICE),
        "Relaying chat request"
    );

    let upstream = match provider.chat_stream(body.messages).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(service = provider.name(), error = %e, "Provider rejected chat request");
            return response::internal_error(e.to_string()).into_response();
        }
    };

    let meta = StreamFrame::Meta {
        service: provider.name().to_string(),
        model: provider.model().to_string(),
    };
    let (tx, rx) = mpsc::channel(RELAY_BUFFER);
    tokio::spawn(relay(
        upstream,
        meta,
        tx,
        Duration::from_secs(state.idle_timeout_seconds),
    ));

    let events = ReceiverStream::new(rx)
        .map(|frame| Ok::<_, Infallible>(Event::default().data(frame.to_data())));
    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    let mut response = Sse::new(events).keep_alive(keep_alive).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        HeaderName::from_static(X_SERVICE),
        HeaderValue::from_static(provider.name()),
    );
    response
}

/// Drain the upstream stream into `tx`, ending with exactly one terminal frame.
///
/// Returns early, dropping the upstream stream, once the receiver is gone.
async fn relay(
    upstream: ChatStream,
    meta: StreamFrame,
    tx: mpsc::Sender<StreamFrame>,
    idle_timeout: Duration,
) {
    if tx.send(meta).await.is_err() {
        return;
    }

    let mut upstream = std::pin::pin!(upstream.timeout(idle_timeout));
    let terminal = loop {
        match upstream.next().await {
            Some(Ok(Ok(fragment))) => {
                if fragment.is_empty() {
                    continue;
                }
                if tx.send(StreamFrame::Content(fragment)).await.is_err() {
                    debug!("Client disconnected, abandoning upstream stream");
                    return;
                }
            }
            Some(Ok(Err(e))) => {
                warn!(error = %e, "Upstream stream failed");
                break StreamFrame::Error(e.to_string());
            }
            Some(Err(_elapsed)) => {
                warn!(timeout_secs = idle_timeout.as_secs(), "Upstream stream idle");
                break StreamFrame::Error(IDLE_TIMEOUT_MESSAGE.to_string());
            }
            None => break StreamFrame::Done,
        }
    };

    if tx.send(terminal).await.is_err() {
        debug!("Client disconnected before the final frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LLMError;

    async fn collect(upstream: ChatStream, idle_timeout: Duration) -> Vec<StreamFrame> {
        let (tx, rx) = mpsc::channel(RELAY_BUFFER);
        let meta = StreamFrame::Meta {
            service: "Groq".to_string(),
            model: "m".to_string(),
        };
        relay(upstream, meta, tx, idle_timeout).await;
        ReceiverStream::new(rx).collect().await
    }

    #[tokio::test]
    async fn relays_fragments_then_done() {
        let upstream: ChatStream = Box::pin(futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Ok(String::new()),
            Ok("lo".to_string()),
        ]));
        let frames = collect(upstream, Duration::from_secs(5)).await;
        assert_eq!(
            frames,
            vec![
                StreamFrame::Meta {
                    service: "Groq".to_string(),
                    model: "m".to_string()
                },
                StreamFrame::Content("Hel".to_string()),
                StreamFrame::Content("lo".to_string()),
                StreamFrame::Done,
            ]
        );
    }

    #[tokio::test]
    async fn error_frame_is_terminal() {
        let upstream: ChatStream = Box::pin(futures::stream::iter(vec![
            Ok("partial".to_string()),
            Err(LLMError::Stream("rate limited".to_string())),
            Ok("never".to_string()),
        ]));
        let frames = collect(upstream, Duration::from_secs(5)).await;
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[1], StreamFrame::Content("partial".to_string()));
        assert_eq!(frames[2], StreamFrame::Error("rate limited".to_string()));
    }

    #[tokio::test]
    async fn idle_upstream_times_out() {
        let upstream: ChatStream = Box::pin(futures::stream::pending());
        let frames = collect(upstream, Duration::from_millis(50)).await;
        assert_eq!(
            frames.last(),
            Some(&StreamFrame::Error(IDLE_TIMEOUT_MESSAGE.to_string()))
        );
    }

    #[tokio::test]
    async fn stops_when_receiver_is_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let upstream: ChatStream = Box::pin(futures::stream::iter(vec![Ok("x".to_string())]));
        // Returns instead of blocking on a closed channel.
        relay(upstream, StreamFrame::Done, tx, Duration::from_secs(5)).await;
    }
}
