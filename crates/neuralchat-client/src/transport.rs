//! HTTP access to the relay server.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use neuralchat_types::{
    ChatBody, ErrorBody, ModelsResponse, ProviderKind, ServicesResponse, UploadResponse,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use thiserror::Error;
use url::Url;

/// Credential headers sent with every relay request.
pub type ApiHeaders = Vec<(&'static str, String)>;

/// The body of an open `/chat` response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The relay could not be reached or the connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The relay answered with a non-success status.
    #[error("{message}")]
    Relay { status: u16, message: String },

    /// The provider reported an error inside the event stream.
    #[error("{0}")]
    Provider(String),

    #[error("invalid relay URL: {0}")]
    Url(#[from] url::ParseError),
}

impl TransportError {
    /// Only connectivity failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Network(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn services(&self, headers: &ApiHeaders) -> Result<Vec<String>, TransportError>;

    async fn models(
        &self,
        service: ProviderKind,
        headers: &ApiHeaders,
    ) -> Result<Vec<String>, TransportError>;

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, TransportError>;

    /// Start a chat turn. Resolves once the relay has answered with a 2xx status.
    async fn open_chat(
        &self,
        body: &ChatBody,
        headers: &ApiHeaders,
    ) -> Result<ByteStream, TransportError>;
}

/// [`ChatTransport`] over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct RelayClient {
    client: Client,
    base: Url,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base.join(path)?)
    }
}

fn with_headers(mut request: RequestBuilder, headers: &ApiHeaders) -> RequestBuilder {
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    request
}

/// Pass 2xx responses through; turn anything else into [`TransportError::Relay`].
async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    Err(TransportError::Relay {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn services(&self, headers: &ApiHeaders) -> Result<Vec<String>, TransportError> {
        let request = with_headers(self.client.get(self.endpoint("services")?), headers);
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<ServicesResponse>().await?.services)
    }

    async fn models(
        &self,
        service: ProviderKind,
        headers: &ApiHeaders,
    ) -> Result<Vec<String>, TransportError> {
        let mut url = self.endpoint("models")?;
        url.query_pairs_mut().append_pair("service", service.id());
        let request = with_headers(self.client.get(url), headers);
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<ModelsResponse>().await?.models)
    }

    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, TransportError> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let request = self.client.post(self.endpoint("upload")?).multipart(form);
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<UploadResponse>().await?)
    }

    async fn open_chat(
        &self,
        body: &ChatBody,
        headers: &ApiHeaders,
    ) -> Result<ByteStream, TransportError> {
        let request = with_headers(self.client.post(self.endpoint("chat")?), headers).json(body);
        let response = check_status(request.send().await?).await?;
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(TransportError::from)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_a_trailing_slash() {
        let client = RelayClient::new("http://localhost:3000/relay").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:3000/relay/");
        assert_eq!(
            client.endpoint("chat").unwrap().as_str(),
            "http://localhost:3000/relay/chat"
        );

        let client = RelayClient::new("http://localhost:3000").unwrap();
        assert_eq!(
            client.endpoint("services").unwrap().as_str(),
            "http://localhost:3000/services"
        );
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            RelayClient::new("not a url"),
            Err(TransportError::Url(_))
        ));
    }

    #[test]
    fn only_network_errors_retry() {
        assert!(TransportError::Network("reset".to_string()).is_retryable());
        assert!(
            !TransportError::Relay {
                status: 400,
                message: "no keys".to_string()
            }
            .is_retryable()
        );
        assert!(!TransportError::Provider("rate limited".to_string()).is_retryable());
    }
}
