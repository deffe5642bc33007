use thiserror::Error;

use crate::export::ExportError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Configure an API key first")]
    NoApiKeys,

    #[error("no user message at index {0}")]
    InvalidMessage(usize),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("unknown conversation '{0}'")]
    UnknownConversation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Export(#[from] ExportError),
}
