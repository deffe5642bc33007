//! Wire types shared by the NeuralChat relay server and its clients.

mod chat;
mod provider;
mod wire;

pub use chat::{ChatMessage, Role};
pub use provider::{ProviderKind, UnknownProvider};
pub use wire::{
    AUTO_SERVICE, ChatBody, ErrorBody, ModelsResponse, ServicesResponse, StreamFrame,
    UploadKind, UploadResponse,
};
