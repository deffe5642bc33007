//! Client side of NeuralChat: conversation state, streaming turns against the
//! relay, and view models for rendering.

pub mod content;
pub mod error;
pub mod export;
pub mod model;
pub mod render;
pub mod session;
pub mod sse;
pub mod storage;
pub mod store;
pub mod templates;
pub mod transport;

pub use error::ClientError;
pub use session::{ChatSession, Notice, TurnObserver, TurnOutcome, TurnState};
pub use storage::{FileStorage, MemoryStorage, StateStorage, StorageError};
pub use store::ConversationStore;
pub use transport::{ChatTransport, RelayClient, TransportError};

/// Current time as unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
