//! The client's conversation store.
//!
//! Every state-mutating operation persists immediately, except streaming
//! updates to the assistant placeholder, which are persisted once the turn
//! ends. Persistence failures are logged and never surfaced.

use std::sync::Arc;

use neuralchat_types::{AUTO_SERVICE, ProviderKind, Role, UploadResponse};
use tracing::warn;

use crate::error::ClientError;
use crate::export;
use crate::model::{
    Conversation, LEGACY_STORAGE_KEY, Message, PersistedState, STORAGE_KEY, ServiceConfig, Theme,
};
use crate::now_millis;
use crate::storage::StateStorage;
use crate::templates;
use crate::transport::ApiHeaders;

pub struct ConversationStore {
    state: PersistedState,
    pending_files: Vec<UploadResponse>,
    search_query: String,
    storage: Arc<dyn StateStorage>,
}

impl ConversationStore {
    /// Load persisted state, falling back to the legacy key, and make sure a
    /// current conversation exists.
    pub async fn load(storage: Arc<dyn StateStorage>) -> Self {
        let state = match read_state(storage.as_ref()).await {
            Some(state) => state.migrate(),
            None => PersistedState::default(),
        };

        let mut store = Self {
            state,
            pending_files: Vec::new(),
            search_query: String::new(),
            storage,
        };

        let current_exists = store
            .state
            .current_id
            .as_ref()
            .is_some_and(|id| store.state.conversations.contains_key(id));
        if !current_exists {
            store.new_conversation().await;
        }
        store
    }

    async fn persist(&self) {
        let json = match serde_json::to_string(&self.state) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize client state");
                return;
            }
        };
        if let Err(e) = self.storage.save(STORAGE_KEY, &json).await {
            warn!(error = %e, "Failed to persist client state");
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn conversations(&self) -> impl Iterator<Item = &Conversation> {
        self.state.conversations.values()
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.state.conversations.get(id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.state.current_id.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current_id().and_then(|id| self.conversation(id))
    }

    fn current_mut(&mut self) -> Option<&mut Conversation> {
        let id = self.state.current_id.as_deref()?;
        self.state.conversations.get_mut(id)
    }

    pub fn selected_service(&self) -> &str {
        &self.state.selected_service
    }

    pub fn theme(&self) -> Theme {
        self.state.theme
    }

    pub fn service_config(&self, kind: ProviderKind) -> Option<&ServiceConfig> {
        self.state.api_keys.get(kind.id())
    }

    pub fn pending_files(&self) -> &[UploadResponse] {
        &self.pending_files
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    // ------------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------------

    /// Create an empty conversation and make it current.
    pub async fn new_conversation(&mut self) -> String {
        let created_at = now_millis();
        let id = self.fresh_id(created_at);
        self.state
            .conversations
            .insert(id.clone(), Conversation::new(id.clone(), created_at));
        self.state.current_id = Some(id.clone());
        self.pending_files.clear();
        self.persist().await;
        id
    }

    /// `conv_<millis>`, bumped until it names no existing conversation.
    fn fresh_id(&self, created_at: i64) -> String {
        let mut stamp = created_at;
        loop {
            let id = format!("conv_{stamp}");
            if !self.state.conversations.contains_key(&id) {
                return id;
            }
            stamp += 1;
        }
    }

    pub async fn switch_conversation(&mut self, id: &str) -> Result<(), ClientError> {
        if !self.state.conversations.contains_key(id) {
            return Err(ClientError::UnknownConversation(id.to_string()));
        }
        self.state.current_id = Some(id.to_string());
        self.pending_files.clear();
        self.persist().await;
        Ok(())
    }

    /// Delete a conversation. Deleting the current one switches to the newest
    /// remaining conversation, or creates a fresh one.
    pub async fn delete_conversation(&mut self, id: &str) -> Result<(), ClientError> {
        if self.state.conversations.remove(id).is_none() {
            return Err(ClientError::UnknownConversation(id.to_string()));
        }

        if self.current_id() == Some(id) {
            let newest = self
                .state
                .conversations
                .values()
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
                .map(|c| c.id.clone());
            match newest {
                Some(newest) => {
                    self.state.current_id = Some(newest);
                    self.pending_files.clear();
                }
                None => {
                    self.new_conversation().await;
                    return Ok(());
                }
            }
        }
        self.persist().await;
        Ok(())
    }

    pub async fn toggle_pin(&mut self, id: &str) -> Result<bool, ClientError> {
        let conversation = self
            .state
            .conversations
            .get_mut(id)
            .ok_or_else(|| ClientError::UnknownConversation(id.to_string()))?;
        conversation.pinned = !conversation.pinned;
        let pinned = conversation.pinned;
        self.persist().await;
        Ok(pinned)
    }

    /// Remove every message of the current conversation.
    pub async fn clear_current(&mut self) {
        if let Some(conversation) = self.current_mut() {
            conversation.messages.clear();
            self.persist().await;
        }
    }

    pub fn set_search(&mut self, query: &str) {
        self.search_query = query.trim().to_lowercase();
    }

    pub fn clear_search(&mut self) {
        self.search_query.clear();
    }

    /// Conversations matching the search query, pinned first then newest first.
    pub fn sorted_conversations(&self) -> Vec<&Conversation> {
        let mut conversations: Vec<&Conversation> = self
            .conversations()
            .filter(|c| self.search_query.is_empty() || c.matches(&self.search_query))
            .collect();
        conversations.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| b.id.cmp(&a.id))
        });
        conversations
    }

    /// Add a conversation from a JSON export and make it current.
    pub async fn import_conversation(&mut self, json: &str) -> Result<String, ClientError> {
        let created_at = now_millis();
        let id = self.fresh_id(created_at);
        let imported = export::import_json(json, &id, created_at)?;
        self.state.conversations.insert(id.clone(), imported);
        self.state.current_id = Some(id.clone());
        self.pending_files.clear();
        self.persist().await;
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // System prompt
    // ------------------------------------------------------------------------

    pub async fn set_system_prompt(&mut self, prompt: &str) {
        if let Some(conversation) = self.current_mut() {
            conversation.system_prompt = prompt.to_string();
            self.persist().await;
        }
    }

    pub async fn clear_system_prompt(&mut self) {
        self.set_system_prompt("").await;
    }

    pub async fn apply_template(&mut self, key: &str) -> Result<(), ClientError> {
        let prompt =
            templates::template(key).ok_or_else(|| ClientError::UnknownTemplate(key.to_string()))?;
        self.set_system_prompt(prompt).await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Save credentials for a provider. A blank model falls back to the
    /// provider default; the provider is enabled iff the key is non-empty.
    pub async fn save_service(&mut self, kind: ProviderKind, api_key: &str, model: &str) {
        let api_key = api_key.trim().to_string();
        let model = match model.trim() {
            "" => kind.default_model().to_string(),
            model => model.to_string(),
        };
        let enabled = !api_key.is_empty();
        self.state.api_keys.insert(
            kind.id().to_string(),
            ServiceConfig {
                api_key,
                model,
                enabled,
            },
        );
        self.persist().await;
    }

    pub async fn clear_key(&mut self, kind: ProviderKind) {
        let entry = self
            .state
            .api_keys
            .entry(kind.id().to_string())
            .or_insert_with(|| ServiceConfig::for_provider(kind));
        entry.api_key.clear();
        entry.enabled = false;
        self.persist().await;
    }

    /// Choose `auto` or a provider id for future turns.
    pub async fn select_service(&mut self, service: &str) -> Result<(), ClientError> {
        let service = service.trim();
        let selected = if service.eq_ignore_ascii_case(AUTO_SERVICE) {
            AUTO_SERVICE.to_string()
        } else {
            service
                .parse::<ProviderKind>()
                .map_err(|_| ClientError::UnknownService(service.to_string()))?
                .id()
                .to_string()
        };
        self.state.selected_service = selected;
        self.persist().await;
        Ok(())
    }

    pub async fn toggle_theme(&mut self) -> Theme {
        self.state.theme = self.state.theme.toggled();
        self.persist().await;
        self.state.theme
    }

    pub fn has_api_key(&self) -> bool {
        self.state.api_keys.values().any(ServiceConfig::has_key)
    }

    /// `X-<Provider>-Key` / `X-<Provider>-Model` for every provider with a key.
    pub fn api_headers(&self) -> ApiHeaders {
        let mut headers = Vec::new();
        for kind in ProviderKind::ALL {
            let Some(config) = self.service_config(kind).filter(|c| c.has_key()) else {
                continue;
            };
            let model = if config.model.trim().is_empty() {
                kind.default_model().to_string()
            } else {
                config.model.clone()
            };
            headers.push((kind.key_header(), config.api_key.trim().to_string()));
            headers.push((kind.model_header(), model));
        }
        headers
    }

    // ------------------------------------------------------------------------
    // Attachments
    // ------------------------------------------------------------------------

    pub fn add_pending_file(&mut self, upload: UploadResponse) {
        self.pending_files.push(upload);
    }

    pub fn remove_pending_file(&mut self, index: usize) -> Option<UploadResponse> {
        (index < self.pending_files.len()).then(|| self.pending_files.remove(index))
    }

    pub(crate) fn take_pending_files(&mut self) -> Vec<UploadResponse> {
        std::mem::take(&mut self.pending_files)
    }

    // ------------------------------------------------------------------------
    // Turn bookkeeping, driven by the chat session
    // ------------------------------------------------------------------------

    /// Append a user message, derive the title and persist.
    pub(crate) async fn push_user_message(&mut self, message: Message) {
        if let Some(conversation) = self.current_mut() {
            conversation.messages.push(message);
            conversation.update_title();
            self.persist().await;
        }
    }

    /// Replace a user message's text and drop everything after it.
    pub(crate) async fn edit_user_message(
        &mut self,
        index: usize,
        text: &str,
    ) -> Result<(), ClientError> {
        let conversation = self
            .current_mut()
            .ok_or(ClientError::InvalidMessage(index))?;
        match conversation.messages.get_mut(index) {
            Some(message) if message.role == Role::User => message.set_text(text),
            _ => return Err(ClientError::InvalidMessage(index)),
        }
        conversation.messages.truncate(index + 1);
        self.persist().await;
        Ok(())
    }

    /// Drop the message at `index` and everything after it.
    pub(crate) async fn truncate_messages(&mut self, index: usize) -> Result<(), ClientError> {
        let conversation = self
            .current_mut()
            .ok_or(ClientError::InvalidMessage(index))?;
        if index >= conversation.messages.len() {
            return Err(ClientError::InvalidMessage(index));
        }
        conversation.messages.truncate(index);
        self.persist().await;
        Ok(())
    }

    /// Append an empty assistant message for the incoming stream. Not persisted.
    pub(crate) fn push_placeholder(&mut self) {
        if let Some(conversation) = self.current_mut() {
            conversation
                .messages
                .push(Message::assistant(String::new(), now_millis()));
        }
    }

    fn placeholder_mut(&mut self) -> Option<&mut Message> {
        self.current_mut()?
            .messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
    }

    /// Record which provider is answering on the placeholder.
    pub(crate) fn set_provenance(&mut self, service: &str, model: &str) {
        if let Some(message) = self.placeholder_mut() {
            message.service = Some(service.to_string());
            message.model = (!model.is_empty()).then(|| model.to_string());
        }
    }

    pub(crate) fn set_placeholder_content(&mut self, content: &str) {
        if let Some(message) = self.placeholder_mut() {
            message.content = content.to_string();
        }
    }

    /// Clear the placeholder so another attempt can stream into it.
    pub(crate) fn reset_placeholder(&mut self) {
        if let Some(message) = self.placeholder_mut() {
            message.content.clear();
            message.service = None;
            message.model = None;
        }
    }

    /// Drop the trailing assistant placeholder if it is empty; otherwise keep
    /// it and credit its service to the conversation. Returns whether it was
    /// dropped.
    pub(crate) fn settle_placeholder(&mut self) -> bool {
        let Some(conversation) = self.current_mut() else {
            return false;
        };
        let Some(last) = conversation
            .messages
            .last()
            .filter(|m| m.role == Role::Assistant)
        else {
            return false;
        };
        if last.content.is_empty() {
            conversation.messages.pop();
            return true;
        }
        if let Some(service) = last.service.clone() {
            conversation.used_service = Some(service);
        }
        false
    }

    /// Persist the state reached at the end of a turn.
    pub(crate) async fn finish_turn(&mut self) {
        self.persist().await;
    }
}

async fn read_state(storage: &dyn StateStorage) -> Option<PersistedState> {
    for key in [STORAGE_KEY, LEGACY_STORAGE_KEY] {
        let raw = match storage.load(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => continue,
            Err(e) => {
                warn!(key, error = %e, "Failed to read client state");
                continue;
            }
        };
        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => return Some(state),
            Err(e) => {
                warn!(key, error = %e, "Ignoring unreadable client state");
                return None;
            }
        }
    }
    None
}
