// src/runtime/store.rs — In-memory conversation store

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::RuntimeError;

/// One conversation context: Gemini `contents` entries in turn order.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub contents: Vec<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, user_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let conversation = Conversation {
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            contents: Vec::new(),
        };
        if let Ok(mut map) = self.conversations.lock() {
            map.insert(id.clone(), conversation);
        }
        id
    }

    pub fn contents(&self, id: &str) -> Result<Vec<serde_json::Value>, RuntimeError> {
        self.conversations
            .lock()
            .ok()
            .and_then(|map| map.get(id).map(|c| c.contents.clone()))
            .ok_or_else(|| RuntimeError::SessionNotFound { id: id.into() })
    }

    pub fn append(&self, id: &str, entry: serde_json::Value) -> Result<(), RuntimeError> {
        let mut map = self
            .conversations
            .lock()
            .map_err(|_| RuntimeError::SessionNotFound { id: id.into() })?;
        let conversation = map
            .get_mut(id)
            .ok_or_else(|| RuntimeError::SessionNotFound { id: id.into() })?;
        conversation.contents.push(entry);
        Ok(())
    }

    pub fn remove(&self, id: &str) -> Option<Conversation> {
        self.conversations.lock().ok()?.remove(id)
    }

    pub fn len(&self) -> usize {
        self.conversations.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
