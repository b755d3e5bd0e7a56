use crate::api::{AssistantGateway, GatewayResult};
use crate::events::SessionEvent;
use crate::models::Chat;
use parking_lot::Mutex;
use std::sync::Arc;

/// Sidebar model: the signed-in user's saved conversations.
pub struct SessionRegistry {
    gateway: Arc<dyn AssistantGateway>,
    chats: Mutex<Vec<Chat>>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn AssistantGateway>) -> Self {
        Self {
            gateway,
            chats: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the local list with the backend's. On failure the previous
    /// list is kept and `false` is returned.
    pub async fn refresh(&self) -> bool {
        match self.gateway.list_conversations().await {
            Ok(chats) => {
                log::debug!("Sidebar now lists {} conversations", chats.len());
                *self.chats.lock() = chats;
                true
            }
            Err(e) => {
                log::error!("Failed to refresh conversations: {}", e);
                false
            }
        }
    }

    /// Deletes remotely, then locally. A failed remote delete leaves the list
    /// untouched so the entry can't come back on the next refresh.
    ///
    /// The caller owns selection and must move to a new conversation if
    /// `chat_id` was the open one.
    pub async fn remove(&self, chat_id: &str) -> GatewayResult<()> {
        if let Err(e) = self.gateway.delete_conversation(chat_id).await {
            log::error!("Failed to delete conversation {}: {}", chat_id, e);
            return Err(e);
        }
        self.chats.lock().retain(|c| c.id != chat_id);
        log::info!("Removed conversation {} from sidebar", chat_id);
        Ok(())
    }

    /// Reacts to a controller event.
    pub async fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::ConversationCreated(id) => {
                log::debug!("Conversation {} created, refreshing sidebar", id);
                self.refresh().await;
            }
            SessionEvent::ConversationDeleted(id) => {
                self.chats.lock().retain(|c| &c.id != id);
            }
            SessionEvent::ConversationSelected(_) => {}
        }
    }

    pub fn chats(&self) -> Vec<Chat> {
        self.chats.lock().clone()
    }

    pub fn get(&self, chat_id: &str) -> Option<Chat> {
        self.chats.lock().iter().find(|c| c.id == chat_id).cloned()
    }

    pub fn contains(&self, chat_id: &str) -> bool {
        self.chats.lock().iter().any(|c| c.id == chat_id)
    }

    pub fn len(&self) -> usize {
        self.chats.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.lock().is_empty()
    }
}
