use crate::models::ChatId;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Conversation lifecycle notifications for the sidebar and any view.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend minted a handle for what was a new conversation.
    ConversationCreated(ChatId),
    /// `None` is the empty "new conversation" state.
    ConversationSelected(Option<ChatId>),
    ConversationDeleted(ChatId),
}

/// Fan-out of [`SessionEvent`]s. Emitting with no subscribers is fine.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        log::debug!("Emitting {:?}", event);
        // Err only means nobody is listening right now
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::new();
        let mut sidebar = bus.subscribe();
        let mut view = bus.subscribe();

        bus.emit(SessionEvent::ConversationCreated("c1".to_string()));
        bus.emit(SessionEvent::ConversationSelected(None));

        for rx in [&mut sidebar, &mut view] {
            assert_eq!(
                rx.recv().await.unwrap(),
                SessionEvent::ConversationCreated("c1".to_string())
            );
            assert_eq!(rx.recv().await.unwrap(), SessionEvent::ConversationSelected(None));
        }
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let bus = EventBus::new();
        bus.emit(SessionEvent::ConversationDeleted("gone".to_string()));
    }
}
