use crate::api::{AssistantGateway, GatewayError};
use crate::events::{EventBus, SessionEvent};
use crate::models::{Chat, ChatId, Message, Timing};
use crate::orchestrator::{ExchangeOrchestrator, ExchangePhase, SubmitOutcome};
use crate::presence::Presence;
use crate::registry::SessionRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::TryRecvError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("an exchange is still in flight")]
    ExchangeInFlight,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// One sidebar row.
#[derive(Clone, Debug, PartialEq)]
pub struct SidebarEntry {
    pub chat: Chat,
    pub selected: bool,
}

/// Wires the orchestrator and the sidebar registry to one gateway and routes
/// session events between them.
pub struct SessionController {
    orchestrator: ExchangeOrchestrator,
    registry: SessionRegistry,
    events: EventBus,
    // The registry's own subscription, drained after each user action
    inbox: Mutex<broadcast::Receiver<SessionEvent>>,
}

impl SessionController {
    pub fn new(gateway: Arc<dyn AssistantGateway>) -> Self {
        let events = EventBus::new();
        let inbox = Mutex::new(events.subscribe());
        Self {
            orchestrator: ExchangeOrchestrator::new(gateway.clone(), events.clone()),
            registry: SessionRegistry::new(gateway),
            events,
            inbox,
        }
    }

    async fn dispatch_events(&self) {
        let mut lagged = false;
        let pending: Vec<SessionEvent> = {
            let mut inbox = self.inbox.lock();
            let mut pending = Vec::new();
            loop {
                match inbox.try_recv() {
                    Ok(event) => pending.push(event),
                    Err(TryRecvError::Lagged(skipped)) => {
                        log::warn!("Sidebar missed {} events", skipped);
                        lagged = true;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            pending
        };
        for event in &pending {
            self.registry.handle(event).await;
        }
        if lagged {
            self.registry.refresh().await;
        }
    }

    /// Loads the sidebar. Call once after sign-in.
    pub async fn refresh(&self) -> bool {
        self.registry.refresh().await
    }

    pub async fn submit(&self, query: &str) -> SubmitOutcome {
        let outcome = self.orchestrator.submit(query).await;
        self.dispatch_events().await;
        outcome
    }

    pub async fn select(&self, chat_id: &str) -> bool {
        let switched = self.orchestrator.select_conversation(chat_id).await;
        self.dispatch_events().await;
        switched
    }

    pub async fn new_conversation(&self) -> bool {
        let cleared = self.orchestrator.start_new_conversation();
        self.dispatch_events().await;
        cleared
    }

    /// Deletes `chat_id`. If it is the open conversation, selection moves to a
    /// new conversation once the backend confirms. Submits to `chat_id` are
    /// rejected while the delete is pending.
    pub async fn delete(&self, chat_id: &str) -> Result<(), SessionError> {
        if !self.orchestrator.begin_delete(chat_id) {
            return Err(SessionError::ExchangeInFlight);
        }

        let removed = self.registry.remove(chat_id).await;
        if removed.is_ok() {
            self.events
                .emit(SessionEvent::ConversationDeleted(chat_id.to_string()));
        }
        // The selection may have moved while the delete was pending
        self.orchestrator.finish_delete(chat_id, removed.is_ok());
        self.dispatch_events().await;
        removed.map_err(SessionError::from)
    }

    pub fn sidebar(&self) -> Vec<SidebarEntry> {
        let current = self.orchestrator.current_chat_id();
        self.registry
            .chats()
            .into_iter()
            .map(|chat| SidebarEntry {
                selected: current.as_deref() == Some(chat.id.as_str()),
                chat,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.orchestrator.messages()
    }

    pub fn current_chat_id(&self) -> Option<ChatId> {
        self.orchestrator.current_chat_id()
    }

    pub fn presence(&self) -> Presence {
        self.orchestrator.presence()
    }

    pub fn last_response_time(&self) -> Option<Timing> {
        self.orchestrator.last_response_time()
    }

    pub fn orchestrator(&self) -> &ExchangeOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_phase(&self) -> broadcast::Receiver<ExchangePhase> {
        self.orchestrator.subscribe_phase()
    }
}
