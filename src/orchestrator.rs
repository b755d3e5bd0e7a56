use crate::api::AssistantGateway;
use crate::events::{EventBus, SessionEvent};
use crate::models::{ChatId, Message, Timing};
use crate::presence::Presence;
use crate::store::MessageStore;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;

pub const FALLBACK_REPLY: &str = "I apologize, but I encountered an error. Please try again.";

// An exchange publishes at most four phase changes
const PHASE_CHANNEL_CAPACITY: usize = 16;

/// Where the orchestrator is in one submit/respond cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    Submitting,
    AwaitingResponse,
    Reconciling,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    EmptyQuery,
    ExchangeInFlight,
    /// The open conversation is being deleted.
    ConversationDeleting,
}

/// Result of [`ExchangeOrchestrator::submit`]. Gateway failures are absorbed
/// into the transcript, so there is no error variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Answered {
        timing: Timing,
        /// Set when this exchange minted the conversation.
        created: Option<ChatId>,
    },
    Failed,
    Rejected(RejectReason),
}

// One in-flight request
#[derive(Debug)]
struct ExchangeRecord {
    query: String,
    started_at: Instant,
}

#[derive(Debug)]
struct ExchangeState {
    phase: ExchangePhase,
    store: MessageStore,
    current_chat_id: Option<ChatId>,
    // Bumped on every selection change so stale history loads are dropped
    selection_generation: u64,
    exchange: Option<ExchangeRecord>,
    last_response_time: Option<Timing>,
    // Handles with a remote delete pending
    deleting: HashSet<ChatId>,
}

/// Drives request/response exchanges for the open conversation and owns its
/// [`MessageStore`] and selection.
///
/// All methods take `&self`. State changes happen inside short critical
/// sections that are never held across an await, so the gateway call is the
/// only point where another caller can observe the orchestrator mid-exchange.
pub struct ExchangeOrchestrator {
    gateway: Arc<dyn AssistantGateway>,
    events: EventBus,
    state: Mutex<ExchangeState>,
    phase_tx: broadcast::Sender<ExchangePhase>,
}

impl ExchangeOrchestrator {
    pub fn new(gateway: Arc<dyn AssistantGateway>, events: EventBus) -> Self {
        let (phase_tx, _) = broadcast::channel(PHASE_CHANNEL_CAPACITY);
        Self {
            gateway,
            events,
            state: Mutex::new(ExchangeState {
                phase: ExchangePhase::Idle,
                store: MessageStore::new(),
                current_chat_id: None,
                selection_generation: 0,
                exchange: None,
                last_response_time: None,
                deleting: HashSet::new(),
            }),
            phase_tx,
        }
    }

    fn transition(&self, state: &mut ExchangeState, next: ExchangePhase) {
        log::debug!("Exchange phase {:?} -> {:?}", state.phase, next);
        state.phase = next;
        // No subscribers is fine
        let _ = self.phase_tx.send(next);
    }

    /// Runs one exchange for `query`.
    pub async fn submit(&self, query: &str) -> SubmitOutcome {
        let query = query.trim();
        if query.is_empty() {
            log::debug!("Ignoring empty query");
            return SubmitOutcome::Rejected(RejectReason::EmptyQuery);
        }

        let chat_id = {
            let mut state = self.state.lock();
            if state.phase != ExchangePhase::Idle {
                log::warn!("Rejecting submit while {:?}", state.phase);
                return SubmitOutcome::Rejected(RejectReason::ExchangeInFlight);
            }
            if let Some(id) = &state.current_chat_id {
                if state.deleting.contains(id) {
                    log::warn!("Rejecting submit to {} while it is being deleted", id);
                    return SubmitOutcome::Rejected(RejectReason::ConversationDeleting);
                }
            }
            self.transition(&mut state, ExchangePhase::Submitting);
            state.store.append(Message::user(query));
            state.last_response_time = None;
            state.exchange = Some(ExchangeRecord {
                query: query.to_string(),
                started_at: Instant::now(),
            });
            self.transition(&mut state, ExchangePhase::AwaitingResponse);
            state.current_chat_id.clone()
        };

        log::info!(
            "Submitting query ({} chars) to conversation {}",
            query.len(),
            chat_id.as_deref().unwrap_or("<new>")
        );
        let result = self.gateway.send_query(query, chat_id.as_deref()).await;

        let mut state = self.state.lock();
        let started_at = state
            .exchange
            .take()
            .map(|record| record.started_at)
            .unwrap_or_else(Instant::now);

        match result {
            Ok(response) => {
                let timing = Timing::from_duration(started_at.elapsed());
                self.transition(&mut state, ExchangePhase::Reconciling);
                state
                    .store
                    .append(Message::assistant(response.answer, response.citations, timing));
                state.last_response_time = Some(timing);

                let created = if state.current_chat_id.is_none() {
                    log::info!("Adopting new conversation {}", response.chat_id);
                    state.current_chat_id = Some(response.chat_id.clone());
                    Some(response.chat_id)
                } else {
                    None
                };
                self.transition(&mut state, ExchangePhase::Idle);
                drop(state);

                if let Some(id) = &created {
                    self.events.emit(SessionEvent::ConversationCreated(id.clone()));
                }
                log::info!("Exchange answered in {}", timing);
                SubmitOutcome::Answered { timing, created }
            }
            Err(e) => {
                log::error!("Exchange failed: {}", e);
                self.transition(&mut state, ExchangePhase::Failed);
                state.store.append(Message::bare_assistant(FALLBACK_REPLY));
                self.transition(&mut state, ExchangePhase::Idle);
                SubmitOutcome::Failed
            }
        }
    }

    /// Opens `chat_id` and loads its history. No-op (returns `false`) while
    /// an exchange is in flight or while `chat_id` is being deleted.
    pub async fn select_conversation(&self, chat_id: &str) -> bool {
        let generation = {
            let mut state = self.state.lock();
            if state.phase != ExchangePhase::Idle {
                log::warn!("Ignoring switch to {} while {:?}", chat_id, state.phase);
                return false;
            }
            if state.deleting.contains(chat_id) {
                log::warn!("Ignoring switch to {} while it is being deleted", chat_id);
                return false;
            }
            state.current_chat_id = Some(chat_id.to_string());
            state.store.reset();
            state.selection_generation += 1;
            state.selection_generation
        };
        self.events
            .emit(SessionEvent::ConversationSelected(Some(chat_id.to_string())));

        match self.gateway.fetch_messages(chat_id).await {
            Ok(history) => {
                let mut state = self.state.lock();
                if state.selection_generation != generation {
                    log::debug!("Dropping stale history for {}", chat_id);
                    return true;
                }
                log::info!("Loaded {} messages for conversation {}", history.len(), chat_id);
                // Anything submitted while the history was loading goes after it
                let pending = state.store.messages().to_vec();
                state.store.replace_all(history);
                for message in pending {
                    state.store.append(message);
                }
            }
            Err(e) => {
                log::error!("Failed to load history for {}: {}", chat_id, e);
            }
        }
        true
    }

    /// Clears the transcript for a brand-new conversation. No-op (returns
    /// `false`) while an exchange is in flight.
    pub fn start_new_conversation(&self) -> bool {
        {
            let mut state = self.state.lock();
            if state.phase != ExchangePhase::Idle {
                log::warn!("Ignoring new conversation while {:?}", state.phase);
                return false;
            }
            state.current_chat_id = None;
            state.store.reset();
            state.selection_generation += 1;
        }
        self.events.emit(SessionEvent::ConversationSelected(None));
        true
    }

    /// Marks `chat_id` as being deleted. Refused (returns `false`) when it is
    /// the open conversation and an exchange is in flight. Until
    /// [`finish_delete`](Self::finish_delete), submits to it and switches to
    /// it are rejected.
    pub fn begin_delete(&self, chat_id: &str) -> bool {
        let mut state = self.state.lock();
        if state.current_chat_id.as_deref() == Some(chat_id) && state.phase != ExchangePhase::Idle {
            log::warn!("Refusing to delete {} while its exchange is in flight", chat_id);
            return false;
        }
        state.deleting.insert(chat_id.to_string());
        true
    }

    /// Ends a delete started with [`begin_delete`](Self::begin_delete). If the
    /// backend removed `chat_id` and it is still open, selection moves to a new
    /// conversation.
    pub fn finish_delete(&self, chat_id: &str, removed: bool) {
        {
            let mut state = self.state.lock();
            state.deleting.remove(chat_id);
            if !removed || state.current_chat_id.as_deref() != Some(chat_id) {
                return;
            }
            // Submits to chat_id were refused since begin_delete, so no exchange targets it
            log::info!("Open conversation {} was deleted, starting a new one", chat_id);
            state.current_chat_id = None;
            state.store.reset();
            state.selection_generation += 1;
        }
        self.events.emit(SessionEvent::ConversationSelected(None));
    }

    pub fn phase(&self) -> ExchangePhase {
        self.state.lock().phase
    }

    pub fn presence(&self) -> Presence {
        Presence::from(self.phase())
    }

    /// Receives every phase change in order, including the short
    /// `Reconciling` step; map through [`Presence::from`] for the avatar.
    pub fn subscribe_phase(&self) -> broadcast::Receiver<ExchangePhase> {
        self.phase_tx.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.phase() != ExchangePhase::Idle
    }

    pub fn current_chat_id(&self) -> Option<ChatId> {
        self.state.lock().current_chat_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().store.messages().to_vec()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn pending_query(&self) -> Option<String> {
        self.state
            .lock()
            .exchange
            .as_ref()
            .map(|record| record.query.clone())
    }

    /// Latency of the latest successful exchange, cleared when a new one starts.
    pub fn last_response_time(&self) -> Option<Timing> {
        self.state.lock().last_response_time
    }
}
