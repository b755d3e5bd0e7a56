//! Scripted in-memory [`AssistantGateway`] for controller tests.

use crate::api::{AssistantGateway, GatewayError, GatewayResult};
use crate::models::{Chat, Citation, IngestReceipt, IngestRequest, Message, QueryResponse};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct StubGateway {
    chats: Mutex<Vec<Chat>>,
    histories: Mutex<HashMap<String, Vec<Message>>>,
    history_delays: Mutex<HashMap<String, Duration>>,
    replies: Mutex<VecDeque<GatewayResult<QueryResponse>>>,
    reply_delay: Mutex<Option<Duration>>,
    // When set, each send_query waits for one permit
    gate: Mutex<Option<Arc<Semaphore>>>,
    fail_list: Mutex<bool>,
    fail_fetch: Mutex<bool>,
    fail_delete: Mutex<bool>,
    delete_delay: Mutex<Option<Duration>>,
    /// Every `(query, chat_id)` passed to `send_query`.
    pub queries: Mutex<Vec<(String, Option<String>)>>,
    pub deleted: Mutex<Vec<String>>,
    pub ingested: Mutex<Vec<IngestRequest>>,
}

pub fn chat(id: &str, title: Option<&str>) -> Chat {
    Chat {
        id: id.to_string(),
        user_id: "user-1".to_string(),
        title: title.map(str::to_string),
        created_at: Utc::now(),
    }
}

pub fn reply(answer: &str, chat_id: &str) -> QueryResponse {
    QueryResponse {
        answer: answer.to_string(),
        citations: Vec::new(),
        chat_id: chat_id.to_string(),
    }
}

pub fn cited_reply(answer: &str, chat_id: &str, snippets: &[&str]) -> QueryResponse {
    let citations = snippets
        .iter()
        .enumerate()
        .map(|(i, snippet)| Citation {
            id: i as i64 + 1,
            content: snippet.to_string(),
            metadata: serde_json::json!({ "source": format!("doc-{}", i + 1) }),
        })
        .collect();
    QueryResponse {
        citations,
        ..reply(answer, chat_id)
    }
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            chats: Mutex::new(Vec::new()),
            histories: Mutex::new(HashMap::new()),
            history_delays: Mutex::new(HashMap::new()),
            replies: Mutex::new(VecDeque::new()),
            reply_delay: Mutex::new(None),
            gate: Mutex::new(None),
            fail_list: Mutex::new(false),
            fail_fetch: Mutex::new(false),
            fail_delete: Mutex::new(false),
            delete_delay: Mutex::new(None),
            queries: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            ingested: Mutex::new(Vec::new()),
        }
    }

    pub fn with_chats(chats: Vec<Chat>) -> Self {
        let stub = Self::new();
        *stub.chats.lock() = chats;
        stub
    }

    pub fn set_history(&self, chat_id: &str, messages: Vec<Message>) {
        self.histories.lock().insert(chat_id.to_string(), messages);
    }

    pub fn delay_history(&self, chat_id: &str, delay: Duration) {
        self.history_delays.lock().insert(chat_id.to_string(), delay);
    }

    pub fn push_reply(&self, reply: QueryResponse) {
        self.replies.lock().push_back(Ok(reply));
    }

    pub fn push_failure(&self, error: GatewayError) {
        self.replies.lock().push_back(Err(error));
    }

    pub fn set_reply_delay(&self, delay: Duration) {
        *self.reply_delay.lock() = Some(delay);
    }

    /// Holds every `send_query` until a permit is added to the returned gate.
    pub fn hold_replies(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn fail_list(&self, fail: bool) {
        *self.fail_list.lock() = fail;
    }

    pub fn fail_fetch(&self, fail: bool) {
        *self.fail_fetch.lock() = fail;
    }

    pub fn fail_delete(&self, fail: bool) {
        *self.fail_delete.lock() = fail;
    }

    pub fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock() = Some(delay);
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl AssistantGateway for StubGateway {
    async fn list_conversations(&self) -> GatewayResult<Vec<Chat>> {
        if *self.fail_list.lock() {
            return Err(GatewayError::Network("list failed".to_string()));
        }
        Ok(self.chats.lock().clone())
    }

    async fn fetch_messages(&self, chat_id: &str) -> GatewayResult<Vec<Message>> {
        let delay = self.history_delays.lock().get(chat_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_fetch.lock() {
            return Err(GatewayError::Network("fetch failed".to_string()));
        }
        self.histories
            .lock()
            .get(chat_id)
            .cloned()
            .ok_or_else(|| GatewayError::Network(format!("unexpected status 404 for {}", chat_id)))
    }

    async fn send_query(&self, query: &str, chat_id: Option<&str>) -> GatewayResult<QueryResponse> {
        self.queries
            .lock()
            .push((query.to_string(), chat_id.map(str::to_string)));

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let delay = *self.reply_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::Network("no scripted reply".to_string())));
        if let Ok(response) = &next {
            // Mirror the backend: an unknown id shows up in the next listing
            let mut chats = self.chats.lock();
            if !chats.iter().any(|c| c.id == response.chat_id) {
                chats.insert(0, chat(&response.chat_id, Some(query)));
            }
        }
        next
    }

    async fn delete_conversation(&self, chat_id: &str) -> GatewayResult<()> {
        let delay = *self.delete_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_delete.lock() {
            return Err(GatewayError::Network("delete failed".to_string()));
        }
        self.deleted.lock().push(chat_id.to_string());
        self.chats.lock().retain(|c| c.id != chat_id);
        self.histories.lock().remove(chat_id);
        Ok(())
    }

    async fn ingest(&self, request: IngestRequest) -> GatewayResult<IngestReceipt> {
        self.ingested.lock().push(request);
        Ok(IngestReceipt {
            chunks_count: 3,
            message: None,
        })
    }
}
