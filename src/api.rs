use crate::config::{ClientConfig, TokenProvider};
use crate::models::{
    Chat, Citation, IngestReceipt, IngestRequest, Message, QueryRequest, QueryResponse,
    StoredMessage,
};
use async_trait::async_trait;
use reqwest::{multipart, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const NO_RESPONSE: &str = "No response received";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    // Only the ingestion path reads `{detail}` bodies
    #[error("request rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

// Trait for the four remote operations the session controller relies on,
// plus the ingestion boundary and a health check.
#[async_trait]
pub trait AssistantGateway: Send + Sync {
    async fn list_conversations(&self) -> GatewayResult<Vec<Chat>>;

    async fn fetch_messages(&self, chat_id: &str) -> GatewayResult<Vec<Message>>;

    /// `chat_id: None` asks the backend to mint a new conversation.
    async fn send_query(&self, query: &str, chat_id: Option<&str>) -> GatewayResult<QueryResponse>;

    async fn delete_conversation(&self, chat_id: &str) -> GatewayResult<()>;

    async fn ingest(&self, _request: IngestRequest) -> GatewayResult<IngestReceipt> {
        Err(GatewayError::Network("ingestion is not supported by this gateway".to_string()))
    }

    async fn health(&self) -> bool {
        true
    }
}

// --- HTTP Gateway Implementation ---

// Answer body of POST /chat. Older backends answered under `response`.
#[derive(Deserialize, Debug)]
struct QueryResponseBody {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    citations: Option<Vec<Citation>>,
    chat_id: String,
}

impl From<QueryResponseBody> for QueryResponse {
    fn from(body: QueryResponseBody) -> Self {
        let answer = body
            .answer
            .filter(|a| !a.is_empty())
            .or(body.response.filter(|r| !r.is_empty()))
            .unwrap_or_else(|| NO_RESPONSE.to_string());
        Self {
            answer,
            citations: body.citations.unwrap_or_default(),
            chat_id: body.chat_id,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    detail: String,
}

pub struct HttpGateway {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let base_url = config.api_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url).context(format!("Invalid API URL '{}'", base_url))?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("API URL '{}' cannot carry a path", base_url);
        }
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // `/chats/{chat_id}/{rest..}` with the handle percent-encoded as one segment
    fn chat_url(&self, chat_id: &str, rest: &[&str]) -> GatewayResult<Url> {
        let mut url =
            Url::parse(&self.url("/chats")).map_err(|e| GatewayError::Network(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Network(format!("{} cannot carry a path", self.base_url)))?
            .push(chat_id)
            .extend(rest);
        Ok(url)
    }

    async fn token(&self) -> GatewayResult<String> {
        self.tokens.access_token().await.ok_or_else(|| {
            log::warn!("No active session, refusing request");
            GatewayError::Unauthenticated
        })
    }

    // Attaches the bearer token and sends. Non-success statuses become errors.
    async fn send(&self, request: RequestBuilder) -> GatewayResult<Response> {
        let token = self.token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            log::warn!("Backend rejected token with status {}", status);
            return Err(GatewayError::Unauthenticated);
        }
        if !status.is_success() {
            log::error!("Request to {} failed with status {}", response.url(), status);
            return Err(GatewayError::Network(format!("unexpected status {}", status)));
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> GatewayResult<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Decode(e.to_string()))
    }

    fn ingest_form(request: IngestRequest) -> (&'static str, multipart::Form) {
        let source = request.source_label();
        let (path, mut form) = match request {
            IngestRequest::Text { text, .. } => ("/ingest", multipart::Form::new().text("text", text)),
            IngestRequest::File {
                file_name, bytes, ..
            } => {
                let part = multipart::Part::bytes(bytes).file_name(file_name);
                ("/ingest", multipart::Form::new().part("file", part))
            }
            IngestRequest::Url { url } => ("/ingest/url", multipart::Form::new().text("url", url)),
        };
        if let Some(source) = source {
            form = form.text("source", source);
        }
        (path, form)
    }
}

#[async_trait]
impl AssistantGateway for HttpGateway {
    async fn list_conversations(&self) -> GatewayResult<Vec<Chat>> {
        log::debug!("Fetching conversation list");
        let response = self.send(self.client.get(self.url("/chats"))).await?;
        let chats: Vec<Chat> = Self::decode(response).await?;
        log::info!("Fetched {} conversations", chats.len());
        Ok(chats)
    }

    async fn fetch_messages(&self, chat_id: &str) -> GatewayResult<Vec<Message>> {
        log::debug!("Fetching messages for conversation {}", chat_id);
        let url = self.chat_url(chat_id, &["messages"])?;
        let response = self.send(self.client.get(url)).await?;
        let rows: Vec<StoredMessage> = Self::decode(response).await?;
        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn send_query(&self, query: &str, chat_id: Option<&str>) -> GatewayResult<QueryResponse> {
        log::info!(
            "Sending query to {} (conversation: {})",
            self.base_url,
            chat_id.unwrap_or("<new>")
        );
        let body = QueryRequest { query, chat_id };
        let response = self
            .send(self.client.post(self.url("/chat")).json(&body))
            .await?;
        let body: QueryResponseBody = Self::decode(response).await?;
        Ok(body.into())
    }

    async fn delete_conversation(&self, chat_id: &str) -> GatewayResult<()> {
        log::warn!("Deleting conversation {}", chat_id);
        let url = self.chat_url(chat_id, &[])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn ingest(&self, request: IngestRequest) -> GatewayResult<IngestReceipt> {
        let token = self.token().await?;
        let (path, form) = Self::ingest_form(request);
        log::info!("Submitting ingestion to {}", path);

        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.unwrap_or_default();
            let detail = serde_json::from_slice::<ErrorBody>(&bytes)
                .map(|body| body.detail)
                .unwrap_or_else(|_| "Ingestion failed".to_string());
            log::error!("Ingestion failed with status {}: {}", status, detail);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }
        Self::decode(response).await
    }

    async fn health(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::warn!("Health check against {} failed: {}", self.base_url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticTokenProvider;

    fn body(value: serde_json::Value) -> QueryResponse {
        serde_json::from_value::<QueryResponseBody>(value).unwrap().into()
    }

    #[test]
    fn answer_falls_back_to_response_then_placeholder() {
        let primary = body(serde_json::json!({"answer": "A", "response": "B", "chat_id": "c"}));
        assert_eq!(primary.answer, "A");

        let legacy = body(serde_json::json!({"response": "B", "chat_id": "c"}));
        assert_eq!(legacy.answer, "B");

        let empty = body(serde_json::json!({"answer": "", "chat_id": "c"}));
        assert_eq!(empty.answer, NO_RESPONSE);
        assert!(empty.citations.is_empty());
    }

    #[test]
    fn query_body_requires_chat_id() {
        let result = serde_json::from_value::<QueryResponseBody>(serde_json::json!({"answer": "A"}));
        assert!(result.is_err());
    }

    #[test]
    fn chat_handles_are_one_encoded_segment() {
        let config = ClientConfig {
            api_url: "http://localhost:8000/api/".to_string(),
            ..ClientConfig::default()
        };
        let gateway =
            HttpGateway::new(&config, Arc::new(StaticTokenProvider::new("tok"))).unwrap();

        let url = gateway.chat_url("team/notes?draft#2", &["messages"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/chats/team%2Fnotes%3Fdraft%232/messages"
        );
        assert_eq!(
            gateway.chat_url("abc123", &[]).unwrap().as_str(),
            "http://localhost:8000/api/chats/abc123"
        );
    }

    #[test]
    fn unusable_api_url_is_rejected() {
        let config = ClientConfig {
            api_url: "not a url".to_string(),
            ..ClientConfig::default()
        };
        assert!(HttpGateway::new(&config, Arc::new(StaticTokenProvider::signed_out())).is_err());
    }

    #[test]
    fn url_ingestion_targets_its_own_route() {
        let (path, _) = HttpGateway::ingest_form(IngestRequest::Url {
            url: "https://example.com".to_string(),
        });
        assert_eq!(path, "/ingest/url");

        let (path, _) = HttpGateway::ingest_form(IngestRequest::Text {
            source: None,
            text: "hello".to_string(),
        });
        assert_eq!(path, "/ingest");
    }
}
