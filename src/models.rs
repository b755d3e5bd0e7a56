use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

// Opaque conversation handle issued by the backend
pub type ChatId = String;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

// A retrieved source snippet attached to an assistant answer.
// `id` is the source index within one answer, not a global identifier.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Citation {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Response latency of one exchange, in whole milliseconds.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Timing(pub u64);

impl Timing {
    pub fn from_duration(elapsed: Duration) -> Self {
        Self(elapsed.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timing {
    // "850ms" below one second, "1.25s" from there on
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 1000 {
            write!(f, "{}ms", self.0)
        } else {
            write!(f, "{:.2}s", self.0 as f64 / 1000.0)
        }
    }
}

// A single message in the open conversation
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            citations: None,
            timing: None,
        }
    }

    pub fn assistant(content: impl Into<String>, citations: Vec<Citation>, timing: Timing) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            citations: Some(citations),
            timing: Some(timing),
        }
    }

    /// Assistant message with neither citations nor timing, used for the failure fallback.
    pub fn bare_assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            citations: None,
            timing: None,
        }
    }
}

// Stored message rows as returned by GET /chats/{id}/messages. Bookkeeping
// columns (`id`, `chat_id`, `created_at`) are skipped unparsed.
#[derive(Deserialize, Clone, Debug)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub citations: Option<Vec<Citation>>,
}

impl From<StoredMessage> for Message {
    fn from(row: StoredMessage) -> Self {
        Self {
            role: row.role,
            content: row.content,
            citations: row.citations,
            timing: None,
        }
    }
}

// Conversation summary shown in the sidebar
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub user_id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn display_title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => "Untitled",
        }
    }
}

// Body of POST /chat
#[derive(Serialize, Debug)]
pub struct QueryRequest<'a> {
    pub query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<&'a str>,
}

/// Decoded answer of one query.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResponse {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub chat_id: ChatId,
}

/// What the knowledge base should ingest. Each mode carries only its own fields.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestRequest {
    Text {
        source: Option<String>,
        text: String,
    },
    File {
        source: Option<String>,
        file_name: String,
        bytes: Vec<u8>,
    },
    Url {
        url: String,
    },
}

impl IngestRequest {
    /// Reads a file from disk into a `File` request named after the file.
    pub async fn from_path(path: &Path, source: Option<String>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read file to ingest: {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("Ingest path has no file name")?;
        Ok(Self::File {
            source,
            file_name,
            bytes,
        })
    }

    /// Source label sent with the upload. URLs are labelled by the backend.
    pub fn source_label(&self) -> Option<String> {
        match self {
            Self::Text { source, .. } => Some(
                source
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "Text Paste".to_string()),
            ),
            Self::File {
                source, file_name, ..
            } => Some(
                source
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| file_name.clone()),
            ),
            Self::Url { .. } => None,
        }
    }
}

// Successful ingestion result
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct IngestReceipt {
    pub chunks_count: u64,
    #[serde(default)]
    pub message: Option<String>,
}
