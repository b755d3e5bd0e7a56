// Terminal commands driving the session controller

use crate::api::AssistantGateway;
use crate::config::TokenProvider;
use crate::controller::SessionController;
use crate::models::{IngestRequest, Message, Role};
use crate::orchestrator::{RejectReason, SubmitOutcome};
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    ListChats,
    Open(String),
    New,
    Delete(String),
    IngestText { source: String, text: String },
    IngestUrl(String),
    IngestFile(PathBuf),
    Login(String),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
Type a question to ask the assistant.
  /chats                      list saved conversations
  /open <n|id>                open a conversation
  /new                        start a new conversation
  /delete <n|id>              delete a conversation
  /ingest-text <source> <text>
  /ingest-url <url>
  /ingest-file <path>
  /login <token>              save an access token
  /status                     assistant state and last response time
  /quit";

/// Parses one input line. `Ok(None)` for blank input.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Ask(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let require = |what: &str| -> Result<String> {
        if arg.is_empty() {
            Err(anyhow::anyhow!("/{} needs {}", name, what))
        } else {
            Ok(arg.to_string())
        }
    };

    let command = match name {
        "chats" => Command::ListChats,
        "open" => Command::Open(require("a conversation number or id")?),
        "new" => Command::New,
        "delete" => Command::Delete(require("a conversation number or id")?),
        "ingest-text" => {
            let arg = require("a source and some text")?;
            match arg.split_once(char::is_whitespace) {
                Some((source, text)) => Command::IngestText {
                    source: source.to_string(),
                    text: text.trim().to_string(),
                },
                None => return Err(anyhow::anyhow!("/ingest-text needs a source and some text")),
            }
        }
        "ingest-url" => Command::IngestUrl(require("a URL")?),
        "ingest-file" => Command::IngestFile(PathBuf::from(require("a file path")?)),
        "login" => Command::Login(require("an access token")?),
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(anyhow::anyhow!("Unknown command /{}. Try /help", other)),
    };
    Ok(Some(command))
}

// Accepts a 1-based sidebar position or a raw conversation id
fn resolve_chat(controller: &SessionController, reference: &str) -> Option<String> {
    let sidebar = controller.sidebar();
    if let Ok(n) = reference.parse::<usize>() {
        if n >= 1 && n <= sidebar.len() {
            return Some(sidebar[n - 1].chat.id.clone());
        }
    }
    sidebar
        .into_iter()
        .find(|entry| entry.chat.id == reference)
        .map(|entry| entry.chat.id)
}

pub fn render_message(message: &Message) -> String {
    match message.role {
        Role::User => format!("you> {}", message.content),
        Role::Assistant => {
            let mut out = format!("lumina> {}", message.content);
            let mut badges = Vec::new();
            if let Some(timing) = message.timing {
                badges.push(timing.to_string());
            }
            for citation in message.citations.iter().flatten() {
                badges.push(format!("[Source {}]", citation.id));
            }
            if !badges.is_empty() {
                out.push_str("\n        ");
                out.push_str(&badges.join(" "));
            }
            out
        }
    }
}

pub fn render_status(controller: &SessionController) -> String {
    match controller.last_response_time() {
        Some(last) => format!("lumina is {} | Last: {}", controller.presence(), last),
        None => format!("lumina is {}", controller.presence()),
    }
}

pub fn render_sidebar(controller: &SessionController) -> String {
    let sidebar = controller.sidebar();
    if sidebar.is_empty() {
        return "No conversations yet".to_string();
    }
    sidebar
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let marker = if entry.selected { '*' } else { ' ' };
            format!("{} {:>2}. {}", marker, i + 1, entry.chat.display_title())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs one command and returns the text to print. `None` means quit.
pub async fn execute(
    controller: &SessionController,
    gateway: &dyn AssistantGateway,
    tokens: &dyn TokenProvider,
    command: Command,
) -> Option<String> {
    let output = match command {
        Command::Ask(query) => match controller.submit(&query).await {
            SubmitOutcome::Rejected(RejectReason::EmptyQuery) => String::new(),
            SubmitOutcome::Rejected(RejectReason::ExchangeInFlight) => {
                "Still waiting for the previous answer".to_string()
            }
            SubmitOutcome::Rejected(RejectReason::ConversationDeleting) => {
                "This conversation is being deleted".to_string()
            }
            SubmitOutcome::Answered { .. } | SubmitOutcome::Failed => controller
                .messages()
                .last()
                .map(render_message)
                .unwrap_or_default(),
        },
        Command::ListChats => {
            controller.refresh().await;
            render_sidebar(controller)
        }
        Command::Open(reference) => match resolve_chat(controller, &reference) {
            Some(id) => {
                controller.select(&id).await;
                let transcript: Vec<String> =
                    controller.messages().iter().map(render_message).collect();
                if transcript.is_empty() {
                    "(empty conversation)".to_string()
                } else {
                    transcript.join("\n")
                }
            }
            None => format!("No conversation matches '{}'", reference),
        },
        Command::New => {
            controller.new_conversation().await;
            "New conversation".to_string()
        }
        Command::Delete(reference) => match resolve_chat(controller, &reference) {
            Some(id) => match controller.delete(&id).await {
                Ok(()) => "Conversation deleted".to_string(),
                Err(e) => format!("Could not delete conversation: {}", e),
            },
            None => format!("No conversation matches '{}'", reference),
        },
        Command::IngestText { source, text } => {
            ingest(
                gateway,
                IngestRequest::Text {
                    source: Some(source),
                    text,
                },
            )
            .await
        }
        Command::IngestUrl(url) => ingest(gateway, IngestRequest::Url { url }).await,
        Command::IngestFile(path) => match IngestRequest::from_path(&path, None).await {
            Ok(request) => ingest(gateway, request).await,
            Err(e) => format!("{:#}", e),
        },
        Command::Login(token) => match tokens.store_token(&token).await {
            Ok(()) => {
                controller.refresh().await;
                "Signed in".to_string()
            }
            Err(e) => format!("Could not save token: {:#}", e),
        },
        Command::Status => render_status(controller),
        Command::Help => HELP.to_string(),
        Command::Quit => return None,
    };
    Some(output)
}

async fn ingest(gateway: &dyn AssistantGateway, request: IngestRequest) -> String {
    match gateway.ingest(request).await {
        Ok(receipt) => format!("Successfully ingested {} chunks.", receipt.chunks_count),
        Err(e) => format!("Ingestion failed: {}", e),
    }
}
