// Session controller for the Lumina RAG assistant, plus a terminal front end.

// Declare the modules
pub mod api;
pub mod commands;
pub mod config;
pub mod controller;
pub mod events;
pub mod models;
pub mod orchestrator;
pub mod presence;
pub mod registry;
pub mod store;

#[cfg(test)]
mod testing;

use crate::api::{AssistantGateway, HttpGateway};
use crate::config::ClientConfig;
use crate::controller::SessionController;
use crate::presence::Presence;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

pub async fn run() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let config = ClientConfig::from_env()?;
    let tokens = config.token_provider()?;
    let gateway = Arc::new(HttpGateway::new(&config, tokens.clone())?);
    let controller = SessionController::new(gateway.clone());

    if gateway.health().await {
        println!("Connected to {}", config.api_url);
    } else {
        println!("Backend at {} is not responding", config.api_url);
    }
    if controller.refresh().await {
        println!("{}", commands::render_sidebar(&controller));
    }
    println!("Type /help for commands.");

    // Mirror the avatar state on the terminal
    let mut phases = controller.subscribe_phase();
    tokio::spawn(async move {
        let mut shown = Presence::Idle;
        loop {
            let phase = match phases.recv().await {
                Ok(phase) => phase,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            let presence = Presence::from(phase);
            if presence != shown && presence != Presence::Idle {
                println!("({}...)", presence);
            }
            shown = presence;
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match commands::execute(&controller, gateway.as_ref(), tokens.as_ref(), command).await {
            Some(output) if !output.is_empty() => println!("{}", output),
            Some(_) => {}
            None => break,
        }
    }
    log::info!("Session closed");
    Ok(())
}
