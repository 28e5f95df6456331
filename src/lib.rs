pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod console;
pub mod error;
pub mod models;
pub mod session;
pub mod stream;
pub mod transcript;

use chat::ChatSession;
use cli::Args;
use client::HttpChatClient;
use config::ClientConfig;
use log::{ info, warn };
use session::{ FileStorage, SessionManager };
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = ClientConfig::from_args(&args)?;

    info!("--- Client Configuration ---");
    info!("API Base URL: {}", config.base_url);
    info!("Chat Route: {}", config.chat_route);
    info!("Retrieval Limit: {}", config.limit);
    info!("Session File: {}", config.session_path.display());
    info!("Health Check: {}", config.check_health);
    info!("----------------------------");

    let storage = Arc::new(FileStorage::new(config.session_path.clone()));
    let session_id = SessionManager::new(storage).get_or_create_session_id();
    info!("Using session id {}", session_id);

    let client = Arc::new(HttpChatClient::from_config(&config)?);
    if config.check_health {
        match client.health().await {
            Ok(true) => info!("Backend at {} is healthy", config.base_url),
            Ok(false) => warn!("Backend at {} reports an unhealthy status", config.base_url),
            Err(e) => warn!("Health check failed: {}", e),
        }
    }

    let mut session = ChatSession::new(client, session_id, config.limit);
    console::run_console(&mut session).await
}
