pub mod challenge;
pub mod cli;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
pub mod transport;

pub use client::BackendClient;
pub use config::{ EngineConfig, ModelKind, TransportPreference };
pub use conversation::{ ConversationEngine, DeltaStream };
pub use error::{ ChatError, ChatResult };
pub use models::chat::{ Conversation, ResponseDelta };
pub use session::ChatSession;
pub use storage::{ SessionStore, StoredConversation };
pub use transport::TransportMode;

use crate::client::{ DEFAULT_LIST_LIMIT, DEFAULT_LIST_OFFSET };
use cli::Args;
use futures::StreamExt;
use log::{ debug, info, warn };
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = EngineConfig::from_args(&args)?;

    info!("--- Core Configuration ---");
    info!("Base URL: {}", config.base_url);
    info!("Model: {}", config.model);
    info!("Transport: {}", config.transport);
    info!("Always Challenge Token: {}", config.generate_challenge_token);
    info!("Local Minting: {}", config.local_minting);
    info!("Solver Path: {}", config.solver_path.as_deref().unwrap_or("-"));
    info!("Data Path: {}", config.data_path.as_deref().unwrap_or("-"));
    info!("-------------------------");

    let session = ChatSession::connect(config.clone()).await?;

    if args.list {
        let chats = session.client().retrieve_chats(DEFAULT_LIST_OFFSET, DEFAULT_LIST_LIMIT).await?;
        for chat in chats.items {
            println!("{}  {}", chat.id, chat.title.unwrap_or_default());
        }
        session.close().await;
        return Ok(());
    }

    let mut store = SessionStore::from_config(&config).await?;
    let stored = match (&store, args.name.as_deref()) {
        (Some(store), Some(name)) => store.get(name).cloned(),
        _ => None,
    };

    let mut engine = match (args.conversation_id.as_deref(), stored) {
        (Some(id), _) => session.get_conversation(id),
        (None, Some(saved)) => {
            info!("Resuming '{}' ({})", args.name.as_deref().unwrap_or_default(), saved.conversation_id);
            session.resume_conversation(&saved)
        }
        (None, None) => session.new_conversation(None),
    };

    if args.delete {
        engine.delete().await?;
        if let (Some(store), Some(name)) = (store.as_mut(), args.name.as_deref()) {
            store.remove(name);
            store.save().await?;
        }
        session.close().await;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match engine.send(&line).await {
            Ok(mut deltas) => {
                while let Some(delta) = deltas.next().await {
                    match delta {
                        Ok(delta) => {
                            print!("{}", delta.content);
                            std::io::stdout().flush()?;
                        }
                        Err(e) => {
                            println!();
                            warn!("Turn failed: {}", e);
                            if let Some(raw) = e.raw_response() {
                                debug!("Raw response: {}", raw);
                            }
                        }
                    }
                }
                println!();
            }
            Err(e) => warn!("Could not send message: {}", e),
        }

        if let (Some(store), Some(name)) = (store.as_mut(), args.name.as_deref()) {
            if let Some(saved) = StoredConversation::from_engine(&engine) {
                store.put(name, saved);
                store.save().await?;
            }
        }
    }

    session.close().await;
    Ok(())
}
