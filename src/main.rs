use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use parley_core::{ConversationId, UserId};
use parley_engine::{LocalEngine, LoopEvent};
use parley_server::{
    AnonymousDefaults, ConversationService, CreateConversationRequest, HandlerState, ServerConfig,
    ServiceConfig,
};
use parley_store::{ConversationRepo, Database, InMemoryStore, SettingsRepo};

#[derive(Parser)]
#[command(name = "parley", version, about = "Conversation initialization service")]
struct Cli {
    /// JSON config file, deep-merged over defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the JSON-RPC server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Keep settings and conversations in memory instead of SQLite.
        #[arg(long, conflicts_with = "db")]
        ephemeral: bool,
    },
    /// Create or resume one conversation and print its loop info as JSON.
    Create {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        message: Option<String>,
        #[arg(long = "image")]
        images: Vec<String>,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config =
        parley_server::load_config(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Serve {
            host,
            port,
            db,
            ephemeral,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(db) = db {
                config.storage.db_path = db;
            }
            parley_telemetry::init_telemetry(&config.telemetry())?;
            config.log_warnings();
            serve(config, ephemeral).await
        }
        Command::Create {
            user,
            repo,
            branch,
            message,
            images,
            id,
            db,
        } => {
            if let Some(db) = db {
                config.storage.db_path = db;
            }
            let mut telemetry = config.telemetry();
            telemetry.to_stderr = true;
            parley_telemetry::init_telemetry(&telemetry)?;
            config.log_warnings();

            let request = CreateConversationRequest {
                user_id: user.map(UserId::from_raw),
                selected_repository: repo,
                selected_branch: branch,
                initial_user_msg: message,
                image_urls: (!images.is_empty()).then_some(images),
                conversation_id: id.map(ConversationId::from_raw),
                ..CreateConversationRequest::default()
            };
            create(config, request).await
        }
    }
}

struct Runtime {
    db: Option<Database>,
    engine: Arc<LocalEngine>,
    service: Arc<ConversationService>,
}

fn build_runtime(config: &ServiceConfig, ephemeral: bool) -> anyhow::Result<Runtime> {
    let (event_tx, _) = broadcast::channel::<LoopEvent>(1024);
    let engine = Arc::new(LocalEngine::new(event_tx));
    let assigner = config.assigner();
    let defaults = AnonymousDefaults::from_env();

    if ephemeral {
        tracing::warn!("running with in-memory storage; nothing survives a restart");
        let store = Arc::new(InMemoryStore::new());
        let service = Arc::new(ConversationService::new(
            store.clone(),
            store,
            assigner,
            engine.clone(),
            defaults,
        ));
        return Ok(Runtime {
            db: None,
            engine,
            service,
        });
    }

    let db = Database::open(&config.storage.db_path).with_context(|| {
        format!("failed to open database at {}", config.storage.db_path.display())
    })?;
    let service = Arc::new(ConversationService::new(
        Arc::new(SettingsRepo::new(db.clone())),
        Arc::new(ConversationRepo::new(db.clone())),
        assigner,
        engine.clone(),
        defaults,
    ));

    Ok(Runtime {
        db: Some(db),
        engine,
        service,
    })
}

async fn serve(config: ServiceConfig, ephemeral: bool) -> anyhow::Result<()> {
    tracing::info!("Starting Parley server");
    let runtime = build_runtime(&config, ephemeral)?;
    let event_log = parley_server::spawn_event_log(runtime.engine.subscribe());

    let mut handler_state = HandlerState::new(runtime.service);
    if let Some(db) = runtime.db {
        handler_state = handler_state.with_database(db);
    }
    let handler_state = Arc::new(handler_state);
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let handle = parley_server::start(server_config, handler_state)
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "Parley server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!(active_loops = runtime.engine.active_count(), "Shutting down");
    let stopped = runtime.engine.stop_all();
    tracing::info!(stopped, "agent loops cancelled");
    handle.shutdown().await;
    event_log.abort();
    Ok(())
}

async fn create(config: ServiceConfig, request: CreateConversationRequest) -> anyhow::Result<()> {
    let runtime = build_runtime(&config, false)?;
    let info = runtime.service.create_conversation(request).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    let _ = runtime.engine.stop_all();
    Ok(())
}
