use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use quill_engine::{EngineConfig, ExerciseEngine};
use quill_server::{HandlerState, ServerConfig};
use quill_settings::QuillSettings;
use quill_store::{
    ChatLog, Database, InMemoryChatLog, InMemorySessionStore, JsonRosterFile, SessionStore,
    SqliteChatLog, SqliteSessionStore,
};
use quill_telemetry::{init_telemetry, TelemetryConfig};

/// Writing-exercise session server.
#[derive(Debug, Parser)]
#[command(name = "quill", version)]
struct Args {
    /// Settings file (defaults to ~/.quill/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding the session database and roster.
    #[arg(long)]
    data_dir: Option<String>,

    /// Keep sessions and chat in memory only.
    #[arg(long)]
    memory: bool,
}

fn load(args: &Args) -> anyhow::Result<QuillSettings> {
    let mut settings = match &args.config {
        Some(path) => quill_settings::load_settings_from_path(path),
        None => quill_settings::load_settings(),
    }
    .context("failed to load settings")?;

    if let Some(port) = args.port {
        settings.server.port = port;
    }
    if let Some(dir) = &args.data_dir {
        settings.storage.data_dir = dir.clone();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = load(&args)?;

    std::fs::create_dir_all(settings.data_dir()).with_context(|| {
        format!("failed to create data directory {}", settings.data_dir().display())
    })?;

    let telemetry = Arc::new(init_telemetry(TelemetryConfig {
        log_level: TelemetryConfig::parse_level(&settings.logging.level),
        module_levels: Vec::new(),
        log_to_sqlite: settings.logging.persist_warnings,
        log_db_path: settings.log_database_path(),
    }));

    tracing::info!(data_dir = %settings.data_dir().display(), "starting quill");

    let (store, chat_log, db): (Arc<dyn SessionStore>, Arc<dyn ChatLog>, Option<Database>) =
        if args.memory {
            tracing::warn!("running with in-memory storage; sessions are lost on exit");
            (
                Arc::new(InMemorySessionStore::new()),
                Arc::new(InMemoryChatLog::new()),
                None,
            )
        } else {
            let db_path = settings.database_path();
            let db = Database::open(&db_path)
                .with_context(|| format!("failed to open database {}", db_path.display()))?;
            tracing::info!(path = %db_path.display(), "database opened");
            (
                Arc::new(SqliteSessionStore::new(db.clone())),
                Arc::new(SqliteChatLog::new(db.clone())),
                Some(db),
            )
        };

    let roster_path = settings.roster_path();
    if !roster_path.exists() {
        tracing::warn!(
            path = %roster_path.display(),
            "roster file not found; every student will be rejected"
        );
    }

    let engine = ExerciseEngine::new(
        store,
        chat_log,
        Arc::new(JsonRosterFile::new(roster_path)),
        EngineConfig {
            pairing_max_attempts: settings.pairing.max_attempts,
            roster_ttl: Duration::from_secs(settings.roster.cache_ttl_secs),
        },
    );

    let mut handler_state = HandlerState::new(Arc::new(engine)).with_telemetry(telemetry);
    if let Some(db) = db {
        handler_state = handler_state.with_database(db);
    }

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        allowed_origins: settings.server.allowed_origins.clone(),
        request_timeout_secs: settings.server.request_timeout_secs,
    };
    let handle = quill_server::start(config, Arc::new(handler_state))
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "quill server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown();
    Ok(())
}
