use anyhow::Result;
use clap::Parser;
use eternity_api::AppState;
use eternity_core::roster::RosterBoard;
use eternity_core::{Clock, DirectoryCache, PollEngine, PollSettings, Scheduler, SystemClock};
use eternity_discord::DiscordClient;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eternity=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;
    let display_offset = config
        .display_offset()
        .ok_or_else(|| anyhow::anyhow!("invalid display offset"))?;

    ensure_database_dir(&config);
    let db = eternity_db::create_pool(&config.database.url, config.database.max_connections).await?;
    eternity_db::run_migrations(&db).await?;

    let discord = DiscordClient::with_base_url(
        &config.discord.api_base,
        config.discord.token.clone(),
        Duration::from_secs(config.discord.request_timeout_secs),
    )?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let directory = Arc::new(DirectoryCache::new(
        discord.clone(),
        config.discord.guild_id,
        config.directory.job_roles.clone(),
    ));
    if let Err(err) = directory.refresh_all().await {
        tracing::warn!("directory: initial refresh incomplete: {}", err);
    }
    tracing::info!(
        "directory: {} roles, {} members cached",
        directory.roles().len(),
        directory.members().len()
    );

    let mut scheduler = Scheduler::new();
    directory.spawn_refresh(
        &mut scheduler,
        config.role_refresh_period(),
        config.member_refresh_period(),
    );

    let engine = Arc::new(PollEngine::new(
        db,
        directory.clone(),
        discord.clone(),
        clock.clone(),
        PollSettings {
            poll_channel_id: config.polls.channel_id,
            max_duration_hours: config.polls.max_duration_hours,
            display_offset,
        },
    ));
    engine.spawn_sweeper(&mut scheduler, config.sweep_period());

    if let Some(roster) = &config.roster {
        let board = Arc::new(RosterBoard::new(
            directory.clone(),
            discord.clone(),
            clock.clone(),
            roster.channel_id,
            roster.message_id,
            display_offset,
        ));
        board.spawn(&mut scheduler, Duration::from_secs(roster.refresh_secs));
        tracing::info!("roster: board enabled for message {}", roster.message_id);
    }

    let app = eternity_api::build_router(AppState {
        engine,
        api_token: Arc::from(config.server.api_token.as_str()),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        "Eternity bot listening on {} ({} background jobs)",
        config.server.bind_address,
        scheduler.len()
    );

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    scheduler.stop().await;
    tracing::info!("background jobs stopped");
    Ok(())
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_database_dir(config: &config::Config) {
    let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .or_else(|| config.database.url.strip_prefix("sqlite:"))
    else {
        return;
    };
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    if db_path.starts_with(':') {
        return;
    }
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if parent.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
        }
    }
}
