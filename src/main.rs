use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wedding_gallery::auth::AuthService;
use wedding_gallery::config::{Cli, Command, Config};
use wedding_gallery::gallery::GalleryStore;
use wedding_gallery::routes::build_router;
use wedding_gallery::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    let state = wedding_gallery::build_state(config)?;

    if let (Some(username), Some(password)) = (
        state.config.auth.admin_username.as_deref(),
        state.config.auth.admin_password.as_deref(),
    ) {
        if state.auth.bootstrap_admin(username, password).await? {
            tracing::info!("Created admin account {}", username);
        }
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Analyze => {
            let analysis = state.migration.analyze_security_issues().await?;
            print_json(&analysis)
        }
        Command::Migrate => {
            let report = state
                .migration
                .run_pipeline(state.config.backup_dir())
                .await;
            print_json(&report)?;
            if !report.success {
                anyhow::bail!("Migration did not complete");
            }
            Ok(())
        }
        Command::Validate => {
            let report = state.migration.validate_data_isolation().await?;
            print_json(&report)?;
            if !report.success {
                anyhow::bail!("Legacy collections still hold data");
            }
            Ok(())
        }
        Command::Restore { file } => {
            let restored = state.migration.restore_snapshot(&file).await?;
            tracing::info!("Restored {} documents from {}", restored, file.display());
            Ok(())
        }
    }
}

async fn serve(state: AppState) -> anyhow::Result<()> {
    spawn_sweeper(
        state.gallery.clone(),
        state.auth.clone(),
        Duration::from_secs(state.config.stories.sweep_interval_secs),
    );

    let addr: SocketAddr = format!("{}:{}", state.config.server.host, state.config.server.port).parse()?;
    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically drop expired stories (with their files) and expired sessions.
fn spawn_sweeper(gallery: GalleryStore, auth: AuthService, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match gallery.purge_expired_stories(now).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired stories", n),
                Err(e) => tracing::warn!("Story cleanup failed: {}", e),
            }
            match auth.purge_expired_sessions(now).await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
