use anyhow::Result;
use labvm_api::{create_app, start_janitor_task, AppState, Config};
use labvm_core::{is_tool_installed, REQUIRED_TOOLS};
use labvm_logging::{init_subscriber, LogSettings};
use labvm_orchestrator::db::{backup_database, create_pool, run_migrations};
use labvm_orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_subscriber(&LogSettings::from_env());

    info!("Starting labvm-api service...");

    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}, disk_dir={}, uri={}",
        config.bind_addr,
        config.db_path.display(),
        config.disk_dir.display(),
        config.libvirt_uri
    );

    for tool in REQUIRED_TOOLS {
        if !is_tool_installed(tool) {
            warn!("{} not found in PATH; hypervisor calls will fail", tool);
        }
    }

    // Backup before migrations
    let db_path = &config.db_path;
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let orchestrator = Orchestrator::new(pool, Arc::new(config.runner()), config.hypervisor());

    if config.janitor_interval_secs > 0 {
        tokio::spawn(start_janitor_task(
            orchestrator.clone(),
            config.janitor_interval_secs,
            config.disk_grace(),
        ));
        info!(
            "Janitor task started (interval: {}s)",
            config.janitor_interval_secs
        );
    } else {
        info!("Janitor disabled");
    }

    let app = create_app(AppState::new(orchestrator, config.disk_grace()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
