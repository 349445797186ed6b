//! CLI entry point for the Myki inspector dashboard.
//!
//! Provides subcommands for serving the dashboard, producing a one-off
//! priority report, and managing dashboard accounts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use myki_dashboard::{
    auth::{CredentialStore, JsonCredentialStore, Role, SessionStore},
    config::AppConfig,
    output::{append_records, rows, write_json},
    refresh::spawn_refresh,
    snapshot::SnapshotStore,
    web::{self, AppState},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "myki_dashboard")]
#[command(about = "Fare evasion priority dashboard for Myki inspectors", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the data files and serve the dashboard
    Serve {
        /// Station patronage CSV
        #[arg(long)]
        stations: Option<PathBuf>,

        /// Tap-on sample CSV
        #[arg(long)]
        taps: Option<PathBuf>,

        /// Address to bind, e.g. 0.0.0.0
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,

        /// Seconds between automatic reloads
        #[arg(short = 'r', long)]
        refresh_secs: Option<u64>,
    },
    /// Compute the current ranking once and print or append it
    Report {
        #[arg(long)]
        stations: Option<PathBuf>,

        #[arg(long)]
        taps: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,

        /// CSV file to append rows to (csv format only)
        #[arg(short, long, default_value = "report.csv")]
        output: String,
    },
    /// Manage dashboard accounts
    Users {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create an account
    Add {
        username: String,

        /// Display name; defaults to the username
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "inspector")]
        role: Role,

        /// Password; falls back to MYKI_NEW_PASSWORD
        #[arg(long, env = "MYKI_NEW_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete an account
    Remove { username: String },
    /// List accounts
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/myki_dashboard.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("myki_dashboard.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("invalid MYKI_* configuration")?;

    match cli.command {
        Commands::Serve {
            stations,
            taps,
            host,
            port,
            refresh_secs,
        } => {
            if let Some(p) = stations {
                config.sources.stations = p;
            }
            if let Some(p) = taps {
                config.sources.taps = p;
            }
            if let Some(h) = host {
                config.host = h;
            }
            if let Some(p) = port {
                config.port = p;
            }
            if let Some(secs) = refresh_secs {
                config.set_refresh_secs(secs).context("--refresh-secs")?;
            }
            serve(config).await?;
        }
        Commands::Report {
            stations,
            taps,
            format,
            output,
        } => {
            if let Some(p) = stations {
                config.sources.stations = p;
            }
            if let Some(p) = taps {
                config.sources.taps = p;
            }

            let store = SnapshotStore::bootstrap(config.sources, config.policy)
                .context("failed to load input data")?;
            let snapshot = store.snapshot();

            match format {
                ReportFormat::Json => write_json(std::io::stdout().lock(), &snapshot)?,
                ReportFormat::Csv => {
                    let records = rows(&snapshot);
                    append_records(&output, &records)?;
                    info!(path = %output, rows = records.len(), "Report appended");
                }
            }
        }
        Commands::Users { action } => {
            let store = JsonCredentialStore::new(&config.users_file);
            manage_users(&store, action).await?;
        }
    }

    Ok(())
}

/// Loads the data, starts the refresh driver and serves until Ctrl+C.
#[tracing::instrument(skip(config), fields(addr = %config.bind_addr()))]
async fn serve(config: AppConfig) -> Result<()> {
    let addr = config.bind_addr();

    // No snapshot means nothing to serve, so a failed first load is fatal.
    let store = Arc::new(
        SnapshotStore::bootstrap(config.sources.clone(), config.policy.clone())
            .context("initial data load failed")?,
    );

    info!(
        stations = %store.sources().stations.display(),
        taps = %store.sources().taps.display(),
        refresh_secs = config.refresh_interval.as_secs(),
        "Data sources loaded"
    );

    let credentials = Arc::new(JsonCredentialStore::new(&config.users_file));
    ensure_admin(credentials.as_ref()).await?;

    let refresher = spawn_refresh(store.clone(), config.refresh_interval);

    let state = AppState {
        store,
        credentials,
        sessions: Arc::new(SessionStore::new(config.session_ttl)),
    };

    let result = web::serve(state, &addr).await;
    refresher.abort();
    result
}

/// Creates an `admin` account from `MYKI_ADMIN_PASSWORD` when the store is empty.
async fn ensure_admin(store: &dyn CredentialStore) -> Result<()> {
    if !store.list_users().await?.is_empty() {
        return Ok(());
    }

    match std::env::var("MYKI_ADMIN_PASSWORD") {
        Ok(password) if !password.is_empty() => {
            store
                .add_user("admin", &password, Role::Admin, "Administrator")
                .await?;
            info!("Created initial admin account");
        }
        _ => warn!("No dashboard accounts exist; add one with `myki_dashboard users add`"),
    }
    Ok(())
}

async fn manage_users(store: &JsonCredentialStore, action: UserAction) -> Result<()> {
    match action {
        UserAction::Add {
            username,
            name,
            role,
            password,
        } => {
            let name = name.unwrap_or_else(|| username.clone());
            store.add_user(&username, &password, role, &name).await?;
            info!(username = %username, role = %role, "User added");
        }
        UserAction::Remove { username } => {
            if store.remove_user(&username).await? {
                info!(username = %username, "User removed");
            } else {
                anyhow::bail!("no such user `{username}`");
            }
        }
        UserAction::List => {
            for user in store.list_users().await? {
                println!("{}\t{}\t{}", user.username, user.role, user.name);
            }
        }
    }
    Ok(())
}
