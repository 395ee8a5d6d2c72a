//! Server control API
//!
//! Process-level entry points: logging setup, rule loading and the
//! start/stop lifecycle of the local site server.

use once_cell::sync::Lazy;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use tokio::net::TcpListener;

use crate::classifier;
use crate::models::RuleSet;
use crate::rewriter::Rewriter;
use crate::server::{self, ServerConfig};
use crate::storage;

// Global server state
static SERVER_RUNNING: AtomicBool = AtomicBool::new(false);
static ACTIVE_SERVER_TASK: AtomicU64 = AtomicU64::new(0);

/// Current running server address (port, bind_address)
static CURRENT_SERVER_CONFIG: Lazy<RwLock<(u16, String)>> =
    Lazy::new(|| RwLock::new((server::DEFAULT_PORT, "127.0.0.1".to_string())));

/// Get the version of the asset shim library
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Initialize the core library (call once at startup)
/// `storage_path` is used to store log files in release mode
#[allow(unused_variables)]
pub fn init_core(storage_path: Option<String>) -> Result<bool, String> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }

    #[cfg(debug_assertions)]
    {
        // Debug mode: log to console (stderr)
        let level = resolve_log_level();
        let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
    }

    #[cfg(not(debug_assertions))]
    {
        // Release mode: log to file
        let level = resolve_log_level();

        let log_dir = storage_path
            .as_ref()
            .map(|p| std::path::PathBuf::from(p).join("logs"))
            .unwrap_or_else(|| std::path::PathBuf::from("logs"));

        std::fs::create_dir_all(&log_dir).map_err(|e| {
            format!(
                "Failed to create log directory {}: {}",
                log_dir.display(),
                e
            )
        })?;
        let file_appender = tracing_appender::rolling::daily(&log_dir, "assetshim_core");
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

        // Logging lasts until process exit.
        std::mem::forget(_guard);

        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(non_blocking)
            .try_init();
    }

    tracing::info!("Asset shim core initialized v{}", env!("CARGO_PKG_VERSION"));
    Ok(true)
}

fn resolve_log_level() -> tracing::level_filters::LevelFilter {
    use tracing::level_filters::LevelFilter;

    match std::env::var("RUST_LOG") {
        Ok(val) => match val.to_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            _ => LevelFilter::INFO,
        },
        Err(_) => LevelFilter::INFO,
    }
}

/// Load a JSON rule set and install it process-wide. Returns `false` when
/// the same set is already installed. Fails once classification has run
/// with a different set, including the built-in defaults.
pub fn load_rules(path: &Path) -> Result<bool, String> {
    let rules = RuleSet::from_json_file(path).map_err(|e| format!("{:#}", e))?;
    let count = rules.rules.len();
    let installed = classifier::install_rules(rules)
        .map_err(|_| "a different classification rule set is already in use".to_string())?;
    if installed {
        tracing::info!("Installed {} classification rules from {:?}", count, path);
    } else {
        tracing::debug!("Rule set from {:?} is already installed", path);
    }
    Ok(installed)
}

/// Server status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Whether the server is running
    pub is_running: bool,
    /// Current port
    pub port: u16,
    /// Bind address
    pub bind_address: String,
    /// Whether the form API has a store behind it
    pub storage_ready: bool,
}

/// Get current server status
pub fn get_server_status() -> ServerStatus {
    let (port, bind_address) = match CURRENT_SERVER_CONFIG.read() {
        Ok(config) => (config.0, config.1.clone()),
        Err(poisoned) => {
            let config = poisoned.into_inner();
            (config.0, config.1.clone())
        }
    };
    ServerStatus {
        is_running: SERVER_RUNNING.load(Ordering::SeqCst),
        port,
        bind_address,
        storage_ready: storage::is_initialized(),
    }
}

pub fn is_running_internal() -> bool {
    SERVER_RUNNING.load(Ordering::SeqCst)
}

/// Start the site server. Returns the port actually bound, which may be
/// above the requested one if that was taken.
pub async fn start_server(config: ServerConfig) -> Result<u16, String> {
    if SERVER_RUNNING.load(Ordering::SeqCst) {
        tracing::info!("Server already running");
        return Ok(get_server_status().port);
    }

    if let Some(rules_path) = &config.rules_path {
        load_rules(rules_path)?;
    }
    // Compile the markup rewriter now so a bad rule set shows up at startup.
    if Rewriter::global().is_none() {
        tracing::warn!("Markup rewriter failed to build from the installed rules");
    }

    // Find an available port starting from the requested one
    let selected_port = find_available_port(&config.bind_address, config.port, 20).await?;
    if selected_port != config.port {
        tracing::warn!(
            "Port {} in use, falling back to {}",
            config.port,
            selected_port
        );
    }

    if let Some(storage_path) = &config.storage_path {
        storage::init_submission_store(storage_path).map_err(|e| format!("{:#}", e))?;
    } else {
        tracing::warn!("No storage path configured; form submissions will be refused");
    }

    SERVER_RUNNING.store(true, Ordering::SeqCst);
    match CURRENT_SERVER_CONFIG.write() {
        Ok(mut current) => *current = (selected_port, config.bind_address.clone()),
        Err(poisoned) => *poisoned.into_inner() = (selected_port, config.bind_address.clone()),
    }
    tracing::info!(
        "Starting site server on {}:{}",
        config.bind_address,
        selected_port
    );

    let server_config = ServerConfig {
        port: selected_port,
        ..config
    };
    ACTIVE_SERVER_TASK.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        if let Err(e) = server::run_server(server_config).await {
            tracing::error!("Site server error: {}", e);
        }

        // If server exits, ensure flag is cleared
        SERVER_RUNNING.store(false, Ordering::SeqCst);
        ACTIVE_SERVER_TASK.fetch_sub(1, Ordering::SeqCst);
    });

    Ok(selected_port)
}

pub(crate) async fn find_available_port(
    bind_address: &str,
    start_port: u16,
    max_tries: u16,
) -> Result<u16, String> {
    use std::io::ErrorKind;

    for offset in 0..max_tries {
        let candidate = start_port.saturating_add(offset);
        match TcpListener::bind((bind_address, candidate)).await {
            Ok(listener) => {
                drop(listener); // release so the real server can bind
                return Ok(candidate);
            }
            Err(err) if err.kind() == ErrorKind::AddrInUse => continue,
            Err(err) => {
                return Err(format!(
                    "Failed to bind to {}:{}: {}",
                    bind_address, candidate, err
                ))
            }
        }
    }

    Err(format!(
        "No available port found in range {}-{}",
        start_port,
        start_port.saturating_add(max_tries.saturating_sub(1))
    ))
}

/// Stop the site server and wait for its accept loop to exit
pub async fn stop_server() -> Result<bool, String> {
    tracing::info!("Stopping site server");
    SERVER_RUNNING.store(false, Ordering::SeqCst);
    while ACTIVE_SERVER_TASK.load(Ordering::SeqCst) != 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    }
    Ok(true)
}
