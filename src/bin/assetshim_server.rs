//! Local site server for an exported page.
//!
//! Serves the page with the markup rewrite applied and hosts the form
//! submission API.
//!
//! Usage:
//! ```
//! cargo run --bin assetshim_server -- --root ./site --port 3000
//! ```

use std::path::PathBuf;

use assetshim::api::server_api;
use assetshim::server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = parse_args();
    server_api::init_core(config.storage_path.clone()).map_err(anyhow::Error::msg)?;

    let port = server_api::start_server(config)
        .await
        .map_err(anyhow::Error::msg)?;
    tracing::info!("Serving on port {}; press Ctrl-C to stop", port);

    tokio::signal::ctrl_c().await?;
    server_api::stop_server().await.map_err(anyhow::Error::msg)?;
    Ok(())
}

fn default_storage_path() -> String {
    dirs::data_local_dir()
        .map(|dir| dir.join("assetshim"))
        .unwrap_or_else(|| PathBuf::from("./assetshim_data"))
        .to_string_lossy()
        .into_owned()
}

fn parse_args() -> ServerConfig {
    let mut args = std::env::args().skip(1);
    let mut config = ServerConfig {
        storage_path: Some(default_storage_path()),
        ..ServerConfig::default()
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--port" => match args.next().map(|p| p.parse::<u16>()) {
                Some(Ok(port)) => config.port = port,
                _ => eprintln!("--port expects a number"),
            },
            "--bind" => {
                if let Some(bind) = args.next() {
                    config.bind_address = bind;
                }
            }
            "--root" => {
                if let Some(root) = args.next() {
                    config.static_root = PathBuf::from(root);
                }
            }
            "--storage-path" => {
                if let Some(path) = args.next() {
                    config.storage_path = Some(path);
                }
            }
            "--no-storage" => {
                config.storage_path = None;
            }
            "--rules" => {
                if let Some(path) = args.next() {
                    config.rules_path = Some(PathBuf::from(path));
                }
            }
            "--origin" => {
                if let Some(origin) = args.next() {
                    config.frontend_origin = origin;
                }
            }
            "--help" | "-h" => {
                eprintln!("Asset shim site server");
                eprintln!();
                eprintln!("Usage: assetshim_server [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --port <PORT>           Port to listen on (default: 3000)");
                eprintln!("  --bind <ADDR>           Bind address (default: 127.0.0.1)");
                eprintln!("  --root <DIR>            Static site root (default: .)");
                eprintln!("  --storage-path <PATH>   Submission database directory");
                eprintln!("  --no-storage            Disable the form submission API");
                eprintln!("  --rules <FILE>          JSON classification rule set");
                eprintln!("  --origin <ORIGIN>       Origin allowed to call the API");
                eprintln!("  --help, -h              Show this help");
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {arg}");
            }
        }
    }

    config
}
