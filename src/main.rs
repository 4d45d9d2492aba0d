use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use teller_config::Config;
use teller_contracts::ActionRequest;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "./config/example-config.yaml";

#[derive(Parser, Debug)]
#[command(name = "teller", version, about = "Account status action handler")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the invocation API over HTTP.
    Serve {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: String,
    },

    /// Handle one invocation event and print the response envelope.
    Invoke {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: String,

        /// Event JSON file. Reads stdin when omitted.
        #[arg(long)]
        event: Option<PathBuf>,
    },

    /// Load and validate a config file, then exit.
    CheckConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: String,
    },

    /// Verify the hash chain of an audit JSONL file.
    VerifyAudit {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.cmd {
        Command::Serve { config } => {
            let cfg = load_config(&config);
            init_tracing(&cfg);
            tracing::info!(config = %config, store = ?cfg.store.kind, "starting server");
            match teller_server::serve(cfg).await {
                Ok(()) => {
                    tracing::info!("server stopped");
                    0
                }
                Err(e) => {
                    tracing::error!(error = %e, "server exited with error");
                    1
                }
            }
        }
        Command::Invoke { config, event } => {
            let cfg = load_config(&config);
            init_tracing(&cfg);
            match invoke(cfg, event).await {
                Ok(envelope) => {
                    println!("{envelope}");
                    0
                }
                Err(e) => {
                    tracing::error!(error = %e, "invoke failed");
                    1
                }
            }
        }
        Command::CheckConfig { config } => {
            let cfg = load_config(&config);
            println!(
                "config ok: store={:?} allowed_action_groups={:?}",
                cfg.store.kind, cfg.scope.allowed_action_groups
            );
            0
        }
        Command::VerifyAudit { path } => match teller_server::verify_audit_chain(&path) {
            Ok(verified) => {
                println!("audit chain verified: {verified} records");
                0
            }
            Err(e) => {
                eprintln!("audit verification failed: {e}");
                1
            }
        },
    };
    std::process::exit(code);
}

fn load_config(path: &str) -> Config {
    match teller_config::load_and_validate(path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    }
}

// RUST_LOG wins over the configured filter.
fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn invoke(cfg: Config, event: Option<PathBuf>) -> Result<String, String> {
    let raw = match event {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            buf
        }
    };
    let event: Value = serde_json::from_str(&raw).map_err(|e| format!("invalid event: {e}"))?;
    let request = ActionRequest::from_event(event);
    tracing::debug!(api_path = %request.api_path, "invoking once");
    let response = teller_server::invoke_once(cfg, request).await?;
    serde_json::to_string(&response).map_err(|e| e.to_string())
}
