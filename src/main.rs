//! Runbox - untrusted code execution worker with HTTP API.
//!
//! Usage:
//!   runbox serve [--port 8080]                         # Start HTTP server
//!   runbox run --code <src> [--input ..] [--timeout 5] # One-shot execution

#[cfg(not(unix))]
compile_error!("This program only works on Unix hosts.");

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use runbox::engine::{self, EngineConfig, ExecutionRequest};
use runbox::http_server;
use runbox::metrics::{self, FileMetricsStore};
use runbox::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "runbox")]
#[command(about = "Untrusted code execution worker with HTTP API")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to the persisted metrics file
    #[arg(long, default_value = "metrics.json")]
    metrics_file: PathBuf,

    /// Interpreter used to run submissions
    #[arg(long, default_value = "python3")]
    interpreter: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Execute a single submission and print the result as JSON
    Run {
        /// Source code to execute
        #[arg(long)]
        code: String,

        /// Stdin passed to the submission
        #[arg(long, default_value = "")]
        input: String,

        /// Wall-clock timeout in seconds
        #[arg(long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let store = Arc::new(FileMetricsStore::new(args.metrics_file));
    let engine_config = EngineConfig {
        interpreter: args.interpreter,
        ..EngineConfig::default()
    };

    match args.command {
        Commands::Serve { port } => {
            let state = AppState::new(engine_config, store);
            http_server::run_server(port, state).await;
        }
        Commands::Run {
            code,
            input,
            timeout,
        } => {
            let request = ExecutionRequest {
                source: code,
                stdin: input,
                timeout_seconds: timeout,
            };
            let result = tokio::task::spawn_blocking(move || {
                let result = engine::execute(&engine_config, &request);
                metrics::record(store.as_ref(), &result);
                result
            })
            .await
            .expect("execution task panicked");
            println!(
                "{}",
                serde_json::to_string_pretty(&result).expect("serialize result")
            );
        }
    }
}
