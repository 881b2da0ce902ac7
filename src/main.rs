mod backup;
mod calc;
mod db;
mod ipc;
mod model;
mod remarks;
mod store;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const WORKSPACE_ENV: &str = "REPORTCARDD_WORKSPACE";
const LOG_ENV: &str = "REPORTCARDD_LOG";

fn init_logging() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn initial_state() -> ipc::AppState {
    let mut state = ipc::AppState::preview();
    match std::env::var(WORKSPACE_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            let path = PathBuf::from(path.trim());
            if let Err(e) = ipc::select_workspace(&mut state, path.clone()) {
                tracing::error!(workspace = %path.display(), "failed to open workspace: {:#}", e);
            }
        }
        _ => tracing::warn!("no workspace configured; using volatile preview storage"),
    }
    state
}

fn main() {
    init_logging();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "reportcardd starting");
    let mut state = initial_state();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req),
            Err(e) => {
                tracing::warn!("rejected malformed request: {}", e);
                ipc::bad_json(e.to_string())
            }
        };
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed; exiting");
}
