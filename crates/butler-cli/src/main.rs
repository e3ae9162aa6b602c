//! `butler` – desk-robot planning relay
//!
//! This binary wires the relay together and serves it until Ctrl-C:
//!
//! 1. Installs structured logging (and OTLP export when configured).
//! 2. Loads `~/.butler/config.toml` plus `BUTLER_*` / key overrides; exits
//!    non-zero when the configuration is unusable (e.g. no OpenAI key).
//! 3. Builds the snapshot store, plan oracle, command validator and relay.
//! 4. Serves the HTTP endpoints until Ctrl-C, then drains in-flight requests.

mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tracing::{error, info, warn};

use butler_memory::SnapshotStore;
use butler_runtime::{CommandValidator, OpenAiPlanOracle, PlanRelay};
use butler_server::{AppState, RelayServer};

fn main() -> ExitCode {
    // The guard flushes pending spans on drop, so it lives until exit.
    let _tracing = butler_runtime::init_tracing("butler");

    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "configuration rejected");
            println!("{}: {}", "Config error".red(), e);
            println!(
                "  Edit {} or set the matching environment variable.",
                config::config_path().display().to_string().bold()
            );
            return ExitCode::FAILURE;
        }
    };
    print_summary(&cfg);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(serve(&cfg)) {
        Ok(()) => {
            println!("{}", "  ✓ Relay stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "relay terminated");
            println!("{}: {}", "Relay error".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(cfg: &config::Config) -> Result<(), String> {
    let oracle_timeout = Duration::from_secs(cfg.oracle_timeout_secs);
    let freshness_window = cfg.freshness_window()?;

    let store = Arc::new(SnapshotStore::with_freshness_window(freshness_window));
    let oracle = OpenAiPlanOracle::new(
        cfg.oracle_base_url.clone(),
        cfg.oracle_model.clone(),
        cfg.openai_api_key.clone(),
        &cfg.limits,
        oracle_timeout,
    )
    .map_err(|e| format!("failed to build plan oracle: {e}"))?;
    let validator = CommandValidator::new(cfg.limits).map_err(|e| e.to_string())?;

    let relay = PlanRelay::new(store, Arc::new(oracle), validator)
        .with_oracle_timeout(oracle_timeout);
    let proxy_key = (!cfg.proxy_api_key.is_empty()).then(|| cfg.proxy_api_key.clone());
    let state = AppState::new(relay)
        .with_api_key(proxy_key)
        .with_max_upload_bytes(cfg.max_upload_bytes);

    info!(port = cfg.port, model = %cfg.oracle_model, "starting relay");

    RelayServer::new(state)
        .with_port(cfg.port)
        .run_until(shutdown_signal())
        .await
        .map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            println!();
            println!("{}", "⚠  Ctrl-C received – initiating graceful shutdown …".yellow().bold());
        }
        Err(e) => {
            // Without a signal handler the relay runs until killed.
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___       __  __       "#.bold().cyan());
    println!("{}", r#"  / _ )__ __/ /_/ /__ ____"#.bold().cyan());
    println!("{}", r#" / _  / // / __/ / -_) __/"#.bold().cyan());
    println!("{}", r#"/____/\_,_/\__/_/\__/_/   "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Butler".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Desk-robot planning relay");
    println!();
}

fn print_summary(cfg: &config::Config) {
    println!(
        "  Config loaded from {}",
        config::config_path().display().to_string().bold()
    );
    println!("  Listening port   {}", cfg.port.to_string().bold());
    println!("  Planner          {} @ {}", cfg.oracle_model.bold(), cfg.oracle_base_url.dimmed());
    println!("  Snapshot window  {}s", cfg.freshness_window_secs);
    println!("  Joint limits     {}", cfg.limits);
    if cfg.proxy_api_key.is_empty() {
        println!("  Robot auth       {}", "disabled (no PROXY_API_KEY)".yellow());
    } else {
        println!("  Robot auth       {}", "x-api-key required".green());
    }
    println!();
}
