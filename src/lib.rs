pub mod client;
pub mod config;
pub mod logging;
pub mod model;
pub mod prompt;
pub mod repl;
pub mod session;
pub mod web;

use anyhow::{Context, Result};
use std::env;
use tracing::{error, info};

use client::ChatClient;
use config::Config;
use repl::{run_once, run_repl};

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            return Err(err).context("Invalid configuration");
        }
    };
    info!(
        provider = %cfg.provider,
        model = %cfg.model,
        base_url = %cfg.base_url,
        timeout_secs = cfg.timeout_secs,
        max_retries = cfg.max_retries,
        "loaded runtime configuration"
    );

    let client = ChatClient::from_config(&cfg)?;

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => run_repl(&client).await,
        Some("serve") => web::serve(client, cfg.web_bind_addr, cfg.web_static_dir.clone()).await,
        Some(_) => run_once(&client, &args.join(" ")).await,
    }
}
