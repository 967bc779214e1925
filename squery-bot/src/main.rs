use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use squery_bot::commands::Registry;
use squery_bot::config::{Cli, Config};
use squery_bot::dispatcher;
use squery_bot::router::Router;
use squery_sdk::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs with SQUERY_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("SQUERY_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "squery_bot=info,squery_sdk=info".into());
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;

    let registry = Registry::new(&config.commands);
    for rule in registry.rules() {
        tracing::info!(
            command = %format!("{}{}", config.commands.prefix, rule.name),
            group = ?rule.required_group,
            "{}",
            rule.help
        );
    }
    let router = Arc::new(Router::new(registry, config.commands.clone()));

    let mut session = Session::new(config.session_config());
    tracing::info!(
        host = %config.server.host,
        port = config.server.query_port,
        "Starting squery-bot"
    );

    session
        .run(shutdown_signal(), move |connection, events| {
            dispatcher::serve(connection, events, router.clone())
        })
        .await?;

    tracing::info!("Bot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Can't listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
