mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, ConfigCommand};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = Cli::parse();

    match parsed.command {
        None => {
            init_tracing();
            let config = cli::load_server_config("konsul.toml")?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Serve { config }) => {
            init_tracing();
            let config = cli::load_server_config(&config)?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Agent { config }) => {
            init_tracing();
            let config = cli::load_agent_config(&config)?;
            run_agent(config).await
        }
        Some(Command::Config(ConfigCommand::Validate { config })) => {
            let parsed_config = cli::load_server_config(&config)?;
            if !cli::validate_server_config(&parsed_config, &config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show { config })) => {
            let parsed_config = cli::load_server_config(&config)?;
            cli::show_server_config(&parsed_config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("konsul {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,konsul=debug")))
        .json()
        .init();
}

async fn run_server(config: Arc<konsul_core::config::Config>) -> anyhow::Result<()> {
    tracing::info!("konsul authority starting");

    let state = konsul_server::bootstrap::build_app_state(config.clone())?;
    konsul_server::bootstrap::spawn_background_tasks(&state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("binding to {addr}: {e}"))?;
    tracing::info!(addr = %addr, "konsul authority listening");

    let app = konsul_server::bootstrap::with_http_rate_limit(konsul_server::routes::router(state), &config);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;
    Ok(())
}

async fn run_agent(config: konsul_core::config::AgentConfig) -> anyhow::Result<()> {
    tracing::info!(server_address = %config.server_address, "konsul agent starting");
    let (runtime, cancel) = konsul_agent::AgentRuntime::start(config);

    let bind_address = runtime.bind_address().to_string();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| anyhow::anyhow!("binding to {bind_address}: {e}"))?;
    tracing::info!(addr = %bind_address, "konsul agent local surface listening");
    let http = konsul_agent::http::router(runtime.clone());
    let http_cancel = cancel.clone();
    tokio::spawn(async move {
        let serve = axum::serve(listener, http);
        tokio::select! {
            result = serve => { if let Err(e) = result { tracing::warn!(error = %e, "agent http surface exited"); } }
            _ = http_cancel.cancelled() => {}
        }
    });

    tokio::signal::ctrl_c().await.map_err(|e| anyhow::anyhow!("waiting for ctrl-c: {e}"))?;
    tracing::info!(agent_id = %runtime.agent_info().id, "konsul agent shutting down");
    cancel.cancel();
    Ok(())
}
