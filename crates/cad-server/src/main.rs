use std::net::SocketAddr;
use std::path::PathBuf;

use cad_ai::ChatCompletionsModel;
use cad_server::{AppState, DynModel, app};
use cad_session::{Config, RefinementController, Session};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cadloop-server", version, about = "HTTP API for the cadloop refinement loop")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR")]
    storage: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::discover(args.config.as_deref(), args.storage.as_deref())?;
    let session = Session::open(&config)?;

    // The blocking HTTP client must be built outside the async runtime.
    let model: DynModel = Box::new(ChatCompletionsModel::new(config.generation.clone())?);
    let controller = RefinementController::from_config(model, &config)?;
    let state = AppState::new(controller, session);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(args.bind).await?;
        info!(address = %listener.local_addr()?, storage = %config.storage.dir.display(), "listening");
        axum::serve(listener, app(state))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
