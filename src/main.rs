use anyhow::Context;
use tracing_subscriber::EnvFilter;

use munshi_predictor::{
    config::Config, items::ItemCodeTable, model::ModelArtifacts, tunnel, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cfg = Config::from_env().context("invalid configuration")?;

    let models = ModelArtifacts::load(&cfg.model_path, &cfg.scaler_path)
        .context("error loading model or scaler")?;
    tracing::info!(
        model = %cfg.model_path.display(),
        scaler = %cfg.scaler_path.display(),
        predictor = models.predictor_name(),
        "model and scaler loaded"
    );

    let items = ItemCodeTable::new();
    tracing::info!("available items and their codes:");
    for (name, code) in items.iter() {
        tracing::info!("{}: {}", name, code);
    }

    let addr = std::net::SocketAddr::new(cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("listening on {}", addr);

    // Held for the lifetime of the server; dropping it stops the agent.
    let _tunnel = match &cfg.tunnel {
        Some(tcfg) => {
            let t = tunnel::open(tcfg, cfg.port)
                .await
                .context("error starting ngrok tunnel")?;
            tracing::info!("ngrok tunnel created: {}", t.public_url);
            println!(" * ngrok tunnel \"{}\" -> \"{}\"", t.public_url, cfg.local_url());
            Some(t)
        }
        None => None,
    };

    let app = munshi_predictor::router(AppState::new(items, models));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
