use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use excel_fanout::router;
use excel_fanout::Settings;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();
    let filter = EnvFilter::try_new(&settings.log)
        .with_context(|| format!("Invalid log filter '{}'", settings.log))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let address = settings.address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!(%address, archive_format = ?settings.archive_format, "listening");

    axum::serve(listener, router(settings))
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
