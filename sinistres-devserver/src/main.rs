use anyhow::Context;
use tracing::info;

use sinistres_devserver::{init_tracing, serve};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let addr =
        std::env::var("SINISTRES_DEVSERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(addr = %addr, "sinistres devserver listening");
    serve(listener).await?;
    Ok(())
}
