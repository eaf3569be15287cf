use powerplatform::{PowerPlatformProvider, PROVIDER_NAME};
use tf_provider::serve;

/// Level from `TF_LOG_PROVIDER`, falling back to `TF_LOG`, then `info`
fn log_level() -> tracing::Level {
    ["TF_LOG_PROVIDER", "TF_LOG"]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find_map(|value| value.parse().ok())
        .unwrap_or(tracing::Level::INFO)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the plugin handshake
    tracing_subscriber::fmt()
        .with_max_level(log_level())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    serve(PROVIDER_NAME, PowerPlatformProvider::new()).await
}
