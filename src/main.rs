use business_assistant::config::AssistantConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,business_assistant=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AssistantConfig::from_env();
    let addr = config.bind_addr;
    let state = business_assistant::build_state(config).await;
    let app = business_assistant::build_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "business assistant listening");

    axum::serve(listener, app).await?;
    Ok(())
}
