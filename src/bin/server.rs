use immo_suite::{
    api::{start_server, ApiState},
    config::AppConfig,
    llm::{LanguageModel, OpenAiClient},
    session::SessionStore,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let model: Option<Arc<dyn LanguageModel>> = match config.llm.clone() {
        Some(llm) => {
            let client = OpenAiClient::new(llm)?;
            info!("🤖 Language model: {}", client.name());
            Some(Arc::new(client))
        }
        None => {
            warn!("⚠️  OPENAI_API_KEY not set: photo analysis and chat are disabled");
            None
        }
    };

    info!("🏢 Rental Investment Dashboard - API Server");
    info!("📍 Port: {}", config.port);
    info!(
        "📐 Tax parameters: marginal rate {}, micro allowance {}",
        config.tax.marginal_rate, config.tax.micro_allowance
    );

    info!(
        "🗂️  Sessions expire after {}s idle; chat streams after {}s of silence",
        config.session_idle_ttl.as_secs(),
        config.stream_idle_timeout.as_secs()
    );

    let state = ApiState::new(model, config.tax).with_sessions(SessionStore::with_limits(
        config.session_idle_ttl,
        config.stream_idle_timeout,
    ));

    info!("📡 Starting API server...");
    start_server(state, config.port).await?;

    Ok(())
}
