mod routes;

use sketchcalc_agent::{GeminiBackend, OllamaBackend};
use sketchcalc_core::{agent::VisionBackend, config::Config};
use std::sync::Arc;
use tracing::info;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub backend: Arc<dyn VisionBackend>,
}

fn select_backend(config: &Config) -> Arc<dyn VisionBackend> {
    match config.backend.as_str() {
        "ollama" => Arc::new(
            OllamaBackend::new(&config.ollama_url, &config.ollama_model)
                .with_timeout(config.request_timeout_s),
        ),
        _ => Arc::new(
            GeminiBackend::new(&config.gemini_api_key, &config.model)
                .with_base_url(&config.gemini_base_url)
                .with_timeout(config.request_timeout_s),
        ),
    }
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "sketchcalc_server=info,sketchcalc_core=info,sketchcalc_agent=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    let backend = select_backend(&config);
    info!(backend = backend.name(), "vision backend ready");

    let state = Arc::new(AppState { backend });
    let app = routes::router(state, config.max_image_bytes);

    let addr = format!("{}:{}", config.web_bind, config.web_port);
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
