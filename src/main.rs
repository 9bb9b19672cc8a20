use std::sync::Arc;

use agri_assist::channels::{OutboundChannel, WhatsAppChannel};
use agri_assist::config::AppConfig;
use agri_assist::dialog::{Dialog, DialogDeps};
use agri_assist::providers::farm::{AgriTechClient, FarmPlatform};
use agri_assist::providers::llm::{AnthropicGenerator, TextGenerator};
use agri_assist::providers::search::{BraveSearch, SearchProvider};
use agri_assist::providers::translate::{GoogleTranslator, Translator};
use agri_assist::providers::weather::{OpenWeatherClient, WeatherProvider};
use agri_assist::session::{LibSqlStore, SessionStore};
use agri_assist::tasks::{TaskDeps, TaskQueue};
use agri_assist::webhook;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!("  export OPENWEATHER_API_KEY=...");
        std::process::exit(1);
    });

    eprintln!("🌿 AgriAssist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!(
        "   Webhook: http://0.0.0.0:{}/webhook/whatsapp",
        config.port
    );
    eprintln!(
        "   WhatsApp: {}",
        if config.twilio.is_some() {
            "enabled (Twilio)"
        } else {
            "debug mode (logging only)"
        }
    );
    eprintln!(
        "   Search: {}",
        if config.brave_api_key.is_some() {
            "enabled (Brave)"
        } else {
            "disabled"
        }
    );
    eprintln!(
        "   Farm platform: {}",
        if config.farm_api.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    // ── Store ───────────────────────────────────────────────────────────
    let store: Arc<dyn SessionStore> = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&config.db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {e}", config.db_path);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Providers ───────────────────────────────────────────────────────
    let llm: Arc<dyn TextGenerator> = Arc::new(AnthropicGenerator::new(
        config.anthropic_api_key.clone(),
        &config.model,
    ));
    let weather: Arc<dyn WeatherProvider> =
        Arc::new(OpenWeatherClient::new(&config.openweather_api_key));
    let translator: Arc<dyn Translator> = Arc::new(GoogleTranslator::new());
    let search: Arc<dyn SearchProvider> = Arc::new(BraveSearch::new(config.brave_api_key.clone()));
    let farm: Arc<dyn FarmPlatform> = Arc::new(AgriTechClient::new(config.farm_api.clone()));
    let outbound: Arc<dyn OutboundChannel> =
        Arc::new(WhatsAppChannel::new(config.twilio.clone()));

    // ── Background tasks ────────────────────────────────────────────────
    let tasks = TaskQueue::start(TaskDeps {
        store: Arc::clone(&store),
        outbound: Arc::clone(&outbound),
        translator: Arc::clone(&translator),
        llm,
        weather: Arc::clone(&weather),
        search,
        farm: Arc::clone(&farm),
        twilio: config.twilio.clone(),
    });

    // ── Dialog + server ─────────────────────────────────────────────────
    let dialog = Arc::new(Dialog::new(DialogDeps {
        store,
        outbound,
        translator,
        weather,
        farm,
        tasks,
    }));

    let app = webhook::router(dialog);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
