use anyhow::Result;
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use concierge::core::Config;
use concierge::database::Database;
use concierge::features::intent::{
    GeminiClassifier, IntentProvider, IntentResolver, MeteredClassifier, OpenAiClassifier,
    PromptProfile,
};
use concierge::features::notify::WhatsAppNotifier;
use concierge::features::quota::UsageLimiter;
use concierge::features::rate_limiting::RateLimiter;
use concierge::features::scheduler::DispatchScheduler;
use concierge::router::MessageRouter;
use concierge::webhook::{self, AppState};

/// Inbound messages allowed per sender inside the flood window.
const FLOOD_LIMIT: usize = 10;
const FLOOD_WINDOW: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    // The openai crate reads credentials from env vars, not from our
    // config. Set both names for compatibility.
    std::env::set_var("OPENAI_API_KEY", &config.openai_api_key);
    std::env::set_var("OPENAI_KEY", &config.openai_api_key);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting {} WhatsApp assistant...", config.assistant_name);

    let database = Database::new(&config.database_path).await?;

    // Provider chain: quota-metered Gemini first, OpenAI as the safety net.
    let limiter = UsageLimiter::new(database.clone(), config.gemini_daily_limit);
    let gemini = GeminiClassifier::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    let providers: Vec<Arc<dyn IntentProvider>> = vec![
        Arc::new(MeteredClassifier::new(Box::new(gemini), limiter)),
        Arc::new(OpenAiClassifier::new(config.openai_model.clone())),
    ];
    let resolver = IntentResolver::new(
        PromptProfile {
            assistant_name: config.assistant_name.clone(),
            owner_name: config.owner_name.clone(),
        },
        providers,
    );

    let notifier = Arc::new(WhatsAppNotifier::new(
        config.whatsapp_token.clone(),
        &config.whatsapp_phone_number_id,
    )?);

    // Start the dispatch pollers (reminders, routines, events).
    let scheduler = DispatchScheduler::new(database.clone(), notifier.clone());
    scheduler.start();

    let router = MessageRouter::new(
        database,
        resolver,
        notifier,
        RateLimiter::new(FLOOD_LIMIT, FLOOD_WINDOW),
        config.owner_phone.clone(),
        config.owner_name.clone(),
        config.assistant_name.clone(),
    );

    let state = Arc::new(AppState {
        router,
        verify_token: config.verify_token.clone(),
    });
    webhook::serve(state, config.port).await
}
