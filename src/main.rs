use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use astrobot::bot::{IncomingMessage, Router, Services, TelegramClient};
use astrobot::config::Config;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {e}");
        }
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    std::fs::create_dir_all(&config.log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&config.log_dir, "bot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting astrobot...");
    if config.gigachat.is_none() {
        warn!("GigaChat credentials not set, AI replies disabled");
    }
    if config.weather_api_key.is_none() {
        warn!("YANDEX_WEATHER_API_KEY not set, weather replies disabled");
    }

    let services = match Services::from_config(&config) {
        Ok(services) => services,
        Err(e) => {
            error!("Failed to build HTTP clients: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.bot_token);
    let telegram = Arc::new(TelegramClient::new(bot.clone()));
    let router = Arc::new(Router::new(telegram, services));

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![router])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, router: Arc<Router>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let username = msg
        .from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.first_name.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    let incoming = IncomingMessage {
        chat_id: msg.chat.id.0,
        message_id: msg.id.0 as i64,
        username,
        text: text.to_string(),
    };
    router.handle(&incoming).await;

    Ok(())
}
