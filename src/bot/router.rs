//! Message routing: commands, pending steps, keyword context, AI fallback.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use super::flows::{capitalize, Conversations, PendingStep};
use super::telegram::{Messenger, TextFormat};
use crate::api::{self, GeocodeClient, GigaChatClient, HoroscopeClient, WeatherClient};
use crate::api::horoscope::SIGNS;
use crate::config::Config;
use crate::error::Result;

const GREETING: &str = "Привет, как дела?";
const HELP: &str = "Я умею:\n\
                    /horoscope — гороскоп на день\n\
                    /weather [город] — погода в городе\n\
                    /models — модели GigaChat\n\
                    Любой другой текст отправляется в GigaChat.";

static COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^/([^\s@]+)(?:@\S*)?(?:\s+(.*))?$").unwrap());

static ZODIAC: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<String> = SIGNS.iter().map(|(ru, _)| ru.to_lowercase()).collect();
    Regex::new(&format!(r"(?i)\b({})\b", names.join("|"))).unwrap()
});

static HOROSCOPE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(horoscope|гороскоп)").unwrap());

static WEATHER_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(weather|погод)").unwrap());

/// A text message received from a chat.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i64,
    pub username: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Horoscope,
    Weather,
    Help,
    Models,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "start" | "старт" | "привет" => Some(Self::Start),
            "horoscope" | "гороскоп" => Some(Self::Horoscope),
            "weather" | "погода" => Some(Self::Weather),
            "help" | "помощь" => Some(Self::Help),
            "models" => Some(Self::Models),
            _ => None,
        }
    }
}

/// How a message is classified from its text alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Command { command: Command, args: Option<String> },
    UnknownCommand(String),
    /// Plain text about horoscopes; `sign` is set when a zodiac sign was named.
    HoroscopeContext { sign: Option<String> },
    WeatherContext,
    Fallback,
}

pub fn classify(text: &str) -> Route {
    let text = text.trim();

    if text.starts_with('/') {
        let Some(caps) = COMMAND.captures(text) else {
            return Route::UnknownCommand(text.to_string());
        };
        let name = &caps[1];
        let args = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|a| !a.is_empty());
        return match Command::parse(name) {
            Some(command) => Route::Command { command, args },
            None => Route::UnknownCommand(name.to_string()),
        };
    }

    if let Some(caps) = ZODIAC.captures(text) {
        return Route::HoroscopeContext {
            sign: Some(capitalize(&caps[1])),
        };
    }
    if HOROSCOPE_WORD.is_match(text) {
        return Route::HoroscopeContext { sign: None };
    }
    if WEATHER_WORD.is_match(text) {
        return Route::WeatherContext;
    }
    Route::Fallback
}

/// Third-party clients the router dispatches to, built once at startup.
pub struct Services {
    pub gigachat: Option<GigaChatClient>,
    pub geocode: GeocodeClient,
    /// `None` when no weather API key is configured.
    pub weather: Option<WeatherClient>,
    pub horoscope: HoroscopeClient,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = api::http_client(config.http_timeout)?;
        let gigachat = config
            .gigachat
            .clone()
            .map(|settings| GigaChatClient::new(settings, config.http_timeout))
            .transpose()?;

        Ok(Self {
            gigachat,
            geocode: GeocodeClient::new(
                http.clone(),
                config.geocode_url.clone(),
                config.geocode_api_key.clone(),
            ),
            weather: config
                .weather_api_key
                .clone()
                .map(|key| WeatherClient::new(http.clone(), config.weather_url.clone(), key)),
            horoscope: HoroscopeClient::new(http, config.horoscope_url.clone()),
        })
    }
}

pub struct Router {
    messenger: Arc<dyn Messenger>,
    pub(super) gigachat: Option<GigaChatClient>,
    pub(super) geocode: GeocodeClient,
    pub(super) weather: Option<WeatherClient>,
    pub(super) horoscope: HoroscopeClient,
    pub(super) conversations: Conversations,
}

impl Router {
    pub fn new(messenger: Arc<dyn Messenger>, services: Services) -> Self {
        Self {
            messenger,
            gigachat: services.gigachat,
            geocode: services.geocode,
            weather: services.weather,
            horoscope: services.horoscope,
            conversations: Conversations::default(),
        }
    }

    pub async fn pending_step(&self, chat_id: i64) -> Option<PendingStep> {
        self.conversations.get(chat_id).await
    }

    /// Handle one inbound message. Exactly one handler runs.
    pub async fn handle(&self, msg: &IncomingMessage) {
        let preview: String = msg.text.chars().take(100).collect();
        info!("User: {} ({}), Text: {preview:?}", msg.username, msg.chat_id);

        let route = classify(&msg.text);

        // Commands always win and cancel whatever was pending.
        if matches!(route, Route::Command { .. } | Route::UnknownCommand(_)) {
            self.conversations.take(msg.chat_id).await;
        } else if let Some(step) = self.conversations.take(msg.chat_id).await {
            self.continue_step(step, msg).await;
            return;
        }

        match route {
            Route::Command { command, args } => self.run_command(command, args, msg).await,
            Route::UnknownCommand(name) => {
                info!("Unknown command /{name}");
                self.say(msg.chat_id, HELP).await;
            }
            Route::HoroscopeContext { sign: Some(sign) } => {
                self.conversations
                    .set(msg.chat_id, PendingStep::AwaitingDay { sign })
                    .await;
                self.say(msg.chat_id, super::flows::DAY_PROMPT).await;
            }
            Route::HoroscopeContext { sign: None } => self.ask_sign(msg.chat_id).await,
            Route::WeatherContext => self.ask_city(msg.chat_id).await,
            Route::Fallback => self.ai_reply(msg).await,
        }
    }

    async fn run_command(&self, command: Command, args: Option<String>, msg: &IncomingMessage) {
        match (command, args) {
            (Command::Start, _) => {
                self.send(msg.chat_id, GREETING, TextFormat::Plain, Some(msg.message_id))
                    .await
            }
            (Command::Help, _) => self.say(msg.chat_id, HELP).await,
            (Command::Models, _) => self.send_models(msg.chat_id).await,
            (Command::Horoscope, Some(sign)) => self.capture_sign(msg.chat_id, &sign).await,
            (Command::Horoscope, None) => self.ask_sign(msg.chat_id).await,
            (Command::Weather, Some(city)) => self.send_weather(msg.chat_id, &city).await,
            (Command::Weather, None) => self.ask_city(msg.chat_id).await,
        }
    }

    pub(super) async fn say(&self, chat_id: i64, text: &str) {
        self.send(chat_id, text, TextFormat::Plain, None).await;
    }

    /// Delivery failures cannot be answered in the chat, so they are only logged.
    pub(super) async fn send(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        reply_to: Option<i64>,
    ) {
        if let Err(e) = self
            .messenger
            .send_message(chat_id, text, format, reply_to)
            .await
        {
            debug!("Reply to chat {chat_id} not delivered: {e}");
        }
    }
}
