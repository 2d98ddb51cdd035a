//! Multi-step conversations: per-chat pending steps and their continuations.

use std::collections::HashMap;

use teloxide::utils::html;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::router::{IncomingMessage, Router};
use super::telegram::TextFormat;
use crate::api::gigachat::{completion_text, model_ids};
use crate::api::horoscope::SIGNS;
use crate::error::Error;

pub const DAY_PROMPT: &str = "Какой день вам нужен?\nВыберите один: СЕГОДНЯ, ЗАВТРА, ВЧЕРА, \
                              или дату в формате ГГГГ-ММ-ДД.";
pub const CITY_PROMPT: &str = "Укажите город для прогноза погоды:";
pub const HOROSCOPE_ANNOUNCEMENT: &str = "Вот ваш гороскоп!";
pub const AI_NOT_CONFIGURED: &str = "GigaChat не настроен. Обратитесь к администратору.";
pub const WEATHER_NOT_CONFIGURED: &str = "Прогноз погоды не настроен: нет ключа Yandex Weather API.";

/// The follow-up question a chat still owes an answer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStep {
    AwaitingSign,
    AwaitingDay { sign: String },
    AwaitingCity,
}

/// Pending steps keyed by chat id. A step is consumed by the next message from that chat.
#[derive(Default)]
pub struct Conversations {
    steps: Mutex<HashMap<i64, PendingStep>>,
}

impl Conversations {
    pub async fn set(&self, chat_id: i64, step: PendingStep) {
        self.steps.lock().await.insert(chat_id, step);
    }

    pub async fn take(&self, chat_id: i64) -> Option<PendingStep> {
        self.steps.lock().await.remove(&chat_id)
    }

    pub async fn get(&self, chat_id: i64) -> Option<PendingStep> {
        self.steps.lock().await.get(&chat_id).cloned()
    }
}

pub fn sign_prompt() -> String {
    let names: Vec<&str> = SIGNS.iter().map(|(ru, _)| *ru).collect();
    format!(
        "Какой твой знак зодиака?\nВыбери один: {}.",
        names.join(", ")
    )
}

/// Uppercase the first letter, lowercase the rest.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

impl Router {
    pub(super) async fn continue_step(&self, step: PendingStep, msg: &IncomingMessage) {
        match step {
            PendingStep::AwaitingSign => self.capture_sign(msg.chat_id, &msg.text).await,
            PendingStep::AwaitingDay { sign } => self.send_horoscope(msg.chat_id, &sign, &msg.text).await,
            PendingStep::AwaitingCity => self.send_weather(msg.chat_id, &msg.text).await,
        }
    }

    pub(super) async fn ask_sign(&self, chat_id: i64) {
        self.conversations.set(chat_id, PendingStep::AwaitingSign).await;
        self.say(chat_id, &sign_prompt()).await;
    }

    /// Any text is accepted as the sign.
    pub(super) async fn capture_sign(&self, chat_id: i64, text: &str) {
        let sign = capitalize(text);
        self.conversations
            .set(chat_id, PendingStep::AwaitingDay { sign })
            .await;
        self.say(chat_id, DAY_PROMPT).await;
    }

    pub(super) async fn send_horoscope(&self, chat_id: i64, sign: &str, day: &str) {
        match self.horoscope.get_daily_horoscope(sign, day).await {
            Ok(horoscope) => {
                let body = format!(
                    "<b>Horoscope:</b> {}\n<b>Sign:</b> {}\n<b>Day:</b> {}",
                    html::escape(&horoscope.text),
                    html::escape(sign),
                    html::escape(&horoscope.date),
                );
                self.say(chat_id, HOROSCOPE_ANNOUNCEMENT).await;
                self.send(chat_id, &body, TextFormat::Html, None).await;
            }
            Err(e) => {
                warn!("Horoscope lookup for {sign} / {day} failed: {e}");
                self.say(chat_id, &format!("Не удалось получить гороскоп: {e}"))
                    .await;
            }
        }
    }

    pub(super) async fn ask_city(&self, chat_id: i64) {
        self.conversations.set(chat_id, PendingStep::AwaitingCity).await;
        self.say(chat_id, CITY_PROMPT).await;
    }

    /// Geocode the city, then fetch the forecast for its coordinates.
    pub(super) async fn send_weather(&self, chat_id: i64, city: &str) {
        let city = city.trim();
        let Some(ref weather) = self.weather else {
            self.say(chat_id, WEATHER_NOT_CONFIGURED).await;
            return;
        };

        let reply = match self.geocode.geocode_city(city).await {
            Ok(Some(coords)) => match weather.get_weather(coords).await {
                Ok(forecast) => format!("Погода в {city}: {forecast}"),
                Err(e) => {
                    warn!("Weather lookup for {city} failed: {e}");
                    format!("Не удалось получить погоду: {e}")
                }
            },
            Ok(None) => {
                info!("City not found: {city}");
                format!("Город «{city}» не найден.")
            }
            Err(e) => {
                warn!("Geocoding {city} failed: {e}");
                format!("Не удалось найти город: {e}")
            }
        };
        self.say(chat_id, &reply).await;
    }

    /// Stateless completion: the user's text is the only user turn.
    pub(super) async fn ai_reply(&self, msg: &IncomingMessage) {
        let answer = match self.gigachat {
            Some(ref client) => {
                let result = client
                    .send_chat(&msg.text, None, client.system_prompt())
                    .await
                    .and_then(|response| {
                        completion_text(&response)
                            .map(str::to_string)
                            .ok_or_else(|| Error::Parse("no completion in response".into()))
                    });
                match result {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("GigaChat call failed: {e}");
                        format!("GigaChat error: {e}")
                    }
                }
            }
            None => AI_NOT_CONFIGURED.to_string(),
        };
        self.send(msg.chat_id, &answer, TextFormat::Plain, Some(msg.message_id))
            .await;
    }

    pub(super) async fn send_models(&self, chat_id: i64) {
        let reply = match self.gigachat {
            Some(ref client) => match client.list_models().await {
                Ok(response) => {
                    let ids = model_ids(&response);
                    if ids.is_empty() {
                        "Модели не найдены.".to_string()
                    } else {
                        format!("Доступные модели:\n{}", ids.join("\n"))
                    }
                }
                Err(e) => {
                    warn!("Listing GigaChat models failed: {e}");
                    format!("GigaChat error: {e}")
                }
            },
            None => AI_NOT_CONFIGURED.to_string(),
        };
        self.say(chat_id, &reply).await;
    }
}
