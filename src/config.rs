use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_GEOCODE_URL: &str = "https://geocode-maps.yandex.ru/1.x/";
const DEFAULT_WEATHER_URL: &str = "https://api.weather.yandex.ru/v2/informers";
const DEFAULT_HOROSCOPE_URL: &str =
    "https://horoscope-app-api.vercel.app/api/v1/get-horoscope/daily";
const DEFAULT_GIGACHAT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";
const DEFAULT_GIGACHAT_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/chat/completions";
const DEFAULT_GIGACHAT_MODELS_URL: &str = "https://gigachat.devices.sberbank.ru/api/v1/models";
const DEFAULT_GIGACHAT_SCOPE: &str = "GIGACHAT_API_PERS";
const DEFAULT_GIGACHAT_MODEL: &str = "GigaChat-2-Max";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// GigaChat client-credentials settings. Only built when both id and secret are present.
#[derive(Debug, Clone)]
pub struct GigaChatSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub api_url: String,
    pub models_url: String,
    pub scope: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub geocode_url: String,
    pub geocode_api_key: Option<String>,
    pub weather_url: String,
    pub weather_api_key: Option<String>,
    pub horoscope_url: String,
    /// `None` degrades the AI fallback to a fixed reply.
    pub gigachat: Option<GigaChatSettings>,
    /// Per-call timeout for every outbound HTTP request.
    pub http_timeout: Duration,
    pub log_dir: PathBuf,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_valid = bot_token
            .split_once(':')
            .is_some_and(|(id, secret)| id.parse::<u64>().is_ok() && !secret.is_empty());
        if !token_valid {
            return Err(ConfigError::Invalid {
                key: "BOT_TOKEN",
                reason: "expected format 123456789:ABCdefGHI...".into(),
            });
        }

        let http_timeout = match get("HTTP_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    key: "HTTP_TIMEOUT_SECS",
                    reason: e.to_string(),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let verify_ssl = match get("GIGACHAT_VERIFY_SSL") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "GIGACHAT_VERIFY_SSL",
                reason: format!("expected true/false, got '{raw}'"),
            })?,
            None => true,
        };

        let gigachat = match (get("GIGACHAT_CLIENT_ID"), get("GIGACHAT_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GigaChatSettings {
                client_id,
                client_secret,
                auth_url: get_or("GIGACHAT_AUTH_URL", DEFAULT_GIGACHAT_AUTH_URL),
                api_url: get_or("GIGACHAT_URL", DEFAULT_GIGACHAT_URL),
                models_url: get_or("GIGACHAT_MODELS_URL", DEFAULT_GIGACHAT_MODELS_URL),
                scope: get_or("GIGACHAT_SCOPE", DEFAULT_GIGACHAT_SCOPE),
                model: get_or("GIGACHAT_MODEL", DEFAULT_GIGACHAT_MODEL),
                system_prompt: get("GIGACHAT_SYSTEM_PROMPT"),
                verify_ssl,
            }),
            _ => None,
        };

        Ok(Self {
            bot_token,
            geocode_url: get_or("YANDEX_GEOCODE_URL", DEFAULT_GEOCODE_URL),
            geocode_api_key: get("YANDEX_GEOCODE_API_KEY"),
            weather_url: get_or("YANDEX_WEATHER_URL", DEFAULT_WEATHER_URL),
            weather_api_key: get("YANDEX_WEATHER_API_KEY"),
            horoscope_url: get_or("HOROSCOPE_API_URL", DEFAULT_HOROSCOPE_URL),
            gigachat,
            http_timeout,
            log_dir: get("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
