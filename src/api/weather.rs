//! Yandex weather informer: current conditions at coordinates.

use serde_json::Value;

use super::Coordinates;
use crate::error::{Error, Result};

const API_KEY_HEADER: &str = "X-Yandex-API-Key";

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub temp: serde_json::Number,
    pub condition: String,
}

impl std::fmt::Display for Forecast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°C, {}", self.temp, self.condition)
    }
}

pub struct WeatherClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new(http: reqwest::Client, url: String, api_key: String) -> Self {
        Self { http, url, api_key }
    }

    pub async fn get_weather(&self, at: Coordinates) -> Result<Forecast> {
        let response = self
            .http
            .get(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("lat", at.lat), ("lon", at.lon)])
            .send()
            .await?;

        let body = super::read_json(response).await?;
        parse_fact(&body)
    }
}

fn parse_fact(body: &Value) -> Result<Forecast> {
    let fact = body
        .get("fact")
        .ok_or_else(|| Error::Parse("weather response has no fact".into()))?;
    let temp = match fact.get("temp") {
        Some(Value::Number(n)) => n.clone(),
        _ => return Err(Error::Parse("weather fact has no temp".into())),
    };
    let condition = fact
        .get("condition")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("weather fact has no condition".into()))?
        .to_string();
    Ok(Forecast { temp, condition })
}
