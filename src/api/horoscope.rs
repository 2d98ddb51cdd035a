//! Daily horoscope lookup.

use serde_json::Value;

use crate::error::{Error, Result};

/// Russian sign names paired with the names the horoscope API expects.
pub const SIGNS: [(&str, &str); 12] = [
    ("Овен", "Aries"),
    ("Телец", "Taurus"),
    ("Близнецы", "Gemini"),
    ("Рак", "Cancer"),
    ("Лев", "Leo"),
    ("Дева", "Virgo"),
    ("Весы", "Libra"),
    ("Скорпион", "Scorpio"),
    ("Стрелец", "Sagittarius"),
    ("Козерог", "Capricorn"),
    ("Водолей", "Aquarius"),
    ("Рыбы", "Pisces"),
];

const DAYS: [(&str, &str); 3] = [
    ("СЕГОДНЯ", "TODAY"),
    ("ЗАВТРА", "TOMORROW"),
    ("ВЧЕРА", "YESTERDAY"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Horoscope {
    pub text: String,
    pub date: String,
}

pub struct HoroscopeClient {
    http: reqwest::Client,
    url: String,
}

impl HoroscopeClient {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }

    pub async fn get_daily_horoscope(&self, sign: &str, day: &str) -> Result<Horoscope> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("sign", api_sign(sign)), ("day", api_day(day))])
            .send()
            .await?;

        let body = super::read_json(response).await?;
        parse_horoscope(&body)
    }
}

/// Map a Russian sign name to the API's; anything else passes through.
fn api_sign(sign: &str) -> String {
    let sign = sign.trim();
    SIGNS
        .iter()
        .find(|(ru, _)| ru.to_lowercase() == sign.to_lowercase())
        .map(|(_, en)| en.to_string())
        .unwrap_or_else(|| sign.to_string())
}

fn api_day(day: &str) -> String {
    let day = day.trim();
    DAYS.iter()
        .find(|(ru, _)| *ru == day.to_uppercase())
        .map(|(_, en)| en.to_string())
        .unwrap_or_else(|| day.to_string())
}

fn parse_horoscope(body: &Value) -> Result<Horoscope> {
    let field = |name: &str| {
        body.pointer(&format!("/data/{name}"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Parse(format!("horoscope response has no data.{name}")))
    };
    Ok(Horoscope {
        text: field("horoscope_data")?,
        date: field("date")?,
    })
}
