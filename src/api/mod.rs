//! Clients for the third-party REST APIs the bot talks to.

pub mod geocode;
pub mod gigachat;
pub mod horoscope;
pub mod weather;

use std::time::Duration;

pub use geocode::{Coordinates, GeocodeClient};
pub use gigachat::GigaChatClient;
pub use horoscope::{Horoscope, HoroscopeClient};
pub use weather::{Forecast, WeatherClient};

/// Shared HTTP client for the plain-JSON APIs.
pub fn http_client(timeout: Duration) -> crate::error::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Read a JSON body from a response, turning non-success statuses into `Request` errors.
pub(crate) async fn read_json(response: reqwest::Response) -> crate::error::Result<serde_json::Value> {
    if !response.status().is_success() {
        return Err(crate::error::Error::from_response(response).await);
    }
    response
        .json()
        .await
        .map_err(|e| crate::error::Error::Parse(e.to_string()))
}
