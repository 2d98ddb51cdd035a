//! Yandex geocoder: city name to coordinates.

use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

pub struct GeocodeClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl GeocodeClient {
    pub fn new(http: reqwest::Client, url: String, api_key: Option<String>) -> Self {
        Self { http, url, api_key }
    }

    /// Resolve a city. `Ok(None)` means the geocoder returned no candidates.
    pub async fn geocode_city(&self, city: &str) -> Result<Option<Coordinates>> {
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("geocode", city),
                ("format", "json"),
                ("apikey", self.api_key.as_deref().unwrap_or("")),
            ])
            .send()
            .await?;

        let body = super::read_json(response).await?;
        let coords = first_position(&body)?;
        debug!("Geocoded {city:?} -> {coords:?}");
        Ok(coords)
    }
}

fn first_position(body: &Value) -> Result<Option<Coordinates>> {
    let members = body
        .pointer("/response/GeoObjectCollection/featureMember")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse("geocoder response has no featureMember list".into()))?;

    let Some(first) = members.first() else {
        return Ok(None);
    };

    let pos = first
        .pointer("/GeoObject/Point/pos")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse("geocoder candidate has no position".into()))?;

    parse_pos(pos).map(Some)
}

/// Parse the geocoder's "lon lat" position string.
fn parse_pos(pos: &str) -> Result<Coordinates> {
    let mut parts = pos.split_whitespace().map(str::parse::<f64>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(lon)), Some(Ok(lat)), None) => Ok(Coordinates { lat, lon }),
        _ => Err(Error::Parse(format!("bad position {pos:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pos_is_lon_then_lat() {
        let coords = parse_pos("37.62 55.75").unwrap();
        assert_eq!(coords, Coordinates { lat: 55.75, lon: 37.62 });
    }

    #[test]
    fn test_bad_pos() {
        assert!(matches!(parse_pos("37.62"), Err(Error::Parse(_))));
        assert!(matches!(parse_pos("a b"), Err(Error::Parse(_))));
        assert!(matches!(parse_pos("1 2 3"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_no_candidates_is_none() {
        let body = json!({"response": {"GeoObjectCollection": {"featureMember": []}}});
        assert_eq!(first_position(&body).unwrap(), None);
    }

    #[test]
    fn test_missing_collection_is_parse_error() {
        assert!(matches!(first_position(&json!({"error": "bad key"})), Err(Error::Parse(_))));
    }
}
