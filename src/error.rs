//! Error taxonomy shared by the third-party API clients.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A credential or endpoint the call needs is absent.
    #[error("not configured: {0}")]
    Configuration(String),
    /// The authorization endpoint rejected the client credentials.
    #[error("authorization failed ({status}): {body}")]
    Auth { status: u16, body: String },
    /// Non-success status, transport failure or timeout.
    #[error("{}", format_request(.status, .message))]
    Request { status: Option<u16>, message: String },
    /// The response did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),
}

fn format_request(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("request failed ({status}): {message}"),
        None => format!("request failed: {message}"),
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            "timed out".to_string()
        } else {
            e.to_string()
        };
        Error::Request {
            status: e.status().map(|s| s.as_u16()),
            message,
        }
    }
}

impl Error {
    /// Turn a non-success response into a `Request` error carrying status and body.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Error::Request {
            status: Some(status),
            message: body,
        }
    }
}
