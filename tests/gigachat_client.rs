//! GigaChat client tests against a mock server: token caching and the
//! single reauthorize-and-retry on unauthorized responses.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use astrobot::api::GigaChatClient;
use astrobot::api::gigachat::completion_text;
use astrobot::config::GigaChatSettings;
use astrobot::error::Error;
use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(server: &MockServer) -> GigaChatSettings {
    let uri = server.uri();
    GigaChatSettings {
        client_id: "id".into(),
        client_secret: "secret".into(),
        auth_url: format!("{uri}/oauth"),
        api_url: format!("{uri}/chat/completions"),
        models_url: format!("{uri}/models"),
        scope: "GIGACHAT_API_PERS".into(),
        model: "GigaChat-2-Max".into(),
        system_prompt: None,
        verify_ssl: true,
    }
}

fn client(server: &MockServer) -> GigaChatClient {
    GigaChatClient::new(settings(server), Duration::from_secs(5)).unwrap()
}

async fn mount_auth(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "expires_in": 1800})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn test_authorization_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth"))
        .and(header("authorization", "Basic aWQ6c2VjcmV0"))
        .and(header_exists("RqUID"))
        .and(body_string_contains("scope=GIGACHAT_API_PERS"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "expires_at": 4102444800000_i64})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.access_token().await.unwrap(), "tok");
    // Cached: no second authorization call.
    assert_eq!(client.access_token().await.unwrap(), "tok");
}

#[tokio::test]
async fn test_token_reused_until_skew_margin() {
    let server = MockServer::start().await;
    mount_auth(&server, 2).await;

    let now = Arc::new(AtomicI64::new(1_000_000));
    let clock_now = now.clone();
    let client = client(&server).with_clock(Arc::new(move || {
        Utc.timestamp_opt(clock_now.load(Ordering::SeqCst), 0).unwrap()
    }));

    client.access_token().await.unwrap();
    let expiry = 1_000_000 + 1800;

    now.store(expiry - 31, Ordering::SeqCst);
    client.access_token().await.unwrap();

    now.store(expiry - 29, Ordering::SeqCst);
    client.access_token().await.unwrap();
}

#[tokio::test]
async fn test_unauthorized_then_success_retries_once() {
    let server = MockServer::start().await;
    // Initial authorization plus exactly one reauthorization.
    mount_auth(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("second time lucky"))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).send_chat("hi", None, None).await.unwrap();
    assert_eq!(completion_text(&response), Some("second time lucky"));
}

#[tokio::test]
async fn test_two_unauthorized_responses_surface_request_error() {
    let server = MockServer::start().await;
    mount_auth(&server, 2).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token invalid"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server).send_chat("hi", None, None).await.unwrap_err();
    match err {
        Error::Request { status, message } => {
            assert_eq!(status, Some(401));
            assert_eq!(message, "token invalid");
        }
        other => panic!("expected Request error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_other_failure_is_not_retried() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).send_chat("hi", None, None).await.unwrap_err();
    assert!(matches!(err, Error::Request { status: Some(500), .. }));
}

#[tokio::test]
async fn test_rejected_authorization_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let err = client(&server).send_chat("hi", None, None).await.unwrap_err();
    match err {
        Error::Auth { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad credentials");
        }
        other => panic!("expected Auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_credentials_is_configuration_error() {
    let server = MockServer::start().await;
    let mut settings = settings(&server);
    settings.client_secret.clear();
    let client = GigaChatClient::new(settings, Duration::from_secs(5)).unwrap();

    let err = client.access_token().await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[tokio::test]
async fn test_system_prompt_precedes_user_turn() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "GigaChat-Pro",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(completion("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server)
        .send_chat("hi", Some("GigaChat-Pro"), Some("Be brief."))
        .await
        .unwrap();
    assert_eq!(completion_text(&response), Some("ok"));
}

#[tokio::test]
async fn test_list_models_retries_after_unauthorized() {
    let server = MockServer::start().await;
    mount_auth(&server, 2).await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"id": "GigaChat"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).list_models().await.unwrap();
    assert_eq!(response["data"][0]["id"], "GigaChat");
}

#[tokio::test]
async fn test_concurrent_rejections_share_one_reauthorization() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "stale", "expires_in": 1800})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "fresh", "expires_in": 1800})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(completion("ok"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let (first, second) = tokio::join!(
        client.send_chat("one", None, None),
        client.send_chat("two", None, None),
    );
    assert_eq!(completion_text(&first.unwrap()), Some("ok"));
    assert_eq!(completion_text(&second.unwrap()), Some("ok"));
}

#[tokio::test]
async fn test_slow_backend_times_out_as_request_error() {
    let server = MockServer::start().await;
    mount_auth(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(completion("too late").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let client = GigaChatClient::new(settings(&server), Duration::from_secs(1)).unwrap();
    let err = client.send_chat("hi", None, None).await.unwrap_err();
    match err {
        Error::Request { status, message } => {
            assert_eq!(status, None);
            assert_eq!(message, "timed out");
        }
        other => panic!("expected Request error, got {other:?}"),
    }
}
