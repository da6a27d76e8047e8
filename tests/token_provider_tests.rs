use mts_rs::config::AuthConfig;
use mts_rs::token_provider::MAX_TOKEN_ATTEMPTS;
use mts_rs::{MtsError, TokenProvider, TokenSource};
use mockito::{Matcher, Server};
use std::time::Duration;

fn auth_config(server: &str) -> AuthConfig {
    AuthConfig {
        server: format!("{server}/oauth/token"),
        client_id: "operator-client".to_string(),
        client_secret: "secret".to_string(),
        audience: "mts".to_string(),
        request_timeout_ms: 2_000,
        retry_delay_ms: 5,
    }
}

#[tokio::test]
async fn test_token_is_fetched_once_and_cached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
            Matcher::UrlEncoded("client_id".into(), "operator-client".into()),
            Matcher::UrlEncoded("client_secret".into(), "secret".into()),
            Matcher::UrlEncoded("audience".into(), "mts".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "abc", "expires_in": 300}"#)
        .expect(1)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    assert_eq!(provider.get_token().await.unwrap(), "abc");
    assert_eq!(provider.get_token().await.unwrap(), "abc");
    assert!(provider.expires_at().await.is_some());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_short_lived_token_is_not_cached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token": "short", "expires_in": 1}"#)
        .expect(2)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    assert_eq!(provider.get_token().await.unwrap(), "short");
    assert_eq!(provider.get_token().await.unwrap(), "short");
    assert!(provider.expires_at().await.is_none());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_explicit_auth_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(401)
        .with_body(r#"{"error": "invalid_client", "error_description": "bad secret"}"#)
        .expect(1)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    let error = provider.get_token().await.unwrap_err();
    assert_eq!(
        error,
        MtsError::AuthTokenFailure("Auth error: invalid_client: bad secret".to_string())
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_server_failures_are_retried_until_exhausted() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(503)
        .with_body("unavailable")
        .expect(MAX_TOKEN_ATTEMPTS as usize)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    let error = provider.get_token().await.unwrap_err();
    assert!(matches!(error, MtsError::AuthTokenFailure(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_missing_access_token_is_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token": "", "expires_in": 300}"#)
        .expect(MAX_TOKEN_ATTEMPTS as usize)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    match provider.get_token().await.unwrap_err() {
        MtsError::AuthTokenFailure(message) => assert!(message.contains("no access token")),
        other => panic!("unexpected error: {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_close_drops_cached_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token": "abc", "expires_in": 300}"#)
        .expect(2)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    assert_eq!(TokenSource::token(&provider).await.unwrap(), "abc");
    TokenSource::close(&provider).await;
    assert!(provider.expires_at().await.is_none());
    assert_eq!(provider.get_token().await.unwrap(), "abc");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_token_is_refetched_after_validity_window() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token": "abc", "expires_in": 2}"#)
        .expect(2)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    // usable for expires_in minus one second
    assert_eq!(provider.get_token().await.unwrap(), "abc");
    assert_eq!(provider.get_token().await.unwrap(), "abc");
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(provider.get_token().await.unwrap(), "abc");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_out_of_range_lifetime_is_not_cached() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token": "abc", "expires_in": 9223372036854775807}"#)
        .expect(2)
        .create_async()
        .await;

    let provider = TokenProvider::new(auth_config(&server.url())).unwrap();

    assert_eq!(provider.get_token().await.unwrap(), "abc");
    assert!(provider.expires_at().await.is_none());
    assert_eq!(provider.get_token().await.unwrap(), "abc");
    mock.assert_async().await;
}
