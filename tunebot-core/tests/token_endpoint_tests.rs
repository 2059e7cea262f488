// tests/token_endpoint_tests.rs

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tunebot_core::auth::TokenAuthority;
use tunebot_core::platforms::twitch_irc::TwitchTokenEndpoint;
use tunebot_core::Error;

fn endpoint(server: &MockServer) -> TwitchTokenEndpoint {
    TwitchTokenEndpoint::new("cid", "secret")
        .expect("http client")
        .with_token_url(format!("{}/oauth2/token", server.uri()))
}

#[tokio::test]
async fn posts_refresh_grant_as_json() -> Result<(), Error> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_json(json!({
            "client_id": "cid",
            "client_secret": "secret",
            "grant_type": "refresh_token",
            "refresh_token": "r-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a-2",
            "refresh_token": "r-2",
            "expires_in": 14400,
            "scope": ["chat:read", "chat:edit"],
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let grant = endpoint(&server).exchange_refresh_token("r-1").await?;
    assert_eq!(grant.access_token, "a-2");
    assert_eq!(grant.refresh_token.as_deref(), Some("r-2"));
    assert_eq!(grant.expires_in, 14400);
    assert_eq!(grant.extra.get("token_type"), Some(&json!("bearer")));
    Ok(())
}

#[tokio::test]
async fn non_200_surfaces_body_verbatim() {
    let server = MockServer::start().await;
    let body = r#"{"status":400,"message":"Invalid refresh token"}"#;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string(body))
        .mount(&server)
        .await;

    let err = endpoint(&server).exchange_refresh_token("dead").await.unwrap_err();
    match &err {
        Error::RefreshFailed(detail) => assert_eq!(detail, body),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.to_string(), format!("Token refresh failed: {body}"));
}

#[tokio::test]
async fn grant_without_refresh_token_parses() -> Result<(), Error> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "expires_in": 60
        })))
        .mount(&server)
        .await;

    let grant = endpoint(&server).exchange_refresh_token("r").await?;
    assert_eq!(grant.refresh_token, None);
    Ok(())
}

#[tokio::test]
async fn unreachable_authority_is_refresh_failed() {
    let endpoint = TwitchTokenEndpoint::new("cid", "secret")
        .expect("http client")
        .with_token_url("http://127.0.0.1:9/oauth2/token");
    let err = endpoint.exchange_refresh_token("r").await.unwrap_err();
    assert!(matches!(err, Error::RefreshFailed(_)));
}
