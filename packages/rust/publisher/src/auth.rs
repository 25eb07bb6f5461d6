//! Bearer-token acquisition for the Spotify Web API.
//!
//! The interactive authorization step happens elsewhere. Here a token is
//! either used as given or minted from a refresh token at the accounts
//! service.

use chatlist_shared::{ChatlistError, Result, SpotifyCredentials};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Turn configured credentials into a bearer token.
#[instrument(skip_all, fields(accounts_base = %accounts_base))]
pub async fn access_token(
    client: &Client,
    accounts_base: &Url,
    credentials: &SpotifyCredentials,
) -> Result<String> {
    let (refresh_token, client_id, client_secret) = match credentials {
        SpotifyCredentials::AccessToken(token) => return Ok(token.clone()),
        SpotifyCredentials::RefreshToken {
            refresh_token,
            client_id,
            client_secret,
        } => (refresh_token, client_id, client_secret),
    };

    let mut token_url = accounts_base.clone();
    token_url
        .path_segments_mut()
        .map_err(|_| ChatlistError::config(format!("invalid accounts base URL: {accounts_base}")))?
        .pop_if_empty()
        .extend(["api", "token"]);

    let response = client
        .post(token_url.clone())
        .basic_auth(client_id, Some(client_secret))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ])
        .send()
        .await
        .map_err(|e| ChatlistError::Network(format!("{token_url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatlistError::api(
            status.as_u16(),
            format!("token refresh rejected: {body}"),
        ));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ChatlistError::parse(format!("token response: {e}")))?;

    info!(expires_in = token.expires_in, "obtained access token from refresh token");
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn access_token_is_used_as_is() {
        let client = Client::new();
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let token = access_token(
            &client,
            &base,
            &SpotifyCredentials::AccessToken("ready".into()),
        )
        .await
        .unwrap();
        assert_eq!(token, "ready");
    }

    #[tokio::test]
    async fn refresh_token_is_exchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r3fr3sh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "playlist-modify-public playlist-modify-private",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = SpotifyCredentials::RefreshToken {
            refresh_token: "r3fr3sh".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let base = Url::parse(&server.uri()).unwrap();
        let token = access_token(&Client::new(), &base, &credentials)
            .await
            .expect("exchange");
        assert_eq!(token, "fresh-token");
    }

    #[tokio::test]
    async fn rejected_refresh_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let credentials = SpotifyCredentials::RefreshToken {
            refresh_token: "stale".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        let base = Url::parse(&server.uri()).unwrap();
        let err = access_token(&Client::new(), &base, &credentials)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
    }
}
