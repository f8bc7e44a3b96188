// ABOUTME: Blocking HTTP client for the token issuing endpoints
// ABOUTME: Refresh token -> identity token, identity token -> custom token

use crate::{config::Settings, token::TokenExchange, Error, Result};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("sheetkit/", env!("CARGO_PKG_VERSION"), " (Rust)");

/// Shorten an error body to at most `max_bytes`, cutting on a char boundary.
pub(crate) fn truncate_str(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0);
    match cut {
        0 => String::new(),
        _ => format!("{}...", &s[..cut]),
    }
}

pub(crate) fn http_client() -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(USER_AGENT)
        .build()?)
}

/// Talks to the identity provider's secure token endpoint and to the
/// application's custom token mint.
pub struct ApiClient {
    client: Client,
    secure_token_url: String,
    api_key: String,
    app_api_base: String,
}

#[derive(Deserialize)]
struct SecureTokenResponse {
    id_token: String,
}

#[derive(Deserialize)]
struct SecureTokenError {
    error: SecureTokenErrorBody,
}

#[derive(Deserialize)]
struct SecureTokenErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct MintResponse {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

impl MintResponse {
    fn failed(&self) -> bool {
        match &self.error {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(ApiClient {
            client: http_client()?,
            secure_token_url: settings.secure_token_url.clone(),
            api_key: settings.api_key.clone(),
            app_api_base: settings.app_api_base.trim_end_matches('/').to_string(),
        })
    }

    fn read_body(endpoint: &str, response: Response) -> Result<(u16, String)> {
        let status = response.status().as_u16();
        let body = response.text()?;
        debug!(endpoint, status, "token endpoint responded");
        Ok((status, body))
    }
}

impl TokenExchange for ApiClient {
    fn id_token(&self, refresh_token: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.secure_token_url)
            .query(&[("key", self.api_key.as_str())])
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()?;

        let (status, body) = Self::read_body("secure token", response)?;
        if !(200..300).contains(&status) {
            let message = serde_json::from_str::<SecureTokenError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| truncate_str(&body, 100));
            return Err(Error::ExchangeFailed(message));
        }

        let parsed: SecureTokenResponse = serde_json::from_str(&body)?;
        Ok(parsed.id_token)
    }

    fn custom_token(&self, id_token: &str) -> Result<String> {
        let endpoint = "/auth/custom-token";
        let url = format!("{}{}", self.app_api_base, endpoint);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", id_token))
            .header("Accept", "application/json")
            .json(&serde_json::json!({}))
            .send()?;

        let (status, body) = Self::read_body(endpoint, response)?;
        let parsed = serde_json::from_str::<MintResponse>(&body);

        match parsed {
            Ok(mint) if mint.failed() => Err(Error::ExchangeFailed(
                mint.message
                    .unwrap_or_else(|| "custom token request was rejected".into()),
            )),
            Ok(mint) if (200..300).contains(&status) => mint
                .token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| Error::ExchangeFailed("response carried no token".into())),
            _ if !(200..300).contains(&status) => Err(Error::Api {
                endpoint: endpoint.into(),
                status,
                message: truncate_str(&body, 100),
            }),
            Ok(_) => Err(Error::ExchangeFailed("response carried no token".into())),
            Err(e) => Err(Error::Parse(e)),
        }
    }
}
