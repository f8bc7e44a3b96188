// ABOUTME: Google OAuth2 endpoints and the bearer-authenticated client
// ABOUTME: Builds consent URLs, exchanges codes and refresh tokens, fetches profiles

use crate::{
    api::{http_client, truncate_str},
    config::Settings,
    model::AccountProfile,
    Error, Result,
};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

const SCOPE_EMAIL: &str = "https://www.googleapis.com/auth/userinfo.email";
const SCOPE_PROFILE: &str = "https://www.googleapis.com/auth/userinfo.profile";
const SCOPE_SCRIPT_PROJECTS: &str = "https://www.googleapis.com/auth/script.projects";
const SCOPE_SCRIPT_DEPLOYMENTS: &str = "https://www.googleapis.com/auth/script.deployments";
const SCOPE_DRIVE_FULL: &str = "https://www.googleapis.com/auth/drive";
const SCOPE_DRIVE_FILE: &str = "https://www.googleapis.com/auth/drive.file";

pub fn scopes(full_drive: bool) -> Vec<&'static str> {
    vec![
        SCOPE_EMAIL,
        SCOPE_PROFILE,
        SCOPE_SCRIPT_PROJECTS,
        SCOPE_SCRIPT_DEPLOYMENTS,
        if full_drive {
            SCOPE_DRIVE_FULL
        } else {
            SCOPE_DRIVE_FILE
        },
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl From<UserInfo> for AccountProfile {
    fn from(info: UserInfo) -> Self {
        AccountProfile {
            id: info.id,
            email: info.email,
            name: info.name,
            image_url: info.picture,
        }
    }
}

pub struct GoogleOAuth {
    client: Client,
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuth {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(GoogleOAuth {
            client: http_client()?,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            authorize_url: settings.authorize_url.clone(),
            token_url: settings.oauth_token_url.clone(),
            userinfo_url: settings.userinfo_url.clone(),
        })
    }

    /// `access_type=offline` plus `prompt=consent` so Google issues a refresh
    /// token even for an account that already granted access.
    pub fn authorization_url(
        &self,
        redirect_uri: &str,
        full_drive: bool,
        state: &str,
    ) -> Result<String> {
        let scope = scopes(full_drive).join(" ");
        let url = url::Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid authorize URL: {}", e)))?;
        Ok(url.into())
    }

    pub fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenGrant> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
    }

    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ])
    }

    pub fn authorized(&self, access_token: impl Into<String>) -> AuthorizedClient {
        AuthorizedClient {
            client: self.client.clone(),
            access_token: access_token.into(),
            userinfo_url: self.userinfo_url.clone(),
        }
    }

    fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), "oauth token endpoint responded");

        if !status.is_success() {
            let message = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => truncate_str(&body, 100),
            };
            return Err(Error::ExchangeFailed(message));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// A blocking HTTP client that attaches one account's bearer token to every request.
pub struct AuthorizedClient {
    client: Client,
    access_token: String,
    userinfo_url: String,
}

impl AuthorizedClient {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url).bearer_auth(&self.access_token)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url).bearer_auth(&self.access_token)
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).header("Accept", "application/json").send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(Error::Api {
                endpoint: url.into(),
                status: status.as_u16(),
                message: truncate_str(&message, 100),
            });
        }

        let body = response.text()?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn profile(&self) -> Result<AccountProfile> {
        let info: UserInfo = self.get_json(&self.userinfo_url)?;
        Ok(info.into())
    }
}
