// ABOUTME: Endpoint and client settings for OAuth and token exchange
// ABOUTME: Compiled-in defaults, overridable from CLI flags or environment

use crate::{Error, Result};
use std::time::Duration;

pub const DEFAULT_CLIENT_ID: &str =
    "489136512734-sheetkit0cli0installed0app.apps.googleusercontent.com";
pub const DEFAULT_CLIENT_SECRET: &str = "sheetkit-installed-app-secret";
pub const DEFAULT_API_KEY: &str = "AIzaSyD-sheetkit-public-web-key";

pub const DEFAULT_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";
pub const DEFAULT_APP_API_BASE: &str = "https://api.sheetkit.dev";

pub const DEFAULT_CALLBACK_PORT: u16 = 3000;
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub api_key: String,
    pub authorize_url: String,
    pub oauth_token_url: String,
    pub userinfo_url: String,
    pub secure_token_url: String,
    pub app_api_base: String,
    /// 0 lets the OS pick a free port; the redirect URI follows whatever was bound.
    pub callback_port: u16,
    pub callback_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            client_id: DEFAULT_CLIENT_ID.into(),
            client_secret: DEFAULT_CLIENT_SECRET.into(),
            api_key: DEFAULT_API_KEY.into(),
            authorize_url: DEFAULT_AUTHORIZE_URL.into(),
            oauth_token_url: DEFAULT_OAUTH_TOKEN_URL.into(),
            userinfo_url: DEFAULT_USERINFO_URL.into(),
            secure_token_url: DEFAULT_SECURE_TOKEN_URL.into(),
            app_api_base: DEFAULT_APP_API_BASE.into(),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_timeout: Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Point every Google and application endpoint at one base URL.
    /// Used against local mock servers.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorize_url = format!("{}/o/oauth2/v2/auth", base);
        self.oauth_token_url = format!("{}/token", base);
        self.userinfo_url = format!("{}/oauth2/v2/userinfo", base);
        self.secure_token_url = format!("{}/v1/token", base);
        self.app_api_base = base.to_string();
        self
    }

    pub fn with_callback(mut self, port: u16, timeout: Duration) -> Self {
        self.callback_port = port;
        self.callback_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("client id", &self.client_id),
            ("client secret", &self.client_secret),
            ("api key", &self.api_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }

        for endpoint in [
            &self.authorize_url,
            &self.oauth_token_url,
            &self.userinfo_url,
            &self.secure_token_url,
            &self.app_api_base,
        ] {
            url::Url::parse(endpoint)
                .map_err(|e| Error::Config(format!("invalid URL '{}': {}", endpoint, e)))?;
        }

        if self.callback_timeout.is_zero() {
            return Err(Error::Config("callback timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.callback_port, 3000);
        assert_eq!(settings.callback_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_with_base_url() {
        let settings = Settings::default().with_base_url("http://127.0.0.1:9999/");
        assert_eq!(settings.oauth_token_url, "http://127.0.0.1:9999/token");
        assert_eq!(settings.secure_token_url, "http://127.0.0.1:9999/v1/token");
        assert_eq!(settings.app_api_base, "http://127.0.0.1:9999");
    }

    #[test]
    fn test_validate_rejects_empty_client_id() {
        let settings = Settings {
            client_id: "  ".into(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let settings = Settings {
            app_api_base: "not a url".into(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }
}
