// ABOUTME: Cached token chain: refresh token -> identity token -> custom token
// ABOUTME: Derived tokens are renewed after an hour, silent login retries a bounded number of times

use crate::{model::CachedToken, storage::KvStore, Error, Result};
use chrono::{Duration, Utc};
use std::cell::RefCell;
use tracing::{debug, info, warn};

pub const CREDENTIALS_KEY: &str = "user_credentials";
pub const REFRESH_TOKEN_KEY: &str = "user_credentials.refreshToken";
pub const ID_TOKEN_KEY: &str = "user_credentials.idToken";
pub const CUSTOM_TOKEN_KEY: &str = "user_credentials.customToken";

pub const RENEWAL_WINDOW_SECS: i64 = 60 * 60;
pub const MAX_SILENT_ATTEMPTS: u32 = 3;

/// The two remote calls the chain is built on.
pub trait TokenExchange {
    fn id_token(&self, refresh_token: &str) -> Result<String>;
    fn custom_token(&self, id_token: &str) -> Result<String>;
}

impl<T: TokenExchange + ?Sized> TokenExchange for &T {
    fn id_token(&self, refresh_token: &str) -> Result<String> {
        (**self).id_token(refresh_token)
    }

    fn custom_token(&self, id_token: &str) -> Result<String> {
        (**self).custom_token(id_token)
    }
}

/// Hands out identity and custom tokens, minting new ones only when the
/// cached copy is missing or has aged past the renewal window.
///
/// A stale entry is deleted before renewal is attempted and only ever
/// replaced wholesale, so a failed call leaves the entry absent rather than
/// half-updated. Replacing or deleting a token also deletes everything
/// derived from it.
pub struct TokenChain<'a, E> {
    store: &'a KvStore,
    exchange: E,
    window: Duration,
    last_failure: RefCell<Option<String>>,
}

impl<'a, E: TokenExchange> TokenChain<'a, E> {
    pub fn new(store: &'a KvStore, exchange: E) -> Self {
        TokenChain {
            store,
            exchange,
            window: Duration::seconds(RENEWAL_WINDOW_SECS),
            last_failure: RefCell::new(None),
        }
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get_as(REFRESH_TOKEN_KEY)
    }

    pub fn set_refresh_token(&self, refresh_token: &str) -> Result<()> {
        if self.refresh_token().as_deref() != Some(refresh_token) {
            self.store.delete(ID_TOKEN_KEY)?;
            self.store.delete(CUSTOM_TOKEN_KEY)?;
        }
        self.store.set(REFRESH_TOKEN_KEY, refresh_token)?;
        info!("stored user refresh token");
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        self.store.delete(CREDENTIALS_KEY)?;
        info!("cleared user credentials");
        Ok(())
    }

    /// `Ok(None)` means no token could be obtained; exchange failures are
    /// logged and folded into absence. Store write failures are still errors.
    pub fn id_token(&self) -> Result<Option<String>> {
        let Some(refresh_token) = self.refresh_token() else {
            debug!("no refresh token stored");
            return Ok(None);
        };

        if let Some(cached) = self.fresh(ID_TOKEN_KEY) {
            debug!("identity token served from cache");
            return Ok(Some(cached.token));
        }

        self.store.delete(ID_TOKEN_KEY)?;
        self.store.delete(CUSTOM_TOKEN_KEY)?;

        match self.exchange.id_token(&refresh_token) {
            Ok(token) => {
                self.store.set(ID_TOKEN_KEY, &CachedToken::new(token.clone()))?;
                debug!("identity token renewed");
                Ok(Some(token))
            }
            Err(e) => {
                warn!(error = %e, "could not obtain identity token");
                self.note_failure(&e);
                Ok(None)
            }
        }
    }

    pub fn custom_token(&self) -> Result<Option<String>> {
        if let Some(cached) = self.fresh(CUSTOM_TOKEN_KEY) {
            debug!("custom token served from cache");
            return Ok(Some(cached.token));
        }

        self.store.delete(CUSTOM_TOKEN_KEY)?;

        let Some(id_token) = self.id_token()? else {
            return Ok(None);
        };

        match self.exchange.custom_token(&id_token) {
            Ok(token) => {
                self.store
                    .set(CUSTOM_TOKEN_KEY, &CachedToken::new(token.clone()))?;
                debug!("custom token renewed");
                Ok(Some(token))
            }
            Err(e) => {
                warn!(error = %e, "could not obtain custom token");
                self.note_failure(&e);
                Ok(None)
            }
        }
    }

    /// Get a custom token without prompting, retrying transient failures.
    pub fn login_silently(&self) -> Result<String> {
        if self.refresh_token().is_none() {
            return Err(Error::NotFound(
                "no signed-in user, run `sheetkit session login` first".into(),
            ));
        }

        self.last_failure.replace(None);
        for attempt in 1..=MAX_SILENT_ATTEMPTS {
            if let Some(token) = self.custom_token()? {
                return Ok(token);
            }
            self.store.delete(CUSTOM_TOKEN_KEY)?;
            warn!(attempt, max = MAX_SILENT_ATTEMPTS, "silent sign-in failed");
        }

        Err(Error::RetryExhausted {
            attempts: MAX_SILENT_ATTEMPTS,
            last_error: self.last_failure.take(),
        })
    }

    fn fresh(&self, key: &str) -> Option<CachedToken> {
        self.store
            .get_as::<CachedToken>(key)
            .filter(|cached| cached.is_fresh(Utc::now(), self.window))
    }

    fn note_failure(&self, error: &Error) {
        let message = match error {
            Error::ExchangeFailed(message) => message.clone(),
            other => other.to_string(),
        };
        self.last_failure.replace(Some(message));
    }
}
