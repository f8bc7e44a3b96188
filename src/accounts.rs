// ABOUTME: Registry of connected Google accounts and the default pointer
// ABOUTME: Resolves which account to use: explicit id, local file, then default

use crate::{
    local::LocalOverride,
    model::{AccountProfile, AccountRecord},
    storage::KvStore,
    Error, Result,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const ACCOUNTS_KEY: &str = "google_accounts";
pub const DEFAULT_ID_KEY: &str = "google_accounts_default_id";
pub const STAGED_REFRESH_TOKEN_KEY: &str = "google_refresh_token";

pub type Accounts = BTreeMap<String, AccountRecord>;

/// CRUD over the stored accounts.
///
/// Invariants kept on every write:
/// - an empty account map is never persisted, "no accounts" means no key at all;
/// - the default id, when present, names an existing account.
///
/// When the default is removed the first remaining id in key order becomes
/// the new default. Callers should not rely on which one that is.
pub struct AccountRegistry<'a> {
    store: &'a KvStore,
    local: LocalOverride,
}

impl<'a> AccountRegistry<'a> {
    pub fn new(store: &'a KvStore, local: LocalOverride) -> Self {
        AccountRegistry { store, local }
    }

    pub fn local(&self) -> &LocalOverride {
        &self.local
    }

    pub fn get_all(&self) -> Option<Accounts> {
        let accounts: Accounts = self.store.get_as(ACCOUNTS_KEY)?;
        if accounts.is_empty() {
            None
        } else {
            Some(accounts)
        }
    }

    /// With an explicit id only the registry is consulted. Without one the
    /// local override wins over the default account.
    pub fn get(&self, id: Option<&str>) -> Result<AccountRecord> {
        if let Some(id) = id {
            return self
                .get_all()
                .and_then(|mut accounts| accounts.remove(id))
                .ok_or_else(|| Error::NotFound(format!("no account with id {}", id)));
        }

        if let Some(record) = self.local.read()? {
            debug!(account = %record.profile.email, "using local credentials");
            return Ok(record);
        }

        let default_id = self
            .default_id()
            .ok_or_else(|| Error::NotFound("no default account, connect one first".into()))?;
        self.get_all()
            .and_then(|mut accounts| accounts.remove(&default_id))
            .ok_or_else(|| Error::NotFound(format!("no account with id {}", default_id)))
    }

    pub fn set(&self, record: AccountRecord) -> Result<()> {
        self.discard_refresh_token()?;
        let id = record.id().to_string();
        let mut accounts = self.get_all().unwrap_or_default();
        accounts.insert(id.clone(), record);
        self.save_all(&accounts)?;

        if self.default_id().is_none() {
            self.store.set(DEFAULT_ID_KEY, &id)?;
            info!(account = %id, "set as default account");
        }
        info!(account = %id, "account saved");
        Ok(())
    }

    pub fn remove_all(&self) -> Result<Accounts> {
        self.discard_refresh_token()?;
        let accounts = self
            .get_all()
            .ok_or_else(|| Error::NotFound("no accounts connected".into()))?;

        self.store.delete(ACCOUNTS_KEY)?;
        self.store.delete(DEFAULT_ID_KEY)?;
        info!(count = accounts.len(), "removed all accounts");
        Ok(accounts)
    }

    pub fn remove(&self, id: &str) -> Result<Accounts> {
        self.discard_refresh_token()?;
        if self.default_id().as_deref() == Some(id) {
            return self.remove_default();
        }

        let mut accounts = self
            .get_all()
            .ok_or_else(|| Error::NotFound("no accounts connected".into()))?;
        let record = accounts
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("no account with id {}", id)))?;
        self.save_all(&accounts)?;

        if accounts.is_empty() {
            self.store.delete(DEFAULT_ID_KEY)?;
        }
        info!(account = %id, "account removed");
        Ok(Accounts::from([(id.to_string(), record)]))
    }

    pub fn remove_default(&self) -> Result<Accounts> {
        self.discard_refresh_token()?;
        let default_id = self
            .default_id()
            .ok_or_else(|| Error::NotFound("no default account".into()))?;
        let mut accounts = self.get_all().unwrap_or_default();
        let record = accounts
            .remove(&default_id)
            .ok_or_else(|| Error::NotFound(format!("no account with id {}", default_id)))?;
        self.save_all(&accounts)?;

        match accounts.keys().next() {
            Some(next) => {
                self.store.set(DEFAULT_ID_KEY, next)?;
                info!(removed = %default_id, default = %next, "default account re-elected");
            }
            None => {
                self.store.delete(DEFAULT_ID_KEY)?;
                info!(removed = %default_id, "last account removed, default cleared");
            }
        }
        Ok(Accounts::from([(default_id, record)]))
    }

    /// An unreadable local file is removed too, yielding an empty set.
    pub fn remove_local(&self) -> Result<Accounts> {
        self.discard_refresh_token()?;
        Ok(self
            .local
            .remove()?
            .map(|record| Accounts::from([(record.id().to_string(), record)]))
            .unwrap_or_default())
    }

    /// Only reports ids that still name a stored account.
    pub fn default_id(&self) -> Option<String> {
        let id: String = self.store.get_as(DEFAULT_ID_KEY)?;
        match self.get_all() {
            Some(accounts) if accounts.contains_key(&id) => Some(id),
            _ => None,
        }
    }

    pub fn set_default_id(&self, id: &str) -> Result<()> {
        self.discard_refresh_token()?;
        let known = self
            .get_all()
            .map(|accounts| accounts.contains_key(id))
            .unwrap_or(false);
        if !known {
            return Err(Error::InvalidId(id.to_string()));
        }
        self.store.set(DEFAULT_ID_KEY, id)?;
        info!(account = %id, "default account changed");
        Ok(())
    }

    pub fn stage_refresh_token(&self, refresh_token: &str) -> Result<()> {
        self.store.set(STAGED_REFRESH_TOKEN_KEY, refresh_token)
    }

    /// Read-once: the staged token is deleted as it is returned.
    pub fn take_refresh_token(&self) -> Result<Option<String>> {
        let token: Option<String> = self.store.get_as(STAGED_REFRESH_TOKEN_KEY);
        if token.is_some() {
            self.store.delete(STAGED_REFRESH_TOKEN_KEY)?;
        }
        Ok(token)
    }

    pub fn discard_refresh_token(&self) -> Result<()> {
        self.store.delete(STAGED_REFRESH_TOKEN_KEY)
    }

    /// Turn a completed authorization into a stored account.
    pub fn connect(&self, profile: AccountProfile) -> Result<AccountRecord> {
        let record = self.staged_record(profile)?;
        self.set(record.clone())?;
        Ok(record)
    }

    /// Same as [`AccountRegistry::connect`] but writes the project-local file instead.
    pub fn connect_local(&self, profile: AccountProfile) -> Result<AccountRecord> {
        let record = self.staged_record(profile)?;
        self.local.write(&record)?;
        Ok(record)
    }

    fn staged_record(&self, profile: AccountProfile) -> Result<AccountRecord> {
        let refresh_token = self.take_refresh_token()?.ok_or_else(|| {
            Error::AuthorizationFailed(
                "no refresh token was issued; revoke the app's access and try again".into(),
            )
        })?;
        Ok(AccountRecord::new(refresh_token, profile))
    }

    fn save_all(&self, accounts: &Accounts) -> Result<()> {
        if accounts.is_empty() {
            self.store.delete(ACCOUNTS_KEY)
        } else {
            self.store.set(ACCOUNTS_KEY, accounts)
        }
    }
}
