// ABOUTME: Entry points other commands use to get an authorized Google client
// ABOUTME: Account precedence chain: explicit id → local file → default account

use crate::{
    accounts::AccountRegistry,
    google::{AuthorizedClient, GoogleOAuth},
    model::AccountRecord,
    oauth::AuthorizationFlow,
    Result,
};
use tracing::info;

/// Resolve an account and hand back a client carrying a fresh access token for it.
pub fn authorize(
    registry: &AccountRegistry<'_>,
    oauth: &GoogleOAuth,
    account_id: Option<&str>,
) -> Result<AuthorizedClient> {
    let record = registry.get(account_id)?;
    let grant = oauth.refresh_access_token(&record.refresh_token)?;
    info!(account = %record.profile.email, "authorized");
    Ok(oauth.authorized(grant.access_token))
}

/// Run the consent flow and store the resulting account, either in the
/// registry or, with `local`, in the project-local override file.
pub fn connect<F>(
    flow: &mut AuthorizationFlow<'_>,
    registry: &AccountRegistry<'_>,
    full_drive: bool,
    local: bool,
    open_browser: F,
) -> Result<AccountRecord>
where
    F: FnOnce(&str) -> Result<()>,
{
    let authorized = flow.run(registry, full_drive, open_browser)?;
    let profile = authorized.client.profile()?;

    let record = if local {
        registry.connect_local(profile)?
    } else {
        registry.connect(profile)?
    };
    info!(account = %record.profile.email, local, "account connected");
    Ok(record)
}
