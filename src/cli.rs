// ABOUTME: Command-line interface definitions using clap
// ABOUTME: Defines subcommands, global flags, and env-backed settings

use crate::config::{self, Settings};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sheetkit")]
#[command(about = "Google account sign-in and credentials for sheetkit projects", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override config directory
    #[arg(long, global = true, env = "SHEETKIT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Verbose logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// OAuth client id
    #[arg(long, global = true, env = "SHEETKIT_CLIENT_ID", default_value = config::DEFAULT_CLIENT_ID, hide_default_value = true)]
    pub client_id: String,

    /// OAuth client secret
    #[arg(long, global = true, env = "SHEETKIT_CLIENT_SECRET", default_value = config::DEFAULT_CLIENT_SECRET, hide_default_value = true, hide_env_values = true)]
    pub client_secret: String,

    /// Identity provider API key
    #[arg(long, global = true, env = "SHEETKIT_API_KEY", default_value = config::DEFAULT_API_KEY, hide_default_value = true, hide_env_values = true)]
    pub api_key: String,

    /// Application API base URL
    #[arg(long, global = true, env = "SHEETKIT_API_BASE", default_value = config::DEFAULT_APP_API_BASE)]
    pub api_base: String,

    /// Port for the local OAuth callback (0 picks a free one)
    #[arg(long, global = true, env = "SHEETKIT_CALLBACK_PORT", default_value_t = config::DEFAULT_CALLBACK_PORT)]
    pub callback_port: u16,

    /// Seconds to wait for the browser callback
    #[arg(long, global = true, env = "SHEETKIT_CALLBACK_TIMEOUT", default_value_t = config::DEFAULT_CALLBACK_TIMEOUT_SECS)]
    pub callback_timeout: u64,
}

impl SettingsArgs {
    pub fn to_settings(&self) -> Settings {
        Settings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            api_key: self.api_key.clone(),
            app_api_base: self.api_base.clone(),
            ..Settings::default()
        }
        .with_callback(
            self.callback_port,
            Duration::from_secs(self.callback_timeout),
        )
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage connected Google accounts
    Accounts {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Manage the application sign-in session
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Show which account a command would use here
    Whoami {
        /// Account id (defaults to local override, then default account)
        #[arg(long)]
        account: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccountCommands {
    /// List connected accounts
    List,

    /// Show or change the default account
    Default {
        /// Account id to make default
        id: Option<String>,
    },

    /// Connect a Google account through the browser
    Connect {
        /// Request full Drive access instead of per-file access
        #[arg(long)]
        full_drive: bool,

        /// Save credentials to this project only
        #[arg(long)]
        local: bool,

        /// Print the consent URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Disconnect one or more accounts
    Disconnect(DisconnectTarget),
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct DisconnectTarget {
    /// Account id to disconnect
    pub id: Option<String>,

    /// Disconnect every account
    #[arg(long)]
    pub all: bool,

    /// Disconnect the default account
    #[arg(long)]
    pub default: bool,

    /// Remove this project's local credentials
    #[arg(long)]
    pub local: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// Store a refresh token for the application session
    Login {
        #[arg(long, env = "SHEETKIT_REFRESH_TOKEN", hide_env_values = true)]
        refresh_token: String,
    },

    /// Print a current custom token, renewing it if needed
    Token,

    /// Forget the application session
    Logout,
}
