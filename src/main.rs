// ABOUTME: CLI entrypoint for sheetkit command
// ABOUTME: Handles error exit codes and command dispatch

use clap::Parser;
use sheetkit::{
    accounts::AccountRegistry,
    api::ApiClient,
    auth,
    cli::{AccountCommands, Cli, Commands, DisconnectTarget, SessionCommands},
    google::GoogleOAuth,
    local::LocalOverride,
    logging,
    oauth::AuthorizationFlow,
    storage::{KvStore, Paths},
    token::TokenChain,
    Error, Result,
};

fn main() {
    if let Err(e) = run() {
        eprintln!("sheetkit: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let settings = cli.settings.to_settings();
    settings.validate()?;

    let paths = Paths::new(cli.config_dir)?;
    let store = KvStore::open(&paths)?;
    let registry = AccountRegistry::new(&store, LocalOverride::current_dir()?);

    match cli.command {
        Commands::Accounts { command } => match command {
            AccountCommands::List => {
                let default_id = registry.default_id();
                match registry.get_all() {
                    Some(accounts) => {
                        for (id, record) in &accounts {
                            let marker = if default_id.as_deref() == Some(id.as_str()) { "*" } else { " " };
                            println!("{} {}  {}", marker, id, record.profile.email);
                        }
                    }
                    None => println!("No accounts connected."),
                }
                if let Some(local) = registry.local().read()? {
                    println!("local override: {} ({})", local.profile.email, local.id());
                }
            }
            AccountCommands::Default { id: Some(id) } => {
                registry.set_default_id(&id)?;
                println!("Default account is now {}", id);
            }
            AccountCommands::Default { id: None } => match registry.default_id() {
                Some(id) => println!("{}", id),
                None => return Err(Error::NotFound("no default account".into())),
            },
            AccountCommands::Connect {
                full_drive,
                local,
                no_browser,
            } => {
                let oauth = GoogleOAuth::new(&settings)?;
                let mut flow =
                    AuthorizationFlow::new(&oauth, settings.callback_port, settings.callback_timeout);
                let record = auth::connect(&mut flow, &registry, full_drive, local, |url| {
                    println!("Authorize sheetkit in your browser:\n{}", url);
                    if no_browser {
                        Ok(())
                    } else {
                        open::that(url).map_err(Error::from)
                    }
                })?;
                println!("Connected {} ({})", record.profile.email, record.id());
            }
            AccountCommands::Disconnect(target) => {
                let removed = disconnect(&registry, target)?;
                if removed.is_empty() {
                    println!("Removed unreadable local credentials.");
                }
                for record in removed.values() {
                    println!("Disconnected {} ({})", record.profile.email, record.id());
                }
            }
        },
        Commands::Session { command } => {
            let api = ApiClient::new(&settings)?;
            let chain = TokenChain::new(&store, api);
            match command {
                SessionCommands::Login { refresh_token } => {
                    chain.set_refresh_token(&refresh_token)?;
                    chain.login_silently()?;
                    println!("Signed in.");
                }
                SessionCommands::Token => println!("{}", chain.login_silently()?),
                SessionCommands::Logout => {
                    chain.sign_out()?;
                    println!("Signed out.");
                }
            }
        }
        Commands::Whoami { account } => {
            let record = registry.get(account.as_deref())?;
            println!("{} ({})", record.profile.email, record.id());
        }
    }

    Ok(())
}

fn disconnect(
    registry: &AccountRegistry<'_>,
    target: DisconnectTarget,
) -> Result<sheetkit::accounts::Accounts> {
    if target.all {
        registry.remove_all()
    } else if target.default {
        registry.remove_default()
    } else if target.local {
        registry.remove_local()
    } else {
        let id = target
            .id
            .ok_or_else(|| Error::NotFound("no account given".into()))?;
        registry.remove(&id)
    }
}
