//! Delegated national-identity authentication
//!
//! One site (the auth host) talks SAML to latvija.lv and hands the verified
//! personal code to the satellite sites that share its encryption key.
//! Satellites resolve the code to a local account and sign the user in.

mod controller;
mod crypto;
mod directory;
mod handoff;
mod http;
mod saml;
mod session;
mod settings;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use controller::{AuthBroker, DelegatedAuthEndpoint, HandoffContext, Satellite};
use crypto::{Cryptor, SystemClock};
use directory::{Account, AccountStore, LocalDirectory};
use handoff::{DayTokenAuthenticator, HandoffCodec, HashedIdentifier, PERSONAL_CODE_PREFIX};
use http::AppState;
use saml::{RedirectBindingClient, SamlConfig};
use session::{spawn_cleanup_task, SessionConfig, SessionStore, DEFAULT_CLEANUP_INTERVAL_SECS};
use settings::{
    load_module_config, HandoffSettings, KeySource, Locale, SettingsHandle, TokenTimezone,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "handoff-auth")]
#[command(about = "Delegated latvija.lv sign-in for a family of sites")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080", env = "HANDOFF_LISTEN")]
    listen: SocketAddr,

    /// Host name of this site
    #[arg(long, default_value = "", env = "SITE_HOST")]
    site_host: String,

    /// Host of the auth site (empty when this site is the auth site)
    #[arg(long, default_value = "", env = "AUTH_PATH")]
    auth_path: String,

    /// latvija.lv SAML endpoint
    #[arg(long, default_value = "", env = "LATVIA_SAML_PATH")]
    idp_saml_path: String,

    /// latvija.lv entity ID
    #[arg(long, default_value = "http://www.latvija.lv/sts", env = "LATVIA_ENTITY_ID")]
    idp_entity_id: String,

    /// Shared encryption key (hex)
    #[arg(long, env = "CRYPT_KEY")]
    crypt_key: Option<String>,

    /// File holding the shared encryption key
    #[arg(long, env = "CRYPT_KEY_FILE")]
    crypt_key_file: Option<PathBuf>,

    /// Salt for identifier lookup hashes
    #[arg(long, default_value = "", env = "HASH_SALT")]
    hash_salt: String,

    /// Calendar for day tokens (utc, local)
    #[arg(long, default_value = "utc", env = "TOKEN_TIMEZONE")]
    token_timezone: TokenTimezone,

    /// Scheme used to address other sites
    #[arg(long, default_value = "https", env = "HANDOFF_SCHEME")]
    scheme: String,

    /// Path prefix of the protocol endpoints
    #[arg(long, default_value = "/onelogin_saml", env = "HANDOFF_BASE_PATH")]
    base_path: String,

    /// Language of user-facing messages (lv, en)
    #[arg(long, default_value = "lv", env = "HANDOFF_LOCALE")]
    locale: Locale,

    /// IdP certificate used when the module config has none
    #[arg(long, default_value = "certs/latvia_auth/cert.txt", env = "LATVIA_CERT_FILE")]
    cert_file: PathBuf,

    /// Module config file (JSON), re-read on SIGHUP
    #[arg(long, default_value = "/etc/handoff-auth/config.json", env = "HANDOFF_CONFIG")]
    config: PathBuf,

    /// Directory for the account and session databases
    #[arg(long, default_value = "/var/lib/handoff-auth", env = "HANDOFF_DATA_DIR")]
    data_dir: PathBuf,

    /// Local session lifetime in seconds
    #[arg(long, default_value = "28800", env = "SESSION_TTL_SECS")]
    session_ttl_secs: u64,

    /// Domain attribute of the session cookie
    #[arg(long, env = "COOKIE_DOMAIN")]
    cookie_domain: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, env = "HANDOFF_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Create a local account linked to a personal code
    Enroll {
        #[arg(long)]
        name: String,
        #[arg(long)]
        personal_code: String,
    },
    /// Print a fresh encryption key
    GenerateKey,
}

impl Args {
    fn site_settings(&self) -> Result<HandoffSettings> {
        let crypt_key = match (&self.crypt_key_file, &self.crypt_key) {
            (Some(path), _) => KeySource::File(path.clone()),
            (None, Some(key)) => KeySource::Inline(key.clone()),
            (None, None) => return Err(anyhow!("crypt_key or crypt_key_file is required")),
        };

        let site = HandoffSettings {
            site_host: self.site_host.clone(),
            auth_path: self.auth_path.clone(),
            idp_saml_path: self.idp_saml_path.clone(),
            idp_entity_id: self.idp_entity_id.clone(),
            crypt_key,
            hash_salt: self.hash_salt.clone(),
            token_timezone: self.token_timezone,
            scheme: self.scheme.clone(),
            base_path: self.base_path.clone(),
            locale: self.locale,
            cert_file: self.cert_file.clone(),
        };
        site.validate().map_err(|e| anyhow!(e))?;

        // Fail at startup rather than on the first sign-in.
        site.crypt_key.read()?;
        Ok(site)
    }

    fn cryptor(&self, site: &HandoffSettings) -> Arc<Cryptor> {
        Arc::new(Cryptor::new(
            site.crypt_key.clone(),
            site.hash_salt.clone(),
            Arc::new(SystemClock::new(site.token_timezone)),
        ))
    }

    fn account_store(&self) -> Result<Arc<AccountStore>> {
        Ok(Arc::new(AccountStore::open(
            self.data_dir.join("accounts.redb"),
        )?))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "{}={},tower_http=info",
            env!("CARGO_CRATE_NAME"),
            log_level
        ))
        .json()
        .init();

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::GenerateKey => {
            println!("{}", Cryptor::generate_key());
            Ok(())
        }
        Command::Enroll {
            name,
            personal_code,
        } => enroll(&args, &name, &personal_code),
        Command::Serve => serve(args).await,
    }
}

fn enroll(args: &Args, name: &str, personal_code: &str) -> Result<()> {
    let site = args.site_settings()?;
    let cryptor = args.cryptor(&site);

    let code = personal_code
        .strip_prefix(PERSONAL_CODE_PREFIX)
        .unwrap_or(personal_code);
    let hash = HashedIdentifier::new(cryptor.hash(code)?);

    let account = args.account_store()?.create(Account::new(name, &hash))?;
    info!(account_id = %account.id, "Account enrolled");
    println!("{}", account.id);
    Ok(())
}

async fn serve(args: Args) -> Result<()> {
    info!("Starting handoff auth service");

    let site = args.site_settings()?;
    let module = load_module_config(&args.config)?;
    let settings = SettingsHandle::new(site.clone(), module.clone());

    let cryptor = args.cryptor(&site);
    let ctx = HandoffContext {
        settings: settings.clone(),
        cryptor: cryptor.clone(),
        codec: Arc::new(HandoffCodec::new(cryptor.clone())),
        tokens: Arc::new(DayTokenAuthenticator::new(cryptor)),
    };

    let accounts = args.account_store()?;
    let sessions = Arc::new(
        SessionStore::open(args.data_dir.join("sessions.redb"), args.session_ttl_secs)
            .context("Failed to initialize session store")?,
    );
    info!(
        data_dir = ?args.data_dir,
        accounts = accounts.count()?,
        "Stores initialized"
    );

    let _cleanup_handle = spawn_cleanup_task(sessions.clone(), DEFAULT_CLEANUP_INTERVAL_SECS);

    let directory = Arc::new(LocalDirectory::new(accounts.clone(), sessions.clone()));

    let mut saml_client = None;
    let endpoint: Arc<dyn DelegatedAuthEndpoint> = if site.is_auth_host() {
        let client = Arc::new(RedirectBindingClient::new(SamlConfig::from_settings(
            &site, &module,
        )?)?);
        saml_client = Some(client.clone());
        Arc::new(AuthBroker::new(ctx, client))
    } else {
        Arc::new(Satellite::new(ctx, directory.clone(), accounts.clone()))
    };

    info!(
        site_host = %site.site_host,
        auth_host = %site.auth_host(),
        role = if site.is_auth_host() { "auth_host" } else { "satellite" },
        activate = module.activate,
        "Configuration loaded"
    );

    #[cfg(unix)]
    spawn_reload_task(args.config.clone(), settings.clone(), saml_client)?;
    #[cfg(not(unix))]
    drop(saml_client);

    let state = AppState {
        endpoint,
        settings,
        directory,
        accounts,
        sessions,
        session_config: Arc::new(SessionConfig {
            cookie_domain: args.cookie_domain.clone(),
            ttl_secs: args.session_ttl_secs,
            cookie_secure: site.scheme == "https",
            ..Default::default()
        }),
    };

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!(listen = %args.listen, "Listening");

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

/// Re-read the module config on SIGHUP.
#[cfg(unix)]
fn spawn_reload_task(
    path: PathBuf,
    settings: SettingsHandle,
    saml: Option<Arc<RedirectBindingClient>>,
) -> Result<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match reload(&path, &settings, saml.as_deref()) {
                Ok(()) => info!(path = ?path, "Module config reloaded"),
                Err(e) => warn!(error = %e, path = ?path, "Failed to reload module config, keeping previous"),
            }
        }
    }))
}

fn reload(
    path: &Path,
    settings: &SettingsHandle,
    saml: Option<&RedirectBindingClient>,
) -> Result<()> {
    let module = load_module_config(path)?;
    if let Some(client) = saml {
        client.reconfigure(SamlConfig::from_settings(settings.site(), &module)?)?;
    }
    settings.reconfigure(module)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
