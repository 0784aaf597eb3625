//! warden server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `WARDEN_*` environment variables, opens the SQLite store, ensures the
//! bootstrap super admin exists and serves the JSON API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for `bootstrap_password_hash`:
//!
//! ```
//! cargo run -p warden-server -- --hash-password
//! ```

mod config;
mod mailer;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use warden_api::{AppState, Argon2Hasher};
use warden_core::{
  AdminService,
  identity::{NewUser, UserStatus},
  mail::PasswordHasher as _,
  store::AdminStore,
};
use warden_store_sqlite::SqliteStore;

use crate::{config::ServerConfig, mailer::LogMailer};

#[derive(Parser)]
#[command(author, version, about = "Warden admin back-office server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let hash = Argon2Hasher
      .hash(&password)
      .map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = server_cfg.store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  bootstrap(&store, &server_cfg).await?;

  let service = AdminService::new(
    store.clone(),
    store,
    Arc::new(LogMailer),
    Arc::new(Argon2Hasher),
    server_cfg.service_config(),
  );
  let app = warden_api::api_router(AppState::new(service));

  let address = server_cfg.address();
  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Create the configured super admin unless the email is already taken.
async fn bootstrap(store: &SqliteStore, cfg: &ServerConfig) -> anyhow::Result<()> {
  let (Some(email), Some(password_hash)) = (&cfg.bootstrap_email, &cfg.bootstrap_password_hash)
  else {
    warn!("no bootstrap credentials configured; skipping super admin bootstrap");
    return Ok(());
  };

  let (user, created) = store
    .ensure_super_admin(NewUser {
      name:          cfg.bootstrap_name.clone().unwrap_or_else(|| "Super Admin".to_owned()),
      email:         email.to_lowercase(),
      password_hash: password_hash.clone(),
      status:        UserStatus::Approved,
      role_id:       None,
      verified:      true,
    })
    .await
    .context("failed to bootstrap super admin")?;

  if created {
    info!(user = user.id, email = %user.email, "bootstrap super admin created");
  }
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}
