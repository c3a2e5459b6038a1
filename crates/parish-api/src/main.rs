//! parish-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) plus `PARISH_*`
//! environment variables, opens the SQLite backend and serves the JSON API.
//!
//! # Provisioning the first admin
//!
//! ```text
//! echo 'a-long-password' | cargo run -p parish-api --bin parish-server -- \
//!   --provision-admin admin@example.org
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use parish_api::{AppState, ServerConfig};
use parish_core::session::provision_admin;
use parish_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Parish website API server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Create an admin account for this email (password read from stdin)
  /// and exit.
  #[arg(long, value_name = "EMAIL")]
  provision_admin: Option<String>,
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

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PARISH").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path, &server_cfg.base_url)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_session_ttl(
      chrono::TimeDelta::try_days(server_cfg.session_days)
        .context("session_days is out of range")?,
    );

  if let Some(email) = cli.provision_admin {
    let password = read_password()?;
    let principal = provision_admin(&store, &store, &email, &password)
      .await
      .with_context(|| format!("failed to provision admin {email}"))?;
    println!("created admin {email} ({})", principal.uid);
    return Ok(());
  }

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  let app = parish_api::router(AppState::new(store, server_cfg));

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

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

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
