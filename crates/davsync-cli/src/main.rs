//! davsync: WebDAV sync with client-side encryption
//!
//! Commands:
//!   check                          - validate the address and reach the server
//!   ls [--json]                    - list everything under the remote base dir
//!   push <vault> <path>            - upload a vault file or folder tree
//!   pull <vault> <path>            - download a key (or everything with "")
//!   rm <path>                      - delete a remote entry
//!   config show                    - print the active configuration
//!   size to-cipher|to-plain <n>    - encrypted size arithmetic
//!   name encode|decode <text>      - obscure or reveal a name

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use tracing::{info, warn};

use davsync_core::config::DavsyncConfig;
use davsync_core::RemoteItem;
use davsync_storage::{check_health, TomlSettingsStore, WebdavTransport};
use davsync_sync::engine::{self, EncryptionContext, ProgressFn};
use davsync_sync::{FsVault, LocalVault};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "davsync",
    version,
    about = "WebDAV sync with client-side encryption",
    long_about = "davsync: push, pull, list, and delete vault files on a WebDAV server, \
                  optionally encrypting contents and names"
)]
struct Cli {
    /// Path to davsync.toml configuration file
    #[arg(long, short = 'c', env = "DAVSYNC_CONFIG", default_value = "davsync.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to [logging] level
    #[arg(long, env = "DAVSYNC_LOG")]
    log: Option<String>,

    /// Log format; defaults to [logging] format
    #[arg(long, env = "DAVSYNC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Encryption password (overrides [crypto] password)
    #[arg(long, env = "DAVSYNC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Prompt for the encryption password
    #[arg(long)]
    ask_password: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the WebDAV server is reachable
    Check,

    /// List every remote entry under the base directory
    Ls {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Upload a vault file, or a folder and everything below it
    Push {
        /// Local vault root directory
        vault: PathBuf,
        /// Vault-relative path ("" for the whole vault)
        path: String,
        /// Existing remote key to overwrite (single files only)
        #[arg(long)]
        remote_key: Option<String>,
    },

    /// Download a remote entry into the vault ("" for everything)
    Pull {
        /// Local vault root directory
        vault: PathBuf,
        /// Vault-relative path
        path: String,
        /// Remote key to fetch, skipping the name lookup
        #[arg(long)]
        remote_key: Option<String>,
    },

    /// Delete a remote entry
    Rm {
        /// Vault-relative path
        path: String,
        /// Remote key to delete, skipping the name lookup
        #[arg(long)]
        remote_key: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Encrypted size arithmetic
    Size {
        #[command(subcommand)]
        action: SizeAction,
    },

    /// Obscure or reveal remote names with the configured password
    Name {
        #[command(subcommand)]
        action: NameAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Subcommand, Debug)]
enum SizeAction {
    /// Encrypted size for a plaintext size
    ToCipher { n: i64 },
    /// Plaintext size bracket for an encrypted size
    ToPlain { n: i64 },
}

#[derive(Subcommand, Debug)]
enum NameAction {
    /// Encrypt a name to printable text
    Encode { text: String },
    /// Decrypt printable text back to the name
    Decode { text: String },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_exists = cli.config.exists();
    let mut config = if config_exists {
        DavsyncConfig::load(&cli.config)
            .with_context(|| format!("loading config {}", cli.config.display()))?
    } else {
        DavsyncConfig::default()
    };

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "davsync starting"
    );
    if !config_exists {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Some(password) = &cli.password {
        config.crypto.password = password.clone();
    }
    if cli.ask_password {
        config.crypto.password =
            rpassword::prompt_password("Encryption password: ").context("reading password")?;
    }

    match cli.command {
        Commands::Check => cmd_check(&config).await,
        Commands::Ls { json } => cmd_ls(&config, config_settings(&cli.config, config_exists), json).await,
        Commands::Push {
            vault,
            path,
            remote_key,
        } => {
            cmd_push(
                &config,
                config_settings(&cli.config, config_exists),
                &vault,
                &path,
                remote_key.as_deref(),
            )
            .await
        }
        Commands::Pull {
            vault,
            path,
            remote_key,
        } => {
            cmd_pull(
                &config,
                config_settings(&cli.config, config_exists),
                &vault,
                &path,
                remote_key.as_deref(),
            )
            .await
        }
        Commands::Rm { path, remote_key } => {
            cmd_rm(
                &config,
                config_settings(&cli.config, config_exists),
                &path,
                remote_key.as_deref(),
            )
            .await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
        Commands::Size { action } => cmd_size(action),
        Commands::Name { action } => cmd_name(&config, action),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Negotiated depth settings are written back only to an existing config file.
fn config_settings(path: &Path, exists: bool) -> Option<PathBuf> {
    exists.then(|| path.to_path_buf())
}

async fn connect(config: &DavsyncConfig, settings: Option<PathBuf>) -> Result<WebdavTransport> {
    let mut transport = WebdavTransport::connect(config).context("configuring WebDAV transport")?;
    if let Some(path) = settings {
        transport = transport.with_settings_store(Arc::new(TomlSettingsStore::new(path)));
    }
    let capability = transport
        .init()
        .await
        .context("initializing WebDAV transport")?;
    info!(?capability, base = transport.base_dir(), "connected");
    Ok(transport)
}

fn make_progress_bar(total: u64, prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// Remote entries keyed by vault key. With encryption on, names that do not
/// decrypt under the current password are skipped.
async fn remote_index(
    transport: &WebdavTransport,
    ctx: Option<&EncryptionContext>,
) -> Result<HashMap<String, RemoteItem>> {
    let items = transport.list().await.context("listing remote")?;
    let mut index = HashMap::with_capacity(items.len());
    for item in items {
        let key = match ctx {
            Some(ctx) => match ctx.reveal_key(&item.key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(remote_key = %item.key, error = %e, "skipping undecryptable name");
                    continue;
                }
            },
            None => item.key.clone(),
        };
        index.insert(key, item);
    }
    Ok(index)
}

/// Remote key for a vault key: explicit, identical when unencrypted, or
/// looked up in the listing.
async fn resolve_remote_key(
    transport: &WebdavTransport,
    ctx: Option<&EncryptionContext>,
    key: &str,
    explicit: Option<&str>,
) -> Result<String> {
    if let Some(remote) = explicit {
        return Ok(remote.to_string());
    }
    if ctx.is_none() {
        return Ok(key.to_string());
    }
    let index = remote_index(transport, ctx).await?;
    index
        .get(key)
        .or_else(|| index.get(&format!("{key}/")))
        .map(|item| item.key.clone())
        .with_context(|| format!("no remote entry for {key}"))
}

// ── `davsync check` ───────────────────────────────────────────────────────────

async fn cmd_check(config: &DavsyncConfig) -> Result<()> {
    let transport = WebdavTransport::connect(config).context("configuring WebDAV transport")?;
    check_health(&transport)
        .await
        .with_context(|| format!("cannot reach {}", config.webdav.address))?;
    println!("ok: {} is reachable", config.webdav.address);
    Ok(())
}

// ── `davsync ls` ──────────────────────────────────────────────────────────────

async fn cmd_ls(config: &DavsyncConfig, settings: Option<PathBuf>, json: bool) -> Result<()> {
    let transport = connect(config, settings).await?;
    let ctx = EncryptionContext::from_config(&config.crypto);
    let index = remote_index(&transport, ctx.as_ref()).await?;

    let mut entries: Vec<(&String, &RemoteItem)> = index.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    if json {
        let rows: Vec<_> = entries
            .iter()
            .map(|(key, item)| {
                serde_json::json!({
                    "key": key,
                    "remote_key": item.key,
                    "size": item.size,
                    "last_modified": item.last_modified,
                    "etag": item.etag,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (key, item) in &entries {
        let modified = chrono::DateTime::from_timestamp_millis(item.last_modified)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        let size = if item.is_dir() {
            "-".to_string()
        } else {
            engine::format_size(item.size)
        };
        println!("{size:>12}  {modified}  {key}");
    }
    println!("{} entries", entries.len());
    Ok(())
}

// ── `davsync push` ────────────────────────────────────────────────────────────

async fn cmd_push(
    config: &DavsyncConfig,
    settings: Option<PathBuf>,
    vault_root: &Path,
    path: &str,
    remote_key: Option<&str>,
) -> Result<()> {
    let transport = connect(config, settings).await?;
    let ctx = EncryptionContext::from_config(&config.crypto);
    let vault = FsVault::new(vault_root);
    let path = path.trim_matches('/');

    let is_dir = tokio::fs::metadata(vault_root.join(path))
        .await
        .with_context(|| format!("reading {}", vault_root.join(path).display()))?
        .is_dir();

    if !is_dir {
        let result = engine::upload_file(&transport, &vault, ctx.as_ref(), path, remote_key, None)
            .await
            .with_context(|| format!("uploading {path}"))?;
        report_upload(path, &result);
        return Ok(());
    }

    // Reuse existing obscured names so re-pushes overwrite instead of duplicating.
    let existing = match ctx {
        Some(_) => remote_index(&transport, ctx.as_ref()).await?,
        None => HashMap::new(),
    };

    let mut uploaded = 0usize;
    let mut skipped = 0usize;
    let mut queue = VecDeque::from([path.to_string()]);
    while let Some(dir) = queue.pop_front() {
        if !dir.is_empty() {
            let key = format!("{dir}/");
            let known = existing.get(&key).map(|i| i.key.as_str());
            engine::upload_file(&transport, &vault, ctx.as_ref(), &key, known, None)
                .await
                .with_context(|| format!("creating folder {key}"))?;
        }

        let listing = vault.list(&dir).await?;
        for file in &listing.files {
            let known = existing.get(file).map(|i| i.key.as_str());
            let result = engine::upload_file(&transport, &vault, ctx.as_ref(), file, known, None)
                .await
                .with_context(|| format!("uploading {file}"))?;
            report_upload(file, &result);
            if result.skipped {
                skipped += 1;
            } else {
                uploaded += 1;
            }
        }
        queue.extend(listing.folders);
    }

    println!("Pushed: {uploaded} uploaded, {skipped} unchanged");
    Ok(())
}

fn report_upload(key: &str, result: &engine::UploadResult) {
    if result.skipped {
        println!("  unchanged  {key}");
    } else {
        println!(
            "  uploaded   {key}  ({})",
            engine::format_size(result.item.size)
        );
    }
}

// ── `davsync pull` ────────────────────────────────────────────────────────────

async fn cmd_pull(
    config: &DavsyncConfig,
    settings: Option<PathBuf>,
    vault_root: &Path,
    path: &str,
    remote_key: Option<&str>,
) -> Result<()> {
    let transport = connect(config, settings).await?;
    let ctx = EncryptionContext::from_config(&config.crypto);
    let vault = FsVault::new(vault_root);
    let path = path.trim_start_matches('/');

    let targets: Vec<String> = if path.is_empty() && remote_key.is_none() {
        let index = remote_index(&transport, ctx.as_ref()).await?;
        let mut pairs: Vec<(String, String)> = index
            .into_iter()
            .map(|(key, item)| (key, item.key))
            .collect();
        pairs.sort();
        pairs.into_iter().map(|(_, remote)| remote).collect()
    } else {
        vec![resolve_remote_key(&transport, ctx.as_ref(), path, remote_key).await?]
    };

    for remote in &targets {
        let pb = make_progress_bar(0, "pull")?;
        let pb_clone = pb.clone();
        let progress: ProgressFn = Box::new(move |done, total, msg| {
            pb_clone.set_length(total);
            pb_clone.set_position(done);
            pb_clone.set_message(msg.to_string());
        });

        let result = engine::download_file(&transport, &vault, ctx.as_ref(), remote, Some(&progress))
            .await
            .with_context(|| format!("downloading {remote}"))?;
        pb.finish_and_clear();
        println!(
            "  downloaded {}  ({})",
            result.key,
            engine::format_size(result.bytes)
        );
    }

    println!("Pulled {} entries into {}", targets.len(), vault_root.display());
    Ok(())
}

// ── `davsync rm` ──────────────────────────────────────────────────────────────

async fn cmd_rm(
    config: &DavsyncConfig,
    settings: Option<PathBuf>,
    path: &str,
    remote_key: Option<&str>,
) -> Result<()> {
    let transport = connect(config, settings).await?;
    let ctx = EncryptionContext::from_config(&config.crypto);
    let remote = resolve_remote_key(&transport, ctx.as_ref(), path, remote_key).await?;
    engine::delete_remote(&transport, &remote)
        .await
        .with_context(|| format!("deleting {remote}"))?;
    println!("Deleted {path}");
    Ok(())
}

// ── `davsync config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &DavsyncConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    print!("{}", redacted_toml(config)?);
    Ok(())
}

fn redacted_toml(config: &DavsyncConfig) -> Result<String> {
    let mut shown = config.clone();
    for secret in [&mut shown.webdav.password, &mut shown.crypto.password] {
        if !secret.is_empty() {
            *secret = "[REDACTED]".into();
        }
    }
    shown
        .to_toml_string()
        .context("serializing config to TOML")
}

// ── `davsync size` ────────────────────────────────────────────────────────────

fn cmd_size(action: SizeAction) -> Result<()> {
    match action {
        SizeAction::ToCipher { n } => {
            let size = davsync_crypto::plain_to_cipher_size(n)?;
            println!("{size}");
        }
        SizeAction::ToPlain { n } => {
            let range = davsync_crypto::cipher_to_plain_size(n)?;
            println!("{}..={}", range.min_size, range.max_size);
        }
    }
    Ok(())
}

// ── `davsync name` ────────────────────────────────────────────────────────────

fn cmd_name(config: &DavsyncConfig, action: NameAction) -> Result<()> {
    if !config.crypto.enabled() {
        anyhow::bail!("no encryption password: set [crypto] password, DAVSYNC_PASSWORD, or --ask-password");
    }
    let password = SecretString::from(config.crypto.password.clone());
    let rounds = config.crypto.kdf_rounds;
    let encoding = config.crypto.name_encoding;
    let out = match action {
        NameAction::Encode { text } => {
            davsync_crypto::encrypt_to_text(&text, &password, rounds, encoding)?
        }
        NameAction::Decode { text } => {
            davsync_crypto::decrypt_from_text(&text, &password, rounds, encoding)?
        }
    };
    println!("{out}");
    Ok(())
}
