use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use hac_client::config::{CacheBackend, Config};
use hac_client::models::{UpdateRequest, ValidationMode};
use hac_client::{HacClient, SessionMetadata};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "hac")]
#[command(about = "Drive the SAP Commerce Administration Console from the command line")]
#[command(version)]
struct Cli {
    /// Console base URL (HAC_URL)
    #[arg(long, global = true, value_name = "URL")]
    url: Option<String>,

    /// Login user (HAC_USERNAME)
    #[arg(short, long, global = true)]
    username: Option<String>,

    /// Login password (HAC_PASSWORD)
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Session cache partition, e.g. local, dev, prod (HAC_ENVIRONMENT)
    #[arg(short, long, global = true)]
    environment: Option<String>,

    /// Request timeout in seconds (HAC_TIMEOUT_SECS)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Accept invalid TLS certificates (HAC_IGNORE_SSL)
    #[arg(long, global = true)]
    ignore_ssl: bool,

    /// Only log warnings (HAC_QUIET)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Session cache backend: file, sqlite or none (HAC_SESSION_CACHE)
    #[arg(long, global = true, value_name = "BACKEND")]
    session_cache: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Console(ConsoleCommand),

    /// Inspect or clear the session cache
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
}

/// Commands that talk to the console.
#[derive(Subcommand, Debug)]
enum ConsoleCommand {
    /// Log in (or validate the cached session) and show it
    Login,

    /// Execute a Groovy script
    Groovy {
        /// Script file, or - for stdin
        file: PathBuf,
        /// Persist changes instead of rolling back
        #[arg(long)]
        commit: bool,
    },

    /// Run a FlexibleSearch query
    Flexsearch {
        query: String,
        #[arg(long, default_value_t = 200)]
        max_count: u32,
        #[arg(long, default_value = "en")]
        locale: String,
    },

    /// Import Impex content
    Impex {
        /// Impex file, or - for stdin
        file: PathBuf,
        /// IMPORT_STRICT, IMPORT_RELAXED, STRICT or RELAXED
        #[arg(long, default_value = "IMPORT_STRICT")]
        validation_mode: ValidationMode,
    },

    /// Show extensions and their update parameters
    UpdateData,

    /// Show pending patches by category
    PendingPatches,

    /// Run a system update
    Update(UpdateArgs),

    /// Show the current update log
    UpdateLog,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    /// Patch selection as name=value; repeatable
    #[arg(long = "patch", value_name = "NAME=VALUE", value_parser = parse_patch)]
    patches: Vec<(String, String)>,
    #[arg(long)]
    drop_tables: bool,
    #[arg(long)]
    clear_hmc: bool,
    #[arg(long)]
    create_essential_data: bool,
    #[arg(long)]
    create_project_data: bool,
    #[arg(long)]
    localize_types: bool,
    /// Do not include the server's required pending patches
    #[arg(long)]
    no_pending_patches: bool,
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    /// List cached sessions, most recently used first
    List,
    /// Remove every cached session
    Clear,
}

fn parse_patch(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.trim().to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{raw}'")),
    }
}

impl Cli {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(environment) = &self.environment {
            config.environment = environment.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        config.ignore_ssl |= self.ignore_ssl;
        config.quiet |= self.quiet;
        if let Some(backend) = &self.session_cache {
            config.session_cache = backend.parse::<CacheBackend>()?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;
    cli.apply(&mut config)?;

    // Logging
    let default_filter = if config.quiet { "warn" } else { "hac_client=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();

    tracing::debug!(
        url = %config.base_url,
        environment = %config.environment,
        cache = ?config.session_cache,
        "Starting hac"
    );

    match cli.command {
        Command::Sessions { command } => sessions(&config, command).await,
        Command::Console(command) => {
            let client = config.build_client().await?;
            run(&client, command).await
        }
    }
}

async fn run(client: &HacClient, command: ConsoleCommand) -> Result<()> {
    match command {
        ConsoleCommand::Login => {
            let session = client.login().await?;
            print_json(&SessionMetadata::new(&client.session_key(), &session).masked())
        }
        ConsoleCommand::Groovy { file, commit } => {
            let script = read_input(&file).await?;
            let result = client.execute_groovy(&script, commit).await?;
            print_json(&result)?;
            if !result.success() {
                bail!("Groovy script failed");
            }
            Ok(())
        }
        ConsoleCommand::Flexsearch {
            query,
            max_count,
            locale,
        } => {
            let result = client.execute_flexiblesearch(&query, max_count, &locale).await?;
            print_json(&result)?;
            if !result.success() {
                bail!("FlexibleSearch query failed");
            }
            Ok(())
        }
        ConsoleCommand::Impex { file, validation_mode } => {
            let content = read_input(&file).await?;
            let result = client.import_impex(&content, validation_mode).await?;
            print_json(&result)?;
            if !result.success {
                bail!("Impex import failed");
            }
            Ok(())
        }
        ConsoleCommand::UpdateData => print_json(&client.get_update_data().await?),
        ConsoleCommand::PendingPatches => print_json(&client.get_pending_patches().await?),
        ConsoleCommand::Update(args) => {
            let mut request = UpdateRequest {
                drop_tables: args.drop_tables,
                clear_hmc: args.clear_hmc,
                create_essential_data: args.create_essential_data,
                create_project_data: args.create_project_data,
                localize_types: args.localize_types,
                include_pending_patches: !args.no_pending_patches,
                ..UpdateRequest::default()
            };
            for (name, value) in args.patches {
                request = request.with_patch(name, value);
            }
            let result = client.execute_update(&request).await?;
            print_json(&result)?;
            if !result.success {
                bail!("System update failed");
            }
            Ok(())
        }
        ConsoleCommand::UpdateLog => print_json(&client.get_update_log().await?),
    }
}

async fn sessions(config: &Config, command: SessionsCommand) -> Result<()> {
    let Some(store) = config.open_store().await else {
        bail!("Session caching is disabled");
    };
    match command {
        SessionsCommand::List => {
            let sessions: Vec<_> = store.list_all().await.iter().map(|s| s.masked()).collect();
            print_json(&sessions)
        }
        SessionsCommand::Clear => {
            let removed = store.clear_all().await;
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

async fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("reading stdin")?;
        return Ok(content);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
