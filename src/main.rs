// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `msgmirror`: run the mirror service or drive it from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use message_mirror::config::{mask_secret, MirrorConfig};
use message_mirror::registry::{Registration, TargetRegistry};
use message_mirror::remote::GitHubClient;
use message_mirror::store::{MessageRepository, SqliteStore};
use message_mirror::target::RepositoryTarget;
use message_mirror::MirrorService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "msgmirror")]
#[command(about = "Store messages locally and mirror them to GitHub repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server.
    Serve,

    /// Store a message and mirror it to every registered repository.
    Post {
        content: String,
    },

    /// Print the local feed, newest first.
    List {
        #[arg(short, long)]
        limit: Option<u32>,

        #[arg(short, long, default_value_t = 0)]
        offset: u32,
    },

    /// Rebuild the feed from the repositories alone, oldest first.
    Fetch,

    /// Mirror every message a repository is missing, then report branch heads.
    Push {
        /// Only push to this repository (`owner/name`).
        #[arg(long, value_name = "OWNER/NAME")]
        repo: Option<String>,

        /// Commit message for the files written by this push.
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Check a message's recorded commit hashes against the repositories.
    Audit {
        id: i64,
    },

    /// Manage repository targets.
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Register a repository after checking it exists.
    Add {
        #[arg(value_name = "OWNER/NAME")]
        repository: String,

        #[arg(long, default_value = "main")]
        branch: String,

        /// Directory inside the repository for message files.
        #[arg(long, default_value = "messages")]
        path: String,
    },

    /// Unregister a repository. Its ledger history is kept.
    Remove {
        #[arg(value_name = "OWNER/NAME")]
        repository: String,
    },

    /// List registered repositories.
    List,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration with secrets masked.
    Show,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Build the full service. `strict` requires the registry document to exist.
async fn open_service(config: MirrorConfig, strict: bool) -> Result<(MirrorService, SqliteStore)> {
    let registry = if strict {
        TargetRegistry::load(&config.registry.path)?
    } else {
        TargetRegistry::open_or_init(&config.registry.path)?
    };
    let client = GitHubClient::new(&config.remote)?;
    let store = SqliteStore::open(&config.database)
        .await
        .with_context(|| format!("opening {}", config.database.sqlite_path))?;

    let service = MirrorService::new(config, Arc::new(store.clone()), registry, Arc::new(client)).await?;
    Ok((service, store))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = MirrorConfig::load()?;

    match cli.command {
        Commands::Serve => {
            let (service, store) = open_service(config, false).await?;
            message_mirror::http::serve(Arc::new(service)).await?;
            store.close().await;
        }
        Commands::Post { content } => {
            let (service, store) = open_service(config, false).await?;
            let created = service.create_message(&content).await?;
            println!("{}", serde_json::to_string_pretty(&created)?);
            store.close().await;
        }
        Commands::List { limit, offset } => {
            // No remote access needed, so no credential either.
            let store = SqliteStore::open(&config.database).await?;
            let feed = store.list_messages(config.list.clamp(limit), offset).await?;
            println!("{}", serde_json::to_string_pretty(&feed)?);
            store.close().await;
        }
        Commands::Fetch => {
            let (service, store) = open_service(config, false).await?;
            let feed = service.fetch_remote_messages().await;
            println!("{}", serde_json::to_string_pretty(&feed)?);
            store.close().await;
        }
        Commands::Push { repo, message } => {
            let (service, store) = open_service(config, true).await?;
            let report = service.push(repo.as_deref(), message.as_deref()).await?;
            println!("{}", report);
            store.close().await;
        }
        Commands::Audit { id } => {
            let (service, store) = open_service(config, false).await?;
            let report = service.audit_message(id).await?;
            println!("{}", report);
            store.close().await;
        }
        Commands::Repo { command } => match command {
            RepoCommands::Add {
                repository,
                branch,
                path,
            } => {
                let target = RepositoryTarget::from_key(&repository)?
                    .with_branch(branch)
                    .with_storage_path(path);
                let (service, store) = open_service(config, false).await?;
                match service.add_target(target).await? {
                    Registration::Added => println!("Added {}", repository),
                    Registration::Updated => println!("Updated {}", repository),
                    Registration::Unchanged => println!("{} already registered", repository),
                }
                store.close().await;
            }
            RepoCommands::Remove { repository } => {
                let (service, store) = open_service(config, false).await?;
                match service.remove_target(&repository).await? {
                    Some(_) => println!("Removed {}", repository),
                    None => println!("{} is not registered", repository),
                }
                store.close().await;
            }
            RepoCommands::List => {
                let registry = TargetRegistry::open_or_init(&config.registry.path)?;
                let targets = registry.snapshot().await;
                if targets.is_empty() {
                    println!("No repositories configured.");
                }
                for target in targets {
                    println!("{}  (branch {}, path {})", target.key(), target.branch, target.storage_path);
                }
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                let token = config
                    .remote
                    .token
                    .as_deref()
                    .map(mask_secret)
                    .unwrap_or_else(|| "(not set)".to_string());
                println!("GITHUB_TOKEN: {}", token);
            }
        },
    }

    Ok(())
}
