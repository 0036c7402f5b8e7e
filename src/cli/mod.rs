//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口：查看和维护持久化缓存存储。

use crate::backend::durable::CacheStore;
use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "appcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "SQLite connection string, overrides the configuration")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "status", about = "Show version stamp, entry count and namespaces")]
    Status,

    #[command(name = "keys", about = "List the keys stored for a namespace")]
    Keys(KeysArgs),

    #[command(name = "clear", about = "Delete stored entries")]
    Clear(ClearArgs),
}

#[derive(Parser, Debug)]
pub struct KeysArgs {
    #[arg(short, long, help = "Namespace to list, e.g. appcache.alice.en_US.mail.index")]
    pub namespace: String,
}

#[derive(Parser, Debug)]
pub struct ClearArgs {
    #[arg(short, long, help = "Only clear this namespace")]
    pub namespace: Option<String>,

    #[arg(short, long, help = "Skip the confirmation prompt")]
    pub yes: bool,
}

mod clear;
mod keys;
mod status;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let database_url = resolve_database_url(&cli)?;
    let store = CacheStore::connect(&database_url)
        .await
        .with_context(|| format!("Failed to open cache store '{}'", database_url))?;
    store.ensure_meta_schema().await?;
    store.ensure_entry_schema().await?;

    match &cli.command {
        Commands::Status => status::execute(&store, &database_url).await,
        Commands::Keys(args) => keys::execute(&store, args).await,
        Commands::Clear(args) => clear::execute(&store, args).await,
    }
}

fn resolve_database_url(cli: &Cli) -> Result<String> {
    if let Some(url) = &cli.database_url {
        return Ok(url.clone());
    }
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    Ok(config.persistence.database_url)
}
