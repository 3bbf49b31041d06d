//! larder command-line driver.
//!
//! Usage:
//!   # Scripted walkthrough against an in-memory store
//!   larder demo
//!   RUST_LOG=debug larder demo
//!
//!   # Ask the allocator for a key
//!   larder allocate --keys 0,1000 --index 1

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use larder_client::LarderConfig;
use larder_order::allocate;
use larder_types::{EntityId, EntityKind, OrderedEntity};
use tracing_subscriber::{EnvFilter, fmt};

/// Optimistic reordering engine for household lists.
#[derive(Parser, Debug)]
#[command(name = "larder")]
#[command(about = "Optimistic reordering engine for household lists")]
struct Args {
    /// Config file (defaults to <config dir>/larder/larder.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed an in-memory list and run a drag, a check, a bulk delete, and a sync push
    Demo,

    /// Print the sort key for inserting at INDEX among siblings with KEYS
    Allocate {
        /// Existing sibling keys, comma separated
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        keys: Vec<i64>,

        /// Target index among the siblings
        #[arg(long)]
        index: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so command output stays clean on stdout.
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Demo => {
            let config = load_config(args.config)?;
            demo::run(&config).await
        }
        Command::Allocate { keys, index } => {
            print_allocation(keys, index);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<LarderConfig> {
    let Some(path) = path.or_else(LarderConfig::default_path) else {
        tracing::debug!("no config directory, using defaults");
        return Ok(LarderConfig::default());
    };
    LarderConfig::load_or_default(&path)
        .with_context(|| format!("loading config from {}", path.display()))
}

fn print_allocation(mut keys: Vec<i64>, index: usize) {
    keys.sort_unstable();
    let siblings: Vec<OrderedEntity> = keys
        .into_iter()
        .enumerate()
        .map(|(i, key)| {
            OrderedEntity::new(EntityId::new(i as i64 + 1), EntityKind::Item, format!("sibling {i}"))
                .with_sort_key(key)
        })
        .collect();

    let allocation = allocate(&siblings, index);
    if allocation.degenerate {
        println!("{} (degenerate: neighbours are adjacent, rebalance recommended)", allocation.key);
    } else {
        println!("{}", allocation.key);
    }
}
