//! Cachet command-line client.
//!
//! Usage:
//!   cachet --config cachet.yaml check
//!   cachet --config cachet.yaml --cache sessions get user:1
//!   cachet --config cachet.yaml --cache docs json-set d1 '{"a": 1}'

use anyhow::{anyhow, Context, Result};
use cachet::{Cache, CacheRegistry, Config, JsonPath};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cachet")]
#[command(author, version, about = "Inspect and modify configured caches")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CACHET_CONFIG")]
    config: PathBuf,

    /// Cache to operate on (optional when only one cache is configured)
    #[arg(short = 'n', long)]
    cache: Option<String>,

    /// Serve every cache from the in-process sandbox
    #[arg(long)]
    sandbox: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and list caches
    Check,
    /// Read a key
    Get { key: String },
    /// Write a JSON value
    Put {
        key: String,
        value: String,
        /// Expiry in seconds (defaults to the cache's ttl_seconds)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Delete a key
    Del { key: String },
    /// Read a document, or the value at a path inside it
    JsonGet {
        key: String,
        #[arg(default_value = ".")]
        path: String,
    },
    /// Write a JSON value into a document
    JsonSet {
        key: String,
        value: String,
        #[arg(default_value = ".")]
        path: String,
    },
    /// Show table metadata
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    config.sandbox |= args.sandbox;

    if let Command::Check = args.command {
        println!("Configuration OK ({} cache(s))", config.caches.len());
        for cache in &config.caches {
            let backend = if config.sandbox {
                "sandbox"
            } else {
                cache.backend.as_str()
            };
            match cache.ttl_seconds {
                Some(ttl) => println!("  {} [{}] ttl={}s", cache.name, backend, ttl),
                None => println!("  {} [{}]", cache.name, backend),
            }
        }
        return Ok(());
    }

    let registry = CacheRegistry::from_config(&config, None)?;
    let cache = select_cache(&registry, args.cache.as_deref())?;
    run(&cache, args.command)
}

fn select_cache(registry: &CacheRegistry, name: Option<&str>) -> Result<Arc<Cache>> {
    match name {
        Some(name) => registry
            .get(name)
            .ok_or_else(|| anyhow!("Unknown cache '{name}'. Configured: {}", registry.names().join(", "))),
        None => match registry.names().as_slice() {
            [only] => registry
                .get(only)
                .ok_or_else(|| anyhow!("Cache '{only}' disappeared from the registry")),
            names => Err(anyhow!(
                "Several caches are configured ({}); pick one with --cache",
                names.join(", ")
            )),
        },
    }
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("Invalid JSON value: {text}"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cache: &Cache, command: Command) -> Result<()> {
    match command {
        Command::Check => Ok(()),
        Command::Get { key } => print_json(&cache.get(&key)?),
        Command::Put { key, value, ttl } => {
            cache.put_with_ttl(&key, parse_json(&value)?, ttl.map(Duration::from_secs))?;
            println!("OK");
            Ok(())
        }
        Command::Del { key } => {
            cache.delete(&key)?;
            println!("OK");
            Ok(())
        }
        Command::JsonGet { key, path } => {
            let path = JsonPath::parse(&path)?;
            print_json(&cache.json_get(&key, &path)?)
        }
        Command::JsonSet { key, value, path } => {
            let path = JsonPath::parse(&path)?;
            let status = cache.json_set(&key, &path, parse_json(&value)?)?;
            println!("{status:?}");
            Ok(())
        }
        Command::Info => print_json(&cache.info()?),
    }
}
