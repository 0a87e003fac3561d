//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::backend::l2::L2Backend;
use crate::config::{CacheType, Config};
use crate::telemetry::init_tracing;
use crate::utils::setup_logging;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "oxtier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(long, global = true, help = "Export spans through OpenTelemetry")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "validate", about = "Validate a configuration file")]
    Validate(ConfigArgs),

    #[command(name = "status", about = "Show configuration summary and tier connectivity")]
    Status(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[arg(help = "Path to the TOML configuration file")]
    pub config: PathBuf,

    #[arg(short, long, help = "Show detailed information")]
    pub verbose: bool,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.otel {
        init_tracing("oxtier", None);
    } else {
        setup_logging();
    }

    match &cli.command {
        Commands::Validate(args) => validate(args),
        Commands::Status(args) => status(args).await,
    }
}

fn load(path: &Path) -> Result<Config> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration {}: {}", path.display(), e))?;
    Ok(config)
}

fn validate(args: &ConfigArgs) -> Result<()> {
    let config = load(&args.config)?;
    println!("✅ {} is valid", args.config.display());
    if args.verbose {
        print_summary(&config);
    }
    Ok(())
}

async fn status(args: &ConfigArgs) -> Result<()> {
    let config = load(&args.config)?;
    println!("=== oxtier status ===\n");
    print_summary(&config);
    println!();

    match (config.global.cache_type, config.l2.as_ref()) {
        (CacheType::Local, _) | (_, None) => {
            println!("Shared tier: not configured");
        }
        (_, Some(l2_config)) => {
            let reachable = match L2Backend::new(l2_config).await {
                Ok(l2) => l2.ping().await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match reachable {
                Ok(()) => println!("Shared tier: ✅ reachable ({:?})", l2_config.mode),
                Err(e) => println!("Shared tier: ❌ unreachable ({})", e),
            }
        }
    }
    Ok(())
}

fn print_summary(config: &Config) {
    println!("cache_type:      {}", config.global.cache_type);
    println!("default_ttl:     {}s", config.global.default_ttl);
    println!("l1.max_capacity: {}", config.l1.max_capacity);
    if config.global.cache_type == CacheType::MultiLevel {
        println!(
            "multi_level:     local_ttl={}s shared_ttl={}s",
            config.multi_level.local_ttl,
            config.shared_ttl()
        );
    }
    let protection = &config.protection;
    println!(
        "protection:      avalanche={} (±{}%), penetration={} (null_ttl={}s), breakdown={} (wait={}ms)",
        protection.avalanche.enabled,
        protection.avalanche.jitter_percent,
        protection.penetration.enabled,
        protection.penetration.null_ttl,
        protection.breakdown.enabled,
        protection.breakdown.wait_time_ms
    );
}
