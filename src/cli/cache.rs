//! Inspect and clear the compiled-artifact cache.
//!
//! A fresh process starts with an empty in-memory cache, so `stats` and
//! `list` first pull every still-fresh mirrored artifact back in. Stale
//! mirror entries are recompiled on the way.
//!
//! ```bash
//! blade cache stats
//! blade cache stats --json
//! blade cache list
//! blade cache clear
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::CliConfig;
use crate::engine::BladeEngine;

#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
enum CacheSubcommand {
    /// Show cache occupancy
    Stats {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// List cached templates
    List,

    /// Remove every cached artifact, in memory and on disk
    Clear,
}

impl CacheCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = config.build_engine().await?;

        match self.command {
            CacheSubcommand::Stats { json } => {
                load_mirrored(&engine);
                let stats = engine.cache_stats();
                if json {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                    return Ok(());
                }
                println!("{}", "Compiled template cache".bold());
                println!("  Entries:     {}", stats.count);
                println!(
                    "  Size:        {} / {} bytes ({:.1}%)",
                    stats.current_size_bytes, stats.max_size_bytes, stats.utilization_percent
                );
                println!("  TTL:         {}s", engine.cache().ttl().as_secs());
                match engine.cache().mirror_dir() {
                    Some(dir) => println!("  Mirror:      {}", dir.display()),
                    None => println!("  Mirror:      {}", "disabled".dimmed()),
                }
            }
            CacheSubcommand::List => {
                load_mirrored(&engine);
                let names = engine.cached_templates();
                if names.is_empty() {
                    println!("{}", "No cached templates".dimmed());
                }
                for name in names {
                    println!("{name}");
                }
            }
            CacheSubcommand::Clear => {
                let dir = engine.cache().mirror_dir();
                engine.clear_cache();
                match dir {
                    Some(dir) => println!("{} Cleared cache at {}", "✓".green(), dir.display()),
                    None => println!("{} Cleared cache", "✓".green()),
                }
            }
        }
        Ok(())
    }
}

fn load_mirrored(engine: &BladeEngine) {
    let mirrored = engine.cache().mirrored();
    let report = engine.warmup(mirrored.iter().map(String::as_str));
    for (name, err) in &report.failures {
        tracing::warn!("Mirrored template '{}' no longer compiles: {}", name, err);
    }
}
