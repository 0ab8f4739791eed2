//! Compile every directive template into the cache.
//!
//! With disk mirroring enabled this leaves a warm cache directory behind for
//! the next process to reuse.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;
use crate::engine::PreloadReport;

#[derive(Args, Debug)]
pub struct PreloadCommand {
    /// Exit successfully even if some templates fail to compile
    #[arg(long)]
    keep_going: bool,
}

impl PreloadCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = config.build_engine().await?;
        let report = engine.preload_all()?;
        print_report(&report, "Preloaded");

        let stats = engine.cache_stats();
        println!(
            "Cache: {} entries, {} bytes ({:.1}% of budget)",
            stats.count, stats.current_size_bytes, stats.utilization_percent
        );

        if !report.is_success() && !self.keep_going {
            anyhow::bail!("{} of {} templates failed to compile", report.failures.len(), report.total());
        }
        Ok(())
    }
}

pub(super) fn print_report(report: &PreloadReport, verb: &str) {
    for name in &report.compiled {
        println!("  {} {}", "✓".green(), name);
    }
    for (name, err) in &report.failures {
        println!("  {} {}: {}", "✗".red(), name.bold(), err);
    }
    let summary = format!("{verb} {} of {} templates", report.compiled.len(), report.total());
    if report.is_success() {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.yellow());
    }
}
