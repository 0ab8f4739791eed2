//! Keep the cache fresh while templates are edited.
//!
//! Runs the file watcher and the expiry sweeper until Ctrl-C. Changed
//! templates are invalidated together with everything built from them; the
//! next render recompiles them.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::sync::Arc;

use super::CliConfig;
use crate::watcher::TemplateWatcher;

#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Compile every directive template before watching
    #[arg(long)]
    preload: bool,
}

impl WatchCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = Arc::new(config.build_engine().await?);

        if self.preload {
            let report = engine.preload_all()?;
            println!("{report}");
        }

        let watcher = TemplateWatcher::start(Arc::clone(&engine))?;
        let sweeper = engine.start_sweeper();
        println!(
            "{} {} {}",
            "Watching".green().bold(),
            watcher.root().display(),
            "(Ctrl-C to stop)".dimmed()
        );

        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;

        sweeper.stop().await;
        watcher.stop();
        println!("Stopped watching");
        Ok(())
    }
}
