//! Render a template to stdout or a file.
//!
//! ```bash
//! blade render pages/home.blade.tpl --data data.json
//! echo '{"user":"ada"}' | blade render pages/home.blade.tpl --data -
//! blade render pages/home.blade.tpl --data data.json --output out/home.html
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::CliConfig;

#[derive(Args, Debug)]
pub struct RenderCommand {
    /// Logical template name, relative to the templates directory
    name: String,

    /// JSON file with the render data (`-` reads stdin)
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Write output to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl RenderCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = config.build_engine().await?;
        let data = match &self.data {
            Some(path) => load_data(path).await?,
            None => Value::Null,
        };

        match &self.output {
            Some(path) => {
                let rendered = engine.render(&self.name, &data)?;
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
                tokio::fs::write(path, &rendered)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                eprintln!(
                    "{} Rendered {} to {} ({} bytes)",
                    "✓".green(),
                    self.name.cyan(),
                    path.display(),
                    rendered.len()
                );
            }
            None => {
                let mut stdout = std::io::stdout().lock();
                engine.render_to(&self.name, &data, &mut stdout)?;
                stdout.flush().context("Failed to flush stdout")?;
            }
        }
        Ok(())
    }
}

async fn load_data(path: &Path) -> Result<Value> {
    let content = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read render data from stdin")?;
        buffer
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read render data from {}", path.display()))?
    };

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Render data in {} is not valid JSON", path.display()))?;
    if !value.is_object() && !value.is_null() {
        anyhow::bail!("Render data in {} must be a JSON object", path.display());
    }
    Ok(value)
}
