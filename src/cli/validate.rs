//! Check that every template compiles without touching the cache.
//!
//! Exits non-zero when any template fails, which makes it usable as a CI step:
//!
//! ```bash
//! blade validate --templates-dir site/templates
//! blade validate --format json
//! ```

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::CliConfig;
use super::preload::print_report;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// Output format (text, json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Serialize)]
struct ValidationOutput<'a> {
    valid: bool,
    compiled: &'a [String],
    errors: Vec<ValidationError<'a>>,
}

#[derive(Serialize)]
struct ValidationError<'a> {
    template: &'a str,
    message: String,
}

impl ValidateCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = config.build_engine().await?;
        let report = engine.validate_all()?;

        if self.format == "json" {
            let output = ValidationOutput {
                valid: report.is_success(),
                compiled: &report.compiled,
                errors: report
                    .failures
                    .iter()
                    .map(|(name, err)| ValidationError {
                        template: name,
                        message: err.to_string(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_report(&report, "Validated");
        }

        if !report.is_success() {
            anyhow::bail!("{} of {} templates are invalid", report.failures.len(), report.total());
        }
        Ok(())
    }
}
