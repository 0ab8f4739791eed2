//! Print the Tera text a template compiles to.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CliConfig;

#[derive(Args, Debug)]
pub struct CompileCommand {
    /// Logical template name
    name: String,

    /// Also list the templates this one was built from
    #[arg(long)]
    deps: bool,
}

impl CompileCommand {
    pub async fn execute(self, config: &CliConfig) -> Result<()> {
        let engine = config.build_engine().await?;
        let compiled = engine.compile(&self.name)?;

        print!("{}", compiled.text);
        if !compiled.text.ends_with('\n') {
            println!();
        }

        if self.deps {
            eprintln!("{} {} ({} mode)", "Dependencies of".bold(), compiled.name.cyan(), compiled.mode);
            if compiled.dependencies.is_empty() {
                eprintln!("  {}", "(none)".dimmed());
            }
            for dep in &compiled.dependencies {
                eprintln!("  {dep}");
            }
        }
        Ok(())
    }
}
