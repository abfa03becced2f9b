use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

#[derive(Args)]
pub struct ConfigArgs {
    /// TOML config file; defaults apply when omitted
    #[arg(long, env = "HIVE_CONFIG")]
    pub config: Option<PathBuf>,
    /// Emit JSON instead of TOML
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    let cfg = super::load_config(args.config.as_ref())?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    } else {
        let text = toml::to_string_pretty(&cfg).context("rendering config as TOML")?;
        print!("{text}");
    }
    Ok(())
}
