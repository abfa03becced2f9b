use anyhow::{Context, Result};
use clap::Args;
use hive_archive::ArchiveKey;
use serde_json::json;

#[derive(Args)]
pub struct LinkArgs {
    /// Share link (`hive://`, `dat://`) or bare 64-character hex key
    pub link: String,
    /// Print key and canonical link as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: LinkArgs) -> Result<()> {
    let key = ArchiveKey::parse_link(&args.link)
        .with_context(|| format!("invalid share link `{}`", args.link.trim()))?;
    if args.json {
        println!(
            "{}",
            json!({ "key": key.to_hex(), "link": key.to_link() })
        );
    } else {
        println!("{}", key.to_link());
    }
    Ok(())
}
