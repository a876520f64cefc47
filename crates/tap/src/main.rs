use std::fs::File;
use std::io::{self, BufReader};

use anyhow::{Context, Result};
use clap::Parser;

use servewise_events::RegistryConfig;
use servewise_tap::{Cli, run};

fn main() -> Result<()> {
    servewise_observability::init();

    let cli = Cli::parse();
    let config = RegistryConfig::from_env().context("invalid registry configuration")?;

    let summary = match &cli.frames {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open frames file {}", path.display()))?;
            run(BufReader::new(file), &cli, config)?
        }
        None => run(io::stdin().lock(), &cli, config)?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
