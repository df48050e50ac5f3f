use std::{fs::read_to_string, path::Path};

use anyhow::{anyhow, Context};
use clap::Parser;
use gis_pipeline::pipeline::{run, Config};

/// Load vector datasets, normalize their CRS and combine them spatially.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: String,
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    if !Path::new(&args.config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", &args.config_filepath));
    }
    let config_contents = read_to_string(&args.config_filepath)?;
    let config: Config = serde_yaml::from_str(&config_contents)
        .with_context(|| format!("Invalid config file {}", &args.config_filepath))?;

    let outputs = run(&config)?;
    for output in outputs {
        log::info!("Wrote {:?}", output);
    }
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
