//! Check Config Command

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use locaudit_engine::BaselineStore;

use super::{load_config, Exit};
use crate::output::{print_info, print_success};

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    /// Audit configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,
}

pub fn execute(args: CheckConfigArgs) -> Result<Exit> {
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(exit) => return Ok(exit),
    };

    let effective = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    println!("{}", effective);

    let baselines = BaselineStore::new(&config.visual.baseline_dir);
    let stems = baselines
        .list()
        .with_context(|| format!("Failed to list baselines in {}", baselines.root().display()))?;
    print_info(&format!(
        "{} approved baseline(s) in {}",
        stems.len(),
        baselines.root().display()
    ));
    print_success(&format!("{} is valid", args.config.display()));
    Ok(Exit::Success)
}
