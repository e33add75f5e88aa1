//! Classify Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use locaudit_engine::Engine;

use super::{load_config, Exit};
use crate::output::{print_error, print_list, ClassificationRow, OutputFormat};

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Audit configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Strings to classify
    #[arg(required = true, num_args = 1..)]
    pub texts: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub fn execute(args: ClassifyArgs) -> Result<Exit> {
    let config = match load_config(&args.config) {
        Ok(config) => config,
        Err(exit) => return Ok(exit),
    };
    let engine = match Engine::with_lingua(config) {
        Ok(engine) => engine,
        Err(e) if e.is_fatal() => {
            print_error(&format!("Invalid configuration: {}", e));
            return Ok(Exit::Invalid);
        }
        Err(e) => return Err(e.into()),
    };

    let rows: Vec<ClassificationRow> = args
        .texts
        .into_iter()
        .map(|text| {
            let result = engine.classifier().classify(&text);
            ClassificationRow { text, result }
        })
        .collect();
    print_list(&rows, args.format);
    Ok(Exit::Success)
}
