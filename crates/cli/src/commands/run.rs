//! Run Command

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use locaudit_engine::{load_inputs, write_report, BaselineMode, Engine};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{load_config, Exit};
use crate::output::{print_error, print_report, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Audit configuration (YAML)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Capture manifest listing the pages to audit
    #[arg(short, long)]
    pub pages: PathBuf,

    /// Approve current screenshots as the new baselines
    #[arg(long)]
    pub update_baselines: bool,

    /// Output directory for the run report (overrides run.output_dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

pub async fn execute(args: RunArgs) -> Result<Exit> {
    let mut config = match load_config(&args.config) {
        Ok(config) => config,
        Err(exit) => return Ok(exit),
    };
    if let Some(output) = args.output {
        config.run.output_dir = output;
    }
    let output_dir = config.run.output_dir.clone();

    let pages = match load_inputs(&args.pages) {
        Ok(pages) => pages,
        Err(e) => {
            print_error(&format!("Cannot load pages from {}: {}", args.pages.display(), e));
            return Ok(Exit::Invalid);
        }
    };

    let mode = if args.update_baselines {
        BaselineMode::Approve
    } else {
        BaselineMode::Compare
    };
    let engine = match Engine::with_lingua(config) {
        Ok(engine) => engine.with_mode(mode),
        Err(e) if e.is_fatal() => {
            print_error(&format!("Invalid configuration: {}", e));
            return Ok(Exit::Invalid);
        }
        Err(e) => return Err(e.into()),
    };
    if mode == BaselineMode::Approve {
        warn!("Baselines will be replaced with this run's screenshots");
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight pages");
                cancel.cancel();
            }
        })
    };

    info!("Auditing {} page(s)", pages.len());
    let report = engine.run(pages, cancel).await;
    interrupt.abort();

    let path = write_report(&report, &output_dir)?;
    print_report(&report, args.format);
    info!("Report: {}", path.display());

    Ok(if report.success() {
        Exit::Success
    } else {
        Exit::Failure
    })
}
