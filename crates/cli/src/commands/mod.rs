//! CLI command implementations

pub mod classify;
pub mod config;
pub mod run;

use std::path::Path;

use locaudit_common::AuditConfig;

use crate::output::print_error;

/// Process exit status of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Every page passed
    Success,
    /// A page failed or errored, or the run was cancelled
    Failure,
    /// Configuration or manifest could not be used
    Invalid,
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => Self::SUCCESS,
            Exit::Failure => Self::from(1),
            Exit::Invalid => Self::from(2),
        }
    }
}

/// Load and validate a config, reporting failure as [`Exit::Invalid`]
pub(crate) fn load_config(path: &Path) -> Result<AuditConfig, Exit> {
    AuditConfig::load(path).map_err(|e| {
        print_error(&format!("Invalid configuration {}: {}", path.display(), e));
        Exit::Invalid
    })
}
