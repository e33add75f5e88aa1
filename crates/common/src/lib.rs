//! LocAudit Common Library
//!
//! Shared types, configuration, and errors for the LocAudit engine and CLI.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{AuditConfig, FilterConfig, LanguageConfig, VisualConfig, VisualTrigger};
pub use error::{Error, Result};
pub use types::*;

