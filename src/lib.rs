//! SiteSentry: malware scanning and remediation for web installations
//!
//! This crate provides the engine behind the `sitesentry` CLI: signature
//! and obfuscation detection for PHP and JavaScript files, encrypted
//! quarantine with restore, core file integrity verification and repair,
//! and a resource-governed scan pipeline that pauses and resumes instead
//! of overrunning its host.

pub mod core;
pub mod detection;
pub mod governor;
pub mod integrity;
pub mod quarantine;
pub mod scanner;
pub mod store;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};
pub use crate::core::types::*;
pub use crate::governor::{BudgetStatus, ResourceGovernor, ResourceUsage};
