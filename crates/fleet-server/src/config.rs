//! Configuration for the fleet expense server

use anyhow::{Context, Result};
use fleet_ledger::BreakdownOrder;
use fleet_ledger::constants;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default config file path
pub const CONFIG_FILE: &str = "config.toml";

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub report: ReportConfig,
    /// Log filter used when RUST_LOG is unset (e.g. "info", "fleet_ledger=debug")
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP API listens on
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file, created on first run
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Path::new("data").join(constants::DATABASE_FILENAME),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Per-driver breakdown order when a request does not ask for one
    pub breakdown_order: BreakdownOrder,
    /// File name offered with CSV downloads
    pub export_file_name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            breakdown_order: BreakdownOrder::default(),
            export_file_name: constants::DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load the file when it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| {
            "Invalid config. Check for:\n\
             - Invalid TOML syntax (missing quotes, brackets, etc.)\n\
             - report.breakdown_order other than \"name\" or \"total\""
        })
    }
}
