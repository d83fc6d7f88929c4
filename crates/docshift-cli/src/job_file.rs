//! Job file loading
//!
//! Job envelopes are read from JSON, YAML or TOML, chosen by extension.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Supported job file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFormat {
    /// `.json`
    Json,
    /// `.yaml` / `.yml`
    Yaml,
    /// `.toml`
    Toml,
}

impl JobFormat {
    /// Detect format from a file extension
    ///
    /// # Errors
    /// Fails for a missing or unknown extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            _ => bail!(
                "unsupported job file '{}': expected .json, .yaml, .yml or .toml",
                path.display()
            ),
        }
    }

    /// Parse job text in this format
    ///
    /// # Errors
    /// Fails if the text is not valid for the format.
    pub fn parse(self, text: &str) -> Result<Value> {
        let value: Value = match self {
            Self::Json => serde_json::from_str(text).context("invalid JSON job")?,
            Self::Yaml => serde_yaml::from_str(text).context("invalid YAML job")?,
            Self::Toml => toml::from_str(text).context("invalid TOML job")?,
        };
        Ok(value)
    }
}

/// Read a job envelope from disk
///
/// # Errors
/// Fails if the file cannot be read or parsed.
pub async fn load_job(path: &Path) -> Result<Value> {
    let format = JobFormat::from_path(path)?;
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read job file '{}'", path.display()))?;
    format
        .parse(&text)
        .with_context(|| format!("failed to parse job file '{}'", path.display()))
}
