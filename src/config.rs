use crate::error::Result;
use serde::Deserialize;
use std::{fs, path::Path};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    #[serde(default = "default_merged_dir")]
    pub merged_dir: String,
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default)]
    pub extraction: ExtractionSection,
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

fn default_merged_dir() -> String {
    "merged".to_string()
}

fn default_settings_path() -> String {
    ".config/settings.toml".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Threshold for telling text PDFs from scanned ones.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionSection {
    /// Share of image-only pages at which the whole PDF counts as scanned.
    #[serde(default = "default_scanned_ratio")]
    pub scanned_ratio: f64,
}

fn default_scanned_ratio() -> f64 {
    0.8
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            scanned_ratio: default_scanned_ratio(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            merged_dir: default_merged_dir(),
            settings_path: default_settings_path(),
            log_filter: default_log_filter(),
            extraction: ExtractionSection::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            upload_dir = "/srv/intake/uploads"

            [extraction]
            scanned_ratio = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.upload_dir, "/srv/intake/uploads");
        assert_eq!(cfg.merged_dir, "merged");
        assert_eq!(cfg.extraction.scanned_ratio, 0.5);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.settings_path, ".config/settings.toml");
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn test_bad_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intake.toml");
        fs::write(&path, "upload_dir = [").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
