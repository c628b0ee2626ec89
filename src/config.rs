use config::{Config, Environment, File};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// Runtime configuration, layered from defaults, an optional TOML file and
/// `CAMLAPSE_*` environment variables.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CamlapseConfig {
    /// Root directory for captured frames and the catalog database
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Directory assembled timelapse videos are written to
    #[serde(default = "default_timelapse_path")]
    pub timelapse_path: PathBuf,

    /// Seconds between capture rounds in `run` mode
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// IANA timezone all capture timestamps are taken in
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// strftime pattern for captured frame file names
    #[serde(default = "default_file_name_format")]
    pub file_name_format: String,

    /// Image file extension written by the frame grabber
    #[serde(default = "default_file_format")]
    pub file_format: String,

    /// User-Agent header presented to the webcam portal
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("images")
}

fn default_timelapse_path() -> PathBuf {
    PathBuf::from("timelapses")
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_timezone() -> Tz {
    chrono_tz::America::St_Johns
}

fn default_file_name_format() -> String {
    "%Y-%m-%dT%H-%M-%S".to_string()
}

fn default_file_format() -> String {
    "jpg".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/122.0.0.0 Safari/537.36"
        .to_string()
}

impl Default for CamlapseConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            timelapse_path: default_timelapse_path(),
            interval_seconds: default_interval_seconds(),
            timezone: default_timezone(),
            file_name_format: default_file_name_format(),
            file_format: default_file_format(),
            user_agent: default_user_agent(),
        }
    }
}

impl CamlapseConfig {
    /// Load configuration from the default file location plus environment
    pub fn load() -> Result<Self> {
        Self::load_from_file("camlapse.toml")
    }

    /// Load configuration from a specific file path plus environment
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("CAMLAPSE"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Location of the catalog database, fixed relative to the output root
    pub fn db_path(&self) -> PathBuf {
        self.output_path.join("camlapse.db")
    }

    /// Location a parallel migration process leaves its catalog at
    pub fn migration_db_path(&self) -> PathBuf {
        self.output_path.join("migration.db")
    }

    /// Captured frame file name for a timestamp, extension included
    pub fn frame_file_name(&self, timestamp: &chrono::DateTime<Tz>) -> String {
        format!(
            "{}.{}",
            timestamp.format(&self.file_name_format),
            self.file_format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let config = CamlapseConfig::default();
        assert_eq!(config.output_path, PathBuf::from("images"));
        assert_eq!(config.interval_seconds, 300);
        assert_eq!(config.timezone, chrono_tz::America::St_Johns);
        assert_eq!(config.file_format, "jpg");
    }

    #[test]
    fn test_db_path_is_under_output_root() {
        let config = CamlapseConfig {
            output_path: PathBuf::from("/srv/frames"),
            ..CamlapseConfig::default()
        };
        assert_eq!(config.db_path(), PathBuf::from("/srv/frames/camlapse.db"));
        assert_eq!(
            config.migration_db_path(),
            PathBuf::from("/srv/frames/migration.db")
        );
    }

    #[test]
    fn test_frame_file_name_uses_configured_format() {
        let config = CamlapseConfig::default();
        let ts = config
            .timezone
            .with_ymd_and_hms(2024, 1, 2, 10, 30, 0)
            .unwrap();
        assert_eq!(config.frame_file_name(&ts), "2024-01-02T10-30-00.jpg");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = CamlapseConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.file_name_format, "%Y-%m-%dT%H-%M-%S");
    }
}
