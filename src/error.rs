use chrono::DateTime;
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamlapseError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Timestamp parse error: {0}")]
    TimestampParse(#[from] chrono::ParseError),

    #[error("No image recorded for camera '{camera}' at {timestamp}")]
    ImageNotFound {
        camera: String,
        timestamp: DateTime<Tz>,
    },

    #[error("No captures for camera '{camera}' between {from} and {to}")]
    EmptyRange {
        camera: String,
        from: DateTime<Tz>,
        to: DateTime<Tz>,
    },

    #[error("Frame selector left none of the {candidates} captured frames for camera '{camera}'")]
    SelectorEmptied { camera: String, candidates: usize },

    #[error("Encoder failed for camera '{camera}': {stderr}")]
    Encoding { camera: String, stderr: String },

    #[error("Stream resolution failed for camera '{camera}': {message}")]
    StreamResolution { camera: String, message: String },

    #[error("Catalog row carries an out-of-range timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl CamlapseError {
    pub fn stream_resolution<C: Into<String>, M: Into<String>>(camera: C, message: M) -> Self {
        Self::StreamResolution {
            camera: camera.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CamlapseError>;
