use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChapterSplitterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Not a readable PDF document ({path}): {reason}")]
    InputFormat { path: String, reason: String },

    #[error("Invalid granularity {value}: expected 1, 2 or 3")]
    InvalidGranularity { value: u8 },

    #[error("Invalid heading pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Export failed for chapter '{chapter}': {reason}")]
    Export { chapter: String, reason: String },

    #[error("Archive error: {reason}")]
    Archive { reason: String },

    #[error("Session error: {reason}")]
    Session { reason: String },

    #[error("Output directory error: {reason}")]
    OutputDirectory { reason: String },

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl From<zip::result::ZipError> for ChapterSplitterError {
    fn from(e: zip::result::ZipError) -> Self {
        ChapterSplitterError::Archive {
            reason: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChapterSplitterError>;
