//! Achievement-specific errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or validating achievements
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AchievementError {
    #[error("Failed to read achievements file {path}: {message}")]
    ReadFailed { path: PathBuf, message: String },

    #[error("Failed to parse achievements TOML: {0}")]
    ParseError(String),

    #[error("Achievement definition #{index} could not be parsed: {message}")]
    UnparseableEntry { index: usize, message: String },

    #[error("Achievement '{id}' is malformed: {message}")]
    Malformed { id: String, message: String },

    #[error("Achievement '{0}' is defined more than once")]
    DuplicateId(String),
}

impl AchievementError {
    pub fn malformed(id: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = AchievementError> = std::result::Result<T, E>;
