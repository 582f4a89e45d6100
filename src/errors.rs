use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Archive transfer failed: {0}")]
    Transfer(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Fallback cache error: {0}")]
    Fallback(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What the orchestrator does when a given error kind reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fail the whole run with a non-zero exit.
    Abort,
    /// Abandon the primary path and try the fallback cache.
    DegradeToFallback,
    /// Log a warning and finish as a miss.
    WarnOnly,
}

impl RestoreError {
    pub fn disposition(&self) -> Disposition {
        match self {
            RestoreError::Config(_) => Disposition::Abort,
            RestoreError::NotFound(_)
            | RestoreError::Backend(_)
            | RestoreError::Transfer(_)
            | RestoreError::CorruptArchive(_)
            | RestoreError::Io(_) => Disposition::DegradeToFallback,
            RestoreError::Fallback(_) => Disposition::WarnOnly,
        }
    }
}

impl From<reqwest::Error> for RestoreError {
    fn from(err: reqwest::Error) -> Self {
        RestoreError::Transfer(err.to_string())
    }
}

impl From<walkdir::Error> for RestoreError {
    fn from(err: walkdir::Error) -> Self {
        RestoreError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_abort() {
        let err = RestoreError::Config("key is required".to_string());
        assert_eq!(err.disposition(), Disposition::Abort);
    }

    #[test]
    fn test_primary_path_errors_degrade() {
        let errors = vec![
            RestoreError::NotFound("k".to_string()),
            RestoreError::Backend("denied".to_string()),
            RestoreError::Transfer("reset".to_string()),
            RestoreError::CorruptArchive("bad gzip header".to_string()),
            RestoreError::Io(std::io::Error::other("disk full")),
        ];
        for err in errors {
            assert_eq!(err.disposition(), Disposition::DegradeToFallback, "{err}");
        }
    }

    #[test]
    fn test_fallback_errors_only_warn() {
        let err = RestoreError::Fallback("service unavailable".to_string());
        assert_eq!(err.disposition(), Disposition::WarnOnly);
    }
}
