use sourcekit_core::{DispatchError, ErrorKind};
use thiserror::Error;

use crate::logger::LoggerError;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] sourcekit_core::ValidationError),

    #[error("usage error: {0}")]
    Usage(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Logger(#[from] LoggerError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Usage(_) | Self::Logger(_) => 2,
            Self::Dispatch(err) if err.kind() == ErrorKind::Validation => 2,
            Self::Dispatch(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sourcekit_core::ValidationError;

    #[test]
    fn exit_codes_follow_error_category() {
        assert_eq!(CliError::from(ValidationError::EmptyTaskType).exit_code(), 2);
        assert_eq!(
            CliError::from(DispatchError::new(ErrorKind::Validation, "bad params")).exit_code(),
            2
        );
        assert_eq!(
            CliError::from(DispatchError::new(ErrorKind::Connection, "refused")).exit_code(),
            3
        );
        assert_eq!(
            CliError::from(std::io::Error::other("closed pipe")).exit_code(),
            10
        );
    }
}
