use std::fmt;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// 1000-1099: Engine lifecycle errors
    MultipleGraphs = 1001,
    UpdateLocked = 1002,

    /// 1100-1199: Sketch/query errors
    OutOfQueries = 1101,
    NoGoodBucket = 1102,

    /// 1200-1299: Storage errors
    StorageIOError = 1201,
    BackupFailed = 1202,
    RestoreFailed = 1203,

    /// 1300-1399: Configuration/Validation errors
    InvalidConfiguration = 1301,
    InvalidEdge = 1302,

    /// 1900: Verification errors (test builds)
    VerificationFailed = 1901,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MultipleGraphs => "MULTIPLE_GRAPHS",
            ErrorCode::UpdateLocked => "UPDATE_LOCKED",
            ErrorCode::OutOfQueries => "OUT_OF_QUERIES",
            ErrorCode::NoGoodBucket => "NO_GOOD_BUCKET",
            ErrorCode::StorageIOError => "STORAGE_IO_ERROR",
            ErrorCode::BackupFailed => "BACKUP_FAILED",
            ErrorCode::RestoreFailed => "RESTORE_FAILED",
            ErrorCode::InvalidConfiguration => "INVALID_CONFIGURATION",
            ErrorCode::InvalidEdge => "INVALID_EDGE",
            ErrorCode::VerificationFailed => "VERIFICATION_FAILED",
        }
    }
}

#[derive(Debug, Clone)]
pub enum GraphError {
    /// A second live graph instance was attempted
    MultipleGraphs,
    /// Update submitted while a query holds the ingest lock
    UpdateLocked,
    /// Every sketch level of a supernode was consumed without convergence
    OutOfQueries,
    /// Sketch-level sampling failure surfaced from the primitive
    NoGoodBucket,
    /// Storage error with details
    StorageError { code: ErrorCode, message: String },
    /// Configuration error
    ConfigError { message: String },
    /// Update names a vertex outside `[0, n)` or a self-loop
    InvalidEdge { src: u64, dst: u64 },
    /// Sample verification failure (only produced by verifier builds)
    VerificationFailed { message: String },
}

impl GraphError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GraphError::MultipleGraphs => ErrorCode::MultipleGraphs,
            GraphError::UpdateLocked => ErrorCode::UpdateLocked,
            GraphError::OutOfQueries => ErrorCode::OutOfQueries,
            GraphError::NoGoodBucket => ErrorCode::NoGoodBucket,
            GraphError::StorageError { code, .. } => *code,
            GraphError::ConfigError { .. } => ErrorCode::InvalidConfiguration,
            GraphError::InvalidEdge { .. } => ErrorCode::InvalidEdge,
            GraphError::VerificationFailed { .. } => ErrorCode::VerificationFailed,
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::MultipleGraphs => {
                write!(f, "[{}] Only one graph may be open at a time", self.code().as_str())
            }
            GraphError::UpdateLocked => {
                write!(f, "[{}] Update rejected: a query is in progress", self.code().as_str())
            }
            GraphError::OutOfQueries => {
                write!(f, "[{}] Sketch bank exhausted before convergence", self.code().as_str())
            }
            GraphError::NoGoodBucket => {
                write!(f, "[{}] Sketch sample failed: no good bucket", self.code().as_str())
            }
            GraphError::StorageError { code, message } => {
                write!(f, "[{}] Storage error: {}", code.as_str(), message)
            }
            GraphError::ConfigError { message } => {
                write!(f, "[{}] Config error: {}", self.code().as_str(), message)
            }
            GraphError::InvalidEdge { src, dst } => {
                write!(f, "[{}] Invalid edge ({}, {})", self.code().as_str(), src, dst)
            }
            GraphError::VerificationFailed { message } => {
                write!(f, "[{}] Verification failed: {}", self.code().as_str(), message)
            }
        }
    }
}

impl std::error::Error for GraphError {}

pub type Result<T> = std::result::Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_stable() {
        assert_eq!(GraphError::MultipleGraphs.code() as u32, 1001);
        assert_eq!(GraphError::UpdateLocked.code() as u32, 1002);
        assert_eq!(GraphError::OutOfQueries.code() as u32, 1101);
        assert_eq!(GraphError::NoGoodBucket.code() as u32, 1102);
    }

    #[test]
    fn test_display_includes_code_name() {
        let err = GraphError::StorageError {
            code: ErrorCode::BackupFailed,
            message: "disk full".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("BACKUP_FAILED"));
        assert!(text.contains("disk full"));
    }
}
