use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecuritySystemError {
    #[error("execution exceeded its memory cap: peak {peak_bytes} bytes > cap {cap_bytes} bytes")]
    MemoryExceeded { peak_bytes: u64, cap_bytes: u64 },

    #[error("execution exceeded its wall-time cap of {cap_secs}s")]
    Timeout { cap_secs: u64 },

    #[error("security context '{0}' not found in active context map")]
    ContextNotFound(String),

    #[error("process supervision failed: {message}")]
    ProcessSupervisionFailed { message: String },
}

pub type Result<T> = std::result::Result<T, SecuritySystemError>;
