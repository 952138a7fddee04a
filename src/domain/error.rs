//! Domain error types.

/// Failure categories used by [`crate::domain::recoverable`] to decide
/// whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// Configuration and construction defects. Never transient.
    Config,
    /// Lock protocol violations. Never transient.
    Lock,
    /// Internal logic defects. Never transient.
    Logic,
    /// Data access failures (file, network, database behind a port).
    Data,
    /// Filesystem I/O.
    Io,
}

/// Top-level error type for gridtrader.
#[derive(Debug, thiserror::Error)]
pub enum GridtraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("action '{action}' is missing required key '{key}'")]
    MissingActionKey { action: String, key: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("logic error: {reason}")]
    LogicError { reason: String },

    #[error("lock violation on {price}: {attempted} by '{holder}' while held by '{held_by}'")]
    LockViolation {
        price: String,
        attempted: String,
        holder: String,
        held_by: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GridtraderError {
    /// Category used by the retry wrapper's allowlist.
    pub fn category(&self) -> FailureCategory {
        match self {
            GridtraderError::ConfigParse { .. }
            | GridtraderError::ConfigMissing { .. }
            | GridtraderError::ConfigInvalid { .. }
            | GridtraderError::MissingActionKey { .. }
            | GridtraderError::InvalidArgument { .. } => FailureCategory::Config,
            GridtraderError::LockViolation { .. } => FailureCategory::Lock,
            GridtraderError::LogicError { .. } => FailureCategory::Logic,
            GridtraderError::Data { .. } => FailureCategory::Data,
            GridtraderError::Io(_) => FailureCategory::Io,
        }
    }
}

impl From<&GridtraderError> for std::process::ExitCode {
    fn from(err: &GridtraderError) -> Self {
        let code: u8 = match err {
            GridtraderError::Io(_) => 1,
            GridtraderError::ConfigParse { .. }
            | GridtraderError::ConfigMissing { .. }
            | GridtraderError::ConfigInvalid { .. }
            | GridtraderError::MissingActionKey { .. }
            | GridtraderError::InvalidArgument { .. } => 2,
            GridtraderError::Data { .. } => 3,
            GridtraderError::LockViolation { .. } | GridtraderError::LogicError { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
