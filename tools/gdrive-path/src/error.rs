use thiserror::Error;

/// Coarse classification of an [`Error`], stable across context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    TypeMismatch,
    Transient,
    Invalid,
    Other,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Two or more siblings share a title. Needs manual cleanup on the drive.
    #[error("Duplicate object: {0}")]
    Duplicate(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Remote error: {message}")]
    Remote { status: Option<u16>, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Duplicate(_) => ErrorKind::Duplicate,
            Error::NotADirectory(_) | Error::IsADirectory(_) => ErrorKind::TypeMismatch,
            Error::Invalid(_) => ErrorKind::Invalid,
            Error::Remote {
                status: Some(500..=599),
                ..
            } => ErrorKind::Transient,
            Error::Context { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }

    /// True when the error (or the error it wraps) means the path does not exist.
    pub fn is_object_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for 5xx responses from the remote store.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    pub fn context(self, context: impl Into<String>) -> Error {
        Error::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Remote {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
