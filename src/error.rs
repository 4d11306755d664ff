pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A named ROI, label, table, dataset or container does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The destination exists and overwriting was not requested.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// An array does not match the geometry it is written into.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// No ROI is available to select.
    #[error("no ROI available: {0}")]
    EmptySource(String),
    /// An ROI reaches outside the array it is applied to.
    #[error("out of bounds: {0}")]
    OutOfBounds(String),
    #[error("invalid ROI: {0}")]
    InvalidRoi(String),
    #[error("{0}")]
    General(String),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    pub fn wrap(error: impl std::error::Error + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }
}
