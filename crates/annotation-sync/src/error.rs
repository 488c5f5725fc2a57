use subtag_annotation::{EditError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RecordKind {
    Segment,
    Sense,
}

/// Failure of (or inside) a call to the persistence service.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("{operation} returned no row")]
    MissingRow { operation: &'static str },
    #[error("{operation} returned a malformed row: {reason}")]
    MalformedRow {
        operation: &'static str,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: String },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("segment {id} does not belong to media {media_id}")]
    ForeignSegment { id: String, media_id: String },
    #[error("write task ended before reporting a result")]
    WriteAbandoned,
    #[error("no segment is active")]
    NoActiveSegment,
}

impl Error {
    pub fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
