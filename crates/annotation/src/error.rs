#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("token index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },
    #[error("token text is empty")]
    EmptyText,
    #[error("split offset {offset} invalid for token of length {len}")]
    InvalidOffset { offset: usize, len: usize },
    #[error("token range {start}..={end} invalid (len {len})")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("rebuild produced no tokens")]
    EmptyResult,
}

/// Structural violations found when checking a segment or sense that came
/// from outside the engine (parser output, persisted rows).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    SegmentId(#[from] crate::id::SegmentIdError),
    #[error("segment {id}: text is empty")]
    EmptySegmentText { id: String },
    #[error("segment {id}: invalid timing {start}..{end}")]
    InvalidTiming { id: String, start: f64, end: f64 },
    #[error("segment {id}: token {index} has empty text")]
    EmptyTokenText { id: String, index: usize },
    #[error("sense {id}: definition is empty")]
    EmptyDefinition { id: i64 },
    #[error("segments out of order at {id}")]
    Unsorted { id: String },
}

pub type Result<T> = std::result::Result<T, EditError>;
