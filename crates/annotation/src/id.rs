use std::fmt;
use std::str::FromStr;

/// Wire identifier of a segment: `<mediaId>_<ordinal>`.
///
/// Media ids may themselves contain underscores, so parsing always splits on
/// the **last** one. The ordinal is rendered without zero padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId {
    pub media_id: String,
    pub ordinal: u32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentIdError {
    #[error("segment id {0:?} has no '_' separator")]
    MissingSeparator(String),
    #[error("segment id {0:?} has an empty media id")]
    EmptyMediaId(String),
    #[error("segment id {0:?} has an invalid ordinal")]
    InvalidOrdinal(String),
}

impl SegmentId {
    pub fn new(media_id: impl Into<String>, ordinal: u32) -> Self {
        Self {
            media_id: media_id.into(),
            ordinal,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SegmentIdError> {
        let (media_id, ordinal) = raw
            .rsplit_once('_')
            .ok_or_else(|| SegmentIdError::MissingSeparator(raw.to_string()))?;

        if media_id.is_empty() {
            return Err(SegmentIdError::EmptyMediaId(raw.to_string()));
        }

        let well_formed = !ordinal.is_empty()
            && ordinal.bytes().all(|b| b.is_ascii_digit())
            && (ordinal == "0" || !ordinal.starts_with('0'));
        if !well_formed {
            return Err(SegmentIdError::InvalidOrdinal(raw.to_string()));
        }

        let ordinal = ordinal
            .parse()
            .map_err(|_| SegmentIdError::InvalidOrdinal(raw.to_string()))?;

        Ok(Self {
            media_id: media_id.to_string(),
            ordinal,
        })
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.media_id, self.ordinal)
    }
}

impl FromStr for SegmentId {
    type Err = SegmentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
