use crate::id::{SegmentId, SegmentIdError};

pub type SenseId = i64;

/// One word-level unit of a segment. Identity for edits is the position in
/// the owning token list, never the text.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sense_id: Option<SenseId>,
}

impl Token {
    pub fn untagged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sense_id: None,
        }
    }

    pub fn tagged(text: impl Into<String>, sense_id: SenseId) -> Self {
        Self {
            text: text.into(),
            sense_id: Some(sense_id),
        }
    }

    pub fn is_tagged(&self) -> bool {
        self.sense_id.is_some()
    }
}

/// One timed subtitle line.
///
/// `tokens` is `None` until the line has been tokenized. Token lists are
/// normalized on deserialization, so both the legacy flat-string shape and
/// the record shape are accepted; serialization always emits records.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::token::deserialize_tokens"
    )]
    pub tokens: Option<Vec<Token>>,
}

impl Segment {
    pub fn new(id: &SegmentId, text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            id: id.to_string(),
            text: text.into(),
            start_time,
            end_time,
            tokens: None,
        }
    }

    pub fn segment_id(&self) -> Result<SegmentId, SegmentIdError> {
        SegmentId::parse(&self.id)
    }

    /// Token list, empty when the segment is not tokenized yet.
    pub fn tokens(&self) -> &[Token] {
        self.tokens.as_deref().unwrap_or_default()
    }

    pub fn is_tokenized(&self) -> bool {
        self.tokens.is_some()
    }

    /// Every token carries a sense. Vacuously true for zero tokens.
    pub fn is_complete(&self) -> bool {
        crate::navigation::is_fully_tagged(self.tokens())
    }

    pub fn with_tokens(&self, tokens: Vec<Token>) -> Self {
        Self {
            tokens: Some(tokens),
            ..self.clone()
        }
    }

    pub fn apply_update(&self, update: &SegmentUpdate) -> Self {
        match update {
            SegmentUpdate::Text { text } => Self {
                text: text.clone(),
                ..self.clone()
            },
            SegmentUpdate::Timing {
                start_time,
                end_time,
            } => Self {
                start_time: *start_time,
                end_time: *end_time,
                ..self.clone()
            },
            SegmentUpdate::Tokens { tokens } => self.with_tokens(tokens.clone()),
        }
    }
}

/// Partial update of a single segment. The persistence service accepts
/// exactly one of these shapes per call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum SegmentUpdate {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Timing { start_time: f64, end_time: f64 },
    Tokens {
        #[serde(deserialize_with = "crate::token::deserialize_token_list")]
        tokens: Vec<Token>,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct Sense {
    pub id: SenseId,
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub owner_word: String,
}

impl Sense {
    pub fn apply_patch(&self, patch: &SensePatch) -> Self {
        Self {
            id: self.id,
            definition: patch
                .definition
                .clone()
                .unwrap_or_else(|| self.definition.clone()),
            source: patch.source.clone().or_else(|| self.source.clone()),
            label: patch.label.clone().or_else(|| self.label.clone()),
            owner_word: self.owner_word.clone(),
        }
    }
}

/// A sense that has not been assigned an id by the store yet.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct NewSense {
    pub definition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub owner_word: String,
}

impl NewSense {
    pub fn into_sense(self, id: SenseId) -> Sense {
        Sense {
            id,
            definition: self.definition,
            source: self.source,
            label: self.label,
            owner_word: self.owner_word,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub struct SensePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}
