use crate::error::ValidationError;
use crate::types::{Segment, Sense};

/// Structural checks for a segment arriving from outside the engine.
pub fn segment(segment: &Segment) -> Result<(), ValidationError> {
    segment.segment_id()?;

    if segment.text.trim().is_empty() {
        return Err(ValidationError::EmptySegmentText {
            id: segment.id.clone(),
        });
    }

    let timing_ok = segment.start_time.is_finite()
        && segment.end_time.is_finite()
        && segment.start_time >= 0.0
        && segment.end_time > segment.start_time;
    if !timing_ok {
        return Err(ValidationError::InvalidTiming {
            id: segment.id.clone(),
            start: segment.start_time,
            end: segment.end_time,
        });
    }

    if let Some(index) = segment.tokens().iter().position(|t| t.text.is_empty()) {
        return Err(ValidationError::EmptyTokenText {
            id: segment.id.clone(),
            index,
        });
    }

    Ok(())
}

/// Validate every segment and check the collection is ordered by start time.
pub fn segments(segments: &[Segment]) -> Result<(), ValidationError> {
    for s in segments {
        segment(s)?;
    }
    match segments
        .windows(2)
        .find(|pair| pair[1].start_time < pair[0].start_time)
    {
        Some(pair) => Err(ValidationError::Unsorted {
            id: pair[1].id.clone(),
        }),
        None => Ok(()),
    }
}

pub fn sense(sense: &Sense) -> Result<(), ValidationError> {
    if sense.definition.trim().is_empty() {
        return Err(ValidationError::EmptyDefinition { id: sense.id });
    }
    Ok(())
}

/// Order segments by start time, the precondition of the timeline index.
pub fn sort_by_start(segments: &mut [Segment]) {
    segments.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}
