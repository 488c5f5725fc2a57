use crate::types::Segment;

/// Index of the segment that is active at `time`.
///
/// A segment stays active until the next one starts, so this is the last
/// segment whose start is `<= time`. `segments` must already be sorted by
/// start time. Called on every playback tick, hence the binary search.
pub fn active_index(segments: &[Segment], time: f64) -> Option<usize> {
    if time.is_nan() {
        return None;
    }
    segments
        .partition_point(|s| s.start_time <= time)
        .checked_sub(1)
}

pub fn active_segment(segments: &[Segment], time: f64) -> Option<&Segment> {
    active_index(segments, time).map(|i| &segments[i])
}
