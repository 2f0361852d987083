use std::collections::HashSet;

use thiserror::Error;

use super::transcript_segment::TranscriptSegment;
use crate::shared::constants::{MEDIA_BOUNDS_TOLERANCE, TIME_EPSILON};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidTranscript {
    #[error("media duration must be a finite, non-negative number of seconds, got {0}")]
    InvalidMediaDuration(f64),
    #[error("segment {id} has an invalid span [{start}, {end})")]
    InvalidSpan { id: String, start: f64, end: f64 },
    #[error("segment {id} ends at {end}s, past the media duration of {media_duration}s")]
    OutOfBounds {
        id: String,
        end: f64,
        media_duration: f64,
    },
    #[error("segment {id} starts before the segment preceding it")]
    Unsorted { id: String },
    #[error("segment {next} overlaps segment {previous}")]
    Overlap { previous: String, next: String },
    #[error("segment id {0} appears more than once")]
    DuplicateId(String),
}

/// Checks the ordering invariants every other component relies on:
/// finite spans inside `[0, media_duration]`, sorted by start time,
/// non-overlapping, with unique ids.
pub fn validate(
    segments: &[TranscriptSegment],
    media_duration: f64,
) -> Result<(), InvalidTranscript> {
    if !media_duration.is_finite() || media_duration < 0.0 {
        return Err(InvalidTranscript::InvalidMediaDuration(media_duration));
    }

    let mut seen = HashSet::new();
    let mut previous: Option<&TranscriptSegment> = None;

    for segment in segments {
        if !seen.insert(segment.id.as_str()) {
            return Err(InvalidTranscript::DuplicateId(segment.id.clone()));
        }

        let (start, end) = (segment.start_time, segment.end_time);
        if !start.is_finite() || !end.is_finite() || start < 0.0 || end < start {
            return Err(InvalidTranscript::InvalidSpan {
                id: segment.id.clone(),
                start,
                end,
            });
        }

        if end > media_duration + MEDIA_BOUNDS_TOLERANCE {
            return Err(InvalidTranscript::OutOfBounds {
                id: segment.id.clone(),
                end,
                media_duration,
            });
        }

        if let Some(prev) = previous {
            if start < prev.start_time {
                return Err(InvalidTranscript::Unsorted {
                    id: segment.id.clone(),
                });
            }
            if start < prev.end_time - TIME_EPSILON {
                return Err(InvalidTranscript::Overlap {
                    previous: prev.id.clone(),
                    next: segment.id.clone(),
                });
            }
        }
        previous = Some(segment);
    }

    Ok(())
}

/// Looks up a segment by id.
pub fn find<'a>(segments: &'a [TranscriptSegment], id: &str) -> Option<&'a TranscriptSegment> {
    segments.iter().find(|s| s.id == id)
}
