use thiserror::Error;

use crate::shared::constants::TIME_EPSILON;
use crate::transcript::domain::transcript_segment::TranscriptSegment;

/// Half-open time range `[start, end)` in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SpanKind {
    /// Audio copied from the source track.
    Original,
    /// Audio taken from the synthesis result for this segment.
    Synthesized { segment_id: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimelineEntry {
    pub kind: SpanKind,
    /// Range in the original media this entry replaces or copies.
    pub source_span: TimeSpan,
    pub output_start: f64,
    pub output_end: f64,
}

impl TimelineEntry {
    pub fn output_duration(&self) -> f64 {
        self.output_end - self.output_start
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self.kind, SpanKind::Synthesized { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconciliationError {
    #[error("media duration must be finite and non-negative, got {0}")]
    InvalidMediaDuration(f64),
    #[error("measured duration {duration} for segment {segment_id} is not a finite, non-negative number")]
    InvalidDuration { segment_id: String, duration: f64 },
    #[error("measured duration supplied for unknown segment {0}")]
    UnknownSegment(String),
    #[error("timeline starts at {0}s instead of 0")]
    DoesNotStartAtZero(f64),
    #[error("timeline entry {index} starts at {found}s, expected {expected}s")]
    NonContiguous {
        index: usize,
        expected: f64,
        found: f64,
    },
    #[error("timeline entry {index} has a negative span")]
    NegativeSpan { index: usize },
    #[error("timeline entry {index} precedes the source span before it")]
    OutOfOrder { index: usize },
}

/// Output timeline after drift reconciliation, with the revised transcript.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconciledTimeline {
    entries: Vec<TimelineEntry>,
    segments: Vec<TranscriptSegment>,
    original_duration: f64,
}

impl ReconciledTimeline {
    pub fn new(
        entries: Vec<TimelineEntry>,
        segments: Vec<TranscriptSegment>,
        original_duration: f64,
    ) -> Self {
        Self {
            entries,
            segments,
            original_duration,
        }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Segments with their revised spans (and text, for edited segments).
    pub fn segments(&self) -> &[TranscriptSegment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<TranscriptSegment> {
        self.segments
    }

    pub fn original_duration(&self) -> f64 {
        self.original_duration
    }

    pub fn total_duration(&self) -> f64 {
        self.entries.last().map(|e| e.output_end).unwrap_or(0.0)
    }

    pub fn total_delta(&self) -> f64 {
        self.total_duration() - self.original_duration
    }

    pub fn synthesized_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_synthesized()).count()
    }

    /// True when every entry copies source audio in place.
    pub fn is_unchanged(&self) -> bool {
        self.entries.iter().all(|e| {
            e.kind == SpanKind::Original
                && (e.output_start - e.source_span.start).abs() <= TIME_EPSILON
        })
    }

    /// Checks the structural invariants: starts at 0, contiguous, no negative
    /// spans, source spans in original order.
    pub fn validate(&self) -> Result<(), ReconciliationError> {
        let Some(first) = self.entries.first() else {
            return Ok(());
        };
        if first.output_start.abs() > TIME_EPSILON {
            return Err(ReconciliationError::DoesNotStartAtZero(first.output_start));
        }

        let mut previous: Option<&TimelineEntry> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.output_end < entry.output_start - TIME_EPSILON
                || entry.source_span.end < entry.source_span.start - TIME_EPSILON
            {
                return Err(ReconciliationError::NegativeSpan { index });
            }
            if let Some(prev) = previous {
                if (entry.output_start - prev.output_end).abs() > TIME_EPSILON {
                    return Err(ReconciliationError::NonContiguous {
                        index,
                        expected: prev.output_end,
                        found: entry.output_start,
                    });
                }
                if entry.source_span.start < prev.source_span.end - TIME_EPSILON {
                    return Err(ReconciliationError::OutOfOrder { index });
                }
            }
            previous = Some(entry);
        }
        Ok(())
    }
}
