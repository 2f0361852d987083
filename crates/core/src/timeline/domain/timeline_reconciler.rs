use std::collections::HashMap;

use super::reconciled_timeline::{
    ReconciledTimeline, ReconciliationError, SpanKind, TimeSpan, TimelineEntry,
};
use crate::shared::constants::TIME_EPSILON;
use crate::transcript::domain::transcript::find;
use crate::transcript::domain::transcript_segment::TranscriptSegment;

/// Lays out the output timeline when edited segments change length.
///
/// Later content shifts forward (or back) by the accumulated drift. Silence
/// and unedited speech keep their original durations; an edited segment
/// occupies exactly its measured synthesis duration.
pub struct TimelineReconciler;

impl TimelineReconciler {
    /// `measured` maps edited segment ids to the duration of their new audio.
    /// `segments` must already satisfy the transcript invariants.
    pub fn reconcile(
        segments: &[TranscriptSegment],
        media_duration: f64,
        measured: &HashMap<String, f64>,
    ) -> Result<ReconciledTimeline, ReconciliationError> {
        if !media_duration.is_finite() || media_duration < 0.0 {
            return Err(ReconciliationError::InvalidMediaDuration(media_duration));
        }
        for (segment_id, &duration) in measured {
            if find(segments, segment_id).is_none() {
                return Err(ReconciliationError::UnknownSegment(segment_id.clone()));
            }
            if !duration.is_finite() || duration < 0.0 {
                return Err(ReconciliationError::InvalidDuration {
                    segment_id: segment_id.clone(),
                    duration,
                });
            }
        }

        let mut layout = Layout::default();
        let mut revised = Vec::with_capacity(segments.len());
        let mut source_cursor = 0.0;

        for segment in segments {
            if segment.start_time > source_cursor + TIME_EPSILON {
                layout.push_original(TimeSpan::new(source_cursor, segment.start_time));
            }

            let source = TimeSpan::new(segment.start_time, segment.end_time);
            let output_start = layout.cursor;
            match measured.get(&segment.id) {
                Some(&duration) => {
                    layout.push(
                        SpanKind::Synthesized {
                            segment_id: segment.id.clone(),
                        },
                        source,
                        duration,
                    );
                    revised.push(segment.with_span(output_start, output_start + duration));
                }
                None => {
                    if source.duration() > TIME_EPSILON {
                        layout.push_original(source);
                    }
                    revised.push(segment.with_span(output_start, output_start + source.duration()));
                }
            }
            source_cursor = source_cursor.max(segment.end_time);
        }

        if media_duration > source_cursor + TIME_EPSILON {
            layout.push_original(TimeSpan::new(source_cursor, media_duration));
        }

        let timeline = ReconciledTimeline::new(layout.entries, revised, media_duration);
        timeline.validate()?;

        log::debug!(
            "Reconciled {} entries ({} synthesized), total {:.3}s ({:+.3}s)",
            timeline.entries().len(),
            timeline.synthesized_count(),
            timeline.total_duration(),
            timeline.total_delta()
        );
        Ok(timeline)
    }
}

/// Output cursor. Each entry starts exactly where the previous one ended.
#[derive(Default)]
struct Layout {
    entries: Vec<TimelineEntry>,
    cursor: f64,
}

impl Layout {
    fn push_original(&mut self, source: TimeSpan) {
        self.push(SpanKind::Original, source, source.duration());
    }

    fn push(&mut self, kind: SpanKind, source_span: TimeSpan, duration: f64) {
        let output_start = self.cursor;
        let output_end = output_start + duration;
        self.entries.push(TimelineEntry {
            kind,
            source_span,
            output_start,
            output_end,
        });
        self.cursor = output_end;
    }
}
