use crate::transcript::domain::transcript_segment::TranscriptSegment;

/// The net text change for one segment after all of its edits are applied.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedSegment {
    pub segment_id: String,
    pub original_text: String,
    pub new_text: String,
    pub edit_count: usize,
}

/// Per-segment edit plan, in transcript order, at most one entry per segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditPlan {
    entries: Vec<PlannedSegment>,
}

impl EditPlan {
    pub fn new(entries: Vec<PlannedSegment>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlannedSegment] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, segment_id: &str) -> Option<&PlannedSegment> {
        self.entries.iter().find(|e| e.segment_id == segment_id)
    }

    /// Returns new segment versions carrying the planned text. Segments not
    /// in the plan are returned unchanged.
    pub fn apply_to(&self, segments: &[TranscriptSegment]) -> Vec<TranscriptSegment> {
        segments
            .iter()
            .map(|s| match self.get(&s.id) {
                Some(entry) => s.with_text(entry.new_text.clone()),
                None => s.clone(),
            })
            .collect()
    }
}
