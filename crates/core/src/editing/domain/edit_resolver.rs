use std::collections::HashMap;

use thiserror::Error;

use super::edit_plan::{EditPlan, PlannedSegment};
use crate::transcript::domain::text_edit::{replace_range, verify_range, TextEdit, TranscriptError};
use crate::transcript::domain::transcript::find;
use crate::transcript::domain::transcript_segment::TranscriptSegment;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("edit targets unknown segment {0}")]
    UnknownSegment(String),
    #[error("segment {segment_id}: edits [{first_start}, {first_end}) and [{second_start}, {second_end}) overlap")]
    OverlappingEdits {
        segment_id: String,
        first_start: usize,
        first_end: usize,
        second_start: usize,
        second_end: usize,
    },
    #[error(transparent)]
    Text(#[from] TranscriptError),
}

/// Turns a raw batch of user edits into a conflict-free [`EditPlan`].
pub struct EditResolver;

impl EditResolver {
    /// Groups edits by segment, rejects unknown segments, overlapping ranges
    /// and stale text, then applies each group left to right.
    ///
    /// Edit indices are expressed against the original text. A running
    /// offset relocates each later edit after earlier substitutions change
    /// the text length.
    pub fn resolve(
        segments: &[TranscriptSegment],
        edits: &[TextEdit],
    ) -> Result<EditPlan, EditError> {
        let mut groups: HashMap<&str, Vec<&TextEdit>> = HashMap::new();
        for edit in edits {
            if find(segments, &edit.segment_id).is_none() {
                return Err(EditError::UnknownSegment(edit.segment_id.clone()));
            }
            groups.entry(edit.segment_id.as_str()).or_default().push(edit);
        }

        let mut entries = Vec::new();
        for segment in segments {
            let Some(group) = groups.get_mut(segment.id.as_str()) else {
                continue;
            };
            group.sort_by(|a, b| {
                (a.start_index, a.end_index, &a.old_text, &a.new_text).cmp(&(
                    b.start_index,
                    b.end_index,
                    &b.old_text,
                    &b.new_text,
                ))
            });
            group.dedup();

            check_overlaps(&segment.id, group)?;

            let new_text = apply_group(segment, group)?;
            if new_text == segment.text {
                log::debug!("Edits to segment {} cancel out, skipping", segment.id);
                continue;
            }
            entries.push(PlannedSegment {
                segment_id: segment.id.clone(),
                original_text: segment.text.clone(),
                new_text,
                edit_count: group.len(),
            });
        }

        Ok(EditPlan::new(entries))
    }
}

fn check_overlaps(segment_id: &str, sorted: &[&TextEdit]) -> Result<(), EditError> {
    for pair in sorted.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if first.end_index > second.start_index {
            return Err(EditError::OverlappingEdits {
                segment_id: segment_id.to_string(),
                first_start: first.start_index,
                first_end: first.end_index,
                second_start: second.start_index,
                second_end: second.end_index,
            });
        }
    }
    Ok(())
}

fn apply_group(segment: &TranscriptSegment, sorted: &[&TextEdit]) -> Result<String, EditError> {
    // Every edit is checked against the original snapshot before any is applied.
    for edit in sorted {
        verify_range(
            &segment.id,
            &segment.text,
            edit.start_index,
            edit.end_index,
            &edit.old_text,
        )?;
    }

    let mut text = segment.text.clone();
    let mut offset: isize = 0;
    for edit in sorted {
        let start = (edit.start_index as isize + offset) as usize;
        let end = (edit.end_index as isize + offset) as usize;
        text = replace_range(&segment.id, &text, start, end, &edit.old_text, &edit.new_text)?;
        offset += edit.length_delta();
    }
    Ok(text)
}
