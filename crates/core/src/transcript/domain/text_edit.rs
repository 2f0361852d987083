use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transcript_segment::TranscriptSegment;

/// A character-range substitution within one segment's text, captured
/// against the text the user saw when submitting it.
///
/// Indices count Unicode scalar values and form the half-open range
/// `[start_index, end_index)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    #[serde(alias = "transcriptId")]
    pub segment_id: String,
    pub old_text: String,
    pub new_text: String,
    pub start_index: usize,
    pub end_index: usize,
}

impl TextEdit {
    pub fn new(segment_id: &str, start_index: usize, end_index: usize, old: &str, new: &str) -> Self {
        Self {
            segment_id: segment_id.to_string(),
            old_text: old.to_string(),
            new_text: new.to_string(),
            start_index,
            end_index,
        }
    }

    /// Change in text length, in characters, once this edit is applied.
    pub fn length_delta(&self) -> isize {
        self.new_text.chars().count() as isize - self.end_index.saturating_sub(self.start_index) as isize
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranscriptError {
    #[error("segment {segment_id}: expected {expected:?} but live text is {found:?}")]
    TextMismatch {
        segment_id: String,
        expected: String,
        found: String,
    },
    #[error("segment {segment_id}: range [{start}, {end}) is invalid for text of {len} characters")]
    IndexOutOfRange {
        segment_id: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("edit for segment {found} applied to segment {expected}")]
    WrongSegment { expected: String, found: String },
}

/// Applies a single edit, producing a new segment version.
pub fn apply_edit(
    segment: &TranscriptSegment,
    edit: &TextEdit,
) -> Result<TranscriptSegment, TranscriptError> {
    if segment.id != edit.segment_id {
        return Err(TranscriptError::WrongSegment {
            expected: segment.id.clone(),
            found: edit.segment_id.clone(),
        });
    }
    let text = replace_range(
        &segment.id,
        &segment.text,
        edit.start_index,
        edit.end_index,
        &edit.old_text,
        &edit.new_text,
    )?;
    Ok(segment.with_text(text))
}

/// Checks that `text[start..end)` (in characters) equals `expected`.
pub fn verify_range(
    segment_id: &str,
    text: &str,
    start: usize,
    end: usize,
    expected: &str,
) -> Result<(), TranscriptError> {
    let (from, to) = byte_range(segment_id, text, start, end)?;
    let found = &text[from..to];
    if found != expected {
        return Err(TranscriptError::TextMismatch {
            segment_id: segment_id.to_string(),
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

/// Replaces the character range `[start, end)` of `text` with `replacement`
/// after verifying it currently reads `expected`.
pub fn replace_range(
    segment_id: &str,
    text: &str,
    start: usize,
    end: usize,
    expected: &str,
    replacement: &str,
) -> Result<String, TranscriptError> {
    verify_range(segment_id, text, start, end, expected)?;
    let (from, to) = byte_range(segment_id, text, start, end)?;

    let mut out = String::with_capacity(text.len() - (to - from) + replacement.len());
    out.push_str(&text[..from]);
    out.push_str(replacement);
    out.push_str(&text[to..]);
    Ok(out)
}

fn byte_range(
    segment_id: &str,
    text: &str,
    start: usize,
    end: usize,
) -> Result<(usize, usize), TranscriptError> {
    let out_of_range = || TranscriptError::IndexOutOfRange {
        segment_id: segment_id.to_string(),
        start,
        end,
        len: text.chars().count(),
    };
    if start > end {
        return Err(out_of_range());
    }
    let from = byte_offset(text, start).ok_or_else(out_of_range)?;
    let to = byte_offset(text, end).ok_or_else(out_of_range)?;
    Ok((from, to))
}

fn byte_offset(text: &str, char_index: usize) -> Option<usize> {
    text.char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .nth(char_index)
}
