//! Structured document edit notifications.
//!
//! Every committed document mutation is described by a [`TextDelta`]: an ordered list of
//! [`TextDeltaEdit`]s expressed in **character offsets** (Unicode scalar values). Consumers that
//! track positions (such as [`SavedSelection`](crate::SavedSelection)) replay the edits in order
//! instead of diffing old/new text.

/// The minimal shape of one edit notification: `(rangeOffset, rangeLength, insertedLength)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChange {
    /// Start character offset of the replaced range.
    pub range_offset: usize,
    /// Length in characters of the replaced range.
    pub range_length: usize,
    /// Length in characters of the inserted text.
    pub inserted_length: usize,
}

impl TextChange {
    /// Create a new change notification.
    pub fn new(range_offset: usize, range_length: usize, inserted_length: usize) -> Self {
        Self {
            range_offset,
            range_length,
            inserted_length,
        }
    }

    /// Pure insertion of `inserted_length` characters at `offset`.
    pub fn insertion(offset: usize, inserted_length: usize) -> Self {
        Self::new(offset, 0, inserted_length)
    }

    /// Pure deletion of `range_length` characters starting at `offset`.
    pub fn deletion(offset: usize, range_length: usize) -> Self {
        Self::new(offset, range_length, 0)
    }

    /// Signed change in document length caused by this edit.
    pub fn length_delta(&self) -> isize {
        self.inserted_length as isize - self.range_length as isize
    }
}

/// One rewritten range of a committed change.
///
/// `start` is valid in the document as it is when this edit is replayed, that is after every
/// earlier edit of the same [`TextDelta`]. The replaced range spans `deleted_text` (counted in
/// `char`s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDeltaEdit {
    /// Character offset where the replaced range begins.
    pub start: usize,
    /// Text removed from the document; empty for a pure insertion.
    pub deleted_text: String,
    /// Text written in its place; empty for a pure deletion.
    pub inserted_text: String,
}

impl TextDeltaEdit {
    /// Number of removed characters.
    pub fn deleted_len(&self) -> usize {
        self.deleted_text.chars().count()
    }

    /// Number of inserted characters.
    pub fn inserted_len(&self) -> usize {
        self.inserted_text.chars().count()
    }

    /// End of the replaced range (exclusive).
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.deleted_len())
    }

    /// The `(rangeOffset, rangeLength, insertedLength)` notification for this edit.
    pub fn change(&self) -> TextChange {
        TextChange::new(self.start, self.deleted_len(), self.inserted_len())
    }
}

/// Everything one committed `apply_edits` call did to the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDelta {
    /// Document length in characters before the change.
    pub before_char_count: usize,
    /// Document length in characters after the change.
    pub after_char_count: usize,
    /// Edits in replay order (descending offsets for a multi-range change).
    pub edits: Vec<TextDeltaEdit>,
    /// Document version after this change was committed.
    pub version: u64,
}

impl TextDelta {
    /// Iterate over the change notifications in commit order.
    pub fn changes(&self) -> impl Iterator<Item = TextChange> + '_ {
        self.edits.iter().map(TextDeltaEdit::change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_change_uses_char_lengths() {
        let edit = TextDeltaEdit {
            start: 3,
            deleted_text: "héé".to_string(),
            inserted_text: "x".to_string(),
        };

        assert_eq!(edit.end(), 6);
        assert_eq!(edit.change(), TextChange::new(3, 3, 1));
        assert_eq!(edit.change().length_delta(), -2);
    }
}
