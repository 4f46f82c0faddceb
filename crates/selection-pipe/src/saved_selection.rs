//! Selections saved as linear offsets that follow document edits.

use crate::delta::{TextChange, TextDelta};
use crate::document::{Document, Position, Selection};

/// A selection remembered as two character offsets into one document.
///
/// The offsets must be updated with every edit the document commits, in commit order, via
/// [`SavedSelection::update_after_edit`] or [`SavedSelection::update_after_delta`]. Positions are
/// derived on demand from the document's current text.
///
/// An edit starting exactly at a tracked offset counts as being before it: the offset moves
/// past text inserted there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SavedSelection {
    anchor_offset: usize,
    active_offset: usize,
}

impl SavedSelection {
    /// A saved selection with the given offsets.
    pub fn new(anchor_offset: usize, active_offset: usize) -> Self {
        Self {
            anchor_offset,
            active_offset,
        }
    }

    /// Captures `selection` as offsets into `document`.
    pub fn create<D: Document + ?Sized>(document: &D, selection: &Selection) -> Self {
        Self::new(
            document.offset_at(selection.anchor),
            document.offset_at(selection.active),
        )
    }

    /// Offset of the fixed end.
    pub fn anchor_offset(&self) -> usize {
        self.anchor_offset
    }

    /// Offset of the moving end.
    pub fn active_offset(&self) -> usize {
        self.active_offset
    }

    /// `true` when the active end lies before the anchor.
    pub fn is_reversed(&self) -> bool {
        self.active_offset < self.anchor_offset
    }

    /// The anchor as a position in the document's current text.
    pub fn anchor<D: Document + ?Sized>(&self, document: &D) -> Position {
        document.position_at(self.anchor_offset)
    }

    /// The active end as a position in the document's current text.
    pub fn active<D: Document + ?Sized>(&self, document: &D) -> Position {
        document.position_at(self.active_offset)
    }

    /// The selection in the document's current text.
    pub fn selection<D: Document + ?Sized>(&self, document: &D) -> Selection {
        Selection::new(self.anchor(document), self.active(document))
    }

    /// Adjusts both offsets for one committed edit.
    pub fn update_after_edit(&mut self, change: TextChange) {
        let anchor = shift(self.anchor_offset, change);
        let active = shift(self.active_offset, change);
        tracing::trace!(
            "saved selection {}..{} -> {anchor}..{active} after {change:?}",
            self.anchor_offset,
            self.active_offset
        );
        self.anchor_offset = anchor;
        self.active_offset = active;
    }

    /// Adjusts both offsets for every edit of `delta`, in order.
    pub fn update_after_delta(&mut self, delta: &TextDelta) {
        for change in delta.changes() {
            self.update_after_edit(change);
        }
    }
}

fn shift(offset: usize, change: TextChange) -> usize {
    if change.range_offset <= offset {
        offset.saturating_add_signed(change.length_delta())
    } else {
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextDocument;

    #[test]
    fn test_insertion_before_both() {
        let mut saved = SavedSelection::new(5, 10);
        saved.update_after_edit(TextChange::insertion(2, 3));
        assert_eq!(saved, SavedSelection::new(8, 13));
    }

    #[test]
    fn test_edit_between_offsets() {
        let mut saved = SavedSelection::new(8, 13);
        saved.update_after_edit(TextChange::insertion(10, 2));
        assert_eq!(saved, SavedSelection::new(8, 15));

        let mut reversed = SavedSelection::new(13, 8);
        reversed.update_after_edit(TextChange::deletion(10, 2));
        assert_eq!(reversed, SavedSelection::new(11, 8));
        assert!(reversed.is_reversed());
    }

    #[test]
    fn test_edit_after_both_is_ignored() {
        let mut saved = SavedSelection::new(5, 10);
        saved.update_after_edit(TextChange::new(11, 4, 1));
        assert_eq!(saved, SavedSelection::new(5, 10));
    }

    #[test]
    fn test_edit_at_tracked_offset_shifts_it() {
        let mut saved = SavedSelection::new(5, 10);
        saved.update_after_edit(TextChange::insertion(5, 2));
        assert_eq!(saved, SavedSelection::new(7, 12));

        saved.update_after_edit(TextChange::insertion(12, 1));
        assert_eq!(saved, SavedSelection::new(7, 13));
    }

    #[test]
    fn test_deletion_spanning_offset_applies_net_delta() {
        let mut saved = SavedSelection::new(8, 13);
        saved.update_after_edit(TextChange::deletion(6, 4));
        assert_eq!(saved, SavedSelection::new(4, 9));
    }

    #[test]
    fn test_follows_document_notifications() {
        let mut document = TextDocument::new("one\ntwo\nthree");
        let selection = Selection::new(Position::new(1, 0), Position::new(1, 3));
        let mut saved = SavedSelection::create(&document, &selection);
        assert_eq!(saved, SavedSelection::new(4, 7));

        let delta = document
            .apply_edits(vec![
                crate::DocumentEdit::insert(Position::new(0, 0), "zero\n"),
                crate::DocumentEdit::insert(Position::new(2, 5), "!"),
            ])
            .unwrap();
        saved.update_after_delta(&delta);

        assert_eq!(
            saved.selection(&document),
            Selection::new(Position::new(2, 0), Position::new(2, 3))
        );
        assert_eq!(document.text_in(&saved.selection(&document)), "two");
    }
}
