//! Named registers of saved selections.

use crate::delta::{TextChange, TextDelta};
use crate::document::{Document, Selection};
use crate::saved_selection::SavedSelection;
use std::collections::BTreeMap;

/// Saved selection sets of one document, by register name.
///
/// A register owns its saved selections; saving over a register or clearing it drops them.
/// Feed every edit of the document to [`Registers::update_after_delta`] so restored selections
/// stay on the same text.
///
/// # Example
///
/// ```rust
/// use std::sync::{Arc, Mutex};
/// use selection_pipe::{Document, DocumentEdit, Position, Registers, Selection, TextDocument};
///
/// let mut document = TextDocument::new("alpha beta");
/// let registers = Arc::new(Mutex::new(Registers::new()));
///
/// let beta = Selection::new(Position::new(0, 6), Position::new(0, 10));
/// registers.lock().unwrap().save("a", &document, &[beta]);
///
/// let tracked = registers.clone();
/// document.subscribe(move |delta| tracked.lock().unwrap().update_after_delta(delta));
/// document
///     .apply_edits(vec![DocumentEdit::insert(Position::new(0, 0), ">> ")])
///     .unwrap();
///
/// let restored = registers.lock().unwrap().restore("a", &document).unwrap();
/// assert_eq!(document.text_in(&restored[0]), "beta");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registers {
    registers: BTreeMap<String, Vec<SavedSelection>>,
}

impl Registers {
    /// No registers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves `selections` under `name`, replacing what the register held.
    pub fn save<D: Document + ?Sized>(
        &mut self,
        name: impl Into<String>,
        document: &D,
        selections: &[Selection],
    ) {
        let name = name.into();
        let saved: Vec<SavedSelection> = selections
            .iter()
            .map(|selection| SavedSelection::create(document, selection))
            .collect();
        tracing::debug!("saving {} selection(s) to register '{name}'", saved.len());
        self.registers.insert(name, saved);
    }

    /// The saved selections of a register.
    pub fn get(&self, name: &str) -> Option<&[SavedSelection]> {
        self.registers.get(name).map(Vec::as_slice)
    }

    /// The selections of a register, derived from the document's current text.
    pub fn restore<D: Document + ?Sized>(
        &self,
        name: &str,
        document: &D,
    ) -> Option<Vec<Selection>> {
        self.get(name).map(|saved| {
            saved
                .iter()
                .map(|selection| selection.selection(document))
                .collect()
        })
    }

    /// Drops a register. Returns `true` if it existed.
    pub fn clear(&mut self, name: &str) -> bool {
        self.registers.remove(name).is_some()
    }

    /// Drops every register.
    pub fn clear_all(&mut self) {
        self.registers.clear();
    }

    /// Register names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.registers.keys().map(String::as_str)
    }

    /// Number of registers.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Returns `true` if no register is set.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Forwards one edit to every saved selection.
    pub fn update_after_edit(&mut self, change: TextChange) {
        for saved in self.registers.values_mut().flatten() {
            saved.update_after_edit(change);
        }
    }

    /// Forwards every edit of `delta`, in order, to every saved selection.
    pub fn update_after_delta(&mut self, delta: &TextDelta) {
        for change in delta.changes() {
            self.update_after_edit(change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentEdit, Position, TextDocument};

    fn word(column: usize, len: usize) -> Selection {
        Selection::new(Position::new(0, column), Position::new(0, column + len))
    }

    #[test]
    fn test_save_replaces_and_clear_drops() {
        let document = TextDocument::new("one two three");
        let mut registers = Registers::new();

        registers.save("x", &document, &[word(0, 3), word(4, 3)]);
        assert_eq!(registers.get("x").map(<[_]>::len), Some(2));

        registers.save("x", &document, &[word(8, 5)]);
        assert_eq!(registers.get("x"), Some(&[SavedSelection::new(8, 13)][..]));

        assert!(registers.clear("x"));
        assert!(!registers.clear("x"));
        assert!(registers.restore("x", &document).is_none());
    }

    #[test]
    fn test_clear_all_stops_tracking() {
        let mut document = TextDocument::new("one two");
        let mut registers = Registers::new();
        registers.save("a", &document, &[word(0, 3)]);
        registers.save("b", &document, &[word(4, 3)]);
        assert_eq!(registers.len(), 2);

        registers.clear_all();
        assert!(registers.is_empty());

        let delta = document
            .apply_edits(vec![DocumentEdit::insert(Position::new(0, 0), ">")])
            .unwrap();
        registers.update_after_delta(&delta);
        assert!(registers.restore("a", &document).is_none());
        assert_eq!(registers.names().count(), 0);
    }

    #[test]
    fn test_registers_follow_edits_independently() {
        let mut document = TextDocument::new("one two three");
        let mut registers = Registers::new();
        registers.save("a", &document, &[word(4, 3)]);
        registers.save("b", &document, &[word(8, 5)]);

        let delta = document
            .apply_edits(vec![
                DocumentEdit::replace(&word(0, 3), "1"),
                DocumentEdit::replace(&word(4, 3), "2"),
            ])
            .unwrap();
        registers.update_after_delta(&delta);

        assert_eq!(document.text(), "1 2 three");
        let b = registers.restore("b", &document).unwrap();
        assert_eq!(document.text_in(&b[0]), "three");
        assert_eq!(registers.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
