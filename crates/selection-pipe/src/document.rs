//! Document and selection collaborators.
//!
//! The pipeline never owns the editor's document. It talks to it through the [`Document`]
//! trait, which exposes exactly what is needed to read selections, convert between
//! structured positions and linear character offsets, and commit one atomic multi-range edit.
//!
//! [`TextDocument`] is a headless, rope-backed implementation used by the CLI and the tests.

use crate::delta::{TextDelta, TextDeltaEdit};
use crate::error::DocumentError;
use ropey::Rope;
use std::cmp::Ordering;

/// Position coordinates (line and column numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Zero-based logical line index.
    pub line: usize,
    /// Zero-based column in characters within the logical line.
    pub column: usize,
}

impl Position {
    /// Create a new logical position.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A selection, expressed as the fixed `anchor` and the moving `active` end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Selection {
    /// Fixed end of the selection.
    pub anchor: Position,
    /// Moving end of the selection (the caret).
    pub active: Position,
}

impl Selection {
    /// Create a selection from its anchor and active positions.
    pub fn new(anchor: Position, active: Position) -> Self {
        Self { anchor, active }
    }

    /// The smaller of the two ends.
    pub fn start(&self) -> Position {
        self.anchor.min(self.active)
    }

    /// The larger of the two ends.
    pub fn end(&self) -> Position {
        self.anchor.max(self.active)
    }
}

/// One range replacement inside an atomic multi-range edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEdit {
    /// Start of the replaced range.
    pub start: Position,
    /// End of the replaced range (may equal `start` for an insertion).
    pub end: Position,
    /// Replacement text.
    pub text: String,
}

impl DocumentEdit {
    /// Replace the text covered by `selection`.
    pub fn replace(selection: &Selection, text: impl Into<String>) -> Self {
        Self {
            start: selection.start(),
            end: selection.end(),
            text: text.into(),
        }
    }

    /// Insert `text` at `position`.
    pub fn insert(position: Position, text: impl Into<String>) -> Self {
        Self {
            start: position,
            end: position,
            text: text.into(),
        }
    }
}

/// The document surface consumed by the pipeline.
pub trait Document {
    /// Text covered by `selection`.
    fn text_in(&self, selection: &Selection) -> String;

    /// Convert a structured position into a linear character offset (clamped to the document).
    fn offset_at(&self, position: Position) -> usize;

    /// Convert a linear character offset into a structured position (clamped to the document).
    fn position_at(&self, offset: usize) -> Position;

    /// Apply every edit at once. Either all ranges are rewritten or none is.
    fn apply_edits(&mut self, edits: Vec<DocumentEdit>) -> Result<TextDelta, DocumentError>;
}

/// Document change callback function type
pub type DocumentChangeCallback = Box<dyn FnMut(&TextDelta) + Send>;

/// Headless rope-backed document.
pub struct TextDocument {
    rope: Rope,
    version: u64,
    callbacks: Vec<DocumentChangeCallback>,
}

impl TextDocument {
    /// Create a document holding `text`.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            version: 0,
            callbacks: Vec::new(),
        }
    }

    /// Full document text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Number of characters in the document.
    pub fn char_count(&self) -> usize {
        self.rope.len_chars()
    }

    /// Number of logical lines (a trailing line break opens an empty last line).
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Version number, incremented after each committed edit.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Subscribe to committed edits. Callbacks run in commit order, once per delta.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&TextDelta) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    fn line_len_without_break(&self, line: usize) -> usize {
        let slice = self.rope.line(line);
        let mut len = slice.len_chars();
        if len > 0 && is_line_break(slice.char(len - 1)) {
            len -= 1;
            if len > 0 && slice.char(len) == '\n' && slice.char(len - 1) == '\r' {
                len -= 1;
            }
        }
        len
    }

    fn notify_callbacks(&mut self, delta: &TextDelta) {
        for callback in &mut self.callbacks {
            callback(delta);
        }
    }
}

impl Default for TextDocument {
    fn default() -> Self {
        Self::new("")
    }
}

impl std::fmt::Debug for TextDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDocument")
            .field("char_count", &self.rope.len_chars())
            .field("version", &self.version)
            .field("subscribers", &self.callbacks.len())
            .finish()
    }
}

impl Document for TextDocument {
    fn text_in(&self, selection: &Selection) -> String {
        let start = self.offset_at(selection.start());
        let end = self.offset_at(selection.end());
        self.rope.slice(start..end).to_string()
    }

    fn offset_at(&self, position: Position) -> usize {
        let line_count = self.rope.len_lines();
        if position.line >= line_count {
            return self.rope.len_chars();
        }
        let line_start = self.rope.line_to_char(position.line);
        line_start + position.column.min(self.line_len_without_break(position.line))
    }

    fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.rope.len_chars());
        let line = self.rope.char_to_line(offset);
        let column = offset - self.rope.line_to_char(line);
        Position::new(line, column.min(self.line_len_without_break(line)))
    }

    fn apply_edits(&mut self, edits: Vec<DocumentEdit>) -> Result<TextDelta, DocumentError> {
        let before_char_count = self.rope.len_chars();

        // Ranges are resolved against the original text; the sort is stable so inserts at the
        // same offset keep their request order.
        let mut ops: Vec<(usize, usize, String)> = edits
            .into_iter()
            .map(|edit| {
                let a = self.offset_at(edit.start);
                let b = self.offset_at(edit.end);
                (a.min(b), a.max(b), edit.text)
            })
            .collect();
        ops.sort_by_key(|(start, end, _)| (*start, *end));

        for pair in ops.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);
            if second.0 < first.1 {
                return Err(DocumentError::OverlappingEdits {
                    first: first.0..first.1,
                    second: second.0..second.1,
                });
            }
        }

        if ops.is_empty() {
            return Ok(TextDelta {
                before_char_count,
                after_char_count: before_char_count,
                edits: Vec::new(),
                version: self.version,
            });
        }

        // Mutate in descending offset order so every edit's offsets stay valid both in the
        // original text and at the moment it is applied.
        let mut delta_edits: Vec<TextDeltaEdit> = Vec::with_capacity(ops.len());
        for (start, end, text) in ops.into_iter().rev() {
            let deleted_text = self.rope.slice(start..end).to_string();
            if end > start {
                self.rope.remove(start..end);
            }
            if !text.is_empty() {
                self.rope.insert(start, &text);
            }
            delta_edits.push(TextDeltaEdit {
                start,
                deleted_text,
                inserted_text: text,
            });
        }

        self.version += 1;
        let delta = TextDelta {
            before_char_count,
            after_char_count: self.rope.len_chars(),
            edits: delta_edits,
            version: self.version,
        };
        tracing::trace!(
            edits = delta.edits.len(),
            version = delta.version,
            "document edit committed"
        );
        self.notify_callbacks(&delta);
        Ok(delta)
    }
}

fn is_line_break(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}
