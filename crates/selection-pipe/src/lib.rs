#![warn(missing_docs)]
//! Selection Pipe - run every editor selection through a command
//!
//! # Overview
//!
//! `selection-pipe` takes the text of each selection in a document and a single command line,
//! runs the command once per selection and applies the results back: keep or drop selections,
//! replace their text, or insert before/after them. It is headless; the host editor plugs in
//! through the [`Document`] and [`Notifier`] traits.
//!
//! # Command Modes
//!
//! The first character of the command picks the mode:
//!
//! - `#sort -u` - **Shell**: one process per selection, selection text on stdin, trimmed
//!   stdout as the result. Processes run concurrently; results keep selection order.
//! - `/(\w+)@/$1 at /g` - **Substitution**: a regex replace with `m`, `i`, `g` flags. Without a
//!   replacement (`/\d+/`) it is a match test yielding `true`/`false`.
//! - anything else - **Expression**: a sandboxed JavaScript-style expression with `$` (the
//!   text), `i` (its index) and `$$` (every selection's text).
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  pipe() / apply()                           │  ← Filter, Ignore, Replace, Append, Prepend
//! ├─────────────────────────────────────────────┤
//! │  PipelineRunner                             │  ← Ordered fan-out per selection
//! ├──────────────┬──────────────┬───────────────┤
//! │  run_shell   │  Substitution│  Expression   │  ← Executors
//! ├──────────────┴──────────────┴───────────────┤
//! │  parse() / validate()                       │  ← Command grammar
//! └─────────────────────────────────────────────┘
//!   SavedSelection / Registers                     ← Offsets kept in sync with TextDelta
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use selection_pipe::{
//!     ApplyMode, Document, PipelineRunner, Position, Selection, Settings, TextDocument, pipe,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let mut document = TextDocument::new("alpha beta");
//! let mut selections = vec![
//!     Selection::new(Position::new(0, 0), Position::new(0, 5)),
//!     Selection::new(Position::new(0, 6), Position::new(0, 10)),
//! ];
//! let runner = PipelineRunner::new(Settings::new());
//! let mut errors: Vec<String> = Vec::new();
//!
//! let command = "`${i}:${$.toUpperCase()}`";
//! pipe(&runner, &mut document, &mut selections, command, ApplyMode::Replace, &mut errors)
//!     .await
//!     .unwrap();
//!
//! assert_eq!(document.text(), "0:ALPHA 1:BETA");
//! assert!(errors.is_empty());
//! # });
//! ```
//!
//! # Module Description
//!
//! - [`command`] - Command parsing and validation
//! - [`shell`] - Shell resolution and process execution
//! - [`expr`] - Sandboxed expression evaluation
//! - [`runner`] - Per-selection dispatch
//! - [`apply`] - Applying outcomes to selections and document
//! - [`saved_selection`] / [`registers`] - Offset tracking across edits
//! - [`document`] / [`delta`] - Document collaborator and edit notifications
//! - [`config`] - Settings and environment access

pub mod apply;
pub mod command;
pub mod config;
pub mod delta;
pub mod document;
pub mod error;
pub mod expr;
pub mod outcome;
pub mod registers;
pub mod runner;
pub mod saved_selection;
pub mod shell;

pub use apply::{ApplyEffect, ApplyMode, Notifier, apply, pipe};
pub use command::{ParsedCommand, RegexFlags, Substitution, parse, parse_checked, validate};
pub use config::{Environment, MapEnvironment, ProcessEnvironment, Settings};
pub use delta::{TextChange, TextDelta, TextDeltaEdit};
pub use document::{
    Document, DocumentChangeCallback, DocumentEdit, Position, Selection,
    TextDocument,
};
pub use error::{ApplyError, DocumentError, ParseError, SettingsError};
pub use expr::Expression;
pub use outcome::{Outcome, error_report};
pub use registers::Registers;
pub use runner::PipelineRunner;
pub use saved_selection::SavedSelection;
pub use shell::{Platform, ShellInvocation, resolve_shell, run_shell};
