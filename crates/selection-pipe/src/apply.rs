//! Applying pipeline outcomes to selections and to the document.
//!
//! [`apply`] consumes the outcomes of one run; [`pipe`] is the whole command: validate, read
//! the selections, run, apply.

use crate::command::parse_checked;
use crate::config::Environment;
use crate::delta::TextDelta;
use crate::document::{Document, DocumentEdit, Selection};
use crate::error::ApplyError;
use crate::outcome::{Outcome, error_report};
use crate::runner::PipelineRunner;
use serde::{Deserialize, Serialize};

/// What to do with the outcomes of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    /// Keep only the selections whose outcome is a value other than `"false"`.
    Filter,
    /// Run for side effects only.
    Ignore,
    /// Replace every selection's text with its outcome.
    Replace,
    /// Insert every outcome after its selection.
    Append,
    /// Insert every outcome before its selection.
    Prepend,
}

impl ApplyMode {
    /// Every mode, in command palette order.
    pub const ALL: [ApplyMode; 5] = [
        ApplyMode::Filter,
        ApplyMode::Ignore,
        ApplyMode::Replace,
        ApplyMode::Append,
        ApplyMode::Prepend,
    ];

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            ApplyMode::Filter => "filter",
            ApplyMode::Ignore => "ignore",
            ApplyMode::Replace => "replace",
            ApplyMode::Append => "append",
            ApplyMode::Prepend => "prepend",
        }
    }

    /// Whether the mode edits the document (and so aborts on any failure).
    pub fn edits_document(self) -> bool {
        matches!(
            self,
            ApplyMode::Replace | ApplyMode::Append | ApplyMode::Prepend
        )
    }

    /// Whether a substitution must carry a replacement part in this mode.
    pub fn needs_replacement(self) -> bool {
        self == ApplyMode::Replace
    }
}

/// The host's error notification channel.
pub trait Notifier {
    /// Show `message` to the user.
    fn show_error(&mut self, message: &str);
}

impl<F: FnMut(&str)> Notifier for F {
    fn show_error(&mut self, message: &str) {
        self(message)
    }
}

/// Collects shown messages, in order.
impl Notifier for Vec<String> {
    fn show_error(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// What [`apply`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyEffect {
    /// Filter ran. `kept` are the indices of the kept selections; when it is empty the
    /// selections were left unchanged.
    Filtered {
        /// Indices of the kept selections, ascending.
        kept: Vec<usize>,
    },
    /// Ignore ran; nothing changed.
    Ignored,
    /// The document was edited in one atomic step.
    Edited(TextDelta),
    /// A failure was reported, so the document was left untouched.
    Aborted,
}

/// Applies `outcomes` (index-aligned with `selections`) according to `mode`.
///
/// Failures are first reported through `notifier` as one aggregated message. Filter and
/// Ignore then proceed; Replace, Append and Prepend abort without touching the document.
pub fn apply<D: Document + ?Sized>(
    mode: ApplyMode,
    outcomes: &[Outcome],
    document: &mut D,
    selections: &mut Vec<Selection>,
    notifier: &mut dyn Notifier,
) -> Result<ApplyEffect, ApplyError> {
    if outcomes.len() != selections.len() {
        return Err(ApplyError::OutcomeCountMismatch {
            expected: selections.len(),
            actual: outcomes.len(),
        });
    }

    let report = error_report(outcomes);
    if let Some(message) = &report {
        notifier.show_error(message);
    }

    match mode {
        ApplyMode::Filter => {
            let kept: Vec<usize> = outcomes
                .iter()
                .enumerate()
                .filter(|(_, outcome)| outcome.as_value().is_some_and(|text| text != "false"))
                .map(|(index, _)| index)
                .collect();
            if !kept.is_empty() {
                let mut index = 0;
                selections.retain(|_| {
                    let keep = kept.binary_search(&index).is_ok();
                    index += 1;
                    keep
                });
            }
            tracing::debug!(
                "filter kept {} of {} selection(s)",
                kept.len(),
                outcomes.len()
            );
            Ok(ApplyEffect::Filtered { kept })
        }
        ApplyMode::Ignore => Ok(ApplyEffect::Ignored),
        _ if report.is_some() => {
            tracing::debug!("{} aborted after reported failure(s)", mode.name());
            Ok(ApplyEffect::Aborted)
        }
        ApplyMode::Replace | ApplyMode::Append | ApplyMode::Prepend => {
            let edits = selections
                .iter()
                .zip(outcomes)
                .filter_map(|(selection, outcome)| {
                    let text = outcome.as_value()?;
                    Some(match mode {
                        ApplyMode::Replace => DocumentEdit::replace(selection, text),
                        ApplyMode::Append => DocumentEdit::insert(selection.end(), text),
                        _ => DocumentEdit::insert(selection.start(), text),
                    })
                })
                .collect();
            let delta = document.apply_edits(edits)?;
            Ok(ApplyEffect::Edited(delta))
        }
    }
}

/// Runs `command` over `selections` of `document` and applies the result per `mode`.
///
/// The command is validated first (Replace requires a substitution to carry a replacement);
/// a parse error is shown through `notifier` and returned without running anything.
pub async fn pipe<D, E>(
    runner: &PipelineRunner<E>,
    document: &mut D,
    selections: &mut Vec<Selection>,
    command: &str,
    mode: ApplyMode,
    notifier: &mut dyn Notifier,
) -> Result<ApplyEffect, ApplyError>
where
    D: Document + ?Sized,
    E: Environment,
{
    let parsed = match parse_checked(command, mode.needs_replacement()) {
        Ok(parsed) => parsed,
        Err(err) => {
            notifier.show_error(&err.to_string());
            return Err(err.into());
        }
    };

    let inputs: Vec<String> = selections
        .iter()
        .map(|selection| document.text_in(selection))
        .collect();
    let outcomes = runner.run(&parsed, &inputs).await;
    apply(mode, &outcomes, document, selections, notifier)
}
