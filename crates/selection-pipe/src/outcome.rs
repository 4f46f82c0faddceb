//! Per-selection results and the aggregated error report.

/// What processing one selection produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The new text for the selection.
    Value(String),
    /// Processing failed; the message is shown to the user.
    Failure(String),
}

impl Outcome {
    /// A successful result.
    pub fn value(text: impl Into<String>) -> Self {
        Outcome::Value(text.into())
    }

    /// A failed result.
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(message.into())
    }

    /// Returns `true` for [`Outcome::Failure`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// The text of a successful result.
    pub fn as_value(&self) -> Option<&str> {
        match self {
            Outcome::Value(text) => Some(text),
            Outcome::Failure(_) => None,
        }
    }

    /// The message of a failed result.
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Failure(message) => Some(message),
        }
    }
}

/// Builds the single message reporting every failure in `outcomes`, or `None` if all succeeded.
///
/// One failure reads `Error running shell command: <message>.`; several are listed one per
/// line after `Errors running shell command:`.
pub fn error_report(outcomes: &[Outcome]) -> Option<String> {
    let errors: Vec<&str> = outcomes.iter().filter_map(Outcome::error).collect();
    match errors.as_slice() {
        [] => None,
        [single] => Some(format!("Error running shell command: {single}.")),
        many => {
            let mut report = String::from("Errors running shell command:");
            for message in many {
                report.push_str(&format!("\n- \"{message}\"."));
            }
            Some(report)
        }
    }
}
