//! Runs a parsed command over the text of every selection.

use crate::command::ParsedCommand;
use crate::config::{Environment, ProcessEnvironment, Settings};
use crate::outcome::Outcome;
use crate::shell::{Platform, resolve_shell, run_shell};
use futures::future::join_all;
use tracing::Instrument;

/// Dispatches a [`ParsedCommand`] to the matching executor.
///
/// The returned outcomes are always index-aligned with the inputs. Shell commands run
/// concurrently, one process per input; substitutions and expressions run sequentially in
/// index order.
#[derive(Debug, Clone)]
pub struct PipelineRunner<E = ProcessEnvironment> {
    settings: Settings,
    env: E,
    platform: Platform,
}

impl PipelineRunner {
    /// A runner reading shell configuration from `settings` and the process environment.
    pub fn new(settings: Settings) -> Self {
        Self::with_environment(settings, ProcessEnvironment)
    }
}

impl Default for PipelineRunner {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl<E: Environment> PipelineRunner<E> {
    /// A runner with an explicit environment.
    pub fn with_environment(settings: Settings, env: E) -> Self {
        Self {
            settings,
            env,
            platform: Platform::current(),
        }
    }

    /// Overrides the detected platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The shell a shell command would run with right now.
    pub fn resolve_shell(&self) -> Option<String> {
        resolve_shell(self.platform, &self.settings, &self.env)
    }

    /// Produces one outcome per input, in input order.
    pub async fn run(&self, command: &ParsedCommand, inputs: &[String]) -> Vec<Outcome> {
        tracing::debug!(
            "running {} command over {} selection(s)",
            command.mode_name(),
            inputs.len()
        );

        match command {
            ParsedCommand::Shell { command } => {
                let shell = self.resolve_shell();
                let runs = inputs.iter().enumerate().map(|(index, input)| {
                    run_shell(command, input, shell.as_deref())
                        .instrument(tracing::debug_span!("selection", index))
                });
                join_all(runs).await
            }
            ParsedCommand::Substitution(substitution) => inputs
                .iter()
                .map(|input| Outcome::Value(substitution.substitute(input)))
                .collect(),
            ParsedCommand::Expression(expression) => expression.evaluate_all(inputs),
        }
    }
}
