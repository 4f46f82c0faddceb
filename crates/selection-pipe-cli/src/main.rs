use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use regex::Regex;
use selection_pipe::{
    ApplyEffect, ApplyError, ApplyMode, Document, PipelineRunner, Position, Selection, Settings,
    TextDocument, pipe, validate,
};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[clap(version, about)]
struct CommandLineArgs {
    #[arg(
        short = 'f',
        long = "file",
        help = "Read the document from this file instead of stdin"
    )]
    file: Option<PathBuf>,

    #[arg(
        short = 's',
        long = "select",
        conflicts_with = "lines",
        help = "Select every match of this regular expression"
    )]
    select: Option<String>,

    #[arg(short = 'l', long = "lines", help = "Select every line")]
    lines: bool,

    #[arg(
        short = 'm',
        long = "mode",
        value_enum,
        default_value_t = Mode::Replace,
        help = "What to do with the results"
    )]
    mode: Mode,

    #[arg(
        long = "settings",
        help = "JSON settings file used to resolve the shell"
    )]
    settings: Option<PathBuf>,

    #[arg(long = "validate", help = "Only check that the command is well formed")]
    validate: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Log pipeline activity to stderr"
    )]
    verbose: bool,

    #[arg(
        allow_hyphen_values = true,
        help = "Pipe command: `#shell command`, `/regex/replacement/flags` or an expression"
    )]
    command: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
enum Mode {
    #[clap(name = "filter")]
    Filter,
    #[clap(name = "ignore")]
    Ignore,
    #[clap(name = "replace")]
    Replace,
    #[clap(name = "append")]
    Append,
    #[clap(name = "prepend")]
    Prepend,
}

impl From<Mode> for ApplyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Filter => ApplyMode::Filter,
            Mode::Ignore => ApplyMode::Ignore,
            Mode::Replace => ApplyMode::Replace,
            Mode::Append => ApplyMode::Append,
            Mode::Prepend => ApplyMode::Prepend,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = CommandLineArgs::parse();
    init_tracing(args.verbose)?;

    let mode = ApplyMode::from(args.mode);
    if args.validate {
        return Ok(match validate(&args.command, mode.needs_replacement()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("{err}");
                ExitCode::FAILURE
            }
        });
    }

    let text = read_document(args.file.as_deref())?;
    let mut document = TextDocument::new(&text);
    let mut selections = match &args.select {
        Some(pattern) => {
            let regex = Regex::new(pattern)
                .with_context(|| format!("invalid selection pattern {pattern:?}"))?;
            match_selections(&document, &text, &regex)
        }
        None if args.lines => line_selections(&document, &text),
        None => vec![whole_selection(&document)],
    };
    tracing::debug!("{} selection(s), mode {}", selections.len(), mode.name());

    let settings = match &args.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::new(),
    };
    let runner = PipelineRunner::new(settings);
    let inputs: Vec<String> = selections
        .iter()
        .map(|selection| document.text_in(selection))
        .collect();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let mut errors: Vec<String> = Vec::new();
    let result = runtime.block_on(pipe(
        &runner,
        &mut document,
        &mut selections,
        &args.command,
        mode,
        &mut errors,
    ));

    for message in &errors {
        eprintln!("{message}");
    }
    let effect = match result {
        Ok(effect) => effect,
        // Already shown through the notifier.
        Err(ApplyError::Parse(_)) => return Ok(ExitCode::FAILURE),
        Err(err) => return Err(err.into()),
    };

    match effect {
        ApplyEffect::Filtered { kept } => {
            for index in kept {
                println!("{}", inputs[index]);
            }
        }
        ApplyEffect::Edited(_) => print!("{}", document.text()),
        ApplyEffect::Ignored | ApplyEffect::Aborted => {}
    }

    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::WARN
    };
    let filter = tracing_subscriber::filter::Targets::new().with_default(level);

    let stderr_log_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(stderr_log_layer)
        .try_init()
        .context("failed to initialize tracing")
}

fn read_document(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

/// One selection per regex match, in document order.
fn match_selections(document: &TextDocument, text: &str, regex: &Regex) -> Vec<Selection> {
    let mut selections = Vec::new();
    let mut byte = 0;
    let mut chars = 0;
    for found in regex.find_iter(text) {
        chars += text[byte..found.start()].chars().count();
        let start = chars;
        chars += found.as_str().chars().count();
        byte = found.end();
        selections.push(Selection::new(
            document.position_at(start),
            document.position_at(chars),
        ));
    }
    selections
}

/// One selection per line, without line breaks. A trailing line break does not open a line.
fn line_selections(document: &TextDocument, text: &str) -> Vec<Selection> {
    let mut line_count = document.line_count();
    if line_count > 1 && text.ends_with('\n') {
        line_count -= 1;
    }
    (0..line_count)
        .map(|line| {
            let end = document.offset_at(Position::new(line, usize::MAX));
            Selection::new(Position::new(line, 0), document.position_at(end))
        })
        .collect()
}

fn whole_selection(document: &TextDocument) -> Selection {
    Selection::new(
        document.position_at(0),
        document.position_at(document.char_count()),
    )
}
