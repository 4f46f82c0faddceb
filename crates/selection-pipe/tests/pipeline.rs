use pretty_assertions::assert_eq;
use selection_pipe::{
    ApplyEffect, ApplyMode, Document, MapEnvironment, Outcome, PipelineRunner, Position,
    Selection, Settings, TextDocument, error_report, parse, pipe,
};

fn runner() -> PipelineRunner<MapEnvironment> {
    PipelineRunner::with_environment(Settings::new(), MapEnvironment::new())
}

fn line_selections(document: &TextDocument) -> Vec<Selection> {
    (0..document.line_count())
        .map(|line| {
            let start = Position::new(line, 0);
            let end = document.position_at(document.offset_at(Position::new(line, usize::MAX)));
            Selection::new(start, end)
        })
        .collect()
}

fn inputs(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_outcomes_keep_input_order() {
    // Input 0 finishes last, input 2 first.
    let command = parse("#read n; sleep $n; echo $n").unwrap();
    let outcomes = runner().run(&command, &inputs(&["0.4\n", "0.2\n", "0\n"])).await;
    assert_eq!(
        outcomes,
        vec![Outcome::value("0.4"), Outcome::value("0.2"), Outcome::value("0")]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_failure_message_is_exact() {
    let command = parse("#echo boom >&2; exit 1").unwrap();
    let outcomes = runner().run(&command, &inputs(&["a"])).await;
    assert_eq!(
        error_report(&outcomes).unwrap(),
        "Error running shell command: Command exited with error 1: boom."
    );

    let command = parse("#printf '%s' \"$(cat)\" >&2; exit 2").unwrap();
    let outcomes = runner().run(&command, &inputs(&["x", "y"])).await;
    assert_eq!(
        error_report(&outcomes).unwrap(),
        "Errors running shell command:\n\
         - \"Command exited with error 2: x\".\n\
         - \"Command exited with error 2: y\"."
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_stdout_is_trimmed_at_the_end_only() {
    let command = parse("#printf '  %s  \\n\\n' \"$(cat)\"").unwrap();
    let outcomes = runner().run(&command, &inputs(&["v"])).await;
    assert_eq!(outcomes, vec![Outcome::value("  v")]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_configured_shell_is_used() {
    let settings =
        Settings::new().with("terminal.integrated.automationShell.linux", "/bin/sh");
    let runner = PipelineRunner::with_environment(settings, MapEnvironment::new())
        .with_platform(selection_pipe::Platform::Linux);
    assert_eq!(runner.resolve_shell().as_deref(), Some("/bin/sh"));

    let outcomes = runner.run(&parse("#tr a-z A-Z").unwrap(), &inputs(&["up"])).await;
    assert_eq!(outcomes, vec![Outcome::value("UP")]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_pipe_replace_through_shell() {
    let mut document = TextDocument::new("banana\napple\ncherry");
    let mut selections = line_selections(&document);
    let mut errors: Vec<String> = Vec::new();

    let effect = pipe(
        &runner(),
        &mut document,
        &mut selections,
        "#tr a-z A-Z",
        ApplyMode::Replace,
        &mut errors,
    )
    .await
    .unwrap();

    assert!(matches!(effect, ApplyEffect::Edited(_)));
    assert_eq!(document.text(), "BANANA\nAPPLE\nCHERRY");
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_filter_is_idempotent() {
    let mut document = TextDocument::new("keep\ndrop\nkeep too");
    let mut selections = line_selections(&document);
    let mut errors: Vec<String> = Vec::new();

    pipe(
        &runner(),
        &mut document,
        &mut selections,
        "/keep/",
        ApplyMode::Filter,
        &mut errors,
    )
    .await
    .unwrap();
    let once = selections.clone();
    assert_eq!(once.len(), 2);

    pipe(
        &runner(),
        &mut document,
        &mut selections,
        "true",
        ApplyMode::Filter,
        &mut errors,
    )
    .await
    .unwrap();
    pipe(
        &runner(),
        &mut document,
        &mut selections,
        "true",
        ApplyMode::Filter,
        &mut errors,
    )
    .await
    .unwrap();
    assert_eq!(selections, once);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_replace_requires_replacement_part() {
    let mut document = TextDocument::new("abc");
    let mut selections = line_selections(&document);
    let mut errors: Vec<String> = Vec::new();

    let err = pipe(
        &runner(),
        &mut document,
        &mut selections,
        "/b/",
        ApplyMode::Replace,
        &mut errors,
    )
    .await
    .unwrap_err();

    assert_eq!(err.to_string(), "Missing replacement part in RegExp.");
    assert_eq!(
        errors,
        vec!["Missing replacement part in RegExp.".to_string()]
    );
    assert_eq!(document.text(), "abc");
}

#[tokio::test]
async fn test_expression_failure_aborts_append() {
    let mut document = TextDocument::new("1\nx\n3");
    let mut selections = line_selections(&document);
    let mut errors: Vec<String> = Vec::new();

    let effect = pipe(
        &runner(),
        &mut document,
        &mut selections,
        "isNaN(Number($)) ? $.nope() : ' = ' + $ * 10",
        ApplyMode::Append,
        &mut errors,
    )
    .await
    .unwrap();

    assert_eq!(effect, ApplyEffect::Aborted);
    assert_eq!(document.text(), "1\nx\n3");
    assert_eq!(
        errors,
        vec!["Error running shell command: Exception thrown in given expression.".to_string()]
    );

    let mut selections = vec![selections[0], selections[2]];
    pipe(
        &runner(),
        &mut document,
        &mut selections,
        "' = ' + $ * 10",
        ApplyMode::Append,
        &mut errors,
    )
    .await
    .unwrap();
    assert_eq!(document.text(), "1 = 10\nx\n3 = 30");
}

#[tokio::test]
async fn test_prepend_with_substitution() {
    let mut document = TextDocument::new("one two");
    let mut selections = vec![
        Selection::new(Position::new(0, 0), Position::new(0, 3)),
        Selection::new(Position::new(0, 7), Position::new(0, 4)),
    ];
    let mut errors: Vec<String> = Vec::new();

    pipe(
        &runner(),
        &mut document,
        &mut selections,
        "/^(.)(.*)$/[$1]/",
        ApplyMode::Prepend,
        &mut errors,
    )
    .await
    .unwrap();

    assert_eq!(document.text(), "[o]one [t]two");
}
