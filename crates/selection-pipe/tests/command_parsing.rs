use selection_pipe::{ParseError, ParsedCommand, RegexFlags, parse, validate};

#[test]
fn test_mode_is_chosen_by_first_character() {
    assert!(matches!(parse("#cat").unwrap(), ParsedCommand::Shell { .. }));
    assert!(matches!(parse("/a/b/").unwrap(), ParsedCommand::Substitution(_)));
    assert!(matches!(parse("$.trim()").unwrap(), ParsedCommand::Expression(_)));
    // Leading whitespace is not a mode marker.
    assert!(matches!(parse(" /a/").unwrap_err(), ParseError::InvalidExpression));
}

#[test]
fn test_substitution_round_trip() {
    let cases = [
        ("/P/R/F", None),
        ("/a+/b/g", Some(("a+", "b", "g"))),
        ("/x\\/y/z\\/w/im", Some(("x\\/y", "z\\/w", "im"))),
        ("/(\\d)-(\\d)/$2-$1/mig", Some(("(\\d)-(\\d)", "$2-$1", "mig"))),
        ("/a//gg", Some(("a", "", "gg"))),
    ];

    for (raw, expected) in cases {
        let parsed = parse(raw);
        let Some((pattern, replacement, flags)) = expected else {
            assert_eq!(parsed.unwrap_err(), ParseError::UnknownFlag('F'));
            continue;
        };
        let Ok(ParsedCommand::Substitution(sub)) = parsed else {
            panic!("expected substitution for {raw}");
        };

        assert_eq!(sub.pattern(), pattern);
        assert_eq!(sub.replacement(), Some(replacement));
        let expected_flags = RegexFlags {
            multiline: flags.contains('m'),
            case_insensitive: flags.contains('i'),
            global: flags.contains('g'),
        };
        assert_eq!(sub.flags(), expected_flags, "flags of {raw}");
    }
}

#[test]
fn test_user_visible_error_messages() {
    let cases = [
        ("", "The given command cannot be empty."),
        ("   ", "The given command cannot be empty."),
        ("#", "The given shell command cannot be empty."),
        ("# \t", "The given shell command cannot be empty."),
        ("/abc", "Unexpected end of RegExp."),
        ("/abc\\", "Unexpected end of RegExp."),
        ("/a/b/x", "Unknown flag 'x'."),
        ("/a[/b/", "Invalid RegExp."),
        ("1 +* 2", "Invalid expression."),
        ("{", "Invalid expression."),
    ];

    for (raw, message) in cases {
        assert_eq!(
            parse(raw).unwrap_err().to_string(),
            message,
            "input {raw:?}"
        );
    }
}

#[test]
fn test_validate_for_replace_needs_replacement() {
    assert_eq!(
        validate("/abc/", true).unwrap_err().to_string(),
        "Missing replacement part in RegExp."
    );
    assert!(validate("/abc/", false).is_ok());
    assert!(validate("/abc//", true).is_ok());
    assert!(validate("$ + '!'", true).is_ok());
}

#[test]
fn test_shell_payload_strips_only_the_marker() {
    let ParsedCommand::Shell { command } = parse("#tr a-z A-Z").unwrap() else {
        panic!("expected shell command");
    };
    assert_eq!(command, "tr a-z A-Z");
}

#[test]
fn test_validate_rejects_runaway_nesting() {
    let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    assert_eq!(validate(&parens, false), Err(ParseError::InvalidExpression));

    let nots = format!("{}1", "!".repeat(10_000));
    assert_eq!(validate(&nots, false), Err(ParseError::InvalidExpression));

    let arrows = format!("{}1", "x => ".repeat(10_000));
    assert_eq!(validate(&arrows, true), Err(ParseError::InvalidExpression));

    let numbered = "$.split(',').map((w, j) => `${j}:${w.trim()}`).join('-')";
    assert!(validate(numbered, false).is_ok());
}
