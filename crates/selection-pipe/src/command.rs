//! Command parsing.
//!
//! A pipe command is a single line whose first character selects the execution mode:
//!
//! - `#<shell-command>`: run an external shell filter once per selection
//! - `/<pattern>/<replacement>/<flags>`: regex substitution (`<replacement>` and `/<flags>` are
//!   optional, flags are a subset of `m`, `i`, `g`)
//! - anything else: a sandboxed expression bound to `$`, `i` and `$$`
//!
//! [`parse`] is pure and is also what validates the input prompt as the user types
//! (see [`validate`]).
//!
//! # Example
//!
//! ```rust
//! use selection_pipe::{ParsedCommand, parse};
//!
//! let ParsedCommand::Substitution(sub) = parse("/(\\w+)@/$1 at /g").unwrap() else {
//!     panic!("expected a substitution");
//! };
//! assert_eq!(sub.substitute("me@ you@"), "me at  you at ");
//! ```

use crate::error::ParseError;
use crate::expr::Expression;
use regex::{Captures, Regex, RegexBuilder, Replacer};

/// A parsed pipe command.
#[derive(Debug, Clone)]
pub enum ParsedCommand {
    /// Run `command` through the configured shell, once per selection.
    Shell {
        /// Command text with the leading `#` stripped.
        command: String,
    },
    /// Replace (or test) a regex on every selection.
    Substitution(Substitution),
    /// Evaluate an expression for every selection.
    Expression(Expression),
}

impl ParsedCommand {
    /// Short name of the execution mode, for logging.
    pub fn mode_name(&self) -> &'static str {
        match self {
            ParsedCommand::Shell { .. } => "shell",
            ParsedCommand::Substitution(_) => "substitution",
            ParsedCommand::Expression(_) => "expression",
        }
    }
}

/// Regex flags accepted after the third `/`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexFlags {
    /// `m`: `^` and `$` match at line boundaries.
    pub multiline: bool,
    /// `i`: case-insensitive matching.
    pub case_insensitive: bool,
    /// `g`: replace every match instead of the first one.
    pub global: bool,
}

impl RegexFlags {
    fn push(&mut self, flag: char) -> Result<(), ParseError> {
        match flag {
            'm' => self.multiline = true,
            'i' => self.case_insensitive = true,
            'g' => self.global = true,
            other => return Err(ParseError::UnknownFlag(other)),
        }
        Ok(())
    }
}

impl std::fmt::Display for RegexFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (set, flag) in [
            (self.global, 'g'),
            (self.case_insensitive, 'i'),
            (self.multiline, 'm'),
        ] {
            if set {
                write!(f, "{flag}")?;
            }
        }
        Ok(())
    }
}

/// A validated `/pattern/replacement/flags` command.
#[derive(Debug, Clone)]
pub struct Substitution {
    pattern: String,
    flags: RegexFlags,
    replacement: Option<String>,
    regex: Regex,
}

impl Substitution {
    /// The pattern, escapes included.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parsed flags.
    pub fn flags(&self) -> RegexFlags {
        self.flags
    }

    /// The replacement template, or `None` for a match test.
    pub fn replacement(&self) -> Option<&str> {
        self.replacement.as_deref()
    }

    /// Run the substitution on `input`.
    ///
    /// Without a replacement this is a match test and yields the literal text `"true"` or
    /// `"false"`.
    pub fn substitute(&self, input: &str) -> String {
        let Some(template) = self.replacement.as_deref() else {
            return self.regex.is_match(input).to_string();
        };

        let replacer = TemplateReplacer {
            template,
            haystack: input,
            has_named_groups: self.regex.capture_names().any(|name| name.is_some()),
        };
        if self.flags.global {
            self.regex.replace_all(input, replacer).into_owned()
        } else {
            self.regex.replace(input, replacer).into_owned()
        }
    }
}

/// Parse a raw command string.
pub fn parse(raw: &str) -> Result<ParsedCommand, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    let parsed = if let Some(command) = raw.strip_prefix('#') {
        if command.trim().is_empty() {
            return Err(ParseError::EmptyShellCommand);
        }
        ParsedCommand::Shell {
            command: command.to_string(),
        }
    } else if raw.starts_with('/') {
        ParsedCommand::Substitution(parse_substitution(raw)?)
    } else {
        ParsedCommand::Expression(Expression::compile(raw)?)
    };

    tracing::debug!(mode = parsed.mode_name(), "parsed pipe command");
    Ok(parsed)
}

/// Validate a command without running it.
///
/// With `expect_replacement`, a substitution must carry a replacement part (the replace
/// command cannot use a bare match test).
pub fn validate(raw: &str, expect_replacement: bool) -> Result<(), ParseError> {
    parse_checked(raw, expect_replacement).map(|_| ())
}

/// [`parse`], plus the replacement requirement of [`validate`].
pub fn parse_checked(raw: &str, expect_replacement: bool) -> Result<ParsedCommand, ParseError> {
    let parsed = parse(raw)?;
    if let ParsedCommand::Substitution(sub) = &parsed
        && expect_replacement
        && sub.replacement.is_none()
    {
        return Err(ParseError::MissingReplacement);
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    InPattern,
    InReplacement,
    InFlags,
}

fn parse_substitution(raw: &str) -> Result<Substitution, ParseError> {
    let mut chars = raw.chars();
    // Leading delimiter.
    chars.next();

    let mut state = ScanState::InPattern;
    let mut pattern = String::new();
    let mut replacement = String::new();
    let mut flags = RegexFlags::default();

    while let Some(ch) = chars.next() {
        let target = match state {
            ScanState::InFlags => {
                flags.push(ch)?;
                continue;
            }
            ScanState::InPattern => &mut pattern,
            ScanState::InReplacement => &mut replacement,
        };

        match ch {
            '/' => {
                state = match state {
                    ScanState::InPattern => ScanState::InReplacement,
                    _ => ScanState::InFlags,
                };
            }
            '\\' => {
                let escaped = chars.next().ok_or(ParseError::UnexpectedEndOfRegex)?;
                target.push('\\');
                target.push(escaped);
            }
            _ => target.push(ch),
        }
    }

    let replacement = match state {
        ScanState::InPattern => return Err(ParseError::UnexpectedEndOfRegex),
        // Input ended right after the pattern's closing delimiter: match test only.
        ScanState::InReplacement if replacement.is_empty() => None,
        _ => Some(replacement),
    };

    let regex = RegexBuilder::new(&pattern)
        .multi_line(flags.multiline)
        .case_insensitive(flags.case_insensitive)
        .build()
        .map_err(|_| ParseError::InvalidRegex)?;

    Ok(Substitution {
        pattern,
        flags,
        replacement,
        regex,
    })
}

/// Expands `$&`, `$1`..`$99`, `` $` ``, `$'`, `$<name>` and `$$` in a replacement template.
struct TemplateReplacer<'t> {
    template: &'t str,
    haystack: &'t str,
    has_named_groups: bool,
}

impl Replacer for TemplateReplacer<'_> {
    fn replace_append(&mut self, caps: &Captures<'_>, dst: &mut String) {
        let Some(whole) = caps.get(0) else {
            return;
        };
        let group_count = caps.len() - 1;

        let mut rest = self.template;
        while let Some(dollar) = rest.find('$') {
            dst.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];
            let mut next = after.chars();

            let consumed = match next.next() {
                Some('$') => {
                    dst.push('$');
                    1
                }
                Some('&') => {
                    dst.push_str(whole.as_str());
                    1
                }
                Some('`') => {
                    dst.push_str(&self.haystack[..whole.start()]);
                    1
                }
                Some('\'') => {
                    dst.push_str(&self.haystack[whole.end()..]);
                    1
                }
                Some(d) if d.is_ascii_digit() => {
                    match group_reference(after, group_count) {
                        Some((group, len)) => {
                            if let Some(m) = caps.get(group) {
                                dst.push_str(m.as_str());
                            }
                            len
                        }
                        None => {
                            dst.push('$');
                            0
                        }
                    }
                }
                Some('<') if self.has_named_groups => match after.find('>') {
                    Some(close) => {
                        if let Some(m) = caps.name(&after[1..close]) {
                            dst.push_str(m.as_str());
                        }
                        close + 1
                    }
                    None => {
                        dst.push('$');
                        0
                    }
                },
                _ => {
                    dst.push('$');
                    0
                }
            };

            rest = &after[consumed..];
        }
        dst.push_str(rest);
    }
}

/// Resolve `$n` / `$nn` against the number of groups; returns the group and digits consumed.
fn group_reference(after_dollar: &str, group_count: usize) -> Option<(usize, usize)> {
    let digits: Vec<usize> = after_dollar
        .chars()
        .take(2)
        .map_while(|c| c.to_digit(10).map(|d| d as usize))
        .collect();

    if let [tens, ones] = digits[..] {
        let two = tens * 10 + ones;
        if (1..=group_count).contains(&two) {
            return Some((two, 2));
        }
    }
    match digits.first() {
        Some(&one) if (1..=group_count).contains(&one) => Some((one, 1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn substitution(raw: &str) -> Substitution {
        match parse(raw) {
            Ok(ParsedCommand::Substitution(sub)) => sub,
            other => panic!("expected substitution for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_blank_commands() {
        assert_eq!(parse("").unwrap_err(), ParseError::EmptyCommand);
        assert_eq!(parse("  \t").unwrap_err(), ParseError::EmptyCommand);
        assert_eq!(parse("#   ").unwrap_err(), ParseError::EmptyShellCommand);
    }

    #[test]
    fn test_shell_command_keeps_payload_verbatim() {
        let ParsedCommand::Shell { command } = parse("# sort -u ").unwrap() else {
            panic!("expected shell command");
        };
        assert_eq!(command, " sort -u ");
    }

    #[test]
    fn test_substitution_segments() {
        let sub = substitution("/a(b)/x$1/gi");
        assert_eq!(sub.pattern(), "a(b)");
        assert_eq!(sub.replacement(), Some("x$1"));
        assert_eq!(
            sub.flags(),
            RegexFlags {
                multiline: false,
                case_insensitive: true,
                global: true,
            }
        );
        assert_eq!(sub.flags().to_string(), "gi");
    }

    #[test]
    fn test_escaped_delimiter_is_kept_literally() {
        let sub = substitution("/a\\/b/c\\/d/");
        assert_eq!(sub.pattern(), "a\\/b");
        assert_eq!(sub.replacement(), Some("c\\/d"));
        assert_eq!(sub.substitute("xa/by"), "xc\\/dy");
    }

    #[test]
    fn test_replacement_presence() {
        assert_eq!(substitution("/a/").replacement(), None);
        assert_eq!(substitution("/a/b").replacement(), Some("b"));
        assert_eq!(substitution("/a//").replacement(), Some(""));
        assert!(substitution("/a//g").flags().global);
    }

    #[test]
    fn test_substitution_errors() {
        assert_eq!(parse("/abc").unwrap_err(), ParseError::UnexpectedEndOfRegex);
        assert_eq!(parse("/").unwrap_err(), ParseError::UnexpectedEndOfRegex);
        assert_eq!(
            parse("/ab\\").unwrap_err(),
            ParseError::UnexpectedEndOfRegex
        );
        assert_eq!(
            parse("/a/b\\").unwrap_err(),
            ParseError::UnexpectedEndOfRegex
        );
        assert_eq!(parse("/a/b/x").unwrap_err(), ParseError::UnknownFlag('x'));
        assert_eq!(parse("/a(/b/").unwrap_err(), ParseError::InvalidRegex);
        assert_eq!(
            parse("/a/b/x").unwrap_err().to_string(),
            "Unknown flag 'x'."
        );
    }

    #[test]
    fn test_first_or_global_replacement() {
        assert_eq!(substitution("/o/0").substitute("foo"), "f0o");
        assert_eq!(substitution("/o/0/g").substitute("foo"), "f00");
        assert_eq!(substitution("/O/0/gi").substitute("fOo"), "f00");
    }

    #[test]
    fn test_multiline_flag() {
        assert_eq!(substitution("/^b/B/g").substitute("a\nb"), "a\nb");
        assert_eq!(substitution("/^b/B/gm").substitute("a\nb"), "a\nB");
    }

    #[test]
    fn test_match_test_yields_boolean_text() {
        let sub = substitution("/\\d+/");
        assert_eq!(sub.substitute("abc 42"), "true");
        assert_eq!(sub.substitute("abc"), "false");
    }

    #[test]
    fn test_replacement_template_expansion() {
        assert_eq!(substitution("/(a)(b)/$2$1/").substitute("xaby"), "xbay");
        assert_eq!(substitution("/b/[$&]/").substitute("abc"), "a[b]c");
        assert_eq!(substitution("/b/<$`|$'>/").substitute("abc"), "a<a|c>c");
        assert_eq!(substitution("/b/$$/").substitute("abc"), "a$c");
        assert_eq!(substitution("/b/$0$9/").substitute("abc"), "a$0$9c");
        assert_eq!(substitution("/(b)/$10/").substitute("abc"), "ab0c");
        assert_eq!(
            substitution("/(?<w>b)/<$<w>>/").substitute("abc"),
            "a<b>c"
        );
    }

    #[test]
    fn test_validate_requires_replacement_when_asked() {
        assert_eq!(validate("/a/", false), Ok(()));
        assert_eq!(validate("/a/", true), Err(ParseError::MissingReplacement));
        assert_eq!(validate("/a/b", true), Ok(()));
        assert_eq!(validate("#ls", true), Ok(()));
        assert_eq!(validate("$ +", false), Err(ParseError::InvalidExpression));
    }
}
