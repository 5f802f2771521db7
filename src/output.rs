//! Shape checks and normalization of agent outputs.

/// Outcome of comparing an output against its expected line count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCheck {
    /// Exactly the expected number of lines.
    Ok,
    /// Nothing arrived although lines were expected.
    Timeout,
    /// Fewer lines than expected.
    TooShort,
    /// More lines than expected.
    TooLong,
}

impl OutputCheck {
    /// Classify `output` against `expected_lines` by counting line feeds.
    ///
    /// An absent output is a timeout, an empty one is too short, unless no line was expected.
    pub fn classify(output: Option<&str>, expected_lines: i32) -> OutputCheck {
        let output = match output {
            _ if expected_lines <= 0 && output.map_or(true, str::is_empty) => {
                return OutputCheck::Ok
            }
            None => return OutputCheck::Timeout,
            Some(output) => output,
        };

        let count = output.bytes().filter(|b| *b == b'\n').count() as i64;
        match count.cmp(&i64::from(expected_lines)) {
            std::cmp::Ordering::Less => OutputCheck::TooShort,
            std::cmp::Ordering::Greater => OutputCheck::TooLong,
            std::cmp::Ordering::Equal => OutputCheck::Ok,
        }
    }

    pub fn is_ok(self) -> bool {
        self == OutputCheck::Ok
    }
}

/// Turn every carriage return into a line feed, a `"\r\n"` pair counting as one.
pub fn unify_line_endings(output: &str) -> String {
    output.replace("\r\n", "\n").replace('\r', "\n")
}

/// Normalize a player output that passed [`OutputCheck::classify`].
///
/// An empty answer to a one-line request becomes a single empty line, and a non-empty
/// output always ends with a line feed.
pub fn normalize_player_output(output: Option<String>, expected_lines: i32) -> Option<String> {
    let mut output = unify_line_endings(&output?);
    if output.is_empty() {
        if expected_lines == 1 {
            output.push('\n');
        }
    } else if !output.ends_with('\n') {
        output.push('\n');
    }
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_empty_outputs() {
        assert_eq!(OutputCheck::classify(None, 0), OutputCheck::Ok);
        assert_eq!(OutputCheck::classify(Some(""), 0), OutputCheck::Ok);
        assert_eq!(OutputCheck::classify(None, -1), OutputCheck::Ok);
        assert_eq!(OutputCheck::classify(None, 1), OutputCheck::Timeout);
        assert_eq!(OutputCheck::classify(Some(""), 1), OutputCheck::TooShort);
    }

    #[test]
    fn classify_counts_line_feeds() {
        assert_eq!(OutputCheck::classify(Some("a\n"), 1), OutputCheck::Ok);
        assert_eq!(OutputCheck::classify(Some("a\nb\n"), 1), OutputCheck::TooLong);
        assert_eq!(OutputCheck::classify(Some("a"), 1), OutputCheck::TooShort);
        assert_eq!(OutputCheck::classify(Some("a\nb\n"), 3), OutputCheck::TooShort);
        assert_eq!(OutputCheck::classify(Some("a\n"), 0), OutputCheck::TooLong);
    }

    #[test]
    fn normalization_unifies_line_endings() {
        assert_eq!(
            normalize_player_output(Some("x\r\ny".to_string()), 1).as_deref(),
            Some("x\ny\n")
        );
        assert_eq!(
            normalize_player_output(Some("x\ry".to_string()), 2).as_deref(),
            Some("x\ny\n")
        );
    }

    #[test]
    fn normalization_of_empty_outputs() {
        assert_eq!(normalize_player_output(Some(String::new()), 1).as_deref(), Some("\n"));
        assert_eq!(normalize_player_output(Some(String::new()), 0).as_deref(), Some(""));
        assert_eq!(normalize_player_output(None, 1), None);
        assert_eq!(normalize_player_output(Some("ok\n".to_string()), 1).as_deref(), Some("ok\n"));
    }
}
