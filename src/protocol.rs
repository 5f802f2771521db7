//! Framed line protocol spoken with the referee.
//!
//! Every frame starts with a header line `[[<KIND>] <lineCount>]` followed by `lineCount`
//! body lines. A negative line count means the frame carries no body at all.
//!
//! Two disjoint families of commands exist:
//! - [`ControlCommand`]s are written by the runner to the referee,
//! - [`DataCommand`]s are read by the runner from the referee.

use std::{fmt::Display, str::FromStr, time::Duration};

use tracing::trace;

use crate::agent::Agent;
use crate::output::{unify_line_endings, OutputCheck};

/// Commands sent to the referee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    Init,
    GetGameInfo,
    SetPlayerOutput,
    SetPlayerTimeout,
}

/// Commands read from the referee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataCommand {
    Infos,
    Summary,
    Scores,
    NextPlayerInfo,
    NextPlayerInput,
    View,
    Uinput,
    Metadata,
    Tooltip,
}

impl ControlCommand {
    pub fn name(self) -> &'static str {
        match self {
            ControlCommand::Init => "INIT",
            ControlCommand::GetGameInfo => "GET_GAME_INFO",
            ControlCommand::SetPlayerOutput => "SET_PLAYER_OUTPUT",
            ControlCommand::SetPlayerTimeout => "SET_PLAYER_TIMEOUT",
        }
    }
}

impl DataCommand {
    pub const ALL: [DataCommand; 9] = [
        DataCommand::Infos,
        DataCommand::Summary,
        DataCommand::Scores,
        DataCommand::NextPlayerInfo,
        DataCommand::NextPlayerInput,
        DataCommand::View,
        DataCommand::Uinput,
        DataCommand::Metadata,
        DataCommand::Tooltip,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataCommand::Infos => "INFOS",
            DataCommand::Summary => "SUMMARY",
            DataCommand::Scores => "SCORES",
            DataCommand::NextPlayerInfo => "NEXT_PLAYER_INFO",
            DataCommand::NextPlayerInput => "NEXT_PLAYER_INPUT",
            DataCommand::View => "VIEW",
            DataCommand::Uinput => "UINPUT",
            DataCommand::Metadata => "METADATA",
            DataCommand::Tooltip => "TOOLTIP",
        }
    }
}

impl Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Display for DataCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataCommand {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataCommand::ALL
            .into_iter()
            .find(|command| command.name() == s)
            .ok_or(())
    }
}

/// The referee broke the protocol. Fatal for the match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolViolation {
    pub line: String,
    pub reason: &'static str,
}

impl Display for ProtocolViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid referee command: {:?} ({})", self.line, self.reason)
    }
}

impl std::error::Error for ProtocolViolation {}

/// A parsed header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header<'a> {
    pub kind: &'a str,
    pub line_count: i32,
}

/// Tokenize `[[<KIND>] <lineCount>]`, tolerating blanks around the line count.
pub fn parse_header(line: &str) -> Option<Header<'_>> {
    let rest = line.trim().strip_prefix("[[")?;
    let (kind, rest) = rest.split_once(']')?;
    if kind.is_empty() || kind.contains('[') {
        return None;
    }
    let count = rest.strip_suffix(']')?.trim();
    let digits = count.strip_prefix('-').unwrap_or(count);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let line_count = count.parse().ok()?;
    Some(Header { kind, line_count })
}

/// One data frame received from the referee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: DataCommand,
    /// `None` when the header declared a negative line count.
    pub body: Option<String>,
}

/// Read one frame from `agent`.
///
/// Returns `Ok(None)` when the header or the body did not arrive in time or has the wrong
/// shape. A header that arrives but does not follow the grammar is a [`ProtocolViolation`].
pub fn read_frame(
    agent: &mut dyn Agent,
    header_timeout: Duration,
    body_timeout: Duration,
) -> Result<Option<Frame>, ProtocolViolation> {
    let header = agent
        .get_output(1, header_timeout)
        .map(|output| unify_line_endings(&output));
    if !OutputCheck::classify(header.as_deref(), 1).is_ok() {
        trace!(?header, "no valid header");
        return Ok(None);
    }
    let line = header.unwrap_or_default();
    let Some(Header { kind, line_count }) = parse_header(&line) else {
        return Err(ProtocolViolation {
            line: line.trim().to_string(),
            reason: "header does not match [[KIND] N]",
        });
    };
    let Ok(kind) = kind.parse::<DataCommand>() else {
        return Err(ProtocolViolation {
            line: line.trim().to_string(),
            reason: "unknown command",
        });
    };

    if line_count < 0 {
        trace!(%kind, "frame without body");
        return Ok(Some(Frame { kind, body: None }));
    }
    let body = agent.get_output(line_count, body_timeout);
    let check = OutputCheck::classify(body.as_deref(), line_count);
    if !check.is_ok() {
        trace!(%kind, line_count, ?check, "invalid frame body");
        return Ok(None);
    }
    trace!(%kind, line_count, "frame received");
    Ok(Some(Frame {
        kind,
        body: Some(body.unwrap_or_default()),
    }))
}

/// A control frame ready to be written to the referee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    kind: ControlCommand,
    lines: Vec<String>,
}

impl Command {
    pub fn new(kind: ControlCommand) -> Self {
        Command {
            kind,
            lines: vec![],
        }
    }

    pub fn with_lines<I, S>(kind: ControlCommand, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Command {
            kind,
            lines: lines.into_iter().map(|line| line.to_string()).collect(),
        }
    }

    pub fn add_line(&mut self, line: impl ToString) {
        self.lines.push(line.to_string());
    }

    pub fn kind(&self) -> ControlCommand {
        self.kind
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[[{}] {}]", self.kind, self.lines.len())?;
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Serialize `command` and send it to the referee as one write.
pub fn write_frame(agent: &mut dyn Agent, command: &Command) -> anyhow::Result<()> {
    trace!(kind = %command.kind(), lines = command.lines().len(), "sending frame");
    agent.send_input(&command.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_grammar() {
        assert_eq!(
            parse_header("[[SCORES] 2]"),
            Some(Header {
                kind: "SCORES",
                line_count: 2
            })
        );
        assert_eq!(
            parse_header("[[VIEW]3]\n").map(|h| h.line_count),
            Some(3)
        );
        assert_eq!(
            parse_header("[[INFOS] -1 ]").map(|h| h.line_count),
            Some(-1)
        );
        assert_eq!(parse_header("[[INFOS] 1"), None);
        assert_eq!(parse_header("[INFOS] 1]"), None);
        assert_eq!(parse_header("[[] 1]"), None);
        assert_eq!(parse_header("[[INFOS] x]"), None);
        assert_eq!(parse_header("[[INFOS] -]"), None);
        assert_eq!(parse_header("hello"), None);
    }

    #[test]
    fn data_command_names_round_trip() {
        for command in DataCommand::ALL {
            assert_eq!(command.name().parse::<DataCommand>(), Ok(command));
        }
        assert!("GET_GAME_INFO".parse::<DataCommand>().is_err());
    }

    #[test]
    fn command_serialization() {
        let mut init = Command::new(ControlCommand::Init);
        init.add_line(2);
        init.add_line("seed=42");
        assert_eq!(init.to_string(), "[[INIT] 2]\n2\nseed=42\n");
        assert_eq!(init.lines(), ["2", "seed=42"]);
        assert_eq!(
            Command::new(ControlCommand::GetGameInfo).to_string(),
            "[[GET_GAME_INFO] 0]\n"
        );
        assert_eq!(
            Command::with_lines(ControlCommand::SetPlayerOutput, ["ok"]).to_string(),
            "[[SET_PLAYER_OUTPUT] 1]\nok\n"
        );
    }

    #[test]
    fn serialized_header_parses_back() {
        let text = Command::new(ControlCommand::SetPlayerTimeout).to_string();
        let header = parse_header(text.lines().next().unwrap()).unwrap();
        assert_eq!(header.kind, "SET_PLAYER_TIMEOUT");
        assert_eq!(header.line_count, 0);
    }
}
