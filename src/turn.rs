use std::collections::HashMap;

use crate::protocol::{DataCommand, Frame, ProtocolViolation};

/// Everything the referee sent for the current turn.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TurnInfo {
    frames: HashMap<DataCommand, Option<String>>,
}

impl TurnInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `frame`, replacing any earlier frame of the same kind.
    pub fn put(&mut self, frame: Frame) {
        self.frames.insert(frame.kind, frame.body);
    }

    pub fn contains(&self, kind: DataCommand) -> bool {
        self.frames.contains_key(&kind)
    }

    /// Body of the `kind` frame, if one with a body was received.
    pub fn get(&self, kind: DataCommand) -> Option<&str> {
        self.frames.get(&kind)?.as_deref()
    }

    /// Final turn: scores were reported.
    pub fn is_end_turn(&self) -> bool {
        self.contains(DataCommand::Scores)
    }

    /// Complete once scores arrived, or once the next player, its input and the infos are known.
    pub fn is_complete(&self) -> bool {
        self.is_end_turn()
            || [
                DataCommand::NextPlayerInfo,
                DataCommand::NextPlayerInput,
                DataCommand::Infos,
            ]
            .into_iter()
            .all(|kind| self.contains(kind))
    }
}

/// Who plays next, how many lines are expected and how long the player may think.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextPlayerInfo {
    pub player: usize,
    pub expected_lines: i32,
    pub timeout_ms: u64,
}

impl NextPlayerInfo {
    /// Parse the three-line body of a `NEXT_PLAYER_INFO` frame.
    pub fn parse(body: &str) -> Result<NextPlayerInfo, ProtocolViolation> {
        let violation = |reason| ProtocolViolation {
            line: body.to_string(),
            reason,
        };
        let mut lines = body.lines().map(str::trim);
        let player = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| violation("invalid next player index"))?;
        let expected_lines = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| violation("invalid expected line count"))?;
        let timeout_ms = lines
            .next()
            .and_then(|l| l.parse().ok())
            .ok_or_else(|| violation("invalid player timeout"))?;
        Ok(NextPlayerInfo {
            player,
            expected_lines,
            timeout_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: DataCommand, body: &str) -> Frame {
        Frame {
            kind,
            body: Some(body.to_string()),
        }
    }

    #[test]
    fn subsets_are_never_complete() {
        let kinds = [
            DataCommand::NextPlayerInfo,
            DataCommand::NextPlayerInput,
            DataCommand::Infos,
        ];
        for skipped in kinds {
            let mut turn = TurnInfo::new();
            for kind in kinds.into_iter().filter(|k| *k != skipped) {
                turn.put(frame(kind, "x\n"));
                assert!(!turn.is_complete());
            }
            turn.put(frame(DataCommand::View, "v\n"));
            turn.put(frame(DataCommand::Summary, "s\n"));
            assert!(!turn.is_complete());
            turn.put(frame(skipped, "x\n"));
            assert!(turn.is_complete());
            assert!(!turn.is_end_turn());
        }
    }

    #[test]
    fn scores_alone_complete_the_turn() {
        let mut turn = TurnInfo::new();
        assert!(!turn.is_complete());
        turn.put(Frame {
            kind: DataCommand::Scores,
            body: None,
        });
        assert!(turn.is_complete());
        assert!(turn.is_end_turn());
        assert_eq!(turn.get(DataCommand::Scores), None);
    }

    #[test]
    fn next_player_info_parsing() {
        assert_eq!(
            NextPlayerInfo::parse("0\n1\n1000\n"),
            Ok(NextPlayerInfo {
                player: 0,
                expected_lines: 1,
                timeout_ms: 1000
            })
        );
        assert!(NextPlayerInfo::parse("0\n1\n").is_err());
        assert!(NextPlayerInfo::parse("a\n1\n50\n").is_err());
        assert!(NextPlayerInfo::parse("-1\n1\n50\n").is_err());
    }
}
