//! The structure accumulated turn by turn during a match and exported at its end.

use std::collections::BTreeMap;

use serde::Serialize;

/// Participant key of the referee in [`GameResult::outputs`] and [`GameResult::errors`].
pub const REFEREE_KEY: &str = "referee";

/// A tooltip raised by the referee for a given turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tooltip {
    pub text: String,
    #[serde(rename = "event")]
    pub event_id: i32,
    pub turn: usize,
}

/// Outcome of a match.
///
/// Player lists are keyed by the stringified player index. `outputs` and `errors` hold one
/// entry per turn the participant took part in, init phase included, with `None` standing for
/// a missing or invalid answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub outputs: BTreeMap<String, Vec<Option<String>>>,
    pub errors: BTreeMap<String, Vec<Option<String>>>,
    pub scores: BTreeMap<usize, i32>,
    /// One entry per turn, `None` when the turn had no view.
    pub views: Vec<Option<String>>,
    pub summaries: Vec<String>,
    pub uinput: Vec<String>,
    pub metadata: Option<String>,
    pub tooltips: Vec<Tooltip>,
    pub ids: BTreeMap<usize, u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referee_input: Option<String>,
}

impl GameResult {
    pub fn new(referee_input: Option<String>) -> Self {
        GameResult {
            referee_input,
            ..Default::default()
        }
    }

    /// Open the lists of the referee and of `player_count` players.
    ///
    /// Each player starts with an empty output for the init phase.
    pub(crate) fn register_participants(&mut self, player_count: usize) {
        self.outputs.insert(REFEREE_KEY.to_string(), vec![]);
        self.errors.insert(REFEREE_KEY.to_string(), vec![]);
        for player in 0..player_count {
            self.outputs.insert(player.to_string(), vec![None]);
            self.errors.insert(player.to_string(), vec![]);
        }
    }

    pub(crate) fn push_output(&mut self, participant: &str, output: Option<String>) {
        self.outputs
            .entry(participant.to_string())
            .or_default()
            .push(output);
    }

    pub(crate) fn push_error(&mut self, participant: &str, error: Option<String>) {
        self.errors
            .entry(participant.to_string())
            .or_default()
            .push(error);
    }

    pub fn referee_outputs(&self) -> &[Option<String>] {
        self.outputs
            .get(REFEREE_KEY)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn player_outputs(&self, player: usize) -> &[Option<String>] {
        self.outputs
            .get(&player.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn player_errors(&self, player: usize) -> &[Option<String>] {
        self.errors
            .get(&player.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Serialize the result for the rendering side.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
