//! Core match logic.
//!
//! This module defines the [`GameRunner`] type, which drives one referee and several players
//! through a match. Its responsibilities include:
//!
//! - Launching the referee and the players
//! - Exchanging framed commands with the referee (see [`protocol`](crate::protocol))
//! - Forwarding each player its input and collecting its answer within the referee's timeout
//! - Accumulating everything into a [`GameResult`]
//!
//! # Turn loop
//!
//! After an `INIT` frame carrying the player count and the referee input, every turn goes:
//!
//! 1. `GET_GAME_INFO` is sent, then frames are read until the turn is complete
//!    (scores, or next player info + next player input + infos).
//! 2. On a non final turn, the next player receives its input and gets `timeout` ms to answer
//!    with exactly the expected number of lines. The referee is told either
//!    `SET_PLAYER_OUTPUT` with the answer or `SET_PLAYER_TIMEOUT`.
//! 3. Views, tooltips, user inputs, metadata and scores of the turn are recorded.
//!
//! The match ends on the first turn carrying scores, or on the first referee frame that did not
//! arrive in time or had the wrong number of lines. A referee header that does not follow the
//! protocol grammar ends the match with an error.
//!
//! Player failures never end the match: a player that does not answer properly gets a `None`
//! output for the turn and the referee is notified.

use std::{io::Write, path::Path, thread, time::Duration};

use anyhow::{bail, Context};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    agent::Agent,
    configuration::Configuration,
    game_result::{GameResult, Tooltip, REFEREE_KEY},
    input_channel::PlayerChannel,
    logger::init_logger,
    output::{normalize_player_output, unify_line_endings, OutputCheck},
    process::{CommandLineAgent, Limits},
    protocol::{read_frame, write_frame, Command, ControlCommand, DataCommand, ProtocolViolation},
    turn::{NextPlayerInfo, TurnInfo},
};

/// How the turn loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEnd {
    /// The referee reported the scores.
    Scored,
    /// A referee frame was missing or malformed.
    Aborted,
}

enum TurnOutcome {
    Continue,
    End(MatchEnd),
}

/// Runs one match between a referee and its players.
pub struct GameRunner {
    config: Configuration,
    referee: Box<dyn Agent>,
    players: Vec<Box<dyn Agent>>,
    channels: Vec<PlayerChannel>,
    result: GameResult,
    next_agent_id: u32,
    started: bool,
}

impl GameRunner {
    /// Create a runner around `referee`.
    ///
    /// # Errors
    /// Returned when `config` cannot be honored (see [`Configuration::validate`]).
    #[instrument(skip_all)]
    pub fn new(referee: Box<dyn Agent>, config: Configuration) -> anyhow::Result<GameRunner> {
        if config.log {
            if let Err(e) = init_logger() {
                warn!("could not initialize file logger: {e:#}");
            }
        }
        config.validate()?;
        trace!(?config);

        Ok(GameRunner {
            config,
            referee,
            players: vec![],
            channels: vec![],
            result: GameResult::new(None),
            next_agent_id: 0,
            started: false,
        })
    }

    /// Create a runner whose referee is the given command line.
    pub fn with_command_line_referee(
        command_line: &str,
        config: Configuration,
    ) -> anyhow::Result<GameRunner> {
        let referee = command_line_agent(command_line, &config)?.with_label(REFEREE_KEY);
        Self::new(Box::new(referee), config)
    }

    /// Read the referee input (e.g. a seed) from `path`.
    ///
    /// # Errors
    /// Returned when the file cannot be read.
    pub fn with_init_file(self, path: impl AsRef<Path>) -> anyhow::Result<GameRunner> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot initialize game: could not read {path:?}"))?;
        Ok(self.with_referee_input(input))
    }

    /// Text appended, line by line, to the `INIT` frame.
    pub fn with_referee_input(mut self, input: impl Into<String>) -> GameRunner {
        self.result.referee_input = Some(input.into());
        self
    }

    /// Add a player. Returns its index in the match.
    pub fn add_player(&mut self, mut player: Box<dyn Agent>) -> usize {
        player.set_agent_id(self.next_agent_id);
        self.next_agent_id += 1;
        self.players.push(player);
        self.players.len() - 1
    }

    /// Add a player launched from a command line. Returns its index in the match.
    pub fn add_command_line_player(&mut self, command_line: &str) -> anyhow::Result<usize> {
        let index = self.players.len();
        let player = command_line_agent(command_line, &self.config)?
            .with_label(format!("player_{index}"));
        Ok(self.add_player(Box::new(player)))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn result(&self) -> &GameResult {
        &self.result
    }

    pub fn into_result(self) -> GameResult {
        self.result
    }

    /// Play the match until the referee reports the scores or stops answering properly.
    ///
    /// # Errors
    /// Returned when there is no player, when the referee or every player fails to start,
    /// or when the referee violates the protocol. The result gathered so far stays available.
    #[instrument(skip_all, fields(players = self.players.len()))]
    pub fn run(&mut self) -> anyhow::Result<MatchEnd> {
        if self.players.is_empty() {
            bail!("You have to add at least one player");
        }
        if self.started {
            bail!("a runner can only play one match");
        }
        self.started = true;

        self.result.register_participants(self.players.len());
        for (index, player) in self.players.iter().enumerate() {
            self.result.ids.insert(index, player.agent_id());
        }

        self.referee.execute().context("could not launch referee")?;
        let end = self
            .bootstrap_players()
            .and_then(|_| self.play_match());
        self.shutdown_players();

        match &end {
            Ok(end) => info!(?end, scores = ?self.result.scores, "match over"),
            Err(e) => warn!("match failed: {e:#}"),
        }
        end
    }

    fn bootstrap_players(&mut self) -> anyhow::Result<()> {
        let mut all_failed = true;
        for (index, player) in self.players.iter_mut().enumerate() {
            if let Err(e) = player.execute() {
                warn!(player = index, "bootstrap failed: {e:#}");
            }
            all_failed = all_failed && player.is_failed();
        }
        if all_failed {
            bail!("Bootstrap of all players failed");
        }

        // Not a readiness check: players get a fixed delay before receiving input.
        thread::sleep(self.config.bootstrap_grace);

        for (index, player) in self.players.iter_mut().enumerate() {
            let writer = player.take_input().unwrap_or_else(|e| {
                warn!(player = index, "no input to forward to: {e:#}");
                Box::new(std::io::sink()) as Box<dyn Write + Send>
            });
            let channel = PlayerChannel::spawn(index, self.config.queue_capacity, writer)
                .with_context(|| format!("could not start input worker of player {index}"))?;
            self.channels.push(channel);
        }
        Ok(())
    }

    fn play_match(&mut self) -> anyhow::Result<MatchEnd> {
        self.capture_referee_error();
        for index in 0..self.players.len() {
            self.capture_player_error(index);
        }

        let mut init = Command::new(ControlCommand::Init);
        init.add_line(self.players.len());
        if let Some(input) = &self.result.referee_input {
            for line in input.lines() {
                init.add_line(line);
            }
        }
        self.send_to_referee(&init);

        let mut round = 0;
        loop {
            match self.play_turn(round) {
                Ok(TurnOutcome::Continue) => round += 1,
                Ok(TurnOutcome::End(end)) => return Ok(end),
                Err(e) => {
                    self.capture_referee_error();
                    return Err(e);
                }
            }
        }
    }

    #[instrument(skip(self))]
    fn play_turn(&mut self, round: usize) -> anyhow::Result<TurnOutcome> {
        let Some(turn) = self.read_game_info()? else {
            warn!("invalid referee turn, aborting match");
            self.capture_referee_error();
            self.result.views.push(None);
            return Ok(TurnOutcome::End(MatchEnd::Aborted));
        };

        self.result
            .push_output(REFEREE_KEY, turn.get(DataCommand::Infos).map(str::to_string));
        if let Some(summary) = turn.get(DataCommand::Summary) {
            self.result.summaries.push(summary.to_string());
        }

        if !turn.is_end_turn() {
            let body = turn.get(DataCommand::NextPlayerInfo).unwrap_or_default();
            let next = NextPlayerInfo::parse(body)?;
            self.play_player(next, turn.get(DataCommand::NextPlayerInput))?;
        }

        self.capture_referee_error();
        self.record_turn(&turn, round);

        if turn.is_end_turn() {
            self.record_scores(turn.get(DataCommand::Scores).unwrap_or_default());
            return Ok(TurnOutcome::End(MatchEnd::Scored));
        }
        Ok(TurnOutcome::Continue)
    }

    /// Ask the referee for the next turn. `None` when a frame was missing or malformed.
    fn read_game_info(&mut self) -> anyhow::Result<Option<TurnInfo>> {
        self.send_to_referee(&Command::new(ControlCommand::GetGameInfo));

        let mut turn = TurnInfo::new();
        while !turn.is_complete() {
            let frame = read_frame(
                self.referee.as_mut(),
                self.config.header_timeout,
                self.config.body_timeout,
            )?;
            let Some(frame) = frame else {
                return Ok(None);
            };
            turn.put(frame);
        }
        Ok(Some(turn))
    }

    fn play_player(&mut self, next: NextPlayerInfo, input: Option<&str>) -> anyhow::Result<()> {
        let NextPlayerInfo {
            player: index,
            expected_lines,
            timeout_ms,
        } = next;
        let (Some(player), Some(channel)) = (self.players.get_mut(index), self.channels.get(index))
        else {
            return Err(ProtocolViolation {
                line: index.to_string(),
                reason: "next player index out of range",
            }
            .into());
        };

        channel.offer(input.unwrap_or_default().to_string());
        let output = player
            .get_output(expected_lines, Duration::from_millis(timeout_ms))
            .map(|output| unify_line_endings(&output));
        self.capture_player_error(index);

        let check = OutputCheck::classify(output.as_deref(), expected_lines);
        let key = index.to_string();
        if check.is_ok() {
            let output = normalize_player_output(output, expected_lines);
            let lines = output.as_deref().unwrap_or_default().lines();
            self.send_to_referee(&Command::with_lines(ControlCommand::SetPlayerOutput, lines));
            self.result.push_output(&key, output);
        } else {
            debug!(player = index, ?check, "player failed to answer");
            self.send_to_referee(&Command::new(ControlCommand::SetPlayerTimeout));
            self.result.push_output(&key, None);
        }
        Ok(())
    }

    fn record_turn(&mut self, turn: &TurnInfo, round: usize) {
        // one entry per turn
        self.result
            .views
            .push(turn.get(DataCommand::View).map(str::to_string));
        if let Some(uinput) = turn.get(DataCommand::Uinput) {
            self.result.uinput.push(uinput.to_string());
        }
        if let Some(metadata) = turn.get(DataCommand::Metadata) {
            self.result.metadata = Some(metadata.to_string());
        }
        if let Some(tooltips) = turn.get(DataCommand::Tooltip) {
            let lines = tooltips.lines().collect::<Vec<_>>();
            for pair in lines.chunks_exact(2) {
                match pair[1].trim().parse::<i32>() {
                    Ok(event_id) => self.result.tooltips.push(Tooltip {
                        text: pair[0].to_string(),
                        event_id,
                        turn: round,
                    }),
                    Err(_) => warn!("invalid tooltip event id: {:?}", pair[1]),
                }
            }
        }
    }

    fn record_scores(&mut self, scores: &str) {
        for line in scores.lines() {
            let mut parts = line.split_whitespace();
            let (Some(player), Some(score)) = (parts.next(), parts.next()) else {
                continue;
            };
            match (player.parse::<usize>(), score.parse::<i32>()) {
                (Ok(player), Ok(score)) => {
                    self.result.scores.insert(player, score);
                }
                _ => warn!("invalid score line: {line:?}"),
            }
        }
    }

    fn send_to_referee(&mut self, command: &Command) {
        if let Err(e) = write_frame(self.referee.as_mut(), command) {
            // the next read from the referee fails and ends the match
            warn!("could not send {} to referee: {e:#}", command.kind());
        }
    }

    fn capture_referee_error(&mut self) {
        let error = self.referee.read_error();
        self.record_error(REFEREE_KEY, error);
    }

    fn capture_player_error(&mut self, index: usize) {
        let error = self.players[index].read_error();
        self.record_error(&index.to_string(), error);
    }

    fn record_error(&mut self, participant: &str, error: Option<String>) {
        if self.config.debug_agent_stderr {
            if let Some(error) = &error {
                debug!(participant, "stderr: {error}");
            }
        }
        self.result.push_error(participant, error);
    }

    /// Stop every input worker. Called exactly once, after the last frame was exchanged.
    fn shutdown_players(&mut self) {
        for channel in self.channels.drain(..) {
            // workers are detached, a player stuck on its input must not hang the runner
            drop(channel.close());
        }
    }
}

fn command_line_agent(
    command_line: &str,
    config: &Configuration,
) -> anyhow::Result<CommandLineAgent> {
    let agent = CommandLineAgent::new(command_line)?;
    if !config.contain_agents {
        return Ok(agent);
    }
    let limits = Limits {
        max_memory: config.max_memory_bytes(),
        max_pids: 100,
        cpus: config.cpu_list.clone().unwrap_or_default(),
    };
    Ok(agent.contained(limits, config.allow_uncontained))
}
