//! Process abstraction shared by the referee and the players.

use std::{io::Write, time::Duration};

/// One participant of a match, usually backed by an OS process.
///
/// Reads are bounded both in lines and in time: a read that times out yields `None` or a
/// partial output, never an error. Writes to the process input either go through
/// [`Agent::send_input`] (referee) or through the writer handed out by
/// [`Agent::take_input`] (players, fed by a forwarding worker).
pub trait Agent: Send {
    /// Start the underlying process.
    ///
    /// # Errors
    /// Returned when the process could not be launched. The agent is then marked failed.
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Write `text` verbatim to the process input.
    fn send_input(&mut self, text: &str) -> anyhow::Result<()>;

    /// Collect at most `line_count` lines, waiting no longer than `timeout`.
    ///
    /// Every collected line is terminated by `'\n'`. `None` when nothing arrived in time
    /// or when `line_count <= 0`.
    fn get_output(&mut self, line_count: i32, timeout: Duration) -> Option<String>;

    /// Drain the error output accumulated since the previous call.
    fn read_error(&mut self) -> Option<String>;

    /// True if the process could not be started or has died.
    fn is_failed(&self) -> bool;

    /// Hand the process input over to a forwarding worker.
    ///
    /// Can only succeed once; after that, [`Agent::send_input`] fails.
    fn take_input(&mut self) -> anyhow::Result<Box<dyn Write + Send>>;

    /// Identifier reported in the match result.
    fn agent_id(&self) -> u32;

    /// Assigned by the runner when the agent joins a match.
    fn set_agent_id(&mut self, id: u32);
}
