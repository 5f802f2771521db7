//! # Game Runner
//!
//! Runs turn-based matches between a referee process and player processes talking over their
//! standard input and output.
//!
//! It provides:
//! - The match loop (`GameRunner`), which enforces per-call timeouts and output shapes
//! - The framed referee protocol (`[[KIND] lineCount]` headers followed by body lines)
//! - Per-player input queues, so that a slow player never blocks the match loop
//! - A structured, serializable [`GameResult`](crate::game_result::GameResult)
//! - Optional confinement of agents with Linux cgroups v2
//!
//! Each participant is an [`Agent`](crate::agent::Agent), usually a
//! [`CommandLineAgent`](crate::process::CommandLineAgent) wrapping an OS process.
//!
//! # Documentation Overview
//!
//! - For the turn loop and its failure handling, see the [`runner`] module.
//! - For the wire format spoken with the referee, see the [`protocol`] module.
//! - For runner behaviors (timeouts, containment, logs), see
//!   [`Configuration`](crate::configuration::Configuration).
//!
//! # Usage Example
//!
//! ```no_run
//! use game_runner::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env();
//!
//!     let mut runner = GameRunner::with_command_line_referee("./referee", config)?
//!         .with_init_file("seed.txt")?;
//!     runner.add_command_line_player("./my_bot")?;
//!     runner.add_command_line_player("python3 other_bot.py")?;
//!
//!     let end = runner.run()?;
//!     println!("{end:?}: {:?}", runner.result().scores);
//!     println!("{}", runner.result().to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Referee Requirements
//!
//! - Answer every `GET_GAME_INFO` with the frames of the turn, each within 1500ms for the
//!   header and 500ms for the body (configurable)
//! - Report `SCORES` to end the match, one `<playerIndex> <score>` pair per line
//! - Never write anything but frames on its standard output

pub mod agent;
pub mod configuration;
pub mod game_result;
mod input_channel;
mod logger;
pub mod output;
pub mod process;
pub mod protocol;
pub mod runner;
pub mod turn;

pub use anyhow;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use game_runner::prelude::*;
/// ```
pub mod prelude {
    pub use crate::agent::Agent;
    pub use crate::configuration::Configuration;
    pub use crate::game_result::{GameResult, Tooltip};
    pub use crate::process::CommandLineAgent;
    pub use crate::protocol::ProtocolViolation;
    pub use crate::runner::{GameRunner, MatchEnd};
}
