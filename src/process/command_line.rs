use std::{
    io::{BufRead, BufReader, ErrorKind, Read, Write},
    process::ChildStdin,
    sync::mpsc::{self, Receiver, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use tracing::{debug, instrument, trace, warn};

use super::{LimitedProcess, Limits};
use crate::agent::Agent;

/// An [`Agent`] backed by a command line, launched with piped standard streams.
///
/// Standard output and standard error are pumped line by line into channels by background
/// threads, which lets reads time out without blocking on the pipe.
#[derive(Debug)]
pub struct CommandLineAgent {
    label: String,
    command: String,
    args: Vec<String>,
    limits: Option<Limits>,
    allow_uncontained: bool,
    id: u32,
    process: Option<LimitedProcess>,
    stdin: Option<ChildStdin>,
    stdout: Option<Receiver<String>>,
    stderr: Option<Receiver<String>>,
    failed: bool,
}

impl CommandLineAgent {
    /// Create an agent from a whitespace-separated command line. Nothing runs until
    /// [`Agent::execute`].
    ///
    /// # Errors
    /// Returned when the command line is empty.
    pub fn new(command_line: &str) -> anyhow::Result<CommandLineAgent> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let Some(command) = words.next() else {
            bail!("empty command line");
        };
        Ok(CommandLineAgent {
            label: String::from("agent"),
            command,
            args: words.collect(),
            limits: None,
            allow_uncontained: false,
            id: 0,
            process: None,
            stdin: None,
            stdout: None,
            stderr: None,
            failed: false,
        })
    }

    /// Run the process inside its own cgroup with `limits`.
    ///
    /// When `allow_uncontained` is set, a failed containment falls back to a plain process.
    pub fn contained(mut self, limits: Limits, allow_uncontained: bool) -> Self {
        self.limits = Some(limits);
        self.allow_uncontained = allow_uncontained;
        self
    }

    /// Name used in logs and in the cgroup name.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn spawn(&self) -> anyhow::Result<LimitedProcess> {
        let Some(limits) = &self.limits else {
            return LimitedProcess::launch_without_container(&self.command, &self.args);
        };
        let group_name = format!("GAME_RUNNER_{}_{}", std::process::id(), self.label);
        match LimitedProcess::launch(&self.command, &self.args, limits, &group_name) {
            Ok(process) => Ok(process),
            Err(e) if self.allow_uncontained => {
                warn!("containment of '{}' failed ({e:#}), running uncontained", self.label);
                LimitedProcess::launch_without_container(&self.command, &self.args)
            }
            Err(e) => Err(e),
        }
    }
}

/// Forward every line of `stream` to the returned channel until end of stream.
///
/// Lines are decoded lossily: invalid UTF-8 never stops the pump.
fn pump_lines<R: Read + Send + 'static>(stream: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    trace!("stream closed: {e}");
                    break;
                }
            }
            if buf.ends_with(b"\n") {
                buf.pop();
                if buf.ends_with(b"\r") {
                    buf.pop();
                }
            }
            if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                break;
            }
        }
    });
    rx
}

impl Agent for CommandLineAgent {
    #[instrument(skip_all, fields(agent = self.label))]
    fn execute(&mut self) -> anyhow::Result<()> {
        let mut process = match self
            .spawn()
            .with_context(|| format!("could not launch '{}'", self.command))
        {
            Ok(process) => process,
            Err(e) => {
                self.failed = true;
                return Err(e);
            }
        };
        debug!(pid = process.child.id(), "process launched");
        self.stdin = process.child.stdin.take();
        self.stdout = process.child.stdout.take().map(pump_lines);
        self.stderr = process.child.stderr.take().map(pump_lines);
        self.process = Some(process);
        Ok(())
    }

    fn send_input(&mut self, text: &str) -> anyhow::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .context("process input is not available")?;
        stdin
            .write_all(text.as_bytes())
            .and_then(|_| stdin.flush())
            .with_context(|| format!("could not write to '{}'", self.label))
    }

    fn get_output(&mut self, line_count: i32, timeout: Duration) -> Option<String> {
        if line_count <= 0 {
            return None;
        }
        let rx = self.stdout.as_ref()?;
        let deadline = Instant::now() + timeout;
        let mut output = String::new();
        let mut lines = 0;
        while lines < line_count {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(line) => {
                    output.push_str(&line);
                    output.push('\n');
                    lines += 1;
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    self.failed = true;
                    break;
                }
            }
        }
        (!output.is_empty()).then_some(output)
    }

    fn read_error(&mut self) -> Option<String> {
        let rx = self.stderr.as_ref()?;
        let error = rx.try_iter().fold(String::new(), |acu, line| acu + &line + "\n");
        (!error.is_empty()).then_some(error)
    }

    fn is_failed(&self) -> bool {
        self.failed
    }

    fn take_input(&mut self) -> anyhow::Result<Box<dyn Write + Send>> {
        let stdin = self
            .stdin
            .take()
            .context("process input already taken or process not started")?;
        Ok(Box::new(stdin))
    }

    fn agent_id(&self) -> u32 {
        self.id
    }

    fn set_agent_id(&mut self, id: u32) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_command_line_is_rejected() {
        assert!(CommandLineAgent::new("   ").is_err());
    }

    #[test]
    fn command_line_is_split_on_whitespace() {
        let agent = CommandLineAgent::new("python3  bot.py --fast").unwrap();
        assert_eq!(agent.command, "python3");
        assert_eq!(agent.args, vec!["bot.py", "--fast"]);
    }

    #[test]
    fn pump_decodes_invalid_utf8_lossily() {
        let stream = std::io::Cursor::new(b"caf\xE9\r\nnext\nlast".to_vec());
        let lines = pump_lines(stream).iter().collect::<Vec<_>>();
        assert_eq!(lines, vec!["caf\u{FFFD}", "next", "last"]);
    }

    #[test]
    fn missing_binary_marks_agent_failed() {
        let mut agent = CommandLineAgent::new("/definitely/not/a/binary").unwrap();
        assert!(agent.execute().is_err());
        assert!(agent.is_failed());
        assert!(agent.get_output(1, Duration::from_millis(10)).is_none());
    }
}
