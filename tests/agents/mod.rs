#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::Write,
    sync::{
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
        Arc, Mutex,
    },
    time::Duration,
};

use game_runner::agent::Agent;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

pub fn init_test_logger() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .with_test_writer()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// What a forwarding worker did with the input of a scripted agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Input(String),
    Closed,
}

struct ProbeWriter {
    events: Sender<InputEvent>,
}

impl Write for ProbeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self
            .events
            .send(InputEvent::Input(String::from_utf8_lossy(buf).into_owned()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for ProbeWriter {
    fn drop(&mut self) {
        let _ = self.events.send(InputEvent::Closed);
    }
}

/// An agent answering `get_output` calls from a fixed script.
///
/// Each call pops one scripted answer; `None` (or an exhausted script) plays a timeout.
pub struct ScriptedAgent {
    outputs: VecDeque<Option<String>>,
    errors: VecDeque<Option<String>>,
    fail_on_execute: bool,
    failed: bool,
    id: u32,
    events: Option<Sender<InputEvent>>,
    sent: Arc<Mutex<Vec<String>>>,
    reads: Arc<Mutex<Vec<(i32, Duration)>>>,
}

/// Observation side of a [`ScriptedAgent`], kept by the test.
pub struct Probe {
    events: Receiver<InputEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    reads: Arc<Mutex<Vec<(i32, Duration)>>>,
}

impl ScriptedAgent {
    pub fn new() -> (ScriptedAgent, Probe) {
        let (tx, rx) = mpsc::channel();
        let sent = Arc::new(Mutex::new(vec![]));
        let reads = Arc::new(Mutex::new(vec![]));
        let agent = ScriptedAgent {
            outputs: VecDeque::new(),
            errors: VecDeque::new(),
            fail_on_execute: false,
            failed: false,
            id: u32::MAX,
            events: Some(tx),
            sent: sent.clone(),
            reads: reads.clone(),
        };
        let probe = Probe {
            events: rx,
            sent,
            reads,
        };
        (agent, probe)
    }

    pub fn failing() -> (ScriptedAgent, Probe) {
        let (mut agent, probe) = Self::new();
        agent.fail_on_execute = true;
        (agent, probe)
    }

    /// Script one raw answer.
    pub fn answer(mut self, output: &str) -> Self {
        self.outputs.push_back(Some(output.to_string()));
        self
    }

    /// Script one timeout.
    pub fn silence(mut self) -> Self {
        self.outputs.push_back(None);
        self
    }

    /// Script a referee frame: its header, then its body unless `lines` is `None`.
    pub fn frame(self, kind: &str, lines: Option<&[&str]>) -> Self {
        match lines {
            None => self.answer(&format!("[[{kind}] -1]\n")),
            Some(lines) => {
                let header = format!("[[{kind}] {}]\n", lines.len());
                let agent = self.answer(&header);
                if lines.is_empty() {
                    agent.silence()
                } else {
                    let body = lines.iter().map(|l| format!("{l}\n")).collect::<String>();
                    agent.answer(&body)
                }
            }
        }
    }

    /// Script the standard error read after the next turn.
    pub fn stderr(mut self, error: &str) -> Self {
        self.errors.push_back(Some(error.to_string()));
        self
    }
}

impl Agent for ScriptedAgent {
    fn execute(&mut self) -> anyhow::Result<()> {
        if self.fail_on_execute {
            self.failed = true;
            anyhow::bail!("scripted launch failure");
        }
        Ok(())
    }

    fn send_input(&mut self, text: &str) -> anyhow::Result<()> {
        self.sent.lock().expect("poisoned").push(text.to_string());
        Ok(())
    }

    fn get_output(&mut self, line_count: i32, timeout: Duration) -> Option<String> {
        self.reads
            .lock()
            .expect("poisoned")
            .push((line_count, timeout));
        self.outputs.pop_front().flatten()
    }

    fn read_error(&mut self) -> Option<String> {
        self.errors.pop_front().flatten()
    }

    fn is_failed(&self) -> bool {
        self.failed
    }

    fn take_input(&mut self) -> anyhow::Result<Box<dyn Write + Send>> {
        let events = self
            .events
            .take()
            .ok_or_else(|| anyhow::anyhow!("input already taken"))?;
        Ok(Box::new(ProbeWriter { events }))
    }

    fn agent_id(&self) -> u32 {
        self.id
    }

    fn set_agent_id(&mut self, id: u32) {
        self.id = id;
    }
}

impl Probe {
    /// Everything written to the agent through `send_input`.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("poisoned").clone()
    }

    /// Every `get_output` call, as (line count, timeout).
    pub fn reads(&self) -> Vec<(i32, Duration)> {
        self.reads.lock().expect("poisoned").clone()
    }

    /// Wait for the forwarding worker to finish and return everything it did.
    ///
    /// Panics if the worker is not closed within a few seconds.
    pub fn forwarded(&self) -> Vec<InputEvent> {
        let mut events = vec![];
        loop {
            match self.events.recv_timeout(Duration::from_secs(5)) {
                Ok(event) => events.push(event),
                Err(RecvTimeoutError::Disconnected) => return events,
                Err(RecvTimeoutError::Timeout) => panic!("worker still running: {events:?}"),
            }
        }
    }
}
