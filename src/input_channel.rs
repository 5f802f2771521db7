//! Per-player input forwarding.
//!
//! Each player owns a bounded queue drained by a dedicated worker thread that writes every
//! queued input to the player's process. Enqueuing never blocks the turn loop, even when the
//! player is slow to read its input.

use std::{
    io::Write,
    sync::mpsc::{self, SyncSender, TrySendError},
    thread::{self, JoinHandle},
};

use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlayerMessage {
    Input(String),
    Shutdown,
}

/// Sending half of a player's input queue.
#[derive(Debug)]
pub struct PlayerChannel {
    player: usize,
    sender: SyncSender<PlayerMessage>,
    worker: JoinHandle<()>,
}

impl PlayerChannel {
    /// Start the forwarding worker of `player`, writing into `writer`.
    pub fn spawn(
        player: usize,
        capacity: usize,
        mut writer: Box<dyn Write + Send>,
    ) -> anyhow::Result<PlayerChannel> {
        let (sender, receiver) = mpsc::sync_channel(capacity);
        let worker = thread::Builder::new()
            .name(format!("player-{player}-input"))
            .spawn(move || {
                while let Ok(PlayerMessage::Input(input)) = receiver.recv() {
                    let written = writer
                        .write_all(input.as_bytes())
                        .and_then(|_| writer.flush());
                    if let Err(e) = written {
                        warn!(player, "could not forward input: {e}");
                    }
                }
                trace!(player, "input worker stopped");
            })?;
        Ok(PlayerChannel {
            player,
            sender,
            worker,
        })
    }

    /// Queue `input` for the player without blocking.
    ///
    /// The input is dropped (and logged) if the queue is full or the worker is gone.
    pub fn offer(&self, input: String) -> bool {
        match self.sender.try_send(PlayerMessage::Input(input)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(player = self.player, "input queue is full, input dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(player = self.player, "input worker is gone, input dropped");
                false
            }
        }
    }

    /// Ask the worker to stop once the pending inputs are written.
    ///
    /// Consumes the channel, so the shutdown is signalled exactly once. The worker also stops
    /// when the queue was full, since the queue is closed here.
    pub fn close(self) -> JoinHandle<()> {
        if self.sender.try_send(PlayerMessage::Shutdown).is_err() {
            trace!(player = self.player, "shutdown not queued, closing queue");
        }
        self.worker
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("poisoned").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn inputs_are_forwarded_in_order() {
        let buffer = SharedBuffer::default();
        let channel = PlayerChannel::spawn(0, 8, Box::new(buffer.clone())).unwrap();
        assert!(channel.offer("a\n".to_string()));
        assert!(channel.offer("b\n".to_string()));
        channel.close().join().unwrap();
        assert_eq!(buffer.0.lock().unwrap().as_slice(), b"a\nb\n");
    }

    #[test]
    fn shutdown_is_not_an_input() {
        let buffer = SharedBuffer::default();
        let channel = PlayerChannel::spawn(1, 1, Box::new(buffer.clone())).unwrap();
        channel.close().join().unwrap();
        assert!(buffer.0.lock().unwrap().is_empty());
    }
}
