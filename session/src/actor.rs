//! Session actor
//!
//! Each session runs as an independent single-threaded actor: commands go in
//! over a channel, response blocks come back over another. The handle is
//! cloneable and cheap to pass around.

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::engine::Engine;
use crate::session::ReplaySession;

/// Cloneable handle for feeding commands to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<String>,
}

impl SessionHandle {
    /// Queue one command line (`>` prefix optional)
    pub fn send_command(&self, line: impl Into<String>) -> Result<()> {
        self.commands
            .send(line.into())
            .map_err(|_| anyhow!("session closed"))
    }
}

/// Spawn a session actor; returns its handle and the output stream.
///
/// The actor exits when every handle is dropped or after `>replaydone`.
pub fn spawn_session<E>() -> (SessionHandle, mpsc::UnboundedReceiver<String>)
where
    E: Engine + Send + 'static,
{
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<String>();
    let (output_tx, output_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let mut session = ReplaySession::<E>::new();
        while let Some(line) = command_rx.recv().await {
            let done = line.trim_start_matches('>').trim() == "replaydone";
            for block in session.handle_line(&line) {
                if output_tx.send(block).is_err() {
                    return;
                }
            }
            if done {
                return;
            }
        }
    });

    (
        SessionHandle {
            commands: command_tx,
        },
        output_rx,
    )
}
