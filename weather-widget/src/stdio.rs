//! JSON-lines event bridge: inbound events on stdin, client messages on stdout.

use anyhow::{Context, Result};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use weather_widget_core::{ClientMessage, EventBridge, InboundEvent};

/// Queues client messages for a single writer task.
#[derive(Debug)]
pub struct StdoutBridge {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl StdoutBridge {
    /// Returns the bridge and the writer task, which ends once every bridge
    /// handle has been dropped.
    pub fn spawn() -> (Self, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_messages(rx, tokio::io::stdout()));
        (Self { tx }, writer)
    }
}

impl EventBridge for StdoutBridge {
    fn send(&self, message: ClientMessage) {
        if self.tx.send(message).is_err() {
            tracing::warn!("Client output closed, dropping message");
        }
    }
}

async fn write_messages(
    mut rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut stdout: Stdout,
) -> Result<()> {
    while let Some(message) = rx.recv().await {
        let line = encode(&message)?;
        stdout
            .write_all(line.as_bytes())
            .await
            .context("Failed to write client message")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }
    Ok(())
}

fn encode(message: &ClientMessage) -> Result<String> {
    let mut line = serde_json::to_string(message).context("Failed to encode client message")?;
    line.push('\n');
    Ok(line)
}

/// Parse one stdin line. Blank and malformed lines yield `None`.
pub fn parse_event(line: &str) -> Option<InboundEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::warn!(error = %err, "Ignoring malformed event");
            None
        }
    }
}
