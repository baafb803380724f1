//! In-process line server speaking the ASCII command protocol.
//!
//! A simulator implements [`Responder`]; [`spawn_line_simulator`] runs it on
//! the server half of a `tokio::io::duplex` pipe and hands back a
//! [`Connection`] on the client half. Every received command is appended to
//! a [`CommandLog`] so tests can assert on the exact wire text.

use std::sync::Arc;
use std::time::Duration;

use apex_core::Connection;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

/// Duplex buffer size; large enough for a full trace reply.
const PIPE_CAPACITY: usize = 256 * 1024;

/// Protocol behaviour of a simulated instrument.
pub trait Responder: Send + 'static {
    /// Handle one command line (terminator removed). `Some` is written back
    /// as one reply line; `None` means the command has no reply.
    fn respond(&mut self, command: &str) -> Option<String>;
}

/// Commands received by a simulator, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct CommandLog(Arc<Mutex<Vec<String>>>);

impl CommandLog {
    pub(crate) fn push(&self, command: String) {
        self.0.lock().push(command);
    }

    /// Snapshot of all commands.
    pub fn commands(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Most recent command.
    pub fn last(&self) -> Option<String> {
        self.0.lock().last().cloned()
    }

    /// Whether the exact command was received.
    pub fn contains(&self, command: &str) -> bool {
        self.0.lock().iter().any(|c| c == command)
    }

    /// Number of received commands starting with `prefix`.
    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Wait until `command` has been received; `false` after one second.
    ///
    /// Commands without a reply return to the caller as soon as they are
    /// written, before the simulator has processed them.
    pub async fn wait_for(&self, command: &str) -> bool {
        for _ in 0..200 {
            if self.contains(command) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// Forget every recorded command.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// Run `responder` behind an in-memory link.
///
/// Must be called from within a tokio runtime.
pub fn spawn_line_simulator<R: Responder>(responder: R, name: &str) -> (Connection, CommandLog) {
    let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
    let log = CommandLog::default();
    tokio::spawn(serve_lines(server, responder, log.clone(), name.to_string()));
    (Connection::new(Box::new(client), name), log)
}

async fn serve_lines<R: Responder>(stream: DuplexStream, mut responder: R, log: CommandLog, name: String) {
    let (read, mut write) = tokio::io::split(stream);
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let command = line.trim_end_matches('\r').to_string();
        tracing::trace!(simulator = %name, cmd = %command, "received");
        let reply = responder.respond(&command);
        log.push(command);
        if let Some(reply) = reply {
            let framed = format!("{}\n", reply);
            if write.write_all(framed.as_bytes()).await.is_err() {
                break;
            }
        }
    }
    tracing::debug!(simulator = %name, "simulator link closed");
}

/// Split a setter verb into its name and value: `DB[0]10.0` gives
/// `("DB[0]", "10.0")`, `SETWAVELENGTH[1]1550.000` gives
/// `("SETWAVELENGTH[1]", "1550.000")`, `L1` gives `("L", "1")`.
pub fn split_setter(verb: &str) -> (&str, &str) {
    let mut depth = 0usize;
    for (i, c) in verb.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            c if depth == 0 && (c.is_ascii_digit() || c == '-' || c == '+' || c == '.') => {
                return (&verb[..i], &verb[i..]);
            }
            _ => {}
        }
    }
    (verb, "")
}

/// Split `MOD[nn]:VERB` into its parts.
pub fn split_slot_command(command: &str) -> Option<(&str, u8, &str)> {
    let (head, verb) = command.split_once(':')?;
    let open = head.find('[')?;
    let module = &head[..open];
    let slot = head[open + 1..].strip_suffix(']')?.parse().ok()?;
    Some((module, slot, verb))
}
