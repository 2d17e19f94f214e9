//! Runner process supervision.
//!
//! Each match gets one isolated simulation process. The server forwards every
//! broadcast frame into the process over stdin and waits for exactly one of
//! two completions: a terminal result frame on stdout, or process exit.
//! Whichever happens first settles the match's one-shot outcome; the loser is
//! ignored. Stopping is always graceful, via a zero-length sentinel frame
//! rather than a kill.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use log::{debug, error, warn};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;

use shared::frame::{read_frame, write_frame};
use shared::protocol::RunnerReport;

use crate::config::Config;
use crate::game::GameId;
use crate::network::ServerEvent;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("runner exited with status {0:?} before reporting a result")]
    Exited(Option<i32>),
    #[error("runner pipe failed: {0}")]
    Io(#[from] io::Error),
    #[error("runner result was undecodable: {0}")]
    BadReport(#[from] bincode::Error),
}

/// Command consumed by the task owning the runner's stdin.
#[derive(Debug, PartialEq, Eq)]
pub enum RunnerCmd {
    Forward(Vec<u8>),
    Stop,
}

/// Channel-backed handle to a runner process. Tests substitute a loopback
/// handle and inspect the command stream directly.
#[derive(Clone)]
pub struct RunnerHandle {
    cmd_tx: mpsc::UnboundedSender<RunnerCmd>,
}

impl RunnerHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<RunnerCmd>) -> Self {
        Self { cmd_tx }
    }

    /// A handle wired to nothing but a receiver, for tests.
    pub fn loopback() -> (Self, mpsc::UnboundedReceiver<RunnerCmd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Forwards serialized packet bytes to the process.
    pub fn send(&self, raw: Vec<u8>) {
        let _ = self.cmd_tx.send(RunnerCmd::Forward(raw));
    }

    /// Requests a graceful shutdown via the exit sentinel.
    pub fn stop(&self) {
        let _ = self.cmd_tx.send(RunnerCmd::Stop);
    }
}

fn runner_executable(config: &Config) -> PathBuf {
    if let Some(bin) = &config.runner_bin {
        return bin.clone();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("runner")))
        .unwrap_or_else(|| PathBuf::from("runner"))
}

/// Spawns the simulation process for one match and wires its supervision.
///
/// The returned handle feeds stdin through a writer task. A supervisor task
/// races the first stdout result frame against process exit and delivers the
/// outcome exactly once as a [`ServerEvent::RunnerSettled`].
pub fn spawn(
    game_id: GameId,
    config: &Config,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> io::Result<RunnerHandle> {
    let mut command = Command::new(runner_executable(config));
    command.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::inherit());
    if let Some(token) = &config.service_token {
        command.env("SERVICE_TOKEN", token);
    }
    let mut child = command.spawn()?;

    let mut stdin = child.stdin.take().expect("runner stdin was requested piped");
    let mut stdout = child.stdout.take().expect("runner stdout was requested piped");

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();

    // Writer task: sole owner of the child's stdin.
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            let result = match cmd {
                RunnerCmd::Forward(raw) => write_frame(&mut stdin, &raw).await,
                RunnerCmd::Stop => {
                    debug!("sending exit sentinel to runner of game {}", game_id);
                    write_frame(&mut stdin, &[]).await
                }
            };
            if let Err(e) = result {
                warn!("runner stdin for game {} closed: {}", game_id, e);
                break;
            }
        }
        let _ = stdin.shutdown().await;
    });

    // Supervisor task: settles the one-shot outcome and reaps the child.
    tokio::spawn(async move {
        let outcome = tokio::select! {
            report = read_report(&mut stdout) => {
                // Result won the race; still reap the process afterwards.
                let outcome = report;
                let _ = child.wait().await;
                outcome
            }
            status = child.wait() => match status {
                Ok(status) => Err(RunnerError::Exited(status.code())),
                Err(e) => Err(RunnerError::Io(e)),
            },
        };
        let _ = events.send(ServerEvent::RunnerSettled { game: game_id, outcome });
    });

    Ok(RunnerHandle::new(cmd_tx))
}

async fn read_report<R: tokio::io::AsyncRead + Unpin>(
    stdout: &mut R,
) -> Result<RunnerReport, RunnerError> {
    match read_frame(stdout).await? {
        Some(raw) => Ok(bincode::deserialize(&raw)?),
        // Clean EOF with no report still counts as exiting before a result;
        // the racing wait() branch normally reports the status first.
        None => Err(RunnerError::Exited(None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_orders_are_observable_and_ordered() {
        let (handle, mut rx) = RunnerHandle::loopback();
        handle.send(vec![1, 2, 3]);
        handle.stop();
        assert_eq!(rx.try_recv().unwrap(), RunnerCmd::Forward(vec![1, 2, 3]));
        assert_eq!(rx.try_recv().unwrap(), RunnerCmd::Stop);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn report_decoding_rejects_garbage() {
        let mut framed = Vec::new();
        write_frame(&mut framed, &[0xFF, 0xFE]).await.unwrap();
        let mut reader = framed.as_slice();
        assert!(matches!(read_report(&mut reader).await, Err(RunnerError::BadReport(_))));
    }

    #[tokio::test]
    async fn eof_before_any_report_is_an_exit() {
        let mut reader: &[u8] = &[];
        assert!(matches!(read_report(&mut reader).await, Err(RunnerError::Exited(None))));
    }
}
