//! Subprocess-as-socket adapter for application mode.
//!
//! The spawned process is treated exactly like a dialed socket: its stdin
//! is the write end, and its stdout and stderr are drained by reader tasks
//! into one merged channel that forms the read end. The pipe lives in a
//! session record for the lifetime of the session and the child is killed
//! when the record is closed.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::TunnelError;
use crate::Result;

/// Chunk size for the stdout/stderr pump tasks.
const PUMP_BUF_SIZE: usize = 4096;

/// Bidirectional pipe to a spawned subprocess.
pub struct ProcessPipe {
    child: Child,
    stdin: ChildStdin,
    output: mpsc::Receiver<Vec<u8>>,
    /// Bytes received from the channel but not yet handed to a caller.
    pending: Vec<u8>,
}

impl ProcessPipe {
    /// Spawn `command`, tokenized on whitespace, inheriting the process
    /// environment, with all three stdio streams piped.
    pub fn spawn(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            TunnelError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty application command",
            ))
        })?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TunnelError::Spawn)?;

        let stdin = child.stdin.take().ok_or(TunnelError::Stdio("stdin"))?;
        let stdout = child.stdout.take().ok_or(TunnelError::Stdio("stdout"))?;
        let stderr = child.stderr.take().ok_or(TunnelError::Stdio("stderr"))?;

        // Both pumps feed one channel; when the last sender drops, the
        // receiver reports EOF.
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump(stdout, tx.clone(), "stdout"));
        tokio::spawn(pump(stderr, tx, "stderr"));

        Ok(Self {
            child,
            stdin,
            output: rx,
            pending: Vec::new(),
        })
    }

    /// Write `data` to the subprocess's stdin.
    pub async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(data).await?;
        self.stdin.flush().await
    }

    /// Read merged stdout/stderr output into `buf`.
    ///
    /// Waits for the next output chunk, then greedily pulls whatever else
    /// is already queued so one read can fill the caller's buffer the way
    /// a kernel socket read would. Returns `Ok(0)` once both pipes have
    /// closed and all buffered output is consumed.
    pub async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pending.is_empty() {
            match self.output.recv().await {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        while self.pending.len() < buf.len() {
            match self.output.try_recv() {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }

    /// Kill the subprocess.
    pub async fn close(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("application kill failed: {}", e);
        }
    }
}

/// Drain one child pipe into the merged output channel.
async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Vec<u8>>, name: &'static str) {
    let mut buf = vec![0u8; PUMP_BUF_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("application {} closed", name);
                break;
            }
            Ok(n) => {
                trace!("application {}: {} bytes", name, n);
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("application {} read error: {}", name, e);
                break;
            }
        }
    }
}
