use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

use crate::{Connection as ConnectionTrait, TransportError};

/// How long `is_ready` listens for the start banner per call.
const BANNER_WINDOW: Duration = Duration::from_millis(50);

/// Line-oriented gcode client over some byte stream: commands go out one
/// per line, and every command is answered by an `ok` line once the
/// firmware has taken it.
pub struct Client<StreamT>
where
    StreamT: AsyncRead + AsyncWrite,
{
    read: BufReader<ReadHalf<StreamT>>,
    write: WriteHalf<StreamT>,
    line: Vec<u8>,
    started: bool,
    ack_timeout: Duration,
    /// Commands written whose answer has not been read yet.
    unanswered: usize,
    cancel: CancellationToken,
}

impl<StreamT> Client<StreamT>
where
    StreamT: AsyncRead + AsyncWrite,
{
    /// Create a new [Client] over `stream`, giving up on a command if the
    /// machine stays silent for `ack_timeout`.
    pub fn new(stream: StreamT, ack_timeout: Duration) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            read: BufReader::new(read),
            write,
            line: vec![],
            started: false,
            ack_timeout,
            unanswered: 0,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waiting on the machine once `cancel` fires.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Read one line. Partial lines survive cancellation, since
    /// `read_until` appends to a buffer that lives on `self`.
    async fn read_line(&mut self) -> Result<String, TransportError> {
        if self.read.read_until(b'\n', &mut self.line).await? == 0 {
            return Err(TransportError::Closed);
        }
        let line = String::from_utf8_lossy(&self.line).trim().to_owned();
        self.line.clear();
        tracing::trace!(line = line, "received");
        Ok(line)
    }

    /// Read lines until the firmware answers the oldest unanswered command.
    /// Every line restarts the `ack_timeout` clock, so `busy` keep-alives
    /// hold the wait open while a long command runs.
    async fn read_answer(&mut self) -> Result<(), TransportError> {
        let cancel = self.cancel.clone();
        let ack_timeout = self.ack_timeout;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                line = tokio::time::timeout(ack_timeout, self.read_line()) => match line {
                    Ok(line) => line?,
                    Err(_) => return Err(TransportError::Retry(format!("machine silent for {:?}", ack_timeout))),
                },
            };

            if line == "ok" || line.starts_with("ok ") {
                return Ok(());
            }
            if line.starts_with("Error") || line.starts_with("!!") {
                return Err(TransportError::Protocol(line));
            }
            if line.starts_with("busy") || line.starts_with("echo:busy") {
                tracing::debug!(line = line, "machine busy");
            }
        }
    }

    /// Consume answers still owed for commands that timed out, so they are
    /// not taken for the answer to the next one.
    async fn resync(&mut self) -> Result<(), TransportError> {
        while self.unanswered > 0 {
            match self.read_answer().await {
                Ok(()) | Err(TransportError::Protocol(_)) => {
                    self.unanswered -= 1;
                    tracing::debug!(remaining = self.unanswered, "discarded late answer");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write one command and wait for the machine to take it.
    async fn request(&mut self, command: &str) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }
        self.resync().await?;

        tracing::trace!(command = command, "writing");
        self.write.write_all(format!("{}\r\n", command).as_bytes()).await?;
        self.write.flush().await?;
        self.unanswered += 1;

        match self.read_answer().await {
            Ok(()) => {
                self.unanswered -= 1;
                Ok(())
            }
            Err(TransportError::Protocol(line)) => {
                self.unanswered -= 1;
                Err(TransportError::Protocol(line))
            }
            Err(TransportError::Retry(why)) => Err(TransportError::Retry(format!("{}: {}", command, why))),
            Err(e) => Err(e),
        }
    }
}

/// Strip a trailing `;` comment and surrounding whitespace.
fn strip_comment(line: &str) -> &str {
    match line.split_once(';') {
        Some((command, _)) => command.trim(),
        None => line.trim(),
    }
}

impl<StreamT> ConnectionTrait for Client<StreamT>
where
    StreamT: AsyncRead + AsyncWrite,
{
    async fn send(&mut self, command: &str) -> Result<(), TransportError> {
        let command = strip_comment(command);
        if command.is_empty() {
            return Ok(());
        }
        self.request(command).await
    }

    async fn is_ready(&mut self) -> Result<bool, TransportError> {
        while !self.started {
            let line = match tokio::time::timeout(BANNER_WINDOW, self.read_line()).await {
                Ok(line) => line?,
                Err(_) => break,
            };
            // Leftovers from a previous session may precede the banner.
            if line.ends_with("start") {
                tracing::debug!("machine started");
                self.started = true;
            }
        }
        Ok(self.started)
    }

    async fn is_building(&mut self) -> Result<bool, TransportError> {
        // Every command has been acknowledged by the time send returns.
        Ok(false)
    }

    async fn enable_drives(&mut self) -> Result<(), TransportError> {
        self.request("M17").await
    }

    async fn disable_drives(&mut self) -> Result<(), TransportError> {
        self.request("M18").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::io::{AsyncReadExt, DuplexStream};

    const ACK: Duration = Duration::from_secs(2);

    async fn written(machine: &mut DuplexStream, len: usize) -> String {
        let mut buf = vec![0; len];
        machine.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_banner() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        assert!(!client.is_ready().await.unwrap());

        machine.write_all(b"echo: garbage\nsta").await.unwrap();
        assert!(!client.is_ready().await.unwrap());

        machine.write_all(b"rt\n").await.unwrap();
        assert!(client.is_ready().await.unwrap());
        assert!(client.is_ready().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_strips_comments() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        machine.write_all(b"ok\nok\n").await.unwrap();
        client.send("G28 ; home all").await.unwrap();
        client.send("   ; only a comment").await.unwrap();
        client.send("").await.unwrap();
        client.send("G1 X10 Y10").await.unwrap();

        assert_eq!(written(&mut machine, 17).await, "G28\r\nG1 X10 Y10\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_commands() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        machine.write_all(b"echo:ignored\nok\nok\n").await.unwrap();
        client.disable_drives().await.unwrap();
        client.enable_drives().await.unwrap();
        assert!(!client.is_building().await.unwrap());

        assert_eq!(written(&mut machine, 10).await, "M18\r\nM17\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_is_keep_alive() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        machine
            .write_all(b"echo:busy: processing\nok\nok\nError:Unknown command\n")
            .await
            .unwrap();
        client.disable_drives().await.unwrap();
        client.disable_drives().await.unwrap();
        assert!(matches!(client.send("G999").await.unwrap_err(), TransportError::Protocol(_)));

        assert_eq!(written(&mut machine, 16).await, "M18\r\nM18\r\nG999\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_restarts_ack_clock() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        let firmware = tokio::spawn(async move {
            for _ in 0..3 {
                tokio::time::sleep(ACK * 3 / 4).await;
                machine.write_all(b"busy: processing\n").await.unwrap();
            }
            machine.write_all(b"ok\n").await.unwrap();
            machine
        });

        // Homing outlasts the ack timeout, with a keep-alive every three
        // quarters of it.
        client.send("G28").await.unwrap();
        firmware.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_ack_is_not_reused() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        // Nothing answers in time.
        assert!(client.disable_drives().await.unwrap_err().is_retry());

        // The late answer to M18 arrives, then the answer to G999.
        machine.write_all(b"ok\nError:Unknown command\n").await.unwrap();
        let err = client.send("G999").await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(ref line) if line == "Error:Unknown command"));

        machine.write_all(b"ok\n").await.unwrap();
        client.enable_drives().await.unwrap();
        assert_eq!(written(&mut machine, 16).await, "M18\r\nG999\r\nM17\r\n");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_for_ack() {
        let (host, _machine) = tokio::io::duplex(1024);
        let cancel = CancellationToken::new();
        let mut client = Client::new(host, Duration::from_secs(3600)).with_cancellation_token(cancel.clone());

        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                cancel.cancel();
            }
        });
        assert!(matches!(client.disable_drives().await.unwrap_err(), TransportError::Cancelled));

        // Nothing more is written once cancelled.
        assert!(matches!(client.send("G28").await.unwrap_err(), TransportError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_firmware_errors() {
        let (host, mut machine) = tokio::io::duplex(1024);
        let mut client = Client::new(host, ACK);

        machine.write_all(b"Error:Unknown command\n").await.unwrap();
        let err = client.send("G999").await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol(ref line) if line == "Error:Unknown command"));

        drop(machine);
        assert!(matches!(client.is_ready().await.unwrap_err(), TransportError::Closed));
    }
}
