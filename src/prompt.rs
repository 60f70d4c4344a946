//! Asking the person at the machine to do something.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::OperatorPrompt;

/// Prompt on a pair of streams, usually the terminal: the message is
/// written out and the operator confirms by entering a line.
pub struct ConsolePrompt<InputT = BufReader<Stdin>, OutputT = Stdout> {
    input: Mutex<InputT>,
    output: Mutex<OutputT>,
    unattended: bool,
    cancel: CancellationToken,
}

impl ConsolePrompt {
    /// Prompt on stdin and stdout. An `unattended` prompt only logs its
    /// message and carries on without waiting.
    pub fn new(unattended: bool) -> Self {
        Self::with_streams(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), unattended)
    }
}

impl<InputT, OutputT> ConsolePrompt<InputT, OutputT>
where
    InputT: AsyncBufRead + Unpin,
    OutputT: AsyncWrite + Unpin,
{
    /// Prompt on arbitrary streams.
    pub fn with_streams(input: InputT, output: OutputT, unattended: bool) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
            unattended,
            cancel: CancellationToken::new(),
        }
    }

    /// Give up waiting for the operator once `cancel` fires.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

fn interrupted() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Interrupted, "cancelled while waiting for the operator")
}

impl<InputT, OutputT> OperatorPrompt for ConsolePrompt<InputT, OutputT>
where
    InputT: AsyncBufRead + Unpin,
    OutputT: AsyncWrite + Unpin,
{
    async fn confirm(&self, message: &str) -> std::io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(interrupted());
        }
        if self.unattended {
            tracing::info!(message = message, "not waiting for the operator");
            return Ok(());
        }

        {
            let mut output = self.output.lock().await;
            output.write_all(format!("{}\n", message).as_bytes()).await?;
            output.flush().await?;
        }

        let mut line = String::new();
        let mut input = self.input.lock().await;
        let read = tokio::select! {
            _ = self.cancel.cancelled() => return Err(interrupted()),
            read = input.read_line(&mut line) => read?,
        };
        if read == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "input closed while waiting for the operator",
            ));
        }
        Ok(())
    }
}
