//! Common traits used throughout this crate: the transport capability the
//! driver talks through, the operator it asks for help, and the listeners
//! it reports to.

use std::future::Future;

use crate::{ProgressEvent, StateChangeEvent, ToolStatusEvent};

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A transient hardware fault. The same request may succeed once
    /// someone has looked at the machine.
    #[error("transient machine fault: {0}")]
    Retry(String),

    /// The connection could not be opened.
    #[error("unable to connect on {address}: {message}")]
    Open {
        /// Address that was tried.
        address: String,
        /// Why it failed.
        message: String,
    },

    /// Reading from or writing to the machine failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The machine answered something we do not understand.
    #[error("unexpected reply from machine: {0}")]
    Protocol(String),

    /// The machine hung up.
    #[error("connection closed by machine")]
    Closed,

    /// The wait for the machine was cancelled.
    #[error("cancelled while waiting for the machine")]
    Cancelled,
}

impl TransportError {
    /// `true` if the failed request may be retried.
    pub fn is_retry(&self) -> bool {
        matches!(self, TransportError::Retry(_))
    }
}

/// Something that can open connections to a machine. Only drivers with a
/// transport implement this, so a driver without one can never be asked
/// to connect.
pub trait Connector {
    /// Connection handed out by [Connector::open].
    type Connection: Connection;

    /// Open a connection to the machine at `address` (a serial port path,
    /// for instance). The connection need not be ready yet.
    fn open(&self, address: &str) -> impl Future<Output = Result<Self::Connection, TransportError>>;
}

/// A live, exclusively owned connection to a machine.
pub trait Connection {
    /// Send one command.
    fn send(&mut self, command: &str) -> impl Future<Output = Result<(), TransportError>>;

    /// Whether the machine has finished starting up and accepts commands.
    fn is_ready(&mut self) -> impl Future<Output = Result<bool, TransportError>>;

    /// Whether the machine is still working through commands already sent.
    fn is_building(&mut self) -> impl Future<Output = Result<bool, TransportError>>;

    /// Power the stepper drives.
    fn enable_drives(&mut self) -> impl Future<Output = Result<(), TransportError>>;

    /// Cut power to the stepper drives, letting the axes move freely.
    fn disable_drives(&mut self) -> impl Future<Output = Result<(), TransportError>>;
}

/// A human standing next to the machine.
pub trait OperatorPrompt {
    /// Show `message` and wait until the operator confirms.
    fn confirm(&self, message: &str) -> impl Future<Output = std::io::Result<()>>;
}

/// Observer of a machine session. Calls are notifications made in the order
/// things happen at the driver; they must return quickly. An error is
/// logged and otherwise ignored.
pub trait MachineListener: Send {
    /// The machine moved to another lifecycle state.
    fn machine_state_changed(&self, _event: &StateChangeEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// More of the build has been sent.
    fn machine_progress(&self, _event: &ProgressEvent) -> anyhow::Result<()> {
        Ok(())
    }

    /// A tool was selected, or could not be.
    fn tool_status_changed(&self, _event: &ToolStatusEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
