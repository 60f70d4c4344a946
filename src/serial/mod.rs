//! Support for gcode machines on a serial line (usually a USB serial
//! adapter, `/dev/ttyUSB0` and friends).

mod client;

pub use client::Client;

use std::time::Duration;

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::sync::CancellationToken;

use crate::{Connector as ConnectorTrait, TransportError};

/// Opens serial connections at a fixed baud rate.
#[derive(Clone, Debug)]
pub struct Serial {
    baud: u32,
    ack_timeout: Duration,
    cancel: CancellationToken,
}

impl Serial {
    /// Default time a machine has to acknowledge a command.
    pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a connector talking at `baud`.
    pub fn new(baud: u32) -> Self {
        Self {
            baud,
            ack_timeout: Self::DEFAULT_ACK_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }

    /// Change how long a command may go unacknowledged.
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Connections stop waiting on the machine once `cancel` fires.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Baud rate used for new connections.
    pub fn baud(&self) -> u32 {
        self.baud
    }
}

impl ConnectorTrait for Serial {
    type Connection = Client<SerialStream>;

    async fn open(&self, address: &str) -> Result<Client<SerialStream>, TransportError> {
        let stream = tokio_serial::new(address, self.baud)
            .open_native_async()
            .map_err(|e| TransportError::Open {
                address: address.to_owned(),
                message: e.to_string(),
            })?;

        tracing::info!(port_name = address, baud = self.baud, "opened serial port");
        Ok(Client::new(stream, self.ack_timeout).with_cancellation_token(self.cancel.clone()))
    }
}
