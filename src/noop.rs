//! `noop` implements a no-op transport, one that will accept every command
//! and do exactly nothing with it. Handy for dry runs.

use crate::{Connection as ConnectionTrait, Connector as ConnectorTrait, TransportError};

/// Noop-connector will connect to, well, anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct Noop {}

impl Noop {
    /// Return a new no-op connector.
    pub fn new() -> Self {
        Self {}
    }
}

/// Nothing to see here!
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Connection {
    sent: usize,
}

impl Connection {
    /// Number of commands swallowed so far.
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl ConnectorTrait for Noop {
    type Connection = Connection;

    async fn open(&self, address: &str) -> Result<Connection, TransportError> {
        tracing::debug!(address = address, "opening no-op connection");
        Ok(Connection::default())
    }
}

impl ConnectionTrait for Connection {
    async fn send(&mut self, _command: &str) -> Result<(), TransportError> {
        self.sent += 1;
        Ok(())
    }

    async fn is_ready(&mut self) -> Result<bool, TransportError> {
        Ok(true)
    }

    async fn is_building(&mut self) -> Result<bool, TransportError> {
        Ok(false)
    }

    async fn enable_drives(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disable_drives(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_swallows_everything() {
        let mut connection = Noop::new().open("/dev/null").await.unwrap();
        assert!(connection.is_ready().await.unwrap());
        connection.send("G28").await.unwrap();
        connection.send("G1 X10").await.unwrap();
        connection.disable_drives().await.unwrap();
        assert!(!connection.is_building().await.unwrap());
        assert_eq!(connection.sent(), 2);
    }
}
