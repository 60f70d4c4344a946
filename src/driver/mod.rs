//! The execution driver: owns the connection to a machine, powers its
//! drives up and down, and feeds it command streams while reporting what
//! happens to any registered [MachineListener].
//!
//! Everything runs on the caller's task. The waits below (for the machine
//! to come up, for a build to drain, for the operator) suspend that task
//! and nothing else.

mod poll;

pub use poll::{PollError, Poller};

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    CommandSource, ConfigNode, Connection, Connector, MachineListener, MachineState, ModelError, OperatorPrompt,
    ProgressEvent, SharedModel, StateChangeEvent, ToolStatus, ToolStatusEvent, TransportError,
};

/// Explicit knobs for an [ExecutionDriver].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// How often to ask a connecting machine if it is ready.
    pub connect_poll_interval: Duration,

    /// How often to ask a building machine if it is done.
    pub build_poll_interval: Duration,

    /// Give up connecting after this long.
    pub connect_timeout: Option<Duration>,

    /// Give up waiting for a build to drain after this long.
    pub build_timeout: Option<Duration>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            connect_poll_interval: Duration::from_millis(200),
            build_poll_interval: Duration::from_secs(1),
            connect_timeout: None,
            build_timeout: None,
        }
    }
}

/// Errors returned by the [ExecutionDriver].
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The operation needs a connection and there is none.
    #[error("not connected to a machine")]
    NotConnected,

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A wait was cancelled or ran out of time.
    #[error(transparent)]
    Poll(#[from] PollError),

    /// Disabling the drives failed again after the operator stepped in.
    #[error("unable to disengage drives: {0}")]
    DrivesNotDisabled(#[source] TransportError),

    /// Builds run at least once.
    #[error("repeat count must be at least 1")]
    InvalidRepeatCount,

    /// The operator could not be asked.
    #[error("unable to reach the operator: {0}")]
    Prompt(#[source] std::io::Error),
}

/// Error returned by [ExecutionDriver::connect].
pub type ConnectError = DriverError;

/// Drives one machine through one [Connector].
pub struct ExecutionDriver<ConnectorT>
where
    ConnectorT: Connector,
{
    connector: ConnectorT,
    connection: Option<ConnectorT::Connection>,
    model: SharedModel,
    settings: DriverSettings,
    state: MachineState,
    listeners: Vec<Box<dyn MachineListener>>,
    cancel: CancellationToken,
}

impl<ConnectorT> ExecutionDriver<ConnectorT>
where
    ConnectorT: Connector,
{
    /// Create a disconnected driver for the machine described by `model`.
    pub fn new(connector: ConnectorT, model: SharedModel, settings: DriverSettings) -> Self {
        Self {
            connector,
            connection: None,
            model,
            settings,
            state: MachineState::Idle,
            listeners: vec![],
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the token used to cancel waits and builds.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the driver at its next poll or command.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register a listener. Listeners are called in registration order.
    pub fn add_listener(&mut self, listener: impl MachineListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> MachineState {
        self.state
    }

    /// The model this driver updates.
    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    /// Settings this driver was built with.
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn notify(&self, what: &str, f: impl Fn(&dyn MachineListener) -> anyhow::Result<()>) {
        for listener in self.listeners.iter() {
            if let Err(e) = f(listener.as_ref()) {
                tracing::warn!(event = what, error = ?e, "listener failed");
            }
        }
    }

    fn set_state(&mut self, current: MachineState, message: Option<String>) {
        let event = StateChangeEvent {
            previous: self.state,
            current,
            message,
        };
        self.state = current;
        tracing::info!(from = %event.previous, to = %event.current, message = ?event.message, "machine state changed");
        self.notify("state", |l| l.machine_state_changed(&event));
    }

    fn notify_tool(&self, event: ToolStatusEvent) {
        self.notify("tool", |l| l.tool_status_changed(&event));
    }

    /// Record a failure. Transport failures lose the connection; anything
    /// else leaves it in place.
    fn fault(&mut self, err: DriverError) -> DriverError {
        let state = match err {
            DriverError::Transport(_) => {
                self.connection = None;
                MachineState::Disconnected
            }
            _ => MachineState::Error,
        };
        self.set_state(state, Some(err.to_string()));
        err
    }

    /// Open a connection to `address` and wait until the machine says it is
    /// ready. Failing leaves the model untouched.
    #[tracing::instrument(skip(self))]
    pub async fn connect(&mut self, address: &str) -> Result<(), ConnectError> {
        self.disconnect();
        self.set_state(MachineState::Connecting, Some(format!("connecting to {}", address)));

        let mut connection = match self.connector.open(address).await {
            Ok(connection) => connection,
            Err(e) => return Err(self.fault(e.into())),
        };

        let mut poller = Poller::new(
            self.settings.connect_poll_interval,
            self.settings.connect_timeout,
            self.cancel.clone(),
        );
        loop {
            match connection.is_ready().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => return Err(self.fault(e.into())),
            }
            if let Err(e) = poller.tick().await {
                self.set_state(MachineState::Disconnected, Some(e.to_string()));
                return Err(e.into());
            }
        }

        self.connection = Some(connection);
        self.set_state(MachineState::Ready, None);

        let current = self.model.read().await.current_tool().clone();
        if !current.is_null() {
            self.notify_tool(ToolStatusEvent {
                index: current.index,
                name: current.name,
                status: ToolStatus::Selected,
            });
        }
        Ok(())
    }

    /// [ExecutionDriver::connect], then load `config` into the model. The
    /// model only changes once the machine is ready.
    pub async fn connect_with_config(&mut self, config: &ConfigNode, address: &str) -> Result<(), ConnectError> {
        self.connect(address).await?;
        self.model.write().await.load_configuration(config);
        Ok(())
    }

    /// Drop the connection.
    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            self.set_state(MachineState::Disconnected, None);
        }
    }

    /// Power the drives.
    pub async fn enable_drives(&mut self) -> Result<(), DriverError> {
        let connection = self.connection.as_mut().ok_or(DriverError::NotConnected)?;
        connection.enable_drives().await?;
        self.model.write().await.enable_drives();
        Ok(())
    }

    /// Cut power to the drives. A transient fault is handed to `prompt` so
    /// someone can check the machine, after which the request is made once
    /// more; if that fails too, the failure is returned and the model still
    /// says the drives are on. Any other transport failure drops the
    /// connection.
    pub async fn disable_drives_with_retry<PromptT>(&mut self, prompt: &PromptT) -> Result<(), DriverError>
    where
        PromptT: OperatorPrompt,
    {
        let connection = self.connection.as_mut().ok_or(DriverError::NotConnected)?;
        let first = connection.disable_drives().await;

        match first {
            Ok(()) => {}
            Err(e) if e.is_retry() => {
                tracing::warn!(error = %e, "unable to disengage drives; asking the operator");
                prompt
                    .confirm("Unable to disengage drives. Check the machine, then press Enter to try again.")
                    .await
                    .map_err(DriverError::Prompt)?;
                connection
                    .disable_drives()
                    .await
                    .map_err(DriverError::DrivesNotDisabled)?;
            }
            Err(e) => return Err(self.fault(e.into())),
        }

        self.model.write().await.disable_drives();
        tracing::info!("drives disengaged");
        Ok(())
    }

    /// Make tool `index` current and tell the listeners.
    pub async fn select_tool(&mut self, index: usize) -> Result<(), ModelError> {
        let result = self
            .model
            .write()
            .await
            .select_tool(index)
            .map(|tool| tool.name.clone());

        let (name, status) = match &result {
            Ok(name) => (name.clone(), ToolStatus::Selected),
            Err(_) => (None, ToolStatus::Missing),
        };
        self.notify_tool(ToolStatusEvent {
            index: Some(index),
            name,
            status,
        });
        result.map(|_| ())
    }

    /// Send every command of `source` to the machine, `repeat` times. Each
    /// pass waits for the machine to finish before the next one starts.
    #[tracing::instrument(skip_all, fields(lines = source.len(), repeat = repeat))]
    pub async fn execute(&mut self, source: &CommandSource, repeat: u32) -> Result<(), DriverError> {
        if repeat == 0 {
            return Err(DriverError::InvalidRepeatCount);
        }
        if self.connection.is_none() {
            return Err(DriverError::NotConnected);
        }

        for iteration in 1..=repeat {
            if let Err(e) = self.run_pass(source, iteration, repeat).await {
                return Err(self.fault(e));
            }
        }
        Ok(())
    }

    async fn run_pass(&mut self, source: &CommandSource, iteration: u32, iterations: u32) -> Result<(), DriverError> {
        let poller = Poller::new(self.settings.build_poll_interval, None, self.cancel.clone());
        poller.check()?;

        self.set_state(MachineState::Building, Some(format!("pass {}/{}", iteration, iterations)));
        let started = Instant::now();
        let total_lines = source.len();

        for (sent, command) in source.iter().enumerate() {
            poller.check()?;

            let connection = self.connection.as_mut().ok_or(DriverError::NotConnected)?;
            tracing::trace!(command = %command, "sending");
            connection.send(command).await?;

            let event = ProgressEvent {
                lines_sent: sent + 1,
                total_lines,
                iteration,
                iterations,
                elapsed: started.elapsed(),
            };
            self.notify("progress", |l| l.machine_progress(&event));
        }

        self.await_completion().await?;
        self.set_state(MachineState::Ready, None);
        Ok(())
    }

    /// Wait until the machine reports it is no longer building.
    pub async fn await_completion(&mut self) -> Result<(), DriverError> {
        let mut poller = Poller::new(
            self.settings.build_poll_interval,
            self.settings.build_timeout,
            self.cancel.clone(),
        );
        loop {
            let connection = self.connection.as_mut().ok_or(DriverError::NotConnected)?;
            if !connection.is_building().await? {
                return Ok(());
            }
            poller.tick().await?;
        }
    }
}
