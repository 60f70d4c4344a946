//! Events reported to [MachineListener]s.

use std::{fmt, time::Duration};

use parse_display::Display;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::MachineListener;

/// Lifecycle of a machine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    /// No connection was ever attempted.
    Idle,
    /// Waiting for the machine to come up.
    Connecting,
    /// Connected and waiting for work.
    Ready,
    /// Working through a command stream.
    Building,
    /// The connection was lost or could not be made.
    Disconnected,
    /// Something went wrong; the connection is still held.
    Error,
}

impl MachineState {
    /// Connected and not building.
    pub fn is_ready(&self) -> bool {
        matches!(self, MachineState::Ready)
    }

    /// Working through a command stream.
    pub fn is_building(&self) -> bool {
        matches!(self, MachineState::Building)
    }
}

/// The machine moved from one state to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeEvent {
    /// State before the change.
    pub previous: MachineState,
    /// State after the change.
    pub current: MachineState,
    /// Why, if there is more to say.
    pub message: Option<String>,
}

/// How far into a build the driver is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Commands of this pass sent so far.
    pub lines_sent: usize,
    /// Commands in one pass.
    pub total_lines: usize,
    /// Current pass, starting at 1.
    pub iteration: u32,
    /// Number of passes requested.
    pub iterations: u32,
    /// Time since this pass started.
    pub elapsed: Duration,
}

impl ProgressEvent {
    /// Fraction of this pass sent, between 0 and 1.
    pub fn fraction(&self) -> f64 {
        if self.total_lines == 0 {
            return 1.0;
        }
        self.lines_sent as f64 / self.total_lines as f64
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.elapsed.as_secs();
        write!(
            f,
            "Commands: {}/{} ({:.1}%) pass {}/{} elapsed {:02}:{:02}:{:02}",
            self.lines_sent,
            self.total_lines,
            self.fraction() * 100.0,
            self.iteration,
            self.iterations,
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
        )
    }
}

/// What happened to a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// The tool is now current.
    Selected,
    /// The requested tool does not exist; the null tool is current.
    Missing,
}

/// Status of one tool changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatusEvent {
    /// Requested tool index, or `None` for the null tool.
    pub index: Option<usize>,
    /// Name of the tool, if it has one.
    pub name: Option<String>,
    /// What happened.
    pub status: ToolStatus,
}

/// Any event, as delivered by [ChannelListener].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineEvent {
    /// See [MachineListener::machine_state_changed].
    StateChanged(StateChangeEvent),
    /// See [MachineListener::machine_progress].
    Progress(ProgressEvent),
    /// See [MachineListener::tool_status_changed].
    ToolStatusChanged(ToolStatusEvent),
}

/// Listener forwarding every event into a channel, so slow consumers never
/// hold up dispatch. Events arrive in the order they happened.
#[derive(Debug, Clone)]
pub struct ChannelListener(mpsc::UnboundedSender<MachineEvent>);

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MachineEvent>) {
        let (send, recv) = mpsc::unbounded_channel();
        (Self(send), recv)
    }

    fn forward(&self, event: MachineEvent) -> anyhow::Result<()> {
        self.0
            .send(event)
            .map_err(|_| anyhow::anyhow!("event receiver was dropped"))
    }
}

impl MachineListener for ChannelListener {
    fn machine_state_changed(&self, event: &StateChangeEvent) -> anyhow::Result<()> {
        self.forward(MachineEvent::StateChanged(event.clone()))
    }

    fn machine_progress(&self, event: &ProgressEvent) -> anyhow::Result<()> {
        self.forward(MachineEvent::Progress(*event))
    }

    fn tool_status_changed(&self, event: &ToolStatusEvent) -> anyhow::Result<()> {
        self.forward(MachineEvent::ToolStatusChanged(event.clone()))
    }
}
