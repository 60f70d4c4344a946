#![allow(refining_impl_trait)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]
#![deny(unused_import_braces)]
#![deny(unused_qualifications)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

//! This crate drives digital fabrication machines: it models a machine's
//! geometry and tooling from its configuration, and feeds it command files
//! over some transport, reporting progress as it goes.

pub mod config;
mod driver;
mod events;
mod model;
pub mod noop;
mod prompt;
#[cfg(feature = "serial")]
pub mod serial;
mod source;
mod sync;
pub mod toolpath;
mod traits;


pub use config::{Config, ConfigNode, DriverConfig, MachineDefinition, TransportConfig};
pub use driver::{ConnectError, DriverError, DriverSettings, ExecutionDriver, PollError, Poller};
pub use events::{
    ChannelListener, MachineEvent, MachineState, ProgressEvent, StateChangeEvent, ToolStatus, ToolStatusEvent,
};
pub use model::{
    Axis, AxisConfig, AxisModel, BuildVolume, Clamp, ClampRegistry, Endstops, MachineModel, ModelError, Point3, Tool,
    ToolRegistry, ToolSlot, MAX_TOOL_SLOTS,
};
pub use prompt::ConsolePrompt;
pub use source::{is_command_file, CommandSource, SourceError, SourceReader, TokioFs, COMMAND_FILE_EXTENSION};
pub use sync::{ModelSnapshot, SharedModel};
pub use traits::{Connection, Connector, MachineListener, OperatorPrompt, TransportError};
