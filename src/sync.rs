use crate::{MachineModel, Tool};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Wrapper around an `Arc<RwLock<MachineModel>>`, shared between the
/// driver, which mutates it, and anyone who wants to look at it while a
/// build runs.
#[derive(Clone, Debug, Default)]
pub struct SharedModel(
    /// Underlying shared model.
    pub Arc<RwLock<MachineModel>>,
);

impl From<MachineModel> for SharedModel {
    fn from(model: MachineModel) -> Self {
        Self(Arc::new(RwLock::new(model)))
    }
}

impl From<Arc<RwLock<MachineModel>>> for SharedModel {
    fn from(inner: Arc<RwLock<MachineModel>>) -> Self {
        Self(inner)
    }
}

impl SharedModel {
    /// Lock the model for reading.
    pub async fn read(&self) -> RwLockReadGuard<'_, MachineModel> {
        self.0.read().await
    }

    /// Lock the model for writing.
    pub async fn write(&self) -> RwLockWriteGuard<'_, MachineModel> {
        self.0.write().await
    }

    /// Consistent copy of the mutable bits of the model.
    pub async fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot::of(&*self.read().await)
    }

    /// [SharedModel::snapshot] without waiting, for synchronous callers
    /// such as listeners. `None` while the driver is writing.
    pub fn try_snapshot(&self) -> Option<ModelSnapshot> {
        self.0.try_read().ok().map(|model| ModelSnapshot::of(&model))
    }
}

/// State of a [MachineModel] at one instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSnapshot {
    /// Selected tool, or the null tool.
    pub current_tool: Tool,
    /// Whether the drives are powered.
    pub drives_enabled: bool,
    /// Selected gear ratio.
    pub gear_ratio: u32,
}

impl ModelSnapshot {
    fn of(model: &MachineModel) -> Self {
        Self {
            current_tool: model.current_tool().clone(),
            drives_enabled: model.drives_enabled(),
            gear_ratio: model.gear_ratio(),
        }
    }
}
