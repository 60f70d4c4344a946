//! Usable working envelope of a machine.

use serde::{Deserialize, Serialize};

use super::Axis;

/// Whole-millimeter bounds of the build volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVolume {
    /// Extent along X.
    pub x: i32,
    /// Extent along Y.
    pub y: i32,
    /// Extent along Z.
    pub z: i32,
}

impl Default for BuildVolume {
    fn default() -> Self {
        Self::new(100, 100, 100)
    }
}

impl BuildVolume {
    /// Build a volume from its extents.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Extent along `axis`.
    pub fn get(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Overwrite the extent along `axis` with `length`, truncated towards
    /// zero.
    pub fn set(&mut self, axis: Axis, length: f64) {
        let length = length.trunc() as i32;
        match axis {
            Axis::X => self.x = length,
            Axis::Y => self.y = length,
            Axis::Z => self.z = length,
        }
    }
}

impl std::fmt::Display for BuildVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}mm", self.x, self.y, self.z)
    }
}
