//! Per-axis limits and the steps <-> millimeters conversions.

use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

use crate::ConfigNode;

/// One of the three linear motion dimensions of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromStr, Serialize, Deserialize)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// Left and right.
    X,
    /// Front to back.
    Y,
    /// Up and down.
    Z,
}

impl Axis {
    /// All axes, in X, Y, Z order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Match an axis identifier from a configuration, ignoring case.
    /// Anything other than `x`, `y` or `z` is not an axis.
    pub fn from_id(id: &str) -> Option<Self> {
        id.trim().to_lowercase().parse().ok()
    }
}

/// Limit switch configuration of an axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, FromStr, Serialize, Deserialize)]
#[display(style = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Endstops {
    /// No limit switches.
    #[default]
    None,
    /// A switch at the minimum end of travel.
    Min,
    /// A switch at the maximum end of travel.
    Max,
    /// Switches at both ends of travel.
    Both,
}

/// A value per axis. Used for positions, lengths, feedrates and scales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Point3 {
    /// Build a point from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component along `axis`.
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn get_mut(&mut self, axis: Axis) -> &mut f64 {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }
}

/// Configuration of a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Travel, in millimeters.
    pub length: f64,
    /// Fastest allowed move, in mm/min.
    pub max_feedrate: f64,
    /// Motor steps per millimeter of travel. Never zero.
    pub steps_per_mm: f64,
    /// Limit switches.
    pub endstops: Endstops,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            length: 0.0,
            max_feedrate: 0.0,
            steps_per_mm: 1.0,
            endstops: Endstops::None,
        }
    }
}

impl AxisConfig {
    /// Overlay the attributes of an `axis` node onto `self`. Every field is
    /// parsed on its own; one that is missing or malformed keeps its current
    /// value and leaves the others alone.
    pub fn apply(&mut self, node: &ConfigNode) {
        if let Some(length) = parse_field(node, "length", |v| v >= 0.0) {
            self.length = length;
        }
        if let Some(feedrate) = parse_field(node, "maxfeedrate", |v| v >= 0.0) {
            self.max_feedrate = feedrate;
        }
        // Zero would turn every steps -> mm conversion into a division by zero.
        if let Some(scale) = parse_field(node, "scale", |v| v != 0.0) {
            self.steps_per_mm = scale;
        }
        self.endstops = match node.attribute("endstops") {
            None => Endstops::None,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(value = raw, "unrecognized endstops value; using none");
                Endstops::None
            }),
        };
    }
}

fn parse_field(node: &ConfigNode, key: &str, valid: impl Fn(f64) -> bool) -> Option<f64> {
    let raw = node.attribute(key)?;
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && valid(value) => Some(value),
        _ => {
            tracing::warn!(attribute = key, value = raw, "ignoring malformed axis attribute");
            None
        }
    }
}

/// Limits and scales of all three axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisModel {
    x: AxisConfig,
    y: AxisConfig,
    z: AxisConfig,
}

impl AxisModel {
    /// Configuration of `axis`.
    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    pub(crate) fn axis_mut(&mut self, axis: Axis) -> &mut AxisConfig {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    fn collect(&self, field: impl Fn(&AxisConfig) -> f64) -> Point3 {
        let mut point = Point3::default();
        for axis in Axis::ALL {
            *point.get_mut(axis) = field(self.axis(axis));
        }
        point
    }

    /// Length of every axis.
    pub fn maximum(&self) -> Point3 {
        self.collect(|a| a.length)
    }

    /// Maximum feedrate of every axis.
    pub fn maximum_feedrates(&self) -> Point3 {
        self.collect(|a| a.max_feedrate)
    }

    /// Steps per millimeter of every axis.
    pub fn steps_per_mm(&self) -> Point3 {
        self.collect(|a| a.steps_per_mm)
    }

    /// Convert a motor step count on `axis` to millimeters.
    pub fn steps_to_mm(&self, steps: i64, axis: Axis) -> f64 {
        steps as f64 / self.axis(axis).steps_per_mm
    }

    /// Convert millimeters on `axis` to a motor step count.
    ///
    /// Rounds to the nearest step, with halfway cases rounded away from
    /// zero (`2.5` -> `3`, `-2.5` -> `-3`).
    pub fn mm_to_steps(&self, mm: f64, axis: Axis) -> i64 {
        (mm * self.axis(axis).steps_per_mm).round() as i64
    }

    /// [AxisModel::steps_to_mm] for every component of `steps`.
    pub fn point_steps_to_mm(&self, steps: Point3) -> Point3 {
        let mut mm = Point3::default();
        for axis in Axis::ALL {
            *mm.get_mut(axis) = steps.get(axis) / self.axis(axis).steps_per_mm;
        }
        mm
    }

    /// [AxisModel::mm_to_steps] for every component of `mm`. The result
    /// holds whole step counts.
    pub fn point_mm_to_steps(&self, mm: Point3) -> Point3 {
        let mut steps = Point3::default();
        for axis in Axis::ALL {
            *steps.get_mut(axis) = (mm.get(axis) * self.axis(axis).steps_per_mm).round();
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn axis(id: &str) -> ConfigNode {
        ConfigNode::new("axis").with_attribute("id", id)
    }

    #[test]
    fn test_axis_ids_ignore_case() {
        assert_eq!(Axis::from_id("x"), Some(Axis::X));
        assert_eq!(Axis::from_id("Y"), Some(Axis::Y));
        assert_eq!(Axis::from_id(" z "), Some(Axis::Z));
        assert_eq!(Axis::from_id("a"), None);
        assert_eq!(Axis::from_id(""), None);
    }

    #[test]
    fn test_default_scale_rounds() {
        let model = AxisModel::default();
        for axis in Axis::ALL {
            assert_eq!(model.mm_to_steps(0.0, axis), 0);
            assert_eq!(model.mm_to_steps(1.4, axis), 1);
            assert_eq!(model.mm_to_steps(1.6, axis), 2);
            assert_eq!(model.mm_to_steps(-1.6, axis), -2);
            assert_eq!(model.steps_to_mm(7, axis), 7.0);
        }
    }

    #[test]
    fn test_halfway_rounds_away_from_zero() {
        let model = AxisModel::default();
        assert_eq!(model.mm_to_steps(2.5, Axis::X), 3);
        assert_eq!(model.mm_to_steps(-2.5, Axis::X), -3);
        assert_eq!(model.mm_to_steps(0.5, Axis::Y), 1);
        assert_eq!(model.mm_to_steps(-0.5, Axis::Y), -1);
    }

    #[test]
    fn test_round_trip_within_half_a_step() {
        let mut model = AxisModel::default();
        model.axis_mut(Axis::X).steps_per_mm = 11.767463;
        model.axis_mut(Axis::Y).steps_per_mm = 80.0;
        model.axis_mut(Axis::Z).steps_per_mm = 320.0;

        for axis in Axis::ALL {
            let bound = 0.5 / model.axis(axis).steps_per_mm;
            for mm in [0.0, 0.01, 1.0, 12.345, 99.999, -42.4242, 250.0] {
                let back = model.steps_to_mm(model.mm_to_steps(mm, axis), axis);
                assert!((back - mm).abs() <= bound, "{axis}: {mm} came back as {back}");
            }
        }
    }

    #[test]
    fn test_exact_conversions() {
        let mut model = AxisModel::default();
        model.axis_mut(Axis::Z).steps_per_mm = 200.0;
        assert_eq!(model.mm_to_steps(1.25, Axis::Z), 250);
        assert_eq!(model.steps_to_mm(250, Axis::Z), 1.25);
        assert_eq!(model.mm_to_steps(0.0025, Axis::Z), 1);
        assert_eq!(model.mm_to_steps(0.0024, Axis::Z), 0);

        let steps = model.point_mm_to_steps(Point3::new(1.4, 2.5, 1.25));
        assert_eq!(steps, Point3::new(1.0, 3.0, 250.0));
        assert_eq!(model.point_steps_to_mm(steps), Point3::new(1.0, 3.0, 1.25));
    }

    #[test]
    fn test_apply_full_axis() {
        let mut config = AxisConfig::default();
        config.apply(
            &axis("x")
                .with_attribute("length", "200")
                .with_attribute("maxfeedrate", "5000")
                .with_attribute("scale", "11.767463")
                .with_attribute("endstops", "both"),
        );
        assert_eq!(
            config,
            AxisConfig {
                length: 200.0,
                max_feedrate: 5000.0,
                steps_per_mm: 11.767463,
                endstops: Endstops::Both,
            }
        );
    }

    #[test]
    fn test_malformed_field_keeps_its_default_only() {
        let mut config = AxisConfig::default();
        config.apply(
            &axis("x")
                .with_attribute("length", "150")
                .with_attribute("maxfeedrate", "fast")
                .with_attribute("scale", "eleven"),
        );
        assert_eq!(config.length, 150.0);
        assert_eq!(config.max_feedrate, 0.0);
        assert_eq!(config.steps_per_mm, 1.0);

        let mut config = AxisConfig::default();
        config.apply(&axis("y").with_attribute("length", "oops").with_attribute("scale", "80"));
        assert_eq!(config.length, 0.0);
        assert_eq!(config.steps_per_mm, 80.0);
    }

    #[test]
    fn test_zero_scale_is_rejected() {
        let mut config = AxisConfig::default();
        config.apply(&axis("z").with_attribute("scale", "0"));
        assert_eq!(config.steps_per_mm, 1.0);

        config.apply(&axis("z").with_attribute("scale", "NaN"));
        assert_eq!(config.steps_per_mm, 1.0);
    }

    #[test]
    fn test_endstops_fallback() {
        let mut config = AxisConfig::default();
        config.apply(&axis("x").with_attribute("endstops", "max"));
        assert_eq!(config.endstops, Endstops::Max);

        config.apply(&axis("x").with_attribute("endstops", "sideways"));
        assert_eq!(config.endstops, Endstops::None);

        config.apply(&axis("x").with_attribute("endstops", "min"));
        config.apply(&axis("x"));
        assert_eq!(config.endstops, Endstops::None);
    }
}
