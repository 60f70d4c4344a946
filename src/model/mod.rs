//! Geometry and configuration model of a 3-axis machine: axis limits and
//! scales, tools, clamps and the build volume.
//!
//! A [MachineModel] is loaded once from a [ConfigNode] tree and queried for
//! the rest of the session. It knows nothing about connections; see
//! [crate::ExecutionDriver] for that.

mod axis;
mod clamps;
mod tools;
mod volume;

pub use axis::{Axis, AxisConfig, AxisModel, Endstops, Point3};
pub use clamps::{Clamp, ClampRegistry};
pub use tools::{Tool, ToolRegistry, ToolSlot, MAX_TOOL_SLOTS};
pub use volume::BuildVolume;

use crate::ConfigNode;

/// Recoverable lookups of things the machine does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// No tool is configured at this index.
    #[error("Cannot use non-existent tool (#{0}).")]
    NoSuchTool(usize),

    /// No clamp is configured at this index.
    #[error("Cannot use non-existent clamp (#{0}).")]
    NoSuchClamp(usize),
}

/// Everything known about a machine's geometry and equipment.
#[derive(Debug, Clone)]
pub struct MachineModel {
    config: Option<ConfigNode>,
    axes: AxisModel,
    tools: ToolRegistry,
    clamps: ClampRegistry,
    build_volume: BuildVolume,
    drives_enabled: bool,
    gear_ratio: u32,
}

impl Default for MachineModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineModel {
    /// An unconfigured machine: unit scales, no tools, a 100mm cube.
    pub fn new() -> Self {
        Self {
            config: None,
            axes: AxisModel::default(),
            tools: ToolRegistry::default(),
            clamps: ClampRegistry::default(),
            build_volume: BuildVolume::default(),
            drives_enabled: true,
            gear_ratio: 0,
        }
    }

    /// Build a model straight from a configuration tree.
    pub fn from_config(node: &ConfigNode) -> Self {
        let mut model = Self::new();
        model.load_configuration(node);
        model
    }

    /// Replace everything derived from configuration with what `node`
    /// describes. Loading the same tree twice gives the same model. Drive
    /// state and gear ratio are left alone.
    #[tracing::instrument(skip_all, fields(machine = node.name()))]
    pub fn load_configuration(&mut self, node: &ConfigNode) {
        self.config = Some(node.clone());
        self.axes = AxisModel::default();
        self.tools = ToolRegistry::default();
        self.clamps = ClampRegistry::default();
        self.build_volume = BuildVolume::default();

        self.parse_axes(node);
        self.parse_clamps(node);
        self.parse_tools(node);
        self.parse_build_volume(node);
    }

    fn axis_nodes(node: &ConfigNode) -> impl Iterator<Item = (Axis, &ConfigNode)> {
        node.child("geometry")
            .into_iter()
            .flat_map(|geometry| geometry.children_named("axis"))
            .filter_map(|axis| {
                let id = axis.attribute("id").unwrap_or_default();
                match Axis::from_id(id) {
                    Some(parsed) => Some((parsed, axis)),
                    None => {
                        tracing::debug!(id = id, "ignoring unknown axis");
                        None
                    }
                }
            })
    }

    fn parse_axes(&mut self, node: &ConfigNode) {
        for (axis, axis_node) in Self::axis_nodes(node) {
            let config = self.axes.axis_mut(axis);
            config.apply(axis_node);
            tracing::debug!(
                axis = %axis,
                length = config.length,
                max_feedrate = config.max_feedrate,
                steps_per_mm = config.steps_per_mm,
                endstops = %config.endstops,
                "loaded axis"
            );
        }
    }

    fn parse_clamps(&mut self, node: &ConfigNode) {
        let Some(clamps) = node.child("clamps") else {
            return;
        };
        for clamp in clamps.children() {
            self.clamps.add(Clamp::from_config(clamp));
        }
    }

    fn parse_tools(&mut self, node: &ConfigNode) {
        let Some(tools) = node.child("tools") else {
            return;
        };
        for tool in tools.children_named("tool") {
            let index = self.tools.add_or_replace(Tool::from_config(tool));
            tracing::debug!(index = index, name = tool.attribute("name"), "loaded tool");
        }
    }

    fn parse_build_volume(&mut self, node: &ConfigNode) {
        for (axis, axis_node) in Self::axis_nodes(node) {
            let length = axis_node
                .attribute("length")
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|length| length.is_finite() && *length >= 0.0)
                .unwrap_or(100.0);
            self.build_volume.set(axis, length);
        }
    }

    /// `true` once a configuration has been loaded.
    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    /// The tree this model was last loaded from.
    pub fn config(&self) -> Option<&ConfigNode> {
        self.config.as_ref()
    }

    /// Per-axis limits and scales.
    pub fn axes(&self) -> &AxisModel {
        &self.axes
    }

    /// Length of every axis, in millimeters.
    pub fn maximum(&self) -> Point3 {
        self.axes.maximum()
    }

    /// Maximum feedrate of every axis, in mm/min.
    pub fn maximum_feedrates(&self) -> Point3 {
        self.axes.maximum_feedrates()
    }

    /// Steps per millimeter of every axis.
    pub fn steps_per_mm(&self) -> Point3 {
        self.axes.steps_per_mm()
    }

    /// Limit switch configuration of `axis`.
    pub fn endstops(&self, axis: Axis) -> Endstops {
        self.axes.axis(axis).endstops
    }

    /// See [AxisModel::steps_to_mm].
    pub fn steps_to_mm(&self, steps: i64, axis: Axis) -> f64 {
        self.axes.steps_to_mm(steps, axis)
    }

    /// See [AxisModel::mm_to_steps].
    pub fn mm_to_steps(&self, mm: f64, axis: Axis) -> i64 {
        self.axes.mm_to_steps(mm, axis)
    }

    /// See [AxisModel::point_steps_to_mm].
    pub fn point_steps_to_mm(&self, steps: Point3) -> Point3 {
        self.axes.point_steps_to_mm(steps)
    }

    /// See [AxisModel::point_mm_to_steps].
    pub fn point_mm_to_steps(&self, mm: Point3) -> Point3 {
        self.axes.point_mm_to_steps(mm)
    }

    /// Usable working envelope.
    pub fn build_volume(&self) -> BuildVolume {
        self.build_volume
    }

    /// Mark the drives as powered.
    pub fn enable_drives(&mut self) {
        self.drives_enabled = true;
    }

    /// Mark the drives as unpowered.
    pub fn disable_drives(&mut self) {
        self.drives_enabled = false;
    }

    /// Whether the drives are powered.
    pub fn drives_enabled(&self) -> bool {
        self.drives_enabled
    }

    /// Switch to another gear ratio.
    pub fn change_gear_ratio(&mut self, ratio_index: u32) {
        self.gear_ratio = ratio_index;
    }

    /// Selected gear ratio.
    pub fn gear_ratio(&self) -> u32 {
        self.gear_ratio
    }

    /// All configured tools and the current selection.
    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Every configured tool.
    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.tools.tools()
    }

    /// Make tool `index` current. A missing tool selects the null tool and
    /// hands the fault back; an unconfigured machine is expected to have no
    /// tools, so only configured machines log it.
    pub fn select_tool(&mut self, index: usize) -> Result<&Tool, ModelError> {
        let configured = self.is_configured();
        self.tools.select(index).inspect_err(|e| {
            if configured {
                tracing::error!(index = index, "{}", e);
            }
        })
    }

    /// The selected tool, or the null tool.
    pub fn current_tool(&self) -> &Tool {
        self.tools.current()
    }

    /// Look up tool `index`.
    pub fn get_tool(&self, index: usize) -> Result<&Tool, ModelError> {
        self.tools.get(index).inspect_err(|e| {
            tracing::error!(index = index, "{}", e);
        })
    }

    /// Append a tool after the last slot.
    pub fn add_tool(&mut self, tool: Tool) -> usize {
        self.tools.add(tool)
    }

    /// Replace the tool in an existing slot.
    pub fn set_tool(&mut self, index: usize, tool: Tool) -> Result<(), ModelError> {
        self.tools.set(index, tool).inspect_err(|e| {
            tracing::error!(index = index, "{}", e);
        })
    }

    /// All configured clamps.
    pub fn clamps(&self) -> &ClampRegistry {
        &self.clamps
    }

    /// Look up clamp `index`.
    pub fn get_clamp(&self, index: usize) -> Result<&Clamp, ModelError> {
        self.clamps.get(index).inspect_err(|e| {
            tracing::error!(index = index, "{}", e);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn axis(id: &str) -> ConfigNode {
        ConfigNode::new("axis").with_attribute("id", id)
    }

    fn machine(geometry: Vec<ConfigNode>) -> ConfigNode {
        let geometry = geometry
            .into_iter()
            .fold(ConfigNode::new("geometry"), ConfigNode::with_child);
        ConfigNode::new("machine").with_child(geometry)
    }

    fn cupcake() -> ConfigNode {
        machine(vec![
            axis("x")
                .with_attribute("length", "100")
                .with_attribute("maxfeedrate", "5000")
                .with_attribute("scale", "11.767463")
                .with_attribute("endstops", "min"),
            axis("y")
                .with_attribute("length", "100")
                .with_attribute("maxfeedrate", "5000")
                .with_attribute("scale", "11.767463")
                .with_attribute("endstops", "min"),
            axis("z")
                .with_attribute("length", "120.7")
                .with_attribute("maxfeedrate", "150")
                .with_attribute("scale", "320")
                .with_attribute("endstops", "max"),
        ])
        .with_child(
            ConfigNode::new("tools")
                .with_child(ConfigNode::new("tool").with_attribute("name", "Extruder"))
                .with_child(ConfigNode::new("tool").with_attribute("name", "Heater")),
        )
        .with_child(ConfigNode::new("clamps").with_child(ConfigNode::new("clamp").with_attribute("name", "bed")))
    }

    #[test]
    fn test_unconfigured_defaults() {
        let model = MachineModel::new();
        assert!(!model.is_configured());
        assert_eq!(model.build_volume(), BuildVolume::new(100, 100, 100));
        assert_eq!(model.steps_per_mm(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(model.maximum(), Point3::default());
        assert_eq!(model.maximum_feedrates(), Point3::default());
        assert!(model.drives_enabled());
        assert_eq!(model.gear_ratio(), 0);
        assert!(model.current_tool().is_null());
        assert_eq!(model.endstops(Axis::Z), Endstops::None);
    }

    #[test]
    fn test_load_cupcake() {
        let model = MachineModel::from_config(&cupcake());

        assert_eq!(model.maximum(), Point3::new(100.0, 100.0, 120.7));
        assert_eq!(model.maximum_feedrates(), Point3::new(5000.0, 5000.0, 150.0));
        assert_eq!(model.steps_per_mm(), Point3::new(11.767463, 11.767463, 320.0));
        assert_eq!(model.endstops(Axis::X), Endstops::Min);
        assert_eq!(model.endstops(Axis::Z), Endstops::Max);
        assert_eq!(model.build_volume(), BuildVolume::new(100, 100, 120));

        assert_eq!(model.tools().count(), 2);
        assert_eq!(model.current_tool().name.as_deref(), Some("Extruder"));
        assert_eq!(model.get_tool(1).unwrap().name.as_deref(), Some("Heater"));
        assert_eq!(model.clamps().len(), 1);
        assert_eq!(model.get_clamp(0).unwrap().name.as_deref(), Some("bed"));
        assert_eq!(model.get_clamp(1).err(), Some(ModelError::NoSuchClamp(1)));

        assert_eq!(model.mm_to_steps(1.0, Axis::Z), 320);
        assert_eq!(model.mm_to_steps(10.0, Axis::X), 118);
    }

    #[test]
    fn test_malformed_scale_keeps_default() {
        let model = MachineModel::from_config(&machine(vec![axis("x")
            .with_attribute("length", "200")
            .with_attribute("scale", "not-a-number")]));

        assert_eq!(model.maximum().x, 200.0);
        assert_eq!(model.steps_per_mm().x, 1.0);
        assert_eq!(model.mm_to_steps(3.0, Axis::X), 3);
    }

    #[test]
    fn test_build_volume_from_single_axis() {
        let model = MachineModel::from_config(&machine(vec![axis("x").with_attribute("length", "200")]));
        assert_eq!(model.build_volume(), BuildVolume::new(200, 100, 100));
    }

    #[test]
    fn test_build_volume_truncates_and_falls_back() {
        let model = MachineModel::from_config(&machine(vec![
            axis("X").with_attribute("length", "250.9"),
            axis("y").with_attribute("length", "wide"),
            axis("z"),
        ]));
        assert_eq!(model.build_volume(), BuildVolume::new(250, 100, 100));
        // A malformed length is still zero on the axis itself.
        assert_eq!(model.maximum(), Point3::new(250.9, 0.0, 0.0));
    }

    #[test]
    fn test_unknown_axes_are_ignored() {
        let model = MachineModel::from_config(&machine(vec![
            axis("a").with_attribute("length", "360"),
            ConfigNode::new("axis").with_attribute("length", "50"),
        ]));
        assert_eq!(model.maximum(), Point3::default());
        assert_eq!(model.build_volume(), BuildVolume::default());
    }

    #[test]
    fn test_reload_replaces_derived_state() {
        let mut model = MachineModel::from_config(&cupcake());
        model.disable_drives();
        model.change_gear_ratio(2);
        model.load_configuration(&cupcake());

        assert_eq!(model.tools().count(), 2);
        assert_eq!(model.clamps().len(), 1);
        assert_eq!(model.current_tool().index, Some(0));
        assert!(!model.drives_enabled());
        assert_eq!(model.gear_ratio(), 2);

        model.load_configuration(&machine(vec![axis("x").with_attribute("length", "10")]));
        assert_eq!(model.tools().count(), 0);
        assert!(model.current_tool().is_null());
        assert_eq!(model.steps_per_mm(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(model.build_volume(), BuildVolume::new(10, 100, 100));
    }

    #[test]
    fn test_select_tool_before_any_tool() {
        let mut model = MachineModel::new();
        assert_eq!(model.select_tool(0).err(), Some(ModelError::NoSuchTool(0)));
        assert!(model.current_tool().is_null());

        model.add_tool(Tool::default());
        assert_eq!(model.current_tool().index, Some(0));
    }

    #[test]
    fn test_sparse_tools_from_config() {
        let node = ConfigNode::new("machine").with_child(
            ConfigNode::new("tools")
                .with_child(ConfigNode::new("tool").with_attribute("name", "a"))
                .with_child(ConfigNode::new("tool").with_attribute("name", "d").with_attribute("index", "3")),
        );
        let mut model = MachineModel::from_config(&node);

        assert_eq!(model.tool_registry().len(), 4);
        assert_eq!(model.tool_registry().slots()[1], ToolSlot::Empty);
        assert_eq!(model.select_tool(3).unwrap().name.as_deref(), Some("d"));
        assert_eq!(model.select_tool(2).err(), Some(ModelError::NoSuchTool(2)));
        assert!(model.current_tool().is_null());

        assert_eq!(model.set_tool(9, Tool::default()), Err(ModelError::NoSuchTool(9)));
        model.set_tool(1, Tool::default()).unwrap();
        assert_eq!(model.get_tool(1).unwrap().index, Some(1));
    }

    #[test]
    fn test_out_of_range_tool_index_loads() {
        let node = ConfigNode::new("machine").with_child(
            ConfigNode::new("tools")
                .with_child(
                    ConfigNode::new("tool")
                        .with_attribute("name", "huge")
                        .with_attribute("index", "9223372036854775806"),
                )
                .with_child(
                    ConfigNode::new("tool")
                        .with_attribute("name", "wide")
                        .with_attribute("index", "2147483647"),
                ),
        );
        let mut model = MachineModel::new();
        model.load_configuration(&node);

        assert_eq!(model.tool_registry().len(), 2);
        assert_eq!(model.get_tool(0).unwrap().name.as_deref(), Some("huge"));
        assert_eq!(model.get_tool(1).unwrap().name.as_deref(), Some("wide"));
        assert_eq!(model.current_tool().index, Some(0));
    }
}
