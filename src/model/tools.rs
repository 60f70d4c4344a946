//! Tool (extruder, spindle, ...) bookkeeping.

use crate::{ConfigNode, ModelError};

/// Highest slot count a registry grows to for an explicit index.
pub const MAX_TOOL_SLOTS: usize = 256;

/// An addressable effector of the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tool {
    /// Slot this tool occupies. `None` until the tool is placed in a
    /// registry, after which it is always set.
    pub index: Option<usize>,

    /// Human readable name, if configured.
    pub name: Option<String>,

    /// Everything the configuration says about this tool.
    pub config: ConfigNode,
}

impl Tool {
    /// Build a tool from a `tool` node. A missing, malformed or negative
    /// `index` attribute leaves the slot to be picked by the registry.
    pub fn from_config(node: &ConfigNode) -> Self {
        let index = node
            .attribute("index")
            .and_then(|raw| raw.trim().parse::<i32>().ok())
            .and_then(|index| usize::try_from(index).ok());

        Self {
            index,
            name: node.attribute("name").map(str::to_owned),
            config: node.clone(),
        }
    }

    /// `true` for the "no tool selected" sentinel.
    pub fn is_null(&self) -> bool {
        self.index.is_none()
    }
}

/// One slot of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolSlot {
    /// Nothing was ever configured for this index.
    #[default]
    Empty,

    /// A configured tool.
    Occupied(Tool),
}

impl ToolSlot {
    /// The tool in this slot, if any.
    pub fn tool(&self) -> Option<&Tool> {
        match self {
            ToolSlot::Empty => None,
            ToolSlot::Occupied(tool) => Some(tool),
        }
    }
}

/// Index addressed collection of tools plus the currently selected one.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    slots: Vec<ToolSlot>,
    current: Option<usize>,
    null_tool: Tool,
}

impl ToolRegistry {
    /// Number of slots, empty ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when no slot exists at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All slots, in index order.
    pub fn slots(&self) -> &[ToolSlot] {
        &self.slots
    }

    /// Every configured tool, skipping empty slots.
    pub fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.slots.iter().filter_map(ToolSlot::tool)
    }

    /// Place `tool` in the registry and return the slot it landed in.
    ///
    /// A tool without an index is appended after the last slot. A tool with
    /// an index replaces whatever is in that slot, growing the registry with
    /// empty slots if the index is past the end. An index at or beyond
    /// [MAX_TOOL_SLOTS] is ignored and the tool appended instead. The first
    /// tool added while nothing is selected becomes the current tool.
    pub fn add_or_replace(&mut self, mut tool: Tool) -> usize {
        let index = match tool.index {
            None => self.slots.len(),
            Some(index) if index < MAX_TOOL_SLOTS => index,
            Some(index) => {
                tracing::warn!(
                    index = index,
                    max = MAX_TOOL_SLOTS,
                    name = ?tool.name,
                    "tool index out of range; assigning the next free slot"
                );
                self.slots.len()
            }
        };
        if index >= self.slots.len() {
            self.slots.resize(index + 1, ToolSlot::Empty);
        }
        tool.index = Some(index);
        self.slots[index] = ToolSlot::Occupied(tool);

        if self.current.is_none() {
            self.current = Some(index);
        }
        index
    }

    /// Append `tool` after the last slot, whatever index it carries.
    pub fn add(&mut self, mut tool: Tool) -> usize {
        tool.index = None;
        self.add_or_replace(tool)
    }

    /// Replace the tool in an existing slot.
    pub fn set(&mut self, index: usize, mut tool: Tool) -> Result<(), ModelError> {
        let slot = self.slots.get_mut(index).ok_or(ModelError::NoSuchTool(index))?;
        tool.index = Some(index);
        *slot = ToolSlot::Occupied(tool);
        Ok(())
    }

    /// Look up the tool in slot `index`.
    pub fn get(&self, index: usize) -> Result<&Tool, ModelError> {
        self.slots
            .get(index)
            .and_then(ToolSlot::tool)
            .ok_or(ModelError::NoSuchTool(index))
    }

    /// Make the tool in slot `index` current. When there is no such tool the
    /// selection falls back to the null tool and the fault is returned.
    pub fn select(&mut self, index: usize) -> Result<&Tool, ModelError> {
        if self.slots.get(index).and_then(ToolSlot::tool).is_some() {
            self.current = Some(index);
            Ok(self.current())
        } else {
            self.current = None;
            Err(ModelError::NoSuchTool(index))
        }
    }

    /// The selected tool, or the null tool when nothing is selected.
    pub fn current(&self) -> &Tool {
        self.current
            .and_then(|index| self.slots.get(index))
            .and_then(ToolSlot::tool)
            .unwrap_or(&self.null_tool)
    }

    /// The "no tool selected" sentinel.
    pub fn null_tool(&self) -> &Tool {
        &self.null_tool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tool(name: &str) -> Tool {
        Tool {
            name: Some(name.to_owned()),
            ..Default::default()
        }
    }

    fn tool_at(name: &str, index: usize) -> Tool {
        Tool {
            index: Some(index),
            ..tool(name)
        }
    }

    #[test]
    fn test_auto_indices_append() {
        let mut registry = ToolRegistry::default();
        assert_eq!(registry.add_or_replace(tool("a")), 0);
        assert_eq!(registry.add_or_replace(tool("b")), 1);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0).unwrap().index, Some(0));
        assert_eq!(registry.get(1).unwrap().name.as_deref(), Some("b"));
    }

    #[test]
    fn test_explicit_index_grows_with_empty_slots() {
        let mut registry = ToolRegistry::default();
        registry.add_or_replace(tool("a"));
        assert_eq!(registry.add_or_replace(tool_at("d", 3)), 3);

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.slots()[1], ToolSlot::Empty);
        assert_eq!(registry.slots()[2], ToolSlot::Empty);
        assert_eq!(registry.get(3).unwrap().name.as_deref(), Some("d"));
        assert_eq!(registry.get(2), Err(ModelError::NoSuchTool(2)));
        assert_eq!(registry.tools().count(), 2);

        // The next automatic slot is after the grown end.
        assert_eq!(registry.add_or_replace(tool("e")), 4);
    }

    #[test]
    fn test_explicit_index_overwrites() {
        let mut registry = ToolRegistry::default();
        registry.add_or_replace(tool("a"));
        registry.add_or_replace(tool_at("b", 0));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(0).unwrap().name.as_deref(), Some("b"));
    }

    #[test]
    fn test_first_tool_becomes_current() {
        let mut registry = ToolRegistry::default();
        assert!(registry.current().is_null());

        registry.add_or_replace(tool_at("b", 2));
        registry.add_or_replace(tool("c"));
        assert_eq!(registry.current().index, Some(2));
    }

    #[test]
    fn test_select_missing_tool_falls_back_to_null() {
        let mut registry = ToolRegistry::default();
        assert_eq!(registry.select(0).err(), Some(ModelError::NoSuchTool(0)));
        assert!(registry.current().is_null());

        registry.add_or_replace(tool("a"));
        registry.add_or_replace(tool_at("c", 2));
        assert_eq!(registry.select(2).unwrap().name.as_deref(), Some("c"));

        assert_eq!(registry.select(1).err(), Some(ModelError::NoSuchTool(1)));
        assert!(registry.current().is_null());
        assert_eq!(registry.current(), registry.null_tool());
    }

    #[test]
    fn test_add_and_set() {
        let mut registry = ToolRegistry::default();
        assert_eq!(registry.add(tool_at("a", 5)), 0);
        assert_eq!(registry.set(1, tool("b")), Err(ModelError::NoSuchTool(1)));
        registry.set(0, tool("b")).unwrap();
        assert_eq!(registry.get(0).unwrap().name.as_deref(), Some("b"));
        assert_eq!(registry.get(0).unwrap().index, Some(0));
    }

    #[test]
    fn test_tool_from_config() {
        let node = ConfigNode::new("tool").with_attribute("name", "Pinch").with_attribute("index", "2");
        let parsed = Tool::from_config(&node);
        assert_eq!(parsed.index, Some(2));
        assert_eq!(parsed.name.as_deref(), Some("Pinch"));

        for raw in ["-1", "two", ""] {
            let node = ConfigNode::new("tool").with_attribute("index", raw);
            assert_eq!(Tool::from_config(&node).index, None);
        }
        assert_eq!(Tool::from_config(&ConfigNode::new("tool")).index, None);
    }

    #[test]
    fn test_huge_index_is_appended() {
        let mut registry = ToolRegistry::default();

        // Past i32, so the attribute does not parse as an index at all.
        let node = ConfigNode::new("tool")
            .with_attribute("name", "Far")
            .with_attribute("index", "9223372036854775806");
        let far = Tool::from_config(&node);
        assert_eq!(far.index, None);
        assert_eq!(registry.add_or_replace(far), 0);

        // Parses, but is past the slot cap.
        let node = ConfigNode::new("tool")
            .with_attribute("name", "Farther")
            .with_attribute("index", "2147483647");
        let farther = Tool::from_config(&node);
        assert_eq!(farther.index, Some(2147483647));
        assert_eq!(registry.add_or_replace(farther), 1);

        assert_eq!(registry.add_or_replace(tool_at("edge", MAX_TOOL_SLOTS)), 2);
        assert_eq!(registry.add_or_replace(tool_at("last", MAX_TOOL_SLOTS - 1)), MAX_TOOL_SLOTS - 1);

        assert_eq!(registry.len(), MAX_TOOL_SLOTS);
        assert_eq!(registry.get(1).unwrap().name.as_deref(), Some("Farther"));
        assert_eq!(registry.get(1).unwrap().index, Some(1));
    }
}
