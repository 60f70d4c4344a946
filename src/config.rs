//! Code for the configuration of the application.
//!
//! Machine definitions are consumed as a [ConfigNode] tree, which is what
//! [crate::MachineModel::load_configuration] reads. The on-disk format is
//! TOML; [ConfigNode::from_toml] maps it onto the tree.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    time::Duration,
};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{toolpath, DriverSettings};

/// One node of a hierarchical machine configuration: a name, a set of
/// string attributes and an ordered list of children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigNode {
    name: String,
    attributes: BTreeMap<String, String>,
    children: Vec<ConfigNode>,
}

impl ConfigNode {
    /// Create an empty node called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: BTreeMap::new(),
            children: vec![],
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Builder-style child appender.
    pub fn with_child(mut self, child: ConfigNode) -> Self {
        self.children.push(child);
        self
    }

    /// Name of this node (`axis`, `tool`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw value of the attribute `key`, if present.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// All attributes of this node, sorted by key.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All children, in document order.
    pub fn children(&self) -> &[ConfigNode] {
        &self.children
    }

    /// First child called `name`.
    pub fn child(&self, name: &str) -> Option<&ConfigNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Every child called `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Build a tree out of a TOML value. Tables become child nodes, arrays
    /// of tables become repeated children carrying the array's key, and
    /// scalars become attributes.
    pub fn from_toml(name: impl Into<String>, value: &toml::Value) -> Self {
        let mut node = Self::new(name);
        let toml::Value::Table(table) = value else {
            return node;
        };

        for (key, value) in table.iter() {
            match value {
                toml::Value::Table(_) => node.children.push(Self::from_toml(key.clone(), value)),
                toml::Value::Array(items) if items.iter().all(|v| v.is_table()) => {
                    for item in items {
                        node.children.push(Self::from_toml(key.clone(), item));
                    }
                }
                toml::Value::Array(items) => {
                    let joined = items.iter().map(scalar_to_string).collect::<Vec<_>>().join(",");
                    node.attributes.insert(key.clone(), joined);
                }
                scalar => {
                    node.attributes.insert(key.clone(), scalar_to_string(scalar));
                }
            }
        }
        node
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The configuration of the application.
#[derive(Default, Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Polling and timeout knobs for the execution driver.
    #[serde(default)]
    pub driver: DriverConfig,

    /// Toolpath generator used to turn design files into commands.
    pub toolpath: Option<toolpath::Config>,

    /// Known machines, by name.
    #[serde(default)]
    pub machines: HashMap<String, MachineDefinition>,
}

impl Config {
    /// Parse a configuration from a toml file.
    pub fn from_file(file: &Path) -> Result<Self> {
        let config = std::fs::read_to_string(file)?;
        Self::from_str(&config)
    }

    /// Parse a configuration from a toml string.
    pub fn from_str(config: &str) -> Result<Self> {
        Ok(toml::from_str(config)?)
    }

    /// Look up a machine by name.
    pub fn machine(&self, name: &str) -> Result<&MachineDefinition> {
        self.machines
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no machine named {:?} in the configuration", name))
    }
}

/// `[driver]` section of the configuration file.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct DriverConfig {
    /// How often to ask a connecting machine if it is ready.
    #[serde(default = "default_connect_poll_interval_ms")]
    pub connect_poll_interval_ms: u64,

    /// How often to ask a building machine if it is done.
    #[serde(default = "default_build_poll_interval_ms")]
    pub build_poll_interval_ms: u64,

    /// Give up connecting after this long. Unset waits forever.
    pub connect_timeout_ms: Option<u64>,

    /// Give up waiting for a build to drain after this long. Unset waits
    /// forever.
    pub build_timeout_ms: Option<u64>,
}

fn default_connect_poll_interval_ms() -> u64 {
    200
}

fn default_build_poll_interval_ms() -> u64 {
    1000
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            connect_poll_interval_ms: default_connect_poll_interval_ms(),
            build_poll_interval_ms: default_build_poll_interval_ms(),
            connect_timeout_ms: None,
            build_timeout_ms: None,
        }
    }
}

impl DriverConfig {
    /// Resolve into the settings struct handed to the driver.
    pub fn settings(&self) -> DriverSettings {
        DriverSettings {
            connect_poll_interval: Duration::from_millis(self.connect_poll_interval_ms),
            build_poll_interval: Duration::from_millis(self.build_poll_interval_ms),
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            build_timeout: self.build_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// How to reach a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Line based serial connection.
    Serial {
        /// Baud rate of the serial connection.
        #[serde(default = "default_baud")]
        baud: u32,
    },

    /// Accept everything, do nothing.
    Noop,
}

fn default_baud() -> u32 {
    115200
}

/// A `[machines.<name>]` table: the transport to use plus the geometry,
/// tools and clamps tree.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MachineDefinition {
    /// Transport this machine is reachable over. Machines without one can
    /// be inspected, but not driven.
    pub transport: Option<TransportConfig>,

    /// Everything else in the table.
    #[serde(flatten)]
    pub tree: toml::Table,
}

impl MachineDefinition {
    /// The configuration tree for [crate::MachineModel::load_configuration].
    pub fn config_tree(&self, name: &str) -> ConfigNode {
        ConfigNode::from_toml(name, &toml::Value::Table(self.tree.clone()))
    }
}
