use anyhow::Result;
use machine_driver::{Axis, AxisConfig, BuildVolume, Config, MachineModel, TransportConfig};
use serde::Serialize;

#[derive(Serialize)]
struct AxisInfo {
    axis: Axis,
    #[serde(flatten)]
    config: AxisConfig,
}

#[derive(Serialize)]
struct ToolInfo {
    index: Option<usize>,
    name: Option<String>,
}

#[derive(Serialize)]
struct MachineInfo {
    name: String,
    transport: Option<TransportConfig>,
    build_volume: BuildVolume,
    axes: Vec<AxisInfo>,
    tools: Vec<ToolInfo>,
    current_tool: Option<usize>,
    clamps: Vec<Option<String>>,
}

impl MachineInfo {
    fn new(name: &str, transport: Option<TransportConfig>, model: &MachineModel) -> Self {
        Self {
            name: name.to_owned(),
            transport,
            build_volume: model.build_volume(),
            axes: Axis::ALL
                .iter()
                .map(|axis| AxisInfo {
                    axis: *axis,
                    config: *model.axes().axis(*axis),
                })
                .collect(),
            tools: model
                .tools()
                .map(|tool| ToolInfo {
                    index: tool.index,
                    name: tool.name.clone(),
                })
                .collect(),
            current_tool: model.current_tool().index,
            clamps: model.clamps().iter().map(|clamp| clamp.name.clone()).collect(),
        }
    }
}

pub fn main(cfg: &Config, machine: &str, json: bool) -> Result<()> {
    let definition = cfg.machine(machine)?;
    let model = MachineModel::from_config(&definition.config_tree(machine));
    let info = MachineInfo::new(machine, definition.transport, &model);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.name);
    println!("  build volume: {}", info.build_volume);
    for axis in info.axes.iter() {
        println!(
            "  {}: {} mm, max {} mm/min, {} steps/mm, endstops {}",
            axis.axis, axis.config.length, axis.config.max_feedrate, axis.config.steps_per_mm, axis.config.endstops
        );
    }
    for tool in info.tools.iter() {
        let current = if tool.index == info.current_tool { " (current)" } else { "" };
        println!(
            "  tool {}: {}{}",
            tool.index.map(|i| i.to_string()).unwrap_or_default(),
            tool.name.as_deref().unwrap_or("unnamed"),
            current
        );
    }
    for (index, clamp) in info.clamps.iter().enumerate() {
        println!("  clamp {}: {}", index, clamp.as_deref().unwrap_or("unnamed"));
    }
    Ok(())
}
