use anyhow::Result;
use machine_driver::{
    noop::Noop, toolpath::ToolpathGenerator, CommandSource, Config, ConsolePrompt, Connector, ExecutionDriver,
    MachineListener, MachineModel, OperatorPrompt, ProgressEvent, StateChangeEvent, ToolStatusEvent, TransportConfig,
};
use std::{io::Write, path::Path};
use tokio_util::sync::CancellationToken;

/// What to build, and where.
pub struct BuildArgs<'a> {
    pub machine: &'a str,
    pub port: &'a str,
    pub file: &'a Path,
    pub repeat: u32,
    pub unattended: bool,
}

/// Echo what the machine is doing to the terminal.
struct EchoProgress;

impl MachineListener for EchoProgress {
    fn machine_state_changed(&self, event: &StateChangeEvent) -> Result<()> {
        match &event.message {
            Some(message) => println!("[{}] {}", event.current, message),
            None => println!("[{}]", event.current),
        }
        Ok(())
    }

    fn machine_progress(&self, event: &ProgressEvent) -> Result<()> {
        let mut stdout = std::io::stdout();
        write!(stdout, "\r{}", event)?;
        if event.lines_sent == event.total_lines {
            writeln!(stdout)?;
        }
        stdout.flush()?;
        Ok(())
    }

    fn tool_status_changed(&self, event: &ToolStatusEvent) -> Result<()> {
        println!(
            "tool {} ({}): {}",
            event.index.map(|i| i.to_string()).unwrap_or_else(|| "-".to_owned()),
            event.name.as_deref().unwrap_or("unnamed"),
            event.status
        );
        Ok(())
    }
}

async fn load_source(cfg: &Config, file: &Path) -> Result<CommandSource> {
    let is_model = file
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("stl"));
    if !is_model {
        return Ok(CommandSource::from_file(file).await?);
    }

    let generator = cfg.toolpath.clone().unwrap_or_default().load()?;
    generator.generate(file).await
}

async fn run<ConnectorT>(
    connector: ConnectorT,
    model: MachineModel,
    cfg: &Config,
    args: &BuildArgs<'_>,
    source: &CommandSource,
    cancel: CancellationToken,
) -> Result<()>
where
    ConnectorT: Connector,
{
    let mut driver =
        ExecutionDriver::new(connector, model.into(), cfg.driver.settings()).with_cancellation_token(cancel.clone());
    driver.add_listener(EchoProgress);

    let prompt = ConsolePrompt::new(args.unattended).with_cancellation_token(cancel);

    driver.connect(args.port).await?;
    driver.disable_drives_with_retry(&prompt).await?;
    prompt.confirm("Center the tool nozzle, then press Enter.").await?;

    let result = driver.execute(source, args.repeat).await;
    driver.disconnect();
    result?;

    tracing::info!(machine = args.machine, repeat = args.repeat, "build finished");
    Ok(())
}

pub async fn main(cfg: &Config, args: BuildArgs<'_>, cancel: CancellationToken) -> Result<()> {
    let definition = cfg.machine(args.machine)?;
    let model = MachineModel::from_config(&definition.config_tree(args.machine));
    tracing::info!(
        machine = args.machine,
        build_volume = %model.build_volume(),
        tools = model.tool_registry().len(),
        "loaded machine"
    );

    let source = load_source(cfg, args.file).await?;
    tracing::info!(file = %args.file.display(), lines = source.len(), "loaded commands");

    match definition.transport {
        #[cfg(feature = "serial")]
        Some(TransportConfig::Serial { baud }) => {
            let connector = machine_driver::serial::Serial::new(baud).with_cancellation_token(cancel.clone());
            run(connector, model, cfg, &args, &source, cancel).await
        }
        #[cfg(not(feature = "serial"))]
        Some(TransportConfig::Serial { .. }) => {
            anyhow::bail!("this build does not support serial machines")
        }
        Some(TransportConfig::Noop) => run(Noop::new(), model, cfg, &args, &source, cancel).await,
        None => anyhow::bail!("machine {} has no transport configured", args.machine),
    }
}
