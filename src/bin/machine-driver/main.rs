use anyhow::Result;
use clap::{Parser, Subcommand};
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use machine_driver::Config;

mod cmd_build;
mod cmd_generators;
mod cmd_info;

/// Drive a fabrication machine from a command file.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "machine-driver")]
struct Cli {
    /// Config file to use
    #[arg(long, short, default_value = "machine-driver.toml")]
    config: PathBuf,

    /// Print debug info
    #[arg(long, short)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a command file (or a model, by way of the toolpath generator)
    /// to a machine.
    Build {
        /// Name of the machine in the config file.
        #[arg(long, short)]
        machine: String,

        /// Serial port the machine is attached to.
        #[arg(long, short)]
        serial: String,

        /// Command file (`.gcode`) or model (`.stl`) to build.
        #[arg(long, short)]
        file: PathBuf,

        /// Number of times to build the file.
        #[arg(long, short, default_value_t = 1)]
        repeat: u32,

        /// Do not wait for the operator; prompts are only logged.
        #[arg(long, short)]
        yes: bool,
    },

    /// Show what the config file says about a machine.
    Info {
        /// Name of the machine in the config file.
        #[arg(long, short)]
        machine: String,

        /// Print as json
        #[arg(long, short)]
        json: bool,
    },

    /// List the available toolpath generators.
    Generators,
}

async fn handle_signals(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGINT handler");
            e
        })?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up SIGTERM handler");
            e
        })?;

        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await.map_err(|e| {
            tracing::error!(error = format!("{:?}", e), "Failed to set up Ctrl+C handler");
            anyhow::Error::new(e)
        })?;

        tracing::info!("received Ctrl+C (SIGINT)");
    }

    tracing::info!("stopping after the current command...");
    cancel.cancel();
    Ok(())
}

/// Set up logging to stderr, plus OTLP export when an endpoint is
/// configured in the environment.
fn init_tracing(debug: bool) -> Result<Option<SdkTracerProvider>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(if debug { "debug" } else { "info" }));

    let provider = match std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        Ok(otlp_host) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(otlp_host)
                .build()?;
            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_resource(Resource::builder().with_service_name("machine-driver").build())
                .build();
            opentelemetry::global::set_tracer_provider(provider.clone());
            Some(provider)
        }
        Err(_) => None,
    };

    let telemetry = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer()
            .with_tracer(provider.tracer("machine-driver"))
            .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG)
    });

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr))
        .with(env_filter)
        .with(telemetry)
        .init();

    Ok(provider)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let provider = init_tracing(cli.debug)?;

    let cancel = CancellationToken::new();
    tokio::spawn(handle_signals(cancel.clone()));

    let cfg = Config::from_file(&cli.config)
        .map_err(|e| anyhow::anyhow!("Unable to load config file {}: {}", cli.config.display(), e))?;

    let result = match cli.command {
        Commands::Build {
            ref machine,
            ref serial,
            ref file,
            repeat,
            yes,
        } => {
            cmd_build::main(
                &cfg,
                cmd_build::BuildArgs {
                    machine,
                    port: serial,
                    file,
                    repeat,
                    unattended: yes,
                },
                cancel.clone(),
            )
            .await
        }
        Commands::Info { ref machine, json } => cmd_info::main(&cfg, machine, json),
        Commands::Generators => cmd_generators::main(&cfg),
    };

    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = format!("{:?}", e), "failed to flush traces");
        }
    }

    if cancel.is_cancelled() {
        // A cancelled prompt can leave a blocking stdin read behind, which
        // would hold up runtime shutdown until the next line of input.
        if let Err(e) = &result {
            eprintln!("Error: {:?}", e);
        }
        std::process::exit(130);
    }

    result
}
