use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use camctl::cmd_stream::{self, StreamArgs};
use camctl::common::{self, parse_u32};
use camctl::{cmd_bounds, cmd_exec, cmd_features, cmd_get, cmd_register, cmd_set, cmd_xml};

#[derive(Parser, Debug)]
#[command(name = "camctl", version, about = "Simulated camera control CLI")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Output JSON where applicable
    #[arg(long)]
    json: bool,
    /// Camera configuration file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// List every feature with its kind and value
    Features,
    /// Read a feature
    Get {
        #[arg(long)]
        name: String,
    },
    /// Write a feature and print the value read back
    Set {
        #[arg(long)]
        name: String,
        #[arg(long)]
        value: String,
    },
    /// Execute a command feature
    Exec {
        #[arg(long)]
        name: String,
    },
    /// Print the declared range of a numeric feature
    Bounds {
        #[arg(long)]
        name: String,
    },
    /// Dump the description document
    Xml {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read a 32-bit register
    ReadRegister {
        #[arg(long, value_parser = parse_u32)]
        address: u32,
    },
    /// Write a 32-bit register
    WriteRegister {
        #[arg(long, value_parser = parse_u32)]
        address: u32,
        #[arg(long, value_parser = parse_u32)]
        value: u32,
    },
    /// Acquire frames
    Stream {
        #[arg(long, default_value_t = 10)]
        count: u64,
        #[arg(long, default_value_t = 5)]
        timeout_s: u64,
        /// Fire a software trigger per frame
        #[arg(long)]
        trigger: bool,
        /// Save the first frame as PGM/PPM
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        json,
        config,
        cmd,
    } = Cli::parse();

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.into()),
        ))
        .with_target(false)
        .init();

    let device = common::open_device(config.as_deref())?;
    match cmd {
        Cmd::Features => cmd_features::run(&device, json)?,
        Cmd::Get { name } => cmd_get::run(&device, &name, json)?,
        Cmd::Set { name, value } => cmd_set::run(&device, &name, &value, json)?,
        Cmd::Exec { name } => cmd_exec::run(&device, &name, json)?,
        Cmd::Bounds { name } => cmd_bounds::run(&device, &name, json)?,
        Cmd::Xml { output } => cmd_xml::run(&device, output.as_deref(), json)?,
        Cmd::ReadRegister { address } => cmd_register::read(&device, address, json)?,
        Cmd::WriteRegister { address, value } => {
            cmd_register::write(&device, address, value, json)?
        }
        Cmd::Stream {
            count,
            timeout_s,
            trigger,
            save,
        } => {
            let args = StreamArgs {
                count,
                timeout_s,
                trigger,
                save,
            };
            cmd_stream::run(device, args, json).await?
        }
    };

    Ok(())
}
