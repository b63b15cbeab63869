use anyhow::{bail, Result};
use camdev::genapi::NodeKind;
use camdev::{Device, DeviceExt};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct ExecResponse<'a> {
    name: &'a str,
    executed: bool,
}

pub fn run(device: &dyn Device, name: &str, json: bool) -> Result<()> {
    let kind = common::find_feature(device, name)?.kind();
    if kind != NodeKind::Command {
        bail!("{name} is {kind}, not a command");
    }
    device.execute_command(name);
    info!(feature = name, "command executed");

    if json {
        common::print_json(&ExecResponse {
            name,
            executed: true,
        })?;
    } else {
        println!("{name} executed");
    }
    Ok(())
}
