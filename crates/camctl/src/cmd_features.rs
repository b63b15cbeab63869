use anyhow::{Context, Result};
use camdev::{Device, DeviceIo};
use serde::Serialize;
use tracing::warn;

use crate::common;

#[derive(Serialize)]
struct FeatureRow<'a> {
    name: &'a str,
    kind: String,
    value: Option<String>,
}

pub fn run(device: &dyn Device, json: bool) -> Result<()> {
    let nodes = device.genicam().context("load feature tree")?;
    let io = DeviceIo::new(device);
    let mut rows = Vec::with_capacity(nodes.len());
    for name in nodes.names() {
        let Some(node) = nodes.node(name) else {
            continue;
        };
        let value = match node.display_value(&io) {
            Ok(value) => value,
            Err(err) => {
                warn!(feature = name, error = %err, "read failed");
                None
            }
        };
        rows.push(FeatureRow {
            name,
            kind: node.kind().to_string(),
            value,
        });
    }

    if json {
        common::print_json(&rows)?;
    } else {
        for row in &rows {
            println!(
                "{:<24} {:<12} {}",
                row.name,
                row.kind,
                row.value.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}
