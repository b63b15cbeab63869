use std::path::Path;

use anyhow::{bail, Context, Result};
use camdev::Device;
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct XmlSummary<'a> {
    bytes: usize,
    schema_version: &'a str,
    features: usize,
}

pub fn run(device: &dyn Device, output: Option<&Path>, json: bool) -> Result<()> {
    let nodes = device.genicam().context("load feature tree")?;
    let xml = device.genicam_xml();
    if xml.is_empty() {
        bail!("device exposes no description document");
    }

    if let Some(path) = output {
        common::write_file(xml, path)?;
    }
    if json {
        common::print_json(&XmlSummary {
            bytes: xml.len(),
            schema_version: nodes.version(),
            features: nodes.len(),
        })?;
    } else if output.is_none() {
        print!("{}", String::from_utf8_lossy(xml));
    }
    Ok(())
}
