use std::fmt::Display;

use anyhow::{anyhow, Result};
use camdev::{Device, DeviceExt};
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct Bounds<'a, T> {
    name: &'a str,
    min: T,
    max: T,
}

fn report<T: Serialize + Display>(name: &str, min: T, max: T, json: bool) -> Result<()> {
    if json {
        common::print_json(&Bounds { name, min, max })
    } else {
        println!("[{min}, {max}]");
        Ok(())
    }
}

pub fn run(device: &dyn Device, name: &str, json: bool) -> Result<()> {
    common::find_feature(device, name)?;
    if let Some((min, max)) = device.get_integer_feature_bounds(name) {
        return report(name, min, max, json);
    }
    let (min, max) = device
        .get_float_feature_bounds(name)
        .ok_or_else(|| anyhow!("{name} has no numeric bounds"))?;
    report(name, min, max, json)
}
