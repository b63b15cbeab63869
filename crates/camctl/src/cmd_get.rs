use anyhow::Result;
use camdev::Device;
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct FeatureValue<'a> {
    name: &'a str,
    value: String,
}

pub fn run(device: &dyn Device, name: &str, json: bool) -> Result<()> {
    let value = common::read_feature(device, name)?;

    if json {
        let payload = FeatureValue { name, value };
        common::print_json(&payload)?;
    } else {
        println!("{}", value);
    }
    Ok(())
}
