use anyhow::{bail, Context, Result};
use camdev::genapi::Node;
use camdev::{Device, DeviceExt};
use serde::Serialize;
use tracing::info;

use crate::common;

/// Relative tolerance when comparing a float read-back with the request.
const FLOAT_TOLERANCE: f64 = 1e-3;

#[derive(Serialize)]
struct SetResponse<'a> {
    name: &'a str,
    value: String,
}

/// Write `value` through the kind-specific accessor and report whether the
/// device kept it.
pub fn apply<D: Device + ?Sized>(device: &D, name: &str, value: &str) -> Result<bool> {
    let node = common::find_feature(device, name)?;
    let applied = match node {
        Node::Integer(_) => {
            let wanted = common::parse_i64(value)
                .with_context(|| format!("{name} expects an integer"))?;
            device.set_integer_feature_value(name, wanted);
            device.get_integer_feature_value(name) == wanted
        }
        Node::Boolean(_) => {
            let wanted = common::parse_bool(value)?;
            device.set_integer_feature_value(name, i64::from(wanted));
            (device.get_integer_feature_value(name) != 0) == wanted
        }
        Node::Float(_) => {
            let wanted: f64 = value
                .parse()
                .with_context(|| format!("{name} expects a number"))?;
            device.set_float_feature_value(name, wanted);
            let actual = device.get_float_feature_value(name);
            (actual - wanted).abs() <= FLOAT_TOLERANCE * wanted.abs().max(1.0)
        }
        Node::Enum(entries) if entries.value_of(value).is_none() => {
            let wanted = common::parse_i64(value)
                .with_context(|| format!("{name} has no entry '{value}'"))?;
            device.set_integer_feature_value(name, wanted);
            device.get_integer_feature_value(name) == wanted
        }
        Node::Enum(_) | Node::String(_) => {
            device.set_string_feature_value(name, value);
            device.get_string_feature_value(name) == value
        }
        Node::Command(_) => bail!("{name} is a command; use `exec`"),
    };
    Ok(applied)
}

pub fn run(device: &dyn Device, name: &str, value: &str, json: bool) -> Result<()> {
    let applied = apply(device, name, value)?;
    let read_back = common::read_feature(device, name)?;
    if !applied {
        bail!("device did not accept {name}={value} (value is {read_back})");
    }
    info!(feature = name, value = %read_back, "feature written");

    if json {
        let payload = SetResponse {
            name,
            value: read_back,
        };
        common::print_json(&payload)?;
    } else {
        println!("{}", read_back);
    }
    Ok(())
}
