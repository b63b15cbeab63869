//! Command implementations behind the `camctl` binary.

pub mod cmd_bounds;
pub mod cmd_exec;
pub mod cmd_features;
pub mod cmd_get;
pub mod cmd_register;
pub mod cmd_set;
pub mod cmd_stream;
pub mod cmd_xml;
pub mod common;
