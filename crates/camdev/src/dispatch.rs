//! Name-based feature access for every [`Device`].
//!
//! These accessors never fail: an unknown name, a feature of an unrelated
//! kind, or a register/range failure turns a set into a no-op and a get into
//! the zero value of the requested type. Failures of a matching feature are
//! logged at `warn`.

use genapi_core::{GenApiError, Node};
use tracing::{debug, warn};

use crate::device::{Device, DeviceIo};
use crate::frame::Frame;
use crate::stream::Stream;
use crate::DeviceError;

fn settle<T>(name: &str, op: &str, result: Result<T, GenApiError>, fallback: T) -> T {
    result.unwrap_or_else(|err| {
        warn!(feature = name, op, error = %err, "feature access failed");
        fallback
    })
}

fn mismatch(name: &str, node: &Node, op: &str) {
    debug!(feature = name, kind = %node.kind(), op, "feature kind does not support access");
}

/// Typed feature accessors, implemented for every [`Device`].
pub trait DeviceExt: Device {
    /// Look a feature node up by exact name.
    fn feature(&self, name: &str) -> Option<&Node> {
        let nodes = match self.genicam() {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(feature = name, error = %err, "feature tree unavailable");
                return None;
            }
        };
        let node = nodes.node(name);
        if node.is_none() {
            debug!(feature = name, "unknown feature");
        }
        node
    }

    /// Integer view of Integer, Enumeration (entry value) and Boolean (0/1)
    /// features; 0 otherwise.
    fn get_integer_feature_value(&self, name: &str) -> i64 {
        let Some(node) = self.feature(name) else {
            return 0;
        };
        let io = DeviceIo::new(self);
        let result = match node {
            Node::Integer(integer) => integer.get(&io),
            Node::Enum(enumeration) => enumeration.get_int(&io),
            Node::Boolean(boolean) => boolean.get(&io).map(i64::from),
            Node::Float(_) | Node::String(_) | Node::Command(_) => {
                mismatch(name, node, "get integer");
                return 0;
            }
        };
        settle(name, "get integer", result, 0)
    }

    /// Write an Integer, an Enumeration by entry value, or a Boolean
    /// (non-zero means true).
    fn set_integer_feature_value(&self, name: &str, value: i64) {
        let Some(node) = self.feature(name) else {
            return;
        };
        let io = DeviceIo::new(self);
        let result = match node {
            Node::Integer(integer) => integer.set(value, &io),
            Node::Enum(enumeration) => enumeration.set_int(value, &io),
            Node::Boolean(boolean) => boolean.set(value != 0, &io),
            Node::Float(_) | Node::String(_) | Node::Command(_) => {
                mismatch(name, node, "set integer");
                return;
            }
        };
        settle(name, "set integer", result, ());
    }

    /// Value of a Float feature; 0.0 otherwise.
    fn get_float_feature_value(&self, name: &str) -> f64 {
        let Some(node) = self.feature(name) else {
            return 0.0;
        };
        let io = DeviceIo::new(self);
        let result = match node {
            Node::Float(float) => float.get(&io),
            Node::Integer(_)
            | Node::Enum(_)
            | Node::Boolean(_)
            | Node::String(_)
            | Node::Command(_) => {
                mismatch(name, node, "get float");
                return 0.0;
            }
        };
        settle(name, "get float", result, 0.0)
    }

    fn set_float_feature_value(&self, name: &str, value: f64) {
        let Some(node) = self.feature(name) else {
            return;
        };
        let io = DeviceIo::new(self);
        let result = match node {
            Node::Float(float) => float.set(value, &io),
            Node::Integer(_)
            | Node::Enum(_)
            | Node::Boolean(_)
            | Node::String(_)
            | Node::Command(_) => {
                mismatch(name, node, "set float");
                return;
            }
        };
        settle(name, "set float", result, ());
    }

    /// Entry name of an Enumeration or text of a String feature; empty
    /// otherwise.
    fn get_string_feature_value(&self, name: &str) -> String {
        let Some(node) = self.feature(name) else {
            return String::new();
        };
        let io = DeviceIo::new(self);
        let result = match node {
            Node::Enum(enumeration) => enumeration.get(&io),
            Node::String(string) => string.get(&io),
            Node::Integer(_) | Node::Float(_) | Node::Boolean(_) | Node::Command(_) => {
                mismatch(name, node, "get string");
                return String::new();
            }
        };
        settle(name, "get string", result, String::new())
    }

    /// Select an Enumeration entry by name or write a String feature.
    fn set_string_feature_value(&self, name: &str, value: &str) {
        let Some(node) = self.feature(name) else {
            return;
        };
        let io = DeviceIo::new(self);
        let result = match node {
            Node::Enum(enumeration) => enumeration.set(value, &io),
            Node::String(string) => string.set(value, &io),
            Node::Integer(_) | Node::Float(_) | Node::Boolean(_) | Node::Command(_) => {
                mismatch(name, node, "set string");
                return;
            }
        };
        settle(name, "set string", result, ());
    }

    /// Declared `(min, max)` of an Integer feature.
    fn get_integer_feature_bounds(&self, name: &str) -> Option<(i64, i64)> {
        match self.feature(name)? {
            Node::Integer(integer) => Some(integer.bounds()),
            Node::Float(_)
            | Node::Enum(_)
            | Node::Boolean(_)
            | Node::String(_)
            | Node::Command(_) => None,
        }
    }

    /// Declared `(min, max)` of a Float feature.
    fn get_float_feature_bounds(&self, name: &str) -> Option<(f64, f64)> {
        match self.feature(name)? {
            Node::Float(float) => Some(float.bounds()),
            Node::Integer(_)
            | Node::Enum(_)
            | Node::Boolean(_)
            | Node::String(_)
            | Node::Command(_) => None,
        }
    }

    /// Execute a Command feature; anything else is left untouched.
    fn execute_command(&self, name: &str) {
        let Some(node) = self.feature(name) else {
            return;
        };
        match node {
            Node::Command(command) => {
                let io = DeviceIo::new(self);
                settle(name, "execute", command.execute(&io), ());
            }
            Node::Integer(_)
            | Node::Float(_)
            | Node::Boolean(_)
            | Node::String(_)
            | Node::Enum(_) => mismatch(name, node, "execute"),
        }
    }

    /// [`Device::create_stream`] taking an unboxed closure.
    fn create_stream_with<F>(&self, callback: F) -> Result<Stream, DeviceError>
    where
        F: FnMut(&Frame) + Send + 'static,
        Self: Sized,
    {
        self.create_stream(Box::new(callback))
    }
}

impl<D: Device + ?Sized> DeviceExt for D {}
