//! Feature node kinds and their register-backed accessors.

use std::collections::HashMap;
use std::fmt;

use genapi_xml::AccessMode;
use tracing::debug;

use crate::codec::{
    bytes_to_f64, bytes_to_i64, bytes_to_unsigned, f64_to_bytes, i64_to_bytes, to_unsigned,
    unsigned_to_bytes,
};
use crate::{GenApiError, RegisterIo};

/// Feature node. The kind is fixed when the node map is built.
#[derive(Debug)]
pub enum Node {
    /// Signed integer feature stored in a fixed-width register block.
    Integer(IntegerNode),
    /// Floating point feature, IEEE-754 or scaled integer.
    Float(FloatNode),
    /// Boolean feature represented as an integer register.
    Boolean(BooleanNode),
    /// UTF-8 string stored in a NUL-padded register block.
    String(StringNode),
    /// Enumeration feature mapping integers to symbolic names.
    Enum(EnumNode),
    /// Command feature triggering a device-side action when written.
    Command(CommandNode),
}

/// Discriminant of a [`Node`], used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Integer,
    Float,
    Boolean,
    String,
    Enumeration,
    Command,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Integer => "Integer",
            NodeKind::Float => "Float",
            NodeKind::Boolean => "Boolean",
            NodeKind::String => "String",
            NodeKind::Enumeration => "Enumeration",
            NodeKind::Command => "Command",
        };
        f.write_str(name)
    }
}

impl Node {
    /// Feature name.
    pub fn name(&self) -> &str {
        match self {
            Node::Integer(node) => &node.name,
            Node::Float(node) => &node.name,
            Node::Boolean(node) => &node.name,
            Node::String(node) => &node.name,
            Node::Enum(node) => &node.name,
            Node::Command(node) => &node.name,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Integer(_) => NodeKind::Integer,
            Node::Float(_) => NodeKind::Float,
            Node::Boolean(_) => NodeKind::Boolean,
            Node::String(_) => NodeKind::String,
            Node::Enum(_) => NodeKind::Enumeration,
            Node::Command(_) => NodeKind::Command,
        }
    }

    /// Read the node and format its value as text. Commands have no value.
    pub fn display_value(&self, io: &dyn RegisterIo) -> Result<Option<String>, GenApiError> {
        let value = match self {
            Node::Integer(node) => node.get(io)?.to_string(),
            Node::Float(node) => node.get(io)?.to_string(),
            Node::Boolean(node) => node.get(io)?.to_string(),
            Node::String(node) => node.get(io)?,
            Node::Enum(node) => node.get(io)?,
            Node::Command(_) => return Ok(None),
        };
        Ok(Some(value))
    }
}

/// Integer feature metadata extracted from the XML description.
#[derive(Debug)]
pub struct IntegerNode {
    /// Unique feature name.
    pub name: String,
    /// Register address relative to the device control space.
    pub address: u64,
    /// Register length in bytes.
    pub len: u32,
    /// Declared access rights.
    pub access: AccessMode,
    /// Minimum permitted user value.
    pub min: i64,
    /// Maximum permitted user value.
    pub max: i64,
    /// Optional increment step the value must respect.
    pub inc: Option<i64>,
    /// Optional engineering unit such as "px".
    pub unit: Option<String>,
}

impl IntegerNode {
    pub fn get(&self, io: &dyn RegisterIo) -> Result<i64, GenApiError> {
        ensure_readable(self.access, &self.name)?;
        let raw = io.read(self.address, self.len as usize)?;
        let value = bytes_to_i64(&self.name, &raw)?;
        debug!(node = %self.name, value, "read integer feature");
        Ok(value)
    }

    pub fn set(&self, value: i64, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        ensure_writable(self.access, &self.name)?;
        if value < self.min || value > self.max {
            return Err(GenApiError::Range(format!(
                "{} = {value} outside [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        if let Some(inc) = self.inc {
            // An undeclared minimum anchors the increment at zero.
            let base = if self.min == i64::MIN { 0 } else { self.min };
            if inc > 0 && (i128::from(value) - i128::from(base)) % i128::from(inc) != 0 {
                return Err(GenApiError::Range(format!(
                    "{} = {value} violates increment {inc}",
                    self.name
                )));
            }
        }
        let bytes = i64_to_bytes(&self.name, value, self.len)?;
        debug!(node = %self.name, value, "write integer feature");
        io.write(self.address, &bytes)
    }

    /// Declared `(min, max)` bounds.
    pub fn bounds(&self) -> (i64, i64) {
        (self.min, self.max)
    }
}

/// Floating point feature metadata.
#[derive(Debug)]
pub struct FloatNode {
    pub name: String,
    pub address: u64,
    pub len: u32,
    pub access: AccessMode,
    pub min: f64,
    pub max: f64,
    pub unit: Option<String>,
    /// Optional rational scale `(numerator, denominator)` applied to the raw value.
    pub scale: Option<(i64, i64)>,
    /// Optional offset added after scaling.
    pub offset: Option<f64>,
}

impl FloatNode {
    fn is_scaled(&self) -> bool {
        self.scale.is_some() || self.offset.is_some()
    }

    pub fn get(&self, io: &dyn RegisterIo) -> Result<f64, GenApiError> {
        ensure_readable(self.access, &self.name)?;
        let raw = io.read(self.address, self.len as usize)?;
        let value = if self.is_scaled() {
            let raw_value = bytes_to_i64(&self.name, &raw)?;
            apply_scale(self, raw_value as f64)
        } else {
            bytes_to_f64(&self.name, &raw)?
        };
        debug!(node = %self.name, value, "read float feature");
        Ok(value)
    }

    pub fn set(&self, value: f64, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        ensure_writable(self.access, &self.name)?;
        if value.is_nan() || value < self.min || value > self.max {
            return Err(GenApiError::Range(format!(
                "{} = {value} outside [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        let bytes = if self.is_scaled() {
            let raw = encode_scaled(self, value)?;
            i64_to_bytes(&self.name, raw, self.len)?
        } else {
            f64_to_bytes(&self.name, value, self.len)?
        };
        debug!(node = %self.name, value, "write float feature");
        io.write(self.address, &bytes)
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

/// Boolean feature metadata.
#[derive(Debug)]
pub struct BooleanNode {
    pub name: String,
    pub address: u64,
    pub len: u32,
    pub access: AccessMode,
    /// Register value meaning `true`.
    pub on_value: i64,
    /// Register value meaning `false`.
    pub off_value: i64,
}

impl BooleanNode {
    pub fn get(&self, io: &dyn RegisterIo) -> Result<bool, GenApiError> {
        ensure_readable(self.access, &self.name)?;
        let raw = io.read(self.address, self.len as usize)?;
        let raw_value = bytes_to_i64(&self.name, &raw)?;
        let value = raw_value == self.on_value;
        debug!(node = %self.name, raw = raw_value, value, "read boolean feature");
        Ok(value)
    }

    pub fn set(&self, value: bool, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        ensure_writable(self.access, &self.name)?;
        let raw = if value { self.on_value } else { self.off_value };
        let bytes = i64_to_bytes(&self.name, raw, self.len)?;
        debug!(node = %self.name, raw, value, "write boolean feature");
        io.write(self.address, &bytes)
    }
}

/// String feature metadata. The register block holds UTF-8 padded with NULs.
#[derive(Debug)]
pub struct StringNode {
    pub name: String,
    pub address: u64,
    /// Maximum length in bytes, including padding.
    pub len: u32,
    pub access: AccessMode,
}

impl StringNode {
    pub fn get(&self, io: &dyn RegisterIo) -> Result<String, GenApiError> {
        ensure_readable(self.access, &self.name)?;
        let raw = io.read(self.address, self.len as usize)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let value = String::from_utf8(raw[..end].to_vec())
            .map_err(|err| GenApiError::Parse(format!("node {} holds invalid UTF-8: {err}", self.name)))?;
        debug!(node = %self.name, value = %value, "read string feature");
        Ok(value)
    }

    pub fn set(&self, value: &str, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        ensure_writable(self.access, &self.name)?;
        let len = self.len as usize;
        if value.len() > len {
            return Err(GenApiError::Range(format!(
                "{} accepts at most {len} bytes, got {}",
                self.name,
                value.len()
            )));
        }
        let mut data = vec![0u8; len];
        data[..value.len()].copy_from_slice(value.as_bytes());
        debug!(node = %self.name, value, "write string feature");
        io.write(self.address, &data)
    }
}

/// Enumeration feature metadata and mapping tables.
#[derive(Debug)]
pub struct EnumNode {
    pub name: String,
    pub address: u64,
    pub len: u32,
    pub access: AccessMode,
    /// Entries in declaration order.
    pub entries: Vec<(String, i64)>,
    map_by_name: HashMap<String, i64>,
    map_by_value: HashMap<i64, String>,
}

impl EnumNode {
    pub fn new(
        name: String,
        address: u64,
        len: u32,
        access: AccessMode,
        entries: Vec<(String, i64)>,
    ) -> Self {
        // Enumeration registers are unsigned; entries are kept in that form.
        let entries: Vec<(String, i64)> = entries
            .into_iter()
            .map(|(entry, value)| (entry, to_unsigned(value, len)))
            .collect();
        let mut map_by_name = HashMap::new();
        let mut map_by_value = HashMap::new();
        for (entry, value) in &entries {
            map_by_name.insert(entry.clone(), *value);
            map_by_value.entry(*value).or_insert_with(|| entry.clone());
        }
        Self {
            name,
            address,
            len,
            access,
            entries,
            map_by_name,
            map_by_value,
        }
    }

    /// Underlying integer of a symbolic entry.
    pub fn value_of(&self, entry: &str) -> Option<i64> {
        self.map_by_name.get(entry).copied()
    }

    /// Symbolic entry for an underlying integer.
    pub fn entry_of(&self, value: i64) -> Option<&str> {
        self.map_by_value
            .get(&to_unsigned(value, self.len))
            .map(String::as_str)
    }

    /// Read the underlying integer.
    pub fn get_int(&self, io: &dyn RegisterIo) -> Result<i64, GenApiError> {
        ensure_readable(self.access, &self.name)?;
        let raw = io.read(self.address, self.len as usize)?;
        let value = bytes_to_unsigned(&self.name, &raw)?;
        debug!(node = %self.name, raw = value, "read enum feature");
        Ok(value)
    }

    /// Write an underlying integer; it must belong to a declared entry.
    /// Signed and unsigned spellings of the same register value are equal.
    pub fn set_int(&self, value: i64, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        ensure_writable(self.access, &self.name)?;
        let value = to_unsigned(value, self.len);
        let entry = self.entry_of(value).ok_or_else(|| {
            GenApiError::Range(format!("{value:#x} is not an entry of {}", self.name))
        })?;
        let bytes = unsigned_to_bytes(&self.name, value, self.len)?;
        debug!(node = %self.name, raw = value, entry, "write enum feature");
        io.write(self.address, &bytes)
    }

    /// Read the current entry name.
    pub fn get(&self, io: &dyn RegisterIo) -> Result<String, GenApiError> {
        let raw = self.get_int(io)?;
        self.entry_of(raw).map(str::to_string).ok_or_else(|| {
            GenApiError::Parse(format!("unknown enum value {raw} for {}", self.name))
        })
    }

    /// Select an entry by name.
    pub fn set(&self, entry: &str, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        let raw = self.value_of(entry).ok_or_else(|| {
            GenApiError::Range(format!("{entry} is not an entry of {}", self.name))
        })?;
        self.set_int(raw, io)
    }
}

/// Command feature metadata.
#[derive(Debug)]
pub struct CommandNode {
    pub name: String,
    pub address: u64,
    pub len: u32,
    /// Value written to the register on execution.
    pub command_value: i64,
}

impl CommandNode {
    pub fn execute(&self, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        if self.len == 0 {
            return Err(GenApiError::Parse(format!(
                "command node {} has zero length",
                self.name
            )));
        }
        let data = i64_to_bytes(&self.name, self.command_value, self.len)?;
        debug!(node = %self.name, "execute command");
        io.write(self.address, &data)
    }
}

fn ensure_readable(access: AccessMode, name: &str) -> Result<(), GenApiError> {
    if matches!(access, AccessMode::WO) {
        return Err(GenApiError::Access(name.to_string()));
    }
    Ok(())
}

fn ensure_writable(access: AccessMode, name: &str) -> Result<(), GenApiError> {
    if matches!(access, AccessMode::RO) {
        return Err(GenApiError::Access(name.to_string()));
    }
    Ok(())
}

fn apply_scale(node: &FloatNode, raw: f64) -> f64 {
    let mut value = raw;
    if let Some((num, den)) = node.scale {
        value *= num as f64 / den as f64;
    }
    if let Some(offset) = node.offset {
        value += offset;
    }
    value
}

fn encode_scaled(node: &FloatNode, value: f64) -> Result<i64, GenApiError> {
    let mut raw = value;
    if let Some(offset) = node.offset {
        raw -= offset;
    }
    if let Some((num, den)) = node.scale {
        if num == 0 {
            return Err(GenApiError::Parse(format!(
                "node {} has zero scale numerator",
                node.name
            )));
        }
        raw *= den as f64 / num as f64;
    }
    let rounded = raw.round();
    if (raw - rounded).abs() > 1e-6 {
        return Err(GenApiError::Range(format!(
            "{} = {value} is not representable with the declared scale",
            node.name
        )));
    }
    Ok(rounded as i64)
}
