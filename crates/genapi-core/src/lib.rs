//! GenApi node system: typed feature access backed by register IO.

mod codec;
pub mod node;

use std::collections::HashMap;

use genapi_xml::{NodeDecl, XmlModel};
use thiserror::Error;
use tracing::{debug, warn};

pub use genapi_xml::AccessMode;
pub use node::{
    BooleanNode, CommandNode, EnumNode, FloatNode, IntegerNode, Node, NodeKind, StringNode,
};

/// Error type produced by GenApi operations.
#[derive(Debug, Error)]
pub enum GenApiError {
    /// The requested node does not exist in the nodemap.
    #[error("node not found: {0}")]
    NodeNotFound(String),
    /// The node exists but has a different type.
    #[error("type mismatch for node: {0}")]
    Type(String),
    /// The node access mode forbids the attempted operation.
    #[error("access denied for node: {0}")]
    Access(String),
    /// The provided value violates the limits declared by the node.
    #[error("range error: {0}")]
    Range(String),
    /// Underlying register IO failed.
    #[error("io error: {0}")]
    Io(String),
    /// Node metadata or conversion failed.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Register access abstraction implemented by devices and transports.
pub trait RegisterIo {
    /// Read `len` bytes starting at `addr`.
    fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>, GenApiError>;
    /// Write `data` starting at `addr`.
    fn write(&self, addr: u64, data: &[u8]) -> Result<(), GenApiError>;
}

/// Feature tree built from an [`XmlModel`]. Nodes hold no cached values, so
/// the map is shared freely between threads once built; values live in the
/// device registers reached through a [`RegisterIo`].
#[derive(Debug, Default)]
pub struct NodeMap {
    version: String,
    nodes: HashMap<String, Node>,
}

impl NodeMap {
    /// Return the schema version string associated with the XML description.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Fetch a node by exact name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Feature names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// List the entry names of an enumeration feature in declaration order.
    pub fn enum_entries(&self, name: &str) -> Result<Vec<String>, GenApiError> {
        let node = self.get_enum_node(name)?;
        Ok(node.entries.iter().map(|(entry, _)| entry.clone()).collect())
    }

    /// Read an integer feature value using the provided transport.
    pub fn get_integer(&self, name: &str, io: &dyn RegisterIo) -> Result<i64, GenApiError> {
        self.get_integer_node(name)?.get(io)
    }

    /// Write an integer feature after range validation.
    pub fn set_integer(
        &self,
        name: &str,
        value: i64,
        io: &dyn RegisterIo,
    ) -> Result<(), GenApiError> {
        self.get_integer_node(name)?.set(value, io)
    }

    /// Read a floating point feature.
    pub fn get_float(&self, name: &str, io: &dyn RegisterIo) -> Result<f64, GenApiError> {
        self.get_float_node(name)?.get(io)
    }

    /// Write a floating point feature.
    pub fn set_float(&self, name: &str, value: f64, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        self.get_float_node(name)?.set(value, io)
    }

    /// Read a boolean feature.
    pub fn get_bool(&self, name: &str, io: &dyn RegisterIo) -> Result<bool, GenApiError> {
        self.get_bool_node(name)?.get(io)
    }

    /// Write a boolean feature.
    pub fn set_bool(&self, name: &str, value: bool, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        self.get_bool_node(name)?.set(value, io)
    }

    /// Read a string feature.
    pub fn get_string(&self, name: &str, io: &dyn RegisterIo) -> Result<String, GenApiError> {
        self.get_string_node(name)?.get(io)
    }

    /// Write a string feature.
    pub fn set_string(&self, name: &str, value: &str, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        self.get_string_node(name)?.set(value, io)
    }

    /// Read an enumeration feature returning the symbolic entry name.
    pub fn get_enum(&self, name: &str, io: &dyn RegisterIo) -> Result<String, GenApiError> {
        self.get_enum_node(name)?.get(io)
    }

    /// Write an enumeration entry by name.
    pub fn set_enum(&self, name: &str, entry: &str, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        self.get_enum_node(name)?.set(entry, io)
    }

    /// Read the integer behind an enumeration feature.
    pub fn get_enum_int(&self, name: &str, io: &dyn RegisterIo) -> Result<i64, GenApiError> {
        self.get_enum_node(name)?.get_int(io)
    }

    /// Write the integer behind an enumeration feature.
    pub fn set_enum_int(&self, name: &str, value: i64, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        self.get_enum_node(name)?.set_int(value, io)
    }

    /// Execute a command feature.
    pub fn exec_command(&self, name: &str, io: &dyn RegisterIo) -> Result<(), GenApiError> {
        self.get_command_node(name)?.execute(io)
    }

    fn lookup(&self, name: &str) -> Result<&Node, GenApiError> {
        self.nodes
            .get(name)
            .ok_or_else(|| GenApiError::NodeNotFound(name.to_string()))
    }

    fn get_integer_node(&self, name: &str) -> Result<&IntegerNode, GenApiError> {
        match self.lookup(name)? {
            Node::Integer(node) => Ok(node),
            _ => Err(GenApiError::Type(name.to_string())),
        }
    }

    fn get_float_node(&self, name: &str) -> Result<&FloatNode, GenApiError> {
        match self.lookup(name)? {
            Node::Float(node) => Ok(node),
            _ => Err(GenApiError::Type(name.to_string())),
        }
    }

    fn get_bool_node(&self, name: &str) -> Result<&BooleanNode, GenApiError> {
        match self.lookup(name)? {
            Node::Boolean(node) => Ok(node),
            _ => Err(GenApiError::Type(name.to_string())),
        }
    }

    fn get_string_node(&self, name: &str) -> Result<&StringNode, GenApiError> {
        match self.lookup(name)? {
            Node::String(node) => Ok(node),
            _ => Err(GenApiError::Type(name.to_string())),
        }
    }

    fn get_enum_node(&self, name: &str) -> Result<&EnumNode, GenApiError> {
        match self.lookup(name)? {
            Node::Enum(node) => Ok(node),
            _ => Err(GenApiError::Type(name.to_string())),
        }
    }

    fn get_command_node(&self, name: &str) -> Result<&CommandNode, GenApiError> {
        match self.lookup(name)? {
            Node::Command(node) => Ok(node),
            _ => Err(GenApiError::Type(name.to_string())),
        }
    }
}

impl From<XmlModel> for NodeMap {
    fn from(model: XmlModel) -> Self {
        let mut nodes = HashMap::with_capacity(model.nodes.len());
        for decl in model.nodes {
            let node = match decl {
                NodeDecl::Integer {
                    name,
                    address,
                    len,
                    access,
                    min,
                    max,
                    inc,
                    unit,
                } => Node::Integer(IntegerNode {
                    name,
                    address,
                    len,
                    access,
                    min,
                    max,
                    inc,
                    unit,
                }),
                NodeDecl::Float {
                    name,
                    address,
                    len,
                    access,
                    min,
                    max,
                    unit,
                    scale,
                    offset,
                } => Node::Float(FloatNode {
                    name,
                    address,
                    len,
                    access,
                    min,
                    max,
                    unit,
                    scale,
                    offset,
                }),
                NodeDecl::Boolean {
                    name,
                    address,
                    len,
                    access,
                    on_value,
                    off_value,
                } => Node::Boolean(BooleanNode {
                    name,
                    address,
                    len,
                    access,
                    on_value,
                    off_value,
                }),
                NodeDecl::String {
                    name,
                    address,
                    len,
                    access,
                } => Node::String(StringNode {
                    name,
                    address,
                    len,
                    access,
                }),
                NodeDecl::Enum {
                    name,
                    address,
                    len,
                    access,
                    entries,
                } => Node::Enum(EnumNode::new(name, address, len, access, entries)),
                NodeDecl::Command {
                    name,
                    address,
                    len,
                    command_value,
                } => Node::Command(CommandNode {
                    name,
                    address,
                    len,
                    command_value,
                }),
            };
            let name = node.name().to_string();
            if nodes.insert(name.clone(), node).is_some() {
                warn!(node = %name, "duplicate node declaration, keeping the last one");
            }
        }
        debug!(version = %model.version, nodes = nodes.len(), "built node map");

        NodeMap {
            version: model.version,
            nodes,
        }
    }
}
