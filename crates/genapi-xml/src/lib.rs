//! Retrieve and parse GenICam description documents using quick-xml.
//!
//! Only the subset of the schema needed to build a register-backed feature
//! tree is understood: `Integer`, `Float`, `Boolean`, `String`,
//! `Enumeration` and `Command` nodes placed directly below the
//! `RegisterDescription` root. Anything else is skipped.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::{debug, trace};

/// Address of the bootstrap register holding the document URL.
pub const FIRST_URL_ADDRESS: u64 = 0x0000;
/// Maximum length of the bootstrap URL string.
pub const FIRST_URL_MAX_LEN: usize = 512;

const DEFAULT_REGISTER_LEN: u32 = 4;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid descriptor: {0}")]
    Invalid(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("unsupported URL: {0}")]
    Unsupported(String),
}

/// Access rights declared for a register-backed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read only.
    RO,
    /// Write only.
    WO,
    /// Read/write.
    #[default]
    RW,
}

impl AccessMode {
    fn parse(value: &str) -> Result<Self, XmlError> {
        match value.trim() {
            "RO" => Ok(AccessMode::RO),
            "WO" => Ok(AccessMode::WO),
            "RW" => Ok(AccessMode::RW),
            other => Err(XmlError::Invalid(format!("unknown access mode '{other}'"))),
        }
    }
}

/// Node declaration extracted from the description document.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeDecl {
    Integer {
        name: String,
        address: u64,
        len: u32,
        access: AccessMode,
        min: i64,
        max: i64,
        inc: Option<i64>,
        unit: Option<String>,
    },
    Float {
        name: String,
        address: u64,
        len: u32,
        access: AccessMode,
        min: f64,
        max: f64,
        unit: Option<String>,
        /// Rational scale `(numerator, denominator)`; when present the
        /// register holds a scaled integer instead of an IEEE-754 value.
        scale: Option<(i64, i64)>,
        offset: Option<f64>,
    },
    Boolean {
        name: String,
        address: u64,
        len: u32,
        access: AccessMode,
        on_value: i64,
        off_value: i64,
    },
    String {
        name: String,
        address: u64,
        len: u32,
        access: AccessMode,
    },
    Enum {
        name: String,
        address: u64,
        len: u32,
        access: AccessMode,
        entries: Vec<(String, i64)>,
    },
    Command {
        name: String,
        address: u64,
        len: u32,
        command_value: i64,
    },
}

impl NodeDecl {
    /// Feature name of the declaration.
    pub fn name(&self) -> &str {
        match self {
            NodeDecl::Integer { name, .. }
            | NodeDecl::Float { name, .. }
            | NodeDecl::Boolean { name, .. }
            | NodeDecl::String { name, .. }
            | NodeDecl::Enum { name, .. }
            | NodeDecl::Command { name, .. } => name,
        }
    }
}

/// Parsed description document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlModel {
    /// Schema version in `major.minor.subminor` form, `0.0.0` when absent.
    pub version: String,
    pub nodes: Vec<NodeDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimalXmlInfo {
    pub schema_version: Option<String>,
    pub top_level_features: Vec<String>,
}

/// Fetch the description document using the provided memory reader.
///
/// The reader must return exactly the requested number of bytes starting at
/// the provided address.
pub fn load_xml<F>(mut read_mem: F) -> Result<String, XmlError>
where
    F: FnMut(u64, usize) -> Result<Vec<u8>, XmlError>,
{
    let url_bytes = read_mem(FIRST_URL_ADDRESS, FIRST_URL_MAX_LEN)?;
    let url = first_cstring(&url_bytes)
        .ok_or_else(|| XmlError::Invalid("FirstURL register is empty".into()))?;
    debug!(%url, "resolving description document URL");
    match UrlLocation::parse(&url)? {
        UrlLocation::Local { address, length } => {
            let xml_bytes = read_mem(address, length)?;
            String::from_utf8(xml_bytes)
                .map_err(|err| XmlError::Xml(format!("invalid UTF-8: {err}")))
        }
        UrlLocation::LocalNamed(name) => Err(XmlError::Unsupported(format!(
            "named local URL '{name}' is not supported"
        ))),
        UrlLocation::Http(url) => Err(XmlError::Unsupported(format!(
            "HTTP retrieval is not implemented ({url})"
        ))),
        UrlLocation::File(path) => Err(XmlError::Unsupported(format!(
            "file URL '{path}' is not supported"
        ))),
    }
}

/// Parse the description document into node declarations.
pub fn parse(xml: &str) -> Result<XmlModel, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut version = None;
    let mut nodes = Vec::new();
    let mut pending: Option<PendingDecl> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                open_element(&e, depth, false, &mut version, &mut pending)?;
            }
            Ok(Event::Empty(e)) => {
                depth += 1;
                open_element(&e, depth, true, &mut version, &mut pending)?;
                if depth == 2 {
                    if let Some(decl) = pending.take() {
                        nodes.push(decl.finish()?);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Text(text)) => {
                if let Some(decl) = pending.as_mut() {
                    let value = text
                        .unescape()
                        .map_err(|err| XmlError::Xml(err.to_string()))?;
                    decl.text(value.trim());
                }
            }
            Ok(Event::End(e)) => {
                if depth == 2 {
                    if let Some(decl) = pending.take() {
                        nodes.push(decl.finish()?);
                    }
                } else if let Some(decl) = pending.as_mut() {
                    decl.close(e.name().as_ref());
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    let version = version.unwrap_or_else(|| "0.0.0".to_string());
    debug!(%version, nodes = nodes.len(), "parsed description document");
    Ok(XmlModel { version, nodes })
}

fn open_element(
    event: &BytesStart<'_>,
    depth: usize,
    empty: bool,
    version: &mut Option<String>,
    pending: &mut Option<PendingDecl>,
) -> Result<(), XmlError> {
    let tag = event.name();
    match depth {
        1 => {
            if version.is_none() {
                *version = extract_schema_version(event);
            }
        }
        2 => {
            if let Some(kind) = DeclKind::from_tag(tag.as_ref()) {
                let name = attribute_value(event, b"Name")?.ok_or_else(|| {
                    XmlError::Invalid(format!("{kind:?} node without Name attribute"))
                })?;
                *pending = Some(PendingDecl::new(kind, name));
            } else {
                trace!(tag = %String::from_utf8_lossy(tag.as_ref()), "skipping element");
            }
        }
        _ => {
            if let Some(decl) = pending.as_mut() {
                if tag.as_ref() == b"EnumEntry" {
                    let entry = attribute_value(event, b"Name")?.ok_or_else(|| {
                        XmlError::Invalid(format!("EnumEntry without Name in {}", decl.name))
                    })?;
                    let value = attribute_value(event, b"Value")?;
                    decl.entries.push((entry, value));
                    decl.in_entry = !empty;
                } else if !empty {
                    decl.field = Some(String::from_utf8_lossy(tag.as_ref()).into_owned());
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Integer,
    Float,
    Boolean,
    String,
    Enumeration,
    Command,
}

impl DeclKind {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"Integer" => Some(DeclKind::Integer),
            b"Float" => Some(DeclKind::Float),
            b"Boolean" => Some(DeclKind::Boolean),
            b"String" => Some(DeclKind::String),
            b"Enumeration" => Some(DeclKind::Enumeration),
            b"Command" => Some(DeclKind::Command),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct PendingDecl {
    kind: DeclKind,
    name: String,
    fields: HashMap<String, String>,
    entries: Vec<(String, Option<String>)>,
    field: Option<String>,
    in_entry: bool,
}

impl PendingDecl {
    fn new(kind: DeclKind, name: String) -> Self {
        Self {
            kind,
            name,
            fields: HashMap::new(),
            entries: Vec::new(),
            field: None,
            in_entry: false,
        }
    }

    fn text(&mut self, value: &str) {
        let Some(field) = self.field.as_deref() else {
            return;
        };
        if self.in_entry {
            if field == "Value" {
                if let Some(last) = self.entries.last_mut() {
                    last.1 = Some(value.to_string());
                }
            }
            return;
        }
        self.fields.insert(field.to_string(), value.to_string());
    }

    fn close(&mut self, tag: &[u8]) {
        if tag == b"EnumEntry" {
            self.in_entry = false;
        }
        self.field = None;
    }

    fn finish(self) -> Result<NodeDecl, XmlError> {
        let name = self.name.clone();
        let decl = match self.kind {
            DeclKind::Integer => NodeDecl::Integer {
                address: self.address()?,
                len: self.len()?,
                access: self.access()?,
                min: self.opt_i64("Min")?.unwrap_or(i64::MIN),
                max: self.opt_i64("Max")?.unwrap_or(i64::MAX),
                inc: self.opt_i64("Inc")?,
                unit: self.fields.get("Unit").cloned(),
                name,
            },
            DeclKind::Float => NodeDecl::Float {
                address: self.address()?,
                len: self.len()?,
                access: self.access()?,
                min: self.opt_f64("Min")?.unwrap_or(f64::MIN),
                max: self.opt_f64("Max")?.unwrap_or(f64::MAX),
                unit: self.fields.get("Unit").cloned(),
                scale: self
                    .fields
                    .get("Scale")
                    .map(|value| parse_scale(value))
                    .transpose()?,
                offset: self.opt_f64("Offset")?,
                name,
            },
            DeclKind::Boolean => NodeDecl::Boolean {
                address: self.address()?,
                len: self.len()?,
                access: self.access()?,
                on_value: self.opt_i64("OnValue")?.unwrap_or(1),
                off_value: self.opt_i64("OffValue")?.unwrap_or(0),
                name,
            },
            DeclKind::String => {
                if !self.fields.contains_key("Length") {
                    return Err(XmlError::Invalid(format!(
                        "string node {name} requires a Length"
                    )));
                }
                NodeDecl::String {
                    address: self.address()?,
                    len: self.len()?,
                    access: self.access()?,
                    name,
                }
            }
            DeclKind::Enumeration => {
                let mut entries = Vec::with_capacity(self.entries.len());
                for (entry, value) in &self.entries {
                    let value = value.as_deref().ok_or_else(|| {
                        XmlError::Invalid(format!("entry {entry} of {name} has no value"))
                    })?;
                    entries.push((entry.clone(), parse_i64(value)?));
                }
                NodeDecl::Enum {
                    address: self.address()?,
                    len: self.len()?,
                    access: self.access()?,
                    entries,
                    name,
                }
            }
            DeclKind::Command => NodeDecl::Command {
                address: self.address()?,
                len: self.len()?,
                command_value: self.opt_i64("CommandValue")?.unwrap_or(1),
                name,
            },
        };
        trace!(node = decl.name(), kind = ?self.kind, "declared node");
        Ok(decl)
    }

    fn address(&self) -> Result<u64, XmlError> {
        let value = self
            .fields
            .get("Address")
            .ok_or_else(|| XmlError::Invalid(format!("node {} has no Address", self.name)))?;
        parse_int(value)
    }

    fn len(&self) -> Result<u32, XmlError> {
        match self.fields.get("Length") {
            Some(value) => parse_int(value)?
                .try_into()
                .map_err(|_| XmlError::Invalid(format!("length of {} overflows", self.name))),
            None => Ok(DEFAULT_REGISTER_LEN),
        }
    }

    fn access(&self) -> Result<AccessMode, XmlError> {
        self.fields
            .get("AccessMode")
            .map(|value| AccessMode::parse(value))
            .transpose()
            .map(Option::unwrap_or_default)
    }

    fn opt_i64(&self, key: &str) -> Result<Option<i64>, XmlError> {
        self.fields.get(key).map(|value| parse_i64(value)).transpose()
    }

    fn opt_f64(&self, key: &str) -> Result<Option<f64>, XmlError> {
        self.fields
            .get(key)
            .map(|value| {
                value
                    .trim()
                    .parse::<f64>()
                    .map_err(|err| XmlError::Invalid(format!("invalid float '{value}': {err}")))
            })
            .transpose()
    }
}

/// Parse a GenICam XML snippet and collect minimal metadata.
pub fn parse_into_minimal_nodes(xml: &str) -> Result<MinimalXmlInfo, XmlError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut schema_version: Option<String> = None;
    let mut top_level_features = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                collect_top_level(&e, depth, &mut schema_version, &mut top_level_features)?;
            }
            Ok(Event::Empty(e)) => {
                depth += 1;
                collect_top_level(&e, depth, &mut schema_version, &mut top_level_features)?;
                depth = depth.saturating_sub(1);
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(MinimalXmlInfo {
        schema_version,
        top_level_features,
    })
}

fn collect_top_level(
    event: &BytesStart<'_>,
    depth: usize,
    schema_version: &mut Option<String>,
    top_level: &mut Vec<String>,
) -> Result<(), XmlError> {
    if depth == 1 && schema_version.is_none() {
        *schema_version = extract_schema_version(event);
    } else if depth == 2 {
        match attribute_value(event, b"Name")? {
            Some(name) => top_level.push(name),
            None => top_level.push(String::from_utf8_lossy(event.name().as_ref()).to_string()),
        }
    }
    Ok(())
}

fn extract_schema_version(event: &BytesStart<'_>) -> Option<String> {
    let major = attribute_value(event, b"SchemaMajorVersion").ok().flatten();
    let minor = attribute_value(event, b"SchemaMinorVersion").ok().flatten();
    let sub = attribute_value(event, b"SchemaSubMinorVersion")
        .ok()
        .flatten();
    if major.is_none() && minor.is_none() && sub.is_none() {
        None
    } else {
        let major = major.unwrap_or_else(|| "0".to_string());
        let minor = minor.unwrap_or_else(|| "0".to_string());
        let sub = sub.unwrap_or_else(|| "0".to_string());
        Some(format!("{major}.{minor}.{sub}"))
    }
}

fn attribute_value(event: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, XmlError> {
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| XmlError::Xml(err.to_string()))?;
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                return Ok(None);
            }
            return Ok(Some(trimmed));
        }
    }
    Ok(None)
}

#[derive(Debug)]
enum UrlLocation {
    Local { address: u64, length: usize },
    LocalNamed(String),
    Http(String),
    File(String),
}

impl UrlLocation {
    fn parse(url: &str) -> Result<Self, XmlError> {
        if let Some(rest) = url.strip_prefix("local:") {
            parse_local_url(rest)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            Ok(UrlLocation::Http(url.to_string()))
        } else if url.starts_with("file://") {
            Ok(UrlLocation::File(url.to_string()))
        } else {
            Err(XmlError::Unsupported(format!("unknown URL scheme: {url}")))
        }
    }
}

fn parse_local_url(rest: &str) -> Result<UrlLocation, XmlError> {
    let trimmed = rest.trim();
    if trimmed.is_empty() {
        return Err(XmlError::Invalid("empty local URL".into()));
    }
    let mut address = None;
    let mut length = None;
    for part in trimmed.split([';', ',']) {
        let token = part.trim();
        if token.is_empty() {
            continue;
        }
        if let Some((key, value)) = token.split_once('=') {
            match key.trim().to_ascii_lowercase().as_str() {
                "address" | "addr" | "offset" => address = Some(parse_int(value)?),
                "length" | "size" => {
                    let len = parse_int(value)?;
                    length = Some(
                        len.try_into()
                            .map_err(|_| XmlError::Invalid("length does not fit usize".into()))?,
                    );
                }
                _ => {}
            }
        } else if token.starts_with("0x") {
            address = Some(parse_int(token)?);
        } else {
            return Ok(UrlLocation::LocalNamed(token.to_string()));
        }
    }
    match (address, length) {
        (Some(address), Some(length)) => Ok(UrlLocation::Local { address, length }),
        _ => Err(XmlError::Invalid(format!("unsupported local URL: {rest}"))),
    }
}

fn parse_int(value: &str) -> Result<u64, XmlError> {
    let trimmed = value.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16)
            .map_err(|err| XmlError::Invalid(format!("invalid hex value '{trimmed}': {err}")))
    } else {
        trimmed
            .parse()
            .map_err(|err| XmlError::Invalid(format!("invalid integer '{trimmed}': {err}")))
    }
}

fn parse_i64(value: &str) -> Result<i64, XmlError> {
    let trimmed = value.trim();
    if let Some(negative) = trimmed.strip_prefix('-') {
        let magnitude = parse_int(negative)?;
        if magnitude == i64::MIN.unsigned_abs() {
            return Ok(i64::MIN);
        }
        let magnitude = i64::try_from(magnitude)
            .map_err(|_| XmlError::Invalid(format!("integer '{trimmed}' out of range")))?;
        Ok(-magnitude)
    } else {
        // Hex literals may spell out the full 64-bit pattern.
        let raw = parse_int(trimmed)?;
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            Ok(raw as i64)
        } else {
            i64::try_from(raw)
                .map_err(|_| XmlError::Invalid(format!("integer '{trimmed}' out of range")))
        }
    }
}

fn parse_scale(value: &str) -> Result<(i64, i64), XmlError> {
    let (num, den) = value
        .split_once('/')
        .ok_or_else(|| XmlError::Invalid(format!("scale '{value}' is not a fraction")))?;
    let num = parse_i64(num)?;
    let den = parse_i64(den)?;
    if den == 0 {
        return Err(XmlError::Invalid(format!("scale '{value}' has zero denominator")));
    }
    Ok((num, den))
}

fn first_cstring(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let value = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
