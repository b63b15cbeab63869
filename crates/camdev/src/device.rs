//! The device contract and the helpers shared by its implementations.

use std::sync::OnceLock;

use genapi_core::{GenApiError, NodeMap, RegisterIo};
use genapi_xml::XmlError;
use tracing::{debug, info};

use crate::notifier::ControlLostNotifier;
use crate::stream::{FrameCallback, Stream};
use crate::DeviceError;

/// One camera connection.
///
/// Implementations provide raw memory access, the feature tree and stream
/// creation; typed feature access is layered on top by
/// [`DeviceExt`](crate::DeviceExt). Register traffic is serialized by the
/// implementation, so a device can be shared between threads.
pub trait Device: Send + Sync {
    /// Create and start an acquisition channel delivering frames to
    /// `callback` on the stream's worker thread.
    ///
    /// Returns only once the worker is running, or an error when it did not
    /// become ready in time.
    fn create_stream(&self, callback: FrameCallback) -> Result<Stream, DeviceError>;

    /// Fill `buffer` with device memory starting at `address`.
    ///
    /// An empty buffer is rejected with [`DeviceError::InvalidArgument`]
    /// before any IO. On failure the buffer contents are unspecified.
    fn read_memory(&self, address: u32, buffer: &mut [u8]) -> Result<(), DeviceError>;

    /// Write `data` to device memory starting at `address`. Either the whole
    /// region is written or an error is returned.
    fn write_memory(&self, address: u32, data: &[u8]) -> Result<(), DeviceError>;

    /// Read one big-endian 32-bit register.
    fn read_register(&self, address: u32) -> Result<u32, DeviceError> {
        let mut word = [0u8; 4];
        self.read_memory(address, &mut word)?;
        Ok(u32::from_be_bytes(word))
    }

    /// Write one big-endian 32-bit register.
    fn write_register(&self, address: u32, value: u32) -> Result<(), DeviceError> {
        self.write_memory(address, &value.to_be_bytes())
    }

    /// Feature tree of the device, built on first use and cached for the
    /// lifetime of the device. A failed build is cached as well.
    fn genicam(&self) -> Result<&NodeMap, DeviceError>;

    /// Raw description document the feature tree was built from.
    fn genicam_xml(&self) -> &[u8] {
        &[]
    }

    /// Notifier fired when exclusive control of the device is lost.
    fn control_lost(&self) -> &ControlLostNotifier;
}

/// Reject zero-length transfers before touching the transport.
pub fn ensure_nonempty(len: usize) -> Result<(), DeviceError> {
    if len == 0 {
        return Err(DeviceError::invalid("memory access requires a non-empty buffer"));
    }
    Ok(())
}

/// Retrieve the description document through the device memory, following
/// the bootstrap URL at address zero.
pub fn fetch_description<D: Device + ?Sized>(device: &D) -> Result<String, DeviceError> {
    genapi_xml::load_xml(|addr, len| {
        let address = u32::try_from(addr)
            .map_err(|_| XmlError::Transport(format!("address 0x{addr:X} outside 32-bit space")))?;
        let mut buffer = vec![0u8; len];
        device
            .read_memory(address, &mut buffer)
            .map_err(|err| XmlError::Transport(err.to_string()))?;
        Ok(buffer)
    })
    .map_err(|err| DeviceError::Genicam(err.to_string()))
}

#[derive(Debug)]
struct Description {
    xml: Vec<u8>,
    nodes: NodeMap,
}

/// Lazily built, never rebuilt feature tree for a [`Device`] implementation.
#[derive(Debug, Default)]
pub struct GenicamCell {
    cell: OnceLock<Result<Description, String>>,
}

impl GenicamCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached tree, building it with the document produced by
    /// `fetch` on first use. Concurrent first calls build it once.
    pub fn get_or_load<F>(&self, fetch: F) -> Result<&NodeMap, DeviceError>
    where
        F: FnOnce() -> Result<String, DeviceError>,
    {
        self.load(fetch).map(|description| &description.nodes)
    }

    /// Raw document backing the tree, empty when it could not be loaded.
    pub fn xml_or_load<F>(&self, fetch: F) -> &[u8]
    where
        F: FnOnce() -> Result<String, DeviceError>,
    {
        match self.load(fetch) {
            Ok(description) => &description.xml,
            Err(_) => &[],
        }
    }

    /// Whether a build, successful or not, has already happened.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    fn load<F>(&self, fetch: F) -> Result<&Description, DeviceError>
    where
        F: FnOnce() -> Result<String, DeviceError>,
    {
        self.cell
            .get_or_init(|| {
                let xml = fetch().map_err(|err| err.to_string())?;
                let model = genapi_xml::parse(&xml).map_err(|err| err.to_string())?;
                let nodes = NodeMap::from(model);
                info!(
                    version = nodes.version(),
                    features = nodes.len(),
                    "feature tree ready"
                );
                Ok(Description {
                    xml: xml.into_bytes(),
                    nodes,
                })
            })
            .as_ref()
            .map_err(|msg| DeviceError::Genicam(msg.clone()))
    }
}

/// [`RegisterIo`] view of a device, used to drive feature nodes.
pub struct DeviceIo<'a, D: ?Sized> {
    device: &'a D,
}

impl<'a, D: Device + ?Sized> DeviceIo<'a, D> {
    pub fn new(device: &'a D) -> Self {
        Self { device }
    }
}

fn to_address(addr: u64) -> Result<u32, GenApiError> {
    u32::try_from(addr)
        .map_err(|_| GenApiError::Io(format!("address 0x{addr:X} outside 32-bit space")))
}

impl<D: Device + ?Sized> RegisterIo for DeviceIo<'_, D> {
    fn read(&self, addr: u64, len: usize) -> Result<Vec<u8>, GenApiError> {
        let address = to_address(addr)?;
        let mut buffer = vec![0u8; len];
        self.device
            .read_memory(address, &mut buffer)
            .map_err(|err| GenApiError::Io(err.to_string()))?;
        debug!(address, len, "feature register read");
        Ok(buffer)
    }

    fn write(&self, addr: u64, data: &[u8]) -> Result<(), GenApiError> {
        let address = to_address(addr)?;
        self.device
            .write_memory(address, data)
            .map_err(|err| GenApiError::Io(err.to_string()))?;
        debug!(address, len = data.len(), "feature register write");
        Ok(())
    }
}
