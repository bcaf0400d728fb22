//! Capture device identity and the process-wide device registry.

use crate::types::Mode;
use lazy_static::lazy_static;
use std::any::Any;
use std::sync::{Arc, Mutex};

/// A discoverable capture source: identity, connectivity, and the list
/// of modes it can produce.
///
/// Devices are created during enumeration and owned by shared reference;
/// a device handle may outlive the session that used it. Platform
/// variants add accessors of their own (a device path on V4L2, a
/// front-facing flag where the platform reports one).
pub trait CaptureDevice: Send + Sync {
    /// Human-readable device name as reported by the platform.
    fn name(&self) -> &str;

    /// Stable identifier (device path, platform index, or similar).
    fn unique_id(&self) -> &str;

    /// Probe whether the device can currently be opened.
    fn check_available(&self) -> bool;

    /// Whether the device is still physically present.
    fn is_connected(&self) -> bool;

    /// Enumerated capture modes. May be empty; backends then fall back
    /// to requesting the raw size from the driver.
    fn modes(&self) -> Vec<Mode>;

    /// True for user-facing cameras on platforms that report it.
    fn is_front_facing(&self) -> bool {
        false
    }

    /// Concrete-type access for backend selection.
    fn as_any(&self) -> &dyn Any;
}

pub type DeviceRef = Arc<dyn CaptureDevice>;

type Enumerator = Box<dyn Fn() -> Vec<DeviceRef> + Send + Sync>;

/// Process-wide cache of discovered devices.
///
/// The cached list is replaced only on `force_refresh` or when it is
/// unset/empty; otherwise callers get clones of the same `Arc` handles,
/// so repeated lookups are enumeration-free and pointer-identical.
pub struct DeviceRegistry {
    cache: Mutex<Option<Vec<DeviceRef>>>,
    enumerate: Enumerator,
}

lazy_static! {
    static ref GLOBAL_REGISTRY: DeviceRegistry = DeviceRegistry::new();
}

impl DeviceRegistry {
    /// Registry backed by the platform's native enumeration.
    pub fn new() -> Self {
        Self::with_enumerator(Box::new(crate::backend::enumerate_devices))
    }

    /// Registry with an injected enumeration source. Lets tests (and
    /// embedders with their own discovery) feed the same caching logic.
    pub fn with_enumerator(enumerate: Enumerator) -> Self {
        Self {
            cache: Mutex::new(None),
            enumerate,
        }
    }

    /// The shared default registry.
    pub fn global() -> &'static DeviceRegistry {
        &GLOBAL_REGISTRY
    }

    /// Cached device list, re-enumerating when forced or when the cache
    /// is unset or empty.
    pub fn devices(&self, force_refresh: bool) -> Vec<DeviceRef> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        let stale = force_refresh || cache.as_ref().map_or(true, |list| list.is_empty());
        if stale {
            let found = (self.enumerate)();
            log::debug!("device enumeration found {} device(s)", found.len());
            *cache = Some(found);
        }

        cache.as_ref().map(Vec::clone).unwrap_or_default()
    }

    /// Exact-name lookup over the cached list. Returns `None` when
    /// nothing matches; never an error.
    pub fn find_by_name(&self, name: &str) -> Option<DeviceRef> {
        self.devices(false).into_iter().find(|d| d.name() == name)
    }

    /// Substring lookup over the cached list.
    pub fn find_by_name_contains(&self, fragment: &str) -> Option<DeviceRef> {
        self.devices(false)
            .into_iter()
            .find(|d| d.name().contains(fragment))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Default device choice: first non-front-facing device, else the first
/// available one.
pub fn pick_default_device(devices: &[DeviceRef]) -> Option<DeviceRef> {
    devices
        .iter()
        .find(|d| !d.is_front_facing())
        .or_else(|| devices.first())
        .cloned()
}
