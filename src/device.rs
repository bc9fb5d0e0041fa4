//! NBD device listings and local device node resolution.

use crate::rest::ApiClientError;
use serde::Deserialize;
use std::path::PathBuf;

/// One NBD device mapping as listed by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NbdDevice {
    object_path: String,
    number: i64,
}

impl NbdDevice {
    /// Object path the device is backed by.
    pub fn object_path(&self) -> &str {
        &self.object_path
    }
    /// NBD device number on the owning host.
    pub fn number(&self) -> i64 {
        self.number
    }
}

/// Devices listing payload. The cluster double-encodes the device array:
/// the envelope payload carries a JSON string which itself parses to the
/// device list.
#[derive(Debug, Deserialize)]
pub(crate) struct DeviceListPayload {
    value: String,
}

impl DeviceListPayload {
    /// Decode the inner device list.
    pub(crate) fn decode(self) -> Result<Vec<NbdDevice>, ApiClientError> {
        serde_json::from_str(&self.value).map_err(|error| {
            ApiClientError::InvalidResponse(format!(
                "Failed to decode NBD device listing, error = {error}"
            ))
        })
    }
}

/// Device number mapped to the given object path, if any. The cluster lists
/// unmapped objects with a negative number; those resolve to `None`.
pub(crate) fn find_device_number(devices: &[NbdDevice], object_path: &str) -> Option<i64> {
    devices
        .iter()
        .find(|device| device.object_path == object_path)
        .map(|device| device.number)
        .filter(|number| *number >= 0)
}

/// Local device node for an NBD device number.
pub(crate) fn nbd_device_path(number: i64) -> PathBuf {
    PathBuf::from(format!("/dev/nbd{number}"))
}
