use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    path::PathBuf,
};

/// A volume descriptor as handed down by the volume manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name, which doubles as the object name within the backend
    /// bucket.
    pub name: String,
    /// Host locator in `host@backend#pool` form.
    pub host: String,
    /// Volume size in GiB.
    pub size: u64,
}

impl Volume {
    /// The host portion of the volume's host locator.
    pub fn host_name(&self) -> &str {
        extract_host(&self.host)
    }
}

/// A snapshot descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name.
    pub name: String,
    /// Name of the volume the snapshot was taken from.
    pub volume_name: String,
}

/// An attachment request originating from the volume manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    /// Host the volume is to be attached on.
    pub host: String,
}

/// Connection information returned to the volume manager when a volume is
/// attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    /// Connection type understood by the volume manager.
    pub driver_volume_type: String,
    /// Connection data for the given type.
    pub data: ConnectionData,
}

/// Connection data for locally attached NBD volumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionData {
    /// Local block device node of the volume.
    pub device_path: PathBuf,
}

impl ConnectionInfo {
    /// Connection info for a volume attached on the caller's own host.
    pub fn local(device_path: PathBuf) -> Self {
        Self {
            driver_volume_type: "local".to_string(),
            data: ConnectionData { device_path },
        }
    }
}

/// Backend capacity as reported in volume stats. The cluster does not expose
/// per-bucket capacity, so the driver usually reports `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Capacity in GiB.
    Gib(u64),
    /// Capacity is not known.
    Unknown,
}

impl Serialize for Capacity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Capacity::Gib(size) => serializer.serialize_u64(*size),
            Capacity::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl Display for Capacity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Capacity::Gib(size) => write!(f, "{size}"),
            Capacity::Unknown => write!(f, "unknown"),
        }
    }
}

/// The fixed-shape stats record the driver reports to the volume manager.
/// Key names are part of the framework contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeStats {
    /// Storage vendor.
    pub vendor_name: String,
    /// Driver version.
    pub driver_version: String,
    /// Protocol volumes are attached over.
    pub storage_protocol: String,
    /// Total backend capacity in GiB.
    pub total_capacity_gb: Capacity,
    /// Free backend capacity in GiB.
    pub free_capacity_gb: Capacity,
    /// Percentage of the backend held in reserve.
    pub reserved_percentage: u8,
    /// Whether the backend honors QoS settings.
    #[serde(rename = "QoS_support")]
    pub qos_support: bool,
    /// Name the volume manager schedules this backend under.
    pub volume_backend_name: String,
    /// `driver:host:bucket` locator used for backend-local migrations.
    pub location_info: String,
    /// Management endpoint the driver talks to.
    pub restapi_url: String,
}

/// The host portion of a `host@backend#pool` locator. Bare host names pass
/// through unchanged.
pub fn extract_host(locator: &str) -> &str {
    let locator = match locator.split_once('#') {
        Some((head, _)) => head,
        None => locator,
    };
    match locator.split_once('@') {
        Some((head, _)) => head,
        None => locator,
    }
}
