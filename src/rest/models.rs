//! Wire types of the EdgeStore management API. Key names are part of the
//! REST contract and must not change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of the NBD device create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNbdBody {
    /// Object backing the new device.
    pub object_path: String,
    /// Volume size in MiB.
    #[serde(rename = "volSizeMB")]
    pub vol_size_mb: u64,
    /// Device block size in bytes.
    pub block_size: u32,
    /// Object chunk size in bytes.
    pub chunk_size: u32,
}

/// Body of the NBD device delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNbdBody {
    /// Object backing the device.
    pub object_path: String,
    /// Device number on the owning host.
    pub number: i64,
}

/// Body of the NBD device resize call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeNbdBody {
    /// Object backing the device.
    pub object_path: String,
    /// New volume size in MiB.
    #[serde(rename = "newSizeMB")]
    pub new_size_mb: u64,
}

/// Body of the snapshot create and delete calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotBody {
    /// Object the snapshot belongs to.
    pub object_path: String,
    /// Snapshot name.
    pub snap_name: String,
}

/// Body of the snapshot clone call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneSnapshotBody {
    /// Object the snapshot belongs to.
    pub object_path: String,
    /// Snapshot name.
    pub snap_name: String,
    /// Object path of the clone to create.
    pub clone_path: String,
}

/// Body of the object clone call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloneObjectBody {
    /// Tenant owning the clone.
    pub tenant_name: String,
    /// Bucket owning the clone.
    pub bucket_name: String,
    /// Object name of the clone.
    pub object_name: String,
}

/// One server record from the cluster's `system/stats` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerRecord {
    hostname: String,
    // Absent on servers without a configured NBD frontend.
    ipv6addr: Option<String>,
}

impl ServerRecord {
    /// Host name the server reports.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }
    /// IPv6 address NBD devices of this server are managed through.
    pub fn ipv6addr(&self) -> Option<&str> {
        self.ipv6addr.as_deref()
    }
}

/// Payload of `GET system/stats`, reduced to the server map the driver
/// correlates host identity against.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemStats {
    stats: StatsInner,
}

#[derive(Debug, Clone, Deserialize)]
struct StatsInner {
    servers: HashMap<String, ServerRecord>,
}

impl SystemStats {
    /// Find a cluster server by server id or host name.
    pub fn find_server(&self, host: &str) -> Option<&ServerRecord> {
        self.stats
            .servers
            .iter()
            .find(|(id, record)| id.as_str() == host || record.hostname == host)
            .map(|(_, record)| record)
    }
}
