use crate::error::{DriverError, InvalidContainerPath};
use snafu::ensure;
use std::{fmt::Display, path::PathBuf, str::FromStr, time::Duration};
use strum_macros::{Display, EnumString};

/// Protocol used to reach the cluster's management REST API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RestProtocol {
    /// Plain http.
    Http,
    /// http over TLS.
    Https,
    /// Let the driver pick a protocol; selects http.
    #[default]
    Auto,
}

impl RestProtocol {
    /// URL scheme for this protocol selection.
    pub fn scheme(&self) -> &'static str {
        match self {
            RestProtocol::Https => "https",
            RestProtocol::Http | RestProtocol::Auto => "http",
        }
    }
}

/// The `cluster/tenant/bucket` triple naming the bucket that holds this
/// backend's volumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPath {
    cluster: String,
    tenant: String,
    bucket: String,
}

impl ContainerPath {
    /// Cluster segment of the path.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }
    /// Tenant segment of the path.
    pub fn tenant(&self) -> &str {
        &self.tenant
    }
    /// Bucket segment of the path.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// REST path of the bucket owning this backend's objects.
    pub fn bucket_url(&self) -> String {
        format!(
            "clusters/{}/tenants/{}/buckets/{}",
            self.cluster, self.tenant, self.bucket
        )
    }

    /// Object path of a named volume within the bucket.
    pub fn object_path(&self, name: &str) -> String {
        format!("{self}/{name}")
    }
}

impl FromStr for ContainerPath {
    type Err = DriverError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let segments = path.split('/').collect::<Vec<_>>();
        ensure!(
            segments.len() == 3 && segments.iter().all(|segment| !segment.is_empty()),
            InvalidContainerPath { path }
        );
        Ok(Self {
            cluster: segments[0].to_string(),
            tenant: segments[1].to_string(),
            bucket: segments[2].to_string(),
        })
    }
}

impl Display for ContainerPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.tenant, self.bucket)
    }
}

/// Static driver configuration, supplied by the hosting framework.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Protocol for management REST calls.
    pub rest_protocol: RestProtocol,
    /// Management address of the cluster.
    pub rest_address: String,
    /// Management port of the cluster.
    pub rest_port: u16,
    /// REST API user.
    pub rest_user: String,
    /// REST API password.
    pub rest_password: String,
    /// Bucket holding this backend's volumes.
    pub container: ContainerPath,
    /// NBD device block size in bytes.
    pub blocksize: u32,
    /// Object chunk size in bytes.
    pub chunksize: u32,
    /// Directory the cluster populates with NBD device symlinks. Verified
    /// during the setup check.
    pub symlinks_dir: Option<PathBuf>,
    /// Block size used when transferring image data to and from volumes.
    pub dd_blocksize: u32,
    /// Percentage of the backend held back from scheduling.
    pub reserved_percentage: u8,
    /// Overrides the backend name reported in volume stats.
    pub backend_name: Option<String>,
    /// Timeout applied to management REST requests.
    pub request_timeout: Duration,
}

impl DriverConfig {
    /// The management endpoint URL.
    pub fn endpoint(&self) -> String {
        format!(
            "{}://{}:{}",
            self.rest_protocol.scheme(),
            self.rest_address,
            self.rest_port
        )
    }
}
