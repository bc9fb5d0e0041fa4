//! Errors surfaced to the volume manager by the driver.

use crate::{image::ImageError, rest::ApiClientError};
use snafu::Snafu;
use std::path::PathBuf;

/// Volume driver error. Setup failures come from local configuration,
/// everything else stems from the backend REST contract.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum DriverError {
    #[snafu(display("NBD symlinks directory is not configured"))]
    SymlinksDirNotConfigured,
    #[snafu(display("NBD symlinks directory '{}' does not exist", path.display()))]
    SymlinksDirMissing { path: PathBuf },
    #[snafu(display("Container path '{path}' is malformed, expected 'cluster/tenant/bucket'"))]
    InvalidContainerPath { path: String },
    #[snafu(display("Failed to set up the REST client: {source}"))]
    RestClientSetup { source: ApiClientError },
    #[snafu(display("Failed to verify container '{container}': {source}"))]
    ContainerCheck {
        container: String,
        source: ApiClientError,
    },
    #[snafu(display("Backend request failed while {action}: {source}"))]
    BackendApi {
        action: String,
        source: ApiClientError,
    },
    #[snafu(display("Host '{host}' is not a member of the storage cluster"))]
    HostNotFound { host: String },
    #[snafu(display("Cluster host '{host}' does not expose an ipv6 address"))]
    HostAddressMissing { host: String },
    #[snafu(display("No NBD device found for volume '{volume}'"))]
    DeviceNotFound { volume: String },
    #[snafu(display(
        "Connector host '{connector}' cannot attach volume owned by host '{host}': \
         only local connections are supported"
    ))]
    RemoteConnectorNotSupported { connector: String, host: String },
    #[snafu(display("Image transfer failed for volume '{volume}': {source}"))]
    ImageTransfer { volume: String, source: ImageError },
}
