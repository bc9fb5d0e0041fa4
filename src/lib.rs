//! EdgeStore NBD volume driver.
//!
//! A storage backend for block-storage orchestration frameworks: volumes are
//! objects in an EdgeStore bucket, exposed on cluster hosts as local NBD
//! device nodes. The driver translates volume lifecycle calls into EdgeStore
//! management REST requests and resolves local device paths by correlating
//! the cluster's device listings with host identity.

/// Driver configuration.
pub mod config;
/// NBD device listings and device node resolution.
pub mod device;
/// The volume driver and the framework contract it satisfies.
pub mod driver;
/// Driver errors.
pub mod error;
/// Seam to the volume manager's image layer.
pub mod image;
/// EdgeStore management REST API client.
pub mod rest;
/// Volume, snapshot and connector types.
pub mod types;

pub use config::{ContainerPath, DriverConfig, RestProtocol};
pub use driver::{EdgeNbdDriver, VolumeDriver};
pub use error::DriverError;

/// Name the driver reports in stats and location info.
pub const DRIVER_NAME: &str = "EdgeNbdDriver";
/// Vendor reported in volume stats.
pub const VENDOR_NAME: &str = "EdgeStore";
/// Protocol volumes are attached over.
pub const STORAGE_PROTOCOL: &str = "NBD";
/// Driver version reported in volume stats.
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");
