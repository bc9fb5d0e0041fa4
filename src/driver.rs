//! The EdgeStore NBD volume driver and the framework contract it satisfies.

use crate::{
    config::DriverConfig,
    device::{self, DeviceListPayload, NbdDevice},
    error::{
        BackendApi, ContainerCheck, DeviceNotFound, DriverError, HostAddressMissing, HostNotFound,
        ImageTransfer, RemoteConnectorNotSupported, RestClientSetup, SymlinksDirMissing,
        SymlinksDirNotConfigured,
    },
    image::ImageService,
    rest::{
        models::{
            CloneObjectBody, CloneSnapshotBody, CreateNbdBody, DeleteNbdBody, ResizeNbdBody,
            ServerRecord, SnapshotBody, SystemStats,
        },
        EdgeStoreApiClient,
    },
    types::{Capacity, ConnectionInfo, Connector, Snapshot, Volume, VolumeStats},
    DRIVER_NAME, DRIVER_VERSION, STORAGE_PROTOCOL, VENDOR_NAME,
};
use async_trait::async_trait;
use snafu::{ensure, OptionExt, ResultExt};
use std::path::PathBuf;
use tracing::{debug, instrument};

// The cluster sizes NBD-backed objects in MiB.
fn gib_to_mib(gib: u64) -> u64 {
    gib * 1024
}

/// The storage-backend contract the volume manager drives.
///
/// The framework owns call ordering and idempotency policy; the driver turns
/// each call into management REST requests and nothing else.
#[async_trait]
pub trait VolumeDriver: Send + Sync {
    /// Verify local prerequisites and that the backend bucket is reachable.
    async fn check_for_setup_error(&self) -> Result<(), DriverError>;
    /// Create a volume on the volume's host.
    async fn create_volume(&self, volume: &Volume) -> Result<(), DriverError>;
    /// Delete a volume. A volume without a device mapping is treated as
    /// already deleted.
    async fn delete_volume(&self, volume: &Volume) -> Result<(), DriverError>;
    /// Grow a volume to `new_size` GiB.
    async fn extend_volume(&self, volume: &Volume, new_size: u64) -> Result<(), DriverError>;
    /// Take a snapshot of a volume.
    async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<(), DriverError>;
    /// Remove a snapshot.
    async fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<(), DriverError>;
    /// Create a new volume out of a snapshot.
    async fn create_volume_from_snapshot(
        &self,
        volume: &Volume,
        snapshot: &Snapshot,
    ) -> Result<(), DriverError>;
    /// Create a new volume as a copy of a source volume.
    async fn create_cloned_volume(
        &self,
        volume: &Volume,
        source: &Volume,
    ) -> Result<(), DriverError>;
    /// Local block device node of a volume on its owning host.
    async fn local_path(&self, volume: &Volume) -> Result<PathBuf, DriverError>;
    /// Backend stats the volume manager schedules against.
    fn get_volume_stats(&self) -> VolumeStats;
    /// Check that a connector's host is a member of the cluster.
    async fn validate_connector(&self, connector: &Connector) -> Result<(), DriverError>;
    /// Connection info for attaching a volume through a connector.
    async fn initialize_connection(
        &self,
        volume: &Volume,
        connector: &Connector,
    ) -> Result<ConnectionInfo, DriverError>;
    /// Write image bytes onto a volume's local device.
    async fn copy_image_to_volume(
        &self,
        volume: &Volume,
        image_service: &dyn ImageService,
        image_id: &str,
    ) -> Result<(), DriverError>;
    /// Upload a volume's local device as an image.
    async fn copy_volume_to_image(
        &self,
        volume: &Volume,
        image_service: &dyn ImageService,
        image_id: &str,
    ) -> Result<(), DriverError>;
    /// Export hooks are no-ops for this backend: the cluster itself exposes
    /// devices, there is nothing to export from the driver host.
    async fn ensure_export(&self, _volume: &Volume) -> Result<(), DriverError> {
        Ok(())
    }
    /// See [`VolumeDriver::ensure_export`].
    async fn create_export(&self, _volume: &Volume) -> Result<(), DriverError> {
        Ok(())
    }
    /// See [`VolumeDriver::ensure_export`].
    async fn remove_export(&self, _volume: &Volume) -> Result<(), DriverError> {
        Ok(())
    }
}

/// EdgeStore NBD volume driver.
///
/// Volumes are objects in the configured bucket, exposed on cluster hosts as
/// local NBD device nodes. Lifecycle calls translate one-to-one into
/// management REST requests; local device paths are resolved by correlating
/// the cluster's device listings with the volume's host identity.
#[derive(Debug)]
pub struct EdgeNbdDriver {
    config: DriverConfig,
    client: EdgeStoreApiClient,
    bucket_url: String,
    hostname: String,
}

impl EdgeNbdDriver {
    /// Set up a driver instance from configuration: builds the REST client,
    /// resolves the bucket URL and captures the local host name.
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        let client = EdgeStoreApiClient::new(&config).context(RestClientSetup)?;
        let bucket_url = config.container.bucket_url();
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Ok(Self {
            config,
            client,
            bucket_url,
            hostname,
        })
    }

    fn object_path(&self, name: &str) -> String {
        self.config.container.object_path(name)
    }

    async fn host_info(&self, host: &str) -> Result<ServerRecord, DriverError> {
        let stats = self
            .client
            .get::<SystemStats>("system/stats")
            .await
            .context(BackendApi {
                action: format!("looking up cluster host '{host}'"),
            })?;
        stats
            .find_server(host)
            .cloned()
            .context(HostNotFound { host })
    }

    // Query fragment addressing the cluster host that owns `host`'s devices.
    async fn remote_query(&self, host: &str) -> Result<String, DriverError> {
        let record = self.host_info(host).await?;
        let ipv6 = record.ipv6addr().context(HostAddressMissing { host })?;
        Ok(format!("?remote={ipv6}"))
    }

    async fn nbd_devices(&self, host: &str) -> Result<Vec<NbdDevice>, DriverError> {
        let remote = self.remote_query(host).await?;
        let payload = self
            .client
            .get::<DeviceListPayload>(&format!("sysconfig/nbd/devices{remote}"))
            .await
            .context(BackendApi {
                action: format!("listing NBD devices of host '{host}'"),
            })?;
        payload.decode().context(BackendApi {
            action: "decoding the NBD device listing",
        })
    }

    // Device number of the volume's backing object, if mapped.
    async fn device_number(&self, volume: &Volume) -> Result<Option<i64>, DriverError> {
        let devices = self.nbd_devices(volume.host_name()).await?;
        Ok(device::find_device_number(
            &devices,
            &self.object_path(&volume.name),
        ))
    }
}

#[async_trait]
impl VolumeDriver for EdgeNbdDriver {
    async fn check_for_setup_error(&self) -> Result<(), DriverError> {
        match &self.config.symlinks_dir {
            None => return SymlinksDirNotConfigured.fail(),
            Some(dir) if !dir.exists() => return SymlinksDirMissing { path: dir.clone() }.fail(),
            Some(_) => {}
        }
        self.client
            .get_json(&format!("{}/objects/", self.bucket_url))
            .await
            .context(ContainerCheck {
                container: self.config.container.to_string(),
            })?;
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name), skip(self, volume))]
    async fn create_volume(&self, volume: &Volume) -> Result<(), DriverError> {
        let remote = self.remote_query(volume.host_name()).await?;
        let body = CreateNbdBody {
            object_path: self.object_path(&volume.name),
            vol_size_mb: gib_to_mib(volume.size),
            block_size: self.config.blocksize,
            chunk_size: self.config.chunksize,
        };
        self.client
            .post(&format!("nbd{remote}"), &body)
            .await
            .context(BackendApi {
                action: format!("creating volume '{}'", volume.name),
            })?;
        debug!(volume.name = %volume.name, "Volume successfully created");
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name), skip(self, volume))]
    async fn delete_volume(&self, volume: &Volume) -> Result<(), DriverError> {
        let Some(number) = self.device_number(volume).await? else {
            debug!(volume.name = %volume.name, "Volume has no NBD device, nothing to delete");
            return Ok(());
        };
        let remote = self.remote_query(volume.host_name()).await?;
        let body = DeleteNbdBody {
            object_path: self.object_path(&volume.name),
            number,
        };
        self.client
            .delete(&format!("nbd{remote}"), &body)
            .await
            .context(BackendApi {
                action: format!("deleting volume '{}'", volume.name),
            })?;
        debug!(volume.name = %volume.name, "Volume successfully deleted");
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name), skip(self, volume))]
    async fn extend_volume(&self, volume: &Volume, new_size: u64) -> Result<(), DriverError> {
        let remote = self.remote_query(volume.host_name()).await?;
        let body = ResizeNbdBody {
            object_path: self.object_path(&volume.name),
            new_size_mb: gib_to_mib(new_size),
        };
        self.client
            .put(&format!("nbd/resize{remote}"), &body)
            .await
            .context(BackendApi {
                action: format!("resizing volume '{}'", volume.name),
            })?;
        debug!(volume.name = %volume.name, "Volume successfully resized");
        Ok(())
    }

    #[instrument(fields(snapshot.name = %snapshot.name, volume.name = %snapshot.volume_name), skip(self, snapshot))]
    async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<(), DriverError> {
        let body = SnapshotBody {
            object_path: self.object_path(&snapshot.volume_name),
            snap_name: snapshot.name.clone(),
        };
        self.client
            .post("nbd/snapshot", &body)
            .await
            .context(BackendApi {
                action: format!("creating snapshot '{}'", snapshot.name),
            })?;
        debug!(snapshot.name = %snapshot.name, "Snapshot successfully created");
        Ok(())
    }

    #[instrument(fields(snapshot.name = %snapshot.name, volume.name = %snapshot.volume_name), skip(self, snapshot))]
    async fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<(), DriverError> {
        let body = SnapshotBody {
            object_path: self.object_path(&snapshot.volume_name),
            snap_name: snapshot.name.clone(),
        };
        self.client
            .delete("nbd/snapshot", &body)
            .await
            .context(BackendApi {
                action: format!("deleting snapshot '{}'", snapshot.name),
            })?;
        debug!(snapshot.name = %snapshot.name, "Snapshot successfully deleted");
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name, snapshot.name = %snapshot.name), skip(self, volume, snapshot))]
    async fn create_volume_from_snapshot(
        &self,
        volume: &Volume,
        snapshot: &Snapshot,
    ) -> Result<(), DriverError> {
        let remote = self.remote_query(volume.host_name()).await?;
        let body = CloneSnapshotBody {
            object_path: self.object_path(&snapshot.volume_name),
            snap_name: snapshot.name.clone(),
            clone_path: self.object_path(&volume.name),
        };
        self.client
            .put(&format!("nbd/snapshot/clone{remote}"), &body)
            .await
            .context(BackendApi {
                action: format!(
                    "cloning snapshot '{}' into volume '{}'",
                    snapshot.name, volume.name
                ),
            })?;
        debug!(volume.name = %volume.name, "Volume successfully created from snapshot");
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name, source.name = %source.name), skip(self, volume, source))]
    async fn create_cloned_volume(
        &self,
        volume: &Volume,
        source: &Volume,
    ) -> Result<(), DriverError> {
        // Clone the backing object first, then expose the clone as a device
        // sized like the source volume.
        let body = CloneObjectBody {
            tenant_name: self.config.container.tenant().to_string(),
            bucket_name: self.config.container.bucket().to_string(),
            object_name: volume.name.clone(),
        };
        self.client
            .post(
                &format!("{}/objects/{}/clone", self.bucket_url, source.name),
                &body,
            )
            .await
            .context(BackendApi {
                action: format!("cloning volume '{}'", source.name),
            })?;

        let remote = self.remote_query(volume.host_name()).await?;
        let body = CreateNbdBody {
            object_path: self.object_path(&volume.name),
            vol_size_mb: gib_to_mib(source.size),
            block_size: self.config.blocksize,
            chunk_size: self.config.chunksize,
        };
        self.client
            .post(&format!("nbd{remote}"), &body)
            .await
            .context(BackendApi {
                action: format!("creating volume '{}'", volume.name),
            })?;
        debug!(volume.name = %volume.name, "Volume successfully cloned");
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name), skip(self, volume))]
    async fn local_path(&self, volume: &Volume) -> Result<PathBuf, DriverError> {
        match self.device_number(volume).await? {
            Some(number) => Ok(device::nbd_device_path(number)),
            None => DeviceNotFound {
                volume: volume.name.clone(),
            }
            .fail(),
        }
    }

    fn get_volume_stats(&self) -> VolumeStats {
        let backend_name = self
            .config
            .backend_name
            .clone()
            .unwrap_or_else(|| DRIVER_NAME.to_string());
        VolumeStats {
            vendor_name: VENDOR_NAME.to_string(),
            driver_version: DRIVER_VERSION.to_string(),
            storage_protocol: STORAGE_PROTOCOL.to_string(),
            total_capacity_gb: Capacity::Unknown,
            free_capacity_gb: Capacity::Unknown,
            reserved_percentage: self.config.reserved_percentage,
            qos_support: false,
            volume_backend_name: backend_name,
            location_info: format!("{DRIVER_NAME}:{}:{}", self.hostname, self.config.container),
            // The endpoint is reported in base-URL form, trailing slash
            // included.
            restapi_url: format!("{}/", self.client.endpoint()),
        }
    }

    #[instrument(fields(connector.host = %connector.host), skip(self, connector))]
    async fn validate_connector(&self, connector: &Connector) -> Result<(), DriverError> {
        self.host_info(&connector.host).await?;
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name, connector.host = %connector.host), skip(self, volume, connector))]
    async fn initialize_connection(
        &self,
        volume: &Volume,
        connector: &Connector,
    ) -> Result<ConnectionInfo, DriverError> {
        let host = volume.host_name();
        ensure!(
            connector.host == host,
            RemoteConnectorNotSupported {
                connector: connector.host.clone(),
                host,
            }
        );
        let device_path = self.local_path(volume).await?;
        Ok(ConnectionInfo::local(device_path))
    }

    #[instrument(fields(volume.name = %volume.name, image.id = %image_id), skip(self, volume, image_service, image_id))]
    async fn copy_image_to_volume(
        &self,
        volume: &Volume,
        image_service: &dyn ImageService,
        image_id: &str,
    ) -> Result<(), DriverError> {
        let device_path = self.local_path(volume).await?;
        image_service
            .fetch_to_raw(image_id, &device_path, self.config.dd_blocksize, volume.size)
            .await
            .context(ImageTransfer {
                volume: volume.name.clone(),
            })?;
        debug!(volume.name = %volume.name, "Image successfully copied to volume");
        Ok(())
    }

    #[instrument(fields(volume.name = %volume.name, image.id = %image_id), skip(self, volume, image_service, image_id))]
    async fn copy_volume_to_image(
        &self,
        volume: &Volume,
        image_service: &dyn ImageService,
        image_id: &str,
    ) -> Result<(), DriverError> {
        let device_path = self.local_path(volume).await?;
        image_service
            .upload_volume(image_id, &device_path)
            .await
            .context(ImageTransfer {
                volume: volume.name.clone(),
            })?;
        debug!(volume.name = %volume.name, "Volume successfully copied to image");
        Ok(())
    }
}
