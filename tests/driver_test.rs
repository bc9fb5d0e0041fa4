//! Contract tests for the EdgeStore NBD driver, run against a mock
//! management endpoint: every REST call is checked for exact URL, query,
//! credentials and JSON body.

use httpmock::{
    Method::{DELETE, GET, POST, PUT},
    MockServer,
};
use serde_json::json;
use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use nbd_driver::{
    config::{DriverConfig, RestProtocol},
    driver::{EdgeNbdDriver, VolumeDriver},
    error::DriverError,
    image::{ImageError, ImageService},
    types::{Connector, Snapshot, Volume},
};

/// Host the test volumes live on, as known to the cluster.
const HOST: &str = "testhost";
/// IPv6 address the cluster reports for `HOST`.
const REMOTE: &str = "fe80::fc16:3eff:fedb:bd68";
/// Basic-auth header for the test credentials (admin:0).
const AUTH: &str = "Basic YWRtaW46MA==";

const BUCKET_PATH: &str = "/clusters/cluster/tenants/tenant/buckets/bucket";

fn test_config(server: &MockServer) -> DriverConfig {
    DriverConfig {
        rest_protocol: RestProtocol::Auto,
        rest_address: server.host(),
        rest_port: server.port(),
        rest_user: "admin".to_string(),
        rest_password: "0".to_string(),
        container: "cluster/tenant/bucket".parse().unwrap(),
        blocksize: 512,
        chunksize: 4096,
        symlinks_dir: Some(PathBuf::from("/dev/disk/by-path")),
        dd_blocksize: 512,
        reserved_percentage: 0,
        backend_name: None,
        request_timeout: Duration::from_secs(10),
    }
}

fn test_driver(server: &MockServer) -> EdgeNbdDriver {
    EdgeNbdDriver::new(test_config(server)).unwrap()
}

fn volume(name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host: format!("{HOST}@edgestore#group"),
        size: 1,
    }
}

/// Mock `GET system/stats` with a single server owning `HOST`.
fn mock_stats(server: &MockServer) -> httpmock::Mock {
    server.mock(|when, then| {
        when.method(GET)
            .path("/system/stats")
            .header("authorization", AUTH)
            .header("content-type", "application/json");
        then.status(200).json_body(json!({
            "response": {
                "stats": {
                    "servers": {
                        "server-id-1": { "hostname": HOST, "ipv6addr": REMOTE }
                    }
                }
            }
        }));
    })
}

/// Mock the NBD device listing for `REMOTE`. The cluster double-encodes the
/// device array as a JSON string.
fn mock_devices(server: &MockServer, devices: serde_json::Value) -> httpmock::Mock {
    server.mock(|when, then| {
        when.method(GET)
            .path("/sysconfig/nbd/devices")
            .query_param("remote", REMOTE)
            .header("authorization", AUTH)
            .header("content-type", "application/json");
        then.status(200)
            .json_body(json!({ "response": { "value": devices.to_string() } }));
    })
}

#[tokio::test]
async fn setup_check_verifies_container() {
    let server = MockServer::start();
    let objects = server.mock(|when, then| {
        when.method(GET)
            .path(format!("{BUCKET_PATH}/objects/"))
            .header("authorization", AUTH)
            .header("content-type", "application/json");
        then.status(200).json_body(json!({ "response": "OK" }));
    });

    let symlinks_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server);
    config.symlinks_dir = Some(symlinks_dir.path().to_path_buf());

    let driver = EdgeNbdDriver::new(config).unwrap();
    driver.check_for_setup_error().await.unwrap();
    objects.assert();
}

#[tokio::test]
async fn setup_check_rejects_unconfigured_symlinks_dir() {
    let server = MockServer::start();
    let mut config = test_config(&server);
    config.symlinks_dir = None;

    let driver = EdgeNbdDriver::new(config).unwrap();
    let error = driver.check_for_setup_error().await.unwrap_err();
    assert!(matches!(error, DriverError::SymlinksDirNotConfigured));
}

#[tokio::test]
async fn setup_check_rejects_missing_symlinks_dir() {
    let server = MockServer::start();
    let symlinks_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server);
    config.symlinks_dir = Some(symlinks_dir.path().join("missing"));

    let driver = EdgeNbdDriver::new(config).unwrap();
    let error = driver.check_for_setup_error().await.unwrap_err();
    assert!(matches!(error, DriverError::SymlinksDirMissing { .. }));
}

#[tokio::test]
async fn setup_check_rejects_empty_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path(format!("{BUCKET_PATH}/objects/"))
            .header("authorization", AUTH)
            .header("content-type", "application/json");
        then.status(200).json_body(json!({}));
    });

    let symlinks_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&server);
    config.symlinks_dir = Some(symlinks_dir.path().to_path_buf());

    let driver = EdgeNbdDriver::new(config).unwrap();
    let error = driver.check_for_setup_error().await.unwrap_err();
    assert!(matches!(error, DriverError::ContainerCheck { .. }));
}

#[tokio::test]
async fn local_path_resolves_device_node() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([
            { "objectPath": "cluster/tenant/bucket/v0", "number": 0 },
            { "objectPath": "cluster/tenant/bucket/v1", "number": 1 },
        ]),
    );

    let driver = test_driver(&server);
    let path = driver.local_path(&volume("v1")).await.unwrap();
    assert_eq!(path, PathBuf::from("/dev/nbd1"));
}

#[tokio::test]
async fn local_path_rejects_unknown_host() {
    let server = MockServer::start();
    mock_stats(&server);

    let driver = test_driver(&server);
    let mut volume = volume("v1");
    volume.host = "ghost@edgestore#group".to_string();

    let error = driver.local_path(&volume).await.unwrap_err();
    assert!(matches!(error, DriverError::HostNotFound { host } if host == "ghost"));
}

#[tokio::test]
async fn local_path_without_device_mapping() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/other", "number": 0 }]),
    );

    let driver = test_driver(&server);
    let error = driver.local_path(&volume("v1")).await.unwrap_err();
    assert!(matches!(error, DriverError::DeviceNotFound { volume } if volume == "v1"));
}

#[tokio::test]
async fn create_volume_posts_exact_payload() {
    let server = MockServer::start();
    mock_stats(&server);
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/nbd")
            .query_param("remote", REMOTE)
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v1",
                "volSizeMB": 1024,
                "blockSize": 512,
                "chunkSize": 4096,
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver.create_volume(&volume("v1")).await.unwrap();
    create.assert();
}

#[tokio::test]
async fn delete_volume_removes_device() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": 1 }]),
    );
    let delete = server.mock(|when, then| {
        when.method(DELETE)
            .path("/nbd")
            .query_param("remote", REMOTE)
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v1",
                "number": 1,
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver.delete_volume(&volume("v1")).await.unwrap();
    delete.assert();
}

#[tokio::test]
async fn delete_volume_skips_absent_device() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(&server, json!([]));
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/nbd");
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver.delete_volume(&volume("v1")).await.unwrap();
    assert_eq!(delete.hits(), 0);
}

#[tokio::test]
async fn delete_volume_skips_negative_device_number() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": -1 }]),
    );
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/nbd");
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver.delete_volume(&volume("v1")).await.unwrap();
    assert_eq!(delete.hits(), 0);
}

#[tokio::test]
async fn extend_volume_puts_new_size() {
    let server = MockServer::start();
    mock_stats(&server);
    let resize = server.mock(|when, then| {
        when.method(PUT)
            .path("/nbd/resize")
            .query_param("remote", REMOTE)
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v1",
                "newSizeMB": 2048,
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver.extend_volume(&volume("v1"), 2).await.unwrap();
    resize.assert();
}

#[tokio::test]
async fn create_snapshot_posts_exact_payload() {
    let server = MockServer::start();
    let snapshot = server.mock(|when, then| {
        when.method(POST)
            .path("/nbd/snapshot")
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v1",
                "snapName": "s1",
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver
        .create_snapshot(&Snapshot {
            name: "s1".to_string(),
            volume_name: "v1".to_string(),
        })
        .await
        .unwrap();
    snapshot.assert();
}

#[tokio::test]
async fn delete_snapshot_posts_exact_payload() {
    let server = MockServer::start();
    let snapshot = server.mock(|when, then| {
        when.method(DELETE)
            .path("/nbd/snapshot")
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v1",
                "snapName": "s1",
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver
        .delete_snapshot(&Snapshot {
            name: "s1".to_string(),
            volume_name: "v1".to_string(),
        })
        .await
        .unwrap();
    snapshot.assert();
}

#[tokio::test]
async fn create_volume_from_snapshot_clones_snapshot() {
    let server = MockServer::start();
    mock_stats(&server);
    let clone = server.mock(|when, then| {
        when.method(PUT)
            .path("/nbd/snapshot/clone")
            .query_param("remote", REMOTE)
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v1",
                "snapName": "s1",
                "clonePath": "cluster/tenant/bucket/v2",
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    driver
        .create_volume_from_snapshot(
            &volume("v2"),
            &Snapshot {
                name: "s1".to_string(),
                volume_name: "v1".to_string(),
            },
        )
        .await
        .unwrap();
    clone.assert();
}

#[tokio::test]
async fn create_cloned_volume_copies_object_then_creates_device() {
    let server = MockServer::start();
    mock_stats(&server);
    let object_clone = server.mock(|when, then| {
        when.method(POST)
            .path(format!("{BUCKET_PATH}/objects/v1/clone"))
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "tenant_name": "tenant",
                "bucket_name": "bucket",
                "object_name": "v2",
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/nbd")
            .query_param("remote", REMOTE)
            .header("authorization", AUTH)
            .header("content-type", "application/json")
            .json_body(json!({
                "objectPath": "cluster/tenant/bucket/v2",
                "volSizeMB": 2048,
                "blockSize": 512,
                "chunkSize": 4096,
            }));
        then.status(200).json_body(json!({ "response": {} }));
    });

    let driver = test_driver(&server);
    let mut source = volume("v1");
    source.size = 2;
    driver
        .create_cloned_volume(&volume("v2"), &source)
        .await
        .unwrap();
    object_clone.assert();
    create.assert();
}

#[tokio::test]
async fn volume_stats_report_fixed_shape() {
    let server = MockServer::start();
    let driver = test_driver(&server);
    let hostname = gethostname::gethostname().to_string_lossy().into_owned();

    let stats = driver.get_volume_stats();
    assert_eq!(
        serde_json::to_value(&stats).unwrap(),
        json!({
            "vendor_name": "EdgeStore",
            "driver_version": "1.0.0",
            "storage_protocol": "NBD",
            "total_capacity_gb": "unknown",
            "free_capacity_gb": "unknown",
            "reserved_percentage": 0,
            "QoS_support": false,
            "volume_backend_name": "EdgeNbdDriver",
            "location_info": format!("EdgeNbdDriver:{hostname}:cluster/tenant/bucket"),
            "restapi_url": format!("http://{}:{}/", server.host(), server.port()),
        })
    );
}

#[tokio::test]
async fn volume_stats_honor_backend_name_override() {
    let server = MockServer::start();
    let mut config = test_config(&server);
    config.backend_name = Some("edge-1".to_string());

    let driver = EdgeNbdDriver::new(config).unwrap();
    assert_eq!(driver.get_volume_stats().volume_backend_name, "edge-1");
}

#[tokio::test]
async fn validate_connector_accepts_cluster_member() {
    let server = MockServer::start();
    mock_stats(&server);

    let driver = test_driver(&server);
    driver
        .validate_connector(&Connector {
            host: HOST.to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn validate_connector_rejects_unknown_host() {
    let server = MockServer::start();
    mock_stats(&server);

    let driver = test_driver(&server);
    let error = driver
        .validate_connector(&Connector {
            host: "ghost".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(error, DriverError::HostNotFound { host } if host == "ghost"));
}

#[tokio::test]
async fn initialize_connection_returns_local_device() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": 2 }]),
    );

    let driver = test_driver(&server);
    let connection = driver
        .initialize_connection(
            &volume("v1"),
            &Connector {
                host: HOST.to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        serde_json::to_value(&connection).unwrap(),
        json!({
            "driver_volume_type": "local",
            "data": { "device_path": "/dev/nbd2" },
        })
    );
}

#[tokio::test]
async fn initialize_connection_rejects_remote_connector() {
    let server = MockServer::start();
    let driver = test_driver(&server);

    let error = driver
        .initialize_connection(
            &volume("v1"),
            &Connector {
                host: "otherhost".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        DriverError::RemoteConnectorNotSupported { connector, host }
            if connector == "otherhost" && host == HOST
    ));
}

/// Image service double recording the calls the driver delegates.
#[derive(Default)]
struct FakeImageService {
    fetches: Mutex<Vec<(String, PathBuf, u32, u64)>>,
    uploads: Mutex<Vec<(String, PathBuf)>>,
}

#[async_trait::async_trait]
impl ImageService for FakeImageService {
    async fn fetch_to_raw(
        &self,
        image_id: &str,
        device_path: &Path,
        blocksize: u32,
        size_gib: u64,
    ) -> Result<(), ImageError> {
        self.fetches.lock().unwrap().push((
            image_id.to_string(),
            device_path.to_path_buf(),
            blocksize,
            size_gib,
        ));
        Ok(())
    }

    async fn upload_volume(&self, image_id: &str, device_path: &Path) -> Result<(), ImageError> {
        self.uploads
            .lock()
            .unwrap()
            .push((image_id.to_string(), device_path.to_path_buf()));
        Ok(())
    }
}

#[tokio::test]
async fn copy_image_to_volume_writes_local_device() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": 1 }]),
    );

    let driver = test_driver(&server);
    let image_service = FakeImageService::default();
    driver
        .copy_image_to_volume(&volume("v1"), &image_service, "image-1")
        .await
        .unwrap();

    let fetches = image_service.fetches.lock().unwrap();
    assert_eq!(
        *fetches,
        vec![(
            "image-1".to_string(),
            PathBuf::from("/dev/nbd1"),
            512,
            1,
        )]
    );
}

#[tokio::test]
async fn copy_volume_to_image_uploads_local_device() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": 1 }]),
    );

    let driver = test_driver(&server);
    let image_service = FakeImageService::default();
    driver
        .copy_volume_to_image(&volume("v1"), &image_service, "image-1")
        .await
        .unwrap();

    let uploads = image_service.uploads.lock().unwrap();
    assert_eq!(
        *uploads,
        vec![("image-1".to_string(), PathBuf::from("/dev/nbd1"))]
    );
}

/// Image service double that fails every transfer.
struct FailingImageService;

#[async_trait::async_trait]
impl ImageService for FailingImageService {
    async fn fetch_to_raw(
        &self,
        _image_id: &str,
        _device_path: &Path,
        _blocksize: u32,
        _size_gib: u64,
    ) -> Result<(), ImageError> {
        Err(ImageError::new("image stream ended prematurely"))
    }

    async fn upload_volume(&self, _image_id: &str, _device_path: &Path) -> Result<(), ImageError> {
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "device read failed").into())
    }
}

#[tokio::test]
async fn image_fetch_failure_is_typed() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": 1 }]),
    );

    let driver = test_driver(&server);
    let error = driver
        .copy_image_to_volume(&volume("v1"), &FailingImageService, "image-1")
        .await
        .unwrap_err();
    assert!(matches!(error, DriverError::ImageTransfer { volume, .. } if volume == "v1"));
}

#[tokio::test]
async fn image_upload_failure_is_typed() {
    let server = MockServer::start();
    mock_stats(&server);
    mock_devices(
        &server,
        json!([{ "objectPath": "cluster/tenant/bucket/v1", "number": 1 }]),
    );

    let driver = test_driver(&server);
    let error = driver
        .copy_volume_to_image(&volume("v1"), &FailingImageService, "image-1")
        .await
        .unwrap_err();
    assert!(matches!(error, DriverError::ImageTransfer { volume, .. } if volume == "v1"));
}

#[tokio::test]
async fn backend_failure_surfaces_status() {
    let server = MockServer::start();
    mock_stats(&server);
    server.mock(|when, then| {
        when.method(POST).path("/nbd");
        then.status(500).body("backend exploded");
    });

    let driver = test_driver(&server);
    let error = driver.create_volume(&volume("v1")).await.unwrap_err();
    assert!(matches!(error, DriverError::BackendApi { .. }));
}
