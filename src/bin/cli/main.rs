use clap::Parser;
use nbd_driver::{
    config::{ContainerPath, DriverConfig, RestProtocol},
    driver::{EdgeNbdDriver, VolumeDriver},
    types::{Connector, Snapshot, Volume},
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nbd-cli", version, about = "EdgeStore NBD driver diagnostic tool")]
struct CliArgs {
    /// Management address of the cluster.
    #[arg(global = true, long, short = 'a', default_value = "127.0.0.1")]
    address: String,
    /// Management port of the cluster.
    #[arg(global = true, long, short = 'p', default_value_t = 8080)]
    port: u16,
    /// REST protocol: http, https or auto.
    #[arg(global = true, long, default_value = "auto")]
    protocol: RestProtocol,
    /// REST API user.
    #[arg(global = true, long, short = 'u', default_value = "admin")]
    user: String,
    /// REST API password.
    #[arg(global = true, long, env = "EDGESTORE_PASSWORD", default_value = "")]
    password: String,
    /// Bucket holding the backend volumes, as `cluster/tenant/bucket`.
    #[arg(global = true, long, short = 'c', default_value = "cluster/tenant/bucket")]
    container: ContainerPath,
    /// NBD device block size in bytes.
    #[arg(global = true, long, default_value_t = 512)]
    blocksize: u32,
    /// Object chunk size in bytes.
    #[arg(global = true, long, default_value_t = 4096)]
    chunksize: u32,
    /// Directory the cluster populates with NBD device symlinks.
    #[arg(global = true, long, default_value = "/dev/disk/by-path")]
    symlinks_dir: PathBuf,
    /// Block size used for image transfers.
    #[arg(global = true, long, default_value_t = 512)]
    dd_blocksize: u32,
    /// Percentage of the backend held back from scheduling.
    #[arg(global = true, long, default_value_t = 0)]
    reserved_percentage: u8,
    /// Backend name override for stats reporting.
    #[arg(global = true, long)]
    backend_name: Option<String>,
    /// Timeout for management REST requests.
    #[arg(global = true, long, short = 't', default_value = "30s")]
    timeout: humantime::Duration,
    /// The operation to be performed.
    #[command(subcommand)]
    operation: Operations,
}

#[derive(clap::Subcommand, Debug)]
enum Operations {
    /// Verify configuration and backend reachability.
    Check,
    /// Create a volume.
    Create {
        /// Volume name.
        name: String,
        /// Host locator of the owning host, `host@backend#pool` or bare.
        #[arg(long)]
        host: String,
        /// Volume size in GiB.
        #[arg(long)]
        size: u64,
    },
    /// Delete a volume.
    Delete {
        /// Volume name.
        name: String,
        /// Host locator of the owning host.
        #[arg(long)]
        host: String,
    },
    /// Grow a volume.
    Extend {
        /// Volume name.
        name: String,
        /// Host locator of the owning host.
        #[arg(long)]
        host: String,
        /// New volume size in GiB.
        #[arg(long)]
        size: u64,
    },
    /// Take a snapshot of a volume.
    Snapshot {
        /// Source volume name.
        volume: String,
        /// Snapshot name.
        name: String,
    },
    /// Remove a snapshot.
    DeleteSnapshot {
        /// Source volume name.
        volume: String,
        /// Snapshot name.
        name: String,
    },
    /// Create a volume from a snapshot.
    FromSnapshot {
        /// New volume name.
        name: String,
        /// Source volume name.
        #[arg(long)]
        volume: String,
        /// Snapshot name.
        #[arg(long)]
        snapshot: String,
        /// Host locator of the host to own the new volume.
        #[arg(long)]
        host: String,
    },
    /// Create a volume as a copy of an existing volume.
    Clone {
        /// New volume name.
        name: String,
        /// Source volume name.
        #[arg(long)]
        source: String,
        /// Host locator of the host to own the new volume.
        #[arg(long)]
        host: String,
        /// Source volume size in GiB.
        #[arg(long)]
        size: u64,
    },
    /// Resolve the local device node of a volume.
    LocalPath {
        /// Volume name.
        name: String,
        /// Host locator of the owning host.
        #[arg(long)]
        host: String,
    },
    /// Report backend stats.
    Stats,
    /// Check that a host is a member of the cluster.
    ValidateConnector {
        /// Host name to validate.
        host: String,
    },
}

fn init_tracing() {
    if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = CliArgs::parse();

    let config = DriverConfig {
        rest_protocol: args.protocol,
        rest_address: args.address,
        rest_port: args.port,
        rest_user: args.user,
        rest_password: args.password,
        container: args.container,
        blocksize: args.blocksize,
        chunksize: args.chunksize,
        symlinks_dir: Some(args.symlinks_dir),
        dd_blocksize: args.dd_blocksize,
        reserved_percentage: args.reserved_percentage,
        backend_name: args.backend_name,
        request_timeout: *args.timeout,
    };
    let driver = EdgeNbdDriver::new(config)?;

    // The size of a volume plays no part in delete and attach lookups, so
    // subcommands that only name a volume build descriptors with size 0.
    match args.operation {
        Operations::Check => {
            driver.check_for_setup_error().await?;
            println!("Setup check passed");
        }
        Operations::Create { name, host, size } => {
            let volume = Volume { name, host, size };
            driver.create_volume(&volume).await?;
            println!("Volume '{}' created", volume.name);
        }
        Operations::Delete { name, host } => {
            let volume = Volume {
                name,
                host,
                size: 0,
            };
            driver.delete_volume(&volume).await?;
            println!("Volume '{}' deleted", volume.name);
        }
        Operations::Extend { name, host, size } => {
            let volume = Volume {
                name,
                host,
                size: 0,
            };
            driver.extend_volume(&volume, size).await?;
            println!("Volume '{}' resized to {size}GiB", volume.name);
        }
        Operations::Snapshot { volume, name } => {
            let snapshot = Snapshot {
                name,
                volume_name: volume,
            };
            driver.create_snapshot(&snapshot).await?;
            println!(
                "Snapshot '{}' of volume '{}' created",
                snapshot.name, snapshot.volume_name
            );
        }
        Operations::DeleteSnapshot { volume, name } => {
            let snapshot = Snapshot {
                name,
                volume_name: volume,
            };
            driver.delete_snapshot(&snapshot).await?;
            println!("Snapshot '{}' deleted", snapshot.name);
        }
        Operations::FromSnapshot {
            name,
            volume,
            snapshot,
            host,
        } => {
            let new_volume = Volume {
                name,
                host,
                size: 0,
            };
            let snapshot = Snapshot {
                name: snapshot,
                volume_name: volume,
            };
            driver
                .create_volume_from_snapshot(&new_volume, &snapshot)
                .await?;
            println!(
                "Volume '{}' created from snapshot '{}'",
                new_volume.name, snapshot.name
            );
        }
        Operations::Clone {
            name,
            source,
            host,
            size,
        } => {
            let new_volume = Volume {
                name,
                host: host.clone(),
                size: 0,
            };
            let source = Volume {
                name: source,
                host,
                size,
            };
            driver.create_cloned_volume(&new_volume, &source).await?;
            println!("Volume '{}' cloned from '{}'", new_volume.name, source.name);
        }
        Operations::LocalPath { name, host } => {
            let volume = Volume {
                name,
                host,
                size: 0,
            };
            let path = driver.local_path(&volume).await?;
            println!("{}", path.display());
        }
        Operations::Stats => {
            let stats = driver.get_volume_stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Operations::ValidateConnector { host } => {
            driver
                .validate_connector(&Connector { host: host.clone() })
                .await?;
            println!("Host '{host}' is a cluster member");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn clone_subcommands_parse() {
        let args = CliArgs::try_parse_from([
            "nbd-cli",
            "from-snapshot",
            "v2",
            "--volume",
            "v1",
            "--snapshot",
            "s1",
            "--host",
            "node-1",
        ])
        .unwrap();
        assert!(matches!(
            args.operation,
            Operations::FromSnapshot { name, volume, snapshot, host }
                if name == "v2" && volume == "v1" && snapshot == "s1" && host == "node-1"
        ));

        let args = CliArgs::try_parse_from([
            "nbd-cli", "clone", "v2", "--source", "v1", "--host", "node-1", "--size", "2",
        ])
        .unwrap();
        assert!(matches!(
            args.operation,
            Operations::Clone { name, source, size, .. }
                if name == "v2" && source == "v1" && size == 2
        ));
    }
}
