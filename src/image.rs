//! Seam between the driver and the volume manager's image layer.

use async_trait::async_trait;
use std::path::Path;

/// An image transfer error, as reported by the image layer.
pub struct ImageError {
    message: String,
}

impl ImageError {
    /// Return a new `Self` with the given message.
    pub fn new(message: &str) -> ImageError {
        ImageError {
            message: String::from(message),
        }
    }
}

impl std::fmt::Debug for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ImageError {}

impl From<String> for ImageError {
    fn from(message: String) -> ImageError {
        ImageError { message }
    }
}

impl From<std::io::Error> for ImageError {
    fn from(error: std::io::Error) -> ImageError {
        ImageError {
            message: format!("{error}"),
        }
    }
}

/// Byte-level image transfer service provided by the volume manager.
///
/// The driver resolves a volume to its local NBD device node and hands the
/// device path over; fetching, format conversion and upload are the image
/// layer's business.
#[async_trait]
pub trait ImageService: Send + Sync {
    /// Fetch an image and write it to a local device as raw bytes.
    async fn fetch_to_raw(
        &self,
        image_id: &str,
        device_path: &Path,
        blocksize: u32,
        size_gib: u64,
    ) -> Result<(), ImageError>;

    /// Upload the contents of a local device as an image.
    async fn upload_volume(&self, image_id: &str, device_path: &Path) -> Result<(), ImageError>;
}
