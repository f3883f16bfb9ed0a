//! Image downscaling and upload to the pinning service.
//!
//! Media never goes through the graph: the image is shrunk and recompressed
//! locally, pinned over HTTP, and only the resulting gateway URL is written
//! into a message or profile.

use std::future::Future;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ExtendedColorType;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use anontalk_shared::constants::{
    JPEG_QUALITY, MAX_IMAGE_DIMENSION, MAX_MEDIA_SIZE, PINATA_GATEWAY_BASE, PINATA_PIN_FILE_URL,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, MediaError, UploadError};

/// Shrink an image so its longest edge is at most 1024 px and re-encode it
/// as JPEG at quality 70.
///
/// Inputs over 5 MiB are refused before decoding. Images already within
/// bounds are re-encoded but not scaled.
pub fn prepare_image(bytes: &[u8]) -> Result<Vec<u8>, MediaError> {
    if bytes.len() > MAX_MEDIA_SIZE {
        return Err(MediaError::TooLarge {
            size: bytes.len(),
            max: MAX_MEDIA_SIZE,
        });
    }

    let img = image::load_from_memory(bytes).map_err(|e| MediaError::Decode(e.to_string()))?;
    let img = if img.width() > MAX_IMAGE_DIMENSION || img.height() > MAX_IMAGE_DIMENSION {
        img.resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut output = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| MediaError::Encode(e.to_string()))?;

    debug!(
        input_len = bytes.len(),
        output_len = output.get_ref().len(),
        width = rgb.width(),
        height = rgb.height(),
        "Image prepared"
    );
    Ok(output.into_inner())
}

/// Stores a blob somewhere reachable and returns its public URL.
pub trait MediaUploader: Send + Sync + 'static {
    fn upload(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> impl Future<Output = Result<String, UploadError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Uploads to Pinata's `pinFileToIPFS` and returns the gateway URL.
#[derive(Clone)]
pub struct PinataUploader {
    client: reqwest::Client,
    credentials: Option<(String, String)>,
    pin_url: String,
    gateway_base: String,
}

impl PinataUploader {
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials: Some((api_key.into(), secret_key.into())),
            pin_url: PINATA_PIN_FILE_URL.to_string(),
            gateway_base: PINATA_GATEWAY_BASE.to_string(),
        }
    }

    /// Uploader for the configured credentials. Without credentials every
    /// upload fails with `MissingCredentials`.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut uploader = Self::new("", "");
        uploader.credentials = config
            .pinata_credentials()
            .map(|(key, secret)| (key.to_string(), secret.to_string()));
        uploader
    }

    /// Point at a different pinning endpoint and gateway.
    pub fn with_endpoints(
        mut self,
        pin_url: impl Into<String>,
        gateway_base: impl Into<String>,
    ) -> Self {
        self.pin_url = pin_url.into();
        self.gateway_base = gateway_base.into();
        self
    }
}

impl MediaUploader for PinataUploader {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String, UploadError> {
        let (api_key, secret_key) = self
            .credentials
            .as_ref()
            .ok_or(UploadError::MissingCredentials)?;

        let len = bytes.len();
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.pin_url)
            .header("pinata_api_key", api_key)
            .header("pinata_secret_api_key", secret_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Status { status, body });
        }

        let pinned: PinResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Malformed(e.to_string()))?;
        let url = format!("{}{}", self.gateway_base, pinned.ipfs_hash);
        info!(len, url = %url, "Media pinned");
        Ok(url)
    }
}

/// Prepare-then-upload. Nothing is uploaded if preparation fails.
#[derive(Clone)]
pub struct MediaPipeline<U: MediaUploader> {
    uploader: U,
}

impl<U: MediaUploader> MediaPipeline<U> {
    pub fn new(uploader: U) -> Self {
        Self { uploader }
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    /// Downscale, recompress and pin `bytes`, returning the public URL.
    pub async fn publish(&self, bytes: Vec<u8>) -> Result<String, ClientError> {
        let prepared = tokio::task::spawn_blocking(move || prepare_image(&bytes))
            .await
            .map_err(|e| MediaError::Encode(e.to_string()))??;
        let url = self.uploader.upload(prepared, "image.jpg").await?;
        Ok(url)
    }
}
