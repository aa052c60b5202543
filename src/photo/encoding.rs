// SPDX-License-Identifier: GPL-3.0-only

//! Async photo encoding
//!
//! Captured frames are encoded to JPEG or PNG and written with a timestamped
//! file name. Encoding and disk writes run on the blocking pool.

use crate::errors::PhotoError;
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodingFormat {
    /// JPEG format (lossy, alpha dropped)
    #[default]
    Jpeg,
    /// PNG format (lossless)
    Png,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match ImageFormat::from_path(path).ok()? {
            ImageFormat::Jpeg => Some(EncodingFormat::Jpeg),
            ImageFormat::Png => Some(EncodingFormat::Png),
            _ => None,
        }
    }
}

/// Encoding quality settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EncodingQuality {
    Low,
    Medium,
    #[default]
    High,
    Maximum,
}

impl EncodingQuality {
    /// Get JPEG quality value (0-100)
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            EncodingQuality::Low => 60,
            EncodingQuality::Medium => 80,
            EncodingQuality::High => 92,
            EncodingQuality::Maximum => 98,
        }
    }
}

/// Encoded image data ready for saving
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
}

/// Photo encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoEncoder {
    format: EncodingFormat,
    quality: EncodingQuality,
}

impl PhotoEncoder {
    /// Create a new encoder with JPEG format and high quality
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(format: EncodingFormat, quality: EncodingQuality) -> Self {
        Self { format, quality }
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    /// Encode synchronously
    pub fn encode_blocking(&self, image: RgbaImage) -> Result<EncodedImage, PhotoError> {
        let (width, height) = image.dimensions();
        let data = match self.format {
            EncodingFormat::Jpeg => encode_jpeg(image, self.quality)?,
            EncodingFormat::Png => encode_png(image)?,
        };
        debug!(size = data.len(), format = ?self.format, "Encoding complete");
        Ok(EncodedImage {
            data,
            format: self.format,
            width,
            height,
        })
    }

    /// Encode on the blocking pool
    pub async fn encode(&self, image: RgbaImage) -> Result<EncodedImage, PhotoError> {
        info!(
            width = image.width(),
            height = image.height(),
            format = ?self.format,
            "Starting encoding"
        );
        let encoder = *self;
        tokio::task::spawn_blocking(move || encoder.encode_blocking(image))
            .await
            .map_err(|e| PhotoError::EncodingFailed(format!("Encoding task error: {}", e)))?
    }

    /// Save encoded data as `IMG_<timestamp>.<ext>` inside `output_dir`
    pub async fn save(&self, encoded: EncodedImage, output_dir: PathBuf) -> Result<PathBuf, PhotoError> {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%3f");
        let filename = format!("IMG_{}.{}", timestamp, encoded.format.extension());
        let filepath = output_dir.join(&filename);

        info!(path = %filepath.display(), "Saving photo");

        let target = filepath.clone();
        tokio::task::spawn_blocking(move || std::fs::write(&target, &encoded.data))
            .await
            .map_err(|e| PhotoError::SaveFailed(format!("Save task error: {}", e)))??;

        info!(path = %filepath.display(), "Photo saved successfully");
        Ok(filepath)
    }

    /// Encode and save in one go
    pub async fn encode_and_save(&self, image: RgbaImage, output_dir: PathBuf) -> Result<PathBuf, PhotoError> {
        let encoded = self.encode(image).await?;
        self.save(encoded, output_dir).await
    }
}

fn encode_jpeg(image: RgbaImage, quality: EncodingQuality) -> Result<Vec<u8>, PhotoError> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.jpeg_quality());
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)?;
    Ok(buffer)
}

fn encode_png(image: RgbaImage) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}
