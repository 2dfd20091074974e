//! Common types shared across the crate.

use image::{DynamicImage, GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::errors::AutomationError;

/// Holds the screenshot data
#[derive(Debug, Clone)]
pub struct ScreenshotResult {
    /// Raw image data (RGBA)
    pub image_data: Vec<u8>,
    /// Width of the image
    pub width: u32,
    /// Height of the image
    pub height: u32,
}

impl ScreenshotResult {
    /// Convert the raw RGBA buffer into a grayscale image for matching.
    pub fn to_gray(&self) -> Result<GrayImage, AutomationError> {
        let rgba = RgbaImage::from_raw(self.width, self.height, self.image_data.clone())
            .ok_or_else(|| {
                AutomationError::InvalidArgument(
                    "screenshot buffer does not match its dimensions".to_string(),
                )
            })?;
        Ok(DynamicImage::ImageRgba8(rgba).to_luma8())
    }
}

/// One physical display in the virtual desktop.
///
/// `x`/`y` are the monitor's pixel offset in the virtual desktop; adding them
/// to screenshot-relative coordinates yields absolute input coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub index: usize,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub is_primary: bool,
}
