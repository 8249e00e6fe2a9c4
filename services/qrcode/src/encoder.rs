use crate::error::{QrServiceError, Result};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use tracing::debug;

/// Turns a string into an encoded QR image
pub trait QrEncoder: Send + Sync {
    /// Encode `data` and return the image file bytes
    fn encode(&self, data: &str) -> Result<Vec<u8>>;

    /// Media type of the bytes returned by [`QrEncoder::encode`]
    fn content_type(&self) -> &'static str {
        "image/png"
    }
}

/// PNG encoder backed by the `qrcode` crate
///
/// Defaults mirror a typical printed code: high error correction,
/// 10 pixel modules, black on white with the standard quiet zone.
#[derive(Debug, Clone)]
pub struct PngQrEncoder {
    ec_level: EcLevel,
    module_size: u32,
    quiet_zone: bool,
}

impl PngQrEncoder {
    pub fn new(ec_level: EcLevel, module_size: u32, quiet_zone: bool) -> Self {
        Self {
            ec_level,
            module_size: module_size.max(1),
            quiet_zone,
        }
    }
}

impl Default for PngQrEncoder {
    fn default() -> Self {
        Self::new(EcLevel::H, 10, true)
    }
}

impl QrEncoder for PngQrEncoder {
    fn encode(&self, data: &str) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(QrServiceError::Encoding("cannot encode empty data".to_string()));
        }

        let code = QrCode::with_error_correction_level(data.as_bytes(), self.ec_level)
            .map_err(|e| QrServiceError::Encoding(e.to_string()))?;

        let bitmap = code
            .render::<Luma<u8>>()
            .module_dimensions(self.module_size, self.module_size)
            .quiet_zone(self.quiet_zone)
            .dark_color(Luma([0u8]))
            .light_color(Luma([255u8]))
            .build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(bitmap)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| QrServiceError::Encoding(e.to_string()))?;

        debug!(
            data_len = data.len(),
            png_bytes = png.len(),
            "QR code rendered"
        );

        Ok(png)
    }
}
