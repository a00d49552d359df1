use crate::utils::error::{DecodeError, VisionError};
use base64::Engine;
use image::{ImageFormat, RgbaImage};

/// Default upper bound on encoded image size (50MB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Encoded image bytes plus a stable identifier, usually the file name.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Builds a raw image from base64, tolerating a `data:image/...;base64,` prefix.
    pub fn from_base64(name: impl Into<String>, base64_data: &str) -> crate::Result<Self> {
        let base64_clean = if base64_data.starts_with("data:") {
            base64_data
                .split_once(',')
                .map(|(_, payload)| payload)
                .ok_or_else(|| VisionError::InvalidInput("Malformed data URL".to_string()))?
        } else {
            base64_data
        };

        let bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?;
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded RGBA pixels at the image's native dimensions.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    image: RgbaImage,
}

impl PixelGrid {
    pub fn from_rgba(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }
}

/// Sniffs and decodes encoded images into pixel grids.
#[derive(Debug, Clone)]
pub struct ImageLoader {
    max_bytes: usize,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IMAGE_BYTES)
    }
}

impl ImageLoader {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn decode(&self, raw: &RawImage) -> Result<PixelGrid, DecodeError> {
        self.decode_bytes(&raw.bytes)
    }

    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<PixelGrid, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(DecodeError::TooLarge(bytes.len(), self.max_bytes));
        }

        let format = Self::detect_format(bytes)
            .ok_or_else(|| DecodeError::UnsupportedFormat("unrecognized".to_string()))?;
        if !Self::is_supported_format(format) {
            return Err(DecodeError::UnsupportedFormat(format!("{format:?}")));
        }

        let rgba = image::load_from_memory_with_format(bytes, format)?.to_rgba8();
        tracing::debug!(
            "Decoded {:?} image: {}x{}",
            format,
            rgba.width(),
            rgba.height()
        );

        Ok(PixelGrid::from_rgba(rgba))
    }

    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Gif
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};
    use std::io::Cursor;

    pub(crate) fn encode(image: RgbaImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(image)
            .to_rgb8()
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    pub(crate) fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]));
        encode(image, ImageFormat::Png)
    }

    #[test]
    fn decodes_png_at_native_size() {
        let grid = ImageLoader::default().decode_bytes(&png(100, 50, [10, 20, 30])).unwrap();
        assert_eq!((grid.width(), grid.height()), (100, 50));
        assert_eq!(grid.as_rgba().get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn decodes_jpeg() {
        let image = RgbaImage::from_pixel(16, 8, Rgba([200, 100, 50, 255]));
        let bytes = encode(image, ImageFormat::Jpeg);
        let grid = ImageLoader::default().decode_bytes(&bytes).unwrap();
        assert_eq!((grid.width(), grid.height()), (16, 8));
    }

    #[test]
    fn rejects_empty_bytes() {
        let raw = RawImage::new("empty.png", Vec::new());
        assert!(matches!(ImageLoader::default().decode(&raw), Err(DecodeError::Empty)));
    }

    #[test]
    fn rejects_oversize_input() {
        let bytes = png(4, 4, [0, 0, 0]);
        let loader = ImageLoader::new(8);
        assert!(matches!(
            loader.decode_bytes(&bytes),
            Err(DecodeError::TooLarge(_, 8))
        ));
    }

    #[test]
    fn rejects_unrecognized_bytes() {
        assert!(matches!(
            ImageLoader::default().decode_bytes(b"definitely not an image"),
            Err(DecodeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn rejects_truncated_png() {
        let mut bytes = png(32, 32, [1, 2, 3]);
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            ImageLoader::default().decode_bytes(&bytes),
            Err(DecodeError::Image(_))
        ));
    }

    #[test]
    fn base64_accepts_data_url_prefix() {
        let bytes = png(2, 2, [9, 9, 9]);
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let plain = RawImage::from_base64("a.png", &encoded).unwrap();
        let data_url = RawImage::from_base64("a.png", &format!("data:image/png;base64,{encoded}")).unwrap();
        assert_eq!(plain.bytes, bytes);
        assert_eq!(data_url.bytes, bytes);
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(matches!(
            RawImage::from_base64("x", "!!!not base64!!!"),
            Err(VisionError::Base64(_))
        ));
    }
}
