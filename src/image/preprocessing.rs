//! Stretch-resize and channel-planar normalization for classifier inputs.

use crate::config::{PreprocessConfig, ResizeFilter};
use crate::image::loader::PixelGrid;
use crate::utils::error::VisionError;
use crate::Result;
use image::imageops::{self, FilterType};
use ndarray::Array4;

/// Per-channel `(raw / 255 - mean) / std` calibration, RGB order.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalization {
    mean: [f32; 3],
    std: [f32; 3],
}

impl Default for Normalization {
    fn default() -> Self {
        let defaults = PreprocessConfig::default();
        Self {
            mean: defaults.mean,
            std: defaults.std,
        }
    }
}

impl Normalization {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        for (i, (&m, &s)) in mean.iter().zip(std.iter()).enumerate() {
            if !m.is_finite() {
                return Err(VisionError::Config(format!(
                    "Mean at index {i} is not finite: {m}"
                )));
            }
            if !s.is_finite() || s <= 0.0 {
                return Err(VisionError::Config(format!(
                    "Standard deviation at index {i} must be a positive finite number, got {s}"
                )));
            }
        }
        Ok(Self { mean, std })
    }

    pub fn mean(&self) -> [f32; 3] {
        self.mean
    }

    pub fn std(&self) -> [f32; 3] {
        self.std
    }

    #[inline]
    pub fn apply(&self, channel: usize, raw: u8) -> f32 {
        (raw as f32 / 255.0 - self.mean[channel]) / self.std[channel]
    }
}

/// A `1 x 3 x N x N` float tensor in standard (channel-planar) layout.
#[derive(Debug, Clone)]
pub struct InputTensor {
    data: Array4<f32>,
}

impl InputTensor {
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat view: the red block, then green, then blue.
    pub fn as_slice(&self) -> &[f32] {
        // The array is always built in standard layout.
        self.data.as_slice().unwrap_or(&[])
    }

    pub fn view(&self) -> ndarray::ArrayView4<'_, f32> {
        self.data.view()
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    input_size: u32,
    normalization: Normalization,
    filter: FilterType,
}

impl ImagePreprocessor {
    pub fn new(input_size: u32, normalization: Normalization, filter: ResizeFilter) -> Result<Self> {
        if input_size == 0 {
            return Err(VisionError::Config(
                "Model input size must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            input_size,
            normalization,
            filter: match filter {
                ResizeFilter::Bilinear => FilterType::Triangle,
                ResizeFilter::Bicubic => FilterType::CatmullRom,
                ResizeFilter::Lanczos3 => FilterType::Lanczos3,
            },
        })
    }

    pub fn from_config(config: &PreprocessConfig) -> Result<Self> {
        let normalization = Normalization::new(config.mean, config.std)?;
        Self::new(config.input_size, normalization, config.filter)
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Stretches the grid to `N x N` (no crop, no aspect preservation), drops alpha and normalizes.
    pub fn process(&self, grid: &PixelGrid) -> InputTensor {
        let n = self.input_size;
        let rgba = grid.as_rgba();

        // Stretch to N x N; inputs already at size are used as-is
        let resized;
        let source = if rgba.width() == n && rgba.height() == n {
            rgba
        } else {
            resized = imageops::resize(rgba, n, n, self.filter);
            &resized
        };

        // Channel-planar fill, alpha dropped
        let side = n as usize;
        let mut data = Array4::<f32>::zeros((1, 3, side, side));
        for (x, y, pixel) in source.enumerate_pixels() {
            let (row, col) = (y as usize, x as usize);
            for c in 0..3 {
                data[[0, c, row, col]] = self.normalization.apply(c, pixel[c]);
            }
        }

        InputTensor { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn preprocessor(size: u32) -> ImagePreprocessor {
        ImagePreprocessor::new(size, Normalization::default(), ResizeFilter::Bilinear).unwrap()
    }

    fn uniform(width: u32, height: u32, rgba: [u8; 4]) -> PixelGrid {
        PixelGrid::from_rgba(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    #[test]
    fn mid_gray_fills_each_channel_block_with_its_own_constant() {
        let tensor = preprocessor(224).process(&uniform(64, 64, [128, 128, 128, 255]));
        let values = tensor.as_slice();
        let plane = 224 * 224;
        assert_eq!(values.len(), 3 * plane);

        let mean = [0.485f32, 0.456, 0.406];
        let std = [0.229f32, 0.224, 0.225];
        for c in 0..3 {
            let expected = (128.0 / 255.0 - mean[c]) / std[c];
            let block = &values[c * plane..(c + 1) * plane];
            assert!(
                block.iter().all(|v| (v - expected).abs() < 1e-5),
                "channel {c} block not uniformly {expected}"
            );
        }
    }

    #[test]
    fn channel_blocks_follow_rgb_order() {
        let tensor = preprocessor(4).process(&uniform(4, 4, [255, 0, 128, 255]));
        let values = tensor.as_slice();
        let norm = Normalization::default();
        assert!((values[0] - norm.apply(0, 255)).abs() < 1e-6);
        assert!((values[16] - norm.apply(1, 0)).abs() < 1e-6);
        assert!((values[32] - norm.apply(2, 128)).abs() < 1e-6);
    }

    #[test]
    fn non_square_source_is_stretched_to_model_shape() {
        let tensor = preprocessor(224).process(&uniform(100, 50, [10, 20, 30, 255]));
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        assert_eq!(tensor.len(), 224 * 224 * 3);
    }

    #[test]
    fn alpha_is_ignored() {
        let opaque = preprocessor(8).process(&uniform(8, 8, [40, 80, 120, 255]));
        let clear = preprocessor(8).process(&uniform(8, 8, [40, 80, 120, 0]));
        assert_eq!(opaque.as_slice(), clear.as_slice());
    }

    #[test]
    fn spatial_positions_are_row_major_within_a_plane() {
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        image.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        let tensor = preprocessor(2).process(&PixelGrid::from_rgba(image));

        let norm = Normalization::default();
        let red = &tensor.as_slice()[0..4];
        assert!((red[1] - norm.apply(0, 255)).abs() < 1e-6);
        assert!((red[0] - norm.apply(0, 0)).abs() < 1e-6);
        assert!((red[2] - norm.apply(0, 0)).abs() < 1e-6);
    }

    #[test]
    fn custom_calibration_is_used() {
        let norm = Normalization::new([0.5; 3], [0.5; 3]).unwrap();
        let pre = ImagePreprocessor::new(2, norm, ResizeFilter::Bilinear).unwrap();
        let tensor = pre.process(&uniform(2, 2, [255, 0, 255, 255]));
        assert!((tensor.as_slice()[0] - 1.0).abs() < 1e-6);
        assert!((tensor.as_slice()[4] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn invalid_std_is_rejected() {
        assert!(Normalization::new([0.5; 3], [0.5, 0.0, 0.5]).is_err());
        assert!(Normalization::new([0.5; 3], [0.5, -1.0, 0.5]).is_err());
        assert!(Normalization::new([f32::NAN, 0.5, 0.5], [0.5; 3]).is_err());
    }

    #[test]
    fn zero_input_size_is_rejected() {
        assert!(ImagePreprocessor::new(0, Normalization::default(), ResizeFilter::Bilinear).is_err());
    }
}
