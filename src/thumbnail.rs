//! Image-processing collaborator used for thumbnails

use crate::error::{Result, VideoError};
use fast_image_resize as fr;
use fr::images::Image as FrImage;
use image::codecs::jpeg::JpegEncoder;
use std::path::Path;

/// What the thumbnail step needs from an image library.
pub trait ImageBackend {
    /// `(width, height)` of the image at `path`.
    fn geometry(&self, path: &Path) -> Result<(u32, u32)>;

    /// Scale the image to fit a `bound`×`bound` square, keeping the aspect
    /// ratio, and return the encoded bytes.
    fn fit_within(&self, path: &Path, bound: u32) -> Result<Vec<u8>>;
}

/// `image` for decode/encode, `fast_image_resize` for the scaling.
pub struct ResizeBackend {
    pub quality: u8, // JPEG quality 1-100
}

impl Default for ResizeBackend {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

impl ImageBackend for ResizeBackend {
    fn geometry(&self, path: &Path) -> Result<(u32, u32)> {
        image::image_dimensions(path)
            .map_err(|e| VideoError::Image(format!("Failed to read geometry: {}", e)))
    }

    fn fit_within(&self, path: &Path, bound: u32) -> Result<Vec<u8>> {
        let rgb = image::open(path)
            .map_err(|e| VideoError::Image(format!("Failed to load image: {}", e)))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        let (dst_width, dst_height) = fit_dimensions(width, height, bound);

        let src_image = FrImage::from_vec_u8(width, height, rgb.into_raw(), fr::PixelType::U8x3)
            .map_err(|e| VideoError::Image(format!("Failed to create source image: {:?}", e)))?;
        let mut dst_image = FrImage::new(dst_width, dst_height, src_image.pixel_type());

        let mut resizer = fr::Resizer::new();
        resizer
            .resize(&src_image, &mut dst_image, None)
            .map_err(|e| VideoError::Image(format!("Resize failed: {:?}", e)))?;

        let resized = image::RgbImage::from_raw(dst_width, dst_height, dst_image.buffer().to_vec())
            .ok_or_else(|| VideoError::Image("Failed to create image from resized data".to_string()))?;

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode_image(&resized)
            .map_err(|e| VideoError::Image(format!("Failed to encode JPEG: {}", e)))?;

        Ok(bytes)
    }
}

/// Largest size fitting inside `bound`×`bound` with the same aspect ratio.
pub fn fit_dimensions(width: u32, height: u32, bound: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (bound, bound);
    }
    let scale = |minor: u32, major: u32| -> u32 {
        let scaled = (minor as u64 * bound as u64 + major as u64 / 2) / major as u64;
        (scaled as u32).max(1)
    };
    if width >= height {
        (bound, scale(height, width))
    } else {
        (scale(width, height), bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fit_dimensions_keeps_aspect() {
        assert_eq!(fit_dimensions(1920, 1080, 200), (200, 113));
        assert_eq!(fit_dimensions(1080, 1920, 200), (113, 200));
        assert_eq!(fit_dimensions(500, 500, 200), (200, 200));
        assert_eq!(fit_dimensions(4000, 10, 200), (200, 1));
    }

    #[test]
    fn test_resize_backend_shrinks_to_bound() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbImage::from_pixel(400, 200, image::Rgb([200, 40, 40]))
            .save(&path)
            .unwrap();

        let backend = ResizeBackend::default();
        assert_eq!(backend.geometry(&path).unwrap(), (400, 200));

        let bytes = backend.fit_within(&path, 100).unwrap();
        let thumb = image::load_from_memory(&bytes).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (100, 50));
    }

    #[test]
    fn test_geometry_of_missing_file_fails() {
        let err = ResizeBackend::default()
            .geometry(Path::new("/nonexistent/frame.jpg"))
            .unwrap_err();
        assert!(matches!(err, VideoError::Image(_)));
    }
}
