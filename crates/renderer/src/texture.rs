//! CPU-side scene images, decoded once and uploaded by a backend.

use std::path::Path;

use image::GenericImageView;

use crate::error::PipelineResult;

/// Edge length, in texels, of one placeholder checker cell.
const CHECKER_CELL: u32 = 32;
const CHECKER_SIZE: u32 = CHECKER_CELL * 8;

/// Tightly packed RGBA8 pixels, row 0 at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SceneImage {
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let image = image::open(path)?;
        let (width, height) = image.dimensions();
        let rgba = image.to_rgba8();
        tracing::debug!(path = %path.display(), width, height, "decoded scene image");
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// Loads `path`, falling back to [`SceneImage::placeholder`] on any decode
    /// failure. A missing path selects the placeholder directly.
    pub fn load_or_placeholder(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::placeholder();
        };
        match Self::load(path) {
            Ok(image) => image,
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %error,
                    "failed to load scene image; using placeholder"
                );
                Self::placeholder()
            }
        }
    }

    /// Magenta and dark grey checkerboard.
    pub fn placeholder() -> Self {
        let mut pixels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
        for y in 0..CHECKER_SIZE {
            for x in 0..CHECKER_SIZE {
                let lit = ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0;
                let texel = if lit {
                    [255, 0, 255, 255]
                } else {
                    [40, 40, 40, 255]
                };
                pixels.extend_from_slice(&texel);
            }
        }
        Self {
            width: CHECKER_SIZE,
            height: CHECKER_SIZE,
            pixels,
        }
    }

    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_fills_every_texel() {
        let image = SceneImage::solid(3, 2, [1, 2, 3, 4]);
        assert_eq!(image.pixels().len(), 3 * 2 * 4);
        assert!(image.pixels().chunks(4).all(|texel| texel == [1, 2, 3, 4]));
    }

    #[test]
    fn missing_file_falls_back_to_placeholder() {
        let image = SceneImage::load_or_placeholder(Some(Path::new("/nonexistent/scene.png")));
        assert_eq!(image, SceneImage::placeholder());
        assert_eq!(&image.pixels()[..4], &[255, 0, 255, 255]);
    }

    #[test]
    fn loads_png_top_row_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scene.png");
        let mut buffer = image::RgbaImage::new(2, 2);
        buffer.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        buffer.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        buffer.save(&path).expect("write png");

        let image = SceneImage::load(&path).expect("load png");
        assert_eq!((image.width(), image.height()), (2, 2));
        assert_eq!(&image.pixels()[..4], &[255, 0, 0, 255]);
        assert_eq!(&image.pixels()[8..12], &[0, 0, 255, 255]);
    }
}
