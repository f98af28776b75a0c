//! RGBA8 texture data loaded from disk or generated in memory.

use std::path::Path;

use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Bytes per texel.
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Decodes an image file and converts it to RGBA8.
    pub fn load_rgba8(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::NotFound(path.to_path_buf()));
        }

        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();

        info!("Loaded texture {:?}: {}x{}", path, width, height);

        Ok(Self {
            pixels: rgba.into_raw(),
            width,
            height,
        })
    }

    /// Square checkerboard of `size` texels with `cell`-sized squares.
    /// The top-left cell uses `a`.
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(size as usize * size as usize * Self::BYTES_PER_PIXEL);
        for y in 0..size {
            for x in 0..size {
                let even = ((x / cell) + (y / cell)).is_multiple_of(2);
                pixels.extend_from_slice(if even { &a } else { &b });
            }
        }
        Self {
            pixels,
            width: size,
            height: size,
        }
    }

    /// Expected byte length for the stored dimensions.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * Self::BYTES_PER_PIXEL
    }

    /// RGBA value at (x, y), or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        let texel = self.pixels.get(offset..offset + Self::BYTES_PER_PIXEL)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }
}
