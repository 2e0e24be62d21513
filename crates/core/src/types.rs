use anyhow::{bail, Context, Result};
use ndarray::{Array3, ArrayView3};

/// Packed row-major frame exchanged with frame sources and sinks.
///
/// The pipeline only accepts 8-bit, 3-channel RGB; other layouts can still be
/// represented so that a source delivering them is rejected at ingestion
/// instead of being misread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bit_depth: u8,
}

impl Frame {
    /// 8-bit RGB24 frame from raw bytes. The payload is not checked here.
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            data,
            width,
            height,
            channels: 3,
            bit_depth: 8,
        }
    }

    /// Solid-colour RGB24 frame.
    pub fn solid(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 3];
        for pixel in data.chunks_exact_mut(3) {
            pixel.copy_from_slice(&color);
        }
        Self::rgb(width, height, data)
    }

    pub fn from_array(image: ArrayView3<'_, u8>) -> Self {
        let (height, width, _) = image.dim();
        // iter() walks in logical (row-major) order regardless of strides.
        let data = image.iter().copied().collect();
        Self::rgb(width as u32, height as u32, data)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if self.channels != 3 || x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 3;
        let px = self.data.get(i..i + 3)?;
        Some([px[0], px[1], px[2]])
    }

    /// Checks that the frame is a well-formed RGB24 image.
    pub fn validate_rgb8(&self) -> Result<()> {
        if self.channels != 3 {
            bail!(
                "expected 3-channel RGB frame, got {} channel(s)",
                self.channels
            );
        }
        if self.bit_depth != 8 {
            bail!("only 8-bit RGB frames are supported, got {}-bit", self.bit_depth);
        }
        if self.width == 0 || self.height == 0 {
            bail!("frame dimensions must be positive, got {}x{}", self.width, self.height);
        }

        let expected_len = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected_len {
            bail!(
                "Frame data length mismatch: expected {expected_len}, got {}",
                self.data.len()
            );
        }

        Ok(())
    }

    /// Copies the payload into a `(height, width, 3)` array after validation.
    pub fn to_array(&self) -> Result<Array3<u8>> {
        self.validate_rgb8()?;
        Array3::from_shape_vec(
            (self.height as usize, self.width as usize, 3),
            self.data.clone(),
        )
        .context("failed to reshape RGB24 payload to [H,W,3]")
    }
}
