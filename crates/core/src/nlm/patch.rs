//! Bordered images and patch views.

use ndarray::{s, Array3, ArrayView3, ArrayViewMut3};
use serde::{Deserialize, Serialize};

/// How the border around a padded frame is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderPolicy {
    /// Black border.
    #[default]
    Constant,
    /// Mirror without repeating the edge sample (`gfedcb|abcdefgh|gfedcba`).
    Reflect,
}

/// An RGB image surrounded by a fixed-width border.
///
/// Coordinates taken by the accessors are in the un-padded image space, so
/// `(-border, -border)` is the top-left corner of the allocation.
#[derive(Debug, Clone)]
pub struct PaddedFrame {
    data: Array3<u8>,
    border: usize,
    width: usize,
    height: usize,
    policy: BorderPolicy,
}

/// Pads `image` by `border` pixels on every side.
pub fn pad(image: ArrayView3<'_, u8>, border: usize, policy: BorderPolicy) -> PaddedFrame {
    let (height, width, _) = image.dim();
    let mut frame = PaddedFrame {
        data: Array3::zeros((height + 2 * border, width + 2 * border, 3)),
        border,
        width,
        height,
        policy,
    };
    frame.fill_from(image);
    frame
}

impl PaddedFrame {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn border(&self) -> usize {
        self.border
    }

    pub fn policy(&self) -> BorderPolicy {
        self.policy
    }

    /// Replaces the content with `image`, reusing the allocation when the
    /// geometry is unchanged.
    pub fn fill_from(&mut self, image: ArrayView3<'_, u8>) {
        let (height, width, _) = image.dim();
        if height != self.height || width != self.width {
            self.data = Array3::zeros((height + 2 * self.border, width + 2 * self.border, 3));
            self.height = height;
            self.width = width;
        }

        let b = self.border;
        self.data
            .slice_mut(s![b..b + height, b..b + width, ..])
            .assign(&image);
        self.refresh_border();
    }

    /// Regenerates the border from the current interior.
    pub fn refresh_border(&mut self) {
        let b = self.border;
        if b == 0 {
            return;
        }
        let (padded_h, padded_w, _) = self.data.dim();
        let (h, w) = (self.height, self.width);

        match self.policy {
            BorderPolicy::Constant => {
                self.data.slice_mut(s![..b, .., ..]).fill(0);
                self.data.slice_mut(s![b + h.., .., ..]).fill(0);
                self.data.slice_mut(s![b..b + h, ..b, ..]).fill(0);
                self.data.slice_mut(s![b..b + h, b + w.., ..]).fill(0);
            }
            BorderPolicy::Reflect => {
                // Columns first on interior rows, then whole rows top and bottom.
                for py in b..b + h {
                    for px in (0..b).chain(b + w..padded_w) {
                        let sx = b + reflect_101(px as isize - b as isize, w);
                        for c in 0..3 {
                            self.data[[py, px, c]] = self.data[[py, sx, c]];
                        }
                    }
                }
                for py in (0..b).chain(b + h..padded_h) {
                    let sy = b + reflect_101(py as isize - b as isize, h);
                    let (mut dst, src) = self
                        .data
                        .multi_slice_mut((s![py, .., ..], s![sy, .., ..]));
                    dst.assign(&src);
                }
            }
        }
    }

    pub fn interior(&self) -> ArrayView3<'_, u8> {
        let b = self.border;
        self.data
            .slice(s![b..b + self.height, b..b + self.width, ..])
    }

    pub fn interior_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        let b = self.border;
        self.data
            .slice_mut(s![b..b + self.height, b..b + self.width, ..])
    }

    /// The whole allocation, border included.
    pub fn padded(&self) -> ArrayView3<'_, u8> {
        self.data.view()
    }

    /// Colour at `(x, y)`; the point must lie inside the padded extent.
    pub fn pixel(&self, x: isize, y: isize) -> [u8; 3] {
        let b = self.border as isize;
        let (px, py) = ((x + b) as usize, (y + b) as usize);
        [
            self.data[[py, px, 0]],
            self.data[[py, px, 1]],
            self.data[[py, px, 2]],
        ]
    }

    /// `size x size` view centred at `(cx, cy)`.
    ///
    /// The window is clamped to the padded extent, so the call never panics
    /// for a patch no larger than the allocation.
    pub fn patch(&self, cx: isize, cy: isize, size: usize) -> ArrayView3<'_, u8> {
        let (padded_h, padded_w, _) = self.data.dim();
        let half = (size / 2) as isize;
        let b = self.border as isize;

        let x0 = cx + b - half;
        let y0 = cy + b - half;
        debug_assert!(
            x0 >= 0
                && y0 >= 0
                && x0 as usize + size <= padded_w
                && y0 as usize + size <= padded_h,
            "patch at ({cx}, {cy}) of size {size} leaves a border of {}",
            self.border
        );

        let x0 = x0.clamp(0, padded_w.saturating_sub(size) as isize) as usize;
        let y0 = y0.clamp(0, padded_h.saturating_sub(size) as isize) as usize;
        self.data.slice(s![y0..y0 + size, x0..x0 + size, ..])
    }
}

/// Reflect-101 index mapping, periodic so borders wider than the image work.
fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = i.rem_euclid(period);
    if m < len as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    fn ramp(h: usize, w: usize) -> Array3<u8> {
        Array3::from_shape_fn((h, w, 3), |(y, x, c)| (y * 16 + x * 2 + c) as u8)
    }

    #[test]
    fn test_reflect_101_mapping() {
        let mapped: Vec<usize> = (-4..8).map(|i| reflect_101(i, 4)).collect();
        assert_eq!(mapped, vec![2, 3, 2, 1, 0, 1, 2, 3, 2, 1, 0, 1]);
        assert_eq!(reflect_101(-7, 1), 0);
    }

    #[test]
    fn test_constant_border_is_black() {
        let image = Array3::from_elem((3, 4, 3), 200u8);
        let padded = pad(image.view(), 2, BorderPolicy::Constant);

        assert_eq!(padded.padded().dim(), (7, 8, 3));
        assert_eq!(padded.pixel(-2, -2), [0, 0, 0]);
        assert_eq!(padded.pixel(4, 1), [0, 0, 0]);
        assert_eq!(padded.pixel(0, 0), [200, 200, 200]);
        assert_eq!(padded.pixel(3, 2), [200, 200, 200]);
        assert_eq!(padded.interior(), image.view());
    }

    #[test]
    fn test_reflect_border_mirrors_interior() {
        let image = ramp(4, 5);
        let padded = pad(image.view(), 3, BorderPolicy::Reflect);

        assert_eq!(padded.pixel(-1, 0), padded.pixel(1, 0));
        assert_eq!(padded.pixel(5, 2), padded.pixel(3, 2));
        assert_eq!(padded.pixel(2, -2), padded.pixel(2, 2));
        assert_eq!(padded.pixel(-1, -1), padded.pixel(1, 1));
        assert_eq!(padded.pixel(6, 5), padded.pixel(2, 1));
    }

    #[test]
    fn test_reflect_border_wider_than_image() {
        let image = ramp(2, 2);
        let padded = pad(image.view(), 5, BorderPolicy::Reflect);
        assert_eq!(padded.pixel(-5, -5), padded.pixel(1, 1));
        assert_eq!(padded.pixel(6, 0), padded.pixel(0, 0));
    }

    #[test]
    fn test_patch_is_centred() {
        let image = ramp(6, 6);
        let padded = pad(image.view(), 2, BorderPolicy::Constant);

        let patch = padded.patch(2, 3, 3);
        assert_eq!(patch.dim(), (3, 3, 3));
        assert_eq!(patch.slice(s![1, 1, ..]), image.slice(s![3, 2, ..]));
        assert_eq!(patch.slice(s![0, 0, ..]), image.slice(s![2, 1, ..]));
    }

    #[test]
    fn test_patch_reaches_into_border() {
        let image = Array3::from_elem((4, 4, 3), 9u8);
        let padded = pad(image.view(), 2, BorderPolicy::Constant);

        let patch = padded.patch(-1, -1, 3);
        assert_eq!(patch[[0, 0, 0]], 0);
        assert_eq!(patch[[2, 2, 0]], 9);
    }

    #[test]
    fn test_fill_from_reuses_geometry() {
        let mut padded = pad(ramp(3, 3).view(), 1, BorderPolicy::Reflect);
        let next = Array3::from_elem((3, 3, 3), 77u8);

        padded.fill_from(next.view());
        assert_eq!(padded.interior(), next.view());
        assert_eq!(padded.pixel(-1, -1), [77, 77, 77]);
    }

    #[test]
    fn test_refresh_border_after_interior_write() {
        let mut padded = pad(ramp(3, 3).view(), 1, BorderPolicy::Reflect);
        padded.interior_mut().fill(5);
        padded.refresh_border();
        assert_eq!(padded.pixel(-1, 3), [5, 5, 5]);
    }
}
