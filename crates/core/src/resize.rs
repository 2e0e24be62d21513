//! Integer-factor upscaling of RGB24 images.
//!
//! Pixel centres are mapped with the half-pixel convention
//! `src = (dst + 0.5) / factor - 0.5` and out-of-range taps are clamped to the
//! nearest edge sample, so a flat image stays flat under every kernel.

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

/// Keys cubic convolution coefficient, as used by OpenCV's `INTER_CUBIC`.
const CUBIC_A: f64 = -0.75;

/// Supported upscaling kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeAlgorithm {
    #[default]
    Bicubic,
    Bilinear,
    Nearest,
}

impl ResizeAlgorithm {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "nearest" | "neighbor" | "nn" => Self::Nearest,
            "bilinear" | "linear" => Self::Bilinear,
            _ => Self::Bicubic,
        }
    }
}

/// Upscales `(h, w, 3)` to `(h * factor, w * factor, 3)`.
pub fn upscale(image: ArrayView3<'_, u8>, factor: usize, algorithm: ResizeAlgorithm) -> Array3<u8> {
    let (src_h, src_w, _) = image.dim();
    let dst_h = src_h * factor;
    let dst_w = src_w * factor;

    if factor == 1 {
        return image.to_owned();
    }

    match algorithm {
        ResizeAlgorithm::Nearest => resize_nearest(image, dst_w, dst_h),
        ResizeAlgorithm::Bilinear => resize_separable(image, dst_w, dst_h, 2, linear_taps),
        ResizeAlgorithm::Bicubic => resize_separable(image, dst_w, dst_h, 4, cubic_taps),
    }
}

fn resize_nearest(src: ArrayView3<'_, u8>, dst_w: usize, dst_h: usize) -> Array3<u8> {
    let (src_h, src_w, _) = src.dim();
    let mut dst = Array3::<u8>::zeros((dst_h, dst_w, 3));

    for dst_y in 0..dst_h {
        let src_y = ((dst_y as f64 + 0.5) * src_h as f64 / dst_h as f64) as usize;
        let src_y = src_y.min(src_h - 1);

        for dst_x in 0..dst_w {
            let src_x = ((dst_x as f64 + 0.5) * src_w as f64 / dst_w as f64) as usize;
            let src_x = src_x.min(src_w - 1);

            for c in 0..3 {
                dst[[dst_y, dst_x, c]] = src[[src_y, src_x, c]];
            }
        }
    }

    dst
}

/// Source indices and weights contributing to one destination coordinate.
struct Taps {
    index: [usize; 4],
    weight: [f64; 4],
}

fn source_coordinate(dst: usize, src_len: usize, dst_len: usize) -> f64 {
    (dst as f64 + 0.5) * src_len as f64 / dst_len as f64 - 0.5
}

fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

fn linear_taps(dst: usize, src_len: usize, dst_len: usize) -> Taps {
    let pos = source_coordinate(dst, src_len, dst_len);
    let base = pos.floor();
    let f = pos - base;
    let i0 = base as isize;

    Taps {
        index: [
            clamp_index(i0, src_len),
            clamp_index(i0 + 1, src_len),
            0,
            0,
        ],
        weight: [1.0 - f, f, 0.0, 0.0],
    }
}

fn cubic_taps(dst: usize, src_len: usize, dst_len: usize) -> Taps {
    let pos = source_coordinate(dst, src_len, dst_len);
    let base = pos.floor();
    let f = pos - base;
    let i0 = base as isize;

    let mut index = [0usize; 4];
    let mut weight = [0.0f64; 4];
    for k in 0..4 {
        let offset = k as isize - 1;
        index[k] = clamp_index(i0 + offset, src_len);
        weight[k] = cubic_kernel(f - offset as f64);
    }

    Taps { index, weight }
}

fn cubic_kernel(x: f64) -> f64 {
    let x = x.abs();
    if x <= 1.0 {
        ((CUBIC_A + 2.0) * x - (CUBIC_A + 3.0)) * x * x + 1.0
    } else if x < 2.0 {
        ((CUBIC_A * x - 5.0 * CUBIC_A) * x + 8.0 * CUBIC_A) * x - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

fn resize_separable(
    src: ArrayView3<'_, u8>,
    dst_w: usize,
    dst_h: usize,
    support: usize,
    taps_for: fn(usize, usize, usize) -> Taps,
) -> Array3<u8> {
    let (src_h, src_w, _) = src.dim();
    let x_taps: Vec<Taps> = (0..dst_w).map(|x| taps_for(x, src_w, dst_w)).collect();
    let y_taps: Vec<Taps> = (0..dst_h).map(|y| taps_for(y, src_h, dst_h)).collect();

    // Horizontal pass kept in f64 so the vertical pass rounds only once.
    let mut horizontal = Array3::<f64>::zeros((src_h, dst_w, 3));
    for y in 0..src_h {
        for (x, taps) in x_taps.iter().enumerate() {
            for c in 0..3 {
                let mut acc = 0.0;
                for k in 0..support {
                    acc += taps.weight[k] * src[[y, taps.index[k], c]] as f64;
                }
                horizontal[[y, x, c]] = acc;
            }
        }
    }

    let mut dst = Array3::<u8>::zeros((dst_h, dst_w, 3));
    for (y, taps) in y_taps.iter().enumerate() {
        for x in 0..dst_w {
            for c in 0..3 {
                let mut acc = 0.0;
                for k in 0..support {
                    acc += taps.weight[k] * horizontal[[taps.index[k], x, c]];
                }
                dst[[y, x, c]] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    dst
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use super::*;

    fn solid(h: usize, w: usize, color: [u8; 3]) -> Array3<u8> {
        Array3::from_shape_fn((h, w, 3), |(_, _, c)| color[c])
    }

    #[test]
    fn test_upscale_dimensions() {
        let image = solid(5, 7, [1, 2, 3]);
        for algorithm in [
            ResizeAlgorithm::Bicubic,
            ResizeAlgorithm::Bilinear,
            ResizeAlgorithm::Nearest,
        ] {
            let out = upscale(image.view(), 3, algorithm);
            assert_eq!(out.dim(), (15, 21, 3));
        }
    }

    #[test]
    fn test_flat_image_stays_flat() {
        let image = solid(8, 8, [200, 100, 50]);
        for algorithm in [
            ResizeAlgorithm::Bicubic,
            ResizeAlgorithm::Bilinear,
            ResizeAlgorithm::Nearest,
        ] {
            let out = upscale(image.view(), 2, algorithm);
            let data = out.as_slice().expect("standard layout");
            for pixel in data.chunks_exact(3) {
                assert_eq!(pixel, &[200, 100, 50], "{algorithm:?}");
            }
        }
    }

    #[test]
    fn test_factor_one_is_identity() {
        let image = Array3::from_shape_fn((3, 4, 3), |(y, x, c)| (y * 40 + x * 10 + c) as u8);
        let out = upscale(image.view(), 1, ResizeAlgorithm::Bicubic);
        assert_eq!(out, image);
    }

    #[test]
    fn test_nearest_replicates_blocks() {
        let image = Array3::from_shape_fn((2, 2, 3), |(y, x, _)| if x == y { 0 } else { 255 });
        let out = upscale(image.view(), 2, ResizeAlgorithm::Nearest);

        assert_eq!(out[[0, 0, 0]], 0);
        assert_eq!(out[[1, 1, 0]], 0);
        assert_eq!(out[[0, 3, 0]], 255);
        assert_eq!(out[[3, 0, 0]], 255);
        assert_eq!(out[[3, 3, 0]], 0);
    }

    #[test]
    fn test_cubic_kernel_partition_of_unity() {
        for step in 0..10 {
            let f = step as f64 / 10.0;
            let sum: f64 = (0..4).map(|k| cubic_kernel(f - (k as f64 - 1.0))).sum();
            assert!((sum - 1.0).abs() < 1e-12, "f={f} sum={sum}");
        }
        assert_eq!(cubic_kernel(0.0), 1.0);
        assert_eq!(cubic_kernel(1.0), 0.0);
        assert_eq!(cubic_kernel(2.5), 0.0);
    }

    #[test]
    fn test_bilinear_gradient_is_monotonic() {
        let image = Array3::from_shape_fn((1, 4, 3), |(_, x, _)| (x * 60) as u8);
        let out = upscale(image.view(), 2, ResizeAlgorithm::Bilinear);

        let row: Vec<u8> = (0..8).map(|x| out[[0, x, 0]]).collect();
        assert!(row.windows(2).all(|w| w[0] <= w[1]), "{row:?}");
        assert_eq!(row[0], 0);
        assert_eq!(row[7], 180);
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!(ResizeAlgorithm::from_str_lossy("nn"), ResizeAlgorithm::Nearest);
        assert_eq!(
            ResizeAlgorithm::from_str_lossy("Bilinear"),
            ResizeAlgorithm::Bilinear
        );
        assert_eq!(
            ResizeAlgorithm::from_str_lossy("bicubic"),
            ResizeAlgorithm::Bicubic
        );
        assert_eq!(
            ResizeAlgorithm::from_str_lossy("lanczos"),
            ResizeAlgorithm::Bicubic
        );
    }
}
