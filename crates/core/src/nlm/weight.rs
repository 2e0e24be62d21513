use ndarray::{ArrayView3, Zip};

/// Sum of squared per-channel differences between two equal-size patches.
pub fn patch_distance(a: &ArrayView3<'_, u8>, b: &ArrayView3<'_, u8>) -> f64 {
    debug_assert_eq!(a.dim(), b.dim(), "patches must have the same size");

    Zip::from(a).and(b).fold(0.0, |acc, &x, &y| {
        let d = x as f64 - y as f64;
        acc + d * d
    })
}

/// `exp(-distance * diff_weight)`, with `diff_weight = 1 / (2 * sigma^2)`.
pub fn nlm_weight(a: &ArrayView3<'_, u8>, b: &ArrayView3<'_, u8>, diff_weight: f64) -> f64 {
    (-patch_distance(a, b) * diff_weight).exp()
}

pub fn gaussian_weight(a: &ArrayView3<'_, u8>, b: &ArrayView3<'_, u8>, sigma: f64) -> f64 {
    nlm_weight(a, b, 1.0 / (2.0 * sigma * sigma))
}
