//! Non-local-means building blocks: padded frames and patches, the patch
//! similarity weight, and the accumulation pass that refines one frame.

pub mod patch;
pub mod refine;
pub mod weight;

pub use patch::{pad, BorderPolicy, PaddedFrame};
pub use refine::{RefineEngine, SIGNIFICANCE_THRESHOLD};
pub use weight::{gaussian_weight, nlm_weight, patch_distance};
