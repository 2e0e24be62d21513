//! Temporal non-local-means video super-resolution.
//!
//! Low-resolution RGB frames are pulled from a source, upscaled, and refined
//! by fusing similar patches found across a sliding window of frames.

pub mod config;
pub mod logging;
pub mod nlm;
pub mod pipeline;
pub mod resize;
pub mod ring_buffer;
pub mod types;

pub use config::{FlushPolicy, NlmConfig};
pub use pipeline::{run_to_sink, FrameSink, NlmPipeline};
pub use types::Frame;
