//! Spatiotemporal patch-weighted accumulation.
//!
//! Every high-resolution pixel of the refined frame becomes a weighted mean of
//! low-resolution samples taken around it in every frame of the temporal
//! window. Weights compare high-resolution patches, so similarity is judged
//! at the fine scale while the contributed colour is genuine low-res detail.

use std::ops::RangeInclusive;
use std::time::Instant;

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis, Zip};
use rayon::prelude::*;
use tracing::debug;

use crate::config::NlmConfig;
use crate::nlm::patch::PaddedFrame;
use crate::nlm::weight::nlm_weight;
use crate::ring_buffer::{BufferedFrame, FrameRingBuffer};

/// Candidates weighing less than this are skipped. Fixed, not derived from
/// `sigma`.
pub const SIGNIFICANCE_THRESHOLD: f64 = 0.1;

/// Tiles per rayon worker when `tile_rows` is left automatic.
const TILES_PER_THREAD: usize = 4;

#[derive(Debug, Clone, Copy)]
struct SearchParams {
    scale: isize,
    search_area_radius: isize,
    patch_size: usize,
    diff_weight: f64,
}

/// Running weighted colour sums (`values`) and weight sums (`weights`),
/// shaped like the high-res frame. Reused across passes.
struct Accumulator {
    values: Array3<f64>,
    weights: Array3<f64>,
}

impl Accumulator {
    fn empty() -> Self {
        Self {
            values: Array3::zeros((0, 0, 3)),
            weights: Array3::zeros((0, 0, 3)),
        }
    }

    /// Starts from the frame's own colour with a self-weight of one.
    fn seed(&mut self, frame: ArrayView3<'_, u8>) {
        if self.values.dim() != frame.dim() {
            self.values = Array3::zeros(frame.dim());
            self.weights = Array3::zeros(frame.dim());
        }
        Zip::from(&mut self.values)
            .and(&frame)
            .for_each(|v, &c| *v = c as f64);
        self.weights.fill(1.0);
    }

    fn normalize_into(&self, out: ArrayViewMut3<'_, u8>) {
        Zip::from(out)
            .and(&self.values)
            .and(&self.weights)
            .for_each(|o, &v, &w| *o = (v / w).round().clamp(0.0, 255.0) as u8);
    }
}

pub struct RefineEngine {
    params: SearchParams,
    time_radius: i64,
    tile_rows: usize,
    accumulator: Accumulator,
}

impl RefineEngine {
    pub fn new(config: &NlmConfig) -> Self {
        Self {
            params: SearchParams {
                scale: config.scale as isize,
                search_area_radius: config.search_area_radius as isize,
                patch_size: config.patch_size,
                diff_weight: config.patch_diff_weight(),
            },
            time_radius: config.time_radius as i64,
            tile_rows: config.tile_rows,
            accumulator: Accumulator::empty(),
        }
    }

    /// `[position - time_radius, position + time_radius]`.
    pub fn full_window(&self, position: i64) -> RangeInclusive<i64> {
        position - self.time_radius..=position + self.time_radius
    }

    /// Smallest accumulated weight of the last pass; at least one by
    /// construction. `None` before the first pass.
    pub fn min_accumulated_weight(&self) -> Option<f64> {
        self.accumulator
            .weights
            .iter()
            .copied()
            .reduce(f64::min)
    }

    /// Refines the high-res frame at `position` against its full temporal
    /// window.
    pub fn refine(&mut self, buffer: &mut FrameRingBuffer, position: i64) {
        let window = self.full_window(position);
        self.refine_window(buffer, position, window);
    }

    /// Refines the high-res frame at `position` using the frames in `window`.
    ///
    /// # Panics
    ///
    /// When `window` does not contain `position` or reaches outside the
    /// buffer's retained positions.
    pub fn refine_window(
        &mut self,
        buffer: &mut FrameRingBuffer,
        position: i64,
        window: RangeInclusive<i64>,
    ) {
        assert!(
            window.contains(&position),
            "window {window:?} does not contain refined position {position}"
        );
        let started = Instant::now();

        {
            let target = buffer.at(position).high_res();
            let neighbors: Vec<&BufferedFrame> =
                window.clone().map(|p| buffer.at(p)).collect();

            self.accumulator.seed(target.interior());
            let tile_rows = self.tile_rows_for(target.height());
            let params = self.params;
            let Accumulator { values, weights } = &mut self.accumulator;

            values
                .axis_chunks_iter_mut(Axis(0), tile_rows)
                .into_par_iter()
                .zip(weights.axis_chunks_iter_mut(Axis(0), tile_rows).into_par_iter())
                .enumerate()
                .for_each(|(tile, (tile_values, tile_weights))| {
                    accumulate_tile(
                        &params,
                        target,
                        &neighbors,
                        tile * tile_rows,
                        tile_values,
                        tile_weights,
                    );
                });
        }

        let high_res = buffer.at_mut(position).high_res_mut();
        self.accumulator.normalize_into(high_res.interior_mut());
        high_res.refresh_border();

        debug!(
            position,
            window_start = window.start(),
            window_end = window.end(),
            elapsed_ms = format!("{:.1}", started.elapsed().as_secs_f64() * 1000.0),
            "refined frame"
        );
    }

    fn tile_rows_for(&self, height: usize) -> usize {
        if self.tile_rows > 0 {
            return self.tile_rows;
        }
        let tiles = rayon::current_num_threads().max(1) * TILES_PER_THREAD;
        height.div_ceil(tiles).max(1)
    }
}

/// Accumulates the rows `first_row..` covered by `values`/`weights`.
fn accumulate_tile(
    params: &SearchParams,
    target: &PaddedFrame,
    neighbors: &[&BufferedFrame],
    first_row: usize,
    mut values: ArrayViewMut3<'_, f64>,
    mut weights: ArrayViewMut3<'_, f64>,
) {
    let SearchParams {
        scale,
        search_area_radius: radius,
        patch_size,
        diff_weight,
    } = *params;
    let width = target.width();

    for (dy, (mut value_row, mut weight_row)) in values
        .outer_iter_mut()
        .zip(weights.outer_iter_mut())
        .enumerate()
    {
        let zy = (first_row + dy) as isize;

        for zx in 0..width {
            let z_patch = target.patch(zx as isize, zy, patch_size);
            let mut color = [0.0f64; 3];
            let mut total = 0.0f64;

            for frame in neighbors {
                let low_res = frame.low_res();
                let high_res = frame.high_res();

                for i in -radius..=radius {
                    let ly = zy / scale + i;
                    for j in -radius..=radius {
                        let lx = zx as isize / scale + j;

                        let candidate = high_res.patch(lx * scale, ly * scale, patch_size);
                        let w = nlm_weight(&z_patch, &candidate, diff_weight);
                        if w < SIGNIFICANCE_THRESHOLD {
                            continue;
                        }

                        let sample = low_res.pixel(lx, ly);
                        for c in 0..3 {
                            color[c] += w * sample[c] as f64;
                        }
                        total += w;
                    }
                }
            }

            for c in 0..3 {
                value_row[[zx, c]] += color[c];
                weight_row[[zx, c]] += total;
            }
        }
    }
}
