//! Frame-stream controller: primes the temporal window, then refines and
//! emits one frame per ingested frame.

use std::ops::RangeInclusive;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::config::{FlushPolicy, NlmConfig};
use crate::nlm::refine::RefineEngine;
use crate::ring_buffer::FrameRingBuffer;
use crate::types::Frame;

pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

impl FrameSink for Vec<Frame> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Steady,
    /// Source exhausted; `proc_pos`/`out_pos` keep advancing without input.
    Draining { proc_pos: i64, out_pos: i64 },
    Finished,
}

/// Temporal NLM super-resolution over a pull-based frame source.
///
/// Construction primes the window by pulling `3 * time_radius + 1` frames.
/// Every [`NlmPipeline::step`] afterwards pulls one frame and returns one
/// refined frame, so input `k` comes out while input `k + 3 * time_radius + 1`
/// is ingested.
pub struct NlmPipeline<S> {
    config: NlmConfig,
    source: S,
    buffer: FrameRingBuffer,
    engine: RefineEngine,
    state: PipelineState,
    frames_ingested: u64,
    frames_emitted: u64,
    refine_passes: u64,
    total_refine_ms: f64,
}

impl<S> NlmPipeline<S>
where
    S: Iterator<Item = Result<Frame>>,
{
    pub fn new(config: NlmConfig, source: S) -> Result<Self> {
        config.validate()?;
        let buffer = FrameRingBuffer::new(&config)?;
        let engine = RefineEngine::new(&config);

        let mut pipeline = Self {
            config,
            source,
            buffer,
            engine,
            state: PipelineState::Steady,
            frames_ingested: 0,
            frames_emitted: 0,
            refine_passes: 0,
            total_refine_ms: 0.0,
        };
        pipeline.prime()?;
        Ok(pipeline)
    }

    pub fn config(&self) -> &NlmConfig {
        &self.config
    }

    pub fn buffer(&self) -> &FrameRingBuffer {
        &self.buffer
    }

    pub fn frames_ingested(&self) -> u64 {
        self.frames_ingested
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn is_finished(&self) -> bool {
        self.state == PipelineState::Finished
    }

    /// Produces the next refined frame, or `None` once the stream ended.
    ///
    /// An error leaves the pipeline finished.
    pub fn step(&mut self) -> Result<Option<Frame>> {
        let result = match self.state {
            PipelineState::Steady => self.steady_step(),
            PipelineState::Draining { .. } => self.drain_step(),
            PipelineState::Finished => return Ok(None),
        };

        if !matches!(result, Ok(Some(_))) {
            self.state = PipelineState::Finished;
        }
        result
    }

    fn time_radius(&self) -> i64 {
        self.config.time_radius as i64
    }

    fn prime(&mut self) -> Result<()> {
        let needed = self.config.priming_len();
        for _ in 0..needed {
            if !self.ingest()? {
                bail!(
                    "frame source exhausted during priming: got {} of {needed} frames",
                    self.frames_ingested
                );
            }
        }

        // Two-pass bootstrap: the first frame is refined again once its
        // future neighbours have been refined.
        let proc_pos = self.buffer.cursors().proc_pos;
        self.refine_full(proc_pos);
        for offset in 1..=self.time_radius() {
            self.refine_full(proc_pos + offset);
        }
        self.refine_full(proc_pos);

        info!(
            frames = needed,
            time_radius = self.config.time_radius,
            scale = self.config.scale,
            "pipeline primed"
        );
        Ok(())
    }

    /// Pulls one frame into the buffer. `false` at end of stream.
    fn ingest(&mut self) -> Result<bool> {
        let Some(frame) = self.source.next() else {
            return Ok(false);
        };

        let index = self.frames_ingested;
        let frame = frame.with_context(|| format!("failed to read frame {index}"))?;
        self.buffer
            .push(&frame)
            .with_context(|| format!("failed to ingest frame {index}"))?;
        self.frames_ingested += 1;
        Ok(true)
    }

    fn steady_step(&mut self) -> Result<Option<Frame>> {
        if !self.ingest()? {
            return match self.config.flush {
                FlushPolicy::Drop => {
                    debug!(
                        dropped = self.frames_ingested - self.frames_emitted,
                        "source exhausted, dropping trailing frames"
                    );
                    Ok(None)
                }
                FlushPolicy::Drain => {
                    let cursors = self.buffer.cursors();
                    debug!(
                        remaining = self.frames_ingested - self.frames_emitted,
                        "source exhausted, draining trailing frames"
                    );
                    self.state = PipelineState::Draining {
                        proc_pos: cursors.proc_pos,
                        out_pos: cursors.out_pos,
                    };
                    self.drain_step()
                }
            };
        }

        let cursors = self.buffer.cursors();
        self.refine_full(cursors.proc_pos + self.time_radius());
        self.refine_full(cursors.proc_pos);
        Ok(Some(self.emit(cursors.out_pos)))
    }

    fn drain_step(&mut self) -> Result<Option<Frame>> {
        let PipelineState::Draining { proc_pos, out_pos } = self.state else {
            return Ok(None);
        };
        let store_pos = self.buffer.store_pos();
        let (proc_pos, out_pos) = (proc_pos + 1, out_pos + 1);
        if out_pos > store_pos {
            return Ok(None);
        }
        self.state = PipelineState::Draining { proc_pos, out_pos };

        let ahead = proc_pos + self.time_radius();
        if ahead <= store_pos {
            self.refine_clamped(ahead, store_pos);
        }
        if proc_pos <= store_pos {
            self.refine_clamped(proc_pos, store_pos);
        }
        Ok(Some(self.emit(out_pos)))
    }

    fn refine_full(&mut self, position: i64) {
        let window = self.engine.full_window(position);
        self.refine(position, window);
    }

    /// Refines with the future side of the window cut at `last`.
    fn refine_clamped(&mut self, position: i64, last: i64) {
        let window = self.engine.full_window(position);
        let window = *window.start()..=(*window.end()).min(last);
        self.refine(position, window);
    }

    fn refine(&mut self, position: i64, window: RangeInclusive<i64>) {
        let started = Instant::now();
        self.engine.refine_window(&mut self.buffer, position, window);
        self.refine_passes += 1;
        self.total_refine_ms += started.elapsed().as_secs_f64() * 1000.0;
    }

    fn emit(&mut self, position: i64) -> Frame {
        self.frames_emitted += 1;
        self.buffer.at(position).to_output_frame()
    }

    fn average_refine_ms(&self) -> f64 {
        if self.refine_passes == 0 {
            0.0
        } else {
            self.total_refine_ms / self.refine_passes as f64
        }
    }
}

impl<S> Iterator for NlmPipeline<S>
where
    S: Iterator<Item = Result<Frame>>,
{
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

/// Runs a whole stream through the pipeline into `sink`; returns the number
/// of frames written.
pub fn run_to_sink<S, K>(config: NlmConfig, source: S, sink: &mut K) -> Result<u64>
where
    S: Iterator<Item = Result<Frame>>,
    K: FrameSink + ?Sized,
{
    let started = Instant::now();
    let mut pipeline = NlmPipeline::new(config, source)?;

    let mut written = 0_u64;
    let mut total_write_ms = 0.0_f64;
    while let Some(frame) = pipeline.step()? {
        let t_write = Instant::now();
        sink.write_frame(&frame)
            .with_context(|| format!("sink failed on output frame {written}"))?;
        total_write_ms += t_write.elapsed().as_secs_f64() * 1000.0;
        written += 1;
    }
    sink.finish().context("failed to finish frame sink")?;

    if written > 0 {
        info!(
            frames = written,
            ingested = pipeline.frames_ingested(),
            refine_passes = pipeline.refine_passes,
            avg_refine_ms = format!("{:.1}", pipeline.average_refine_ms()),
            avg_write_ms = format!("{:.1}", total_write_ms / written as f64),
            total_ms = format!("{:.0}", started.elapsed().as_secs_f64() * 1000.0),
            "Super-resolution stage summary"
        );
    }

    Ok(written)
}
