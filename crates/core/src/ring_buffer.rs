//! Cyclic storage of padded low- and high-resolution frames.
//!
//! Frames are addressed by a logical position that only ever grows; the slot
//! holding position `p` is `p mod capacity`. The buffer always retains the
//! `capacity` most recent positions and overwrites older slots in place.

use anyhow::{bail, Context, Result};
use tracing::trace;

use crate::config::NlmConfig;
use crate::nlm::patch::{pad, BorderPolicy, PaddedFrame};
use crate::resize::{upscale, ResizeAlgorithm};
use crate::types::Frame;

/// Logical positions of the pipeline stages.
///
/// `proc_pos` trails `store_pos` by `2 * time_radius` and `out_pos` trails
/// `proc_pos` by `time_radius + 1`, which makes `out_pos` the oldest retained
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub store_pos: i64,
    pub proc_pos: i64,
    pub out_pos: i64,
}

impl Cursors {
    pub fn new(time_radius: usize) -> Self {
        let store_pos = -1;
        let proc_pos = store_pos - 2 * time_radius as i64;
        Self {
            store_pos,
            proc_pos,
            out_pos: proc_pos - time_radius as i64 - 1,
        }
    }

    fn advance(&mut self) {
        self.store_pos += 1;
        self.proc_pos += 1;
        self.out_pos += 1;
    }
}

/// One ingested frame at both resolutions.
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    position: i64,
    low_res: PaddedFrame,
    high_res: PaddedFrame,
}

impl BufferedFrame {
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn low_res(&self) -> &PaddedFrame {
        &self.low_res
    }

    pub fn high_res(&self) -> &PaddedFrame {
        &self.high_res
    }

    pub fn high_res_mut(&mut self) -> &mut PaddedFrame {
        &mut self.high_res
    }

    /// Copy of the high-resolution frame without its border.
    pub fn to_output_frame(&self) -> Frame {
        Frame::from_array(self.high_res.interior())
    }
}

pub struct FrameRingBuffer {
    slots: Vec<BufferedFrame>,
    capacity: usize,
    cursors: Cursors,
    scale: usize,
    low_res_border: usize,
    high_res_border: usize,
    border_policy: BorderPolicy,
    upscale: ResizeAlgorithm,
    frame_size: Option<(u32, u32)>,
}

impl FrameRingBuffer {
    pub fn new(config: &NlmConfig) -> Result<Self> {
        config.validate().context("invalid frame buffer configuration")?;

        let high_res_border = config.high_res_border();
        assert!(
            high_res_border >= config.scale * config.search_area_radius + config.patch_size / 2,
            "high-res border {high_res_border} does not cover the search area"
        );

        let capacity = config.ring_capacity();
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursors: Cursors::new(config.time_radius),
            scale: config.scale,
            low_res_border: config.low_res_border(),
            high_res_border,
            border_policy: config.border,
            upscale: config.upscale,
            frame_size: None,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cursors(&self) -> Cursors {
        self.cursors
    }

    pub fn store_pos(&self) -> i64 {
        self.cursors.store_pos
    }

    pub fn low_res_border(&self) -> usize {
        self.low_res_border
    }

    pub fn high_res_border(&self) -> usize {
        self.high_res_border
    }

    /// `(width, height)` of the ingested frames, once the first one arrived.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame_size
    }

    /// Oldest position still retained.
    pub fn oldest_pos(&self) -> i64 {
        (self.cursors.store_pos - self.capacity as i64 + 1).max(0)
    }

    pub fn contains(&self, position: i64) -> bool {
        position >= self.oldest_pos() && position <= self.cursors.store_pos
    }

    /// Validates, upscales and stores `frame`; returns its position.
    pub fn push(&mut self, frame: &Frame) -> Result<i64> {
        let low_res = frame.to_array().context("rejected malformed input frame")?;

        if let Some((width, height)) = self.frame_size {
            if (frame.width, frame.height) != (width, height) {
                bail!(
                    "frame size changed mid-stream: expected {width}x{height}, got {}x{}",
                    frame.width,
                    frame.height
                );
            }
        }

        let high_res = upscale(low_res.view(), self.scale, self.upscale);

        self.cursors.advance();
        let position = self.cursors.store_pos;
        let slot = self.slot_index(position);

        if slot < self.slots.len() {
            let stored = &mut self.slots[slot];
            stored.position = position;
            stored.low_res.fill_from(low_res.view());
            stored.high_res.fill_from(high_res.view());
        } else {
            self.slots.push(BufferedFrame {
                position,
                low_res: pad(low_res.view(), self.low_res_border, self.border_policy),
                high_res: pad(high_res.view(), self.high_res_border, self.border_policy),
            });
        }
        self.frame_size = Some((frame.width, frame.height));

        trace!(position, slot, "stored frame");
        Ok(position)
    }

    pub fn get(&self, position: i64) -> Option<&BufferedFrame> {
        if !self.contains(position) {
            return None;
        }
        self.slots
            .get(self.slot_index(position))
            .filter(|stored| stored.position == position)
    }

    /// Frame at `position`.
    ///
    /// # Panics
    ///
    /// When `position` is outside the retained window; callers derive
    /// positions from the cursors, so this is a sequencing bug.
    pub fn at(&self, position: i64) -> &BufferedFrame {
        match self.get(position) {
            Some(stored) => stored,
            None => panic!(
                "position {position} is outside the retained window [{}, {}]",
                self.oldest_pos(),
                self.cursors.store_pos
            ),
        }
    }

    /// Mutable frame at `position`; panics like [`FrameRingBuffer::at`].
    pub fn at_mut(&mut self, position: i64) -> &mut BufferedFrame {
        if !self.contains(position) {
            panic!(
                "position {position} is outside the retained window [{}, {}]",
                self.oldest_pos(),
                self.cursors.store_pos
            );
        }
        let slot = self.slot_index(position);
        let stored = &mut self.slots[slot];
        assert_eq!(stored.position, position, "slot {slot} holds a stale frame");
        stored
    }

    fn slot_index(&self, position: i64) -> usize {
        position.rem_euclid(self.capacity as i64) as usize
    }
}
