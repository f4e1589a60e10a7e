//! ABOUTME: Fixed-capacity lookback ring of frames and their edge maps
//! ABOUTME: Keeps running edge totals so window scoring is one pass over pixels

use mc_core::{Error, Result};
use mc_vision::{EdgeAccumulator, EdgeMap, Frame, MotionEstimator, MotionScore};

/// A frame and the edge map derived from it, stored in one slot
#[derive(Debug, Clone)]
pub struct BufferedFrame {
    pub frame: Frame,
    pub edges: EdgeMap,
}

/// Ring buffer holding the most recent frames, oldest evicted first
#[derive(Debug)]
pub struct RollingBuffer {
    slots: Vec<Option<BufferedFrame>>,
    /// Slot of the oldest entry
    head: usize,
    len: usize,
    totals: EdgeAccumulator,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config(
                "Rolling buffer capacity must be at least one frame".to_string(),
            ));
        }
        Ok(Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            totals: EdgeAccumulator::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append a frame, returning the entry evicted to make room
    pub fn push(&mut self, frame: Frame, edges: EdgeMap) -> Result<Option<BufferedFrame>> {
        if (edges.width(), edges.height()) != frame.dimensions() {
            return Err(Error::Validation(format!(
                "Edge map is {}x{} but frame is {}x{}",
                edges.width(),
                edges.height(),
                frame.width(),
                frame.height()
            )));
        }
        if let Some(latest) = self.latest() {
            if latest.frame.dimensions() != frame.dimensions() {
                return Err(Error::Validation(format!(
                    "Frame is {}x{} but the buffer holds {}x{} frames",
                    frame.width(),
                    frame.height(),
                    latest.frame.width(),
                    latest.frame.height()
                )));
            }
        }

        let evicted = if self.is_full() {
            self.evict_oldest()?
        } else {
            None
        };

        self.totals.add(&edges)?;
        let slot = (self.head + self.len) % self.capacity();
        self.slots[slot] = Some(BufferedFrame { frame, edges });
        self.len += 1;

        Ok(evicted)
    }

    /// Keep only the newest `limit` entries; returns how many were dropped
    pub fn trim(&mut self, limit: usize) -> Result<usize> {
        let mut dropped = 0;
        while self.len > limit {
            self.evict_oldest()?;
            dropped += 1;
        }
        Ok(dropped)
    }

    fn evict_oldest(&mut self) -> Result<Option<BufferedFrame>> {
        if self.len == 0 {
            return Ok(None);
        }
        let entry = self.slots[self.head].take();
        if let Some(entry) = &entry {
            self.totals.remove(&entry.edges)?;
        }
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Ok(entry)
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BufferedFrame> + '_ {
        let capacity = self.capacity();
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % capacity].as_ref())
    }

    /// Frames from oldest to newest
    pub fn frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.iter().map(|entry| &entry.frame)
    }

    /// Edge maps from oldest to newest
    pub fn edge_maps(&self) -> impl Iterator<Item = &EdgeMap> + '_ {
        self.iter().map(|entry| &entry.edges)
    }

    /// The newest `count` edge maps, newest first
    pub fn recent_edges(&self, count: usize) -> impl Iterator<Item = &EdgeMap> + '_ {
        self.iter().rev().take(count).map(|entry| &entry.edges)
    }

    pub fn latest(&self) -> Option<&BufferedFrame> {
        self.iter().next_back()
    }

    /// Per-pixel edge counts over the current contents
    pub fn totals(&self) -> &EdgeAccumulator {
        &self.totals
    }

    /// Score the current window
    pub fn score(&self, estimator: &MotionEstimator) -> Result<MotionScore> {
        estimator.score(
            &self.totals,
            self.recent_edges(estimator.recent_frames()),
        )
    }
}
