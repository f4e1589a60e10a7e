//! ABOUTME: Rolling-baseline motion scoring over a window of edge maps
//! ABOUTME: Compares the newest frames' edge density with the whole-window mean

use crate::EdgeMap;
use mc_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of newest frames compared against the baseline by default
pub const DEFAULT_RECENT_FRAMES: usize = 3;

/// Added to the denominator so near-empty recent maps do not blow up the score
const STABILIZER: f64 = 1.0;

/// Normalized divergence between recent edge density and the rolling baseline
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct MotionScore(f64);

impl MotionScore {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether this score counts as motion for `threshold`
    pub fn exceeds(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl fmt::Display for MotionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Per-pixel edge counts over a set of edge maps
///
/// Maintained incrementally by the rolling buffer so that a score needs one
/// pass over the pixels instead of one pass per buffered frame.
#[derive(Debug, Clone, Default)]
pub struct EdgeAccumulator {
    counts: Vec<u32>,
    frames: usize,
}

impl EdgeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an accumulator over every map in `maps`
    pub fn from_maps<'a, I>(maps: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a EdgeMap>,
    {
        let mut acc = Self::new();
        for map in maps {
            acc.add(map)?;
        }
        Ok(acc)
    }

    /// Count a map's edges in
    pub fn add(&mut self, map: &EdgeMap) -> Result<()> {
        if self.frames == 0 {
            self.counts = vec![0; map.len()];
        } else {
            self.check_size(map)?;
        }

        for (count, &pixel) in self.counts.iter_mut().zip(map.pixels()) {
            if pixel != 0 {
                *count += 1;
            }
        }
        self.frames += 1;
        Ok(())
    }

    /// Count a previously added map's edges out
    pub fn remove(&mut self, map: &EdgeMap) -> Result<()> {
        if self.frames == 0 {
            return Err(Error::Validation(
                "Cannot remove an edge map from an empty accumulator".to_string(),
            ));
        }
        self.check_size(map)?;

        for (count, &pixel) in self.counts.iter_mut().zip(map.pixels()) {
            if pixel != 0 {
                *count = count.saturating_sub(1);
            }
        }
        self.frames -= 1;
        if self.frames == 0 {
            self.counts.clear();
        }
        Ok(())
    }

    /// Number of maps counted
    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    /// Edge count per pixel
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    fn check_size(&self, map: &EdgeMap) -> Result<()> {
        if map.len() != self.counts.len() {
            return Err(Error::Validation(format!(
                "Edge map has {} pixels but the window holds {}-pixel maps",
                map.len(),
                self.counts.len()
            )));
        }
        Ok(())
    }
}

/// Scores a window of edge maps against its own baseline
#[derive(Debug, Clone)]
pub struct MotionEstimator {
    recent_frames: usize,
}

impl Default for MotionEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_FRAMES)
    }
}

impl MotionEstimator {
    /// Create an estimator comparing the newest `recent_frames` maps (at least one)
    pub fn new(recent_frames: usize) -> Self {
        Self {
            recent_frames: recent_frames.max(1),
        }
    }

    pub fn recent_frames(&self) -> usize {
        self.recent_frames
    }

    /// Score a window given its accumulated totals and its newest maps
    ///
    /// `recent` should yield the newest maps of the window; at most
    /// `recent_frames` of them are used. The score is
    /// `sum(|baseline - recent|) / (sum(recent) + 1)` over edge densities in [0, 1].
    pub fn score<'a, I>(&self, window: &EdgeAccumulator, recent: I) -> Result<MotionScore>
    where
        I: IntoIterator<Item = &'a EdgeMap>,
    {
        if window.is_empty() {
            return Err(Error::Validation("Motion window is empty".to_string()));
        }

        let mut recent_counts = vec![0u32; window.counts().len()];
        let mut taken = 0usize;
        for map in recent.into_iter().take(self.recent_frames) {
            window.check_size(map)?;
            for (count, &pixel) in recent_counts.iter_mut().zip(map.pixels()) {
                if pixel != 0 {
                    *count += 1;
                }
            }
            taken += 1;
        }

        if taken == 0 {
            return Err(Error::Validation(
                "No recent edge maps supplied for scoring".to_string(),
            ));
        }

        let n = window.len() as f64;
        let k = taken as f64;
        let mut divergence = 0.0f64;
        let mut recent_mass = 0.0f64;
        for (&total, &recent) in window.counts().iter().zip(recent_counts.iter()) {
            let baseline = total as f64 / n;
            let current = recent as f64 / k;
            divergence += (baseline - current).abs();
            recent_mass += current;
        }

        Ok(MotionScore(divergence / (recent_mass + STABILIZER)))
    }

    /// Score a window held as a slice, oldest first
    pub fn score_window(&self, window: &[EdgeMap]) -> Result<MotionScore> {
        let totals = EdgeAccumulator::from_maps(window)?;
        self.score(&totals, window.iter().rev())
    }
}
