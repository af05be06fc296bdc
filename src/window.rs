//! Fixed-capacity sample window with O(1) amortized mean bookkeeping.
//!
//! Used by the feature-extraction filter to hold the trailing reaction
//! window of raw conductance samples. Pushing past capacity evicts the
//! oldest sample before the aggregates are updated, so the buffer never
//! holds more than `capacity` elements.

use std::collections::VecDeque;

/// FIFO buffer of raw scalar samples with an incrementally maintained
/// cumulative mean.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    mean: f64,
}

impl SampleWindow {
    /// Create a window holding at most `capacity` samples.
    ///
    /// `capacity` must be positive; the feature filter validates its
    /// configuration before constructing one.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            mean: 0.0,
        }
    }

    /// Push a sample, evicting the oldest one first when the window is
    /// already at capacity.
    ///
    /// While the window is growing the mean follows the standard
    /// incremental update `mean += (x - mean) / len`. Once full, the
    /// eviction-adjusted update `mean += (x - x_old) / len` replaces the
    /// departed sample's contribution in one step.
    pub fn push(&mut self, x: f64) {
        if self.samples.len() == self.capacity {
            // Eviction path: len stays at capacity across the swap.
            let x_old = self.samples.pop_front().unwrap_or(0.0);
            self.samples.push_back(x);
            self.mean += (x - x_old) / self.samples.len() as f64;
        } else {
            self.samples.push_back(x);
            self.mean += (x - self.mean) / self.samples.len() as f64;
        }
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the window has reached its configured capacity.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// The incrementally maintained cumulative mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the current contents against the
    /// cumulative mean.
    pub fn population_std(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sq_sum: f64 = self
            .samples
            .iter()
            .map(|x| (x - self.mean) * (x - self.mean))
            .sum();
        (sq_sum / self.samples.len() as f64).sqrt()
    }

    /// Snapshot of the contents in insertion order.
    pub fn as_slices(&self) -> (&[f64], &[f64]) {
        self.samples.as_slices()
    }

    /// Copy the contents into a contiguous buffer in insertion order.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    /// Discard all samples and reset the aggregates.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.mean = 0.0;
    }
}
