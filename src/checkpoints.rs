use crate::error::ConfigurationError;

/// Fixed sampling grid `0, dt, 2*dt, ... < horizon`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointGrid {
    interval: f64,
    len: usize,
}

impl CheckpointGrid {
    pub fn new(horizon: f64, interval: f64) -> Result<Self, ConfigurationError> {
        if !(horizon > 0.0) || !horizon.is_finite() {
            return Err(ConfigurationError::InvalidParameter { name: "horizon", value: horizon });
        }
        if !(interval > 0.0) || !interval.is_finite() {
            return Err(ConfigurationError::InvalidParameter { name: "sampling_interval", value: interval });
        }
        let len = (horizon / interval).ceil() as usize;
        Ok(Self { interval, len })
    }

    /// Number of checkpoints, including t = 0.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Time of checkpoint `index`. Computed from the index so error does not accumulate.
    #[inline(always)]
    pub fn time(&self, index: usize) -> f64 {
        index as f64 * self.interval
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |i| self.time(i))
    }
}
