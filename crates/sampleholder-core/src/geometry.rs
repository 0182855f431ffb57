//! Sample geometry
//!
//! Circular arithmetic relating absolute motor steps to sample slots.
//! One revolution is `spr` motor steps and holds `sample_count` evenly
//! spaced samples. Sample `k` sits nominally at step `k * spr / sample_count`
//! and owns the sector of width `spr / sample_count` centred on it.

use crate::error::ControllerError;
use serde::{Deserialize, Serialize};

/// Geometry of one sample holder revolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleGeometry {
    sample_count: u32,
    spr: u32,
}

impl SampleGeometry {
    /// Create a geometry, rejecting zero sample count or zero steps per revolution
    pub fn new(sample_count: u32, spr: u32) -> Result<Self, ControllerError> {
        if sample_count == 0 {
            return Err(ControllerError::InvalidConfiguration {
                reason: "sample count must be > 0".to_string(),
            });
        }
        if spr == 0 {
            return Err(ControllerError::InvalidConfiguration {
                reason: "steps per revolution must be > 0".to_string(),
            });
        }
        Ok(Self { sample_count, spr })
    }

    /// Number of sample slots per revolution
    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Motor steps per revolution
    pub fn spr(&self) -> u32 {
        self.spr
    }

    /// Same sample count with a different steps-per-revolution value
    pub fn with_spr(&self, spr: u32) -> Result<Self, ControllerError> {
        Self::new(self.sample_count, spr)
    }

    /// True when every sample lands on a whole motor step
    pub fn is_aligned(&self) -> bool {
        self.spr % self.sample_count == 0
    }

    /// Wrap any step count into `[0, spr)`
    pub fn normalize(&self, position: i64) -> u32 {
        // rem_euclid of a positive u32 modulus always fits in u32
        position.rem_euclid(i64::from(self.spr)) as u32
    }

    /// Position after moving `steps` from `position`
    pub fn advance(&self, position: u32, steps: i64) -> u32 {
        // both terms are below 2^32 once wrapped
        self.normalize(i64::from(position) + i64::from(self.normalize(steps)))
    }

    /// Sample whose sector contains `position`
    ///
    /// Computes `floor((position + width / 2) / width) mod sample_count`
    /// with `width = spr / sample_count`, in exact integer arithmetic.
    pub fn sample_at(&self, position: i64) -> u32 {
        let p = u64::from(self.normalize(position));
        let n = u64::from(self.sample_count);
        let spr = u64::from(self.spr);
        ((2 * p * n + spr) / (2 * spr) % n) as u32
    }

    /// Motor steps covering `samples` sample widths, rounded to the nearest step
    ///
    /// `None` when the intermediate arithmetic would overflow an `i64`.
    pub fn steps_for_samples(&self, samples: i64) -> Option<i64> {
        let n = i64::from(self.sample_count);
        let scaled = samples.checked_mul(i64::from(self.spr))?;
        // truncating division of (2s ± n) / 2n rounds half away from zero
        let numerator = scaled.checked_mul(2)?.checked_add(scaled.signum() * n)?;
        Some(numerator / (2 * n))
    }

    /// Signed sample distance from `from` to `to` along the shorter way round
    ///
    /// Positive is forward. A tie on an even holder resolves forward.
    pub fn shortest_path(&self, from: u32, to: i64) -> i64 {
        let n = i64::from(self.sample_count);
        let forward = (to.rem_euclid(n) - i64::from(from).rem_euclid(n)).rem_euclid(n);
        if 2 * forward > n {
            forward - n
        } else {
            forward
        }
    }

    /// Largest useful magnitude for a raw move or home trim, half a revolution rounded up
    pub fn trim_limit(&self) -> u32 {
        self.spr.div_ceil(2)
    }
}

/// Next occupied sample `step` hops away from `current`
///
/// `occupied` is treated as a set. When `current` is itself occupied the hop
/// count is taken around the occupied set. Otherwise the first hop lands on
/// the nearest occupied sample in the direction of travel.
///
/// Returns `None` when nothing is occupied, or when `step` is zero and
/// `current` is not occupied.
pub fn next_occupied(occupied: &[u32], current: u32, step: i64) -> Option<u32> {
    let mut slots = occupied.to_vec();
    slots.sort_unstable();
    slots.dedup();
    if slots.is_empty() {
        return None;
    }

    let len = slots.len() as i64;
    let (index, remaining) = match slots.binary_search(&current) {
        Ok(index) => (index as i64, step),
        Err(_) if step == 0 => return None,
        Err(insert_at) => {
            // insert_at is the first occupied slot after current
            let sign = step.signum();
            let first = if sign > 0 {
                insert_at as i64
            } else {
                insert_at as i64 - 1
            };
            (first, step - sign)
        }
    };

    let target = (index + remaining.rem_euclid(len)).rem_euclid(len) as usize;
    slots.get(target).copied()
}
