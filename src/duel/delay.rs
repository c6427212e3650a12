//! Grace period selection.

use rand::Rng;

/// Source of grace period lengths, in protocol units.
pub trait GraceDelay: Send + Sync + std::fmt::Debug {
    /// Picks an integer uniformly in `[min, max]`.
    fn pick(&self, min: u64, max: u64) -> u64;
}

/// Uniform random grace period from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGrace;

impl GraceDelay for RandomGrace {
    fn pick(&self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        rand::rng().random_range(min..=max)
    }
}

/// Always the same grace period, clamped into `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct FixedGrace(pub u64);

impl GraceDelay for FixedGrace {
    fn pick(&self, min: u64, max: u64) -> u64 {
        self.0.max(min).min(max.max(min))
    }
}
