//! Depth budget for recursive generation.

use std::fmt;

use crate::random::RandomSource;

/// Remaining depth for a production call.
///
/// `depth` is the soft budget that shapes output: it drifts down by one or
/// two per level and occasionally back up, so there is no rigid ceiling.
/// `fuel` is the hard bound: it drops by at least one on every descent, and
/// the budget is exhausted as soon as either reaches zero. A chain of nested
/// descents from `Budget::new(d)` is therefore at most `fuel` long, whatever
/// the random source answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    depth: i32,
    fuel: u32,
}

impl Budget {
    /// A fresh budget of `depth` levels.
    pub fn new(depth: u32) -> Self {
        let depth = depth.min(1 << 16);
        Self {
            depth: depth as i32,
            fuel: depth * 3 / 2 + 2,
        }
    }

    /// A budget that only admits leaf productions.
    pub fn exhausted() -> Self {
        Self { depth: 0, fuel: 0 }
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn fuel(&self) -> u32 {
        self.fuel
    }

    /// Whether only terminal productions may be chosen.
    pub fn is_exhausted(&self) -> bool {
        self.depth <= 0 || self.fuel == 0
    }

    /// The budget for a child: depth moves by -2, -1 or +1 (mostly -1),
    /// fuel drops by one.
    pub fn descend(self, rng: &mut dyn RandomSource) -> Self {
        let roll = rng.float();
        let jitter = if roll < 0.125 {
            -2
        } else if roll < 0.875 {
            -1
        } else {
            1
        };
        Self {
            depth: self.depth.saturating_add(jitter),
            fuel: self.fuel.saturating_sub(1),
        }
    }

    /// A sharp cut of `levels`, used where a production embeds a body that
    /// will itself recurse (callbacks, eval, function bodies).
    pub fn descend_by(self, levels: u32) -> Self {
        let levels = levels.max(1);
        Self {
            depth: self.depth.saturating_sub(levels.min(i32::MAX as u32) as i32),
            fuel: self.fuel.saturating_sub(levels),
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "depth={} fuel={}", self.depth, self.fuel)
    }
}
