//! External data offset alignment.

use serde::{Deserialize, Serialize};

/// Default minimum tensor size that is offset-aligned (1 MiB).
pub const DEFAULT_ALIGN_THRESHOLD: u64 = 1024 * 1024;
/// Default allocation granularity (64 KiB, the Windows mapping granularity).
pub const DEFAULT_ALLOCATION_GRANULARITY: u64 = 64 * 1024;

/// Offset alignment policy for the external data file.
///
/// When `align_offset` is set, every external tensor of at least
/// `align_threshold` bytes starts at a multiple of `allocation_granularity`.
/// Smaller tensors are written at the current cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffsetAlignmentInfo {
    pub align_offset: bool,
    pub align_threshold: u64,
    pub allocation_granularity: u64,
}

impl Default for OffsetAlignmentInfo {
    fn default() -> Self {
        Self {
            align_offset: false,
            align_threshold: DEFAULT_ALIGN_THRESHOLD,
            allocation_granularity: DEFAULT_ALLOCATION_GRANULARITY,
        }
    }
}

impl OffsetAlignmentInfo {
    /// Align every external tensor, regardless of size, to `granularity`.
    pub const fn aligned(granularity: u64) -> Self {
        Self { align_offset: true, align_threshold: 0, allocation_granularity: granularity }
    }

    /// Whether a tensor of `len` bytes must start on a granularity boundary.
    #[inline]
    pub const fn applies_to(&self, len: u64) -> bool {
        self.align_offset && len >= self.align_threshold
    }
}

/// Round `x` up to a multiple of `g`. A zero granularity leaves `x` as is.
///
/// Returns `None` on overflow. `g` need not be a power of two.
#[inline]
pub fn round_up(x: u64, g: u64) -> Option<u64> {
    if g == 0 {
        return Some(x);
    }
    x.checked_add(g - 1).map(|v| v / g * g)
}

/// Place a tensor of `len` bytes after `current`.
///
/// Returns `(write_offset, new_current)`; the gap `current..write_offset` is
/// padding. `None` on overflow.
pub fn next_offset(current: u64, len: u64, policy: &OffsetAlignmentInfo) -> Option<(u64, u64)> {
    let write_offset = if policy.applies_to(len) {
        round_up(current, policy.allocation_granularity)?
    } else {
        current
    };
    let new_current = write_offset.checked_add(len)?;
    Some((write_offset, new_current))
}
