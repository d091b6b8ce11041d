//! Trajectories: 64-bit equivalence classes over runs, combining traced
//! user observations with classified edge-counter contents.

use photesthesis_value::StableHasher;
use std::fmt;

/// The 64-bit identifier of a run's equivalence class. Two runs with equal
/// trajectories exercised the system the same way as far as the engine can
/// observe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Trajectory(u64);

impl Trajectory {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(v: u64) -> Self {
        Trajectory(v)
    }
}

impl fmt::Debug for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trajectory({:016x})", self.0)
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The AFL counter-simplification map: raw hit counts collapse into coarse
/// buckets so loop-iteration jitter does not split trajectories.
/// `0→0, 1→1, 2→2, 3→4, 4..7→8, 8..15→16, 16..31→32, 32..127→64, 128..→128`.
const fn counter_classes() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 1;
    while i < 256 {
        table[i] = match i {
            1 => 1,
            2 => 2,
            3 => 4,
            4..=7 => 8,
            8..=15 => 16,
            16..=31 => 32,
            32..=127 => 64,
            _ => 128,
        };
        i += 1;
    }
    table
}

pub(crate) static COUNTER_CLASSES: [u8; 256] = counter_classes();

/// Map every counter byte through the bucket table, in place.
pub(crate) fn classify(buf: &mut [u8]) {
    for byte in buf {
        *byte = COUNTER_CLASSES[*byte as usize];
    }
}

/// Combine the path and user trajectory halves into the overall trajectory:
/// `hash(path || user)` over little-endian u64s.
pub(crate) fn combine(path: u64, user: u64) -> Trajectory {
    let mut hasher = StableHasher::new();
    hasher.add_u64(path);
    hasher.add_u64(user);
    Trajectory(hasher.finish())
}
