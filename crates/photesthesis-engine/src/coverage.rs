//! The edge-counter coverage source.
//!
//! Instrumented builds call [`__sanitizer_cov_8bit_counters_init`] once at
//! startup to register the process-global 8-bit counter region. The engine
//! only zeroes and reads the region while no run is in progress; the
//! instrumentation runtime owns its population.

use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

static COUNTERS_START: AtomicPtr<u8> = AtomicPtr::new(std::ptr::null_mut());
static COUNTERS_LEN: AtomicUsize = AtomicUsize::new(0);

/// Entry point for the sanitizer-coverage runtime: registers the inline
/// 8-bit counter region `[start, stop)`.
///
/// # Safety
/// The caller must pass a valid region that outlives the process, per the
/// sanitizer-coverage contract.
#[no_mangle]
pub unsafe extern "C" fn __sanitizer_cov_8bit_counters_init(start: *mut u8, stop: *mut u8) {
    if start.is_null() || stop as usize <= start as usize {
        return;
    }
    COUNTERS_START.store(start, Ordering::SeqCst);
    COUNTERS_LEN.store(stop as usize - start as usize, Ordering::SeqCst);
}

/// A source of edge counters the engine can zero before a run and read
/// after it.
pub trait EdgeCounters {
    /// Number of counters; 0 means no instrumentation is present.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero all counters.
    fn zero(&mut self);

    /// Replace `buf` with the counter bytes observed since the last zero.
    fn read(&self, buf: &mut Vec<u8>);
}

/// No instrumentation: the path-trajectory contribution is always zero.
pub struct NoCoverage;

impl EdgeCounters for NoCoverage {
    fn len(&self) -> usize {
        0
    }

    fn zero(&mut self) {}

    fn read(&self, buf: &mut Vec<u8>) {
        buf.clear();
    }
}

/// The process-global sancov counter region, when one has been registered.
/// Behaves like [`NoCoverage`] in uninstrumented builds.
#[derive(Default)]
pub struct SancovCounters;

impl SancovCounters {
    fn region(&self) -> Option<(*mut u8, usize)> {
        let start = COUNTERS_START.load(Ordering::SeqCst);
        let len = COUNTERS_LEN.load(Ordering::SeqCst);
        if start.is_null() || len == 0 {
            None
        } else {
            Some((start, len))
        }
    }
}

impl EdgeCounters for SancovCounters {
    fn len(&self) -> usize {
        self.region().map_or(0, |(_, len)| len)
    }

    fn zero(&mut self) {
        if let Some((start, len)) = self.region() {
            // SAFETY: the registered region is valid for the life of the
            // process and no run is mutating it while we hold the engine.
            unsafe { std::ptr::write_bytes(start, 0, len) };
        }
    }

    fn read(&self, buf: &mut Vec<u8>) {
        buf.clear();
        if let Some((start, len)) = self.region() {
            // SAFETY: as above.
            let slice = unsafe { std::slice::from_raw_parts(start, len) };
            buf.extend_from_slice(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_coverage_is_empty() {
        let mut cov = NoCoverage;
        assert_eq!(cov.len(), 0);
        cov.zero();
        let mut buf = vec![1, 2, 3];
        cov.read(&mut buf);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_sancov_region_registration() {
        // Keep the buffer alive for the whole process: the registration
        // contract assumes a static region.
        let region: &'static mut [u8] = Box::leak(vec![0u8; 16].into_boxed_slice());
        let start = region.as_mut_ptr();
        unsafe { __sanitizer_cov_8bit_counters_init(start, start.add(16)) };

        let mut cov = SancovCounters;
        assert_eq!(cov.len(), 16);

        unsafe { *start.add(3) = 9 };
        let mut buf = Vec::new();
        cov.read(&mut buf);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf[3], 9);

        cov.zero();
        cov.read(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
