//! # Display Bandwidth Manager
//!
//! Entry point for the display driver. Holds the published [`SocState`] and
//! runs validation against a snapshot of it.
//!
//! ```text
//!   validate ──► read lock ──► clone Arc ──► unlock ──► validate lock-free
//!
//!   update   ──► build new state off-lock ──► write lock ──► swap Arc
//! ```
//!
//! A validation always sees one complete state, either the one before or
//! the one after a concurrent update.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::RwLock;

use crate::bbox::{update_bw_bounding_box, ClkBwParams};
use crate::error::Result;
use crate::soc::SocState;
use crate::timing::StreamDescriptor;
use crate::validate::{internal_validate_bw, ValidateMode};
use crate::watermark::{calculate_wm_and_dlg, ValidationResult};

/// Outcome of a fast validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastValidation {
    /// Lowest feasible level
    pub vlevel: usize,
    /// Pipes the configuration occupies
    pub pipe_count: usize,
}

/// Manager statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerStats {
    /// Full validations run
    pub full_validations: u64,
    /// Fast validations run
    pub fast_validations: u64,
    /// Validations that failed
    pub rejections: u64,
    /// Bounding-box rebuilds published
    pub updates: u64,
}

/// Shared bandwidth validation state
#[derive(Debug)]
pub struct DisplayBandwidthManager {
    state: RwLock<Arc<SocState>>,
    full_validations: AtomicU64,
    fast_validations: AtomicU64,
    rejections: AtomicU64,
    updates: AtomicU64,
}

impl DisplayBandwidthManager {
    /// Manager publishing `state`
    pub fn new(state: SocState) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
            full_validations: AtomicU64::new(0),
            fast_validations: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            updates: AtomicU64::new(0),
        }
    }

    /// Current state
    #[inline]
    pub fn snapshot(&self) -> Arc<SocState> {
        self.state.read().clone()
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Full validation: level, SubVP, watermarks, DLG and clocks
    pub fn validate(&self, streams: &[StreamDescriptor]) -> Result<ValidationResult> {
        self.full_validations.fetch_add(1, Ordering::Relaxed);
        let state = self.snapshot();
        let result = internal_validate_bw(&state, streams, ValidateMode::Full)
            .and_then(|ctx| calculate_wm_and_dlg(&state, &ctx));
        self.track(result)
    }

    /// Feasibility only
    pub fn fast_validate(&self, streams: &[StreamDescriptor]) -> Result<FastValidation> {
        self.fast_validations.fetch_add(1, Ordering::Relaxed);
        let state = self.snapshot();
        let result =
            internal_validate_bw(&state, streams, ValidateMode::Fast).map(|ctx| FastValidation {
                vlevel: ctx.vlevel,
                pipe_count: ctx.pipe_count(),
            });
        self.track(result)
    }

    /// Rebuild the bounding box from a firmware report and publish it
    ///
    /// Returns the new generation. On error the published state is kept.
    pub fn update_bounding_box(&self, params: &ClkBwParams) -> Result<u64> {
        let current = self.snapshot();
        let next = update_bw_bounding_box(&current, params)?;
        let mut state = self.state.write();
        let generation = state.generation.wrapping_add(1);
        *state = Arc::new(SocState { generation, ..next });
        drop(state);
        self.updates.fetch_add(1, Ordering::Relaxed);
        Ok(generation)
    }

    /// Counters since creation
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            full_validations: self.full_validations.load(Ordering::Relaxed),
            fast_validations: self.fast_validations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
        }
    }
}

impl Default for DisplayBandwidthManager {
    fn default() -> Self {
        Self::new(SocState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TableError};
    use crate::testutil;
    use crate::timing::{ColorDepth, PixelEncoding, Timing};

    fn fhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::FHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    fn uhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::UHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    #[test]
    fn test_empty_table_rejected_by_both_paths() {
        let mgr = DisplayBandwidthManager::default();
        let expected = Error::InvalidTable(TableError::Empty);
        assert_eq!(mgr.validate(&[fhd()]).unwrap_err(), expected);
        assert_eq!(mgr.fast_validate(&[fhd()]).unwrap_err(), expected);
        assert_eq!(mgr.stats().rejections, 2);
    }

    #[test]
    fn test_update_then_validate() {
        let mgr = DisplayBandwidthManager::default();
        assert_eq!(mgr.update_bounding_box(&testutil::clk_bw_params()), Ok(1));
        assert_eq!(mgr.snapshot().table.len(), 10);

        let fast = mgr.fast_validate(&[uhd()]).unwrap();
        assert_eq!(fast.pipe_count, 2);
        let full = mgr.validate(&[uhd()]).unwrap();
        assert_eq!(full.vlevel, fast.vlevel);
        assert_eq!(full.pipes.len(), 2);
        assert_eq!(full.dlg.len(), 2);

        let stats = mgr.stats();
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.full_validations, 1);
        assert_eq!(stats.fast_validations, 1);
        assert_eq!(stats.rejections, 0);
    }

    #[test]
    fn test_failed_update_keeps_state() {
        let mgr = DisplayBandwidthManager::new(testutil::state());
        let before = mgr.snapshot();
        let mut params = testutil::clk_bw_params();
        params.dpm.memclk = crate::dpm::DpmClockLevels::from_slice(&[772, 97]).unwrap();
        assert!(mgr.update_bounding_box(&params).is_err());
        assert!(Arc::ptr_eq(&before, &mgr.snapshot()));
        assert!(mgr.fast_validate(&[fhd()]).is_ok());
    }

    #[test]
    fn test_snapshot_outlives_update() {
        let mgr = DisplayBandwidthManager::default();
        let old = mgr.snapshot();
        mgr.update_bounding_box(&testutil::clk_bw_params()).unwrap();
        assert!(old.table.is_empty());
        assert_eq!(mgr.snapshot().generation, old.generation + 1);
    }

    #[test]
    fn test_fast_is_subset_of_full() {
        let mgr = DisplayBandwidthManager::new(testutil::state());
        for streams in [&[fhd()][..], &[uhd()][..], &[uhd(), fhd()][..]] {
            let fast = mgr.fast_validate(streams).unwrap();
            let full = mgr.validate(streams).unwrap();
            assert_eq!(fast.vlevel, full.vlevel);
        }
    }
}
