//! # Dummy P-State Latency Resolver
//!
//! With firmware-managed memory clock switching the driver does not know the
//! real switch latency in advance. Firmware instead honours a "dummy"
//! latency taken from a small table; the smallest entry that keeps the
//! configuration switch-capable is chosen.

use crate::error::{Error, Result};
use crate::phantom::subvp_switch_window_us;
use crate::soc::{DummyPstateEntry, SocState};
use crate::validate::{clock_change_support, sweep_levels, BwContext};

/// DRAM speed margin when matching the dummy table to a level
pub const DUMMY_DRAM_SPEED_MARGIN_MTS: f64 = 160.0;

/// Smallest dummy table index that keeps `ctx` feasible and switch-capable
///
/// The finalized pipe set is swept once. A candidate latency must be
/// absorbed by every stream outside SubVP, and with SubVP active the switch
/// plus the urgent watermark must also fit in the sub-viewport window.
pub fn find_dummy_latency_index(state: &SocState, ctx: &BwContext) -> Result<usize> {
    let base = state.latency();
    let use_mall = ctx.subvp.is_some();
    let Some(eval) = sweep_levels(state, &ctx.pipes)? else {
        log::warn!("DML: finalized pipes no longer fit any level");
        return Err(Error::DummyLatencyUnavailable);
    };
    let subvp_window_us = match &ctx.subvp {
        Some(subvp) => {
            let Some(main) = ctx.pipes.get(subvp.main_pipe) else {
                log::warn!("DML: SubVP main pipe {} missing", subvp.main_pipe);
                return Err(Error::DummyLatencyUnavailable);
            };
            Some(subvp_switch_window_us(main, &subvp.phantom))
        },
        None => None,
    };
    for (index, entry) in state.dummy_pstate_table.iter().enumerate() {
        let latency = base.with_dram_clock_change(entry.dummy_pstate_latency_us);
        let support =
            clock_change_support(&ctx.pipes, &eval, latency.dram_clock_change_us, use_mall);
        let in_window = subvp_window_us
            .map_or(true, |w| latency.dram_clock_change_us + eval.urgent_watermark_us() <= w);
        if support.is_supported() && in_window {
            log::debug!(
                "DML: dummy p-state index {} ({} us) at vlevel {}",
                index,
                entry.dummy_pstate_latency_us,
                eval.vlevel
            );
            return Ok(index);
        }
    }
    log::warn!("DML: no dummy p-state latency supports firmware memory clock switching");
    Err(Error::DummyLatencyUnavailable)
}

/// Largest dummy table index whose DRAM speed is below `dram_speed_mts`
///
/// Speeds below the first entry still use entry 0.
pub fn dummy_index_for_dram_speed(table: &[DummyPstateEntry], dram_speed_mts: f64) -> usize {
    (1..table.len())
        .rev()
        .find(|&i| dram_speed_mts + DUMMY_DRAM_SPEED_MARGIN_MTS > table[i].dram_speed_mts as f64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soc::DEFAULT_DUMMY_PSTATE_TABLE;
    use crate::testutil;
    use crate::timing::{ColorDepth, PixelEncoding, StreamDescriptor, Timing};
    use crate::validate::{internal_validate_bw, ValidateMode};

    fn uhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::UHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    #[test]
    fn test_first_entry_when_det_is_large() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[uhd(), uhd()], ValidateMode::Full).unwrap();
        assert_eq!(find_dummy_latency_index(&state, &ctx), Ok(0));
    }

    #[test]
    fn test_unavailable_when_every_latency_too_long() {
        let mut table = DEFAULT_DUMMY_PSTATE_TABLE;
        for e in &mut table {
            e.dummy_pstate_latency_us = 500.0;
        }
        let state = testutil::state().with_dummy_pstate_table(table);
        let ctx = internal_validate_bw(&state, &[uhd(), uhd()], ValidateMode::Full).unwrap();
        assert_eq!(
            find_dummy_latency_index(&state, &ctx),
            Err(Error::DummyLatencyUnavailable)
        );
    }

    #[test]
    fn test_skips_entries_until_one_fits() {
        let mut table = DEFAULT_DUMMY_PSTATE_TABLE;
        table[0].dummy_pstate_latency_us = 500.0;
        table[1].dummy_pstate_latency_us = 500.0;
        let state = testutil::state().with_dummy_pstate_table(table);
        let ctx = internal_validate_bw(&state, &[uhd(), uhd()], ValidateMode::Full).unwrap();
        assert_eq!(find_dummy_latency_index(&state, &ctx), Ok(2));
    }

    fn subvp_state(latencies: [f64; 4]) -> SocState {
        let mut table = DEFAULT_DUMMY_PSTATE_TABLE;
        for (e, l) in table.iter_mut().zip(latencies) {
            e.dummy_pstate_latency_us = l;
        }
        testutil::long_dram_latency_state(800.0).with_dummy_pstate_table(table)
    }

    #[test]
    fn test_subvp_window_bounds_latency() {
        let state = subvp_state([1_000_000.0; 4]);
        let ctx = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        let subvp = ctx.subvp.unwrap();
        let window = subvp_switch_window_us(&ctx.pipes[subvp.main_pipe], &subvp.phantom);
        assert!(window >= 800.0 && window < 1_000_000.0);
        assert_eq!(
            find_dummy_latency_index(&state, &ctx),
            Err(Error::DummyLatencyUnavailable)
        );
    }

    #[test]
    fn test_subvp_skips_entries_beyond_window() {
        let state = subvp_state([5_000.0, 2_000.0, 20.0, 24.0]);
        let ctx = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        assert!(ctx.subvp.is_some());
        assert_eq!(find_dummy_latency_index(&state, &ctx), Ok(2));
    }

    #[test]
    fn test_index_for_dram_speed() {
        let t = DEFAULT_DUMMY_PSTATE_TABLE;
        assert_eq!(dummy_index_for_dram_speed(&t, 1552.0), 0);
        assert_eq!(dummy_index_for_dram_speed(&t, 7296.0), 0);
        assert_eq!(dummy_index_for_dram_speed(&t, 10900.0), 1);
        assert_eq!(dummy_index_for_dram_speed(&t, 12352.0), 1);
        assert_eq!(dummy_index_for_dram_speed(&t, 20000.0), 2);
        assert_eq!(dummy_index_for_dram_speed(&t, 30000.0), 3);
    }
}
