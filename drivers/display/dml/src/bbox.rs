//! # Bounding-Box Updater
//!
//! Rebuilds the SoC state whenever power-management firmware reports new
//! clock information. The result is a complete new [`SocState`]; nothing is
//! modified in place, so a failed rebuild leaves the published state alone.
//!
//! ```text
//!   ClkBwParams ──► VBIOS latencies ──► debug overrides ──► VRAM / VCO
//!                                                               │
//!        new SocState ◄── synthetic states ◄── patch DPM ◄──────┘
//! ```
//!
//! Synthetic states are the "optimal" clock combinations: for a seed clock
//! the other two clocks are chosen so SDP, fabric and DRAM deliver the same
//! derated bandwidth. Seeds are the DCFCLK targets, the highest DCFCLK, every
//! UCLK level and the FCLK levels.

use libm::ceil;
use static_assertions::const_assert;

use crate::clk_table::{SortKey, VoltageLevel, VoltageTable};
use crate::dpm::{patch_dpm_table, DpmClockLevels, DpmTable};
use crate::error::Result;
use crate::soc::{
    DefaultClockLimits, DummyPstateEntry, SocBoundingBox, SocState, MAX_DPM_LEVELS,
    MAX_VOLTAGE_STATES, NUM_DUMMY_PSTATE_ENTRIES,
};

/// DCFCLK seeds of the synthetic states
pub const DCFCLK_STA_TARGETS_MHZ: [u32; 5] = [199, 615, 906, 1324, 1564];

/// Lowest DCFCLK of any synthetic state
pub const MIN_DCFCLK_MHZ: f64 = 199.0;

/// Lowest FCLK of any synthetic state when FCLK is fine grained
pub const MIN_FCLK_MHZ: f64 = 299.0;

/// FCLK counts as coarse grained above this many DPM levels
const FINE_GRAINED_FCLK_LEVELS: usize = 2;

/// Memory transfers per UCLK cycle
const TRANSFERS_PER_UCLK: f64 = 16.0;

// Every seed of a full UCLK and FCLK report fits the table
const_assert!(DCFCLK_STA_TARGETS_MHZ.len() + 1 + 2 * MAX_DPM_LEVELS <= MAX_VOLTAGE_STATES);

// =============================================================================
// INPUTS
// =============================================================================

/// VRAM configuration read from the VBIOS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VramInfo {
    /// DRAM channels
    pub num_chans: u32,
    /// Bytes per channel transfer
    pub dram_channel_width_bytes: u32,
}

/// Latency information from the VBIOS, in units of 100 ns, 0 means absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VbiosBbInfo {
    /// DRAM clock change latency
    pub dram_clock_change_latency_100ns: u32,
    /// Self refresh exit latency
    pub dram_sr_exit_latency_100ns: u32,
    /// Self refresh enter + exit latency
    pub dram_sr_enter_exit_latency_100ns: u32,
}

/// Everything firmware reports about clocks and memory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClkBwParams {
    /// Raw DPM report
    pub dpm: DpmTable,
    /// Dummy p-state latencies, `None` keeps the current table
    pub dummy_pstate_table: Option<[DummyPstateEntry; NUM_DUMMY_PSTATE_ENTRIES]>,
    /// VRAM configuration
    pub vram: Option<VramInfo>,
    /// VBIOS latencies
    pub vbios: Option<VbiosBbInfo>,
    /// DENTIST VCO frequency
    pub dentist_vco_mhz: Option<f64>,
}

impl ClkBwParams {
    /// Parameters carrying only a DPM report
    pub const fn from_dpm(dpm: DpmTable) -> Self {
        Self {
            dpm,
            dummy_pstate_table: None,
            vram: None,
            vbios: None,
            dentist_vco_mhz: None,
        }
    }
}

// =============================================================================
// OVERRIDES
// =============================================================================

#[inline]
fn ns_to_us(ns: u32) -> f64 {
    ns as f64 / 1000.0
}

fn apply_vbios(soc: &mut SocBoundingBox, vbios: &VbiosBbInfo) {
    if vbios.dram_clock_change_latency_100ns != 0 {
        soc.dram_clock_change_latency_us = vbios.dram_clock_change_latency_100ns as f64 / 10.0;
    }
    if vbios.dram_sr_exit_latency_100ns != 0 {
        soc.sr_exit_time_us = vbios.dram_sr_exit_latency_100ns as f64 / 10.0;
    }
    if vbios.dram_sr_enter_exit_latency_100ns != 0 {
        soc.sr_enter_plus_exit_time_us = vbios.dram_sr_enter_exit_latency_100ns as f64 / 10.0;
    }
}

fn apply_debug_overrides(state: &mut SocState) {
    let o = state.debug.bb_overrides;
    let soc = &mut state.soc;
    if o.sr_exit_time_ns != 0 {
        soc.sr_exit_time_us = ns_to_us(o.sr_exit_time_ns);
    }
    if o.sr_enter_plus_exit_time_ns != 0 {
        soc.sr_enter_plus_exit_time_us = ns_to_us(o.sr_enter_plus_exit_time_ns);
    }
    if o.urgent_latency_ns != 0 {
        let us = ns_to_us(o.urgent_latency_ns);
        soc.urgent_latency_pixel_data_only_us = us;
        soc.urgent_latency_pixel_mixed_with_vm_data_us = us;
        soc.urgent_latency_vm_data_only_us = us;
    }
    if o.dram_clock_change_latency_ns != 0 {
        soc.dram_clock_change_latency_us = ns_to_us(o.dram_clock_change_latency_ns);
    }
    if o.fclk_clock_change_latency_ns != 0 {
        soc.fclk_change_latency_us = ns_to_us(o.fclk_clock_change_latency_ns);
    }
}

// =============================================================================
// SYNTHETIC STATES
// =============================================================================

/// Fill in the two clocks of `entry` that are 0 from the one that is set
///
/// All three paths then deliver the same derated bandwidth.
pub fn optimal_ntuple(soc: &SocBoundingBox, entry: &mut VoltageLevel) {
    let sdp_per_mhz =
        soc.return_bus_width_bytes as f64 * soc.pct_ideal_sdp_bw_after_urgent / 100.0;
    let fabric_per_mhz = soc.fabric_datapath_to_dcn_data_return_bytes as f64
        * soc.pct_ideal_fabric_bw_after_urgent
        / 100.0;
    let dram_per_mts = soc.num_chans as f64
        * soc.dram_channel_width_bytes as f64
        * soc.pct_ideal_dram_bw_after_urgent_pixel_only
        / 100.0;

    let bw = if entry.dcfclk_mhz > 0.0 {
        entry.dcfclk_mhz * sdp_per_mhz
    } else if entry.fabricclk_mhz > 0.0 {
        entry.fabricclk_mhz * fabric_per_mhz
    } else if entry.dram_speed_mts > 0.0 {
        entry.dram_speed_mts * dram_per_mts
    } else {
        return;
    };
    if entry.dcfclk_mhz <= 0.0 {
        entry.dcfclk_mhz = bw / sdp_per_mhz;
    }
    if entry.fabricclk_mhz <= 0.0 {
        entry.fabricclk_mhz = bw / fabric_per_mhz;
    }
    if entry.dram_speed_mts <= 0.0 {
        entry.dram_speed_mts = bw / dram_per_mts;
    }
}

fn max_or_default(levels: &DpmClockLevels, default_mhz: u32) -> f64 {
    match levels.max() {
        0 => default_mhz as f64,
        v => v as f64,
    }
}

/// Smallest DPM value at or above `value`, or `value` when none is
fn round_up_to_dpm(levels: &[u32], scale: f64, value: f64) -> f64 {
    levels
        .iter()
        .map(|&v| v as f64 * scale)
        .find(|&v| v >= value)
        .unwrap_or(value)
}

/// Build the operating points from a patched DPM report
pub fn build_synthetic_soc_states(
    soc: &SocBoundingBox,
    dpm: &DpmTable,
    defaults: &DefaultClockLimits,
    key: SortKey,
) -> Result<VoltageTable> {
    let max_dcfclk = max_or_default(&dpm.dcfclk, defaults.dcfclk_mhz);
    let max_fclk = max_or_default(&dpm.fclk, defaults.fabricclk_mhz);
    let max_dram = max_or_default(&dpm.memclk, defaults.dram_speed_mts / 16) * TRANSFERS_PER_UCLK;
    let uclk = dpm.memclk.as_slice();
    let fclk = dpm.fclk.as_slice();
    let coarse_fclk = fclk.len() > FINE_GRAINED_FCLK_LEVELS;

    let mut candidates = VoltageTable::new(SortKey::NetBandwidth);
    let mut seed = |dcfclk_mhz: f64, fabricclk_mhz: f64, dram_speed_mts: f64| -> Result<()> {
        let mut entry = VoltageLevel::new(dcfclk_mhz, fabricclk_mhz, dram_speed_mts);
        optimal_ntuple(soc, &mut entry);
        candidates.insert_sorted(entry.with_net_bandwidth(soc))?;
        Ok(())
    };
    for target in DCFCLK_STA_TARGETS_MHZ {
        seed(target as f64, 0.0, 0.0)?;
    }
    seed(max_dcfclk, 0.0, 0.0)?;
    for &u in uclk {
        seed(0.0, 0.0, u as f64 * TRANSFERS_PER_UCLK)?;
    }
    if coarse_fclk {
        for &f in fclk {
            seed(0.0, f as f64, 0.0)?;
        }
    } else {
        seed(0.0, max_fclk, 0.0)?;
    }

    candidates.retain(|l| {
        l.dcfclk_mhz <= max_dcfclk && l.fabricclk_mhz <= max_fclk && l.dram_speed_mts <= max_dram
    });

    let max_dispclk = max_or_default(&dpm.dispclk, defaults.dispclk_mhz);
    let max_dppclk = max_or_default(&dpm.dppclk, defaults.dppclk_mhz);
    let max_phyclk = max_or_default(&dpm.phyclk, defaults.phyclk_mhz);
    let max_socclk = max_or_default(&dpm.socclk, defaults.socclk_mhz);
    let max_dtbclk = max_or_default(&dpm.dtbclk, defaults.dtbclk_mhz);

    let mut table = VoltageTable::new(key);
    let mut prev: Option<(f64, f64, f64)> = None;
    for level in candidates.levels() {
        let dram_speed_mts = round_up_to_dpm(uclk, TRANSFERS_PER_UCLK, level.dram_speed_mts);
        let fabricclk_mhz = if coarse_fclk {
            round_up_to_dpm(fclk, 1.0, level.fabricclk_mhz)
        } else {
            level.fabricclk_mhz.max(MIN_FCLK_MHZ)
        };
        let dcfclk_mhz = level.dcfclk_mhz.max(MIN_DCFCLK_MHZ);
        let clocks = (dcfclk_mhz, fabricclk_mhz, dram_speed_mts);
        if prev == Some(clocks) {
            continue;
        }
        prev = Some(clocks);

        let entry = VoltageLevel {
            dispclk_mhz: max_dispclk,
            dppclk_mhz: max_dppclk,
            phyclk_mhz: max_phyclk,
            socclk_mhz: max_socclk,
            dtbclk_mhz: max_dtbclk,
            dscclk_mhz: max_dispclk / 3.0,
            ..VoltageLevel::new(dcfclk_mhz, fabricclk_mhz, dram_speed_mts)
        };
        table.insert_sorted(entry.with_net_bandwidth(soc))?;
    }
    table.renumber();
    table.check()?;
    Ok(table)
}

// =============================================================================
// UPDATE
// =============================================================================

/// Build a new state from `state` and the firmware report in `params`
///
/// Overrides apply in order: VBIOS latencies, then debug overrides, then
/// VRAM and VCO. `state` is never modified.
pub fn update_bw_bounding_box(state: &SocState, params: &ClkBwParams) -> Result<SocState> {
    let mut next = state.clone();
    if let Some(vbios) = &params.vbios {
        apply_vbios(&mut next.soc, vbios);
    }
    apply_debug_overrides(&mut next);
    if let Some(vram) = params.vram {
        if vram.num_chans != 0 {
            next.soc.num_chans = vram.num_chans;
        }
        if vram.dram_channel_width_bytes != 0 {
            next.soc.dram_channel_width_bytes = vram.dram_channel_width_bytes;
        }
    }
    if let Some(vco) = params.dentist_vco_mhz.filter(|v| *v > 0.0) {
        next.soc.dispclk_dppclk_vco_speed_mhz = vco;
    }
    if let Some(table) = params.dummy_pstate_table {
        next.dummy_pstate_table = table;
    }

    let mut dpm = params.dpm;
    patch_dpm_table(&mut dpm, &next.defaults)?;
    next.table = build_synthetic_soc_states(&next.soc, &dpm, &next.defaults, state.table.sort_key())?;
    next.dpm = dpm;
    next.generation = state.generation.wrapping_add(1);

    log::info!(
        "DML: bounding box generation {}, {} levels, DCFCLK {} - {} MHz",
        next.generation,
        next.table.len(),
        next.table.get(0).map_or(0, |l| ceil(l.dcfclk_mhz) as u32),
        next.table.last().map_or(0, |l| ceil(l.dcfclk_mhz) as u32)
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dpm::DpmDomains;
    use crate::error::{Error, TableError};
    use crate::testutil;

    fn near(a: f64, b: f64) -> bool {
        libm::fabs(a - b) < 1e-6
    }

    #[test]
    fn test_optimal_ntuple_balances_paths() {
        let soc = SocBoundingBox::DEFAULT;
        let mut e = VoltageLevel::new(199.0, 0.0, 0.0);
        optimal_ntuple(&soc, &mut e);
        let sdp = crate::model::sdp_bw_mbps(&soc, e.dcfclk_mhz) * 0.9;
        let fabric = crate::model::fabric_bw_mbps(&soc, e.fabricclk_mhz) * 0.67;
        let dram = crate::model::dram_bw_mbps(&soc, e.dram_speed_mts) * 0.2;
        assert!(near(sdp, fabric));
        assert!(near(sdp, dram));
    }

    #[test]
    fn test_synthetic_states_from_fixture() {
        let mut dpm = testutil::dpm_fixture();
        patch_dpm_table(&mut dpm, &DefaultClockLimits::DEFAULT).unwrap();
        let t = build_synthetic_soc_states(
            &SocBoundingBox::DEFAULT,
            &dpm,
            &DefaultClockLimits::DEFAULT,
            SortKey::NetBandwidth,
        )
        .unwrap();

        assert_eq!(t.len(), 10);
        let first = t.get(0).unwrap();
        assert!(near(first.dcfclk_mhz, 199.0));
        assert!(near(first.fabricclk_mhz, 400.0));
        assert!(near(first.dram_speed_mts, 1552.0));
        assert!(near(first.net_bw_mbps, 11462.4));
        let last = t.last().unwrap();
        assert!(near(last.fabricclk_mhz, 2000.0));
        assert!(near(last.dram_speed_mts, 12352.0));
        assert!(near(last.net_bw_mbps, 85760.0));

        for (i, l) in t.levels().iter().enumerate() {
            assert_eq!(l.state, i as u32);
            assert!(l.dcfclk_mhz <= 1564.0 && l.fabricclk_mhz <= 2000.0);
            assert!(dpm.memclk.as_slice().iter().any(|&u| near(u as f64 * 16.0, l.dram_speed_mts)));
            assert!(dpm.fclk.as_slice().iter().any(|&f| near(f as f64, l.fabricclk_mhz)));
            assert!(near(l.dispclk_mhz, 2150.0));
            assert!(near(l.dscclk_mhz, 2150.0 / 3.0));
        }
        assert_eq!(t.check(), Ok(()));
    }

    #[test]
    fn test_fine_grained_fclk_uses_floor() {
        let mut dpm = testutil::dpm_fixture();
        dpm.fclk = DpmClockLevels::from_slice(&[200, 2000]).unwrap();
        patch_dpm_table(&mut dpm, &DefaultClockLimits::DEFAULT).unwrap();
        let t = build_synthetic_soc_states(
            &SocBoundingBox::DEFAULT,
            &dpm,
            &DefaultClockLimits::DEFAULT,
            SortKey::NetBandwidth,
        )
        .unwrap();
        assert!(t.levels().iter().all(|l| l.fabricclk_mhz >= MIN_FCLK_MHZ));
        assert!(t.levels().iter().all(|l| l.dcfclk_mhz >= MIN_DCFCLK_MHZ));
    }

    #[test]
    fn test_full_fclk_and_uclk_reports() {
        let mut params = testutil::clk_bw_params();
        let fclk: [u32; MAX_DPM_LEVELS] = core::array::from_fn(|i| 400 + 100 * i as u32);
        let uclk: [u32; MAX_DPM_LEVELS] = core::array::from_fn(|i| 97 + 72 * i as u32);
        params.dpm.fclk = DpmClockLevels::from_slice(&fclk).unwrap();
        params.dpm.memclk = DpmClockLevels::from_slice(&uclk).unwrap();

        let next = update_bw_bounding_box(&SocState::default(), &params).unwrap();
        assert!(!next.table.is_empty());
        assert_eq!(next.table.check(), Ok(()));
        for l in next.table.levels() {
            assert!(fclk.iter().any(|&f| near(f as f64, l.fabricclk_mhz)));
            assert!(uclk.iter().any(|&u| near(u as f64 * 16.0, l.dram_speed_mts)));
        }
    }

    #[test]
    fn test_vbios_then_debug_overrides() {
        let mut base = SocState::default();
        base.debug.bb_overrides.sr_exit_time_ns = 30_000;
        base.debug.bb_overrides.urgent_latency_ns = 3_000;
        let params = ClkBwParams {
            vbios: Some(VbiosBbInfo {
                dram_clock_change_latency_100ns: 3500,
                dram_sr_exit_latency_100ns: 250,
                dram_sr_enter_exit_latency_100ns: 320,
            }),
            ..testutil::clk_bw_params()
        };
        let next = update_bw_bounding_box(&base, &params).unwrap();
        assert!(near(next.soc.dram_clock_change_latency_us, 350.0));
        assert!(near(next.soc.sr_exit_time_us, 30.0));
        assert!(near(next.soc.sr_enter_plus_exit_time_us, 32.0));
        assert!(near(next.soc.urgent_latency_pixel_data_only_us, 3.0));
        assert!(near(next.soc.urgent_latency_vm_data_only_us, 3.0));
        assert!(near(next.soc.urgent_latency_pixel_mixed_with_vm_data_us, 3.0));
    }

    #[test]
    fn test_vram_and_vco() {
        let params = ClkBwParams {
            vram: Some(VramInfo {
                num_chans: 16,
                dram_channel_width_bytes: 2,
            }),
            dentist_vco_mhz: Some(3600.0),
            ..testutil::clk_bw_params()
        };
        let next = update_bw_bounding_box(&SocState::default(), &params).unwrap();
        assert_eq!(next.soc.num_chans, 16);
        assert!(near(next.soc.dispclk_dppclk_vco_speed_mhz, 3600.0));
        let first = next.table.get(0).unwrap();
        assert!(near(
            first.net_bw_mbps,
            crate::model::net_bandwidth_mbps(
                &next.soc,
                first.dcfclk_mhz,
                first.fabricclk_mhz,
                first.dram_speed_mts
            )
        ));
    }

    #[test]
    fn test_generation_and_source_untouched() {
        let base = SocState::default();
        let next = update_bw_bounding_box(&base, &testutil::clk_bw_params()).unwrap();
        assert_eq!(next.generation, base.generation + 1);
        assert!(base.table.is_empty());
        assert_eq!(next.table.len(), 10);
        assert_eq!(next.dpm.memclk.as_slice(), &[97, 456, 772, 1250]);
    }

    #[test]
    fn test_decreasing_dpm_rejected() {
        let mut params = testutil::clk_bw_params();
        params.dpm.fclk = DpmClockLevels::from_slice(&[1200, 400]).unwrap();
        assert_eq!(
            update_bw_bounding_box(&SocState::default(), &params).unwrap_err(),
            Error::InvalidTable(TableError::NonMonotonic(DpmDomains::FCLK))
        );
    }

    #[test]
    fn test_missing_domains_seeded() {
        let mut params = testutil::clk_bw_params();
        params.dpm.dcfclk = DpmClockLevels::EMPTY;
        params.dpm.memclk = DpmClockLevels::EMPTY;
        let next = update_bw_bounding_box(&SocState::default(), &params).unwrap();
        assert_eq!(next.dpm.dcfclk.as_slice(), &[1564]);
        assert_eq!(next.dpm.memclk.as_slice(), &[18000 / 16]);
        assert!(!next.table.is_empty());
    }
}
