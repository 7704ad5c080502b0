//! # Watermarks and Programming Outputs
//!
//! Turns a validated [`BwContext`] into everything the hardware sequencer
//! programs: four watermark sets, per-category DCFCLK range tables, the
//! range sets handed to power-management firmware, per-pipe DLG values and
//! the clocks of the chosen level.
//!
//! ```text
//!   set   use                         latency assumptions
//!   ---   -------------------------   -----------------------------------
//!    A    normal operation            bounding box (dummy if no p-state)
//!    B    performance, DPM level 2    bounding box
//!    C    firmware memory switching   dummy p-state latency
//!    D    MALL / SubVP                dummy[3], self refresh halved
//! ```
//!
//! Watermark values are reported in nanoseconds, rounded up.

use arrayvec::ArrayVec;
use libm::ceil;

use crate::dlg::{compute_dlg_params, DlgParams};
use crate::dummy_pstate::{dummy_index_for_dram_speed, find_dummy_latency_index};
use crate::error::{Error, Result, TableError};
use crate::phantom::{populate_phantom_dlg_params, SubVpConfig};
use crate::soc::{LatencyInputs, SocState, DUMMY_PSTATE_DISABLED_NS, MAX_PIPES, MAX_VOLTAGE_STATES};
use crate::timing::PipeDescriptor;
use crate::validate::{evaluate_level, BwContext, ClockChangeSupport, LevelEvaluation, ValidateMode};

/// Open upper bound of a firmware clock range
pub const WM_RANGE_MAX_MHZ: u32 = 0xFFFF;

/// DCFCLK cycles to leave deep sleep before stutter exit completes
const STUTTER_WAKE_DCFCLK_CYCLES: f64 = 10.0;

/// Performance set B is computed at this level when present
const SET_B_VLEVEL: usize = 2;

#[inline]
fn to_ns(us: f64) -> u32 {
    ceil(us * 1000.0) as u32
}

#[inline]
fn to_khz(mhz: f64) -> u32 {
    ceil(mhz * 1000.0) as u32
}

// =============================================================================
// WATERMARK SETS
// =============================================================================

/// One full set of watermarks
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WatermarkSet {
    /// Urgent watermark
    pub urgent_ns: u32,
    /// PTE/meta urgent watermark
    pub pte_meta_urgent_ns: u32,
    /// Urgent latency
    pub urgent_latency_ns: u32,
    /// Stutter exit watermark
    pub cstate_exit_ns: u32,
    /// Stutter enter + exit watermark
    pub cstate_enter_plus_exit_ns: u32,
    /// DRAM clock change watermark
    pub pstate_change_ns: u32,
    /// FCLK change watermark
    pub fclk_pstate_change_ns: u32,
    /// USR retraining watermark
    pub usr_retraining_ns: u32,
    /// Urgent bandwidth over return bandwidth
    pub frac_urg_bw_nom: f64,
}

impl WatermarkSet {
    /// Watermarks of `eval` under `latency`
    pub fn compute(state: &SocState, eval: &LevelEvaluation, latency: &LatencyInputs) -> Self {
        let soc = &state.soc;
        let urgent = eval.urgent_watermark_us();
        let wake = STUTTER_WAKE_DCFCLK_CYCLES / eval.dcfclk_deep_sleep_mhz;
        Self {
            urgent_ns: to_ns(urgent),
            pte_meta_urgent_ns: to_ns(soc.urgent_latency_vm_data_only_us + eval.extra_latency_us),
            urgent_latency_ns: to_ns(eval.urgent_latency_us),
            cstate_exit_ns: to_ns(latency.sr_exit_us + eval.extra_latency_us + wake),
            cstate_enter_plus_exit_ns: to_ns(
                latency.sr_enter_plus_exit_us + eval.extra_latency_us + wake,
            ),
            pstate_change_ns: to_ns(latency.dram_clock_change_us + urgent),
            fclk_pstate_change_ns: to_ns(latency.fclk_change_us + urgent),
            usr_retraining_ns: to_ns(soc.usr_retraining_latency_us + soc.smn_latency_us + urgent),
            frac_urg_bw_nom: eval.urgent_bw_mbps / eval.return_bw_mbps,
        }
    }

    /// Value of one category
    pub fn get(&self, category: WmCategory) -> u32 {
        match category {
            WmCategory::Urgent => self.urgent_ns,
            WmCategory::PteMetaUrgent => self.pte_meta_urgent_ns,
            WmCategory::UrgentLatency => self.urgent_latency_ns,
            WmCategory::CstateExit => self.cstate_exit_ns,
            WmCategory::CstateEnterPlusExit => self.cstate_enter_plus_exit_ns,
            WmCategory::PstateChange => self.pstate_change_ns,
            WmCategory::FclkPstateChange => self.fclk_pstate_change_ns,
            WmCategory::UsrRetraining => self.usr_retraining_ns,
        }
    }
}

/// Watermark sets A to D
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Watermarks {
    /// Normal operation
    pub a: WatermarkSet,
    /// Performance
    pub b: WatermarkSet,
    /// Dummy p-state
    pub c: WatermarkSet,
    /// MALL
    pub d: WatermarkSet,
}

// =============================================================================
// FIRMWARE RANGE SETS
// =============================================================================

/// Purpose of a firmware range set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmType {
    /// Selected by DCFCLK/UCLK range
    ClockRange,
    /// Firmware-driven memory clock switching
    DummyPstate,
    /// Scanout from MALL
    Mall,
}

/// One range set reported to firmware
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WmRange {
    /// Firmware may select this set
    pub valid: bool,
    /// Purpose of the set
    pub wm_type: WmType,
    /// Latencies the set was computed with
    pub latency: LatencyInputs,
    /// Lowest DCFCLK of the range
    pub min_dcfclk_mhz: u32,
    /// Highest DCFCLK of the range
    pub max_dcfclk_mhz: u32,
    /// Lowest UCLK of the range
    pub min_uclk_mhz: u32,
    /// Highest UCLK of the range
    pub max_uclk_mhz: u32,
}

/// Range sets A to D
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WmRangeSets {
    /// Normal operation
    pub a: WmRange,
    /// Performance
    pub b: WmRange,
    /// Dummy p-state
    pub c: WmRange,
    /// MALL
    pub d: WmRange,
}

/// Range sets for the current bounding box and DPM table
pub fn build_wm_range_sets(state: &SocState) -> WmRangeSets {
    let base = state.latency();
    let dpm = &state.dpm;
    let dcfclk_min = dpm.dcfclk.first_valid().unwrap_or(0);
    let uclk_min = dpm.memclk.first_valid().unwrap_or(0);
    let dummy = &state.dummy_pstate_table;
    let dummy_override_ns = state.debug.bb_overrides.dummy_clock_change_latency_ns;

    let range = |wm_type, latency, min_dcfclk_mhz, min_uclk_mhz| WmRange {
        valid: true,
        wm_type,
        latency,
        min_dcfclk_mhz,
        max_dcfclk_mhz: WM_RANGE_MAX_MHZ,
        min_uclk_mhz,
        max_uclk_mhz: WM_RANGE_MAX_MHZ,
    };

    let a = range(WmType::ClockRange, base, dcfclk_min, uclk_min);

    let b_dcfclk = match state.table.get(SET_B_VLEVEL) {
        Some(level) => ceil(level.dcfclk_mhz) as u32,
        None => dcfclk_min,
    };
    let memclk = dpm.memclk.as_slice();
    let b_uclk = memclk
        .get(SET_B_VLEVEL)
        .or(memclk.last())
        .copied()
        .unwrap_or(uclk_min);
    let b = range(WmType::ClockRange, base, b_dcfclk, b_uclk);

    let c_latency = match dummy_override_ns {
        0 | DUMMY_PSTATE_DISABLED_NS => dummy[0].dummy_pstate_latency_us,
        ns => ns as f64 / 1000.0,
    };
    let mut c = range(
        WmType::DummyPstate,
        base.with_dram_clock_change(c_latency),
        dcfclk_min,
        uclk_min,
    );
    c.valid = dummy_override_ns != DUMMY_PSTATE_DISABLED_NS;

    let mut d_latency = base.with_dram_clock_change(dummy[dummy.len() - 1].dummy_pstate_latency_us);
    d_latency.sr_exit_us /= 2.0;
    d_latency.sr_enter_plus_exit_us /= 2.0;
    let d = range(WmType::Mall, d_latency, dcfclk_min, uclk_min);

    WmRangeSets { a, b, c, d }
}

// =============================================================================
// DCFCLK RANGE TABLES
// =============================================================================

/// Watermark categories with their own range table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WmCategory {
    /// Urgent
    Urgent,
    /// PTE/meta urgent
    PteMetaUrgent,
    /// Urgent latency
    UrgentLatency,
    /// Stutter exit
    CstateExit,
    /// Stutter enter + exit
    CstateEnterPlusExit,
    /// DRAM clock change
    PstateChange,
    /// FCLK change
    FclkPstateChange,
    /// USR retraining
    UsrRetraining,
}

impl WmCategory {
    /// Every category, in table order
    pub const ALL: [WmCategory; 8] = [
        WmCategory::Urgent,
        WmCategory::PteMetaUrgent,
        WmCategory::UrgentLatency,
        WmCategory::CstateExit,
        WmCategory::CstateEnterPlusExit,
        WmCategory::PstateChange,
        WmCategory::FclkPstateChange,
        WmCategory::UsrRetraining,
    ];
}

/// One DCFCLK range and its watermark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmRangeEntry {
    /// Lowest DCFCLK, inclusive
    pub min_dcfclk_mhz: u32,
    /// Highest DCFCLK, inclusive
    pub max_dcfclk_mhz: u32,
    /// Watermark for the range
    pub value_ns: u32,
}

/// Sorted, non-overlapping DCFCLK ranges of one category
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatermarkRangeTable {
    ranges: ArrayVec<WmRangeEntry, MAX_VOLTAGE_STATES>,
}

impl WatermarkRangeTable {
    /// Ranges in ascending DCFCLK order
    #[inline]
    pub fn ranges(&self) -> &[WmRangeEntry] {
        &self.ranges
    }

    /// Watermark programmed at `dcfclk_mhz`
    pub fn lookup(&self, dcfclk_mhz: u32) -> Option<u32> {
        self.ranges
            .iter()
            .find(|r| r.min_dcfclk_mhz <= dcfclk_mhz && dcfclk_mhz <= r.max_dcfclk_mhz)
            .map(|r| r.value_ns)
    }

    /// Append a range above the last one, merging into it on equal value
    fn push(&mut self, min_dcfclk_mhz: u32, max_dcfclk_mhz: u32, value_ns: u32) -> Result<()> {
        if let Some(last) = self.ranges.last_mut() {
            if last.value_ns == value_ns {
                last.max_dcfclk_mhz = max_dcfclk_mhz;
                return Ok(());
            }
        }
        self.ranges
            .try_push(WmRangeEntry {
                min_dcfclk_mhz,
                max_dcfclk_mhz,
                value_ns,
            })
            .map_err(|_| Error::InvalidTable(TableError::Full))
    }
}

/// Range tables of every category
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatermarkRanges {
    tables: [WatermarkRangeTable; 8],
}

impl WatermarkRanges {
    /// Table of `category`
    pub fn get(&self, category: WmCategory) -> &WatermarkRangeTable {
        &self.tables[category as usize]
    }
}

/// Per-category DCFCLK range tables for `pipes` across every level
///
/// Each level owns the DCFCLK span from its own clock up to the next
/// level's; the first span starts at 0 and the last ends at `u32::MAX`.
pub fn build_watermark_ranges(
    state: &SocState,
    pipes: &[PipeDescriptor],
) -> Result<WatermarkRanges> {
    state.table.check()?;
    let levels = state.table.levels();
    let mut order: ArrayVec<usize, MAX_VOLTAGE_STATES> = (0..levels.len()).collect();
    order.sort_unstable_by(|&a, &b| {
        levels[a]
            .dcfclk_mhz
            .total_cmp(&levels[b].dcfclk_mhz)
            .then(a.cmp(&b))
    });

    let latency = state.latency();
    let mut out = WatermarkRanges::default();
    for (pos, &vlevel) in order.iter().enumerate() {
        let min = if pos == 0 {
            0
        } else {
            ceil(levels[vlevel].dcfclk_mhz) as u32
        };
        let max = match order.get(pos + 1) {
            Some(&next) => (ceil(levels[next].dcfclk_mhz) as u32).saturating_sub(1),
            None => u32::MAX,
        };
        if min > max {
            continue;
        }
        let eval = evaluate_level(state, pipes, vlevel)?;
        let set = WatermarkSet::compute(state, &eval, &latency);
        for category in WmCategory::ALL {
            out.tables[category as usize].push(min, max, set.get(category))?;
        }
    }
    Ok(out)
}

// =============================================================================
// CLOCKS AND RESULT
// =============================================================================

/// Clocks and flags to program for the chosen level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockSettings {
    /// DISPCLK
    pub dispclk_khz: u32,
    /// DPPCLK
    pub dppclk_khz: u32,
    /// DCFCLK
    pub dcfclk_khz: u32,
    /// Deep sleep DCFCLK
    pub dcfclk_deep_sleep_khz: u32,
    /// SOCCLK
    pub socclk_khz: u32,
    /// Memory clock
    pub dramclk_khz: u32,
    /// Fabric clock
    pub fclk_khz: u32,
    /// DRAM clock change can be hidden
    pub p_state_change_support: bool,
    /// FCLK change can be hidden
    pub fclk_p_state_change_support: bool,
    /// Firmware drives memory clock switching with a dummy latency
    pub fw_based_mclk_switching: bool,
    /// Compressed buffer left after DET
    pub compbuf_size_kb: u32,
}

/// Everything a full validation produces
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Chosen level
    pub vlevel: usize,
    /// Pipes with their DET, phantoms last
    pub pipes: ArrayVec<PipeDescriptor, MAX_PIPES>,
    /// DLG values, in pipe order
    pub dlg: ArrayVec<DlgParams, MAX_PIPES>,
    /// Watermark sets A to D
    pub watermarks: Watermarks,
    /// Per-category DCFCLK ranges
    pub ranges: WatermarkRanges,
    /// Firmware range sets
    pub wm_range_sets: WmRangeSets,
    /// Clocks to program
    pub clocks: ClockSettings,
    /// DRAM clock change support
    pub dram_change: ClockChangeSupport,
    /// Dummy p-state entry firmware uses, when switching is firmware-driven
    pub dummy_latency_index: Option<usize>,
    /// SubVP configuration, if any
    pub subvp: Option<SubVpConfig>,
}

/// Compute watermarks, DLG values and clocks for a validated context
pub fn calculate_wm_and_dlg(state: &SocState, ctx: &BwContext) -> Result<ValidationResult> {
    if ctx.mode != ValidateMode::Full {
        log::debug!("DML: watermarks requested for a fast validation");
        return Err(Error::InvalidParameter);
    }
    let latency = state.latency();
    let dummy = &state.dummy_pstate_table;

    let mut dummy_latency_index = None;
    if ctx.subvp.is_some() {
        match find_dummy_latency_index(state, ctx) {
            Ok(index) => dummy_latency_index = Some(index),
            Err(e) => log::warn!("DML: {}, using driver-managed memory clock switching", e),
        }
    }
    let fw_based = dummy_latency_index.is_some();

    let vlevel_b = SET_B_VLEVEL.min(state.table.len().saturating_sub(1));
    let eval_b = evaluate_level(state, &ctx.pipes, vlevel_b)?;
    let b = WatermarkSet::compute(state, &eval_b, &latency);

    let override_ns = state.debug.bb_overrides.dummy_clock_change_latency_ns;
    let dummy_us = if override_ns != 0 && override_ns != DUMMY_PSTATE_DISABLED_NS {
        override_ns as f64 / 1000.0
    } else if let Some(index) = dummy_latency_index {
        dummy[index].dummy_pstate_latency_us
    } else {
        let dram_speed = if ctx.dram_change.is_supported() {
            ctx.evaluation.level.dram_speed_mts
        } else {
            state.dpm.memclk.max() as f64 * 16.0
        };
        dummy[dummy_index_for_dram_speed(dummy, dram_speed)].dummy_pstate_latency_us
    };
    let c = WatermarkSet::compute(
        state,
        &ctx.evaluation,
        &latency.with_dram_clock_change(dummy_us),
    );

    let a = if ctx.dram_change.is_supported() {
        let mut lat = latency;
        if fw_based {
            lat.fclk_change_us = lat.fclk_change_us.max(dummy_us);
        }
        WatermarkSet::compute(state, &ctx.evaluation, &lat)
    } else {
        WatermarkSet {
            pstate_change_ns: 0,
            ..c
        }
    };
    let watermarks = Watermarks { a, b, c, d: a };

    let mut dlg: ArrayVec<DlgParams, MAX_PIPES> = ArrayVec::new();
    for (pipe, pipe_eval) in ctx.pipes.iter().zip(ctx.evaluation.pipes.iter()) {
        dlg.push(if pipe.is_phantom() {
            DlgParams::default()
        } else {
            compute_dlg_params(state, pipe, pipe_eval, &ctx.evaluation)
        });
    }
    populate_phantom_dlg_params(state, ctx, &mut dlg);

    let eval = &ctx.evaluation;
    let level = &eval.level;
    let clocks = ClockSettings {
        dispclk_khz: to_khz(eval.dispclk_mhz),
        dppclk_khz: to_khz(eval.dppclk_mhz),
        dcfclk_khz: to_khz(level.dcfclk_mhz),
        dcfclk_deep_sleep_khz: to_khz(eval.dcfclk_deep_sleep_mhz),
        socclk_khz: to_khz(level.socclk_mhz),
        dramclk_khz: to_khz(level.memclk_mhz()),
        fclk_khz: to_khz(level.fabricclk_mhz),
        p_state_change_support: ctx.dram_change.is_supported(),
        fclk_p_state_change_support: ctx.fclk_change.is_supported(),
        fw_based_mclk_switching: fw_based,
        compbuf_size_kb: ctx.det.compbuf_kb,
    };

    Ok(ValidationResult {
        vlevel: ctx.vlevel,
        pipes: ctx.pipes.clone(),
        dlg,
        watermarks,
        ranges: build_watermark_ranges(state, &ctx.pipes)?,
        wm_range_sets: build_wm_range_sets(state),
        clocks,
        dram_change: ctx.dram_change,
        dummy_latency_index,
        subvp: ctx.subvp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::timing::{ColorDepth, PixelEncoding, StreamDescriptor, Timing};
    use crate::validate::internal_validate_bw;

    fn fhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::FHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    fn uhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::UHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    fn full(state: &SocState, streams: &[StreamDescriptor]) -> ValidationResult {
        let ctx = internal_validate_bw(state, streams, ValidateMode::Full).unwrap();
        calculate_wm_and_dlg(state, &ctx).unwrap()
    }

    #[test]
    fn test_ranges_sorted_merged_and_cover_everything() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[uhd(), fhd()], ValidateMode::Full).unwrap();
        let ranges = build_watermark_ranges(&state, &ctx.pipes).unwrap();
        for category in WmCategory::ALL {
            let r = ranges.get(category).ranges();
            assert!(!r.is_empty());
            assert_eq!(r[0].min_dcfclk_mhz, 0);
            assert_eq!(r[r.len() - 1].max_dcfclk_mhz, u32::MAX);
            for e in r {
                assert!(e.min_dcfclk_mhz <= e.max_dcfclk_mhz);
            }
            for w in r.windows(2) {
                assert_eq!(w[1].min_dcfclk_mhz, w[0].max_dcfclk_mhz + 1);
                assert_ne!(w[0].value_ns, w[1].value_ns, "{:?} not merged", category);
            }
        }
    }

    #[test]
    fn test_ranges_idempotent() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        let first = build_watermark_ranges(&state, &ctx.pipes).unwrap();
        let second = build_watermark_ranges(&state, &ctx.pipes).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_urgent_latency_ranges_follow_fabric_clock() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Full).unwrap();
        let ranges = build_watermark_ranges(&state, &ctx.pipes).unwrap();
        let low = ranges.get(WmCategory::UrgentLatency).lookup(0).unwrap();
        let high = ranges
            .get(WmCategory::UrgentLatency)
            .lookup(u32::MAX)
            .unwrap();
        assert!(low >= high);
    }

    #[test]
    fn test_watermark_formulas() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Full).unwrap();
        let res = calculate_wm_and_dlg(&state, &ctx).unwrap();
        let eval = &ctx.evaluation;
        let urgent = eval.urgent_watermark_us();
        let a = res.watermarks.a;

        assert_eq!(a.urgent_ns, to_ns(urgent));
        assert_eq!(a.pstate_change_ns, to_ns(400.0 + urgent));
        assert_eq!(a.fclk_pstate_change_ns, to_ns(20.0 + urgent));
        assert_eq!(a.usr_retraining_ns, to_ns(4.0 + urgent));
        assert!(a.cstate_enter_plus_exit_ns > a.cstate_exit_ns);
        assert!(a.frac_urg_bw_nom > 0.0 && a.frac_urg_bw_nom <= 1.0);
        assert_eq!(res.watermarks.d, a);
    }

    #[test]
    fn test_set_b_uses_level_two() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Full).unwrap();
        let res = calculate_wm_and_dlg(&state, &ctx).unwrap();
        let eval = evaluate_level(&state, &ctx.pipes, 2).unwrap();
        assert_eq!(res.watermarks.b.urgent_ns, to_ns(eval.urgent_watermark_us()));
    }

    #[test]
    fn test_set_c_uses_dummy_latency() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Full).unwrap();
        let res = calculate_wm_and_dlg(&state, &ctx).unwrap();
        // vlevel 0 runs DRAM well below 11000 MT/s, so entry 0 applies
        assert_eq!(
            res.watermarks.c.pstate_change_ns,
            to_ns(38.0 + ctx.evaluation.urgent_watermark_us())
        );
        assert!(res.watermarks.c.pstate_change_ns < res.watermarks.a.pstate_change_ns);
    }

    #[test]
    fn test_set_c_override_and_disable() {
        let mut state = testutil::state();
        assert!(build_wm_range_sets(&state).c.valid);

        state.debug.bb_overrides.dummy_clock_change_latency_ns = 50_000;
        let sets = build_wm_range_sets(&state);
        assert!(sets.c.valid);
        assert_eq!(sets.c.latency.dram_clock_change_us, 50.0);

        state.debug.bb_overrides.dummy_clock_change_latency_ns = DUMMY_PSTATE_DISABLED_NS;
        let sets = build_wm_range_sets(&state);
        assert!(!sets.c.valid);
        assert!(sets.a.valid && sets.b.valid && sets.d.valid);
    }

    #[test]
    fn test_range_sets_layout() {
        let state = testutil::state();
        let sets = build_wm_range_sets(&state);
        assert_eq!(sets.a.wm_type, WmType::ClockRange);
        assert_eq!(sets.c.wm_type, WmType::DummyPstate);
        assert_eq!(sets.d.wm_type, WmType::Mall);
        assert_eq!(sets.b.min_uclk_mhz, state.dpm.memclk.levels[2]);
        assert_eq!(
            sets.b.min_dcfclk_mhz,
            ceil(state.table.get(2).unwrap().dcfclk_mhz) as u32
        );
        assert_eq!(sets.d.latency.sr_exit_us, state.soc.sr_exit_time_us / 2.0);
        assert_eq!(sets.d.latency.dram_clock_change_us, 24.0);
        assert_eq!(sets.a.max_dcfclk_mhz, WM_RANGE_MAX_MHZ);
    }

    #[test]
    fn test_set_a_mirrors_c_without_pstate() {
        let mut state = testutil::long_dram_latency_state(800.0);
        state.debug.force_disable_subvp = true;
        let res = full(&state, &[uhd()]);
        assert_eq!(res.dram_change, ClockChangeSupport::Unsupported);
        assert!(!res.clocks.p_state_change_support);

        let (a, c) = (res.watermarks.a, res.watermarks.c);
        assert_eq!(a.pstate_change_ns, 0);
        assert_ne!(c.pstate_change_ns, 0);
        assert_eq!(WatermarkSet { pstate_change_ns: c.pstate_change_ns, ..a }, c);
        assert_eq!(res.watermarks.d, a);
    }

    #[test]
    fn test_subvp_switches_in_firmware() {
        let state = testutil::long_dram_latency_state(800.0);
        let res = full(&state, &[uhd()]);
        assert!(res.subvp.is_some());
        assert!(res.clocks.fw_based_mclk_switching);
        assert_eq!(res.dummy_latency_index, Some(0));
        assert_eq!(res.dlg.len(), 4);
        for (pipe, dlg) in res.pipes.iter().zip(res.dlg.iter()) {
            assert!(dlg.refcyc_per_htotal > 0.0);
            if pipe.is_phantom() {
                assert_eq!(dlg.vstartup_start, crate::model::vstartup_lines(&pipe.timing));
            }
        }
    }

    #[test]
    fn test_subvp_falls_back_when_no_dummy_latency_fits() {
        let mut table = crate::soc::DEFAULT_DUMMY_PSTATE_TABLE;
        for e in &mut table {
            e.dummy_pstate_latency_us = 1_000_000.0;
        }
        let state = testutil::long_dram_latency_state(800.0).with_dummy_pstate_table(table);
        let res = full(&state, &[uhd()]);
        assert!(res.subvp.is_some());
        assert_eq!(res.dummy_latency_index, None);
        assert!(!res.clocks.fw_based_mclk_switching);
    }

    #[test]
    fn test_clock_outputs() {
        let state = testutil::state();
        let res = full(&state, &[fhd()]);
        let level = state.table.get(res.vlevel).unwrap();
        assert_eq!(res.clocks.dcfclk_khz, to_khz(level.dcfclk_mhz));
        assert_eq!(res.clocks.fclk_khz, to_khz(level.fabricclk_mhz));
        assert_eq!(res.clocks.compbuf_size_kb, 128);
        assert!(res.clocks.p_state_change_support);
        assert!(!res.clocks.fw_based_mclk_switching);
        assert!(res.clocks.dispclk_khz >= 148_500);
    }

    #[test]
    fn test_fast_context_rejected() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Fast).unwrap();
        assert_eq!(calculate_wm_and_dlg(&state, &ctx), Err(Error::InvalidParameter));
    }
}
