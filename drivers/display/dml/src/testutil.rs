//! Shared fixtures for unit tests.

use arrayvec::ArrayVec;

use crate::bbox::{update_bw_bounding_box, ClkBwParams};
use crate::clk_table::{SortKey, VoltageLevel, VoltageTable};
use crate::dpm::{DpmClockLevels, DpmTable};
use crate::soc::{DefaultClockLimits, SocBoundingBox, SocState, MAX_VOLTAGE_STATES};

/// Firmware DPM report of a typical board
pub fn dpm_fixture() -> DpmTable {
    DpmTable {
        dcfclk: DpmClockLevels::from_slice(&[500, 1000, 1200, 1564]).unwrap(),
        dispclk: DpmClockLevels::from_slice(&[1000, 1500, 2150]).unwrap(),
        dppclk: DpmClockLevels::from_slice(&[1000, 1500, 2150]).unwrap(),
        dtbclk: DpmClockLevels::from_slice(&[1564]).unwrap(),
        phyclk: DpmClockLevels::from_slice(&[810]).unwrap(),
        socclk: DpmClockLevels::from_slice(&[500, 1200]).unwrap(),
        fclk: DpmClockLevels::from_slice(&[400, 1200, 1800, 2000]).unwrap(),
        memclk: DpmClockLevels::from_slice(&[97, 456, 772, 1250]).unwrap(),
    }
}

pub fn clk_bw_params() -> ClkBwParams {
    ClkBwParams::from_dpm(dpm_fixture())
}

/// State built from [`dpm_fixture`] by the bounding-box updater
pub fn state() -> SocState {
    update_bw_bounding_box(&SocState::default(), &clk_bw_params()).unwrap()
}

fn balanced_level(soc: &SocBoundingBox, dcfclk_mhz: f64) -> VoltageLevel {
    let d = DefaultClockLimits::DEFAULT;
    VoltageLevel {
        dispclk_mhz: d.dispclk_mhz as f64,
        dppclk_mhz: d.dppclk_mhz as f64,
        phyclk_mhz: d.phyclk_mhz as f64,
        socclk_mhz: d.socclk_mhz as f64,
        dtbclk_mhz: d.dtbclk_mhz as f64,
        ..VoltageLevel::new(dcfclk_mhz, dcfclk_mhz * 0.9 / 0.67, dcfclk_mhz * 6.0)
    }
    .with_net_bandwidth(soc)
}

fn handcrafted(dcfclk: &[f64]) -> SocState {
    let state = SocState::default();
    let levels: ArrayVec<VoltageLevel, MAX_VOLTAGE_STATES> = dcfclk
        .iter()
        .map(|&d| balanced_level(&state.soc, d))
        .collect();
    let table = VoltageTable::from_levels(SortKey::NetBandwidth, &levels).unwrap();
    state.with_table(table)
}

/// Five levels whose two lowest cannot carry a 4K stream
pub fn ladder_state() -> SocState {
    handcrafted(&[20.0, 40.0, 199.0, 615.0, 1564.0])
}

/// One level too slow for anything but the smallest modes
pub fn starved_state() -> SocState {
    handcrafted(&[20.0])
}

/// [`state`] with DISPCLK capped at `mhz` on every level
pub fn low_dispclk_state(mhz: f64) -> SocState {
    let state = state();
    let levels: ArrayVec<VoltageLevel, MAX_VOLTAGE_STATES> = state
        .table
        .levels()
        .iter()
        .map(|l| VoltageLevel {
            dispclk_mhz: mhz,
            ..*l
        })
        .collect();
    let table = VoltageTable::from_levels(state.table.sort_key(), &levels).unwrap();
    state.with_table(table)
}

/// [`state`] with a longer DRAM clock change latency
pub fn long_dram_latency_state(us: f64) -> SocState {
    let mut state = state();
    state.soc.dram_clock_change_latency_us = us;
    state
}
