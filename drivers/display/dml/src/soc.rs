//! # SoC and IP Parameters
//!
//! Static description of the display controller (IP) and of the memory
//! subsystem around it (SoC bounding box). The bounding-box updater copies
//! these and applies firmware and VBIOS overrides; the validator only reads
//! them.

use static_assertions::const_assert;

use crate::clk_table::{SortKey, VoltageTable};
use crate::dpm::DpmTable;

// =============================================================================
// HARDWARE LIMITS
// =============================================================================

/// Display pipes (DPP + HUBP) on this controller
pub const MAX_PIPES: usize = 4;

/// Maximum entries in the voltage/clock table
pub const MAX_VOLTAGE_STATES: usize = 40;

/// Maximum DPM levels reported per clock by power-management firmware
pub const MAX_DPM_LEVELS: usize = 16;

/// Entries in the dummy p-state latency table
pub const NUM_DUMMY_PSTATE_ENTRIES: usize = 4;

/// DET allocation granularity in KB
pub const DET_SEGMENT_KB: u32 = 64;

/// Default per-pipe DET in KB
pub const DEFAULT_DET_KB: u32 = 256;

/// Largest per-pipe DET in KB
pub const MAX_DET_KB: u32 = 1152;

/// Smallest per-pipe DET in KB
pub const MIN_DET_KB: u32 = 128;

/// Smallest compressed buffer left after DET allocation, in KB
pub const MIN_COMPBUF_KB: u32 = 128;

/// Dummy clock change override value that disables watermark set C
pub const DUMMY_PSTATE_DISABLED_NS: u32 = 0x7FFF_FFFF;

const_assert!(MIN_DET_KB <= DEFAULT_DET_KB && DEFAULT_DET_KB <= MAX_DET_KB);
const_assert!(MAX_DET_KB % DET_SEGMENT_KB == 0);
const_assert!(MIN_DET_KB % DET_SEGMENT_KB == 0);
const_assert!(MIN_DET_KB as usize * MAX_PIPES * 2 <= MAX_DET_KB as usize);

// =============================================================================
// SOC BOUNDING BOX
// =============================================================================

/// Memory subsystem and latency parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SocBoundingBox {
    /// DRAM channels
    pub num_chans: u32,
    /// Bytes per DRAM channel transfer
    pub dram_channel_width_bytes: u32,
    /// DCHUB return bus width in bytes per DCFCLK
    pub return_bus_width_bytes: u32,
    /// Fabric datapath bytes per FCLK towards the display
    pub fabric_datapath_to_dcn_data_return_bytes: u32,
    /// SDP bandwidth share still available after an urgent request
    pub pct_ideal_sdp_bw_after_urgent: f64,
    /// Fabric bandwidth share still available after an urgent request
    pub pct_ideal_fabric_bw_after_urgent: f64,
    /// DRAM bandwidth share still available for pixel data after urgent
    pub pct_ideal_dram_bw_after_urgent_pixel_only: f64,
    /// Average SDP share the display may use in normal operation
    pub max_avg_sdp_bw_use_normal_percent: f64,
    /// Average fabric share the display may use in normal operation
    pub max_avg_fabric_bw_use_normal_percent: f64,
    /// Average DRAM share the display may use in normal operation
    pub max_avg_dram_bw_use_normal_percent: f64,
    /// DISPCLK/DPPCLK spread spectrum
    pub dcn_downspread_percent: f64,
    /// DISPCLK ramping margin
    pub dispclk_ramping_margin_percent: f64,
    /// DENTIST VCO frequency
    pub dispclk_dppclk_vco_speed_mhz: f64,
    /// Urgent latency for pixel data
    pub urgent_latency_pixel_data_only_us: f64,
    /// Urgent latency for mixed pixel/VM data
    pub urgent_latency_pixel_mixed_with_vm_data_us: f64,
    /// Urgent latency for VM data
    pub urgent_latency_vm_data_only_us: f64,
    /// Scale urgent latency with the fabric clock
    pub do_urgent_latency_adjustment: bool,
    /// Fabric clock dependent part of the urgent latency
    pub urgent_latency_adjustment_fabric_clock_component_us: f64,
    /// Fabric clock at which the component above was characterised
    pub urgent_latency_adjustment_fabric_clock_reference_mhz: f64,
    /// Out-of-order return buffering per channel
    pub urgent_out_of_order_return_per_channel_bytes: u32,
    /// DCHUB round trip in DCFCLK cycles
    pub round_trip_ping_latency_dcfclk_cycles: u32,
    /// Self refresh exit time
    pub sr_exit_time_us: f64,
    /// Self refresh enter + exit time
    pub sr_enter_plus_exit_time_us: f64,
    /// DRAM clock change (UCLK p-state) latency
    pub dram_clock_change_latency_us: f64,
    /// FCLK change latency
    pub fclk_change_latency_us: f64,
    /// USR retraining latency
    pub usr_retraining_latency_us: f64,
    /// SMN access latency
    pub smn_latency_us: f64,
    /// MALL capacity reserved for the display
    pub mall_allocated_for_dcn_mbytes: u32,
}

impl SocBoundingBox {
    /// Bounding box of the reference DCN 3.2 SoC
    pub const DEFAULT: Self = Self {
        num_chans: 24,
        dram_channel_width_bytes: 2,
        return_bus_width_bytes: 64,
        fabric_datapath_to_dcn_data_return_bytes: 64,
        pct_ideal_sdp_bw_after_urgent: 90.0,
        pct_ideal_fabric_bw_after_urgent: 67.0,
        pct_ideal_dram_bw_after_urgent_pixel_only: 20.0,
        max_avg_sdp_bw_use_normal_percent: 80.0,
        max_avg_fabric_bw_use_normal_percent: 60.0,
        max_avg_dram_bw_use_normal_percent: 15.0,
        dcn_downspread_percent: 0.5,
        dispclk_ramping_margin_percent: 1.0,
        dispclk_dppclk_vco_speed_mhz: 4300.0,
        urgent_latency_pixel_data_only_us: 4.0,
        urgent_latency_pixel_mixed_with_vm_data_us: 4.0,
        urgent_latency_vm_data_only_us: 4.0,
        do_urgent_latency_adjustment: true,
        urgent_latency_adjustment_fabric_clock_component_us: 1.0,
        urgent_latency_adjustment_fabric_clock_reference_mhz: 1000.0,
        urgent_out_of_order_return_per_channel_bytes: 4096,
        round_trip_ping_latency_dcfclk_cycles: 263,
        sr_exit_time_us: 42.97,
        sr_enter_plus_exit_time_us: 49.94,
        dram_clock_change_latency_us: 400.0,
        fclk_change_latency_us: 20.0,
        usr_retraining_latency_us: 2.0,
        smn_latency_us: 2.0,
        mall_allocated_for_dcn_mbytes: 64,
    };
}

/// Clock values used when firmware reports nothing for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultClockLimits {
    /// DCFCLK
    pub dcfclk_mhz: u32,
    /// Data fabric clock
    pub fabricclk_mhz: u32,
    /// DISPCLK
    pub dispclk_mhz: u32,
    /// DPPCLK
    pub dppclk_mhz: u32,
    /// PHYCLK
    pub phyclk_mhz: u32,
    /// SOCCLK
    pub socclk_mhz: u32,
    /// DTBCLK
    pub dtbclk_mhz: u32,
    /// DRAM speed in MT/s
    pub dram_speed_mts: u32,
}

impl DefaultClockLimits {
    /// Single-state limits of the reference SoC
    pub const DEFAULT: Self = Self {
        dcfclk_mhz: 1564,
        fabricclk_mhz: 2500,
        dispclk_mhz: 2150,
        dppclk_mhz: 2150,
        phyclk_mhz: 810,
        socclk_mhz: 1200,
        dtbclk_mhz: 1564,
        dram_speed_mts: 18000,
    };
}

// =============================================================================
// IP PARAMETERS
// =============================================================================

/// Fixed properties of the display controller IP
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IpParams {
    /// DPP pipes
    pub max_num_dpp: usize,
    /// Output timing generators
    pub max_num_otg: usize,
    /// Return buffer shared by DET and compressed buffer, in KB
    pub config_return_buffer_size_kb: u32,
    /// DCHUB to PSCL throughput in pixels per DPPCLK
    pub max_dchub_pscl_bw_pix_per_clk: f64,
    /// PSCL to line buffer throughput in pixels per DPPCLK
    pub max_pscl_lb_bw_pix_per_clk: f64,
    /// Pixel throughput a single pipe sustains
    pub max_pipe_pixel_rate_mhz: f64,
    /// Widest viewport a single pipe scans
    pub max_viewport_width: u32,
    /// DCHUB pixel chunk size
    pub pixel_chunk_size_kbytes: u32,
    /// Inter-tile repeaters on the DCN path
    pub max_inter_dcn_tile_repeaters: u32,
    /// Largest vertical ratio allowed during prefetch
    pub max_vratio_pre: f64,
    /// Fewest lines a prefetch may be scheduled in
    pub min_prefetch_lines: f64,
    /// DLG reference clock
    pub dlg_ref_clk_mhz: f64,
    /// Floor of the deep sleep DCFCLK
    pub dcfclk_deep_sleep_min_mhz: f64,
    /// Firmware processing delay at SubVP start
    pub subvp_fw_processing_delay_us: f64,
    /// Required p-state allow window width for SubVP
    pub subvp_pstate_allow_width_us: f64,
    /// SUB_VP_START_LINE alignment margin
    pub subvp_swath_height_margin_lines: u32,
    /// Streams at or above this refresh never use SubVP
    pub subvp_max_refresh_hz: f64,
    /// Streams above this pixel clock never use SubVP
    pub subvp_max_pixel_rate_mhz: f64,
}

impl IpParams {
    /// Reference DCN 3.2 IP
    pub const DEFAULT: Self = Self {
        max_num_dpp: MAX_PIPES,
        max_num_otg: MAX_PIPES,
        config_return_buffer_size_kb: 1280,
        max_dchub_pscl_bw_pix_per_clk: 4.0,
        max_pscl_lb_bw_pix_per_clk: 2.0,
        max_pipe_pixel_rate_mhz: 400.0,
        max_viewport_width: 4096,
        pixel_chunk_size_kbytes: 8,
        max_inter_dcn_tile_repeaters: 8,
        max_vratio_pre: 4.0,
        min_prefetch_lines: 2.0,
        dlg_ref_clk_mhz: 100.0,
        dcfclk_deep_sleep_min_mhz: 8.0,
        subvp_fw_processing_delay_us: 15.0,
        subvp_pstate_allow_width_us: 20.0,
        subvp_swath_height_margin_lines: 16,
        subvp_max_refresh_hz: 120.0,
        subvp_max_pixel_rate_mhz: 1800.0,
    };

    /// DET pool available to pipes, in KB
    #[inline]
    pub const fn det_pool_kb(&self) -> u32 {
        self.config_return_buffer_size_kb.saturating_sub(MIN_COMPBUF_KB)
    }
}

// =============================================================================
// LATENCIES
// =============================================================================

/// Latency assumptions of one watermark computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyInputs {
    /// DRAM clock change latency
    pub dram_clock_change_us: f64,
    /// FCLK change latency
    pub fclk_change_us: f64,
    /// Self refresh exit
    pub sr_exit_us: f64,
    /// Self refresh enter + exit
    pub sr_enter_plus_exit_us: f64,
}

impl LatencyInputs {
    /// Latencies straight from the bounding box
    pub const fn from_soc(soc: &SocBoundingBox) -> Self {
        Self {
            dram_clock_change_us: soc.dram_clock_change_latency_us,
            fclk_change_us: soc.fclk_change_latency_us,
            sr_exit_us: soc.sr_exit_time_us,
            sr_enter_plus_exit_us: soc.sr_enter_plus_exit_time_us,
        }
    }

    /// Copy with a different DRAM clock change latency
    pub const fn with_dram_clock_change(mut self, us: f64) -> Self {
        self.dram_clock_change_us = us;
        self
    }
}

/// One row of the dummy p-state table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DummyPstateEntry {
    /// DRAM speed this latency applies to
    pub dram_speed_mts: u32,
    /// Assumed switch latency
    pub dummy_pstate_latency_us: f64,
}

/// Dummy p-state latencies of the reference SoC
pub const DEFAULT_DUMMY_PSTATE_TABLE: [DummyPstateEntry; NUM_DUMMY_PSTATE_ENTRIES] = [
    DummyPstateEntry {
        dram_speed_mts: 1600,
        dummy_pstate_latency_us: 38.0,
    },
    DummyPstateEntry {
        dram_speed_mts: 11000,
        dummy_pstate_latency_us: 11.0,
    },
    DummyPstateEntry {
        dram_speed_mts: 20000,
        dummy_pstate_latency_us: 20.0,
    },
    DummyPstateEntry {
        dram_speed_mts: 24000,
        dummy_pstate_latency_us: 24.0,
    },
];

// =============================================================================
// DEBUG OPTIONS
// =============================================================================

/// Latency overrides from the driver configuration, 0 means "not set"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BbOverrides {
    /// Self refresh exit, ns
    pub sr_exit_time_ns: u32,
    /// Self refresh enter + exit, ns
    pub sr_enter_plus_exit_time_ns: u32,
    /// Urgent latency, ns
    pub urgent_latency_ns: u32,
    /// DRAM clock change latency, ns
    pub dram_clock_change_latency_ns: u32,
    /// FCLK change latency, ns
    pub fclk_clock_change_latency_ns: u32,
    /// Dummy p-state latency for set C, ns; [`DUMMY_PSTATE_DISABLED_NS`] disables set C
    pub dummy_clock_change_latency_ns: u32,
}

/// Driver debug knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugOptions {
    /// Bounding box overrides
    pub bb_overrides: BbOverrides,
    /// Extra lines added to every phantom pipe
    pub subvp_extra_lines: u32,
    /// Never build phantom pipes
    pub force_disable_subvp: bool,
    /// DISPCLK floor in kHz
    pub min_disp_clk_khz: u32,
    /// DPPCLK floor in kHz
    pub min_dpp_clk_khz: u32,
}

// =============================================================================
// SOC STATE
// =============================================================================

/// Everything a validation pass reads, built as one unit
///
/// A state is never modified once published; the bounding-box updater
/// produces a new one and the manager swaps it in.
#[derive(Debug, Clone)]
pub struct SocState {
    /// Memory subsystem parameters after overrides
    pub soc: SocBoundingBox,
    /// Display controller parameters
    pub ip: IpParams,
    /// Driver debug knobs
    pub debug: DebugOptions,
    /// Fallback clocks for unpopulated DPM domains
    pub defaults: DefaultClockLimits,
    /// Operating points, ascending
    pub table: VoltageTable,
    /// Patched firmware DPM table the operating points were built from
    pub dpm: DpmTable,
    /// Dummy p-state latencies for firmware-driven memory clock switching
    pub dummy_pstate_table: [DummyPstateEntry; NUM_DUMMY_PSTATE_ENTRIES],
    /// Incremented on every bounding-box rebuild
    pub generation: u64,
}

impl SocState {
    /// State with an empty operating point table
    pub fn new(soc: SocBoundingBox, ip: IpParams, debug: DebugOptions) -> Self {
        Self {
            soc,
            ip,
            debug,
            defaults: DefaultClockLimits::DEFAULT,
            table: VoltageTable::new(SortKey::NetBandwidth),
            dpm: DpmTable::empty(),
            dummy_pstate_table: DEFAULT_DUMMY_PSTATE_TABLE,
            generation: 0,
        }
    }

    /// Replace the operating point table
    pub fn with_table(mut self, table: VoltageTable) -> Self {
        self.table = table;
        self
    }

    /// Replace the dummy p-state table
    pub fn with_dummy_pstate_table(
        mut self,
        table: [DummyPstateEntry; NUM_DUMMY_PSTATE_ENTRIES],
    ) -> Self {
        self.dummy_pstate_table = table;
        self
    }

    /// Latencies for normal (set A) operation
    #[inline]
    pub fn latency(&self) -> LatencyInputs {
        LatencyInputs::from_soc(&self.soc)
    }
}

impl Default for SocState {
    fn default() -> Self {
        Self::new(SocBoundingBox::DEFAULT, IpParams::DEFAULT, DebugOptions::default())
    }
}
