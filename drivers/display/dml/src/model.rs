//! # Bandwidth and Latency Model
//!
//! Pure formulas shared by the validator, the watermark builder and the
//! bounding-box updater. Nothing here touches state: every input is an
//! explicit argument so each formula can be checked in isolation.
//!
//! Units: clocks in MHz, bandwidth in MB/s (bytes per microsecond), time in
//! microseconds. Dividing bytes by MB/s therefore yields microseconds.

use libm::{ceil, floor};

use crate::soc::{IpParams, SocBoundingBox};
use crate::timing::{ScalerConfig, Timing};

/// DCFCLK margin applied to deep sleep requirements
pub const MIN_DCFCLK_FACTOR: f64 = 1.15;

/// Largest prefetch window the DLG can be programmed with, in lines
pub const MAX_DST_Y_PREFETCH: f64 = 63.75;

/// Cycles added to the round trip ping for request arbitration
const ARB_OVERHEAD_DCFCLK_CYCLES: f64 = 32.0;

// =============================================================================
// BANDWIDTH
// =============================================================================

/// Peak DRAM bandwidth at a memory speed
#[inline]
pub fn dram_bw_mbps(soc: &SocBoundingBox, dram_speed_mts: f64) -> f64 {
    dram_speed_mts * soc.num_chans as f64 * soc.dram_channel_width_bytes as f64
}

/// Peak fabric bandwidth towards the display at a fabric clock
#[inline]
pub fn fabric_bw_mbps(soc: &SocBoundingBox, fabricclk_mhz: f64) -> f64 {
    fabricclk_mhz * soc.fabric_datapath_to_dcn_data_return_bytes as f64
}

/// Peak SDP (return bus) bandwidth at a DCFCLK
#[inline]
pub fn sdp_bw_mbps(soc: &SocBoundingBox, dcfclk_mhz: f64) -> f64 {
    dcfclk_mhz * soc.return_bus_width_bytes as f64
}

/// Bandwidth the display may rely on after an urgent request
///
/// The smallest of the SDP, fabric and DRAM paths, each derated by the
/// share that survives urgent arbitration.
pub fn net_bandwidth_mbps(
    soc: &SocBoundingBox,
    dcfclk_mhz: f64,
    fabricclk_mhz: f64,
    dram_speed_mts: f64,
) -> f64 {
    let sdp = sdp_bw_mbps(soc, dcfclk_mhz) * soc.pct_ideal_sdp_bw_after_urgent / 100.0;
    let fabric =
        fabric_bw_mbps(soc, fabricclk_mhz) * soc.pct_ideal_fabric_bw_after_urgent / 100.0;
    let dram = dram_bw_mbps(soc, dram_speed_mts) * soc.pct_ideal_dram_bw_after_urgent_pixel_only
        / 100.0;
    sdp.min(fabric).min(dram)
}

// =============================================================================
// LATENCY
// =============================================================================

/// Urgent latency at a fabric clock
///
/// With adjustment enabled the fabric component scales inversely with the
/// fabric clock relative to its characterisation point.
pub fn urgent_latency_us(soc: &SocBoundingBox, fabricclk_mhz: f64) -> f64 {
    let base = soc.urgent_latency_pixel_data_only_us;
    if !soc.do_urgent_latency_adjustment || fabricclk_mhz <= 0.0 {
        return base;
    }
    base + soc.urgent_latency_adjustment_fabric_clock_component_us
        * (soc.urgent_latency_adjustment_fabric_clock_reference_mhz / fabricclk_mhz - 1.0)
}

/// Latency beyond the urgent latency before the first pixel returns
///
/// Round trip through DCHUB plus draining of the out-of-order return
/// buffers and one pixel chunk per active pipe.
pub fn extra_latency_us(
    soc: &SocBoundingBox,
    ip: &IpParams,
    dcfclk_mhz: f64,
    return_bw_mbps: f64,
    active_dpp: usize,
) -> f64 {
    let ping = (soc.round_trip_ping_latency_dcfclk_cycles as f64 + ARB_OVERHEAD_DCFCLK_CYCLES)
        / dcfclk_mhz;
    let reorder = soc.urgent_out_of_order_return_per_channel_bytes as f64 * soc.num_chans as f64;
    let chunks = active_dpp as f64 * ip.pixel_chunk_size_kbytes as f64 * 1024.0;
    ping + (reorder + chunks) / return_bw_mbps
}

// =============================================================================
// CLOCKS
// =============================================================================

/// Round a clock up to what the DENTIST divider can produce from the VCO
pub fn dfs_round_mhz(vco_mhz: f64, clk_mhz: f64) -> f64 {
    if clk_mhz <= 0.0 {
        return 0.0;
    }
    let divider = floor(vco_mhz * 4.0 / clk_mhz);
    if divider < 1.0 {
        return clk_mhz;
    }
    vco_mhz * 4.0 / divider
}

/// Scaler throughput in pixels per DPPCLK
pub fn pscl_throughput(ip: &IpParams, hratio: f64, htaps: u32) -> f64 {
    if hratio > 1.0 {
        ip.max_dchub_pscl_bw_pix_per_clk
            .min(ip.max_pscl_lb_bw_pix_per_clk * hratio / ceil(htaps as f64 / 6.0))
    } else {
        ip.max_dchub_pscl_bw_pix_per_clk.min(ip.max_pscl_lb_bw_pix_per_clk)
    }
}

fn single_plane_dppclk(ip: &IpParams, pixel_rate_mhz: f64, hratio: f64, vratio: f64, htaps: u32, vtaps: u32) -> f64 {
    let throughput = pscl_throughput(ip, hratio, htaps);
    let mut clk = pixel_rate_mhz
        * (vtaps as f64 / 6.0 * hratio.min(1.0))
            .max(hratio * vratio / throughput)
            .max(1.0);
    if (htaps > 6 || vtaps > 6) && clk < 2.0 * pixel_rate_mhz {
        clk = 2.0 * pixel_rate_mhz;
    }
    clk
}

/// DPPCLK one pipe needs to scale `pixel_rate_mhz`, before spread spectrum
pub fn single_dpp_clock_mhz(
    ip: &IpParams,
    pixel_rate_mhz: f64,
    scaler: &ScalerConfig,
    dual_plane: bool,
) -> f64 {
    let luma = single_plane_dppclk(
        ip,
        pixel_rate_mhz,
        scaler.hratio,
        scaler.vratio,
        scaler.htaps,
        scaler.vtaps,
    );
    if !dual_plane {
        return luma;
    }
    let chroma = single_plane_dppclk(
        ip,
        pixel_rate_mhz,
        scaler.hratio_c,
        scaler.vratio_c,
        scaler.htaps_c,
        scaler.vtaps_c,
    );
    luma.max(chroma)
}

/// DPPCLK to program, spread spectrum included and DFS rounded
pub fn required_dppclk_mhz(soc: &SocBoundingBox, single_dpp_mhz: f64) -> f64 {
    dfs_round_mhz(
        soc.dispclk_dppclk_vco_speed_mhz,
        single_dpp_mhz * (1.0 + soc.dcn_downspread_percent / 100.0),
    )
}

/// DISPCLK to program for a pipe pixel rate, DFS rounded
pub fn required_dispclk_mhz(soc: &SocBoundingBox, pipe_pixel_rate_mhz: f64) -> f64 {
    dfs_round_mhz(
        soc.dispclk_dppclk_vco_speed_mhz,
        pipe_pixel_rate_mhz
            * (1.0 + soc.dcn_downspread_percent / 100.0)
            * (1.0 + soc.dispclk_ramping_margin_percent / 100.0),
    )
}

/// Deep sleep DCFCLK one pipe needs to keep delivering lines
pub fn deep_sleep_dcfclk_per_pipe_mhz(
    bytes_per_line_luma: f64,
    delivery_time_luma_us: f64,
    bytes_per_line_chroma: f64,
    delivery_time_chroma_us: f64,
    pixel_rate_mhz: f64,
) -> f64 {
    let mut clk = MIN_DCFCLK_FACTOR * bytes_per_line_luma / 32.0 / delivery_time_luma_us;
    if bytes_per_line_chroma > 0.0 && delivery_time_chroma_us > 0.0 {
        clk = clk.max(MIN_DCFCLK_FACTOR * bytes_per_line_chroma / 32.0 / delivery_time_chroma_us);
    }
    clk.max(pixel_rate_mhz / 16.0)
}

/// Deep sleep DCFCLK for the whole configuration
pub fn deep_sleep_dcfclk_mhz(
    soc: &SocBoundingBox,
    ip: &IpParams,
    total_read_bw_mbps: f64,
    max_per_pipe_mhz: f64,
) -> f64 {
    ip.dcfclk_deep_sleep_min_mhz
        .max(MIN_DCFCLK_FACTOR * total_read_bw_mbps / soc.return_bus_width_bytes as f64)
        .max(max_per_pipe_mhz)
}

// =============================================================================
// DET AND PREFETCH
// =============================================================================

/// Whole swaths of `bytes_per_line` that fit into a DET share
pub fn lines_in_det(det_bytes: f64, bytes_per_line: f64, swath_height: u32) -> u32 {
    if bytes_per_line <= 0.0 || swath_height == 0 {
        return 0;
    }
    let lines = floor(det_bytes / bytes_per_line) as u32;
    lines - lines % swath_height
}

/// Burst factor needed to refill the DET within the urgent latency
///
/// `None` when the buffered time cannot hide the latency at all.
pub fn urgent_burst_factor(det_buffer_time_us: f64, urgent_latency_us: f64) -> Option<f64> {
    let slack = det_buffer_time_us - urgent_latency_us;
    if slack <= 0.0 {
        None
    } else {
        Some(det_buffer_time_us / slack)
    }
}

/// Lines between vstartup and the first active line
pub fn vstartup_lines(timing: &Timing) -> u32 {
    timing
        .v_blank()
        .saturating_sub(timing.v_front_porch.max(1))
}

/// Initial scaler phase in source lines
#[inline]
pub fn vinit(vratio: f64, vtaps: u32) -> f64 {
    floor((vratio + vtaps as f64 + 1.0) / 2.0)
}

/// Source lines fetched during prefetch
pub fn prefetch_source_lines(vratio: f64, vtaps: u32, swath_height: u32) -> f64 {
    let swath = swath_height as f64;
    (ceil(vinit(vratio, vtaps) / swath) + 1.0) * swath
}

/// Lines left for prefetch after latency overhead, in quarter lines
pub fn dst_y_prefetch(vstartup_lines: u32, overhead_lines: f64) -> f64 {
    let lines = (vstartup_lines as f64 - overhead_lines).min(MAX_DST_Y_PREFETCH);
    if lines <= 0.0 {
        0.0
    } else {
        floor(lines * 4.0) / 4.0
    }
}

/// Vertical ratio needed to fetch `source_lines` within `dst_y_prefetch`
pub fn vratio_prefetch(source_lines: f64, dst_y_prefetch: f64) -> f64 {
    if dst_y_prefetch <= 0.0 {
        return f64::INFINITY;
    }
    (source_lines / dst_y_prefetch).max(1.0)
}

// =============================================================================
// VUPDATE / VREADY
// =============================================================================

/// Inter-tile repeater delay
pub fn total_repeater_delay_us(ip: &IpParams, dppclk_mhz: f64, dispclk_mhz: f64) -> f64 {
    ip.max_inter_dcn_tile_repeaters as f64 * (2.0 / dppclk_mhz + 3.0 / dispclk_mhz)
}

/// VUPDATE offset in pixels
#[inline]
pub fn vupdate_offset_pix(h_total: u32) -> u32 {
    h_total.div_ceil(4)
}

/// VUPDATE width in pixels
pub fn vupdate_width_pix(
    ip: &IpParams,
    dcfclk_deep_sleep_mhz: f64,
    dppclk_mhz: f64,
    dispclk_mhz: f64,
    pixel_rate_mhz: f64,
) -> u32 {
    let t = 14.0 / dcfclk_deep_sleep_mhz
        + 12.0 / dppclk_mhz
        + total_repeater_delay_us(ip, dppclk_mhz, dispclk_mhz);
    ceil(t * pixel_rate_mhz) as u32
}

/// VREADY offset in pixels
pub fn vready_offset_pix(
    ip: &IpParams,
    dcfclk_deep_sleep_mhz: f64,
    dppclk_mhz: f64,
    dispclk_mhz: f64,
    pixel_rate_mhz: f64,
) -> u32 {
    let t = (150.0 / dppclk_mhz).max(
        total_repeater_delay_us(ip, dppclk_mhz, dispclk_mhz)
            + 20.0 / dcfclk_deep_sleep_mhz
            + 10.0 / dppclk_mhz,
    );
    ceil(t * pixel_rate_mhz) as u32
}
