//! # Bandwidth Validator
//!
//! The core search. Operating points are tried strictly in ascending order
//! and the first one where every pipe fits wins:
//!
//! ```text
//!   streams ──► split prediction ──► pipes ──► DET allocation
//!                     ▲                              │
//!                     │ raise one split              ▼
//!                     └──────── none fit ◄──── sweep vlevel 0..n
//!                                                    │ first fit
//!                                                    ▼
//!                              clock change support (full mode: SubVP)
//! ```
//!
//! A level is feasible only when all of these hold at once:
//!
//! - every pipe's DPPCLK and DISPCLK fit the level
//! - the deep sleep DCFCLK fits the level
//! - every pipe's DET hides the urgent latency
//! - every pipe can prefetch (at least two lines, vertical ratio <= 4)
//! - average DRAM, fabric and SDP usage stay within their normal share
//! - urgent bandwidth stays within the return bandwidth

use arrayvec::ArrayVec;
use libm::ceil;

use crate::clk_table::VoltageLevel;
use crate::det::{allocate_det, DetAllocation};
use crate::error::{Error, Result};
use crate::model;
use crate::phantom::{self, SubVpConfig};
use crate::soc::{SocState, MAX_PIPES};
use crate::split::{next_split, required_split, PipeLimits};
use crate::timing::{PipeDescriptor, StreamDescriptor};

// =============================================================================
// TYPES
// =============================================================================

/// How much of the validation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateMode {
    /// Feasibility only: no SubVP, no watermarks
    Fast,
    /// Feasibility plus SubVP fallback, ready for watermark computation
    Full,
}

/// How a clock switch is hidden from the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockChangeSupport {
    /// Every pipe rides through the switch on its DET during active
    Vactive,
    /// One display switches during vertical blank
    Vblank,
    /// SubVP covers the pipes that cannot switch in active or blank
    VblankWithMallSubVp,
    /// Switching would underflow
    Unsupported,
}

impl ClockChangeSupport {
    /// True unless switching would underflow
    #[inline]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// First constraint a level failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Pipe needs more DPPCLK than the level offers
    Dppclk {
        /// Pipe index
        pipe: usize,
    },
    /// Pipe needs more DISPCLK than the level offers
    Dispclk {
        /// Pipe index
        pipe: usize,
    },
    /// Deep sleep DCFCLK above the level DCFCLK
    DeepSleepDcfclk,
    /// DET cannot hide the urgent latency
    UrgentLatencyHiding {
        /// Pipe index
        pipe: usize,
    },
    /// Prefetch cannot be scheduled in vertical blank
    Prefetch {
        /// Pipe index
        pipe: usize,
    },
    /// Average DRAM bandwidth above its share
    DramBandwidth,
    /// Average fabric bandwidth above its share
    FabricBandwidth,
    /// Average SDP bandwidth above its share
    SdpBandwidth,
    /// Urgent bandwidth above the return bandwidth
    UrgentBandwidth,
}

/// Model values of one pipe at one level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeEvaluation {
    /// DPPCLK this pipe needs
    pub dppclk_mhz: f64,
    /// DISPCLK this pipe needs
    pub dispclk_mhz: f64,
    /// Deep sleep DCFCLK this pipe needs
    pub dcfclk_deep_sleep_mhz: f64,
    /// Average read bandwidth
    pub read_bw_mbps: f64,
    /// Luma lines held in DET
    pub lines_in_det_luma: u32,
    /// Chroma lines held in DET
    pub lines_in_det_chroma: u32,
    /// Time the DET sustains scanout without returns
    pub det_buffer_time_us: f64,
    /// Urgent burst factor, `None` if the DET cannot hide the urgent latency
    pub urgent_burst_factor: Option<f64>,
    /// Lines from vstartup to active
    pub vstartup_lines: u32,
    /// Lines available for prefetch
    pub dst_y_prefetch: f64,
    /// Luma vertical ratio during prefetch
    pub vratio_prefetch: f64,
    /// Chroma vertical ratio during prefetch
    pub vratio_prefetch_c: f64,
    /// Bandwidth during prefetch
    pub prefetch_bw_mbps: f64,
    /// Luma line delivery time through the scaler
    pub line_delivery_time_luma_us: f64,
    /// Chroma line delivery time through the scaler
    pub line_delivery_time_chroma_us: f64,
}

/// Model values of a whole pipe set at one level
#[derive(Debug, Clone, PartialEq)]
pub struct LevelEvaluation {
    /// Index of the level
    pub vlevel: usize,
    /// The level itself
    pub level: VoltageLevel,
    /// Return bandwidth
    pub return_bw_mbps: f64,
    /// Urgent latency at this fabric clock
    pub urgent_latency_us: f64,
    /// Extra latency at this DCFCLK
    pub extra_latency_us: f64,
    /// Largest DISPCLK any pipe needs
    pub dispclk_mhz: f64,
    /// Largest DPPCLK any pipe needs
    pub dppclk_mhz: f64,
    /// Deep sleep DCFCLK for the configuration
    pub dcfclk_deep_sleep_mhz: f64,
    /// Sum of average read bandwidth
    pub total_read_bw_mbps: f64,
    /// Sum of urgent bandwidth
    pub urgent_bw_mbps: f64,
    /// Per pipe values, in pipe order
    pub pipes: ArrayVec<PipeEvaluation, MAX_PIPES>,
    /// First failed constraint, `None` when the level is feasible
    pub rejection: Option<Rejection>,
}

impl LevelEvaluation {
    /// True when every constraint holds
    #[inline]
    pub fn is_feasible(&self) -> bool {
        self.rejection.is_none()
    }

    /// Urgent latency plus extra latency
    #[inline]
    pub fn urgent_watermark_us(&self) -> f64 {
        self.urgent_latency_us + self.extra_latency_us
    }
}

/// Outcome of a successful validation pass
#[derive(Debug, Clone, PartialEq)]
pub struct BwContext {
    /// Requested streams
    pub streams: ArrayVec<StreamDescriptor, MAX_PIPES>,
    /// Split factor per stream
    pub splits: ArrayVec<u8, MAX_PIPES>,
    /// Finalized pipes, main pipes first
    pub pipes: ArrayVec<PipeDescriptor, MAX_PIPES>,
    /// DET accounting of `pipes`
    pub det: DetAllocation,
    /// Chosen level
    pub vlevel: usize,
    /// Model values at the chosen level
    pub evaluation: LevelEvaluation,
    /// DRAM clock change support at the chosen level
    pub dram_change: ClockChangeSupport,
    /// FCLK change support at the chosen level
    pub fclk_change: ClockChangeSupport,
    /// Sub-viewport configuration when phantom pipes are in use
    pub subvp: Option<SubVpConfig>,
    /// Mode the pass ran in
    pub mode: ValidateMode,
}

impl BwContext {
    /// Pipes including phantoms
    #[inline]
    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    /// Phantom pipes
    pub fn phantom_count(&self) -> usize {
        self.pipes.iter().filter(|p| p.is_phantom()).count()
    }
}

// =============================================================================
// LEVEL EVALUATION
// =============================================================================

fn evaluate_pipe(
    state: &SocState,
    pipe: &PipeDescriptor,
    urgent_latency_us: f64,
    extra_latency_us: f64,
) -> PipeEvaluation {
    let soc = &state.soc;
    let ip = &state.ip;
    let debug = &state.debug;
    let dual = pipe.surface.is_dual_plane();
    let pipe_rate = pipe.pipe_pixel_rate_mhz();
    let line_time = pipe.line_time_us();

    let single = model::single_dpp_clock_mhz(ip, pipe_rate, &pipe.scaler, dual);
    let dppclk_mhz =
        model::required_dppclk_mhz(soc, single).max(debug.min_dpp_clk_khz as f64 / 1000.0);
    let dispclk_mhz = model::required_dispclk_mhz(soc, pipe_rate)
        .max(debug.min_disp_clk_khz as f64 / 1000.0);

    let bytes_l = pipe.bytes_per_line_luma();
    let bytes_c = pipe.bytes_per_line_chroma();
    let line_delivery_time_luma_us = pipe.viewport_width as f64 / pipe.scaler.hratio / pipe_rate;
    let line_delivery_time_chroma_us = if dual {
        (pipe.viewport_width / 2) as f64 / pipe.scaler.hratio_c / pipe_rate
    } else {
        0.0
    };
    let dcfclk_deep_sleep_mhz = model::deep_sleep_dcfclk_per_pipe_mhz(
        bytes_l,
        line_delivery_time_luma_us,
        bytes_c,
        line_delivery_time_chroma_us,
        pipe.pixel_rate_mhz(),
    );

    let det_bytes = pipe.det_size_kb as f64 * 1024.0;
    let (det_l, det_c) = if dual {
        let share = bytes_l / (bytes_l + bytes_c);
        (det_bytes * share, det_bytes * (1.0 - share))
    } else {
        (det_bytes, 0.0)
    };
    let swath_l = pipe.surface.swath_height_luma();
    let swath_c = pipe.surface.swath_height_chroma();
    let lines_in_det_luma = model::lines_in_det(det_l, bytes_l, swath_l);
    let lines_in_det_chroma = if dual {
        model::lines_in_det(det_c, bytes_c, swath_c)
    } else {
        0
    };
    let mut det_buffer_time_us = lines_in_det_luma as f64 * line_time / pipe.scaler.vratio;
    if dual {
        det_buffer_time_us = det_buffer_time_us
            .min(lines_in_det_chroma as f64 * line_time / pipe.scaler.vratio_c);
    }
    let urgent_burst_factor = model::urgent_burst_factor(det_buffer_time_us, urgent_latency_us);

    let vstartup_lines = model::vstartup_lines(&pipe.timing);
    let overhead_lines = ceil((urgent_latency_us + extra_latency_us) / line_time);
    let dst_y_prefetch = model::dst_y_prefetch(vstartup_lines, overhead_lines);
    let src_l =
        model::prefetch_source_lines(pipe.scaler.vratio, pipe.scaler.vtaps, swath_l);
    let src_c = if dual {
        model::prefetch_source_lines(pipe.scaler.vratio_c, pipe.scaler.vtaps_c, swath_c)
    } else {
        0.0
    };
    let vratio_prefetch = model::vratio_prefetch(src_l, dst_y_prefetch);
    let vratio_prefetch_c = if dual {
        model::vratio_prefetch(src_c, dst_y_prefetch)
    } else {
        0.0
    };
    let prefetch_bw_mbps = if dst_y_prefetch > 0.0 {
        (src_l * bytes_l + src_c * bytes_c) / (dst_y_prefetch * line_time)
    } else {
        f64::INFINITY
    };

    PipeEvaluation {
        dppclk_mhz,
        dispclk_mhz,
        dcfclk_deep_sleep_mhz,
        read_bw_mbps: pipe.read_bandwidth_mbps(),
        lines_in_det_luma,
        lines_in_det_chroma,
        det_buffer_time_us,
        urgent_burst_factor,
        vstartup_lines,
        dst_y_prefetch,
        vratio_prefetch,
        vratio_prefetch_c,
        prefetch_bw_mbps,
        line_delivery_time_luma_us,
        line_delivery_time_chroma_us,
    }
}

fn first_rejection(
    state: &SocState,
    level: &VoltageLevel,
    eval: &LevelEvaluation,
) -> Option<Rejection> {
    let soc = &state.soc;
    let ip = &state.ip;

    for (i, p) in eval.pipes.iter().enumerate() {
        if p.dppclk_mhz > level.dppclk_mhz {
            return Some(Rejection::Dppclk { pipe: i });
        }
        if p.dispclk_mhz > level.dispclk_mhz {
            return Some(Rejection::Dispclk { pipe: i });
        }
    }
    if eval.dcfclk_deep_sleep_mhz > level.dcfclk_mhz {
        return Some(Rejection::DeepSleepDcfclk);
    }
    for (i, p) in eval.pipes.iter().enumerate() {
        if p.urgent_burst_factor.is_none() {
            return Some(Rejection::UrgentLatencyHiding { pipe: i });
        }
        if p.dst_y_prefetch < ip.min_prefetch_lines
            || p.vratio_prefetch > ip.max_vratio_pre
            || p.vratio_prefetch_c > ip.max_vratio_pre
        {
            return Some(Rejection::Prefetch { pipe: i });
        }
    }

    let read = eval.total_read_bw_mbps;
    if read
        > model::dram_bw_mbps(soc, level.dram_speed_mts) * soc.max_avg_dram_bw_use_normal_percent
            / 100.0
    {
        return Some(Rejection::DramBandwidth);
    }
    if read
        > model::fabric_bw_mbps(soc, level.fabricclk_mhz)
            * soc.max_avg_fabric_bw_use_normal_percent
            / 100.0
    {
        return Some(Rejection::FabricBandwidth);
    }
    if read
        > model::sdp_bw_mbps(soc, level.dcfclk_mhz) * soc.max_avg_sdp_bw_use_normal_percent / 100.0
    {
        return Some(Rejection::SdpBandwidth);
    }
    if eval.urgent_bw_mbps > eval.return_bw_mbps {
        return Some(Rejection::UrgentBandwidth);
    }
    None
}

/// Evaluate `pipes` against the level at `vlevel`
pub fn evaluate_level(
    state: &SocState,
    pipes: &[PipeDescriptor],
    vlevel: usize,
) -> Result<LevelEvaluation> {
    let level = *state.table.get(vlevel).ok_or(Error::InvalidParameter)?;
    let soc = &state.soc;
    let return_bw_mbps = level.net_bw_mbps;
    let urgent_latency_us = model::urgent_latency_us(soc, level.fabricclk_mhz);
    let extra_latency_us = model::extra_latency_us(
        soc,
        &state.ip,
        level.dcfclk_mhz,
        return_bw_mbps,
        pipes.len(),
    );

    let mut eval = LevelEvaluation {
        vlevel,
        level,
        return_bw_mbps,
        urgent_latency_us,
        extra_latency_us,
        dispclk_mhz: 0.0,
        dppclk_mhz: 0.0,
        dcfclk_deep_sleep_mhz: 0.0,
        total_read_bw_mbps: 0.0,
        urgent_bw_mbps: 0.0,
        pipes: ArrayVec::new(),
        rejection: None,
    };

    let mut deep_sleep_per_pipe: f64 = 0.0;
    for pipe in pipes {
        let p = evaluate_pipe(state, pipe, urgent_latency_us, extra_latency_us);
        eval.dispclk_mhz = eval.dispclk_mhz.max(p.dispclk_mhz);
        eval.dppclk_mhz = eval.dppclk_mhz.max(p.dppclk_mhz);
        deep_sleep_per_pipe = deep_sleep_per_pipe.max(p.dcfclk_deep_sleep_mhz);
        eval.total_read_bw_mbps += p.read_bw_mbps;
        let burst = p.urgent_burst_factor.unwrap_or(f64::INFINITY);
        eval.urgent_bw_mbps += (p.read_bw_mbps * burst).max(p.prefetch_bw_mbps);
        if eval.pipes.try_push(p).is_err() {
            return Err(Error::PipeOverflow {
                required: pipes.len(),
                available: MAX_PIPES,
            });
        }
    }
    eval.dcfclk_deep_sleep_mhz = model::deep_sleep_dcfclk_mhz(
        soc,
        &state.ip,
        eval.total_read_bw_mbps,
        deep_sleep_per_pipe,
    );
    eval.rejection = first_rejection(state, &level, &eval);
    Ok(eval)
}

/// Lowest feasible level for `pipes`, `None` if no level fits
pub fn sweep_levels(state: &SocState, pipes: &[PipeDescriptor]) -> Result<Option<LevelEvaluation>> {
    for vlevel in 0..state.table.len() {
        let eval = evaluate_level(state, pipes, vlevel)?;
        if eval.is_feasible() {
            return Ok(Some(eval));
        }
        #[cfg(feature = "debug")]
        log::trace!("DML: vlevel {} rejected: {:?}", vlevel, eval.rejection);
    }
    Ok(None)
}

// =============================================================================
// CLOCK CHANGE SUPPORT
// =============================================================================

/// How a clock switch with `latency_us` can be hidden for `pipes`
///
/// With `use_mall` set, streams that own phantom pipes are covered by SubVP.
pub fn clock_change_support(
    pipes: &[PipeDescriptor],
    eval: &LevelEvaluation,
    latency_us: f64,
    use_mall: bool,
) -> ClockChangeSupport {
    let watermark = latency_us + eval.urgent_watermark_us();
    let subvp = use_mall && pipes.iter().any(PipeDescriptor::is_phantom);
    let covered = |stream: usize| {
        use_mall
            && pipes
                .iter()
                .any(|p| p.is_phantom() && p.stream_index == stream)
    };

    let mut blocking: ArrayVec<usize, MAX_PIPES> = ArrayVec::new();
    for (pipe, p) in pipes.iter().zip(eval.pipes.iter()) {
        if pipe.is_phantom() || covered(pipe.stream_index) {
            continue;
        }
        if p.det_buffer_time_us - watermark <= 0.0 && !blocking.contains(&pipe.stream_index) {
            blocking.push(pipe.stream_index);
        }
    }

    let supported = if subvp {
        ClockChangeSupport::VblankWithMallSubVp
    } else {
        ClockChangeSupport::Vactive
    };
    match blocking.as_slice() {
        [] => supported,
        [stream] => {
            let Some(pipe) = pipes.iter().find(|p| p.stream_index == *stream) else {
                return ClockChangeSupport::Unsupported;
            };
            let blank_us = pipe.timing.v_blank() as f64 * pipe.line_time_us();
            if blank_us < watermark {
                ClockChangeSupport::Unsupported
            } else if subvp {
                ClockChangeSupport::VblankWithMallSubVp
            } else {
                ClockChangeSupport::Vblank
            }
        },
        _ => ClockChangeSupport::Unsupported,
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Expand streams into pipes, main pipes only
pub fn build_pipes(
    streams: &[StreamDescriptor],
    splits: &[u8],
) -> Result<ArrayVec<PipeDescriptor, MAX_PIPES>> {
    let required: usize = splits.iter().map(|&s| s as usize).sum();
    let mut pipes = ArrayVec::new();
    for (i, (stream, &split)) in streams.iter().zip(splits.iter()).enumerate() {
        for k in 0..split {
            pipes
                .try_push(PipeDescriptor::for_stream(i, stream, k, split))
                .map_err(|_| Error::PipeOverflow {
                    required,
                    available: MAX_PIPES,
                })?;
        }
    }
    Ok(pipes)
}

fn escalate_split(state: &SocState, streams: &[StreamDescriptor], splits: &mut [u8]) -> bool {
    let used: usize = splits.iter().map(|&s| s as usize).sum();
    let candidate = streams
        .iter()
        .zip(splits.iter())
        .enumerate()
        .filter_map(|(i, (stream, &split))| {
            let next = next_split(split)?;
            let fits = used - split as usize + next as usize <= state.ip.max_num_dpp;
            fits.then(|| (i, next, stream.pixel_rate_mhz() / split as f64))
        })
        .max_by(|a, b| a.2.total_cmp(&b.2));

    match candidate {
        Some((i, next, _)) => {
            log::debug!("DML: no level fits, splitting stream {} {} ways", i, next);
            splits[i] = next;
            true
        },
        None => false,
    }
}

/// Find the lowest feasible level for `streams`
///
/// Fails with [`Error::InvalidTable`] before looking at the streams when the
/// table is unusable.
pub fn internal_validate_bw(
    state: &SocState,
    streams: &[StreamDescriptor],
    mode: ValidateMode,
) -> Result<BwContext> {
    state.table.check()?;
    let ip = &state.ip;
    if streams.is_empty() {
        return Err(Error::InvalidParameter);
    }
    let max_streams = ip.max_num_otg.min(MAX_PIPES);
    if streams.len() > max_streams {
        return Err(Error::PipeOverflow {
            required: streams.len(),
            available: max_streams,
        });
    }

    let limits = PipeLimits::from_ip(ip);
    let mut splits: ArrayVec<u8, MAX_PIPES> = ArrayVec::new();
    for stream in streams {
        stream.validate()?;
        splits.push(required_split(stream, &limits)?);
    }
    let required: usize = splits.iter().map(|&s| s as usize).sum();
    let available = ip.max_num_dpp.min(MAX_PIPES);
    if required > available {
        return Err(Error::PipeOverflow {
            required,
            available,
        });
    }

    let (pipes, det, evaluation) = loop {
        let mut pipes = build_pipes(streams, &splits)?;
        let det = allocate_det(ip, &mut pipes)?;
        if let Some(eval) = sweep_levels(state, &pipes)? {
            break (pipes, det, eval);
        }
        if !escalate_split(state, streams, &mut splits) {
            log::debug!("DML: {} stream(s) infeasible at every level", streams.len());
            return Err(Error::Infeasible);
        }
    };

    let latency = state.latency();
    let dram_change =
        clock_change_support(&pipes, &evaluation, latency.dram_clock_change_us, false);
    let fclk_change = clock_change_support(&pipes, &evaluation, latency.fclk_change_us, false);
    let mut ctx = BwContext {
        streams: streams.iter().copied().collect(),
        splits,
        pipes,
        det,
        vlevel: evaluation.vlevel,
        evaluation,
        dram_change,
        fclk_change,
        subvp: None,
        mode,
    };

    if mode == ValidateMode::Full
        && !ctx.dram_change.is_supported()
        && !state.debug.force_disable_subvp
    {
        if let Some(with_subvp) = phantom::try_subvp(state, &ctx)? {
            ctx = with_subvp;
        }
    }

    log::debug!(
        "DML: validated {} pipe(s) at vlevel {} ({:?})",
        ctx.pipe_count(),
        ctx.vlevel,
        ctx.dram_change
    );
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use crate::testutil;
    use crate::timing::{ColorDepth, PixelEncoding, Timing};

    fn fhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::FHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    fn uhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::UHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    #[test]
    fn test_empty_table_is_invalid() {
        let state = SocState::default();
        for mode in [ValidateMode::Fast, ValidateMode::Full] {
            assert_eq!(
                internal_validate_bw(&state, &[fhd()], mode),
                Err(Error::InvalidTable(TableError::Empty))
            );
        }
    }

    #[test]
    fn test_1080p60_single_pipe() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Full).unwrap();
        assert_eq!(ctx.splits.as_slice(), &[1]);
        assert_eq!(ctx.pipe_count(), 1);
        assert_eq!(ctx.vlevel, 0);
    }

    #[test]
    fn test_4k60_splits_and_validates() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        assert_eq!(ctx.splits.as_slice(), &[2]);
        assert_eq!(ctx.pipe_count(), 2);
        assert!(ctx.vlevel < state.table.len());
        assert!(ctx.evaluation.is_feasible());
    }

    #[test]
    fn test_chosen_level_is_lowest_feasible() {
        let state = testutil::ladder_state();
        let ctx = internal_validate_bw(&state, &[uhd(), fhd()], ValidateMode::Fast).unwrap();
        assert!(ctx.vlevel > 0);
        for v in 0..ctx.vlevel {
            let eval = evaluate_level(&state, &ctx.pipes, v).unwrap();
            assert!(!eval.is_feasible(), "vlevel {} fits but {} was chosen", v, ctx.vlevel);
        }
    }

    #[test]
    fn test_levels_above_choice_stay_feasible() {
        let state = testutil::ladder_state();
        let ctx = internal_validate_bw(&state, &[uhd(), fhd()], ValidateMode::Fast).unwrap();
        for v in ctx.vlevel..state.table.len() {
            let eval = evaluate_level(&state, &ctx.pipes, v).unwrap();
            assert!(eval.is_feasible(), "vlevel {} rejected: {:?}", v, eval.rejection);
        }
    }

    #[test]
    fn test_det_within_pool() {
        let state = testutil::state();
        let layouts: [&[StreamDescriptor]; 3] = [&[uhd()], &[uhd(), fhd(), fhd()], &[fhd(); 4]];
        for streams in layouts {
            let ctx = internal_validate_bw(&state, streams, ValidateMode::Full).unwrap();
            let sum: u32 = ctx.pipes.iter().map(|p| p.det_size_kb).sum();
            assert_eq!(sum, ctx.det.total_kb);
            assert!(sum <= state.ip.det_pool_kb());
        }
    }

    #[test]
    fn test_pipe_overflow() {
        let state = testutil::state();
        assert_eq!(
            internal_validate_bw(&state, &[uhd(), uhd(), fhd()], ValidateMode::Fast),
            Err(Error::PipeOverflow {
                required: 5,
                available: 4
            })
        );
        assert_eq!(
            internal_validate_bw(&state, &[fhd(); 5], ValidateMode::Fast),
            Err(Error::PipeOverflow {
                required: 5,
                available: 4
            })
        );
    }

    #[test]
    fn test_stream_overflow_reports_checked_bound() {
        let mut state = testutil::state();
        state.ip.max_num_otg = 8;
        assert_eq!(
            internal_validate_bw(&state, &[fhd(); 5], ValidateMode::Fast),
            Err(Error::PipeOverflow {
                required: 5,
                available: MAX_PIPES
            })
        );
        state.ip.max_num_otg = 2;
        assert_eq!(
            internal_validate_bw(&state, &[fhd(); 3], ValidateMode::Fast),
            Err(Error::PipeOverflow {
                required: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_infeasible_everywhere() {
        let state = testutil::starved_state();
        let err = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap_err();
        assert_eq!(err, Error::Infeasible);
        assert!(err.is_mode_unsupported());
    }

    #[test]
    fn test_split_escalation_on_dispclk() {
        // DISPCLK only fits once the 1080p stream is spread over two pipes
        let state = testutil::low_dispclk_state(100.0);
        let ctx = internal_validate_bw(&state, &[fhd()], ValidateMode::Fast).unwrap();
        assert_eq!(ctx.splits.as_slice(), &[2]);
        assert!(ctx.evaluation.dispclk_mhz <= 100.0);
    }

    #[test]
    fn test_invalid_stream() {
        let state = testutil::state();
        let mut s = fhd();
        s.timing.pix_clk_100hz = 0;
        assert_eq!(
            internal_validate_bw(&state, &[s], ValidateMode::Fast),
            Err(Error::InvalidParameter)
        );
    }

    #[test]
    fn test_subvp_when_dram_switch_needs_it() {
        let state = testutil::long_dram_latency_state(800.0);
        let fast = internal_validate_bw(&state, &[uhd()], ValidateMode::Fast).unwrap();
        assert!(fast.subvp.is_none());
        assert_eq!(fast.dram_change, ClockChangeSupport::Unsupported);

        let full = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        assert!(full.subvp.is_some());
        assert_eq!(full.phantom_count(), 2);
        assert_eq!(full.dram_change, ClockChangeSupport::VblankWithMallSubVp);
        assert!(full.det.total_kb <= state.ip.det_pool_kb());
    }

    #[test]
    fn test_subvp_disabled_by_debug() {
        let mut state = testutil::long_dram_latency_state(800.0);
        state.debug.force_disable_subvp = true;
        let ctx = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        assert!(ctx.subvp.is_none());
        assert_eq!(ctx.dram_change, ClockChangeSupport::Unsupported);
    }

    #[test]
    fn test_vactive_with_large_det() {
        let state = testutil::state();
        let ctx = internal_validate_bw(&state, &[uhd()], ValidateMode::Full).unwrap();
        assert_eq!(ctx.dram_change, ClockChangeSupport::Vactive);
        assert!(ctx.subvp.is_none());
    }
}
