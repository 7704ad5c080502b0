//! # Phantom Pipe Timing Builder
//!
//! SubVP hides a DRAM clock switch from a display that cannot ride it out
//! on its DET. A phantom pipe prefetches a slice of the frame (the
//! sub-viewport) into MALL ahead of time; during the switch the main pipe
//! scans from MALL instead of DRAM.
//!
//! ```text
//!   main    |<------------------- v_active ------------------->|<-blank->|
//!   phantom |<- sub-viewport + fw delay + margin ->|fp|sync|bp = vstartup|
//! ```
//!
//! The phantom mirrors the horizontal timing of its reference pipe and only
//! exists inside a validation pass. It is fed back into the validator so DET
//! and bandwidth accounting include the extra fetch.

use arrayvec::ArrayVec;
use libm::{ceil, floor};

use crate::det::allocate_det;
use crate::dlg::{compute_dlg_params, DlgParams};
use crate::error::Result;
use crate::soc::{LatencyInputs, SocState, MAX_PIPES};
use crate::timing::{PipeDescriptor, PipeKind, Timing};
use crate::validate::{
    clock_change_support, sweep_levels, BwContext, ClockChangeSupport, LevelEvaluation,
};

/// Phantom stream derived from a main pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhantomStream {
    /// Phantom CRTC timing
    pub timing: Timing,
    /// Source lines the phantom fetches
    pub src_height: u32,
    /// Destination lines of the phantom
    pub dst_height: u32,
    /// Sub-viewport lines prefetched into MALL
    pub subviewport_lines: u32,
    /// Lines covering firmware processing and the p-state allow window
    pub fw_delay_lines: u32,
}

/// SubVP configuration chosen for a validation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubVpConfig {
    /// Head pipe of the stream using SubVP
    pub main_pipe: usize,
    /// Stream using SubVP
    pub stream_index: usize,
    /// Phantom derived for it
    pub phantom: PhantomStream,
}

/// Sub-viewport lines that must sit in MALL to cover `latency_us`
pub fn subviewport_lines_needed_in_mall(pipe: &PipeDescriptor, latency_us: f64) -> u32 {
    let swath = pipe.surface.swath_height_luma().max(1);
    let lines = ceil(latency_us / pipe.line_time_us() * pipe.scaler.vratio) as u32;
    lines.div_ceil(swath) * swath
}

/// Time `main` scans the sub-viewport out of MALL, in us
///
/// A DRAM clock switch hidden by SubVP must complete inside this window.
pub fn subvp_switch_window_us(main: &PipeDescriptor, phantom: &PhantomStream) -> f64 {
    phantom.subviewport_lines as f64 * main.line_time_us() / main.scaler.vratio
}

/// Build the phantom stream for `ref_pipe` at the evaluated level
pub fn set_phantom_stream_timing(
    state: &SocState,
    ref_pipe: &PipeDescriptor,
    eval: &LevelEvaluation,
    latency: &LatencyInputs,
) -> Result<PhantomStream> {
    let ip = &state.ip;
    let main = &ref_pipe.timing;
    let subviewport_lines = subviewport_lines_needed_in_mall(
        ref_pipe,
        latency.dram_clock_change_us + eval.urgent_latency_us,
    );
    let fw_delay_lines = floor(
        (ip.subvp_fw_processing_delay_us + ip.subvp_pstate_allow_width_us)
            * main.pixel_rate_mhz()
            / main.h_total as f64,
    ) as u32;

    let v_active = subviewport_lines
        + fw_delay_lines
        + ip.subvp_swath_height_margin_lines
        + state.debug.subvp_extra_lines;
    let back_porch = crate::model::vstartup_lines(main);
    let timing = Timing {
        v_addressable: v_active,
        v_front_porch: 1,
        v_total: v_active + 1 + main.v_sync_width + back_porch,
        ..*main
    };
    timing.validate()?;

    let src_height =
        floor(v_active as f64 * ref_pipe.src_height as f64 / ref_pipe.dst_height as f64) as u32;
    Ok(PhantomStream {
        timing,
        src_height: src_height.max(1),
        dst_height: v_active,
        subviewport_lines,
        fw_delay_lines,
    })
}

/// Main pipe that benefits most from SubVP, if any qualifies
///
/// Candidates run below the refresh limit, cannot switch in active, fit in
/// the free pipes and have the longest frame.
pub fn select_subvp_candidate(state: &SocState, ctx: &BwContext) -> Option<usize> {
    let ip = &state.ip;
    let free = ip.max_num_dpp.min(MAX_PIPES).saturating_sub(ctx.pipe_count());
    let watermark =
        state.soc.dram_clock_change_latency_us + ctx.evaluation.urgent_watermark_us();

    ctx.pipes
        .iter()
        .zip(ctx.evaluation.pipes.iter())
        .enumerate()
        .filter(|(_, (pipe, eval))| {
            pipe.kind == PipeKind::Main
                && pipe.split_index == 0
                && pipe.timing.refresh_hz() < ip.subvp_max_refresh_hz
                && pipe.pixel_rate_mhz() <= ip.subvp_max_pixel_rate_mhz
                && eval.det_buffer_time_us - watermark <= 0.0
                && pipe.split_count as usize <= free
        })
        .max_by(|(_, (a, _)), (_, (b, _))| {
            a.timing.frame_time_us().total_cmp(&b.timing.frame_time_us())
        })
        .map(|(i, _)| i)
}

/// True when the phantom frame completes inside the main pipe's active region
pub fn subvp_schedulable(state: &SocState, main: &PipeDescriptor, phantom: &PhantomStream) -> bool {
    let line_time = main.line_time_us();
    let phantom_frame_us = phantom.timing.v_total as f64 * line_time;
    let main_active_us = main.timing.v_addressable as f64 * line_time;
    phantom_frame_us + state.ip.subvp_fw_processing_delay_us < main_active_us
}

/// Phantom pipes for every pipe of the chosen stream
fn phantom_pipes(
    ctx: &BwContext,
    main_pipe: usize,
    phantom: &PhantomStream,
) -> ArrayVec<PipeDescriptor, MAX_PIPES> {
    let stream = ctx.pipes[main_pipe].stream_index;
    ctx.pipes
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_phantom() && p.stream_index == stream)
        .map(|(i, p)| PipeDescriptor {
            kind: PipeKind::Phantom { reference: i },
            timing: phantom.timing,
            src_height: phantom.src_height,
            dst_height: phantom.dst_height,
            det_size_kb: 0,
            ..*p
        })
        .collect()
}

/// Re-run validation with phantom pipes for the best SubVP candidate
///
/// Returns `None` when no candidate exists or the phantom configuration is
/// not feasible, schedulable and switch-capable.
pub fn try_subvp(state: &SocState, ctx: &BwContext) -> Result<Option<BwContext>> {
    let Some(main_pipe) = select_subvp_candidate(state, ctx) else {
        log::debug!("DML: no SubVP candidate");
        return Ok(None);
    };
    let latency = state.latency();
    let reference = ctx.pipes[main_pipe];
    let phantom = set_phantom_stream_timing(state, &reference, &ctx.evaluation, &latency)?;
    if !subvp_schedulable(state, &reference, &phantom) {
        log::debug!("DML: SubVP phantom for pipe {} not schedulable", main_pipe);
        return Ok(None);
    }

    let mut pipes = ctx.pipes.clone();
    for p in phantom_pipes(ctx, main_pipe, &phantom) {
        if pipes.try_push(p).is_err() {
            return Ok(None);
        }
    }
    let det = allocate_det(&state.ip, &mut pipes)?;
    let Some(evaluation) = sweep_levels(state, &pipes)? else {
        log::debug!("DML: SubVP configuration infeasible");
        return Ok(None);
    };

    let dram_change =
        clock_change_support(&pipes, &evaluation, latency.dram_clock_change_us, true);
    if dram_change == ClockChangeSupport::Unsupported {
        return Ok(None);
    }
    let fclk_change = clock_change_support(&pipes, &evaluation, latency.fclk_change_us, false);

    log::debug!(
        "DML: SubVP on stream {} ({} phantom lines) at vlevel {}",
        reference.stream_index,
        phantom.timing.v_addressable,
        evaluation.vlevel
    );
    Ok(Some(BwContext {
        streams: ctx.streams.clone(),
        splits: ctx.splits.clone(),
        pipes,
        det,
        vlevel: evaluation.vlevel,
        evaluation,
        dram_change,
        fclk_change,
        subvp: Some(SubVpConfig {
            main_pipe,
            stream_index: reference.stream_index,
            phantom,
        }),
        mode: ctx.mode,
    }))
}

/// DLG parameters for the phantom pipes of `ctx`, derived from their own timing
pub fn populate_phantom_dlg_params(state: &SocState, ctx: &BwContext, dlg: &mut [DlgParams]) {
    for (i, pipe) in ctx.pipes.iter().enumerate() {
        if !pipe.is_phantom() {
            continue;
        }
        if let (Some(out), Some(eval)) = (dlg.get_mut(i), ctx.evaluation.pipes.get(i)) {
            *out = compute_dlg_params(state, pipe, eval, &ctx.evaluation);
        }
    }
}
