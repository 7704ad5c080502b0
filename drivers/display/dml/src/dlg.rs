//! # DLG Parameters
//!
//! Per-pipe display latency generator values: when a pipe starts
//! requesting data each frame and how fast lines are delivered. Values in
//! `refcyc` are cycles of the DLG reference clock.

use crate::model;
use crate::soc::SocState;
use crate::timing::PipeDescriptor;
use crate::validate::{LevelEvaluation, PipeEvaluation};

/// DLG programming of one pipe
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DlgParams {
    /// Line at which the pipe starts fetching for the next frame
    pub vstartup_start: u32,
    /// VUPDATE offset in pixels
    pub vupdate_offset: u32,
    /// VUPDATE width in pixels
    pub vupdate_width: u32,
    /// VREADY offset in pixels
    pub vready_offset: u32,
    /// Reference cycles per line
    pub refcyc_per_htotal: f64,
    /// Reference clock over pixel clock
    pub ref_freq_to_pix_freq: f64,
    /// Lines available for prefetch
    pub dst_y_prefetch: f64,
    /// Luma vertical ratio during prefetch
    pub vratio_prefetch: f64,
    /// Chroma vertical ratio during prefetch
    pub vratio_prefetch_c: f64,
    /// Reference cycles to deliver one luma line
    pub refcyc_per_line_delivery_l: f64,
    /// Reference cycles to deliver one chroma line
    pub refcyc_per_line_delivery_c: f64,
    /// Luma lines held in DET
    pub lines_in_det: u32,
    /// Earliest line the next frame's request may start
    pub min_dst_y_next_start: f64,
    /// DISPCLK this pipe needs
    pub dispclk_mhz: f64,
    /// DPPCLK this pipe needs
    pub dppclk_mhz: f64,
}

/// DLG parameters of `pipe` at the evaluated level
pub fn compute_dlg_params(
    state: &SocState,
    pipe: &PipeDescriptor,
    pipe_eval: &PipeEvaluation,
    eval: &LevelEvaluation,
) -> DlgParams {
    let ip = &state.ip;
    let pixel_rate = pipe.pixel_rate_mhz();
    let refclk = ip.dlg_ref_clk_mhz;

    let vupdate_offset = model::vupdate_offset_pix(pipe.timing.h_total);
    let vupdate_width = model::vupdate_width_pix(
        ip,
        eval.dcfclk_deep_sleep_mhz,
        pipe_eval.dppclk_mhz,
        pipe_eval.dispclk_mhz,
        pixel_rate,
    );
    let vready_offset = model::vready_offset_pix(
        ip,
        eval.dcfclk_deep_sleep_mhz,
        pipe_eval.dppclk_mhz,
        pipe_eval.dispclk_mhz,
        pixel_rate,
    );
    let setup_lines = (vupdate_offset + vupdate_width + vready_offset) as f64
        / pipe.timing.h_total as f64;

    DlgParams {
        vstartup_start: pipe_eval.vstartup_lines,
        vupdate_offset,
        vupdate_width,
        vready_offset,
        refcyc_per_htotal: refclk * pipe.timing.h_total as f64 / pixel_rate,
        ref_freq_to_pix_freq: refclk / pixel_rate,
        dst_y_prefetch: pipe_eval.dst_y_prefetch,
        vratio_prefetch: pipe_eval.vratio_prefetch,
        vratio_prefetch_c: pipe_eval.vratio_prefetch_c,
        refcyc_per_line_delivery_l: refclk * pipe_eval.line_delivery_time_luma_us,
        refcyc_per_line_delivery_c: refclk * pipe_eval.line_delivery_time_chroma_us,
        lines_in_det: pipe_eval.lines_in_det_luma,
        min_dst_y_next_start: pipe_eval.vstartup_lines as f64 + setup_lines,
        dispclk_mhz: pipe_eval.dispclk_mhz,
        dppclk_mhz: pipe_eval.dppclk_mhz,
    }
}
