//! # Pipe Split Predictor
//!
//! Decides how many pipes a stream is spread over (ODM combine). A stream
//! is split when one pipe cannot sustain its scaled pixel rate or cannot
//! hold its viewport width.

use libm::ceil;

use crate::error::{Error, Result};
use crate::model;
use crate::soc::IpParams;
use crate::timing::StreamDescriptor;

/// Split factors supported by ODM combine, ascending
pub const SPLIT_FACTORS: [u8; 3] = [1, 2, 4];

/// Per-pipe hardware limits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeLimits {
    /// Scaled pixel rate one pipe sustains, inclusive
    pub max_pipe_pixel_rate_mhz: f64,
    /// Viewport width one pipe scans, inclusive
    pub max_viewport_width: u32,
    /// Scaler parameters for the throughput model
    pub ip: IpParams,
}

impl PipeLimits {
    /// Limits of the given IP
    pub const fn from_ip(ip: &IpParams) -> Self {
        Self {
            max_pipe_pixel_rate_mhz: ip.max_pipe_pixel_rate_mhz,
            max_viewport_width: ip.max_viewport_width,
            ip: *ip,
        }
    }

    /// Most pipes a single stream may use
    #[inline]
    pub fn max_split(&self) -> u8 {
        SPLIT_FACTORS[SPLIT_FACTORS.len() - 1]
    }
}

/// True when `stream` split over `split` pipes still exceeds a per-pipe limit
pub fn predict_pipe_split(stream: &StreamDescriptor, split: u8, limits: &PipeLimits) -> bool {
    let n = split.max(1) as f64;
    let demand = model::single_dpp_clock_mhz(
        &limits.ip,
        stream.pixel_rate_mhz() / n,
        &stream.scaler(),
        stream.surface_format().is_dual_plane(),
    );
    if demand > limits.max_pipe_pixel_rate_mhz {
        return true;
    }
    ceil(stream.scan_width() as f64 / n) > limits.max_viewport_width as f64
}

/// Smallest supported split factor that keeps `stream` within limits
///
/// A stream that exceeds a per-pipe limit even at the widest split is
/// `Infeasible`.
pub fn required_split(stream: &StreamDescriptor, limits: &PipeLimits) -> Result<u8> {
    let split = SPLIT_FACTORS
        .iter()
        .copied()
        .find(|&f| !predict_pipe_split(stream, f, limits));
    if split.is_none() {
        log::debug!(
            "DML: {} MHz stream exceeds pipe limits at split {}",
            stream.pixel_rate_mhz(),
            limits.max_split()
        );
    }
    split.ok_or(Error::Infeasible)
}

/// Next larger split factor after `current`
pub fn next_split(current: u8) -> Option<u8> {
    SPLIT_FACTORS.iter().copied().find(|&f| f > current)
}
