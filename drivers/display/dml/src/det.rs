//! # DET Allocation
//!
//! The return buffer is shared between the per-pipe DET and the compressed
//! buffer. DET is handed out in 64 KB segments:
//!
//! ```text
//!   +-------------------- return buffer (1280 KB) --------------------+
//!   | phantom min | stream 0 segs   | stream 1 segs   | ... | compbuf |
//!   +-------------------------------------------------------+---------+
//!                 |  pipe 0 | pipe 1|     pipe 2      |
//! ```
//!
//! Phantom pipes only reserve the per-pipe minimum. The remaining segments
//! are split evenly across visible streams, then across the pipes of each
//! stream. Allocation always starts from scratch.

use arrayvec::ArrayVec;

use crate::error::{Error, Result};
use crate::soc::{
    IpParams, DEFAULT_DET_KB, DET_SEGMENT_KB, MAX_DET_KB, MAX_PIPES, MIN_COMPBUF_KB, MIN_DET_KB,
};
use crate::timing::PipeDescriptor;

/// Result of one allocation pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetAllocation {
    /// DET per pipe, KB, in pipe order
    pub per_pipe_kb: ArrayVec<u32, MAX_PIPES>,
    /// Sum of all DET
    pub total_kb: u32,
    /// Return buffer left for compression
    pub compbuf_kb: u32,
}

/// Assign DET to every pipe and record it in the descriptors
pub fn allocate_det(ip: &IpParams, pipes: &mut [PipeDescriptor]) -> Result<DetAllocation> {
    let pool_kb = ip.det_pool_kb();
    let phantoms = pipes.iter().filter(|p| p.is_phantom()).count() as u32;
    let mut streams: ArrayVec<usize, MAX_PIPES> = ArrayVec::new();
    for p in pipes.iter().filter(|p| !p.is_phantom()) {
        if !streams.contains(&p.stream_index) {
            streams.push(p.stream_index);
        }
    }

    let reserved_kb = phantoms * MIN_DET_KB;
    let segments = pool_kb.saturating_sub(reserved_kb) / DET_SEGMENT_KB;
    let stream_segments = if streams.is_empty() {
        0
    } else {
        segments / streams.len() as u32
    };

    let mut alloc = DetAllocation::default();
    for pipe in pipes.iter_mut() {
        let kb = if pipe.is_phantom() {
            MIN_DET_KB
        } else if stream_segments == 0 {
            DEFAULT_DET_KB
        } else {
            let pipe_segments = stream_segments / pipe.split_count.max(1) as u32;
            (pipe_segments * DET_SEGMENT_KB).clamp(MIN_DET_KB, MAX_DET_KB)
        };
        pipe.det_size_kb = kb;
        alloc.per_pipe_kb.push(kb);
        alloc.total_kb += kb;
    }

    if alloc.total_kb > pool_kb {
        log::debug!(
            "DML: DET over-subscribed, {} KB requested from {} KB",
            alloc.total_kb,
            pool_kb
        );
        return Err(Error::Infeasible);
    }
    alloc.compbuf_kb = ip.config_return_buffer_size_kb.saturating_sub(alloc.total_kb);
    debug_assert!(alloc.compbuf_kb >= MIN_COMPBUF_KB);
    Ok(alloc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::{ColorDepth, PipeKind, PixelEncoding, StreamDescriptor, Timing};

    fn pipes_for(streams: &[(StreamDescriptor, u8)]) -> ArrayVec<PipeDescriptor, MAX_PIPES> {
        let mut out = ArrayVec::new();
        for (i, (s, split)) in streams.iter().enumerate() {
            for k in 0..*split {
                out.push(PipeDescriptor::for_stream(i, s, k, *split));
            }
        }
        out
    }

    fn fhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::FHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    fn uhd() -> StreamDescriptor {
        StreamDescriptor::new(Timing::UHD_60, PixelEncoding::Rgb, ColorDepth::Bpc8)
    }

    #[test]
    fn test_single_stream_gets_whole_pool() {
        let mut pipes = pipes_for(&[(fhd(), 1)]);
        let a = allocate_det(&IpParams::DEFAULT, &mut pipes).unwrap();
        assert_eq!(a.per_pipe_kb.as_slice(), &[1152]);
        assert_eq!(pipes[0].det_size_kb, 1152);
        assert_eq!(a.compbuf_kb, 128);
    }

    #[test]
    fn test_split_stream_halves() {
        let mut pipes = pipes_for(&[(uhd(), 2)]);
        let a = allocate_det(&IpParams::DEFAULT, &mut pipes).unwrap();
        assert_eq!(a.per_pipe_kb.as_slice(), &[576, 576]);
    }

    #[test]
    fn test_phantom_reserves_minimum() {
        let mut pipes = pipes_for(&[(fhd(), 1), (fhd(), 1)]);
        let mut phantom = pipes[0];
        phantom.kind = PipeKind::Phantom { reference: 0 };
        pipes.push(phantom);
        let a = allocate_det(&IpParams::DEFAULT, &mut pipes).unwrap();
        assert_eq!(a.per_pipe_kb.as_slice(), &[512, 512, 128]);
        assert!(a.total_kb <= IpParams::DEFAULT.det_pool_kb());
    }

    #[test]
    fn test_never_exceeds_pool() {
        let ip = IpParams::DEFAULT;
        let layouts: [&[(StreamDescriptor, u8)]; 5] = [
            &[(fhd(), 1)],
            &[(uhd(), 4)],
            &[(fhd(), 1), (fhd(), 1), (fhd(), 1)],
            &[(uhd(), 2), (fhd(), 1), (fhd(), 1)],
            &[(fhd(), 1), (fhd(), 1), (fhd(), 1), (fhd(), 1)],
        ];
        for layout in layouts {
            let mut pipes = pipes_for(layout);
            let a = allocate_det(&ip, &mut pipes).unwrap();
            assert!(a.total_kb <= ip.det_pool_kb());
            assert_eq!(a.total_kb + a.compbuf_kb, ip.config_return_buffer_size_kb);
            assert!(pipes.iter().all(|p| p.det_size_kb >= MIN_DET_KB));
        }
    }

    #[test]
    fn test_undersized_return_buffer_is_infeasible() {
        let ip = IpParams {
            config_return_buffer_size_kb: 64,
            ..IpParams::DEFAULT
        };
        let mut pipes = pipes_for(&[(fhd(), 1)]);
        assert_eq!(allocate_det(&ip, &mut pipes), Err(Error::Infeasible));
    }
}
