//! # Stream and Pipe Descriptors
//!
//! Plain value records describing what the display layer wants to show
//! (streams) and how the engine maps it onto hardware pipes.
//!
//! A [`StreamDescriptor`] is immutable input, one per active display. A
//! [`PipeDescriptor`] is derived from a stream after split prediction and is
//! rebuilt on every validation pass; nothing here is shared between passes.

use crate::error::{Error, Result};

// =============================================================================
// TIMING
// =============================================================================

/// CRTC timing of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Active pixels per line
    pub h_addressable: u32,
    /// Total pixels per line including blanking
    pub h_total: u32,
    /// Active lines per frame
    pub v_addressable: u32,
    /// Total lines per frame including blanking
    pub v_total: u32,
    /// Lines between active end and vsync start
    pub v_front_porch: u32,
    /// Vsync width in lines
    pub v_sync_width: u32,
    /// Pixel clock in units of 100 Hz
    pub pix_clk_100hz: u32,
}

impl Timing {
    /// 1920x1080 @ 60 Hz (CTA-861 VIC 16)
    pub const FHD_60: Self = Self {
        h_addressable: 1920,
        h_total: 2200,
        v_addressable: 1080,
        v_total: 1125,
        v_front_porch: 4,
        v_sync_width: 5,
        pix_clk_100hz: 1_485_000,
    };

    /// 3840x2160 @ 60 Hz (CTA-861 VIC 97)
    pub const UHD_60: Self = Self {
        h_addressable: 3840,
        h_total: 4400,
        v_addressable: 2160,
        v_total: 2250,
        v_front_porch: 8,
        v_sync_width: 10,
        pix_clk_100hz: 5_940_000,
    };

    /// Pixel clock in MHz
    #[inline]
    pub fn pixel_rate_mhz(&self) -> f64 {
        self.pix_clk_100hz as f64 / 10_000.0
    }

    /// Duration of one line in microseconds
    #[inline]
    pub fn line_time_us(&self) -> f64 {
        self.h_total as f64 / self.pixel_rate_mhz()
    }

    /// Vertical refresh in Hz
    pub fn refresh_hz(&self) -> f64 {
        self.pix_clk_100hz as f64 * 100.0 / (self.h_total as f64 * self.v_total as f64)
    }

    /// Frame duration in microseconds
    pub fn frame_time_us(&self) -> f64 {
        self.v_total as f64 * self.line_time_us()
    }

    /// Blanking lines per frame
    #[inline]
    pub fn v_blank(&self) -> u32 {
        self.v_total - self.v_addressable
    }

    /// Back porch in lines
    #[inline]
    pub fn v_back_porch(&self) -> u32 {
        self.v_blank()
            .saturating_sub(self.v_front_porch)
            .saturating_sub(self.v_sync_width)
    }

    /// Check that the timing describes a scannable frame
    pub fn validate(&self) -> Result<()> {
        if self.pix_clk_100hz == 0
            || self.h_addressable == 0
            || self.v_addressable == 0
            || self.h_total < self.h_addressable
            || self.v_total < self.v_addressable + self.v_front_porch + self.v_sync_width
        {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

// =============================================================================
// PIXEL FORMAT
// =============================================================================

/// Output pixel encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelEncoding {
    /// RGB 4:4:4
    Rgb,
    /// YCbCr 4:4:4
    YCbCr444,
    /// YCbCr 4:2:2
    YCbCr422,
    /// YCbCr 4:2:0
    YCbCr420,
}

/// Bits per color component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColorDepth {
    /// 6 bpc
    Bpc6,
    /// 8 bpc
    Bpc8,
    /// 10 bpc
    Bpc10,
    /// 12 bpc
    Bpc12,
    /// 16 bpc
    Bpc16,
}

impl ColorDepth {
    /// Bits per component
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bpc6 => 6,
            Self::Bpc8 => 8,
            Self::Bpc10 => 10,
            Self::Bpc12 => 12,
            Self::Bpc16 => 16,
        }
    }
}

/// Scanout surface layout in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceFormat {
    /// Bytes per luma (or packed) pixel
    pub bytes_per_pixel_luma: u32,
    /// Bytes per chroma pixel, 0 for packed formats
    pub bytes_per_pixel_chroma: u32,
}

impl SurfaceFormat {
    /// 32bpp packed (ARGB8888, ARGB2101010)
    pub const PACKED_32: Self = Self::packed(4);
    /// 64bpp packed (FP16)
    pub const PACKED_64: Self = Self::packed(8);
    /// NV12
    pub const NV12: Self = Self::planar(1, 2);
    /// P010
    pub const P010: Self = Self::planar(2, 4);

    /// Single-plane format
    pub const fn packed(bytes_per_pixel: u32) -> Self {
        Self {
            bytes_per_pixel_luma: bytes_per_pixel,
            bytes_per_pixel_chroma: 0,
        }
    }

    /// Luma + subsampled chroma planes
    pub const fn planar(luma: u32, chroma: u32) -> Self {
        Self {
            bytes_per_pixel_luma: luma,
            bytes_per_pixel_chroma: chroma,
        }
    }

    /// Two-plane surface
    #[inline]
    pub const fn is_dual_plane(&self) -> bool {
        self.bytes_per_pixel_chroma != 0
    }

    /// Luma swath height in lines
    pub const fn swath_height_luma(&self) -> u32 {
        match self.bytes_per_pixel_luma {
            1 => 16,
            8 => 4,
            _ => 8,
        }
    }

    /// Chroma swath height in lines, 0 for packed formats
    pub const fn swath_height_chroma(&self) -> u32 {
        if self.is_dual_plane() {
            self.swath_height_luma() / 2
        } else {
            0
        }
    }
}

// =============================================================================
// SCALING
// =============================================================================

/// Plane rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    /// No rotation
    #[default]
    Deg0,
    /// 90 degrees
    Deg90,
    /// 180 degrees
    Deg180,
    /// 270 degrees
    Deg270,
}

impl Rotation {
    /// Rotations that scan the surface vertically
    #[inline]
    pub const fn is_vertical_scan(self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// Viewport-to-recout scaling of the plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scaling {
    /// Source viewport width
    pub src_width: u32,
    /// Source viewport height
    pub src_height: u32,
    /// Destination width on the timing
    pub dst_width: u32,
    /// Destination height on the timing
    pub dst_height: u32,
    /// Horizontal filter taps
    pub h_taps: u32,
    /// Vertical filter taps
    pub v_taps: u32,
}

impl Scaling {
    /// 1:1 mapping with bypassed scaler
    pub const fn native(width: u32, height: u32) -> Self {
        Self {
            src_width: width,
            src_height: height,
            dst_width: width,
            dst_height: height,
            h_taps: 1,
            v_taps: 1,
        }
    }
}

/// Scaler ratios and taps for luma and chroma
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalerConfig {
    /// Horizontal luma ratio (source / destination)
    pub hratio: f64,
    /// Vertical luma ratio
    pub vratio: f64,
    /// Horizontal chroma ratio
    pub hratio_c: f64,
    /// Vertical chroma ratio
    pub vratio_c: f64,
    /// Luma horizontal taps
    pub htaps: u32,
    /// Luma vertical taps
    pub vtaps: u32,
    /// Chroma horizontal taps
    pub htaps_c: u32,
    /// Chroma vertical taps
    pub vtaps_c: u32,
}

// =============================================================================
// STREAM DESCRIPTOR
// =============================================================================

/// One active display as requested by the connector layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamDescriptor {
    /// CRTC timing
    pub timing: Timing,
    /// Output pixel encoding
    pub encoding: PixelEncoding,
    /// Output color depth
    pub depth: ColorDepth,
    /// Plane scaling
    pub scaling: Scaling,
    /// Plane rotation
    pub rotation: Rotation,
}

impl StreamDescriptor {
    /// Unscaled, unrotated stream
    pub const fn new(timing: Timing, encoding: PixelEncoding, depth: ColorDepth) -> Self {
        Self {
            timing,
            encoding,
            depth,
            scaling: Scaling::native(timing.h_addressable, timing.v_addressable),
            rotation: Rotation::Deg0,
        }
    }

    /// Replace the plane scaling
    pub const fn with_scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = scaling;
        self
    }

    /// Replace the plane rotation
    pub const fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Pixel clock in MHz
    #[inline]
    pub fn pixel_rate_mhz(&self) -> f64 {
        self.timing.pixel_rate_mhz()
    }

    /// Vertical refresh in Hz
    #[inline]
    pub fn refresh_hz(&self) -> f64 {
        self.timing.refresh_hz()
    }

    /// Scanout surface implied by encoding and depth
    pub fn surface_format(&self) -> SurfaceFormat {
        match (self.encoding, self.depth) {
            (PixelEncoding::YCbCr420, ColorDepth::Bpc6 | ColorDepth::Bpc8) => SurfaceFormat::NV12,
            (PixelEncoding::YCbCr420, _) => SurfaceFormat::P010,
            (_, d) if d.bits() <= 10 => SurfaceFormat::PACKED_32,
            _ => SurfaceFormat::PACKED_64,
        }
    }

    /// Source width in scan direction
    pub fn scan_width(&self) -> u32 {
        if self.rotation.is_vertical_scan() {
            self.scaling.src_height
        } else {
            self.scaling.src_width
        }
    }

    /// Source height in scan direction
    pub fn scan_height(&self) -> u32 {
        if self.rotation.is_vertical_scan() {
            self.scaling.src_width
        } else {
            self.scaling.src_height
        }
    }

    /// Scaler ratios for this stream
    pub fn scaler(&self) -> ScalerConfig {
        let s = &self.scaling;
        let hratio = self.scan_width() as f64 / s.dst_width as f64;
        let vratio = self.scan_height() as f64 / s.dst_height as f64;
        let (hratio_c, vratio_c) = if self.surface_format().is_dual_plane() {
            (hratio / 2.0, vratio / 2.0)
        } else {
            (hratio, vratio)
        };
        ScalerConfig {
            hratio,
            vratio,
            hratio_c,
            vratio_c,
            htaps: s.h_taps,
            vtaps: s.v_taps,
            htaps_c: s.h_taps,
            vtaps_c: s.v_taps,
        }
    }

    /// Check the stream for values the model cannot evaluate
    pub fn validate(&self) -> Result<()> {
        self.timing.validate()?;
        let s = &self.scaling;
        if s.src_width == 0
            || s.src_height == 0
            || s.dst_width == 0
            || s.dst_height == 0
            || s.h_taps == 0
            || s.v_taps == 0
            || s.dst_width > self.timing.h_addressable
            || s.dst_height > self.timing.v_addressable
        {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

// =============================================================================
// PIPE DESCRIPTOR
// =============================================================================

/// Role of a pipe in the current configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeKind {
    /// Visible pipe scanning out a stream
    Main,
    /// Synthetic pipe sizing MALL buffering for a sub-viewport switch
    Phantom {
        /// Index of the main pipe this phantom mirrors
        reference: usize,
    },
}

/// One hardware pipe as evaluated by the validator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeDescriptor {
    /// Index of the owning stream in the request
    pub stream_index: usize,
    /// Main or phantom
    pub kind: PipeKind,
    /// Position within the ODM group (0-based)
    pub split_index: u8,
    /// Pipes in the ODM group of this stream
    pub split_count: u8,
    /// Timing driven by this pipe
    pub timing: Timing,
    /// Source lines fetched per frame
    pub src_height: u32,
    /// Destination lines per frame
    pub dst_height: u32,
    /// Source pixels per line handled by this pipe
    pub viewport_width: u32,
    /// Destination pixels per line produced by this pipe
    pub recout_width: u32,
    /// Surface layout
    pub surface: SurfaceFormat,
    /// Scaler configuration
    pub scaler: ScalerConfig,
    /// DET allocation in KB
    pub det_size_kb: u32,
}

impl PipeDescriptor {
    /// Build the `split_index`th pipe of a stream split `split_count` ways
    pub fn for_stream(
        stream_index: usize,
        stream: &StreamDescriptor,
        split_index: u8,
        split_count: u8,
    ) -> Self {
        let n = split_count.max(1) as u32;
        let scan_width = stream.scan_width();
        let viewport_width = scan_width.div_ceil(n);
        let recout_width = stream.scaling.dst_width.div_ceil(n);
        Self {
            stream_index,
            kind: PipeKind::Main,
            split_index,
            split_count: n as u8,
            timing: stream.timing,
            src_height: stream.scan_height(),
            dst_height: stream.scaling.dst_height,
            viewport_width,
            recout_width,
            surface: stream.surface_format(),
            scaler: stream.scaler(),
            det_size_kb: 0,
        }
    }

    /// True for synthetic SubVP pipes
    #[inline]
    pub const fn is_phantom(&self) -> bool {
        matches!(self.kind, PipeKind::Phantom { .. })
    }

    /// Stream pixel clock in MHz
    #[inline]
    pub fn pixel_rate_mhz(&self) -> f64 {
        self.timing.pixel_rate_mhz()
    }

    /// Pixel rate handled by this pipe after ODM split
    #[inline]
    pub fn pipe_pixel_rate_mhz(&self) -> f64 {
        self.pixel_rate_mhz() / self.split_count as f64
    }

    /// Line time in microseconds
    #[inline]
    pub fn line_time_us(&self) -> f64 {
        self.timing.line_time_us()
    }

    /// Luma bytes fetched per source line
    pub fn bytes_per_line_luma(&self) -> f64 {
        self.viewport_width as f64 * self.surface.bytes_per_pixel_luma as f64
    }

    /// Chroma bytes fetched per source line
    pub fn bytes_per_line_chroma(&self) -> f64 {
        (self.viewport_width / 2) as f64 * self.surface.bytes_per_pixel_chroma as f64
    }

    /// Average read bandwidth of this pipe in MB/s
    pub fn read_bandwidth_mbps(&self) -> f64 {
        (self.bytes_per_line_luma() * self.scaler.vratio
            + self.bytes_per_line_chroma() * self.scaler.vratio_c)
            / self.line_time_us()
    }
}
