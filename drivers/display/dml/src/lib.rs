//! # Helix Display Mode Library
//!
//! Bandwidth validation engine for multi-pipe display controllers. Given a
//! set of streams, it finds the lowest-power operating point where every
//! pipe gets its pixels in time, then derives the watermarks, DLG values
//! and clocks the hardware sequencer programs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   DisplayBandwidthManager                        │
//! │      spin::RwLock<Arc<SocState>>  (copy, build, swap)            │
//! └───────────┬──────────────────────────────────┬───────────────────┘
//!             │ validate / fast_validate         │ update_bounding_box
//!             ▼                                  ▼
//! ┌───────────────────────┐          ┌───────────────────────────────┐
//! │ validate              │          │ bbox                          │
//! │  split ─► det ─► sweep│          │  overrides ─► dpm patch ─►    │
//! │  phantom (SubVP)      │          │  synthetic states ─► clk_table│
//! └───────────┬───────────┘          └───────────────────────────────┘
//!             ▼
//! ┌───────────────────────┐
//! │ watermark  dlg        │
//! │ dummy_pstate          │
//! └───────────────────────┘
//!             all formulas live in `model`
//! ```
//!
//! ## Units
//!
//! Clocks are in MHz, bandwidth in MB/s (bytes per microsecond), time in
//! microseconds. Programming outputs use kHz and nanoseconds.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod bbox;
pub mod clk_table;
pub mod det;
pub mod dlg;
pub mod dpm;
pub mod dummy_pstate;
pub mod error;
pub mod manager;
pub mod model;
pub mod phantom;
pub mod soc;
pub mod split;
pub mod timing;
pub mod validate;
pub mod watermark;

#[cfg(test)]
mod testutil;

// Re-exports for convenience
pub use bbox::{update_bw_bounding_box, ClkBwParams, VbiosBbInfo, VramInfo};
pub use clk_table::{SortKey, VoltageLevel, VoltageTable};
pub use dpm::{DpmClockLevels, DpmTable};
pub use error::{Error, Result, TableError};
pub use manager::{DisplayBandwidthManager, FastValidation};
pub use soc::{DebugOptions, IpParams, SocBoundingBox, SocState};
pub use timing::{PipeDescriptor, StreamDescriptor, Timing};
pub use validate::{internal_validate_bw, ClockChangeSupport, ValidateMode};
pub use watermark::{calculate_wm_and_dlg, ValidationResult};
