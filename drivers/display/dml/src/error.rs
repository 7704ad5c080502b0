//! # DML Error Handling
//!
//! Error types for the display bandwidth engine.
//!
//! Every failure is returned to the caller as a value. The engine never
//! substitutes a default configuration: a wrong guess here shows up as
//! underflow or corruption on the panel. Retrying with a cheaper mode is a
//! decision for the mode-validation layer above.

use core::fmt;

use crate::dpm::DpmDomains;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// DML Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// DML unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// No voltage level satisfies the bandwidth and latency constraints
    Infeasible,
    /// More pipes are required than the hardware provides
    PipeOverflow {
        /// Pipes needed after split prediction
        required: usize,
        /// Pipes available on this controller
        available: usize,
    },
    /// The voltage/clock table cannot be used
    InvalidTable(TableError),
    /// No dummy p-state latency keeps the configuration feasible
    DummyLatencyUnavailable,
    /// A stream or parameter is malformed (zero sizes, zero pixel clock)
    InvalidParameter,
}

impl Error {
    /// True for the "configuration not supported at current power state"
    /// class. Callers use it to try a fallback mode instead of reporting
    /// a driver fault.
    pub const fn is_mode_unsupported(&self) -> bool {
        matches!(
            self,
            Self::Infeasible | Self::PipeOverflow { .. } | Self::DummyLatencyUnavailable
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infeasible => write!(
                f,
                "requested display configuration not supported at current power state"
            ),
            Self::PipeOverflow {
                required,
                available,
            } => write!(
                f,
                "requested display configuration needs {} pipes, {} available",
                required, available
            ),
            Self::InvalidTable(e) => write!(f, "invalid voltage/clock table: {}", e),
            Self::DummyLatencyUnavailable => {
                write!(f, "no dummy p-state latency supports firmware memory clock switching")
            }
            Self::InvalidParameter => write!(f, "invalid parameter"),
        }
    }
}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// Voltage/clock table error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Table has no entries
    Empty,
    /// Entries are not in ascending key order
    Unsorted,
    /// An entry carries a non-finite or negative clock
    Corrupt,
    /// Table is full
    Full,
    /// Firmware reported valid DPM levels that decrease
    NonMonotonic(DpmDomains),
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "table is empty"),
            Self::Unsorted => write!(f, "entries are not sorted"),
            Self::Corrupt => write!(f, "entry is corrupt"),
            Self::Full => write!(f, "table is full"),
            Self::NonMonotonic(d) => write!(f, "decreasing valid levels for {:?}", d),
        }
    }
}

// =============================================================================
// ERROR CONVERSION
// =============================================================================

impl From<TableError> for Error {
    fn from(e: TableError) -> Self {
        Error::InvalidTable(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_unsupported_class() {
        assert!(Error::Infeasible.is_mode_unsupported());
        assert!(Error::PipeOverflow {
            required: 5,
            available: 4
        }
        .is_mode_unsupported());
        assert!(!Error::InvalidTable(TableError::Empty).is_mode_unsupported());
        assert!(!Error::InvalidParameter.is_mode_unsupported());
    }

    #[test]
    fn test_table_error_conversion() {
        let e: Error = TableError::Unsorted.into();
        assert_eq!(e, Error::InvalidTable(TableError::Unsorted));
    }
}
