//! # DPM Table Patcher
//!
//! Power-management firmware reports the DPM levels of every clock domain.
//! Some boards report zeros for levels the firmware does not use, and some
//! report nothing at all for a domain. Before operating points are built
//! from the report it is normalised here:
//!
//! ```text
//!   level:     0     1     2     3     4
//!   raw:       0     0    615   906    0
//!   patched:  615   615   615   906   906
//! ```
//!
//! Entries firmware reports as valid (non-zero) are never touched. A report
//! whose valid entries decrease is rejected outright.

use bitflags::bitflags;

use crate::error::{Result, TableError};
use crate::soc::{DefaultClockLimits, MAX_DPM_LEVELS};

bitflags! {
    /// Set of DPM clock domains
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DpmDomains: u8 {
        /// DCFCLK
        const DCFCLK = 1 << 0;
        /// DISPCLK
        const DISPCLK = 1 << 1;
        /// DPPCLK
        const DPPCLK = 1 << 2;
        /// DTBCLK
        const DTBCLK = 1 << 3;
        /// PHYCLK
        const PHYCLK = 1 << 4;
        /// SOCCLK
        const SOCCLK = 1 << 5;
        /// Data fabric clock
        const FCLK = 1 << 6;
        /// Memory clock (UCLK)
        const MEMCLK = 1 << 7;
    }
}

/// One clock domain of the firmware report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDomain {
    /// DCFCLK
    Dcfclk,
    /// DISPCLK
    Dispclk,
    /// DPPCLK
    Dppclk,
    /// DTBCLK
    Dtbclk,
    /// PHYCLK
    Phyclk,
    /// SOCCLK
    Socclk,
    /// Data fabric clock
    Fclk,
    /// Memory clock (UCLK)
    Memclk,
}

impl ClockDomain {
    /// Every domain, in report order
    pub const ALL: [ClockDomain; 8] = [
        Self::Dcfclk,
        Self::Dispclk,
        Self::Dppclk,
        Self::Dtbclk,
        Self::Phyclk,
        Self::Socclk,
        Self::Fclk,
        Self::Memclk,
    ];

    /// Flag for this domain
    pub const fn flag(self) -> DpmDomains {
        match self {
            Self::Dcfclk => DpmDomains::DCFCLK,
            Self::Dispclk => DpmDomains::DISPCLK,
            Self::Dppclk => DpmDomains::DPPCLK,
            Self::Dtbclk => DpmDomains::DTBCLK,
            Self::Phyclk => DpmDomains::PHYCLK,
            Self::Socclk => DpmDomains::SOCCLK,
            Self::Fclk => DpmDomains::FCLK,
            Self::Memclk => DpmDomains::MEMCLK,
        }
    }

    /// Fallback value when firmware reports nothing, if the domain has one
    pub const fn default_mhz(self, defaults: &DefaultClockLimits) -> Option<u32> {
        match self {
            Self::Dcfclk => Some(defaults.dcfclk_mhz),
            Self::Dispclk => Some(defaults.dispclk_mhz),
            Self::Dtbclk => Some(defaults.dtbclk_mhz),
            Self::Memclk => Some(defaults.dram_speed_mts / 16),
            _ => None,
        }
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// DPM levels of one clock domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpmClockLevels {
    /// Level values in MHz, 0 where firmware reports nothing
    pub levels: [u32; MAX_DPM_LEVELS],
    /// Levels firmware populated
    pub num_levels: usize,
}

impl DpmClockLevels {
    /// Domain with no levels
    pub const EMPTY: Self = Self {
        levels: [0; MAX_DPM_LEVELS],
        num_levels: 0,
    };

    /// Domain populated from `values`
    ///
    /// More than [`MAX_DPM_LEVELS`] values is `InvalidTable(Full)`.
    pub fn from_slice(values: &[u32]) -> Result<Self> {
        if values.len() > MAX_DPM_LEVELS {
            return Err(TableError::Full.into());
        }
        let mut out = Self::EMPTY;
        out.levels[..values.len()].copy_from_slice(values);
        out.num_levels = values.len();
        Ok(out)
    }

    /// Populated levels
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.levels[..self.num_levels.min(MAX_DPM_LEVELS)]
    }

    #[inline]
    fn is_corrupt(&self) -> bool {
        self.num_levels > MAX_DPM_LEVELS
    }

    /// Largest reported value, 0 when none is valid
    pub fn max(&self) -> u32 {
        self.as_slice().iter().copied().max().unwrap_or(0)
    }

    /// First non-zero level
    pub fn first_valid(&self) -> Option<u32> {
        self.as_slice().iter().copied().find(|&v| v != 0)
    }

    fn is_monotonic_where_valid(&self) -> bool {
        let mut prev = 0;
        for &v in self.as_slice() {
            if v == 0 {
                continue;
            }
            if v < prev {
                return false;
            }
            prev = v;
        }
        true
    }
}

/// Firmware DPM report for all display-relevant clock domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpmTable {
    /// DCFCLK levels
    pub dcfclk: DpmClockLevels,
    /// DISPCLK levels
    pub dispclk: DpmClockLevels,
    /// DPPCLK levels
    pub dppclk: DpmClockLevels,
    /// DTBCLK levels
    pub dtbclk: DpmClockLevels,
    /// PHYCLK levels
    pub phyclk: DpmClockLevels,
    /// SOCCLK levels
    pub socclk: DpmClockLevels,
    /// FCLK levels
    pub fclk: DpmClockLevels,
    /// UCLK levels
    pub memclk: DpmClockLevels,
}

impl DpmTable {
    /// Report with no levels in any domain
    pub const fn empty() -> Self {
        Self {
            dcfclk: DpmClockLevels::EMPTY,
            dispclk: DpmClockLevels::EMPTY,
            dppclk: DpmClockLevels::EMPTY,
            dtbclk: DpmClockLevels::EMPTY,
            phyclk: DpmClockLevels::EMPTY,
            socclk: DpmClockLevels::EMPTY,
            fclk: DpmClockLevels::EMPTY,
            memclk: DpmClockLevels::EMPTY,
        }
    }

    /// Levels of `domain`
    pub fn domain(&self, domain: ClockDomain) -> &DpmClockLevels {
        match domain {
            ClockDomain::Dcfclk => &self.dcfclk,
            ClockDomain::Dispclk => &self.dispclk,
            ClockDomain::Dppclk => &self.dppclk,
            ClockDomain::Dtbclk => &self.dtbclk,
            ClockDomain::Phyclk => &self.phyclk,
            ClockDomain::Socclk => &self.socclk,
            ClockDomain::Fclk => &self.fclk,
            ClockDomain::Memclk => &self.memclk,
        }
    }

    /// Mutable levels of `domain`
    pub fn domain_mut(&mut self, domain: ClockDomain) -> &mut DpmClockLevels {
        match domain {
            ClockDomain::Dcfclk => &mut self.dcfclk,
            ClockDomain::Dispclk => &mut self.dispclk,
            ClockDomain::Dppclk => &mut self.dppclk,
            ClockDomain::Dtbclk => &mut self.dtbclk,
            ClockDomain::Phyclk => &mut self.phyclk,
            ClockDomain::Socclk => &mut self.socclk,
            ClockDomain::Fclk => &mut self.fclk,
            ClockDomain::Memclk => &mut self.memclk,
        }
    }
}

impl Default for DpmTable {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// PATCHER
// =============================================================================

/// What [`patch_dpm_table`] changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchReport {
    /// Domains where zero levels were filled in
    pub filled: DpmDomains,
    /// Domains seeded from SoC defaults
    pub seeded: DpmDomains,
    /// Domains left without any level
    pub unpopulated: DpmDomains,
}

/// Normalise a firmware DPM report in place
///
/// The table is only modified when every domain has at most
/// [`MAX_DPM_LEVELS`] levels and passes the monotonicity check.
pub fn patch_dpm_table(table: &mut DpmTable, defaults: &DefaultClockLimits) -> Result<PatchReport> {
    if let Some(domain) = ClockDomain::ALL.iter().find(|d| table.domain(**d).is_corrupt()) {
        log::warn!(
            "DML: {:?} reports {} DPM levels",
            domain,
            table.domain(*domain).num_levels
        );
        return Err(TableError::Corrupt.into());
    }
    let decreasing = ClockDomain::ALL
        .iter()
        .filter(|d| !table.domain(**d).is_monotonic_where_valid())
        .fold(DpmDomains::empty(), |acc, d| acc | d.flag());
    if !decreasing.is_empty() {
        return Err(TableError::NonMonotonic(decreasing).into());
    }

    let mut report = PatchReport::default();
    for domain in ClockDomain::ALL {
        let clk = table.domain_mut(domain);
        let Some(lowest) = clk.first_valid() else {
            match domain.default_mhz(defaults) {
                Some(value) => {
                    clk.levels[0] = value;
                    clk.num_levels = clk.num_levels.max(1);
                    for v in &mut clk.levels[1..clk.num_levels] {
                        *v = value;
                    }
                    report.seeded |= domain.flag();
                },
                None => report.unpopulated |= domain.flag(),
            }
            continue;
        };

        let mut prev = lowest;
        let mut filled = false;
        for v in &mut clk.levels[..clk.num_levels] {
            if *v == 0 {
                *v = prev;
                filled = true;
            } else {
                prev = *v;
            }
        }
        if filled {
            report.filled |= domain.flag();
        }
    }

    if !report.seeded.is_empty() {
        log::warn!("DML: DPM report missing {:?}, using SoC defaults", report.seeded);
    }
    if !report.filled.is_empty() {
        log::debug!("DML: filled zero DPM levels for {:?}", report.filled);
    }
    Ok(report)
}
