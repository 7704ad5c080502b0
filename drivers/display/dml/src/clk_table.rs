//! # Voltage/Clock Table
//!
//! Ordered set of discrete operating points. Each level fixes the clock of
//! every domain the display depends on, plus the bandwidth that follows
//! from them.
//!
//! ```text
//!   vlevel   DCFCLK   FCLK   DRAM      net bw
//!   ------   ------   ----   -------   --------
//!     0       199      400    1552      11462      lowest power
//!     1       258      400    1552      14899
//!     ..       ..       ..      ..         ..
//!     n-1    1488     2000   12352      85760      highest capacity
//! ```
//!
//! Levels are kept strictly ascending by the table's [`SortKey`]; the
//! validator relies on index order being power order.

use arrayvec::ArrayVec;

use crate::error::{Result, TableError};
use crate::model;
use crate::soc::{SocBoundingBox, MAX_VOLTAGE_STATES};

// =============================================================================
// VOLTAGE LEVEL
// =============================================================================

/// One operating point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VoltageLevel {
    /// Position in the table
    pub state: u32,
    /// DCHUB / return bus clock
    pub dcfclk_mhz: f64,
    /// Data fabric clock
    pub fabricclk_mhz: f64,
    /// DRAM transfer rate
    pub dram_speed_mts: f64,
    /// SOC clock
    pub socclk_mhz: f64,
    /// Display clock
    pub dispclk_mhz: f64,
    /// DPP clock
    pub dppclk_mhz: f64,
    /// DSC clock
    pub dscclk_mhz: f64,
    /// DTB clock
    pub dtbclk_mhz: f64,
    /// PHY clock
    pub phyclk_mhz: f64,
    /// Bandwidth available after urgent derating, MB/s
    pub net_bw_mbps: f64,
}

impl VoltageLevel {
    /// Level with only the bandwidth-relevant clocks set
    pub fn new(dcfclk_mhz: f64, fabricclk_mhz: f64, dram_speed_mts: f64) -> Self {
        Self {
            dcfclk_mhz,
            fabricclk_mhz,
            dram_speed_mts,
            ..Self::default()
        }
    }

    /// Copy with the net bandwidth recomputed from the clocks
    pub fn with_net_bandwidth(mut self, soc: &SocBoundingBox) -> Self {
        self.net_bw_mbps =
            model::net_bandwidth_mbps(soc, self.dcfclk_mhz, self.fabricclk_mhz, self.dram_speed_mts);
        self
    }

    /// Value of the ordering key
    #[inline]
    pub fn key(&self, key: SortKey) -> f64 {
        match key {
            SortKey::NetBandwidth => self.net_bw_mbps,
            SortKey::DramSpeed => self.dram_speed_mts,
        }
    }

    /// Memory clock in MHz (16 transfers per clock)
    #[inline]
    pub fn memclk_mhz(&self) -> f64 {
        self.dram_speed_mts / 16.0
    }

    fn is_sane(&self) -> bool {
        [
            self.dcfclk_mhz,
            self.fabricclk_mhz,
            self.dram_speed_mts,
            self.socclk_mhz,
            self.dispclk_mhz,
            self.dppclk_mhz,
            self.dscclk_mhz,
            self.dtbclk_mhz,
            self.phyclk_mhz,
            self.net_bw_mbps,
        ]
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0)
            && self.net_bw_mbps > 0.0
    }
}

// =============================================================================
// TABLE
// =============================================================================

/// Primary ordering key of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Net bandwidth after urgent derating
    #[default]
    NetBandwidth,
    /// DRAM transfer rate
    DramSpeed,
}

/// What [`VoltageTable::insert_sorted`] did with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Inserted at this index
    Inserted(usize),
    /// Replaced an entry with the same key and lower capacity
    Replaced(usize),
    /// An entry with the same key and at least the same capacity exists
    Rejected(usize),
}

/// Operating points in ascending key order
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageTable {
    levels: ArrayVec<VoltageLevel, MAX_VOLTAGE_STATES>,
    key: SortKey,
}

impl VoltageTable {
    /// Empty table ordered by `key`
    pub const fn new(key: SortKey) -> Self {
        Self {
            levels: ArrayVec::new_const(),
            key,
        }
    }

    /// Build a table by sorted insertion of `levels`
    pub fn from_levels(key: SortKey, levels: &[VoltageLevel]) -> Result<Self> {
        let mut table = Self::new(key);
        for level in levels {
            table.insert_sorted(*level)?;
        }
        table.renumber();
        Ok(table)
    }

    /// Ordering key
    #[inline]
    pub fn sort_key(&self) -> SortKey {
        self.key
    }

    /// Number of levels
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// True when no level exists
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level at `vlevel`
    #[inline]
    pub fn get(&self, vlevel: usize) -> Option<&VoltageLevel> {
        self.levels.get(vlevel)
    }

    /// All levels, lowest first
    #[inline]
    pub fn levels(&self) -> &[VoltageLevel] {
        &self.levels
    }

    /// Highest level
    #[inline]
    pub fn last(&self) -> Option<&VoltageLevel> {
        self.levels.last()
    }

    /// Insert `entry` keeping ascending key order
    ///
    /// On an equal key the entry with the higher net bandwidth is kept.
    pub fn insert_sorted(&mut self, entry: VoltageLevel) -> Result<InsertOutcome> {
        let key = entry.key(self.key);
        if !key.is_finite() {
            return Err(TableError::Corrupt.into());
        }
        let sort_key = self.key;
        match self
            .levels
            .binary_search_by(|entry| entry.key(sort_key).total_cmp(&key))
        {
            Ok(index) => {
                if entry.net_bw_mbps > self.levels[index].net_bw_mbps {
                    self.levels[index] = entry;
                    Ok(InsertOutcome::Replaced(index))
                } else {
                    Ok(InsertOutcome::Rejected(index))
                }
            },
            Err(index) => {
                self.levels
                    .try_insert(index, entry)
                    .map_err(|_| TableError::Full)?;
                Ok(InsertOutcome::Inserted(index))
            },
        }
    }

    /// Keep only levels for which `f` returns true
    pub fn retain<F: FnMut(&VoltageLevel) -> bool>(&mut self, mut f: F) {
        self.levels.retain(|level| f(level));
    }

    /// Rewrite state indices to match positions
    pub fn renumber(&mut self) {
        for (i, level) in self.levels.iter_mut().enumerate() {
            level.state = i as u32;
        }
    }

    /// Verify the table is usable by the validator
    pub fn check(&self) -> core::result::Result<(), TableError> {
        if self.levels.is_empty() {
            return Err(TableError::Empty);
        }
        if !self.levels.iter().all(VoltageLevel::is_sane) {
            return Err(TableError::Corrupt);
        }
        let key = self.key;
        if self
            .levels
            .windows(2)
            .any(|w| w[0].key(key) >= w[1].key(key))
        {
            return Err(TableError::Unsorted);
        }
        Ok(())
    }
}

impl Default for VoltageTable {
    fn default() -> Self {
        Self::new(SortKey::NetBandwidth)
    }
}
