//! Construct configuration: team size, lane width, serialization clauses
//! and the cross-thread scan strategy.

use crate::error::{Result, ScanError};
use std::env;
use std::str::FromStr;

/// Lane width used when no `simdlen` is given (eight 32-bit lanes of AVX2).
pub const DEFAULT_SIMDLEN: usize = 8;

pub const ENV_NUM_THREADS: &str = "INSCAN_NUM_THREADS";
pub const ENV_SIMDLEN: &str = "INSCAN_SIMDLEN";
pub const ENV_CROSS_SCAN: &str = "INSCAN_CROSS_SCAN";

/// Whether an iteration's own contribution is part of its scan value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    /// `output[i]` covers iterations `0..=i`
    Inclusive,
    /// `output[i]` covers iterations `0..i`; `output[0]` is the identity
    Exclusive,
}

/// How thread offsets are derived from the published thread totals.
///
/// Both strategies produce the same offsets; they differ only in which
/// threads do the arithmetic between the two barriers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CrossScanStrategy {
    /// Thread 0 computes every offset and the grand total.
    #[default]
    Designated,
    /// Each thread computes its own offset from the shared totals.
    Redundant,
}

impl FromStr for CrossScanStrategy {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "designated" => Ok(Self::Designated),
            "redundant" => Ok(Self::Redundant),
            other => Err(ScanError::InvalidConfig(format!(
                "unknown cross-thread scan strategy `{}`",
                other
            ))),
        }
    }
}

/// Configuration of one scan loop construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Team size used by [`crate::ScanLoop::execute`]
    pub num_threads: usize,

    /// Lane group width; 1 disables vector grouping (`simdlen(1)`)
    pub simdlen: usize,

    /// `if(...)` clause; `false` runs the construct serially
    pub parallel: bool,

    /// `if(simd: ...)` clause; `false` runs the construct serially
    pub simd: bool,

    pub cross_scan: CrossScanStrategy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            num_threads: rayon::current_num_threads().max(1),
            simdlen: DEFAULT_SIMDLEN,
            parallel: true,
            simd: true,
            cross_scan: CrossScanStrategy::Designated,
        }
    }
}

impl ScanConfig {
    /// Defaults overridden by `INSCAN_NUM_THREADS`, `INSCAN_SIMDLEN` and
    /// `INSCAN_CROSS_SCAN` when they are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| match env::var(key) {
            Ok(raw) => Ok(Some(raw)),
            Err(env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ScanError::InvalidConfig(format!("{}: {}", key, e))),
        })
    }

    /// Defaults overridden by whatever `lookup` returns for the `INSCAN_*`
    /// keys. The result is validated.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<Option<String>>,
    {
        let mut config = Self::default();
        if let Some(threads) = parse_setting::<usize, _>(&lookup, ENV_NUM_THREADS)? {
            config.num_threads = threads;
        }
        if let Some(simdlen) = parse_setting::<usize, _>(&lookup, ENV_SIMDLEN)? {
            config.simdlen = simdlen;
        }
        if let Some(strategy) = parse_setting::<CrossScanStrategy, _>(&lookup, ENV_CROSS_SCAN)? {
            config.cross_scan = strategy;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_simdlen(mut self, simdlen: usize) -> Self {
        self.simdlen = simdlen;
        self
    }

    /// Models `if(condition)` on the construct.
    pub fn with_if(mut self, condition: bool) -> Self {
        self.parallel = condition;
        self
    }

    /// Models `if(simd: condition)` on the construct.
    pub fn with_simd_if(mut self, condition: bool) -> Self {
        self.simd = condition;
        self
    }

    pub fn with_cross_scan(mut self, strategy: CrossScanStrategy) -> Self {
        self.cross_scan = strategy;
        self
    }

    /// True when an `if` clause forces the single-thread, single-lane path.
    pub fn is_serialized(&self) -> bool {
        !self.parallel || !self.simd
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(ScanError::InvalidTeamSize(self.num_threads));
        }
        if self.simdlen == 0 {
            return Err(ScanError::InvalidLaneWidth(self.simdlen));
        }
        Ok(())
    }
}

fn parse_setting<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<Option<String>>,
{
    match lookup(key)? {
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ScanError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))
        }),
        None => Ok(None),
    }
}
