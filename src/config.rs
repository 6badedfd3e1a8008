//! Sweep and thread configuration read from the environment.
//!
//! | Variable | Form | Default |
//! |---|---|---|
//! | `NUMAKERN_SIZE_EXP` | `lo..=hi` or `e` | `15..=30` |
//! | `NUMAKERN_GRAIN_EXP` | `lo..=hi` or `e` | `0..=10` |
//! | `NUMAKERN_GRAIN_SIZE_EXP` | `e` | `25` |
//! | `NUMAKERN_THREADS_PER_NODE` | `n > 0` | CPUs of node 0 |

use std::ops::RangeInclusive;

use crate::bench::SizeSweep;
use crate::numa::NumaTopology;

pub const SIZE_EXP_VAR: &str = "NUMAKERN_SIZE_EXP";
pub const GRAIN_EXP_VAR: &str = "NUMAKERN_GRAIN_EXP";
pub const GRAIN_SIZE_EXP_VAR: &str = "NUMAKERN_GRAIN_SIZE_EXP";
pub const THREADS_PER_NODE_VAR: &str = "NUMAKERN_THREADS_PER_NODE";

/// Malformed configuration value.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} as an exponent or `lo..=hi` range")]
    InvalidRange { var: &'static str, value: String },

    #[error("{var}: empty range {lo}..={hi}")]
    EmptyRange { var: &'static str, lo: u32, hi: u32 },

    #[error("{var}: exponent {exp} exceeds {max}")]
    ExponentTooLarge { var: &'static str, exp: u32, max: u32 },

    #[error("{var}: expected a positive integer, got {value:?}")]
    InvalidCount { var: &'static str, value: String },
}

/// Resolved benchmark configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub sizes: SizeSweep,
    pub grains: SizeSweep,
    /// Array length used by the grain-size sweep.
    pub grain_sweep_len: usize,
    pub threads_per_node: usize,
}

impl BenchConfig {
    /// Defaults for `topology`, without reading the environment.
    #[must_use]
    pub fn defaults(topology: &NumaTopology) -> Self {
        Self {
            sizes: SizeSweep::new(15..=30),
            grains: SizeSweep::new(0..=10),
            grain_sweep_len: 1 << 25,
            threads_per_node: topology.cpu_set_for(0).len().max(1),
        }
    }

    /// Defaults overridden by the `NUMAKERN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first malformed variable.
    pub fn from_env(topology: &NumaTopology) -> Result<Self, ConfigError> {
        Self::from_lookup(topology, |var| std::env::var(var).ok())
    }

    /// Same as [`BenchConfig::from_env`] with an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first malformed variable.
    pub fn from_lookup<L>(topology: &NumaTopology, lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::defaults(topology);

        if let Some(value) = lookup(SIZE_EXP_VAR) {
            cfg.sizes = SizeSweep::new(parse_exp_range(SIZE_EXP_VAR, &value)?);
        }
        if let Some(value) = lookup(GRAIN_EXP_VAR) {
            cfg.grains = SizeSweep::new(parse_exp_range(GRAIN_EXP_VAR, &value)?);
        }
        if let Some(value) = lookup(GRAIN_SIZE_EXP_VAR) {
            let exp = parse_exp_range(GRAIN_SIZE_EXP_VAR, &value)?;
            if exp.start() != exp.end() {
                return Err(ConfigError::InvalidRange {
                    var: GRAIN_SIZE_EXP_VAR,
                    value,
                });
            }
            cfg.grain_sweep_len = 1usize << *exp.start();
        }
        if let Some(value) = lookup(THREADS_PER_NODE_VAR) {
            cfg.threads_per_node = match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidCount {
                        var: THREADS_PER_NODE_VAR,
                        value,
                    })
                }
            };
        }

        tracing::debug!(?cfg, "benchmark configuration");
        Ok(cfg)
    }
}

/// Largest accepted exponent; `1 << 40` elements is beyond any host.
const MAX_EXP: u32 = 40;

/// Parse `e` or `lo..=hi` into an inclusive exponent range.
///
/// # Errors
///
/// Fails on malformed input, an empty range, or an exponent above 40.
pub fn parse_exp_range(var: &'static str, value: &str) -> Result<RangeInclusive<u32>, ConfigError> {
    let invalid = || ConfigError::InvalidRange {
        var,
        value: value.to_owned(),
    };
    let parse = |s: &str| s.trim().parse::<u32>().map_err(|_| invalid());

    let (lo, hi) = match value.split_once("..=") {
        Some((lo, hi)) => (parse(lo)?, parse(hi)?),
        None => {
            let e = parse(value)?;
            (e, e)
        }
    };
    if lo > hi {
        return Err(ConfigError::EmptyRange { var, lo, hi });
    }
    if hi > MAX_EXP {
        return Err(ConfigError::ExponentTooLarge {
            var,
            exp: hi,
            max: MAX_EXP,
        });
    }
    Ok(lo..=hi)
}
