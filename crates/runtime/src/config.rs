//! Collector tunables.
//!
//! Sizes are counted in kilowords, so the same setting scales with the
//! target's pointer width.

use crate::error::ConfigError;
use crate::value::WORD;


pub const MIN_MINOR_SIZE_KW: usize = 1;
pub const DEFAULT_MINOR_SIZE_KW: usize = 1024;
pub const MAX_MINOR_SIZE_KW: usize = 65536;

pub const DEFAULT_FULL_THRESHOLD_KW: usize = 16384;
pub const MAX_FULL_THRESHOLD_KW: usize = 1 << 24;

pub const DEFAULT_FULL_PERIOD: u32 = 64;

pub const DEFAULT_COPIED_THRESHOLD_KW: usize = 8192;

pub(crate) const KILOWORD: usize = 1024 * WORD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Size of a fresh young arena.
    pub minor_size_kw: usize,
    /// Young allocation volume since the last full collection that triggers
    /// the next one.
    pub full_threshold_kw: usize,
    /// Number of minor collections between two periodic full collections.
    /// Zero disables the periodic trigger.
    pub full_period: u32,
    /// Volume copied to old space since the last full collection that
    /// triggers the next one.
    pub copied_threshold_kw: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            minor_size_kw: DEFAULT_MINOR_SIZE_KW,
            full_threshold_kw: DEFAULT_FULL_THRESHOLD_KW,
            full_period: DEFAULT_FULL_PERIOD,
            copied_threshold_kw: DEFAULT_COPIED_THRESHOLD_KW,
        }
    }
}

impl GcConfig {
    pub fn with_minor_size_kw(mut self, kw: usize) -> Self {
        self.minor_size_kw = kw;
        self
    }

    pub fn with_full_threshold_kw(mut self, kw: usize) -> Self {
        self.full_threshold_kw = kw;
        self
    }

    pub fn with_full_period(mut self, period: u32) -> Self {
        self.full_period = period;
        self
    }

    pub fn with_copied_threshold_kw(mut self, kw: usize) -> Self {
        self.copied_threshold_kw = kw;
        self
    }

    pub fn minor_size_bytes(&self) -> usize {
        self.minor_size_kw * KILOWORD
    }

    pub fn full_threshold_bytes(&self) -> usize {
        self.full_threshold_kw * KILOWORD
    }

    pub fn copied_threshold_bytes(&self) -> usize {
        self.copied_threshold_kw * KILOWORD
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "minor-zone",
            self.minor_size_kw,
            MIN_MINOR_SIZE_KW,
            MAX_MINOR_SIZE_KW,
        )?;
        check_range(
            "full-threshold",
            self.full_threshold_kw,
            self.minor_size_kw,
            MAX_FULL_THRESHOLD_KW,
        )?;
        check_range(
            "copied-threshold",
            self.copied_threshold_kw,
            1,
            MAX_FULL_THRESHOLD_KW,
        )?;
        Ok(())
    }

    /// Set one option by its command-line name.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let number = || {
            value.parse::<usize>().map_err(|_| ConfigError::InvalidNumber {
                option: key.to_owned(),
                value: value.to_owned(),
            })
        };
        match key {
            "minor-zone" => self.minor_size_kw = number()?,
            "full-threshold" => self.full_threshold_kw = number()?,
            "copied-threshold" => self.copied_threshold_kw = number()?,
            "full-period" => {
                self.full_period = value.parse().map_err(|_| ConfigError::InvalidNumber {
                    option: key.to_owned(),
                    value: value.to_owned(),
                })?
            }
            _ => return Err(ConfigError::UnknownOption(key.to_owned())),
        }
        Ok(())
    }

    /// Parse a comma- or whitespace-separated list of `key=value` options
    /// on top of the defaults, e.g. `minor-zone=256,full-period=8`.
    pub fn parse_options(options: &str) -> Result<GcConfig, ConfigError> {
        let mut config = GcConfig::default();
        for opt in options
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|opt| !opt.is_empty())
        {
            let (key, value) = opt
                .split_once('=')
                .ok_or_else(|| ConfigError::Malformed(opt.to_owned()))?;
            config.apply_option(key.trim(), value.trim())?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn check_range(
    option: &'static str,
    value: usize,
    min: usize,
    max: usize,
) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            option,
            value,
            min,
            max,
        });
    }
    Ok(())
}
