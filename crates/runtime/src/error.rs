use std::fmt;

/// A rejected collector setting.
#[derive(Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The option name is not one of the known settings.
    UnknownOption(String),
    /// An option was not written as `key=value`.
    Malformed(String),
    /// The value of an option is not a number.
    InvalidNumber { option: String, value: String },
    /// A setting lies outside its allowed range.
    OutOfRange {
        option: &'static str,
        value: usize,
        min: usize,
        max: usize,
    },
}

impl fmt::Debug for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigError({})", self)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownOption(name) => write!(f, "unknown collector option `{}`", name),
            ConfigError::Malformed(opt) => {
                write!(f, "collector option `{}` is not of the form key=value", opt)
            }
            ConfigError::InvalidNumber { option, value } => {
                write!(f, "collector option `{}` expects a number, got `{}`", option, value)
            }
            ConfigError::OutOfRange {
                option,
                value,
                min,
                max,
            } => write!(
                f,
                "collector option `{}` is {}, expected between {} and {}",
                option, value, min, max
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
