use thiserror::Error;

/// Errors raised while building [`Config`](crate::Config) from the environment.
///
/// Any of these is fatal at startup: the worker exits without attempting a pass.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
