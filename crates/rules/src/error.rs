use thiserror::Error;

use carewatch_cache::CacheError;
use carewatch_storage::StoreError;

/// Failure of one rule for one entity. Never aborts the pass.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("state store error: {0}")]
    Cache(#[from] CacheError),

    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("rule '{rule}' found state of kind '{found}'")]
    StateMismatch { rule: String, found: &'static str },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("failed to encode alarm: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("entity listing failed: {0}")]
    Catalog(String),
}
