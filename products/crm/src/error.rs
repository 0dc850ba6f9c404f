use platform_store::StoreError;
use thiserror::Error;

pub type CrmResult<T> = Result<T, CrmError>;

/// Failures surfaced by the pipeline and billing operations.
///
/// A missing negotiation or billing record is not an error: lookups return
/// `Ok(None)` instead.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("unknown stage {0:?}")]
    UnknownStage(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("stored record #{position} is corrupt: {source}")]
    CorruptRecord {
        position: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode record: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl CrmError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// True when the failure came from the storage backend rather than the data.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
