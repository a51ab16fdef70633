use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The store could not be reached or did not answer within its timeout. Callers must never
    /// read this as "no data".
    #[error("Store Unavailable - {0}")]
    StoreUnavailable(String),

    #[error("Data Corruption in record {key} - {reason}")]
    DataCorruption { key: String, reason: String },

    #[error("Invalid Record - {0}")]
    InvalidRecord(String),

    #[error("Config Error - {0}")]
    Config(String),

    #[error("Connection Error - {0}")]
    Connection(String),

    #[error("CancellationToken Cancelled")]
    Cancellation,
}

impl Error {
    pub(crate) fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::DataCorruption {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
