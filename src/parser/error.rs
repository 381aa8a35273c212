use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input ended while reading {field}")]
    TruncatedInput { field: &'static str },
    #[error("malformed {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },
    #[error("too many transactions to fit into a block [count {count}, max {max}]")]
    TooManyTransactions { count: u64, max: u64 },
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("corrupt packed transaction: {0}")]
    CorruptEncoding(String),
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }

    /// Maps a cursor failure to the decoding taxonomy.
    pub(crate) fn from_io(field: &'static str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::TruncatedInput { field },
            _ => Self::malformed(field, err.to_string()),
        }
    }

    /// Any failure while reading a packed record is a corrupt record.
    pub(crate) fn into_corrupt(self) -> Self {
        match self {
            Self::CorruptEncoding(_) => self,
            other => Self::CorruptEncoding(other.to_string()),
        }
    }
}

impl From<bitcoin::hashes::hex::error::HexToArrayError> for Error {
    fn from(err: bitcoin::hashes::hex::error::HexToArrayError) -> Self {
        Self::InvalidHash(err.to_string())
    }
}

impl From<bitcoin::hashes::hex::error::HexToBytesError> for Error {
    fn from(err: bitcoin::hashes::hex::error::HexToBytesError) -> Self {
        Self::InvalidHash(err.to_string())
    }
}

impl From<bitcoin::base58::Error> for Error {
    fn from(err: bitcoin::base58::Error) -> Self {
        Self::InvalidAddress(err.to_string())
    }
}
