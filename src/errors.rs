use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way the codec and the framing layer can fail, kept as one enum so
/// callers can match on the kind without string inspection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed input at offset {offset}: {message}")]
    Corruption { offset: usize, message: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid stream header")]
    InvalidStreamHeader,
    #[error("invalid length {length} for chunk flag {flag:#04x}")]
    InvalidChunkLength { flag: u8, length: u32 },
    #[error("unsupported chunk flag {flag:#04x}")]
    UnsupportedChunk { flag: u8 },
    #[error("corrupt input: invalid checksum (stored {expected:#010x}, computed {actual:#010x})")]
    CorruptChecksum { expected: u32, actual: u32 },
    #[error("unexpected end of stream")]
    UnexpectedEof,
    #[error("stream is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn corruption(offset: usize, message: impl Into<String>) -> Error {
        Error::Corruption {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Error {
        Error::InvalidArgument(message.into())
    }

    /// Maps onto `io::Error` for the `Read`/`Write` impls, keeping `self` as
    /// the source so callers can still downcast to the original kind.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(e) => e,
            Error::UnexpectedEof => io::Error::new(io::ErrorKind::UnexpectedEof, self),
            Error::InvalidArgument(_) => io::Error::new(io::ErrorKind::InvalidInput, self),
            Error::Closed => io::Error::new(io::ErrorKind::NotConnected, self),
            _ => io::Error::new(io::ErrorKind::InvalidData, self),
        }
    }
}
