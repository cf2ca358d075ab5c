use thiserror::Error;

/// Errors raised while decoding or combining canonical model buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid hexadecimal digit {0:?} in model buffer")]
    InvalidHex(char),
    #[error("malformed model buffer: {0}")]
    Malformed(&'static str),
}
