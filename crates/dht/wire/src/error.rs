use crate::MessageType;

/// Errors encoding or decoding DHT wire messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Underlying I/O failure while framing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Header declares a size smaller than the header itself.
    #[error("declared size {0} is smaller than the message header")]
    InvalidSize(u16),

    /// Header carries a type this codec does not know.
    #[error("unknown message type {0}")]
    UnknownType(u16),

    /// Frame is shorter than the fixed part of its message type.
    #[error("{ty} message of {size} bytes is shorter than its fixed part ({min} bytes)")]
    TooShort {
        ty: MessageType,
        size: usize,
        min: usize,
    },

    /// A declared path length is larger than any message could carry.
    #[error("{ty} message declares a path of {len} entries")]
    PathTooLong { ty: MessageType, len: u32 },

    /// Declared variable-length sections do not fit the frame.
    #[error("{ty} message declares {declared} bytes of variable data but carries {available}")]
    LengthMismatch {
        ty: MessageType,
        declared: usize,
        available: usize,
    },

    /// Encoded message would exceed the maximum frame size.
    #[error("message of {0} bytes exceeds the maximum message size")]
    Oversized(usize),

    /// Payload alone does not fit a PUT, even without a recorded path.
    #[error("payload of {0} bytes does not fit a PUT message")]
    PayloadTooLarge(usize),
}
