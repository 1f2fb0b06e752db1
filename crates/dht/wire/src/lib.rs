//! Wire format of the messages DHT neighbours exchange.
//!
//! All integers are big-endian. Messages are self-delimiting through the size
//! field of their header, which [`DhtCodec`] uses for framing.

mod codec;
mod error;
mod message;

pub use codec::DhtCodec;
pub use error::WireError;
pub use message::{
    DhtMessage, GET_FIXED_SIZE, GetMessage, HEADER_SIZE, MAX_MESSAGE_SIZE, MAX_PATH_LENGTH,
    MessageType, PUT_FIXED_SIZE, PutMessage, RESULT_FIXED_SIZE, ResultMessage, from_micros,
    to_micros,
};
