use asynchronous_codec::{Decoder, Encoder};
use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::{DhtMessage, HEADER_SIZE, WireError};

/// Length-delimited framing of [`DhtMessage`]s, using the size field of the
/// message header as the frame length.
#[derive(Clone, Copy, Debug, Default)]
pub struct DhtCodec;

impl Encoder for DhtCodec {
    type Item<'a> = DhtMessage;
    type Error = WireError;

    fn encode(&mut self, item: Self::Item<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode(dst)
    }
}

impl Decoder for DhtCodec {
    type Item = DhtMessage;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        let mut header: &[u8] = src.as_ref();
        let size = usize::from(header.get_u16());
        if size < HEADER_SIZE {
            return Err(WireError::InvalidSize(size as u16));
        }
        if src.len() < size {
            trace!(have = src.len(), need = size, "partial frame");
            src.reserve(size - src.len());
            return Ok(None);
        }

        DhtMessage::decode(src.split_to(size).freeze()).map(Some)
    }
}
