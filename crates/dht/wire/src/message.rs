//! PUT, GET and RESULT messages exchanged between neighbours.
//!
//! Every message starts with a 4-byte big-endian header `(size, type)` where
//! `size` counts the header itself. The fixed part of each body follows, then
//! the variable-length sections whose lengths the fixed part declares.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use vertex_dht_primitives::{
    BlockType, IDENTIFIER_BYTES, Identifier, PEER_FILTER_BYTES, PeerFilter, PeerPath,
    ReplyFilter, RouteOptions,
};

use crate::WireError;

/// Size of the `(size, type)` header.
pub const HEADER_SIZE: usize = 4;

/// Largest encodable message, header included.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Upper bound on any declared path length.
pub const MAX_PATH_LENGTH: usize = MAX_MESSAGE_SIZE / IDENTIFIER_BYTES;

/// Header, five u32 fields, expiration, peer filter and key.
pub const PUT_FIXED_SIZE: usize = HEADER_SIZE + 5 * 4 + 8 + PEER_FILTER_BYTES + IDENTIFIER_BYTES;

/// Header, six u32 fields, peer filter and key.
pub const GET_FIXED_SIZE: usize = HEADER_SIZE + 6 * 4 + PEER_FILTER_BYTES + IDENTIFIER_BYTES;

/// Header, three u32 fields, expiration and key.
pub const RESULT_FIXED_SIZE: usize = HEADER_SIZE + 3 * 4 + 8 + IDENTIFIER_BYTES;

/// Message type tag in the header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[repr(u16)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageType {
    Put = 146,
    Get = 147,
    Result = 148,
}

/// Microseconds since the UNIX epoch, saturating at both ends.
pub fn to_micros(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

/// Inverse of [`to_micros`].
pub fn from_micros(micros: u64) -> SystemTime {
    UNIX_EPOCH
        .checked_add(Duration::from_micros(micros))
        .unwrap_or(UNIX_EPOCH + Duration::from_secs(u64::from(u32::MAX)))
}

/// Store a block at the peers closest to `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutMessage {
    pub options: RouteOptions,
    pub block_type: BlockType,
    pub hop_count: u32,
    pub desired_replication: u32,
    pub expiration: SystemTime,
    pub peer_filter: PeerFilter,
    pub key: Identifier,
    pub put_path: PeerPath,
    pub payload: Bytes,
}

impl PutMessage {
    pub fn encoded_len(&self) -> usize {
        PUT_FIXED_SIZE + self.put_path.len() * IDENTIFIER_BYTES + self.payload.len()
    }

    /// Shrink the message to [`MAX_MESSAGE_SIZE`].
    ///
    /// The recorded path is dropped first; a payload that is too large on its
    /// own is rejected.
    pub fn fit_to_size(&mut self) -> Result<(), WireError> {
        if self.encoded_len() <= MAX_MESSAGE_SIZE {
            return Ok(());
        }
        self.put_path.clear();
        if self.encoded_len() <= MAX_MESSAGE_SIZE {
            Ok(())
        } else {
            Err(WireError::PayloadTooLarge(self.payload.len()))
        }
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_u32(self.options.bits());
        dst.put_u32(self.block_type.0);
        dst.put_u32(self.hop_count);
        dst.put_u32(self.desired_replication);
        dst.put_u32(self.put_path.len() as u32);
        dst.put_u64(to_micros(self.expiration));
        dst.put_slice(self.peer_filter.as_bytes());
        dst.put_slice(self.key.as_bytes());
        put_path(dst, &self.put_path);
        dst.put_slice(&self.payload);
    }

    fn decode_body(mut body: Bytes) -> Result<Self, WireError> {
        let ty = MessageType::Put;
        ensure_fixed(ty, body.len() + HEADER_SIZE, PUT_FIXED_SIZE)?;

        let options = RouteOptions::from_bits(body.get_u32());
        let block_type = BlockType(body.get_u32());
        let hop_count = body.get_u32();
        let desired_replication = body.get_u32();
        let path_len = body.get_u32();
        let expiration = from_micros(body.get_u64());
        let peer_filter = get_peer_filter(&mut body);
        let key = get_identifier(&mut body);
        let put_path = get_path(ty, &mut body, path_len)?;

        Ok(Self {
            options,
            block_type,
            hop_count,
            desired_replication,
            expiration,
            peer_filter,
            key,
            put_path,
            payload: body,
        })
    }
}

/// Look up blocks stored under `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetMessage {
    pub options: RouteOptions,
    pub block_type: BlockType,
    pub hop_count: u32,
    pub desired_replication: u32,
    pub peer_filter: PeerFilter,
    pub key: Identifier,
    pub xquery: Bytes,
    pub reply_filter: ReplyFilter,
}

impl GetMessage {
    pub fn encoded_len(&self) -> usize {
        GET_FIXED_SIZE + self.xquery.len() + self.reply_filter.bits().len()
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_u32(self.options.bits());
        dst.put_u32(self.block_type.0);
        dst.put_u32(self.hop_count);
        dst.put_u32(self.desired_replication);
        dst.put_u32(self.xquery.len() as u32);
        dst.put_u32(self.reply_filter.mutator());
        dst.put_slice(self.peer_filter.as_bytes());
        dst.put_slice(self.key.as_bytes());
        dst.put_slice(&self.xquery);
        dst.put_slice(self.reply_filter.bits());
    }

    fn decode_body(mut body: Bytes) -> Result<Self, WireError> {
        let ty = MessageType::Get;
        ensure_fixed(ty, body.len() + HEADER_SIZE, GET_FIXED_SIZE)?;

        let options = RouteOptions::from_bits(body.get_u32());
        let block_type = BlockType(body.get_u32());
        let hop_count = body.get_u32();
        let desired_replication = body.get_u32();
        let xquery_size = body.get_u32() as usize;
        let mutator = body.get_u32();
        let peer_filter = get_peer_filter(&mut body);
        let key = get_identifier(&mut body);

        if xquery_size > body.remaining() {
            return Err(WireError::LengthMismatch {
                ty,
                declared: xquery_size,
                available: body.remaining(),
            });
        }
        let xquery = body.split_to(xquery_size);

        Ok(Self {
            options,
            block_type,
            hop_count,
            desired_replication,
            peer_filter,
            key,
            xquery,
            reply_filter: ReplyFilter::from_parts(mutator, body.to_vec()),
        })
    }
}

/// A block travelling back towards a requester.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultMessage {
    pub block_type: BlockType,
    pub expiration: SystemTime,
    pub key: Identifier,
    pub put_path: PeerPath,
    pub get_path: PeerPath,
    pub payload: Bytes,
}

impl ResultMessage {
    pub fn encoded_len(&self) -> usize {
        RESULT_FIXED_SIZE
            + (self.put_path.len() + self.get_path.len()) * IDENTIFIER_BYTES
            + self.payload.len()
    }

    /// Shrink the message to [`MAX_MESSAGE_SIZE`], dropping the get path and
    /// then the put path.
    pub fn fit_to_size(&mut self) -> Result<(), WireError> {
        if self.encoded_len() <= MAX_MESSAGE_SIZE {
            return Ok(());
        }
        self.get_path.clear();
        if self.encoded_len() <= MAX_MESSAGE_SIZE {
            return Ok(());
        }
        self.put_path.clear();
        if self.encoded_len() <= MAX_MESSAGE_SIZE {
            Ok(())
        } else {
            Err(WireError::PayloadTooLarge(self.payload.len()))
        }
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        dst.put_u32(self.block_type.0);
        dst.put_u32(self.put_path.len() as u32);
        dst.put_u32(self.get_path.len() as u32);
        dst.put_u64(to_micros(self.expiration));
        dst.put_slice(self.key.as_bytes());
        put_path(dst, &self.put_path);
        put_path(dst, &self.get_path);
        dst.put_slice(&self.payload);
    }

    fn decode_body(mut body: Bytes) -> Result<Self, WireError> {
        let ty = MessageType::Result;
        ensure_fixed(ty, body.len() + HEADER_SIZE, RESULT_FIXED_SIZE)?;

        let block_type = BlockType(body.get_u32());
        let put_len = body.get_u32();
        let get_len = body.get_u32();
        let expiration = from_micros(body.get_u64());
        let key = get_identifier(&mut body);

        check_path_len(ty, put_len)?;
        check_path_len(ty, get_len)?;
        let declared = (put_len as usize + get_len as usize) * IDENTIFIER_BYTES;
        if declared > body.remaining() {
            return Err(WireError::LengthMismatch {
                ty,
                declared,
                available: body.remaining(),
            });
        }
        let put_path = get_path(ty, &mut body, put_len)?;
        let get_path = get_path(ty, &mut body, get_len)?;

        Ok(Self {
            block_type,
            expiration,
            key,
            put_path,
            get_path,
            payload: body,
        })
    }
}

/// Any message exchanged between neighbours.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DhtMessage {
    Put(PutMessage),
    Get(GetMessage),
    Result(ResultMessage),
}

impl DhtMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Put(_) => MessageType::Put,
            Self::Get(_) => MessageType::Get,
            Self::Result(_) => MessageType::Result,
        }
    }

    /// Size on the wire, header included.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Put(m) => m.encoded_len(),
            Self::Get(m) => m.encoded_len(),
            Self::Result(m) => m.encoded_len(),
        }
    }

    /// Append the framed message to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), WireError> {
        let len = self.encoded_len();
        let size = u16::try_from(len).map_err(|_| WireError::Oversized(len))?;

        dst.reserve(len);
        dst.put_u16(size);
        dst.put_u16(self.message_type() as u16);
        match self {
            Self::Put(m) => m.encode_body(dst),
            Self::Get(m) => m.encode_body(dst),
            Self::Result(m) => m.encode_body(dst),
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Bytes, WireError> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse one complete frame.
    pub fn decode(mut frame: Bytes) -> Result<Self, WireError> {
        if frame.len() < HEADER_SIZE {
            return Err(WireError::InvalidSize(frame.len() as u16));
        }
        let size = frame.get_u16();
        let raw_type = frame.get_u16();
        let ty = MessageType::from_repr(raw_type).ok_or(WireError::UnknownType(raw_type))?;

        let available = frame.len() + HEADER_SIZE;
        if usize::from(size) != available {
            return Err(WireError::LengthMismatch {
                ty,
                declared: usize::from(size),
                available,
            });
        }

        match ty {
            MessageType::Put => PutMessage::decode_body(frame).map(Self::Put),
            MessageType::Get => GetMessage::decode_body(frame).map(Self::Get),
            MessageType::Result => ResultMessage::decode_body(frame).map(Self::Result),
        }
    }
}

impl From<PutMessage> for DhtMessage {
    fn from(m: PutMessage) -> Self {
        Self::Put(m)
    }
}

impl From<GetMessage> for DhtMessage {
    fn from(m: GetMessage) -> Self {
        Self::Get(m)
    }
}

impl From<ResultMessage> for DhtMessage {
    fn from(m: ResultMessage) -> Self {
        Self::Result(m)
    }
}

fn ensure_fixed(ty: MessageType, size: usize, min: usize) -> Result<(), WireError> {
    if size < min {
        return Err(WireError::TooShort { ty, size, min });
    }
    Ok(())
}

fn check_path_len(ty: MessageType, len: u32) -> Result<(), WireError> {
    if len as usize > MAX_PATH_LENGTH {
        return Err(WireError::PathTooLong { ty, len });
    }
    Ok(())
}

fn put_path(dst: &mut BytesMut, path: &PeerPath) {
    for hop in path.as_slice() {
        dst.put_slice(hop.as_bytes());
    }
}

fn get_identifier(src: &mut Bytes) -> Identifier {
    let mut bytes = [0u8; IDENTIFIER_BYTES];
    src.copy_to_slice(&mut bytes);
    Identifier::new(bytes)
}

fn get_peer_filter(src: &mut Bytes) -> PeerFilter {
    let mut bytes = [0u8; PEER_FILTER_BYTES];
    src.copy_to_slice(&mut bytes);
    PeerFilter::from_bytes(bytes)
}

fn get_path(ty: MessageType, src: &mut Bytes, len: u32) -> Result<PeerPath, WireError> {
    check_path_len(ty, len)?;
    let declared = len as usize * IDENTIFIER_BYTES;
    if declared > src.remaining() {
        return Err(WireError::LengthMismatch {
            ty,
            declared,
            available: src.remaining(),
        });
    }
    Ok((0..len).map(|_| get_identifier(src)).collect())
}
