//! Inputs to the router and the notifications it publishes.

use vertex_dht_primitives::{BlockType, Identifier};
use vertex_dht_wire::{DhtMessage, GetMessage, PutMessage, ResultMessage};

use crate::{Block, OutboundQueue};

/// Something the router has to react to.
#[derive(Debug)]
pub enum Event {
    Connected(Identifier, OutboundQueue),
    Disconnected(Identifier),
    Put {
        sender: Identifier,
        message: PutMessage,
    },
    Get {
        sender: Identifier,
        message: GetMessage,
    },
    Result {
        sender: Identifier,
        message: ResultMessage,
    },
    /// A block the local content store found after deferring a lookup.
    LocalReply(Block),
}

impl Event {
    /// Wrap a decoded message received from `sender`.
    pub fn message(sender: Identifier, message: DhtMessage) -> Self {
        match message {
            DhtMessage::Put(message) => Self::Put { sender, message },
            DhtMessage::Get(message) => Self::Get { sender, message },
            DhtMessage::Result(message) => Self::Result { sender, message },
        }
    }
}

/// Published to monitor subscribers for every request handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    Put {
        key: Identifier,
        block_type: BlockType,
        hop_count: u32,
        put_path_len: usize,
        /// No peer took the request further.
        last_hop: bool,
    },
    Get {
        key: Identifier,
        block_type: BlockType,
        hop_count: u32,
        forwarded: usize,
    },
    Result {
        key: Identifier,
        block_type: BlockType,
        get_path_len: usize,
    },
}
