//! Local block storage.

use std::time::SystemTime;

use bytes::Bytes;
use hashlink::LinkedHashMap;
use tracing::trace;
use vertex_dht_primitives::{BlockType, Identifier, PeerPath, ReplyFilter};

/// Default number of keys kept by [`MemoryContentStore`].
pub const DEFAULT_STORE_CAPACITY: usize = 4096;

/// A block as stored locally and handed to local clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub key: Identifier,
    pub block_type: BlockType,
    pub expiration: SystemTime,
    pub put_path: PeerPath,
    pub payload: Bytes,
}

impl Block {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expiration <= now
    }
}

/// A lookup against the local store.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    pub key: &'a Identifier,
    pub block_type: BlockType,
    pub xquery: &'a [u8],
    pub reply_filter: &'a ReplyFilter,
}

/// Overall outcome of a local lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupEvaluation {
    /// Matching blocks were found; more may exist elsewhere.
    OkMore,
    /// The returned blocks fully answer the request; it need not be forwarded.
    OkLast,
    NotFound,
    /// Answers will arrive later through [`Event::LocalReply`](crate::Event::LocalReply).
    Deferred,
}

/// Result of [`ContentStore::get`].
#[derive(Debug, Clone)]
pub struct LocalLookup {
    pub blocks: Vec<Block>,
    pub evaluation: LookupEvaluation,
}

impl LocalLookup {
    pub const fn not_found() -> Self {
        Self {
            blocks: Vec::new(),
            evaluation: LookupEvaluation::NotFound,
        }
    }
}

/// Local block storage consulted when this node is closest to a key.
pub trait ContentStore: Send {
    fn put(&mut self, block: Block);

    fn get(&mut self, query: &Query<'_>) -> LocalLookup;
}

/// In-memory [`ContentStore`] evicting the least recently used key.
#[derive(Debug)]
pub struct MemoryContentStore {
    blocks: LinkedHashMap<Identifier, Vec<Block>>,
    capacity: usize,
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}

impl MemoryContentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            blocks: LinkedHashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of keys with at least one block.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every block stored under `key`, expired ones included.
    pub fn blocks(&self, key: &Identifier) -> &[Block] {
        self.blocks.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Move `key` to the most recently used end.
    fn touch(&mut self, key: &Identifier) -> Vec<Block> {
        self.blocks.remove(key).unwrap_or_default()
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&mut self, block: Block) {
        let now = SystemTime::now();
        let key = block.key;
        let mut stored = self.touch(&key);
        stored.retain(|b| !b.is_expired(now));

        match stored
            .iter_mut()
            .find(|b| b.block_type == block.block_type && b.payload == block.payload)
        {
            Some(existing) => {
                existing.expiration = existing.expiration.max(block.expiration);
                existing.put_path = block.put_path;
            }
            None => stored.push(block),
        }
        self.blocks.insert(key, stored);

        while self.blocks.len() > self.capacity {
            if let Some((evicted, _)) = self.blocks.pop_front() {
                trace!(key = %evicted, "evicted stored blocks");
            }
        }
    }

    fn get(&mut self, query: &Query<'_>) -> LocalLookup {
        let now = SystemTime::now();
        let mut stored = self.touch(query.key);
        stored.retain(|b| !b.is_expired(now));

        let blocks: Vec<_> = stored
            .iter()
            .filter(|b| query.block_type == BlockType::ANY || b.block_type == query.block_type)
            .cloned()
            .collect();
        if !stored.is_empty() {
            self.blocks.insert(*query.key, stored);
        }

        if blocks.is_empty() {
            LocalLookup::not_found()
        } else {
            LocalLookup {
                blocks,
                evaluation: LookupEvaluation::OkMore,
            }
        }
    }
}
