//! Reverse-path table of in-flight GETs.
//!
//! Each GET seen is remembered by `(key, requester)` so that replies can be
//! sent back the way the request came. The table is bounded; the entry that
//! was registered or refreshed longest ago is evicted first.

use bytes::Bytes;
use hashlink::LinkedHashMap;
use tokio::time::Instant;
use vertex_dht_primitives::{BlockType, Identifier, ReplyFilter};

/// Who a reply for a pending GET goes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requester {
    /// The request originated at this node.
    Local,
    Peer(Identifier),
}

impl Requester {
    pub const fn peer(&self) -> Option<&Identifier> {
        match self {
            Self::Local => None,
            Self::Peer(id) => Some(id),
        }
    }
}

/// What is remembered of a GET.
#[derive(Debug, Clone)]
pub struct PendingGet {
    pub block_type: BlockType,
    pub xquery: Bytes,
    /// Replies already delivered to this requester.
    pub reply_filter: ReplyFilter,
    pub registered: Instant,
}

impl PendingGet {
    pub fn new(block_type: BlockType, xquery: Bytes, reply_filter: ReplyFilter) -> Self {
        Self {
            block_type,
            xquery,
            reply_filter,
            registered: Instant::now(),
        }
    }

    /// Whether a reply of `block_type` can answer this request.
    pub fn accepts(&self, block_type: BlockType) -> bool {
        self.block_type == BlockType::ANY || self.block_type == block_type
    }
}

#[derive(Debug)]
pub(crate) struct PendingTable {
    entries: LinkedHashMap<(Identifier, Requester), PendingGet>,
    capacity: usize,
}

impl PendingTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: LinkedHashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Remember `get` for `(key, requester)`.
    ///
    /// A repeated request refreshes the entry and merges the reply filters.
    /// Returns the number of entries evicted to make room.
    pub(crate) fn register(
        &mut self,
        key: Identifier,
        requester: Requester,
        mut get: PendingGet,
    ) -> usize {
        if let Some(previous) = self.entries.remove(&(key, requester)) {
            let mut merged = previous.reply_filter;
            if merged.merge(&get.reply_filter) {
                get.reply_filter = merged;
            }
        }

        let mut evicted = 0;
        while self.entries.len() >= self.capacity {
            if self.entries.pop_front().is_none() {
                break;
            }
            evicted += 1;
        }
        self.entries.insert((key, requester), get);
        evicted
    }

    pub(crate) fn get(&self, key: &Identifier, requester: &Requester) -> Option<&PendingGet> {
        self.entries.get(&(*key, *requester))
    }

    pub(crate) fn contains(&self, key: &Identifier, requester: &Requester) -> bool {
        self.get(key, requester).is_some()
    }

    pub(crate) fn retire(&mut self, key: &Identifier, requester: &Requester) -> Option<PendingGet> {
        self.entries.remove(&(*key, *requester))
    }

    /// Entries waiting for replies on `key`, oldest first.
    pub(crate) fn waiting_for<'a>(
        &'a mut self,
        key: &'a Identifier,
    ) -> impl Iterator<Item = (Requester, &'a mut PendingGet)> + 'a {
        self.entries
            .iter_mut()
            .filter(move |((k, _), _)| k == key)
            .map(|((_, requester), get)| (*requester, get))
    }

    /// Forget everything `peer` asked for.
    pub(crate) fn remove_peer(&mut self, peer: &Identifier) -> usize {
        let stale: Vec<_> = self
            .entries
            .keys()
            .filter(|(_, requester)| requester.peer() == Some(peer))
            .copied()
            .collect();
        for entry in &stale {
            self.entries.remove(entry);
        }
        stale.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(mutator: u32, seen: &[&[u8]]) -> PendingGet {
        let mut filter = ReplyFilter::with_capacity(mutator, 8);
        for s in seen {
            filter.insert(&Identifier::digest(s));
        }
        PendingGet::new(BlockType::TEST, Bytes::new(), filter)
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut table = PendingTable::new(2);
        let peer = Requester::Peer(Identifier::digest(b"p"));
        let keys: Vec<_> = [b"a", b"b", b"c"].into_iter().map(Identifier::digest).collect();

        assert_eq!(table.register(keys[0], peer, get(1, &[])), 0);
        assert_eq!(table.register(keys[1], peer, get(1, &[])), 0);
        assert_eq!(table.register(keys[2], peer, get(1, &[])), 1);

        assert!(!table.contains(&keys[0], &peer));
        assert!(table.contains(&keys[2], &peer));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_repeat_request_merges_and_refreshes() {
        let mut table = PendingTable::new(2);
        let peer = Requester::Peer(Identifier::digest(b"p"));
        let (a, b, c) = (Identifier::digest(b"a"), Identifier::digest(b"b"), Identifier::digest(b"c"));

        table.register(a, peer, get(5, &[b"x"]));
        table.register(b, peer, get(5, &[]));
        table.register(a, peer, get(5, &[b"y"]));

        let filter = &table.get(&a, &peer).unwrap().reply_filter;
        assert!(filter.contains(&Identifier::digest(b"x")));
        assert!(filter.contains(&Identifier::digest(b"y")));

        // `a` was refreshed, so `b` is now the oldest
        table.register(c, peer, get(5, &[]));
        assert!(table.contains(&a, &peer));
        assert!(!table.contains(&b, &peer));
    }

    #[test]
    fn test_waiting_for_and_remove_peer() {
        let mut table = PendingTable::new(8);
        let key = Identifier::digest(b"k");
        let p1 = Identifier::digest(b"p1");
        let p2 = Identifier::digest(b"p2");
        table.register(key, Requester::Peer(p1), get(1, &[]));
        table.register(key, Requester::Peer(p2), get(1, &[]));
        table.register(key, Requester::Local, get(1, &[]));
        table.register(Identifier::digest(b"other"), Requester::Peer(p1), get(1, &[]));

        let requesters: Vec<_> = table.waiting_for(&key).map(|(r, _)| r).collect();
        assert_eq!(requesters, vec![Requester::Peer(p1), Requester::Peer(p2), Requester::Local]);

        assert_eq!(table.remove_peer(&p1), 2);
        assert_eq!(table.len(), 2);
    }
}
