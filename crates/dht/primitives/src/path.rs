use crate::Identifier;

/// Identities a message has traversed, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PeerPath(Vec<Identifier>);

impl PeerPath {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append `hop`.
    ///
    /// If `hop` already appears at position `i`, the path is first cut back to
    /// length `i`, so a loop leaves the path exactly `i + 1` long.
    pub fn record(&mut self, hop: Identifier) {
        if let Some(i) = self.0.iter().position(|p| *p == hop) {
            self.0.truncate(i);
        }
        self.0.push(hop);
    }

    /// Drop everything past the first `len` entries.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Identifier] {
        &self.0
    }

    pub fn last(&self) -> Option<&Identifier> {
        self.0.last()
    }
}

impl From<Vec<Identifier>> for PeerPath {
    fn from(path: Vec<Identifier>) -> Self {
        Self(path)
    }
}

impl FromIterator<Identifier> for PeerPath {
    fn from_iter<T: IntoIterator<Item = Identifier>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
