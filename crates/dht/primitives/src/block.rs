use std::fmt;

/// Numeric block type tag.
///
/// Unknown values are carried through untouched; only the router's block
/// evaluator gives them meaning.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockType(pub u32);

impl BlockType {
    /// Wildcard used by GETs that accept any block.
    pub const ANY: Self = Self(0);

    /// A peer's reachability record.
    pub const HELLO: Self = Self(7);

    /// Opaque test payload.
    pub const TEST: Self = Self(8);

    pub const fn is_hello(self) -> bool {
        self.0 == Self::HELLO.0
    }
}

impl From<u32> for BlockType {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Debug for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ANY => f.write_str("ANY"),
            Self::HELLO => f.write_str("HELLO"),
            Self::TEST => f.write_str("TEST"),
            Self(other) => write!(f, "BlockType({other})"),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
