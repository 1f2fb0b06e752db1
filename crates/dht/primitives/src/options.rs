use std::{fmt, ops::BitOr};

/// Routing options carried by PUT and GET messages.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RouteOptions(u32);

impl RouteOptions {
    pub const NONE: Self = Self(0);

    /// Every peer on the route, not only the closest, processes the message.
    pub const DEMULTIPLEX_EVERYWHERE: Self = Self(1);

    /// Peers append themselves to the recorded path.
    pub const RECORD_ROUTE: Self = Self(2);

    /// The GET asks for HELLOs of peers close to its key.
    pub const FIND_PEER: Self = Self(4);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn demultiplex_everywhere(self) -> bool {
        self.contains(Self::DEMULTIPLEX_EVERYWHERE)
    }

    pub const fn record_route(self) -> bool {
        self.contains(Self::RECORD_ROUTE)
    }

    pub const fn find_peer(self) -> bool {
        self.contains(Self::FIND_PEER)
    }
}

impl BitOr for RouteOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for (flag, name) in [
            (Self::DEMULTIPLEX_EVERYWHERE, "DEMULTIPLEX_EVERYWHERE"),
            (Self::RECORD_ROUTE, "RECORD_ROUTE"),
            (Self::FIND_PEER, "FIND_PEER"),
        ] {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}
