use std::ops;

/// Readiness interest a caller can `select`/`clear` on an [`crate::EventHandle`].
///
/// Mirrors mio's `Interests` bitset (`mio::Interests`), trimmed to
/// the two operations this crate's event types need at the selector level;
/// `close` and `error` are always monitored and never gated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest(u8);

const READABLE: u8 = 0b01;
const WRITABLE: u8 = 0b10;

impl Interest {
    pub const EMPTY: Interest = Interest(0);
    pub const READABLE: Interest = Interest(READABLE);
    pub const WRITABLE: Interest = Interest(WRITABLE);

    pub const fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub const fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn with(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    pub const fn without(self, other: Interest) -> Interest {
        Interest(self.0 & !other.0)
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;
    fn bitor(self, rhs: Interest) -> Interest {
        self.with(rhs)
    }
}
