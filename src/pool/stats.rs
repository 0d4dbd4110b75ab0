use std::fmt;

/// Snapshot of pool occupancy for one route or the whole pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    available: usize,
    leased: usize,
    pending: usize,
    max: usize,
}

impl PoolStats {
    pub(crate) const fn new(available: usize, leased: usize, pending: usize, max: usize) -> Self {
        Self {
            available,
            leased,
            pending,
            max,
        }
    }

    /// Idle connections ready for reuse.
    #[must_use]
    pub const fn available(&self) -> usize { self.available }

    /// Connections currently handed out.
    #[must_use]
    pub const fn leased(&self) -> usize { self.leased }

    /// Connect attempts in flight.
    #[must_use]
    pub const fn pending(&self) -> usize { self.pending }

    /// Applicable connection limit.
    #[must_use]
    pub const fn max(&self) -> usize { self.max }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[leased: {}][available: {}][pending: {}][max: {}]",
            self.leased, self.available, self.pending, self.max
        )
    }
}
