use std::sync::atomic::{AtomicU8, Ordering};

/// The lifecycle of a `DenseTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Uninitialized,
    Running,
    Draining,
    Finalized,
}

impl TableState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TableState::Uninitialized,
            1 => TableState::Running,
            2 => TableState::Draining,
            _ => TableState::Finalized,
        }
    }
}

/// A `TableState` readable from any thread without locking.
#[derive(Debug)]
pub(super) struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: TableState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> TableState {
        TableState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: TableState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`.
    ///
    /// # Returns
    /// The actual state as an error if it wasn't `from`.
    pub fn transition(&self, from: TableState, to: TableState) -> Result<(), TableState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(TableState::from_u8)
    }
}
