use std::{collections::HashMap, num::NonZeroUsize};

const DEFAULT_POOL_FACTOR: usize = 4;
const DEFAULT_INBOX_FACTOR: usize = 3;
const DEFAULT_UPDATE_THREADS: usize = 32;
const DEFAULT_MAX_MERGE: usize = 4;
const DEFAULT_LEARNING_RATE: f32 = 0.05;

/// Immutable sizing and policy knobs of a `DenseTable`.
#[derive(Debug, Clone)]
pub struct TableConfig {
    device_count: NonZeroUsize,
    pool_factor: NonZeroUsize,
    inbox_factor: NonZeroUsize,
    update_threads: NonZeroUsize,
    max_merge: NonZeroUsize,
    default_learning_rate: f32,
    learning_rates: HashMap<String, f32>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            device_count: NonZeroUsize::MIN,
            pool_factor: nonzero(DEFAULT_POOL_FACTOR),
            inbox_factor: nonzero(DEFAULT_INBOX_FACTOR),
            update_threads: nonzero(DEFAULT_UPDATE_THREADS),
            max_merge: nonzero(DEFAULT_MAX_MERGE),
            default_learning_rate: DEFAULT_LEARNING_RATE,
            learning_rates: HashMap::new(),
        }
    }
}

fn nonzero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)
}

impl TableConfig {
    /// Creates a new `TableConfig` with the default policy.
    ///
    /// # Arguments
    /// * `device_count` - The amount of training devices pushing into the table.
    ///
    /// # Returns
    /// A new `TableConfig` instance.
    pub fn new(device_count: NonZeroUsize) -> Self {
        Self {
            device_count,
            ..Self::default()
        }
    }

    /// Sets the amount of gradient buffers per device in the free pool.
    pub fn with_pool_factor(mut self, factor: NonZeroUsize) -> Self {
        self.pool_factor = factor;
        self
    }

    /// Sets the amount of pending gradients per device the inbox can hold.
    pub fn with_inbox_factor(mut self, factor: NonZeroUsize) -> Self {
        self.inbox_factor = factor;
        self
    }

    /// Sets the amount of parallel tasks of each update cycle.
    pub fn with_update_threads(mut self, threads: NonZeroUsize) -> Self {
        self.update_threads = threads;
        self
    }

    /// Sets the maximum amount of gradients merged into a single update.
    pub fn with_max_merge(mut self, max_merge: NonZeroUsize) -> Self {
        self.max_merge = max_merge;
        self
    }

    /// Sets the learning rate used when no global learning rate variable exists.
    pub fn with_default_learning_rate(mut self, lr: f32) -> Self {
        self.default_learning_rate = lr;
        self
    }

    /// Overrides the learning rate of a single optimizable parameter.
    pub fn with_learning_rate(mut self, name: impl Into<String>, lr: f32) -> Self {
        self.learning_rates.insert(name.into(), lr);
        self
    }

    pub fn device_count(&self) -> usize {
        self.device_count.get()
    }

    /// The capacity of the free gradient pool.
    pub fn pool_capacity(&self) -> usize {
        self.device_count.get() * self.pool_factor.get()
    }

    /// The capacity of the pending gradient inbox.
    pub fn inbox_capacity(&self) -> usize {
        self.device_count.get() * self.inbox_factor.get()
    }

    pub fn update_threads(&self) -> NonZeroUsize {
        self.update_threads
    }

    pub fn max_merge(&self) -> usize {
        self.max_merge.get()
    }

    pub fn default_learning_rate(&self) -> f32 {
        self.default_learning_rate
    }

    /// The overridden learning rate of `name`, if any.
    pub fn learning_rate(&self, name: &str) -> Option<f32> {
        self.learning_rates.get(name).copied()
    }
}
