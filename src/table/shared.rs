use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace, warn};
use parking_lot::RwLock;
use rayon::{ThreadPool, ThreadPoolBuilder};

use super::TableConfig;
use crate::{
    optimization::{PartitionPlan, RangeUpdate},
    storage::{Arena, ParameterLayout, ParamKind, Result, TableErr},
    synchronization::BoundedBuffer,
    variables::VarStore,
};

/// A reusable flat gradient buffer of `total_len` elements.
pub(super) type GradBuffer = Box<[f32]>;

/// Counters of the work done by the update loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// The amount of update cycles applied.
    pub cycles: u64,
    /// The amount of gradients consumed across all cycles.
    pub merged: u64,
}

#[derive(Debug, Default)]
pub(super) struct UpdateCounters {
    cycles: AtomicU64,
    merged: AtomicU64,
}

impl UpdateCounters {
    pub fn record(&self, merged: usize) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.merged.fetch_add(merged as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UpdateStats {
        UpdateStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            merged: self.merged.load(Ordering::Relaxed),
        }
    }
}

/// The parameters and the optimizer state, only written by the update loop.
#[derive(Debug)]
pub(super) struct ParamState {
    pub params: Arena,
    pub moment1: Arena,
    pub moment2: Arena,
}

/// Everything a running table shares between callers and its update thread.
pub(super) struct TableCore {
    pub layout: ParameterLayout,
    pub state: RwLock<ParamState>,
    pub learning_rates: Box<[f32]>,
    pub base_learning_rate: f32,
    pub plan: PartitionPlan,
    pub moment_plan: PartitionPlan,
    pub pool: BoundedBuffer<GradBuffer>,
    pub inbox: BoundedBuffer<GradBuffer>,
    pub workers: ThreadPool,
    pub max_merge: usize,
}

impl TableCore {
    /// Allocates every buffer of the table and loads the initial values from `store`.
    ///
    /// # Arguments
    /// * `config` - The sizing policy of the table.
    /// * `store` - The source of truth of the variables.
    /// * `layout` - The arrangement of the selected parameters.
    /// * `base_learning_rate` - The global learning rate.
    ///
    /// # Returns
    /// A new `TableCore` or an error if a variable is missing or the thread pool can't be built.
    pub fn new<S: VarStore + ?Sized>(
        config: &TableConfig,
        store: &S,
        layout: ParameterLayout,
        base_learning_rate: f32,
    ) -> Result<Self> {
        let total_len = layout.total_len();
        let adam_len = layout.adam_len();

        let mut state = ParamState {
            params: Arena::zeroed(total_len),
            moment1: Arena::zeroed(adam_len),
            moment2: Arena::zeroed(adam_len),
        };
        layout.load(store, &mut state.params, &mut state.moment1, &mut state.moment2)?;

        let mut learning_rates = vec![base_learning_rate; adam_len].into_boxed_slice();
        for entry in layout.entries() {
            if entry.kind() != ParamKind::Optimizable {
                continue;
            }

            if let Some(lr) = config.learning_rate(entry.name()) {
                debug!("learning rate of {} overridden to {lr}", entry.name());
                learning_rates[entry.view().range()].fill(lr);
            }
        }

        let plan = PartitionPlan::new(total_len, config.update_threads());
        let moment_plan = plan.clamp(adam_len);

        let workers = ThreadPoolBuilder::new()
            .num_threads(config.update_threads().get())
            .thread_name(|i| format!("dense-table-update-{i}"))
            .build()
            .map_err(|e| TableErr::Threads(e.to_string()))?;

        let pool = BoundedBuffer::new(config.pool_capacity());
        for _ in 0..pool.capacity() {
            let grad = vec![0.; total_len].into_boxed_slice();

            if pool.send(grad).is_err() {
                return Err(TableErr::Closed);
            }
        }

        Ok(Self {
            layout,
            state: RwLock::new(state),
            learning_rates,
            base_learning_rate,
            plan,
            moment_plan,
            pool,
            inbox: BoundedBuffer::new(config.inbox_capacity()),
            workers,
            max_merge: config.max_merge(),
        })
    }

    /// Blocks for the next pending gradient and takes every other one already queued, up to `max_merge`.
    ///
    /// # Returns
    /// The gradients of the next cycle, or `None` once the inbox is closed and drained.
    pub fn next_batch(&self) -> Option<Vec<GradBuffer>> {
        let first = self.inbox.receive()?;
        let merge = (self.inbox.len() + 1).min(self.max_merge);

        let mut batch = Vec::with_capacity(merge);
        batch.push(first);

        while batch.len() < merge {
            match self.inbox.try_receive() {
                Some(grad) => batch.push(grad),
                None => break,
            }
        }

        Some(batch)
    }

    /// Applies one optimizer step with the mean of `batch` over every partition in parallel.
    ///
    /// Readers are excluded for the whole cycle, the first buffer of `batch` is
    /// overwritten with the merged gradient.
    pub fn apply(&self, batch: &mut [GradBuffer]) {
        let Some((first, rest)) = batch.split_first_mut() else {
            return;
        };

        let mut state = self.state.write();
        let ParamState {
            params,
            moment1,
            moment2,
        } = &mut *state;

        let params = self.plan.split_mut(params.as_mut_slice());
        let moment1 = self.moment_plan.split_mut(moment1.as_mut_slice());
        let moment2 = self.moment_plan.split_mut(moment2.as_mut_slice());
        let learning_rates = self.moment_plan.split(&self.learning_rates[..]);
        let grads = self.plan.split_mut(&mut first[..]);
        let others: Vec<Vec<&[f32]>> = rest.iter().map(|grad| self.plan.split(&grad[..])).collect();
        let ranges = self.plan.ranges();

        self.workers.scope(|s| {
            let tasks = params
                .into_iter()
                .zip(moment1)
                .zip(moment2)
                .zip(learning_rates)
                .zip(grads)
                .enumerate();

            for (i, ((((params, moment1), moment2), learning_rates), grad)) in tasks {
                let update = RangeUpdate {
                    params,
                    moment1,
                    moment2,
                    learning_rates,
                    grad,
                    others: others.iter().map(|chunks| chunks[i]).collect(),
                };
                let range = ranges[i].clone();

                s.spawn(move |_| {
                    trace!("update task {i} on range {range:?}");
                    update.apply();
                });
            }
        });
    }

    /// Hands every buffer of a finished cycle back to the free pool.
    pub fn recycle(&self, batch: Vec<GradBuffer>) {
        for grad in batch {
            if self.pool.send(grad).is_err() {
                warn!("free pool closed while recycling a gradient buffer");
            }
        }
    }
}
