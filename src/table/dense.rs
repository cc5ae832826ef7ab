use std::{collections::BTreeSet, sync::Arc, thread::JoinHandle};

use log::{error, info, trace, warn};
use parking_lot::{Mutex, RwLock};

use super::{
    TableConfig, TableState,
    shared::{TableCore, UpdateCounters, UpdateStats},
    state::AtomicState,
    updater,
};
use crate::{
    storage::{ParameterLayout, Result, Selection, TableErr},
    variables::{Place, VarStore},
};

const LEARNING_RATE_PATTERN: &str = "learning_rate_";

/// A shared, versioned store of dense parameters updated asynchronously.
///
/// Workers `pull` the current parameters and `push` gradients from their own
/// threads while a dedicated update thread merges pending gradients and applies
/// the optimizer. The table goes through `Uninitialized -> Running -> Draining -> Finalized`.
pub struct DenseTable {
    config: TableConfig,
    state: AtomicState,
    core: RwLock<Option<Arc<TableCore>>>,
    updater: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<UpdateCounters>,
}

impl DenseTable {
    /// Creates a new uninitialized `DenseTable`.
    ///
    /// # Arguments
    /// * `config` - The sizing and policy knobs of the table.
    ///
    /// # Returns
    /// A new `DenseTable` instance.
    pub fn new(config: TableConfig) -> Self {
        Self {
            config,
            state: AtomicState::new(TableState::Uninitialized),
            core: RwLock::new(None),
            updater: Mutex::new(None),
            counters: Arc::default(),
        }
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn state(&self) -> TableState {
        self.state.load()
    }

    /// The counters of the update loop so far.
    pub fn stats(&self) -> UpdateStats {
        self.counters.snapshot()
    }

    /// Selects the parameters to synchronize, loads them from `store` and starts the update thread.
    ///
    /// # Arguments
    /// * `store` - The source of truth of the variables.
    /// * `param_names` - The candidate parameters.
    /// * `persistable_names` - The persistable variables, searched for the global learning rate.
    /// * `grad_names` - The gradients produced by the workers.
    ///
    /// # Returns
    /// The names of every synchronized parameter and its gradient, or a precondition
    /// violation if the table isn't uninitialized, no parameter is eligible, or the
    /// global learning rate is set more than once with different values.
    pub fn initialize<S>(
        &self,
        store: &S,
        param_names: &[String],
        persistable_names: &[String],
        grad_names: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>>
    where
        S: VarStore + ?Sized,
    {
        let mut slot = self.updater.lock();

        if self.state.load() != TableState::Uninitialized {
            return Err(TableErr::AlreadyInitialized);
        }

        let selection = Selection::select(param_names, grad_names);
        let layout = ParameterLayout::build(store, &selection)?;
        let base_lr = self.resolve_learning_rate(store, persistable_names)?;

        info!(
            devices = self.config.device_count(),
            params = layout.entries().len(),
            total_len = layout.total_len(),
            adam_len = layout.adam_len(),
            base_lr = base_lr;
            "dense table allocated"
        );

        let core = Arc::new(TableCore::new(&self.config, store, layout, base_lr)?);
        let handle = updater::spawn(Arc::clone(&core), Arc::clone(&self.counters))
            .map_err(|e| TableErr::Threads(e.to_string()))?;

        *self.core.write() = Some(core);
        *slot = Some(handle);
        self.state.store(TableState::Running);

        Ok(selection.synced_names())
    }

    /// Finds the global learning rate among the persistable variables.
    fn resolve_learning_rate<S>(&self, store: &S, persistable_names: &[String]) -> Result<f32>
    where
        S: VarStore + ?Sized,
    {
        let mut base_lr: Option<f32> = None;

        for name in persistable_names {
            if !name.contains(LEARNING_RATE_PATTERN) {
                continue;
            }

            let tensor = store.find(name).ok_or_else(|| TableErr::MissingVariable {
                name: name.clone(),
            })?;
            let &value = tensor.data().first().ok_or_else(|| TableErr::ShapeMismatch {
                name: name.clone(),
                got: 0,
                expected: 1,
            })?;

            match base_lr {
                Some(previous) if previous != value => {
                    return Err(TableErr::ConflictingLearningRate {
                        previous,
                        name: name.clone(),
                        value,
                    });
                }
                _ => base_lr = Some(value),
            }
        }

        Ok(base_lr.unwrap_or_else(|| {
            let lr = self.config.default_learning_rate();
            warn!("no global learning rate variable found, defaulting to {lr}");
            lr
        }))
    }

    /// The shared core, only while running.
    fn running_core(&self) -> Result<Arc<TableCore>> {
        let state = self.state.load();
        if state != TableState::Running {
            return Err(TableErr::NotRunning { state });
        }

        self.core
            .read()
            .clone()
            .ok_or(TableErr::NotRunning { state })
    }

    /// The layout of the synchronized parameters.
    ///
    /// # Returns
    /// The layout or `NotRunning` if the table isn't running.
    pub fn layout(&self) -> Result<ParameterLayout> {
        Ok(self.running_core()?.layout.clone())
    }

    /// The length of the flat parameter buffer.
    pub fn total_len(&self) -> Result<usize> {
        Ok(self.running_core()?.layout.total_len())
    }

    /// The length of the optimizable prefix of the parameter buffer.
    pub fn adam_len(&self) -> Result<usize> {
        Ok(self.running_core()?.layout.adam_len())
    }

    /// The global learning rate resolved during initialization.
    pub fn base_learning_rate(&self) -> Result<f32> {
        Ok(self.running_core()?.base_learning_rate)
    }

    /// Copies the current parameters into `out`.
    ///
    /// Concurrent pulls don't block each other, a pull only waits for an update
    /// cycle in progress.
    ///
    /// # Arguments
    /// * `place` - Where the caller's buffer lives.
    /// * `out` - A buffer of `total_len` elements.
    ///
    /// # Returns
    /// `NotRunning` outside of the running state or `SizeMismatch` if `out` has the wrong length.
    pub fn pull(&self, place: Place, out: &mut [f32]) -> Result<()> {
        let core = self.running_core()?;
        trace!("pull to {place}");
        core.state.read().params.copy_to(out)
    }

    /// Queues a gradient for the update thread.
    ///
    /// Blocks while the free pool is exhausted or the inbox is full.
    ///
    /// # Arguments
    /// * `place` - Where the caller's buffer lives.
    /// * `grad` - A gradient of `total_len` elements.
    ///
    /// # Returns
    /// `NotRunning` outside of the running state, `SizeMismatch` if `grad` has the
    /// wrong length, or `Closed` if the table got finalized while blocked.
    pub fn push(&self, place: Place, grad: &[f32]) -> Result<()> {
        let core = self.running_core()?;
        let expected = core.layout.total_len();

        if grad.len() != expected {
            return Err(TableErr::SizeMismatch {
                got: grad.len(),
                expected,
            });
        }

        trace!("push from {place}");
        let mut buffer = core.pool.receive().ok_or(TableErr::Closed)?;
        buffer.copy_from_slice(grad);
        core.inbox.send(buffer).map_err(|_| TableErr::Closed)
    }

    /// Drains every pending gradient, stops the update thread and writes the parameters back.
    ///
    /// # Arguments
    /// * `store` - Where to copy the final parameters and moments.
    ///
    /// # Returns
    /// `NotRunning` if the table isn't running.
    pub fn finalize<S>(&self, store: &mut S) -> Result<()>
    where
        S: VarStore + ?Sized,
    {
        let mut slot = self.updater.lock();

        self.state
            .transition(TableState::Running, TableState::Draining)
            .map_err(|state| TableErr::NotRunning { state })?;

        let core = self.core.write().take();
        let Some(core) = core else {
            return Err(TableErr::NotRunning {
                state: TableState::Draining,
            });
        };

        core.inbox.close();
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                error!("the update thread panicked");
            }
        }
        core.pool.close();

        {
            let state = core.state.read();
            core.layout
                .store(store, &state.params, &state.moment1, &state.moment2);
        }

        let stats = self.counters.snapshot();
        info!(cycles = stats.cycles, merged = stats.merged; "dense table finalized");

        self.state.store(TableState::Finalized);
        Ok(())
    }
}

impl Drop for DenseTable {
    fn drop(&mut self) {
        if let Some(core) = self.core.get_mut().take() {
            core.inbox.close();
            if let Some(handle) = self.updater.get_mut().take()
                && handle.join().is_err()
            {
                error!("the update thread panicked");
            }
            core.pool.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::atomic::{AtomicBool, Ordering},
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{
        testing::{self, LR_NAME, OPTIMIZABLE, Program},
        variables::{Scope, Tensor},
    };

    fn create_table() -> DenseTable {
        let config = TableConfig::default().with_update_threads(NonZeroUsize::new(4).unwrap());
        DenseTable::new(config)
    }

    fn running_table(lr: f32) -> (DenseTable, Scope, Program) {
        let (scope, program) = testing::zeroed_scope(lr);
        let table = create_table();
        table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap();
        (table, scope, program)
    }

    #[test]
    fn initialize_returns_synced_names() {
        let (scope, program) = testing::zeroed_scope(0.01);
        let table = create_table();
        assert_eq!(table.state(), TableState::Uninitialized);

        let synced = table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap();

        assert_eq!(table.state(), TableState::Running);
        assert_eq!(synced.len(), 8);
        assert!(synced.contains("fc_0.w_0_param@GRAD"));
        assert_eq!(table.total_len().unwrap(), 10);
        assert_eq!(table.adam_len().unwrap(), 6);
        assert_eq!(table.base_learning_rate().unwrap(), 0.01);
    }

    #[test]
    fn initialize_twice_fails() {
        let (table, scope, program) = running_table(0.01);

        let err = table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap_err();
        assert_eq!(err, TableErr::AlreadyInitialized);
    }

    #[test]
    fn conflicting_learning_rates_fail() {
        let (mut scope, mut program) = testing::zeroed_scope(0.01);
        scope.insert("learning_rate_1", Tensor::scalar(0.02));
        program.persistables.push("learning_rate_1".into());

        let table = create_table();
        let err = table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap_err();

        assert!(matches!(err, TableErr::ConflictingLearningRate { .. }));
        assert_eq!(table.state(), TableState::Uninitialized);
    }

    #[test]
    fn repeated_equal_learning_rates_are_accepted() {
        let (mut scope, mut program) = testing::zeroed_scope(0.01);
        scope.insert("learning_rate_1", Tensor::scalar(0.01));
        program.persistables.push("learning_rate_1".into());

        let table = create_table();
        table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap();
        assert_eq!(table.base_learning_rate().unwrap(), 0.01);
    }

    #[test]
    fn missing_learning_rate_uses_default() {
        let (scope, mut program) = testing::zeroed_scope(0.01);
        program.persistables.retain(|name| name != LR_NAME);

        let table = DenseTable::new(TableConfig::default().with_default_learning_rate(0.3));
        table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap();
        assert_eq!(table.base_learning_rate().unwrap(), 0.3);
    }

    #[test]
    fn no_eligible_parameters_fail() {
        let (scope, program) = testing::zeroed_scope(0.01);
        let table = create_table();

        let err = table
            .initialize(&scope, &program.params, &program.persistables, &BTreeSet::new())
            .unwrap_err();
        assert_eq!(err, TableErr::NoEligibleParameters);
    }

    #[test]
    fn operations_outside_running_fail_fast() {
        let table = create_table();
        let mut buf = [0.; 10];

        assert_eq!(
            table.pull(Place::Cpu, &mut buf),
            Err(TableErr::NotRunning {
                state: TableState::Uninitialized
            })
        );
        assert!(table.push(Place::Cpu, &buf).is_err());
        assert!(table.finalize(&mut Scope::new()).is_err());

        let (table, mut scope, _) = running_table(0.01);
        table.finalize(&mut scope).unwrap();

        assert_eq!(
            table.push(Place::Cpu, &buf),
            Err(TableErr::NotRunning {
                state: TableState::Finalized
            })
        );
        assert!(table.finalize(&mut scope).is_err());
    }

    #[test]
    fn size_mismatch_is_reported() {
        let (table, _, _) = running_table(0.01);

        assert_eq!(
            table.push(Place::Cpu, &[1.; 3]),
            Err(TableErr::SizeMismatch {
                got: 3,
                expected: 10
            })
        );
        assert!(table.pull(Place::Cpu, &mut [0.; 11]).is_err());
    }

    #[test]
    fn pull_is_idempotent() {
        let (table, _, _) = running_table(0.01);
        table.push(Place::Cpu, &[1.; 10]).unwrap();
        while table.stats().cycles < 1 {
            thread::sleep(Duration::from_millis(1));
        }

        let mut first = [0.; 10];
        let mut second = [0.; 10];

        table.pull(Place::Device(0), &mut first).unwrap();
        table.pull(Place::Device(1), &mut second).unwrap();
        assert!(first.iter().any(|&v| v != 0.));
        assert_eq!(first, second);
    }

    #[test]
    fn learning_rate_overrides_apply_per_parameter() {
        let (mut scope, program) = testing::zeroed_scope(0.01);
        let config = TableConfig::default().with_learning_rate(OPTIMIZABLE[1], 0.1);
        let table = DenseTable::new(config);
        table
            .initialize(&scope, &program.params, &program.persistables, &program.grads)
            .unwrap();

        table.push(Place::Cpu, &[1.; 10]).unwrap();
        table.finalize(&mut scope).unwrap();

        let slow = scope.find(OPTIMIZABLE[0]).unwrap().data();
        let fast = scope.find(OPTIMIZABLE[1]).unwrap().data();
        testing::assert_close(slow, &[-0.01; 3], 1e-6);
        testing::assert_close(fast, &[-0.1; 3], 1e-6);
    }

    #[test]
    fn push_blocks_once_the_pool_is_exhausted() {
        let (table, mut scope, _) = running_table(0.01);
        let capacity = table.config().pool_capacity();
        let core = table.running_core().unwrap();

        let pushed = AtomicBool::new(false);
        let grad = [1.; 10];

        thread::scope(|s| {
            let guard = core.state.read();

            for _ in 0..capacity {
                table.push(Place::Cpu, &grad).unwrap();
            }

            let blocked = s.spawn(|| {
                table.push(Place::Cpu, &grad).unwrap();
                pushed.store(true, Ordering::SeqCst);
            });

            thread::sleep(Duration::from_millis(100));
            assert!(!pushed.load(Ordering::SeqCst));
            assert!(core.pool.is_empty());

            drop(guard);
            blocked.join().unwrap();
            assert!(pushed.load(Ordering::SeqCst));
        });

        drop(core);
        table.finalize(&mut scope).unwrap();
        assert_eq!(table.stats().merged, capacity as u64 + 1);
    }

    #[test]
    fn dropping_a_running_table_stops_the_updater() {
        let (table, scope, _) = running_table(0.01);
        let counters = Arc::clone(&table.counters);
        let core = Arc::downgrade(&table.running_core().unwrap());

        table.push(Place::Cpu, &[1.; 10]).unwrap();
        table.push(Place::Cpu, &[1.; 10]).unwrap();
        drop(table);

        assert_eq!(counters.snapshot().merged, 2);
        assert!(core.upgrade().is_none());
        assert_eq!(scope.find(OPTIMIZABLE[0]).unwrap().data(), [0.; 3]);
    }
}
