use std::{collections::BTreeMap, sync::Arc};

use log::debug;

use super::{TensorViews, TensorViewsMut};
use crate::{
    storage::{Arena, Result, View},
    table::DenseTable,
    variables::Place,
};

/// A training worker's binding to a `DenseTable`.
///
/// Owns one flat parameter buffer and one flat gradient buffer laid out exactly
/// like the table, and exposes every synchronized tensor as a view into them so
/// the compute step reads and writes the buffers the table exchanges, without copies.
pub struct TableWorker {
    table: Arc<DenseTable>,
    place: Place,
    params: Arena,
    grads: Arena,
    param_views: BTreeMap<String, View>,
    grad_views: BTreeMap<String, View>,
}

impl TableWorker {
    /// Binds a new worker to a running table.
    ///
    /// # Arguments
    /// * `table` - The table to synchronize with.
    /// * `place` - The device this worker computes on.
    ///
    /// # Returns
    /// A new `TableWorker` or `NotRunning` if the table isn't running.
    pub fn bind(table: Arc<DenseTable>, place: Place) -> Result<Self> {
        let layout = table.layout()?;
        let total_len = layout.total_len();

        let mut param_views = BTreeMap::new();
        let mut grad_views = BTreeMap::new();

        for entry in layout.entries() {
            param_views.insert(entry.name().to_string(), entry.view());
            grad_views.insert(entry.grad_name(), entry.view());
        }

        debug!(
            "worker on {place} bound {} tensors over {total_len} elements",
            param_views.len()
        );

        Ok(Self {
            table,
            place,
            params: Arena::zeroed(total_len),
            grads: Arena::zeroed(total_len),
            param_views,
            grad_views,
        })
    }

    pub fn place(&self) -> Place {
        self.place
    }

    /// Whether `name` is a parameter or a gradient aliased into the table's buffers.
    pub fn is_synced(&self, name: &str) -> bool {
        self.param_views.contains_key(name) || self.grad_views.contains_key(name)
    }

    pub fn params(&self) -> TensorViews<'_> {
        TensorViews::new(&self.params, &self.param_views)
    }

    pub fn grads_mut(&mut self) -> TensorViewsMut<'_> {
        TensorViewsMut::new(&mut self.grads, &self.grad_views)
    }

    /// Refreshes the local parameters with the table's current snapshot.
    pub fn pull(&mut self) -> Result<()> {
        self.table.pull(self.place, self.params.as_mut_slice())
    }

    /// Hands the local gradient to the table.
    pub fn push(&self) -> Result<()> {
        self.table.push(self.place, self.grads.as_slice())
    }

    /// Runs one training step: pull, compute, push.
    ///
    /// # Arguments
    /// * `compute` - The forward and backward pass, reads the parameters and writes the gradients.
    ///
    /// # Returns
    /// Whatever `compute` returns, or the table's error if pulling or pushing failed.
    pub fn step<F, T>(&mut self, compute: F) -> Result<T>
    where
        F: FnOnce(&TensorViews<'_>, &mut TensorViewsMut<'_>) -> T,
    {
        self.pull()?;

        let params = TensorViews::new(&self.params, &self.param_views);
        let mut grads = TensorViewsMut::new(&mut self.grads, &self.grad_views);
        let out = compute(&params, &mut grads);

        self.push()?;
        Ok(out)
    }
}
