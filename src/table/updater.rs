use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use log::{debug, info};

use super::shared::{TableCore, UpdateCounters};

/// Starts the dedicated update thread of a table.
///
/// # Arguments
/// * `core` - The shared state of the table.
/// * `counters` - Where to record every applied cycle.
///
/// # Returns
/// The handle of the thread, it returns once the inbox is closed and drained.
pub(super) fn spawn(core: Arc<TableCore>, counters: Arc<UpdateCounters>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("dense-table-updater".into())
        .spawn(move || run(&core, &counters))
}

fn run(core: &TableCore, counters: &UpdateCounters) {
    info!("update loop started");

    while let Some(mut batch) = core.next_batch() {
        debug!(merged = batch.len(); "applying update cycle");
        core.apply(&mut batch);
        counters.record(batch.len());
        core.recycle(batch);
    }

    info!("update loop quit");
}
