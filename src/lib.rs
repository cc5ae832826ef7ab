pub mod optimization;
pub mod storage;
pub mod synchronization;
pub mod table;
mod testing;
pub mod variables;
pub mod worker;

pub use storage::{Result, TableErr};
pub use table::{DenseTable, TableConfig, TableState};
pub use variables::{Place, Scope, Tensor, VarStore};
pub use worker::TableWorker;
