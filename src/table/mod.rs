mod config;
mod dense;
mod shared;
mod state;
mod updater;

pub use config::TableConfig;
pub use dense::DenseTable;
pub use shared::UpdateStats;
pub use state::TableState;
