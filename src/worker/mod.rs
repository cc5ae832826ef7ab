mod table_worker;
mod views;

pub use table_worker::TableWorker;
pub use views::{TensorViews, TensorViewsMut};
