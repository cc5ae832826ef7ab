mod buffer;

pub use buffer::{BoundedBuffer, ClosedErr};
