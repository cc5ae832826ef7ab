mod place;
mod store;
mod tensor;

pub use place::Place;
pub use store::{Scope, VarStore};
pub use tensor::Tensor;
