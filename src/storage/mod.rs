mod arena;
mod error;
mod layout;

pub use arena::{Arena, View};
pub use error::{Result, TableErr};
pub use layout::{
    GRAD_SUFFIX, LayoutEntry, MOMENT1_SUFFIX, MOMENT2_SUFFIX, ParamKind, ParameterLayout,
    Selection,
};
