mod kernel;
mod partition;

pub use kernel::{
    BETA1, BETA2, EPSILON, GRAD_WEIGHT1, GRAD_WEIGHT2, RangeUpdate, STAT_DECAY, accumulate_step,
    adam_step, merge_grads,
};
pub use partition::PartitionPlan;
