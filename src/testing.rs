#![cfg(test)]

use std::collections::BTreeSet;

use crate::{
    storage::{GRAD_SUFFIX, MOMENT1_SUFFIX, MOMENT2_SUFFIX},
    variables::{Scope, Tensor},
};

pub const LR_NAME: &str = "learning_rate_0";
pub const OPTIMIZABLE: [&str; 2] = ["fc_0.w_0_param", "fc_1.w_0_param"];
pub const ACCUMULATED: [&str; 2] = ["bn0.summary.batch_size", "bn0.summary.batch_sum"];

/// The names a worker would hand to `DenseTable::initialize`.
pub struct Program {
    pub params: Vec<String>,
    pub persistables: Vec<String>,
    pub grads: BTreeSet<String>,
}

/// A zeroed scope holding two optimizable parameters of three elements and
/// four accumulated statistics, with a global learning rate of `lr`.
pub fn zeroed_scope(lr: f32) -> (Scope, Program) {
    let mut scope = Scope::new();

    for name in OPTIMIZABLE {
        scope.insert(name, Tensor::filled(vec![3], 0.));
        scope.insert(format!("{name}{MOMENT1_SUFFIX}"), Tensor::filled(vec![3], 0.));
        scope.insert(format!("{name}{MOMENT2_SUFFIX}"), Tensor::filled(vec![3], 0.));
    }

    for name in ACCUMULATED {
        scope.insert(name, Tensor::filled(vec![2], 0.));
    }

    scope.insert(LR_NAME, Tensor::scalar(lr));

    let params: Vec<String> = OPTIMIZABLE
        .iter()
        .chain(&ACCUMULATED)
        .map(|name| name.to_string())
        .collect();
    let grads = params
        .iter()
        .map(|name| format!("{name}{GRAD_SUFFIX}"))
        .collect();
    let persistables = params
        .iter()
        .cloned()
        .chain([LR_NAME.to_string()])
        .collect();

    let program = Program {
        params,
        persistables,
        grads,
    };

    (scope, program)
}

pub fn assert_close(got: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(got.len(), expected.len());
    for (i, (g, e)) in got.iter().zip(expected).enumerate() {
        assert!((g - e).abs() < tol, "index {i}: got {g}, expected {e}");
    }
}
